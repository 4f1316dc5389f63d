use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use storefront_core::validate::{is_email, max_len, required_text};
use storefront_core::{DomainResult, Entity, UserId, ValidationErrors};

use crate::Role;

pub const USERNAME_MAX: usize = 150;
pub const NAME_MAX: usize = 150;
pub const PHONE_MAX: usize = 30;
pub const PASSWORD_MIN: usize = 8;

/// Account that can log in.
///
/// `password_hash` is an Argon2 PHC string and never leaves the process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub is_staff: bool,
    pub date_joined: DateTime<Utc>,
}

impl Entity for User {
    type Id = UserId;

    fn id(&self) -> UserId {
        self.id
    }
}

impl User {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name).trim().to_string()
    }

    /// Roles carried in issued tokens.
    pub fn roles(&self) -> Vec<Role> {
        if self.is_staff {
            vec![Role::ADMIN, Role::CUSTOMER]
        } else {
            vec![Role::CUSTOMER]
        }
    }

    pub fn apply(&mut self, update: &ProfileUpdate) {
        if let Some(email) = &update.email {
            self.email = email.trim().to_string();
        }
        if let Some(first) = &update.first_name {
            self.first_name = first.trim().to_string();
        }
        if let Some(last) = &update.last_name {
            self.last_name = last.trim().to_string();
        }
    }
}

/// Sign-up payload. Creates the user and its customer profile together.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Registration {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub password_confirm: String,
    #[serde(default)]
    pub name: String,
    pub phone: Option<String>,
}

impl Registration {
    pub fn validate(&self) -> DomainResult<()> {
        let mut errors = ValidationErrors::new();
        required_text(&mut errors, "username", &self.username, USERNAME_MAX);
        if self.email.trim().is_empty() {
            errors.add("email", "This field may not be blank.");
        } else if !is_email(self.email.trim()) {
            errors.add("email", "Enter a valid email address.");
        }
        required_text(&mut errors, "name", &self.name, NAME_MAX);
        if let Some(phone) = &self.phone {
            max_len(&mut errors, "phone", phone, PHONE_MAX);
        }
        check_password(&mut errors, &self.password);
        errors.check(
            self.password != self.password_confirm,
            "password_confirm",
            "Passwords do not match.",
        );
        errors.into_result()
    }

    /// First word of `name` becomes the first name, the rest the last name.
    pub fn split_name(&self) -> (String, String) {
        let mut words = self.name.split_whitespace();
        let first = words.next().unwrap_or_default().to_string();
        let last = words.collect::<Vec<_>>().join(" ");
        (first, last)
    }

    /// Phone with blanks treated as absent.
    pub fn phone(&self) -> Option<String> {
        self.phone
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string)
    }
}

fn check_password(errors: &mut ValidationErrors, password: &str) {
    if password.chars().count() < PASSWORD_MIN {
        errors.add(
            "password",
            format!("This password is too short. It must contain at least {PASSWORD_MIN} characters."),
        );
    }
    if !password.is_empty() && password.chars().all(|c| c.is_ascii_digit()) {
        errors.add("password", "This password is entirely numeric.");
    }
}

/// `PATCH /auth/me` body.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileUpdate {
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

impl ProfileUpdate {
    pub fn validate(&self) -> DomainResult<()> {
        let mut errors = ValidationErrors::new();
        if let Some(email) = &self.email {
            errors.check(!is_email(email.trim()), "email", "Enter a valid email address.");
        }
        if let Some(first) = &self.first_name {
            max_len(&mut errors, "first_name", first, NAME_MAX);
        }
        if let Some(last) = &self.last_name {
            max_len(&mut errors, "last_name", last, NAME_MAX);
        }
        errors.into_result()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use storefront_core::DomainError;

    fn registration() -> Registration {
        Registration {
            username: "newuser".to_string(),
            email: "newuser@example.com".to_string(),
            password: "TestPass123!".to_string(),
            password_confirm: "TestPass123!".to_string(),
            name: "New User".to_string(),
            phone: None,
        }
    }

    fn field_errors(err: DomainError) -> ValidationErrors {
        match err {
            DomainError::Validation(errors) => errors,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn valid_registration_passes() {
        assert!(registration().validate().is_ok());
    }

    #[test]
    fn mismatched_passwords_fail_on_confirm() {
        let mut reg = registration();
        reg.password_confirm = "Different123!".to_string();
        let errors = field_errors(reg.validate().unwrap_err());
        assert_eq!(errors.get("password_confirm").unwrap(), ["Passwords do not match."]);
    }

    #[test]
    fn weak_passwords_are_rejected() {
        let mut reg = registration();
        reg.password = "12345678".to_string();
        reg.password_confirm = reg.password.clone();
        let errors = field_errors(reg.validate().unwrap_err());
        assert!(errors.get("password").unwrap()[0].contains("numeric"));

        reg.password = "short".to_string();
        reg.password_confirm = reg.password.clone();
        let errors = field_errors(reg.validate().unwrap_err());
        assert!(errors.get("password").unwrap()[0].contains("too short"));
    }

    #[test]
    fn name_splits_into_first_and_last() {
        let mut reg = registration();
        reg.name = "Mary Jane  Watson".to_string();
        assert_eq!(reg.split_name(), ("Mary".to_string(), "Jane Watson".to_string()));

        reg.name = "Cher".to_string();
        assert_eq!(reg.split_name(), ("Cher".to_string(), String::new()));
    }

    #[test]
    fn staff_users_get_admin_role() {
        let mut user = User {
            id: UserId::new(),
            username: "admin".to_string(),
            email: "admin@example.com".to_string(),
            password_hash: "$argon2id$...".to_string(),
            first_name: String::new(),
            last_name: String::new(),
            is_staff: true,
            date_joined: Utc::now(),
        };
        assert_eq!(user.roles(), vec![Role::ADMIN, Role::CUSTOMER]);
        user.is_staff = false;
        assert_eq!(user.roles(), vec![Role::CUSTOMER]);
    }

    #[test]
    fn password_hash_is_not_serialised() {
        let user = User {
            id: UserId::new(),
            username: "jane".to_string(),
            email: "jane@example.com".to_string(),
            password_hash: "secret-hash".to_string(),
            first_name: "Jane".to_string(),
            last_name: "Doe".to_string(),
            is_staff: false,
            date_joined: Utc::now(),
        };
        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("password_hash").is_none());
        assert_eq!(user.full_name(), "Jane Doe");
    }
}
