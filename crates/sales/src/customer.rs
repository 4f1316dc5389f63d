use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use storefront_core::validate::{is_email, max_len, required_text};
use storefront_core::{CustomerId, DomainResult, Entity, UserId, ValidationErrors, nullable};

pub const NAME_MAX: usize = 150;
pub const PHONE_MAX: usize = 30;

/// Shopper profile, optionally linked to a login account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: CustomerId,
    #[serde(rename = "user")]
    pub user_id: Option<UserId>,
    pub email: String,
    pub name: String,
    pub phone: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entity for Customer {
    type Id = CustomerId;

    fn id(&self) -> CustomerId {
        self.id
    }
}

impl Customer {
    pub fn create(draft: CustomerDraft, now: DateTime<Utc>) -> DomainResult<Self> {
        let customer = Self {
            id: CustomerId::new(),
            user_id: draft.user,
            email: draft.email.trim().to_string(),
            name: draft.name.trim().to_string(),
            phone: draft.phone.filter(|p| !p.trim().is_empty()),
            created_at: now,
            updated_at: now,
        };
        customer.validate()?;
        Ok(customer)
    }

    /// Profile created on demand for an account that has none yet.
    ///
    /// Unlike [`Customer::create`] this does not validate: the account's
    /// email may be empty.
    pub fn for_user(user_id: UserId, email: &str, name: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: CustomerId::new(),
            user_id: Some(user_id),
            email: email.to_string(),
            name: name.to_string(),
            phone: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn apply(&mut self, patch: CustomerPatch, now: DateTime<Utc>) -> DomainResult<()> {
        if let Some(user) = patch.user {
            self.user_id = user;
        }
        if let Some(email) = patch.email {
            self.email = email.trim().to_string();
        }
        if let Some(name) = patch.name {
            self.name = name.trim().to_string();
        }
        if let Some(phone) = patch.phone {
            self.phone = phone.filter(|p| !p.trim().is_empty());
        }
        self.updated_at = now;
        self.validate()
    }

    pub fn validate(&self) -> DomainResult<()> {
        let mut errors = ValidationErrors::new();
        errors.check(!is_email(&self.email), "email", "Enter a valid email address.");
        required_text(&mut errors, "name", &self.name, NAME_MAX);
        if let Some(phone) = &self.phone {
            max_len(&mut errors, "phone", phone, PHONE_MAX);
        }
        errors.into_result()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CustomerDraft {
    pub user: Option<UserId>,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub name: String,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CustomerPatch {
    #[serde(default, deserialize_with = "nullable")]
    pub user: Option<Option<UserId>>,
    pub email: Option<String>,
    pub name: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub phone: Option<Option<String>>,
}

#[derive(Debug, Clone, Default)]
pub struct CustomerFilter {
    pub search: Option<String>,
}

impl CustomerFilter {
    pub fn matches(&self, c: &Customer) -> bool {
        let Some(term) = &self.search else {
            return true;
        };
        let term = term.to_lowercase();
        c.name.to_lowercase().contains(&term) || c.email.to_lowercase().contains(&term)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft() -> CustomerDraft {
        CustomerDraft {
            user: None,
            email: "test@example.com".to_string(),
            name: "Test Customer".to_string(),
            phone: Some("+1234567890".to_string()),
        }
    }

    #[test]
    fn create_validates_email_and_name() {
        assert!(Customer::create(draft(), Utc::now()).is_ok());

        let mut bad = draft();
        bad.email = "nope".to_string();
        bad.name = " ".to_string();
        let err = Customer::create(bad, Utc::now()).unwrap_err().to_string();
        assert!(err.contains("email"));
        assert!(err.contains("name"));
    }

    #[test]
    fn blank_phone_is_stored_as_none() {
        let mut d = draft();
        d.phone = Some("  ".to_string());
        assert_eq!(Customer::create(d, Utc::now()).unwrap().phone, None);
    }

    #[test]
    fn serialises_user_link_as_user() {
        let user = UserId::new();
        let c = Customer::for_user(user, "jane@example.com", "Jane", Utc::now());
        let json = serde_json::to_value(&c).unwrap();
        assert_eq!(json["user"], serde_json::json!(user));
    }
}
