use storefront_core::UserId;

use crate::Role;

/// An authenticated caller, as derived from a verified access token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    user_id: UserId,
    username: String,
    roles: Vec<Role>,
}

impl Principal {
    pub fn new(user_id: UserId, username: impl Into<String>, roles: Vec<Role>) -> Self {
        Self {
            user_id,
            username: username.into(),
            roles,
        }
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn roles(&self) -> &[Role] {
        &self.roles
    }

    pub fn is_staff(&self) -> bool {
        self.roles.contains(&Role::ADMIN)
    }
}
