use storefront_auth::{Permission, Principal, authorize};

use crate::app::errors::ApiError;

/// Who is making the request.
///
/// Inserted by the auth middleware on every request; anonymous when no
/// bearer token was sent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Caller {
    principal: Option<Principal>,
}

impl Caller {
    pub fn anonymous() -> Self {
        Self { principal: None }
    }

    pub fn authenticated(principal: Principal) -> Self {
        Self {
            principal: Some(principal),
        }
    }

    pub fn principal(&self) -> Option<&Principal> {
        self.principal.as_ref()
    }

    pub fn is_staff(&self) -> bool {
        self.principal.as_ref().is_some_and(Principal::is_staff)
    }

    /// The principal, or 401 for anonymous callers.
    pub fn require_auth(&self) -> Result<&Principal, ApiError> {
        self.principal
            .as_ref()
            .ok_or_else(|| ApiError::unauthorized("Authentication credentials were not provided."))
    }

    /// 401 when anonymous, 403 when the permission is missing.
    pub fn require(&self, permission: &Permission) -> Result<&Principal, ApiError> {
        let principal = self.require_auth()?;
        authorize(principal, permission)?;
        Ok(principal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use storefront_auth::Role;
    use storefront_core::UserId;

    #[test]
    fn anonymous_callers_need_credentials() {
        let caller = Caller::anonymous();
        assert!(matches!(caller.require_auth(), Err(ApiError::Unauthorized(_))));
        assert!(!caller.is_staff());
    }

    #[test]
    fn customers_lack_management_permissions() {
        let caller = Caller::authenticated(Principal::new(UserId::new(), "jane", vec![Role::CUSTOMER]));
        assert!(caller.require_auth().is_ok());
        assert!(matches!(
            caller.require(&Permission::CATALOG_WRITE),
            Err(ApiError::Forbidden(_))
        ));
    }

    #[test]
    fn staff_pass_permission_checks() {
        let caller = Caller::authenticated(Principal::new(UserId::new(), "admin", vec![Role::ADMIN]));
        assert!(caller.is_staff());
        assert!(caller.require(&Permission::ANALYTICS_READ).is_ok());
    }
}
