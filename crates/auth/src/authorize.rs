use std::collections::HashSet;

use thiserror::Error;

use crate::{Permission, Principal, Role};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("forbidden: missing permission '{0}'")]
    Forbidden(String),
}

/// Role → permission policy.
///
/// Convention: `admin` grants everything; `customer` grants nothing beyond
/// being authenticated (ownership checks happen per resource).
pub fn permissions_for_roles(roles: &[Role]) -> Vec<Permission> {
    if roles.iter().any(|r| *r == Role::ADMIN) {
        return vec![Permission::WILDCARD];
    }

    Vec::new()
}

/// Authorize a principal for one permission.
///
/// - No IO
/// - No panics
/// - No business logic (pure policy check)
pub fn authorize(principal: &Principal, required: &Permission) -> Result<(), AuthzError> {
    let granted = permissions_for_roles(principal.roles());
    let perms: HashSet<&str> = granted.iter().map(|p| p.as_str()).collect();

    if perms.contains("*") || perms.contains(required.as_str()) {
        Ok(())
    } else {
        Err(AuthzError::Forbidden(required.as_str().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use storefront_core::UserId;

    fn principal(roles: Vec<Role>) -> Principal {
        Principal::new(UserId::new(), "jane", roles)
    }

    #[test]
    fn admin_has_every_permission() {
        let p = principal(vec![Role::ADMIN, Role::CUSTOMER]);
        assert!(authorize(&p, &Permission::CATALOG_WRITE).is_ok());
        assert!(authorize(&p, &Permission::new("anything.at.all")).is_ok());
    }

    #[test]
    fn customer_is_denied_management_permissions() {
        let p = principal(vec![Role::CUSTOMER]);
        let err = authorize(&p, &Permission::PRICING_MANAGE).unwrap_err();
        assert_eq!(err, AuthzError::Forbidden("pricing.manage".to_string()));
    }

    #[test]
    fn unknown_roles_grant_nothing() {
        let p = principal(vec![Role::new("viewer")]);
        assert!(authorize(&p, &Permission::ANALYTICS_READ).is_err());
    }
}
