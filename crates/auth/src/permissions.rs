use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Permission identifier.
///
/// Permissions are modeled as opaque strings (e.g. "catalog.write").
/// The wildcard permission `"*"` means "allow all".
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(Cow<'static, str>);

impl Permission {
    pub const WILDCARD: Permission = Permission(Cow::Borrowed("*"));

    pub const CATALOG_WRITE: Permission = Permission(Cow::Borrowed("catalog.write"));
    pub const PRICING_MANAGE: Permission = Permission(Cow::Borrowed("pricing.manage"));
    pub const INVENTORY_MANAGE: Permission = Permission(Cow::Borrowed("inventory.manage"));
    pub const CUSTOMERS_MANAGE: Permission = Permission(Cow::Borrowed("customers.manage"));
    pub const ORDERS_MANAGE: Permission = Permission(Cow::Borrowed("orders.manage"));
    pub const REVIEWS_MODERATE: Permission = Permission(Cow::Borrowed("reviews.moderate"));
    pub const ANALYTICS_READ: Permission = Permission(Cow::Borrowed("analytics.read"));

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_wildcard(&self) -> bool {
        self.as_str() == "*"
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
