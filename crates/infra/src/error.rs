//! Store error model.
//!
//! Domain failures pass through unchanged; everything else is an
//! infrastructure failure the API reports as a 500.
//!
//! ## Constraint mapping
//!
//! | PostgreSQL code | meaning | StoreError |
//! |---|---|---|
//! | `23505` | unique violation | `Domain(Conflict)` with a per-constraint message |
//! | `23503` | foreign key violation | `Domain(Conflict)` |
//! | `23514` | check violation | `Domain(Validation)` |
//! | other | | `Database` |

use storefront_core::DomainError;
use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("database error in {operation}: {source}")]
    Database {
        operation: &'static str,
        #[source]
        source: sqlx::Error,
    },

    #[error("migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

impl StoreError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::Domain(DomainError::not_found(what))
    }

    pub fn domain(&self) -> Option<&DomainError> {
        match self {
            Self::Domain(e) => Some(e),
            _ => None,
        }
    }
}

/// Message reported for a unique constraint, by constraint name.
pub fn unique_message(constraint: &str) -> &'static str {
    match constraint {
        "users_username_key" => "A user with that username already exists.",
        "users_email_key" => "A user with that email already exists.",
        "customers_user_id_key" => "customer with this user already exists.",
        "categories_slug_key" => "category with this slug already exists.",
        "products_slug_key" => "product with this slug already exists.",
        "variants_sku_key" => "variant with this sku already exists.",
        "promotions_code_key" => "promotion with this code already exists.",
        "orders_order_number_key" => "order with this order number already exists.",
        _ => "A record with these values already exists.",
    }
}

/// Message reported when a row cannot be removed because others reference it.
pub fn protected_message(what: &str) -> String {
    format!("Cannot delete this {what} because other records reference it.")
}

pub(crate) fn map_sqlx_error(operation: &'static str, err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        match db_err.code().as_deref() {
            Some("23505") => {
                let message = unique_message(db_err.constraint().unwrap_or_default());
                return StoreError::Domain(DomainError::conflict(message));
            }
            Some("23503") => {
                return StoreError::Domain(DomainError::conflict(protected_message("record")));
            }
            Some("23514") => {
                return StoreError::Domain(DomainError::rule(db_err.message().to_string()));
            }
            _ => {}
        }
    }
    StoreError::Database { operation, source: err }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_constraints_have_messages() {
        assert_eq!(unique_message("variants_sku_key"), "variant with this sku already exists.");
        assert_eq!(unique_message("whatever"), "A record with these values already exists.");
    }

    #[test]
    fn non_database_errors_stay_infrastructure() {
        let err = map_sqlx_error("get_product", sqlx::Error::PoolClosed);
        assert!(matches!(err, StoreError::Database { operation: "get_product", .. }));
        assert!(err.domain().is_none());
    }
}
