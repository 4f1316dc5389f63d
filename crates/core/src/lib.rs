//! `storefront-core`: shared domain building blocks.
//!
//! Pure types only: identifiers, money, pagination and the error model used by
//! every domain crate. No IO lives here.

pub mod entity;
pub mod error;
pub mod id;
pub mod money;
pub mod page;
pub mod patch;
pub mod validate;

pub use entity::Entity;
pub use error::{DomainError, DomainResult, ValidationErrors};
pub use id::{
    CartId, CartItemId, CategoryId, CustomerId, MovementId, OrderId, OrderItemId, PricingRuleId,
    ProductId, PromotionId, ReviewId, SnapshotId, UserId, VariantId,
};
pub use money::Money;
pub use page::{Ordering, Page, PageRequest};
pub use patch::nullable;

/// Free-form JSON object column (attributes, metadata, breakdowns).
pub type JsonObject = serde_json::Map<String, serde_json::Value>;
