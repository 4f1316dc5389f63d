//! Persistence boundary.
//!
//! One trait per area; handlers hold an `Arc<dyn Store>`. Every method that
//! touches more than one row is atomic: the Postgres store runs it in a
//! transaction with `FOR UPDATE` locks, the in-memory store under a single
//! write lock.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use storefront_analytics::{AnalyticsSnapshot, MetricSummary, SnapshotFilter, SnapshotSort};
use storefront_auth::{ProfileUpdate, User};
use storefront_catalog::{
    Category, CategoryFilter, CategoryNode, CategoryPatch, CategorySort, Product, ProductDetail, ProductFilter,
    ProductPatch, ProductSort, ProductSummary, Review, ReviewFilter, ReviewSort, ReviewView, Variant, VariantFilter,
    VariantPatch, VariantSort, VariantView, build_tree,
};
use storefront_core::{
    CartId, CartItemId, CategoryId, CustomerId, MovementId, OrderId, Ordering, Page, PageRequest, PricingRuleId,
    ProductId, PromotionId, ReviewId, SnapshotId, UserId, VariantId,
};
use storefront_inventory::{InventoryMovement, MovementFilter, MovementView};
use storefront_pricing::{
    PricedLine, PricingRule, PricingRuleFilter, PricingRulePatch, Promotion, PromotionFilter, PromotionPatch,
    PromotionView,
};
use storefront_sales::{
    CartItemView, CartView, CheckoutRequest, Customer, CustomerFilter, CustomerPatch, OrderFilter, OrderPatch,
    OrderSort, OrderView,
};

use crate::error::StoreResult;

pub mod memory;
pub mod postgres;

pub use memory::InMemoryStore;
pub use postgres::PostgresStore;

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Insert a new account and its customer profile together.
    async fn create_account(&self, user: User, customer: Customer) -> StoreResult<(User, Customer)>;
    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<User>>;
    async fn get_user(&self, id: UserId) -> StoreResult<User>;
    async fn find_user(&self, id: UserId) -> StoreResult<Option<User>>;
    async fn update_user(&self, id: UserId, update: ProfileUpdate) -> StoreResult<User>;
}

#[async_trait]
pub trait CustomerStore: Send + Sync {
    async fn list_customers(&self, filter: CustomerFilter, page: PageRequest) -> StoreResult<Page<Customer>>;
    async fn get_customer(&self, id: CustomerId) -> StoreResult<Customer>;
    async fn customer_for_user(&self, user_id: UserId) -> StoreResult<Option<Customer>>;
    /// The profile linked to `user_id`, inserting `fallback` when there is none.
    async fn ensure_customer(&self, user_id: UserId, fallback: Customer) -> StoreResult<Customer>;
    async fn create_customer(&self, customer: Customer) -> StoreResult<Customer>;
    async fn update_customer(&self, id: CustomerId, patch: CustomerPatch, now: DateTime<Utc>) -> StoreResult<Customer>;
    /// Removes the customer and its carts; orders and reviews keep a null customer.
    async fn delete_customer(&self, id: CustomerId) -> StoreResult<()>;
}

#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn list_categories(
        &self,
        filter: CategoryFilter,
        ordering: Ordering<CategorySort>,
        page: PageRequest,
    ) -> StoreResult<Page<CategoryNode>>;
    async fn get_category(&self, id: CategoryId) -> StoreResult<CategoryNode>;
    async fn create_category(&self, category: Category) -> StoreResult<CategoryNode>;
    async fn update_category(&self, id: CategoryId, patch: CategoryPatch) -> StoreResult<CategoryNode>;
    /// Removes the category and its subtree. Fails with a conflict while any
    /// product in the subtree still points at it.
    async fn delete_category(&self, id: CategoryId) -> StoreResult<()>;

    async fn list_products(
        &self,
        filter: ProductFilter,
        ordering: Ordering<ProductSort>,
        page: PageRequest,
    ) -> StoreResult<Page<ProductSummary>>;
    /// `active_only` hides non-active products as not found.
    async fn get_product(&self, id: ProductId, active_only: bool) -> StoreResult<ProductDetail>;
    async fn create_product(&self, product: Product) -> StoreResult<ProductDetail>;
    async fn update_product(&self, id: ProductId, patch: ProductPatch, now: DateTime<Utc>) -> StoreResult<ProductDetail>;
    async fn delete_product(&self, id: ProductId) -> StoreResult<()>;

    async fn list_variants(
        &self,
        filter: VariantFilter,
        ordering: Ordering<VariantSort>,
        page: PageRequest,
    ) -> StoreResult<Page<VariantView>>;
    async fn get_variant(&self, id: VariantId) -> StoreResult<VariantView>;
    async fn create_variant(&self, variant: Variant) -> StoreResult<VariantView>;
    async fn update_variant(&self, id: VariantId, patch: VariantPatch) -> StoreResult<VariantView>;
    async fn delete_variant(&self, id: VariantId) -> StoreResult<()>;
    /// Price `(variant, qty)` pairs at the current effective price.
    async fn price_lines(&self, items: Vec<(VariantId, i64)>) -> StoreResult<Vec<PricedLine>>;

    async fn list_reviews(
        &self,
        filter: ReviewFilter,
        ordering: Ordering<ReviewSort>,
        page: PageRequest,
    ) -> StoreResult<Page<ReviewView>>;
    async fn get_review(&self, id: ReviewId) -> StoreResult<ReviewView>;
    async fn create_review(&self, review: Review) -> StoreResult<ReviewView>;
    async fn delete_review(&self, id: ReviewId) -> StoreResult<()>;
}

#[async_trait]
pub trait PricingStore: Send + Sync {
    async fn list_rules(&self, filter: PricingRuleFilter, page: PageRequest) -> StoreResult<Page<PricingRule>>;
    async fn get_rule(&self, id: PricingRuleId) -> StoreResult<PricingRule>;
    async fn create_rule(&self, rule: PricingRule) -> StoreResult<PricingRule>;
    async fn update_rule(&self, id: PricingRuleId, patch: PricingRulePatch) -> StoreResult<PricingRule>;
    /// Fails with a conflict while promotions use the rule.
    async fn delete_rule(&self, id: PricingRuleId) -> StoreResult<()>;

    async fn list_promotions(&self, filter: PromotionFilter, page: PageRequest) -> StoreResult<Page<PromotionView>>;
    async fn get_promotion(&self, id: PromotionId) -> StoreResult<PromotionView>;
    /// Case-insensitive lookup by code.
    async fn find_promotion(&self, code: &str) -> StoreResult<Option<(Promotion, PricingRule)>>;
    async fn create_promotion(&self, promotion: Promotion) -> StoreResult<PromotionView>;
    async fn update_promotion(&self, id: PromotionId, patch: PromotionPatch) -> StoreResult<PromotionView>;
    async fn delete_promotion(&self, id: PromotionId) -> StoreResult<()>;
}

#[async_trait]
pub trait InventoryStore: Send + Sync {
    async fn list_movements(&self, filter: MovementFilter, page: PageRequest) -> StoreResult<Page<MovementView>>;
    async fn get_movement(&self, id: MovementId) -> StoreResult<MovementView>;
    /// Apply the movement to the variant's stock and record it.
    async fn record_movement(&self, movement: InventoryMovement) -> StoreResult<MovementView>;
}

/// Open cart plus its lines priced for a discount quote.
#[derive(Debug, Clone, PartialEq)]
pub struct CartQuote {
    pub cart: CartView,
    pub lines: Vec<PricedLine>,
}

#[async_trait]
pub trait SalesStore: Send + Sync {
    /// `customer: None` lists every cart.
    async fn list_carts(&self, customer: Option<CustomerId>, page: PageRequest) -> StoreResult<Page<CartView>>;
    async fn get_cart(&self, id: CartId) -> StoreResult<CartView>;
    /// The customer's open cart, created when missing.
    async fn open_cart(&self, customer: CustomerId, now: DateTime<Utc>) -> StoreResult<CartView>;
    async fn add_cart_item(
        &self,
        customer: CustomerId,
        variant: VariantId,
        qty: i64,
        now: DateTime<Utc>,
    ) -> StoreResult<CartItemView>;
    async fn update_cart_item(
        &self,
        customer: CustomerId,
        item: CartItemId,
        qty: i64,
        now: DateTime<Utc>,
    ) -> StoreResult<CartItemView>;
    async fn remove_cart_item(&self, customer: CustomerId, item: CartItemId, now: DateTime<Utc>) -> StoreResult<()>;
    async fn quote_cart(&self, customer: CustomerId, now: DateTime<Utc>) -> StoreResult<CartQuote>;
    /// Convert the customer's open cart into an order.
    async fn checkout(&self, customer: CustomerId, request: CheckoutRequest, now: DateTime<Utc>) -> StoreResult<OrderView>;

    async fn list_orders(
        &self,
        filter: OrderFilter,
        ordering: Ordering<OrderSort>,
        page: PageRequest,
    ) -> StoreResult<Page<OrderView>>;
    async fn get_order(&self, id: OrderId) -> StoreResult<OrderView>;
    async fn update_order(&self, id: OrderId, patch: OrderPatch, now: DateTime<Utc>) -> StoreResult<OrderView>;
    async fn delete_order(&self, id: OrderId) -> StoreResult<()>;
}

#[async_trait]
pub trait AnalyticsStore: Send + Sync {
    async fn list_snapshots(
        &self,
        filter: SnapshotFilter,
        ordering: Ordering<SnapshotSort>,
        page: PageRequest,
    ) -> StoreResult<Page<AnalyticsSnapshot>>;
    async fn get_snapshot(&self, id: SnapshotId) -> StoreResult<AnalyticsSnapshot>;
    async fn create_snapshot(&self, snapshot: AnalyticsSnapshot) -> StoreResult<AnalyticsSnapshot>;
    async fn delete_snapshot(&self, id: SnapshotId) -> StoreResult<()>;
    async fn metrics(&self) -> StoreResult<BTreeMap<String, MetricSummary>>;
}

/// Everything the API needs.
pub trait Store:
    UserStore + CustomerStore + CatalogStore + PricingStore + InventoryStore + SalesStore + AnalyticsStore
{
}

impl<S> Store for S where
    S: UserStore + CustomerStore + CatalogStore + PricingStore + InventoryStore + SalesStore + AnalyticsStore
{
}

pub type SharedStore = Arc<dyn Store>;

/// Filter, order and page a category list; each entry carries its subtree.
pub(crate) fn category_page(
    all: &[Category],
    filter: &CategoryFilter,
    ordering: &Ordering<CategorySort>,
    page: PageRequest,
) -> Page<CategoryNode> {
    let mut matching: Vec<&Category> = all.iter().filter(|c| filter.matches(c)).collect();
    matching.sort_by(|a, b| CategorySort::compare(ordering, a, b).then_with(|| a.id.cmp(&b.id)));
    Page::paginate(matching, page).map(|c| build_tree(all, c))
}

/// Default promotion and rule listing order: active first, then by name.
pub(crate) fn active_then_name(a: (bool, &str), b: (bool, &str)) -> core::cmp::Ordering {
    b.0.cmp(&a.0).then_with(|| a.1.cmp(b.1))
}

/// Ensures a category exists among `all`, as a field error on `field`.
pub(crate) fn check_category_exists(all: &[Category], id: CategoryId, field: &str) -> StoreResult<()> {
    if all.iter().any(|c| c.id == id) {
        Ok(())
    } else {
        Err(invalid_pk(field, id).into())
    }
}

pub(crate) fn invalid_pk(field: &str, id: impl core::fmt::Display) -> storefront_core::DomainError {
    storefront_core::DomainError::field(field, format!("Invalid pk \"{id}\" - object does not exist."))
}
