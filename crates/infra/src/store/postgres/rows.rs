//! Row decoding.
//!
//! Columns map one to one onto the domain structs; enum columns hold the
//! lowercase names the domain `parse` functions accept.

use serde_json::Value;
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::Row;

use storefront_analytics::AnalyticsSnapshot;
use storefront_auth::User;
use storefront_catalog::{Category, Product, ProductStatus, Review, Variant};
use storefront_core::{
    CartId, CartItemId, CategoryId, CustomerId, DomainError, JsonObject, Money, MovementId, OrderId, OrderItemId,
    PricingRuleId, ProductId, PromotionId, ReviewId, SnapshotId, UserId, VariantId,
};
use storefront_inventory::{InventoryMovement, MovementReason};
use storefront_pricing::{PricingRule, Promotion, RuleScope, RuleType};
use storefront_sales::{Cart, CartItem, CartStatus, Customer, Order, OrderItem, OrderNumber, OrderStatus};

type RowResult<T> = Result<T, sqlx::Error>;

fn decode<T>(parsed: Result<T, DomainError>) -> RowResult<T> {
    parsed.map_err(|e| sqlx::Error::Decode(e.into()))
}

fn money(row: &PgRow, col: &str) -> RowResult<Money> {
    Ok(Money::from_minor(row.try_get(col)?))
}

fn object(row: &PgRow, col: &str) -> RowResult<JsonObject> {
    Ok(row.try_get::<Json<JsonObject>, _>(col)?.0)
}

pub(super) fn user_from_row(row: &PgRow) -> RowResult<User> {
    Ok(User {
        id: UserId::from_uuid(row.try_get("id")?),
        username: row.try_get("username")?,
        email: row.try_get("email")?,
        password_hash: row.try_get("password_hash")?,
        first_name: row.try_get("first_name")?,
        last_name: row.try_get("last_name")?,
        is_staff: row.try_get("is_staff")?,
        date_joined: row.try_get("date_joined")?,
    })
}

pub(super) fn customer_from_row(row: &PgRow) -> RowResult<Customer> {
    Ok(Customer {
        id: CustomerId::from_uuid(row.try_get("id")?),
        user_id: row.try_get::<Option<uuid::Uuid>, _>("user_id")?.map(UserId::from_uuid),
        email: row.try_get("email")?,
        name: row.try_get("name")?,
        phone: row.try_get("phone")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

pub(super) fn category_from_row(row: &PgRow) -> RowResult<Category> {
    Ok(Category {
        id: CategoryId::from_uuid(row.try_get("id")?),
        slug: row.try_get("slug")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        parent_id: row.try_get::<Option<uuid::Uuid>, _>("parent_id")?.map(CategoryId::from_uuid),
        created_at: row.try_get("created_at")?,
    })
}

pub(super) fn product_from_row(row: &PgRow) -> RowResult<Product> {
    let status: String = row.try_get("status")?;
    Ok(Product {
        id: ProductId::from_uuid(row.try_get("id")?),
        slug: row.try_get("slug")?,
        name: row.try_get("name")?,
        summary: row.try_get("summary")?,
        description: row.try_get("description")?,
        category_id: CategoryId::from_uuid(row.try_get("category_id")?),
        images: row.try_get("images")?,
        attributes: object(row, "attributes")?,
        status: decode(ProductStatus::parse(&status))?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

pub(super) fn variant_from_row(row: &PgRow) -> RowResult<Variant> {
    Ok(Variant {
        id: VariantId::from_uuid(row.try_get("id")?),
        product_id: ProductId::from_uuid(row.try_get("product_id")?),
        sku: row.try_get("sku")?,
        name: row.try_get("name")?,
        price: money(row, "price")?,
        sale_price: row.try_get::<Option<i64>, _>("sale_price")?.map(Money::from_minor),
        currency: row.try_get("currency")?,
        stock: row.try_get("stock")?,
        attributes: object(row, "attributes")?,
    })
}

pub(super) fn review_from_row(row: &PgRow) -> RowResult<Review> {
    Ok(Review {
        id: ReviewId::from_uuid(row.try_get("id")?),
        product_id: ProductId::from_uuid(row.try_get("product_id")?),
        customer_id: row.try_get::<Option<uuid::Uuid>, _>("customer_id")?.map(CustomerId::from_uuid),
        rating: row.try_get("rating")?,
        comment: row.try_get("comment")?,
        created_at: row.try_get("created_at")?,
    })
}

pub(super) fn rule_from_row(row: &PgRow) -> RowResult<PricingRule> {
    let rule_type: String = row.try_get("rule_type")?;
    Ok(PricingRule {
        id: PricingRuleId::from_uuid(row.try_get("id")?),
        name: row.try_get("name")?,
        rule_type: decode(RuleType::parse(&rule_type))?,
        value: row.try_get("value")?,
        applies_to: row.try_get::<Json<RuleScope>, _>("applies_to")?.0,
        active: row.try_get("active")?,
        starts_at: row.try_get("starts_at")?,
        ends_at: row.try_get("ends_at")?,
    })
}

/// Decodes a promotion from columns prefixed `p_`, so it can share a row
/// with its rule.
pub(super) fn promotion_from_row(row: &PgRow) -> RowResult<Promotion> {
    Ok(Promotion {
        id: PromotionId::from_uuid(row.try_get("p_id")?),
        code: row.try_get("p_code")?,
        name: row.try_get("p_name")?,
        description: row.try_get("p_description")?,
        rule_id: PricingRuleId::from_uuid(row.try_get("p_rule_id")?),
        active: row.try_get("p_active")?,
        usage_limit: row.try_get("p_usage_limit")?,
        used_count: row.try_get("p_used_count")?,
    })
}

pub(super) fn movement_from_row(row: &PgRow) -> RowResult<InventoryMovement> {
    let reason: String = row.try_get("reason")?;
    Ok(InventoryMovement {
        id: MovementId::from_uuid(row.try_get("id")?),
        variant_id: VariantId::from_uuid(row.try_get("variant_id")?),
        change: row.try_get("change")?,
        reason: decode(MovementReason::parse(&reason))?,
        metadata: object(row, "metadata")?,
        created_at: row.try_get("created_at")?,
    })
}

/// Cart header; items are loaded separately.
pub(super) fn cart_from_row(row: &PgRow) -> RowResult<Cart> {
    let status: String = row.try_get("status")?;
    Ok(Cart {
        id: CartId::from_uuid(row.try_get("id")?),
        customer_id: row.try_get::<Option<uuid::Uuid>, _>("customer_id")?.map(CustomerId::from_uuid),
        status: decode(CartStatus::parse(&status))?,
        items: Vec::new(),
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

pub(super) fn cart_item_from_row(row: &PgRow) -> RowResult<CartItem> {
    Ok(CartItem {
        id: CartItemId::from_uuid(row.try_get("id")?),
        cart_id: CartId::from_uuid(row.try_get("cart_id")?),
        variant_id: VariantId::from_uuid(row.try_get("variant_id")?),
        qty: row.try_get("qty")?,
        price_at_add: money(row, "price_at_add")?,
    })
}

/// Order header; items are loaded separately.
pub(super) fn order_from_row(row: &PgRow) -> RowResult<Order> {
    let status: String = row.try_get("status")?;
    Ok(Order {
        id: OrderId::from_uuid(row.try_get("id")?),
        order_number: OrderNumber::from_string(row.try_get::<String, _>("order_number")?),
        customer_id: row.try_get::<Option<uuid::Uuid>, _>("customer_id")?.map(CustomerId::from_uuid),
        status: decode(OrderStatus::parse(&status))?,
        subtotal: money(row, "subtotal")?,
        discount_total: money(row, "discount_total")?,
        shipping_total: money(row, "shipping_total")?,
        tax_total: money(row, "tax_total")?,
        grand_total: money(row, "grand_total")?,
        currency: row.try_get("currency")?,
        payment_ref: row.try_get("payment_ref")?,
        promotion_code: row.try_get("promotion_code")?,
        shipping_address: row.try_get::<Json<Value>, _>("shipping_address")?.0,
        billing_address: row.try_get::<Json<Value>, _>("billing_address")?.0,
        items: Vec::new(),
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

pub(super) fn order_item_from_row(row: &PgRow) -> RowResult<OrderItem> {
    Ok(OrderItem {
        id: OrderItemId::from_uuid(row.try_get("id")?),
        order_id: OrderId::from_uuid(row.try_get("order_id")?),
        variant_id: VariantId::from_uuid(row.try_get("variant_id")?),
        qty: row.try_get("qty")?,
        unit_price: money(row, "unit_price")?,
        line_total: money(row, "line_total")?,
    })
}

pub(super) fn snapshot_from_row(row: &PgRow) -> RowResult<AnalyticsSnapshot> {
    Ok(AnalyticsSnapshot {
        id: SnapshotId::from_uuid(row.try_get("id")?),
        metric: row.try_get("metric")?,
        value: row.try_get("value")?,
        breakdown: object(row, "breakdown")?,
        period: row.try_get("period")?,
        created_at: row.try_get("created_at")?,
    })
}
