use chrono::Utc;
use serde_json::json;

use storefront_auth::User;
use storefront_catalog::{
    Category, CategoryDraft, Product, ProductDraft, ProductStatus, Variant, VariantDraft,
};
use storefront_core::{DomainError, Money, PageRequest, UserId};
use storefront_inventory::{MovementDraft, MovementReason};
use storefront_pricing::{PricingRule, PricingRuleDraft, Promotion, PromotionDraft, RuleScope, RuleType};
use storefront_sales::{CartStatus, CheckoutRequest, Customer, OrderFilter, OrderSort};

use super::InMemoryStore;
use crate::store::{CatalogStore, CustomerStore, InventoryStore, PricingStore, SalesStore, UserStore};

fn user(username: &str, email: &str) -> User {
    User {
        id: UserId::new(),
        username: username.to_string(),
        email: email.to_string(),
        password_hash: "x".to_string(),
        first_name: String::new(),
        last_name: String::new(),
        is_staff: false,
        date_joined: Utc::now(),
    }
}

async fn shopper(store: &InMemoryStore, username: &str) -> Customer {
    let u = user(username, &format!("{username}@example.com"));
    let customer = Customer::for_user(u.id, &u.email, username, Utc::now());
    store.create_account(u, customer).await.unwrap().1
}

async fn category(store: &InMemoryStore, slug: &str, parent: Option<Category>) -> Category {
    let c = Category::create(
        CategoryDraft {
            slug: slug.to_string(),
            name: slug.to_string(),
            description: None,
            parent: parent.map(|p| p.id),
        },
        Utc::now(),
    )
    .unwrap();
    store.create_category(c).await.unwrap().category
}

async fn variant(store: &InMemoryStore, sku: &str, price: i64, stock: i64) -> Variant {
    let cat = category(store, &format!("cat-{}", sku.to_lowercase()), None).await;
    let product = Product::create(
        ProductDraft {
            slug: format!("p-{}", sku.to_lowercase()),
            name: sku.to_string(),
            summary: String::new(),
            description: String::new(),
            category: cat.id,
            images: Vec::new(),
            attributes: Default::default(),
            status: ProductStatus::Active,
        },
        Utc::now(),
    )
    .unwrap();
    let product = store.create_product(product).await.unwrap().product;
    let v = Variant::create(VariantDraft {
        product: product.id,
        sku: sku.to_string(),
        name: None,
        price: Money::from_minor(price),
        sale_price: None,
        currency: None,
        stock,
        attributes: Default::default(),
    })
    .unwrap();
    store.create_variant(v).await.unwrap().variant
}

fn checkout_request(code: Option<&str>) -> CheckoutRequest {
    CheckoutRequest {
        shipping_address: Some(json!({"line1": "1 Main St", "city": "Springfield"})),
        promotion_code: code.map(str::to_string),
        ..Default::default()
    }
}

fn conflict(err: crate::error::StoreError) -> bool {
    matches!(err.domain(), Some(DomainError::Conflict(_)))
}

#[tokio::test]
async fn duplicate_username_and_email_conflict() {
    let store = InMemoryStore::new();
    shopper(&store, "alice").await;

    let same_name = user("alice", "other@example.com");
    let c = Customer::for_user(same_name.id, &same_name.email, "A", Utc::now());
    assert!(conflict(store.create_account(same_name, c).await.unwrap_err()));

    let same_email = user("bob", "ALICE@example.com");
    let c = Customer::for_user(same_email.id, &same_email.email, "B", Utc::now());
    assert!(conflict(store.create_account(same_email, c).await.unwrap_err()));
}

#[tokio::test]
async fn ensure_customer_requires_a_user_and_is_idempotent() {
    let store = InMemoryStore::new();
    let stranger = UserId::new();
    let fallback = Customer::for_user(stranger, "", "ghost", Utc::now());
    let err = store.ensure_customer(stranger, fallback).await.unwrap_err();
    assert!(matches!(err.domain(), Some(DomainError::NotFound(_))));

    let existing = shopper(&store, "carol").await;
    let user_id = existing.user_id.unwrap();
    let fallback = Customer::for_user(user_id, "", "carol", Utc::now());
    let again = store.ensure_customer(user_id, fallback).await.unwrap();
    assert_eq!(again.id, existing.id);
}

#[tokio::test]
async fn category_reparent_into_own_subtree_is_rejected() {
    let store = InMemoryStore::new();
    let root = category(&store, "root", None).await;
    let child = category(&store, "child", Some(root.clone())).await;

    let patch = storefront_catalog::CategoryPatch {
        parent: Some(Some(child.id)),
        ..Default::default()
    };
    let err = store.update_category(root.id, patch).await.unwrap_err();
    assert!(matches!(err.domain(), Some(DomainError::Validation(_))));

    let tree = store.get_category(root.id).await.unwrap();
    assert_eq!(tree.children.len(), 1);
}

#[tokio::test]
async fn category_with_products_cannot_be_deleted() {
    let store = InMemoryStore::new();
    let v = variant(&store, "TEE-1", 1000, 5).await;
    let product = store.get_product(v.product_id, false).await.unwrap();
    let err = store.delete_category(product.product.category_id).await.unwrap_err();
    assert!(conflict(err));
}

#[tokio::test]
async fn checkout_decrements_stock_and_converts_cart() {
    let store = InMemoryStore::new();
    let customer = shopper(&store, "dave").await;
    let v = variant(&store, "MUG-1", 1250, 3).await;
    let now = Utc::now();

    store.add_cart_item(customer.id, v.id, 2, now).await.unwrap();
    let order = store.checkout(customer.id, checkout_request(None), now).await.unwrap();

    assert_eq!(order.order.subtotal, Money::from_minor(2500));
    assert_eq!(order.order.grand_total, Money::from_minor(2500));
    assert_eq!(order.order.items.len(), 1);
    assert_eq!(store.get_variant(v.id).await.unwrap().variant.stock, 1);

    let carts = store.list_carts(Some(customer.id), PageRequest::default()).await.unwrap();
    assert_eq!(carts.count, 1);
    assert_eq!(carts.results[0].status, CartStatus::Converted);

    let movements = store
        .list_movements(Default::default(), PageRequest::default())
        .await
        .unwrap();
    assert_eq!(movements.count, 1);
    assert_eq!(movements.results[0].movement.change, -2);
    assert_eq!(movements.results[0].movement.reason, MovementReason::Sale);

    // A fresh open cart is started on the next add.
    store.add_cart_item(customer.id, v.id, 1, now).await.unwrap();
    let cart = store.open_cart(customer.id, now).await.unwrap();
    assert_ne!(cart.id, carts.results[0].id);
}

#[tokio::test]
async fn checkout_with_empty_cart_fails() {
    let store = InMemoryStore::new();
    let customer = shopper(&store, "erin").await;
    let err = store
        .checkout(customer.id, checkout_request(None), Utc::now())
        .await
        .unwrap_err();
    assert!(matches!(err.domain(), Some(DomainError::Validation(_))));
    let orders = store
        .list_orders(OrderFilter::default(), OrderSort::default_ordering(), PageRequest::default())
        .await
        .unwrap();
    assert_eq!(orders.count, 0);
}

#[tokio::test]
async fn checkout_rechecks_stock() {
    let store = InMemoryStore::new();
    let customer = shopper(&store, "frank").await;
    let v = variant(&store, "CAP-1", 900, 2).await;
    let now = Utc::now();
    store.add_cart_item(customer.id, v.id, 2, now).await.unwrap();

    let shrink = MovementDraft {
        variant: v.id,
        change: -1,
        reason: MovementReason::Adjustment,
        metadata: Default::default(),
    };
    store.record_movement(shrink.into_movement(now).unwrap()).await.unwrap();

    let err = store.checkout(customer.id, checkout_request(None), now).await.unwrap_err();
    assert!(matches!(err.domain(), Some(DomainError::Validation(_))));
    assert_eq!(store.get_variant(v.id).await.unwrap().variant.stock, 1);
}

#[tokio::test]
async fn promotion_is_applied_and_counted() {
    let store = InMemoryStore::new();
    let customer = shopper(&store, "gina").await;
    let v = variant(&store, "BAG-1", 2000, 10).await;
    let rule = PricingRule::create(PricingRuleDraft {
        name: "Ten off".to_string(),
        rule_type: RuleType::Percentage,
        value: 1000,
        applies_to: RuleScope::default(),
        active: true,
        starts_at: None,
        ends_at: None,
    })
    .unwrap();
    let rule = store.create_rule(rule).await.unwrap();
    let promo = Promotion::create(PromotionDraft {
        code: "SAVE10".to_string(),
        name: "Save ten".to_string(),
        description: None,
        rule: rule.id,
        active: true,
        usage_limit: Some(1),
    })
    .unwrap();
    let promo = store.create_promotion(promo).await.unwrap();

    let now = Utc::now();
    store.add_cart_item(customer.id, v.id, 1, now).await.unwrap();
    let order = store
        .checkout(customer.id, checkout_request(Some("save10")), now)
        .await
        .unwrap();
    assert_eq!(order.order.discount_total, Money::from_minor(200));
    assert_eq!(order.order.grand_total, Money::from_minor(1800));

    let stored = store.get_promotion(promo.promotion.id).await.unwrap();
    assert_eq!(stored.promotion.used_count, 1);
    assert!(!stored.is_available);

    store.add_cart_item(customer.id, v.id, 1, now).await.unwrap();
    let err = store
        .checkout(customer.id, checkout_request(Some("SAVE10")), now)
        .await
        .unwrap_err();
    assert!(matches!(err.domain(), Some(DomainError::Validation(_))));

    assert!(conflict(store.delete_rule(rule.id).await.unwrap_err()));
}

#[tokio::test]
async fn movement_cannot_drive_stock_negative() {
    let store = InMemoryStore::new();
    let v = variant(&store, "PEN-1", 100, 1).await;
    let draft = MovementDraft {
        variant: v.id,
        change: -5,
        reason: MovementReason::Adjustment,
        metadata: Default::default(),
    };
    let err = store
        .record_movement(draft.into_movement(Utc::now()).unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err.domain(), Some(DomainError::Validation(_))));
    assert_eq!(store.get_variant(v.id).await.unwrap().variant.stock, 1);
}

#[tokio::test]
async fn ordered_variants_are_protected() {
    let store = InMemoryStore::new();
    let customer = shopper(&store, "hank").await;
    let v = variant(&store, "HAT-1", 500, 4).await;
    let now = Utc::now();
    store.add_cart_item(customer.id, v.id, 1, now).await.unwrap();
    store.checkout(customer.id, checkout_request(None), now).await.unwrap();

    assert!(conflict(store.delete_variant(v.id).await.unwrap_err()));
    assert!(conflict(store.delete_product(v.product_id).await.unwrap_err()));

    store.delete_customer(customer.id).await.unwrap();
    let orders = store
        .list_orders(OrderFilter::default(), OrderSort::default_ordering(), PageRequest::default())
        .await
        .unwrap();
    assert_eq!(orders.results[0].order.customer_id, None);
}

#[tokio::test]
async fn oversized_cart_quantity_is_rejected_and_store_stays_usable() {
    let store = InMemoryStore::new();
    let customer = shopper(&store, "ivy").await;
    let v = variant(&store, "KEY-1", 1500, 5).await;
    let now = Utc::now();
    store.add_cart_item(customer.id, v.id, 1, now).await.unwrap();

    let err = store.add_cart_item(customer.id, v.id, i64::MAX, now).await.unwrap_err();
    assert!(matches!(err.domain(), Some(DomainError::Validation(_))));

    let cart = store.open_cart(customer.id, now).await.unwrap();
    assert_eq!(cart.items[0].item.qty, 1);
    assert!(store.get_variant(v.id).await.is_ok());
}

#[tokio::test]
async fn lock_is_recovered_after_a_panic() {
    let store = std::sync::Arc::new(InMemoryStore::new());
    let v = variant(&store, "LAMP-1", 4000, 2).await;

    let poisoner = store.clone();
    let joined = std::thread::spawn(move || {
        let _guard = poisoner.write();
        panic!("handler panicked while holding the store");
    })
    .join();
    assert!(joined.is_err());
    assert!(store.state.is_poisoned());

    assert_eq!(store.get_variant(v.id).await.unwrap().variant.stock, 2);
    assert!(!store.state.is_poisoned());
}
