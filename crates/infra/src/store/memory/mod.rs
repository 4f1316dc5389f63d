//! In-memory store for tests and local development.
//!
//! All state sits behind one `RwLock`; mutating operations hold the write
//! lock from first read to last write, which gives them the same atomicity
//! the Postgres store gets from transactions. Domain checks run before any
//! table is touched, so a poisoned lock still guards consistent state and is
//! recovered rather than surfaced.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use storefront_analytics::AnalyticsSnapshot;
use storefront_auth::{ProfileUpdate, User};
use storefront_catalog::{Category, Product, ProductDetail, Review, Variant};
use storefront_core::{
    CartId, CategoryId, CustomerId, DomainError, MovementId, OrderId, Page, PageRequest, PricingRuleId, ProductId,
    PromotionId, ReviewId, SnapshotId, UserId, VariantId,
};
use storefront_inventory::InventoryMovement;
use storefront_pricing::{PricingRule, Promotion};
use storefront_sales::{Cart, CartStatus, CartView, Customer, CustomerFilter, CustomerPatch, Order, OrderView};

use crate::error::{StoreError, StoreResult, protected_message, unique_message};
use crate::store::{CustomerStore, UserStore, invalid_pk};

mod analytics;
mod catalog;
mod inventory;
mod pricing;
mod sales;

#[derive(Debug, Default)]
struct State {
    users: HashMap<UserId, User>,
    customers: HashMap<CustomerId, Customer>,
    categories: HashMap<CategoryId, Category>,
    products: HashMap<ProductId, Product>,
    variants: HashMap<VariantId, Variant>,
    reviews: HashMap<ReviewId, Review>,
    rules: HashMap<PricingRuleId, PricingRule>,
    promotions: HashMap<PromotionId, Promotion>,
    movements: HashMap<MovementId, InventoryMovement>,
    carts: HashMap<CartId, Cart>,
    orders: HashMap<OrderId, Order>,
    snapshots: HashMap<SnapshotId, AnalyticsSnapshot>,
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: RwLock<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(|poisoned| {
            tracing::warn!("recovering in-memory store after a panic");
            self.state.clear_poison();
            poisoned.into_inner()
        })
    }

    fn write(&self) -> RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(|poisoned| {
            tracing::warn!("recovering in-memory store after a panic");
            self.state.clear_poison();
            poisoned.into_inner()
        })
    }
}

impl State {
    fn category_name(&self, id: CategoryId) -> String {
        self.categories.get(&id).map(|c| c.name.clone()).unwrap_or_default()
    }

    fn variants_of(&self, product: ProductId) -> Vec<Variant> {
        self.variants.values().filter(|v| v.product_id == product).cloned().collect()
    }

    fn product_detail(&self, product: Product) -> ProductDetail {
        let category_name = self.category_name(product.category_id);
        let variants = self.variants_of(product.id);
        ProductDetail::new(product, category_name, variants)
    }

    fn customer_name(&self, id: Option<CustomerId>) -> Option<String> {
        id.and_then(|id| self.customers.get(&id)).map(|c| c.name.clone())
    }

    fn cart_view(&self, cart: Cart) -> CartView {
        CartView::new(cart, |id| self.variants.get(&id).cloned())
    }

    fn order_view(&self, order: Order) -> OrderView {
        let customer_name = self.customer_name(order.customer_id);
        OrderView { order, customer_name }
    }

    fn open_cart_id(&self, customer: CustomerId) -> Option<CartId> {
        self.carts
            .values()
            .filter(|c| c.customer_id == Some(customer) && c.status == CartStatus::Open)
            .max_by_key(|c| (c.updated_at, c.id))
            .map(|c| c.id)
    }

    fn variant_is_ordered(&self, id: VariantId) -> bool {
        self.orders.values().any(|o| o.items.iter().any(|i| i.variant_id == id))
    }

    /// Drop a variant and everything that cascades with it.
    fn remove_variant(&mut self, id: VariantId) {
        self.variants.remove(&id);
        self.movements.retain(|_, m| m.variant_id != id);
        for cart in self.carts.values_mut() {
            cart.items.retain(|i| i.variant_id != id);
        }
    }

    fn check_user_unique(&self, user: &User) -> StoreResult<()> {
        for other in self.users.values().filter(|u| u.id != user.id) {
            if other.username == user.username {
                return Err(DomainError::conflict(unique_message("users_username_key")).into());
            }
            if !user.email.is_empty() && other.email.eq_ignore_ascii_case(&user.email) {
                return Err(DomainError::conflict(unique_message("users_email_key")).into());
            }
        }
        Ok(())
    }

    fn check_customer_link(&self, customer: &Customer) -> StoreResult<()> {
        let Some(user_id) = customer.user_id else {
            return Ok(());
        };
        if !self.users.contains_key(&user_id) {
            return Err(invalid_pk("user", user_id).into());
        }
        if self
            .customers
            .values()
            .any(|c| c.id != customer.id && c.user_id == Some(user_id))
        {
            return Err(DomainError::conflict(unique_message("customers_user_id_key")).into());
        }
        Ok(())
    }
}

/// Sort, then page.
fn sorted_page<T>(mut items: Vec<T>, cmp: impl FnMut(&T, &T) -> core::cmp::Ordering, page: PageRequest) -> Page<T> {
    items.sort_by(cmp);
    Page::paginate(items, page)
}

#[async_trait]
impl UserStore for InMemoryStore {
    async fn create_account(&self, user: User, mut customer: Customer) -> StoreResult<(User, Customer)> {
        let mut state = self.write();
        state.check_user_unique(&user)?;
        customer.user_id = Some(user.id);
        if state.customers.values().any(|c| c.user_id == Some(user.id)) {
            return Err(DomainError::conflict(unique_message("customers_user_id_key")).into());
        }
        state.users.insert(user.id, user.clone());
        state.customers.insert(customer.id, customer.clone());
        Ok((user, customer))
    }

    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        let state = self.read();
        Ok(state.users.values().find(|u| u.username == username).cloned())
    }

    async fn get_user(&self, id: UserId) -> StoreResult<User> {
        self.find_user(id).await?.ok_or_else(|| StoreError::not_found("user"))
    }

    async fn find_user(&self, id: UserId) -> StoreResult<Option<User>> {
        Ok(self.read().users.get(&id).cloned())
    }

    async fn update_user(&self, id: UserId, update: ProfileUpdate) -> StoreResult<User> {
        update.validate()?;
        let mut state = self.write();
        let mut user = state.users.get(&id).cloned().ok_or_else(|| StoreError::not_found("user"))?;
        user.apply(&update);
        state.check_user_unique(&user)?;
        state.users.insert(id, user.clone());
        Ok(user)
    }
}

#[async_trait]
impl CustomerStore for InMemoryStore {
    async fn list_customers(&self, filter: CustomerFilter, page: PageRequest) -> StoreResult<Page<Customer>> {
        let state = self.read();
        let items = state.customers.values().filter(|c| filter.matches(c)).cloned().collect();
        Ok(sorted_page(
            items,
            |a: &Customer, b: &Customer| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)),
            page,
        ))
    }

    async fn get_customer(&self, id: CustomerId) -> StoreResult<Customer> {
        let state = self.read();
        state.customers.get(&id).cloned().ok_or_else(|| StoreError::not_found("customer"))
    }

    async fn customer_for_user(&self, user_id: UserId) -> StoreResult<Option<Customer>> {
        let state = self.read();
        Ok(state.customers.values().find(|c| c.user_id == Some(user_id)).cloned())
    }

    async fn ensure_customer(&self, user_id: UserId, mut fallback: Customer) -> StoreResult<Customer> {
        let mut state = self.write();
        if let Some(existing) = state.customers.values().find(|c| c.user_id == Some(user_id)) {
            return Ok(existing.clone());
        }
        if !state.users.contains_key(&user_id) {
            return Err(StoreError::not_found("user"));
        }
        fallback.user_id = Some(user_id);
        state.customers.insert(fallback.id, fallback.clone());
        Ok(fallback)
    }

    async fn create_customer(&self, customer: Customer) -> StoreResult<Customer> {
        let mut state = self.write();
        state.check_customer_link(&customer)?;
        state.customers.insert(customer.id, customer.clone());
        Ok(customer)
    }

    async fn update_customer(&self, id: CustomerId, patch: CustomerPatch, now: DateTime<Utc>) -> StoreResult<Customer> {
        let mut state = self.write();
        let mut customer = state
            .customers
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("customer"))?;
        let relinked = patch.user.is_some();
        customer.apply(patch, now)?;
        if relinked {
            state.check_customer_link(&customer)?;
        }
        state.customers.insert(id, customer.clone());
        Ok(customer)
    }

    async fn delete_customer(&self, id: CustomerId) -> StoreResult<()> {
        let mut state = self.write();
        if state.customers.remove(&id).is_none() {
            return Err(StoreError::not_found("customer"));
        }
        state.carts.retain(|_, c| c.customer_id != Some(id));
        for order in state.orders.values_mut().filter(|o| o.customer_id == Some(id)) {
            order.customer_id = None;
        }
        for review in state.reviews.values_mut().filter(|r| r.customer_id == Some(id)) {
            review.customer_id = None;
        }
        Ok(())
    }
}

fn protected(what: &str) -> StoreError {
    DomainError::conflict(protected_message(what)).into()
}

#[cfg(test)]
mod tests;
