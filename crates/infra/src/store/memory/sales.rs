use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use storefront_core::{CartId, CartItemId, CustomerId, DomainError, OrderId, Ordering, Page, PageRequest, VariantId};
use storefront_pricing::PricedLine;
use storefront_sales::{
    Cart, CartItemView, CartStatus, CartView, CheckoutRequest, LockedVariant, OrderFilter, OrderPatch, OrderSort,
    OrderView, plan_checkout,
};

use super::{InMemoryStore, State, sorted_page};
use crate::error::{StoreError, StoreResult};
use crate::store::{CartQuote, SalesStore, invalid_pk};

impl State {
    /// The customer's open cart, opened on demand.
    fn open_cart_mut(&mut self, customer: CustomerId, now: DateTime<Utc>) -> &mut Cart {
        let id = match self.open_cart_id(customer) {
            Some(id) => id,
            None => {
                let cart = Cart::open(customer, now);
                let id = cart.id;
                self.carts.insert(id, cart);
                id
            }
        };
        self.carts.entry(id).or_insert_with(|| Cart::open(customer, now))
    }

    fn priced_lines(&self, cart: &Cart) -> Vec<PricedLine> {
        cart.items
            .iter()
            .filter_map(|item| {
                let variant = self.variants.get(&item.variant_id)?;
                let product = self.products.get(&variant.product_id)?;
                Some(PricedLine {
                    variant_id: item.variant_id,
                    product_id: product.id,
                    category_id: product.category_id,
                    unit_price: item.price_at_add,
                    qty: item.qty,
                })
            })
            .collect()
    }

    fn locked_variants(&self, cart: &Cart) -> HashMap<VariantId, LockedVariant> {
        cart.items
            .iter()
            .filter_map(|item| {
                let variant = self.variants.get(&item.variant_id)?;
                let product = self.products.get(&variant.product_id)?;
                Some((
                    variant.id,
                    LockedVariant {
                        variant: variant.clone(),
                        category_id: product.category_id,
                    },
                ))
            })
            .collect()
    }
}

#[async_trait]
impl SalesStore for InMemoryStore {
    async fn list_carts(&self, customer: Option<CustomerId>, page: PageRequest) -> StoreResult<Page<CartView>> {
        let state = self.read();
        let matching = state
            .carts
            .values()
            .filter(|c| customer.is_none_or(|id| c.customer_id == Some(id)))
            .cloned()
            .collect();
        let page = sorted_page(
            matching,
            |a: &Cart, b: &Cart| b.updated_at.cmp(&a.updated_at).then_with(|| b.id.cmp(&a.id)),
            page,
        );
        Ok(page.map(|c| state.cart_view(c)))
    }

    async fn get_cart(&self, id: CartId) -> StoreResult<CartView> {
        let state = self.read();
        let cart = state.carts.get(&id).cloned().ok_or_else(|| StoreError::not_found("cart"))?;
        Ok(state.cart_view(cart))
    }

    async fn open_cart(&self, customer: CustomerId, now: DateTime<Utc>) -> StoreResult<CartView> {
        let mut state = self.write();
        let cart = state.open_cart_mut(customer, now).clone();
        Ok(state.cart_view(cart))
    }

    async fn add_cart_item(
        &self,
        customer: CustomerId,
        variant: VariantId,
        qty: i64,
        now: DateTime<Utc>,
    ) -> StoreResult<CartItemView> {
        let mut state = self.write();
        let variant = state
            .variants
            .get(&variant)
            .cloned()
            .ok_or_else(|| invalid_pk("variant", variant))?;
        let item = state.open_cart_mut(customer, now).add_item(&variant, qty, now)?;
        Ok(CartItemView::new(item, Some(variant)))
    }

    async fn update_cart_item(
        &self,
        customer: CustomerId,
        item: CartItemId,
        qty: i64,
        now: DateTime<Utc>,
    ) -> StoreResult<CartItemView> {
        let mut state = self.write();
        let cart_id = state
            .open_cart_id(customer)
            .ok_or_else(|| StoreError::not_found("cart item"))?;
        let variant_id = state
            .carts
            .get(&cart_id)
            .and_then(|c| c.item(item))
            .map(|i| i.variant_id)
            .ok_or_else(|| StoreError::not_found("cart item"))?;
        let variant = state
            .variants
            .get(&variant_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("variant"))?;
        let cart = state
            .carts
            .get_mut(&cart_id)
            .ok_or_else(|| StoreError::not_found("cart item"))?;
        let updated = cart.update_item_qty(item, qty, &variant, now)?;
        Ok(CartItemView::new(updated, Some(variant)))
    }

    async fn remove_cart_item(&self, customer: CustomerId, item: CartItemId, now: DateTime<Utc>) -> StoreResult<()> {
        let mut state = self.write();
        let cart_id = state
            .open_cart_id(customer)
            .ok_or_else(|| StoreError::not_found("cart item"))?;
        let cart = state
            .carts
            .get_mut(&cart_id)
            .ok_or_else(|| StoreError::not_found("cart item"))?;
        cart.remove_item(item, now)?;
        Ok(())
    }

    async fn quote_cart(&self, customer: CustomerId, now: DateTime<Utc>) -> StoreResult<CartQuote> {
        let mut state = self.write();
        let cart = state.open_cart_mut(customer, now).clone();
        let lines = state.priced_lines(&cart);
        Ok(CartQuote {
            cart: state.cart_view(cart),
            lines,
        })
    }

    async fn checkout(&self, customer: CustomerId, request: CheckoutRequest, now: DateTime<Utc>) -> StoreResult<OrderView> {
        let mut state = self.write();
        let cart = match state.open_cart_id(customer).and_then(|id| state.carts.get(&id)) {
            Some(cart) => cart.clone(),
            None => Cart::open(customer, now),
        };
        let variants = state.locked_variants(&cart);
        let promotion = request.promotion_code().and_then(|code| {
            let promo = state.promotions.values().find(|p| p.matches_code(code))?;
            let rule = state.rules.get(&promo.rule_id)?;
            Some((promo.clone(), rule.clone()))
        });

        let plan = plan_checkout(
            &cart,
            &variants,
            &request,
            promotion.as_ref().map(|(p, r)| (p, r)),
            now,
        )?;

        for change in &plan.stock {
            if let Some(v) = state.variants.get_mut(&change.variant_id) {
                v.stock = change.stock;
            }
        }
        for movement in plan.movements {
            state.movements.insert(movement.id, movement);
        }
        if let Some(promo) = plan.promotion {
            state.promotions.insert(promo.id, promo);
        }
        if let Some(stored) = state.carts.get_mut(&cart.id) {
            stored.status = CartStatus::Converted;
            stored.updated_at = now;
        }
        let order = plan.order;
        tracing::debug!(order_id = %order.id, lines = order.items.len(), "order stored");
        state.orders.insert(order.id, order.clone());
        Ok(state.order_view(order))
    }

    async fn list_orders(
        &self,
        filter: OrderFilter,
        ordering: Ordering<OrderSort>,
        page: PageRequest,
    ) -> StoreResult<Page<OrderView>> {
        let state = self.read();
        let matching = state.orders.values().filter(|o| filter.matches(o)).cloned().collect();
        let page = sorted_page(
            matching,
            |a: &storefront_sales::Order, b: &storefront_sales::Order| OrderSort::compare(&ordering, a, b),
            page,
        );
        Ok(page.map(|o| state.order_view(o)))
    }

    async fn get_order(&self, id: OrderId) -> StoreResult<OrderView> {
        let state = self.read();
        let order = state.orders.get(&id).cloned().ok_or_else(|| StoreError::not_found("order"))?;
        Ok(state.order_view(order))
    }

    async fn update_order(&self, id: OrderId, patch: OrderPatch, now: DateTime<Utc>) -> StoreResult<OrderView> {
        let mut state = self.write();
        let mut order = state.orders.get(&id).cloned().ok_or_else(|| StoreError::not_found("order"))?;
        let previous = order.status;
        order.apply(patch, now)?;
        if order.status != previous {
            tracing::info!(
                order_id = %id,
                from = previous.as_str(),
                to = order.status.as_str(),
                "order status changed"
            );
        }
        state.orders.insert(id, order.clone());
        Ok(state.order_view(order))
    }

    async fn delete_order(&self, id: OrderId) -> StoreResult<()> {
        let mut state = self.write();
        if state.orders.remove(&id).is_none() {
            return Err(DomainError::not_found("order").into());
        }
        Ok(())
    }
}
