use async_trait::async_trait;

use storefront_core::{MovementId, Page, PageRequest};
use storefront_inventory::{InventoryMovement, MovementFilter, MovementView, apply_to_stock};

use super::{InMemoryStore, State, sorted_page};
use crate::error::{StoreError, StoreResult};
use crate::store::{InventoryStore, invalid_pk};

impl State {
    fn movement_view(&self, movement: InventoryMovement) -> MovementView {
        let variant_sku = self
            .variants
            .get(&movement.variant_id)
            .map(|v| v.sku.clone())
            .unwrap_or_default();
        MovementView { movement, variant_sku }
    }
}

#[async_trait]
impl InventoryStore for InMemoryStore {
    async fn list_movements(&self, filter: MovementFilter, page: PageRequest) -> StoreResult<Page<MovementView>> {
        let state = self.read();
        let matching = state.movements.values().filter(|m| filter.matches(m)).cloned().collect();
        let page = sorted_page(
            matching,
            |a: &InventoryMovement, b: &InventoryMovement| {
                b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id))
            },
            page,
        );
        Ok(page.map(|m| state.movement_view(m)))
    }

    async fn get_movement(&self, id: MovementId) -> StoreResult<MovementView> {
        let state = self.read();
        let movement = state
            .movements
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("inventory movement"))?;
        Ok(state.movement_view(movement))
    }

    async fn record_movement(&self, movement: InventoryMovement) -> StoreResult<MovementView> {
        let mut state = self.write();
        let variant = state
            .variants
            .get_mut(&movement.variant_id)
            .ok_or_else(|| invalid_pk("variant", movement.variant_id))?;
        variant.stock = apply_to_stock(variant.stock, movement.change)?;
        tracing::info!(
            variant_id = %movement.variant_id,
            change = movement.change,
            stock = variant.stock,
            reason = movement.reason.as_str(),
            "stock adjusted"
        );
        state.movements.insert(movement.id, movement.clone());
        Ok(state.movement_view(movement))
    }
}
