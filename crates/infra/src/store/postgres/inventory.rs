use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgConnection, Row};
use tracing::instrument;

use storefront_core::{MovementId, Page, PageRequest, VariantId};
use storefront_inventory::{InventoryMovement, MovementFilter, MovementView, apply_to_stock};

use super::PostgresStore;
use super::rows::movement_from_row;
use crate::error::{StoreError, StoreResult, map_sqlx_error};
use crate::store::{InventoryStore, invalid_pk};

const MOVEMENT_SELECT: &str = "SELECT m.*, v.sku AS variant_sku";
const MOVEMENT_FROM: &str = "FROM inventory_movements m JOIN variants v ON v.id = m.variant_id";

fn movement_view_from_row(row: &PgRow) -> Result<MovementView, sqlx::Error> {
    Ok(MovementView {
        movement: movement_from_row(row)?,
        variant_sku: row.try_get("variant_sku")?,
    })
}

pub(super) async fn insert_movement(conn: &mut PgConnection, movement: &InventoryMovement) -> StoreResult<()> {
    sqlx::query(
        r#"
        INSERT INTO inventory_movements (id, variant_id, change, reason, metadata, created_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(movement.id.as_uuid())
    .bind(movement.variant_id.as_uuid())
    .bind(movement.change)
    .bind(movement.reason.as_str())
    .bind(Json(&movement.metadata))
    .bind(movement.created_at)
    .execute(conn)
    .await
    .map_err(|e| map_sqlx_error("insert_movement", e))?;
    Ok(())
}

pub(super) async fn set_stock(conn: &mut PgConnection, variant: VariantId, stock: i64) -> StoreResult<()> {
    sqlx::query(r#"UPDATE variants SET stock = $2 WHERE id = $1"#)
        .bind(variant.as_uuid())
        .bind(stock)
        .execute(conn)
        .await
        .map_err(|e| map_sqlx_error("set_stock", e))?;
    Ok(())
}

#[async_trait]
impl InventoryStore for PostgresStore {
    #[instrument(skip(self, filter), err)]
    async fn list_movements(&self, filter: MovementFilter, page: PageRequest) -> StoreResult<Page<MovementView>> {
        self.fetch_page(
            "list_movements",
            MOVEMENT_SELECT,
            MOVEMENT_FROM,
            |q| {
                if let Some(variant) = filter.variant {
                    q.push(" AND m.variant_id = ");
                    q.push_bind(*variant.as_uuid());
                }
                if let Some(reason) = filter.reason {
                    q.push(" AND m.reason = ");
                    q.push_bind(reason.as_str());
                }
            },
            "m.created_at DESC, m.id DESC",
            page,
            movement_view_from_row,
        )
        .await
    }

    #[instrument(skip(self), fields(movement_id = %id), err)]
    async fn get_movement(&self, id: MovementId) -> StoreResult<MovementView> {
        let sql = format!("{MOVEMENT_SELECT} {MOVEMENT_FROM} WHERE m.id = $1");
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_movement", e))?
            .ok_or_else(|| StoreError::not_found("inventory movement"))?;
        movement_view_from_row(&row).map_err(|e| map_sqlx_error("get_movement", e))
    }

    #[instrument(skip(self, movement), fields(variant_id = %movement.variant_id, change = movement.change), err)]
    async fn record_movement(&self, movement: InventoryMovement) -> StoreResult<MovementView> {
        let mut tx = self.pool.begin().await.map_err(|e| map_sqlx_error("record_movement", e))?;
        let row = sqlx::query(r#"SELECT sku, stock FROM variants WHERE id = $1 FOR UPDATE"#)
            .bind(movement.variant_id.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("record_movement", e))?
            .ok_or_else(|| invalid_pk("variant", movement.variant_id))?;
        let variant_sku: String = row.try_get("sku").map_err(|e| map_sqlx_error("record_movement", e))?;
        let stock: i64 = row.try_get("stock").map_err(|e| map_sqlx_error("record_movement", e))?;

        let stock = apply_to_stock(stock, movement.change)?;
        set_stock(&mut tx, movement.variant_id, stock).await?;
        insert_movement(&mut tx, &movement).await?;
        tx.commit().await.map_err(|e| map_sqlx_error("record_movement", e))?;

        tracing::info!(
            variant_id = %movement.variant_id,
            change = movement.change,
            stock,
            reason = movement.reason.as_str(),
            "stock adjusted"
        );
        Ok(MovementView { movement, variant_sku })
    }
}
