use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::{
    extract::{Extension, Path, Query},
    routing::get,
    Json, Router,
};
use chrono::Utc;

use storefront_auth::Permission;
use storefront_core::MovementId;
use storefront_infra::InventoryStore;
use storefront_inventory::MovementDraft;

use crate::app::dto::{self, MovementQuery, Paging};
use crate::app::routes::common::{ApiResult, created, ok};
use crate::app::services::AppServices;
use crate::context::Caller;

pub fn router() -> Router {
    Router::new()
        .route("/movements", get(list_movements).post(record_movement))
        .route("/movements/:id", get(get_movement))
}

pub async fn list_movements(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<Caller>,
    paging: Result<Query<Paging>, QueryRejection>,
    query: Result<Query<MovementQuery>, QueryRejection>,
) -> ApiResult {
    caller.require(&Permission::INVENTORY_MANAGE)?;
    let (Query(paging), Query(query)) = (paging?, query?);
    let page = paging.request(services.default_page_size())?;
    ok(services.store.list_movements(query.into_filter()?, page).await?)
}

pub async fn get_movement(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
) -> ApiResult {
    caller.require(&Permission::INVENTORY_MANAGE)?;
    let id: MovementId = dto::parse_id(&id)?;
    ok(services.store.get_movement(id).await?)
}

/// Record a manual movement; the variant's stock moves with it.
pub async fn record_movement(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<Caller>,
    body: Result<Json<MovementDraft>, JsonRejection>,
) -> ApiResult {
    caller.require(&Permission::INVENTORY_MANAGE)?;
    let Json(draft) = body?;
    let movement = draft.into_movement(Utc::now())?;
    created(services.store.record_movement(movement).await?)
}
