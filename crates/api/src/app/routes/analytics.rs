use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::{
    extract::{Extension, Path, Query},
    routing::get,
    Json, Router,
};
use chrono::Utc;

use storefront_analytics::{AnalyticsSnapshot, SnapshotDraft, SnapshotSort};
use storefront_auth::Permission;
use storefront_core::SnapshotId;
use storefront_infra::AnalyticsStore;

use crate::app::dto::{self, Paging, SnapshotQuery};
use crate::app::routes::common::{ApiResult, created, no_content, ok};
use crate::app::services::AppServices;
use crate::context::Caller;

pub fn router() -> Router {
    Router::new()
        .route("/snapshots", get(list_snapshots).post(create_snapshot))
        .route("/snapshots/metrics", get(metrics))
        .route("/snapshots/:id", get(get_snapshot).delete(delete_snapshot))
}

pub async fn list_snapshots(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<Caller>,
    paging: Result<Query<Paging>, QueryRejection>,
    query: Result<Query<SnapshotQuery>, QueryRejection>,
) -> ApiResult {
    caller.require(&Permission::ANALYTICS_READ)?;
    let (Query(paging), Query(query)) = (paging?, query?);
    let page = paging.request(services.default_page_size())?;
    let ordering = paging.ordering(SnapshotSort::lookup, SnapshotSort::default_ordering())?;
    ok(services.store.list_snapshots(query.into_filter(), ordering, page).await?)
}

pub async fn create_snapshot(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<Caller>,
    body: Result<Json<SnapshotDraft>, JsonRejection>,
) -> ApiResult {
    caller.require(&Permission::ANALYTICS_READ)?;
    let Json(draft) = body?;
    let snapshot = AnalyticsSnapshot::create(draft, Utc::now())?;
    created(services.store.create_snapshot(snapshot).await?)
}

pub async fn get_snapshot(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
) -> ApiResult {
    caller.require(&Permission::ANALYTICS_READ)?;
    let id: SnapshotId = dto::parse_id(&id)?;
    ok(services.store.get_snapshot(id).await?)
}

pub async fn delete_snapshot(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
) -> ApiResult {
    caller.require(&Permission::ANALYTICS_READ)?;
    let id: SnapshotId = dto::parse_id(&id)?;
    services.store.delete_snapshot(id).await?;
    no_content()
}

/// Latest value per tracked metric.
pub async fn metrics(Extension(services): Extension<Arc<AppServices>>, Extension(caller): Extension<Caller>) -> ApiResult {
    caller.require(&Permission::ANALYTICS_READ)?;
    ok(services.store.metrics().await?)
}
