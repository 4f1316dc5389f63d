use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::{
    extract::{Extension, Path, Query},
    routing::get,
    Json, Router,
};
use chrono::Utc;

use storefront_auth::Permission;
use storefront_catalog::{Category, CategoryDraft, CategoryPatch, CategorySort};
use storefront_core::{CategoryId, Ordering};
use storefront_infra::CatalogStore;

use crate::app::dto::{self, CategoryQuery, Paging};
use crate::app::routes::common::{ApiResult, created, no_content, ok};
use crate::app::services::AppServices;
use crate::context::Caller;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_categories).post(create_category))
        .route("/:id", get(get_category).patch(update_category).delete(delete_category))
}

pub async fn list_categories(
    Extension(services): Extension<Arc<AppServices>>,
    paging: Result<Query<Paging>, QueryRejection>,
    query: Result<Query<CategoryQuery>, QueryRejection>,
) -> ApiResult {
    let (Query(paging), Query(query)) = (paging?, query?);
    let page = paging.request(services.default_page_size())?;
    let ordering = paging.ordering(CategorySort::lookup, Ordering::asc(CategorySort::Name))?;
    ok(services.store.list_categories(query.into_filter()?, ordering, page).await?)
}

pub async fn create_category(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<Caller>,
    body: Result<Json<CategoryDraft>, JsonRejection>,
) -> ApiResult {
    caller.require(&Permission::CATALOG_WRITE)?;
    let Json(draft) = body?;
    let category = Category::create(draft, Utc::now())?;
    created(services.store.create_category(category).await?)
}

pub async fn get_category(Extension(services): Extension<Arc<AppServices>>, Path(id): Path<String>) -> ApiResult {
    let id: CategoryId = dto::parse_id(&id)?;
    ok(services.store.get_category(id).await?)
}

pub async fn update_category(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
    body: Result<Json<CategoryPatch>, JsonRejection>,
) -> ApiResult {
    caller.require(&Permission::CATALOG_WRITE)?;
    let id: CategoryId = dto::parse_id(&id)?;
    let Json(patch) = body?;
    ok(services.store.update_category(id, patch).await?)
}

pub async fn delete_category(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
) -> ApiResult {
    caller.require(&Permission::CATALOG_WRITE)?;
    let id: CategoryId = dto::parse_id(&id)?;
    services.store.delete_category(id).await?;
    no_content()
}
