use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::{
    extract::{Extension, Path, Query},
    routing::get,
    Json, Router,
};

use storefront_auth::Permission;
use storefront_catalog::{Variant, VariantDraft, VariantPatch, VariantSort};
use storefront_core::{Ordering, VariantId};
use storefront_infra::CatalogStore;

use crate::app::dto::{self, Paging, VariantQuery};
use crate::app::routes::common::{ApiResult, created, no_content, ok};
use crate::app::services::AppServices;
use crate::context::Caller;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_variants).post(create_variant))
        .route("/:id", get(get_variant).patch(update_variant).delete(delete_variant))
}

pub async fn list_variants(
    Extension(services): Extension<Arc<AppServices>>,
    paging: Result<Query<Paging>, QueryRejection>,
    query: Result<Query<VariantQuery>, QueryRejection>,
) -> ApiResult {
    let (Query(paging), Query(query)) = (paging?, query?);
    let page = paging.request(services.default_page_size())?;
    let ordering = paging.ordering(VariantSort::lookup, Ordering::asc(VariantSort::Sku))?;
    ok(services.store.list_variants(query.into_filter()?, ordering, page).await?)
}

pub async fn create_variant(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<Caller>,
    body: Result<Json<VariantDraft>, JsonRejection>,
) -> ApiResult {
    caller.require(&Permission::CATALOG_WRITE)?;
    let Json(draft) = body?;
    let variant = Variant::create(draft)?;
    created(services.store.create_variant(variant).await?)
}

pub async fn get_variant(Extension(services): Extension<Arc<AppServices>>, Path(id): Path<String>) -> ApiResult {
    let id: VariantId = dto::parse_id(&id)?;
    ok(services.store.get_variant(id).await?)
}

pub async fn update_variant(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
    body: Result<Json<VariantPatch>, JsonRejection>,
) -> ApiResult {
    caller.require(&Permission::CATALOG_WRITE)?;
    let id: VariantId = dto::parse_id(&id)?;
    let Json(patch) = body?;
    ok(services.store.update_variant(id, patch).await?)
}

pub async fn delete_variant(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
) -> ApiResult {
    caller.require(&Permission::CATALOG_WRITE)?;
    let id: VariantId = dto::parse_id(&id)?;
    services.store.delete_variant(id).await?;
    no_content()
}
