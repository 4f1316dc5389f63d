use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::{
    extract::{Extension, Path, Query},
    routing::get,
    Json, Router,
};
use chrono::Utc;

use storefront_auth::Permission;
use storefront_catalog::{
    Product, ProductDraft, ProductPatch, ProductSort, Review, ReviewDraft, ReviewFilter, ReviewSort, VariantFilter,
    VariantSort,
};
use storefront_core::{Ordering, ProductId};
use storefront_infra::CatalogStore;

use crate::app::dto::{self, Paging, ProductQuery};
use crate::app::routes::common::{ApiResult, created, current_customer, no_content, ok};
use crate::app::services::AppServices;
use crate::context::Caller;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_products).post(create_product))
        .route("/:id", get(get_product).patch(update_product).delete(delete_product))
        .route("/:id/variants", get(product_variants))
        .route("/:id/reviews", get(product_reviews).post(review_product))
}

/// Staff see every status; everyone else only active products.
fn active_only(caller: &Caller) -> bool {
    !caller.is_staff()
}

pub async fn list_products(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<Caller>,
    paging: Result<Query<Paging>, QueryRejection>,
    query: Result<Query<ProductQuery>, QueryRejection>,
) -> ApiResult {
    let (Query(paging), Query(query)) = (paging?, query?);
    let page = paging.request(services.default_page_size())?;
    let ordering = paging.ordering(ProductSort::lookup, ProductSort::default_ordering())?;
    let filter = query.into_filter(active_only(&caller))?;
    ok(services.store.list_products(filter, ordering, page).await?)
}

pub async fn create_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<Caller>,
    body: Result<Json<ProductDraft>, JsonRejection>,
) -> ApiResult {
    caller.require(&Permission::CATALOG_WRITE)?;
    let Json(draft) = body?;
    let product = Product::create(draft, Utc::now())?;
    let detail = services.store.create_product(product).await?;
    tracing::info!(product_id = %detail.product.id, slug = %detail.product.slug, "product created");
    created(detail)
}

pub async fn get_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
) -> ApiResult {
    let id: ProductId = dto::parse_id(&id)?;
    ok(services.store.get_product(id, active_only(&caller)).await?)
}

pub async fn update_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
    body: Result<Json<ProductPatch>, JsonRejection>,
) -> ApiResult {
    caller.require(&Permission::CATALOG_WRITE)?;
    let id: ProductId = dto::parse_id(&id)?;
    let Json(patch) = body?;
    ok(services.store.update_product(id, patch, Utc::now()).await?)
}

pub async fn delete_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
) -> ApiResult {
    caller.require(&Permission::CATALOG_WRITE)?;
    let id: ProductId = dto::parse_id(&id)?;
    services.store.delete_product(id).await?;
    no_content()
}

pub async fn product_variants(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
    paging: Result<Query<Paging>, QueryRejection>,
) -> ApiResult {
    let id: ProductId = dto::parse_id(&id)?;
    let Query(paging) = paging?;
    let page = paging.request(services.default_page_size())?;
    let ordering = paging.ordering(VariantSort::lookup, Ordering::asc(VariantSort::Sku))?;

    // Hidden products hide their variants too.
    services.store.get_product(id, active_only(&caller)).await?;

    let filter = VariantFilter {
        product: Some(id),
        search: None,
    };
    ok(services.store.list_variants(filter, ordering, page).await?)
}

pub async fn product_reviews(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
    paging: Result<Query<Paging>, QueryRejection>,
) -> ApiResult {
    let id: ProductId = dto::parse_id(&id)?;
    let Query(paging) = paging?;
    let page = paging.request(services.default_page_size())?;
    let ordering = paging.ordering(ReviewSort::lookup, ReviewSort::default_ordering())?;

    services.store.get_product(id, active_only(&caller)).await?;

    let filter = ReviewFilter {
        product: Some(id),
        rating: None,
    };
    ok(services.store.list_reviews(filter, ordering, page).await?)
}

pub async fn review_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
    body: Result<Json<ReviewDraft>, JsonRejection>,
) -> ApiResult {
    let principal = caller.require_auth()?;
    let id: ProductId = dto::parse_id(&id)?;
    let Json(draft) = body?;

    services.store.get_product(id, active_only(&caller)).await?;
    let customer = current_customer(&services, principal).await?;

    let review = Review::create(id, customer.id, draft, Utc::now())?;
    created(services.store.create_review(review).await?)
}
