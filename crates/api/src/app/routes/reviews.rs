use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::{
    extract::{Extension, Path, Query},
    routing::get,
    Json, Router,
};
use chrono::Utc;

use storefront_auth::{Permission, authorize};
use storefront_catalog::{Review, ReviewDraft, ReviewSort};
use storefront_core::{DomainError, ReviewId};
use storefront_infra::CatalogStore;

use crate::app::dto::{self, Paging, ReviewQuery};
use crate::app::routes::common::{ApiResult, created, current_customer, existing_customer, no_content, ok};
use crate::app::services::AppServices;
use crate::context::Caller;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_reviews).post(create_review))
        .route("/:id", get(get_review).delete(delete_review))
}

pub async fn list_reviews(
    Extension(services): Extension<Arc<AppServices>>,
    paging: Result<Query<Paging>, QueryRejection>,
    query: Result<Query<ReviewQuery>, QueryRejection>,
) -> ApiResult {
    let (Query(paging), Query(query)) = (paging?, query?);
    let page = paging.request(services.default_page_size())?;
    let ordering = paging.ordering(ReviewSort::lookup, ReviewSort::default_ordering())?;
    ok(services.store.list_reviews(query.into_filter()?, ordering, page).await?)
}

pub async fn create_review(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<Caller>,
    body: Result<Json<ReviewDraft>, JsonRejection>,
) -> ApiResult {
    let principal = caller.require_auth()?;
    let Json(draft) = body?;
    let product = draft
        .product
        .ok_or_else(|| DomainError::field("product", "This field is required."))?;

    let customer = current_customer(&services, principal).await?;
    let review = Review::create(product, customer.id, draft, Utc::now())?;
    created(services.store.create_review(review).await?)
}

pub async fn get_review(Extension(services): Extension<Arc<AppServices>>, Path(id): Path<String>) -> ApiResult {
    let id: ReviewId = dto::parse_id(&id)?;
    ok(services.store.get_review(id).await?)
}

/// Authors may remove their own reviews; moderators any review.
pub async fn delete_review(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
) -> ApiResult {
    let principal = caller.require_auth()?;
    let id: ReviewId = dto::parse_id(&id)?;
    let view = services.store.get_review(id).await?;

    if authorize(principal, &Permission::REVIEWS_MODERATE).is_err() {
        let customer = existing_customer(&services, principal).await?;
        if !view.review.is_owned_by(customer.map(|c| c.id)) {
            return Err(DomainError::forbidden("You do not have permission to perform this action.").into());
        }
    }

    services.store.delete_review(id).await?;
    no_content()
}
