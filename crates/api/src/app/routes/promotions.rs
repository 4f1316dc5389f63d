use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::{
    extract::{Extension, Path, Query},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde_json::json;

use storefront_auth::Permission;
use storefront_core::{DomainError, PromotionId};
use storefront_infra::{CatalogStore, PricingStore};
use storefront_pricing::{PricingRule, Promotion, PromotionDraft, PromotionPatch, PromotionView, Quote};

use crate::app::dto::{self, ApplyPromotionRequest, Paging, PromotionQuery};
use crate::app::errors::ApiError;
use crate::app::routes::common::{ApiResult, created, no_content, ok};
use crate::app::services::AppServices;
use crate::context::Caller;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_promotions).post(create_promotion))
        .route("/apply", post(apply_promotion))
        .route("/:id", get(get_promotion).patch(update_promotion).delete(delete_promotion))
}

/// Look up `code` and check it can be redeemed right now.
pub async fn usable_promotion(services: &AppServices, code: &str) -> Result<(Promotion, PricingRule), ApiError> {
    let code = dto::required_code(code)?;
    let (promotion, rule) = services
        .store
        .find_promotion(code)
        .await?
        .ok_or_else(|| DomainError::not_found("promotion"))?;
    promotion.ensure_usable(&rule, Utc::now())?;
    Ok((promotion, rule))
}

pub async fn list_promotions(
    Extension(services): Extension<Arc<AppServices>>,
    paging: Result<Query<Paging>, QueryRejection>,
    query: Result<Query<PromotionQuery>, QueryRejection>,
) -> ApiResult {
    let (Query(paging), Query(query)) = (paging?, query?);
    let page = paging.request(services.default_page_size())?;
    ok(services.store.list_promotions(query.into_filter()?, page).await?)
}

pub async fn create_promotion(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<Caller>,
    body: Result<Json<PromotionDraft>, JsonRejection>,
) -> ApiResult {
    caller.require(&Permission::PRICING_MANAGE)?;
    let Json(draft) = body?;
    let promotion = Promotion::create(draft)?;
    created(services.store.create_promotion(promotion).await?)
}

pub async fn get_promotion(Extension(services): Extension<Arc<AppServices>>, Path(id): Path<String>) -> ApiResult {
    let id: PromotionId = dto::parse_id(&id)?;
    ok(services.store.get_promotion(id).await?)
}

pub async fn update_promotion(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
    body: Result<Json<PromotionPatch>, JsonRejection>,
) -> ApiResult {
    caller.require(&Permission::PRICING_MANAGE)?;
    let id: PromotionId = dto::parse_id(&id)?;
    let Json(patch) = body?;
    ok(services.store.update_promotion(id, patch).await?)
}

pub async fn delete_promotion(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
) -> ApiResult {
    caller.require(&Permission::PRICING_MANAGE)?;
    let id: PromotionId = dto::parse_id(&id)?;
    services.store.delete_promotion(id).await?;
    no_content()
}

/// Preview a code, optionally quoting it against a set of lines. Nothing is
/// redeemed here; usage is only counted at checkout.
pub async fn apply_promotion(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<Caller>,
    body: Result<Json<ApplyPromotionRequest>, JsonRejection>,
) -> ApiResult {
    caller.require_auth()?;
    let Json(req) = body?;
    let (promotion, rule) = usable_promotion(&services, &req.code).await?;

    let quote = if req.items.is_empty() {
        None
    } else {
        let items = req.items.iter().map(|i| (i.variant, i.qty)).collect();
        let lines = services.store.price_lines(items).await?;
        Some(Quote::for_lines(&lines, Some(&rule))?)
    };

    let message = format!("Promotion {} applied successfully.", promotion.code);
    ok(json!({
        "discount_type": rule.rule_type,
        "discount_value": rule.value,
        "promotion": PromotionView::new(promotion, rule),
        "message": message,
        "quote": quote,
    }))
}
