use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::{
    extract::{Extension, Path, Query},
    routing::get,
    Json, Router,
};

use storefront_auth::Permission;
use storefront_core::PricingRuleId;
use storefront_infra::PricingStore;
use storefront_pricing::{PricingRule, PricingRuleDraft, PricingRulePatch};

use crate::app::dto::{self, Paging, PricingRuleQuery};
use crate::app::routes::common::{ApiResult, created, no_content, ok};
use crate::app::services::AppServices;
use crate::context::Caller;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_rules).post(create_rule))
        .route("/:id", get(get_rule).patch(update_rule).delete(delete_rule))
}

pub async fn list_rules(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<Caller>,
    paging: Result<Query<Paging>, QueryRejection>,
    query: Result<Query<PricingRuleQuery>, QueryRejection>,
) -> ApiResult {
    caller.require(&Permission::PRICING_MANAGE)?;
    let (Query(paging), Query(query)) = (paging?, query?);
    let page = paging.request(services.default_page_size())?;
    ok(services.store.list_rules(query.into_filter()?, page).await?)
}

pub async fn create_rule(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<Caller>,
    body: Result<Json<PricingRuleDraft>, JsonRejection>,
) -> ApiResult {
    caller.require(&Permission::PRICING_MANAGE)?;
    let Json(draft) = body?;
    let rule = PricingRule::create(draft)?;
    created(services.store.create_rule(rule).await?)
}

pub async fn get_rule(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
) -> ApiResult {
    caller.require(&Permission::PRICING_MANAGE)?;
    let id: PricingRuleId = dto::parse_id(&id)?;
    ok(services.store.get_rule(id).await?)
}

pub async fn update_rule(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
    body: Result<Json<PricingRulePatch>, JsonRejection>,
) -> ApiResult {
    caller.require(&Permission::PRICING_MANAGE)?;
    let id: PricingRuleId = dto::parse_id(&id)?;
    let Json(patch) = body?;
    ok(services.store.update_rule(id, patch).await?)
}

pub async fn delete_rule(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
) -> ApiResult {
    caller.require(&Permission::PRICING_MANAGE)?;
    let id: PricingRuleId = dto::parse_id(&id)?;
    services.store.delete_rule(id).await?;
    no_content()
}
