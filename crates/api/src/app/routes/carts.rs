use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::{
    extract::{Extension, Path, Query},
    routing::{get, patch, post},
    Json, Router,
};
use chrono::Utc;
use serde_json::json;

use storefront_core::{CartId, CartItemId, DomainError, Page};
use storefront_infra::{CartQuote, SalesStore};
use storefront_pricing::{PromotionView, Quote};
use storefront_sales::CheckoutRequest;

use crate::app::dto::{self, AddCartItemRequest, Paging, PromotionCodeRequest, UpdateCartItemRequest};
use crate::app::routes::common::{ApiResult, created, current_customer, existing_customer, no_content, ok};
use crate::app::routes::promotions::usable_promotion;
use crate::app::services::AppServices;
use crate::context::Caller;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_carts))
        .route("/me", get(my_cart))
        .route("/me/items", post(add_item))
        .route("/me/items/:item_id", patch(update_item).delete(remove_item))
        .route("/me/apply-promotion", post(apply_promotion))
        .route("/me/checkout", post(checkout))
        .route("/:id", get(get_cart))
}

/// Staff see every cart; customers only their own.
pub async fn list_carts(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<Caller>,
    paging: Result<Query<Paging>, QueryRejection>,
) -> ApiResult {
    let principal = caller.require_auth()?;
    let Query(paging) = paging?;
    let page = paging.request(services.default_page_size())?;

    if caller.is_staff() {
        return ok(services.store.list_carts(None, page).await?);
    }
    match existing_customer(&services, principal).await? {
        Some(customer) => ok(services.store.list_carts(Some(customer.id), page).await?),
        None => ok(Page::<()>::paginate(Vec::new(), page)),
    }
}

pub async fn get_cart(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
) -> ApiResult {
    let principal = caller.require_auth()?;
    let id: CartId = dto::parse_id(&id)?;
    let cart = services.store.get_cart(id).await?;

    if !caller.is_staff() {
        let customer = existing_customer(&services, principal).await?;
        if customer.map(|c| c.id).is_none_or(|c| cart.customer != Some(c)) {
            return Err(DomainError::not_found("cart").into());
        }
    }
    ok(cart)
}

pub async fn my_cart(Extension(services): Extension<Arc<AppServices>>, Extension(caller): Extension<Caller>) -> ApiResult {
    let principal = caller.require_auth()?;
    let customer = current_customer(&services, principal).await?;
    ok(services.store.open_cart(customer.id, Utc::now()).await?)
}

pub async fn add_item(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<Caller>,
    body: Result<Json<AddCartItemRequest>, JsonRejection>,
) -> ApiResult {
    let principal = caller.require_auth()?;
    let Json(req) = body?;
    let customer = current_customer(&services, principal).await?;
    created(services.store.add_cart_item(customer.id, req.variant, req.qty, Utc::now()).await?)
}

pub async fn update_item(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<Caller>,
    Path(item_id): Path<String>,
    body: Result<Json<UpdateCartItemRequest>, JsonRejection>,
) -> ApiResult {
    let principal = caller.require_auth()?;
    let item_id: CartItemId = dto::parse_id(&item_id)?;
    let Json(req) = body?;
    let customer = current_customer(&services, principal).await?;
    ok(services.store.update_cart_item(customer.id, item_id, req.qty, Utc::now()).await?)
}

pub async fn remove_item(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<Caller>,
    Path(item_id): Path<String>,
) -> ApiResult {
    let principal = caller.require_auth()?;
    let item_id: CartItemId = dto::parse_id(&item_id)?;
    let customer = current_customer(&services, principal).await?;
    services.store.remove_cart_item(customer.id, item_id, Utc::now()).await?;
    no_content()
}

/// Quote a promotion code against the open cart without redeeming it.
pub async fn apply_promotion(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<Caller>,
    body: Result<Json<PromotionCodeRequest>, JsonRejection>,
) -> ApiResult {
    let principal = caller.require_auth()?;
    let Json(req) = body?;
    let (promotion, rule) = usable_promotion(&services, &req.code).await?;
    let customer = current_customer(&services, principal).await?;

    let CartQuote { cart, lines } = services.store.quote_cart(customer.id, Utc::now()).await?;
    let quote = Quote::for_lines(&lines, Some(&rule))?;

    ok(json!({
        "cart": cart,
        "promotion": PromotionView::new(promotion, rule),
        "subtotal": quote.subtotal,
        "discount": quote.discount,
        "total_after_discount": quote.grand_total,
    }))
}

pub async fn checkout(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<Caller>,
    body: Result<Json<CheckoutRequest>, JsonRejection>,
) -> ApiResult {
    let principal = caller.require_auth()?;
    let Json(req) = body?;
    let customer = current_customer(&services, principal).await?;

    let view = services.store.checkout(customer.id, req, Utc::now()).await?;
    tracing::info!(
        order_id = %view.order.id,
        order_number = %view.order.order_number.as_str(),
        customer_id = %customer.id,
        grand_total = view.order.grand_total.minor(),
        "checkout completed"
    );
    created(view)
}
