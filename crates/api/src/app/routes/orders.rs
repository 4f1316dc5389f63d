use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::{
    extract::{Extension, Path, Query},
    routing::get,
    Json, Router,
};
use chrono::Utc;

use storefront_auth::Permission;
use storefront_core::{DomainError, OrderId, Page};
use storefront_infra::SalesStore;
use storefront_sales::{OrderPatch, OrderSort};

use crate::app::dto::{self, OrderQuery, Paging};
use crate::app::routes::common::{ApiResult, existing_customer, no_content, ok};
use crate::app::services::AppServices;
use crate::context::Caller;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_orders))
        .route("/me", get(my_orders))
        .route("/:id", get(get_order).patch(update_order).delete(delete_order))
}

async fn orders_page(
    services: &AppServices,
    caller: &Caller,
    paging: Paging,
    query: OrderQuery,
    own_only: bool,
) -> ApiResult {
    let principal = caller.require_auth()?;
    let page = paging.request(services.default_page_size())?;
    let ordering = paging.ordering(OrderSort::lookup, OrderSort::default_ordering())?;

    let customer = if caller.is_staff() && !own_only {
        None
    } else {
        match existing_customer(services, principal).await? {
            Some(customer) => Some(customer.id),
            None => return ok(Page::<()>::paginate(Vec::new(), page)),
        }
    };
    ok(services.store.list_orders(query.into_filter(customer)?, ordering, page).await?)
}

pub async fn list_orders(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<Caller>,
    paging: Result<Query<Paging>, QueryRejection>,
    query: Result<Query<OrderQuery>, QueryRejection>,
) -> ApiResult {
    let (Query(paging), Query(query)) = (paging?, query?);
    orders_page(&services, &caller, paging, query, false).await
}

pub async fn my_orders(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<Caller>,
    paging: Result<Query<Paging>, QueryRejection>,
    query: Result<Query<OrderQuery>, QueryRejection>,
) -> ApiResult {
    let (Query(paging), Query(query)) = (paging?, query?);
    orders_page(&services, &caller, paging, query, true).await
}

pub async fn get_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
) -> ApiResult {
    let principal = caller.require_auth()?;
    let id: OrderId = dto::parse_id(&id)?;
    let view = services.store.get_order(id).await?;

    if !caller.is_staff() {
        let customer = existing_customer(&services, principal).await?;
        if customer.map(|c| c.id).is_none_or(|c| view.order.customer_id != Some(c)) {
            return Err(DomainError::not_found("order").into());
        }
    }
    ok(view)
}

pub async fn update_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
    body: Result<Json<OrderPatch>, JsonRejection>,
) -> ApiResult {
    caller.require(&Permission::ORDERS_MANAGE)?;
    let id: OrderId = dto::parse_id(&id)?;
    let Json(patch) = body?;
    ok(services.store.update_order(id, patch, Utc::now()).await?)
}

pub async fn delete_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
) -> ApiResult {
    caller.require(&Permission::ORDERS_MANAGE)?;
    let id: OrderId = dto::parse_id(&id)?;
    services.store.delete_order(id).await?;
    no_content()
}
