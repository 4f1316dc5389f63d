use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::{
    extract::{Extension, Path, Query},
    routing::get,
    Json, Router,
};
use chrono::Utc;

use storefront_auth::Permission;
use storefront_core::{CustomerId, DomainError};
use storefront_infra::CustomerStore;
use storefront_sales::{Customer, CustomerDraft, CustomerPatch};

use crate::app::dto::{self, CustomerQuery, Paging};
use crate::app::routes::common::{ApiResult, created, existing_customer, no_content, ok};
use crate::app::services::AppServices;
use crate::context::Caller;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_customers).post(create_customer))
        .route("/me", get(my_customer))
        .route("/:id", get(get_customer).patch(update_customer).delete(delete_customer))
}

pub async fn list_customers(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<Caller>,
    paging: Result<Query<Paging>, QueryRejection>,
    query: Result<Query<CustomerQuery>, QueryRejection>,
) -> ApiResult {
    caller.require(&Permission::CUSTOMERS_MANAGE)?;
    let (Query(paging), Query(query)) = (paging?, query?);
    let page = paging.request(services.default_page_size())?;
    ok(services.store.list_customers(query.into_filter(), page).await?)
}

pub async fn create_customer(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<Caller>,
    body: Result<Json<CustomerDraft>, JsonRejection>,
) -> ApiResult {
    caller.require(&Permission::CUSTOMERS_MANAGE)?;
    let Json(draft) = body?;
    let customer = Customer::create(draft, Utc::now())?;
    created(services.store.create_customer(customer).await?)
}

/// The caller's own profile; 404 until one exists.
pub async fn my_customer(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<Caller>,
) -> ApiResult {
    let principal = caller.require_auth()?;
    let customer = existing_customer(&services, principal)
        .await?
        .ok_or_else(|| DomainError::not_found("customer"))?;
    ok(customer)
}

pub async fn get_customer(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
) -> ApiResult {
    caller.require(&Permission::CUSTOMERS_MANAGE)?;
    let id: CustomerId = dto::parse_id(&id)?;
    ok(services.store.get_customer(id).await?)
}

pub async fn update_customer(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
    body: Result<Json<CustomerPatch>, JsonRejection>,
) -> ApiResult {
    caller.require(&Permission::CUSTOMERS_MANAGE)?;
    let id: CustomerId = dto::parse_id(&id)?;
    let Json(patch) = body?;
    ok(services.store.update_customer(id, patch, Utc::now()).await?)
}

pub async fn delete_customer(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
) -> ApiResult {
    caller.require(&Permission::CUSTOMERS_MANAGE)?;
    let id: CustomerId = dto::parse_id(&id)?;
    services.store.delete_customer(id).await?;
    no_content()
}
