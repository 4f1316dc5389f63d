use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde::Serialize;

use storefront_auth::Principal;
use storefront_infra::{CustomerStore, UserStore};
use storefront_sales::Customer;

use crate::app::errors::ApiError;
use crate::app::services::AppServices;

pub type ApiResult = Result<Response, ApiError>;

pub fn ok<T: Serialize>(body: T) -> ApiResult {
    Ok(Json(body).into_response())
}

pub fn created<T: Serialize>(body: T) -> ApiResult {
    Ok((StatusCode::CREATED, Json(body)).into_response())
}

pub fn no_content() -> ApiResult {
    Ok(StatusCode::NO_CONTENT.into_response())
}

/// The caller's customer profile, created from the account when missing.
pub async fn current_customer(services: &AppServices, principal: &Principal) -> Result<Customer, ApiError> {
    if let Some(customer) = services.store.customer_for_user(principal.user_id()).await? {
        return Ok(customer);
    }

    let user = services.store.get_user(principal.user_id()).await?;
    let name = match user.full_name() {
        n if n.is_empty() => user.username.clone(),
        n => n,
    };
    let fallback = Customer::for_user(user.id, &user.email, &name, Utc::now());
    Ok(services.store.ensure_customer(user.id, fallback).await?)
}

/// The caller's existing customer profile, if any; never creates one.
pub async fn existing_customer(services: &AppServices, principal: &Principal) -> Result<Option<Customer>, ApiError> {
    Ok(services.store.customer_for_user(principal.user_id()).await?)
}
