use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::{
    extract::Extension,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde_json::json;

use storefront_auth::{ProfileUpdate, Registration, User, hash_password, verify_password};
use storefront_core::UserId;
use storefront_infra::UserStore;
use storefront_sales::Customer;

use crate::app::dto::{LoginRequest, RefreshRequest};
use crate::app::errors::ApiError;
use crate::app::routes::common::{ApiResult, created, ok};
use crate::app::services::AppServices;
use crate::context::Caller;

const BAD_CREDENTIALS: &str = "No active account found with the given credentials";

pub fn router() -> Router {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/refresh", post(refresh))
        .route("/me", get(me).patch(update_me))
}

pub async fn register(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<Registration>, JsonRejection>,
) -> ApiResult {
    let Json(registration) = body?;
    registration.validate()?;

    let now = Utc::now();
    let (first_name, last_name) = registration.split_name();
    let user = User {
        id: UserId::new(),
        username: registration.username.trim().to_string(),
        email: registration.email.trim().to_string(),
        password_hash: hash_password(&registration.password)?,
        first_name,
        last_name,
        is_staff: false,
        date_joined: now,
    };
    let mut customer = Customer::for_user(user.id, &user.email, registration.name.trim(), now);
    customer.phone = registration.phone();

    let (user, customer) = services.store.create_account(user, customer).await?;
    let tokens = services.jwt.issue_pair(&user, now)?;

    tracing::info!(user_id = %user.id, customer_id = %customer.id, username = %user.username, "user registered");

    created(json!({
        "user": user,
        "tokens": tokens,
        "message": "User registered successfully.",
    }))
}

pub async fn login(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> ApiResult {
    let Json(req) = body?;
    let user = services
        .store
        .find_user_by_username(req.username.trim())
        .await?
        .ok_or_else(|| ApiError::unauthorized(BAD_CREDENTIALS))?;

    if !verify_password(&user.password_hash, &req.password)? {
        tracing::info!(username = %user.username, "login rejected");
        return Err(ApiError::unauthorized(BAD_CREDENTIALS));
    }

    ok(services.jwt.issue_pair(&user, Utc::now())?)
}

pub async fn refresh(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<RefreshRequest>, JsonRejection>,
) -> ApiResult {
    let Json(req) = body?;
    let access = services.jwt.refresh_access(req.refresh.trim(), Utc::now())?;
    ok(json!({ "access": access }))
}

pub async fn me(Extension(services): Extension<Arc<AppServices>>, Extension(caller): Extension<Caller>) -> ApiResult {
    let principal = caller.require_auth()?;
    ok(services.store.get_user(principal.user_id()).await?)
}

pub async fn update_me(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<Caller>,
    body: Result<Json<ProfileUpdate>, JsonRejection>,
) -> ApiResult {
    let principal = caller.require_auth()?;
    let Json(update) = body?;
    update.validate()?;
    ok(services.store.update_user(principal.user_id(), update).await?)
}
