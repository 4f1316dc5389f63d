//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: store selection and shared handler state
//! - `routes/`: HTTP routes + handlers (one file per resource)
//! - `dto.rs`: query strings, request bodies and parsing helpers
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::extract::Request;
use axum::http::{HeaderValue, StatusCode};
use axum::response::Response;
use axum::{routing::get, Extension, Router, ServiceExt};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower::Layer;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::normalize_path::{NormalizePath, NormalizePathLayer};
use tower_http::trace::TraceLayer;

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

pub use services::{AppServices, build_services};

/// Build the full HTTP router.
pub fn build_app(services: Arc<AppServices>) -> Router {
    let auth_state = middleware::AuthState {
        jwt: services.jwt.clone(),
    };
    let cors = cors_layer(&services.config.cors_allowed_origins);

    let api = routes::router()
        .layer(Extension(services))
        .layer(axum::middleware::from_fn_with_state(auth_state, middleware::auth_middleware));

    Router::new()
        .route("/health", get(routes::system::health))
        .merge(api)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CatchPanicLayer::custom(panic_response))
                .layer(cors),
        )
}

/// Router wrapped so `/path/` and `/path` reach the same handler.
pub fn into_service(router: Router) -> NormalizePath<Router> {
    NormalizePathLayer::trim_trailing_slash().layer(router)
}

/// Serve the application on `listener` until the task is dropped.
pub async fn serve(listener: TcpListener, services: Arc<AppServices>) -> std::io::Result<()> {
    let app = into_service(build_app(services));
    axum::serve(listener, ServiceExt::<Request>::into_make_service(app)).await
}

fn panic_response(_: Box<dyn std::any::Any + Send + 'static>) -> Response {
    tracing::error!("request handler panicked");
    errors::json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", "internal server error")
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let base = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() {
        return base.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %o, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    base.allow_origin(AllowOrigin::list(origins))
}
