use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode, header},
    middleware::Next,
    response::Response,
};
use chrono::Utc;

use storefront_auth::{JwtValidator, TokenUse};

use crate::app::errors::json_error;
use crate::context::Caller;

#[derive(Clone)]
pub struct AuthState {
    pub jwt: Arc<dyn JwtValidator>,
}

/// Resolve the caller from the bearer token.
///
/// A missing header yields an anonymous caller; handlers decide whether that
/// is acceptable. A header that is present but unusable is rejected here.
pub async fn auth_middleware(
    State(state): State<AuthState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Response {
    let caller = match extract_bearer(req.headers()) {
        Ok(None) => Caller::anonymous(),
        Ok(Some(token)) => match state.jwt.validate(token, Utc::now()) {
            Ok(claims) if claims.token_use == TokenUse::Access => Caller::authenticated(claims.principal()),
            Ok(_) => return unauthorized("Token is not an access token."),
            Err(err) => {
                tracing::debug!(error = %err, "rejected bearer token");
                return unauthorized("Given token not valid for any token type.");
            }
        },
        Err(msg) => return unauthorized(msg),
    };

    req.extensions_mut().insert(caller);
    next.run(req).await
}

fn unauthorized(msg: &str) -> Response {
    json_error(StatusCode::UNAUTHORIZED, "unauthorized", msg)
}

fn extract_bearer(headers: &HeaderMap) -> Result<Option<&str>, &'static str> {
    let Some(header) = headers.get(header::AUTHORIZATION) else {
        return Ok(None);
    };

    let header = header.to_str().map_err(|_| "Invalid Authorization header.")?;

    let header = header
        .strip_prefix("Bearer ")
        .ok_or("Authorization header must use the Bearer scheme.")?;

    let token = header.trim();
    if token.is_empty() {
        return Err("Bearer token is empty.");
    }

    Ok(Some(token))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn missing_header_is_anonymous() {
        assert_eq!(extract_bearer(&HeaderMap::new()), Ok(None));
    }

    #[test]
    fn bearer_token_is_extracted() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc.def"));
        assert_eq!(extract_bearer(&headers), Ok(Some("abc.def")));
    }

    #[test]
    fn other_schemes_are_rejected() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic Zm9vOmJhcg=="));
        assert!(extract_bearer(&headers).is_err());

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer   "));
        assert!(extract_bearer(&headers).is_err());
    }
}
