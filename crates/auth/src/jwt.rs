//! HS256 token issuing and verification.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::Serialize;
use thiserror::Error;

use crate::claims::{JwtClaims, TokenUse, TokenValidationError, validate_claims};
use crate::user::User;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum JwtError {
    #[error("malformed or badly signed token: {0}")]
    Invalid(String),

    #[error(transparent)]
    Claims(#[from] TokenValidationError),

    #[error("expected a {expected:?} token")]
    WrongTokenUse { expected: TokenUse },

    #[error("failed to encode token: {0}")]
    Encode(String),
}

/// Verifies a bearer token and returns its claims.
pub trait JwtValidator: Send + Sync {
    fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<JwtClaims, JwtError>;
}

/// Access + refresh token pair handed out on login and registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

/// HS256 signer/verifier sharing one secret.
#[derive(Clone)]
pub struct Hs256Jwt {
    encoding: EncodingKey,
    decoding: DecodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl core::fmt::Debug for Hs256Jwt {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Hs256Jwt")
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .finish_non_exhaustive()
    }
}

impl Hs256Jwt {
    pub fn new(secret: &[u8], access_ttl: Duration, refresh_ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            access_ttl,
            refresh_ttl,
        }
    }

    pub fn issue(&self, user: &User, token_use: TokenUse, now: DateTime<Utc>) -> Result<String, JwtError> {
        let ttl = match token_use {
            TokenUse::Access => self.access_ttl,
            TokenUse::Refresh => self.refresh_ttl,
        };
        let claims = JwtClaims {
            sub: user.id,
            username: user.username.clone(),
            roles: user.roles(),
            token_use,
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
        };
        self.encode(&claims)
    }

    pub fn issue_pair(&self, user: &User, now: DateTime<Utc>) -> Result<TokenPair, JwtError> {
        Ok(TokenPair {
            access: self.issue(user, TokenUse::Access, now)?,
            refresh: self.issue(user, TokenUse::Refresh, now)?,
        })
    }

    /// Mint a new access token from a verified refresh token.
    ///
    /// Roles are copied from the refresh token, so role changes take effect
    /// on the next login.
    pub fn refresh_access(&self, refresh_token: &str, now: DateTime<Utc>) -> Result<String, JwtError> {
        let claims = self.validate(refresh_token, now)?;
        if claims.token_use != TokenUse::Refresh {
            return Err(JwtError::WrongTokenUse {
                expected: TokenUse::Refresh,
            });
        }
        self.encode(&JwtClaims {
            token_use: TokenUse::Access,
            iat: now.timestamp(),
            exp: (now + self.access_ttl).timestamp(),
            ..claims
        })
    }

    fn encode(&self, claims: &JwtClaims) -> Result<String, JwtError> {
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
            .map_err(|e| JwtError::Encode(e.to_string()))
    }
}

impl JwtValidator for Hs256Jwt {
    fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<JwtClaims, JwtError> {
        // Time checks run against the caller's clock in `validate_claims`.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.required_spec_claims.clear();

        let data = jsonwebtoken::decode::<JwtClaims>(token, &self.decoding, &validation)
            .map_err(|e| JwtError::Invalid(e.to_string()))?;
        validate_claims(&data.claims, now)?;
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Role;
    use storefront_core::UserId;

    fn jwt(secret: &str) -> Hs256Jwt {
        Hs256Jwt::new(secret.as_bytes(), Duration::minutes(15), Duration::days(7))
    }

    fn user(is_staff: bool) -> User {
        User {
            id: UserId::new(),
            username: "jane".to_string(),
            email: "jane@example.com".to_string(),
            password_hash: String::new(),
            first_name: "Jane".to_string(),
            last_name: "Doe".to_string(),
            is_staff,
            date_joined: Utc::now(),
        }
    }

    #[test]
    fn issued_access_token_validates() {
        let jwt = jwt("secret");
        let user = user(true);
        let now = Utc::now();
        let token = jwt.issue(&user, TokenUse::Access, now).unwrap();

        let claims = jwt.validate(&token, now).unwrap();
        assert_eq!(claims.sub, user.id);
        assert_eq!(claims.token_use, TokenUse::Access);
        assert!(claims.roles.contains(&Role::ADMIN));
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let now = Utc::now();
        let token = jwt("secret").issue(&user(false), TokenUse::Access, now).unwrap();
        assert!(matches!(jwt("other").validate(&token, now), Err(JwtError::Invalid(_))));
    }

    #[test]
    fn expired_token_is_rejected() {
        let jwt = jwt("secret");
        let issued = Utc::now() - Duration::hours(1);
        let token = jwt.issue(&user(false), TokenUse::Access, issued).unwrap();
        assert_eq!(
            jwt.validate(&token, Utc::now()),
            Err(JwtError::Claims(TokenValidationError::Expired))
        );
    }

    #[test]
    fn refresh_requires_refresh_token() {
        let jwt = jwt("secret");
        let now = Utc::now();
        let pair = jwt.issue_pair(&user(false), now).unwrap();

        let access = jwt.refresh_access(&pair.refresh, now).unwrap();
        assert_eq!(jwt.validate(&access, now).unwrap().token_use, TokenUse::Access);

        assert!(matches!(
            jwt.refresh_access(&pair.access, now),
            Err(JwtError::WrongTokenUse { .. })
        ));
    }
}
