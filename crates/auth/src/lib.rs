//! `storefront-auth`: authentication/authorization boundary.
//!
//! This crate is decoupled from HTTP and storage: it knows how to hash
//! passwords, mint and verify tokens, and decide whether a principal holds a
//! permission.

pub mod authorize;
pub mod claims;
pub mod jwt;
pub mod password;
pub mod permissions;
pub mod principal;
pub mod roles;
pub mod user;

pub use authorize::{AuthzError, authorize, permissions_for_roles};
pub use claims::{JwtClaims, TokenUse, TokenValidationError, validate_claims};
pub use jwt::{Hs256Jwt, JwtError, JwtValidator, TokenPair};
pub use password::{PasswordError, hash_password, verify_password};
pub use permissions::Permission;
pub use principal::Principal;
pub use roles::Role;
pub use user::{ProfileUpdate, Registration, User};
