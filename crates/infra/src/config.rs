//! Process configuration read from the environment.
//!
//! A `.env` file in the working directory is loaded first when present.

use std::env;
use std::net::SocketAddr;

use storefront_core::page::DEFAULT_PAGE_SIZE;
use thiserror::Error;

pub const DEV_JWT_SECRET: &str = "dev-secret-change-me";

const DEFAULT_BIND: &str = "0.0.0.0:8080";
const DEFAULT_MAX_CONNECTIONS: u32 = 10;
const DEFAULT_ACCESS_TTL_SECS: i64 = 15 * 60;
const DEFAULT_REFRESH_TTL_SECS: i64 = 7 * 24 * 60 * 60;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {var}: {reason}")]
    Invalid { var: &'static str, reason: String },
}

#[derive(Clone)]
pub struct AppConfig {
    pub bind: SocketAddr,
    /// Postgres connection string; `None` runs on the in-memory store.
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub jwt_secret: String,
    pub jwt_access_ttl_secs: i64,
    pub jwt_refresh_ttl_secs: i64,
    /// Empty means any origin.
    pub cors_allowed_origins: Vec<String>,
    pub default_page_size: u32,
}

impl core::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AppConfig")
            .field("bind", &self.bind)
            .field("database_url", &self.database_url.as_ref().map(|_| "[redacted]"))
            .field("database_max_connections", &self.database_max_connections)
            .field("jwt_access_ttl_secs", &self.jwt_access_ttl_secs)
            .field("jwt_refresh_ttl_secs", &self.jwt_refresh_ttl_secs)
            .field("cors_allowed_origins", &self.cors_allowed_origins)
            .field("default_page_size", &self.default_page_size)
            .finish_non_exhaustive()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 8080)),
            database_url: None,
            database_max_connections: DEFAULT_MAX_CONNECTIONS,
            jwt_secret: DEV_JWT_SECRET.to_string(),
            jwt_access_ttl_secs: DEFAULT_ACCESS_TTL_SECS,
            jwt_refresh_ttl_secs: DEFAULT_REFRESH_TTL_SECS,
            cors_allowed_origins: Vec::new(),
            default_page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build from an arbitrary variable source.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &str| get(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let bind_raw = get("STOREFRONT_BIND").unwrap_or_else(|| DEFAULT_BIND.to_string());
        let bind = bind_raw.parse().map_err(|e| ConfigError::Invalid {
            var: "STOREFRONT_BIND",
            reason: format!("{e}"),
        })?;

        let jwt_secret = match get("JWT_SECRET") {
            Some(secret) => secret,
            None => {
                tracing::warn!("JWT_SECRET not set; using insecure dev default");
                DEV_JWT_SECRET.to_string()
            }
        };

        let cors_allowed_origins = get("CORS_ALLOWED_ORIGINS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|o| !o.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let config = Self {
            bind,
            database_url: get("DATABASE_URL"),
            database_max_connections: parse_var(&get, "DATABASE_MAX_CONNECTIONS", DEFAULT_MAX_CONNECTIONS)?,
            jwt_secret,
            jwt_access_ttl_secs: parse_var(&get, "JWT_ACCESS_TTL_SECS", DEFAULT_ACCESS_TTL_SECS)?,
            jwt_refresh_ttl_secs: parse_var(&get, "JWT_REFRESH_TTL_SECS", DEFAULT_REFRESH_TTL_SECS)?,
            cors_allowed_origins,
            default_page_size: parse_var(&get, "DEFAULT_PAGE_SIZE", DEFAULT_PAGE_SIZE)?,
        };

        for (var, value) in [
            ("JWT_ACCESS_TTL_SECS", config.jwt_access_ttl_secs),
            ("JWT_REFRESH_TTL_SECS", config.jwt_refresh_ttl_secs),
            ("DATABASE_MAX_CONNECTIONS", i64::from(config.database_max_connections)),
            ("DEFAULT_PAGE_SIZE", i64::from(config.default_page_size)),
        ] {
            if value <= 0 {
                return Err(ConfigError::Invalid {
                    var,
                    reason: "must be greater than zero".to_string(),
                });
            }
        }

        tracing::info!(bind = %config.bind, persistent = config.database_url.is_some(), "configuration loaded");
        Ok(config)
    }
}

fn parse_var<T>(get: &impl Fn(&str) -> Option<String>, var: &'static str, default: T) -> Result<T, ConfigError>
where
    T: core::str::FromStr,
    T::Err: core::fmt::Display,
{
    match get(var) {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
            var,
            reason: e.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = AppConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.bind.port(), 8080);
        assert!(config.database_url.is_none());
        assert_eq!(config.jwt_secret, DEV_JWT_SECRET);
        assert_eq!(config.jwt_access_ttl_secs, 900);
        assert_eq!(config.jwt_refresh_ttl_secs, 604_800);
        assert!(config.cors_allowed_origins.is_empty());
        assert_eq!(config.default_page_size, DEFAULT_PAGE_SIZE);
    }

    #[test]
    fn reads_overrides() {
        let config = AppConfig::from_lookup(lookup(&[
            ("STOREFRONT_BIND", "127.0.0.1:9000"),
            ("DATABASE_URL", "postgres://localhost/shop"),
            ("JWT_SECRET", "s3cret"),
            ("CORS_ALLOWED_ORIGINS", "https://a.example, https://b.example,"),
            ("DEFAULT_PAGE_SIZE", "50"),
        ]))
        .unwrap();
        assert_eq!(config.bind.port(), 9000);
        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/shop"));
        assert_eq!(config.jwt_secret, "s3cret");
        assert_eq!(config.cors_allowed_origins, vec!["https://a.example", "https://b.example"]);
        assert_eq!(config.default_page_size, 50);
    }

    #[test]
    fn rejects_bad_numbers() {
        let err = AppConfig::from_lookup(lookup(&[("JWT_ACCESS_TTL_SECS", "soon")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "JWT_ACCESS_TTL_SECS", .. }));
        let err = AppConfig::from_lookup(lookup(&[("DEFAULT_PAGE_SIZE", "0")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "DEFAULT_PAGE_SIZE", .. }));
    }
}
