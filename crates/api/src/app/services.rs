use std::sync::Arc;

use chrono::Duration;

use storefront_auth::Hs256Jwt;
use storefront_infra::config::DEV_JWT_SECRET;
use storefront_infra::{AppConfig, InMemoryStore, PostgresStore, SharedStore, StoreError};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppServices {
    pub store: SharedStore,
    pub jwt: Arc<Hs256Jwt>,
    pub config: AppConfig,
}

impl AppServices {
    pub fn new(store: SharedStore, config: AppConfig) -> Self {
        let jwt = Hs256Jwt::new(
            config.jwt_secret.as_bytes(),
            Duration::seconds(config.jwt_access_ttl_secs),
            Duration::seconds(config.jwt_refresh_ttl_secs),
        );
        Self {
            store,
            jwt: Arc::new(jwt),
            config,
        }
    }

    /// In-memory store; used by tests and when no database is configured.
    pub fn in_memory(config: AppConfig) -> Self {
        Self::new(Arc::new(InMemoryStore::new()), config)
    }

    pub fn default_page_size(&self) -> u32 {
        self.config.default_page_size
    }
}

/// Pick the store from configuration and run migrations when it is Postgres.
pub async fn build_services(config: AppConfig) -> Result<AppServices, StoreError> {
    if config.jwt_secret == DEV_JWT_SECRET {
        tracing::warn!("JWT_SECRET not set; using insecure dev default");
    }

    let store: SharedStore = match &config.database_url {
        Some(url) => {
            let store = PostgresStore::connect(url, config.database_max_connections).await?;
            store.migrate().await?;
            tracing::info!(max_connections = config.database_max_connections, "using postgres store");
            Arc::new(store)
        }
        None => {
            tracing::warn!("DATABASE_URL not set; data lives in memory only");
            Arc::new(InMemoryStore::new())
        }
    };

    Ok(AppServices::new(store, config))
}
