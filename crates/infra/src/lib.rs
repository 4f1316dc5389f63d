//! Infrastructure layer: configuration, persistence and the store error model.
//!
//! The API talks to storage through [`store::Store`]. Two implementations
//! ship here: [`PostgresStore`] for deployments and [`InMemoryStore`] for
//! tests and database-less runs.

pub mod config;
pub mod error;
pub mod store;

pub use config::{AppConfig, ConfigError};
pub use error::{StoreError, StoreResult};
pub use store::{
    AnalyticsStore, CartQuote, CatalogStore, CustomerStore, InMemoryStore, InventoryStore, PostgresStore,
    PricingStore, SalesStore, SharedStore, Store, UserStore,
};
