use axum::Router;

pub mod analytics;
pub mod auth;
pub mod carts;
pub mod categories;
pub mod common;
pub mod customers;
pub mod inventory;
pub mod orders;
pub mod pricing_rules;
pub mod products;
pub mod promotions;
pub mod reviews;
pub mod system;
pub mod variants;

/// Router for everything under `/api`.
pub fn router() -> Router {
    Router::new()
        .nest("/api/auth", auth::router())
        .nest("/api/ecommerce", ecommerce())
}

fn ecommerce() -> Router {
    Router::new()
        .nest("/customers", customers::router())
        .nest("/categories", categories::router())
        .nest("/products", products::router())
        .nest("/variants", variants::router())
        .nest("/pricing-rules", pricing_rules::router())
        .nest("/promotions", promotions::router())
        .nest("/inventory", inventory::router())
        .nest("/carts", carts::router())
        .nest("/orders", orders::router())
        .nest("/reviews", reviews::router())
        .nest("/analytics", analytics::router())
}
