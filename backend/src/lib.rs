//! Marketplace stock ledger and checkout settlement
//!
//! Tracks per product and variant stock, validates carts at checkout,
//! signs gateway redirects and turns confirmed payments into orders.

use std::sync::Arc;

use axum::{routing::get, Router};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub mod clock;
pub mod config;
pub mod error;
pub mod external;
pub mod handlers;
pub mod middleware;
pub mod repository;
pub mod routes;
pub mod services;

pub use config::Config;
pub use repository::Stores;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Pool used for health checks; absent when running on in-memory stores
    pub db: Option<sqlx::PgPool>,
    pub config: Arc<Config>,
    pub stores: Stores,
}

/// Create the application router with all routes and middleware
pub fn create_app(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(root))
        .route("/health", get(handlers::health_check))
        .nest("/api/v1", routes::api_routes(state.clone()))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Root endpoint
async fn root() -> &'static str {
    "Marketplace Stock Ledger API v1"
}
