//! Route definitions for the marketplace stock ledger

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use crate::{handlers, middleware::auth_middleware, AppState};

/// Create API routes
pub fn api_routes(state: AppState) -> Router<AppState> {
    Router::new()
        // Payment gateway webhook (public, answered in plain text)
        .route("/payments/notify", post(handlers::payment_notify))
        // Protected routes
        .merge(protected_routes(state))
}

fn protected_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .nest("/checkout", checkout_routes())
        .nest("/stock", stock_routes())
        .nest("/offers", offer_routes())
        .nest("/orders", order_routes())
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}

/// Checkout routes
fn checkout_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(handlers::checkout))
        .route("/availability", get(handlers::cart_availability))
}

/// Stock management routes
fn stock_routes() -> Router<AppState> {
    Router::new()
        .route("/low", get(handlers::low_stock))
        .route("/:kind/:id", get(handlers::get_stock))
        .route("/:kind/:id/movements", get(handlers::list_movements))
        .route("/:kind/:id/restocks", get(handlers::list_restocks))
        .route("/:kind/:id/reserve", post(handlers::reserve_stock))
        .route("/:kind/:id/release", post(handlers::release_stock))
        .route("/:kind/:id/restock", post(handlers::restock))
        .route("/:kind/:id/adjust", post(handlers::adjust_stock))
        .route("/:kind/:id/reorder-level", post(handlers::set_reorder_level))
}

/// Deal and promotion routes
fn offer_routes() -> Router<AppState> {
    Router::new()
        .route("/containing/:size_id", get(handlers::offers_containing))
        .route("/:kind/:id/availability", get(handlers::offer_availability))
        .route("/:kind/:id/reactivate", post(handlers::reactivate_offer))
}

/// Order routes
fn order_routes() -> Router<AppState> {
    Router::new().route("/:order_number/cancel", post(handlers::cancel_order))
}
