//! HTTP handlers for orders

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;

use shared::Order;

use crate::error::AppResult;
use crate::middleware::{require_permission, CurrentUser};
use crate::services::OrderService;
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct CancelOrderInput {
    pub reason: Option<String>,
}

/// Cancel an order and return its stock
pub async fn cancel_order(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(order_number): Path<String>,
    input: Option<Json<CancelOrderInput>>,
) -> AppResult<Json<Order>> {
    require_permission(&current_user.0, "orders", "write")?;
    let reason = input
        .and_then(|Json(i)| i.reason)
        .unwrap_or_default();

    let order = OrderService::new(&state.stores)
        .cancel_order(&order_number, &reason)
        .await?;
    Ok(Json(order))
}
