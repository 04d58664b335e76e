//! HTTP handlers for checkout

use axum::{extract::State, Json};

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::{CartAvailability, CheckoutRequest, CheckoutResponse, CheckoutService};
use crate::AppState;

/// Check the current user's cart without starting a payment
pub async fn cart_availability(
    State(state): State<AppState>,
    current_user: CurrentUser,
) -> AppResult<Json<CartAvailability>> {
    let service = CheckoutService::new(&state.stores, &state.config.payment);
    let availability = service.availability(current_user.0.user_id).await?;
    Ok(Json(availability))
}

/// Start checkout: returns availability issues or a signed payment URL
pub async fn checkout(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(request): Json<CheckoutRequest>,
) -> AppResult<Json<CheckoutResponse>> {
    let service = CheckoutService::new(&state.stores, &state.config.payment);
    let response = service.initiate(current_user.0.user_id, request).await?;
    Ok(Json(response))
}
