//! HTTP handler for the payment gateway webhook
//!
//! The gateway retries until it sees `OK` with a 200, so the response is
//! plain text and carries no detail.

use axum::{
    extract::{rejection::FormRejection, State},
    http::StatusCode,
    Form,
};

use shared::PaymentNotification;

use crate::services::SettlementEngine;
use crate::AppState;

/// Handle a payment notification
/// POST /payments/notify
pub async fn payment_notify(
    State(state): State<AppState>,
    form: Result<Form<PaymentNotification>, FormRejection>,
) -> (StatusCode, &'static str) {
    let Form(notification) = match form {
        Ok(form) => form,
        Err(e) => {
            tracing::warn!(error = %e, "Unreadable payment notification");
            return (StatusCode::BAD_REQUEST, "ERROR");
        }
    };

    let engine = SettlementEngine::new(&state.stores, &state.config.payment);
    let outcome = engine.handle_payment_notification(notification).await;

    tracing::debug!(
        state = ?outcome.state,
        success = outcome.success,
        order = ?outcome.order.as_ref().map(|o| &o.order_number),
        message = %outcome.message,
        "Payment notification handled"
    );

    if outcome.success {
        (StatusCode::OK, "OK")
    } else {
        (StatusCode::BAD_REQUEST, "ERROR")
    }
}
