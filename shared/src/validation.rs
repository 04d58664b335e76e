//! Validation utilities for the stock ledger and payment webhook

use crate::models::{PaymentNotification, ValidatedNotification};

// ============================================================================
// Stock Validations
// ============================================================================

/// Validate a quantity used for a stock mutation or a cart line
pub fn validate_quantity(quantity: i32) -> Result<(), &'static str> {
    if quantity <= 0 {
        return Err("Quantity must be positive");
    }
    Ok(())
}

/// Validate a reorder threshold
pub fn validate_reorder_level(level: i32) -> Result<(), &'static str> {
    if level < 0 {
        return Err("Reorder level cannot be negative");
    }
    Ok(())
}

// ============================================================================
// Payment Validations
// ============================================================================

/// Maximum length the gateway accepts for `m_payment_id`
pub const MAX_PAYMENT_REFERENCE_LEN: usize = 100;

/// Validate a payment reference we generated or received back
pub fn validate_payment_reference(reference: &str) -> Result<(), &'static str> {
    if reference.is_empty() {
        return Err("Payment reference cannot be empty");
    }
    if reference.len() > MAX_PAYMENT_REFERENCE_LEN {
        return Err("Payment reference is too long");
    }
    if !reference
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err("Payment reference may only contain letters, digits, '-' and '_'");
    }
    Ok(())
}

/// Check the webhook carries every field settlement depends on
///
/// Returns the names of all missing fields rather than only the first, so
/// the log line for a malformed callback is complete.
pub fn validate_notification(
    notification: &PaymentNotification,
) -> Result<ValidatedNotification, Vec<&'static str>> {
    fn present(value: &Option<String>) -> Option<String> {
        value
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    }

    let reference = present(&notification.m_payment_id);
    let external_id = present(&notification.pf_payment_id);
    let status = present(&notification.payment_status);
    let merchant_id = present(&notification.merchant_id);

    let mut missing = Vec::new();
    if reference.is_none() {
        missing.push("m_payment_id");
    }
    if external_id.is_none() {
        missing.push("pf_payment_id");
    }
    if status.is_none() {
        missing.push("payment_status");
    }
    if merchant_id.is_none() {
        missing.push("merchant_id");
    }

    match (reference, external_id, status, merchant_id) {
        (Some(payment_reference), Some(external_id), Some(status_raw), Some(merchant_id)) => {
            Ok(ValidatedNotification {
                payment_reference,
                external_id,
                status_raw,
                merchant_id,
                signature: present(&notification.signature),
            })
        }
        _ => Err(missing),
    }
}
