//! Payment gateway models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Closed set of payment outcomes the settlement engine reasons about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Paid,
    Failed,
    Cancelled,
    Declined,
    Processing,
    Pending,
}

impl PaymentStatus {
    /// Interpret the gateway's free-text status
    ///
    /// Matching is trimmed, case-insensitive and synonym-aware. Anything
    /// unrecognized is treated as still pending rather than as an error.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "PAID" | "COMPLETE" | "COMPLETED" | "SUCCESS" | "SUCCESSFUL" | "SUCCEEDED" => {
                PaymentStatus::Paid
            }
            "FAILED" | "FAILURE" | "ERROR" => PaymentStatus::Failed,
            "CANCELLED" | "CANCELED" | "CANCEL" => PaymentStatus::Cancelled,
            "DECLINED" | "REJECTED" => PaymentStatus::Declined,
            "PROCESSING" | "IN_PROGRESS" => PaymentStatus::Processing,
            _ => PaymentStatus::Pending,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Paid => "paid",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Cancelled => "cancelled",
            PaymentStatus::Declined => "declined",
            PaymentStatus::Processing => "processing",
            PaymentStatus::Pending => "pending",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "paid" => Some(PaymentStatus::Paid),
            "failed" => Some(PaymentStatus::Failed),
            "cancelled" => Some(PaymentStatus::Cancelled),
            "declined" => Some(PaymentStatus::Declined),
            "processing" => Some(PaymentStatus::Processing),
            "pending" => Some(PaymentStatus::Pending),
            _ => None,
        }
    }
}

/// Raw gateway notification as posted to the webhook (form fields)
///
/// Every field is optional on the wire; presence is checked by
/// [`crate::validation::validate_notification`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PaymentNotification {
    pub m_payment_id: Option<String>,
    pub pf_payment_id: Option<String>,
    pub payment_status: Option<String>,
    pub amount_gross: Option<String>,
    pub amount_fee: Option<String>,
    pub amount_net: Option<String>,
    pub merchant_id: Option<String>,
    pub signature: Option<String>,
    pub email_address: Option<String>,
    pub item_name: Option<String>,
    pub billing_date: Option<String>,
}

impl PaymentNotification {
    /// All signed fields, i.e. everything except the signature itself
    pub fn signed_fields(&self) -> Vec<(&'static str, Option<&str>)> {
        vec![
            ("m_payment_id", self.m_payment_id.as_deref()),
            ("pf_payment_id", self.pf_payment_id.as_deref()),
            ("payment_status", self.payment_status.as_deref()),
            ("amount_gross", self.amount_gross.as_deref()),
            ("amount_fee", self.amount_fee.as_deref()),
            ("amount_net", self.amount_net.as_deref()),
            ("merchant_id", self.merchant_id.as_deref()),
            ("email_address", self.email_address.as_deref()),
            ("item_name", self.item_name.as_deref()),
            ("billing_date", self.billing_date.as_deref()),
        ]
    }
}

/// Notification whose required fields are known to be present
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedNotification {
    /// Our payment reference (`m_payment_id`), also the order number
    pub payment_reference: String,
    /// Gateway-side payment id (`pf_payment_id`)
    pub external_id: String,
    pub status_raw: String,
    pub merchant_id: String,
    pub signature: Option<String>,
}

impl ValidatedNotification {
    pub fn status(&self) -> PaymentStatus {
        PaymentStatus::parse(&self.status_raw)
    }
}

/// Durable copy of a received notification, kept for audit and disputes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub id: Uuid,
    pub payment_reference: String,
    pub external_id: String,
    pub status: String,
    pub signature: Option<String>,
    pub payload: serde_json::Value,
    pub received_at: DateTime<Utc>,
}

/// Contact details captured at checkout
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct ContactDetails {
    #[validate(length(min = 1, max = 100))]
    pub first_name: String,
    #[validate(length(min = 1, max = 100))]
    pub last_name: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 5, max = 32))]
    pub phone: String,
}

/// What we need to materialize an order once the gateway confirms payment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentContext {
    pub user_id: Uuid,
    pub delivery_address: String,
    pub delivery_method: String,
    pub contact: ContactDetails,
    pub created_at: DateTime<Utc>,
}
