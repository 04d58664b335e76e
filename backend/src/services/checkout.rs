//! Checkout: availability gate, payment context and gateway redirect

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use shared::{validate_payment_reference, ContactDetails, PaymentContext};

use crate::clock::Clock;
use crate::config::PaymentConfig;
use crate::error::{AppError, AppResult};
use crate::external::CartSource;
use crate::repository::Stores;
use crate::services::availability::{AvailabilityChecker, AvailabilityIssue, CartAvailability};
use crate::services::payment_context::PaymentContextStore;
use crate::services::payment_signature::PaymentSigner;

/// Delivery and contact details submitted at checkout
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CheckoutRequest {
    #[validate(length(min = 1, max = 500))]
    pub delivery_address: String,
    #[validate(length(min = 1, max = 50))]
    pub delivery_method: String,
    #[validate]
    pub contact: ContactDetails,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckoutResponse {
    pub allow_checkout: bool,
    pub availability_issues: Vec<AvailabilityIssue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_reference: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<Decimal>,
}

impl CheckoutResponse {
    fn blocked(availability: CartAvailability) -> Self {
        Self {
            allow_checkout: false,
            availability_issues: availability.availability_issues,
            payment_reference: None,
            payment_url: None,
            amount: None,
        }
    }
}

#[derive(Clone)]
pub struct CheckoutService {
    carts: Arc<dyn CartSource>,
    contexts: Arc<dyn PaymentContextStore>,
    clock: Arc<dyn Clock>,
    checker: AvailabilityChecker,
    signer: PaymentSigner,
    payment: PaymentConfig,
}

impl CheckoutService {
    pub fn new(stores: &Stores, payment: &PaymentConfig) -> Self {
        Self {
            carts: stores.carts.clone(),
            contexts: stores.contexts.clone(),
            clock: stores.clock.clone(),
            checker: AvailabilityChecker::new(stores),
            signer: PaymentSigner::from_config(payment),
            payment: payment.clone(),
        }
    }

    /// Check every line of the user's cart without starting a payment
    pub async fn availability(&self, user_id: Uuid) -> AppResult<CartAvailability> {
        let cart = self.carts.get_full_cart(user_id).await?;
        Ok(self.checker.check_cart(&cart).await)
    }

    /// Validate the cart, remember the delivery details and hand back a
    /// signed gateway URL
    ///
    /// Nothing is reserved here; stock is taken when the gateway confirms
    /// payment.
    pub async fn initiate(&self, user_id: Uuid, request: CheckoutRequest) -> AppResult<CheckoutResponse> {
        request
            .validate()
            .map_err(|e| AppError::ValidationError(e.to_string()))?;

        let cart = self.carts.get_full_cart(user_id).await?;
        if cart.is_empty() {
            return Err(AppError::Validation {
                field: "cart".to_string(),
                message: "Cart is empty".to_string(),
            });
        }

        let availability = self.checker.check_cart(&cart).await;
        if !availability.allow_checkout {
            tracing::info!(
                %user_id,
                issues = availability.availability_issues.len(),
                "Checkout blocked by availability"
            );
            return Ok(CheckoutResponse::blocked(availability));
        }

        let now = self.clock.now();
        let reference = generate_payment_reference(now);
        validate_payment_reference(&reference)
            .map_err(|e| AppError::Internal(e.to_string()))?;

        self.contexts
            .put(
                &reference,
                PaymentContext {
                    user_id,
                    delivery_address: request.delivery_address.trim().to_string(),
                    delivery_method: request.delivery_method.trim().to_string(),
                    contact: request.contact.clone(),
                    created_at: now,
                },
            )
            .await?;

        let amount = cart.total_amount.round_dp(2);
        let amount_str = format!("{:.2}", amount);
        let item_name = format!("Order {}", reference);
        let fields = [
            ("merchant_id", Some(self.payment.merchant_id.as_str())),
            ("return_url", Some(self.payment.return_url.as_str())),
            ("cancel_url", Some(self.payment.cancel_url.as_str())),
            ("notify_url", Some(self.payment.notify_url.as_str())),
            ("name_first", Some(request.contact.first_name.as_str())),
            ("name_last", Some(request.contact.last_name.as_str())),
            ("email_address", Some(request.contact.email.as_str())),
            ("cell_number", Some(request.contact.phone.as_str())),
            ("m_payment_id", Some(reference.as_str())),
            ("amount", Some(amount_str.as_str())),
            ("item_name", Some(item_name.as_str())),
        ];
        let payment_url = self
            .signer
            .build_payment_url(&self.payment.gateway_url, &fields)?;

        tracing::info!(%user_id, payment_reference = %reference, %amount, "Checkout initiated");

        Ok(CheckoutResponse {
            allow_checkout: true,
            availability_issues: Vec::new(),
            payment_reference: Some(reference),
            payment_url: Some(payment_url),
            amount: Some(amount),
        })
    }
}

/// `MKT-<yyyymmddhhmmss>-<12 hex>`
pub fn generate_payment_reference(now: chrono::DateTime<chrono::Utc>) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("MKT-{}-{}", now.format("%Y%m%d%H%M%S"), &suffix[..12])
}
