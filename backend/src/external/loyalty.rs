//! Loyalty service client
//!
//! Points accrual is owned by a separate service; settlement only tells it
//! an order was paid.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::LoyaltyConfig;
use crate::error::{AppError, AppResult};

/// Points granted for one order
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoyaltyAward {
    pub base_points: i64,
    pub bonus_points: i64,
}

#[async_trait]
pub trait LoyaltyClient: Send + Sync {
    async fn add_points_for_order(
        &self,
        user_id: Uuid,
        order_id: Uuid,
        total_amount: Decimal,
    ) -> AppResult<LoyaltyAward>;
}

/// Loyalty client talking to the loyalty service over HTTP
#[derive(Clone)]
pub struct HttpLoyaltyClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

#[derive(Debug, Serialize)]
struct AccrualRequest {
    user_id: Uuid,
    order_id: Uuid,
    total_amount: Decimal,
}

impl HttpLoyaltyClient {
    /// Create a new HttpLoyaltyClient
    pub fn new(base_url: String, api_key: Option<String>, timeout: Duration) -> AppResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    /// Build from configuration; `None` when no endpoint is configured
    pub fn from_config(config: &LoyaltyConfig) -> AppResult<Option<Self>> {
        match config.endpoint.as_deref().filter(|e| !e.trim().is_empty()) {
            Some(endpoint) => Self::new(
                endpoint.to_string(),
                config.api_key.clone(),
                Duration::from_secs(config.timeout_seconds),
            )
            .map(Some),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl LoyaltyClient for HttpLoyaltyClient {
    async fn add_points_for_order(
        &self,
        user_id: Uuid,
        order_id: Uuid,
        total_amount: Decimal,
    ) -> AppResult<LoyaltyAward> {
        let url = format!("{}/points/orders", self.base_url);

        let mut request = self.client.post(&url).json(&AccrualRequest {
            user_id,
            order_id,
            total_amount,
        });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| AppError::ExternalService(format!("Loyalty request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::ExternalService(format!(
                "Loyalty API error: {} - {}",
                status, body
            )));
        }

        response
            .json::<LoyaltyAward>()
            .await
            .map_err(|e| AppError::ExternalService(format!("Failed to parse loyalty response: {}", e)))
    }
}

/// Used when no loyalty service is configured; awards nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledLoyalty;

#[async_trait]
impl LoyaltyClient for DisabledLoyalty {
    async fn add_points_for_order(
        &self,
        user_id: Uuid,
        order_id: Uuid,
        _total_amount: Decimal,
    ) -> AppResult<LoyaltyAward> {
        tracing::debug!(%user_id, %order_id, "Loyalty service not configured, skipping accrual");
        Ok(LoyaltyAward::default())
    }
}
