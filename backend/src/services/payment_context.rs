//! Payment context store
//!
//! Between checkout and the gateway callback the server holds the delivery
//! and contact details the order needs, keyed by payment reference. A
//! context lives for a fixed window (24h by default); reads past the window
//! behave as if it never existed and a background sweep reclaims the space.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use sqlx::{FromRow, PgPool};
use tokio::task::JoinHandle;
use uuid::Uuid;

use shared::{ContactDetails, PaymentContext};

use crate::clock::Clock;
use crate::error::{AppError, AppResult};

#[async_trait]
pub trait PaymentContextStore: Send + Sync {
    /// Store or overwrite the context for a reference, stamping it with
    /// the current time
    async fn put(&self, reference: &str, context: PaymentContext) -> AppResult<()>;

    /// `None` when missing or older than the lifetime
    async fn get(&self, reference: &str) -> AppResult<Option<PaymentContext>>;

    async fn remove(&self, reference: &str) -> AppResult<()>;

    /// Drop every expired context, returning how many were removed
    async fn sweep_expired(&self) -> AppResult<usize>;
}

fn is_expired(context: &PaymentContext, now: DateTime<Utc>, ttl: Duration) -> bool {
    now - context.created_at > ttl
}

// ============================================================================
// In-memory Store
// ============================================================================

/// Process-local store; contexts are lost on restart and not shared
/// between instances
pub struct InMemoryPaymentContextStore {
    entries: DashMap<String, PaymentContext>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

impl InMemoryPaymentContextStore {
    pub fn new(clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
            ttl,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl PaymentContextStore for InMemoryPaymentContextStore {
    async fn put(&self, reference: &str, mut context: PaymentContext) -> AppResult<()> {
        context.created_at = self.clock.now();
        self.entries.insert(reference.to_string(), context);
        Ok(())
    }

    async fn get(&self, reference: &str) -> AppResult<Option<PaymentContext>> {
        let now = self.clock.now();
        let found = self.entries.get(reference).map(|entry| entry.value().clone());

        match found {
            Some(context) if is_expired(&context, now, self.ttl) => {
                self.entries
                    .remove_if(reference, |_, c| is_expired(c, now, self.ttl));
                Ok(None)
            }
            other => Ok(other),
        }
    }

    async fn remove(&self, reference: &str) -> AppResult<()> {
        self.entries.remove(reference);
        Ok(())
    }

    async fn sweep_expired(&self) -> AppResult<usize> {
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries
            .retain(|_, context| !is_expired(context, now, self.ttl));
        Ok(before.saturating_sub(self.entries.len()))
    }
}

// ============================================================================
// PostgreSQL Store
// ============================================================================

/// Store shared by every instance behind the load balancer
#[derive(Clone)]
pub struct PgPaymentContextStore {
    db: PgPool,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

#[derive(Debug, FromRow)]
struct PaymentContextRow {
    user_id: Uuid,
    delivery_address: String,
    delivery_method: String,
    contact_first_name: String,
    contact_last_name: String,
    contact_email: String,
    contact_phone: String,
    created_at: DateTime<Utc>,
}

impl From<PaymentContextRow> for PaymentContext {
    fn from(row: PaymentContextRow) -> Self {
        PaymentContext {
            user_id: row.user_id,
            delivery_address: row.delivery_address,
            delivery_method: row.delivery_method,
            contact: ContactDetails {
                first_name: row.contact_first_name,
                last_name: row.contact_last_name,
                email: row.contact_email,
                phone: row.contact_phone,
            },
            created_at: row.created_at,
        }
    }
}

impl PgPaymentContextStore {
    pub fn new(db: PgPool, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self { db, clock, ttl }
    }
}

#[async_trait]
impl PaymentContextStore for PgPaymentContextStore {
    async fn put(&self, reference: &str, mut context: PaymentContext) -> AppResult<()> {
        context.created_at = self.clock.now();

        sqlx::query(
            r#"
            INSERT INTO payment_contexts (
                payment_reference, user_id, delivery_address, delivery_method,
                contact_first_name, contact_last_name, contact_email, contact_phone, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (payment_reference) DO UPDATE SET
                user_id = EXCLUDED.user_id,
                delivery_address = EXCLUDED.delivery_address,
                delivery_method = EXCLUDED.delivery_method,
                contact_first_name = EXCLUDED.contact_first_name,
                contact_last_name = EXCLUDED.contact_last_name,
                contact_email = EXCLUDED.contact_email,
                contact_phone = EXCLUDED.contact_phone,
                created_at = EXCLUDED.created_at
            "#,
        )
        .bind(reference)
        .bind(context.user_id)
        .bind(&context.delivery_address)
        .bind(&context.delivery_method)
        .bind(&context.contact.first_name)
        .bind(&context.contact.last_name)
        .bind(&context.contact.email)
        .bind(&context.contact.phone)
        .bind(context.created_at)
        .execute(&self.db)
        .await?;

        Ok(())
    }

    async fn get(&self, reference: &str) -> AppResult<Option<PaymentContext>> {
        let cutoff = self.clock.now() - self.ttl;

        sqlx::query("DELETE FROM payment_contexts WHERE payment_reference = $1 AND created_at < $2")
            .bind(reference)
            .bind(cutoff)
            .execute(&self.db)
            .await?;

        let row = sqlx::query_as::<_, PaymentContextRow>(
            r#"
            SELECT user_id, delivery_address, delivery_method, contact_first_name,
                   contact_last_name, contact_email, contact_phone, created_at
            FROM payment_contexts
            WHERE payment_reference = $1 AND created_at >= $2
            "#,
        )
        .bind(reference)
        .bind(cutoff)
        .fetch_optional(&self.db)
        .await?;

        Ok(row.map(PaymentContext::from))
    }

    async fn remove(&self, reference: &str) -> AppResult<()> {
        sqlx::query("DELETE FROM payment_contexts WHERE payment_reference = $1")
            .bind(reference)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    async fn sweep_expired(&self) -> AppResult<usize> {
        let cutoff = self.clock.now() - self.ttl;

        let result = sqlx::query("DELETE FROM payment_contexts WHERE created_at < $1")
            .bind(cutoff)
            .execute(&self.db)
            .await?;

        usize::try_from(result.rows_affected())
            .map_err(|e| AppError::Internal(format!("Sweep count out of range: {}", e)))
    }
}

// ============================================================================
// Sweeper
// ============================================================================

/// Periodically drop expired contexts
///
/// The first tick of a tokio interval fires immediately; it is skipped so a
/// freshly started instance does not sweep before serving anything.
pub fn spawn_context_sweeper(
    store: Arc<dyn PaymentContextStore>,
    every: StdDuration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.tick().await;

        loop {
            interval.tick().await;
            match store.sweep_expired().await {
                Ok(0) => tracing::debug!("Payment context sweep found nothing to remove"),
                Ok(removed) => tracing::info!(removed, "Swept expired payment contexts"),
                Err(e) => tracing::warn!(error = %e, "Payment context sweep failed"),
            }
        }
    })
}
