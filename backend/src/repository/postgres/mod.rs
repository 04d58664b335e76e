//! PostgreSQL-backed stores

mod catalog;
mod orders;
mod stock;

use std::sync::Arc;

use sqlx::PgPool;

pub use catalog::{PgCatalog, PgOfferRepository};
pub use orders::{PgNotificationLog, PgOrderRepository};
pub use stock::{PgMovementLedger, PgRestockLog, PgStockStore};

use crate::clock::{Clock, SystemClock};
use crate::config::{Config, ContextStoreBackend};
use crate::error::AppResult;
use crate::external::{
    DisabledLoyalty, HttpLoyaltyClient, LoyaltyClient, PgCartSource, PgCouponLedger,
};
use crate::repository::Stores;
use crate::services::payment_context::{
    InMemoryPaymentContextStore, PaymentContextStore, PgPaymentContextStore,
};

impl Stores {
    /// Wire every store to the given pool
    pub fn postgres(db: PgPool, config: &Config) -> AppResult<Self> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let ttl = config.payment.context_ttl();

        let contexts: Arc<dyn PaymentContextStore> = match config.payment.context_store {
            ContextStoreBackend::Memory => {
                tracing::warn!(
                    "Payment contexts are held in memory; run a single instance or use the postgres store"
                );
                Arc::new(InMemoryPaymentContextStore::new(clock.clone(), ttl))
            }
            ContextStoreBackend::Postgres => {
                Arc::new(PgPaymentContextStore::new(db.clone(), clock.clone(), ttl))
            }
        };

        let loyalty: Arc<dyn LoyaltyClient> = match HttpLoyaltyClient::from_config(&config.loyalty)? {
            Some(client) => Arc::new(client),
            None => {
                tracing::info!("Loyalty endpoint not configured, points accrual disabled");
                Arc::new(DisabledLoyalty)
            }
        };

        Ok(Self {
            stock: Arc::new(PgStockStore::new(db.clone())),
            movements: Arc::new(PgMovementLedger::new(db.clone())),
            restocks: Arc::new(PgRestockLog::new(db.clone())),
            catalog: Arc::new(PgCatalog::new(db.clone())),
            offers: Arc::new(PgOfferRepository::new(db.clone())),
            orders: Arc::new(PgOrderRepository::new(db.clone())),
            notifications: Arc::new(PgNotificationLog::new(db.clone())),
            carts: Arc::new(PgCartSource::new(db.clone())),
            coupons: Arc::new(PgCouponLedger::new(db)),
            loyalty,
            contexts,
            clock,
        })
    }
}
