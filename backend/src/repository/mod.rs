//! Persistence seams for the stock ledger
//!
//! Every store the services touch is an `async_trait` object so the same
//! service code runs against PostgreSQL in production and against
//! in-memory stores in the integration tests.

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use shared::{
    CompositeOffer, MovementRecord, MovementReference, NewMovement, NewOrder, NewOrderItem,
    NotificationRecord,
    OfferRef, Order, OrderInsert, OrderItem, OrderStatus, Product, ProductRef, ProductSize,
    RestockRecord, StockRecord,
};

use crate::clock::Clock;
use crate::error::AppResult;
use crate::external::{CartSource, CouponLedger, LoyaltyClient};
use crate::services::payment_context::PaymentContextStore;

pub mod postgres;

/// Per product/variant counters
///
/// Each mutation is a single-row atomic read-modify-write. Implementations
/// never persist a negative count and fail with `InsufficientStock` instead
/// of clamping. They do not write ledger entries.
#[async_trait]
pub trait StockStore: Send + Sync {
    async fn find(&self, owner: ProductRef) -> AppResult<Option<StockRecord>>;

    async fn find_or_create(&self, owner: ProductRef, initial_available: i32)
        -> AppResult<StockRecord>;

    async fn reserve(&self, owner: ProductRef, qty: i32) -> AppResult<StockRecord>;

    async fn release(&self, owner: ProductRef, qty: i32) -> AppResult<StockRecord>;

    /// Consume a reservation if one exists, otherwise take from sellable stock
    async fn deduct(&self, owner: ProductRef, qty: i32) -> AppResult<StockRecord>;

    async fn add_available(&self, owner: ProductRef, qty: i32) -> AppResult<StockRecord>;

    async fn adjust(&self, owner: ProductRef, delta: i32) -> AppResult<StockRecord>;

    async fn set_reorder_level(&self, owner: ProductRef, level: i32) -> AppResult<StockRecord>;

    /// Records whose sellable quantity is at or below their reorder level
    async fn list_needing_reorder(&self, limit: i64) -> AppResult<Vec<StockRecord>>;
}

/// Append-only audit trail of stock changes
#[async_trait]
pub trait MovementLedger: Send + Sync {
    async fn append(&self, movement: NewMovement) -> AppResult<MovementRecord>;

    /// Newest first, at most `limit` entries
    async fn list(&self, owner: ProductRef, limit: i64) -> AppResult<Vec<MovementRecord>>;

    /// Every entry carrying `reference`, oldest first
    async fn list_by_reference(
        &self,
        reference: &MovementReference,
    ) -> AppResult<Vec<MovementRecord>>;
}

/// Supplier replenishment history
#[async_trait]
pub trait RestockLog: Send + Sync {
    async fn record(&self, restock: RestockRecord) -> AppResult<RestockRecord>;

    async fn list(&self, owner: ProductRef, limit: i64) -> AppResult<Vec<RestockRecord>>;
}

/// Read access to products and sizes, plus the out-of-stock flag
#[async_trait]
pub trait CatalogRepository: Send + Sync {
    async fn get_product(&self, id: Uuid) -> AppResult<Option<Product>>;

    async fn get_size(&self, id: Uuid) -> AppResult<Option<ProductSize>>;

    async fn mark_product_out_of_stock(&self, id: Uuid) -> AppResult<()>;
}

/// Deals and promotions
#[async_trait]
pub trait OfferRepository: Send + Sync {
    async fn get_offer(&self, offer: OfferRef) -> AppResult<Option<CompositeOffer>>;

    async fn list_active_offers(&self) -> AppResult<Vec<CompositeOffer>>;

    /// Returns false when the flag already had that value
    async fn set_offer_active(&self, offer: OfferRef, active: bool) -> AppResult<bool>;
}

/// Order persistence
#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn find_order_by_number(&self, order_number: &str) -> AppResult<Option<Order>>;

    /// Insert unless an order with the same number exists, in which case
    /// the existing order is returned
    async fn create_order(&self, order: NewOrder) -> AppResult<OrderInsert>;

    async fn create_order_items(
        &self,
        order_id: Uuid,
        items: Vec<NewOrderItem>,
    ) -> AppResult<Vec<OrderItem>>;

    async fn list_order_items(&self, order_id: Uuid) -> AppResult<Vec<OrderItem>>;

    /// Compare-and-set on the order status; false when `from` did not match
    async fn transition_status(
        &self,
        order_id: Uuid,
        from: OrderStatus,
        to: OrderStatus,
    ) -> AppResult<bool>;
}

/// Raw gateway notifications kept for audit
#[async_trait]
pub trait NotificationLog: Send + Sync {
    /// Keyed on (signature, external id, raw status) so an unsigned
    /// PENDING does not shadow the COMPLETE that follows it
    async fn is_recorded(
        &self,
        signature: Option<&str>,
        external_id: &str,
        status: &str,
    ) -> AppResult<bool>;

    async fn record(&self, notification: NotificationRecord) -> AppResult<()>;
}

/// Every store and collaborator the services need, behind trait objects
#[derive(Clone)]
pub struct Stores {
    pub stock: Arc<dyn StockStore>,
    pub movements: Arc<dyn MovementLedger>,
    pub restocks: Arc<dyn RestockLog>,
    pub catalog: Arc<dyn CatalogRepository>,
    pub offers: Arc<dyn OfferRepository>,
    pub orders: Arc<dyn OrderRepository>,
    pub notifications: Arc<dyn NotificationLog>,
    pub carts: Arc<dyn CartSource>,
    pub coupons: Arc<dyn CouponLedger>,
    pub loyalty: Arc<dyn LoyaltyClient>,
    pub contexts: Arc<dyn PaymentContextStore>,
    pub clock: Arc<dyn Clock>,
}
