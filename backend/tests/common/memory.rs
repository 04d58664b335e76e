//! In-memory stores for integration tests
//!
//! One `MemoryDatabase` implements every store trait over a single mutex so
//! each operation is atomic, mirroring the single-statement guarantees of
//! the PostgreSQL stores. Failure switches drive the error paths.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Duration;
use rust_decimal::Decimal;
use uuid::Uuid;

use shared::{
    Cart, CompositeOffer, MovementRecord, MovementReference, NewMovement, NewOrder, NewOrderItem,
    NotificationRecord, OfferRef, Order, OrderInsert, OrderItem, OrderStatus, Product,
    ProductRef, ProductSize, RestockRecord, StockRecord,
};

use market_server::clock::{Clock, SystemClock};
use market_server::error::{AppError, AppResult};
use market_server::external::{
    CartSource, CouponLedger, DisabledLoyalty, LoyaltyAward, LoyaltyClient,
};
use market_server::repository::{
    CatalogRepository, MovementLedger, NotificationLog, OfferRepository, OrderRepository,
    RestockLog, StockStore, Stores,
};
use market_server::services::payment_context::InMemoryPaymentContextStore;

#[derive(Default)]
struct State {
    stock: HashMap<ProductRef, StockRecord>,
    movements: Vec<MovementRecord>,
    restocks: Vec<RestockRecord>,
    products: HashMap<Uuid, Product>,
    sizes: HashMap<Uuid, ProductSize>,
    offers: Vec<CompositeOffer>,
    orders: HashMap<String, Order>,
    order_items: HashMap<Uuid, Vec<OrderItem>>,
    notifications: Vec<NotificationRecord>,
    carts: HashMap<Uuid, Cart>,
    coupon_usage: HashMap<Uuid, i64>,
    failures: Failures,
}

#[derive(Default)]
struct Failures {
    stock_for: HashSet<ProductRef>,
    movements: bool,
    notifications: bool,
    order_items: bool,
    restocks: bool,
    cart_clear: bool,
    coupons: bool,
}

fn injected(what: &str) -> AppError {
    AppError::Internal(format!("{} unavailable", what))
}

#[derive(Clone)]
pub struct MemoryDatabase {
    state: Arc<Mutex<State>>,
    clock: Arc<dyn Clock>,
}

impl Default for MemoryDatabase {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl MemoryDatabase {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Arc::new(Mutex::new(State::default())),
            clock,
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Every store backed by this database, with loyalty disabled and a
    /// 24 hour in-memory context store on the same clock
    pub fn stores(&self) -> Stores {
        let db = Arc::new(self.clone());
        Stores {
            stock: db.clone(),
            movements: db.clone(),
            restocks: db.clone(),
            catalog: db.clone(),
            offers: db.clone(),
            orders: db.clone(),
            notifications: db.clone(),
            carts: db.clone(),
            coupons: db,
            loyalty: Arc::new(DisabledLoyalty),
            contexts: Arc::new(InMemoryPaymentContextStore::new(
                self.clock.clone(),
                Duration::hours(24),
            )),
            clock: self.clock.clone(),
        }
    }

    // ------------------------------------------------------------------------
    // Seeding
    // ------------------------------------------------------------------------

    pub fn insert_product(&self, product: Product) {
        self.lock().products.insert(product.id, product);
    }

    pub fn insert_size(&self, size: ProductSize) {
        self.lock().sizes.insert(size.id, size);
    }

    /// Create or replace a stock record with the given counters
    pub fn set_stock(&self, owner: ProductRef, available: i32, reserved: i32) -> StockRecord {
        let mut record = StockRecord::new(owner, available, self.clock.now());
        record.quantity_reserved = reserved;
        self.lock().stock.insert(owner, record.clone());
        record
    }

    pub fn insert_offer(&self, offer: CompositeOffer) {
        let mut state = self.lock();
        state.offers.retain(|o| o.offer_ref() != offer.offer_ref());
        state.offers.push(offer);
    }

    pub fn set_cart(&self, cart: Cart) {
        self.lock().carts.insert(cart.user_id, cart);
    }

    // ------------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------------

    pub fn stock(&self, owner: ProductRef) -> Option<StockRecord> {
        self.lock().stock.get(&owner).cloned()
    }

    pub fn product(&self, id: Uuid) -> Option<Product> {
        self.lock().products.get(&id).cloned()
    }

    pub fn offer(&self, offer: OfferRef) -> Option<CompositeOffer> {
        self.lock()
            .offers
            .iter()
            .find(|o| o.offer_ref() == offer)
            .cloned()
    }

    pub fn order_count(&self) -> usize {
        self.lock().orders.len()
    }

    pub fn order_items_for(&self, order_id: Uuid) -> Vec<OrderItem> {
        self.lock()
            .order_items
            .get(&order_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn movements_for(&self, owner: ProductRef) -> Vec<MovementRecord> {
        self.lock()
            .movements
            .iter()
            .filter(|m| m.owner == owner)
            .cloned()
            .collect()
    }

    pub fn notification_count(&self) -> usize {
        self.lock().notifications.len()
    }

    pub fn cart(&self, user_id: Uuid) -> Option<Cart> {
        self.lock().carts.get(&user_id).cloned()
    }

    pub fn coupon_usage(&self, coupon_id: Uuid) -> i64 {
        self.lock()
            .coupon_usage
            .get(&coupon_id)
            .copied()
            .unwrap_or_default()
    }

    // ------------------------------------------------------------------------
    // Failure switches
    // ------------------------------------------------------------------------

    pub fn fail_stock_for(&self, owner: ProductRef) {
        self.lock().failures.stock_for.insert(owner);
    }

    pub fn set_fail_movements(&self, fail: bool) {
        self.lock().failures.movements = fail;
    }

    pub fn set_fail_notifications(&self, fail: bool) {
        self.lock().failures.notifications = fail;
    }

    pub fn set_fail_order_items(&self, fail: bool) {
        self.lock().failures.order_items = fail;
    }

    pub fn set_fail_restocks(&self, fail: bool) {
        self.lock().failures.restocks = fail;
    }

    pub fn restock_count(&self) -> usize {
        self.lock().restocks.len()
    }

    pub fn set_fail_cart_clear(&self, fail: bool) {
        self.lock().failures.cart_clear = fail;
    }

    pub fn set_fail_coupons(&self, fail: bool) {
        self.lock().failures.coupons = fail;
    }

    /// Apply `op` to the record for `owner`, creating an empty record first
    fn mutate_stock<F>(&self, owner: ProductRef, op: F) -> AppResult<StockRecord>
    where
        F: FnOnce(&mut StockRecord) -> Result<(), shared::StockError>,
    {
        let now = self.clock.now();
        let mut state = self.lock();
        if state.failures.stock_for.contains(&owner) {
            return Err(injected("Stock store"));
        }

        let record = state
            .stock
            .entry(owner)
            .or_insert_with(|| StockRecord::new(owner, 0, now));

        // Work on a copy so a rejected mutation leaves the record untouched
        let mut updated = record.clone();
        op(&mut updated)?;
        updated.updated_at = now;
        *record = updated.clone();
        Ok(updated)
    }
}

#[async_trait]
impl StockStore for MemoryDatabase {
    async fn find(&self, owner: ProductRef) -> AppResult<Option<StockRecord>> {
        let state = self.lock();
        if state.failures.stock_for.contains(&owner) {
            return Err(injected("Stock store"));
        }
        Ok(state.stock.get(&owner).cloned())
    }

    async fn find_or_create(
        &self,
        owner: ProductRef,
        initial_available: i32,
    ) -> AppResult<StockRecord> {
        let now = self.clock.now();
        let mut state = self.lock();
        if state.failures.stock_for.contains(&owner) {
            return Err(injected("Stock store"));
        }
        Ok(state
            .stock
            .entry(owner)
            .or_insert_with(|| StockRecord::new(owner, initial_available, now))
            .clone())
    }

    async fn reserve(&self, owner: ProductRef, qty: i32) -> AppResult<StockRecord> {
        self.mutate_stock(owner, |r| r.reserve(qty))
    }

    async fn release(&self, owner: ProductRef, qty: i32) -> AppResult<StockRecord> {
        self.mutate_stock(owner, |r| r.release(qty))
    }

    async fn deduct(&self, owner: ProductRef, qty: i32) -> AppResult<StockRecord> {
        self.mutate_stock(owner, |r| r.deduct(qty).map(|_| ()))
    }

    async fn add_available(&self, owner: ProductRef, qty: i32) -> AppResult<StockRecord> {
        self.mutate_stock(owner, |r| r.add_available(qty))
    }

    async fn adjust(&self, owner: ProductRef, delta: i32) -> AppResult<StockRecord> {
        self.mutate_stock(owner, |r| r.adjust(delta))
    }

    async fn set_reorder_level(&self, owner: ProductRef, level: i32) -> AppResult<StockRecord> {
        self.mutate_stock(owner, |r| r.set_reorder_level(level))
    }

    async fn list_needing_reorder(&self, limit: i64) -> AppResult<Vec<StockRecord>> {
        let state = self.lock();
        let mut low: Vec<StockRecord> = state
            .stock
            .values()
            .filter(|r| r.needs_reorder())
            .cloned()
            .collect();
        low.sort_by_key(|r| r.sellable());
        low.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(low)
    }
}

#[async_trait]
impl MovementLedger for MemoryDatabase {
    async fn append(&self, movement: NewMovement) -> AppResult<MovementRecord> {
        let record = movement.into_record(self.clock.now());
        let mut state = self.lock();
        if state.failures.movements {
            return Err(injected("Movement ledger"));
        }
        state.movements.push(record.clone());
        Ok(record)
    }

    async fn list(&self, owner: ProductRef, limit: i64) -> AppResult<Vec<MovementRecord>> {
        let state = self.lock();
        Ok(state
            .movements
            .iter()
            .rev()
            .filter(|m| m.owner == owner)
            .take(usize::try_from(limit).unwrap_or(0))
            .cloned()
            .collect())
    }

    async fn list_by_reference(
        &self,
        reference: &MovementReference,
    ) -> AppResult<Vec<MovementRecord>> {
        Ok(self
            .lock()
            .movements
            .iter()
            .filter(|m| m.reference.as_ref() == Some(reference))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl RestockLog for MemoryDatabase {
    async fn record(&self, restock: RestockRecord) -> AppResult<RestockRecord> {
        let mut state = self.lock();
        if state.failures.restocks {
            return Err(injected("Restock log"));
        }
        state.restocks.push(restock.clone());
        Ok(restock)
    }

    async fn list(&self, owner: ProductRef, limit: i64) -> AppResult<Vec<RestockRecord>> {
        let state = self.lock();
        let mut restocks: Vec<RestockRecord> = state
            .restocks
            .iter()
            .filter(|r| r.owner == owner)
            .cloned()
            .collect();
        restocks.sort_by(|a, b| {
            b.restock_date
                .cmp(&a.restock_date)
                .then(b.created_at.cmp(&a.created_at))
        });
        restocks.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(restocks)
    }
}

#[async_trait]
impl CatalogRepository for MemoryDatabase {
    async fn get_product(&self, id: Uuid) -> AppResult<Option<Product>> {
        Ok(self.lock().products.get(&id).cloned())
    }

    async fn get_size(&self, id: Uuid) -> AppResult<Option<ProductSize>> {
        Ok(self.lock().sizes.get(&id).cloned())
    }

    async fn mark_product_out_of_stock(&self, id: Uuid) -> AppResult<()> {
        if let Some(product) = self.lock().products.get_mut(&id) {
            product.in_stock = false;
        }
        Ok(())
    }
}

#[async_trait]
impl OfferRepository for MemoryDatabase {
    async fn get_offer(&self, offer: OfferRef) -> AppResult<Option<CompositeOffer>> {
        Ok(self.offer(offer))
    }

    async fn list_active_offers(&self) -> AppResult<Vec<CompositeOffer>> {
        Ok(self
            .lock()
            .offers
            .iter()
            .filter(|o| o.is_active)
            .cloned()
            .collect())
    }

    async fn set_offer_active(&self, offer: OfferRef, active: bool) -> AppResult<bool> {
        let mut state = self.lock();
        match state.offers.iter_mut().find(|o| o.offer_ref() == offer) {
            Some(o) if o.is_active != active => {
                o.is_active = active;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl OrderRepository for MemoryDatabase {
    async fn find_order_by_number(&self, order_number: &str) -> AppResult<Option<Order>> {
        Ok(self.lock().orders.get(order_number).cloned())
    }

    async fn create_order(&self, order: NewOrder) -> AppResult<OrderInsert> {
        let now = self.clock.now();
        let mut state = self.lock();
        if let Some(existing) = state.orders.get(&order.order_number) {
            return Ok(OrderInsert::AlreadyExists(existing.clone()));
        }
        let order = order.into_order(now);
        state.orders.insert(order.order_number.clone(), order.clone());
        Ok(OrderInsert::Created(order))
    }

    async fn create_order_items(
        &self,
        order_id: Uuid,
        items: Vec<NewOrderItem>,
    ) -> AppResult<Vec<OrderItem>> {
        let mut state = self.lock();
        if state.failures.order_items {
            return Err(injected("Order item store"));
        }
        let created: Vec<OrderItem> = items.into_iter().map(|i| i.into_item(order_id)).collect();
        state
            .order_items
            .entry(order_id)
            .or_default()
            .extend(created.iter().cloned());
        Ok(created)
    }

    async fn list_order_items(&self, order_id: Uuid) -> AppResult<Vec<OrderItem>> {
        Ok(self.order_items_for(order_id))
    }

    async fn transition_status(
        &self,
        order_id: Uuid,
        from: OrderStatus,
        to: OrderStatus,
    ) -> AppResult<bool> {
        let mut state = self.lock();
        match state.orders.values_mut().find(|o| o.id == order_id) {
            Some(order) if order.status == from => {
                order.status = to;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl NotificationLog for MemoryDatabase {
    async fn is_recorded(
        &self,
        signature: Option<&str>,
        external_id: &str,
        status: &str,
    ) -> AppResult<bool> {
        Ok(self.lock().notifications.iter().any(|n| {
            n.external_id == external_id
                && n.status == status
                && n.signature.as_deref() == signature
        }))
    }

    async fn record(&self, notification: NotificationRecord) -> AppResult<()> {
        let mut state = self.lock();
        if state.failures.notifications {
            return Err(injected("Notification log"));
        }
        state.notifications.push(notification);
        Ok(())
    }
}

#[async_trait]
impl CartSource for MemoryDatabase {
    async fn get_full_cart(&self, user_id: Uuid) -> AppResult<Cart> {
        Ok(self
            .cart(user_id)
            .unwrap_or_else(|| Cart::empty(user_id)))
    }

    async fn clear_cart(&self, user_id: Uuid) -> AppResult<()> {
        let mut state = self.lock();
        if state.failures.cart_clear {
            return Err(injected("Cart service"));
        }
        if let Some(cart) = state.carts.get_mut(&user_id) {
            *cart = Cart::empty(user_id);
        }
        Ok(())
    }
}

#[async_trait]
impl CouponLedger for MemoryDatabase {
    async fn increment_usage_count(&self, coupon_id: Uuid) -> AppResult<()> {
        let mut state = self.lock();
        if state.failures.coupons {
            return Err(injected("Coupon ledger"));
        }
        *state.coupon_usage.entry(coupon_id).or_default() += 1;
        Ok(())
    }
}

// ============================================================================
// Loyalty
// ============================================================================

/// Loyalty client that remembers every accrual it was asked for
#[derive(Clone, Default)]
pub struct RecordingLoyalty {
    calls: Arc<Mutex<Vec<(Uuid, Uuid, Decimal)>>>,
    fail: Arc<Mutex<bool>>,
}

impl RecordingLoyalty {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail(&self, fail: bool) {
        *self.fail.lock().unwrap_or_else(PoisonError::into_inner) = fail;
    }

    /// (user_id, order_id, total_amount) per call
    pub fn calls(&self) -> Vec<(Uuid, Uuid, Decimal)> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl LoyaltyClient for RecordingLoyalty {
    async fn add_points_for_order(
        &self,
        user_id: Uuid,
        order_id: Uuid,
        total_amount: Decimal,
    ) -> AppResult<LoyaltyAward> {
        if *self.fail.lock().unwrap_or_else(PoisonError::into_inner) {
            return Err(AppError::ExternalService("Loyalty service down".to_string()));
        }
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((user_id, order_id, total_amount));
        Ok(LoyaltyAward {
            base_points: total_amount.trunc().try_into().unwrap_or_default(),
            bonus_points: 0,
        })
    }
}
