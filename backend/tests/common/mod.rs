//! Shared fixture for integration tests: in-memory stores on a manual clock

#![allow(dead_code)]

pub mod clock;
pub mod memory;

pub use clock::ManualClock;
pub use memory::{MemoryDatabase, RecordingLoyalty};

use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use market_server::config::{
    Config, ContextStoreBackend, DatabaseConfig, JwtConfig, LogConfig, LoyaltyConfig,
    PaymentConfig, ServerConfig,
};
use market_server::services::{PaymentSigner, SettlementEngine};
use market_server::{AppState, Stores};
use shared::{
    Cart, CartItem, CompositeOffer, ContactDetails, LineItem, OfferEntry, OfferKind, OfferRef,
    PaymentContext, PaymentNotification, Product, ProductRef, ProductSize,
};

pub const MERCHANT_ID: &str = "10000100";
pub const MERCHANT_KEY: &str = "46f0cd694581a";
pub const PASSPHRASE: &str = "jt7NOE43FZPn";
pub const JWT_SECRET: &str = "test-secret";

pub fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 14, 10, 0, 0).unwrap()
}

pub fn test_config() -> Config {
    Config {
        environment: "test".to_string(),
        server: ServerConfig::default(),
        database: DatabaseConfig {
            url: "postgres://localhost/unused".to_string(),
            max_connections: 1,
            min_connections: 0,
        },
        jwt: JwtConfig {
            secret: JWT_SECRET.to_string(),
        },
        payment: PaymentConfig {
            merchant_id: MERCHANT_ID.to_string(),
            merchant_key: MERCHANT_KEY.to_string(),
            passphrase: Some(PASSPHRASE.to_string()),
            gateway_url: "https://sandbox.gateway.test/eng/process".to_string(),
            return_url: "https://shop.test/checkout/success".to_string(),
            cancel_url: "https://shop.test/checkout/cancel".to_string(),
            notify_url: "https://api.shop.test/api/v1/payments/notify".to_string(),
            verify_signatures: true,
            context_ttl_hours: 24,
            sweep_interval_minutes: 60,
            context_store: ContextStoreBackend::Memory,
        },
        loyalty: LoyaltyConfig {
            endpoint: None,
            api_key: None,
            timeout_seconds: 5,
        },
        log: LogConfig { json: false },
    }
}

pub struct Fixture {
    pub db: MemoryDatabase,
    pub clock: ManualClock,
    pub loyalty: RecordingLoyalty,
    pub stores: Stores,
    pub config: Config,
}

impl Fixture {
    pub fn new() -> Self {
        let clock = ManualClock::new(start_time());
        let db = MemoryDatabase::new(Arc::new(clock.clone()));
        let loyalty = RecordingLoyalty::new();

        let mut stores = db.stores();
        stores.loyalty = Arc::new(loyalty.clone());

        Self {
            db,
            clock,
            loyalty,
            stores,
            config: test_config(),
        }
    }

    pub fn engine(&self) -> SettlementEngine {
        SettlementEngine::new(&self.stores, &self.config.payment)
    }

    pub fn app_state(&self) -> AppState {
        AppState {
            db: None,
            config: Arc::new(self.config.clone()),
            stores: self.stores.clone(),
        }
    }

    // ------------------------------------------------------------------------
    // Catalog and stock
    // ------------------------------------------------------------------------

    pub fn product(&self, name: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.db.insert_product(Product {
            id,
            name: name.to_string(),
            is_active: true,
            in_stock: true,
        });
        id
    }

    pub fn size(&self, product_id: Uuid, label: &str, is_active: bool) -> Uuid {
        let id = Uuid::new_v4();
        self.db.insert_size(ProductSize {
            id,
            product_id,
            label: label.to_string(),
            is_active,
        });
        id
    }

    /// Product with one active size holding `available` units
    pub fn sized_product(&self, name: &str, available: i32) -> (Uuid, Uuid) {
        let product_id = self.product(name);
        let size_id = self.size(product_id, "500g", true);
        self.db
            .set_stock(ProductRef::Variant(size_id), available, 0);
        (product_id, size_id)
    }

    pub fn offer(&self, kind: OfferKind, entries: Vec<OfferEntry>) -> OfferRef {
        let id = Uuid::new_v4();
        let now = self.clock_now();
        self.db.insert_offer(CompositeOffer {
            id,
            kind,
            name: format!("{} bundle", kind),
            is_active: true,
            start_date: now - Duration::days(1),
            end_date: now + Duration::days(30),
            entries,
        });
        OfferRef { kind, id }
    }

    pub fn deal(&self, entries: Vec<OfferEntry>) -> OfferRef {
        self.offer(OfferKind::Deal, entries)
    }

    pub fn clock_now(&self) -> DateTime<Utc> {
        use market_server::clock::Clock;
        self.clock.now()
    }

    pub fn sellable(&self, owner: ProductRef) -> i32 {
        self.db.stock(owner).map(|r| r.sellable()).unwrap_or(0)
    }

    pub fn available(&self, owner: ProductRef) -> i32 {
        self.db.stock(owner).map(|r| r.quantity_available).unwrap_or(0)
    }

    pub fn is_offer_active(&self, offer: OfferRef) -> bool {
        self.db.offer(offer).map(|o| o.is_active).unwrap_or(false)
    }

    // ------------------------------------------------------------------------
    // Carts and payments
    // ------------------------------------------------------------------------

    /// Cart whose lines cost `unit_price` each; totals computed from lines
    pub fn cart(&self, user_id: Uuid, lines: Vec<LineItem>, unit_price: &str) -> Cart {
        let unit_price = dec(unit_price);
        let items: Vec<CartItem> = lines
            .into_iter()
            .map(|line| CartItem {
                id: Uuid::new_v4(),
                line,
                unit_price,
            })
            .collect();
        let subtotal: Decimal = items.iter().map(|i| i.line_total()).sum();
        let cart = Cart {
            user_id,
            items,
            subtotal,
            discount_applied: Decimal::ZERO,
            total_amount: subtotal,
            coupon_id: None,
        };
        self.db.set_cart(cart.clone());
        cart
    }

    pub fn contact() -> ContactDetails {
        ContactDetails {
            first_name: "Thandi".to_string(),
            last_name: "Nkosi".to_string(),
            email: "thandi@example.com".to_string(),
            phone: "+27821234567".to_string(),
        }
    }

    pub async fn put_context(&self, reference: &str, user_id: Uuid) {
        self.stores
            .contexts
            .put(
                reference,
                PaymentContext {
                    user_id,
                    delivery_address: "12 Long Street, Cape Town".to_string(),
                    delivery_method: "courier".to_string(),
                    contact: Self::contact(),
                    created_at: self.clock_now(),
                },
            )
            .await
            .unwrap();
    }

    /// Correctly signed notification
    pub fn notification(&self, reference: &str, external_id: &str, status: &str) -> PaymentNotification {
        let mut n = PaymentNotification {
            m_payment_id: Some(reference.to_string()),
            pf_payment_id: Some(external_id.to_string()),
            payment_status: Some(status.to_string()),
            amount_gross: Some("100.00".to_string()),
            amount_fee: Some("2.30".to_string()),
            amount_net: Some("97.70".to_string()),
            merchant_id: Some(MERCHANT_ID.to_string()),
            email_address: Some("thandi@example.com".to_string()),
            item_name: Some(format!("Order {}", reference)),
            ..Default::default()
        };
        let signer = PaymentSigner::new(MERCHANT_KEY, Some(PASSPHRASE.to_string()));
        n.signature = Some(signer.sign(&n.signed_fields()).unwrap());
        n
    }
}

pub fn product_line(product_id: Uuid, size_id: Option<Uuid>, quantity: i32) -> LineItem {
    LineItem::Product {
        product_id,
        size_id,
        quantity,
    }
}

pub fn entry(product_id: Uuid, size_id: Option<Uuid>, quantity: i32) -> OfferEntry {
    OfferEntry {
        product_id,
        size_id,
        quantity,
    }
}
