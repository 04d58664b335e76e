//! Business logic services for the marketplace stock ledger

pub mod availability;
pub mod checkout;
pub mod offers;
pub mod orders;
pub mod payment_context;
pub mod payment_signature;
pub mod settlement;
pub mod stock;

pub use availability::{AvailabilityChecker, CartAvailability, ItemAvailability};
pub use checkout::{CheckoutRequest, CheckoutResponse, CheckoutService};
pub use offers::OfferResolver;
pub use orders::OrderService;
pub use payment_context::{
    spawn_context_sweeper, InMemoryPaymentContextStore, PaymentContextStore, PgPaymentContextStore,
};
pub use payment_signature::PaymentSigner;
pub use settlement::{SettlementEngine, SettlementOutcome, SettlementState};
pub use stock::StockService;
