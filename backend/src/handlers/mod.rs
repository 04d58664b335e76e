//! HTTP handlers

pub mod checkout;
pub mod health;
pub mod offers;
pub mod orders;
pub mod payment;
pub mod stock;

pub use checkout::{cart_availability, checkout};
pub use health::health_check;
pub use offers::{offer_availability, offers_containing, reactivate_offer};
pub use orders::cancel_order;
pub use payment::payment_notify;
pub use stock::{
    adjust_stock, get_stock, list_movements, list_restocks, low_stock, release_stock,
    reserve_stock, restock, set_reorder_level,
};
