//! Collaborators owned by other parts of the marketplace

pub mod cart;
pub mod coupon;
pub mod loyalty;

pub use cart::{CartSource, PgCartSource};
pub use coupon::{CouponLedger, PgCouponLedger};
pub use loyalty::{DisabledLoyalty, HttpLoyaltyClient, LoyaltyAward, LoyaltyClient};
