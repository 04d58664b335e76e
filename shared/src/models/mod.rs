//! Domain models for the marketplace stock ledger

mod cart;
mod catalog;
mod movement;
mod offer;
mod order;
mod payment;
mod stock;

pub use cart::*;
pub use catalog::*;
pub use movement::*;
pub use offer::*;
pub use order::*;
pub use payment::*;
pub use stock::*;
