//! Stock record model and counter arithmetic

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::types::ProductRef;

/// Available and reserved counters for one product or variant
///
/// `quantity_available` is the on-hand count; `quantity_reserved` is the
/// part of it held for someone. Neither is ever negative and reserved never
/// exceeds available.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockRecord {
    pub id: Uuid,
    pub owner: ProductRef,
    pub quantity_available: i32,
    pub quantity_reserved: i32,
    pub reorder_level: i32,
    pub warehouse_location: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Errors raised by stock counter mutations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StockError {
    #[error("Insufficient stock for {owner}: requested {requested}, sellable {sellable}")]
    Insufficient {
        owner: ProductRef,
        requested: i32,
        sellable: i32,
    },

    #[error("Cannot release {requested} from {owner}: only {reserved} reserved")]
    ReleaseExceedsReserved {
        owner: ProductRef,
        requested: i32,
        reserved: i32,
    },

    #[error("Quantity must be positive, got {0}")]
    InvalidQuantity(i32),

    #[error("Reorder level cannot be negative, got {0}")]
    InvalidReorderLevel(i32),

    #[error("Stock counter overflow for {0}")]
    Overflow(ProductRef),
}

impl StockRecord {
    /// Create a fresh record with nothing reserved
    pub fn new(owner: ProductRef, initial_available: i32, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner,
            quantity_available: initial_available.max(0),
            quantity_reserved: 0,
            reorder_level: 0,
            warehouse_location: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Units that can still be promised to a buyer
    pub fn sellable(&self) -> i32 {
        self.quantity_available - self.quantity_reserved
    }

    pub fn is_out_of_stock(&self) -> bool {
        self.sellable() < 1
    }

    pub fn needs_reorder(&self) -> bool {
        self.sellable() <= self.reorder_level
    }

    /// Hold `qty` units without removing them from the shelf
    pub fn reserve(&mut self, qty: i32) -> Result<(), StockError> {
        ensure_positive(qty)?;
        if qty > self.sellable() {
            return Err(self.insufficient(qty));
        }
        self.quantity_reserved = self
            .quantity_reserved
            .checked_add(qty)
            .ok_or(StockError::Overflow(self.owner))?;
        Ok(())
    }

    /// Return held units to the sellable pool
    pub fn release(&mut self, qty: i32) -> Result<(), StockError> {
        ensure_positive(qty)?;
        if qty > self.quantity_reserved {
            return Err(StockError::ReleaseExceedsReserved {
                owner: self.owner,
                requested: qty,
                reserved: self.quantity_reserved,
            });
        }
        self.quantity_reserved -= qty;
        Ok(())
    }

    /// Remove `qty` units from the shelf, consuming a reservation first
    ///
    /// Whatever the reservation does not cover must come out of the sellable
    /// pool, so deducting without any prior reservation is allowed. Returns
    /// the number of reserved units consumed.
    pub fn deduct(&mut self, qty: i32) -> Result<i32, StockError> {
        ensure_positive(qty)?;
        let consumed = qty.min(self.quantity_reserved);
        let uncovered = qty - consumed;
        if uncovered > self.sellable() {
            return Err(self.insufficient(qty));
        }
        self.quantity_available -= qty;
        self.quantity_reserved -= consumed;
        Ok(consumed)
    }

    /// Put units back on the shelf (restock, refund, return)
    pub fn add_available(&mut self, qty: i32) -> Result<(), StockError> {
        ensure_positive(qty)?;
        self.quantity_available = self
            .quantity_available
            .checked_add(qty)
            .ok_or(StockError::Overflow(self.owner))?;
        Ok(())
    }

    /// Apply a signed manual correction; the shelf may not drop below what is reserved
    pub fn adjust(&mut self, delta: i32) -> Result<(), StockError> {
        if delta == 0 {
            return Err(StockError::InvalidQuantity(0));
        }
        if delta > 0 {
            return self.add_available(delta);
        }
        let removal = delta.checked_neg().ok_or(StockError::Overflow(self.owner))?;
        if removal > self.sellable() {
            return Err(self.insufficient(removal));
        }
        self.quantity_available -= removal;
        Ok(())
    }

    pub fn set_reorder_level(&mut self, level: i32) -> Result<(), StockError> {
        if level < 0 {
            return Err(StockError::InvalidReorderLevel(level));
        }
        self.reorder_level = level;
        Ok(())
    }

    fn insufficient(&self, requested: i32) -> StockError {
        StockError::Insufficient {
            owner: self.owner,
            requested,
            sellable: self.sellable(),
        }
    }
}

fn ensure_positive(qty: i32) -> Result<(), StockError> {
    if qty <= 0 {
        return Err(StockError::InvalidQuantity(qty));
    }
    Ok(())
}

/// Supplier replenishment event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestockRecord {
    pub id: Uuid,
    pub owner: ProductRef,
    pub quantity: i32,
    pub cost_per_unit: rust_decimal::Decimal,
    pub supplier_name: String,
    pub restock_date: chrono::NaiveDate,
    pub created_at: DateTime<Utc>,
}
