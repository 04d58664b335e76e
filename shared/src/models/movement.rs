//! Stock movement ledger models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::ProductRef;

/// Kind of stock change recorded in the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MovementType {
    In,
    Out,
    Adjustment,
    Return,
}

impl MovementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementType::In => "IN",
            MovementType::Out => "OUT",
            MovementType::Adjustment => "ADJUSTMENT",
            MovementType::Return => "RETURN",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "IN" => Some(MovementType::In),
            "OUT" => Some(MovementType::Out),
            "ADJUSTMENT" => Some(MovementType::Adjustment),
            "RETURN" => Some(MovementType::Return),
            _ => None,
        }
    }
}

/// Polymorphic pointer to whatever caused a movement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementReference {
    pub reference_id: String,
    pub reference_type: String,
}

impl MovementReference {
    pub fn order(order_id: Uuid) -> Self {
        Self {
            reference_id: order_id.to_string(),
            reference_type: "order".to_string(),
        }
    }

    pub fn restock(restock_id: Uuid) -> Self {
        Self {
            reference_id: restock_id.to_string(),
            reference_type: "restock".to_string(),
        }
    }
}

/// Immutable ledger entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MovementRecord {
    pub id: Uuid,
    pub owner: ProductRef,
    pub movement_type: MovementType,
    /// Signed: positive adds to the shelf, negative removes from it
    pub quantity: i32,
    pub reason: String,
    pub reference: Option<MovementReference>,
    pub created_at: DateTime<Utc>,
}

/// Ledger entry before it is appended
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMovement {
    pub owner: ProductRef,
    pub movement_type: MovementType,
    pub quantity: i32,
    pub reason: String,
    pub reference: Option<MovementReference>,
}

impl NewMovement {
    pub fn stock_in(owner: ProductRef, qty: i32, reason: impl Into<String>) -> Self {
        Self {
            owner,
            movement_type: MovementType::In,
            quantity: qty.abs(),
            reason: reason.into(),
            reference: None,
        }
    }

    pub fn stock_out(owner: ProductRef, qty: i32, reason: impl Into<String>) -> Self {
        Self {
            owner,
            movement_type: MovementType::Out,
            quantity: -qty.abs(),
            reason: reason.into(),
            reference: None,
        }
    }

    pub fn adjustment(owner: ProductRef, delta: i32, reason: impl Into<String>) -> Self {
        Self {
            owner,
            movement_type: MovementType::Adjustment,
            quantity: delta,
            reason: reason.into(),
            reference: None,
        }
    }

    pub fn returned(owner: ProductRef, qty: i32, reason: impl Into<String>) -> Self {
        Self {
            owner,
            movement_type: MovementType::Return,
            quantity: qty.abs(),
            reason: reason.into(),
            reference: None,
        }
    }

    pub fn with_reference(mut self, reference: MovementReference) -> Self {
        self.reference = Some(reference);
        self
    }

    /// Materialize the entry with its id and timestamp
    pub fn into_record(self, now: DateTime<Utc>) -> MovementRecord {
        MovementRecord {
            id: Uuid::new_v4(),
            owner: self.owner,
            movement_type: self.movement_type,
            quantity: self.quantity,
            reason: self.reason,
            reference: self.reference,
            created_at: now,
        }
    }
}
