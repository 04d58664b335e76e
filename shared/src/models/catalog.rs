//! Catalog entities the stock ledger reads

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A sellable product
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub is_active: bool,
    /// Cleared by settlement when a size sells out
    pub in_stock: bool,
}

/// A size (variant) of a product; stock is tracked per size
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductSize {
    pub id: Uuid,
    pub product_id: Uuid,
    pub label: String,
    pub is_active: bool,
}
