//! Cart and line item models

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::types::{OfferKind, OfferRef, ProductRef};

/// What a cart or order line sells: a product, a deal or a promotion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LineItem {
    Product {
        product_id: Uuid,
        size_id: Option<Uuid>,
        quantity: i32,
    },
    Deal {
        deal_id: Uuid,
        quantity: i32,
    },
    Promotion {
        promotion_id: Uuid,
        quantity: i32,
    },
}

/// A stored line did not populate exactly one of product/deal/promotion
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Line item must reference exactly one of product, deal or promotion (found {populated})")]
pub struct LineItemShapeError {
    pub populated: usize,
}

impl LineItem {
    /// Decode the three nullable storage columns into the sum type
    pub fn from_columns(
        product_id: Option<Uuid>,
        size_id: Option<Uuid>,
        deal_id: Option<Uuid>,
        promotion_id: Option<Uuid>,
        quantity: i32,
    ) -> Result<Self, LineItemShapeError> {
        match (product_id, deal_id, promotion_id) {
            (Some(product_id), None, None) => Ok(LineItem::Product {
                product_id,
                size_id,
                quantity,
            }),
            (None, Some(deal_id), None) => Ok(LineItem::Deal { deal_id, quantity }),
            (None, None, Some(promotion_id)) => Ok(LineItem::Promotion {
                promotion_id,
                quantity,
            }),
            _ => Err(LineItemShapeError {
                populated: [product_id, deal_id, promotion_id]
                    .iter()
                    .filter(|c| c.is_some())
                    .count(),
            }),
        }
    }

    /// Split back into (product_id, size_id, deal_id, promotion_id)
    pub fn columns(&self) -> (Option<Uuid>, Option<Uuid>, Option<Uuid>, Option<Uuid>) {
        match *self {
            LineItem::Product {
                product_id,
                size_id,
                ..
            } => (Some(product_id), size_id, None, None),
            LineItem::Deal { deal_id, .. } => (None, None, Some(deal_id), None),
            LineItem::Promotion { promotion_id, .. } => (None, None, None, Some(promotion_id)),
        }
    }

    pub fn quantity(&self) -> i32 {
        match *self {
            LineItem::Product { quantity, .. }
            | LineItem::Deal { quantity, .. }
            | LineItem::Promotion { quantity, .. } => quantity,
        }
    }

    pub fn offer_ref(&self) -> Option<OfferRef> {
        match *self {
            LineItem::Product { .. } => None,
            LineItem::Deal { deal_id, .. } => Some(OfferRef {
                kind: OfferKind::Deal,
                id: deal_id,
            }),
            LineItem::Promotion { promotion_id, .. } => Some(OfferRef {
                kind: OfferKind::Promotion,
                id: promotion_id,
            }),
        }
    }

    pub fn stock_ref(&self) -> Option<ProductRef> {
        match *self {
            LineItem::Product {
                product_id,
                size_id,
                ..
            } => Some(ProductRef::for_line(product_id, size_id)),
            _ => None,
        }
    }
}

impl std::fmt::Display for LineItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LineItem::Product { product_id, .. } => write!(f, "Product ({})", product_id),
            LineItem::Deal { deal_id, .. } => write!(f, "Deal ({})", deal_id),
            LineItem::Promotion { promotion_id, .. } => write!(f, "Promotion ({})", promotion_id),
        }
    }
}

/// One line of a user's cart
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartItem {
    pub id: Uuid,
    pub line: LineItem,
    pub unit_price: Decimal,
}

impl CartItem {
    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.line.quantity())
    }
}

/// A user's cart with totals already computed by the cart service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cart {
    pub user_id: Uuid,
    pub items: Vec<CartItem>,
    pub subtotal: Decimal,
    pub discount_applied: Decimal,
    pub total_amount: Decimal,
    pub coupon_id: Option<Uuid>,
}

impl Cart {
    pub fn empty(user_id: Uuid) -> Self {
        Self {
            user_id,
            items: Vec::new(),
            subtotal: Decimal::ZERO,
            discount_applied: Decimal::ZERO,
            total_amount: Decimal::ZERO,
            coupon_id: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
