//! Order models

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{ContactDetails, LineItem, PaymentStatus};

/// Fulfilment status of an order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(OrderStatus::Pending),
            "confirmed" => Some(OrderStatus::Confirmed),
            "cancelled" => Some(OrderStatus::Cancelled),
            _ => None,
        }
    }
}

/// A placed order; `order_number` is the payment reference it was paid under
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub order_number: String,
    pub user_id: Uuid,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub shipping: Decimal,
    pub tax: Decimal,
    pub total_amount: Decimal,
    pub coupon_id: Option<Uuid>,
    pub delivery_address: String,
    pub delivery_method: String,
    pub contact: ContactDetails,
    pub created_at: DateTime<Utc>,
}

/// Order before it is persisted
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub order_number: String,
    pub user_id: Uuid,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub shipping: Decimal,
    pub tax: Decimal,
    pub total_amount: Decimal,
    pub coupon_id: Option<Uuid>,
    pub delivery_address: String,
    pub delivery_method: String,
    pub contact: ContactDetails,
}

impl NewOrder {
    pub fn into_order(self, now: DateTime<Utc>) -> Order {
        Order {
            id: Uuid::new_v4(),
            order_number: self.order_number,
            user_id: self.user_id,
            status: self.status,
            payment_status: self.payment_status,
            subtotal: self.subtotal,
            discount: self.discount,
            shipping: self.shipping,
            tax: self.tax,
            total_amount: self.total_amount,
            coupon_id: self.coupon_id,
            delivery_address: self.delivery_address,
            delivery_method: self.delivery_method,
            contact: self.contact,
            created_at: now,
        }
    }
}

/// One line of an order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub line: LineItem,
    pub unit_price: Decimal,
    pub total_price: Decimal,
}

/// Order line before it is persisted
#[derive(Debug, Clone)]
pub struct NewOrderItem {
    pub line: LineItem,
    pub unit_price: Decimal,
}

impl NewOrderItem {
    pub fn into_item(self, order_id: Uuid) -> OrderItem {
        OrderItem {
            id: Uuid::new_v4(),
            order_id,
            total_price: self.unit_price * Decimal::from(self.line.quantity()),
            line: self.line,
            unit_price: self.unit_price,
        }
    }
}

/// Outcome of a conflict-aware order insert
#[derive(Debug, Clone)]
pub enum OrderInsert {
    Created(Order),
    /// Another delivery already created the order for this number
    AlreadyExists(Order),
}
