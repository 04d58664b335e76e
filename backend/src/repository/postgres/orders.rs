//! PostgreSQL orders and payment notification log

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use shared::{
    ContactDetails, LineItem, NewOrder, NewOrderItem, NotificationRecord, Order, OrderInsert,
    OrderItem, OrderStatus, PaymentStatus,
};

use crate::error::{AppError, AppResult};
use crate::repository::{NotificationLog, OrderRepository};

const ORDER_COLUMNS: &str = "id, order_number, user_id, status, payment_status, subtotal, \
     discount, shipping, tax, total_amount, coupon_id, delivery_address, delivery_method, \
     contact_first_name, contact_last_name, contact_email, contact_phone, created_at";

#[derive(Clone)]
pub struct PgOrderRepository {
    db: PgPool,
}

#[derive(Debug, FromRow)]
struct OrderRow {
    id: Uuid,
    order_number: String,
    user_id: Uuid,
    status: String,
    payment_status: String,
    subtotal: Decimal,
    discount: Decimal,
    shipping: Decimal,
    tax: Decimal,
    total_amount: Decimal,
    coupon_id: Option<Uuid>,
    delivery_address: String,
    delivery_method: String,
    contact_first_name: String,
    contact_last_name: String,
    contact_email: String,
    contact_phone: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = AppError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        let status = OrderStatus::from_str(&row.status).ok_or_else(|| {
            AppError::Internal(format!("Order {} has unknown status {}", row.id, row.status))
        })?;
        let payment_status = PaymentStatus::from_str(&row.payment_status).ok_or_else(|| {
            AppError::Internal(format!(
                "Order {} has unknown payment status {}",
                row.id, row.payment_status
            ))
        })?;

        Ok(Order {
            id: row.id,
            order_number: row.order_number,
            user_id: row.user_id,
            status,
            payment_status,
            subtotal: row.subtotal,
            discount: row.discount,
            shipping: row.shipping,
            tax: row.tax,
            total_amount: row.total_amount,
            coupon_id: row.coupon_id,
            delivery_address: row.delivery_address,
            delivery_method: row.delivery_method,
            contact: ContactDetails {
                first_name: row.contact_first_name,
                last_name: row.contact_last_name,
                email: row.contact_email,
                phone: row.contact_phone,
            },
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct OrderItemRow {
    id: Uuid,
    order_id: Uuid,
    product_id: Option<Uuid>,
    size_id: Option<Uuid>,
    deal_id: Option<Uuid>,
    promotion_id: Option<Uuid>,
    quantity: i32,
    unit_price: Decimal,
    total_price: Decimal,
}

impl TryFrom<OrderItemRow> for OrderItem {
    type Error = AppError;

    fn try_from(row: OrderItemRow) -> Result<Self, Self::Error> {
        let line = LineItem::from_columns(
            row.product_id,
            row.size_id,
            row.deal_id,
            row.promotion_id,
            row.quantity,
        )?;
        Ok(OrderItem {
            id: row.id,
            order_id: row.order_id,
            line,
            unit_price: row.unit_price,
            total_price: row.total_price,
        })
    }
}

impl PgOrderRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl OrderRepository for PgOrderRepository {
    async fn find_order_by_number(&self, order_number: &str) -> AppResult<Option<Order>> {
        let sql = format!("SELECT {} FROM orders WHERE order_number = $1", ORDER_COLUMNS);
        sqlx::query_as::<_, OrderRow>(&sql)
            .bind(order_number)
            .fetch_optional(&self.db)
            .await?
            .map(Order::try_from)
            .transpose()
    }

    async fn create_order(&self, order: NewOrder) -> AppResult<OrderInsert> {
        let sql = format!(
            "INSERT INTO orders ( \
                order_number, user_id, status, payment_status, subtotal, discount, shipping, \
                tax, total_amount, coupon_id, delivery_address, delivery_method, \
                contact_first_name, contact_last_name, contact_email, contact_phone \
             ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16) \
             ON CONFLICT (order_number) DO NOTHING \
             RETURNING {}",
            ORDER_COLUMNS
        );

        let inserted = sqlx::query_as::<_, OrderRow>(&sql)
            .bind(&order.order_number)
            .bind(order.user_id)
            .bind(order.status.as_str())
            .bind(order.payment_status.as_str())
            .bind(order.subtotal)
            .bind(order.discount)
            .bind(order.shipping)
            .bind(order.tax)
            .bind(order.total_amount)
            .bind(order.coupon_id)
            .bind(&order.delivery_address)
            .bind(&order.delivery_method)
            .bind(&order.contact.first_name)
            .bind(&order.contact.last_name)
            .bind(&order.contact.email)
            .bind(&order.contact.phone)
            .fetch_optional(&self.db)
            .await?;

        if let Some(row) = inserted {
            return Ok(OrderInsert::Created(row.try_into()?));
        }

        let existing = self
            .find_order_by_number(&order.order_number)
            .await?
            .ok_or_else(|| {
                AppError::Internal(format!(
                    "Order {} conflicted on insert but could not be read back",
                    order.order_number
                ))
            })?;
        Ok(OrderInsert::AlreadyExists(existing))
    }

    async fn create_order_items(
        &self,
        order_id: Uuid,
        items: Vec<NewOrderItem>,
    ) -> AppResult<Vec<OrderItem>> {
        let mut tx = self.db.begin().await?;
        let mut created = Vec::with_capacity(items.len());

        for item in items {
            let item = item.into_item(order_id);
            let (product_id, size_id, deal_id, promotion_id) = item.line.columns();

            sqlx::query(
                r#"
                INSERT INTO order_items (
                    id, order_id, product_id, size_id, deal_id, promotion_id,
                    quantity, unit_price, total_price
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
            )
            .bind(item.id)
            .bind(order_id)
            .bind(product_id)
            .bind(size_id)
            .bind(deal_id)
            .bind(promotion_id)
            .bind(item.line.quantity())
            .bind(item.unit_price)
            .bind(item.total_price)
            .execute(&mut *tx)
            .await?;

            created.push(item);
        }

        tx.commit().await?;
        Ok(created)
    }

    async fn list_order_items(&self, order_id: Uuid) -> AppResult<Vec<OrderItem>> {
        sqlx::query_as::<_, OrderItemRow>(
            r#"
            SELECT id, order_id, product_id, size_id, deal_id, promotion_id,
                   quantity, unit_price, total_price
            FROM order_items
            WHERE order_id = $1
            ORDER BY id
            "#,
        )
        .bind(order_id)
        .fetch_all(&self.db)
        .await?
        .into_iter()
        .map(OrderItem::try_from)
        .collect()
    }

    async fn transition_status(
        &self,
        order_id: Uuid,
        from: OrderStatus,
        to: OrderStatus,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            "UPDATE orders SET status = $3, updated_at = NOW() WHERE id = $1 AND status = $2",
        )
        .bind(order_id)
        .bind(from.as_str())
        .bind(to.as_str())
        .execute(&self.db)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}

// ============================================================================
// Notification Log
// ============================================================================

#[derive(Clone)]
pub struct PgNotificationLog {
    db: PgPool,
}

impl PgNotificationLog {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl NotificationLog for PgNotificationLog {
    async fn is_recorded(
        &self,
        signature: Option<&str>,
        external_id: &str,
        status: &str,
    ) -> AppResult<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM payment_notifications
                WHERE external_id = $2
                  AND status = $3
                  AND signature IS NOT DISTINCT FROM $1
            )
            "#,
        )
        .bind(signature)
        .bind(external_id)
        .bind(status)
        .fetch_one(&self.db)
        .await?;

        Ok(exists)
    }

    async fn record(&self, notification: NotificationRecord) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO payment_notifications (
                id, payment_reference, external_id, status, signature, payload, received_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(notification.id)
        .bind(&notification.payment_reference)
        .bind(&notification.external_id)
        .bind(&notification.status)
        .bind(&notification.signature)
        .bind(&notification.payload)
        .bind(notification.received_at)
        .execute(&self.db)
        .await?;

        Ok(())
    }
}
