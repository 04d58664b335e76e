//! Cart source
//!
//! Carts are owned by the storefront; the ledger reads them at checkout and
//! settlement and clears them once an order exists.

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use shared::{Cart, CartItem, LineItem};

use crate::error::AppResult;

#[async_trait]
pub trait CartSource: Send + Sync {
    /// Cart with items and precomputed totals; empty when the user has none
    async fn get_full_cart(&self, user_id: Uuid) -> AppResult<Cart>;

    async fn clear_cart(&self, user_id: Uuid) -> AppResult<()>;
}

/// Cart source reading the storefront's cart tables
#[derive(Clone)]
pub struct PgCartSource {
    db: PgPool,
}

#[derive(Debug, FromRow)]
struct CartRow {
    id: Uuid,
    coupon_id: Option<Uuid>,
    subtotal: Decimal,
    discount_applied: Decimal,
    total_amount: Decimal,
}

#[derive(Debug, FromRow)]
struct CartItemRow {
    id: Uuid,
    product_id: Option<Uuid>,
    size_id: Option<Uuid>,
    deal_id: Option<Uuid>,
    promotion_id: Option<Uuid>,
    quantity: i32,
    unit_price: Decimal,
}

impl PgCartSource {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl CartSource for PgCartSource {
    async fn get_full_cart(&self, user_id: Uuid) -> AppResult<Cart> {
        let cart = sqlx::query_as::<_, CartRow>(
            r#"
            SELECT id, coupon_id, subtotal, discount_applied, total_amount
            FROM carts
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?;

        let Some(cart) = cart else {
            return Ok(Cart::empty(user_id));
        };

        let rows = sqlx::query_as::<_, CartItemRow>(
            r#"
            SELECT id, product_id, size_id, deal_id, promotion_id, quantity, unit_price
            FROM cart_items
            WHERE cart_id = $1
            ORDER BY created_at, id
            "#,
        )
        .bind(cart.id)
        .fetch_all(&self.db)
        .await?;

        let items = rows
            .into_iter()
            .map(|row| {
                let line = LineItem::from_columns(
                    row.product_id,
                    row.size_id,
                    row.deal_id,
                    row.promotion_id,
                    row.quantity,
                )?;
                Ok(CartItem {
                    id: row.id,
                    line,
                    unit_price: row.unit_price,
                })
            })
            .collect::<AppResult<Vec<_>>>()?;

        Ok(Cart {
            user_id,
            items,
            subtotal: cart.subtotal,
            discount_applied: cart.discount_applied,
            total_amount: cart.total_amount,
            coupon_id: cart.coupon_id,
        })
    }

    async fn clear_cart(&self, user_id: Uuid) -> AppResult<()> {
        let mut tx = self.db.begin().await?;

        sqlx::query(
            "DELETE FROM cart_items WHERE cart_id IN (SELECT id FROM carts WHERE user_id = $1)",
        )
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            UPDATE carts
            SET subtotal = 0, discount_applied = 0, total_amount = 0, coupon_id = NULL,
                updated_at = NOW()
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }
}
