//! Coupon usage counter

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AppError, AppResult};

#[async_trait]
pub trait CouponLedger: Send + Sync {
    async fn increment_usage_count(&self, coupon_id: Uuid) -> AppResult<()>;
}

#[derive(Clone)]
pub struct PgCouponLedger {
    db: PgPool,
}

impl PgCouponLedger {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl CouponLedger for PgCouponLedger {
    async fn increment_usage_count(&self, coupon_id: Uuid) -> AppResult<()> {
        let result = sqlx::query(
            "UPDATE coupons SET usage_count = usage_count + 1, updated_at = NOW() WHERE id = $1",
        )
        .bind(coupon_id)
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Coupon".to_string()));
        }

        Ok(())
    }
}
