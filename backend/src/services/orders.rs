//! Order cancellation and stock returns

use std::sync::Arc;

use shared::{MovementReference, Order, OrderStatus};

use crate::error::{AppError, AppResult};
use crate::repository::{OrderRepository, Stores};
use crate::services::stock::StockService;

#[derive(Clone)]
pub struct OrderService {
    orders: Arc<dyn OrderRepository>,
    stock: StockService,
}

impl OrderService {
    pub fn new(stores: &Stores) -> Self {
        Self {
            orders: stores.orders.clone(),
            stock: StockService::new(stores),
        }
    }

    pub async fn get(&self, order_number: &str) -> AppResult<Order> {
        self.orders
            .find_order_by_number(order_number)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Order {}", order_number)))
    }

    /// Cancel an order and put back exactly what settlement took off the shelf
    ///
    /// Returns follow the order's OUT movements, so constituents whose
    /// deduction was refused get nothing back and later edits to an offer
    /// do not change what is returned. Offers switched off while the order
    /// was placed stay off.
    pub async fn cancel_order(&self, order_number: &str, reason: &str) -> AppResult<Order> {
        let mut order = self.get(order_number).await?;

        if order.status == OrderStatus::Cancelled {
            return Err(AppError::InvalidStateTransition(format!(
                "Order {} is already cancelled",
                order_number
            )));
        }

        let reference = MovementReference::order(order.id);
        let returns = self.stock.outstanding_for(&reference).await?;

        if !self
            .orders
            .transition_status(order.id, order.status, OrderStatus::Cancelled)
            .await?
        {
            return Err(AppError::Conflict(format!(
                "Order {} changed while cancelling",
                order_number
            )));
        }
        order.status = OrderStatus::Cancelled;

        let reason = if reason.trim().is_empty() {
            format!("Order {} cancelled", order_number)
        } else {
            format!("Order {} cancelled: {}", order_number, reason.trim())
        };

        let mut failed = 0usize;
        for (owner, quantity) in returns {
            if let Err(e) = self
                .stock
                .return_stock(owner, quantity, &reason, Some(reference.clone()))
                .await
            {
                failed += 1;
                tracing::error!(%order_number, %owner, quantity, error = %e, "Failed to return stock");
            }
        }

        if failed > 0 {
            tracing::warn!(%order_number, failed, "Order cancelled with unreturned stock");
        } else {
            tracing::info!(%order_number, "Order cancelled, stock returned");
        }
        Ok(order)
    }
}
