//! Stock service: counter mutations paired with ledger entries

use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

use shared::{
    MovementRecord, MovementReference, MovementType, NewMovement, ProductRef, RestockRecord,
    StockRecord,
};

use crate::clock::Clock;
use crate::error::{AppError, AppResult};
use crate::repository::{MovementLedger, RestockLog, StockStore, Stores};

const DEFAULT_HISTORY_LIMIT: i64 = 50;
const MAX_HISTORY_LIMIT: i64 = 500;

/// Stock service for counters, movements and restocks
#[derive(Clone)]
pub struct StockService {
    stock: Arc<dyn StockStore>,
    movements: Arc<dyn MovementLedger>,
    restocks: Arc<dyn RestockLog>,
    clock: Arc<dyn Clock>,
}

/// Input for recording a supplier restock
#[derive(Debug, Deserialize)]
pub struct RestockInput {
    pub quantity: i32,
    pub cost_per_unit: Decimal,
    pub supplier_name: String,
    pub restock_date: Option<NaiveDate>,
}

/// Input for a manual correction
#[derive(Debug, Deserialize)]
pub struct AdjustInput {
    pub delta: i32,
    pub reason: String,
}

fn clamp_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(DEFAULT_HISTORY_LIMIT).clamp(1, MAX_HISTORY_LIMIT)
}

impl StockService {
    pub fn new(stores: &Stores) -> Self {
        Self {
            stock: stores.stock.clone(),
            movements: stores.movements.clone(),
            restocks: stores.restocks.clone(),
            clock: stores.clock.clone(),
        }
    }

    /// Get the stock record for a product or variant
    pub async fn get_record(&self, owner: ProductRef) -> AppResult<StockRecord> {
        self.stock
            .find(owner)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Stock record for {}", owner)))
    }

    /// Hold units for a buyer; the on-hand count is unchanged
    pub async fn reserve(&self, owner: ProductRef, quantity: i32) -> AppResult<StockRecord> {
        let record = self.stock.reserve(owner, quantity).await?;
        tracing::info!(%owner, quantity, reserved = record.quantity_reserved, "Stock reserved");
        Ok(record)
    }

    pub async fn release(&self, owner: ProductRef, quantity: i32) -> AppResult<StockRecord> {
        let record = self.stock.release(owner, quantity).await?;
        tracing::info!(%owner, quantity, reserved = record.quantity_reserved, "Stock released");
        Ok(record)
    }

    /// Remove sold units and record an OUT movement
    pub async fn deduct_with_movement(
        &self,
        owner: ProductRef,
        quantity: i32,
        reason: &str,
        reference: Option<MovementReference>,
    ) -> AppResult<StockRecord> {
        let record = self.stock.deduct(owner, quantity).await?;

        let mut movement = NewMovement::stock_out(owner, quantity, reason);
        if let Some(reference) = reference {
            movement = movement.with_reference(reference);
        }
        self.append_movement(movement).await;

        tracing::debug!(
            %owner,
            quantity,
            sellable = record.sellable(),
            "Stock deducted"
        );
        Ok(record)
    }

    /// Put units back after a cancelled or returned order
    pub async fn return_stock(
        &self,
        owner: ProductRef,
        quantity: i32,
        reason: &str,
        reference: Option<MovementReference>,
    ) -> AppResult<StockRecord> {
        let record = self.stock.add_available(owner, quantity).await?;

        let mut movement = NewMovement::returned(owner, quantity, reason);
        if let Some(reference) = reference {
            movement = movement.with_reference(reference);
        }
        self.append_movement(movement).await;

        Ok(record)
    }

    /// Record a supplier delivery: restock history, counter and IN movement
    pub async fn restock(&self, owner: ProductRef, input: RestockInput) -> AppResult<RestockRecord> {
        if input.quantity <= 0 {
            return Err(AppError::Validation {
                field: "quantity".to_string(),
                message: "Quantity must be positive".to_string(),
            });
        }
        if input.cost_per_unit < Decimal::ZERO {
            return Err(AppError::Validation {
                field: "cost_per_unit".to_string(),
                message: "Cost per unit cannot be negative".to_string(),
            });
        }
        let supplier_name = input.supplier_name.trim().to_string();
        if supplier_name.is_empty() {
            return Err(AppError::Validation {
                field: "supplier_name".to_string(),
                message: "Supplier name is required".to_string(),
            });
        }

        let now = self.clock.now();
        self.stock.add_available(owner, input.quantity).await?;

        let recorded = self
            .restocks
            .record(RestockRecord {
                id: Uuid::new_v4(),
                owner,
                quantity: input.quantity,
                cost_per_unit: input.cost_per_unit,
                supplier_name,
                restock_date: input.restock_date.unwrap_or_else(|| now.date_naive()),
                created_at: now,
            })
            .await;

        // Take the units back off when the history write fails
        let restock = match recorded {
            Ok(restock) => restock,
            Err(e) => {
                if let Err(undo) = self.stock.adjust(owner, -input.quantity).await {
                    tracing::error!(
                        %owner,
                        quantity = input.quantity,
                        error = %undo,
                        "Failed to reverse restock after history write failed"
                    );
                }
                return Err(e);
            }
        };

        self.append_movement(
            NewMovement::stock_in(owner, input.quantity, format!("Restock from {}", restock.supplier_name))
                .with_reference(MovementReference::restock(restock.id)),
        )
        .await;

        tracing::info!(%owner, quantity = input.quantity, restock_id = %restock.id, "Stock restocked");
        Ok(restock)
    }

    /// Apply a signed manual correction with an ADJUSTMENT movement
    pub async fn adjust(&self, owner: ProductRef, input: AdjustInput) -> AppResult<StockRecord> {
        let reason = input.reason.trim();
        if reason.is_empty() {
            return Err(AppError::Validation {
                field: "reason".to_string(),
                message: "Adjustments need a reason".to_string(),
            });
        }

        let record = self.stock.adjust(owner, input.delta).await?;
        self.append_movement(NewMovement::adjustment(owner, input.delta, reason))
            .await;

        tracing::info!(%owner, delta = input.delta, reason, "Stock adjusted");
        Ok(record)
    }

    pub async fn set_reorder_level(&self, owner: ProductRef, level: i32) -> AppResult<StockRecord> {
        self.stock.set_reorder_level(owner, level).await
    }

    /// Units still out per owner across the OUT and RETURN entries
    /// carrying `reference`, in the order owners first appear
    pub async fn outstanding_for(
        &self,
        reference: &MovementReference,
    ) -> AppResult<Vec<(ProductRef, i32)>> {
        let mut outstanding: Vec<(ProductRef, i32)> = Vec::new();
        for movement in self.movements.list_by_reference(reference).await? {
            if !matches!(movement.movement_type, MovementType::Out | MovementType::Return) {
                continue;
            }
            match outstanding.iter_mut().find(|(owner, _)| *owner == movement.owner) {
                Some((_, units)) => *units -= movement.quantity,
                None => outstanding.push((movement.owner, -movement.quantity)),
            }
        }
        outstanding.retain(|(_, units)| *units > 0);
        Ok(outstanding)
    }

    /// Movement history, newest first
    pub async fn movements(
        &self,
        owner: ProductRef,
        limit: Option<i64>,
    ) -> AppResult<Vec<MovementRecord>> {
        self.movements.list(owner, clamp_limit(limit)).await
    }

    pub async fn restocks(
        &self,
        owner: ProductRef,
        limit: Option<i64>,
    ) -> AppResult<Vec<RestockRecord>> {
        self.restocks.list(owner, clamp_limit(limit)).await
    }

    /// Records at or below their reorder level, emptiest first
    pub async fn low_stock(&self, limit: Option<i64>) -> AppResult<Vec<StockRecord>> {
        self.stock.list_needing_reorder(clamp_limit(limit)).await
    }

    /// The counter change has already happened; a lost ledger entry is
    /// logged for reconciliation rather than undoing the sale
    async fn append_movement(&self, movement: NewMovement) {
        let owner = movement.owner;
        let movement_type = movement.movement_type.as_str();
        if let Err(e) = self.movements.append(movement).await {
            tracing::error!(%owner, movement_type, error = %e, "Failed to record stock movement");
        }
    }
}
