//! PostgreSQL stock records, movement ledger and restock history

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use shared::{
    MovementRecord, MovementReference, MovementType, NewMovement, ProductRef, RestockRecord,
    StockError, StockRecord,
};

use crate::error::{AppError, AppResult};
use crate::repository::{MovementLedger, RestockLog, StockStore};

const STOCK_COLUMNS: &str = "id, product_variant_id, product_id, quantity_available, \
     quantity_reserved, reorder_level, warehouse_location, created_at, updated_at";

/// Guarded updates can lose a race with a concurrent restock; retry this many times
const MAX_GUARD_RETRIES: usize = 3;

#[derive(Clone)]
pub struct PgStockStore {
    db: PgPool,
}

#[derive(Debug, FromRow)]
struct StockRow {
    id: Uuid,
    product_variant_id: Option<Uuid>,
    product_id: Option<Uuid>,
    quantity_available: i32,
    quantity_reserved: i32,
    reorder_level: i32,
    warehouse_location: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<StockRow> for StockRecord {
    type Error = AppError;

    fn try_from(row: StockRow) -> Result<Self, Self::Error> {
        let owner = ProductRef::from_columns(row.product_variant_id, row.product_id)
            .ok_or_else(|| {
                AppError::Internal(format!("Stock record {} has no single owner", row.id))
            })?;
        Ok(StockRecord {
            id: row.id,
            owner,
            quantity_available: row.quantity_available,
            quantity_reserved: row.quantity_reserved,
            reorder_level: row.reorder_level,
            warehouse_location: row.warehouse_location,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn owner_column(owner: ProductRef) -> &'static str {
    match owner {
        ProductRef::Variant(_) => "product_variant_id",
        ProductRef::Product(_) => "product_id",
    }
}

/// Counter operation: the guarded SQL assignment/condition plus the
/// in-memory rule used to explain a rejected update
#[derive(Clone, Copy)]
enum Mutation {
    Reserve,
    Release,
    Deduct,
    Remove,
}

impl Mutation {
    fn set_clause(self) -> &'static str {
        match self {
            Mutation::Reserve => "quantity_reserved = quantity_reserved + $2",
            Mutation::Release => "quantity_reserved = quantity_reserved - $2",
            Mutation::Deduct => {
                "quantity_available = quantity_available - $2, \
                 quantity_reserved = quantity_reserved - LEAST(quantity_reserved, $2)"
            }
            Mutation::Remove => "quantity_available = quantity_available - $2",
        }
    }

    fn guard(self) -> &'static str {
        match self {
            Mutation::Reserve | Mutation::Remove => {
                "quantity_available - quantity_reserved >= $2"
            }
            Mutation::Release => "quantity_reserved >= $2",
            Mutation::Deduct => {
                "$2 - LEAST(quantity_reserved, $2) <= quantity_available - quantity_reserved"
            }
        }
    }

    fn explain(self, record: &mut StockRecord, qty: i32) -> Result<(), StockError> {
        match self {
            Mutation::Reserve => record.reserve(qty),
            Mutation::Release => record.release(qty),
            Mutation::Deduct => record.deduct(qty).map(|_| ()),
            Mutation::Remove => record.adjust(-qty),
        }
    }
}

impl PgStockStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Run a guarded single-row update
    ///
    /// When the guard rejects the row, the current record is re-read and the
    /// same rule is applied in memory to produce the error. If that check
    /// passes, a concurrent writer changed the row in between and the update
    /// is retried.
    async fn guarded(&self, owner: ProductRef, qty: i32, mutation: Mutation) -> AppResult<StockRecord> {
        if qty <= 0 {
            return Err(StockError::InvalidQuantity(qty).into());
        }

        let sql = format!(
            "UPDATE stock_records SET {set}, updated_at = NOW() \
             WHERE {col} = $1 AND {guard} RETURNING {cols}",
            set = mutation.set_clause(),
            col = owner_column(owner),
            guard = mutation.guard(),
            cols = STOCK_COLUMNS,
        );

        for _ in 0..MAX_GUARD_RETRIES {
            let updated = sqlx::query_as::<_, StockRow>(&sql)
                .bind(owner.id())
                .bind(qty)
                .fetch_optional(&self.db)
                .await?;

            if let Some(row) = updated {
                return row.try_into();
            }

            let mut current = self.find_or_create(owner, 0).await?;
            mutation.explain(&mut current, qty)?;
        }

        Err(AppError::Conflict(format!(
            "Stock record {} kept changing during update",
            owner
        )))
    }
}

#[async_trait]
impl StockStore for PgStockStore {
    async fn find(&self, owner: ProductRef) -> AppResult<Option<StockRecord>> {
        let sql = format!(
            "SELECT {} FROM stock_records WHERE {} = $1",
            STOCK_COLUMNS,
            owner_column(owner)
        );
        sqlx::query_as::<_, StockRow>(&sql)
            .bind(owner.id())
            .fetch_optional(&self.db)
            .await?
            .map(StockRecord::try_from)
            .transpose()
    }

    async fn find_or_create(
        &self,
        owner: ProductRef,
        initial_available: i32,
    ) -> AppResult<StockRecord> {
        let (variant_id, product_id) = owner.columns();

        sqlx::query(
            r#"
            INSERT INTO stock_records (product_variant_id, product_id, quantity_available)
            VALUES ($1, $2, $3)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(variant_id)
        .bind(product_id)
        .bind(initial_available.max(0))
        .execute(&self.db)
        .await?;

        self.find(owner)
            .await?
            .ok_or_else(|| AppError::Internal(format!("Stock record {} vanished after insert", owner)))
    }

    async fn reserve(&self, owner: ProductRef, qty: i32) -> AppResult<StockRecord> {
        self.guarded(owner, qty, Mutation::Reserve).await
    }

    async fn release(&self, owner: ProductRef, qty: i32) -> AppResult<StockRecord> {
        self.guarded(owner, qty, Mutation::Release).await
    }

    async fn deduct(&self, owner: ProductRef, qty: i32) -> AppResult<StockRecord> {
        self.guarded(owner, qty, Mutation::Deduct).await
    }

    async fn add_available(&self, owner: ProductRef, qty: i32) -> AppResult<StockRecord> {
        if qty <= 0 {
            return Err(StockError::InvalidQuantity(qty).into());
        }
        self.find_or_create(owner, 0).await?;

        let sql = format!(
            "UPDATE stock_records SET quantity_available = quantity_available + $2, \
             updated_at = NOW() WHERE {} = $1 RETURNING {}",
            owner_column(owner),
            STOCK_COLUMNS
        );
        sqlx::query_as::<_, StockRow>(&sql)
            .bind(owner.id())
            .bind(qty)
            .fetch_one(&self.db)
            .await?
            .try_into()
    }

    async fn adjust(&self, owner: ProductRef, delta: i32) -> AppResult<StockRecord> {
        match delta {
            0 => Err(StockError::InvalidQuantity(0).into()),
            d if d > 0 => self.add_available(owner, d).await,
            d => {
                let removal = d
                    .checked_neg()
                    .ok_or(StockError::InvalidQuantity(d))?;
                self.guarded(owner, removal, Mutation::Remove).await
            }
        }
    }

    async fn set_reorder_level(&self, owner: ProductRef, level: i32) -> AppResult<StockRecord> {
        if level < 0 {
            return Err(StockError::InvalidReorderLevel(level).into());
        }
        self.find_or_create(owner, 0).await?;

        let sql = format!(
            "UPDATE stock_records SET reorder_level = $2, updated_at = NOW() \
             WHERE {} = $1 RETURNING {}",
            owner_column(owner),
            STOCK_COLUMNS
        );
        sqlx::query_as::<_, StockRow>(&sql)
            .bind(owner.id())
            .bind(level)
            .fetch_one(&self.db)
            .await?
            .try_into()
    }

    async fn list_needing_reorder(&self, limit: i64) -> AppResult<Vec<StockRecord>> {
        let sql = format!(
            "SELECT {} FROM stock_records \
             WHERE quantity_available - quantity_reserved <= reorder_level \
             ORDER BY quantity_available - quantity_reserved ASC, updated_at DESC \
             LIMIT $1",
            STOCK_COLUMNS
        );
        sqlx::query_as::<_, StockRow>(&sql)
            .bind(limit)
            .fetch_all(&self.db)
            .await?
            .into_iter()
            .map(StockRecord::try_from)
            .collect()
    }
}

// ============================================================================
// Movement Ledger
// ============================================================================

#[derive(Clone)]
pub struct PgMovementLedger {
    db: PgPool,
}

#[derive(Debug, FromRow)]
struct MovementRow {
    id: Uuid,
    product_variant_id: Option<Uuid>,
    product_id: Option<Uuid>,
    movement_type: String,
    quantity: i32,
    reason: String,
    reference_id: Option<String>,
    reference_type: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<MovementRow> for MovementRecord {
    type Error = AppError;

    fn try_from(row: MovementRow) -> Result<Self, Self::Error> {
        let owner = ProductRef::from_columns(row.product_variant_id, row.product_id)
            .ok_or_else(|| AppError::Internal(format!("Movement {} has no single owner", row.id)))?;
        let movement_type = MovementType::from_str(&row.movement_type).ok_or_else(|| {
            AppError::Internal(format!("Unknown movement type {}", row.movement_type))
        })?;
        let reference = match (row.reference_id, row.reference_type) {
            (Some(reference_id), Some(reference_type)) => Some(MovementReference {
                reference_id,
                reference_type,
            }),
            _ => None,
        };
        Ok(MovementRecord {
            id: row.id,
            owner,
            movement_type,
            quantity: row.quantity,
            reason: row.reason,
            reference,
            created_at: row.created_at,
        })
    }
}

impl PgMovementLedger {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl MovementLedger for PgMovementLedger {
    async fn append(&self, movement: NewMovement) -> AppResult<MovementRecord> {
        let (variant_id, product_id) = movement.owner.columns();
        let (reference_id, reference_type) = match &movement.reference {
            Some(r) => (Some(r.reference_id.as_str()), Some(r.reference_type.as_str())),
            None => (None, None),
        };

        sqlx::query_as::<_, MovementRow>(
            r#"
            INSERT INTO stock_movements (
                product_variant_id, product_id, movement_type, quantity, reason,
                reference_id, reference_type
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, product_variant_id, product_id, movement_type, quantity, reason,
                      reference_id, reference_type, created_at
            "#,
        )
        .bind(variant_id)
        .bind(product_id)
        .bind(movement.movement_type.as_str())
        .bind(movement.quantity)
        .bind(&movement.reason)
        .bind(reference_id)
        .bind(reference_type)
        .fetch_one(&self.db)
        .await?
        .try_into()
    }

    async fn list(&self, owner: ProductRef, limit: i64) -> AppResult<Vec<MovementRecord>> {
        let sql = format!(
            "SELECT id, product_variant_id, product_id, movement_type, quantity, reason, \
                    reference_id, reference_type, created_at \
             FROM stock_movements WHERE {} = $1 \
             ORDER BY created_at DESC, id DESC LIMIT $2",
            owner_column(owner)
        );
        sqlx::query_as::<_, MovementRow>(&sql)
            .bind(owner.id())
            .bind(limit)
            .fetch_all(&self.db)
            .await?
            .into_iter()
            .map(MovementRecord::try_from)
            .collect()
    }

    async fn list_by_reference(
        &self,
        reference: &MovementReference,
    ) -> AppResult<Vec<MovementRecord>> {
        sqlx::query_as::<_, MovementRow>(
            r#"
            SELECT id, product_variant_id, product_id, movement_type, quantity, reason,
                   reference_id, reference_type, created_at
            FROM stock_movements
            WHERE reference_type = $1 AND reference_id = $2
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(&reference.reference_type)
        .bind(&reference.reference_id)
        .fetch_all(&self.db)
        .await?
        .into_iter()
        .map(MovementRecord::try_from)
        .collect()
    }
}

// ============================================================================
// Restock History
// ============================================================================

#[derive(Clone)]
pub struct PgRestockLog {
    db: PgPool,
}

#[derive(Debug, FromRow)]
struct RestockRow {
    id: Uuid,
    product_variant_id: Option<Uuid>,
    product_id: Option<Uuid>,
    quantity: i32,
    cost_per_unit: Decimal,
    supplier_name: String,
    restock_date: NaiveDate,
    created_at: DateTime<Utc>,
}

impl TryFrom<RestockRow> for RestockRecord {
    type Error = AppError;

    fn try_from(row: RestockRow) -> Result<Self, Self::Error> {
        let owner = ProductRef::from_columns(row.product_variant_id, row.product_id)
            .ok_or_else(|| AppError::Internal(format!("Restock {} has no single owner", row.id)))?;
        Ok(RestockRecord {
            id: row.id,
            owner,
            quantity: row.quantity,
            cost_per_unit: row.cost_per_unit,
            supplier_name: row.supplier_name,
            restock_date: row.restock_date,
            created_at: row.created_at,
        })
    }
}

impl PgRestockLog {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl RestockLog for PgRestockLog {
    async fn record(&self, restock: RestockRecord) -> AppResult<RestockRecord> {
        let (variant_id, product_id) = restock.owner.columns();

        sqlx::query_as::<_, RestockRow>(
            r#"
            INSERT INTO restocks (
                id, product_variant_id, product_id, quantity, cost_per_unit, supplier_name,
                restock_date, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id, product_variant_id, product_id, quantity, cost_per_unit,
                      supplier_name, restock_date, created_at
            "#,
        )
        .bind(restock.id)
        .bind(variant_id)
        .bind(product_id)
        .bind(restock.quantity)
        .bind(restock.cost_per_unit)
        .bind(&restock.supplier_name)
        .bind(restock.restock_date)
        .bind(restock.created_at)
        .fetch_one(&self.db)
        .await?
        .try_into()
    }

    async fn list(&self, owner: ProductRef, limit: i64) -> AppResult<Vec<RestockRecord>> {
        let sql = format!(
            "SELECT id, product_variant_id, product_id, quantity, cost_per_unit, \
                    supplier_name, restock_date, created_at \
             FROM restocks WHERE {} = $1 \
             ORDER BY restock_date DESC, created_at DESC LIMIT $2",
            owner_column(owner)
        );
        sqlx::query_as::<_, RestockRow>(&sql)
            .bind(owner.id())
            .bind(limit)
            .fetch_all(&self.db)
            .await?
            .into_iter()
            .map(RestockRecord::try_from)
            .collect()
    }
}
