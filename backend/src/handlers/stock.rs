//! HTTP handlers for stock records, movements and restocks

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use shared::{MovementRecord, ProductRef, RestockRecord, StockRecord};

use crate::error::{AppError, AppResult};
use crate::middleware::{require_permission, CurrentUser};
use crate::services::stock::{AdjustInput, RestockInput, StockService};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct QuantityInput {
    pub quantity: i32,
}

#[derive(Debug, Deserialize)]
pub struct ReorderLevelInput {
    pub reorder_level: i32,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<i64>,
}

fn parse_owner(kind: &str, id: Uuid) -> AppResult<ProductRef> {
    ProductRef::parse(kind, id).ok_or_else(|| AppError::Validation {
        field: "kind".to_string(),
        message: format!("Unknown stock owner kind '{}', expected variant or product", kind),
    })
}

/// Get the stock record for a product or variant
pub async fn get_stock(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path((kind, id)): Path<(String, Uuid)>,
) -> AppResult<Json<StockRecord>> {
    require_permission(&current_user.0, "stock", "read")?;
    let owner = parse_owner(&kind, id)?;
    let record = StockService::new(&state.stores).get_record(owner).await?;
    Ok(Json(record))
}

/// List movements, newest first
pub async fn list_movements(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path((kind, id)): Path<(String, Uuid)>,
    Query(query): Query<HistoryQuery>,
) -> AppResult<Json<Vec<MovementRecord>>> {
    require_permission(&current_user.0, "stock", "read")?;
    let owner = parse_owner(&kind, id)?;
    let movements = StockService::new(&state.stores)
        .movements(owner, query.limit)
        .await?;
    Ok(Json(movements))
}

/// List restock history
pub async fn list_restocks(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path((kind, id)): Path<(String, Uuid)>,
    Query(query): Query<HistoryQuery>,
) -> AppResult<Json<Vec<RestockRecord>>> {
    require_permission(&current_user.0, "stock", "read")?;
    let owner = parse_owner(&kind, id)?;
    let restocks = StockService::new(&state.stores)
        .restocks(owner, query.limit)
        .await?;
    Ok(Json(restocks))
}

/// Records at or below their reorder level
pub async fn low_stock(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(query): Query<HistoryQuery>,
) -> AppResult<Json<Vec<StockRecord>>> {
    require_permission(&current_user.0, "stock", "read")?;
    let records = StockService::new(&state.stores).low_stock(query.limit).await?;
    Ok(Json(records))
}

/// Place a manual hold
pub async fn reserve_stock(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path((kind, id)): Path<(String, Uuid)>,
    Json(input): Json<QuantityInput>,
) -> AppResult<Json<StockRecord>> {
    require_permission(&current_user.0, "stock", "write")?;
    let owner = parse_owner(&kind, id)?;
    let record = StockService::new(&state.stores)
        .reserve(owner, input.quantity)
        .await?;
    Ok(Json(record))
}

/// Release a manual hold
pub async fn release_stock(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path((kind, id)): Path<(String, Uuid)>,
    Json(input): Json<QuantityInput>,
) -> AppResult<Json<StockRecord>> {
    require_permission(&current_user.0, "stock", "write")?;
    let owner = parse_owner(&kind, id)?;
    let record = StockService::new(&state.stores)
        .release(owner, input.quantity)
        .await?;
    Ok(Json(record))
}

/// Record a supplier restock
pub async fn restock(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path((kind, id)): Path<(String, Uuid)>,
    Json(input): Json<RestockInput>,
) -> AppResult<Json<RestockRecord>> {
    require_permission(&current_user.0, "stock", "write")?;
    let owner = parse_owner(&kind, id)?;
    let restock = StockService::new(&state.stores).restock(owner, input).await?;
    Ok(Json(restock))
}

/// Apply a manual correction
pub async fn adjust_stock(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path((kind, id)): Path<(String, Uuid)>,
    Json(input): Json<AdjustInput>,
) -> AppResult<Json<StockRecord>> {
    require_permission(&current_user.0, "stock", "write")?;
    let owner = parse_owner(&kind, id)?;
    let record = StockService::new(&state.stores).adjust(owner, input).await?;
    Ok(Json(record))
}

/// Change the reorder threshold
pub async fn set_reorder_level(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path((kind, id)): Path<(String, Uuid)>,
    Json(input): Json<ReorderLevelInput>,
) -> AppResult<Json<StockRecord>> {
    require_permission(&current_user.0, "stock", "write")?;
    let owner = parse_owner(&kind, id)?;
    let record = StockService::new(&state.stores)
        .set_reorder_level(owner, input.reorder_level)
        .await?;
    Ok(Json(record))
}
