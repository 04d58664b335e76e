//! HTTP handlers for deals and promotions

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use shared::{CompositeOffer, OfferKind, OfferRef, OffersContaining, ProductRef};

use crate::error::{AppError, AppResult};
use crate::middleware::{require_permission, CurrentUser};
use crate::services::{AvailabilityChecker, ItemAvailability};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct OfferAvailabilityQuery {
    pub quantity: Option<i32>,
}

fn parse_offer(kind: &str, id: Uuid) -> AppResult<OfferRef> {
    let kind = OfferKind::from_str(kind).ok_or_else(|| AppError::Validation {
        field: "kind".to_string(),
        message: format!("Unknown offer kind '{}', expected deal or promotion", kind),
    })?;
    Ok(OfferRef { kind, id })
}

/// Active offers containing a size
pub async fn offers_containing(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Path(size_id): Path<Uuid>,
) -> AppResult<Json<OffersContaining>> {
    let checker = AvailabilityChecker::new(&state.stores);
    let found = checker
        .resolver()
        .find_offers_containing(ProductRef::Variant(size_id))
        .await?;
    Ok(Json(found))
}

/// Whether an offer can be sold `quantity` times right now
pub async fn offer_availability(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Path((kind, id)): Path<(String, Uuid)>,
    Query(query): Query<OfferAvailabilityQuery>,
) -> AppResult<Json<ItemAvailability>> {
    let offer_ref = parse_offer(&kind, id)?;
    let quantity = query.quantity.unwrap_or(1);

    let checker = AvailabilityChecker::new(&state.stores);
    let offer = checker.resolver().load(offer_ref).await?;
    let availability = checker.resolver().is_sellable(&offer, quantity, &checker).await?;
    Ok(Json(availability))
}

/// Switch an offer back on after a restock
pub async fn reactivate_offer(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path((kind, id)): Path<(String, Uuid)>,
) -> AppResult<Json<CompositeOffer>> {
    require_permission(&current_user.0, "offers", "write")?;
    let offer_ref = parse_offer(&kind, id)?;

    let checker = AvailabilityChecker::new(&state.stores);
    let offer = checker.resolver().reactivate(offer_ref).await?;
    Ok(Json(offer))
}
