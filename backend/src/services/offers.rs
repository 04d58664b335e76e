//! Composite offer resolver
//!
//! Deals and promotions bundle several product lines. Selling one means
//! selling each constituent at `multiplier × requested` units, and an offer
//! whose constituent runs out is switched off. Switching back on is always
//! an explicit administrative action.

use std::sync::Arc;

use shared::{CompositeOffer, ExpandedLine, OfferRef, OffersContaining, ProductRef};

use crate::clock::Clock;
use crate::error::{AppError, AppResult};
use crate::repository::{OfferRepository, StockStore, Stores};
use crate::services::availability::{AvailabilityChecker, ItemAvailability};

#[derive(Clone)]
pub struct OfferResolver {
    offers: Arc<dyn OfferRepository>,
    stock: Arc<dyn StockStore>,
    clock: Arc<dyn Clock>,
}

impl OfferResolver {
    pub fn new(stores: &Stores) -> Self {
        Self {
            offers: stores.offers.clone(),
            stock: stores.stock.clone(),
            clock: stores.clock.clone(),
        }
    }

    pub async fn find(&self, offer: OfferRef) -> AppResult<Option<CompositeOffer>> {
        self.offers.get_offer(offer).await
    }

    pub async fn load(&self, offer: OfferRef) -> AppResult<CompositeOffer> {
        self.find(offer)
            .await?
            .ok_or_else(|| AppError::NotFound(offer.to_string()))
    }

    pub fn expand(&self, offer: &CompositeOffer, requested: i32) -> Vec<ExpandedLine> {
        offer.expand(requested)
    }

    /// Check the offer can be sold `requested` times right now
    ///
    /// Every problem is reported, not only the first; constituent reasons
    /// carry the offer kind and product id.
    pub async fn is_sellable(
        &self,
        offer: &CompositeOffer,
        requested: i32,
        checker: &AvailabilityChecker,
    ) -> AppResult<ItemAvailability> {
        let mut reasons = Vec::new();

        if !offer.is_active {
            reasons.push(format!("{} is not active", offer.kind));
        }
        if !offer.is_within_window(self.clock.now()) {
            reasons.push(format!("{} is not currently valid", offer.kind));
        }

        for line in self.expand(offer, requested) {
            let constituent = checker
                .check_product(line.product_id, line.size_id, line.quantity)
                .await?;
            reasons.extend(
                constituent
                    .reasons
                    .into_iter()
                    .map(|r| format!("{} product ({}): {}", offer.kind, line.product_id, r)),
            );
        }

        Ok(ItemAvailability::from_reasons(reasons))
    }

    /// Active offers with an entry stocked on `owner`
    ///
    /// Full scan over active offers and their entries. Offer counts are
    /// small; an index on entry size ids would replace this if they grow.
    pub async fn find_offers_containing(&self, owner: ProductRef) -> AppResult<OffersContaining> {
        let mut found = OffersContaining::default();
        for offer in self.offers.list_active_offers().await? {
            if offer.contains(owner) {
                found.push(offer.offer_ref());
            }
        }
        Ok(found)
    }

    /// True when any constituent has no sellable unit left
    pub async fn should_deactivate(&self, offer: &CompositeOffer) -> AppResult<bool> {
        for entry in &offer.entries {
            let sellable = self
                .stock
                .find(entry.stock_ref())
                .await?
                .map(|r| r.sellable())
                .unwrap_or(0);
            if sellable < 1 {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Switch the offer off if a constituent is exhausted; returns whether
    /// it was switched off by this call
    pub async fn deactivate_if_exhausted(&self, offer: OfferRef) -> AppResult<bool> {
        let offer = self.load(offer).await?;
        if !offer.is_active || !self.should_deactivate(&offer).await? {
            return Ok(false);
        }

        let changed = self.offers.set_offer_active(offer.offer_ref(), false).await?;
        if changed {
            tracing::info!(offer = %offer.offer_ref(), name = %offer.name, "Offer deactivated, constituent out of stock");
        }
        Ok(changed)
    }

    /// Explicitly switch an offer back on; refused while a constituent is
    /// still exhausted
    pub async fn reactivate(&self, offer: OfferRef) -> AppResult<CompositeOffer> {
        let mut loaded = self.load(offer).await?;
        if self.should_deactivate(&loaded).await? {
            return Err(AppError::Conflict(format!(
                "{} still has a constituent with no sellable stock",
                offer
            )));
        }

        if self.offers.set_offer_active(offer, true).await? {
            tracing::info!(%offer, "Offer reactivated");
        }
        loaded.is_active = true;
        Ok(loaded)
    }
}
