//! Composite offers (deals and promotions)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{OfferKind, OfferRef, ProductRef};

/// One constituent of a composite offer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferEntry {
    pub product_id: Uuid,
    pub size_id: Option<Uuid>,
    /// Units of this constituent per unit of the offer
    pub quantity: i32,
}

impl OfferEntry {
    pub fn stock_ref(&self) -> ProductRef {
        ProductRef::for_line(self.product_id, self.size_id)
    }
}

/// A named bundle sold as one line item
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompositeOffer {
    pub id: Uuid,
    pub kind: OfferKind,
    pub name: String,
    pub is_active: bool,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub entries: Vec<OfferEntry>,
}

/// A constituent scaled to a requested offer quantity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ExpandedLine {
    pub product_id: Uuid,
    pub size_id: Option<Uuid>,
    pub quantity: i32,
}

impl ExpandedLine {
    pub fn stock_ref(&self) -> ProductRef {
        ProductRef::for_line(self.product_id, self.size_id)
    }
}

impl CompositeOffer {
    pub fn offer_ref(&self) -> OfferRef {
        OfferRef {
            kind: self.kind,
            id: self.id,
        }
    }

    /// Scale every constituent by the requested offer quantity
    pub fn expand(&self, requested: i32) -> Vec<ExpandedLine> {
        self.entries
            .iter()
            .map(|entry| ExpandedLine {
                product_id: entry.product_id,
                size_id: entry.size_id,
                quantity: entry.quantity.saturating_mul(requested),
            })
            .collect()
    }

    /// Whether `now` falls inside the inclusive validity window
    pub fn is_within_window(&self, now: DateTime<Utc>) -> bool {
        self.start_date <= now && now <= self.end_date
    }

    pub fn contains_size(&self, size_id: Uuid) -> bool {
        self.entries.iter().any(|e| e.size_id == Some(size_id))
    }

    pub fn contains(&self, owner: ProductRef) -> bool {
        self.entries.iter().any(|e| e.stock_ref() == owner)
    }
}

/// Result of a reverse lookup from a size to the offers using it
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffersContaining {
    pub deals: Vec<Uuid>,
    pub promotions: Vec<Uuid>,
}

impl OffersContaining {
    pub fn push(&mut self, offer: OfferRef) {
        match offer.kind {
            OfferKind::Deal => self.deals.push(offer.id),
            OfferKind::Promotion => self.promotions.push(offer.id),
        }
    }

    pub fn refs(&self) -> impl Iterator<Item = OfferRef> + '_ {
        self.deals
            .iter()
            .map(|id| OfferRef::deal(*id))
            .chain(self.promotions.iter().map(|id| OfferRef::promotion(*id)))
    }

    pub fn is_empty(&self) -> bool {
        self.deals.is_empty() && self.promotions.is_empty()
    }
}
