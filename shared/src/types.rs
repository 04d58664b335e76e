//! Common types used across the platform

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Owner of a stock record: a product variant (size) or a plain product
///
/// A stock record belongs to exactly one of the two, so the reference is a
/// sum type rather than a pair of nullable ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum ProductRef {
    Variant(Uuid),
    Product(Uuid),
}

impl ProductRef {
    /// Stock is tracked on the size when one is given, otherwise on the product
    pub fn for_line(product_id: Uuid, size_id: Option<Uuid>) -> Self {
        match size_id {
            Some(size_id) => ProductRef::Variant(size_id),
            None => ProductRef::Product(product_id),
        }
    }

    pub fn id(&self) -> Uuid {
        match self {
            ProductRef::Variant(id) | ProductRef::Product(id) => *id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ProductRef::Variant(_) => "variant",
            ProductRef::Product(_) => "product",
        }
    }

    /// Parse a `kind` path segment back into a reference
    pub fn parse(kind: &str, id: Uuid) -> Option<Self> {
        match kind {
            "variant" | "size" => Some(ProductRef::Variant(id)),
            "product" => Some(ProductRef::Product(id)),
            _ => None,
        }
    }

    /// Split into the (variant_id, product_id) column pair used by storage
    pub fn columns(&self) -> (Option<Uuid>, Option<Uuid>) {
        match self {
            ProductRef::Variant(id) => (Some(*id), None),
            ProductRef::Product(id) => (None, Some(*id)),
        }
    }

    /// Rebuild from the column pair; exactly one column must be set
    pub fn from_columns(variant_id: Option<Uuid>, product_id: Option<Uuid>) -> Option<Self> {
        match (variant_id, product_id) {
            (Some(id), None) => Some(ProductRef::Variant(id)),
            (None, Some(id)) => Some(ProductRef::Product(id)),
            _ => None,
        }
    }
}

impl std::fmt::Display for ProductRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind(), self.id())
    }
}

/// Kind of composite offer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OfferKind {
    Deal,
    Promotion,
}

impl OfferKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OfferKind::Deal => "deal",
            OfferKind::Promotion => "promotion",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "deal" | "deals" => Some(OfferKind::Deal),
            "promotion" | "promotions" => Some(OfferKind::Promotion),
            _ => None,
        }
    }
}

impl std::fmt::Display for OfferKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OfferKind::Deal => write!(f, "Deal"),
            OfferKind::Promotion => write!(f, "Promotion"),
        }
    }
}

/// Identity of a deal or promotion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OfferRef {
    pub kind: OfferKind,
    pub id: Uuid,
}

impl OfferRef {
    pub fn deal(id: Uuid) -> Self {
        Self {
            kind: OfferKind::Deal,
            id,
        }
    }

    pub fn promotion(id: Uuid) -> Self {
        Self {
            kind: OfferKind::Promotion,
            id,
        }
    }
}

impl std::fmt::Display for OfferRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.kind, self.id)
    }
}
