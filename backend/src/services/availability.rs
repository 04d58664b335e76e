//! Availability checks for cart lines and whole carts

use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use shared::{Cart, CartItem, LineItem, ProductRef};

use crate::error::AppResult;
use crate::repository::{CatalogRepository, StockStore, Stores};
use crate::services::offers::OfferResolver;

/// Result of checking one line
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemAvailability {
    pub is_available: bool,
    pub reasons: Vec<String>,
}

impl ItemAvailability {
    pub fn available() -> Self {
        Self {
            is_available: true,
            reasons: Vec::new(),
        }
    }

    pub fn from_reasons(reasons: Vec<String>) -> Self {
        Self {
            is_available: reasons.is_empty(),
            reasons,
        }
    }
}

/// Blocking problems with one cart line
#[derive(Debug, Clone, Serialize)]
pub struct AvailabilityIssue {
    pub cart_item_id: Uuid,
    pub item: LineItem,
    pub reasons: Vec<String>,
}

/// Result of checking every line of a cart
#[derive(Debug, Clone, Serialize)]
pub struct CartAvailability {
    pub allow_checkout: bool,
    pub availability_issues: Vec<AvailabilityIssue>,
}

pub const ITEM_CHECK_FAILED: &str = "Error checking item availability";

#[derive(Clone)]
pub struct AvailabilityChecker {
    catalog: Arc<dyn CatalogRepository>,
    stock: Arc<dyn StockStore>,
    resolver: OfferResolver,
}

impl AvailabilityChecker {
    pub fn new(stores: &Stores) -> Self {
        Self {
            catalog: stores.catalog.clone(),
            stock: stores.stock.clone(),
            resolver: OfferResolver::new(stores),
        }
    }

    pub fn resolver(&self) -> &OfferResolver {
        &self.resolver
    }

    /// Check a single product (and size) can supply `quantity` units
    ///
    /// Insufficient and out-of-stock are separate conditions: a record with
    /// nothing sellable reports both.
    pub async fn check_product(
        &self,
        product_id: Uuid,
        size_id: Option<Uuid>,
        quantity: i32,
    ) -> AppResult<ItemAvailability> {
        let mut reasons = Vec::new();

        if quantity <= 0 {
            reasons.push("Quantity must be positive".to_string());
        }

        if self.catalog.get_product(product_id).await?.is_none() {
            reasons.push("Product not found".to_string());
            return Ok(ItemAvailability::from_reasons(reasons));
        }

        if let Some(size_id) = size_id {
            match self.catalog.get_size(size_id).await? {
                None => {
                    reasons.push("Size not found".to_string());
                    return Ok(ItemAvailability::from_reasons(reasons));
                }
                Some(size) if !size.is_active => {
                    reasons.push("Size is not available".to_string());
                }
                Some(_) => {}
            }
        }

        let owner = ProductRef::for_line(product_id, size_id);
        let sellable = self
            .stock
            .find(owner)
            .await?
            .map(|r| r.sellable())
            .unwrap_or(0);

        if sellable < quantity {
            reasons.push(format!(
                "Insufficient stock: requested {}, available {}",
                quantity, sellable
            ));
        }
        if sellable < 1 {
            reasons.push("Out of stock".to_string());
        }

        Ok(ItemAvailability::from_reasons(reasons))
    }

    pub async fn check_line(&self, line: &LineItem) -> AppResult<ItemAvailability> {
        match *line {
            LineItem::Product {
                product_id,
                size_id,
                quantity,
            } => self.check_product(product_id, size_id, quantity).await,
            LineItem::Deal { quantity, .. } | LineItem::Promotion { quantity, .. } => {
                let Some(offer_ref) = line.offer_ref() else {
                    return Ok(ItemAvailability::available());
                };
                match self.resolver.find(offer_ref).await? {
                    Some(offer) => self.resolver.is_sellable(&offer, quantity, self).await,
                    None => Ok(ItemAvailability::from_reasons(vec![format!(
                        "{} not found",
                        offer_ref.kind
                    )])),
                }
            }
        }
    }

    pub async fn check_item(&self, item: &CartItem) -> AppResult<ItemAvailability> {
        self.check_line(&item.line).await
    }

    /// Check every line; one failing line fails the cart but never stops
    /// the others from being checked
    pub async fn check_cart(&self, cart: &Cart) -> CartAvailability {
        let mut issues = Vec::new();

        for item in &cart.items {
            let reasons = match self.check_item(item).await {
                Ok(result) if result.is_available => continue,
                Ok(result) => result.reasons,
                Err(e) => {
                    tracing::warn!(cart_item_id = %item.id, error = %e, "Availability check failed");
                    vec![ITEM_CHECK_FAILED.to_string()]
                }
            };
            issues.push(AvailabilityIssue {
                cart_item_id: item.id,
                item: item.line,
                reasons,
            });
        }

        CartAvailability {
            allow_checkout: issues.is_empty(),
            availability_issues: issues,
        }
    }
}
