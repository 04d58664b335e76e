//! PostgreSQL catalog and offer repositories

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use shared::{CompositeOffer, OfferEntry, OfferKind, OfferRef, Product, ProductSize};

use crate::error::AppResult;
use crate::repository::{CatalogRepository, OfferRepository};

#[derive(Clone)]
pub struct PgCatalog {
    db: PgPool,
}

impl PgCatalog {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[derive(Debug, FromRow)]
struct ProductRow {
    id: Uuid,
    name: String,
    is_active: bool,
    in_stock: bool,
}

#[derive(Debug, FromRow)]
struct SizeRow {
    id: Uuid,
    product_id: Uuid,
    label: String,
    is_active: bool,
}

#[async_trait]
impl CatalogRepository for PgCatalog {
    async fn get_product(&self, id: Uuid) -> AppResult<Option<Product>> {
        let row = sqlx::query_as::<_, ProductRow>(
            "SELECT id, name, is_active, in_stock FROM products WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;

        Ok(row.map(|r| Product {
            id: r.id,
            name: r.name,
            is_active: r.is_active,
            in_stock: r.in_stock,
        }))
    }

    async fn get_size(&self, id: Uuid) -> AppResult<Option<ProductSize>> {
        let row = sqlx::query_as::<_, SizeRow>(
            "SELECT id, product_id, label, is_active FROM product_sizes WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;

        Ok(row.map(|r| ProductSize {
            id: r.id,
            product_id: r.product_id,
            label: r.label,
            is_active: r.is_active,
        }))
    }

    async fn mark_product_out_of_stock(&self, id: Uuid) -> AppResult<()> {
        sqlx::query("UPDATE products SET in_stock = FALSE, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(())
    }
}

// ============================================================================
// Offers
// ============================================================================

#[derive(Clone)]
pub struct PgOfferRepository {
    db: PgPool,
}

#[derive(Debug, FromRow)]
struct OfferRow {
    id: Uuid,
    name: String,
    is_active: bool,
    start_date: DateTime<Utc>,
    end_date: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct OfferEntryRow {
    offer_id: Uuid,
    product_id: Uuid,
    size_id: Option<Uuid>,
    quantity: i32,
}

/// (offer table, entry table, entry foreign key)
fn tables(kind: OfferKind) -> (&'static str, &'static str, &'static str) {
    match kind {
        OfferKind::Deal => ("deals", "deal_items", "deal_id"),
        OfferKind::Promotion => ("promotions", "promotion_items", "promotion_id"),
    }
}

impl PgOfferRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    async fn load_entries(
        &self,
        kind: OfferKind,
        offer_ids: &[Uuid],
    ) -> AppResult<HashMap<Uuid, Vec<OfferEntry>>> {
        let (_, entry_table, fk) = tables(kind);
        let sql = format!(
            "SELECT {fk} AS offer_id, product_id, size_id, quantity \
             FROM {entry_table} WHERE {fk} = ANY($1) ORDER BY {fk}, id",
        );

        let rows = sqlx::query_as::<_, OfferEntryRow>(&sql)
            .bind(offer_ids)
            .fetch_all(&self.db)
            .await?;

        let mut grouped: HashMap<Uuid, Vec<OfferEntry>> = HashMap::new();
        for row in rows {
            grouped.entry(row.offer_id).or_default().push(OfferEntry {
                product_id: row.product_id,
                size_id: row.size_id,
                quantity: row.quantity,
            });
        }
        Ok(grouped)
    }

    async fn load_offers(&self, kind: OfferKind, rows: Vec<OfferRow>) -> AppResult<Vec<CompositeOffer>> {
        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let mut entries = self.load_entries(kind, &ids).await?;

        Ok(rows
            .into_iter()
            .map(|row| CompositeOffer {
                entries: entries.remove(&row.id).unwrap_or_default(),
                id: row.id,
                kind,
                name: row.name,
                is_active: row.is_active,
                start_date: row.start_date,
                end_date: row.end_date,
            })
            .collect())
    }
}

#[async_trait]
impl OfferRepository for PgOfferRepository {
    async fn get_offer(&self, offer: OfferRef) -> AppResult<Option<CompositeOffer>> {
        let (offer_table, _, _) = tables(offer.kind);
        let sql = format!(
            "SELECT id, name, is_active, start_date, end_date FROM {offer_table} WHERE id = $1"
        );

        let row = sqlx::query_as::<_, OfferRow>(&sql)
            .bind(offer.id)
            .fetch_optional(&self.db)
            .await?;

        match row {
            Some(row) => Ok(self.load_offers(offer.kind, vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn list_active_offers(&self) -> AppResult<Vec<CompositeOffer>> {
        let mut offers = Vec::new();
        for kind in [OfferKind::Deal, OfferKind::Promotion] {
            let (offer_table, _, _) = tables(kind);
            let sql = format!(
                "SELECT id, name, is_active, start_date, end_date FROM {offer_table} \
                 WHERE is_active = TRUE ORDER BY created_at, id"
            );
            let rows = sqlx::query_as::<_, OfferRow>(&sql)
                .fetch_all(&self.db)
                .await?;
            offers.extend(self.load_offers(kind, rows).await?);
        }
        Ok(offers)
    }

    async fn set_offer_active(&self, offer: OfferRef, active: bool) -> AppResult<bool> {
        let (offer_table, _, _) = tables(offer.kind);
        let sql = format!(
            "UPDATE {offer_table} SET is_active = $2, updated_at = NOW() \
             WHERE id = $1 AND is_active <> $2"
        );

        let result = sqlx::query(&sql)
            .bind(offer.id)
            .bind(active)
            .execute(&self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
