//! Database row types used by sqlx for typed queries.

use chrono::DateTime;

use crate::types::{Release, ReleaseStatus, StockMap};

#[derive(Debug, sqlx::FromRow)]
pub struct ReleaseRow {
    pub id: String,
    pub sku: String,
    pub retailer_id: String,
    pub name: String,
    pub brand: String,
    pub colorway: Option<String>,
    pub price: Option<f64>,
    pub status: String,
    pub release_date: Option<String>,
    pub image_url: Option<String>,
    pub product_url: Option<String>,
    pub live_stock: Option<String>,
    pub stock_updated_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl ReleaseRow {
    pub fn into_release(self) -> Release {
        Release {
            id: self.id,
            sku: self.sku,
            retailer_id: self.retailer_id,
            name: self.name,
            brand: self.brand,
            colorway: self.colorway,
            price: self.price,
            status: ReleaseStatus::from_stored(&self.status),
            release_date: self
                .release_date
                .as_deref()
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|dt| dt.with_timezone(&chrono::Utc)),
            image_url: self.image_url,
            product_url: self.product_url,
            live_stock: self
                .live_stock
                .as_deref()
                .and_then(|s| serde_json::from_str::<StockMap>(s).ok()),
            stock_updated_at: self.stock_updated_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct SnapshotRow {
    pub id: i64,
    pub release_id: String,
    pub stock: String,
    pub timestamp: i64,
}

#[derive(Debug, sqlx::FromRow)]
pub struct JobRow {
    pub id: i64,
    pub target: String,
    pub params: String,
    pub status: String,
    pub created_at: i64,
    pub claimed_by: Option<String>,
    pub started_at: Option<i64>,
    pub finished_at: Option<i64>,
    pub details: Option<String>,
    pub error: Option<String>,
}
