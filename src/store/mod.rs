//! SQLite-backed canonical store for releases and stock snapshots.
//! Runtime-bound sqlx queries; the schema lives in ./migrations.

pub mod locks;
pub mod models;

use sqlx::SqlitePool;

use crate::error::Result;
use crate::types::Release;
use models::{ReleaseRow, SnapshotRow};

#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // -----------------------------------------------------------------------
    // Releases
    // -----------------------------------------------------------------------

    pub async fn find_release(&self, sku: &str, retailer_id: &str) -> Result<Option<Release>> {
        let row = sqlx::query_as::<_, ReleaseRow>(
            "SELECT * FROM releases WHERE sku = ? AND retailer_id = ?",
        )
        .bind(sku)
        .bind(retailer_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(ReleaseRow::into_release))
    }

    pub async fn get_release(&self, id: &str) -> Result<Option<Release>> {
        let row = sqlx::query_as::<_, ReleaseRow>("SELECT * FROM releases WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(ReleaseRow::into_release))
    }

    pub async fn insert_release(&self, r: &Release) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO releases (
                id, sku, retailer_id, name, brand, colorway, price, status,
                release_date, image_url, product_url, live_stock,
                stock_updated_at, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&r.id)
        .bind(&r.sku)
        .bind(&r.retailer_id)
        .bind(&r.name)
        .bind(&r.brand)
        .bind(&r.colorway)
        .bind(r.price)
        .bind(r.status.to_string())
        .bind(r.release_date.map(|dt| dt.to_rfc3339()))
        .bind(&r.image_url)
        .bind(&r.product_url)
        .bind(
            r.live_stock
                .as_ref()
                .map(|s| serde_json::to_string(s))
                .transpose()?,
        )
        .bind(r.stock_updated_at)
        .bind(r.created_at)
        .bind(r.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Overwrite the mutable fields of an existing release. Stock fields are
    /// owned by the differ and are not touched here.
    pub async fn update_release(&self, r: &Release) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE releases SET
                name = ?, brand = ?, colorway = ?, price = ?, status = ?,
                release_date = ?, image_url = ?, product_url = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&r.name)
        .bind(&r.brand)
        .bind(&r.colorway)
        .bind(r.price)
        .bind(r.status.to_string())
        .bind(r.release_date.map(|dt| dt.to_rfc3339()))
        .bind(&r.image_url)
        .bind(&r.product_url)
        .bind(r.updated_at)
        .bind(&r.id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn set_live_stock(
        &self,
        release_id: &str,
        stock_json: &str,
        timestamp: i64,
    ) -> Result<()> {
        sqlx::query("UPDATE releases SET live_stock = ?, stock_updated_at = ? WHERE id = ?")
            .bind(stock_json)
            .bind(timestamp)
            .bind(release_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn recent_releases(&self, limit: i64, retailer_id: Option<&str>) -> Result<Vec<Release>> {
        let rows = match retailer_id {
            Some(rid) => {
                sqlx::query_as::<_, ReleaseRow>(
                    "SELECT * FROM releases WHERE retailer_id = ? ORDER BY updated_at DESC LIMIT ?",
                )
                .bind(rid)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, ReleaseRow>(
                    "SELECT * FROM releases ORDER BY updated_at DESC LIMIT ?",
                )
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
        };
        Ok(rows.into_iter().map(ReleaseRow::into_release).collect())
    }

    pub async fn release_count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM releases")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    // -----------------------------------------------------------------------
    // Stock snapshots
    // -----------------------------------------------------------------------

    /// Most recent snapshot payload for a release, if any.
    pub async fn latest_snapshot(&self, release_id: &str) -> Result<Option<SnapshotRow>> {
        let row = sqlx::query_as::<_, SnapshotRow>(
            "SELECT * FROM stock_snapshots WHERE release_id = ? ORDER BY timestamp DESC, id DESC LIMIT 1",
        )
        .bind(release_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn insert_snapshot(
        &self,
        release_id: &str,
        stock_json: &str,
        timestamp: i64,
    ) -> Result<()> {
        sqlx::query("INSERT INTO stock_snapshots (release_id, stock, timestamp) VALUES (?, ?, ?)")
            .bind(release_id)
            .bind(stock_json)
            .bind(timestamp)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn snapshots_for(&self, release_id: &str, limit: i64) -> Result<Vec<SnapshotRow>> {
        let rows = sqlx::query_as::<_, SnapshotRow>(
            "SELECT * FROM stock_snapshots WHERE release_id = ? ORDER BY timestamp DESC, id DESC LIMIT ?",
        )
        .bind(release_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    #[cfg(test)]
    pub async fn snapshot_count(&self, release_id: &str) -> Result<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM stock_snapshots WHERE release_id = ?")
                .bind(release_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }
}

#[cfg(test)]
pub async fn test_store() -> Store {
    // A single connection: every pooled connection to "sqlite::memory:" would
    // otherwise open its own private database.
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory sqlite");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("migrations");
    Store::new(pool)
}
