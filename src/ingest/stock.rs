use std::sync::Arc;

use tracing::debug;

use crate::error::Result;
use crate::store::locks::KeyedLocks;
use crate::store::Store;
use crate::types::StockMap;

/// Compares an incoming inventory reading against the latest stored snapshot
/// and appends only when it differs. Identical readings — the dominant case
/// under frequent polling — produce no write, which bounds snapshot growth.
pub struct StockDiffer {
    store: Store,
    locks: Arc<KeyedLocks>,
}

impl StockDiffer {
    pub fn new(store: Store, locks: Arc<KeyedLocks>) -> Self {
        Self { store, locks }
    }

    /// Returns true if a snapshot was appended (and the parent release's
    /// live_stock + stock_updated_at overwritten), false if suppressed.
    pub async fn observe(&self, release_id: &str, stock: &StockMap, now: i64) -> Result<bool> {
        // Fetch-then-append runs under the release's lock so two concurrent
        // readings cannot both pass the equality check.
        let lock_key = format!("stock:{release_id}");
        let _guard = self.locks.acquire(&lock_key).await;

        let previous = self.store.latest_snapshot(release_id).await?;
        if let Some(prev) = &previous {
            // Structural equality over the variant map, not a string compare:
            // a re-serialized payload with equal contents must still suppress.
            if let Ok(prev_stock) = serde_json::from_str::<StockMap>(&prev.stock) {
                if prev_stock == *stock {
                    debug!(release_id, "stock unchanged, snapshot suppressed");
                    return Ok(false);
                }
            }
        }

        let stock_json = serde_json::to_string(stock)?;
        self.store.insert_snapshot(release_id, &stock_json, now).await?;
        self.store.set_live_stock(release_id, &stock_json, now).await?;
        Ok(true)
    }
}
