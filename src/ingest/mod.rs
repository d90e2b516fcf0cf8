//! Batch ingestion pipeline: normalize → dedup/upsert → stock diff → events.
//! One malformed record or failed write degrades the batch's counters, never
//! aborts its siblings.

pub mod stock;
pub mod upsert;

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::api::latency::LatencyStats;
use crate::error::Result;
use crate::normalizer::normalize;
use crate::store::locks::KeyedLocks;
use crate::store::Store;
use crate::types::{EventKind, MutationEvent, UpsertOutcome};
use stock::StockDiffer;
use upsert::{mutation_event, UpsertEngine};

/// Aggregate result of one source batch. Reported instead of failing the run:
/// a bad record degrades completeness, not availability.
#[derive(Debug, Default, Clone, Serialize)]
pub struct IngestSummary {
    pub total: usize,
    pub new: usize,
    pub updated: usize,
    pub duplicates: usize,
    pub snapshots: usize,
    pub errors: usize,
    pub error_details: Vec<String>,
}

impl std::fmt::Display for IngestSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} records: {} new, {} updated, {} duplicates, {} snapshots, {} errors",
            self.total, self.new, self.updated, self.duplicates, self.snapshots, self.errors,
        )
    }
}

pub struct IngestPipeline {
    engine: UpsertEngine,
    differ: StockDiffer,
    event_tx: mpsc::Sender<MutationEvent>,
    latency: Arc<LatencyStats>,
}

impl IngestPipeline {
    pub fn new(
        store: Store,
        event_tx: mpsc::Sender<MutationEvent>,
        latency: Arc<LatencyStats>,
    ) -> Self {
        let locks = Arc::new(KeyedLocks::new());
        Self {
            engine: UpsertEngine::new(store.clone(), Arc::clone(&locks)),
            differ: StockDiffer::new(store, locks),
            event_tx,
            latency,
        }
    }

    /// Process all records produced by one source-adapter invocation, in order.
    pub async fn ingest_batch(
        &self,
        retailer_hint: &str,
        records: &[serde_json::Value],
    ) -> IngestSummary {
        let mut summary = IngestSummary::default();

        for record in records {
            summary.total += 1;
            let started = Instant::now();
            match self.ingest_one(retailer_hint, record).await {
                Ok((outcome, snapshot_written)) => {
                    debug!(retailer = retailer_hint, outcome = %outcome, snapshot_written, "record processed");
                    match outcome {
                        UpsertOutcome::New => summary.new += 1,
                        UpsertOutcome::Updated => summary.updated += 1,
                        UpsertOutcome::Duplicate => summary.duplicates += 1,
                    }
                    if snapshot_written {
                        summary.snapshots += 1;
                    }
                }
                Err(e) => {
                    warn!(retailer = retailer_hint, "record ingest failed: {e}");
                    summary.errors += 1;
                    summary.error_details.push(e.to_string());
                }
            }
            self.latency.record(started.elapsed());
        }

        info!(retailer = retailer_hint, "ingest batch complete: {summary}");
        summary
    }

    async fn ingest_one(
        &self,
        retailer_hint: &str,
        record: &serde_json::Value,
    ) -> Result<(UpsertOutcome, bool)> {
        let draft = normalize(record, retailer_hint)
            .map_err(|reason| crate::error::AppError::Adapter(reason.to_string()))?;

        let now = now_ms();
        let (outcome, release, events) = self.engine.upsert(&draft, now).await?;
        for event in events {
            self.emit(event).await;
        }

        // Inventory-bearing records also feed the snapshot differ, regardless
        // of the upsert outcome — stock changes on a DUPLICATE still count.
        let mut snapshot_written = false;
        if let Some(stock) = &draft.stock {
            snapshot_written = self.differ.observe(&release.id, stock, now).await?;
            if snapshot_written {
                let mut event = mutation_event(EventKind::Restock, &release, now);
                let available: u64 = stock.values().map(|l| u64::from(l.available)).sum();
                event.fields.insert("available_units".into(), available.into());
                self.emit(event).await;
            }
        }

        Ok((outcome, snapshot_written))
    }

    async fn emit(&self, event: MutationEvent) {
        // The notifier owns delivery; a full or closed channel must not fail
        // the ingest path that already committed its write.
        if let Err(e) = self.event_tx.send(event).await {
            warn!("mutation event dropped: {e}");
        }
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
