use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::api::health::HealthState;
use crate::config::{ADAPTER_TIMEOUT_SECS, WORKER_POLL_SECS};
use crate::error::{AppError, Result};
use crate::ingest::IngestPipeline;
use crate::queue::{Job, JobQueue};

/// The seam external scrapers plug into: fetch raw records for one target.
/// Implementations may fail or return partial data; the worker turns any
/// error into a failed job completion.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    async fn fetch(
        &self,
        target: &str,
        params: &serde_json::Value,
    ) -> Result<Vec<serde_json::Value>>;
}

/// Generic JSON-feed probe: GETs the job's `url` param and expects either a
/// top-level array of raw records or an object wrapping one. Deliberately
/// knows nothing about any specific site's structure.
pub struct HttpProbeAdapter {
    client: reqwest::Client,
}

impl HttpProbeAdapter {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(ADAPTER_TIMEOUT_SECS))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl SourceAdapter for HttpProbeAdapter {
    async fn fetch(
        &self,
        target: &str,
        params: &serde_json::Value,
    ) -> Result<Vec<serde_json::Value>> {
        let url = params
            .get("url")
            .and_then(|v| v.as_str())
            .ok_or_else(|| AppError::Adapter(format!("job for {target} has no url param")))?;

        let body: serde_json::Value = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        match body {
            serde_json::Value::Array(items) => Ok(items),
            serde_json::Value::Object(ref obj) => ["records", "releases", "products", "items"]
                .iter()
                .find_map(|key| obj.get(*key).and_then(|v| v.as_array()).cloned())
                .ok_or_else(|| {
                    AppError::Adapter(format!("feed for {target} has no record array"))
                }),
            _ => Err(AppError::Adapter(format!(
                "feed for {target} is not an array or object"
            ))),
        }
    }
}

/// Claims jobs, runs the target's source adapter, pushes the records through
/// the ingest pipeline, and reports completion. The queue only tracks
/// lifecycle — everything between claim and complete happens here.
pub struct Worker {
    id: String,
    queue: JobQueue,
    pipeline: Arc<IngestPipeline>,
    adapter: Arc<dyn SourceAdapter>,
    health: Arc<HealthState>,
}

impl Worker {
    pub fn new(
        id: String,
        queue: JobQueue,
        pipeline: Arc<IngestPipeline>,
        adapter: Arc<dyn SourceAdapter>,
        health: Arc<HealthState>,
    ) -> Self {
        Self { id, queue, pipeline, adapter, health }
    }

    pub async fn run(self) {
        loop {
            match self.queue.claim_next(&self.id).await {
                // Drain: claim again immediately after finishing a job.
                Ok(Some(job)) => self.execute(job).await,
                Ok(None) => tokio::time::sleep(Duration::from_secs(WORKER_POLL_SECS)).await,
                Err(e) => {
                    error!(worker = %self.id, "claim failed: {e}");
                    tokio::time::sleep(Duration::from_secs(WORKER_POLL_SECS)).await;
                }
            }
        }
    }

    async fn execute(&self, job: Job) {
        info!(worker = %self.id, job_id = job.id, target = %job.target, "claimed job");

        let completion = match self.run_job(&job).await {
            Ok(details) => self.queue.complete(job.id, true, &details).await.map(|()| {
                self.health.record_job_done(now_ms());
            }),
            Err(e) => {
                warn!(worker = %self.id, job_id = job.id, "job failed: {e}");
                self.queue.complete(job.id, false, &e.to_string()).await.map(|()| {
                    self.health.record_job_failed(now_ms());
                })
            }
        };

        // A completion failure strands the job in in_progress — the queue
        // stats surface it as stale; there is nothing safe to do here.
        if let Err(e) = completion {
            error!(worker = %self.id, job_id = job.id, "completion write failed: {e}");
        }
    }

    async fn run_job(&self, job: &Job) -> Result<String> {
        let records = self.adapter.fetch(&job.target, &job.params).await?;
        let summary = self.pipeline.ingest_batch(&job.target, &records).await;
        Ok(serde_json::to_string(&summary)?)
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
