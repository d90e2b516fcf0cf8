use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::health::HealthState;
use crate::api::latency::LatencyStats;
use crate::error::AppError;
use crate::queue::{Job, JobQueue, QueueStats};
use crate::store::Store;
use crate::types::Release;

#[derive(Clone)]
pub struct ApiState {
    pub store: Store,
    pub queue: JobQueue,
    pub latency: Arc<LatencyStats>,
    pub health: Arc<HealthState>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/releases", get(get_releases))
        .route("/releases/:id/snapshots", get(get_release_snapshots))
        .route("/jobs", post(post_job))
        .route("/jobs/recent", get(get_recent_jobs))
        .route("/stats/summary", get(get_stats_summary))
        .route("/stats/ingest", get(get_stats_ingest))
        .route("/health", get(get_health))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Query/body param structs
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct ReleasesQuery {
    pub retailer_id: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Deserialize)]
pub struct SnapshotsQuery {
    pub limit: Option<i64>,
}

#[derive(Deserialize)]
pub struct JobsQuery {
    pub limit: Option<i64>,
}

#[derive(Deserialize)]
pub struct EnqueueBody {
    pub target: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct ReleaseResponse {
    pub id: String,
    pub sku: String,
    pub retailer_id: String,
    pub name: String,
    pub brand: String,
    pub price: Option<f64>,
    pub status: String,
    pub release_date: Option<String>,
    pub live_stock: Option<serde_json::Value>,
    pub stock_updated_at: Option<i64>,
    pub updated_at: i64,
}

impl From<Release> for ReleaseResponse {
    fn from(r: Release) -> Self {
        Self {
            id: r.id,
            sku: r.sku,
            retailer_id: r.retailer_id,
            name: r.name,
            brand: r.brand,
            price: r.price,
            status: r.status.to_string(),
            release_date: r.release_date.map(|dt| dt.to_rfc3339()),
            live_stock: r
                .live_stock
                .map(|s| serde_json::to_value(s).unwrap_or(serde_json::Value::Null)),
            stock_updated_at: r.stock_updated_at,
            updated_at: r.updated_at,
        }
    }
}

#[derive(Serialize)]
pub struct SnapshotResponse {
    pub id: i64,
    pub release_id: String,
    pub stock: serde_json::Value,
    pub timestamp: i64,
}

#[derive(Serialize)]
pub struct EnqueueResponse {
    pub id: i64,
}

#[derive(Serialize)]
pub struct SummaryResponse {
    pub total_releases: i64,
    pub queue: QueueStats,
    pub jobs_done: u64,
    pub jobs_failed: u64,
    pub events_seen: u64,
    pub notifications_sent: u64,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn get_releases(
    State(state): State<ApiState>,
    Query(params): Query<ReleasesQuery>,
) -> Result<Json<Vec<ReleaseResponse>>, AppError> {
    let limit = params.limit.unwrap_or(100).clamp(1, 1000);
    let releases = state
        .store
        .recent_releases(limit, params.retailer_id.as_deref())
        .await?;
    Ok(Json(releases.into_iter().map(ReleaseResponse::from).collect()))
}

async fn get_release_snapshots(
    State(state): State<ApiState>,
    Path(release_id): Path<String>,
    Query(params): Query<SnapshotsQuery>,
) -> Result<Json<Vec<SnapshotResponse>>, AppError> {
    let limit = params.limit.unwrap_or(50).clamp(1, 500);
    if state.store.get_release(&release_id).await?.is_none() {
        return Err(AppError::ReleaseNotFound(release_id));
    }
    let rows = state.store.snapshots_for(&release_id, limit).await?;
    let snapshots = rows
        .into_iter()
        .map(|row| SnapshotResponse {
            id: row.id,
            release_id: row.release_id,
            stock: serde_json::from_str(&row.stock).unwrap_or(serde_json::Value::Null),
            timestamp: row.timestamp,
        })
        .collect();
    Ok(Json(snapshots))
}

/// Event-based enqueue — the counterpart to the time-based scheduler.
async fn post_job(
    State(state): State<ApiState>,
    Json(body): Json<EnqueueBody>,
) -> Result<Json<EnqueueResponse>, AppError> {
    if body.target.trim().is_empty() {
        return Err(AppError::Config("target must not be empty".to_string()));
    }
    let id = state.queue.enqueue(&body.target, &body.params).await?;
    Ok(Json(EnqueueResponse { id }))
}

async fn get_recent_jobs(
    State(state): State<ApiState>,
    Query(params): Query<JobsQuery>,
) -> Result<Json<Vec<Job>>, AppError> {
    let limit = params.limit.unwrap_or(50).clamp(1, 500);
    Ok(Json(state.queue.recent_jobs(limit).await?))
}

async fn get_stats_summary(
    State(state): State<ApiState>,
) -> Result<Json<SummaryResponse>, AppError> {
    Ok(Json(SummaryResponse {
        total_releases: state.store.release_count().await?,
        queue: state.queue.stats().await?,
        jobs_done: state.health.jobs_done(),
        jobs_failed: state.health.jobs_failed(),
        events_seen: state.health.events_seen(),
        notifications_sent: state.health.notifications_sent(),
    }))
}

async fn get_stats_ingest(State(state): State<ApiState>) -> Json<serde_json::Value> {
    let (p50, p95, p99) = state.latency.percentiles();
    Json(serde_json::json!({
        "samples": state.latency.len(),
        "p50_us": p50,
        "p95_us": p95,
        "p99_us": p99,
    }))
}

async fn get_health(State(state): State<ApiState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "jobs_done": state.health.jobs_done(),
        "jobs_failed": state.health.jobs_failed(),
        "last_job_finished_at_ms": state.health.last_job_finished_at_ms(),
    }))
}
