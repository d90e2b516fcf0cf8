//! Persistent scrape-job queue: pending → in_progress → done | failed.
//! The queue tracks lifecycle only — execution belongs to the claiming worker.

pub mod scheduler;
pub mod worker;

use serde::Serialize;
use sqlx::SqlitePool;

use crate::config::STALE_JOB_SECS;
use crate::error::{AppError, Result};
use crate::store::models::JobRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    InProgress,
    Done,
    Failed,
}

impl JobStatus {
    pub fn from_stored(s: &str) -> Self {
        match s {
            "pending" => JobStatus::Pending,
            "in_progress" => JobStatus::InProgress,
            "done" => JobStatus::Done,
            _ => JobStatus::Failed,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobStatus::Pending => "pending",
            JobStatus::InProgress => "in_progress",
            JobStatus::Done => "done",
            JobStatus::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Job {
    pub id: i64,
    pub target: String,
    pub params: serde_json::Value,
    pub status: JobStatus,
    pub created_at: i64,
    pub claimed_by: Option<String>,
    pub started_at: Option<i64>,
    pub finished_at: Option<i64>,
    pub details: Option<String>,
    pub error: Option<String>,
}

impl Job {
    fn from_row(row: JobRow) -> Self {
        Self {
            id: row.id,
            target: row.target,
            params: serde_json::from_str(&row.params).unwrap_or(serde_json::Value::Null),
            status: JobStatus::from_stored(&row.status),
            created_at: row.created_at,
            claimed_by: row.claimed_by,
            started_at: row.started_at,
            finished_at: row.finished_at,
            details: row.details,
            error: row.error,
        }
    }
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct QueueStats {
    pub pending: i64,
    pub in_progress: i64,
    pub done: i64,
    pub failed: i64,
    /// in_progress jobs older than STALE_JOB_SECS — orphans left by workers
    /// that died before calling complete. Nothing in this service reaps them;
    /// the count exists so the gap is visible.
    pub stale_in_progress: i64,
}

#[derive(Clone)]
pub struct JobQueue {
    pool: SqlitePool,
}

impl JobQueue {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn enqueue(&self, target: &str, params: &serde_json::Value) -> Result<i64> {
        let params_json = serde_json::to_string(params)?;
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO scraper_jobs (target, params, status, created_at)
            VALUES (?, ?, 'pending', ?)
            RETURNING id
            "#,
        )
        .bind(target)
        .bind(params_json)
        .bind(now_ms())
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    /// Claim the oldest pending job for `worker_id`, or None if the pending
    /// set is empty. Read-and-transition is a single conditional UPDATE so
    /// two concurrent claimers of the same job cannot both win; the loser
    /// sees the same result as an empty queue.
    pub async fn claim_next(&self, worker_id: &str) -> Result<Option<Job>> {
        let row = sqlx::query_as::<_, JobRow>(
            r#"
            UPDATE scraper_jobs
            SET status = 'in_progress', claimed_by = ?, started_at = ?
            WHERE id = (
                SELECT id FROM scraper_jobs
                WHERE status = 'pending'
                ORDER BY created_at ASC, id ASC
                LIMIT 1
            ) AND status = 'pending'
            RETURNING id, target, params, status, created_at,
                      claimed_by, started_at, finished_at, details, error
            "#,
        )
        .bind(worker_id)
        .bind(now_ms())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Job::from_row))
    }

    /// Transition in_progress → done | failed. Transitions are monotonic:
    /// completing a job in any other state is an error, not a write.
    pub async fn complete(&self, job_id: i64, success: bool, details: &str) -> Result<()> {
        let status = if success { "done" } else { "failed" };
        let (details_col, error_col) = if success {
            (Some(details), None)
        } else {
            (None, Some(details))
        };

        let affected = sqlx::query(
            r#"
            UPDATE scraper_jobs
            SET status = ?, finished_at = ?, details = ?, error = ?
            WHERE id = ? AND status = 'in_progress'
            "#,
        )
        .bind(status)
        .bind(now_ms())
        .bind(details_col)
        .bind(error_col)
        .bind(job_id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if affected == 1 {
            return Ok(());
        }
        match sqlx::query_scalar::<_, String>("SELECT status FROM scraper_jobs WHERE id = ?")
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?
        {
            None => Err(AppError::JobNotFound(job_id)),
            Some(current) => Err(AppError::JobTransition(job_id, current)),
        }
    }

    /// True if the target already has a pending or in_progress job — the
    /// scheduler's guard against piling up duplicate work.
    pub async fn has_open_job(&self, target: &str) -> Result<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM scraper_jobs WHERE target = ? AND status IN ('pending', 'in_progress')",
        )
        .bind(target)
        .fetch_one(&self.pool)
        .await?;
        Ok(count > 0)
    }

    pub async fn recent_jobs(&self, limit: i64) -> Result<Vec<Job>> {
        let rows = sqlx::query_as::<_, JobRow>(
            "SELECT * FROM scraper_jobs ORDER BY created_at DESC, id DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Job::from_row).collect())
    }

    pub async fn stats(&self) -> Result<QueueStats> {
        let mut stats = QueueStats::default();
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM scraper_jobs GROUP BY status")
                .fetch_all(&self.pool)
                .await?;
        for (status, count) in rows {
            match JobStatus::from_stored(&status) {
                JobStatus::Pending => stats.pending = count,
                JobStatus::InProgress => stats.in_progress = count,
                JobStatus::Done => stats.done = count,
                JobStatus::Failed => stats.failed = count,
            }
        }

        let stale_before = now_ms() - (STALE_JOB_SECS as i64) * 1000;
        stats.stale_in_progress = sqlx::query_scalar(
            "SELECT COUNT(*) FROM scraper_jobs WHERE status = 'in_progress' AND started_at < ?",
        )
        .bind(stale_before)
        .fetch_one(&self.pool)
        .await?;
        Ok(stats)
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
pub async fn test_queue() -> JobQueue {
    let store = crate::store::test_store().await;
    JobQueue::new(store.pool().clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn enqueue_claim_complete_lifecycle() {
        let queue = test_queue().await;
        let id = queue.enqueue("nike", &json!({"url": "https://x.example/f.json"})).await.unwrap();

        let job = queue.claim_next("worker-1").await.unwrap().unwrap();
        assert_eq!(job.id, id);
        assert_eq!(job.status, JobStatus::InProgress);
        assert_eq!(job.claimed_by.as_deref(), Some("worker-1"));
        assert!(job.started_at.is_some());

        queue.complete(id, true, "12 records").await.unwrap();
        let done = &queue.recent_jobs(1).await.unwrap()[0];
        assert_eq!(done.status, JobStatus::Done);
        assert_eq!(done.details.as_deref(), Some("12 records"));
        assert!(done.finished_at.is_some());
    }

    #[tokio::test]
    async fn claim_returns_none_when_queue_is_empty() {
        let queue = test_queue().await;
        assert!(queue.claim_next("worker-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn claim_takes_oldest_pending_first() {
        let queue = test_queue().await;
        let first = queue.enqueue("nike", &json!({})).await.unwrap();
        let second = queue.enqueue("kith", &json!({})).await.unwrap();

        assert_eq!(queue.claim_next("w").await.unwrap().unwrap().id, first);
        assert_eq!(queue.claim_next("w").await.unwrap().unwrap().id, second);
    }

    #[tokio::test]
    async fn one_job_two_claimers_exactly_one_wins() {
        let queue = test_queue().await;
        queue.enqueue("nike", &json!({})).await.unwrap();

        let (a, b) = tokio::join!(queue.claim_next("worker-a"), queue.claim_next("worker-b"));
        let claims = [a.unwrap(), b.unwrap()];
        assert_eq!(claims.iter().filter(|c| c.is_some()).count(), 1);
    }

    #[tokio::test]
    async fn failed_completion_records_error() {
        let queue = test_queue().await;
        let id = queue.enqueue("nike", &json!({})).await.unwrap();
        queue.claim_next("w").await.unwrap();

        queue.complete(id, false, "connection refused").await.unwrap();
        let job = &queue.recent_jobs(1).await.unwrap()[0];
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error.as_deref(), Some("connection refused"));
        assert!(job.details.is_none());
    }

    #[tokio::test]
    async fn transitions_are_monotonic() {
        let queue = test_queue().await;
        let id = queue.enqueue("nike", &json!({})).await.unwrap();

        // pending → done is not a legal transition
        assert!(matches!(
            queue.complete(id, true, "").await,
            Err(AppError::JobTransition(_, status)) if status == "pending"
        ));

        queue.claim_next("w").await.unwrap();
        queue.complete(id, true, "ok").await.unwrap();

        // done → failed is not either
        assert!(queue.complete(id, false, "nope").await.is_err());
        assert!(matches!(
            queue.complete(9999, true, "").await,
            Err(AppError::JobNotFound(9999))
        ));
    }

    #[tokio::test]
    async fn open_job_guard_covers_pending_and_in_progress() {
        let queue = test_queue().await;
        assert!(!queue.has_open_job("nike").await.unwrap());

        let id = queue.enqueue("nike", &json!({})).await.unwrap();
        assert!(queue.has_open_job("nike").await.unwrap());
        assert!(!queue.has_open_job("kith").await.unwrap());

        queue.claim_next("w").await.unwrap();
        assert!(queue.has_open_job("nike").await.unwrap());

        queue.complete(id, true, "").await.unwrap();
        assert!(!queue.has_open_job("nike").await.unwrap());
    }

    #[tokio::test]
    async fn stats_count_by_status() {
        let queue = test_queue().await;
        queue.enqueue("a", &json!({})).await.unwrap();
        let b = queue.enqueue("b", &json!({})).await.unwrap();
        let c = queue.enqueue("c", &json!({})).await.unwrap();
        queue.claim_next("w").await.unwrap(); // a → in_progress
        queue.claim_next("w").await.unwrap(); // b → in_progress
        queue.complete(b, true, "").await.unwrap();
        let _ = c;

        let stats = queue.stats().await.unwrap();
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.in_progress, 1);
        assert_eq!(stats.done, 1);
        assert_eq!(stats.failed, 0);
        // Freshly claimed jobs are not stale.
        assert_eq!(stats.stale_in_progress, 0);
    }
}
