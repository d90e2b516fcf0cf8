//! Shared health state for the /health endpoint.
//! Updated by the queue workers and the notifier task.

use std::sync::atomic::{AtomicU64, Ordering};

/// Shared health metrics. Pipeline components update, API reads.
#[derive(Default)]
pub struct HealthState {
    /// Jobs finished successfully since startup.
    pub jobs_done: AtomicU64,
    /// Jobs finished with an error since startup.
    pub jobs_failed: AtomicU64,
    /// Millisecond timestamp of the last job completion (0 = none yet).
    pub last_job_finished_at_ms: AtomicU64,
    /// Mutation events seen by the notifier.
    pub events_seen: AtomicU64,
    /// Notifications handed to a transport (counted per channel).
    pub notifications_sent: AtomicU64,
}

impl HealthState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_job_done(&self, now_ms: i64) {
        self.jobs_done.fetch_add(1, Ordering::Relaxed);
        self.last_job_finished_at_ms.store(now_ms.max(0) as u64, Ordering::Relaxed);
    }

    pub fn record_job_failed(&self, now_ms: i64) {
        self.jobs_failed.fetch_add(1, Ordering::Relaxed);
        self.last_job_finished_at_ms.store(now_ms.max(0) as u64, Ordering::Relaxed);
    }

    pub fn record_event_seen(&self) {
        self.events_seen.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_notification_sent(&self) {
        self.notifications_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn jobs_done(&self) -> u64 {
        self.jobs_done.load(Ordering::Relaxed)
    }

    pub fn jobs_failed(&self) -> u64 {
        self.jobs_failed.load(Ordering::Relaxed)
    }

    pub fn last_job_finished_at_ms(&self) -> u64 {
        self.last_job_finished_at_ms.load(Ordering::Relaxed)
    }

    pub fn events_seen(&self) -> u64 {
        self.events_seen.load(Ordering::Relaxed)
    }

    pub fn notifications_sent(&self) -> u64 {
        self.notifications_sent.load(Ordering::Relaxed)
    }
}
