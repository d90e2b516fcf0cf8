use crate::error::{AppError, Result};

/// Channel capacity for internal message routing.
pub const CHANNEL_CAPACITY: usize = 1024;

/// Default scheduler enqueue interval (seconds).
pub const SCHEDULE_INTERVAL_SECS: u64 = 300;

/// Idle worker poll interval when the pending queue is empty (seconds).
pub const WORKER_POLL_SECS: u64 = 5;

/// Preference cache refresh interval (seconds). This is the staleness bound:
/// a rule edit takes at most this long to become visible to the notifier.
pub const PREFS_REFRESH_SECS: u64 = 60;

/// An in_progress job older than this with no finish is counted as stale.
/// Nothing reaps it — the count only makes the orphan gap observable.
pub const STALE_JOB_SECS: u64 = 3600;

/// Per-request timeout for source adapter fetches (seconds).
pub const ADAPTER_TIMEOUT_SECS: u64 = 30;

/// Per-delivery timeout for webhook notifications (seconds). Tighter than the
/// adapter timeout — a slow webhook should not stall a dispatch fan-out.
pub const WEBHOOK_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub db_path: String,
    pub api_port: u16,
    /// Scrape targets the scheduler enqueues on each tick (SCRAPE_TARGETS,
    /// comma-separated `target=url` pairs). Example:
    /// "nike=https://feeds.example.com/nike.json,kith=https://feeds.example.com/kith.json"
    pub scrape_targets: Vec<(String, String)>,
    /// Scheduler enqueue interval in seconds (SCRAPE_INTERVAL_SECS).
    pub scrape_interval_secs: u64,
    /// Number of concurrent queue workers (WORKER_COUNT).
    pub worker_count: usize,
    /// Webhook delivery endpoint for the webhook transport (WEBHOOK_URL).
    /// Unset disables the webhook channel process-wide.
    pub webhook_url: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            db_path: std::env::var("DB_PATH").unwrap_or_else(|_| "tracker.db".to_string()),
            api_port: std::env::var("API_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse::<u16>()
                .map_err(|_| AppError::Config("API_PORT must be a valid port number".to_string()))?,
            scrape_targets: parse_scrape_targets(
                &std::env::var("SCRAPE_TARGETS").unwrap_or_default(),
            ),
            scrape_interval_secs: std::env::var("SCRAPE_INTERVAL_SECS")
                .unwrap_or_else(|_| SCHEDULE_INTERVAL_SECS.to_string())
                .parse::<u64>()
                .unwrap_or(SCHEDULE_INTERVAL_SECS),
            worker_count: std::env::var("WORKER_COUNT")
                .unwrap_or_else(|_| "2".to_string())
                .parse::<usize>()
                .unwrap_or(2),
            webhook_url: std::env::var("WEBHOOK_URL").ok().filter(|s| !s.is_empty()),
        })
    }
}

/// Parse "target=url,target=url" pairs, skipping malformed entries.
fn parse_scrape_targets(raw: &str) -> Vec<(String, String)> {
    raw.split(',')
        .filter_map(|pair| {
            let (target, url) = pair.trim().split_once('=')?;
            if target.is_empty() || url.is_empty() {
                return None;
            }
            Some((target.to_string(), url.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scrape_targets_parse_pairs_and_skip_malformed() {
        let targets = parse_scrape_targets(
            "nike=https://a.example/n.json, kith=https://b.example/k.json,broken,=nourl,notarget=",
        );
        assert_eq!(targets.len(), 2);
        assert_eq!(targets[0], ("nike".to_string(), "https://a.example/n.json".to_string()));
        assert_eq!(targets[1].0, "kith");
    }

    #[test]
    fn empty_targets_yield_empty_vec() {
        assert!(parse_scrape_targets("").is_empty());
    }
}
