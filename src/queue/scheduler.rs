use std::time::Duration;

use tokio::time::interval;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::Result;
use crate::queue::JobQueue;

/// Periodically enqueues one scrape job per configured target. Targets that
/// still have an open (pending or in_progress) job are skipped so a slow
/// source cannot pile up a backlog of identical work.
pub struct Scheduler {
    cfg: Config,
    queue: JobQueue,
}

impl Scheduler {
    pub fn new(cfg: Config, queue: JobQueue) -> Self {
        Self { cfg, queue }
    }

    pub async fn run(self) {
        if self.cfg.scrape_targets.is_empty() {
            warn!("SCRAPE_TARGETS not set — no jobs will be scheduled. Example: SCRAPE_TARGETS=nike=https://feeds.example.com/nike.json");
            return;
        }

        let mut ticker = interval(Duration::from_secs(self.cfg.scrape_interval_secs));
        loop {
            ticker.tick().await;
            if let Err(e) = self.tick().await {
                error!("Scheduler tick failed: {e}");
            }
        }
    }

    async fn tick(&self) -> Result<()> {
        let mut enqueued = 0usize;
        let mut skipped = 0usize;

        for (target, url) in &self.cfg.scrape_targets {
            if self.queue.has_open_job(target).await? {
                skipped += 1;
                continue;
            }
            self.queue
                .enqueue(target, &serde_json::json!({ "url": url }))
                .await?;
            enqueued += 1;
        }

        info!(
            enqueued,
            skipped,
            "Schedule tick complete: +{enqueued} enqueued, {skipped} still open",
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::test_queue;

    fn cfg(targets: Vec<(String, String)>) -> Config {
        Config {
            log_level: "info".to_string(),
            db_path: ":memory:".to_string(),
            api_port: 0,
            scrape_targets: targets,
            scrape_interval_secs: 300,
            worker_count: 1,
            webhook_url: None,
        }
    }

    #[tokio::test]
    async fn tick_enqueues_one_job_per_target() {
        let queue = test_queue().await;
        let scheduler = Scheduler::new(
            cfg(vec![
                ("nike".into(), "https://a.example/n.json".into()),
                ("kith".into(), "https://b.example/k.json".into()),
            ]),
            queue.clone(),
        );

        scheduler.tick().await.unwrap();
        let stats = queue.stats().await.unwrap();
        assert_eq!(stats.pending, 2);

        let job = queue.claim_next("w").await.unwrap().unwrap();
        assert_eq!(job.params["url"], "https://a.example/n.json");
    }

    #[tokio::test]
    async fn open_targets_are_skipped_on_the_next_tick() {
        let queue = test_queue().await;
        let scheduler = Scheduler::new(
            cfg(vec![("nike".into(), "https://a.example/n.json".into())]),
            queue.clone(),
        );

        scheduler.tick().await.unwrap();
        scheduler.tick().await.unwrap();
        assert_eq!(queue.stats().await.unwrap().pending, 1);

        // Once the job finishes, the target becomes schedulable again.
        let job = queue.claim_next("w").await.unwrap().unwrap();
        queue.complete(job.id, true, "").await.unwrap();
        scheduler.tick().await.unwrap();
        assert_eq!(queue.stats().await.unwrap().pending, 1);
    }
}
