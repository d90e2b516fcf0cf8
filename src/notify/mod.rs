//! Notification pipeline: consumes mutation events from the ingest side and
//! turns them into per-user, per-channel deliveries.

pub mod prefs;
pub mod rules;
pub mod transport;

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::api::health::HealthState;
use crate::types::MutationEvent;
use prefs::PrefsCache;
use rules::{RuleEngine, Verdict};
use transport::{build_payload, Dispatcher};

/// Background task: one mutation event in, zero or more notifications out.
/// Users are evaluated synchronously per event; channel deliveries for a
/// matched user fan out concurrently in the dispatcher.
pub struct Notifier {
    event_rx: mpsc::Receiver<MutationEvent>,
    prefs: Arc<PrefsCache>,
    engine: RuleEngine,
    dispatcher: Dispatcher,
    health: Arc<HealthState>,
}

impl Notifier {
    pub fn new(
        event_rx: mpsc::Receiver<MutationEvent>,
        prefs: Arc<PrefsCache>,
        dispatcher: Dispatcher,
        health: Arc<HealthState>,
    ) -> Self {
        Self {
            event_rx,
            prefs,
            engine: RuleEngine::new(),
            dispatcher,
            health,
        }
    }

    pub async fn run(mut self) {
        while let Some(event) = self.event_rx.recv().await {
            self.health.record_event_seen();
            self.handle(&event).await;
        }
    }

    async fn handle(&self, event: &MutationEvent) {
        let now = now_ms();
        for user_prefs in self.prefs.all() {
            match self.engine.evaluate(&user_prefs, event, now) {
                Verdict::Dispatch(priority) => {
                    let payload = build_payload(event, priority);
                    let delivered = self
                        .dispatcher
                        .dispatch(&user_prefs.user_id, &user_prefs.channels, &payload)
                        .await;
                    for _ in 0..delivered {
                        self.health.record_notification_sent();
                    }
                    info!(
                        user_id = %user_prefs.user_id,
                        kind = %event.kind,
                        priority = %priority,
                        delivered,
                        "notification dispatched",
                    );
                }
                verdict => {
                    debug!(
                        user_id = %user_prefs.user_id,
                        kind = %event.kind,
                        "event suppressed: {verdict:?}",
                    );
                }
            }
        }
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
