//! Alert transports and fan-out dispatch. A notification goes to every
//! enabled channel independently; one failing transport never blocks or
//! fails the others.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::join_all;
use serde::Serialize;
use tracing::{debug, error};

use crate::config::WEBHOOK_TIMEOUT_SECS;
use crate::error::Result;
use crate::notify::rules::{Channel, ChannelToggles};
use crate::types::{EventKind, MutationEvent, Priority};

/// Finished payload handed to a transport — the external provider contract.
#[derive(Debug, Clone, Serialize)]
pub struct NotificationPayload {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub priority: Priority,
    pub title: String,
    pub message: String,
    pub data: serde_json::Value,
    /// Unix millis.
    pub timestamp: i64,
}

pub fn build_payload(event: &MutationEvent, priority: Priority) -> NotificationPayload {
    let name = field_str(event, "name").unwrap_or("A tracked release");
    let retailer = field_str(event, "retailer_id").unwrap_or("a retailer");
    let message = match event.kind {
        EventKind::NewRelease => format!("Now tracking {name} at {retailer}"),
        EventKind::StatusChange => {
            let status = field_str(event, "status").unwrap_or("UNKNOWN");
            format!("{name} is now {status} at {retailer}")
        }
        EventKind::PriceChange => match event.fields.get("price").and_then(|v| v.as_f64()) {
            Some(price) => format!("{name} price changed to {price:.2} at {retailer}"),
            None => format!("{name} price changed at {retailer}"),
        },
        EventKind::DateChange => {
            let date = field_str(event, "release_date").unwrap_or("TBD");
            format!("{name} release date moved to {date}")
        }
        EventKind::Restock => format!("{name} inventory changed at {retailer}"),
    };

    NotificationPayload {
        kind: event.kind,
        priority,
        title: format!("{} — {}", event.kind, name),
        message,
        data: serde_json::Value::Object(event.fields.clone()),
        timestamp: event.timestamp,
    }
}

fn field_str<'a>(event: &'a MutationEvent, key: &str) -> Option<&'a str> {
    event.fields.get(key).and_then(|v| v.as_str())
}

/// One delivery channel. Implementations accept a finished payload and
/// attempt delivery; retry, if any, is the provider's problem.
#[async_trait]
pub trait AlertTransport: Send + Sync {
    fn channel(&self) -> Channel;
    async fn deliver(&self, user_id: &str, payload: &NotificationPayload) -> Result<()>;
}

/// POSTs `{user_id, ...payload}` to a configured endpoint.
pub struct WebhookTransport {
    client: reqwest::Client,
    url: String,
}

impl WebhookTransport {
    pub fn new(url: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(WEBHOOK_TIMEOUT_SECS))
            .build()?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl AlertTransport for WebhookTransport {
    fn channel(&self) -> Channel {
        Channel::Webhook
    }

    async fn deliver(&self, user_id: &str, payload: &NotificationPayload) -> Result<()> {
        let body = serde_json::json!({ "user_id": user_id, "notification": payload });
        self.client
            .post(&self.url)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

/// Stand-in for provider-backed channels (email, push, SMS). The real
/// providers are external collaborators; this logs what would be handed over.
pub struct LogTransport {
    channel: Channel,
}

impl LogTransport {
    pub fn new(channel: Channel) -> Self {
        Self { channel }
    }
}

#[async_trait]
impl AlertTransport for LogTransport {
    fn channel(&self) -> Channel {
        self.channel
    }

    async fn deliver(&self, user_id: &str, payload: &NotificationPayload) -> Result<()> {
        debug!(
            channel = %self.channel,
            user_id,
            priority = %payload.priority,
            "{}: {}",
            payload.title,
            payload.message,
        );
        Ok(())
    }
}

pub struct Dispatcher {
    transports: Vec<Arc<dyn AlertTransport>>,
}

impl Dispatcher {
    pub fn new(transports: Vec<Arc<dyn AlertTransport>>) -> Self {
        Self { transports }
    }

    /// Fan out to every enabled channel for the user. Each delivery settles
    /// independently — errors are logged per channel, never propagated.
    /// Returns the number of successful deliveries.
    pub async fn dispatch(
        &self,
        user_id: &str,
        channels: &ChannelToggles,
        payload: &NotificationPayload,
    ) -> usize {
        let deliveries = self
            .transports
            .iter()
            .filter(|t| channels.is_enabled(t.channel()))
            .map(|transport| {
                let transport = Arc::clone(transport);
                async move {
                    match transport.deliver(user_id, payload).await {
                        Ok(()) => true,
                        Err(e) => {
                            error!(
                                channel = %transport.channel(),
                                user_id,
                                "transport delivery failed: {e}"
                            );
                            false
                        }
                    }
                }
            });

        join_all(deliveries).await.into_iter().filter(|ok| *ok).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingTransport {
        channel: Channel,
        delivered: AtomicUsize,
        fail: bool,
    }

    impl CountingTransport {
        fn new(channel: Channel, fail: bool) -> Arc<Self> {
            Arc::new(Self { channel, delivered: AtomicUsize::new(0), fail })
        }
    }

    #[async_trait]
    impl AlertTransport for CountingTransport {
        fn channel(&self) -> Channel {
            self.channel
        }

        async fn deliver(&self, _user_id: &str, _payload: &NotificationPayload) -> Result<()> {
            if self.fail {
                return Err(AppError::Adapter("provider down".into()));
            }
            self.delivered.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn sample_payload() -> NotificationPayload {
        NotificationPayload {
            kind: EventKind::StatusChange,
            priority: Priority::High,
            title: "t".into(),
            message: "m".into(),
            data: json!({}),
            timestamp: 0,
        }
    }

    #[tokio::test]
    async fn dispatch_skips_disabled_channels() {
        let webhook = CountingTransport::new(Channel::Webhook, false);
        let email = CountingTransport::new(Channel::Email, false);
        let dispatcher = Dispatcher::new(vec![webhook.clone(), email.clone()]);

        let toggles = ChannelToggles { webhook: true, ..Default::default() };
        let sent = dispatcher.dispatch("u1", &toggles, &sample_payload()).await;

        assert_eq!(sent, 1);
        assert_eq!(webhook.delivered.load(Ordering::SeqCst), 1);
        assert_eq!(email.delivered.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn one_failing_channel_does_not_fail_the_others() {
        let webhook = CountingTransport::new(Channel::Webhook, true);
        let push = CountingTransport::new(Channel::Push, false);
        let sms = CountingTransport::new(Channel::Sms, false);
        let dispatcher = Dispatcher::new(vec![webhook, push.clone(), sms.clone()]);

        let toggles = ChannelToggles { webhook: true, push: true, sms: true, email: false };
        let sent = dispatcher.dispatch("u1", &toggles, &sample_payload()).await;

        assert_eq!(sent, 2);
        assert_eq!(push.delivered.load(Ordering::SeqCst), 1);
        assert_eq!(sms.delivered.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn payload_carries_event_fields_as_data() {
        let event = MutationEvent {
            kind: EventKind::StatusChange,
            release_id: "nike:s1".into(),
            fields: json!({"name": "Air Max 1", "retailer_id": "nike", "status": "LIVE"})
                .as_object()
                .cloned()
                .unwrap(),
            timestamp: 42,
        };
        let payload = build_payload(&event, Priority::Urgent);
        assert_eq!(payload.message, "Air Max 1 is now LIVE at nike");
        assert_eq!(payload.title, "STATUS_CHANGE — Air Max 1");
        assert_eq!(payload.data["status"], "LIVE");
        assert_eq!(payload.timestamp, 42);

        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["type"], "STATUS_CHANGE");
        assert_eq!(json["priority"], "URGENT");
    }
}
