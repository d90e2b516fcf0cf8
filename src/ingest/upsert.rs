use std::sync::Arc;

use crate::error::Result;
use crate::store::locks::KeyedLocks;
use crate::store::Store;
use crate::types::{
    EventKind, MutationEvent, Release, ReleaseDraft, UpsertOutcome,
};

/// Fields whose change classifies an upsert as UPDATED. Deliberately narrow:
/// this is exactly the notification-worthy set. Cosmetic fields (image URL,
/// description-ish data) refresh silently without triggering UPDATED.
fn changed_kinds(existing: &Release, draft: &ReleaseDraft) -> Vec<EventKind> {
    let mut kinds = Vec::new();
    if existing.status != draft.status {
        kinds.push(EventKind::StatusChange);
    }
    if existing.price != draft.price {
        kinds.push(EventKind::PriceChange);
    }
    if existing.release_date != draft.release_date {
        kinds.push(EventKind::DateChange);
    }
    kinds
}

pub struct UpsertEngine {
    store: Store,
    locks: Arc<KeyedLocks>,
}

impl UpsertEngine {
    pub fn new(store: Store, locks: Arc<KeyedLocks>) -> Self {
        Self { store, locks }
    }

    /// Look up the draft's (sku, retailer_id) pair and apply the appropriate
    /// write. The whole lookup-then-write sequence runs under the pair's
    /// keyed lock so concurrent same-key ingestion cannot double-insert.
    pub async fn upsert(
        &self,
        draft: &ReleaseDraft,
        now: i64,
    ) -> Result<(UpsertOutcome, Release, Vec<MutationEvent>)> {
        let key = format!("{}:{}", draft.retailer_id, draft.sku.to_ascii_lowercase());
        let _guard = self.locks.acquire(&key).await;

        match self.store.find_release(&draft.sku, &draft.retailer_id).await? {
            None => {
                let release = Release {
                    id: draft.id.clone(),
                    sku: draft.sku.clone(),
                    retailer_id: draft.retailer_id.clone(),
                    name: draft.name.clone(),
                    brand: draft.brand.clone(),
                    colorway: draft.colorway.clone(),
                    price: draft.price,
                    status: draft.status,
                    release_date: draft.release_date,
                    image_url: draft.image_url.clone(),
                    product_url: draft.product_url.clone(),
                    live_stock: None,
                    stock_updated_at: None,
                    created_at: now,
                    updated_at: now,
                };
                self.store.insert_release(&release).await?;
                let event = mutation_event(EventKind::NewRelease, &release, now);
                Ok((UpsertOutcome::New, release, vec![event]))
            }
            Some(existing) => {
                let kinds = changed_kinds(&existing, draft);
                if kinds.is_empty() {
                    // No notification-worthy change — no write at all.
                    return Ok((UpsertOutcome::Duplicate, existing, Vec::new()));
                }

                let mut release = existing.clone();
                release.name = draft.name.clone();
                release.brand = draft.brand.clone();
                release.colorway = draft.colorway.clone();
                release.price = draft.price;
                release.status = draft.status;
                release.release_date = draft.release_date;
                release.image_url = draft.image_url.clone();
                release.product_url = draft.product_url.clone();
                release.updated_at = now;
                self.store.update_release(&release).await?;

                let events = kinds
                    .into_iter()
                    .map(|kind| {
                        let mut event = mutation_event(kind, &release, now);
                        annotate_previous(&mut event, kind, &existing);
                        event
                    })
                    .collect();
                Ok((UpsertOutcome::Updated, release, events))
            }
        }
    }
}

/// Flat field payload the rule engine evaluates conditions against.
pub fn mutation_event(kind: EventKind, release: &Release, now: i64) -> MutationEvent {
    let mut fields = serde_json::Map::new();
    fields.insert("sku".into(), release.sku.clone().into());
    fields.insert("retailer_id".into(), release.retailer_id.clone().into());
    fields.insert("name".into(), release.name.clone().into());
    fields.insert("brand".into(), release.brand.clone().into());
    fields.insert("status".into(), release.status.to_string().into());
    fields.insert(
        "price".into(),
        release.price.map(Into::into).unwrap_or(serde_json::Value::Null),
    );
    fields.insert(
        "release_date".into(),
        release
            .release_date
            .map(|dt| dt.to_rfc3339().into())
            .unwrap_or(serde_json::Value::Null),
    );
    MutationEvent {
        kind,
        release_id: release.id.clone(),
        fields,
        timestamp: now,
    }
}

fn annotate_previous(event: &mut MutationEvent, kind: EventKind, previous: &Release) {
    match kind {
        EventKind::StatusChange => {
            event
                .fields
                .insert("previous_status".into(), previous.status.to_string().into());
        }
        EventKind::PriceChange => {
            event.fields.insert(
                "previous_price".into(),
                previous.price.map(Into::into).unwrap_or(serde_json::Value::Null),
            );
        }
        EventKind::DateChange => {
            event.fields.insert(
                "previous_release_date".into(),
                previous
                    .release_date
                    .map(|dt| dt.to_rfc3339().into())
                    .unwrap_or(serde_json::Value::Null),
            );
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalizer::normalize;
    use crate::store::test_store;
    use crate::types::ReleaseStatus;
    use serde_json::json;

    fn draft(status: &str, price: f64) -> ReleaseDraft {
        normalize(
            &json!({
                "name": "Air Max 1",
                "sku": "DQ3989-100",
                "brand": "nike",
                "status": status,
                "price": price,
                "retailer_id": "nike",
            }),
            "",
        )
        .unwrap()
    }

    async fn engine() -> UpsertEngine {
        UpsertEngine::new(test_store().await, Arc::new(KeyedLocks::new()))
    }

    #[tokio::test]
    async fn first_ingest_is_new_second_is_duplicate() {
        let engine = engine().await;
        let d = draft("upcoming", 120.0);

        let (outcome, release, events) = engine.upsert(&d, 1000).await.unwrap();
        assert_eq!(outcome, UpsertOutcome::New);
        assert_eq!(release.created_at, 1000);
        assert_eq!(release.updated_at, 1000);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::NewRelease);

        let (outcome, unchanged, events) = engine.upsert(&d, 2000).await.unwrap();
        assert_eq!(outcome, UpsertOutcome::Duplicate);
        assert!(events.is_empty());
        // Stored record untouched between the two calls.
        assert_eq!(unchanged.updated_at, 1000);
    }

    #[tokio::test]
    async fn status_change_is_updated_with_status_change_event() {
        let engine = engine().await;
        engine.upsert(&draft("upcoming", 120.0), 1000).await.unwrap();

        let (outcome, release, events) = engine.upsert(&draft("live", 120.0), 2000).await.unwrap();
        assert_eq!(outcome, UpsertOutcome::Updated);
        assert_eq!(release.status, ReleaseStatus::Live);
        assert_eq!(release.updated_at, 2000);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::StatusChange);
        assert_eq!(events[0].fields["status"], "LIVE");
        assert_eq!(events[0].fields["previous_status"], "UPCOMING");
    }

    #[tokio::test]
    async fn release_date_only_change_is_updated() {
        let engine = engine().await;
        let mut d = draft("upcoming", 120.0);
        d.release_date = "2026-03-26T09:00:00Z".parse().ok();
        engine.upsert(&d, 1000).await.unwrap();

        d.release_date = "2026-04-02T09:00:00Z".parse().ok();
        let (outcome, _, events) = engine.upsert(&d, 2000).await.unwrap();
        assert_eq!(outcome, UpsertOutcome::Updated);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::DateChange);
    }

    #[tokio::test]
    async fn cosmetic_only_change_is_duplicate() {
        let engine = engine().await;
        let mut d = draft("upcoming", 120.0);
        d.image_url = Some("https://img.example/a.jpg".into());
        engine.upsert(&d, 1000).await.unwrap();

        d.image_url = Some("https://img.example/b.jpg".into());
        let (outcome, release, _) = engine.upsert(&d, 2000).await.unwrap();
        assert_eq!(outcome, UpsertOutcome::Duplicate);
        // Not a write: stored row keeps the original cosmetic field.
        assert_eq!(release.image_url.as_deref(), Some("https://img.example/a.jpg"));
    }

    #[tokio::test]
    async fn price_and_status_change_emit_one_event_each() {
        let engine = engine().await;
        engine.upsert(&draft("upcoming", 120.0), 1000).await.unwrap();

        let (_, _, events) = engine.upsert(&draft("live", 135.0), 2000).await.unwrap();
        let kinds: Vec<EventKind> = events.iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![EventKind::StatusChange, EventKind::PriceChange]);
    }

    #[tokio::test]
    async fn at_most_one_release_per_key_under_concurrency() {
        let engine = Arc::new(engine().await);
        let mut handles = Vec::new();
        for i in 0..8 {
            let engine = Arc::clone(&engine);
            handles.push(tokio::spawn(async move {
                engine.upsert(&draft("upcoming", 120.0), 1000 + i).await.unwrap().0
            }));
        }
        let mut news = 0;
        for h in handles {
            if h.await.unwrap() == UpsertOutcome::New {
                news += 1;
            }
        }
        assert_eq!(news, 1);
        assert_eq!(engine.store.release_count().await.unwrap(), 1);
    }
}
