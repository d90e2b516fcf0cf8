//! Read-through cache of per-user notification preferences.
//!
//! Preferences are written by an external API and read here on a fixed
//! cadence — the refresh interval is the staleness bound. The cache is an
//! explicitly-scoped struct handed to the notifier, not process-global state.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use sqlx::SqlitePool;
use tokio::time::interval;
use tracing::{error, info, warn};

use crate::config::PREFS_REFRESH_SECS;
use crate::error::Result;
use crate::notify::rules::NotificationPreferences;

/// Where preferences come from. The production source reads the user_prefs
/// table; tests substitute a fixed set.
#[async_trait]
pub trait PreferencesSource: Send + Sync {
    async fn load_all(&self) -> Result<Vec<NotificationPreferences>>;
}

pub struct SqlitePreferencesSource {
    pool: SqlitePool,
}

impl SqlitePreferencesSource {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PreferencesSource for SqlitePreferencesSource {
    async fn load_all(&self) -> Result<Vec<NotificationPreferences>> {
        let rows: Vec<(String, String)> =
            sqlx::query_as("SELECT user_id, prefs FROM user_prefs")
                .fetch_all(&self.pool)
                .await?;

        let mut all = Vec::with_capacity(rows.len());
        for (user_id, prefs_json) in rows {
            match serde_json::from_str::<NotificationPreferences>(&prefs_json) {
                Ok(mut prefs) => {
                    // The row key is authoritative for identity.
                    prefs.user_id = user_id;
                    all.push(prefs);
                }
                Err(e) => warn!(%user_id, "skipping unparseable preferences: {e}"),
            }
        }
        Ok(all)
    }
}

pub struct PrefsCache {
    users: DashMap<String, NotificationPreferences>,
    source: Arc<dyn PreferencesSource>,
}

impl PrefsCache {
    pub fn new(source: Arc<dyn PreferencesSource>) -> Self {
        Self { users: DashMap::new(), source }
    }

    /// Reload from the source: upsert fresh users, drop vanished ones.
    pub async fn refresh(&self) -> Result<usize> {
        let fresh = self.source.load_all().await?;
        let fresh_ids: std::collections::HashSet<String> =
            fresh.iter().map(|p| p.user_id.clone()).collect();

        for prefs in fresh {
            self.users.insert(prefs.user_id.clone(), prefs);
        }
        self.users.retain(|user_id, _| fresh_ids.contains(user_id));
        Ok(self.users.len())
    }

    pub fn all(&self) -> Vec<NotificationPreferences> {
        self.users.iter().map(|entry| entry.value().clone()).collect()
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    /// Background refresh loop. The first tick fires immediately so the
    /// notifier has rules before the first event arrives.
    pub async fn run_refresher(self: Arc<Self>) {
        let mut ticker = interval(std::time::Duration::from_secs(PREFS_REFRESH_SECS));
        loop {
            ticker.tick().await;
            match self.refresh().await {
                Ok(_) => info!(users = self.user_count(), "preferences refreshed"),
                Err(e) => error!("preferences refresh failed: {e}"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::rules::ChannelToggles;
    use crate::store::test_store;

    struct StaticSource {
        users: std::sync::Mutex<Vec<NotificationPreferences>>,
    }

    #[async_trait]
    impl PreferencesSource for StaticSource {
        async fn load_all(&self) -> Result<Vec<NotificationPreferences>> {
            Ok(self.users.lock().unwrap().clone())
        }
    }

    fn user(id: &str) -> NotificationPreferences {
        NotificationPreferences {
            user_id: id.to_string(),
            rules: vec![],
            channels: ChannelToggles::default(),
            quiet_hours: None,
        }
    }

    #[tokio::test]
    async fn refresh_upserts_and_drops_vanished_users() {
        let source = Arc::new(StaticSource {
            users: std::sync::Mutex::new(vec![user("a"), user("b")]),
        });
        let cache = PrefsCache::new(Arc::clone(&source) as Arc<dyn PreferencesSource>);

        assert_eq!(cache.refresh().await.unwrap(), 2);
        assert_eq!(cache.user_count(), 2);

        *source.users.lock().unwrap() = vec![user("b"), user("c")];
        assert_eq!(cache.refresh().await.unwrap(), 2);
        let ids: Vec<String> = cache.all().into_iter().map(|p| p.user_id).collect();
        assert!(ids.contains(&"b".to_string()) && ids.contains(&"c".to_string()));
        assert!(!ids.contains(&"a".to_string()));
    }

    #[tokio::test]
    async fn sqlite_source_loads_rows_and_skips_malformed() {
        let store = test_store().await;
        sqlx::query("INSERT INTO user_prefs (user_id, prefs, updated_at) VALUES (?, ?, 0)")
            .bind("u1")
            .bind(r#"{"user_id": "u1", "channels": {"webhook": true}}"#)
            .execute(store.pool())
            .await
            .unwrap();
        sqlx::query("INSERT INTO user_prefs (user_id, prefs, updated_at) VALUES (?, ?, 0)")
            .bind("u2")
            .bind("{ not json")
            .execute(store.pool())
            .await
            .unwrap();

        let source = SqlitePreferencesSource::new(store.pool().clone());
        let all = source.load_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].user_id, "u1");
        assert!(all[0].channels.webhook);
    }
}
