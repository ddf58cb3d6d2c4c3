use chrono::Utc;
use dashmap::DashMap;
use schat_models::presence::Presence;
use std::sync::Arc;

use crate::store::ChatStore;

/// In-memory presence, mirrored to storage on every change.
///
/// Only the session layer (connect/disconnect, login/logout) writes here.
/// A failed mirror write is logged; the in-memory value stays authoritative.
pub struct PresenceStore {
    entries: DashMap<i64, Presence>,
    store: Arc<dyn ChatStore>,
}

impl PresenceStore {
    pub fn new(store: Arc<dyn ChatStore>) -> Self {
        Self {
            entries: DashMap::new(),
            store,
        }
    }

    pub fn get(&self, user_id: i64) -> Option<Presence> {
        self.entries.get(&user_id).map(|entry| *entry.value())
    }

    pub fn is_online(&self, user_id: i64) -> bool {
        self.get(user_id).is_some_and(|presence| presence.is_online)
    }

    pub async fn set_online(&self, user_id: i64) -> Presence {
        self.record(user_id, Presence::online(Utc::now())).await
    }

    pub async fn set_offline(&self, user_id: i64) -> Presence {
        self.record(user_id, Presence::offline(Utc::now())).await
    }

    /// Refresh `last_seen` without changing the online flag.
    pub async fn touch(&self, user_id: i64) -> Presence {
        let is_online = self.is_online(user_id);
        let now = Utc::now();
        let presence = if is_online {
            Presence::online(now)
        } else {
            Presence::offline(now)
        };
        self.record(user_id, presence).await
    }

    async fn record(&self, user_id: i64, presence: Presence) -> Presence {
        self.entries.insert(user_id, presence);
        if let Err(err) = self
            .store
            .update_user_online_status(user_id, presence.is_online, presence.last_seen)
            .await
        {
            tracing::warn!(
                user_id,
                is_online = presence.is_online,
                error = %err,
                "presence: failed to mirror status"
            );
        }
        presence
    }
}
