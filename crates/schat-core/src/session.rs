use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::presence::PresenceStore;
use crate::registry::{ConnectionHandle, ConnectionRegistry};

/// Close code sent to a connection pushed out by a newer login.
pub const CLOSE_SESSION_REPLACED: u16 = 4001;
/// Close code sent to a connection ended by an explicit logout.
pub const CLOSE_LOGGED_OUT: u16 = 4002;

/// Keeps the registry and presence in step. Every transition for a user
/// runs under that user's lock, so `is_online` holds exactly when a
/// registry entry exists.
pub struct SessionManager {
    registry: Arc<ConnectionRegistry>,
    presence: Arc<PresenceStore>,
    transitions: DashMap<i64, Arc<Mutex<()>>>,
}

impl SessionManager {
    pub fn new(registry: Arc<ConnectionRegistry>, presence: Arc<PresenceStore>) -> Self {
        Self {
            registry,
            presence,
            transitions: DashMap::new(),
        }
    }

    async fn lock_user(&self, user_id: i64) -> OwnedMutexGuard<()> {
        let lock = self.transitions.entry(user_id).or_default().value().clone();
        lock.lock_owned().await
    }

    /// Drop the user's lock once nobody holds or waits on it.
    fn release_user(&self, user_id: i64, guard: OwnedMutexGuard<()>) {
        drop(guard);
        self.transitions
            .remove_if(&user_id, |_, lock| Arc::strong_count(lock) == 1);
    }

    /// Number of users with a lock entry.
    pub fn tracked_users(&self) -> usize {
        self.transitions.len()
    }

    /// Register an authenticated connection and flip the user online.
    /// A displaced connection is told to close.
    pub async fn connect(&self, user_id: i64, handle: ConnectionHandle) {
        let _guard = self.lock_user(user_id).await;
        let connection_id = handle.id();
        if let Some(displaced) = self.registry.register(user_id, handle) {
            if displaced.id() != connection_id {
                tracing::info!(
                    user_id,
                    connection_id,
                    displaced_connection_id = displaced.id(),
                    "session: replacing existing connection"
                );
                displaced.close(CLOSE_SESSION_REPLACED, "session replaced");
            }
        }
        self.presence.set_online(user_id).await;
    }

    /// Drop the connection's entry. Presence only flips offline when this
    /// connection was still the registered one. Returns whether it was.
    pub async fn disconnect(&self, user_id: i64, handle: &ConnectionHandle) -> bool {
        let guard = self.lock_user(user_id).await;
        let removed = self.registry.unregister(user_id, handle);
        if removed {
            self.presence.set_offline(user_id).await;
        }
        self.release_user(user_id, guard);
        removed
    }

    /// Record a REST login. The online flag follows live connections only.
    pub async fn login(&self, user_id: i64) {
        let guard = self.lock_user(user_id).await;
        self.presence.touch(user_id).await;
        self.release_user(user_id, guard);
    }

    /// End the user's live connection (if any) and flip them offline.
    pub async fn logout(&self, user_id: i64) {
        let guard = self.lock_user(user_id).await;
        if let Some(evicted) = self.registry.evict(user_id) {
            tracing::info!(
                user_id,
                connection_id = evicted.id(),
                "session: closing connection on logout"
            );
            evicted.close(CLOSE_LOGGED_OUT, "logged out");
        }
        self.presence.set_offline(user_id).await;
        self.release_user(user_id, guard);
    }
}
