pub mod auth;
pub mod chat;
pub mod delivery;
pub mod error;
pub mod message;
pub mod presence;
pub mod registry;
pub mod session;
pub mod store;
pub mod user;

#[cfg(test)]
mod test_support;

use schat_db::DbPool;
use std::sync::Arc;
use std::time::Duration;

use crate::auth::{JwtVerifier, TokenVerifier};
use crate::delivery::DeliveryStateMachine;
use crate::presence::PresenceStore;
use crate::registry::ConnectionRegistry;
use crate::session::SessionManager;
use crate::store::{ChatStore, SqlChatStore};

/// Limits applied to every gateway connection.
#[derive(Clone, Debug)]
pub struct GatewayConfig {
    /// Seconds an unauthenticated connection may stay open.
    pub auth_grace_seconds: u64,
    /// Capacity of each connection's outbound mailbox.
    pub outbound_buffer: usize,
    pub max_events_per_minute: u32,
    pub max_typing_per_minute: u32,
}

impl GatewayConfig {
    pub fn auth_grace(&self) -> Duration {
        Duration::from_secs(self.auth_grace_seconds.max(1))
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            auth_grace_seconds: 10,
            outbound_buffer: 256,
            max_events_per_minute: 240,
            max_typing_per_minute: 30,
        }
    }
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub jwt_secret: String,
    pub jwt_expiry_seconds: u64,
    pub registration_enabled: bool,
    pub gateway: GatewayConfig,
}

impl AppConfig {
    pub fn new(jwt_secret: impl Into<String>) -> Self {
        Self {
            jwt_secret: jwt_secret.into(),
            jwt_expiry_seconds: 7 * 24 * 3600,
            registration_enabled: true,
            gateway: GatewayConfig::default(),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub config: AppConfig,
    pub store: Arc<dyn ChatStore>,
    pub verifier: Arc<dyn TokenVerifier>,
    /// Live gateway connections keyed by user ID.
    pub registry: Arc<ConnectionRegistry>,
    pub presence: Arc<PresenceStore>,
    pub sessions: Arc<SessionManager>,
    pub delivery: DeliveryStateMachine,
}

impl AppState {
    /// State backed by the SQL store and JWT verification.
    pub fn new(db: DbPool, config: AppConfig) -> Self {
        let store: Arc<dyn ChatStore> = Arc::new(SqlChatStore::new(db.clone()));
        let verifier: Arc<dyn TokenVerifier> = Arc::new(JwtVerifier::new(config.jwt_secret.clone()));
        Self::with_collaborators(db, config, store, verifier)
    }

    pub fn with_collaborators(
        db: DbPool,
        config: AppConfig,
        store: Arc<dyn ChatStore>,
        verifier: Arc<dyn TokenVerifier>,
    ) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let presence = Arc::new(PresenceStore::new(store.clone()));
        let sessions = Arc::new(SessionManager::new(registry.clone(), presence.clone()));
        let delivery = DeliveryStateMachine::new(store.clone());
        Self {
            db,
            config,
            store,
            verifier,
            registry,
            presence,
            sessions,
            delivery,
        }
    }
}
