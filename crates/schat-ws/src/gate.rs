use schat_core::auth::AuthError;
use schat_core::registry::ConnectionHandle;
use schat_core::AppState;
use schat_models::events::ServerEvent;

pub const REASON_INVALID_TOKEN: &str = "Invalid token";
pub const REASON_TOKEN_EXPIRED: &str = "Token expired";
pub const REASON_UNKNOWN_USER: &str = "User not found";
pub const REASON_AUTH_TIMEOUT: &str = "Authentication timeout";
pub const REASON_AUTH_UNAVAILABLE: &str = "Authentication unavailable";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    Unauthenticated,
    Authenticated { user_id: i64 },
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    Accepted { user_id: i64 },
    AlreadyAuthenticated,
    Rejected { reason: String },
}

/// Per-connection authentication. Both `Authenticated` and `Rejected` are
/// terminal; a connection is admitted at most once.
#[derive(Debug)]
pub struct AuthGate {
    state: GateState,
}

impl Default for AuthGate {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthGate {
    pub fn new() -> Self {
        Self {
            state: GateState::Unauthenticated,
        }
    }

    pub fn state(&self) -> GateState {
        self.state
    }

    pub fn user_id(&self) -> Option<i64> {
        match self.state {
            GateState::Authenticated { user_id } => Some(user_id),
            _ => None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self.state, GateState::Authenticated { .. })
    }

    /// Verify `token`. On success the connection gets `auth_success`, is
    /// registered and its user flips online.
    pub async fn admit(
        &mut self,
        token: &str,
        state: &AppState,
        handle: &ConnectionHandle,
    ) -> Admission {
        match self.state {
            GateState::Authenticated { .. } => return Admission::AlreadyAuthenticated,
            GateState::Rejected => {
                return Admission::Rejected {
                    reason: REASON_INVALID_TOKEN.to_string(),
                }
            }
            GateState::Unauthenticated => {}
        }

        let user_id = match resolve_user(token, state).await {
            Ok(user_id) => user_id,
            Err(reason) => {
                tracing::info!(
                    connection_id = handle.id(),
                    reason,
                    "gateway: authentication rejected"
                );
                return self.reject(reason);
            }
        };

        // Queued ahead of registration so it precedes anything routed to us.
        handle.send(ServerEvent::AuthSuccess);
        state.sessions.connect(user_id, handle.clone()).await;
        self.state = GateState::Authenticated { user_id };
        tracing::info!(
            user_id,
            connection_id = handle.id(),
            "gateway: connection authenticated"
        );
        Admission::Accepted { user_id }
    }

    /// Fail the gate, e.g. when the grace period runs out.
    pub fn reject(&mut self, reason: &str) -> Admission {
        self.state = GateState::Rejected;
        Admission::Rejected {
            reason: reason.to_string(),
        }
    }
}

async fn resolve_user(token: &str, state: &AppState) -> Result<i64, &'static str> {
    let user_id = state.verifier.verify(token).map_err(|err| match err {
        AuthError::TokenExpired => REASON_TOKEN_EXPIRED,
        _ => REASON_INVALID_TOKEN,
    })?;
    match state.store.get_user(user_id).await {
        Ok(Some(_)) => Ok(user_id),
        Ok(None) => Err(REASON_UNKNOWN_USER),
        Err(err) => {
            tracing::warn!(user_id, error = %err, "gateway: user lookup failed during auth");
            Err(REASON_AUTH_UNAVAILABLE)
        }
    }
}
