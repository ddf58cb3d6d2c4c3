use dashmap::DashMap;
use schat_models::events::ServerEvent;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

pub type ConnectionId = u64;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Items queued for a connection's writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Event(ServerEvent),
    Close { code: u16, reason: String },
}

/// Sending half of a connection. Events go through a bounded mailbox; the
/// close request travels separately so a full mailbox cannot swallow it.
/// Clones share the same connection identity.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    tx: mpsc::Sender<Outbound>,
    close_tx: Arc<watch::Sender<Option<(u16, String)>>>,
}

impl ConnectionHandle {
    pub fn new(buffer: usize) -> (Self, Mailbox) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let (close_tx, close_rx) = watch::channel(None);
        let id = NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed);
        (
            Self {
                id,
                tx,
                close_tx: Arc::new(close_tx),
            },
            Mailbox { rx, close_rx },
        )
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Queue an event without waiting. Returns `false` when the mailbox is
    /// full or the connection has gone away.
    pub fn send(&self, event: ServerEvent) -> bool {
        match self.tx.try_send(Outbound::Event(event)) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(connection_id = self.id, "outbound mailbox full, dropping");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    /// Ask the connection to close. The first request wins and is seen by
    /// the mailbox ahead of any queued events. Returns `false` when the
    /// connection has gone away.
    pub fn close(&self, code: u16, reason: impl Into<String>) -> bool {
        let reason = reason.into();
        let mut requested = false;
        self.close_tx.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some((code, reason));
            requested = true;
            true
        });
        requested && !self.close_tx.is_closed()
    }

    /// The close requested for this connection, if any.
    pub fn close_requested(&self) -> Option<(u16, String)> {
        self.close_tx.borrow().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Receiving half of a connection. A close request is returned before
/// anything still queued.
#[derive(Debug)]
pub struct Mailbox {
    rx: mpsc::Receiver<Outbound>,
    close_rx: watch::Receiver<Option<(u16, String)>>,
}

impl Mailbox {
    pub async fn recv(&mut self) -> Option<Outbound> {
        if let Some(close) = self.take_close() {
            return Some(close);
        }
        tokio::select! {
            biased;
            changed = self.close_rx.changed() => {
                let requested = match changed {
                    Ok(()) => self.close_rx.borrow_and_update().clone(),
                    Err(_) => None,
                };
                match requested {
                    Some((code, reason)) => Some(Outbound::Close { code, reason }),
                    None => self.rx.recv().await,
                }
            }
            item = self.rx.recv() => item,
        }
    }

    pub fn try_recv(&mut self) -> Result<Outbound, mpsc::error::TryRecvError> {
        match self.take_close() {
            Some(close) => Ok(close),
            None => self.rx.try_recv(),
        }
    }

    fn take_close(&mut self) -> Option<Outbound> {
        if !self.close_rx.has_changed().unwrap_or(false) {
            return None;
        }
        self.close_rx
            .borrow_and_update()
            .clone()
            .map(|(code, reason)| Outbound::Close { code, reason })
    }
}

/// Maps each authenticated user to their single live connection.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    entries: DashMap<i64, ConnectionHandle>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `handle` for `user_id`, returning the handle it displaced.
    pub fn register(&self, user_id: i64, handle: ConnectionHandle) -> Option<ConnectionHandle> {
        self.entries.insert(user_id, handle)
    }

    /// Remove the entry only if it still belongs to `handle`.
    pub fn unregister(&self, user_id: i64, handle: &ConnectionHandle) -> bool {
        self.entries
            .remove_if(&user_id, |_, current| current.id == handle.id)
            .is_some()
    }

    /// Remove whatever connection `user_id` has.
    pub fn evict(&self, user_id: i64) -> Option<ConnectionHandle> {
        self.entries.remove(&user_id).map(|(_, handle)| handle)
    }

    pub fn lookup(&self, user_id: i64) -> Option<ConnectionHandle> {
        self.entries.get(&user_id).map(|entry| entry.value().clone())
    }

    pub fn is_registered(&self, user_id: i64) -> bool {
        self.entries.contains_key(&user_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
