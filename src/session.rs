//! Plumbing shared by the host and guest sessions: the online flag with its
//! status logging, wholesale state replacement, and the explicit subscriber
//! registry for state-change fan-out.

use crate::state::GameState;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionKind {
    Host,
    Guest,
}

impl SessionKind {
    pub fn label(&self) -> &'static str {
        match self {
            SessionKind::Host => "host",
            SessionKind::Guest => "guest",
        }
    }
}

pub type SubscriptionId = u64;

/// The session task is gone; its handle can no longer be served.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionClosed;

impl std::fmt::Display for SessionClosed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "session closed")
    }
}

impl std::error::Error for SessionClosed {}

/// Explicit subscriber registry. Every authoritative mutation fans the new
/// state out to all live subscribers; dead receivers are pruned on the way.
#[derive(Debug, Default)]
pub struct Subscribers {
    next_id: SubscriptionId,
    senders: HashMap<SubscriptionId, mpsc::UnboundedSender<GameState>>,
}

impl Subscribers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, sender: mpsc::UnboundedSender<GameState>) -> SubscriptionId {
        let id = self.next_id;
        self.next_id += 1;
        self.senders.insert(id, sender);
        id
    }

    pub fn remove(&mut self, id: SubscriptionId) {
        self.senders.remove(&id);
    }

    pub fn notify(&mut self, state: &GameState) {
        self.senders
            .retain(|_, sender| sender.send(state.clone()).is_ok());
    }

    pub fn len(&self) -> usize {
        self.senders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.senders.is_empty()
    }
}

/// Per-session bookkeeping embedded by both concrete sessions.
#[derive(Debug)]
pub struct SessionBase {
    pub kind: SessionKind,
    pub uid: String,
    pub online: bool,
    pub state: GameState,
    pub subscribers: Subscribers,
}

impl SessionBase {
    pub fn new(kind: SessionKind, uid: impl Into<String>) -> Self {
        Self {
            kind,
            uid: uid.into(),
            online: false,
            state: GameState::Connecting,
            subscribers: Subscribers::new(),
        }
    }

    pub fn set_online(&mut self, online: bool) {
        if self.online == online {
            return;
        }
        self.online = online;
        if online {
            info!("[{} {}] online", self.kind.label(), self.uid);
        } else {
            info!("[{} {}] offline", self.kind.label(), self.uid);
        }
    }

    /// Replaces the state wholesale (no merge, no diffing) and notifies
    /// every subscriber.
    pub fn replace_state(&mut self, state: GameState) {
        debug!(
            "[{} {}] state {} -> {}",
            self.kind.label(),
            self.uid,
            self.state.status(),
            state.status()
        );
        self.state = state;
        self.subscribers.notify(&self.state);
    }
}
