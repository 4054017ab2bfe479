//! The abstracted peer channel this layer runs on, plus an in-process
//! switchboard (`PeerHub`) standing in for the external signaling service.
//! A channel is bidirectional, ordered and reliable once open, or closed.

use crate::messages::GameDto;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

/// What the receiving half of a channel observes.
#[derive(Debug)]
pub enum ChannelEvent {
    /// One JSON frame.
    Data(String),
    /// The remote side closed; no further data will arrive.
    Closed,
}

/// Cloneable send half of a peer channel.
#[derive(Debug, Clone)]
pub struct OutboundTx {
    peer: String,
    tx: mpsc::UnboundedSender<ChannelEvent>,
}

impl OutboundTx {
    /// Sends a dto as a JSON frame. Returns false if the channel is gone;
    /// there is no delivery guarantee beyond that.
    pub fn send_dto(&self, dto: &GameDto) -> bool {
        self.tx.send(ChannelEvent::Data(dto.to_json())).is_ok()
    }

    pub fn close(&self) {
        let _ = self.tx.send(ChannelEvent::Closed);
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }
}

/// One endpoint of an open channel, addressed by the remote peer's uid.
#[derive(Debug)]
pub struct PeerChannel {
    pub peer: String,
    outbound: OutboundTx,
    inbound: mpsc::UnboundedReceiver<ChannelEvent>,
}

impl PeerChannel {
    /// Builds a connected endpoint pair, `a` talking to `b`.
    pub fn pair(a_uid: &str, b_uid: &str) -> (PeerChannel, PeerChannel) {
        let (a_tx, b_rx) = mpsc::unbounded_channel();
        let (b_tx, a_rx) = mpsc::unbounded_channel();
        let a = PeerChannel {
            peer: b_uid.to_string(),
            outbound: OutboundTx {
                peer: b_uid.to_string(),
                tx: a_tx,
            },
            inbound: a_rx,
        };
        let b = PeerChannel {
            peer: a_uid.to_string(),
            outbound: OutboundTx {
                peer: a_uid.to_string(),
                tx: b_tx,
            },
            inbound: b_rx,
        };
        (a, b)
    }

    pub fn send(&self, dto: &GameDto) -> bool {
        self.outbound.send_dto(dto)
    }

    /// Next inbound event; `None` once the remote send half is dropped,
    /// which counts as a close.
    pub async fn recv(&mut self) -> Option<ChannelEvent> {
        self.inbound.recv().await
    }

    pub fn close(&self) {
        self.outbound.close();
    }

    pub fn outbound(&self) -> OutboundTx {
        self.outbound.clone()
    }

    /// Separates the halves so a roster can keep the send side while a pump
    /// task drains the receive side.
    pub fn split(self) -> (OutboundTx, mpsc::UnboundedReceiver<ChannelEvent>) {
        (self.outbound, self.inbound)
    }
}

/// Deterministic listen identifier derived from the host's uid; guests only
/// need the uid to find the room.
pub fn room_id(host_uid: &str) -> String {
    format!("boyevoy-{host_uid}")
}

#[derive(Debug)]
pub enum ConnectError {
    /// No listener appeared on the identifier within the bound.
    Timeout,
}

impl std::fmt::Display for ConnectError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectError::Timeout => write!(f, "timed out opening channel"),
        }
    }
}

impl std::error::Error for ConnectError {}

/// In-process switchboard keyed by listen identifier. Hosts register a
/// listener; guests connect through it and get back an open `PeerChannel`.
/// Discovery across real machines is an external collaborator; this fabric
/// serves the demo binary and the tests.
#[derive(Debug, Clone, Default)]
pub struct PeerHub {
    listeners: Arc<Mutex<HashMap<String, mpsc::UnboundedSender<PeerChannel>>>>,
}

impl PeerHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) the listener on `identifier` and returns the
    /// stream of inbound channels.
    pub fn listen(&self, identifier: &str) -> mpsc::UnboundedReceiver<PeerChannel> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut listeners = self.listeners.lock().expect("hub lock poisoned");
        listeners.insert(identifier.to_string(), tx);
        debug!("hub: listener registered on {}", identifier);
        rx
    }

    pub fn unlisten(&self, identifier: &str) {
        let mut listeners = self.listeners.lock().expect("hub lock poisoned");
        listeners.remove(identifier);
    }

    /// Opens a channel to whoever listens on `identifier`, retrying until
    /// the bound elapses.
    pub async fn connect(
        &self,
        identifier: &str,
        own_uid: &str,
        timeout: Duration,
    ) -> Result<PeerChannel, ConnectError> {
        let attempt = async {
            loop {
                if let Some(channel) = self.try_connect(identifier, own_uid) {
                    return channel;
                }
                tokio::time::sleep(Duration::from_millis(25)).await;
            }
        };
        tokio::time::timeout(timeout, attempt)
            .await
            .map_err(|_| ConnectError::Timeout)
    }

    fn try_connect(&self, identifier: &str, own_uid: &str) -> Option<PeerChannel> {
        let mut listeners = self.listeners.lock().expect("hub lock poisoned");
        let listener = listeners.get(identifier)?;
        let (guest_side, host_side) = PeerChannel::pair(own_uid, identifier);
        if listener.send(host_side).is_err() {
            // Listener task is gone; drop the stale registration.
            listeners.remove(identifier);
            return None;
        }
        Some(guest_side)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::DtoBody;

    #[tokio::test]
    async fn test_pair_delivers_in_order() {
        let (a, mut b) = PeerChannel::pair("left", "right");
        assert!(a.send(&GameDto::new(DtoBody::PlayCard)));
        assert!(a.send(&GameDto::new(DtoBody::GrabCards)));

        match b.recv().await {
            Some(ChannelEvent::Data(raw)) => assert!(raw.contains("play-card")),
            other => panic!("unexpected event: {:?}", other),
        }
        match b.recv().await {
            Some(ChannelEvent::Data(raw)) => assert!(raw.contains("grab-cards")),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_drop_counts_as_close() {
        let (a, mut b) = PeerChannel::pair("left", "right");
        drop(a);
        assert!(b.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_hub_connects_guest_to_listener() {
        let hub = PeerHub::new();
        let mut inbound = hub.listen(&room_id("host-1"));

        let guest = hub
            .connect(&room_id("host-1"), "guest-1", Duration::from_secs(1))
            .await
            .unwrap();
        let mut host_side = inbound.recv().await.unwrap();
        assert_eq!(host_side.peer, "guest-1");

        assert!(guest.send(&GameDto::new(DtoBody::PlayCard)));
        assert!(matches!(
            host_side.recv().await,
            Some(ChannelEvent::Data(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_times_out_without_listener() {
        let hub = PeerHub::new();
        let err = hub
            .connect(&room_id("nobody"), "guest-1", Duration::from_millis(200))
            .await
            .unwrap_err();
        assert!(matches!(err, ConnectError::Timeout));
    }
}
