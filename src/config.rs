use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Knobs of an authoritative host session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostConfig {
    /// Roster cap, host seat included.
    pub max_players: usize,
    /// Minimum seats before the game may start.
    pub min_players: usize,
    /// How long a fresh connection gets to send `request-to-join` before
    /// the channel is closed.
    pub join_timeout: Duration,
    /// Pause before the first automatic play on behalf of an offline
    /// turn player.
    pub think_delay: Duration,
    /// Pause between consecutive automatic plays within one turn.
    pub play_pacing: Duration,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            max_players: 6,
            min_players: 2,
            join_timeout: Duration::from_secs(10),
            think_delay: Duration::from_millis(1500),
            play_pacing: Duration::from_millis(900),
        }
    }
}

/// Knobs of a guest session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuestConfig {
    /// Bound on opening the channel to the host.
    pub connect_timeout: Duration,
    /// Bound on the join handshake reply; the channel is closed when it
    /// elapses.
    pub join_timeout: Duration,
}

impl Default for GuestConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            join_timeout: Duration::from_secs(10),
        }
    }
}
