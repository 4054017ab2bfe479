//! Peer-hosted card game with simple message passing: the host session owns
//! the authoritative table and pushes full-state snapshots; guest sessions
//! mirror them and send fire-and-forget actions.

pub mod card;
pub mod channel;
pub mod config;
pub mod deck;
pub mod guest;
pub mod host;
pub mod messages;
pub mod rpc;
pub mod session;
pub mod state;

pub use card::{Card, CardKind};
pub use channel::{PeerChannel, PeerHub, room_id};
pub use config::{GuestConfig, HostConfig};
pub use deck::Deck;
pub use guest::GuestHandle;
pub use host::HostHandle;
pub use state::{GameState, PlayerIdentity, PlayerView};
