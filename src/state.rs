use crate::card::Card;
use serde::{Deserialize, Serialize};

/// Stable identity of a participant. `uid` is opaque; `name` is display
/// only and kept locally unique on the host's roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerIdentity {
    pub uid: String,
    pub name: String,
}

impl PlayerIdentity {
    pub fn new(uid: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            name: name.into(),
        }
    }
}

/// The projection of a player that goes over the wire: identity, card count
/// and online flag. Hand contents never leave the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerView {
    pub uid: String,
    pub name: String,
    pub cards_in_deck: usize,
    pub online: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoundWinReason {
    /// The pile was claimed on a rank pair.
    Pair,
    /// The follow-up requirement of a special card ran out.
    Cards,
}

/// The full game state as seen by everyone. The host maintains the single
/// authoritative copy; guests replace theirs wholesale on every sync.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum GameState {
    Connecting,
    Waiting {
        players: Vec<PlayerView>,
    },
    #[serde(rename_all = "camelCase")]
    Playing {
        turn_index: usize,
        can_grab_cards: bool,
        /// Most-recent-first.
        cards_in_play: Vec<Card>,
        cards_to_play: u32,
        last_round_winner: Option<PlayerView>,
        last_round_winner_reason: Option<RoundWinReason>,
        players: Vec<PlayerView>,
        round: u32,
    },
    Finished {
        winner: PlayerView,
        players: Vec<PlayerView>,
    },
    /// Guest-only terminal state.
    CannotJoin {
        reason: String,
    },
}

impl GameState {
    pub fn status(&self) -> &'static str {
        match self {
            GameState::Connecting => "connecting",
            GameState::Waiting { .. } => "waiting",
            GameState::Playing { .. } => "playing",
            GameState::Finished { .. } => "finished",
            GameState::CannotJoin { .. } => "cannot-join",
        }
    }

    pub fn players(&self) -> &[PlayerView] {
        match self {
            GameState::Waiting { players }
            | GameState::Playing { players, .. }
            | GameState::Finished { players, .. } => players,
            GameState::Connecting | GameState::CannotJoin { .. } => &[],
        }
    }

    /// The uid whose turn it is, when playing.
    pub fn turn_uid(&self) -> Option<&str> {
        match self {
            GameState::Playing {
                turn_index,
                players,
                ..
            } => players.get(*turn_index).map(|p| p.uid.as_str()),
            _ => None,
        }
    }
}
