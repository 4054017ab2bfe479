use crate::state::{GameState, PlayerIdentity};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Wire envelope: `{id, type, replyTo?, payload?}`. `id` and `replyTo` exist
/// only to correlate RPC replies; envelopes are created per send and
/// discarded after delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameDto {
    pub id: String,
    #[serde(rename = "replyTo", default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
    #[serde(flatten)]
    pub body: DtoBody,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum DtoBody {
    #[serde(rename = "request-to-join")]
    RequestToJoin { player: PlayerIdentity },
    #[serde(rename = "request-to-join-response")]
    RequestToJoinResponse(JoinResponse),
    #[serde(rename = "sync-game-state")]
    SyncGameState(GameState),
    #[serde(rename = "play-card")]
    PlayCard,
    #[serde(rename = "grab-cards")]
    GrabCards,
}

impl DtoBody {
    pub fn kind(&self) -> &'static str {
        match self {
            DtoBody::RequestToJoin { .. } => "request-to-join",
            DtoBody::RequestToJoinResponse(_) => "request-to-join-response",
            DtoBody::SyncGameState(_) => "sync-game-state",
            DtoBody::PlayCard => "play-card",
            DtoBody::GrabCards => "grab-cards",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum JoinResponse {
    #[serde(rename = "accepted")]
    Accepted {
        state: GameState,
        host: PlayerIdentity,
    },
    #[serde(rename = "rejected")]
    Rejected { reason: String },
}

impl GameDto {
    pub fn new(body: DtoBody) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            reply_to: None,
            body,
        }
    }

    /// An envelope answering the request with the given id.
    pub fn reply(body: DtoBody, request_id: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            reply_to: Some(request_id.to_string()),
            body,
        }
    }

    /// JSON line for the wire. Serialization of our own types cannot fail
    /// in practice; fall back to a rejected frame rather than panic.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            tracing::error!("failed to serialize dto: {}", e);
            r#"{"id":"0","type":"request-to-join-response","payload":{"type":"rejected","reason":"Serialization failed"}}"#
                .to_string()
        })
    }
}
