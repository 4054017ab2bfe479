//! The guest session: connect to the host's room, run the join handshake,
//! mirror every broadcast wholesale, and forward gated fire-and-forget
//! actions. Guests hold no authoritative truth of their own.

use crate::channel::{ChannelEvent, PeerChannel, PeerHub, room_id};
use crate::config::GuestConfig;
use crate::messages::{DtoBody, GameDto, JoinResponse};
use crate::rpc::{self, CallOptions, RpcError};
use crate::session::{SessionBase, SessionClosed, SessionKind, SubscriptionId};
use crate::state::{GameState, PlayerIdentity};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

const REASON_UNREACHABLE: &str = "Could not reach the host.";
const REASON_NO_RESPONSE: &str = "The host did not respond.";
const REASON_CONNECTION_LOST: &str = "Connection to the host was lost.";

#[derive(Debug)]
enum GuestCommand {
    PlayCard,
    GrabCards,
    Subscribe {
        sender: mpsc::UnboundedSender<GameState>,
        reply: oneshot::Sender<SubscriptionId>,
    },
    Unsubscribe(SubscriptionId),
    Snapshot(oneshot::Sender<GameState>),
    Leave,
}

/// Handle to a running guest session.
#[derive(Debug, Clone)]
pub struct GuestHandle {
    identity: PlayerIdentity,
    commands: mpsc::UnboundedSender<GuestCommand>,
}

impl GuestHandle {
    pub fn identity(&self) -> &PlayerIdentity {
        &self.identity
    }

    pub fn uid(&self) -> &str {
        &self.identity.uid
    }

    fn command(&self, command: GuestCommand) {
        let _ = self.commands.send(command);
    }

    /// Asks the host to play our front card. Sent only when the local
    /// projection says it is our turn; fire-and-forget either way.
    pub fn play_card(&self) {
        self.command(GuestCommand::PlayCard);
    }

    /// Claims the pile. Sent whenever the game is running; the pair check
    /// is the host's call.
    pub fn grab_cards(&self) {
        self.command(GuestCommand::GrabCards);
    }

    /// Registers a state subscriber. The current state arrives as the first
    /// item.
    pub async fn subscribe(
        &self,
    ) -> Result<(SubscriptionId, mpsc::UnboundedReceiver<GameState>), SessionClosed> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let (reply, response) = oneshot::channel();
        self.command(GuestCommand::Subscribe { sender, reply });
        let id = response.await.map_err(|_| SessionClosed)?;
        Ok((id, receiver))
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.command(GuestCommand::Unsubscribe(id));
    }

    /// Snapshot of the local projection.
    pub async fn state(&self) -> Result<GameState, SessionClosed> {
        let (reply, response) = oneshot::channel();
        self.command(GuestCommand::Snapshot(reply));
        response.await.map_err(|_| SessionClosed)
    }

    /// Closes the channel to the host and ends the session.
    pub fn leave(&self) {
        self.command(GuestCommand::Leave);
    }
}

/// Spawns a guest session that connects to `host_uid`'s room and joins.
pub fn spawn(
    hub: PeerHub,
    host_uid: &str,
    identity: PlayerIdentity,
    config: GuestConfig,
) -> GuestHandle {
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let handle = GuestHandle {
        identity: identity.clone(),
        commands: command_tx,
    };
    tokio::spawn(guest_task(
        hub,
        host_uid.to_string(),
        identity,
        config,
        command_rx,
    ));
    handle
}

async fn guest_task(
    hub: PeerHub,
    host_uid: String,
    identity: PlayerIdentity,
    config: GuestConfig,
    mut commands: mpsc::UnboundedReceiver<GuestCommand>,
) {
    let mut base = SessionBase::new(SessionKind::Guest, identity.uid.clone());

    // Connect-or-fail.
    let mut channel = match hub
        .connect(&room_id(&host_uid), &identity.uid, config.connect_timeout)
        .await
    {
        Ok(channel) => channel,
        Err(e) => {
            warn!("[guest {}] connect failed: {}", identity.uid, e);
            base.replace_state(GameState::CannotJoin {
                reason: REASON_UNREACHABLE.to_string(),
            });
            serve_terminal(base, commands).await;
            return;
        }
    };
    base.set_online(true);

    // Join handshake. A rejection or a silent host both end here.
    let request = GameDto::new(DtoBody::RequestToJoin {
        player: identity.clone(),
    });
    let options = CallOptions {
        wait_for_reply: true,
        timeout: config.join_timeout,
        close_on_timeout: true,
    };
    let host_identity = match rpc::call(&mut channel, request, options).await {
        Ok(Some(reply)) => match reply.body {
            DtoBody::RequestToJoinResponse(JoinResponse::Accepted { state, host }) => {
                info!("[guest {}] joined {}'s game", identity.uid, host.name);
                base.replace_state(state);
                host
            }
            DtoBody::RequestToJoinResponse(JoinResponse::Rejected { reason }) => {
                info!("[guest {}] join rejected: {}", identity.uid, reason);
                channel.close();
                base.set_online(false);
                base.replace_state(GameState::CannotJoin { reason });
                serve_terminal(base, commands).await;
                return;
            }
            other => {
                warn!("[guest {}] unexpected reply {}", identity.uid, other.kind());
                channel.close();
                base.set_online(false);
                base.replace_state(GameState::CannotJoin {
                    reason: REASON_NO_RESPONSE.to_string(),
                });
                serve_terminal(base, commands).await;
                return;
            }
        },
        // Ok(None) cannot happen with wait_for_reply set; treat it like a
        // silent host if it ever does.
        Ok(None) | Err(RpcError::Timeout) => {
            warn!("[guest {}] host did not answer the join request", identity.uid);
            base.set_online(false);
            base.replace_state(GameState::CannotJoin {
                reason: REASON_NO_RESPONSE.to_string(),
            });
            serve_terminal(base, commands).await;
            return;
        }
        Err(RpcError::ChannelClosed) => {
            warn!("[guest {}] channel closed during the join handshake", identity.uid);
            let reason = REASON_CONNECTION_LOST;
            base.set_online(false);
            base.replace_state(GameState::CannotJoin {
                reason: reason.to_string(),
            });
            serve_terminal(base, commands).await;
            return;
        }
    };
    debug!(
        "[guest {}] synced to host {} ({})",
        identity.uid, host_identity.uid, host_identity.name
    );

    // Mirror broadcasts and forward actions until the channel or the
    // handle goes away.
    loop {
        tokio::select! {
            event = channel.recv() => match event {
                Some(ChannelEvent::Data(raw)) => match serde_json::from_str::<GameDto>(&raw) {
                    Ok(GameDto { body: DtoBody::SyncGameState(state), .. }) => {
                        base.replace_state(state);
                    }
                    Ok(dto) => debug!(
                        "[guest {}] dropping unexpected {}",
                        identity.uid,
                        dto.body.kind()
                    ),
                    Err(e) => debug!("[guest {}] dropping unparseable frame: {}", identity.uid, e),
                },
                Some(ChannelEvent::Closed) | None => {
                    base.set_online(false);
                    base.replace_state(GameState::CannotJoin {
                        reason: REASON_CONNECTION_LOST.to_string(),
                    });
                    break;
                }
            },
            command = commands.recv() => match command {
                Some(GuestCommand::PlayCard) => {
                    if base.state.turn_uid() == Some(identity.uid.as_str()) {
                        send_action(&mut channel, DtoBody::PlayCard).await;
                    } else {
                        debug!("[guest {}] play-card suppressed, not our turn", identity.uid);
                    }
                }
                Some(GuestCommand::GrabCards) => {
                    if matches!(base.state, GameState::Playing { .. }) {
                        send_action(&mut channel, DtoBody::GrabCards).await;
                    } else {
                        debug!("[guest {}] grab-cards suppressed outside playing", identity.uid);
                    }
                }
                Some(GuestCommand::Subscribe { sender, reply }) => {
                    let _ = sender.send(base.state.clone());
                    let id = base.subscribers.add(sender);
                    let _ = reply.send(id);
                }
                Some(GuestCommand::Unsubscribe(id)) => base.subscribers.remove(id),
                Some(GuestCommand::Snapshot(reply)) => {
                    let _ = reply.send(base.state.clone());
                }
                Some(GuestCommand::Leave) | None => {
                    info!("[guest {}] leaving", identity.uid);
                    channel.close();
                    base.set_online(false);
                    return;
                }
            },
        }
    }

    serve_terminal(base, commands).await;
}

/// Fire-and-forget: no delivery guarantee, no surfaced send failure. A
/// host-side rejection shows up only as the absence of a later broadcast.
async fn send_action(channel: &mut PeerChannel, body: DtoBody) {
    let options = CallOptions {
        wait_for_reply: false,
        ..CallOptions::default()
    };
    let _ = rpc::call(channel, GameDto::new(body), options).await;
}

/// Keeps answering handle commands after the session reached a terminal
/// state; actions are ignored there.
async fn serve_terminal(mut base: SessionBase, mut commands: mpsc::UnboundedReceiver<GuestCommand>) {
    while let Some(command) = commands.recv().await {
        match command {
            GuestCommand::Subscribe { sender, reply } => {
                let _ = sender.send(base.state.clone());
                let id = base.subscribers.add(sender);
                let _ = reply.send(id);
            }
            GuestCommand::Unsubscribe(id) => base.subscribers.remove(id),
            GuestCommand::Snapshot(reply) => {
                let _ = reply.send(base.state.clone());
            }
            GuestCommand::PlayCard | GuestCommand::GrabCards => {
                debug!("[guest {}] action ignored in {}", base.uid, base.state.status());
            }
            GuestCommand::Leave => return,
        }
    }
}
