//! The host session task: one event loop owning the authoritative table,
//! fed by admission tasks, per-peer pump tasks, auto-play timers and the
//! handle's commands.

use super::engine::{AdmitOutcome, AutoPlayDelay, Table};
use crate::channel::{ChannelEvent, PeerChannel, PeerHub, room_id};
use crate::config::HostConfig;
use crate::messages::{DtoBody, GameDto, JoinResponse};
use crate::rpc::{self, WaitOptions};
use crate::session::{SessionBase, SessionClosed, SessionKind, SubscriptionId};
use crate::state::{GameState, PlayerIdentity};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

#[derive(Debug)]
pub enum HostCommand {
    StartGame,
    ResetGame,
    PlayCard,
    GrabCards,
    Subscribe {
        sender: mpsc::UnboundedSender<GameState>,
        reply: oneshot::Sender<SubscriptionId>,
    },
    Unsubscribe(SubscriptionId),
    Snapshot(oneshot::Sender<GameState>),
    Shutdown,
}

#[derive(Debug)]
enum HostEvent {
    /// Fresh channel from the hub listener, not yet admitted.
    Incoming(PeerChannel),
    /// An admission task collected a join request on a fresh channel.
    JoinRequest {
        request_id: String,
        identity: PlayerIdentity,
        channel: PeerChannel,
    },
    PeerFrame {
        uid: String,
        dto: GameDto,
    },
    PeerClosed {
        uid: String,
        conn_id: u64,
    },
    AutoPlayTick {
        uid: String,
    },
    Command(HostCommand),
}

/// Handle to a running host session. Cloneable; the session outlives any
/// single handle and stops on `shutdown`.
#[derive(Debug, Clone)]
pub struct HostHandle {
    identity: PlayerIdentity,
    events: mpsc::UnboundedSender<HostEvent>,
}

impl HostHandle {
    pub fn identity(&self) -> &PlayerIdentity {
        &self.identity
    }

    pub fn uid(&self) -> &str {
        &self.identity.uid
    }

    fn command(&self, command: HostCommand) {
        let _ = self.events.send(HostEvent::Command(command));
    }

    /// Deals and starts the game; ignored outside the lobby or with fewer
    /// than the minimum players.
    pub fn start_game(&self) {
        self.command(HostCommand::StartGame);
    }

    /// Returns a finished game to the lobby.
    pub fn reset_game(&self) {
        self.command(HostCommand::ResetGame);
    }

    /// Plays the host's own card; same turn gating as any guest.
    pub fn play_card(&self) {
        self.command(HostCommand::PlayCard);
    }

    /// Claims the pile for the host on a pair.
    pub fn grab_cards(&self) {
        self.command(HostCommand::GrabCards);
    }

    /// Registers a state subscriber. The current state arrives as the first
    /// item, so no transition can slip by between subscribing and listening.
    pub async fn subscribe(
        &self,
    ) -> Result<(SubscriptionId, mpsc::UnboundedReceiver<GameState>), SessionClosed> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let (reply, response) = oneshot::channel();
        self.command(HostCommand::Subscribe { sender, reply });
        let id = response.await.map_err(|_| SessionClosed)?;
        Ok((id, receiver))
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.command(HostCommand::Unsubscribe(id));
    }

    /// Snapshot of the current authoritative state.
    pub async fn state(&self) -> Result<GameState, SessionClosed> {
        let (reply, response) = oneshot::channel();
        self.command(HostCommand::Snapshot(reply));
        response.await.map_err(|_| SessionClosed)
    }

    pub fn shutdown(&self) {
        self.command(HostCommand::Shutdown);
    }
}

/// Spawns an authoritative host session listening on the identifier derived
/// from its uid.
pub fn spawn(hub: PeerHub, identity: PlayerIdentity, config: HostConfig) -> HostHandle {
    let (event_tx, event_rx) = mpsc::unbounded_channel();

    let mut listener = hub.listen(&room_id(&identity.uid));
    let incoming_tx = event_tx.clone();
    tokio::spawn(async move {
        while let Some(channel) = listener.recv().await {
            if incoming_tx.send(HostEvent::Incoming(channel)).is_err() {
                break;
            }
        }
    });

    let handle = HostHandle {
        identity: identity.clone(),
        events: event_tx.clone(),
    };
    tokio::spawn(host_task(hub, identity, config, event_rx, event_tx));
    handle
}

async fn host_task(
    hub: PeerHub,
    identity: PlayerIdentity,
    config: HostConfig,
    mut events: mpsc::UnboundedReceiver<HostEvent>,
    event_tx: mpsc::UnboundedSender<HostEvent>,
) {
    let mut base = SessionBase::new(SessionKind::Host, identity.uid.clone());
    base.set_online(true);
    let mut table = Table::new(identity.clone(), config.max_players, config.min_players);
    base.replace_state(table.projected_state());

    let mut next_conn_id: u64 = 1;

    while let Some(event) = events.recv().await {
        match event {
            HostEvent::Incoming(channel) => {
                spawn_admission(channel, config.join_timeout, event_tx.clone());
            }
            HostEvent::JoinRequest {
                request_id,
                identity: joiner,
                channel,
            } => {
                let conn_id = next_conn_id;
                next_conn_id += 1;
                let (tx, inbound) = channel.split();
                match table.admit(joiner.clone(), tx.clone(), conn_id) {
                    AdmitOutcome::Rejected { reason } => {
                        info!(
                            "[host {}] rejected {}: {}",
                            identity.uid, joiner.uid, reason
                        );
                        tx.send_dto(&GameDto::reply(
                            DtoBody::RequestToJoinResponse(JoinResponse::Rejected { reason }),
                            &request_id,
                        ));
                        tx.close();
                    }
                    AdmitOutcome::Rejoined | AdmitOutcome::Seated => {
                        tx.send_dto(&GameDto::reply(
                            DtoBody::RequestToJoinResponse(JoinResponse::Accepted {
                                state: table.projected_state(),
                                host: identity.clone(),
                            }),
                            &request_id,
                        ));
                        spawn_peer_pump(joiner.uid, conn_id, inbound, event_tx.clone());
                        table.broadcast(&mut base);
                    }
                }
            }
            HostEvent::PeerFrame { uid, dto } => match dto.body {
                DtoBody::PlayCard => table.play_card(&uid, &mut base),
                DtoBody::GrabCards => table.grab_cards(&uid, &mut base),
                other => debug!(
                    "[host {}] dropping unexpected {} from {}",
                    identity.uid,
                    other.kind(),
                    uid
                ),
            },
            HostEvent::PeerClosed { uid, conn_id } => {
                table.handle_disconnect(&uid, conn_id, &mut base);
            }
            HostEvent::AutoPlayTick { uid } => {
                table.auto_play_step(&uid, &mut base);
            }
            HostEvent::Command(command) => match command {
                HostCommand::StartGame => {
                    let mut rng = rand::rng();
                    table.start_game(&mut rng, &mut base);
                }
                HostCommand::ResetGame => {
                    table.reset_game(&mut base);
                }
                HostCommand::PlayCard => table.play_card(&identity.uid, &mut base),
                HostCommand::GrabCards => table.grab_cards(&identity.uid, &mut base),
                HostCommand::Subscribe { sender, reply } => {
                    let _ = sender.send(base.state.clone());
                    let id = base.subscribers.add(sender);
                    let _ = reply.send(id);
                }
                HostCommand::Unsubscribe(id) => base.subscribers.remove(id),
                HostCommand::Snapshot(reply) => {
                    let _ = reply.send(base.state.clone());
                }
                HostCommand::Shutdown => break,
            },
        }

        if let Some((uid, delay)) = table.take_pending_auto_play() {
            let pause = match delay {
                AutoPlayDelay::Think => config.think_delay,
                AutoPlayDelay::Pace => config.play_pacing,
            };
            let tick_tx = event_tx.clone();
            tokio::spawn(async move {
                tokio::time::sleep(pause).await;
                let _ = tick_tx.send(HostEvent::AutoPlayTick { uid });
            });
        }
    }

    hub.unlisten(&room_id(&identity.uid));
    info!("[host {}] session ended", identity.uid);
}

/// Waits for the join request on a fresh channel without blocking the main
/// loop; the channel is closed if none arrives within the bound.
fn spawn_admission(
    mut channel: PeerChannel,
    timeout: std::time::Duration,
    event_tx: mpsc::UnboundedSender<HostEvent>,
) {
    tokio::spawn(async move {
        let options = WaitOptions {
            timeout,
            close_on_timeout: true,
        };
        match rpc::wait_for_type(&mut channel, "request-to-join", options).await {
            Ok(dto) => {
                let request_id = dto.id.clone();
                if let DtoBody::RequestToJoin { player } = dto.body {
                    let _ = event_tx.send(HostEvent::JoinRequest {
                        request_id,
                        identity: player,
                        channel,
                    });
                }
            }
            Err(e) => debug!("admission of {} abandoned: {}", channel.peer, e),
        }
    });
}

/// Drains an admitted peer's inbound half into the main loop. Close events
/// carry the connection generation so a stale pump cannot affect a seat
/// re-armed by a rejoin.
fn spawn_peer_pump(
    uid: String,
    conn_id: u64,
    mut inbound: mpsc::UnboundedReceiver<ChannelEvent>,
    event_tx: mpsc::UnboundedSender<HostEvent>,
) {
    tokio::spawn(async move {
        loop {
            match inbound.recv().await {
                Some(ChannelEvent::Data(raw)) => match serde_json::from_str::<GameDto>(&raw) {
                    Ok(dto) => {
                        if event_tx
                            .send(HostEvent::PeerFrame {
                                uid: uid.clone(),
                                dto,
                            })
                            .is_err()
                        {
                            break;
                        }
                    }
                    Err(e) => debug!("dropping unparseable frame from {}: {}", uid, e),
                },
                Some(ChannelEvent::Closed) | None => {
                    let _ = event_tx.send(HostEvent::PeerClosed { uid, conn_id });
                    break;
                }
            }
        }
    });
}
