use boyevoy::config::{GuestConfig, HostConfig};
use boyevoy::guest::{self, GuestHandle};
use boyevoy::host::{self, HostHandle};
use boyevoy::channel::PeerHub;
use boyevoy::state::{GameState, PlayerIdentity};
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

/// One seat at the table, host or guest, driven the same way.
enum Participant {
    Host(HostHandle),
    Guest(GuestHandle),
}

impl Participant {
    fn uid(&self) -> String {
        match self {
            Participant::Host(h) => h.uid().to_string(),
            Participant::Guest(g) => g.uid().to_string(),
        }
    }

    async fn subscribe(
        &self,
    ) -> anyhow::Result<tokio::sync::mpsc::UnboundedReceiver<GameState>> {
        let (_, rx) = match self {
            Participant::Host(h) => h.subscribe().await?,
            Participant::Guest(g) => g.subscribe().await?,
        };
        Ok(rx)
    }

    fn play_card(&self) {
        match self {
            Participant::Host(h) => h.play_card(),
            Participant::Guest(g) => g.play_card(),
        }
    }

    fn grab_cards(&self) {
        match self {
            Participant::Host(h) => h.grab_cards(),
            Participant::Guest(g) => g.grab_cards(),
        }
    }
}

/// Plays every turn as it comes and grabs whenever the pile allows it,
/// until the game finishes.
async fn autoplay(participant: Participant) -> anyhow::Result<()> {
    let uid = participant.uid();
    let mut states = participant.subscribe().await?;
    while let Some(state) = states.recv().await {
        match state {
            GameState::Playing {
                can_grab_cards, ..
            } => {
                if can_grab_cards {
                    participant.grab_cards();
                } else if state.turn_uid() == Some(uid.as_str()) {
                    // Small pause so the log reads like a game.
                    tokio::time::sleep(Duration::from_millis(150)).await;
                    participant.play_card();
                }
            }
            GameState::Finished { .. } | GameState::CannotJoin { .. } => return Ok(()),
            _ => {}
        }
    }
    Ok(())
}

/// Entry point: runs a three-player game on an in-process hub with every
/// seat driven by a simple bot.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let hub = PeerHub::new();

    let host = host::spawn(
        hub.clone(),
        PlayerIdentity::new(Uuid::new_v4().to_string(), "Anna"),
        HostConfig::default(),
    );
    let (_, mut host_states) = host.subscribe().await?;
    info!("Hosting as {}", host.identity().name);

    let guests: Vec<GuestHandle> = ["Boris", "Clara"]
        .iter()
        .map(|name| {
            guest::spawn(
                hub.clone(),
                host.uid(),
                PlayerIdentity::new(Uuid::new_v4().to_string(), *name),
                GuestConfig::default(),
            )
        })
        .collect();

    // Wait for everyone to be seated before dealing.
    while let Some(state) = host_states.recv().await {
        if matches!(&state, GameState::Waiting { players } if players.len() == 3) {
            break;
        }
    }
    info!("All seats taken, starting the game");
    host.start_game();

    tokio::spawn(autoplay(Participant::Host(host.clone())));
    for g in &guests {
        tokio::spawn(autoplay(Participant::Guest(g.clone())));
    }

    while let Some(state) = host_states.recv().await {
        if let GameState::Finished { winner, .. } = state {
            info!("{} ran everyone out of cards", winner.name);
            break;
        }
    }

    for g in &guests {
        g.leave();
    }
    host.shutdown();
    Ok(())
}
