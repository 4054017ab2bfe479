//! The authoritative table: roster, hands, pile and the turn/round state
//! machine. Everything here mutates synchronously inside the host task's
//! event handler; the projected state goes out to every online seat after
//! each mutation.

use crate::channel::OutboundTx;
use crate::deck::Deck;
use crate::messages::{DtoBody, GameDto};
use crate::session::SessionBase;
use crate::state::{GameState, PlayerIdentity, PlayerView, RoundWinReason};
use rand::Rng;
use tracing::{debug, info, warn};

/// One roster entry. The host's own seat has no channel and is always
/// online; it acts through handle commands instead.
#[derive(Debug)]
pub(crate) struct Seat {
    pub identity: PlayerIdentity,
    pub hand: Deck,
    pub tx: Option<OutboundTx>,
    pub online: bool,
    /// Generation of the current channel; close events from an older
    /// channel are stale and must not touch the seat.
    pub conn_id: u64,
}

impl Seat {
    fn view(&self) -> PlayerView {
        PlayerView {
            uid: self.identity.uid.clone(),
            name: self.identity.name.clone(),
            cards_in_deck: self.hand.count(),
            online: self.online,
        }
    }
}

#[derive(Debug)]
enum Phase {
    Waiting,
    Playing,
    Finished { winner: PlayerView },
}

/// Which pause precedes the next automatic play.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AutoPlayDelay {
    /// First play of an unattended turn.
    Think,
    /// Consecutive plays within one turn.
    Pace,
}

#[derive(Debug)]
pub(crate) enum AdmitOutcome {
    /// A known uid came back; seat re-armed, roster untouched.
    Rejoined,
    /// New seat added under the (possibly disambiguated) name.
    Seated,
    Rejected { reason: String },
}

pub(crate) struct Table {
    host: PlayerIdentity,
    max_players: usize,
    min_players: usize,
    phase: Phase,
    seats: Vec<Seat>,
    turn_index: usize,
    /// Most-recent-first.
    cards_in_play: Vec<crate::card::Card>,
    cards_to_play: u32,
    round: u32,
    win_threshold: usize,
    provisional_winner: Option<String>,
    last_round_winner: Option<String>,
    last_round_reason: Option<RoundWinReason>,
    pending_auto_play: Option<(String, AutoPlayDelay)>,
}

impl Table {
    pub fn new(host: PlayerIdentity, max_players: usize, min_players: usize) -> Self {
        let host_seat = Seat {
            identity: host.clone(),
            hand: Deck::default(),
            tx: None,
            online: true,
            conn_id: 0,
        };
        Self {
            host,
            max_players,
            min_players,
            phase: Phase::Waiting,
            seats: vec![host_seat],
            turn_index: 0,
            cards_in_play: Vec::new(),
            cards_to_play: 1,
            round: 0,
            win_threshold: 0,
            provisional_winner: None,
            last_round_winner: None,
            last_round_reason: None,
            pending_auto_play: None,
        }
    }

    fn seat_index(&self, uid: &str) -> Option<usize> {
        self.seats.iter().position(|s| s.identity.uid == uid)
    }

    fn name_taken(&self, name: &str) -> bool {
        self.seats.iter().any(|s| s.identity.name == name)
    }

    /// Disambiguates a colliding display name with an incrementing counter.
    fn unique_name(&self, wanted: &str) -> String {
        if !self.name_taken(wanted) {
            return wanted.to_string();
        }
        let mut n = 2;
        loop {
            let candidate = format!("{wanted} {n}");
            if !self.name_taken(&candidate) {
                return candidate;
            }
            n += 1;
        }
    }

    /// Join admission. Rejoining uids get their old seat back in any phase;
    /// fresh joins are only possible in the lobby and under the cap.
    pub fn admit(&mut self, joiner: PlayerIdentity, tx: OutboundTx, conn_id: u64) -> AdmitOutcome {
        if let Some(i) = self.seat_index(&joiner.uid) {
            let seat = &mut self.seats[i];
            seat.online = true;
            seat.tx = Some(tx);
            seat.conn_id = conn_id;
            info!("[host {}] {} rejoined", self.host.uid, seat.identity.name);
            return AdmitOutcome::Rejoined;
        }
        if !matches!(self.phase, Phase::Waiting) {
            return AdmitOutcome::Rejected {
                reason: "On-going game, try again later.".to_string(),
            };
        }
        if self.seats.len() >= self.max_players {
            return AdmitOutcome::Rejected {
                reason: format!("Game is full. {} players max.", self.max_players),
            };
        }
        let name = self.unique_name(&joiner.name);
        info!("[host {}] {} joined as \"{}\"", self.host.uid, joiner.uid, name);
        self.seats.push(Seat {
            identity: PlayerIdentity::new(joiner.uid, name),
            hand: Deck::default(),
            tx: Some(tx),
            online: true,
            conn_id,
        });
        AdmitOutcome::Seated
    }

    /// Deals a fresh shuffled deck and opens the turn loop at a uniformly
    /// random seat. Only valid in the lobby with enough players.
    pub fn start_game<R: Rng + ?Sized>(&mut self, rng: &mut R, base: &mut SessionBase) -> bool {
        if !matches!(self.phase, Phase::Waiting) {
            warn!("[host {}] start ignored, game already started", self.host.uid);
            return false;
        }
        if self.seats.len() < self.min_players {
            warn!(
                "[host {}] start ignored, need at least {} players",
                self.host.uid, self.min_players
            );
            return false;
        }

        let mut deck = Deck::standard();
        deck.shuffle(rng);
        self.win_threshold = deck.count();
        let hands = deck.split(self.seats.len());
        for (seat, hand) in self.seats.iter_mut().zip(hands) {
            seat.hand = hand;
        }
        self.phase = Phase::Playing;
        self.round = 1;
        self.cards_to_play = 1;
        self.cards_in_play.clear();
        self.provisional_winner = None;
        self.last_round_winner = None;
        self.last_round_reason = None;
        self.turn_index = rng.random_range(0..self.seats.len());
        info!(
            "[host {}] game started with {} players, {} starts",
            self.host.uid,
            self.seats.len(),
            self.seats[self.turn_index].identity.name
        );
        self.begin_turn(base);
        true
    }

    /// Advances the turn cyclically, finishing the game when the last
    /// round's winner holds the whole deck.
    fn next_turn(&mut self, base: &mut SessionBase) {
        self.turn_index = (self.turn_index + 1) % self.seats.len();

        if let Some(winner_uid) = self.last_round_winner.clone() {
            if let Some(i) = self.seat_index(&winner_uid) {
                if self.seats[i].hand.count() == self.win_threshold {
                    self.finish(i, base);
                    return;
                }
            }
        }
        self.begin_turn(base);
    }

    /// Seats the turn on the current index: skips exhausted hands while the
    /// pile lacks the full deck, arms auto-play for offline players, and
    /// broadcasts either way.
    fn begin_turn(&mut self, base: &mut SessionBase) {
        let n = self.seats.len();
        let mut skipped = 0;
        while self.seats[self.turn_index].hand.is_empty()
            && self.cards_in_play.len() < self.win_threshold
            && skipped < n
        {
            self.turn_index = (self.turn_index + 1) % n;
            skipped += 1;
        }

        let seat = &self.seats[self.turn_index];
        if !seat.online {
            debug!(
                "[host {}] {} is offline, playing on their behalf",
                self.host.uid, seat.identity.name
            );
            self.pending_auto_play = Some((seat.identity.uid.clone(), AutoPlayDelay::Think));
        }
        self.broadcast(base);
    }

    /// A `play-card` action. Only the current turn player's frames reach
    /// this path with effect; anything else is dropped without an answer.
    pub fn play_card(&mut self, uid: &str, base: &mut SessionBase) {
        if !matches!(self.phase, Phase::Playing) {
            debug!("[host {}] play-card outside playing dropped", self.host.uid);
            return;
        }
        if self.seats[self.turn_index].identity.uid != uid {
            debug!("[host {}] off-turn play-card from {} dropped", self.host.uid, uid);
            return;
        }
        if self.cards_to_play == 0 {
            debug!("[host {}] play-card with nothing to play dropped", self.host.uid);
            return;
        }
        let Some(card) = self.seats[self.turn_index].hand.pick_card() else {
            debug!("[host {}] play-card on empty hand dropped", self.host.uid);
            return;
        };
        debug!(
            "[host {}] {} plays {} ({})",
            self.host.uid,
            self.seats[self.turn_index].identity.name,
            card.display_text,
            card.suit_color
        );
        let follow_up = card.kind.follow_up_requirement();
        self.cards_in_play.insert(0, card);

        match follow_up {
            Some(required) => {
                // Special card: the next player owes follow-ups and this
                // player wins the pile unless a later special counters.
                self.cards_to_play = required;
                self.provisional_winner = Some(uid.to_string());
                self.next_turn(base);
            }
            None => {
                self.cards_to_play -= 1;
                self.broadcast(base);
                let hand_empty = self.seats[self.turn_index].hand.is_empty();
                if self.cards_to_play == 0 || hand_empty {
                    if let Some(winner) = self.provisional_winner.take() {
                        self.resolve_round(&winner, RoundWinReason::Cards, base);
                    } else {
                        self.cards_to_play = 1;
                        self.next_turn(base);
                    }
                }
            }
        }
    }

    /// A `grab-cards` action: any seated player may claim the pile when the
    /// two most recent cards pair up, whoever's turn it is.
    pub fn grab_cards(&mut self, uid: &str, base: &mut SessionBase) {
        if !matches!(self.phase, Phase::Playing) {
            debug!("[host {}] grab-cards outside playing dropped", self.host.uid);
            return;
        }
        if self.seat_index(uid).is_none() {
            debug!("[host {}] grab-cards from unknown {} dropped", self.host.uid, uid);
            return;
        }
        if !self.can_grab_cards() {
            debug!("[host {}] grab-cards without a pair dropped", self.host.uid);
            return;
        }
        self.resolve_round(uid, RoundWinReason::Pair, base);
    }

    pub fn can_grab_cards(&self) -> bool {
        match self.cards_in_play.as_slice() {
            [top, below, ..] => top.pairs_with(below),
            _ => false,
        }
    }

    /// Hands the pile to the winner and opens the next round.
    fn resolve_round(&mut self, winner_uid: &str, reason: RoundWinReason, base: &mut SessionBase) {
        let Some(i) = self.seat_index(winner_uid) else {
            warn!("[host {}] round winner {} left the roster", self.host.uid, winner_uid);
            return;
        };
        info!(
            "[host {}] round {} goes to {} ({:?})",
            self.host.uid, self.round, self.seats[i].identity.name, reason
        );
        let pile = std::mem::take(&mut self.cards_in_play);
        self.seats[i].hand.add_cards_to_bottom(pile);
        self.round += 1;
        self.cards_to_play = 1;
        self.provisional_winner = None;
        self.last_round_winner = Some(winner_uid.to_string());
        self.last_round_reason = Some(reason);
        self.next_turn(base);
    }

    /// Ends the game and rewinds the turn machinery so a reset can restart
    /// cleanly. The roster is preserved.
    fn finish(&mut self, winner_index: usize, base: &mut SessionBase) {
        let winner = self.seats[winner_index].view();
        info!("[host {}] game over, {} wins", self.host.uid, winner.name);
        self.phase = Phase::Finished { winner };
        self.turn_index = 0;
        self.cards_in_play.clear();
        self.cards_to_play = 1;
        self.round = 0;
        self.provisional_winner = None;
        self.last_round_winner = None;
        self.last_round_reason = None;
        self.pending_auto_play = None;
        self.broadcast(base);
    }

    /// Back to the lobby after a finished game. Seats whose channel is gone
    /// are dropped here, which is the waiting-phase removal rule applied at
    /// the moment the phase becomes waiting again.
    pub fn reset_game(&mut self, base: &mut SessionBase) -> bool {
        if !matches!(self.phase, Phase::Finished { .. }) {
            warn!("[host {}] reset ignored outside finished", self.host.uid);
            return false;
        }
        // The host seat is always online; guest seats whose channel is
        // gone carry online = false.
        self.seats.retain(|s| s.online);
        for seat in &mut self.seats {
            seat.hand = Deck::default();
        }
        self.phase = Phase::Waiting;
        self.turn_index = 0;
        info!("[host {}] game reset to lobby", self.host.uid);
        self.broadcast(base);
        true
    }

    /// Channel loss. Lobby and finished seats are removed; during play the
    /// seat only goes offline so turn indices and dealt hands stay valid,
    /// and an unattended current turn switches to auto-play.
    pub fn handle_disconnect(&mut self, uid: &str, conn_id: u64, base: &mut SessionBase) {
        let Some(i) = self.seat_index(uid) else {
            return;
        };
        if self.seats[i].conn_id != conn_id {
            debug!("[host {}] stale close for {} ignored", self.host.uid, uid);
            return;
        }
        match self.phase {
            Phase::Waiting | Phase::Finished { .. } => {
                let seat = self.seats.remove(i);
                info!("[host {}] {} left", self.host.uid, seat.identity.name);
                self.broadcast(base);
            }
            Phase::Playing => {
                let seat = &mut self.seats[i];
                seat.online = false;
                seat.tx = None;
                info!(
                    "[host {}] {} went offline mid-game",
                    self.host.uid, seat.identity.name
                );
                if i == self.turn_index {
                    self.pending_auto_play = Some((uid.to_string(), AutoPlayDelay::Think));
                }
                self.broadcast(base);
            }
        }
    }

    /// One automatic play on behalf of an offline turn player. Re-validated
    /// against the current turn and online flag, so a tick scheduled before
    /// a reconnect or a turn change is a no-op.
    pub fn auto_play_step(&mut self, uid: &str, base: &mut SessionBase) {
        if !matches!(self.phase, Phase::Playing) {
            return;
        }
        let seat = &self.seats[self.turn_index];
        if seat.identity.uid != uid || seat.online {
            debug!("[host {}] auto-play for {} no longer applies", self.host.uid, uid);
            return;
        }
        if seat.hand.is_empty() {
            // Nothing left to play for them; keep the game moving.
            self.next_turn(base);
            return;
        }
        self.play_card(uid, base);

        // Still the same unattended turn with cards owed: keep pacing.
        if matches!(self.phase, Phase::Playing) {
            let seat = &self.seats[self.turn_index];
            if seat.identity.uid == uid && !seat.online && self.cards_to_play > 0 {
                self.pending_auto_play = Some((uid.to_string(), AutoPlayDelay::Pace));
            }
        }
    }

    /// Auto-play request raised by the last mutation, if any. The task
    /// schedules the matching timer.
    pub fn take_pending_auto_play(&mut self) -> Option<(String, AutoPlayDelay)> {
        self.pending_auto_play.take()
    }

    pub fn host_identity(&self) -> &PlayerIdentity {
        &self.host
    }

    /// Full projected state: identities, card counts and online flags only.
    /// Hand contents never appear here.
    pub fn projected_state(&self) -> GameState {
        let players: Vec<PlayerView> = self.seats.iter().map(Seat::view).collect();
        match &self.phase {
            Phase::Waiting => GameState::Waiting { players },
            Phase::Playing => GameState::Playing {
                turn_index: self.turn_index,
                can_grab_cards: self.can_grab_cards(),
                cards_in_play: self.cards_in_play.clone(),
                cards_to_play: self.cards_to_play,
                last_round_winner: self
                    .last_round_winner
                    .as_deref()
                    .and_then(|uid| self.seat_index(uid))
                    .map(|i| self.seats[i].view()),
                last_round_winner_reason: self.last_round_reason,
                players,
                round: self.round,
            },
            Phase::Finished { winner } => GameState::Finished {
                winner: winner.clone(),
                players,
            },
        }
    }

    /// Pushes the projection to every online remote seat and to the local
    /// subscribers. Offline seats get nothing until they reconnect and are
    /// resynced on acceptance.
    pub fn broadcast(&self, base: &mut SessionBase) {
        let state = self.projected_state();
        for seat in &self.seats {
            if !seat.online {
                continue;
            }
            if let Some(tx) = &seat.tx {
                tx.send_dto(&GameDto::new(DtoBody::SyncGameState(state.clone())));
            }
        }
        base.replace_state(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::card::Card;
    use crate::channel::PeerChannel;
    use crate::session::SessionKind;

    fn host_identity() -> PlayerIdentity {
        PlayerIdentity::new("host", "Horus")
    }

    /// Table with the host plus one guest seat per name. Guest-side channel
    /// endpoints are returned so tests can observe broadcasts.
    fn table_with(names: &[&str]) -> (Table, SessionBase, Vec<PeerChannel>) {
        let mut table = Table::new(host_identity(), 6, 2);
        let base = SessionBase::new(SessionKind::Host, "host");
        let mut guests = Vec::new();
        for (i, name) in names.iter().enumerate() {
            let uid = format!("u{i}");
            let (guest_side, host_side) = PeerChannel::pair(&uid, "host");
            let (tx, _inbound) = host_side.split();
            let outcome = table.admit(PlayerIdentity::new(uid, *name), tx, i as u64 + 1);
            assert!(matches!(outcome, AdmitOutcome::Seated));
            guests.push(guest_side);
        }
        (table, base, guests)
    }

    fn common(rank: u8) -> Card {
        Card::new(rank, "#ffffff")
    }

    /// Puts the table straight into a deterministic playing phase.
    fn force_playing(table: &mut Table, hands: Vec<Vec<Card>>, turn_index: usize) {
        assert_eq!(hands.len(), table.seats.len());
        let total: usize = hands.iter().map(Vec::len).sum();
        for (seat, hand) in table.seats.iter_mut().zip(hands) {
            seat.hand = Deck::new(hand);
        }
        table.phase = Phase::Playing;
        table.win_threshold = total;
        table.round = 1;
        table.cards_to_play = 1;
        table.turn_index = turn_index;
    }

    #[test]
    fn test_name_collision_gets_counter_suffix() {
        let (mut table, _base, _guests) = table_with(&["Anna"]);
        let (_, host_side) = PeerChannel::pair("dup1", "host");
        table.admit(PlayerIdentity::new("dup1", "Anna"), host_side.split().0, 10);
        let (_, host_side) = PeerChannel::pair("dup2", "host");
        table.admit(PlayerIdentity::new("dup2", "Anna"), host_side.split().0, 11);

        let names: Vec<String> = table
            .seats
            .iter()
            .map(|s| s.identity.name.clone())
            .collect();
        assert!(names.contains(&"Anna".to_string()));
        assert!(names.contains(&"Anna 2".to_string()));
        assert!(names.contains(&"Anna 3".to_string()));
    }

    #[test]
    fn test_seventh_join_is_rejected_as_full() {
        let (mut table, _base, _guests) = table_with(&["A", "B", "C", "D", "E"]);
        assert_eq!(table.seats.len(), 6);

        let (_, host_side) = PeerChannel::pair("u7", "host");
        let outcome = table.admit(PlayerIdentity::new("u7", "Late"), host_side.split().0, 10);
        match outcome {
            AdmitOutcome::Rejected { reason } => {
                assert_eq!(reason, "Game is full. 6 players max.")
            }
            other => panic!("expected rejection, got {:?}", other),
        }
    }

    #[test]
    fn test_join_rejected_while_playing() {
        let (mut table, mut base, _guests) = table_with(&["Anna"]);
        let ok = table.start_game(&mut rand::rng(), &mut base);
        assert!(ok);

        let (_, host_side) = PeerChannel::pair("u9", "host");
        let outcome = table.admit(PlayerIdentity::new("u9", "Late"), host_side.split().0, 10);
        match outcome {
            AdmitOutcome::Rejected { reason } => {
                assert_eq!(reason, "On-going game, try again later.")
            }
            other => panic!("expected rejection, got {:?}", other),
        }
    }

    #[test]
    fn test_rejoin_restores_the_same_seat() {
        let (mut table, mut base, _guests) = table_with(&["Anna"]);
        table.start_game(&mut rand::rng(), &mut base);
        let hand_before = table.seats[1].hand.count();

        table.handle_disconnect("u0", 1, &mut base);
        assert!(!table.seats[1].online);

        let (_, host_side) = PeerChannel::pair("u0", "host");
        let outcome = table.admit(PlayerIdentity::new("u0", "Anna"), host_side.split().0, 2);
        assert!(matches!(outcome, AdmitOutcome::Rejoined));
        assert_eq!(table.seats.len(), 2);
        assert!(table.seats[1].online);
        assert_eq!(table.seats[1].hand.count(), hand_before);
    }

    #[test]
    fn test_start_game_needs_two_players() {
        let mut table = Table::new(host_identity(), 6, 2);
        let mut base = SessionBase::new(SessionKind::Host, "host");
        assert!(!table.start_game(&mut rand::rng(), &mut base));
        assert!(matches!(table.phase, Phase::Waiting));
    }

    #[test]
    fn test_start_game_deals_evenly_and_picks_valid_turn() {
        let (mut table, mut base, _guests) = table_with(&["Anna", "Boris"]);
        assert!(table.start_game(&mut rand::rng(), &mut base));

        assert!(matches!(table.phase, Phase::Playing));
        assert_eq!(table.win_threshold, 52);
        let counts: Vec<usize> = table.seats.iter().map(|s| s.hand.count()).collect();
        assert_eq!(counts.iter().sum::<usize>(), 52);
        let min = counts.iter().min().unwrap();
        let max = counts.iter().max().unwrap();
        assert!(max - min <= 1);
        assert!(table.turn_index < table.seats.len());
        assert_eq!(table.cards_to_play, 1);
        assert_eq!(table.round, 1);
    }

    #[test]
    fn test_common_card_advances_turn_without_resolution() {
        let (mut table, mut base, _guests) = table_with(&["Anna"]);
        force_playing(
            &mut table,
            vec![vec![common(3), common(4)], vec![common(5), common(6)]],
            0,
        );

        table.play_card("host", &mut base);

        assert_eq!(table.cards_in_play.len(), 1);
        assert_eq!(table.cards_in_play[0].rank, 3);
        assert_eq!(table.turn_index, 1);
        assert_eq!(table.cards_to_play, 1);
        assert_eq!(table.round, 1);
        assert!(table.provisional_winner.is_none());
    }

    #[test]
    fn test_queen_requires_two_and_marks_provisional_winner() {
        let (mut table, mut base, _guests) = table_with(&["Anna"]);
        let queen = Card::new(11, "#00ffae");
        force_playing(
            &mut table,
            vec![
                vec![queen, common(2)],
                vec![common(5), common(6), common(7)],
            ],
            0,
        );

        table.play_card("host", &mut base);

        assert_eq!(table.cards_to_play, 2);
        assert_eq!(table.provisional_winner.as_deref(), Some("host"));
        assert_eq!(table.turn_index, 1);
    }

    #[test]
    fn test_follow_ups_exhausted_resolve_for_provisional_winner() {
        let (mut table, mut base, _guests) = table_with(&["Anna"]);
        let jack = Card::new(10, "#00ffae");
        force_playing(
            &mut table,
            vec![vec![jack, common(2)], vec![common(5), common(6)]],
            0,
        );

        table.play_card("host", &mut base); // jack: Anna owes one card
        assert_eq!(table.cards_to_play, 1);
        table.play_card("u0", &mut base); // the follow-up

        // Pile (jack + common) went to the host's hand bottom.
        assert!(table.cards_in_play.is_empty());
        assert_eq!(table.seats[0].hand.count(), 3);
        assert_eq!(table.round, 2);
        assert_eq!(table.last_round_winner.as_deref(), Some("host"));
        assert_eq!(table.last_round_reason, Some(RoundWinReason::Cards));
        assert_eq!(table.cards_to_play, 1);
        assert!(table.provisional_winner.is_none());
    }

    #[test]
    fn test_grab_on_pair_wins_round_for_grabber() {
        let (mut table, mut base, _guests) = table_with(&["Anna", "Boris"]);
        force_playing(
            &mut table,
            vec![
                vec![common(7)],
                vec![common(7), common(2)],
                vec![common(9)],
            ],
            0,
        );

        table.play_card("host", &mut base); // 7
        table.play_card("u0", &mut base); // 7 again: pair on top
        assert!(table.can_grab_cards());

        // A third player grabs although it is not their turn.
        table.grab_cards("u1", &mut base);

        assert!(table.cards_in_play.is_empty());
        assert_eq!(table.seats[2].hand.count(), 3);
        assert_eq!(table.round, 2);
        assert_eq!(table.last_round_winner.as_deref(), Some("u1"));
        assert_eq!(table.last_round_reason, Some(RoundWinReason::Pair));
    }

    #[test]
    fn test_grab_without_pair_is_ignored() {
        let (mut table, mut base, _guests) = table_with(&["Anna"]);
        force_playing(
            &mut table,
            vec![vec![common(3), common(4)], vec![common(5), common(6)]],
            0,
        );
        table.play_card("host", &mut base); // single card: nothing to pair
        assert!(!table.can_grab_cards());

        let round_before = table.round;
        table.grab_cards("u0", &mut base);
        assert_eq!(table.round, round_before);
        assert_eq!(table.cards_in_play.len(), 1);
    }

    #[test]
    fn test_off_turn_play_is_dropped() {
        let (mut table, mut base, _guests) = table_with(&["Anna"]);
        force_playing(
            &mut table,
            vec![vec![common(3)], vec![common(5), common(6)]],
            0,
        );

        table.play_card("u0", &mut base);

        assert!(table.cards_in_play.is_empty());
        assert_eq!(table.seats[1].hand.count(), 2);
        assert_eq!(table.turn_index, 0);
    }

    #[test]
    fn test_collecting_every_card_finishes_the_game() {
        let (mut table, mut base, _guests) = table_with(&["Anna"]);
        // Host holds 3 of 4 cards; the last round hands them the rest.
        force_playing(
            &mut table,
            vec![vec![common(3), common(5), common(8)], vec![common(3)]],
            1,
        );

        table.play_card("u0", &mut base); // Anna's last card: a 3
        table.play_card("host", &mut base); // host's 3 pairs the pile
        table.grab_cards("host", &mut base); // host grabs: now holds all 4

        match &table.phase {
            Phase::Finished { winner } => {
                assert_eq!(winner.uid, "host");
                assert_eq!(winner.cards_in_deck, 4);
            }
            other => panic!("expected finished, got {:?}", other),
        }
        assert!(table.cards_in_play.is_empty());
        assert_eq!(table.cards_to_play, 1);
        assert_eq!(table.round, 0);
        assert_eq!(table.seats.len(), 2);
    }

    #[test]
    fn test_disconnect_in_lobby_removes_the_seat() {
        let (mut table, mut base, _guests) = table_with(&["Anna", "Boris"]);
        table.handle_disconnect("u0", 1, &mut base);
        assert_eq!(table.seats.len(), 2);
        assert!(table.seat_index("u0").is_none());
    }

    #[test]
    fn test_disconnect_while_playing_only_flags_offline() {
        let (mut table, mut base, _guests) = table_with(&["Anna", "Boris"]);
        table.start_game(&mut rand::rng(), &mut base);
        table.turn_index = 0; // make sure u0 is not on turn

        table.handle_disconnect("u0", 1, &mut base);

        assert_eq!(table.seats.len(), 3);
        let seat = &table.seats[table.seat_index("u0").unwrap()];
        assert!(!seat.online);
        assert!(table.take_pending_auto_play().is_none());
    }

    #[test]
    fn test_stale_close_does_not_touch_a_rejoined_seat() {
        let (mut table, mut base, _guests) = table_with(&["Anna", "Boris"]);
        table.start_game(&mut rand::rng(), &mut base);
        table.turn_index = 0;
        table.handle_disconnect("u0", 1, &mut base);

        let (_, host_side) = PeerChannel::pair("u0", "host");
        table.admit(PlayerIdentity::new("u0", "Anna"), host_side.split().0, 2);

        // The old pump reports its close after the rejoin.
        table.handle_disconnect("u0", 1, &mut base);
        assert!(table.seats[table.seat_index("u0").unwrap()].online);
    }

    #[test]
    fn test_turn_player_disconnect_arms_auto_play() {
        let (mut table, mut base, _guests) = table_with(&["Anna"]);
        force_playing(
            &mut table,
            vec![vec![common(3), common(4)], vec![common(5), common(6)]],
            1,
        );

        table.handle_disconnect("u0", 1, &mut base);

        assert_eq!(
            table.take_pending_auto_play(),
            Some(("u0".to_string(), AutoPlayDelay::Think))
        );
    }

    #[test]
    fn test_auto_play_plays_one_card_and_paces_the_rest() {
        let (mut table, mut base, _guests) = table_with(&["Anna"]);
        let king = Card::new(12, "#ff8c00");
        force_playing(
            &mut table,
            vec![
                vec![king],
                vec![common(2), common(4), common(6), common(8)],
            ],
            0,
        );
        table.play_card("host", &mut base); // king: Anna owes 3
        assert_eq!(table.cards_to_play, 3);

        table.handle_disconnect("u0", 1, &mut base);
        assert_eq!(
            table.take_pending_auto_play(),
            Some(("u0".to_string(), AutoPlayDelay::Think))
        );

        table.auto_play_step("u0", &mut base);
        assert_eq!(table.cards_to_play, 2);
        assert_eq!(
            table.take_pending_auto_play(),
            Some(("u0".to_string(), AutoPlayDelay::Pace))
        );

        table.auto_play_step("u0", &mut base);
        table.auto_play_step("u0", &mut base);
        // Third follow-up resolved the round for the host.
        assert_eq!(table.round, 2);
        assert_eq!(table.last_round_winner.as_deref(), Some("host"));
    }

    #[test]
    fn test_auto_play_aborts_after_reconnect() {
        let (mut table, mut base, _guests) = table_with(&["Anna"]);
        force_playing(
            &mut table,
            vec![vec![common(3)], vec![common(5), common(6)]],
            1,
        );
        table.handle_disconnect("u0", 1, &mut base);
        table.take_pending_auto_play();

        let (_, host_side) = PeerChannel::pair("u0", "host");
        table.admit(PlayerIdentity::new("u0", "Anna"), host_side.split().0, 2);

        table.auto_play_step("u0", &mut base);
        assert_eq!(table.seats[1].hand.count(), 2);
        assert!(table.take_pending_auto_play().is_none());
    }

    #[test]
    fn test_reset_returns_to_lobby_and_prunes_gone_seats() {
        let (mut table, mut base, _guests) = table_with(&["Anna", "Boris"]);
        // Boris starts with no cards so the turn skips over him.
        force_playing(
            &mut table,
            vec![vec![common(3), common(5)], vec![common(3)], vec![]],
            1,
        );
        table.handle_disconnect("u1", 2, &mut base); // offline mid-game

        table.play_card("u0", &mut base); // 3; Boris is skipped
        table.play_card("host", &mut base); // 3: pair on top
        table.grab_cards("host", &mut base); // host holds all 3: finished
        assert!(matches!(table.phase, Phase::Finished { .. }));

        assert!(table.reset_game(&mut base));
        assert!(matches!(table.phase, Phase::Waiting));
        assert_eq!(table.seats.len(), 2); // u1 pruned
        assert!(table.seats.iter().all(|s| s.hand.is_empty()));
    }

    #[test]
    fn test_projection_never_contains_hand_contents() {
        let (mut table, mut base, _guests) = table_with(&["Anna"]);
        table.start_game(&mut rand::rng(), &mut base);

        match table.projected_state() {
            GameState::Playing {
                players,
                cards_in_play,
                turn_index,
                ..
            } => {
                assert!(turn_index < players.len());
                assert!(cards_in_play.is_empty());
                assert_eq!(players[0].cards_in_deck, 26);
                assert_eq!(players[1].cards_in_deck, 26);
            }
            other => panic!("expected playing, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_broadcast_reaches_online_seats_only() {
        let (mut table, mut base, mut guests) = table_with(&["Anna", "Boris"]);
        table.start_game(&mut rand::rng(), &mut base);
        table.turn_index = 0;

        match guests[0].recv().await {
            Some(crate::channel::ChannelEvent::Data(raw)) => {
                assert!(raw.contains("sync-game-state"))
            }
            other => panic!("unexpected event: {:?}", other),
        }

        // After the disconnect the seat drops its send half: the offline
        // endpoint drains its backlog and then sees the channel end, with
        // no further broadcasts in between.
        table.handle_disconnect("u1", 2, &mut base);
        table.broadcast(&mut base);
        let mut frames = 0;
        loop {
            match guests[1].recv().await {
                Some(crate::channel::ChannelEvent::Data(_)) => frames += 1,
                Some(crate::channel::ChannelEvent::Closed) | None => break,
            }
        }
        // Only the pre-disconnect backlog: the start broadcast and the
        // disconnect broadcast itself never target the offline seat.
        assert_eq!(frames, 1);
    }
}
