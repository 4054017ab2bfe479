use serde::{Deserialize, Serialize};

/// The four suit colors of the standard Boyevoy deck.
pub const SUIT_COLORS: [&str; 4] = ["#00ffae", "#ff8c00", "#ee00ff", "#ffffff"];

/// Ranks per suit: rank 0 is the ace, 1-9 are commons, then jack/queen/king.
pub const RANKS_PER_SUIT: u8 = 13;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CardKind {
    Common,
    Jack,
    Queen,
    King,
    Ace,
}

impl CardKind {
    /// How many follow-up cards the next player owes after this card is
    /// played. Commons impose no new requirement.
    pub fn follow_up_requirement(&self) -> Option<u32> {
        match self {
            CardKind::Jack => Some(1),
            CardKind::Queen => Some(2),
            CardKind::King => Some(3),
            CardKind::Ace => Some(4),
            CardKind::Common => None,
        }
    }
}

/// A single immutable card. `rank` is the ordinal position within the suit
/// and is what pair-equality compares; `display_text` and `suit_color` exist
/// for presentation only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    pub kind: CardKind,
    pub rank: u8,
    pub display_text: String,
    pub suit_color: String,
}

impl Card {
    pub fn new(rank: u8, suit_color: &str) -> Self {
        let (kind, display_text) = match rank {
            0 => (CardKind::Ace, "A".to_string()),
            10 => (CardKind::Jack, "J".to_string()),
            11 => (CardKind::Queen, "Q".to_string()),
            12 => (CardKind::King, "K".to_string()),
            n => (CardKind::Common, n.to_string()),
        };
        Self {
            kind,
            rank,
            display_text,
            suit_color: suit_color.to_string(),
        }
    }

    /// Pair-equality: two cards pair up when their ranks match, regardless
    /// of suit.
    pub fn pairs_with(&self, other: &Card) -> bool {
        self.rank == other.rank
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rank_to_kind_mapping() {
        assert_eq!(Card::new(0, "#ffffff").kind, CardKind::Ace);
        assert_eq!(Card::new(5, "#ffffff").kind, CardKind::Common);
        assert_eq!(Card::new(10, "#ffffff").kind, CardKind::Jack);
        assert_eq!(Card::new(11, "#ffffff").kind, CardKind::Queen);
        assert_eq!(Card::new(12, "#ffffff").kind, CardKind::King);
    }

    #[test]
    fn test_display_text() {
        assert_eq!(Card::new(0, "#ffffff").display_text, "A");
        assert_eq!(Card::new(7, "#ffffff").display_text, "7");
        assert_eq!(Card::new(12, "#ffffff").display_text, "K");
    }

    #[test]
    fn test_pairs_across_suits() {
        let a = Card::new(7, SUIT_COLORS[0]);
        let b = Card::new(7, SUIT_COLORS[1]);
        let c = Card::new(8, SUIT_COLORS[0]);
        assert!(a.pairs_with(&b));
        assert!(!a.pairs_with(&c));
    }

    #[test]
    fn test_follow_up_requirements() {
        assert_eq!(CardKind::Jack.follow_up_requirement(), Some(1));
        assert_eq!(CardKind::Queen.follow_up_requirement(), Some(2));
        assert_eq!(CardKind::King.follow_up_requirement(), Some(3));
        assert_eq!(CardKind::Ace.follow_up_requirement(), Some(4));
        assert_eq!(CardKind::Common.follow_up_requirement(), None);
    }

    #[test]
    fn test_card_wire_shape() {
        let card = Card::new(11, "#ee00ff");
        let json = serde_json::to_value(&card).unwrap();
        assert_eq!(json["kind"], "queen");
        assert_eq!(json["rank"], 11);
        assert_eq!(json["displayText"], "Q");
        assert_eq!(json["suitColor"], "#ee00ff");
    }
}
