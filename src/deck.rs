use crate::card::{Card, RANKS_PER_SUIT, SUIT_COLORS};
use rand::Rng;
use rand::seq::SliceRandom;
use std::collections::VecDeque;

/// An ordered sequence of cards. Every operation except an explicit merge is
/// a pure rearrangement: no card identity is duplicated or lost across
/// shuffle, split, pick and append.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Deck {
    cards: VecDeque<Card>,
}

impl Deck {
    pub fn new(cards: impl IntoIterator<Item = Card>) -> Self {
        Self {
            cards: cards.into_iter().collect(),
        }
    }

    /// The full 52-card game deck: 4 suits, each with 1 ace, 9 commons and
    /// one jack, queen and king.
    pub fn standard() -> Self {
        let cards = SUIT_COLORS
            .iter()
            .flat_map(|color| (0..RANKS_PER_SUIT).map(|rank| Card::new(rank, color)));
        Self::new(cards)
    }

    pub fn count(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    /// Uniform random permutation of the current cards. Returns self so a
    /// fresh deck can be built and shuffled in one expression.
    pub fn shuffle<R: Rng + ?Sized>(&mut self, rng: &mut R) -> &mut Self {
        self.cards.make_contiguous().shuffle(rng);
        self
    }

    /// Deals round-robin into `n` hands: card `i` goes to hand `i % n`.
    /// Hand sizes differ by at most one and the hands together are exactly
    /// this deck.
    pub fn split(mut self, n: usize) -> Vec<Deck> {
        assert!(n > 0, "cannot split into zero hands");
        let mut hands = vec![Deck::default(); n];
        let mut i = 0;
        while let Some(card) = self.cards.pop_front() {
            hands[i % n].cards.push_back(card);
            i += 1;
        }
        hands
    }

    /// Removes and returns the front card; `None` on an empty deck.
    pub fn pick_card(&mut self) -> Option<Card> {
        self.cards.pop_front()
    }

    /// Appends cards to the bottom, preserving their relative order.
    pub fn add_cards_to_bottom(&mut self, cards: impl IntoIterator<Item = Card>) {
        self.cards.extend(cards);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Card> {
        self.cards.iter()
    }
}
