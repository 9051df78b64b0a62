use std::cmp::Ordering;

use itertools::Itertools;
use rand::TryRngCore;
use serde::{Deserialize, Serialize};

use super::shared::*;

/// The 52 cards in canonical order: suit-major, deuce to ace within a suit.
pub fn standard_deck() -> Vec<Card> {
    let mut deck = Vec::with_capacity(52);
    for &suit in &Suit::ALL {
        for &rank in &Rank::ALL {
            deck.push(Card { rank, suit });
        }
    }
    deck
}

/// Top-down Fisher–Yates. Each swap index is drawn uniformly over `[0..=i]`
/// from the supplied generator; a generator failure surfaces without
/// touching the deck.
pub fn shuffle_deck<R>(deck: &mut [Card], rng: &mut R) -> Result<(), GameError>
where
    R: TryRngCore + ?Sized,
    R::Error: std::fmt::Display,
{
    let mut swaps = Vec::with_capacity(deck.len());
    for i in (1..deck.len()).rev() {
        let j = uniform_below(rng, i as u32 + 1).map_err(|e| GameError::Shuffle(e.to_string()))?;
        swaps.push((i, j as usize));
    }
    for (i, j) in swaps {
        deck.swap(i, j);
    }
    Ok(())
}

/// Uniform draw in `[0..bound)` by rejection sampling, so the shuffle has no
/// modulo bias.
fn uniform_below<R>(rng: &mut R, bound: u32) -> Result<u32, R::Error>
where
    R: TryRngCore + ?Sized,
{
    debug_assert!(bound > 0);
    let reject = ((u32::MAX % bound) + 1) % bound;
    loop {
        let v = rng.try_next_u32()?;
        if v <= u32::MAX - reject {
            return Ok(v % bound);
        }
    }
}

/// Takes the top card, or fails when the deck is exhausted.
pub fn draw(deck: &mut Vec<Card>) -> Result<Card, GameError> {
    deck.pop().ok_or(GameError::InsufficientCards)
}

/// Hand categories, weakest first so the derived order is the poker order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandRank {
    HighCard,
    OnePair,
    TwoPair,
    ThreeOfAKind,
    Straight,
    Flush,
    FullHouse,
    FourOfAKind,
    StraightFlush,
    RoyalFlush,
}

impl HandRank {
    pub fn category(&self) -> u8 {
        *self as u8
    }
}

/// A ranked five-card hand. Kickers are numeric rank values ordered so that
/// the derived lexicographic comparison settles ties within a category; two
/// hands of the same category always carry kicker lists of the same length.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HandEvaluation {
    pub rank: HandRank,
    pub kickers: Vec<u8>,
}

/// Best five-card hand from two hole cards plus the board, by evaluating
/// every 5-subset and keeping the maximum.
pub fn evaluate_hand(hole: &[Card; 2], board: &[Card]) -> HandEvaluation {
    let mut all = Vec::with_capacity(2 + board.len());
    all.extend_from_slice(hole);
    all.extend_from_slice(board);
    assert!(all.len() >= 5, "need at least five cards to evaluate");

    if all.len() == 5 {
        return evaluate_five(&all);
    }
    let mut best: Option<HandEvaluation> = None;
    for combo in all.iter().combinations(5) {
        let five: Vec<Card> = combo.into_iter().copied().collect();
        let eval = evaluate_five(&five);
        match &best {
            Some(b) if *b >= eval => {}
            _ => best = Some(eval),
        }
    }
    best.expect("seven cards always yield a five-card hand")
}

/// Compare two hole-card pairs against the same board.
pub fn compare_hands(hole1: &[Card; 2], hole2: &[Card; 2], board: &[Card]) -> Ordering {
    evaluate_hand(hole1, board).cmp(&evaluate_hand(hole2, board))
}

fn evaluate_five(cards: &[Card]) -> HandEvaluation {
    assert!(cards.len() == 5, "exactly five cards required");

    let mut values: Vec<u8> = cards.iter().map(|c| c.rank.value()).collect();
    values.sort_unstable_by(|a, b| b.cmp(a));

    let mut counts = [0u8; 15];
    for &v in &values {
        counts[v as usize] += 1;
    }

    let is_flush = cards.iter().all(|c| c.suit == cards[0].suit);
    let straight = straight_high(&values);

    if let Some(high) = straight {
        if is_flush {
            let rank = if high == 14 {
                HandRank::RoyalFlush
            } else {
                HandRank::StraightFlush
            };
            return HandEvaluation {
                rank,
                kickers: straight_kickers(high),
            };
        }
    }

    if let Some(quad) = value_with_count(&counts, 4) {
        let kicker = values.iter().copied().find(|&v| v != quad).unwrap_or(0);
        return HandEvaluation {
            rank: HandRank::FourOfAKind,
            kickers: vec![quad, kicker],
        };
    }

    if let Some(trips) = value_with_count(&counts, 3) {
        if let Some(pair) = best_pair_excluding(&counts, trips) {
            return HandEvaluation {
                rank: HandRank::FullHouse,
                kickers: vec![trips, pair],
            };
        }
    }

    if is_flush {
        return HandEvaluation {
            rank: HandRank::Flush,
            kickers: values,
        };
    }

    if let Some(high) = straight {
        return HandEvaluation {
            rank: HandRank::Straight,
            kickers: straight_kickers(high),
        };
    }

    if let Some(trips) = value_with_count(&counts, 3) {
        let mut kickers = vec![trips];
        kickers.extend(values.iter().copied().filter(|&v| v != trips).take(2));
        return HandEvaluation {
            rank: HandRank::ThreeOfAKind,
            kickers,
        };
    }

    let pairs: Vec<u8> = (2..=14u8)
        .rev()
        .filter(|&v| counts[v as usize] == 2)
        .collect();
    if pairs.len() >= 2 {
        let (high, low) = (pairs[0], pairs[1]);
        let kicker = values
            .iter()
            .copied()
            .find(|&v| v != high && v != low)
            .unwrap_or(0);
        return HandEvaluation {
            rank: HandRank::TwoPair,
            kickers: vec![high, low, kicker],
        };
    }
    if let Some(&pair) = pairs.first() {
        let mut kickers = vec![pair];
        kickers.extend(values.iter().copied().filter(|&v| v != pair).take(3));
        return HandEvaluation {
            rank: HandRank::OnePair,
            kickers,
        };
    }

    HandEvaluation {
        rank: HandRank::HighCard,
        kickers: values,
    }
}

/// Highest straight top card among five cards, if any. The wheel counts as a
/// straight with high card 5.
fn straight_high(desc_values: &[u8]) -> Option<u8> {
    let mut uniq: Vec<u8> = desc_values.to_vec();
    uniq.dedup();
    if uniq.len() < 5 {
        return None;
    }
    if uniq[0] - uniq[4] == 4 {
        return Some(uniq[0]);
    }
    // Wheel: A-5-4-3-2 sorts descending as [14, 5, 4, 3, 2].
    if uniq == [14, 5, 4, 3, 2] {
        return Some(5);
    }
    None
}

fn straight_kickers(high: u8) -> Vec<u8> {
    if high == 5 {
        vec![5, 4, 3, 2, 1]
    } else {
        (0..5).map(|i| high - i).collect()
    }
}

fn value_with_count(counts: &[u8; 15], n: u8) -> Option<u8> {
    (2..=14u8).rev().find(|&v| counts[v as usize] == n)
}

fn best_pair_excluding(counts: &[u8; 15], exclude: u8) -> Option<u8> {
    (2..=14u8)
        .rev()
        .find(|&v| v != exclude && counts[v as usize] >= 2)
}
