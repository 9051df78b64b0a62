use serde::{Deserialize, Serialize};

use super::shared::*;

/// Which blind a forced bet was.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Blind {
    Small,
    Big,
}

/// Action tags offered to the current actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Fold,
    Check,
    Call,
    Raise,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Winner {
    pub seat: usize,
    pub amount: u32,
}

/// Ordered record of what a table mutation did. Every operation that changes
/// observable hand state returns these in emission order; the caller renders
/// them to whatever transport it owns. The engine itself never broadcasts.
#[derive(Debug, Clone, PartialEq)]
pub enum HandEvent {
    HandStarted {
        dealer: usize,
        sb: usize,
        bb: usize,
    },
    BlindPosted {
        seat: usize,
        blind: Blind,
        amount: u32,
    },
    /// Hole cards went out. The cards themselves stay on the hand so the
    /// renderer can apply per-viewer filtering.
    HoleCardsDealt,
    ActionApplied {
        seat: usize,
        action: PlayerAction,
        /// Chips actually moved, after all-in and coverage clipping.
        amount: u32,
        stack: u32,
        pot: u32,
        current_bet: u32,
    },
    StreetDealt {
        street: Street,
        cards: Vec<Card>,
        board: Vec<Card>,
    },
    ActionRequested {
        seat: usize,
        call_amount: u32,
        min_raise: u32,
        actions: Vec<ActionKind>,
    },
    ShowdownResolved {
        pot: u32,
        winners: Vec<Winner>,
        /// Contenders' hole cards, empty when the hand ended on folds.
        revealed: Vec<(usize, [Card; 2])>,
    },
    HandEnded {
        /// Post-distribution stacks of still-occupied seats.
        stacks: Vec<(usize, u32)>,
        /// Seats cleared because their stack reached zero, with the session
        /// tokens that held them.
        busted: Vec<(usize, String)>,
    },
}
