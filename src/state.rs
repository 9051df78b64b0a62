use std::cmp::Ordering;

use rand::TryRngCore;

use super::events::*;
use super::rules::{self, HandEvaluation};
use super::shared::*;
use super::table::{Seat, Table};

/// A live hand. Betting state (`current_bet`, `contributions`, `acted`) is
/// scoped to the current street and swept into `pot` on each street change;
/// everything else lives for the whole hand.
#[derive(Debug, Clone)]
pub struct Hand {
    pub dealer_seat: usize,
    pub sb_seat: usize,
    pub bb_seat: usize,
    /// Chips swept from completed streets. The current street's bets stay in
    /// `contributions` until it ends.
    pub pot: u32,
    pub deck: Vec<Card>,
    pub burned: Vec<Card>,
    pub board: Vec<Card>,
    pub hole_cards: [Option<[Card; 2]>; MAX_SEATS],
    pub street: Street,
    pub current_bet: u32,
    pub contributions: [u32; MAX_SEATS],
    pub folded: [bool; MAX_SEATS],
    pub acted: [bool; MAX_SEATS],
    pub current_actor: Option<usize>,
    /// Size of the last raise increment; the minimum re-raise must add at
    /// least this much on top of `current_bet`.
    pub last_raise: u32,
    /// Preflop only: the big blind still gets to act even once everyone has
    /// matched their forced bet.
    pub bb_has_option: bool,
}

impl Hand {
    pub fn call_amount(&self, seat: usize) -> u32 {
        self.current_bet.saturating_sub(self.contributions[seat])
    }

    /// Minimum legal raise target, total-to-bet semantics.
    pub fn min_raise(&self) -> u32 {
        self.current_bet + self.last_raise
    }

    /// Pot as a viewer sees it: swept streets plus the bets in front of
    /// players this street.
    pub fn visible_pot(&self) -> u32 {
        self.pot + self.contributions.iter().sum::<u32>()
    }

    pub fn is_dealt(&self, seat: usize) -> bool {
        self.hole_cards[seat].is_some()
    }

    /// Seats still contesting the pot.
    pub fn live_seats(&self) -> impl Iterator<Item = usize> + '_ {
        (0..MAX_SEATS).filter(|&s| self.hole_cards[s].is_some() && !self.folded[s])
    }

    pub fn heads_up(&self) -> bool {
        self.sb_seat == self.dealer_seat
    }
}

/// Whether a seat can be handed the action: dealt in, not folded, chips
/// behind. All-in players wait for showdown.
fn can_act(hand: &Hand, seats: &[Seat; MAX_SEATS], seat: usize) -> bool {
    hand.is_dealt(seat) && !hand.folded[seat] && seats[seat].stack > 0
}

/// Next seat clockwise strictly after `after` that can act.
fn next_actor(hand: &Hand, seats: &[Seat; MAX_SEATS], after: usize) -> Option<usize> {
    (1..MAX_SEATS)
        .map(|k| (after + k) % MAX_SEATS)
        .find(|&s| can_act(hand, seats, s))
}

/// First to act on a fresh postflop street: the non-dealer heads-up,
/// otherwise the first live seat clockwise from the small blind inclusive.
fn first_actor_postflop(hand: &Hand, seats: &[Seat; MAX_SEATS]) -> Option<usize> {
    let start = if hand.heads_up() {
        hand.bb_seat
    } else {
        hand.sb_seat
    };
    (0..MAX_SEATS)
        .map(|k| (start + k) % MAX_SEATS)
        .find(|&s| can_act(hand, seats, s))
}

/// The most any opponent can still match: max over other live seats of their
/// stack plus what they already have in front. Contributions beyond this are
/// dead money nobody can win, so they stay in the actor's stack.
fn coverage_cap(hand: &Hand, seats: &[Seat; MAX_SEATS], actor: usize) -> u32 {
    (0..MAX_SEATS)
        .filter(|&s| s != actor && hand.is_dealt(s) && !hand.folded[s])
        .map(|s| seats[s].stack + hand.contributions[s])
        .max()
        .unwrap_or(u32::MAX)
}

impl Table {
    /// Next seat clockwise after `start` with an active player; wraps all
    /// the way around, so with a single active seat it returns `start`.
    fn next_active_from(&self, start: usize) -> Option<usize> {
        (1..=MAX_SEATS)
            .map(|k| (start + k) % MAX_SEATS)
            .find(|&s| self.seats[s].status == SeatStatus::Active)
    }

    /// Deals a new hand: promotes waiting seats, places the dealer button,
    /// posts blinds, deals hole cards, and hands the action to the first
    /// actor. With every player already all-in from the blinds the board
    /// runs out and the hand resolves before this returns.
    pub fn start_hand<R>(&mut self, rng: &mut R) -> Result<Vec<HandEvent>, GameError>
    where
        R: TryRngCore + ?Sized,
        R::Error: std::fmt::Display,
    {
        if self.hand.is_some() {
            return Err(GameError::HandInProgress);
        }
        if self.playable_seats() < 2 {
            return Err(GameError::NotEnoughPlayers);
        }
        let mut deck = rules::standard_deck();
        rules::shuffle_deck(&mut deck, rng)?;

        for seat in self.seats.iter_mut() {
            if seat.status == SeatStatus::Waiting {
                seat.status = SeatStatus::Active;
            }
        }
        let first_active = self
            .seats
            .iter()
            .position(|s| s.status == SeatStatus::Active)
            .ok_or(GameError::NotEnoughPlayers)?;

        // Showdown may already have rotated the button when somebody busted;
        // don't rotate twice.
        let dealer = if self.dealer_rotated_this_round {
            self.dealer_rotated_this_round = false;
            match self.dealer_seat {
                Some(d) if self.seats[d].status == SeatStatus::Active => d,
                Some(d) => self
                    .next_active_from(d)
                    .ok_or(GameError::NotEnoughPlayers)?,
                None => first_active,
            }
        } else {
            match self.dealer_seat {
                Some(d) => self
                    .next_active_from(d)
                    .ok_or(GameError::NotEnoughPlayers)?,
                None => first_active,
            }
        };
        self.dealer_seat = Some(dealer);

        let active = self
            .seats
            .iter()
            .filter(|s| s.status == SeatStatus::Active)
            .count();
        let (sb, bb) = if active == 2 {
            // Heads-up the dealer posts the small blind.
            let other = self
                .next_active_from(dealer)
                .ok_or(GameError::NotEnoughPlayers)?;
            (dealer, other)
        } else {
            let sb = self
                .next_active_from(dealer)
                .ok_or(GameError::NotEnoughPlayers)?;
            let bb = self.next_active_from(sb).ok_or(GameError::NotEnoughPlayers)?;
            (sb, bb)
        };

        let mut hand = Hand {
            dealer_seat: dealer,
            sb_seat: sb,
            bb_seat: bb,
            pot: 0,
            deck,
            burned: Vec::new(),
            board: Vec::new(),
            hole_cards: [None; MAX_SEATS],
            street: Street::Preflop,
            current_bet: self.big_blind,
            contributions: [0; MAX_SEATS],
            folded: [false; MAX_SEATS],
            acted: [false; MAX_SEATS],
            current_actor: None,
            last_raise: self.big_blind,
            bb_has_option: true,
        };

        let mut events = vec![HandEvent::HandStarted { dealer, sb, bb }];

        // Short stacks post what they have, all-in. The nominal big blind
        // still sets the bet to match.
        let sb_amount = self.small_blind.min(self.seats[sb].stack);
        self.seats[sb].stack -= sb_amount;
        hand.contributions[sb] = sb_amount;
        events.push(HandEvent::BlindPosted {
            seat: sb,
            blind: Blind::Small,
            amount: sb_amount,
        });
        let bb_amount = self.big_blind.min(self.seats[bb].stack);
        self.seats[bb].stack -= bb_amount;
        hand.contributions[bb] = bb_amount;
        events.push(HandEvent::BlindPosted {
            seat: bb,
            blind: Blind::Big,
            amount: bb_amount,
        });
        // An all-in big blind has no option to exercise.
        hand.bb_has_option = self.seats[bb].stack > 0;

        for idx in 0..MAX_SEATS {
            if self.seats[idx].status == SeatStatus::Active {
                let first = rules::draw(&mut hand.deck)?;
                let second = rules::draw(&mut hand.deck)?;
                hand.hole_cards[idx] = Some([first, second]);
            }
        }
        events.push(HandEvent::HoleCardsDealt);

        // Preflop the action starts past the big blind, which heads-up is
        // the dealer.
        hand.current_actor = next_actor(&hand, &self.seats, bb);
        self.hand = Some(hand);
        self.settle_round(&mut events)?;
        Ok(events)
    }

    /// Applies one player action, passes the turn, and drives the hand as
    /// far as it can go without further input: street changes, the all-in
    /// run-out, early wins, showdown.
    pub fn apply_action(
        &mut self,
        seat: usize,
        action: PlayerAction,
    ) -> Result<Vec<HandEvent>, GameError> {
        let Some(hand) = self.hand.as_mut() else {
            return Err(GameError::NoHand);
        };
        if hand.current_actor != Some(seat) {
            return Err(GameError::OutOfTurn);
        }
        let stack_before = self.seats[seat].stack;
        let call_amount = hand.call_amount(seat);
        let preflop_bb = hand.street == Street::Preflop && seat == hand.bb_seat;

        match action {
            PlayerAction::Fold => {
                hand.folded[seat] = true;
                hand.acted[seat] = true;
                if preflop_bb {
                    hand.bb_has_option = false;
                }
            }
            PlayerAction::Check => {
                if call_amount > 0 {
                    return Err(GameError::CheckWhenBehind);
                }
                hand.acted[seat] = true;
                if preflop_bb {
                    hand.bb_has_option = false;
                }
            }
            PlayerAction::Call => {
                if call_amount == 0 {
                    return Err(GameError::NothingToCall);
                }
                let cap = coverage_cap(hand, &self.seats, seat);
                let target = (hand.contributions[seat] + call_amount.min(stack_before))
                    .min(cap)
                    .max(hand.contributions[seat]);
                let pay = target - hand.contributions[seat];
                self.seats[seat].stack -= pay;
                hand.contributions[seat] = target;
                hand.acted[seat] = true;
                if preflop_bb {
                    hand.bb_has_option = false;
                }
            }
            PlayerAction::Raise(amount) => {
                let max_total = stack_before + hand.contributions[seat];
                if amount != max_total {
                    // Not a shove, so the normal bounds apply.
                    let min = hand.min_raise();
                    if amount < min {
                        return Err(GameError::RaiseBelowMinimum { min });
                    }
                    if amount > max_total {
                        return Err(GameError::RaiseExceedsStack);
                    }
                }
                let cap = coverage_cap(hand, &self.seats, seat);
                let target = amount.min(cap).max(hand.contributions[seat]);
                let pay = target - hand.contributions[seat];
                self.seats[seat].stack -= pay;
                hand.contributions[seat] = target;
                if target > hand.current_bet {
                    hand.last_raise = target - hand.current_bet;
                    hand.current_bet = target;
                }
                hand.acted[seat] = true;
                hand.bb_has_option = false;
            }
        }

        let moved = stack_before - self.seats[seat].stack;
        let mut events = vec![HandEvent::ActionApplied {
            seat,
            action,
            amount: moved,
            stack: self.seats[seat].stack,
            pot: hand.visible_pot(),
            current_bet: hand.current_bet,
        }];
        hand.current_actor = next_actor(hand, &self.seats, seat);
        self.settle_round(&mut events)?;
        Ok(events)
    }

    /// True when the betting round needs no further input: at most one live
    /// player, or every live seat is all-in or has acted and matched the
    /// current bet, with the big blind's preflop option spent.
    pub fn round_complete(&self) -> bool {
        let Some(hand) = self.hand.as_ref() else {
            return false;
        };
        let live: Vec<usize> = hand.live_seats().collect();
        if live.len() <= 1 {
            return true;
        }
        if hand.bb_has_option {
            return false;
        }
        live.iter().all(|&s| {
            self.seats[s].stack == 0
                || (hand.acted[s] && hand.contributions[s] == hand.current_bet)
        })
    }

    pub fn call_amount(&self, seat: usize) -> u32 {
        self.hand.as_ref().map(|h| h.call_amount(seat)).unwrap_or(0)
    }

    pub fn min_raise(&self) -> u32 {
        self.hand.as_ref().map(|h| h.min_raise()).unwrap_or(0)
    }

    /// Actions the seat may take right now. Empty for all-in players and
    /// everyone outside the hand. A shove below the minimum raise is still
    /// accepted by `apply_action` even when `Raise` is not offered here.
    pub fn valid_actions(&self, seat: usize) -> Vec<ActionKind> {
        let Some(hand) = self.hand.as_ref() else {
            return Vec::new();
        };
        if !hand.is_dealt(seat) || hand.folded[seat] {
            return Vec::new();
        }
        let stack = self.seats[seat].stack;
        if stack == 0 {
            return Vec::new();
        }
        let call = hand.call_amount(seat);
        let mut actions = if call > 0 {
            vec![ActionKind::Fold, ActionKind::Call]
        } else {
            vec![ActionKind::Check, ActionKind::Fold]
        };
        if stack + hand.contributions[seat] >= hand.min_raise() {
            actions.push(ActionKind::Raise);
        }
        actions
    }

    /// Drives the hand forward until it needs player input or resolves:
    /// emits the action request for an unfinished round, otherwise advances
    /// streets (dealing as it goes) and finally runs the showdown.
    fn settle_round(&mut self, events: &mut Vec<HandEvent>) -> Result<(), GameError> {
        loop {
            let Some(hand) = self.hand.as_ref() else {
                return Ok(());
            };
            let live = hand.live_seats().count();
            let street = hand.street;
            if live < 2 {
                self.resolve_showdown(events);
                return Ok(());
            }
            if !self.round_complete() {
                if let Some(hand) = self.hand.as_ref() {
                    if let Some(seat) = hand.current_actor {
                        let request = HandEvent::ActionRequested {
                            seat,
                            call_amount: hand.call_amount(seat),
                            min_raise: hand.min_raise(),
                            actions: self.valid_actions(seat),
                        };
                        events.push(request);
                    }
                }
                return Ok(());
            }
            if street == Street::River {
                self.resolve_showdown(events);
                return Ok(());
            }
            self.advance_street(events)?;
        }
    }

    /// Sweeps the street's bets into the pot, burns and deals the next board
    /// cards, and resets the betting round.
    fn advance_street(&mut self, events: &mut Vec<HandEvent>) -> Result<(), GameError> {
        let big_blind = self.big_blind;
        let Some(hand) = self.hand.as_mut() else {
            return Err(GameError::NoHand);
        };
        hand.pot += hand.contributions.iter().sum::<u32>();
        hand.contributions = [0; MAX_SEATS];

        let from_preflop = hand.street == Street::Preflop;
        let (street, count) = match hand.street {
            Street::Preflop => (Street::Flop, 3),
            Street::Flop => (Street::Turn, 1),
            Street::Turn => (Street::River, 1),
            Street::River => return Err(GameError::NoHand),
        };
        // Check up front so a short deck leaves the board untouched.
        if hand.deck.len() < count + 1 {
            return Err(GameError::InsufficientCards);
        }
        hand.burned.push(rules::draw(&mut hand.deck)?);
        let mut dealt = Vec::with_capacity(count);
        for _ in 0..count {
            dealt.push(rules::draw(&mut hand.deck)?);
        }
        hand.board.extend(dealt.iter().copied());
        hand.street = street;
        hand.current_bet = 0;
        hand.acted = [false; MAX_SEATS];
        hand.bb_has_option = false;
        // Entering the flop the increment drops back to the big blind;
        // later streets carry the previous raise increment forward.
        if from_preflop {
            hand.last_raise = big_blind;
        }
        hand.current_actor = first_actor_postflop(hand, &self.seats);
        events.push(HandEvent::StreetDealt {
            street,
            cards: dealt,
            board: hand.board.clone(),
        });
        Ok(())
    }

    /// Ends the hand: distributes the pot, clears busted seats, rotates the
    /// dealer. A lone live player takes the pot without showing; otherwise
    /// every contender's best five-card hand contests it, ties split, and
    /// the odd chips go to the first winner in seat order.
    fn resolve_showdown(&mut self, events: &mut Vec<HandEvent>) {
        let Some(mut hand) = self.hand.take() else {
            return;
        };
        hand.pot += hand.contributions.iter().sum::<u32>();
        let pot = hand.pot;
        let contenders: Vec<usize> = hand.live_seats().collect();

        let mut revealed: Vec<(usize, [Card; 2])> = Vec::new();
        let winners: Vec<usize> = if contenders.len() <= 1 {
            contenders.clone()
        } else {
            let mut best: Option<HandEvaluation> = None;
            let mut winners: Vec<usize> = Vec::new();
            for &s in &contenders {
                let Some(cards) = hand.hole_cards[s] else {
                    continue;
                };
                revealed.push((s, cards));
                let eval = rules::evaluate_hand(&cards, &hand.board);
                match &best {
                    None => {
                        best = Some(eval);
                        winners.push(s);
                    }
                    Some(current) => match eval.cmp(current) {
                        Ordering::Greater => {
                            best = Some(eval);
                            winners.clear();
                            winners.push(s);
                        }
                        Ordering::Equal => winners.push(s),
                        Ordering::Less => {}
                    },
                }
            }
            winners
        };

        let mut awards: Vec<Winner> = Vec::new();
        if !winners.is_empty() {
            let share = pot / winners.len() as u32;
            let remainder = pot % winners.len() as u32;
            for (i, &w) in winners.iter().enumerate() {
                let amount = share + if i == 0 { remainder } else { 0 };
                self.seats[w].stack += amount;
                awards.push(Winner { seat: w, amount });
            }
        }
        events.push(HandEvent::ShowdownResolved {
            pot,
            winners: awards,
            revealed,
        });

        let mut busted: Vec<(usize, String)> = Vec::new();
        for s in 0..MAX_SEATS {
            if self.seats[s].status == SeatStatus::Active && self.seats[s].stack == 0 {
                if let Some(token) = self.seats[s].token.take() {
                    busted.push((s, token));
                }
                self.seats[s] = Seat::empty();
            }
        }

        if let Some(d) = self.dealer_seat {
            if let Some(next) = self.next_active_from(d) {
                self.dealer_seat = Some(next);
            }
            self.dealer_rotated_this_round = true;
        }

        let stacks = (0..MAX_SEATS)
            .filter(|&s| self.seats[s].is_occupied())
            .map(|s| (s, self.seats[s].stack))
            .collect();
        events.push(HandEvent::HandEnded { stacks, busted });
    }

    /// Folds a seat out of the live hand without an action of its own, used
    /// when a player leaves or disconnects mid-hand. No-op for seats outside
    /// the hand.
    pub(crate) fn fold_out(&mut self, seat: usize) -> Result<Vec<HandEvent>, GameError> {
        let mut events = Vec::new();
        let Some(hand) = self.hand.as_mut() else {
            return Ok(events);
        };
        if !hand.is_dealt(seat) || hand.folded[seat] {
            return Ok(events);
        }
        hand.folded[seat] = true;
        hand.acted[seat] = true;
        if hand.street == Street::Preflop && seat == hand.bb_seat {
            hand.bb_has_option = false;
        }
        if hand.current_actor == Some(seat) {
            hand.current_actor = next_actor(hand, &self.seats, seat);
        }
        self.settle_round(&mut events)?;
        Ok(events)
    }
}
