use super::events::HandEvent;
use super::shared::*;
use super::state::Hand;

/// One slot in the six-seat ring. An empty seat holds no token and no chips;
/// a freshly assigned seat waits for the next hand to start before it plays.
#[derive(Debug, Clone)]
pub struct Seat {
    pub token: Option<String>,
    pub status: SeatStatus,
    pub stack: u32,
}

impl Seat {
    pub fn empty() -> Self {
        Seat {
            token: None,
            status: SeatStatus::Empty,
            stack: 0,
        }
    }

    pub fn is_occupied(&self) -> bool {
        self.token.is_some()
    }
}

/// A fixed six-seat table. The current hand, when present, is exclusively
/// owned here; callers serialize access with whatever lock wraps the table.
#[derive(Debug, Clone)]
pub struct Table {
    pub id: String,
    pub name: String,
    pub seats: [Seat; MAX_SEATS],
    pub dealer_seat: Option<usize>,
    pub hand: Option<Hand>,
    /// Set when showdown already rotated the dealer, so the next hand start
    /// does not rotate a second time.
    pub dealer_rotated_this_round: bool,
    pub small_blind: u32,
    pub big_blind: u32,
    pub starting_stack: u32,
}

impl Table {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        small_blind: u32,
        big_blind: u32,
        starting_stack: u32,
    ) -> Self {
        Table {
            id: id.into(),
            name: name.into(),
            seats: std::array::from_fn(|_| Seat::empty()),
            dealer_seat: None,
            hand: None,
            dealer_rotated_this_round: false,
            small_blind,
            big_blind,
            starting_stack,
        }
    }

    /// Seats the token at the first empty seat clockwise from 0.
    pub fn assign_seat(&mut self, token: &str) -> Result<usize, GameError> {
        if self.seat_by_token(token).is_some() {
            return Err(GameError::AlreadySeated);
        }
        let Some(idx) = self.seats.iter().position(|s| !s.is_occupied()) else {
            return Err(GameError::TableFull);
        };
        self.seats[idx] = Seat {
            token: Some(token.to_string()),
            status: SeatStatus::Waiting,
            stack: self.starting_stack,
        };
        Ok(idx)
    }

    /// Fully resets the token's seat. During a live hand the departing
    /// player is folded out first; any hand events that follow from that
    /// (turn passing, street run-out, showdown) are returned for rendering.
    /// A second call with the same token reports `SeatNotFound`.
    pub fn clear_seat(&mut self, token: &str) -> Result<(usize, Vec<HandEvent>), GameError> {
        let Some(idx) = self.seat_by_token(token) else {
            return Err(GameError::SeatNotFound);
        };
        let events = self.fold_out(idx)?;
        self.seats[idx] = Seat::empty();
        Ok((idx, events))
    }

    pub fn seat_by_token(&self, token: &str) -> Option<usize> {
        self.seats
            .iter()
            .position(|s| s.token.as_deref() == Some(token))
    }

    pub fn occupied_seats(&self) -> usize {
        self.seats.iter().filter(|s| s.is_occupied()).count()
    }

    /// Seats eligible for the next hand start.
    pub fn playable_seats(&self) -> usize {
        self.seats
            .iter()
            .filter(|s| matches!(s.status, SeatStatus::Waiting | SeatStatus::Active))
            .count()
    }
}
