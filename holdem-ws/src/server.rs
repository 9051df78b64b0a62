use std::sync::Arc;
use std::time::Duration;

use holdem_engine::{Blind, HandEvent, MAX_SEATS, PlayerAction, Table};
use rand::rngs::OsRng;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};
use tracing::{error, info};
use uuid::Uuid;

use crate::hub::Hub;
use crate::protocol::{self, *};
use crate::session::{Session, SessionManager};

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub addr: String,
    pub table_count: usize,
    pub small_blind: u32,
    pub big_blind: u32,
    pub starting_stack: u32,
    /// Outbound frames queued per client before drops begin.
    pub queue_capacity: usize,
    /// How long an invalid-token error gets to flush before the channel
    /// closes.
    pub close_grace: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            addr: "0.0.0.0:8080".to_string(),
            table_count: 4,
            small_blind: 10,
            big_blind: 20,
            starting_stack: 1000,
            queue_capacity: 256,
            close_grace: Duration::from_millis(250),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(port) = std::env::var("PORT") {
            config.addr = format!("0.0.0.0:{}", port);
        }
        config
    }
}

/// The whole service: the fixed table set, the session registry, and the
/// client hub. One of these is shared by every connection task.
///
/// Lock discipline: the tables map lock is taken before any table lock,
/// never the reverse; enqueues are non-blocking so holding a table lock
/// across fan-out cannot stall the hand.
pub struct Server {
    pub config: ServerConfig,
    tables: RwLock<Vec<(String, Arc<Mutex<Table>>)>>,
    pub sessions: SessionManager,
    pub hub: Hub,
}

impl Server {
    pub fn new(config: ServerConfig) -> Self {
        let tables = (1..=config.table_count)
            .map(|i| {
                let id = format!("table-{}", i);
                let table = Table::new(
                    id.clone(),
                    format!("Table {}", i),
                    config.small_blind,
                    config.big_blind,
                    config.starting_stack,
                );
                (id, Arc::new(Mutex::new(table)))
            })
            .collect();
        Server {
            config,
            tables: RwLock::new(tables),
            sessions: SessionManager::new(),
            hub: Hub::new(),
        }
    }

    pub async fn table_by_id(&self, id: &str) -> Option<Arc<Mutex<Table>>> {
        self.tables
            .read()
            .await
            .iter()
            .find(|(tid, _)| tid == id)
            .map(|(_, table)| table.clone())
    }

    /// Scans every table for the token's seat.
    pub async fn find_player_seat(&self, token: &str) -> Option<(String, usize)> {
        let tables: Vec<_> = self.tables.read().await.clone();
        for (id, table) in tables {
            if let Some(seat) = table.lock().await.seat_by_token(token) {
                return Some((id, seat));
            }
        }
        None
    }

    pub async fn lobby_entries(&self) -> Vec<LobbyEntry> {
        let tables: Vec<_> = self.tables.read().await.clone();
        let mut entries = Vec::with_capacity(tables.len());
        for (_, table) in tables {
            let table = table.lock().await;
            entries.push(LobbyEntry {
                id: table.id.clone(),
                name: table.name.clone(),
                seats_occupied: table.occupied_seats(),
                max_seats: MAX_SEATS,
            });
        }
        entries
    }

    async fn lobby_frame(&self) -> Option<String> {
        let entries = self.lobby_entries().await;
        match protocol::lobby_frame(&entries) {
            Ok(frame) => Some(frame),
            Err(e) => {
                error!(error = %e, "failed to serialize lobby state");
                None
            }
        }
    }

    /// Routes one inbound frame. Precondition failures become a directed
    /// `error` frame and leave all state untouched.
    pub async fn dispatch(&self, conn: Uuid, raw: &str) {
        let envelope: Envelope = match serde_json::from_str(raw) {
            Ok(envelope) => envelope,
            Err(_) => {
                self.send_error(conn, "malformed frame");
                return;
            }
        };
        match envelope.kind.as_str() {
            "set_name" => self.handle_set_name(conn, envelope.payload).await,
            "join_table" => self.handle_join_table(conn, envelope.payload).await,
            "leave_table" => self.handle_leave_table(conn).await,
            "start_hand" => self.handle_start_hand(conn).await,
            "player_action" => self.handle_player_action(conn, envelope.payload).await,
            other => self.send_error(conn, &format!("Unknown message type: {}", other)),
        }
    }

    /// Connection boot with a presented token. Returns false for an unknown
    /// token; the caller closes the channel after the grace delay.
    pub async fn restore(&self, conn: Uuid, token: &str) -> bool {
        let Some(session) = self.sessions.get(token) else {
            self.send_error(conn, "session not found");
            return false;
        };
        self.hub.bind_token(conn, &session.token);
        self.send_frame(
            conn,
            "session_restored",
            &SessionRestored {
                name: &session.name,
                table_id: session.table_id.as_deref(),
                seat_index: session.seat_index,
            },
        );
        if let Some(frame) = self.lobby_frame().await {
            self.hub.send_to(conn, frame);
        }
        info!(conn = %conn, name = %session.name, "session restored");
        true
    }

    /// Reader-task teardown: drop the connection and free its seat. Safe to
    /// call more than once; the second pass finds nothing to clear.
    pub async fn handle_disconnect(&self, conn: Uuid) {
        let token = self.hub.token_of(conn);
        self.hub.unregister(conn);
        let Some(token) = token else { return };
        let Some(session) = self.sessions.get(&token) else {
            return;
        };
        let Some(table_id) = session.table_id else { return };
        let Some(table) = self.table_by_id(&table_id).await else {
            return;
        };
        let mut table = table.lock().await;
        if let Ok((seat, events)) = table.clear_seat(&token) {
            self.sessions.update(&token, None, None);
            self.cleanup_busts(&events);
            self.broadcast_events(&table, &events);
            self.broadcast_table_state(&table);
            drop(table);
            if let Some(frame) = self.lobby_frame().await {
                self.hub.broadcast(&frame, None);
            }
            info!(conn = %conn, table = %table_id, seat, "seat cleared on disconnect");
        }
    }

    async fn handle_set_name(&self, conn: Uuid, payload: Value) {
        let Ok(msg) = serde_json::from_value::<SetName>(payload) else {
            self.send_error(conn, "malformed frame");
            return;
        };
        match self.sessions.create(&msg.name) {
            Err(message) => self.send_error(conn, &message),
            Ok(session) => {
                self.hub.bind_token(conn, &session.token);
                self.send_frame(
                    conn,
                    "session_created",
                    &SessionCreated {
                        token: &session.token,
                        name: &session.name,
                    },
                );
                if let Some(frame) = self.lobby_frame().await {
                    self.hub.send_to(conn, frame);
                }
                info!(conn = %conn, name = %session.name, "session created");
            }
        }
    }

    async fn handle_join_table(&self, conn: Uuid, payload: Value) {
        let Ok(msg) = serde_json::from_value::<JoinTable>(payload) else {
            self.send_error(conn, "malformed frame");
            return;
        };
        let Some(session) = self.session_of(conn) else {
            self.send_error(conn, "session not found");
            return;
        };
        if session.table_id.is_some() || self.find_player_seat(&session.token).await.is_some() {
            self.send_error(conn, "already_seated");
            return;
        }
        let Some(table) = self.table_by_id(&msg.table_id).await else {
            self.send_error(conn, "invalid_table");
            return;
        };
        let (seat_index, status) = {
            let mut table = table.lock().await;
            match table.assign_seat(&session.token) {
                Err(e) => {
                    self.send_error(conn, &e.to_string());
                    return;
                }
                Ok(idx) => (idx, table.seats[idx].status),
            }
        };
        self.sessions
            .update(&session.token, Some(msg.table_id.clone()), Some(seat_index));
        self.send_frame(
            conn,
            "seat_assigned",
            &SeatAssigned {
                table_id: &msg.table_id,
                seat_index,
                status,
            },
        );
        if let Some(frame) = self.lobby_frame().await {
            self.hub.broadcast(&frame, Some(conn));
        }
        info!(conn = %conn, table = %msg.table_id, seat = seat_index, "seat assigned");
    }

    async fn handle_leave_table(&self, conn: Uuid) {
        let Some(session) = self.session_of(conn) else {
            self.send_error(conn, "session not found");
            return;
        };
        let Some(table_id) = session.table_id.clone() else {
            self.send_error(conn, "not_seated");
            return;
        };
        let Some(table) = self.table_by_id(&table_id).await else {
            self.send_error(conn, "invalid_table");
            return;
        };
        let mut table = table.lock().await;
        match table.clear_seat(&session.token) {
            Err(e) => self.send_error(conn, &e.to_string()),
            Ok((seat, events)) => {
                self.sessions.update(&session.token, None, None);
                self.send_frame(conn, "seat_cleared", &serde_json::json!({}));
                self.cleanup_busts(&events);
                self.broadcast_events(&table, &events);
                self.broadcast_table_state(&table);
                drop(table);
                if let Some(frame) = self.lobby_frame().await {
                    self.hub.broadcast(&frame, Some(conn));
                }
                info!(conn = %conn, table = %table_id, seat, "seat cleared");
            }
        }
    }

    async fn handle_start_hand(&self, conn: Uuid) {
        let Some(session) = self.session_of(conn) else {
            self.send_error(conn, "session not found");
            return;
        };
        let Some(table_id) = session.table_id.clone() else {
            self.send_error(conn, "not_seated");
            return;
        };
        let Some(table) = self.table_by_id(&table_id).await else {
            self.send_error(conn, "invalid_table");
            return;
        };
        let mut table = table.lock().await;
        let events = match table.start_hand(&mut OsRng) {
            Err(e) => {
                self.send_error(conn, &e.to_string());
                return;
            }
            Ok(events) => events,
        };
        let busted = self.cleanup_busts(&events);
        if !self.broadcast_hand_start(&table, &events) {
            // A hand nobody heard about must not hold the table hostage.
            table.hand = None;
            self.send_error(conn, "internal error");
            return;
        }
        drop(table);
        // An all-in start can run the hand out and bust a seat, so lobby
        // occupancy may have changed.
        if busted {
            if let Some(frame) = self.lobby_frame().await {
                self.hub.broadcast(&frame, None);
            }
        }
        info!(table = %table_id, "hand started");
    }

    async fn handle_player_action(&self, conn: Uuid, payload: Value) {
        let Ok(msg) = serde_json::from_value::<PlayerActionMsg>(payload) else {
            self.send_error(conn, "malformed frame");
            return;
        };
        let Some(session) = self.session_of(conn) else {
            self.send_error(conn, "session not found");
            return;
        };
        let Some(table_id) = session.table_id.clone() else {
            self.send_error(conn, "not_seated");
            return;
        };
        let Some(table) = self.table_by_id(&table_id).await else {
            self.send_error(conn, "invalid_table");
            return;
        };
        let mut table = table.lock().await;
        let Some(seat) = table.seat_by_token(&session.token) else {
            self.send_error(conn, "not_seated");
            return;
        };
        if seat != msg.seat_index {
            self.send_error(conn, "not your turn");
            return;
        }
        let action = match msg.action {
            ActionTag::Fold => PlayerAction::Fold,
            ActionTag::Check => PlayerAction::Check,
            ActionTag::Call => PlayerAction::Call,
            ActionTag::Raise => match msg.amount {
                Some(amount) => PlayerAction::Raise(amount),
                None => {
                    self.send_error(conn, "raise requires an amount");
                    return;
                }
            },
        };
        match table.apply_action(seat, action) {
            Err(e) => self.send_error(conn, &e.to_string()),
            Ok(events) => {
                let busted = self.cleanup_busts(&events);
                self.broadcast_events(&table, &events);
                drop(table);
                // Bust-outs free seats, so lobby occupancy changed.
                if busted {
                    if let Some(frame) = self.lobby_frame().await {
                        self.hub.broadcast(&frame, None);
                    }
                }
            }
        }
    }

    fn session_of(&self, conn: Uuid) -> Option<Session> {
        self.hub
            .token_of(conn)
            .and_then(|token| self.sessions.get(&token))
    }

    fn send_error(&self, conn: Uuid, message: &str) {
        self.hub.send_to(conn, protocol::error_frame(message));
    }

    fn send_frame<T: Serialize>(&self, conn: Uuid, kind: &str, payload: &T) {
        match protocol::frame(kind, payload) {
            Ok(frame) => self.hub.send_to(conn, frame),
            Err(e) => error!(kind, error = %e, "failed to serialize frame"),
        }
    }

    /// Unbinds sessions whose seats were cleared by a bust-out. Returns
    /// whether any seat was freed.
    fn cleanup_busts(&self, events: &[HandEvent]) -> bool {
        let mut any = false;
        for event in events {
            if let HandEvent::HandEnded { busted, .. } = event {
                for (_, token) in busted {
                    self.sessions.update(token, None, None);
                    any = true;
                }
            }
        }
        any
    }

    /// Hand-start fan-out with rollback semantics: every shared frame is
    /// rendered before anything is sent, so a serialization failure can
    /// abort the start cleanly. The table snapshot goes out immediately
    /// before the action request (or last, when the hand ran itself out).
    fn broadcast_hand_start(&self, table: &Table, events: &[HandEvent]) -> bool {
        enum Outbound {
            Shared(String),
            CardsDealt,
            TableState,
        }
        let mut plan = Vec::with_capacity(events.len() + 1);
        let mut saw_request = false;
        for event in events {
            if matches!(event, HandEvent::HoleCardsDealt) {
                plan.push(Outbound::CardsDealt);
                continue;
            }
            if matches!(event, HandEvent::ActionRequested { .. }) {
                plan.push(Outbound::TableState);
                saw_request = true;
            }
            match self.render_event(table, event) {
                None => {}
                Some(Ok(frame)) => plan.push(Outbound::Shared(frame)),
                Some(Err(e)) => {
                    error!(error = %e, "failed to serialize hand start frame");
                    return false;
                }
            }
        }
        if !saw_request {
            plan.push(Outbound::TableState);
        }
        for item in plan {
            match item {
                Outbound::Shared(frame) => self.hub.broadcast(&frame, None),
                Outbound::CardsDealt => self.broadcast_cards_dealt(table),
                Outbound::TableState => self.broadcast_table_state(table),
            }
        }
        true
    }

    /// Fan-out for events after an applied action. Serialization failures
    /// here are logged, not rolled back: the authoritative state has already
    /// advanced.
    fn broadcast_events(&self, table: &Table, events: &[HandEvent]) {
        for event in events {
            if matches!(event, HandEvent::HoleCardsDealt) {
                self.broadcast_cards_dealt(table);
                continue;
            }
            match self.render_event(table, event) {
                None => {}
                Some(Ok(frame)) => self.hub.broadcast(&frame, None),
                Some(Err(e)) => error!(error = %e, "failed to serialize event frame"),
            }
        }
    }

    fn render_event(&self, table: &Table, event: &HandEvent) -> Option<serde_json::Result<String>> {
        let table_id = table.id.as_str();
        let result = match event {
            HandEvent::HandStarted { dealer, sb, bb } => protocol::frame(
                "hand_started",
                &HandStartedMsg {
                    table_id,
                    dealer_seat: *dealer,
                    sb_seat: *sb,
                    bb_seat: *bb,
                },
            ),
            HandEvent::BlindPosted { seat, blind, amount } => protocol::frame(
                "blind_posted",
                &BlindPostedMsg {
                    table_id,
                    seat_index: *seat,
                    blind: match blind {
                        Blind::Small => "small",
                        Blind::Big => "big",
                    },
                    amount: *amount,
                },
            ),
            // Per-viewer; rendered by broadcast_cards_dealt instead.
            HandEvent::HoleCardsDealt => return None,
            HandEvent::ActionApplied {
                seat,
                action,
                amount,
                stack,
                pot,
                current_bet,
            } => protocol::frame(
                "action_result",
                &ActionResultMsg {
                    table_id,
                    seat_index: *seat,
                    action: action_tag(action),
                    amount: *amount,
                    stack: *stack,
                    pot: *pot,
                    current_bet: *current_bet,
                },
            ),
            HandEvent::StreetDealt { street, cards, board } => protocol::frame(
                "board_dealt",
                &BoardDealtMsg {
                    table_id,
                    street: *street,
                    cards,
                    board,
                },
            ),
            HandEvent::ActionRequested {
                seat,
                call_amount,
                min_raise,
                actions,
            } => protocol::frame(
                "action_request",
                &ActionRequestMsg {
                    table_id,
                    seat_index: *seat,
                    call_amount: *call_amount,
                    min_raise: *min_raise,
                    actions: actions.iter().map(|k| kind_tag(*k)).collect(),
                },
            ),
            HandEvent::ShowdownResolved { pot, winners, revealed } => protocol::frame(
                "showdown",
                &ShowdownMsg {
                    table_id,
                    pot: *pot,
                    winners: winners
                        .iter()
                        .map(|w| WinnerMsg {
                            seat_index: w.seat,
                            amount: w.amount,
                        })
                        .collect(),
                    revealed: revealed
                        .iter()
                        .map(|(seat, cards)| RevealedHand {
                            seat_index: *seat,
                            cards: *cards,
                        })
                        .collect(),
                },
            ),
            HandEvent::HandEnded { stacks, busted } => protocol::frame(
                "hand_complete",
                &HandCompleteMsg {
                    table_id,
                    stacks: stacks
                        .iter()
                        .map(|(seat, stack)| SeatStack {
                            seat_index: *seat,
                            stack: *stack,
                        })
                        .collect(),
                    busted: busted.iter().map(|(seat, _)| *seat).collect(),
                },
            ),
        };
        Some(result)
    }

    fn broadcast_cards_dealt(&self, table: &Table) {
        self.hub
            .broadcast_with(|client| self.cards_dealt_frame(table, client.token.as_deref()));
    }

    /// The dealt-cards frame as one recipient may see it: their own two
    /// cards, everyone else's as a count.
    pub fn cards_dealt_frame(&self, table: &Table, viewer: Option<&str>) -> Option<String> {
        let hand = table.hand.as_ref()?;
        let viewer_seat = viewer.and_then(|token| table.seat_by_token(token));
        let seats = (0..MAX_SEATS)
            .filter_map(|idx| {
                let cards = hand.hole_cards[idx]?;
                Some(SeatCards {
                    seat_index: idx,
                    cards: (viewer_seat == Some(idx)).then_some(cards),
                    card_count: 2,
                })
            })
            .collect();
        match protocol::frame(
            "cards_dealt",
            &CardsDealtMsg {
                table_id: &table.id,
                seats,
            },
        ) {
            Ok(frame) => Some(frame),
            Err(e) => {
                error!(error = %e, "failed to serialize cards_dealt");
                None
            }
        }
    }

    fn broadcast_table_state(&self, table: &Table) {
        self.hub
            .broadcast_with(|client| self.table_state_frame(table, client.token.as_deref()));
    }

    /// Full table snapshot for one recipient, hole cards filtered to the
    /// viewer's own seat.
    pub fn table_state_frame(&self, table: &Table, viewer: Option<&str>) -> Option<String> {
        let viewer_seat = viewer.and_then(|token| table.seat_by_token(token));
        let hand = table.hand.as_ref();
        let seats = table
            .seats
            .iter()
            .enumerate()
            .map(|(idx, seat)| {
                let name = seat
                    .token
                    .as_deref()
                    .and_then(|token| self.sessions.get(token))
                    .map(|s| s.name);
                let dealt = hand.map(|h| h.is_dealt(idx)).unwrap_or(false);
                let cards = match (hand, viewer_seat) {
                    (Some(h), Some(v)) if v == idx => h.hole_cards[idx],
                    _ => None,
                };
                SeatView {
                    seat_index: idx,
                    name,
                    status: seat.status,
                    stack: seat.stack,
                    folded: hand.map(|h| h.folded[idx]).unwrap_or(false),
                    cards,
                    card_count: dealt.then_some(2),
                    bet: hand.map(|h| h.contributions[idx]).unwrap_or(0),
                }
            })
            .collect();
        let msg = TableStateMsg {
            id: &table.id,
            name: &table.name,
            max_seats: MAX_SEATS,
            seats,
            dealer_seat: table.dealer_seat,
            street: hand.map(|h| h.street),
            board: hand.map(|h| h.board.as_slice()),
            pot: hand.map(|h| h.visible_pot()),
            current_bet: hand.map(|h| h.current_bet),
            current_actor: hand.and_then(|h| h.current_actor),
        };
        match protocol::frame("table_state", &msg) {
            Ok(frame) => Some(frame),
            Err(e) => {
                error!(error = %e, "failed to serialize table_state");
                None
            }
        }
    }
}

fn action_tag(action: &PlayerAction) -> ActionTag {
    match action {
        PlayerAction::Fold => ActionTag::Fold,
        PlayerAction::Check => ActionTag::Check,
        PlayerAction::Call => ActionTag::Call,
        PlayerAction::Raise(_) => ActionTag::Raise,
    }
}

fn kind_tag(kind: holdem_engine::ActionKind) -> ActionTag {
    match kind {
        holdem_engine::ActionKind::Fold => ActionTag::Fold,
        holdem_engine::ActionKind::Check => ActionTag::Check,
        holdem_engine::ActionKind::Call => ActionTag::Call,
        holdem_engine::ActionKind::Raise => ActionTag::Raise,
    }
}
