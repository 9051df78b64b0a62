use std::sync::Arc;

use holdem_ws::protocol::{Envelope, LobbyEntry};
use holdem_ws::{Server, ServerConfig};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use uuid::Uuid;

fn server() -> Arc<Server> {
    Arc::new(Server::new(ServerConfig::default()))
}

/// A fake connection: registered with the hub, frames collected from its
/// bounded queue. No sockets involved.
fn connect(server: &Server) -> (Uuid, mpsc::Receiver<String>) {
    let (tx, rx) = mpsc::channel(64);
    let conn = Uuid::new_v4();
    server.hub.register(conn, tx);
    (conn, rx)
}

fn drain(rx: &mut mpsc::Receiver<String>) -> Vec<Envelope> {
    let mut frames = Vec::new();
    while let Ok(frame) = rx.try_recv() {
        frames.push(serde_json::from_str(&frame).unwrap());
    }
    frames
}

fn kinds(frames: &[Envelope]) -> Vec<String> {
    frames.iter().map(|f| f.kind.clone()).collect()
}

fn error_message(frames: &[Envelope]) -> String {
    frames
        .iter()
        .find(|f| f.kind == "error")
        .map(|f| f.payload["message"].as_str().unwrap().to_string())
        .expect("expected an error frame")
}

async fn send(server: &Server, conn: Uuid, kind: &str, payload: Value) {
    let raw = json!({ "type": kind, "payload": payload }).to_string();
    server.dispatch(conn, &raw).await;
}

async fn identify(
    server: &Server,
    conn: Uuid,
    rx: &mut mpsc::Receiver<String>,
    name: &str,
) -> String {
    send(server, conn, "set_name", json!({ "name": name })).await;
    let frames = drain(rx);
    frames
        .iter()
        .find(|f| f.kind == "session_created")
        .expect("session_created")
        .payload["token"]
        .as_str()
        .unwrap()
        .to_string()
}

#[tokio::test]
async fn set_name_creates_session_and_sends_lobby() {
    let server = server();
    let (conn, mut rx) = connect(&server);

    send(&server, conn, "set_name", json!({ "name": "Alice" })).await;
    let frames = drain(&mut rx);
    assert_eq!(kinds(&frames), vec!["session_created", "lobby_state"]);

    let created = &frames[0].payload;
    assert_eq!(created["name"], "Alice");
    let token = created["token"].as_str().unwrap();
    assert!(!token.is_empty());
    assert_eq!(server.sessions.get(token).unwrap().name, "Alice");

    // The lobby payload is double-encoded: a JSON string holding JSON.
    let inner = frames[1].payload.as_str().expect("lobby payload is a string");
    let entries: Vec<LobbyEntry> = serde_json::from_str(inner).unwrap();
    assert_eq!(entries.len(), 4);
    assert_eq!(entries[0].id, "table-1");
    assert_eq!(entries[0].name, "Table 1");
    assert_eq!(entries[0].max_seats, 6);
    assert_eq!(entries[0].seats_occupied, 0);
    assert_eq!(entries[3].id, "table-4");
}

#[tokio::test]
async fn lobby_double_encoding_round_trips() {
    let server = server();
    let (conn, mut rx) = connect(&server);
    identify(&server, conn, &mut rx, "a").await;
    send(&server, conn, "join_table", json!({ "tableId": "table-2" })).await;
    drain(&mut rx);

    let (conn2, mut rx2) = connect(&server);
    identify(&server, conn2, &mut rx2, "b").await;
    let frames = drain(&mut rx2);
    let inner = frames
        .iter()
        .find(|f| f.kind == "lobby_state")
        .unwrap()
        .payload
        .as_str()
        .unwrap();
    let entries: Vec<LobbyEntry> = serde_json::from_str(inner).unwrap();
    // Decodes to exactly what the server reports internally.
    assert_eq!(entries, server.lobby_entries().await);
    assert_eq!(entries[1].seats_occupied, 1);
}

#[tokio::test]
async fn invalid_name_is_rejected() {
    let server = server();
    let (conn, mut rx) = connect(&server);
    send(&server, conn, "set_name", json!({ "name": "no!good" })).await;
    assert_eq!(error_message(&drain(&mut rx)), "invalid name");
}

#[tokio::test]
async fn unknown_type_and_malformed_json_get_directed_errors() {
    let server = server();
    let (conn, mut rx) = connect(&server);

    send(&server, conn, "bogus", json!({})).await;
    assert_eq!(error_message(&drain(&mut rx)), "Unknown message type: bogus");

    server.dispatch(conn, "{not json").await;
    assert_eq!(error_message(&drain(&mut rx)), "malformed frame");
}

#[tokio::test]
async fn unknown_inbound_fields_are_ignored() {
    let server = server();
    let (conn, mut rx) = connect(&server);
    send(
        &server,
        conn,
        "set_name",
        json!({ "name": "Alice", "extra": 42, "more": { "x": 1 } }),
    )
    .await;
    let frames = drain(&mut rx);
    assert_eq!(frames[0].kind, "session_created");
}

#[tokio::test]
async fn join_table_assigns_seat_and_fans_lobby_to_others() {
    let server = server();
    let (a, mut rx_a) = connect(&server);
    let (b, mut rx_b) = connect(&server);
    let token = identify(&server, a, &mut rx_a, "Alice").await;
    identify(&server, b, &mut rx_b, "Bob").await;
    drain(&mut rx_a);
    drain(&mut rx_b);

    send(&server, a, "join_table", json!({ "tableId": "table-1" })).await;

    let frames_a = drain(&mut rx_a);
    assert_eq!(kinds(&frames_a), vec!["seat_assigned"]);
    let payload = &frames_a[0].payload;
    assert_eq!(payload["tableId"], "table-1");
    assert_eq!(payload["seatIndex"], 0);
    assert_eq!(payload["status"], "waiting");

    // Others see the occupancy change; the originator already has a reply.
    let frames_b = drain(&mut rx_b);
    assert_eq!(kinds(&frames_b), vec!["lobby_state"]);

    let session = server.sessions.get(&token).unwrap();
    assert_eq!(session.table_id.as_deref(), Some("table-1"));
    assert_eq!(session.seat_index, Some(0));
}

#[tokio::test]
async fn join_errors() {
    let server = server();
    let (a, mut rx_a) = connect(&server);

    // No session yet.
    send(&server, a, "join_table", json!({ "tableId": "table-1" })).await;
    assert_eq!(error_message(&drain(&mut rx_a)), "session not found");

    identify(&server, a, &mut rx_a, "Alice").await;
    send(&server, a, "join_table", json!({ "tableId": "table-9" })).await;
    assert_eq!(error_message(&drain(&mut rx_a)), "invalid_table");

    send(&server, a, "join_table", json!({ "tableId": "table-1" })).await;
    drain(&mut rx_a);
    send(&server, a, "join_table", json!({ "tableId": "table-2" })).await;
    assert_eq!(error_message(&drain(&mut rx_a)), "already_seated");
}

#[tokio::test]
async fn seventh_join_reports_table_full() {
    let server = server();
    let mut conns = Vec::new();
    for i in 0..7 {
        let (conn, mut rx) = connect(&server);
        identify(&server, conn, &mut rx, &format!("p{}", i)).await;
        send(&server, conn, "join_table", json!({ "tableId": "table-1" })).await;
        conns.push((conn, rx));
    }
    let (_, rx) = conns.last_mut().unwrap();
    assert_eq!(error_message(&drain(rx)), "table_full");
}

#[tokio::test]
async fn leave_table_clears_seat_and_session() {
    let server = server();
    let (a, mut rx_a) = connect(&server);
    let (b, mut rx_b) = connect(&server);
    let token = identify(&server, a, &mut rx_a, "Alice").await;
    identify(&server, b, &mut rx_b, "Bob").await;
    send(&server, a, "join_table", json!({ "tableId": "table-1" })).await;
    drain(&mut rx_a);
    drain(&mut rx_b);

    send(&server, a, "leave_table", json!({})).await;
    let frames_a = drain(&mut rx_a);
    assert_eq!(frames_a[0].kind, "seat_cleared");
    let frames_b = drain(&mut rx_b);
    assert!(kinds(&frames_b).contains(&"table_state".to_string()));
    assert!(kinds(&frames_b).contains(&"lobby_state".to_string()));

    let session = server.sessions.get(&token).unwrap();
    assert!(session.table_id.is_none());
    assert!(session.seat_index.is_none());

    // Leaving again: the seat is already gone.
    send(&server, a, "leave_table", json!({})).await;
    assert_eq!(error_message(&drain(&mut rx_a)), "not_seated");
}

async fn seat_two_players(
    server: &Server,
) -> ((Uuid, mpsc::Receiver<String>, String), (Uuid, mpsc::Receiver<String>, String)) {
    let (a, mut rx_a) = connect(server);
    let (b, mut rx_b) = connect(server);
    let token_a = identify(server, a, &mut rx_a, "Alice").await;
    let token_b = identify(server, b, &mut rx_b, "Bob").await;
    send(server, a, "join_table", json!({ "tableId": "table-1" })).await;
    send(server, b, "join_table", json!({ "tableId": "table-1" })).await;
    drain(&mut rx_a);
    drain(&mut rx_b);
    ((a, rx_a, token_a), (b, rx_b, token_b))
}

#[tokio::test]
async fn start_hand_broadcasts_in_order_with_private_cards() {
    let server = server();
    let ((a, mut rx_a, _), (_b, mut rx_b, _)) = seat_two_players(&server).await;
    // A lobby watcher with no seat sees card backs only.
    let (w, mut rx_w) = connect(&server);
    identify(&server, w, &mut rx_w, "Watcher").await;
    drain(&mut rx_w);

    send(&server, a, "start_hand", json!({})).await;

    let frames_a = drain(&mut rx_a);
    assert_eq!(
        kinds(&frames_a),
        vec![
            "hand_started",
            "blind_posted",
            "blind_posted",
            "cards_dealt",
            "table_state",
            "action_request"
        ]
    );
    assert_eq!(frames_a[0].payload["dealerSeat"], 0);
    assert_eq!(frames_a[0].payload["sbSeat"], 0);
    assert_eq!(frames_a[0].payload["bbSeat"], 1);
    assert_eq!(frames_a[1].payload["blind"], "small");
    assert_eq!(frames_a[1].payload["amount"], 10);
    assert_eq!(frames_a[2].payload["blind"], "big");
    assert_eq!(frames_a[2].payload["amount"], 20);

    // Heads-up the dealer acts first preflop.
    let request = &frames_a[5].payload;
    assert_eq!(request["seatIndex"], 0);
    assert_eq!(request["callAmount"], 10);
    assert_eq!(request["minRaise"], 40);
    assert_eq!(request["actions"], json!(["fold", "call", "raise"]));

    // Privacy: each player sees exactly their own two cards.
    let cards_a = &frames_a[3].payload["seats"];
    assert_eq!(cards_a[0]["seatIndex"], 0);
    assert_eq!(cards_a[0]["cards"].as_array().unwrap().len(), 2);
    assert_eq!(cards_a[0]["cardCount"], 2);
    assert!(cards_a[1].get("cards").is_none());
    assert_eq!(cards_a[1]["cardCount"], 2);

    let frames_b = drain(&mut rx_b);
    let cards_b = &frames_b[3].payload["seats"];
    assert!(cards_b[0].get("cards").is_none());
    assert_eq!(cards_b[1]["cards"].as_array().unwrap().len(), 2);

    // The watcher gets counts for both seats and cards for neither.
    let frames_w = drain(&mut rx_w);
    let cards_w = &frames_w[3].payload["seats"];
    assert!(cards_w[0].get("cards").is_none());
    assert!(cards_w[1].get("cards").is_none());
    assert_eq!(cards_w[0]["cardCount"], 2);

    // The same filtering holds in the table snapshot.
    let state_a = &frames_a[4].payload;
    assert!(state_a["seats"][0].get("cards").is_some());
    assert!(state_a["seats"][1].get("cards").is_none());
    assert_eq!(state_a["pot"], 30);
    assert_eq!(state_a["street"], "preflop");
    assert_eq!(state_a["currentBet"], 20);
    assert_eq!(state_a["currentActor"], 0);
    assert_eq!(state_a["seats"][0]["name"], "Alice");
    assert_eq!(state_a["seats"][1]["name"], "Bob");
}

#[tokio::test]
async fn start_hand_errors() {
    let server = server();
    let (a, mut rx_a) = connect(&server);
    identify(&server, a, &mut rx_a, "Alice").await;

    send(&server, a, "start_hand", json!({})).await;
    assert_eq!(error_message(&drain(&mut rx_a)), "not_seated");

    send(&server, a, "join_table", json!({ "tableId": "table-1" })).await;
    drain(&mut rx_a);
    send(&server, a, "start_hand", json!({})).await;
    assert_eq!(error_message(&drain(&mut rx_a)), "not enough players");
}

#[tokio::test]
async fn second_start_reports_hand_in_progress() {
    let server = server();
    let ((a, mut rx_a, _), (_b, _rx_b, _)) = seat_two_players(&server).await;
    send(&server, a, "start_hand", json!({})).await;
    drain(&mut rx_a);
    send(&server, a, "start_hand", json!({})).await;
    assert_eq!(error_message(&drain(&mut rx_a)), "hand already in progress");
}

#[tokio::test]
async fn fold_ends_heads_up_hand() {
    let server = server();
    let ((a, mut rx_a, _), (_b, mut rx_b, _)) = seat_two_players(&server).await;
    send(&server, a, "start_hand", json!({})).await;
    drain(&mut rx_a);
    drain(&mut rx_b);

    // Alice (seat 0, dealer) folds to the big blind.
    send(
        &server,
        a,
        "player_action",
        json!({ "seatIndex": 0, "action": "fold" }),
    )
    .await;

    let frames_b = drain(&mut rx_b);
    assert_eq!(kinds(&frames_b), vec!["action_result", "showdown", "hand_complete"]);
    assert_eq!(frames_b[0].payload["action"], "fold");
    let showdown = &frames_b[1].payload;
    assert_eq!(showdown["pot"], 30);
    assert_eq!(showdown["winners"][0]["seatIndex"], 1);
    assert_eq!(showdown["winners"][0]["amount"], 30);
    // Fold-outs reveal nothing.
    assert!(showdown.get("revealed").is_none());
    let complete = &frames_b[2].payload;
    let stacks = complete["stacks"].as_array().unwrap();
    assert!(stacks.iter().any(|s| s["seatIndex"] == 1 && s["stack"] == 1010));
}

#[tokio::test]
async fn action_validation_errors() {
    let server = server();
    let ((a, mut rx_a, _), (b, mut rx_b, _)) = seat_two_players(&server).await;
    send(&server, a, "start_hand", json!({})).await;
    drain(&mut rx_a);
    drain(&mut rx_b);

    // Claiming someone else's seat.
    send(
        &server,
        b,
        "player_action",
        json!({ "seatIndex": 0, "action": "fold" }),
    )
    .await;
    assert_eq!(error_message(&drain(&mut rx_b)), "not your turn");

    // Acting out of turn from your own seat.
    send(
        &server,
        b,
        "player_action",
        json!({ "seatIndex": 1, "action": "fold" }),
    )
    .await;
    assert_eq!(error_message(&drain(&mut rx_b)), "not your turn");

    // Checking when facing a bet.
    send(
        &server,
        a,
        "player_action",
        json!({ "seatIndex": 0, "action": "check" }),
    )
    .await;
    assert_eq!(
        error_message(&drain(&mut rx_a)),
        "cannot check when facing a bet"
    );

    // Raising without an amount.
    send(
        &server,
        a,
        "player_action",
        json!({ "seatIndex": 0, "action": "raise" }),
    )
    .await;
    assert_eq!(error_message(&drain(&mut rx_a)), "raise requires an amount");

    // Raising below the minimum.
    send(
        &server,
        a,
        "player_action",
        json!({ "seatIndex": 0, "action": "raise", "amount": 30 }),
    )
    .await;
    assert_eq!(
        error_message(&drain(&mut rx_a)),
        "raise below minimum: must be at least 40"
    );
}

#[tokio::test]
async fn call_and_check_advance_to_the_flop() {
    let server = server();
    let ((a, mut rx_a, _), (b, mut rx_b, _)) = seat_two_players(&server).await;
    send(&server, a, "start_hand", json!({})).await;
    drain(&mut rx_a);
    drain(&mut rx_b);

    send(
        &server,
        a,
        "player_action",
        json!({ "seatIndex": 0, "action": "call" }),
    )
    .await;
    let frames = drain(&mut rx_b);
    // Big blind still has the option, so no street change yet.
    assert_eq!(kinds(&frames), vec!["action_result", "action_request"]);
    assert_eq!(frames[1].payload["seatIndex"], 1);

    send(
        &server,
        b,
        "player_action",
        json!({ "seatIndex": 1, "action": "check" }),
    )
    .await;
    let frames = drain(&mut rx_a);
    assert_eq!(
        kinds(&frames),
        vec!["action_result", "board_dealt", "action_request"]
    );
    let board = &frames[1].payload;
    assert_eq!(board["street"], "flop");
    assert_eq!(board["cards"].as_array().unwrap().len(), 3);
    assert_eq!(board["board"].as_array().unwrap().len(), 3);
    // Postflop the non-dealer acts first heads-up.
    assert_eq!(frames[2].payload["seatIndex"], 1);
}

#[tokio::test]
async fn all_in_call_runs_out_the_board_and_reveals() {
    let server = server();
    let ((a, mut rx_a, _), (b, mut rx_b, _)) = seat_two_players(&server).await;
    send(&server, a, "start_hand", json!({})).await;
    drain(&mut rx_a);
    drain(&mut rx_b);

    send(
        &server,
        a,
        "player_action",
        json!({ "seatIndex": 0, "action": "raise", "amount": 1000 }),
    )
    .await;
    drain(&mut rx_a);
    send(
        &server,
        b,
        "player_action",
        json!({ "seatIndex": 1, "action": "call" }),
    )
    .await;

    let frames = drain(&mut rx_a);
    let mut expected = vec![
        "action_result",
        "board_dealt",
        "board_dealt",
        "board_dealt",
        "showdown",
        "hand_complete",
    ];
    let got = kinds(&frames);
    // A bust-out appends a lobby refresh; a chop does not.
    if got.len() == 7 {
        expected.push("lobby_state");
    }
    assert_eq!(got, expected);

    let showdown = frames.iter().find(|f| f.kind == "showdown").unwrap();
    assert_eq!(showdown.payload["pot"], 2000);
    let revealed = showdown.payload["revealed"].as_array().unwrap();
    assert_eq!(revealed.len(), 2);
    assert_eq!(revealed[0]["cards"].as_array().unwrap().len(), 2);

    // Chips conserve across the table.
    let table = server.table_by_id("table-1").await.unwrap();
    let table = table.lock().await;
    let awarded: u32 = table.seats.iter().map(|s| s.stack).sum();
    assert_eq!(awarded, 2000);
    assert!(table.hand.is_none());
}

#[tokio::test]
async fn start_hand_with_all_in_blinds_runs_out_and_refreshes_lobby() {
    let server = server();
    let ((a, mut rx_a, token_a), (_b, mut rx_b, token_b)) = seat_two_players(&server).await;
    {
        let table = server.table_by_id("table-1").await.unwrap();
        let mut table = table.lock().await;
        table.seats[0].stack = 10;
        table.seats[1].stack = 20;
    }

    send(&server, a, "start_hand", json!({})).await;

    let frames = drain(&mut rx_a);
    let complete = frames
        .iter()
        .find(|f| f.kind == "hand_complete")
        .expect("hand resolves during start");
    let busted_seats: Vec<u64> = complete
        .payload
        .get("busted")
        .and_then(|v| v.as_array())
        .map(|seats| seats.iter().filter_map(|v| v.as_u64()).collect())
        .unwrap_or_default();

    // Both blinds are all-in, so the board runs out inside the start. The
    // hand is already resolved by fan-out time, so there is no live
    // snapshot to filter hole cards from; the showdown frame carries the
    // reveal instead.
    let mut expected = vec![
        "hand_started",
        "blind_posted",
        "blind_posted",
        "board_dealt",
        "board_dealt",
        "board_dealt",
        "showdown",
        "hand_complete",
        "table_state",
    ];
    // A bust-out frees a seat and appends a lobby refresh; a chop does not.
    if !busted_seats.is_empty() {
        expected.push("lobby_state");
    }
    assert_eq!(kinds(&frames), expected);

    let showdown = frames.iter().find(|f| f.kind == "showdown").unwrap();
    assert_eq!(showdown.payload["pot"], 30);
    assert_eq!(showdown.payload["revealed"].as_array().unwrap().len(), 2);

    // Busted players' sessions are unbound from their seats.
    for (seat, token) in [(0u64, &token_a), (1u64, &token_b)] {
        if busted_seats.contains(&seat) {
            let session = server.sessions.get(token).unwrap();
            assert!(session.table_id.is_none());
            assert!(session.seat_index.is_none());
        }
    }

    let table = server.table_by_id("table-1").await.unwrap();
    let table = table.lock().await;
    assert!(table.hand.is_none());
    let total: u32 = table.seats.iter().map(|s| s.stack).sum();
    assert_eq!(total, 30);
    drain(&mut rx_b);
}

#[tokio::test]
async fn restore_resumes_session_and_rejects_unknown_tokens() {
    let server = server();
    let (a, mut rx_a) = connect(&server);
    let token = identify(&server, a, &mut rx_a, "Alice").await;
    send(&server, a, "join_table", json!({ "tableId": "table-3" })).await;
    drain(&mut rx_a);

    let (b, mut rx_b) = connect(&server);
    assert!(server.restore(b, &token).await);
    let frames = drain(&mut rx_b);
    assert_eq!(kinds(&frames), vec!["session_restored", "lobby_state"]);
    let restored = &frames[0].payload;
    assert_eq!(restored["name"], "Alice");
    assert_eq!(restored["tableID"], "table-3");
    assert_eq!(restored["seatIndex"], 0);

    let (c, mut rx_c) = connect(&server);
    assert!(!server.restore(c, "no-such-token").await);
    assert_eq!(error_message(&drain(&mut rx_c)), "session not found");
}

#[tokio::test]
async fn restored_session_without_seat_omits_optional_fields() {
    let server = server();
    let (a, mut rx_a) = connect(&server);
    let token = identify(&server, a, &mut rx_a, "Alice").await;

    let (b, mut rx_b) = connect(&server);
    assert!(server.restore(b, &token).await);
    let frames = drain(&mut rx_b);
    let restored = &frames[0].payload;
    assert!(restored.get("tableID").is_none());
    assert!(restored.get("seatIndex").is_none());
}

#[tokio::test]
async fn disconnect_clears_seat_but_keeps_session() {
    let server = server();
    let ((a, mut rx_a, token_a), (_b, mut rx_b, _)) = seat_two_players(&server).await;
    drain(&mut rx_a);

    server.handle_disconnect(a).await;

    // The session survives for reconnection, unseated.
    let session = server.sessions.get(&token_a).unwrap();
    assert!(session.table_id.is_none());
    assert!(session.seat_index.is_none());

    let table = server.table_by_id("table-1").await.unwrap();
    assert_eq!(table.lock().await.occupied_seats(), 1);

    let frames_b = drain(&mut rx_b);
    assert!(kinds(&frames_b).contains(&"table_state".to_string()));
    assert!(kinds(&frames_b).contains(&"lobby_state".to_string()));

    // Cleanup is idempotent.
    server.handle_disconnect(a).await;
}

#[tokio::test]
async fn disconnect_mid_hand_folds_the_player() {
    let server = server();
    let ((a, mut rx_a, _), (_b, mut rx_b, _)) = seat_two_players(&server).await;
    send(&server, a, "start_hand", json!({})).await;
    drain(&mut rx_a);
    drain(&mut rx_b);

    server.handle_disconnect(a).await;

    let frames_b = drain(&mut rx_b);
    let got = kinds(&frames_b);
    // Losing the only opponent ends the hand in Bob's favor.
    assert!(got.contains(&"showdown".to_string()));
    assert!(got.contains(&"hand_complete".to_string()));
    let table = server.table_by_id("table-1").await.unwrap();
    let table = table.lock().await;
    assert!(table.hand.is_none());
    assert_eq!(table.seats[1].stack, 1010);
}
