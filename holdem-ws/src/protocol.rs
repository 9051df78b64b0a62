use holdem_engine::{Card, SeatStatus, Street};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Every frame on the wire is `{ "type": ..., "payload": ... }`. The payload
/// is opaque at this layer; inbound payloads are re-parsed per type and
/// unknown fields on them are ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub payload: Value,
}

/// Builds a wire frame from a payload struct.
pub fn frame<T: Serialize>(kind: &str, payload: &T) -> serde_json::Result<String> {
    let envelope = Envelope {
        kind: kind.to_string(),
        payload: serde_json::to_value(payload)?,
    };
    serde_json::to_string(&envelope)
}

/// Error frames must always serialize, so they are built from literals.
pub fn error_frame(message: &str) -> String {
    serde_json::json!({
        "type": "error",
        "payload": { "message": message },
    })
    .to_string()
}

/// The lobby payload is double-encoded for wire compatibility: a JSON string
/// whose contents are themselves the serialized lobby array.
pub fn lobby_frame(entries: &[LobbyEntry]) -> serde_json::Result<String> {
    let inner = serde_json::to_string(entries)?;
    frame("lobby_state", &Value::String(inner))
}

// ---------------------------------------------------------------------------
// Inbound payloads.

#[derive(Debug, Clone, Deserialize)]
pub struct SetName {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JoinTable {
    #[serde(rename = "tableId")]
    pub table_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionTag {
    Fold,
    Check,
    Call,
    Raise,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlayerActionMsg {
    #[serde(rename = "seatIndex")]
    pub seat_index: usize,
    pub action: ActionTag,
    pub amount: Option<u32>,
}

// ---------------------------------------------------------------------------
// Outbound payloads. Optional fields are omitted from the JSON when absent.

#[derive(Debug, Serialize)]
pub struct SessionCreated<'a> {
    pub token: &'a str,
    pub name: &'a str,
}

#[derive(Debug, Serialize)]
pub struct SessionRestored<'a> {
    pub name: &'a str,
    // Legacy key casing, kept for wire compatibility.
    #[serde(rename = "tableID", skip_serializing_if = "Option::is_none")]
    pub table_id: Option<&'a str>,
    #[serde(rename = "seatIndex", skip_serializing_if = "Option::is_none")]
    pub seat_index: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LobbyEntry {
    pub id: String,
    pub name: String,
    pub seats_occupied: usize,
    pub max_seats: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeatAssigned<'a> {
    pub table_id: &'a str,
    pub seat_index: usize,
    pub status: SeatStatus,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HandStartedMsg<'a> {
    pub table_id: &'a str,
    pub dealer_seat: usize,
    pub sb_seat: usize,
    pub bb_seat: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlindPostedMsg<'a> {
    pub table_id: &'a str,
    pub seat_index: usize,
    pub blind: &'static str,
    pub amount: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeatCards {
    pub seat_index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cards: Option<[Card; 2]>,
    pub card_count: u8,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CardsDealtMsg<'a> {
    pub table_id: &'a str,
    pub seats: Vec<SeatCards>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardDealtMsg<'a> {
    pub table_id: &'a str,
    pub street: Street,
    pub cards: &'a [Card],
    pub board: &'a [Card],
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionRequestMsg<'a> {
    pub table_id: &'a str,
    pub seat_index: usize,
    pub call_amount: u32,
    pub min_raise: u32,
    pub actions: Vec<ActionTag>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionResultMsg<'a> {
    pub table_id: &'a str,
    pub seat_index: usize,
    pub action: ActionTag,
    pub amount: u32,
    pub stack: u32,
    pub pot: u32,
    pub current_bet: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WinnerMsg {
    pub seat_index: usize,
    pub amount: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RevealedHand {
    pub seat_index: usize,
    pub cards: [Card; 2],
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShowdownMsg<'a> {
    pub table_id: &'a str,
    pub pot: u32,
    pub winners: Vec<WinnerMsg>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub revealed: Vec<RevealedHand>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeatStack {
    pub seat_index: usize,
    pub stack: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HandCompleteMsg<'a> {
    pub table_id: &'a str,
    pub stacks: Vec<SeatStack>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub busted: Vec<usize>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeatView {
    pub seat_index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub status: SeatStatus,
    pub stack: u32,
    pub folded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cards: Option<[Card; 2]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub card_count: Option<u8>,
    pub bet: u32,
}

/// Per-viewer table snapshot. Hole cards appear only on the viewer's own
/// seat; everyone else gets card counts so backs can be rendered.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableStateMsg<'a> {
    pub id: &'a str,
    pub name: &'a str,
    pub max_seats: usize,
    pub seats: Vec<SeatView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dealer_seat: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub street: Option<Street>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub board: Option<&'a [Card]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pot: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_bet: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_actor: Option<usize>,
}
