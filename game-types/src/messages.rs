use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{GameAction, Phase, Room};

/// Minimal state delta carried on `roomUpdated` notices so receivers can
/// animate high-frequency fields (held dice, roll count) without waiting to
/// re-pull the whole room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnPatch {
    pub held: Option<Vec<bool>>,
    pub roll_count: Option<u8>,
    pub last_roll_at: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomPatch {
    pub phase: Phase,
    pub current_player_index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub turn: Option<TurnPatch>,
}

/// Body of the relay's `POST /notify` endpoint. Everything but `room_id`
/// is optional; a bare notice just tells subscribers to re-pull.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotifyRequest {
    pub room_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patch: Option<RoomPatch>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor_seat_index: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

/// Messages a client sends over the relay WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RelayClientMessage {
    #[serde(rename_all = "camelCase")]
    Subscribe {
        room_id: String,
        #[serde(default)]
        uid: Option<String>,
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        client_id: Option<String>,
    },
    /// Low-latency peer hint, relayed verbatim and never authoritative.
    #[serde(rename_all = "camelCase")]
    Action {
        room_id: String,
        action: String,
        #[serde(default)]
        payload: Option<Value>,
        /// Client-generated nonce so receivers can drop duplicate relays.
        #[serde(default)]
        seq: Option<String>,
    },
}

/// Messages the relay pushes to subscribed clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RelayServerMessage {
    #[serde(rename_all = "camelCase")]
    Subscribed {
        ok: bool,
        room_id: Option<String>,
        ts: i64,
    },
    #[serde(rename_all = "camelCase")]
    RoomUpdated {
        room_id: String,
        ts: i64,
        version: Option<i64>,
        updated_at: Option<i64>,
        patch: Option<RoomPatch>,
        state: Option<Value>,
        action: Option<String>,
        actor_seat_index: Option<usize>,
    },
    #[serde(rename_all = "camelCase")]
    PeerAction {
        room_id: String,
        action: String,
        payload: Option<Value>,
        seq: Option<String>,
        from: String,
        from_client_id: Option<String>,
        ts: i64,
    },
}

/// The caller's own view attached to every successful room reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelfInfo {
    pub seat_index: i32,
    pub is_owner: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomReply {
    pub ok: bool,
    pub room_id: String,
    pub room: Room,
    #[serde(rename = "self")]
    pub self_info: SelfInfo,
}

/// Reply to `leaveRoom`; `room` is absent when the room was deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaveReply {
    pub ok: bool,
    pub room_id: String,
    pub action: LeaveAction,
    pub seat_index: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room: Option<Room>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeaveAction {
    /// Seat marked offline (or identity cleared on explicit exit).
    Offline,
    /// Owner explicitly exited; the room document was deleted.
    Removed,
    /// Caller held no seat; nothing changed.
    Noop,
}

// Request bodies for the gateway HTTP surface.

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomRequest {
    #[serde(default)]
    pub client_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRoomRequest {
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub debug: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaveRoomRequest {
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub exit: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartGameRequest {
    pub client_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionRequest {
    pub client_id: String,
    #[serde(flatten)]
    pub action: GameAction,
    #[serde(default)]
    pub debug: bool,
}
