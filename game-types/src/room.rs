use serde::{Deserialize, Serialize};

use crate::{GameResult, GameState};

/// Room codes are drawn from this alphabet; visually ambiguous glyphs
/// (0/O, 1/I/L) are excluded so codes survive being read aloud.
pub const ROOM_CODE_ALPHABET: &[u8] = b"23456789ABCDEFGHJKMNPQRSTUVWXYZ";
pub const ROOM_CODE_LEN: usize = 6;
pub const SEAT_COUNT: usize = 2;
pub const CLIENT_ID_MAX_LEN: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomStatus {
    Waiting,
    Playing,
}

/// One of the two fixed player slots in a room. Seat 0 is always the
/// owner's seat. While occupied, `uid` never changes; `clientId` may be
/// rebound to the same uid across reconnects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Seat {
    pub uid: Option<String>,
    pub client_id: Option<String>,
    pub name: String,
    pub online: bool,
    pub joined_at: Option<String>,
}

impl Seat {
    pub fn empty(index: usize) -> Self {
        Self {
            uid: None,
            client_id: None,
            name: seat_label(index),
            online: false,
            joined_at: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.uid.is_none()
    }
}

pub fn seat_label(index: usize) -> String {
    format!("Player {}", index + 1)
}

/// Trim and cap a caller-supplied client id; empty after trimming means
/// "not provided".
pub fn normalize_client_id(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.chars().take(CLIENT_ID_MAX_LEN).collect())
}

pub fn normalize_room_id(raw: &str) -> String {
    raw.trim().to_uppercase()
}

/// The persisted unit of a two-player session, keyed by a short
/// human-typable code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub room_id: String,
    pub owner_uid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_client_id: Option<String>,
    pub status: RoomStatus,
    pub seats: Vec<Seat>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game_state: Option<GameState>,
    #[serde(default)]
    pub game_version: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game_result: Option<GameResult>,
    pub created_at: String, // RFC 3339
    pub updated_at: String, // RFC 3339
}

impl Room {
    /// Seat resolution used by every authenticated room operation: exact
    /// clientId match first (same device), then uid match (same player on a
    /// new device).
    pub fn find_seat(&self, uid: &str, client_id: Option<&str>) -> Option<usize> {
        if let Some(cid) = client_id {
            if let Some(idx) = self
                .seats
                .iter()
                .position(|s| s.client_id.as_deref() == Some(cid))
            {
                return Some(idx);
            }
        }
        self.seats.iter().position(|s| s.uid.as_deref() == Some(uid))
    }

    pub fn first_empty_seat(&self) -> Option<usize> {
        self.seats.iter().position(|s| s.is_empty())
    }
}
