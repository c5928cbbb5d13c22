use async_trait::async_trait;
use serde_json::Value;

use game_types::{GameAction, GameError, RoomReply};

/// Transport seam to the authoritative server. The embedding app provides
/// the HTTP implementation (carrying its own identity); tests use mocks.
#[async_trait]
pub trait RoomGateway: Send + Sync {
    async fn perform_action(
        &self,
        room_id: &str,
        client_id: &str,
        action: &GameAction,
    ) -> Result<RoomReply, GameError>;

    async fn get_room_state(
        &self,
        room_id: &str,
        client_id: Option<&str>,
    ) -> Result<RoomReply, GameError>;
}

/// Outbound low-latency hints to the peer (relayed, never authoritative).
/// Best effort by contract: implementations must not fail the caller.
pub trait PeerHints: Send + Sync {
    fn send_hint(&self, room_id: &str, action: &str, payload: Option<Value>);
}

/// Hint sink for embeddings without a live relay connection.
pub struct NoopHints;

impl PeerHints for NoopHints {
    fn send_hint(&self, _room_id: &str, _action: &str, _payload: Option<Value>) {}
}
