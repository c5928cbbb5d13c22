use std::sync::Arc;
use std::time::Instant;

use futures_util::{SinkExt, StreamExt};
use tracing::{info, warn};
use uuid::Uuid;
use warp::ws::{Message, WebSocket};

use game_types::{NotifyRequest, RelayClientMessage, RelayServerMessage, normalize_room_id};

pub mod rooms;

pub use rooms::{Outbound, REPLACED_CLOSE_CODE, RelayRooms, Subscriber};

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Builds the `roomUpdated` push for a notice, stamped with delivery time.
pub fn room_updated_message(notice: &NotifyRequest) -> RelayServerMessage {
    RelayServerMessage::RoomUpdated {
        room_id: notice.room_id.clone(),
        ts: now_ms(),
        version: notice.version,
        updated_at: notice.updated_at,
        patch: notice.patch.clone(),
        state: notice.state.clone(),
        action: notice.action.clone(),
        actor_seat_index: notice.actor_seat_index,
    }
}

/// The subscription this connection currently holds, if any.
struct Membership {
    room_id: String,
    uid_key: String,
    client_id: Option<String>,
}

pub async fn handle_connection(websocket: WebSocket, rooms: Arc<RelayRooms>) {
    let conn_id = Uuid::new_v4();
    info!("New relay connection: {}", conn_id);

    let (mut ws_sender, mut ws_receiver) = websocket.split();
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<Outbound>();

    let incoming_handler = {
        let rooms = rooms.clone();
        let tx = tx.clone();
        async move {
            let mut membership: Option<Membership> = None;
            while let Some(result) = ws_receiver.next().await {
                let msg = match result {
                    Ok(msg) => msg,
                    Err(e) => {
                        warn!("WebSocket error for {}: {}", conn_id, e);
                        break;
                    }
                };
                // Ping/pong traffic is proof of life for the sweep.
                if msg.is_ping() || msg.is_pong() {
                    if let Some(m) = membership.as_ref() {
                        rooms.touch(&m.room_id, &m.uid_key);
                    }
                    continue;
                }
                if !msg.is_text() {
                    continue;
                }
                let Ok(text) = msg.to_str() else { continue };
                let parsed: RelayClientMessage = match serde_json::from_str(text) {
                    Ok(parsed) => parsed,
                    Err(e) => {
                        warn!("Invalid relay message from {}: {}", conn_id, e);
                        continue;
                    }
                };
                handle_message(parsed, conn_id, &rooms, &tx, &mut membership);
            }
            // Teardown releases room membership unless a newer connection
            // already took it over.
            if let Some(m) = membership {
                rooms.unsubscribe(&m.room_id, &m.uid_key, conn_id);
            }
        }
    };

    let outgoing_handler = async move {
        while let Some(event) = rx.recv().await {
            match event {
                Outbound::Message(message) => {
                    let json = match serde_json::to_string(&message) {
                        Ok(json) => json,
                        Err(e) => {
                            warn!("Failed to serialize relay message: {:?}", e);
                            continue;
                        }
                    };
                    if ws_sender.send(Message::text(json)).await.is_err() {
                        break;
                    }
                }
                Outbound::Replaced => {
                    let _ = ws_sender
                        .send(Message::close_with(REPLACED_CLOSE_CODE, "replaced"))
                        .await;
                    break;
                }
            }
        }
    };

    tokio::select! {
        _ = incoming_handler => {},
        _ = outgoing_handler => {},
    }

    info!("Relay connection {} closed", conn_id);
}

fn handle_message(
    message: RelayClientMessage,
    conn_id: Uuid,
    rooms: &RelayRooms,
    tx: &tokio::sync::mpsc::UnboundedSender<Outbound>,
    membership: &mut Option<Membership>,
) {
    match message {
        RelayClientMessage::Subscribe {
            room_id,
            uid,
            name,
            client_id,
        } => {
            let room_id = normalize_room_id(&room_id);
            // Anonymous subscribers get a key that cannot collide with a
            // real uid.
            let uid_key = uid.unwrap_or_else(|| format!("anon:{}", conn_id));

            // Re-subscribing moves the connection; release the old room.
            if let Some(old) = membership.take() {
                if old.room_id != room_id || old.uid_key != uid_key {
                    rooms.unsubscribe(&old.room_id, &old.uid_key, conn_id);
                }
            }

            rooms.subscribe(
                &room_id,
                &uid_key,
                Subscriber {
                    conn_id,
                    client_id: client_id.clone(),
                    name,
                    sender: tx.clone(),
                    last_activity: Instant::now(),
                },
            );
            *membership = Some(Membership {
                room_id: room_id.clone(),
                uid_key,
                client_id,
            });

            let _ = tx.send(Outbound::Message(RelayServerMessage::Subscribed {
                ok: true,
                room_id: Some(room_id),
                ts: now_ms(),
            }));
        }
        RelayClientMessage::Action {
            room_id,
            action,
            payload,
            seq,
        } => {
            let room_id = normalize_room_id(&room_id);
            // Hints only relay within the room the sender subscribed to.
            let Some(m) = membership.as_ref() else { return };
            if m.room_id != room_id {
                return;
            }
            rooms.touch(&room_id, &m.uid_key);
            rooms.broadcast_except(
                &room_id,
                &m.uid_key,
                &RelayServerMessage::PeerAction {
                    room_id: room_id.clone(),
                    action,
                    payload,
                    seq,
                    from: m.uid_key.clone(),
                    from_client_id: m.client_id.clone(),
                    ts: now_ms(),
                },
            );
        }
    }
}
