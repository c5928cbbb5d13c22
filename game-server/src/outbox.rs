use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::relay::{RelayRooms, room_updated_message};
use game_types::NotifyRequest;

/// Hard cap on a single delivery attempt; a slow relay must never hold up
/// the worker.
const DELIVERY_TIMEOUT: Duration = Duration::from_millis(800);

/// Where committed room notices are delivered.
pub enum DeliveryMode {
    /// Single-process deployment: push straight into the local registry.
    Local(Arc<RelayRooms>),
    /// Split deployment: POST to an external relay's `/notify`.
    Http {
        base: String,
        token: Option<String>,
        client: reqwest::Client,
    },
}

/// Bounded fire-and-forget queue between the write path and the relay.
/// Enqueue never blocks and never fails the caller; overflow and delivery
/// errors are logged and dropped.
#[derive(Clone)]
pub struct Outbox {
    tx: mpsc::Sender<NotifyRequest>,
}

impl Outbox {
    pub fn start(mode: DeliveryMode, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity);
        tokio::spawn(run_worker(rx, mode));
        Self { tx }
    }

    pub fn publish(&self, notice: NotifyRequest) {
        if let Err(e) = self.tx.try_send(notice) {
            warn!("dropping room notice: {}", e);
        }
    }
}

async fn run_worker(mut rx: mpsc::Receiver<NotifyRequest>, mode: DeliveryMode) {
    while let Some(notice) = rx.recv().await {
        match &mode {
            DeliveryMode::Local(rooms) => {
                let delivered =
                    rooms.broadcast(&notice.room_id, &room_updated_message(&notice));
                debug!(room_id = %notice.room_id, delivered, "delivered room notice locally");
            }
            DeliveryMode::Http {
                base,
                token,
                client,
            } => {
                let url = format!("{}/notify", base.trim_end_matches('/'));
                let mut notice = notice;
                notice.token = token.clone();
                let mut request = client
                    .post(&url)
                    .timeout(DELIVERY_TIMEOUT)
                    .json(&notice);
                if let Some(token) = token {
                    request = request.bearer_auth(token);
                }
                match request.send().await {
                    Ok(response) if response.status().is_success() => {
                        debug!(room_id = %notice.room_id, "delivered room notice to relay");
                    }
                    Ok(response) => {
                        warn!(room_id = %notice.room_id, status = %response.status(), "relay rejected room notice");
                    }
                    Err(e) => {
                        warn!(room_id = %notice.room_id, "relay delivery failed: {}", e);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use game_types::RelayServerMessage;

    #[tokio::test]
    async fn test_local_delivery_reaches_subscribers() {
        let rooms = Arc::new(RelayRooms::new());
        let outbox = Outbox::start(DeliveryMode::Local(rooms.clone()), 16);

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        rooms.subscribe(
            "AB2C3D",
            "u1",
            crate::relay::Subscriber {
                conn_id: uuid::Uuid::new_v4(),
                client_id: None,
                name: None,
                sender: tx,
                last_activity: std::time::Instant::now(),
            },
        );

        outbox.publish(NotifyRequest {
            room_id: "AB2C3D".to_string(),
            version: Some(3),
            ..Default::default()
        });

        let event = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        match event {
            crate::relay::Outbound::Message(RelayServerMessage::RoomUpdated {
                room_id,
                version,
                ..
            }) => {
                assert_eq!(room_id, "AB2C3D");
                assert_eq!(version, Some(3));
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_publish_survives_overflow() {
        let rooms = Arc::new(RelayRooms::new());
        let outbox = Outbox::start(DeliveryMode::Local(rooms), 1);
        for _ in 0..50 {
            outbox.publish(NotifyRequest {
                room_id: "AB2C3D".to_string(),
                ..Default::default()
            });
        }
        // No panic and no await: the queue sheds load silently.
    }
}
