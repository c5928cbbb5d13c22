use std::collections::HashMap;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::mpsc;
use uuid::Uuid;

use game_types::RelayServerMessage;

/// What the outgoing half of a relay connection is fed.
#[derive(Debug)]
pub enum Outbound {
    Message(RelayServerMessage),
    /// A newer connection took over this player's subscription; the socket
    /// is closed with code 4000 so the old client knows not to reconnect.
    Replaced,
}

pub const REPLACED_CLOSE_CODE: u16 = 4000;

#[derive(Debug)]
pub struct Subscriber {
    pub conn_id: Uuid,
    pub client_id: Option<String>,
    pub name: Option<String>,
    pub sender: mpsc::UnboundedSender<Outbound>,
    pub last_activity: Instant,
}

impl Subscriber {
    fn send(&self, message: RelayServerMessage) -> bool {
        self.sender.send(Outbound::Message(message)).is_ok()
    }
}

/// In-process subscriber registry: roomId → uid key → live connection.
/// One connection per logical player per room; uid keys for anonymous
/// subscribers are minted per connection so they never collide.
pub struct RelayRooms {
    rooms: DashMap<String, HashMap<String, Subscriber>>,
}

impl RelayRooms {
    pub fn new() -> Self {
        Self {
            rooms: DashMap::new(),
        }
    }

    /// Registers a subscriber, displacing any older connection holding the
    /// same uid key. A re-subscribe from the same connection is a refresh,
    /// not a displacement. Returns true when a displacement happened.
    pub fn subscribe(&self, room_id: &str, uid_key: &str, subscriber: Subscriber) -> bool {
        let conn_id = subscriber.conn_id;
        let mut subs = self.rooms.entry(room_id.to_string()).or_default();
        match subs.insert(uid_key.to_string(), subscriber) {
            Some(old) if old.conn_id != conn_id => {
                let _ = old.sender.send(Outbound::Replaced);
                true
            }
            _ => false,
        }
    }

    /// Removes a subscription, but only if it still belongs to the given
    /// connection; a displaced connection must not evict its replacement.
    pub fn unsubscribe(&self, room_id: &str, uid_key: &str, conn_id: Uuid) {
        if let Some(mut subs) = self.rooms.get_mut(room_id) {
            if subs.get(uid_key).map(|s| s.conn_id) == Some(conn_id) {
                subs.remove(uid_key);
            }
        }
        self.rooms.remove_if(room_id, |_, subs| subs.is_empty());
    }

    pub fn touch(&self, room_id: &str, uid_key: &str) {
        if let Some(mut subs) = self.rooms.get_mut(room_id) {
            if let Some(sub) = subs.get_mut(uid_key) {
                sub.last_activity = Instant::now();
            }
        }
    }

    /// Delivers to every subscriber of the room; returns how many accepted.
    pub fn broadcast(&self, room_id: &str, message: &RelayServerMessage) -> usize {
        self.broadcast_inner(room_id, None, message)
    }

    /// Delivers to every subscriber except the named uid key.
    pub fn broadcast_except(
        &self,
        room_id: &str,
        except_uid_key: &str,
        message: &RelayServerMessage,
    ) -> usize {
        self.broadcast_inner(room_id, Some(except_uid_key), message)
    }

    fn broadcast_inner(
        &self,
        room_id: &str,
        except: Option<&str>,
        message: &RelayServerMessage,
    ) -> usize {
        let Some(subs) = self.rooms.get(room_id) else {
            return 0;
        };
        subs.iter()
            .filter(|(uid_key, _)| except != Some(uid_key.as_str()))
            .filter(|(_, sub)| sub.send(message.clone()))
            .count()
    }

    /// Drops subscribers idle past the heartbeat window and forgets rooms
    /// that lost their last subscriber.
    pub fn sweep(&self, idle: Duration) {
        for mut entry in self.rooms.iter_mut() {
            let room_id = entry.key().clone();
            entry.value_mut().retain(|uid_key, sub| {
                let keep = sub.last_activity.elapsed() <= idle;
                if !keep {
                    tracing::info!(%room_id, uid_key, "dropping idle relay subscriber");
                }
                keep
            });
        }
        self.rooms.retain(|_, subs| !subs.is_empty());
    }

    pub fn subscriber_count(&self, room_id: &str) -> usize {
        self.rooms.get(room_id).map(|subs| subs.len()).unwrap_or(0)
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}

impl Default for RelayRooms {
    fn default() -> Self {
        Self::new()
    }
}
