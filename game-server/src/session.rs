use std::sync::Arc;

use rand::Rng;

use crate::outbox::Outbox;
use game_persistence::{RoomRepository, RoomWrite, StoreError, TxnError};
use game_types::{
    GameError, LeaveAction, LeaveReply, NotifyRequest, Room, RoomReply, RoomStatus, SEAT_COUNT,
    Seat, SelfInfo, normalize_client_id, normalize_room_id, ROOM_CODE_ALPHABET, ROOM_CODE_LEN,
};

/// How many candidate codes `create_room` probes before giving up and
/// telling the caller to retry.
const CREATE_CODE_ATTEMPTS: usize = 6;

/// Display names handed to claimed seats, skipping names already in use in
/// the room.
const FRUIT_NAMES: &[&str] = &[
    "Apple",
    "Banana",
    "Orange",
    "Grape",
    "Strawberry",
    "Mango",
    "Pineapple",
    "Watermelon",
    "Cherry",
    "Pear",
    "Pomelo",
    "Dragonfruit",
    "Kiwi",
    "Blueberry",
];

pub(crate) fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

pub(crate) fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

pub(crate) fn to_game_error(err: TxnError) -> GameError {
    match err {
        TxnError::Game(e) => e,
        TxnError::Store(StoreError::NotFound) => GameError::RoomNotFound,
        TxnError::Store(e) => GameError::Internal(e.to_string()),
    }
}

fn random_room_code() -> String {
    let mut rng = rand::thread_rng();
    (0..ROOM_CODE_LEN)
        .map(|_| ROOM_CODE_ALPHABET[rng.gen_range(0..ROOM_CODE_ALPHABET.len())] as char)
        .collect()
}

fn random_fruit_name(taken: &[String]) -> String {
    let candidates: Vec<&&str> = FRUIT_NAMES
        .iter()
        .filter(|name| !taken.iter().any(|t| t == *name))
        .collect();
    let pool: Vec<&&str> = if candidates.is_empty() {
        FRUIT_NAMES.iter().collect()
    } else {
        candidates
    };
    let mut rng = rand::thread_rng();
    pool[rng.gen_range(0..pool.len())].to_string()
}

fn taken_names(seats: &[Seat]) -> Vec<String> {
    seats
        .iter()
        .filter(|s| !s.is_empty())
        .map(|s| s.name.clone())
        .collect()
}

/// Room lifecycle: create, join, leave, start. Every operation commits
/// through one repository transaction and then fires a room-changed notice
/// that cannot fail the call.
pub struct RoomSessionManager {
    repo: Arc<RoomRepository>,
    outbox: Outbox,
}

impl RoomSessionManager {
    pub fn new(repo: Arc<RoomRepository>, outbox: Outbox) -> Self {
        Self { repo, outbox }
    }

    fn notify(&self, room_id: &str) {
        self.outbox.publish(NotifyRequest {
            room_id: room_id.to_string(),
            updated_at: Some(now_ms()),
            ..Default::default()
        });
    }

    pub async fn create_room(
        &self,
        uid: &str,
        client_id: Option<&str>,
    ) -> Result<RoomReply, GameError> {
        let client_id = client_id.and_then(normalize_client_id);
        let now = now_rfc3339();

        for _ in 0..CREATE_CODE_ATTEMPTS {
            let room_id = random_room_code();
            let mut seats: Vec<Seat> = (0..SEAT_COUNT).map(Seat::empty).collect();
            seats[0] = Seat {
                uid: Some(uid.to_string()),
                client_id: client_id.clone(),
                name: random_fruit_name(&[]),
                online: true,
                joined_at: Some(now.clone()),
            };
            let room = Room {
                room_id: room_id.clone(),
                owner_uid: uid.to_string(),
                owner_client_id: client_id.clone(),
                status: RoomStatus::Waiting,
                seats,
                game_state: None,
                game_version: 0,
                game_result: None,
                created_at: now.clone(),
                updated_at: now.clone(),
            };
            match self.repo.insert(&room).await {
                Ok(()) => {
                    tracing::info!(%room_id, uid, "room created");
                    self.notify(&room_id);
                    return Ok(RoomReply {
                        ok: true,
                        room_id,
                        room,
                        self_info: SelfInfo {
                            seat_index: 0,
                            is_owner: true,
                        },
                    });
                }
                Err(StoreError::Conflict) => continue,
                Err(e) => return Err(GameError::Internal(e.to_string())),
            }
        }
        Err(GameError::RoomIdConflict)
    }

    pub async fn join_room(
        &self,
        room_id: &str,
        uid: &str,
        client_id: Option<&str>,
        debug: bool,
    ) -> Result<RoomReply, GameError> {
        let room_id = normalize_room_id(room_id);
        if room_id.is_empty() {
            return Err(GameError::bad_request("roomId is required"));
        }
        let client_id = client_id.and_then(normalize_client_id);

        let (room, seat_index) = self
            .repo
            .mutate(&room_id, |mut room: Room| {
                let now = now_rfc3339();
                let seat_index = join_seats(&mut room, uid, client_id.as_deref(), debug)?;
                room.updated_at = now;
                Ok((RoomWrite::Update(Box::new(room.clone())), (room, seat_index)))
            })
            .await
            .map_err(to_game_error)?;

        self.notify(&room_id);
        Ok(RoomReply {
            ok: true,
            room_id,
            room,
            self_info: SelfInfo {
                seat_index: seat_index as i32,
                is_owner: seat_index == 0,
            },
        })
    }

    pub async fn leave_room(
        &self,
        room_id: &str,
        uid: &str,
        client_id: Option<&str>,
        exit: bool,
    ) -> Result<LeaveReply, GameError> {
        let room_id = normalize_room_id(room_id);
        if room_id.is_empty() {
            return Err(GameError::bad_request("roomId is required"));
        }
        let client_id = client_id.and_then(normalize_client_id);

        let (action, room, seat_index) = self
            .repo
            .mutate(&room_id, |mut room: Room| {
                let Some(seat_index) = room.find_seat(uid, client_id.as_deref()) else {
                    // Leaving a room you are not in is not an error.
                    return Ok((RoomWrite::Keep, (LeaveAction::Noop, Some(room), -1)));
                };
                let seat = &room.seats[seat_index];
                if seat.uid.as_deref().is_some_and(|u| u != uid) {
                    return Err(GameError::Forbidden);
                }

                let is_owner_seat = seat_index == 0 && room.owner_uid == uid;
                if is_owner_seat && exit {
                    return Ok((RoomWrite::Delete, (LeaveAction::Removed, None, 0)));
                }

                if !room.seats[seat_index].is_empty() {
                    if exit {
                        room.seats[seat_index] = Seat::empty(seat_index);
                    } else {
                        room.seats[seat_index].online = false;
                    }
                }
                room.updated_at = now_rfc3339();
                Ok((
                    RoomWrite::Update(Box::new(room.clone())),
                    (LeaveAction::Offline, Some(room), seat_index as i32),
                ))
            })
            .await
            .map_err(to_game_error)?;

        self.notify(&room_id);
        Ok(LeaveReply {
            ok: true,
            room_id,
            action,
            seat_index,
            room,
        })
    }

    /// Start is authorized by device: the caller's clientId must hold
    /// seat 0.
    pub async fn start_game(&self, room_id: &str, client_id: &str) -> Result<RoomReply, GameError> {
        let room_id = normalize_room_id(room_id);
        if room_id.is_empty() {
            return Err(GameError::bad_request("roomId is required"));
        }
        let Some(client_id) = normalize_client_id(client_id) else {
            return Err(GameError::bad_request("clientId is required"));
        };

        let (room, seat_index) = self
            .repo
            .mutate(&room_id, |mut room: Room| {
                // Only the owner's device may start.
                let seat_index = room
                    .seats
                    .iter()
                    .position(|s| s.client_id.as_deref() == Some(client_id.as_str()));
                if seat_index != Some(0) {
                    return Err(GameError::Forbidden);
                }
                if room.status != RoomStatus::Waiting {
                    return Err(GameError::RoomNotWaiting);
                }
                let both_ready = room.seats.len() == SEAT_COUNT
                    && room.seats.iter().all(|s| s.uid.is_some() && s.online);
                if !both_ready {
                    return Err(GameError::PlayerNotReady);
                }

                room.game_state = Some(game_core::new_game(&room.room_id, &room.seats, now_ms()));
                room.status = RoomStatus::Playing;
                room.game_version = 1;
                room.updated_at = now_rfc3339();
                Ok((RoomWrite::Update(Box::new(room.clone())), (room, 0usize)))
            })
            .await
            .map_err(to_game_error)?;

        tracing::info!(%room_id, "game started");
        self.notify(&room_id);
        Ok(RoomReply {
            ok: true,
            room_id,
            room,
            self_info: SelfInfo {
                seat_index: seat_index as i32,
                is_owner: true,
            },
        })
    }
}

/// Seat resolution and claiming for `join_room`, in precedence order:
/// exact clientId match, then (outside waiting) uid rebind, then uid
/// rebind or first-empty-seat claim. Returns the joined seat index.
fn join_seats(
    room: &mut Room,
    uid: &str,
    client_id: Option<&str>,
    debug: bool,
) -> Result<usize, GameError> {
    // Same device coming back: only flip online.
    if let Some(cid) = client_id {
        if let Some(idx) = room
            .seats
            .iter()
            .position(|s| s.client_id.as_deref() == Some(cid))
        {
            let seat = &mut room.seats[idx];
            if seat.uid.as_deref().is_some_and(|u| u != uid) {
                return Err(GameError::Forbidden);
            }
            seat.online = true;
            return Ok(idx);
        }
    }

    let uid_matches: Vec<usize> = room
        .seats
        .iter()
        .enumerate()
        .filter(|(_, s)| s.uid.as_deref() == Some(uid))
        .map(|(idx, _)| idx)
        .collect();
    let by_uid = uid_matches.first().copied();

    if room.status != RoomStatus::Waiting {
        // Mid-game rejoin from a new device.
        let Some(idx) = by_uid else {
            return Err(GameError::RoomNotWaiting);
        };
        let seat = &mut room.seats[idx];
        seat.client_id = if debug {
            seat.client_id
                .take()
                .or_else(|| client_id.map(str::to_string))
        } else {
            client_id
                .map(str::to_string)
                .or_else(|| seat.client_id.take())
        };
        seat.online = true;
        return Ok(idx);
    }

    #[cfg(feature = "debug-seat-reclaim")]
    if debug && uid_matches.len() > 1 && client_id.is_some() {
        // Dual-seat testing: the same account holds both seats, pick the
        // stale one back up instead of resolving to the first match.
        let reclaim = uid_matches.iter().copied().find(|&idx| {
            let s = &room.seats[idx];
            s.uid.is_some()
                && (s.client_id.as_deref() == client_id || !s.online || s.client_id.is_none())
        });
        if let Some(idx) = reclaim {
            let seat = &mut room.seats[idx];
            seat.client_id = client_id
                .map(str::to_string)
                .or_else(|| seat.client_id.take());
            seat.online = true;
            return Ok(idx);
        }
    }

    #[cfg(feature = "debug-seat-reclaim")]
    if debug && by_uid.is_some() {
        // Dual-seat testing: let the same account claim the empty seat.
        if let Some(idx) = room.first_empty_seat() {
            let names = taken_names(&room.seats);
            room.seats[idx] = Seat {
                uid: Some(uid.to_string()),
                client_id: client_id.map(str::to_string),
                name: random_fruit_name(&names),
                online: true,
                joined_at: Some(now_rfc3339()),
            };
            return Ok(idx);
        }
        let idx = by_uid.expect("checked above");
        let seat = &mut room.seats[idx];
        seat.client_id = seat
            .client_id
            .take()
            .or_else(|| client_id.map(str::to_string));
        seat.online = true;
        return Ok(idx);
    }

    if let Some(idx) = by_uid {
        let seat = &mut room.seats[idx];
        seat.client_id = client_id
            .map(str::to_string)
            .or_else(|| seat.client_id.take());
        seat.online = true;
        return Ok(idx);
    }

    let Some(idx) = room.first_empty_seat() else {
        return Err(GameError::RoomFull);
    };
    let names = taken_names(&room.seats);
    room.seats[idx] = Seat {
        uid: Some(uid.to_string()),
        client_id: client_id.map(str::to_string),
        name: random_fruit_name(&names),
        online: true,
        joined_at: Some(now_rfc3339()),
    };
    Ok(idx)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn waiting_room() -> Room {
        let now = now_rfc3339();
        let mut seats: Vec<Seat> = (0..SEAT_COUNT).map(Seat::empty).collect();
        seats[0] = Seat {
            uid: Some("owner".to_string()),
            client_id: Some("owner-dev".to_string()),
            name: "Apple".to_string(),
            online: true,
            joined_at: Some(now.clone()),
        };
        Room {
            room_id: "AB2C3D".to_string(),
            owner_uid: "owner".to_string(),
            owner_client_id: Some("owner-dev".to_string()),
            status: RoomStatus::Waiting,
            seats,
            game_state: None,
            game_version: 0,
            game_result: None,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    #[test]
    fn join_claims_first_empty_seat_with_fresh_name() {
        let mut room = waiting_room();
        let idx = join_seats(&mut room, "guest", Some("guest-dev"), false).unwrap();
        assert_eq!(idx, 1);
        let seat = &room.seats[1];
        assert_eq!(seat.uid.as_deref(), Some("guest"));
        assert!(seat.online);
        assert_ne!(seat.name, "Apple");
        assert!(FRUIT_NAMES.contains(&seat.name.as_str()));
    }

    #[test]
    fn join_full_room_is_rejected() {
        let mut room = waiting_room();
        join_seats(&mut room, "guest", Some("guest-dev"), false).unwrap();
        let err = join_seats(&mut room, "third", Some("third-dev"), false).unwrap_err();
        assert_eq!(err, GameError::RoomFull);
    }

    #[test]
    fn join_by_client_id_belonging_to_someone_else_is_forbidden() {
        let mut room = waiting_room();
        let err = join_seats(&mut room, "intruder", Some("owner-dev"), false).unwrap_err();
        assert_eq!(err, GameError::Forbidden);
    }

    #[test]
    fn same_device_rejoin_only_flips_online() {
        let mut room = waiting_room();
        room.seats[0].online = false;
        let idx = join_seats(&mut room, "owner", Some("owner-dev"), false).unwrap();
        assert_eq!(idx, 0);
        assert!(room.seats[0].online);
        assert_eq!(room.seats[0].name, "Apple");
    }

    #[test]
    fn playing_room_rejects_strangers_but_rebinds_known_uid() {
        let mut room = waiting_room();
        join_seats(&mut room, "guest", Some("guest-dev"), false).unwrap();
        room.status = RoomStatus::Playing;

        let err = join_seats(&mut room, "stranger", Some("new-dev"), false).unwrap_err();
        assert_eq!(err, GameError::RoomNotWaiting);

        // Known player on a replacement device.
        let idx = join_seats(&mut room, "guest", Some("guest-phone"), false).unwrap();
        assert_eq!(idx, 1);
        assert_eq!(room.seats[1].client_id.as_deref(), Some("guest-phone"));
        assert!(room.seats[1].online);
    }

    #[test]
    fn uid_rejoin_from_new_device_rebinds_client_id() {
        let mut room = waiting_room();
        let idx = join_seats(&mut room, "owner", Some("owner-tablet"), false).unwrap();
        assert_eq!(idx, 0);
        assert_eq!(room.seats[0].client_id.as_deref(), Some("owner-tablet"));
    }

    #[cfg(feature = "debug-seat-reclaim")]
    #[test]
    fn debug_join_lets_one_uid_take_both_seats() {
        let mut room = waiting_room();
        let idx = join_seats(&mut room, "owner", Some("second-dev"), true).unwrap();
        assert_eq!(idx, 1);
        assert_eq!(room.seats[1].uid.as_deref(), Some("owner"));
    }

    #[test]
    fn fruit_names_skip_taken_ones() {
        let taken: Vec<String> = FRUIT_NAMES[..13].iter().map(|s| s.to_string()).collect();
        for _ in 0..20 {
            assert_eq!(random_fruit_name(&taken), FRUIT_NAMES[13]);
        }
        // All taken falls back to the full pool rather than failing.
        let all: Vec<String> = FRUIT_NAMES.iter().map(|s| s.to_string()).collect();
        assert!(FRUIT_NAMES.contains(&random_fruit_name(&all).as_str()));
    }

    #[test]
    fn room_codes_draw_only_from_the_alphabet() {
        for _ in 0..50 {
            let code = random_room_code();
            assert_eq!(code.len(), ROOM_CODE_LEN);
            assert!(code.bytes().all(|b| ROOM_CODE_ALPHABET.contains(&b)));
        }
    }
}
