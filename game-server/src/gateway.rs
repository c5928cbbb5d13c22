use std::sync::Arc;

use crate::outbox::Outbox;
use crate::session::{now_ms, now_rfc3339, to_game_error};
use game_core::{ScoringEngine, ThreadRngDice};
use game_persistence::{RoomRepository, RoomWrite};
use game_types::{
    GameAction, GameError, GameState, NotifyRequest, Phase, Room, RoomPatch, RoomReply,
    RoomStatus, SelfInfo, TurnPatch, normalize_client_id, normalize_room_id,
};

/// The authoritative write path for in-game actions, plus the state pull
/// clients reconcile against.
pub struct ActionGateway {
    repo: Arc<RoomRepository>,
    outbox: Outbox,
}

impl ActionGateway {
    pub fn new(repo: Arc<RoomRepository>, outbox: Outbox) -> Self {
        Self { repo, outbox }
    }

    pub async fn perform_action(
        &self,
        room_id: &str,
        uid: &str,
        client_id: &str,
        action: &GameAction,
        debug: bool,
    ) -> Result<RoomReply, GameError> {
        let room_id = normalize_room_id(room_id);
        if room_id.is_empty() {
            return Err(GameError::bad_request("roomId is required"));
        }
        let Some(client_id) = normalize_client_id(client_id) else {
            return Err(GameError::bad_request("clientId is required"));
        };

        let (room, seat_index, next_state) = self
            .repo
            .mutate(&room_id, |mut room: Room| {
                if room.status != RoomStatus::Playing {
                    return Err(GameError::RoomNotPlaying);
                }
                let Some(state) = room.game_state.as_ref() else {
                    return Err(GameError::GameNotStarted);
                };

                let Some(seat_index) = room.find_seat(uid, Some(client_id.as_str())) else {
                    return Err(GameError::NotInRoom);
                };
                if room.seats[seat_index].uid.as_deref() != Some(uid) {
                    return Err(GameError::Forbidden);
                }
                if state.current_player_index != seat_index {
                    return Err(GameError::TurnNotYours);
                }

                let mut dice = ThreadRngDice;
                let next_state = game_core::reduce(state, action, &mut dice, now_ms())?;

                // The acting device is live and, outside debug dual-seat
                // testing, owns the seat's clientId from here on.
                let seat = &mut room.seats[seat_index];
                if !debug {
                    seat.client_id = Some(client_id.clone());
                } else if seat.client_id.is_none() {
                    seat.client_id = Some(client_id.clone());
                }
                seat.online = true;

                if next_state.phase == Phase::GameEnd {
                    room.game_result =
                        Some(ScoringEngine::compute_result(&next_state, &room.seats));
                }
                room.game_state = Some(next_state.clone());
                room.game_version += 1;
                room.updated_at = now_rfc3339();
                Ok((
                    RoomWrite::Update(Box::new(room.clone())),
                    (room, seat_index, next_state),
                ))
            })
            .await
            .map_err(to_game_error)?;

        self.outbox.publish(NotifyRequest {
            room_id: room_id.clone(),
            version: Some(room.game_version),
            updated_at: Some(now_ms()),
            action: Some(action.name().to_string()),
            actor_seat_index: Some(seat_index),
            patch: Some(state_patch(&next_state)),
            state: serde_json::to_value(&next_state).ok(),
            token: None,
        });

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

    /// Plain read used for reconnection and poll reconciliation. Callers
    /// without a seat still get the room, with seatIndex −1.
    pub async fn get_room_state(
        &self,
        room_id: &str,
        uid: &str,
        client_id: Option<&str>,
    ) -> Result<RoomReply, GameError> {
        let room_id = normalize_room_id(room_id);
        if room_id.is_empty() {
            return Err(GameError::bad_request("roomId is required"));
        }
        let client_id = client_id.and_then(normalize_client_id);

        let room = self
            .repo
            .fetch(&room_id)
            .await
            .map_err(|e| GameError::Internal(e.to_string()))?
            .ok_or(GameError::RoomNotFound)?;

        let seat_index = room
            .find_seat(uid, client_id.as_deref())
            .map(|idx| idx as i32)
            .unwrap_or(-1);
        Ok(RoomReply {
            ok: true,
            room_id,
            room,
            self_info: SelfInfo {
                seat_index,
                is_owner: seat_index == 0,
            },
        })
    }
}

/// Minimal delta for subscribers who only need to animate the turn.
fn state_patch(state: &GameState) -> RoomPatch {
    RoomPatch {
        phase: state.phase,
        current_player_index: state.current_player_index,
        turn: Some(TurnPatch {
            held: Some(state.turn.held.to_vec()),
            roll_count: Some(state.turn.roll_count),
            last_roll_at: state.turn.last_roll_at,
        }),
    }
}
