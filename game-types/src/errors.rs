use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Every rejection a room operation can produce, engine and session alike.
/// Each maps to a stable wire code so clients can branch without parsing
/// the human-readable message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GameError {
    #[error("caller identity missing or invalid")]
    Unauthorized,
    #[error("identity does not match the seat")]
    Forbidden,
    #[error("{0}")]
    BadRequest(String),
    #[error("room does not exist")]
    RoomNotFound,
    #[error("both seats are taken")]
    RoomFull,
    #[error("room is not accepting joins")]
    RoomNotWaiting,
    #[error("room has not started playing")]
    RoomNotPlaying,
    #[error("game state not initialized")]
    GameNotStarted,
    #[error("both players must be seated and online")]
    PlayerNotReady,
    #[error("caller holds no seat in this room")]
    NotInRoom,
    #[error("it is not your turn")]
    TurnNotYours,
    #[error("action not legal in the current phase")]
    InvalidPhase,
    #[error("no rolls left this turn")]
    RollsExhausted,
    #[error("that category is already used")]
    CategoryAlreadyUsed,
    #[error("could not allocate an unused room code")]
    RoomIdConflict,
    #[error("internal error: {0}")]
    Internal(String),
}

impl GameError {
    pub fn code(&self) -> &'static str {
        match self {
            GameError::Unauthorized => "UNAUTHORIZED",
            GameError::Forbidden => "FORBIDDEN",
            GameError::BadRequest(_) => "BAD_REQUEST",
            GameError::RoomNotFound => "ROOM_NOT_FOUND",
            GameError::RoomFull => "ROOM_FULL",
            GameError::RoomNotWaiting => "ROOM_NOT_WAITING",
            GameError::RoomNotPlaying => "ROOM_NOT_PLAYING",
            GameError::GameNotStarted => "GAME_NOT_STARTED",
            GameError::PlayerNotReady => "PLAYER_NOT_READY",
            GameError::NotInRoom => "NOT_IN_ROOM",
            GameError::TurnNotYours => "TURN_NOT_YOURS",
            GameError::InvalidPhase => "INVALID_PHASE",
            GameError::RollsExhausted => "ROLLS_EXHAUSTED",
            GameError::CategoryAlreadyUsed => "CATEGORY_USED",
            GameError::RoomIdConflict => "ROOM_ID_CONFLICT",
            GameError::Internal(_) => "INTERNAL",
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        GameError::BadRequest(message.into())
    }
}

/// Wire form of a failed gateway call: `{ok: false, code, message}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub ok: bool,
    pub code: String,
    pub message: String,
}

impl From<&GameError> for ErrorBody {
    fn from(err: &GameError) -> Self {
        Self {
            ok: false,
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(GameError::RoomNotFound.code(), "ROOM_NOT_FOUND");
        assert_eq!(GameError::TurnNotYours.code(), "TURN_NOT_YOURS");
        assert_eq!(GameError::CategoryAlreadyUsed.code(), "CATEGORY_USED");
    }

    #[test]
    fn error_body_carries_code_and_message() {
        let body = ErrorBody::from(&GameError::RollsExhausted);
        assert!(!body.ok);
        assert_eq!(body.code, "ROLLS_EXHAUSTED");
        assert!(!body.message.is_empty());
    }
}
