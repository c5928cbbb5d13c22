use std::time::Duration;

use rand::Rng;
use sea_orm::{ActiveValue::Set, DatabaseConnection, DbErr, EntityTrait, TransactionTrait};

use crate::entities::{prelude::*, rooms};
use game_types::{GameError, Room, RoomStatus};

/// Retry shape for transient storage failures inside `mutate`.
const RETRY_ATTEMPTS: u32 = 3;
const RETRY_BASE_MS: u64 = 80;
const RETRY_JITTER_MS: u64 = 40;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("room not found")]
    NotFound,
    #[error("room id already exists")]
    Conflict,
    #[error("stored room is corrupt: {0}")]
    Corrupt(String),
    #[error(transparent)]
    Db(#[from] DbErr),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Corrupt(err.to_string())
    }
}

impl StoreError {
    /// Lock contention and dropped connections are worth retrying; logical
    /// failures are not.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Db(err) => {
                let msg = err.to_string().to_lowercase();
                msg.contains("locked")
                    || msg.contains("busy")
                    || msg.contains("timed out")
                    || msg.contains("connection")
            }
            _ => false,
        }
    }
}

/// Either a storage failure or a rule rejection raised by the mutation
/// closure. Rule rejections pass through `mutate` untouched and are never
/// retried.
#[derive(Debug, thiserror::Error)]
pub enum TxnError {
    #[error(transparent)]
    Store(StoreError),
    #[error(transparent)]
    Game(GameError),
}

impl From<StoreError> for TxnError {
    fn from(err: StoreError) -> Self {
        TxnError::Store(err)
    }
}

impl From<GameError> for TxnError {
    fn from(err: GameError) -> Self {
        TxnError::Game(err)
    }
}

impl From<DbErr> for TxnError {
    fn from(err: DbErr) -> Self {
        TxnError::Store(StoreError::Db(err))
    }
}

impl From<serde_json::Error> for TxnError {
    fn from(err: serde_json::Error) -> Self {
        TxnError::Store(err.into())
    }
}

/// What a mutation closure decided to do with the row.
#[derive(Debug, Clone, PartialEq)]
pub enum RoomWrite {
    Update(Box<Room>),
    Delete,
    Keep,
}

pub struct RoomRepository {
    db: DatabaseConnection,
}

impl RoomRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    fn model_to_room(model: rooms::Model) -> Result<Room, StoreError> {
        let status = match model.status.as_str() {
            "waiting" => RoomStatus::Waiting,
            "playing" => RoomStatus::Playing,
            other => return Err(StoreError::Corrupt(format!("unknown status '{}'", other))),
        };
        Ok(Room {
            room_id: model.room_id,
            owner_uid: model.owner_uid,
            owner_client_id: model.owner_client_id,
            status,
            seats: serde_json::from_str(&model.seats)?,
            game_state: model
                .game_state
                .as_deref()
                .map(serde_json::from_str)
                .transpose()?,
            game_version: model.game_version,
            game_result: model
                .game_result
                .as_deref()
                .map(serde_json::from_str)
                .transpose()?,
            created_at: model.created_at.to_rfc3339(),
            updated_at: model.updated_at.to_rfc3339(),
        })
    }

    fn room_to_active_model(room: &Room) -> Result<rooms::ActiveModel, StoreError> {
        let status = match room.status {
            RoomStatus::Waiting => "waiting",
            RoomStatus::Playing => "playing",
        };
        let parse_ts = |raw: &str| {
            chrono::DateTime::parse_from_rfc3339(raw)
                .unwrap_or_else(|_| chrono::Utc::now().into())
        };
        Ok(rooms::ActiveModel {
            room_id: Set(room.room_id.clone()),
            owner_uid: Set(room.owner_uid.clone()),
            owner_client_id: Set(room.owner_client_id.clone()),
            status: Set(status.to_string()),
            seats: Set(serde_json::to_string(&room.seats)?),
            game_state: Set(room
                .game_state
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?),
            game_version: Set(room.game_version),
            game_result: Set(room
                .game_result
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?),
            created_at: Set(parse_ts(&room.created_at)),
            updated_at: Set(parse_ts(&room.updated_at)),
        })
    }

    pub async fn insert(&self, room: &Room) -> Result<(), StoreError> {
        let model = Self::room_to_active_model(room)?;
        match Rooms::insert(model).exec(&self.db).await {
            Ok(_) => Ok(()),
            Err(err) if err.to_string().to_uppercase().contains("UNIQUE") => {
                Err(StoreError::Conflict)
            }
            Err(err) => Err(StoreError::Db(err)),
        }
    }

    pub async fn fetch(&self, room_id: &str) -> Result<Option<Room>, StoreError> {
        let model = Rooms::find_by_id(room_id).one(&self.db).await?;
        model.map(Self::model_to_room).transpose()
    }

    pub async fn delete(&self, room_id: &str) -> Result<(), StoreError> {
        Rooms::delete_by_id(room_id).exec(&self.db).await?;
        Ok(())
    }

    /// Read-modify-write in one transaction. The closure sees the decoded
    /// room and returns what to write plus a value for the caller; rule
    /// rejections abort the transaction without touching the row. Transient
    /// storage failures are retried with jittered exponential backoff.
    pub async fn mutate<T, F>(&self, room_id: &str, f: F) -> Result<T, TxnError>
    where
        T: Send,
        F: Fn(Room) -> Result<(RoomWrite, T), GameError> + Send + Sync,
    {
        let mut attempt = 0;
        loop {
            match self.try_mutate(room_id, &f).await {
                Err(TxnError::Store(err))
                    if err.is_transient() && attempt + 1 < RETRY_ATTEMPTS =>
                {
                    let jitter = rand::thread_rng().gen_range(0..RETRY_JITTER_MS);
                    let delay = RETRY_BASE_MS * (1 << attempt) + jitter;
                    tracing::warn!(room_id, attempt, %err, "retrying room mutation");
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    // An uncommitted transaction rolls back when dropped, so every early
    // return below leaves the row untouched.
    async fn try_mutate<T, F>(&self, room_id: &str, f: &F) -> Result<T, TxnError>
    where
        T: Send,
        F: Fn(Room) -> Result<(RoomWrite, T), GameError> + Send + Sync,
    {
        let txn = self.db.begin().await?;
        let model = Rooms::find_by_id(room_id)
            .one(&txn)
            .await?
            .ok_or(StoreError::NotFound)?;
        let room = Self::model_to_room(model)?;

        let (write, out) = f(room)?;
        match write {
            RoomWrite::Update(room) => {
                let model = Self::room_to_active_model(&room)?;
                Rooms::update(model).exec(&txn).await?;
            }
            RoomWrite::Delete => {
                Rooms::delete_by_id(room_id).exec(&txn).await?;
            }
            RoomWrite::Keep => {}
        }
        txn.commit().await?;
        Ok(out)
    }
}
