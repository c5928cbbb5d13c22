use sea_orm::entity::prelude::*;

/// Row mirror of the `rooms` table. Seats, game state and game result are
/// stored as JSON text and decoded at the repository boundary.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "rooms")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub room_id: String,
    pub owner_uid: String,
    pub owner_client_id: Option<String>,
    pub status: String,
    #[sea_orm(column_type = "Text")]
    pub seats: String,
    #[sea_orm(column_type = "Text", nullable)]
    pub game_state: Option<String>,
    pub game_version: i64,
    #[sea_orm(column_type = "Text", nullable)]
    pub game_result: Option<String>,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
