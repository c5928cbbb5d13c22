use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const DICE_COUNT: usize = 5;
pub const MAX_ROLLS_PER_TURN: u8 = 3;
pub const TOTAL_ROUNDS: u8 = 13;
pub const UPPER_BONUS_THRESHOLD: i32 = 63;
pub const UPPER_BONUS_SCORE: i32 = 35;
pub const EXTRA_YAHTZEE_BONUS: i32 = 100;

/// The 13 scorecard categories, in scorecard order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScoreCategory {
    One,
    Two,
    Three,
    Four,
    Five,
    Six,
    ThreeKind,
    FourKind,
    FullHouse,
    SmallStraight,
    LargeStraight,
    Yahtzee,
    Chance,
}

impl ScoreCategory {
    pub const ALL: [ScoreCategory; 13] = [
        ScoreCategory::One,
        ScoreCategory::Two,
        ScoreCategory::Three,
        ScoreCategory::Four,
        ScoreCategory::Five,
        ScoreCategory::Six,
        ScoreCategory::ThreeKind,
        ScoreCategory::FourKind,
        ScoreCategory::FullHouse,
        ScoreCategory::SmallStraight,
        ScoreCategory::LargeStraight,
        ScoreCategory::Yahtzee,
        ScoreCategory::Chance,
    ];

    pub const UPPER: [ScoreCategory; 6] = [
        ScoreCategory::One,
        ScoreCategory::Two,
        ScoreCategory::Three,
        ScoreCategory::Four,
        ScoreCategory::Five,
        ScoreCategory::Six,
    ];

    /// Face value for the upper-section categories, None for the lower ones.
    pub fn face_value(&self) -> Option<u8> {
        match self {
            ScoreCategory::One => Some(1),
            ScoreCategory::Two => Some(2),
            ScoreCategory::Three => Some(3),
            ScoreCategory::Four => Some(4),
            ScoreCategory::Five => Some(5),
            ScoreCategory::Six => Some(6),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    #[serde(rename = "ROLLING")]
    Rolling,
    #[serde(rename = "SELECT_SCORE")]
    SelectScore,
    #[serde(rename = "GAME_END")]
    GameEnd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreCell {
    pub used: bool,
    pub score: Option<i32>,
}

impl ScoreCell {
    pub fn empty() -> Self {
        Self {
            used: false,
            score: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerState {
    pub id: String,
    pub name: String,
    pub score_card: BTreeMap<ScoreCategory, ScoreCell>,
    pub upper_bonus_given: bool,
    pub yahtzee_scored_once: bool,
    pub extra_yahtzee_bonus: i32,
}

impl PlayerState {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        let score_card = ScoreCategory::ALL
            .iter()
            .map(|cat| (*cat, ScoreCell::empty()))
            .collect();
        Self {
            id: id.into(),
            name: name.into(),
            score_card,
            upper_bonus_given: false,
            yahtzee_scored_once: false,
            extra_yahtzee_bonus: 0,
        }
    }

    pub fn all_categories_used(&self) -> bool {
        self.score_card.values().all(|cell| cell.used)
    }
}

/// The current player's in-progress roll/hold/score cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Turn {
    pub roll_count: u8,
    /// 0 = not yet rolled, otherwise 1..=6.
    pub dice: [u8; DICE_COUNT],
    pub held: [bool; DICE_COUNT],
    /// Snapshot taken when entering SELECT_SCORE so a cancel can restore it.
    pub prev_held: Option<[bool; DICE_COUNT]>,
    pub is_extra_yahtzee: bool,
    pub last_roll_at: Option<i64>,
}

impl Turn {
    pub fn zero() -> Self {
        Self {
            roll_count: 0,
            dice: [0; DICE_COUNT],
            held: [false; DICE_COUNT],
            prev_held: None,
            is_extra_yahtzee: false,
            last_roll_at: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameState {
    pub game_id: String,
    pub players: Vec<PlayerState>,
    pub current_player_index: usize,
    pub first_player_index: usize,
    pub round: u8,
    pub phase: Phase,
    pub turn: Turn,
}

impl GameState {
    pub fn current_player(&self) -> &PlayerState {
        &self.players[self.current_player_index]
    }

    pub fn all_used(&self) -> bool {
        self.players.iter().all(|p| p.all_categories_used())
    }
}

/// A player action routed through the gateway, tagged exactly as it appears
/// on the wire: `{"action": "TOGGLE_HOLD", "index": 2}` and so on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action")]
pub enum GameAction {
    #[serde(rename = "ROLL")]
    Roll,
    #[serde(rename = "TOGGLE_HOLD")]
    ToggleHold { index: usize },
    #[serde(rename = "TOGGLE_HOLD_BATCH")]
    ToggleHoldBatch { indices: Vec<usize> },
    #[serde(rename = "SET_HOLD")]
    SetHold { index: usize, held: bool },
    #[serde(rename = "SET_HOLD_BATCH")]
    SetHoldBatch { held: Vec<bool> },
    #[serde(rename = "STOP")]
    Stop,
    #[serde(rename = "ENTER_SCORE")]
    EnterScoreSelection,
    #[serde(rename = "CANCEL_SCORE")]
    CancelScoreSelection,
    #[serde(rename = "APPLY_SCORE")]
    ApplyScore { key: ScoreCategory },
}

impl GameAction {
    /// Wire name for logs and peer hints.
    pub fn name(&self) -> &'static str {
        match self {
            GameAction::Roll => "ROLL",
            GameAction::ToggleHold { .. } => "TOGGLE_HOLD",
            GameAction::ToggleHoldBatch { .. } => "TOGGLE_HOLD_BATCH",
            GameAction::SetHold { .. } => "SET_HOLD",
            GameAction::SetHoldBatch { .. } => "SET_HOLD_BATCH",
            GameAction::Stop => "STOP",
            GameAction::EnterScoreSelection => "ENTER_SCORE",
            GameAction::CancelScoreSelection => "CANCEL_SCORE",
            GameAction::ApplyScore { .. } => "APPLY_SCORE",
        }
    }
}

/// Final ranking persisted when a game reaches GAME_END. Ties are reported
/// as the full set of tied seat indices rather than a winner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameResult {
    pub is_tie: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winner_index: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winner_name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub winners: Vec<usize>,
    pub max_score: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn score_category_wire_names() {
        let json = serde_json::to_string(&ScoreCategory::ThreeKind).unwrap();
        assert_eq!(json, "\"THREE_KIND\"");
        let back: ScoreCategory = serde_json::from_str("\"SMALL_STRAIGHT\"").unwrap();
        assert_eq!(back, ScoreCategory::SmallStraight);
    }

    #[test]
    fn action_wire_shape() {
        let action = GameAction::ToggleHold { index: 2 };
        let json = serde_json::to_value(&action).unwrap();
        assert_eq!(json["action"], "TOGGLE_HOLD");
        assert_eq!(json["index"], 2);

        let parsed: GameAction =
            serde_json::from_str(r#"{"action":"APPLY_SCORE","key":"YAHTZEE"}"#).unwrap();
        assert_eq!(
            parsed,
            GameAction::ApplyScore {
                key: ScoreCategory::Yahtzee
            }
        );
    }

    #[test]
    fn fresh_player_has_thirteen_open_categories() {
        let player = PlayerState::new("p1", "Apple");
        assert_eq!(player.score_card.len(), 13);
        assert!(!player.all_categories_used());
    }

    #[test]
    fn phase_serializes_screaming() {
        assert_eq!(
            serde_json::to_string(&Phase::SelectScore).unwrap(),
            "\"SELECT_SCORE\""
        );
    }
}
