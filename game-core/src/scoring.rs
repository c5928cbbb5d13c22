use game_types::{
    DICE_COUNT, EXTRA_YAHTZEE_BONUS, GameResult, GameState, PlayerState, ScoreCategory, Seat,
    UPPER_BONUS_SCORE, UPPER_BONUS_THRESHOLD,
};

use crate::dice::{
    has_n_of_a_kind, is_full_house, is_large_straight, is_small_straight, is_yahtzee, sum_dice,
};

pub struct ScoringEngine;

impl ScoringEngine {
    /// The fixed scoring table: what the given dice are worth in `category`.
    pub fn score_for(dice: &[u8; DICE_COUNT], category: ScoreCategory) -> i32 {
        if let Some(face) = category.face_value() {
            return dice.iter().filter(|&&v| v == face).map(|&v| v as i32).sum();
        }
        match category {
            ScoreCategory::ThreeKind => {
                if has_n_of_a_kind(dice, 3) {
                    sum_dice(dice)
                } else {
                    0
                }
            }
            ScoreCategory::FourKind => {
                if has_n_of_a_kind(dice, 4) {
                    sum_dice(dice)
                } else {
                    0
                }
            }
            ScoreCategory::FullHouse => {
                if is_full_house(dice) {
                    25
                } else {
                    0
                }
            }
            ScoreCategory::SmallStraight => {
                if is_small_straight(dice) {
                    30
                } else {
                    0
                }
            }
            ScoreCategory::LargeStraight => {
                if is_large_straight(dice) {
                    40
                } else {
                    0
                }
            }
            ScoreCategory::Yahtzee => {
                if is_yahtzee(dice) {
                    50
                } else {
                    0
                }
            }
            ScoreCategory::Chance => sum_dice(dice),
            // upper categories handled above
            _ => 0,
        }
    }

    /// Sum of the used upper-section cells (ONE..SIX).
    pub fn upper_section_sum(player: &PlayerState) -> i32 {
        ScoreCategory::UPPER
            .iter()
            .filter_map(|cat| player.score_card.get(cat))
            .filter(|cell| cell.used)
            .filter_map(|cell| cell.score)
            .sum()
    }

    /// The upper bonus is granted exactly once, when the upper sum reaches
    /// the threshold.
    pub fn should_grant_upper_bonus(player: &PlayerState) -> bool {
        !player.upper_bonus_given && Self::upper_section_sum(player) >= UPPER_BONUS_THRESHOLD
    }

    /// A second-and-later Yahtzee grants a flat bonus on top of whatever
    /// category is chosen; only counts when the first Yahtzee actually
    /// scored 50.
    pub fn detect_extra_yahtzee(dice: &[u8; DICE_COUNT], player: &PlayerState) -> bool {
        player.yahtzee_scored_once && is_yahtzee(dice)
    }

    pub fn player_total(player: &PlayerState) -> i32 {
        let base: i32 = player
            .score_card
            .values()
            .filter(|cell| cell.used)
            .filter_map(|cell| cell.score)
            .sum();
        let upper_bonus = if player.upper_bonus_given {
            UPPER_BONUS_SCORE
        } else {
            0
        };
        base + upper_bonus + player.extra_yahtzee_bonus
    }

    /// Final ranking at GAME_END. Highest total wins; a tie reports every
    /// tied seat index instead of a winner.
    pub fn compute_result(state: &GameState, seats: &[Seat]) -> GameResult {
        let totals: Vec<i32> = state.players.iter().map(Self::player_total).collect();
        let max = totals.iter().copied().max().unwrap_or(0);
        let winners: Vec<usize> = totals
            .iter()
            .enumerate()
            .filter(|&(_, &t)| t == max)
            .map(|(idx, _)| idx)
            .collect();

        if winners.len() != 1 {
            return GameResult {
                is_tie: true,
                winner_index: None,
                winner_name: None,
                winners,
                max_score: max,
            };
        }

        let idx = winners[0];
        let name = seats
            .get(idx)
            .map(|s| s.name.clone())
            .or_else(|| state.players.get(idx).map(|p| p.name.clone()));
        GameResult {
            is_tie: false,
            winner_index: Some(idx),
            winner_name: name,
            winners: Vec::new(),
            max_score: max,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use game_types::{Phase, ScoreCell, Turn};

    fn player() -> PlayerState {
        PlayerState::new("p1", "Apple")
    }

    #[test]
    fn upper_categories_sum_matching_faces() {
        let dice = [2, 2, 2, 5, 1];
        assert_eq!(ScoringEngine::score_for(&dice, ScoreCategory::Two), 6);
        assert_eq!(ScoringEngine::score_for(&dice, ScoreCategory::Five), 5);
        assert_eq!(ScoringEngine::score_for(&dice, ScoreCategory::Six), 0);
    }

    #[test]
    fn n_of_a_kind_scores_all_dice_or_zero() {
        let dice = [2, 2, 2, 5, 1];
        assert_eq!(ScoringEngine::score_for(&dice, ScoreCategory::ThreeKind), 12);
        assert_eq!(ScoringEngine::score_for(&dice, ScoreCategory::FourKind), 0);
        // no 2+3 split present
        assert_eq!(ScoringEngine::score_for(&dice, ScoreCategory::FullHouse), 0);
    }

    #[test]
    fn straights_score_fixed_values() {
        let dice = [1, 2, 3, 4, 5];
        assert_eq!(
            ScoringEngine::score_for(&dice, ScoreCategory::SmallStraight),
            30
        );
        assert_eq!(
            ScoringEngine::score_for(&dice, ScoreCategory::LargeStraight),
            40
        );
    }

    #[test]
    fn yahtzee_and_chance() {
        assert_eq!(
            ScoringEngine::score_for(&[3, 3, 3, 3, 3], ScoreCategory::Yahtzee),
            50
        );
        assert_eq!(
            ScoringEngine::score_for(&[3, 3, 3, 3, 4], ScoreCategory::Yahtzee),
            0
        );
        assert_eq!(
            ScoringEngine::score_for(&[3, 3, 3, 3, 4], ScoreCategory::Chance),
            16
        );
    }

    #[test]
    fn upper_bonus_requires_threshold_and_grants_once() {
        let mut p = player();
        for cat in ScoreCategory::UPPER {
            let face = cat.face_value().unwrap() as i32;
            p.score_card.insert(
                cat,
                ScoreCell {
                    used: true,
                    score: Some(face * 3),
                },
            );
        }
        // 3 of each face: 3+6+9+12+15+18 = 63
        assert_eq!(ScoringEngine::upper_section_sum(&p), 63);
        assert!(ScoringEngine::should_grant_upper_bonus(&p));

        p.upper_bonus_given = true;
        assert!(!ScoringEngine::should_grant_upper_bonus(&p));
        assert_eq!(ScoringEngine::player_total(&p), 63 + UPPER_BONUS_SCORE);
    }

    #[test]
    fn extra_yahtzee_needs_prior_scored_yahtzee() {
        let mut p = player();
        let dice = [6, 6, 6, 6, 6];
        assert!(!ScoringEngine::detect_extra_yahtzee(&dice, &p));
        p.yahtzee_scored_once = true;
        assert!(ScoringEngine::detect_extra_yahtzee(&dice, &p));
        assert!(!ScoringEngine::detect_extra_yahtzee(&[6, 6, 6, 6, 5], &p));
    }

    #[test]
    fn total_includes_extra_yahtzee_bonus() {
        let mut p = player();
        p.score_card.insert(
            ScoreCategory::Yahtzee,
            ScoreCell {
                used: true,
                score: Some(50),
            },
        );
        p.extra_yahtzee_bonus = EXTRA_YAHTZEE_BONUS * 2;
        assert_eq!(ScoringEngine::player_total(&p), 50 + 200);
    }

    #[test]
    fn result_reports_winner_or_tie_set() {
        let mut a = PlayerState::new("p1", "Apple");
        let mut b = PlayerState::new("p2", "Banana");
        a.score_card.insert(
            ScoreCategory::Chance,
            ScoreCell {
                used: true,
                score: Some(20),
            },
        );
        b.score_card.insert(
            ScoreCategory::Chance,
            ScoreCell {
                used: true,
                score: Some(12),
            },
        );

        let state = GameState {
            game_id: "g".into(),
            players: vec![a.clone(), b.clone()],
            current_player_index: 0,
            first_player_index: 0,
            round: 13,
            phase: Phase::GameEnd,
            turn: Turn::zero(),
        };
        let seats = vec![
            Seat {
                uid: Some("u1".into()),
                client_id: None,
                name: "Apple".into(),
                online: true,
                joined_at: None,
            },
            Seat {
                uid: Some("u2".into()),
                client_id: None,
                name: "Banana".into(),
                online: true,
                joined_at: None,
            },
        ];

        let result = ScoringEngine::compute_result(&state, &seats);
        assert!(!result.is_tie);
        assert_eq!(result.winner_index, Some(0));
        assert_eq!(result.winner_name.as_deref(), Some("Apple"));
        assert_eq!(result.max_score, 20);

        // equal totals tie
        b.score_card.insert(
            ScoreCategory::Chance,
            ScoreCell {
                used: true,
                score: Some(20),
            },
        );
        let tied = GameState {
            players: vec![a, b],
            ..state
        };
        let result = ScoringEngine::compute_result(&tied, &seats);
        assert!(result.is_tie);
        assert_eq!(result.winners, vec![0, 1]);
        assert_eq!(result.winner_index, None);
    }
}
