use game_types::{
    DICE_COUNT, EXTRA_YAHTZEE_BONUS, GameAction, GameError, GameState, MAX_ROLLS_PER_TURN, Phase,
    PlayerState, ScoreCell, Seat, Turn, seat_label,
};

use crate::dice::{DieSource, roll_dice};
use crate::scoring::ScoringEngine;

/// Materialize the state a freshly started room plays from: two empty
/// scorecards, seat 0 to act first, turn at its zero state.
pub fn new_game(room_id: &str, seats: &[Seat], now_ms: i64) -> GameState {
    let name_for = |idx: usize| {
        seats
            .get(idx)
            .map(|s| s.name.clone())
            .unwrap_or_else(|| seat_label(idx))
    };
    GameState {
        game_id: format!("room_{}_{}", room_id, now_ms),
        players: vec![
            PlayerState::new("p1", name_for(0)),
            PlayerState::new("p2", name_for(1)),
        ],
        current_player_index: 0,
        first_player_index: 0,
        round: 1,
        phase: Phase::Rolling,
        turn: Turn::zero(),
    }
}

/// The whole rule set as one pure reducer: a new state on success, a typed
/// rejection otherwise. Rejections never mutate; callers keep the old state.
pub fn reduce(
    state: &GameState,
    action: &GameAction,
    source: &mut dyn DieSource,
    now_ms: i64,
) -> Result<GameState, GameError> {
    match action {
        GameAction::Roll => action_roll(state, source, now_ms),
        GameAction::ToggleHold { index } => {
            let mut held = guarded_held(state)?;
            let i = check_index(*index)?;
            held[i] = !held[i];
            Ok(with_held(state, held))
        }
        GameAction::ToggleHoldBatch { indices } => {
            let mut held = guarded_held(state)?;
            let mut parity = [0u32; DICE_COUNT];
            for &i in indices {
                parity[check_index(i)?] += 1;
            }
            for i in 0..DICE_COUNT {
                if parity[i] % 2 == 1 {
                    held[i] = !held[i];
                }
            }
            Ok(with_held(state, held))
        }
        GameAction::SetHold { index, held: flag } => {
            let mut held = guarded_held(state)?;
            held[check_index(*index)?] = *flag;
            Ok(with_held(state, held))
        }
        GameAction::SetHoldBatch { held: flags } => {
            guarded_held(state)?;
            if flags.len() < DICE_COUNT {
                return Err(GameError::bad_request("held must cover all five dice"));
            }
            let mut held = [false; DICE_COUNT];
            held.copy_from_slice(&flags[..DICE_COUNT]);
            Ok(with_held(state, held))
        }
        GameAction::Stop => action_stop(state),
        GameAction::EnterScoreSelection => action_enter_score_selection(state),
        GameAction::CancelScoreSelection => action_cancel_score_selection(state),
        GameAction::ApplyScore { key } => action_apply_score(state, *key),
    }
}

fn action_roll(
    state: &GameState,
    source: &mut dyn DieSource,
    now_ms: i64,
) -> Result<GameState, GameError> {
    if state.phase != Phase::Rolling {
        return Err(GameError::InvalidPhase);
    }
    if state.turn.roll_count >= MAX_ROLLS_PER_TURN {
        return Err(GameError::RollsExhausted);
    }

    let dice = roll_dice(&state.turn.dice, &state.turn.held, source);
    let is_extra = ScoringEngine::detect_extra_yahtzee(&dice, state.current_player());

    let mut next = state.clone();
    next.turn.dice = dice;
    next.turn.roll_count += 1;
    next.turn.prev_held = None;
    next.turn.is_extra_yahtzee = is_extra;
    next.turn.last_roll_at = Some(now_ms);
    Ok(next)
}

/// Hold mutations share the same gate: mid-turn in ROLLING, after at least
/// one roll and before the cap.
fn guarded_held(state: &GameState) -> Result<[bool; DICE_COUNT], GameError> {
    if state.phase != Phase::Rolling {
        return Err(GameError::InvalidPhase);
    }
    if state.turn.roll_count < 1 {
        return Err(GameError::bad_request("roll at least once before holding"));
    }
    if state.turn.roll_count >= MAX_ROLLS_PER_TURN {
        return Err(GameError::bad_request("rolling is over for this turn"));
    }
    Ok(state.turn.held)
}

fn check_index(index: usize) -> Result<usize, GameError> {
    if index >= DICE_COUNT {
        return Err(GameError::bad_request("invalid die index"));
    }
    Ok(index)
}

fn with_held(state: &GameState, held: [bool; DICE_COUNT]) -> GameState {
    let mut next = state.clone();
    next.turn.held = held;
    next
}

fn action_stop(state: &GameState) -> Result<GameState, GameError> {
    if state.phase != Phase::Rolling {
        return Err(GameError::InvalidPhase);
    }
    if state.turn.roll_count < 1 {
        return Err(GameError::bad_request("roll at least once before stopping"));
    }
    let is_extra =
        ScoringEngine::detect_extra_yahtzee(&state.turn.dice, state.current_player());

    let mut next = state.clone();
    next.phase = Phase::SelectScore;
    next.turn.prev_held = Some(state.turn.held);
    next.turn.held = [true; DICE_COUNT];
    next.turn.is_extra_yahtzee = is_extra;
    Ok(next)
}

/// The auto path when the 3-roll cap is hit. Same transition as Stop but
/// keeps the isExtraYahtzee flag Roll already computed.
fn action_enter_score_selection(state: &GameState) -> Result<GameState, GameError> {
    if state.phase != Phase::Rolling {
        return Err(GameError::InvalidPhase);
    }
    if state.turn.roll_count < 1 {
        return Err(GameError::bad_request("roll at least once before scoring"));
    }
    let mut next = state.clone();
    next.phase = Phase::SelectScore;
    next.turn.prev_held = Some(state.turn.held);
    next.turn.held = [true; DICE_COUNT];
    Ok(next)
}

fn action_cancel_score_selection(state: &GameState) -> Result<GameState, GameError> {
    if state.phase != Phase::SelectScore {
        return Err(GameError::InvalidPhase);
    }
    if state.turn.roll_count >= MAX_ROLLS_PER_TURN {
        return Err(GameError::bad_request("no rolls left to return to"));
    }
    let mut next = state.clone();
    next.phase = Phase::Rolling;
    next.turn.held = state.turn.prev_held.unwrap_or([false; DICE_COUNT]);
    next.turn.prev_held = None;
    Ok(next)
}

fn action_apply_score(
    state: &GameState,
    category: game_types::ScoreCategory,
) -> Result<GameState, GameError> {
    if state.phase != Phase::SelectScore {
        return Err(GameError::InvalidPhase);
    }
    let player = state.current_player();
    match player.score_card.get(&category) {
        Some(cell) if !cell.used => {}
        Some(_) => return Err(GameError::CategoryAlreadyUsed),
        None => return Err(GameError::bad_request("unknown category")),
    }

    let score = ScoringEngine::score_for(&state.turn.dice, category);

    let mut next = state.clone();
    {
        let player = &mut next.players[state.current_player_index];
        player.score_card.insert(
            category,
            ScoreCell {
                used: true,
                score: Some(score),
            },
        );
        if category == game_types::ScoreCategory::Yahtzee && score > 0 {
            player.yahtzee_scored_once = true;
        }
        if state.turn.is_extra_yahtzee {
            player.extra_yahtzee_bonus += EXTRA_YAHTZEE_BONUS;
        }
        if ScoringEngine::should_grant_upper_bonus(player) {
            player.upper_bonus_given = true;
        }
    }

    if next.all_used() {
        next.phase = Phase::GameEnd;
        return Ok(next);
    }

    let next_index = (state.current_player_index + 1) % next.players.len();
    if next_index == state.first_player_index {
        next.round += 1;
    }
    next.current_player_index = next_index;
    next.phase = Phase::Rolling;
    next.turn = Turn::zero();
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dice::SequenceDice;
    use game_types::ScoreCategory;

    fn seats() -> Vec<Seat> {
        vec![
            Seat {
                uid: Some("u1".into()),
                client_id: Some("c1".into()),
                name: "Apple".into(),
                online: true,
                joined_at: None,
            },
            Seat {
                uid: Some("u2".into()),
                client_id: Some("c2".into()),
                name: "Banana".into(),
                online: true,
                joined_at: None,
            },
        ]
    }

    fn rolled(faces: [u8; 5]) -> GameState {
        let state = new_game("AB2C3D", &seats(), 0);
        let mut source = SequenceDice::new(faces.to_vec());
        reduce(&state, &GameAction::Roll, &mut source, 1000).unwrap()
    }

    #[test]
    fn new_game_starts_at_seat_zero_round_one() {
        let state = new_game("AB2C3D", &seats(), 42);
        assert_eq!(state.current_player_index, 0);
        assert_eq!(state.round, 1);
        assert_eq!(state.phase, Phase::Rolling);
        assert_eq!(state.turn, Turn::zero());
        assert_eq!(state.players[0].name, "Apple");
        assert_eq!(state.players[1].name, "Banana");
    }

    #[test]
    fn roll_increments_count_and_stamps_time() {
        let state = rolled([2, 2, 2, 5, 1]);
        assert_eq!(state.turn.roll_count, 1);
        assert_eq!(state.turn.dice, [2, 2, 2, 5, 1]);
        assert_eq!(state.turn.last_roll_at, Some(1000));
        assert!(!state.turn.is_extra_yahtzee);
    }

    #[test]
    fn fourth_roll_is_rejected() {
        let mut state = rolled([1, 2, 3, 4, 5]);
        let mut source = SequenceDice::new(vec![1]);
        for _ in 0..2 {
            state = reduce(&state, &GameAction::Roll, &mut source, 0).unwrap();
        }
        assert_eq!(state.turn.roll_count, 3);
        let err = reduce(&state, &GameAction::Roll, &mut source, 0).unwrap_err();
        assert_eq!(err, GameError::RollsExhausted);
    }

    #[test]
    fn holds_require_a_prior_roll() {
        let state = new_game("AB2C3D", &seats(), 0);
        let mut source = SequenceDice::new(vec![1]);
        let err = reduce(
            &state,
            &GameAction::ToggleHold { index: 0 },
            &mut source,
            0,
        )
        .unwrap_err();
        assert_eq!(err.code(), "BAD_REQUEST");
    }

    #[test]
    fn toggle_batch_applies_xor_parity() {
        let state = rolled([1, 2, 3, 4, 5]);
        let mut source = SequenceDice::new(vec![1]);
        // index 1 appears twice: cancels out; 0 and 3 once each: flip
        let next = reduce(
            &state,
            &GameAction::ToggleHoldBatch {
                indices: vec![0, 1, 3, 1],
            },
            &mut source,
            0,
        )
        .unwrap();
        assert_eq!(next.turn.held, [true, false, false, true, false]);
    }

    #[test]
    fn set_hold_batch_replaces_all_flags() {
        let state = rolled([1, 2, 3, 4, 5]);
        let mut source = SequenceDice::new(vec![1]);
        let next = reduce(
            &state,
            &GameAction::SetHoldBatch {
                held: vec![true, true, false, false, true],
            },
            &mut source,
            0,
        )
        .unwrap();
        assert_eq!(next.turn.held, [true, true, false, false, true]);

        let err = reduce(
            &state,
            &GameAction::SetHoldBatch {
                held: vec![true, true],
            },
            &mut source,
            0,
        )
        .unwrap_err();
        assert_eq!(err.code(), "BAD_REQUEST");
    }

    #[test]
    fn hold_index_out_of_range_is_rejected() {
        let state = rolled([1, 2, 3, 4, 5]);
        let mut source = SequenceDice::new(vec![1]);
        let err = reduce(
            &state,
            &GameAction::SetHold {
                index: 5,
                held: true,
            },
            &mut source,
            0,
        )
        .unwrap_err();
        assert_eq!(err.code(), "BAD_REQUEST");
    }

    #[test]
    fn stop_then_cancel_restores_exact_held_vector() {
        let state = rolled([1, 2, 3, 4, 5]);
        let mut source = SequenceDice::new(vec![1]);
        let held_before = [true, false, true, false, false];
        let state = reduce(
            &state,
            &GameAction::SetHoldBatch {
                held: held_before.to_vec(),
            },
            &mut source,
            0,
        )
        .unwrap();

        let stopped = reduce(&state, &GameAction::Stop, &mut source, 0).unwrap();
        assert_eq!(stopped.phase, Phase::SelectScore);
        assert_eq!(stopped.turn.held, [true; 5]);
        assert_eq!(stopped.turn.prev_held, Some(held_before));

        let back = reduce(&stopped, &GameAction::CancelScoreSelection, &mut source, 0).unwrap();
        assert_eq!(back.phase, Phase::Rolling);
        assert_eq!(back.turn.held, held_before);
        assert_eq!(back.turn.prev_held, None);
    }

    #[test]
    fn cancel_is_rejected_once_rolls_are_exhausted() {
        let mut state = rolled([1, 2, 3, 4, 5]);
        let mut source = SequenceDice::new(vec![1]);
        for _ in 0..2 {
            state = reduce(&state, &GameAction::Roll, &mut source, 0).unwrap();
        }
        let selecting =
            reduce(&state, &GameAction::EnterScoreSelection, &mut source, 0).unwrap();
        let err = reduce(
            &selecting,
            &GameAction::CancelScoreSelection,
            &mut source,
            0,
        )
        .unwrap_err();
        assert_eq!(err.code(), "BAD_REQUEST");
    }

    #[test]
    fn apply_score_rejects_reuse() {
        let state = rolled([2, 2, 2, 5, 1]);
        let mut source = SequenceDice::new(vec![2, 2, 2, 5, 1]);
        let selecting = reduce(&state, &GameAction::Stop, &mut source, 0).unwrap();
        let scored = reduce(
            &selecting,
            &GameAction::ApplyScore {
                key: ScoreCategory::Two,
            },
            &mut source,
            0,
        )
        .unwrap();
        assert_eq!(
            scored.players[0].score_card[&ScoreCategory::Two].score,
            Some(6)
        );
        assert_eq!(scored.current_player_index, 1);

        // p2's own TWO is still open; once the turn comes back to p1,
        // reusing TWO must be rejected.
        let p2_rolled = reduce(&scored, &GameAction::Roll, &mut source, 0).unwrap();
        let p2_selecting = reduce(&p2_rolled, &GameAction::Stop, &mut source, 0).unwrap();
        let p2_scored = reduce(
            &p2_selecting,
            &GameAction::ApplyScore {
                key: ScoreCategory::Two,
            },
            &mut source,
            0,
        )
        .unwrap();
        assert_eq!(p2_scored.current_player_index, 0);
        assert_eq!(p2_scored.round, 2);

        let p1_rolled = reduce(&p2_scored, &GameAction::Roll, &mut source, 0).unwrap();
        let p1_selecting = reduce(&p1_rolled, &GameAction::Stop, &mut source, 0).unwrap();
        let err = reduce(
            &p1_selecting,
            &GameAction::ApplyScore {
                key: ScoreCategory::Two,
            },
            &mut source,
            0,
        )
        .unwrap_err();
        assert_eq!(err, GameError::CategoryAlreadyUsed);
    }

    #[test]
    fn rejection_does_not_mutate_input() {
        let state = rolled([1, 2, 3, 4, 5]);
        let snapshot = state.clone();
        let mut source = SequenceDice::new(vec![1]);
        let _ = reduce(
            &state,
            &GameAction::ApplyScore {
                key: ScoreCategory::Chance,
            },
            &mut source,
            0,
        )
        .unwrap_err();
        assert_eq!(state, snapshot);
    }

    #[test]
    fn extra_yahtzee_bonus_is_additive_and_needs_prior_flag() {
        // p1 rolls a yahtzee and scores the YAHTZEE category: 50, flag set,
        // but no bonus (flag was not yet set when the roll happened).
        let mut state = new_game("AB2C3D", &seats(), 0);
        let mut source = SequenceDice::new(vec![4]);
        state = reduce(&state, &GameAction::Roll, &mut source, 0).unwrap();
        assert!(!state.turn.is_extra_yahtzee);
        state = reduce(&state, &GameAction::Stop, &mut source, 0).unwrap();
        state = reduce(
            &state,
            &GameAction::ApplyScore {
                key: ScoreCategory::Yahtzee,
            },
            &mut source,
            0,
        )
        .unwrap();
        assert!(state.players[0].yahtzee_scored_once);
        assert_eq!(state.players[0].extra_yahtzee_bonus, 0);

        // p2 takes a quick turn
        state = reduce(&state, &GameAction::Roll, &mut source, 0).unwrap();
        state = reduce(&state, &GameAction::Stop, &mut source, 0).unwrap();
        state = reduce(
            &state,
            &GameAction::ApplyScore {
                key: ScoreCategory::Chance,
            },
            &mut source,
            0,
        )
        .unwrap();

        // p1 rolls five of a kind again: extra flag set, +100 on top of the
        // chosen category's own score.
        state = reduce(&state, &GameAction::Roll, &mut source, 0).unwrap();
        assert!(state.turn.is_extra_yahtzee);
        state = reduce(&state, &GameAction::Stop, &mut source, 0).unwrap();
        state = reduce(
            &state,
            &GameAction::ApplyScore {
                key: ScoreCategory::FourKind,
            },
            &mut source,
            0,
        )
        .unwrap();
        let p1 = &state.players[0];
        assert_eq!(
            p1.score_card[&ScoreCategory::FourKind].score,
            Some(20) // five 4s
        );
        assert_eq!(p1.extra_yahtzee_bonus, EXTRA_YAHTZEE_BONUS);
    }

    #[test]
    fn game_ends_when_every_category_is_used() {
        let mut state = new_game("AB2C3D", &seats(), 0);
        let mut source = SequenceDice::new(vec![1, 2, 3, 4, 5]);
        let categories = ScoreCategory::ALL;
        for round in 0..13 {
            for _seat in 0..2 {
                state = reduce(&state, &GameAction::Roll, &mut source, 0).unwrap();
                state = reduce(&state, &GameAction::Stop, &mut source, 0).unwrap();
                state = reduce(
                    &state,
                    &GameAction::ApplyScore {
                        key: categories[round],
                    },
                    &mut source,
                    0,
                )
                .unwrap();
            }
        }
        assert_eq!(state.phase, Phase::GameEnd);
        assert!(state.all_used());
    }
}
