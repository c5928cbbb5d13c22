use game_core::{SequenceDice, new_game, reduce};
use game_types::{GameAction, GameState, ScoreCategory, Seat};

/// Creates a seat occupied by a named test player
pub fn create_test_seat(name: &str) -> Seat {
    Seat {
        uid: Some(format!("uid-{}", name.to_lowercase())),
        client_id: Some(format!("client-{}", name.to_lowercase())),
        name: name.to_string(),
        online: true,
        joined_at: None,
    }
}

/// Creates a standard two-seat lineup
pub fn create_standard_seats() -> Vec<Seat> {
    vec![create_test_seat("Alice"), create_test_seat("Bob")]
}

/// Creates a freshly started game for the standard lineup
pub fn create_standard_game() -> GameState {
    new_game("TEST01", &create_standard_seats(), 0)
}

/// Plays one full turn for the current player: roll the given faces, stop,
/// and score the given category. Panics on rule violations so tests fail
/// loudly at the step that broke.
pub fn play_turn(state: &GameState, faces: [u8; 5], category: ScoreCategory) -> GameState {
    let mut source = SequenceDice::new(faces.to_vec());
    let state = reduce(state, &GameAction::Roll, &mut source, 0).unwrap();
    let state = reduce(&state, &GameAction::Stop, &mut source, 0).unwrap();
    reduce(
        &state,
        &GameAction::ApplyScore { key: category },
        &mut source,
        0,
    )
    .unwrap()
}
