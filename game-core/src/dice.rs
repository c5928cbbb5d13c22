use game_types::DICE_COUNT;
use rand::Rng;

/// Source of die faces. The engine takes this as a parameter so server,
/// client and tests can supply their own randomness.
pub trait DieSource {
    /// A uniform face in 1..=6.
    fn roll(&mut self) -> u8;
}

/// Thread-rng backed source used by the server and the optimistic client.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadRngDice;

impl DieSource for ThreadRngDice {
    fn roll(&mut self) -> u8 {
        rand::thread_rng().gen_range(1..=6)
    }
}

/// Replays a fixed face sequence, wrapping around; for tests.
#[derive(Debug, Clone)]
pub struct SequenceDice {
    faces: Vec<u8>,
    next: usize,
}

impl SequenceDice {
    pub fn new(faces: impl Into<Vec<u8>>) -> Self {
        let faces = faces.into();
        assert!(!faces.is_empty(), "sequence must not be empty");
        Self { faces, next: 0 }
    }
}

impl DieSource for SequenceDice {
    fn roll(&mut self) -> u8 {
        let face = self.faces[self.next % self.faces.len()];
        self.next += 1;
        face
    }
}

/// Re-roll every die whose held flag is false.
pub fn roll_dice(
    dice: &[u8; DICE_COUNT],
    held: &[bool; DICE_COUNT],
    source: &mut dyn DieSource,
) -> [u8; DICE_COUNT] {
    let mut next = *dice;
    for i in 0..DICE_COUNT {
        if !held[i] {
            next[i] = source.roll();
        }
    }
    next
}

/// Count of each face 1..=6 (index 0 unused).
pub fn face_counts(dice: &[u8; DICE_COUNT]) -> [u8; 7] {
    let mut counts = [0u8; 7];
    for &v in dice {
        if (1..=6).contains(&v) {
            counts[v as usize] += 1;
        }
    }
    counts
}

pub fn is_yahtzee(dice: &[u8; DICE_COUNT]) -> bool {
    face_counts(dice).iter().any(|&c| c == 5)
}

pub fn has_n_of_a_kind(dice: &[u8; DICE_COUNT], n: u8) -> bool {
    face_counts(dice).iter().any(|&c| c >= n)
}

pub fn is_full_house(dice: &[u8; DICE_COUNT]) -> bool {
    let mut freqs: Vec<u8> = face_counts(dice).iter().copied().filter(|&c| c > 0).collect();
    freqs.sort_unstable();
    freqs == [2, 3]
}

pub fn is_small_straight(dice: &[u8; DICE_COUNT]) -> bool {
    let counts = face_counts(dice);
    let present = |faces: [usize; 4]| faces.iter().all(|&f| counts[f] > 0);
    present([1, 2, 3, 4]) || present([2, 3, 4, 5]) || present([3, 4, 5, 6])
}

pub fn is_large_straight(dice: &[u8; DICE_COUNT]) -> bool {
    let counts = face_counts(dice);
    let exactly = |faces: [usize; 5]| {
        (1..=6).all(|f| {
            let expected = if faces.contains(&f) { 1 } else { 0 };
            counts[f] == expected
        })
    };
    exactly([1, 2, 3, 4, 5]) || exactly([2, 3, 4, 5, 6])
}

pub fn sum_dice(dice: &[u8; DICE_COUNT]) -> i32 {
    dice.iter().map(|&v| v as i32).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roll_respects_held_flags() {
        let mut source = SequenceDice::new(vec![6, 6, 6]);
        let dice = [1, 2, 3, 4, 5];
        let held = [true, false, true, false, true];
        let next = roll_dice(&dice, &held, &mut source);
        assert_eq!(next, [1, 6, 3, 6, 5]);
    }

    #[test]
    fn pattern_detection() {
        assert!(is_yahtzee(&[4, 4, 4, 4, 4]));
        assert!(!is_yahtzee(&[4, 4, 4, 4, 5]));

        assert!(has_n_of_a_kind(&[2, 2, 2, 5, 1], 3));
        assert!(!has_n_of_a_kind(&[2, 2, 2, 5, 1], 4));

        assert!(is_full_house(&[3, 3, 2, 2, 2]));
        assert!(!is_full_house(&[2, 2, 2, 5, 1]));
        // five of a kind is not a full house
        assert!(!is_full_house(&[6, 6, 6, 6, 6]));

        assert!(is_small_straight(&[1, 2, 3, 4, 6]));
        assert!(is_small_straight(&[3, 4, 5, 6, 6]));
        assert!(!is_small_straight(&[1, 2, 3, 5, 6]));

        assert!(is_large_straight(&[1, 2, 3, 4, 5]));
        assert!(is_large_straight(&[6, 5, 4, 3, 2]));
        assert!(!is_large_straight(&[1, 2, 3, 4, 4]));
    }

    #[test]
    fn thread_rng_faces_stay_in_range() {
        let mut source = ThreadRngDice;
        for _ in 0..100 {
            let face = source.roll();
            assert!((1..=6).contains(&face));
        }
    }
}
