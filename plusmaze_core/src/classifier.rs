//! Turn classification from consecutive arm detections.
//!
//! The detectors sit on a ring west -> north -> south -> east -> west.
//! One step forward around the ring is a right turn, one step back is a
//! left turn. Anything else means a detection was missed.

use crate::types::Turn;
use plusmaze_traits::Arm;
use thiserror::Error;

/// The animal appeared somewhere it could not reach in one move.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("invalid transition {from} -> {to}")]
pub struct InvalidTransition {
    pub from: Arm,
    pub to: Arm,
}

const RING: [Arm; 4] = [Arm::West, Arm::North, Arm::South, Arm::East];

fn ring_pos(arm: Arm) -> usize {
    match arm {
        Arm::West => 0,
        Arm::North => 1,
        Arm::South => 2,
        Arm::East => 3,
    }
}

pub fn classify(previous: Arm, current: Arm) -> Result<Turn, InvalidTransition> {
    let p = ring_pos(previous);
    if RING[(p + 1) % 4] == current {
        Ok(Turn::Right)
    } else if RING[(p + 3) % 4] == current {
        Ok(Turn::Left)
    } else {
        Err(InvalidTransition {
            from: previous,
            to: current,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Arm::West, Arm::North, Turn::Right)]
    #[case(Arm::North, Arm::South, Turn::Right)]
    #[case(Arm::South, Arm::East, Turn::Right)]
    #[case(Arm::East, Arm::West, Turn::Right)]
    #[case(Arm::North, Arm::West, Turn::Left)]
    #[case(Arm::South, Arm::North, Turn::Left)]
    #[case(Arm::East, Arm::South, Turn::Left)]
    #[case(Arm::West, Arm::East, Turn::Left)]
    fn adjacent_moves_classify(#[case] from: Arm, #[case] to: Arm, #[case] turn: Turn) {
        assert_eq!(classify(from, to), Ok(turn));
    }

    #[rstest]
    #[case(Arm::West, Arm::South)]
    #[case(Arm::South, Arm::West)]
    #[case(Arm::North, Arm::East)]
    #[case(Arm::East, Arm::North)]
    fn opposite_arms_are_invalid(#[case] from: Arm, #[case] to: Arm) {
        assert_eq!(classify(from, to), Err(InvalidTransition { from, to }));
    }

    #[test]
    fn same_arm_is_invalid() {
        for arm in Arm::ALL {
            assert!(classify(arm, arm).is_err());
        }
    }

    #[test]
    fn exactly_eight_valid_pairs() {
        let valid = Arm::ALL
            .iter()
            .flat_map(|a| Arm::ALL.iter().map(move |b| (*a, *b)))
            .filter(|(a, b)| classify(*a, *b).is_ok())
            .count();
        assert_eq!(valid, 8);
    }
}
