//! Hand motion between consecutive frames.

use crate::landmarks::types::{Detection, HandLandmarks};

/// Mean per-point 3D displacement of one hand between two frames.
///
/// Returns 0 when either hand is absent or has no points.
pub fn hand_motion(current: Option<&HandLandmarks>, previous: Option<&HandLandmarks>) -> f64 {
    let (current, previous) = match (current, previous) {
        (Some(c), Some(p)) => (c, p),
        _ => return 0.0,
    };

    let pairs = current.points.len().min(previous.points.len());
    if pairs == 0 {
        return 0.0;
    }

    let total: f64 = current
        .points
        .iter()
        .zip(previous.points.iter())
        .map(|(c, p)| c.distance(p))
        .sum();

    total / pairs as f64
}

/// Frame-level motion: the larger of the left- and right-hand motion.
///
/// Without a previous frame there is nothing to compare and the motion is 0.
pub fn frame_motion(current: &Detection, previous: Option<&Detection>) -> f64 {
    let previous = match previous {
        Some(p) => p,
        None => return 0.0,
    };

    let left = hand_motion(current.left_hand.as_ref(), previous.left_hand.as_ref());
    let right = hand_motion(current.right_hand.as_ref(), previous.right_hand.as_ref());
    left.max(right)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmarks::types::{Point3, HAND_POINTS};

    fn hand_at(x: f64, y: f64) -> HandLandmarks {
        HandLandmarks::new(
            (0..HAND_POINTS)
                .map(|i| Point3::new(x + i as f64 * 0.001, y, 0.0))
                .collect(),
        )
    }

    #[test]
    fn test_absent_hand_yields_zero() {
        let hand = hand_at(0.5, 0.5);
        assert_eq!(hand_motion(Some(&hand), None), 0.0);
        assert_eq!(hand_motion(None, Some(&hand)), 0.0);
        assert_eq!(hand_motion(None, None), 0.0);
    }

    #[test]
    fn test_uniform_shift_equals_displacement() {
        let a = hand_at(0.5, 0.5);
        let b = hand_at(0.53, 0.54);
        let motion = hand_motion(Some(&b), Some(&a));
        assert!((motion - 0.05).abs() < 1e-9);
    }

    #[test]
    fn test_motion_increases_with_displacement() {
        let base = hand_at(0.5, 0.5);
        let mut last = 0.0;
        for step in 1..10 {
            let moved = hand_at(0.5 + step as f64 * 0.01, 0.5);
            let motion = hand_motion(Some(&moved), Some(&base));
            assert!(motion > last);
            last = motion;
        }
    }

    #[test]
    fn test_frame_motion_takes_max_of_hands() {
        let previous = Detection {
            left_hand: Some(hand_at(0.2, 0.5)),
            right_hand: Some(hand_at(0.7, 0.5)),
            ..Default::default()
        };
        let current = Detection {
            left_hand: Some(hand_at(0.21, 0.5)),
            right_hand: Some(hand_at(0.74, 0.5)),
            ..Default::default()
        };
        let motion = frame_motion(&current, Some(&previous));
        assert!((motion - 0.04).abs() < 1e-9);
    }

    #[test]
    fn test_frame_motion_without_previous_frame() {
        let current = Detection {
            right_hand: Some(hand_at(0.7, 0.5)),
            ..Default::default()
        };
        assert_eq!(frame_motion(&current, None), 0.0);
    }
}
