//! Landmark builders shared by unit tests.

use crate::landmarks::types::{
    Detection, HandLandmarks, Point3, PosePoint, FACE_POINTS, HAND_POINTS, INDEX_TIP, MIDDLE_TIP,
    PINKY_TIP, POSE_POINTS, RING_TIP, THUMB_TIP, WRIST,
};

/// A hand with every point at roughly the same height.
pub fn flat_hand_at(x: f64, y: f64) -> HandLandmarks {
    HandLandmarks::new(
        (0..HAND_POINTS)
            .map(|i| Point3::new(x + i as f64 * 0.001, y, 0.0))
            .collect(),
    )
}

/// A right hand forming the "I love you" shape: thumb, index and pinky
/// extended, middle and ring curled.
pub fn ily_hand() -> HandLandmarks {
    let mut points = vec![Point3::new(0.5, 0.75, 0.0); HAND_POINTS];
    points[WRIST] = Point3::new(0.5, 0.8, 0.0);
    points[THUMB_TIP] = Point3::new(0.4, 0.7, 0.0);
    points[INDEX_TIP] = Point3::new(0.48, 0.5, 0.0);
    points[MIDDLE_TIP] = Point3::new(0.5, 0.65, 0.0);
    points[RING_TIP] = Point3::new(0.52, 0.65, 0.0);
    points[PINKY_TIP] = Point3::new(0.56, 0.55, 0.0);
    HandLandmarks::new(points)
}

pub fn pose_with_nose(nose_y: f64) -> Vec<PosePoint> {
    let mut pose = vec![
        PosePoint {
            x: 0.5,
            y: 0.9,
            z: 0.0,
            visibility: 0.9,
        };
        POSE_POINTS
    ];
    pose[0].y = nose_y;
    pose
}

/// A face whose lower contour bottoms out at `chin_y`.
pub fn face_with_chin(chin_y: f64) -> Vec<Point3> {
    (0..FACE_POINTS)
        .map(|i| {
            if i < 17 {
                Point3::new(0.4 + i as f64 * 0.01, chin_y - 0.1 + i as f64 * (0.1 / 16.0), 0.0)
            } else {
                Point3::new(0.5, chin_y - 0.2, 0.0)
            }
        })
        .collect()
}

pub fn ily_detection() -> Detection {
    Detection {
        right_hand: Some(ily_hand()),
        ..Default::default()
    }
}
