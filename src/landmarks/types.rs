//! Landmark types produced by the external landmark-detection service.
//!
//! A [`Detection`] keeps the per-part structure (needed by the motion analyzer
//! and the geometric validators), while a [`LandmarkFrame`] is the flattened,
//! fixed-length vector that goes into a classification window.

use serde::{Deserialize, Serialize};

/// Number of pose points (each x, y, z, visibility).
pub const POSE_POINTS: usize = 33;
/// Number of face mesh points (each x, y, z).
pub const FACE_POINTS: usize = 468;
/// Number of points per hand (each x, y, z).
pub const HAND_POINTS: usize = 21;

/// Length of a flattened landmark frame.
pub const FRAME_LEN: usize = POSE_POINTS * 4 + FACE_POINTS * 3 + HAND_POINTS * 3 * 2;

/// Pose point index of the nose.
pub const NOSE: usize = 0;

/// Hand point indices.
pub const WRIST: usize = 0;
pub const THUMB_TIP: usize = 4;
pub const INDEX_TIP: usize = 8;
pub const MIDDLE_TIP: usize = 12;
pub const RING_TIP: usize = 16;
pub const PINKY_TIP: usize = 20;

/// Fingertips excluding the thumb.
pub const FINGERTIPS: [usize; 4] = [INDEX_TIP, MIDDLE_TIP, RING_TIP, PINKY_TIP];

/// A normalized 3D landmark.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Euclidean distance to another point.
    pub fn distance(&self, other: &Point3) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

/// A pose landmark, which also carries a visibility estimate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PosePoint {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    #[serde(default)]
    pub visibility: f64,
}

/// The landmarks of one detected hand.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HandLandmarks {
    pub points: Vec<Point3>,
}

impl HandLandmarks {
    pub fn new(points: Vec<Point3>) -> Self {
        Self { points }
    }

    /// Get a point by index, if the detector produced it.
    pub fn point(&self, index: usize) -> Option<&Point3> {
        self.points.get(index)
    }

    /// Whether the detector produced any point for this hand.
    pub fn is_detected(&self) -> bool {
        !self.points.is_empty()
    }

    /// Whether every hand point is present.
    pub fn is_complete(&self) -> bool {
        self.points.len() >= HAND_POINTS
    }
}

/// Structured output of the landmark detector for one video frame.
///
/// Each part is `None` when the detector did not find it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    #[serde(default)]
    pub pose: Option<Vec<PosePoint>>,
    #[serde(default)]
    pub face: Option<Vec<Point3>>,
    #[serde(default)]
    pub left_hand: Option<HandLandmarks>,
    #[serde(default)]
    pub right_hand: Option<HandLandmarks>,
}

impl Detection {
    /// Whether at least one hand was detected. An empty point list counts
    /// as no hand.
    pub fn has_hands(&self) -> bool {
        [&self.left_hand, &self.right_hand]
            .into_iter()
            .flatten()
            .any(HandLandmarks::is_detected)
    }

    /// The nose position from the pose landmarks.
    pub fn nose(&self) -> Option<&PosePoint> {
        self.pose.as_ref().and_then(|pose| pose.get(NOSE))
    }

    /// The right hand if present, otherwise the left hand.
    pub fn dominant_hand(&self) -> Option<&HandLandmarks> {
        self.right_hand.as_ref().or(self.left_hand.as_ref())
    }

    /// Flatten into a fixed-length landmark frame.
    pub fn to_frame(&self) -> LandmarkFrame {
        LandmarkFrame::from_detection(self)
    }
}

/// Fixed-length numeric landmark vector: pose, face, left hand, right hand.
///
/// Missing parts are zero-filled. Parts with too few points are padded and
/// parts with too many are truncated, so a frame always has [`FRAME_LEN`] values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LandmarkFrame {
    values: Vec<f64>,
}

impl LandmarkFrame {
    /// An all-zero frame (nothing detected).
    pub fn zeros() -> Self {
        Self {
            values: vec![0.0; FRAME_LEN],
        }
    }

    pub fn from_detection(detection: &Detection) -> Self {
        let mut values = Vec::with_capacity(FRAME_LEN);

        push_part(
            &mut values,
            detection.pose.as_deref(),
            POSE_POINTS * 4,
            |p: &PosePoint| [p.x, p.y, p.z, p.visibility].to_vec(),
        );
        push_part(&mut values, detection.face.as_deref(), FACE_POINTS * 3, |p: &Point3| {
            [p.x, p.y, p.z].to_vec()
        });
        for hand in [&detection.left_hand, &detection.right_hand] {
            push_part(
                &mut values,
                hand.as_ref().map(|h| h.points.as_slice()),
                HAND_POINTS * 3,
                |p: &Point3| [p.x, p.y, p.z].to_vec(),
            );
        }

        Self { values }
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

fn push_part<T, F>(out: &mut Vec<f64>, points: Option<&[T]>, width: usize, flatten: F)
where
    F: Fn(&T) -> Vec<f64>,
{
    let start = out.len();
    if let Some(points) = points {
        for point in points {
            out.extend(flatten(point));
        }
    }
    out.resize(start + width, 0.0);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hand(offset: f64) -> HandLandmarks {
        HandLandmarks::new(
            (0..HAND_POINTS)
                .map(|i| Point3::new(offset + i as f64 * 0.01, 0.5, 0.0))
                .collect(),
        )
    }

    #[test]
    fn test_frame_length_constant() {
        assert_eq!(FRAME_LEN, 1662);
        assert_eq!(LandmarkFrame::zeros().len(), FRAME_LEN);
    }

    #[test]
    fn test_empty_detection_is_zero_filled() {
        let frame = Detection::default().to_frame();
        assert_eq!(frame.len(), FRAME_LEN);
        assert!(frame.as_slice().iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_right_hand_occupies_tail() {
        let detection = Detection {
            right_hand: Some(hand(0.2)),
            ..Default::default()
        };
        let frame = detection.to_frame();
        let tail = &frame.as_slice()[FRAME_LEN - HAND_POINTS * 3..];
        assert!((tail[0] - 0.2).abs() < 1e-12);
        assert!((tail[1] - 0.5).abs() < 1e-12);
        // Left hand block stays zero
        let left = &frame.as_slice()[FRAME_LEN - HAND_POINTS * 6..FRAME_LEN - HAND_POINTS * 3];
        assert!(left.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_short_part_is_padded() {
        let detection = Detection {
            left_hand: Some(HandLandmarks::new(vec![Point3::new(1.0, 1.0, 1.0)])),
            ..Default::default()
        };
        assert_eq!(detection.to_frame().len(), FRAME_LEN);
    }

    #[test]
    fn test_dominant_hand_prefers_right() {
        let detection = Detection {
            left_hand: Some(hand(0.1)),
            right_hand: Some(hand(0.7)),
            ..Default::default()
        };
        let dominant = detection.dominant_hand().unwrap();
        assert!((dominant.points[0].x - 0.7).abs() < 1e-12);
        assert!(detection.has_hands());
    }

    #[test]
    fn test_empty_hand_is_not_a_detection() {
        let detection: Detection =
            serde_json::from_str(r#"{"right_hand": [], "left_hand": null}"#).unwrap();
        assert!(detection.right_hand.is_some());
        assert!(!detection.has_hands());

        let detection: Detection =
            serde_json::from_str(r#"{"left_hand": [{"x": 0.1, "y": 0.2, "z": 0.0}]}"#).unwrap();
        assert!(detection.has_hands());
    }

    #[test]
    fn test_detection_deserializes_with_missing_parts() {
        let detection: Detection =
            serde_json::from_str(r#"{"right_hand": [{"x": 0.1, "y": 0.2, "z": 0.0}]}"#).unwrap();
        assert!(detection.pose.is_none());
        assert_eq!(detection.right_hand.unwrap().points.len(), 1);
    }
}
