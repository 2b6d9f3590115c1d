//! Heuristic sign validation.
//!
//! The classifier only sees a window of flattened landmarks. The validator
//! checks whether the latest frame's geometry and the recent motion are
//! plausible for the predicted sign:
//!
//! - Every sign declares an [`Articulation`]. Dynamic signs need recent motion
//!   above a floor, static signs need it below a ceiling.
//! - A sign may carry a [`SignRule`] with a geometric test that replaces the
//!   generic policy once enough motion samples are buffered.
//!
//! All motion bounds are expressed as multiples of the configured motion
//! threshold. Missing landmarks make a rule fail; they are never an error.

use crate::config::{Articulation, SignCatalog, ValidatorConfig};
use crate::landmarks::types::{
    Detection, HandLandmarks, FINGERTIPS, INDEX_TIP, MIDDLE_TIP, PINKY_TIP, RING_TIP, THUMB_TIP,
    WRIST,
};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

/// Open interval of acceptable mean motion, in multiples of the motion threshold.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MotionBand {
    pub min: f64,
    pub max: f64,
}

impl MotionBand {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    fn contains(&self, motion: f64, threshold: f64) -> bool {
        motion > self.min * threshold && motion < self.max * threshold
    }
}

/// Extended/curled finger configuration with declared margins.
///
/// Image coordinates grow downward, so "extended upward" means a smaller y.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FingerShape {
    /// Thumb tip must sit this far above the wrist.
    pub thumb_margin: f64,
    /// Index tip must sit this far above the wrist.
    pub index_margin: f64,
    /// Middle and ring tips must sit this far below the index tip.
    pub curl_margin: f64,
    /// Pinky tip must sit this far above the ring tip.
    pub pinky_margin: f64,
    /// Mean recent motion must stay below this multiple of the threshold.
    pub max_motion: f64,
}

impl Default for FingerShape {
    fn default() -> Self {
        Self {
            thumb_margin: 0.05,
            index_margin: 0.1,
            curl_margin: 0.05,
            pinky_margin: 0.08,
            max_motion: 0.5,
        }
    }
}

impl FingerShape {
    /// Whether a hand matches the finger configuration.
    pub fn matches(&self, hand: &HandLandmarks) -> bool {
        if !hand.is_complete() {
            return false;
        }
        let (Some(wrist), Some(thumb), Some(index), Some(middle), Some(ring), Some(pinky)) = (
            hand.point(WRIST),
            hand.point(THUMB_TIP),
            hand.point(INDEX_TIP),
            hand.point(MIDDLE_TIP),
            hand.point(RING_TIP),
            hand.point(PINKY_TIP),
        ) else {
            return false;
        };

        thumb.y < wrist.y - self.thumb_margin
            && index.y < wrist.y - self.index_margin
            && middle.y > index.y + self.curl_margin
            && ring.y > index.y + self.curl_margin
            && pinky.y < ring.y - self.pinky_margin
    }
}

/// Sign-specific geometric test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SignRule {
    /// Right hand raised to about nose height, with moderate motion.
    HandNearNose {
        /// Wrist may sit at most this far below the nose.
        nose_margin: f64,
        motion_band: MotionBand,
        /// Without a usable right hand, mean motion must exceed this multiple.
        fallback_min_motion: f64,
    },
    /// Fingertips of either hand near the chin, with tapping-range motion.
    HandsNearChin {
        /// Number of leading face points that trace the lower face contour.
        contour_points: usize,
        /// Maximum vertical distance between a fingertip and the chin.
        fingertip_tolerance: f64,
        motion_band: MotionBand,
    },
    /// Precise finger configuration held still.
    FingerShape(FingerShape),
}

/// Decides whether a frame is geometrically consistent with a sign.
#[derive(Debug, Clone)]
pub struct SignValidator {
    catalog: SignCatalog,
    motion_threshold: f64,
    policy: ValidatorConfig,
}

impl SignValidator {
    pub fn new(catalog: SignCatalog, motion_threshold: f64, policy: ValidatorConfig) -> Self {
        Self {
            catalog,
            motion_threshold,
            policy,
        }
    }

    /// Validate a predicted label against the current frame and motion history.
    ///
    /// `motion_history` is ordered oldest first. Unknown labels are validated
    /// with the dynamic policy.
    ///
    /// The previous frame is not taken separately: its newest entry in
    /// `motion_history` is already the displacement from that frame, and no
    /// rule looks at the previous landmarks for anything else.
    pub fn validate(&self, label: &str, current: &Detection, motion_history: &[f64]) -> bool {
        let (articulation, rule) = match self.catalog.get(label) {
            Some(sign) => (sign.articulation, sign.rule.as_ref()),
            None => (Articulation::Dynamic, None),
        };

        if let Some(rule) = rule {
            if let Some(verdict) = self.apply_rule(rule, current, motion_history) {
                return verdict;
            }
        }

        self.default_policy(articulation, motion_history)
    }

    /// Mean of the last `samples` motion values, if that many are buffered.
    pub fn recent_motion(&self, motion_history: &[f64], samples: usize) -> Option<f64> {
        if samples == 0 || motion_history.len() < samples {
            return None;
        }
        Some(motion_history[motion_history.len() - samples..].iter().mean())
    }

    /// Mean motion over the window the sign rules use.
    pub fn rule_motion(&self, motion_history: &[f64]) -> Option<f64> {
        self.recent_motion(motion_history, self.policy.rule_motion_samples)
    }

    pub fn motion_threshold(&self) -> f64 {
        self.motion_threshold
    }

    /// Returns `None` when the rule defers to the generic policy.
    fn apply_rule(&self, rule: &SignRule, current: &Detection, motion_history: &[f64]) -> Option<bool> {
        let threshold = self.motion_threshold;
        let motion = self.rule_motion(motion_history);

        match rule {
            SignRule::HandNearNose {
                nose_margin,
                motion_band,
                fallback_min_motion,
            } => {
                if let Some(hand) = current.right_hand.as_ref().filter(|h| h.is_complete()) {
                    let near = match (hand.point(WRIST), current.nose()) {
                        (Some(wrist), Some(nose)) => wrist.y <= nose.y + nose_margin,
                        _ => false,
                    };
                    if let Some(avg) = motion {
                        return Some(near && motion_band.contains(avg, threshold));
                    }
                }
                motion.map(|avg| avg > fallback_min_motion * threshold)
            }
            SignRule::HandsNearChin {
                contour_points,
                fingertip_tolerance,
                motion_band,
            } => {
                let avg = motion?;
                let near = chin_y(current, *contour_points).map_or(false, |chin| {
                    [current.left_hand.as_ref(), current.right_hand.as_ref()]
                        .into_iter()
                        .flatten()
                        .any(|hand| fingertip_near(hand, chin, *fingertip_tolerance))
                });
                Some(near && motion_band.contains(avg, threshold))
            }
            SignRule::FingerShape(shape) => {
                let avg = motion?;
                let still = avg < shape.max_motion * threshold;
                let shaped = current.dominant_hand().map_or(false, |hand| shape.matches(hand));
                Some(still && shaped)
            }
        }
    }

    fn default_policy(&self, articulation: Articulation, motion_history: &[f64]) -> bool {
        let Some(avg) = self.recent_motion(motion_history, self.policy.default_motion_samples)
        else {
            return true;
        };

        match articulation {
            Articulation::Static => avg < self.policy.static_max_motion * self.motion_threshold,
            Articulation::Dynamic => avg > self.policy.dynamic_min_motion * self.motion_threshold,
        }
    }
}

/// Lowest point of the face contour (largest y).
fn chin_y(detection: &Detection, contour_points: usize) -> Option<f64> {
    let face = detection.face.as_ref()?;
    face.iter()
        .take(contour_points)
        .map(|p| p.y)
        .fold(None, |acc: Option<f64>, y| Some(acc.map_or(y, |a| a.max(y))))
}

fn fingertip_near(hand: &HandLandmarks, chin: f64, tolerance: f64) -> bool {
    FINGERTIPS
        .iter()
        .filter_map(|&i| hand.point(i))
        .any(|tip| (tip.y - chin).abs() < tolerance)
}
