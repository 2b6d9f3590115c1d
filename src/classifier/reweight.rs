//! Confidence reweighting of raw classifier scores.
//!
//! Raw scores are multiplied by per-sign weights before the top class is
//! picked. A sign under [`Scrutiny`] is one the model over-predicts: its
//! weight drops further when the latest frame lacks the supporting finger
//! geometry, and borderline wins are discounted. The effective weight is a
//! local value computed per call; the configured catalog is never mutated.
//!
//! The outcome also carries the validator's verdict, so the stabilizer sees
//! one adjusted confidence per classification cycle.

use crate::config::{SignCatalog, Thresholds};
use crate::core::validator::SignValidator;
use crate::landmarks::types::{
    Detection, HandLandmarks, INDEX_TIP, MIDDLE_TIP, PINKY_TIP, RING_TIP, THUMB_TIP, WRIST,
};
use serde::{Deserialize, Serialize};

/// Extra skepticism applied to a sign the classifier tends to over-predict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Scrutiny {
    /// Raw scores at or above this skip the evidence check
    pub evidence_bypass: f64,
    /// Weight used instead of the configured one when evidence is weak
    pub weak_evidence_weight: f64,
    /// Winning confidence below `base * elevated_bar_factor` is discounted
    pub elevated_bar_factor: f64,
    /// Discount for borderline wins
    pub borderline_discount: f64,
    /// Valid predictions need recent motion below this multiple of the threshold
    pub max_still_motion: f64,
    /// Finger geometry that counts as supporting evidence
    pub evidence: EvidenceShape,
}

impl Default for Scrutiny {
    fn default() -> Self {
        Self {
            evidence_bypass: 0.95,
            weak_evidence_weight: 0.7,
            elevated_bar_factor: 1.25,
            borderline_discount: 0.8,
            max_still_motion: 0.5,
            evidence: EvidenceShape::default(),
        }
    }
}

/// Narrow geometric check on the right hand, run before weighting.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvidenceShape {
    /// Index tip must sit this far above the wrist
    pub index_margin: f64,
    /// Pinky tip must sit this far above the wrist
    pub pinky_margin: f64,
    /// Thumb tip must stick out sideways this far from the wrist
    pub thumb_spread: f64,
    /// Middle and ring tips must sit this far below the index tip
    pub curl_margin: f64,
}

impl Default for EvidenceShape {
    fn default() -> Self {
        Self {
            index_margin: 0.1,
            pinky_margin: 0.08,
            thumb_spread: 0.08,
            curl_margin: 0.05,
        }
    }
}

impl EvidenceShape {
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

        index.y < wrist.y - self.index_margin
            && pinky.y < wrist.y - self.pinky_margin
            && (thumb.x - wrist.x).abs() > self.thumb_spread
            && middle.y > index.y + self.curl_margin
            && ring.y > index.y + self.curl_margin
    }
}

/// Outcome of one classification cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Index of the chosen sign
    pub index: usize,
    /// Canonical label of the chosen sign
    pub label: String,
    /// Confidence after weighting and discounts; compared against thresholds
    pub confidence: f64,
    /// Index of the unweighted top score
    pub raw_index: usize,
    /// Unweighted top score
    pub raw_confidence: f64,
    /// Whether the frame geometry and motion fit the chosen sign
    pub valid: bool,
}

/// Applies weights, anti-flicker correction and validation to raw scores.
#[derive(Debug, Clone)]
pub struct Reweighter {
    catalog: SignCatalog,
    thresholds: Thresholds,
    validator: SignValidator,
}

impl Reweighter {
    pub fn new(catalog: SignCatalog, thresholds: Thresholds, validator: SignValidator) -> Self {
        Self {
            catalog,
            thresholds,
            validator,
        }
    }

    /// Turn a raw score vector into a prediction.
    ///
    /// `scores` must hold one finite value per catalog entry and must not be
    /// empty; see [`crate::classifier::check_scores`].
    pub fn evaluate(&self, scores: &[f64], detection: &Detection, motion_history: &[f64]) -> Prediction {
        let (raw_index, raw_confidence) = argmax(scores);

        let weights = self.effective_weights(raw_index, raw_confidence, detection);
        let weighted: Vec<f64> = scores.iter().zip(&weights).map(|(s, w)| s * w).collect();
        let (mut index, mut confidence) = argmax(&weighted);

        if self.catalog.at(index).is_none() {
            tracing::error!(
                "Invalid prediction index {} (catalog has {} signs)",
                index,
                self.catalog.len()
            );
            index = raw_index;
            confidence = raw_confidence;
        }

        // A strong unweighted signal is not overridden by weighting.
        if index != raw_index && raw_confidence > self.thresholds.raw_override {
            index = raw_index;
            confidence = raw_confidence;
        }

        let label = self
            .catalog
            .at(index)
            .map(|s| s.label.clone())
            .unwrap_or_default();
        let scrutiny = self.catalog.at(index).and_then(|s| s.scrutiny.as_ref());

        if let Some(scrutiny) = scrutiny {
            if confidence < self.thresholds.base * scrutiny.elevated_bar_factor {
                confidence *= scrutiny.borderline_discount;
            }
        }

        let mut valid = self.validator.validate(&label, detection, motion_history);
        if let Some(scrutiny) = scrutiny {
            let recent = self.validator.rule_motion(motion_history).unwrap_or(0.0);
            if valid && recent > scrutiny.max_still_motion * self.validator.motion_threshold() {
                valid = false;
            }
        }

        if !valid {
            confidence *= self.thresholds.invalid_discount;
        }

        Prediction {
            index,
            label,
            confidence,
            raw_index,
            raw_confidence,
            valid,
        }
    }

    /// Per-sign weights for this call, lowered for a scrutinized raw winner
    /// whose supporting geometry is missing.
    fn effective_weights(&self, raw_index: usize, raw_confidence: f64, detection: &Detection) -> Vec<f64> {
        let mut weights: Vec<f64> = self.catalog.iter().map(|s| s.weight).collect();

        let scrutiny = self.catalog.at(raw_index).and_then(|s| s.scrutiny.as_ref());
        if let Some(scrutiny) = scrutiny {
            if raw_confidence < scrutiny.evidence_bypass {
                let supported = detection
                    .right_hand
                    .as_ref()
                    .map_or(false, |hand| scrutiny.evidence.matches(hand));
                if !supported {
                    weights[raw_index] = scrutiny.weak_evidence_weight;
                }
            }
        }

        weights
    }
}

/// Index and value of the largest score; the first one wins ties.
pub fn argmax(scores: &[f64]) -> (usize, f64) {
    scores
        .iter()
        .copied()
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |(best_i, best), (i, s)| {
            if s > best {
                (i, s)
            } else {
                (best_i, best)
            }
        })
}
