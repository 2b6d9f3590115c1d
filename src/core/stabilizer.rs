//! Temporal stabilization of per-window predictions into a sentence.
//!
//! Each client has a [`SentenceTracker`]; the shared [`Stabilizer`] holds the
//! tuning and drives the tracker once per classification cycle:
//!
//! 1. The raw top class of the latest result joins the prediction history.
//! 2. Fast path: a confidence at or above the high threshold makes the label
//!    committable immediately.
//! 3. Slow path: a label holding the majority of the last few raw predictions,
//!    with confidence above the relaxed bar, becomes the pending candidate. It
//!    is committable once it has held for enough consecutive cycles and for
//!    the minimum dwell time.
//! 4. Commit gate: never the same label twice in a row, and never inside that
//!    label's cooldown. Blocked commits are dropped, not queued.
//!
//! Committed tokens are final; nothing here ever removes one from the sentence.

use crate::config::{SignCatalog, StabilizerConfig, Thresholds};
use crate::core::history::BoundedHistory;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;

/// Candidate tracking state of one client.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum StabilizerState {
    /// No pending candidate
    Idle,
    /// A candidate is building consecutive support
    Accumulating {
        label: String,
        streak: u32,
        since: DateTime<Utc>,
    },
}

impl StabilizerState {
    pub fn pending_label(&self) -> Option<&str> {
        match self {
            StabilizerState::Idle => None,
            StabilizerState::Accumulating { label, .. } => Some(label),
        }
    }
}

/// What the stabilizer reads from one completed classification.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleInput<'a> {
    /// Unweighted top class index
    pub raw_index: usize,
    /// Label after weighting
    pub label: &'a str,
    /// Confidence after weighting and discounts
    pub confidence: f64,
}

/// Why a committable label was not appended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockReason {
    /// The sentence already ends with this label
    Duplicate,
    /// The label's cooldown has not elapsed since its last commit
    Cooldown,
}

/// Result of one stabilizer cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// Nothing to pursue this cycle
    Idle,
    /// A candidate is pending but not yet committable
    Accumulating { label: String, streak: u32 },
    /// A committable label was dropped by the commit gate
    Blocked { label: String, reason: BlockReason },
    /// The label was appended to the sentence
    Committed(String),
}

/// Per-client stabilizer state: prediction history, pending candidate,
/// committed sentence and per-label commit times.
#[derive(Debug, Clone)]
pub struct SentenceTracker {
    prediction_history: BoundedHistory<usize>,
    sentence: BoundedHistory<String>,
    state: StabilizerState,
    last_commit: HashMap<String, DateTime<Utc>>,
}

impl SentenceTracker {
    pub fn new(prediction_history: usize, sentence: usize) -> Self {
        Self {
            prediction_history: BoundedHistory::new(prediction_history),
            sentence: BoundedHistory::new(sentence),
            state: StabilizerState::Idle,
            last_commit: HashMap::new(),
        }
    }

    pub fn state(&self) -> &StabilizerState {
        &self.state
    }

    pub fn sentence(&self) -> &BoundedHistory<String> {
        &self.sentence
    }

    pub fn prediction_history(&self) -> &BoundedHistory<usize> {
        &self.prediction_history
    }

    /// Forget the prediction history and the pending candidate.
    ///
    /// The committed sentence and cooldown timers are kept.
    pub fn reset_pending(&mut self) {
        self.prediction_history.clear();
        self.state = StabilizerState::Idle;
    }
}

/// Shared stabilizer tuning.
#[derive(Debug, Clone)]
pub struct Stabilizer {
    config: StabilizerConfig,
    thresholds: Thresholds,
    catalog: SignCatalog,
}

impl Stabilizer {
    pub fn new(config: StabilizerConfig, thresholds: Thresholds, catalog: SignCatalog) -> Self {
        Self {
            config,
            thresholds,
            catalog,
        }
    }

    /// Run one classification cycle for a client.
    pub fn observe(
        &self,
        tracker: &mut SentenceTracker,
        input: CycleInput<'_>,
        now: DateTime<Utc>,
    ) -> CycleOutcome {
        tracker.prediction_history.push(input.raw_index);

        if input.confidence >= self.thresholds.high {
            return self.commit(tracker, input.label, now);
        }

        let Some((majority, votes)) = self.majority(tracker) else {
            return CycleOutcome::Idle;
        };
        if votes < self.config.vote_majority
            || input.confidence <= self.thresholds.base * self.thresholds.relaxed_fraction
        {
            return CycleOutcome::Idle;
        }
        let Some(candidate) = self.catalog.at(majority).map(|s| s.label.clone()) else {
            return CycleOutcome::Idle;
        };

        let (streak, since) = match &tracker.state {
            StabilizerState::Accumulating {
                label,
                streak,
                since,
            } if *label == candidate => (streak + 1, *since),
            _ => (1, now),
        };
        tracker.state = StabilizerState::Accumulating {
            label: candidate.clone(),
            streak,
            since,
        };

        if streak >= self.config.min_consecutive && elapsed(since, now) >= self.config.min_dwell {
            self.commit(tracker, &candidate, now)
        } else {
            CycleOutcome::Accumulating {
                label: candidate,
                streak,
            }
        }
    }

    /// Most frequent class among the last `vote_window` raw predictions.
    ///
    /// Ties go to the lowest class index. `None` until the window is filled.
    fn majority(&self, tracker: &SentenceTracker) -> Option<(usize, usize)> {
        let window = self.config.vote_window;
        if window == 0 || tracker.prediction_history.len() < window {
            return None;
        }

        let mut counts: HashMap<usize, usize> = HashMap::new();
        for &index in tracker.prediction_history.recent(window) {
            *counts.entry(index).or_insert(0) += 1;
        }

        counts
            .into_iter()
            .max_by(|(ia, ca), (ib, cb)| ca.cmp(cb).then(ib.cmp(ia)))
    }

    /// Commit gate: no adjacent duplicates, respect per-label cooldowns.
    fn commit(&self, tracker: &mut SentenceTracker, label: &str, now: DateTime<Utc>) -> CycleOutcome {
        if tracker.sentence.last().map(String::as_str) == Some(label) {
            return CycleOutcome::Blocked {
                label: label.to_string(),
                reason: BlockReason::Duplicate,
            };
        }

        let cooldown = self.catalog.cooldown(label);
        if !cooldown.is_zero() {
            if let Some(last) = tracker.last_commit.get(label) {
                if elapsed(*last, now) < cooldown {
                    return CycleOutcome::Blocked {
                        label: label.to_string(),
                        reason: BlockReason::Cooldown,
                    };
                }
            }
        }

        tracker.sentence.push(label.to_string());
        tracker.last_commit.insert(label.to_string(), now);
        tracker.state = StabilizerState::Idle;
        CycleOutcome::Committed(label.to_string())
    }
}

fn elapsed(since: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (now - since).to_std().unwrap_or(Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use chrono::Duration as ChronoDuration;

    const HELLO: usize = 0;
    const THANKS: usize = 1;
    const ILY: usize = 2;

    fn stabilizer() -> Stabilizer {
        let config = Config::default();
        Stabilizer::new(config.stabilizer, config.thresholds, config.signs)
    }

    fn tracker() -> SentenceTracker {
        SentenceTracker::new(10, 5)
    }

    fn input(raw_index: usize, label: &str, confidence: f64) -> CycleInput<'_> {
        CycleInput {
            raw_index,
            label,
            confidence,
        }
    }

    fn ms(t0: DateTime<Utc>, millis: i64) -> DateTime<Utc> {
        t0 + ChronoDuration::milliseconds(millis)
    }

    #[test]
    fn test_fast_path_commits_immediately() {
        let s = stabilizer();
        let mut t = tracker();
        let now = Utc::now();

        let outcome = s.observe(&mut t, input(HELLO, "hello", 0.95), now);
        assert_eq!(outcome, CycleOutcome::Committed("hello".to_string()));
        assert_eq!(t.sentence().to_vec(), vec!["hello"]);
        assert_eq!(t.state(), &StabilizerState::Idle);
    }

    #[test]
    fn test_slow_path_needs_vote_streak_and_dwell() {
        let s = stabilizer();
        let mut t = tracker();
        let t0 = Utc::now();

        // Vote window not yet filled
        assert_eq!(s.observe(&mut t, input(THANKS, "thanks", 0.7), t0), CycleOutcome::Idle);
        assert_eq!(s.observe(&mut t, input(THANKS, "thanks", 0.7), ms(t0, 100)), CycleOutcome::Idle);

        // Majority reached: candidate starts accumulating
        let outcome = s.observe(&mut t, input(THANKS, "thanks", 0.7), ms(t0, 200));
        assert_eq!(
            outcome,
            CycleOutcome::Accumulating {
                label: "thanks".to_string(),
                streak: 1
            }
        );

        // Streak satisfied but dwell is not
        let outcome = s.observe(&mut t, input(THANKS, "thanks", 0.7), ms(t0, 300));
        assert!(matches!(outcome, CycleOutcome::Accumulating { streak: 2, .. }));

        // Dwell satisfied 400ms after the candidate appeared
        let outcome = s.observe(&mut t, input(THANKS, "thanks", 0.7), ms(t0, 600));
        assert_eq!(outcome, CycleOutcome::Committed("thanks".to_string()));
        assert!(t.sentence().iter().any(|l| l == "thanks"));
    }

    #[test]
    fn test_low_confidence_never_accumulates() {
        let s = stabilizer();
        let mut t = tracker();
        let t0 = Utc::now();
        for i in 0..10 {
            // 0.5 is below 0.65 * 0.9
            let outcome = s.observe(&mut t, input(THANKS, "thanks", 0.5), ms(t0, i * 200));
            assert_eq!(outcome, CycleOutcome::Idle);
        }
        assert!(t.sentence().is_empty());
    }

    fn lenient_stabilizer(min_consecutive: u32) -> Stabilizer {
        let mut config = Config::default();
        config.thresholds.base = 0.40;
        config.thresholds.relaxed_fraction = 0.5;
        config.stabilizer.min_consecutive = min_consecutive;
        Stabilizer::new(config.stabilizer, config.thresholds, config.signs)
    }

    #[test]
    fn test_moderate_confidence_waits_for_dwell() {
        let s = lenient_stabilizer(2);
        let mut t = tracker();
        let t0 = Utc::now();

        assert_eq!(s.observe(&mut t, input(HELLO, "hello", 0.40), t0), CycleOutcome::Idle);
        assert_eq!(s.observe(&mut t, input(HELLO, "hello", 0.40), ms(t0, 100)), CycleOutcome::Idle);
        assert_eq!(
            s.observe(&mut t, input(HELLO, "hello", 0.40), ms(t0, 200)),
            CycleOutcome::Accumulating {
                label: "hello".to_string(),
                streak: 1
            }
        );

        // Streak is enough from here on; dwell is not until 400ms after 200ms
        for (millis, streak) in [(300, 2), (400, 3), (500, 4)] {
            let outcome = s.observe(&mut t, input(HELLO, "hello", 0.40), ms(t0, millis));
            assert_eq!(
                outcome,
                CycleOutcome::Accumulating {
                    label: "hello".to_string(),
                    streak
                }
            );
            assert!(t.sentence().is_empty());
        }

        let outcome = s.observe(&mut t, input(HELLO, "hello", 0.40), ms(t0, 600));
        assert_eq!(outcome, CycleOutcome::Committed("hello".to_string()));
        assert_eq!(t.sentence().to_vec(), vec!["hello"]);
        assert_eq!(t.state(), &StabilizerState::Idle);
    }

    #[test]
    fn test_moderate_confidence_waits_for_streak() {
        let s = lenient_stabilizer(3);
        let mut t = tracker();
        let t0 = Utc::now();

        s.observe(&mut t, input(HELLO, "hello", 0.40), t0);
        s.observe(&mut t, input(HELLO, "hello", 0.40), ms(t0, 100));
        let outcome = s.observe(&mut t, input(HELLO, "hello", 0.40), ms(t0, 200));
        assert!(matches!(outcome, CycleOutcome::Accumulating { streak: 1, .. }));

        // Dwell already satisfied, streak still short
        let outcome = s.observe(&mut t, input(HELLO, "hello", 0.40), ms(t0, 1200));
        assert!(matches!(outcome, CycleOutcome::Accumulating { streak: 2, .. }));
        assert!(t.sentence().is_empty());

        let outcome = s.observe(&mut t, input(HELLO, "hello", 0.40), ms(t0, 1300));
        assert_eq!(outcome, CycleOutcome::Committed("hello".to_string()));
    }

    #[test]
    fn test_candidate_change_resets_streak() {
        let s = stabilizer();
        let mut t = tracker();
        let t0 = Utc::now();

        for i in 0..3 {
            s.observe(&mut t, input(THANKS, "thanks", 0.7), ms(t0, i * 100));
        }
        // Two hello votes flip the majority
        s.observe(&mut t, input(HELLO, "hello", 0.7), ms(t0, 300));
        let outcome = s.observe(&mut t, input(HELLO, "hello", 0.7), ms(t0, 400));
        assert_eq!(
            outcome,
            CycleOutcome::Accumulating {
                label: "hello".to_string(),
                streak: 1
            }
        );
        match t.state() {
            StabilizerState::Accumulating { since, .. } => assert_eq!(*since, ms(t0, 400)),
            other => panic!("unexpected state {other:?}"),
        }
    }

    #[test]
    fn test_no_adjacent_duplicates() {
        let s = stabilizer();
        let mut t = tracker();
        let now = Utc::now();

        s.observe(&mut t, input(HELLO, "hello", 0.99), now);
        let outcome = s.observe(&mut t, input(HELLO, "hello", 0.99), ms(now, 5000));
        assert_eq!(
            outcome,
            CycleOutcome::Blocked {
                label: "hello".to_string(),
                reason: BlockReason::Duplicate
            }
        );
        assert_eq!(t.sentence().len(), 1);
    }

    #[test]
    fn test_cooldown_blocks_recommit() {
        let s = stabilizer();
        let mut t = tracker();
        let t0 = Utc::now();

        assert_eq!(
            s.observe(&mut t, input(ILY, "iloveyou", 0.95), t0),
            CycleOutcome::Committed("iloveyou".to_string())
        );
        s.observe(&mut t, input(HELLO, "hello", 0.95), ms(t0, 500));

        // Not a duplicate any more, but still inside the 2s cooldown
        let outcome = s.observe(&mut t, input(ILY, "iloveyou", 0.95), ms(t0, 1000));
        assert_eq!(
            outcome,
            CycleOutcome::Blocked {
                label: "iloveyou".to_string(),
                reason: BlockReason::Cooldown
            }
        );

        let outcome = s.observe(&mut t, input(ILY, "iloveyou", 0.95), ms(t0, 2000));
        assert_eq!(outcome, CycleOutcome::Committed("iloveyou".to_string()));
        assert_eq!(t.sentence().to_vec(), vec!["iloveyou", "hello", "iloveyou"]);
    }

    #[test]
    fn test_reset_pending_keeps_sentence() {
        let s = stabilizer();
        let mut t = tracker();
        let t0 = Utc::now();

        s.observe(&mut t, input(HELLO, "hello", 0.95), t0);
        for i in 1..4 {
            s.observe(&mut t, input(THANKS, "thanks", 0.7), ms(t0, i * 100));
        }
        assert!(t.state().pending_label().is_some());

        t.reset_pending();
        assert!(t.prediction_history().is_empty());
        assert_eq!(t.state(), &StabilizerState::Idle);
        assert_eq!(t.sentence().to_vec(), vec!["hello"]);
    }

    #[test]
    fn test_sentence_is_bounded() {
        let s = stabilizer();
        let mut t = tracker();
        let t0 = Utc::now();
        let labels = [(HELLO, "hello"), (THANKS, "thanks")];
        for i in 0..12 {
            let (idx, label) = labels[i % 2];
            s.observe(&mut t, input(idx, label, 0.95), ms(t0, i as i64 * 100));
        }
        assert_eq!(t.sentence().len(), 5);
        let sentence = t.sentence().to_vec();
        assert!(sentence.windows(2).all(|w| w[0] != w[1]));
    }

    #[test]
    fn test_majority_tie_prefers_lowest_index() {
        let mut config = Config::default();
        config.stabilizer.vote_window = 2;
        config.stabilizer.vote_majority = 1;
        let s = Stabilizer::new(config.stabilizer, config.thresholds, config.signs);
        let mut t = tracker();
        let t0 = Utc::now();

        s.observe(&mut t, input(THANKS, "thanks", 0.7), t0);
        let outcome = s.observe(&mut t, input(HELLO, "hello", 0.7), ms(t0, 100));
        assert_eq!(
            outcome,
            CycleOutcome::Accumulating {
                label: "hello".to_string(),
                streak: 1
            }
        );
    }
}
