//! Sequence classification.
//!
//! The classifier model is an external black box: it takes a window of
//! consecutive landmark frames and returns one probability-like score per
//! known sign. This module defines that boundary, the reweighting applied to
//! its output, and the worker pool that runs classifications off the
//! ingestion path.

pub mod reweight;
pub mod worker;

#[cfg(feature = "remote")]
pub mod remote;

use crate::landmarks::types::LandmarkFrame;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

// Re-export commonly used types
pub use reweight::{Prediction, Reweighter, Scrutiny};
pub use worker::{
    ClassificationJob, ClassificationPool, ClassificationWorker, InlineClassification, JobSink,
    SubmitError,
};

#[cfg(feature = "remote")]
pub use remote::{RemoteClassifier, RemoteClassifierConfig};

/// External sequence classifier.
///
/// Implementations may be called from several worker threads, but never
/// concurrently for the same client.
pub trait SequenceClassifier: Send + Sync {
    /// Score a window of consecutive frames. One score per known sign.
    fn classify(&self, window: &[LandmarkFrame]) -> Result<Vec<f64>, ClassifierError>;
}

impl<T: SequenceClassifier + ?Sized> SequenceClassifier for std::sync::Arc<T> {
    fn classify(&self, window: &[LandmarkFrame]) -> Result<Vec<f64>, ClassifierError> {
        (**self).classify(window)
    }
}

/// Classification errors.
#[derive(Debug)]
pub enum ClassifierError {
    /// The model failed to produce output
    Inference(String),
    /// The model produced output of the wrong shape or with non-finite values
    Malformed(String),
    /// Network/HTTP error talking to a remote model
    Network(String),
    /// Remote model returned an error response
    Server { status: u16, message: String },
}

impl std::fmt::Display for ClassifierError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClassifierError::Inference(msg) => write!(f, "Inference failed: {msg}"),
            ClassifierError::Malformed(msg) => write!(f, "Malformed classifier output: {msg}"),
            ClassifierError::Network(msg) => write!(f, "Classifier network error: {msg}"),
            ClassifierError::Server { status, message } => {
                write!(f, "Classifier server error ({status}): {message}")
            }
        }
    }
}

impl std::error::Error for ClassifierError {}

/// Check that a score vector has one finite entry per known sign.
pub fn check_scores(scores: &[f64], classes: usize) -> Result<(), ClassifierError> {
    if scores.len() != classes {
        return Err(ClassifierError::Malformed(format!(
            "expected {classes} scores, got {}",
            scores.len()
        )));
    }
    if let Some(bad) = scores.iter().find(|s| !s.is_finite()) {
        return Err(ClassifierError::Malformed(format!("non-finite score {bad}")));
    }
    Ok(())
}

/// Classifier that replays pre-recorded score vectors in order.
///
/// Once the script runs dry the last vector is repeated. Used to replay
/// recorded sessions offline and in tests.
#[derive(Debug, Default)]
pub struct ScriptedClassifier {
    script: Mutex<VecDeque<Vec<f64>>>,
    last: Mutex<Option<Vec<f64>>>,
    calls: AtomicUsize,
}

impl ScriptedClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// A classifier that always returns the same scores.
    pub fn constant(scores: Vec<f64>) -> Self {
        let classifier = Self::new();
        classifier.push(scores);
        classifier
    }

    /// Queue a score vector for a future call.
    pub fn push(&self, scores: Vec<f64>) {
        self.script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(scores);
    }

    /// Number of windows classified so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl SequenceClassifier for ScriptedClassifier {
    fn classify(&self, _window: &[LandmarkFrame]) -> Result<Vec<f64>, ClassifierError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let next = self
            .script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(scores) = next {
            *last = Some(scores);
        }

        last.clone()
            .ok_or_else(|| ClassifierError::Inference("no scores scripted".to_string()))
    }
}
