//! Ingest pipeline.
//!
//! Every incoming frame goes through [`IngestPipeline::ingest`]:
//!
//! 1. Landmarks are extracted; a failed extraction rejects the frame before
//!    any session state changes.
//! 2. Motion against the previous frame is recorded and the flattened frame
//!    joins the client's window.
//! 3. Sustained hand loss resets pending tracking.
//! 4. With a full window, a copy is handed to the classification worker and
//!    the most recently completed result drives the stabilizer.
//!
//! Ingestion never waits for the classification it submits, so the returned
//! snapshot always reflects an earlier window.

use crate::classifier::reweight::Reweighter;
use crate::classifier::worker::{
    ClassificationJob, ClassificationPool, ClassificationWorker, InlineClassification, JobSink,
};
use crate::classifier::SequenceClassifier;
use crate::config::Config;
use crate::core::motion::frame_motion;
use crate::core::session::{LastResult, SessionStore, DEFAULT_CLIENT_ID};
use crate::core::stabilizer::{CycleInput, CycleOutcome, Stabilizer};
use crate::core::validator::SignValidator;
use crate::landmarks::extractor::LandmarkExtractor;
use crate::locale::WAITING_LABEL;
use crate::stats::{create_shared_stats, SharedStats};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// One frame from a client.
#[derive(Debug, Clone, Default)]
pub struct FrameRequest {
    /// Client identifier; [`DEFAULT_CLIENT_ID`] when absent
    pub client_id: Option<String>,
    /// Target language for display labels
    pub language: Option<String>,
    /// Raw frame payload handed to the landmark extractor
    pub payload: Vec<u8>,
}

impl FrameRequest {
    pub fn new(client_id: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            client_id: Some(client_id.into()),
            language: None,
            payload,
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }
}

/// What a client sees after each frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplaySnapshot {
    pub client_id: String,
    /// Display label, localized when a language was requested
    pub prediction: String,
    /// Untranslated label
    pub canonical_prediction: String,
    /// Unweighted top score of the latest completed classification
    pub confidence: f64,
    /// Confidence after weighting and validation
    pub adjusted_confidence: f64,
    /// Raw classifier scores; absent until a classification completes
    pub scores: Option<Vec<f64>>,
    pub is_valid_sign: bool,
    /// Committed sentence, oldest first, localized
    pub sentence: Vec<String>,
    /// Frames currently buffered in the window
    pub frames_collected: usize,
    /// Hand motion of this frame
    pub motion: f64,
    /// Label committed by this frame, if any
    pub committed: Option<String>,
    /// Candidate the stabilizer is accumulating, if any
    pub pending: Option<String>,
}

/// Ingestion errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestError {
    /// The request carried no frame payload
    EmptyPayload,
    /// Landmark extraction failed; the frame was not buffered
    ExtractionFailed,
}

impl std::fmt::Display for IngestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IngestError::EmptyPayload => write!(f, "No frame provided"),
            IngestError::ExtractionFailed => write!(f, "Failed to extract keypoints"),
        }
    }
}

impl std::error::Error for IngestError {}

/// How classification jobs are run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Background worker pool sized by the configuration
    Pool,
    /// On the ingesting thread, before `ingest` returns
    Inline,
}

/// The per-frame ingestion path shared by all clients.
pub struct IngestPipeline {
    config: Config,
    extractor: Arc<dyn LandmarkExtractor>,
    sink: Arc<dyn JobSink>,
    stabilizer: Stabilizer,
    sessions: SessionStore,
    stats: SharedStats,
}

impl IngestPipeline {
    pub fn new(
        config: Config,
        extractor: Arc<dyn LandmarkExtractor>,
        sink: Arc<dyn JobSink>,
        stats: SharedStats,
    ) -> Self {
        let stabilizer = Stabilizer::new(
            config.stabilizer.clone(),
            config.thresholds.clone(),
            config.signs.clone(),
        );
        let sessions = SessionStore::new(config.buffers.clone());

        Self {
            config,
            extractor,
            sink,
            stabilizer,
            sessions,
            stats,
        }
    }

    /// Assemble a pipeline with its classification worker.
    pub fn build(
        config: Config,
        extractor: Arc<dyn LandmarkExtractor>,
        classifier: Arc<dyn SequenceClassifier>,
        dispatch: Dispatch,
    ) -> std::io::Result<Self> {
        let stats = create_shared_stats();
        let validator = SignValidator::new(
            config.signs.clone(),
            config.thresholds.motion,
            config.validator,
        );
        let reweighter = Reweighter::new(config.signs.clone(), config.thresholds.clone(), validator);
        let worker = ClassificationWorker::new(
            classifier,
            reweighter,
            config.signs.len(),
            Arc::clone(&stats),
        );

        let sink: Arc<dyn JobSink> = match dispatch {
            Dispatch::Pool => Arc::new(ClassificationPool::new(worker, &config.worker)?),
            Dispatch::Inline => Arc::new(InlineClassification::new(worker)),
        };

        Ok(Self::new(config, extractor, sink, stats))
    }

    /// Ingest a frame at the current time.
    pub fn ingest(&self, request: FrameRequest) -> Result<DisplaySnapshot, IngestError> {
        self.ingest_at(request, Utc::now())
    }

    /// Ingest a frame observed at `now`.
    pub fn ingest_at(
        &self,
        request: FrameRequest,
        now: DateTime<Utc>,
    ) -> Result<DisplaySnapshot, IngestError> {
        if request.payload.is_empty() {
            self.stats.record_frame_rejected();
            return Err(IngestError::EmptyPayload);
        }
        let Some(detection) = self.extractor.extract(&request.payload) else {
            self.stats.record_frame_rejected();
            return Err(IngestError::ExtractionFailed);
        };

        let client_id = request
            .client_id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| DEFAULT_CLIENT_ID.to_string());
        let language = request.language.as_deref();

        let handle = self.sessions.get_or_create(&client_id, now);
        let mut session = handle.lock().unwrap_or_else(|e| e.into_inner());
        self.stats.record_frame_ingested();

        let motion = frame_motion(&detection, session.previous_detection.as_ref());
        session.motion_history.push(motion);
        session.window.push(detection.to_frame());

        if detection.has_hands() {
            session.empty_frame_run = 0;
        } else {
            session.empty_frame_run = session.empty_frame_run.saturating_add(1);
        }
        let limit = self.config.stabilizer.empty_frame_limit;
        if session.empty_frame_run > limit {
            if session.empty_frame_run - 1 == limit {
                debug!("Client {}: hands lost, resetting pending signs", client_id);
                self.stats.record_hand_loss_reset();
            }
            session.tracker.reset_pending();
            session.result_slot().write(LastResult::waiting());
        }

        let last = session.last_result();
        let mut committed = None;

        if session.window.is_full() {
            let job = ClassificationJob {
                client_id: client_id.clone(),
                window: session.window.to_vec(),
                detection: detection.clone(),
                motion_history: session.motion_history.to_vec(),
                slot: session.result_slot(),
                submitted_at: now,
            };
            if let Err(e) = self.sink.submit(job) {
                debug!("Client {}: window not classified: {}", client_id, e);
            }

            if let Some(prediction) = &last.prediction {
                let input = CycleInput {
                    raw_index: prediction.raw_index,
                    label: &prediction.label,
                    confidence: prediction.confidence,
                };
                if let CycleOutcome::Committed(label) =
                    self.stabilizer.observe(&mut session.tracker, input, now)
                {
                    info!("Client {}: committed '{}'", client_id, label);
                    self.stats.record_commit();
                    committed = Some(label);
                }
            }
        }

        session.previous_detection = Some(detection);

        let locales = &self.config.locales;
        let label = last
            .prediction
            .as_ref()
            .map_or(WAITING_LABEL, |p| p.label.as_str());
        let display = locales.localize(label, language);

        Ok(DisplaySnapshot {
            canonical_prediction: locales.canonical(&display, language),
            prediction: display,
            confidence: last.display_confidence(),
            adjusted_confidence: last.prediction.as_ref().map_or(0.0, |p| p.confidence),
            scores: last.scores.clone(),
            is_valid_sign: last.prediction.as_ref().map_or(false, |p| p.valid),
            sentence: locales.localize_all(session.tracker.sentence().iter(), language),
            frames_collected: session.window.len(),
            motion,
            committed,
            pending: session.tracker.state().pending_label().map(str::to_string),
            client_id,
        })
    }

    /// Drop a client's session. A later frame starts a fresh one.
    pub fn clear_session(&self, client_id: &str) -> bool {
        let removed = self.sessions.remove(client_id);
        if removed {
            info!("Cleared session for client {}", client_id);
        }
        removed
    }

    /// Committed sentence of a client, canonical labels.
    pub fn sentence(&self, client_id: &str) -> Option<Vec<String>> {
        self.sessions.get(client_id).map(|handle| {
            handle
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .tracker
                .sentence()
                .to_vec()
        })
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn stats(&self) -> &SharedStats {
        &self.stats
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::ScriptedClassifier;
    use crate::landmarks::JsonLandmarkExtractor;
    use crate::testing::ily_detection;

    fn pipeline(scores: Vec<f64>) -> IngestPipeline {
        IngestPipeline::build(
            Config::default(),
            Arc::new(JsonLandmarkExtractor::new()),
            Arc::new(ScriptedClassifier::constant(scores)),
            Dispatch::Inline,
        )
        .unwrap()
    }

    fn frame(client: &str) -> FrameRequest {
        FrameRequest::new(client, serde_json::to_vec(&ily_detection()).unwrap())
    }

    #[test]
    fn test_first_frame_is_waiting() {
        let p = pipeline(vec![0.0, 0.0, 1.0]);
        let snapshot = p.ingest(frame("a")).unwrap();
        assert_eq!(snapshot.prediction, WAITING_LABEL);
        assert_eq!(snapshot.confidence, 0.0);
        assert!(snapshot.scores.is_none());
        assert!(!snapshot.is_valid_sign);
        assert_eq!(snapshot.frames_collected, 1);
        assert_eq!(p.stats().snapshot().jobs_queued, 0);
    }

    #[test]
    fn test_missing_client_id_uses_default() {
        let p = pipeline(vec![0.0, 0.0, 1.0]);
        let request = FrameRequest {
            client_id: None,
            language: None,
            payload: serde_json::to_vec(&ily_detection()).unwrap(),
        };
        let snapshot = p.ingest(request).unwrap();
        assert_eq!(snapshot.client_id, DEFAULT_CLIENT_ID);
        assert!(p.sentence(DEFAULT_CLIENT_ID).is_some());
    }

    #[test]
    fn test_rejected_frame_creates_no_session() {
        let p = pipeline(vec![0.0, 0.0, 1.0]);
        let err = p.ingest(FrameRequest::new("a", b"garbage".to_vec())).unwrap_err();
        assert_eq!(err, IngestError::ExtractionFailed);
        assert_eq!(p.session_count(), 0);

        let err = p.ingest(FrameRequest::new("a", Vec::new())).unwrap_err();
        assert_eq!(err, IngestError::EmptyPayload);
        assert_eq!(p.stats().snapshot().frames_rejected, 2);
    }

    #[test]
    fn test_tagalog_waiting_placeholder() {
        let p = pipeline(vec![0.0, 0.0, 1.0]);
        let snapshot = p.ingest(frame("a").with_language("tagalog")).unwrap();
        assert_eq!(snapshot.prediction, "Naghihintay ng kamay...");
        assert_eq!(snapshot.canonical_prediction, WAITING_LABEL);
    }

    #[test]
    fn test_empty_hand_lists_trigger_hand_loss() {
        let p = pipeline(vec![0.0, 0.0, 1.0]);
        let payload = br#"{"right_hand": [], "left_hand": []}"#.to_vec();
        let mut snapshot = p.ingest(frame("a")).unwrap();
        for _ in 0..=Config::default().stabilizer.empty_frame_limit {
            snapshot = p.ingest(FrameRequest::new("a", payload.clone())).unwrap();
        }
        assert_eq!(snapshot.prediction, WAITING_LABEL);
        assert_eq!(p.stats().snapshot().hand_loss_resets, 1);
    }

    #[test]
    fn test_unbounded_empty_frame_limit_never_resets() {
        let mut config = Config::default();
        config.stabilizer.empty_frame_limit = u32::MAX;
        let p = IngestPipeline::build(
            config,
            Arc::new(JsonLandmarkExtractor::new()),
            Arc::new(ScriptedClassifier::constant(vec![0.0, 0.0, 1.0])),
            Dispatch::Inline,
        )
        .unwrap();
        {
            let handle = p.sessions.get_or_create("a", Utc::now());
            handle.lock().unwrap().empty_frame_run = u32::MAX - 1;
        }

        for _ in 0..3 {
            p.ingest(FrameRequest::new("a", b"{}".to_vec())).unwrap();
        }
        assert_eq!(p.stats().snapshot().hand_loss_resets, 0);
    }

    #[test]
    fn test_clear_session() {
        let p = pipeline(vec![0.0, 0.0, 1.0]);
        p.ingest(frame("a")).unwrap();
        assert!(p.clear_session("a"));
        assert!(!p.clear_session("a"));
        assert_eq!(p.session_count(), 0);

        let snapshot = p.ingest(frame("a")).unwrap();
        assert_eq!(snapshot.frames_collected, 1);
    }
}
