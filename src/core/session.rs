//! Per-client session state.
//!
//! Sessions are created lazily on a client's first frame and live until
//! cleared. Each session sits behind its own mutex so one client's frames are
//! processed in arrival order while different clients proceed in parallel.
//! The latest classification result lives in a separate [`ResultSlot`] that
//! only the classification worker writes.

use crate::classifier::reweight::Prediction;
use crate::config::BufferConfig;
use crate::core::history::BoundedHistory;
use crate::core::stabilizer::SentenceTracker;
use crate::landmarks::types::{Detection, LandmarkFrame};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use uuid::Uuid;

/// Client id used when a request does not name one.
pub const DEFAULT_CLIENT_ID: &str = "default";

/// Latest classification outcome for a client.
///
/// Before the first classification completes, and after a hand-loss reset,
/// this is the waiting placeholder.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LastResult {
    /// Weighted and validated prediction; `None` for the waiting placeholder
    pub prediction: Option<Prediction>,
    /// Raw classifier scores
    pub scores: Option<Vec<f64>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl LastResult {
    /// The placeholder shown while no classification is available.
    pub fn waiting() -> Self {
        Self {
            prediction: None,
            scores: None,
            completed_at: None,
        }
    }

    pub fn completed(prediction: Prediction, scores: Vec<f64>, at: DateTime<Utc>) -> Self {
        Self {
            prediction: Some(prediction),
            scores: Some(scores),
            completed_at: Some(at),
        }
    }

    pub fn is_waiting(&self) -> bool {
        self.prediction.is_none()
    }

    /// Confidence shown to the user: the raw top score.
    pub fn display_confidence(&self) -> f64 {
        self.prediction.as_ref().map_or(0.0, |p| p.raw_confidence)
    }
}

impl Default for LastResult {
    fn default() -> Self {
        Self::waiting()
    }
}

/// Shared cell holding a client's latest classification result.
#[derive(Debug, Clone, Default)]
pub struct ResultSlot {
    inner: Arc<Mutex<LastResult>>,
}

impl ResultSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the current result.
    pub fn read(&self) -> LastResult {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn write(&self, result: LastResult) {
        *self.inner.lock().unwrap_or_else(|e| e.into_inner()) = result;
    }
}

/// Everything the pipeline keeps for one client.
#[derive(Debug)]
pub struct Session {
    pub id: Uuid,
    pub client_id: String,
    pub created_at: DateTime<Utc>,
    /// Flattened frames feeding the classifier
    pub window: BoundedHistory<LandmarkFrame>,
    /// Per-frame hand motion magnitudes
    pub motion_history: BoundedHistory<f64>,
    /// Detection of the previously ingested frame
    pub previous_detection: Option<Detection>,
    /// Consecutive frames without any hand
    pub empty_frame_run: u32,
    pub tracker: SentenceTracker,
    result: ResultSlot,
}

impl Session {
    pub fn new(client_id: impl Into<String>, buffers: &BufferConfig, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            client_id: client_id.into(),
            created_at: now,
            window: BoundedHistory::new(buffers.window_size),
            motion_history: BoundedHistory::new(buffers.motion_history),
            previous_detection: None,
            empty_frame_run: 0,
            tracker: SentenceTracker::new(buffers.prediction_history, buffers.sentence),
            result: ResultSlot::new(),
        }
    }

    /// Handle to the result slot, for the classification worker.
    pub fn result_slot(&self) -> ResultSlot {
        self.result.clone()
    }

    pub fn last_result(&self) -> LastResult {
        self.result.read()
    }
}

pub type SessionHandle = Arc<Mutex<Session>>;

/// Map from client id to session.
#[derive(Debug)]
pub struct SessionStore {
    sessions: RwLock<HashMap<String, SessionHandle>>,
    buffers: BufferConfig,
}

impl SessionStore {
    pub fn new(buffers: BufferConfig) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            buffers,
        }
    }

    /// Get a client's session, creating it on first use.
    pub fn get_or_create(&self, client_id: &str, now: DateTime<Utc>) -> SessionHandle {
        if let Some(session) = self.get(client_id) {
            return session;
        }

        let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
        sessions
            .entry(client_id.to_string())
            .or_insert_with(|| {
                tracing::debug!("Creating session for client {}", client_id);
                Arc::new(Mutex::new(Session::new(client_id, &self.buffers, now)))
            })
            .clone()
    }

    pub fn get(&self, client_id: &str) -> Option<SessionHandle> {
        self.sessions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(client_id)
            .cloned()
    }

    /// Drop a client's session. Returns whether it existed.
    pub fn remove(&self, client_id: &str) -> bool {
        self.sessions
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(client_id)
            .is_some()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn client_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .sessions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn prediction() -> Prediction {
        Prediction {
            index: 0,
            label: "hello".to_string(),
            confidence: 0.7,
            raw_index: 0,
            raw_confidence: 0.8,
            valid: true,
        }
    }

    #[test]
    fn test_new_session_is_waiting() {
        let session = Session::new("a", &BufferConfig::default(), Utc::now());
        assert!(session.last_result().is_waiting());
        assert_eq!(session.last_result().display_confidence(), 0.0);
        assert_eq!(session.window.capacity(), 30);
        assert!(session.tracker.sentence().is_empty());
    }

    #[test]
    fn test_result_slot_shared_between_handles() {
        let session = Session::new("a", &BufferConfig::default(), Utc::now());
        let slot = session.result_slot();
        slot.write(LastResult::completed(prediction(), vec![0.8, 0.1, 0.1], Utc::now()));

        let result = session.last_result();
        assert!(!result.is_waiting());
        assert!((result.display_confidence() - 0.8).abs() < 1e-12);
    }

    #[test]
    fn test_store_creates_lazily_and_reuses() {
        let store = SessionStore::new(BufferConfig::default());
        assert!(store.is_empty());

        let a = store.get_or_create("a", Utc::now());
        let again = store.get_or_create("a", Utc::now());
        assert!(Arc::ptr_eq(&a, &again));

        store.get_or_create("b", Utc::now());
        assert_eq!(store.client_ids(), vec!["a", "b"]);

        assert!(store.remove("a"));
        assert!(!store.remove("a"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_concurrent_creation_yields_one_session() {
        let store = Arc::new(SessionStore::new(BufferConfig::default()));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                thread::spawn(move || store.get_or_create("shared", Utc::now()))
            })
            .collect();

        let sessions: Vec<SessionHandle> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(sessions.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
        assert_eq!(store.len(), 1);
    }
}
