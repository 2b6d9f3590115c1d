//! Core per-client processing.
//!
//! This module contains:
//! - Bounded histories for windows, motion and predictions
//! - Motion analysis between consecutive detections
//! - Heuristic sign validation
//! - Temporal stabilization into sentences
//! - Session state

pub mod history;
pub mod motion;
pub mod session;
pub mod stabilizer;
pub mod validator;

// Re-export commonly used types
pub use history::BoundedHistory;
pub use motion::{frame_motion, hand_motion};
pub use session::{LastResult, ResultSlot, Session, SessionHandle, SessionStore, DEFAULT_CLIENT_ID};
pub use stabilizer::{
    BlockReason, CycleInput, CycleOutcome, SentenceTracker, Stabilizer, StabilizerState,
};
pub use validator::{FingerShape, MotionBand, SignRule, SignValidator};
