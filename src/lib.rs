//! Sign Stream - real-time sign recognition stabilizer.
//!
//! Clients stream video frames one at a time. Each frame is reduced to body,
//! face and hand landmarks by an external detector; a sliding window of those
//! frames is scored by an external sequence classifier. This crate turns the
//! noisy stream of per-window scores into a stable, deduplicated sentence of
//! recognized signs per client.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                          Sign Stream                          │
//! ├───────────────────────────────────────────────────────────────┤
//! │  ┌────────────┐   ┌────────────┐   ┌───────────────────────┐  │
//! │  │  Landmark  │──▶│  Session   │──▶│ Classification worker │  │
//! │  │ extractor  │   │  (window,  │   │ (classify, reweight,  │  │
//! │  └────────────┘   │  motion)   │   │  validate)            │  │
//! │                   └────────────┘   └───────────────────────┘  │
//! │                         │                      │              │
//! │                         ▼                      ▼              │
//! │                   ┌────────────┐        ┌─────────────┐       │
//! │                   │ Stabilizer │◀───────│ Last result │       │
//! │                   │ (sentence) │        └─────────────┘       │
//! │                   └────────────┘                              │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! Ingestion never waits for classification: every frame sees the most
//! recently completed result, which is at least one window behind.
//!
//! # Example
//!
//! ```no_run
//! use signstream::classifier::ScriptedClassifier;
//! use signstream::landmarks::JsonLandmarkExtractor;
//! use signstream::pipeline::{Dispatch, FrameRequest, IngestPipeline};
//! use signstream::Config;
//! use std::sync::Arc;
//!
//! let pipeline = IngestPipeline::build(
//!     Config::default(),
//!     Arc::new(JsonLandmarkExtractor::new()),
//!     Arc::new(ScriptedClassifier::constant(vec![0.05, 0.05, 0.9])),
//!     Dispatch::Pool,
//! )
//! .expect("Failed to start workers");
//!
//! let frame = FrameRequest::new("client-1", br#"{"right_hand": null}"#.to_vec());
//! let snapshot = pipeline.ingest(frame).expect("Frame rejected");
//! println!("{} ({:.2})", snapshot.prediction, snapshot.confidence);
//! ```

pub mod classifier;
pub mod config;
pub mod core;
pub mod landmarks;
pub mod locale;
pub mod pipeline;
pub mod stats;

#[cfg(feature = "server")]
pub mod server;

#[cfg(test)]
pub(crate) mod testing;

// Re-export key types at crate root for convenience
pub use classifier::{ClassifierError, Prediction, ScriptedClassifier, SequenceClassifier};
pub use config::{Config, ConfigError, SignCatalog, SignSpec};
pub use crate::core::{LastResult, SessionStore, Stabilizer, StabilizerState};
pub use landmarks::{Detection, JsonLandmarkExtractor, LandmarkExtractor, LandmarkFrame};
pub use locale::LocaleTable;
pub use pipeline::{DisplaySnapshot, Dispatch, FrameRequest, IngestError, IngestPipeline};
pub use stats::{PipelineStats, SharedStats, StatsSnapshot};

// Remote classifier re-exports (when enabled)
#[cfg(feature = "remote")]
pub use classifier::{RemoteClassifier, RemoteClassifierConfig};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
