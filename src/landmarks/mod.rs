//! Landmark input for the recognition pipeline.
//!
//! Landmark detection itself happens outside this crate. This module defines
//! the types the detector produces and the [`LandmarkExtractor`] boundary the
//! pipeline calls for every incoming frame payload.

pub mod extractor;
pub mod types;

// Re-export commonly used types
pub use extractor::{JsonLandmarkExtractor, LandmarkExtractor};
pub use types::{
    Detection, HandLandmarks, LandmarkFrame, Point3, PosePoint, FRAME_LEN, HAND_POINTS,
};
