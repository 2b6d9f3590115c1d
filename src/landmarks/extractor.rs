//! Boundary to the landmark-detection service.

use crate::landmarks::types::Detection;

/// Turns one raw frame payload into a [`Detection`].
///
/// Returning `None` means extraction failed completely; the pipeline rejects
/// the frame without touching any buffered state.
pub trait LandmarkExtractor: Send + Sync {
    fn extract(&self, payload: &[u8]) -> Option<Detection>;
}

/// Extractor for clients that run detection on-device and send the
/// serialized [`Detection`] as the frame payload.
#[derive(Debug, Clone, Default)]
pub struct JsonLandmarkExtractor;

impl JsonLandmarkExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl LandmarkExtractor for JsonLandmarkExtractor {
    fn extract(&self, payload: &[u8]) -> Option<Detection> {
        match serde_json::from_slice::<Detection>(payload) {
            Ok(detection) => Some(detection),
            Err(e) => {
                tracing::debug!("Landmark payload rejected: {}", e);
                None
            }
        }
    }
}

impl<T: LandmarkExtractor + ?Sized> LandmarkExtractor for std::sync::Arc<T> {
    fn extract(&self, payload: &[u8]) -> Option<Detection> {
        (**self).extract(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_extractor_accepts_detection() {
        let extractor = JsonLandmarkExtractor::new();
        let detection = extractor
            .extract(br#"{"left_hand": [{"x": 0.5, "y": 0.5, "z": 0.0}]}"#)
            .expect("valid payload");
        assert!(detection.has_hands());
    }

    #[test]
    fn test_json_extractor_rejects_garbage() {
        let extractor = JsonLandmarkExtractor::new();
        assert!(extractor.extract(b"\xff\xd8 not json").is_none());
    }

    #[test]
    fn test_empty_object_is_a_frame_without_hands() {
        let extractor = JsonLandmarkExtractor::new();
        let detection = extractor.extract(b"{}").expect("empty detection is valid");
        assert!(!detection.has_hands());
    }
}
