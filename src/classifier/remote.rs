//! Client for an external sequence-classifier service.
//!
//! The model runs behind HTTP: a window is POSTed as `{"window": [[...], ...]}`
//! and the service answers `{"scores": [...]}`. Classification workers are
//! plain threads, so [`RemoteClassifier`] wraps the async client with its own
//! current-thread runtime.

use crate::classifier::{ClassifierError, SequenceClassifier};
use crate::landmarks::types::LandmarkFrame;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use std::time::Duration;

/// Remote classifier configuration.
#[derive(Debug, Clone)]
pub struct RemoteClassifierConfig {
    /// Base URL of the service (e.g. `http://127.0.0.1:8501`)
    pub url: String,
    /// Per-request timeout
    pub timeout: Duration,
}

impl RemoteClassifierConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Get the classify endpoint URL.
    pub fn classify_url(&self) -> String {
        format!("{}/v1/classify", self.url.trim_end_matches('/'))
    }

    /// Get the health check endpoint URL.
    pub fn health_url(&self) -> String {
        format!("{}/health", self.url.trim_end_matches('/'))
    }
}

#[derive(Debug, Serialize)]
struct ClassifyRequest<'a> {
    window: Vec<&'a [f64]>,
}

#[derive(Debug, Deserialize)]
struct ClassifyResponse {
    scores: Vec<f64>,
}

/// Async client for the classifier service.
pub struct AsyncRemoteClassifier {
    config: RemoteClassifierConfig,
    client: reqwest::Client,
}

impl AsyncRemoteClassifier {
    pub fn new(config: RemoteClassifierConfig) -> Result<Self, ClassifierError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ClassifierError::Network(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { config, client })
    }

    /// Test connection to the service.
    pub async fn test_connection(&self) -> Result<bool, ClassifierError> {
        let response = self
            .client
            .get(self.config.health_url())
            .send()
            .await
            .map_err(|e| ClassifierError::Network(e.to_string()))?;

        Ok(response.status().is_success())
    }

    /// Score a window.
    pub async fn classify(&self, window: &[LandmarkFrame]) -> Result<Vec<f64>, ClassifierError> {
        let body = ClassifyRequest {
            window: window.iter().map(LandmarkFrame::as_slice).collect(),
        };

        let response = self
            .client
            .post(self.config.classify_url())
            .json(&body)
            .send()
            .await
            .map_err(|e| ClassifierError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ClassifierError::Server {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: ClassifyResponse = response
            .json()
            .await
            .map_err(|e| ClassifierError::Malformed(e.to_string()))?;

        Ok(parsed.scores)
    }
}

/// Blocking classifier for use on worker threads.
pub struct RemoteClassifier {
    inner: AsyncRemoteClassifier,
    runtime: Mutex<tokio::runtime::Runtime>,
}

impl RemoteClassifier {
    pub fn new(config: RemoteClassifierConfig) -> Result<Self, ClassifierError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| ClassifierError::Inference(format!("Failed to create runtime: {e}")))?;

        Ok(Self {
            inner: AsyncRemoteClassifier::new(config)?,
            runtime: Mutex::new(runtime),
        })
    }

    /// Test connection to the service.
    pub fn test_connection(&self) -> Result<bool, ClassifierError> {
        let runtime = self.runtime.lock().unwrap_or_else(|e| e.into_inner());
        runtime.block_on(self.inner.test_connection())
    }
}

impl SequenceClassifier for RemoteClassifier {
    fn classify(&self, window: &[LandmarkFrame]) -> Result<Vec<f64>, ClassifierError> {
        let runtime = self.runtime.lock().unwrap_or_else(|e| e.into_inner());
        runtime.block_on(self.inner.classify(window))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_urls() {
        let config = RemoteClassifierConfig::new("http://127.0.0.1:8501/");
        assert_eq!(config.classify_url(), "http://127.0.0.1:8501/v1/classify");
        assert_eq!(config.health_url(), "http://127.0.0.1:8501/health");
        assert_eq!(config.timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_request_shape() {
        let frames = vec![LandmarkFrame::zeros(); 2];
        let body = ClassifyRequest {
            window: frames.iter().map(LandmarkFrame::as_slice).collect(),
        };
        let json = serde_json::to_value(&body).unwrap();
        let window = json["window"].as_array().unwrap();
        assert_eq!(window.len(), 2);
        assert_eq!(window[0].as_array().unwrap().len(), crate::landmarks::FRAME_LEN);
    }

    #[test]
    fn test_unreachable_service_is_network_error() {
        let config =
            RemoteClassifierConfig::new("http://127.0.0.1:1").with_timeout(Duration::from_millis(200));
        let classifier = RemoteClassifier::new(config).unwrap();
        let result = classifier.classify(&[LandmarkFrame::zeros()]);
        assert!(matches!(result, Err(ClassifierError::Network(_))));
    }
}
