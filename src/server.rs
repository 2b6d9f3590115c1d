//! HTTP server for streaming frames from browser clients.
//!
//! This module provides an HTTP server that:
//! - Accepts frames via POST /predict (JSON, data-URL frame payload)
//! - Runs them through the shared [`IngestPipeline`]
//! - Returns the latest prediction and the committed sentence
//!
//! # Architecture
//!
//! ```text
//! Browser ──→ POST /predict ──→ IngestPipeline ──→ worker pool ──→ classifier
//!    ↑                               │
//!    └──── prediction + sentence ────┘
//! ```

use crate::pipeline::{FrameRequest, IngestError, IngestPipeline};
use crate::stats::StatsSnapshot;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind: IpAddr,
    /// Port to bind to (0 for random)
    pub port: u16,
}

impl ServerConfig {
    /// Create a new server configuration listening on localhost
    pub fn new(port: u16) -> Self {
        Self {
            bind: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port,
        }
    }

    pub fn with_bind(mut self, bind: IpAddr) -> Self {
        self.bind = bind;
        self
    }
}

/// Shared server state
pub struct ServerState {
    pipeline: Arc<IngestPipeline>,
}

/// Frame submitted by a client
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PredictRequest {
    /// Frame payload, optionally as a `data:` URL
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default, rename = "clientId")]
    pub client_id: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
}

/// Response from the predict endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictResponse {
    pub prediction: String,
    pub english_prediction: String,
    pub confidence: f64,
    pub adjusted_confidence: f64,
    pub scores: Option<Vec<f64>>,
    pub frames_collected: usize,
    pub sentence: Vec<String>,
    pub is_valid_sign: bool,
    pub motion: f64,
    pub success: bool,
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Counters plus live session count
#[derive(Serialize)]
pub struct StatsResponse {
    #[serde(flatten)]
    pub stats: StatsSnapshot,
    pub sessions: usize,
}

/// Response from the session clear endpoint
#[derive(Serialize)]
pub struct ClearResponse {
    pub client_id: String,
    pub cleared: bool,
}

/// Error response
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    pub success: bool,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, code: &str, error: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
            code: code.to_string(),
            success: false,
        }),
    )
}

/// Decode a frame payload, accepting both `data:<mime>;base64,<data>` URLs
/// and bare base64.
pub fn decode_frame(image: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let data = image.split_once(',').map_or(image, |(_, data)| data);
    STANDARD.decode(data.trim())
}

/// GET /health
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// POST /predict
///
/// Feeds one frame into the client's session and returns the latest
/// completed prediction with the committed sentence.
async fn predict(
    State(state): State<Arc<ServerState>>,
    Json(request): Json<PredictRequest>,
) -> Result<Json<PredictResponse>, ApiError> {
    let image = request
        .image
        .filter(|image| !image.is_empty())
        .ok_or_else(|| api_error(StatusCode::BAD_REQUEST, "NO_IMAGE", "No image provided"))?;

    let payload = decode_frame(&image).map_err(|e| {
        api_error(
            StatusCode::BAD_REQUEST,
            "INVALID_IMAGE",
            format!("Invalid frame encoding: {e}"),
        )
    })?;

    let frame = FrameRequest {
        client_id: request.client_id,
        language: request.language,
        payload,
    };

    let pipeline = Arc::clone(&state.pipeline);
    let result = tokio::task::spawn_blocking(move || pipeline.ingest(frame))
        .await
        .map_err(|e| {
            tracing::error!("Ingest task failed: {}", e);
            api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "Frame processing failed",
            )
        })?;

    let snapshot = result.map_err(|e| {
        let code = match e {
            IngestError::EmptyPayload => "NO_IMAGE",
            IngestError::ExtractionFailed => "EXTRACTION_FAILED",
        };
        api_error(StatusCode::BAD_REQUEST, code, e.to_string())
    })?;

    Ok(Json(PredictResponse {
        prediction: snapshot.prediction,
        english_prediction: snapshot.canonical_prediction,
        confidence: snapshot.confidence,
        adjusted_confidence: snapshot.adjusted_confidence,
        scores: snapshot.scores,
        frames_collected: snapshot.frames_collected,
        sentence: snapshot.sentence,
        is_valid_sign: snapshot.is_valid_sign,
        motion: snapshot.motion,
        success: true,
    }))
}

/// GET /stats
async fn stats(State(state): State<Arc<ServerState>>) -> Json<StatsResponse> {
    Json(StatsResponse {
        stats: state.pipeline.stats().snapshot(),
        sessions: state.pipeline.session_count(),
    })
}

/// POST /sessions/:client_id/clear
async fn clear_session(
    State(state): State<Arc<ServerState>>,
    Path(client_id): Path<String>,
) -> Result<Json<ClearResponse>, ApiError> {
    if state.pipeline.clear_session(&client_id) {
        Ok(Json(ClearResponse {
            client_id,
            cleared: true,
        }))
    } else {
        Err(api_error(
            StatusCode::NOT_FOUND,
            "SESSION_NOT_FOUND",
            format!("No session for client {client_id}"),
        ))
    }
}

/// Build the router without binding a socket
pub fn router(pipeline: Arc<IngestPipeline>) -> Router {
    let state = Arc::new(ServerState { pipeline });

    Router::new()
        .route("/health", get(health))
        .route("/predict", post(predict))
        .route("/stats", get(stats))
        .route("/sessions/:client_id/clear", post(clear_session))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Run the HTTP server
pub async fn run(
    config: ServerConfig,
    pipeline: Arc<IngestPipeline>,
) -> anyhow::Result<(SocketAddr, tokio::sync::oneshot::Sender<()>)> {
    let app = router(pipeline);

    let addr = SocketAddr::new(config.bind, config.port);
    let listener = TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    tracing::info!("Sign stream server listening on http://{}", actual_addr);

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
                tracing::info!("Server shutdown signal received");
            })
            .await
        {
            tracing::error!("Server error: {}", e);
        }
    });

    Ok((actual_addr, shutdown_tx))
}
