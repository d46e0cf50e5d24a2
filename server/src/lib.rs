pub mod config;
pub mod error;

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Request, State},
    http::{header, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{debug, info, warn};
use tts_core::{Backend, BackendMode, GenerationParams};

use crate::config::ServerConfig;
use crate::error::ApiError;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    /// `None` when initialization failed; every `/tts` call then answers 503.
    pub backend: Option<Arc<Backend>>,
}

impl AppState {
    pub fn new(config: ServerConfig, backend: Option<Backend>) -> Self {
        Self {
            config: Arc::new(config),
            backend: backend.map(Arc::new),
        }
    }

    pub fn tts_initialized(&self) -> bool {
        self.backend.as_ref().is_some_and(|b| b.is_ready())
    }

    /// Rate written into response headers, if a backend is present.
    pub fn output_sample_rate(&self) -> Option<u32> {
        self.backend
            .as_ref()
            .map(|b| self.config.output_sample_rate.resolve(b.native_sample_rate()))
    }
}

#[derive(Debug, Deserialize)]
pub struct TtsRequest {
    pub text: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub top_p: Option<f32>,
    pub chunk_size: Option<usize>,
    pub lookback_frames: Option<usize>,
}

impl TtsRequest {
    /// Missing or null fields take their defaults.
    pub fn params(&self) -> GenerationParams {
        let defaults = GenerationParams::default();
        GenerationParams {
            temperature: self.temperature.unwrap_or(defaults.temperature),
            max_tokens: self.max_tokens.unwrap_or(defaults.max_tokens),
            top_p: self.top_p.unwrap_or(defaults.top_p),
            chunk_size: self.chunk_size.unwrap_or(defaults.chunk_size),
            lookback_frames: self.lookback_frames.unwrap_or(defaults.lookback_frames),
        }
    }
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub tts_initialized: bool,
}

/// Build the HTTP application with its middleware stack.
pub fn build_router(state: AppState) -> Router {
    let middleware_stack = ServiceBuilder::new()
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(state.config.cors_allowed_origins.as_deref()))
        .into_inner();

    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/tts", post(tts_endpoint))
        .layer(axum::middleware::from_fn(add_request_id))
        .layer(middleware_stack)
        .with_state(state)
}

/// CORS policy: any method and header, any origin unless an explicit list
/// is configured.
pub fn cors_layer(allowed_origins: Option<&[String]>) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods(Any)
        .allow_headers(Any);

    let origins: Vec<HeaderValue> = allowed_origins
        .unwrap_or_default()
        .iter()
        .filter_map(|origin| origin.parse::<HeaderValue>().ok())
        .collect();

    if origins.is_empty() {
        if allowed_origins.is_some() {
            warn!("CORS_ALLOWED_ORIGINS has no valid origins, allowing all origins");
        }
        base.allow_origin(Any)
    } else {
        info!("CORS configured for {} origin(s)", origins.len());
        base.allow_origin(AllowOrigin::list(origins))
    }
}

// Request ID middleware for tracing
async fn add_request_id(mut request: Request, next: Next) -> Response {
    let request_id = uuid::Uuid::new_v4().to_string();
    let header_value = HeaderValue::from_str(&request_id).ok();
    if let Some(value) = header_value.clone() {
        request.headers_mut().insert("x-request-id", value);
    }
    let mut response = next.run(request).await;
    if let Some(value) = header_value {
        response.headers_mut().insert("x-request-id", value);
    }
    response
}

pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        tts_initialized: state.tts_initialized(),
    })
}

pub async fn root(State(state): State<AppState>) -> Json<serde_json::Value> {
    let mode = state.backend.as_ref().map(|b| b.mode());
    let name = match mode {
        Some(BackendMode::Kitten) => "Kitten TTS API",
        _ => "Kani TTS API",
    };
    Json(json!({
        "name": name,
        "version": env!("CARGO_PKG_VERSION"),
        "backend": mode.map(|m| m.to_string()),
        "sample_rate": state.output_sample_rate(),
        "endpoints": {
            "/tts": "POST - Generate complete audio",
            "/health": "GET - Health check"
        }
    }))
}

/// Generate a complete WAV file for the request text.
///
/// Readiness is checked before the body is looked at, so an uninitialized
/// server answers 503 whatever the client sent.
pub async fn tts_endpoint(
    State(state): State<AppState>,
    payload: Result<Json<TtsRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let backend = state.backend.as_ref().ok_or(ApiError::NotInitialized)?;
    if !backend.is_ready() {
        return Err(ApiError::PlayerNotInitialized);
    }

    // Text and sampling values go to the engine as sent.
    let Json(req) = payload?;
    let params = req.params();

    let audio = backend.synthesize(&req.text, &params).await?;
    let sample_rate = state.config.output_sample_rate.resolve(audio.sample_rate());
    debug!(
        samples = audio.len(),
        native_rate = audio.sample_rate(),
        sample_rate,
        "encoding speech"
    );
    let wav = audio.into_wav(sample_rate)?;

    Ok((
        [
            (header::CONTENT_TYPE, "audio/wav"),
            (header::CONTENT_DISPOSITION, "attachment; filename=speech.wav"),
        ],
        wav,
    )
        .into_response())
}
