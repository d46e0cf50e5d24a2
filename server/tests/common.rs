//! Common utilities for integration tests

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body, Bytes},
    http::{HeaderMap, Request, StatusCode},
    Router,
};
use tokio::sync::mpsc;
use tower::ServiceExt;

use tts_core::streaming::{Frame, CODEBOOKS};
use tts_core::{
    Backend, FrameDecoder, GenerationParams, SpeechGenerator, SpeechVocab, TokenGenerator,
    DEFAULT_KITTEN_VOICE,
};
use server::{build_router, config::ServerConfig, AppState};

/// Streams a fixed token sequence and remembers the request text.
pub struct ScriptedGenerator {
    pub tokens: Vec<u32>,
    pub prompts: Mutex<Vec<String>>,
}

#[async_trait]
impl TokenGenerator for ScriptedGenerator {
    async fn generate(
        &self,
        text: &str,
        _params: &GenerationParams,
        tokens: mpsc::Sender<u32>,
    ) -> anyhow::Result<usize> {
        self.prompts.lock().unwrap().push(text.to_string());
        for &token in &self.tokens {
            tokens.send(token).await?;
        }
        Ok(self.tokens.len())
    }
}

pub struct FailingGenerator(pub &'static str);

#[async_trait]
impl TokenGenerator for FailingGenerator {
    async fn generate(
        &self,
        _text: &str,
        _params: &GenerationParams,
        _tokens: mpsc::Sender<u32>,
    ) -> anyhow::Result<usize> {
        anyhow::bail!(self.0)
    }
}

/// One sample per frame, equal to the frame's first code scaled down.
pub struct EchoDecoder;

impl FrameDecoder for EchoDecoder {
    fn samples_per_frame(&self) -> usize {
        1
    }

    fn decode(&self, frames: &[Frame]) -> anyhow::Result<Vec<f32>> {
        Ok(frames.iter().map(|f| f[0] as f32 / 100.0).collect())
    }
}

/// One-shot model returning fixed samples and recording its inputs.
pub struct FixedModel {
    pub samples: Vec<f32>,
    pub calls: Mutex<Vec<(String, String)>>,
}

impl FixedModel {
    pub fn new(samples: Vec<f32>) -> Arc<Self> {
        Arc::new(Self {
            samples,
            calls: Mutex::new(Vec::new()),
        })
    }
}

impl SpeechGenerator for FixedModel {
    fn sample_rate(&self) -> u32 {
        24_000
    }

    fn generate(&self, text: &str, voice: &str) -> anyhow::Result<Vec<f32>> {
        self.calls
            .lock()
            .unwrap()
            .push((text.to_string(), voice.to_string()));
        Ok(self.samples.clone())
    }
}

/// Tokens for a short utterance: start marker, `codes.len()` frames, end marker.
pub fn speech_tokens(codes: &[i64]) -> Vec<u32> {
    let vocab = SpeechVocab::default();
    let mut tokens = vec![vocab.start_of_speech()];
    for &code in codes {
        for codebook in 0..CODEBOOKS {
            tokens.push(vocab.audio_token(codebook, if codebook == 0 { code } else { 1 }));
        }
    }
    tokens.push(vocab.end_of_speech());
    tokens
}

pub fn kani_backend(generator: Arc<dyn TokenGenerator>, with_player: bool) -> Backend {
    let player: Option<Arc<dyn FrameDecoder>> = if with_player {
        Some(Arc::new(EchoDecoder))
    } else {
        None
    };
    Backend::Kani {
        generator,
        player,
        vocab: SpeechVocab::default(),
    }
}

pub fn kitten_backend(model: Arc<FixedModel>) -> Backend {
    Backend::Kitten {
        generator: model,
        voice: DEFAULT_KITTEN_VOICE.to_string(),
    }
}

/// Create a test app instance
pub fn create_test_app(backend: Option<Backend>) -> Router {
    create_test_app_with(ServerConfig::default(), backend)
}

pub fn create_test_app_with(config: ServerConfig, backend: Option<Backend>) -> Router {
    build_router(AppState::new(config, backend))
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub fn post_tts(body: impl Into<Body>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/tts")
        .header("content-type", "application/json")
        .body(body.into())
        .unwrap()
}

pub async fn send(app: Router, request: Request<Body>) -> (StatusCode, HeaderMap, Bytes) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, headers, body)
}

pub fn detail(body: &Bytes) -> String {
    let value: serde_json::Value = serde_json::from_slice(body).unwrap();
    value["detail"].as_str().unwrap().to_string()
}
