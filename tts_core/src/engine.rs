//! One-shot construction of the selected backend.

use std::path::PathBuf;

use tracing::{error, info};

use crate::backend::BackendMode;
use crate::espeak::Espeak;
use crate::streaming::SpeechVocab;
use crate::{Backend, DEFAULT_KITTEN_VOICE};

/// Everything the engines need to find their models and helpers.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub espeak_program: String,
    /// Language passed to `espeak` when phonemizing for the lightweight model.
    pub phoneme_language: String,
    pub kitten_model_dir: PathBuf,
    pub kitten_voice: String,
    pub kani_completion_url: String,
    pub kani_codec_model: PathBuf,
    pub kani_vocab: SpeechVocab,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            espeak_program: "espeak".to_string(),
            phoneme_language: "en-us".to_string(),
            kitten_model_dir: PathBuf::from("models/kitten-tts-nano-0.2"),
            kitten_voice: DEFAULT_KITTEN_VOICE.to_string(),
            kani_completion_url: "http://127.0.0.1:8080".to_string(),
            kani_codec_model: PathBuf::from("models/nemo-nano-codec/decoder.onnx"),
            kani_vocab: SpeechVocab::default(),
        }
    }
}

/// Build the backend for `mode`.
///
/// Failures are logged and yield `None`; the caller keeps serving and reports
/// itself as not ready.
pub async fn initialize(mode: BackendMode, config: &EngineConfig) -> Option<Backend> {
    info!(%mode, "initializing TTS backend");
    let backend = match mode {
        BackendMode::Espeak => init_espeak(config).await,
        BackendMode::Kitten => init_kitten(config).await,
        BackendMode::Kani => init_kani(config).await,
    };
    match &backend {
        Some(b) if b.is_ready() => info!(%mode, sample_rate = b.native_sample_rate(), "TTS backend ready"),
        Some(_) => error!(%mode, "TTS backend partially initialized"),
        None => error!(%mode, "TTS backend failed to initialize"),
    }
    backend
}

async fn init_espeak(config: &EngineConfig) -> Option<Backend> {
    let espeak = Espeak::new(config.espeak_program.clone());
    match espeak.probe().await {
        Ok(version) => {
            info!(program = espeak.program(), %version, "espeak available");
            Some(Backend::Espeak { espeak })
        }
        Err(e) => {
            error!(error = %format!("{e:#}"), "espeak probe failed");
            None
        }
    }
}

#[cfg(feature = "onnx")]
async fn init_kitten(config: &EngineConfig) -> Option<Backend> {
    use std::sync::Arc;

    use tracing::warn;

    use crate::kitten::{KittenModel, KITTEN_MODEL_ID};

    let model_dir = config.kitten_model_dir.clone();
    let phonemizer = Espeak::new(config.espeak_program.clone());
    let language = config.phoneme_language.clone();
    info!(model = KITTEN_MODEL_ID, dir = %model_dir.display(), "loading kitten model");

    let loaded = tokio::task::spawn_blocking(move || KittenModel::load(&model_dir, phonemizer, &language)).await;
    match loaded {
        Ok(Ok(model)) => {
            if !model.voices().any(|v| v == config.kitten_voice) {
                warn!(voice = %config.kitten_voice, "voice missing from the kitten voice table");
            }
            Some(Backend::Kitten {
                generator: Arc::new(model),
                voice: config.kitten_voice.clone(),
            })
        }
        Ok(Err(e)) => {
            error!(error = %format!("{e:#}"), "failed to load kitten model");
            None
        }
        Err(e) => {
            error!(error = %e, "kitten model loader panicked");
            None
        }
    }
}

#[cfg(feature = "onnx")]
async fn init_kani(config: &EngineConfig) -> Option<Backend> {
    use std::sync::Arc;

    use crate::codec::NanoCodecDecoder;
    use crate::completion::CompletionClient;
    use crate::streaming::FrameDecoder;

    let generator = match CompletionClient::new(&config.kani_completion_url, config.kani_vocab) {
        Ok(client) => {
            info!(endpoint = client.endpoint(), "kani generator configured");
            client
        }
        Err(e) => {
            error!(error = %format!("{e:#}"), "failed to build kani generator");
            return None;
        }
    };

    let codec_path = config.kani_codec_model.clone();
    let loaded = tokio::task::spawn_blocking(move || NanoCodecDecoder::load(&codec_path)).await;
    let player: Option<Arc<dyn FrameDecoder>> = match loaded {
        Ok(Ok(codec)) => Some(Arc::new(codec)),
        Ok(Err(e)) => {
            error!(error = %format!("{e:#}"), "failed to load audio player");
            None
        }
        Err(e) => {
            error!(error = %e, "audio player loader panicked");
            None
        }
    };

    Some(Backend::Kani {
        generator: Arc::new(generator),
        player,
        vocab: config.kani_vocab,
    })
}

#[cfg(not(feature = "onnx"))]
async fn init_kitten(_config: &EngineConfig) -> Option<Backend> {
    error!("KITTEN backend requires the `onnx` feature");
    None
}

#[cfg(not(feature = "onnx"))]
async fn init_kani(_config: &EngineConfig) -> Option<Backend> {
    error!("KANI backend requires the `onnx` feature");
    None
}
