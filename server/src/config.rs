// Configuration for the server, read from the environment

use std::path::PathBuf;

use tts_core::EngineConfig;

/// Sample rate written into the WAV header of every response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputSampleRate {
    Fixed(u32),
    /// Whatever the active backend produces.
    Native,
}

pub const DEFAULT_OUTPUT_SAMPLE_RATE: u32 = 24_000;

impl OutputSampleRate {
    pub fn resolve(&self, native: u32) -> u32 {
        match self {
            OutputSampleRate::Fixed(rate) => *rate,
            OutputSampleRate::Native => native,
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.eq_ignore_ascii_case("native") {
            return Some(OutputSampleRate::Native);
        }
        raw.parse().ok().filter(|r| *r > 0).map(OutputSampleRate::Fixed)
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_allowed_origins: Option<Vec<String>>,
    /// Raw `TTS_BACKEND` value; parsed during backend selection.
    pub backend: Option<String>,
    pub output_sample_rate: OutputSampleRate,
    pub engine: EngineConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            cors_allowed_origins: None,
            backend: None,
            output_sample_rate: OutputSampleRate::Fixed(DEFAULT_OUTPUT_SAMPLE_RATE),
            engine: EngineConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from any key lookup. Unset or unparsable values fall
    /// back to their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let port = var("PORT")
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.port);

        let host = var("HOST").unwrap_or(defaults.host);

        let cors_allowed_origins = var("CORS_ALLOWED_ORIGINS").map(|origins| {
            origins
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        });

        let output_sample_rate = var("TTS_OUTPUT_SAMPLE_RATE")
            .and_then(|v| OutputSampleRate::parse(&v))
            .unwrap_or(defaults.output_sample_rate);

        let models_dir = PathBuf::from(var("MODELS_DIR").unwrap_or_else(|| "models".to_string()));
        let engine_defaults = defaults.engine;
        let engine = EngineConfig {
            espeak_program: var("ESPEAK_PROGRAM").unwrap_or(engine_defaults.espeak_program),
            phoneme_language: var("ESPEAK_VOICE").unwrap_or(engine_defaults.phoneme_language),
            kitten_model_dir: var("KITTEN_MODEL_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| models_dir.join("kitten-tts-nano-0.2")),
            kitten_voice: var("KITTEN_VOICE").unwrap_or(engine_defaults.kitten_voice),
            kani_completion_url: var("KANI_COMPLETION_URL")
                .unwrap_or(engine_defaults.kani_completion_url),
            kani_codec_model: var("KANI_CODEC_MODEL")
                .map(PathBuf::from)
                .unwrap_or_else(|| models_dir.join("nemo-nano-codec").join("decoder.onnx")),
            kani_vocab: engine_defaults.kani_vocab,
        };

        Self {
            host,
            port,
            cors_allowed_origins,
            backend: var("TTS_BACKEND"),
            output_sample_rate,
            engine,
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
