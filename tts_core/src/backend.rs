//! Backend mode selection.
//!
//! The mode is chosen once at startup: an explicit command-line choice wins,
//! then the `TTS_BACKEND` environment value, then a probe of what is actually
//! installed on disk.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;
use tracing::{info, warn};

use crate::engine::EngineConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendMode {
    /// Streaming token generator plus codec player.
    Kani,
    /// Lightweight one-shot neural model.
    Kitten,
    /// `espeak` subprocess.
    Espeak,
}

impl BackendMode {
    pub const ALL: [BackendMode; 3] = [BackendMode::Kani, BackendMode::Kitten, BackendMode::Espeak];

    pub fn as_str(&self) -> &'static str {
        match self {
            BackendMode::Kani => "KANI",
            BackendMode::Kitten => "KITTEN",
            BackendMode::Espeak => "ESPEAK",
        }
    }

    /// Whether the engine behind this mode is compiled into this build.
    pub fn is_compiled_in(&self) -> bool {
        match self {
            BackendMode::Kani | BackendMode::Kitten => cfg!(feature = "onnx"),
            BackendMode::Espeak => true,
        }
    }
}

impl fmt::Display for BackendMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown backend '{0}', expected one of KANI, KITTEN, ESPEAK")]
pub struct UnknownBackend(pub String);

impl FromStr for BackendMode {
    type Err = UnknownBackend;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BackendMode::ALL
            .into_iter()
            .find(|mode| mode.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownBackend(s.to_string()))
    }
}

/// Where the chosen mode came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionSource {
    CommandLine,
    Environment,
    Detected(String),
}

impl fmt::Display for SelectionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectionSource::CommandLine => f.write_str("command line"),
            SelectionSource::Environment => f.write_str("TTS_BACKEND"),
            SelectionSource::Detected(reason) => write!(f, "auto-detected: {reason}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendSelection {
    pub mode: BackendMode,
    pub source: SelectionSource,
}

/// Pick the backend mode. An unparsable environment value is logged and
/// ignored so the probe still runs.
pub fn select(
    cli: Option<BackendMode>,
    env: Option<&str>,
    config: &EngineConfig,
) -> BackendSelection {
    if let Some(mode) = cli {
        return BackendSelection {
            mode,
            source: SelectionSource::CommandLine,
        };
    }

    if let Some(raw) = env.filter(|v| !v.trim().is_empty()) {
        match raw.parse() {
            Ok(mode) => {
                return BackendSelection {
                    mode,
                    source: SelectionSource::Environment,
                }
            }
            Err(e) => warn!(error = %e, "ignoring TTS_BACKEND"),
        }
    }

    let selection = detect(config);
    info!(mode = %selection.mode, source = %selection.source, "backend detected");
    selection
}

fn detect(config: &EngineConfig) -> BackendSelection {
    let detected = |mode, reason: String| BackendSelection {
        mode,
        source: SelectionSource::Detected(reason),
    };

    if !cfg!(feature = "onnx") {
        return detected(
            BackendMode::Espeak,
            "neural engines not compiled in".to_string(),
        );
    }
    if config.kani_codec_model.is_file() {
        return detected(
            BackendMode::Kani,
            format!("codec model found at {}", config.kani_codec_model.display()),
        );
    }
    let kitten_config = config.kitten_model_dir.join("config.json");
    if kitten_config.is_file() {
        return detected(
            BackendMode::Kitten,
            format!("model config found at {}", kitten_config.display()),
        );
    }
    detected(
        BackendMode::Espeak,
        "no neural model files found".to_string(),
    )
}
