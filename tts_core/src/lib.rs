pub mod backend;
pub mod completion;
pub mod engine;
pub mod error;
pub mod espeak;
pub mod streaming;
pub mod text;
pub mod wav;

#[cfg(feature = "onnx")]
pub mod codec;
#[cfg(feature = "onnx")]
pub mod kitten;
#[cfg(feature = "onnx")]
mod npz;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

pub use backend::{BackendMode, BackendSelection};
pub use engine::{initialize, EngineConfig};
pub use error::TtsError;
pub use espeak::Espeak;
pub use streaming::{FrameDecoder, SpeechVocab, StreamingAudioWriter, TokenGenerator};

/// Native rate of the streaming backend's codec.
pub const KANI_SAMPLE_RATE: u32 = 22_050;

/// Voice passed to the lightweight model.
pub const DEFAULT_KITTEN_VOICE: &str = "expr-voice-2-f";

// Generated tokens buffered between the generator and the decoding thread.
const TOKEN_CHANNEL_CAPACITY: usize = 256;

/// Sampling and streaming knobs of a single synthesis request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    pub temperature: f32,
    pub max_tokens: u32,
    pub top_p: f32,
    pub chunk_size: usize,
    pub lookback_frames: usize,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: 0.6,
            max_tokens: 1200,
            top_p: 0.95,
            chunk_size: 25,
            lookback_frames: 15,
        }
    }
}

/// One-shot text to float samples.
pub trait SpeechGenerator: Send + Sync {
    fn sample_rate(&self) -> u32;

    /// Blocking; callers run it off the async runtime.
    fn generate(&self, text: &str, voice: &str) -> anyhow::Result<Vec<f32>>;
}

/// Synthesized audio at the backend's native sample rate.
#[derive(Debug, Clone, PartialEq)]
pub enum Audio {
    /// Float samples, nominally in [-1.0, 1.0].
    Float { samples: Vec<f32>, sample_rate: u32 },
    /// Integer PCM already decoded from a WAV stream.
    Pcm16 { samples: Vec<i16>, sample_rate: u32 },
}

impl Audio {
    pub fn sample_rate(&self) -> u32 {
        match self {
            Audio::Float { sample_rate, .. } | Audio::Pcm16 { sample_rate, .. } => *sample_rate,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Audio::Float { samples, .. } => samples.len(),
            Audio::Pcm16 { samples, .. } => samples.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Float audio is clipped and scaled; PCM passes through untouched.
    pub fn into_pcm16(self) -> Vec<i16> {
        match self {
            Audio::Float { samples, .. } => wav::float_to_pcm16(&samples),
            Audio::Pcm16 { samples, .. } => samples,
        }
    }

    /// Encode as a mono 16-bit WAV container labelled with `sample_rate`.
    pub fn into_wav(self, sample_rate: u32) -> Result<Vec<u8>, TtsError> {
        Ok(wav::encode_pcm16(&self.into_pcm16(), sample_rate)?)
    }
}

/// The active text-to-speech backend and exactly the state it needs.
pub enum Backend {
    /// Streaming neural generator plus the codec player bound to its speech
    /// vocabulary. The player is absent when it failed to load.
    Kani {
        generator: Arc<dyn TokenGenerator>,
        player: Option<Arc<dyn FrameDecoder>>,
        vocab: SpeechVocab,
    },
    /// Lightweight one-shot neural model.
    Kitten {
        generator: Arc<dyn SpeechGenerator>,
        voice: String,
    },
    /// External command-line synthesizer whose `--version` probe succeeded.
    Espeak { espeak: Espeak },
}

impl std::fmt::Debug for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Backend::Kani { player, vocab, .. } => f
                .debug_struct("Kani")
                .field("generator", &"<TokenGenerator>")
                .field("player", &player.as_ref().map(|_| "<FrameDecoder>"))
                .field("vocab", vocab)
                .finish(),
            Backend::Kitten { voice, .. } => f
                .debug_struct("Kitten")
                .field("generator", &"<SpeechGenerator>")
                .field("voice", voice)
                .finish(),
            Backend::Espeak { espeak } => f.debug_struct("Espeak").field("espeak", espeak).finish(),
        }
    }
}

impl Backend {
    pub fn mode(&self) -> BackendMode {
        match self {
            Backend::Kani { .. } => BackendMode::Kani,
            Backend::Kitten { .. } => BackendMode::Kitten,
            Backend::Espeak { .. } => BackendMode::Espeak,
        }
    }

    /// Whether every piece needed to serve a request is present.
    pub fn is_ready(&self) -> bool {
        match self {
            Backend::Kani { player, .. } => player.is_some(),
            Backend::Kitten { .. } | Backend::Espeak { .. } => true,
        }
    }

    pub fn native_sample_rate(&self) -> u32 {
        match self {
            Backend::Kani { .. } => KANI_SAMPLE_RATE,
            Backend::Kitten { generator, .. } => generator.sample_rate(),
            Backend::Espeak { .. } => espeak::ESPEAK_SAMPLE_RATE,
        }
    }

    /// Generate the complete audio for `text`. All-or-nothing: any failure
    /// discards partial output.
    pub async fn synthesize(&self, text: &str, params: &GenerationParams) -> Result<Audio, TtsError> {
        match self {
            Backend::Kani {
                generator,
                player,
                vocab,
            } => {
                let player = player.as_ref().ok_or(TtsError::PlayerNotInitialized)?;
                let mut writer = StreamingAudioWriter::new(
                    Arc::clone(player),
                    *vocab,
                    KANI_SAMPLE_RATE,
                    params.chunk_size,
                    params.lookback_frames,
                );
                writer.start();

                // Decoding is CPU bound, so the writer drains tokens on a
                // blocking thread while the generator streams them in.
                let (tx, mut rx) = mpsc::channel::<u32>(TOKEN_CHANNEL_CAPACITY);
                let decoding = tokio::task::spawn_blocking(move || -> anyhow::Result<StreamingAudioWriter> {
                    while let Some(token) = rx.blocking_recv() {
                        writer.push_token(token)?;
                    }
                    writer.finalize()?;
                    Ok(writer)
                });

                let generated = generator.generate(text, params, tx).await;
                let writer = decoding.await??;
                let tokens = generated?;
                debug!(tokens, chunks = writer.audio_chunks().len(), "streaming generation finished");

                if writer.audio_chunks().is_empty() {
                    return Err(TtsError::NoAudio);
                }
                let sample_rate = writer.sample_rate();
                Ok(Audio::Float {
                    samples: writer.into_audio(),
                    sample_rate,
                })
            }
            Backend::Kitten { generator, voice } => {
                let prompt = text::kitten_prompt(text);
                let sample_rate = generator.sample_rate();
                let generator = Arc::clone(generator);
                let voice = voice.clone();
                let samples =
                    tokio::task::spawn_blocking(move || generator.generate(&prompt, &voice)).await??;
                Ok(Audio::Float {
                    samples,
                    sample_rate,
                })
            }
            Backend::Espeak { espeak } => {
                let decoded = espeak.synthesize(&text::espeak_argument(text)).await?;
                Ok(Audio::Pcm16 {
                    samples: decoded.samples,
                    sample_rate: decoded.sample_rate,
                })
            }
        }
    }
}
