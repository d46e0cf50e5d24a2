//! Streaming synthesis helpers.
//!
//! The streaming backend is a language model that emits audio-codec tokens
//! one at a time. [`StreamingAudioWriter`] groups those tokens into codec
//! frames and decodes them incrementally: every `chunk_size` new frames are
//! decoded together with up to `lookback_frames` already-decoded frames of
//! left context, and only the audio belonging to the new frames is kept.
//! The decoded chunks are appended in production order and concatenated
//! once generation finishes.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

use crate::GenerationParams;

/// Number of codebooks per codec frame (one token per codebook).
pub const CODEBOOKS: usize = 4;

/// One codec frame: a code per codebook.
pub type Frame = [i64; CODEBOOKS];

/// Produces raw model tokens for a piece of text.
///
/// Tokens are pushed into `tokens` as soon as they are sampled; the return
/// value is the number of tokens produced.
#[async_trait]
pub trait TokenGenerator: Send + Sync {
    async fn generate(
        &self,
        text: &str,
        params: &GenerationParams,
        tokens: mpsc::Sender<u32>,
    ) -> anyhow::Result<usize>;
}

/// Turns codec frames back into float audio. This is the "player" bound to
/// the generator's speech vocabulary.
pub trait FrameDecoder: Send + Sync {
    /// Audio samples produced per decoded frame.
    fn samples_per_frame(&self) -> usize;

    fn decode(&self, frames: &[Frame]) -> anyhow::Result<Vec<f32>>;
}

/// Layout of the speech tokens appended after the text vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeechVocab {
    pub text_vocab_size: u32,
    pub codebook_size: u32,
}

impl Default for SpeechVocab {
    fn default() -> Self {
        Self {
            text_vocab_size: 64_400,
            codebook_size: 4_032,
        }
    }
}

/// What a single generated token means to the writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    StartOfSpeech,
    EndOfSpeech,
    Audio { codebook: usize, code: i64 },
    Other,
}

impl SpeechVocab {
    pub const END_OF_TEXT: u32 = 2;

    pub fn start_of_speech(&self) -> u32 {
        self.text_vocab_size + 1
    }

    pub fn end_of_speech(&self) -> u32 {
        self.text_vocab_size + 2
    }

    pub fn start_of_human(&self) -> u32 {
        self.text_vocab_size + 3
    }

    pub fn end_of_human(&self) -> u32 {
        self.text_vocab_size + 4
    }

    pub fn audio_tokens_start(&self) -> u32 {
        self.text_vocab_size + 10
    }

    pub fn audio_token(&self, codebook: usize, code: i64) -> u32 {
        self.audio_tokens_start() + codebook as u32 * self.codebook_size + code as u32
    }

    pub fn classify(&self, token: u32) -> TokenKind {
        if token == self.start_of_speech() {
            return TokenKind::StartOfSpeech;
        }
        if token == self.end_of_speech() {
            return TokenKind::EndOfSpeech;
        }
        let start = self.audio_tokens_start();
        let end = start + CODEBOOKS as u32 * self.codebook_size;
        if (start..end).contains(&token) {
            let offset = token - start;
            return TokenKind::Audio {
                codebook: (offset / self.codebook_size) as usize,
                code: (offset % self.codebook_size) as i64,
            };
        }
        TokenKind::Other
    }
}

pub struct StreamingAudioWriter {
    decoder: Arc<dyn FrameDecoder>,
    vocab: SpeechVocab,
    sample_rate: u32,
    chunk_size: usize,
    lookback_frames: usize,
    pending: Vec<i64>,
    frames: Vec<Frame>,
    decoded_frames: usize,
    speech_ended: bool,
    audio_chunks: Vec<Vec<f32>>,
}

impl StreamingAudioWriter {
    pub fn new(
        decoder: Arc<dyn FrameDecoder>,
        vocab: SpeechVocab,
        sample_rate: u32,
        chunk_size: usize,
        lookback_frames: usize,
    ) -> Self {
        Self {
            decoder,
            vocab,
            sample_rate,
            chunk_size: chunk_size.max(1),
            lookback_frames,
            pending: Vec::with_capacity(CODEBOOKS),
            frames: Vec::new(),
            decoded_frames: 0,
            speech_ended: false,
            audio_chunks: Vec::new(),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Reset all buffered state before a new utterance.
    pub fn start(&mut self) {
        self.pending.clear();
        self.frames.clear();
        self.decoded_frames = 0;
        self.speech_ended = false;
        self.audio_chunks.clear();
    }

    /// Feed one generated token. Decodes a chunk whenever `chunk_size` new
    /// frames are buffered.
    pub fn push_token(&mut self, token: u32) -> anyhow::Result<()> {
        if self.speech_ended {
            return Ok(());
        }
        match self.vocab.classify(token) {
            TokenKind::StartOfSpeech => self.pending.clear(),
            TokenKind::EndOfSpeech => self.speech_ended = true,
            TokenKind::Audio { codebook, code } => {
                if codebook != self.pending.len() {
                    // Out of step with the codebook order: drop the partial frame
                    // and resync on the next first-codebook token.
                    self.pending.clear();
                    if codebook != 0 {
                        return Ok(());
                    }
                }
                self.pending.push(code);
                if self.pending.len() == CODEBOOKS {
                    let mut frame = [0i64; CODEBOOKS];
                    frame.copy_from_slice(&self.pending);
                    self.pending.clear();
                    self.frames.push(frame);
                    if self.frames.len() - self.decoded_frames >= self.chunk_size {
                        self.decode_pending_frames()?;
                    }
                }
            }
            TokenKind::Other => {}
        }
        Ok(())
    }

    /// Decode whatever frames are still buffered. A trailing partial frame is
    /// discarded.
    pub fn finalize(&mut self) -> anyhow::Result<()> {
        self.decode_pending_frames()?;
        self.pending.clear();
        debug!(
            frames = self.frames.len(),
            chunks = self.audio_chunks.len(),
            "streaming writer finalized"
        );
        Ok(())
    }

    pub fn audio_chunks(&self) -> &[Vec<f32>] {
        &self.audio_chunks
    }

    /// Concatenate all chunks in the order they were produced.
    pub fn into_audio(self) -> Vec<f32> {
        self.audio_chunks.concat()
    }

    fn decode_pending_frames(&mut self) -> anyhow::Result<()> {
        let total = self.frames.len();
        if total == self.decoded_frames {
            return Ok(());
        }
        let context = self.decoded_frames.min(self.lookback_frames);
        let window = &self.frames[self.decoded_frames - context..total];
        let audio = self.decoder.decode(window)?;

        let skip = (context * self.decoder.samples_per_frame()).min(audio.len());
        self.decoded_frames = total;
        if skip < audio.len() {
            self.audio_chunks.push(audio[skip..].to_vec());
        }
        Ok(())
    }
}
