//! Token generator backed by a llama.cpp-compatible completion server.
//!
//! The speech model is served out of process. The prompt is sent as a mix of
//! special token ids and raw text, and the server streams sampled token ids
//! back as server-sent events.

use std::time::Duration;

use anyhow::{bail, Context};
use async_trait::async_trait;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

use crate::streaming::{SpeechVocab, TokenGenerator};
use crate::GenerationParams;

const DEFAULT_REPEAT_PENALTY: f32 = 1.1;

#[derive(Serialize)]
#[serde(untagged)]
enum PromptPiece<'a> {
    Token(u32),
    Text(&'a str),
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    prompt: Vec<PromptPiece<'a>>,
    n_predict: u32,
    temperature: f32,
    top_p: f32,
    repeat_penalty: f32,
    stream: bool,
    return_tokens: bool,
}

#[derive(Debug, Default, Deserialize)]
struct CompletionChunk {
    #[serde(default)]
    tokens: Vec<u32>,
    #[serde(default)]
    stop: bool,
}

#[derive(Debug, Clone)]
pub struct CompletionClient {
    http: reqwest::Client,
    endpoint: String,
    vocab: SpeechVocab,
    repeat_penalty: f32,
}

impl CompletionClient {
    pub fn new(base_url: &str, vocab: SpeechVocab) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .context("failed building HTTP client")?;
        Ok(Self {
            http,
            endpoint: format!("{}/completion", base_url.trim_end_matches('/')),
            vocab,
            repeat_penalty: DEFAULT_REPEAT_PENALTY,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn request<'a>(&self, text: &'a str, params: &GenerationParams) -> CompletionRequest<'a> {
        CompletionRequest {
            prompt: vec![
                PromptPiece::Token(self.vocab.start_of_human()),
                PromptPiece::Text(text),
                PromptPiece::Token(SpeechVocab::END_OF_TEXT),
                PromptPiece::Token(self.vocab.end_of_human()),
            ],
            n_predict: params.max_tokens,
            temperature: params.temperature,
            top_p: params.top_p,
            repeat_penalty: self.repeat_penalty,
            stream: true,
            return_tokens: true,
        }
    }
}

/// Parse one line of the event stream. Blank lines, comments and non-data
/// fields yield `None`.
fn parse_event_line(line: &str) -> Option<anyhow::Result<CompletionChunk>> {
    let payload = line.trim_end_matches('\r').strip_prefix("data:")?.trim_start();
    if payload.is_empty() || payload == "[DONE]" {
        return None;
    }
    Some(serde_json::from_str(payload).with_context(|| format!("malformed completion event: {payload}")))
}

/// Remove the first complete line from `buffer` and return it without its
/// `\n`. Partial lines stay buffered until more bytes arrive.
fn take_line(buffer: &mut Vec<u8>) -> Option<String> {
    let newline = buffer.iter().position(|&b| b == b'\n')?;
    let line: Vec<u8> = buffer.drain(..=newline).collect();
    Some(String::from_utf8_lossy(&line[..newline]).into_owned())
}

#[async_trait]
impl TokenGenerator for CompletionClient {
    async fn generate(
        &self,
        text: &str,
        params: &GenerationParams,
        tokens: mpsc::Sender<u32>,
    ) -> anyhow::Result<usize> {
        let response = self
            .http
            .post(&self.endpoint)
            .json(&self.request(text, params))
            .send()
            .await
            .with_context(|| format!("completion request to {} failed", self.endpoint))?
            .error_for_status()?;

        let end_of_speech = self.vocab.end_of_speech();
        let mut stream = response.bytes_stream();
        let mut buffer: Vec<u8> = Vec::new();
        let mut produced = 0usize;

        while let Some(bytes) = stream.next().await {
            buffer.extend_from_slice(&bytes.context("completion stream interrupted")?);

            while let Some(line) = take_line(&mut buffer) {
                let Some(chunk) = parse_event_line(&line) else {
                    continue;
                };
                let chunk = chunk?;

                for token in chunk.tokens {
                    if tokens.send(token).await.is_err() {
                        bail!("audio writer stopped before generation finished");
                    }
                    produced += 1;
                    if token == end_of_speech {
                        debug!(produced, "end of speech token received");
                        return Ok(produced);
                    }
                }
                if chunk.stop {
                    debug!(produced, "completion stream stopped");
                    return Ok(produced);
                }
            }
        }

        Ok(produced)
    }
}
