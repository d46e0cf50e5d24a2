//! Lightweight one-shot neural model (KittenTTS ONNX export).
//!
//! Pipeline: `espeak` IPA phonemes → symbol ids → ONNX inference with a
//! per-voice style vector → trimmed 24 kHz waveform.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use anyhow::{anyhow, bail, Context};
use ndarray::{Array1, Array2};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Tensor;
use serde::Deserialize;
use tracing::debug;

use crate::espeak::Espeak;
use crate::npz::{self, Matrix};
use crate::SpeechGenerator;

pub const KITTEN_MODEL_ID: &str = "KittenML/kitten-tts-nano-0.2";
pub const KITTEN_SAMPLE_RATE: u32 = 24_000;

const PAD_ID: i64 = 0;
// The model smears a click into the first 5000 and a silence tail into the
// last 10000 samples.
const TRIM_HEAD: usize = 5_000;
const TRIM_TAIL: usize = 10_000;
const SPEED: f32 = 1.0;

/// `config.json` shipped next to the ONNX export.
#[derive(Debug, Deserialize)]
struct ModelConfig {
    model_file: String,
    voices: String,
}

/// Maps IPA / punctuation characters to model input ids.
#[derive(Debug)]
struct SymbolTable {
    ids: HashMap<char, i64>,
}

impl SymbolTable {
    fn new() -> Self {
        let pad = "$";
        let punctuation = ";:,.!?¡¿—…\"«»\"\" ";
        let letters = "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";
        let letters_ipa = "ɑɐɒæɓʙβɔɕçɗɖðʤəɘɚɛɜɝɞɟʄɡɠɢʛɦɧħɥʜɨɪʝɭɬɫɮʟɱɯɰŋɳɲɴøɵɸθœɶʘɹɺɾɻʀʁɽʂʃʈʧʉʊʋⱱʌɣɤʍχʎʏʑʐʒʔʡʕʢǀǁǂǃˈˌːˑʼʴʰʱʲʷˠˤ˞↓↑→↗↘'̩'ᵻ";

        let ids = pad
            .chars()
            .chain(punctuation.chars())
            .chain(letters.chars())
            .chain(letters_ipa.chars())
            .enumerate()
            .map(|(i, c)| (c, i as i64))
            .collect();
        Self { ids }
    }

    /// Re-space phonemes into word and punctuation pieces, then map each
    /// known character to its id. Unknown characters are dropped.
    fn encode(&self, phonemes: &str) -> Vec<i64> {
        let mut ids = vec![PAD_ID];
        for c in split_words_and_punctuation(phonemes).chars() {
            if let Some(&id) = self.ids.get(&c) {
                ids.push(id);
            }
        }
        ids.push(PAD_ID);
        ids
    }
}

/// Words stay together, every other non-space character becomes its own
/// piece, pieces are joined by single spaces.
fn split_words_and_punctuation(text: &str) -> String {
    let mut pieces: Vec<String> = Vec::new();
    let mut word = String::new();
    for c in text.chars() {
        if c.is_alphanumeric() || c == '_' || is_combining(c) {
            word.push(c);
            continue;
        }
        if !word.is_empty() {
            pieces.push(std::mem::take(&mut word));
        }
        if !c.is_whitespace() {
            pieces.push(c.to_string());
        }
    }
    if !word.is_empty() {
        pieces.push(word);
    }
    pieces.join(" ")
}

// Combining marks and IPA modifier letters count as word characters.
fn is_combining(c: char) -> bool {
    matches!(c as u32, 0x0300..=0x036F | 0x02B0..=0x02FF)
}

pub struct KittenModel {
    session: Session,
    voices: BTreeMap<String, Matrix>,
    symbols: SymbolTable,
    phonemizer: Espeak,
    language: String,
}

impl KittenModel {
    /// Load the ONNX export and voice table from a local model directory.
    pub fn load(model_dir: &Path, phonemizer: Espeak, language: &str) -> anyhow::Result<Self> {
        let config_path = model_dir.join("config.json");
        let config: ModelConfig = serde_json::from_str(
            &fs::read_to_string(&config_path)
                .with_context(|| format!("Failed to read {}", config_path.display()))?,
        )
        .with_context(|| format!("{} is not a valid model config", config_path.display()))?;

        let model_path = model_dir.join(&config.model_file);
        if !model_path.is_file() {
            bail!("model file not found at {}", model_path.display());
        }
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(1)?
            .commit_from_file(&model_path)
            .with_context(|| format!("failed to load onnx model from {}", model_path.display()))?;

        let voices = npz::load(&model_dir.join(&config.voices))?;
        debug!(voices = voices.len(), "loaded kitten voice table");

        Ok(Self {
            session,
            voices,
            symbols: SymbolTable::new(),
            phonemizer,
            language: language.to_string(),
        })
    }

    pub fn voices(&self) -> impl Iterator<Item = &str> {
        self.voices.keys().map(String::as_str)
    }

    fn style(&self, voice: &str, text_len: usize) -> anyhow::Result<&[f32]> {
        let style = self.voices.get(voice).ok_or_else(|| {
            anyhow!(
                "voice '{voice}' is not available. Available voices: {}",
                self.voices.keys().cloned().collect::<Vec<_>>().join(", ")
            )
        })?;
        style.row(text_len.min(style.rows.saturating_sub(1)))
    }
}

impl SpeechGenerator for KittenModel {
    fn sample_rate(&self) -> u32 {
        KITTEN_SAMPLE_RATE
    }

    fn generate(&self, text: &str, voice: &str) -> anyhow::Result<Vec<f32>> {
        let phonemes = self.phonemizer.phonemize(text, &self.language)?;
        let tokens = self.symbols.encode(&phonemes);
        if tokens.len() <= 2 {
            bail!("text produced no phoneme tokens");
        }
        let style = self.style(voice, text.chars().count())?.to_vec();

        let input_ids = Array2::from_shape_vec((1, tokens.len()), tokens)
            .context("failed building input_ids tensor")?;
        let style = Array2::from_shape_vec((1, style.len()), style)
            .context("failed building style tensor")?;
        let speed = Array1::from_vec(vec![SPEED]);

        let outputs = self.session.run(ort::inputs![
            "input_ids" => Tensor::from_array(input_ids)?,
            "style" => Tensor::from_array(style)?,
            "speed" => Tensor::from_array(speed)?
        ]?)?;
        let waveform = outputs[0]
            .try_extract_tensor::<f32>()
            .context("failed extracting waveform tensor")?;
        let audio: Vec<f32> = waveform.iter().copied().collect();

        if audio.len() <= TRIM_HEAD + TRIM_TAIL {
            return Ok(Vec::new());
        }
        Ok(audio[TRIM_HEAD..audio.len() - TRIM_TAIL].to_vec())
    }
}
