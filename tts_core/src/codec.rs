//! Neural audio codec decoder (NeMo nano codec, ONNX export) used as the
//! streaming backend's player.

use std::path::Path;

use anyhow::{bail, Context};
use ndarray::{Array1, Array3};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Tensor;

use crate::streaming::{Frame, FrameDecoder, CODEBOOKS};

/// 22050 Hz at 12.5 frames per second.
pub const NANO_CODEC_SAMPLES_PER_FRAME: usize = 1_764;

pub struct NanoCodecDecoder {
    session: Session,
    samples_per_frame: usize,
}

impl NanoCodecDecoder {
    pub fn load(model_path: &Path) -> anyhow::Result<Self> {
        if !model_path.is_file() {
            bail!("codec model not found at {}", model_path.display());
        }
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(2)?
            .commit_from_file(model_path)
            .with_context(|| format!("failed to load codec model from {}", model_path.display()))?;
        Ok(Self {
            session,
            samples_per_frame: NANO_CODEC_SAMPLES_PER_FRAME,
        })
    }
}

/// Lay frames out as `[1, codebooks, time]`.
fn frames_to_codes(frames: &[Frame]) -> anyhow::Result<Array3<i64>> {
    let mut codes = Vec::with_capacity(frames.len() * CODEBOOKS);
    for codebook in 0..CODEBOOKS {
        codes.extend(frames.iter().map(|frame| frame[codebook]));
    }
    Array3::from_shape_vec((1, CODEBOOKS, frames.len()), codes)
        .context("failed building codec tokens tensor")
}

impl FrameDecoder for NanoCodecDecoder {
    fn samples_per_frame(&self) -> usize {
        self.samples_per_frame
    }

    fn decode(&self, frames: &[Frame]) -> anyhow::Result<Vec<f32>> {
        if frames.is_empty() {
            return Ok(Vec::new());
        }
        let tokens = frames_to_codes(frames)?;
        let tokens_len = Array1::from_vec(vec![frames.len() as i64]);

        let outputs = self.session.run(ort::inputs![
            "tokens" => Tensor::from_array(tokens)?,
            "tokens_len" => Tensor::from_array(tokens_len)?
        ]?)?;
        let audio = outputs[0]
            .try_extract_tensor::<f32>()
            .context("failed extracting codec audio tensor")?;
        Ok(audio.iter().copied().collect())
    }
}
