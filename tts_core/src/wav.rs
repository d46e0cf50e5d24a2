use std::io::{self, Cursor};

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};

const I16_MAX_F32: f32 = i16::MAX as f32;

/// Convert float samples in [-1.0, 1.0] to 16-bit PCM.
///
/// Samples are clamped before scaling so out-of-range input saturates
/// instead of wrapping around.
pub fn float_to_pcm16(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|&s| (s.clamp(-1.0, 1.0) * I16_MAX_F32) as i16)
        .collect()
}

/// Encode mono 16-bit PCM samples as a RIFF/WAVE byte buffer.
pub fn encode_pcm16(samples: &[i16], sample_rate: u32) -> Result<Vec<u8>, hound::Error> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    // WAV header (44 bytes) + 2 bytes per sample
    let mut cursor = Cursor::new(Vec::<u8>::with_capacity(44 + samples.len() * 2));
    {
        let mut writer = WavWriter::new(&mut cursor, spec)?;
        for &s in samples {
            writer.write_sample(s)?;
        }
        writer.finalize()?;
    }

    Ok(cursor.into_inner())
}

/// PCM samples recovered from a WAV byte stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedWav {
    pub sample_rate: u32,
    pub channels: u16,
    /// Interleaved when `channels > 1`.
    pub samples: Vec<i16>,
}

/// Decode a 16-bit PCM WAV byte stream.
///
/// Programs that write WAV to a pipe cannot seek back to patch the chunk
/// sizes, so the header may announce more data than is present. Reading
/// stops cleanly at the end of the buffer in that case.
pub fn decode_pcm16(bytes: &[u8]) -> Result<DecodedWav, hound::Error> {
    let reader = WavReader::new(Cursor::new(bytes))?;
    let spec = reader.spec();
    if spec.sample_format != SampleFormat::Int || spec.bits_per_sample != 16 {
        return Err(hound::Error::Unsupported);
    }

    // The announced length is untrusted, cap the allocation by what is actually there.
    let mut samples = Vec::with_capacity((reader.len() as usize).min(bytes.len() / 2));
    for sample in reader.into_samples::<i16>() {
        match sample {
            Ok(s) => samples.push(s),
            Err(hound::Error::IoError(e)) if e.kind() == io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e),
        }
    }

    Ok(DecodedWav {
        sample_rate: spec.sample_rate,
        channels: spec.channels,
        samples,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pcm16_round_trip_is_lossless() {
        let samples: Vec<i16> = vec![0, 1, -1, 12345, -12345, i16::MAX, i16::MIN, 42];
        let bytes = encode_pcm16(&samples, 24_000).unwrap();
        let decoded = decode_pcm16(&bytes).unwrap();

        assert_eq!(decoded.sample_rate, 24_000);
        assert_eq!(decoded.channels, 1);
        assert_eq!(decoded.samples, samples);
    }

    #[test]
    fn test_encoded_header_is_riff_wave() {
        let bytes = encode_pcm16(&[1, 2, 3], 22_050).unwrap();
        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"WAVE");
        assert_eq!(bytes.len(), 44 + 6);
    }

    #[test]
    fn test_float_to_pcm16_clamps_out_of_range() {
        let pcm = float_to_pcm16(&[2.0, -3.5, 1.0, -1.0, 0.0, 0.5]);
        assert_eq!(pcm, vec![32767, -32767, 32767, -32767, 0, 16383]);
    }

    #[test]
    fn test_float_to_pcm16_never_wraps() {
        let pcm = float_to_pcm16(&[f32::INFINITY, f32::NEG_INFINITY, 1.0001]);
        assert!(pcm.iter().all(|&s| s == 32767 || s == -32767));
    }

    #[test]
    fn test_decode_tolerates_oversized_data_chunk() {
        let mut bytes = encode_pcm16(&[10, 20, 30, 40], 22_050).unwrap();
        // Pipe-style header: sizes left at their "unknown" maximum.
        bytes[4..8].copy_from_slice(&0x7fff_ffffu32.to_le_bytes());
        bytes[40..44].copy_from_slice(&0x7fff_f000u32.to_le_bytes());

        let decoded = decode_pcm16(&bytes).unwrap();
        assert_eq!(decoded.samples, vec![10, 20, 30, 40]);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode_pcm16(b"not a wav file").is_err());
    }
}
