//! The `espeak` command-line synthesizer.
//!
//! Used both as a backend of its own (WAV on stdout) and as the IPA
//! phonemizer of the lightweight neural model.

use std::process::{Command, Stdio};

use anyhow::{bail, Context};
use tokio::process::Command as AsyncCommand;

use crate::wav::{self, DecodedWav};

/// Output rate of `espeak --stdout`.
pub const ESPEAK_SAMPLE_RATE: u32 = 22_050;

#[derive(Debug, Clone)]
pub struct Espeak {
    program: String,
}

impl Default for Espeak {
    fn default() -> Self {
        Self::new("espeak")
    }
}

impl Espeak {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Run `espeak --version`; returns the first line it printed.
    pub async fn probe(&self) -> anyhow::Result<String> {
        let output = AsyncCommand::new(&self.program)
            .arg("--version")
            .stdin(Stdio::null())
            .output()
            .await
            .with_context(|| format!("failed to execute '{}'", self.program))?;

        if !output.status.success() {
            bail!(
                "'{} --version' exited with {}: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .next()
            .unwrap_or_default()
            .trim()
            .to_string())
    }

    /// Synthesize `text` and decode the WAV `espeak` writes to stdout.
    ///
    /// The subprocess is awaited without a timeout.
    pub async fn synthesize(&self, text: &str) -> anyhow::Result<DecodedWav> {
        let output = AsyncCommand::new(&self.program)
            .arg("--stdout")
            .arg(text)
            .stdin(Stdio::null())
            .output()
            .await
            .with_context(|| format!("failed to execute '{}'", self.program))?;

        if !output.status.success() {
            bail!(
                "'{}' exited with {}: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        wav::decode_pcm16(&output.stdout)
            .with_context(|| format!("'{}' did not produce a 16-bit PCM WAV", self.program))
    }

    /// Convert text to IPA phonemes (stress marks kept). Blocking.
    pub fn phonemize(&self, text: &str, language: &str) -> anyhow::Result<String> {
        let output = Command::new(&self.program)
            .args(["-q", "--ipa=3", "-v", language, "--"])
            .arg(text)
            .stdin(Stdio::null())
            .output()
            .with_context(|| format!("failed to execute phonemizer '{}'", self.program))?;

        if !output.status.success() {
            bail!(
                "phonemizer '{}' failed: {}",
                self.program,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        let phonemes = String::from_utf8(output.stdout)
            .context("phonemizer emitted non-utf8 output")?
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");
        if phonemes.is_empty() {
            bail!("phonemizer '{}' returned no phonemes", self.program);
        }
        Ok(phonemes)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::io::Write;
    use std::os::unix::fs::PermissionsExt;

    /// Write an executable shell script standing in for `espeak`.
    fn fake_espeak(dir: &tempfile::TempDir, body: &str) -> String {
        let path = dir.path().join("espeak");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "#!/bin/sh\n{body}").unwrap();
        drop(file);
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[tokio::test]
    async fn test_probe_missing_program_fails() {
        let espeak = Espeak::new("definitely-not-an-espeak-binary");
        assert!(espeak.probe().await.is_err());
    }

    #[tokio::test]
    async fn test_probe_reports_version_line() {
        let dir = tempfile::tempdir().unwrap();
        let espeak = Espeak::new(fake_espeak(&dir, "echo 'eSpeak text-to-speech: 1.48.15'"));
        assert_eq!(espeak.probe().await.unwrap(), "eSpeak text-to-speech: 1.48.15");
    }

    #[tokio::test]
    async fn test_probe_nonzero_exit_fails() {
        let dir = tempfile::tempdir().unwrap();
        let espeak = Espeak::new(fake_espeak(&dir, "echo broken >&2; exit 3"));
        let err = espeak.probe().await.unwrap_err();
        assert!(err.to_string().contains("broken"));
    }

    #[tokio::test]
    async fn test_synthesize_decodes_stdout_wav() {
        let dir = tempfile::tempdir().unwrap();
        let wav_path = dir.path().join("canned.wav");
        std::fs::write(&wav_path, wav::encode_pcm16(&[5, -5, 300], 22_050).unwrap()).unwrap();
        let espeak = Espeak::new(fake_espeak(
            &dir,
            &format!("[ \"$1\" = \"--stdout\" ] || exit 9\ncat '{}'", wav_path.display()),
        ));

        let decoded = espeak.synthesize("    hello").await.unwrap();
        assert_eq!(decoded.sample_rate, 22_050);
        assert_eq!(decoded.samples, vec![5, -5, 300]);
    }

    #[tokio::test]
    async fn test_synthesize_passes_text_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let espeak = Espeak::new(fake_espeak(&dir, "echo \"[$2]\" >&2; exit 1"));
        let err = espeak.synthesize("    hello").await.unwrap_err();
        assert!(err.to_string().contains("[    hello]"));
    }

    #[tokio::test]
    async fn test_synthesize_rejects_non_wav_output() {
        let dir = tempfile::tempdir().unwrap();
        let espeak = Espeak::new(fake_espeak(&dir, "echo not-a-wav"));
        assert!(espeak.synthesize("hi").await.is_err());
    }

    #[test]
    fn test_phonemize_ends_options_before_text() {
        let dir = tempfile::tempdir().unwrap();
        let espeak = Espeak::new(fake_espeak(
            &dir,
            "for last; do :; done\n[ \"$5\" = \"--\" ] || exit 9\nprintf '%s' \"$last\"",
        ));
        assert_eq!(
            espeak.phonemize("-v x     Done", "en-us").unwrap(),
            "-v x Done"
        );
    }

    #[test]
    fn test_phonemize_collapses_whitespace() {
        let dir = tempfile::tempdir().unwrap();
        let espeak = Espeak::new(fake_espeak(&dir, "printf ' həlˈoʊ\\n  wˈɜːld \\n'"));
        assert_eq!(espeak.phonemize("hello world", "en-us").unwrap(), "həlˈoʊ wˈɜːld");
    }
}
