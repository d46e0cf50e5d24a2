use thiserror::Error;

/// Errors surfaced by a backend while turning text into audio.
///
/// The `Display` text is what HTTP clients see as the error detail, so engine
/// failures keep their full context chain.
#[derive(Debug, Error)]
pub enum TtsError {
    /// The streaming backend has a generator but no audio player.
    #[error("Audio player not initialized")]
    PlayerNotInitialized,

    /// The backend finished without producing a single audio chunk.
    #[error("No audio generated")]
    NoAudio,

    #[error("{0:#}")]
    Engine(#[from] anyhow::Error),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    #[error("Task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}
