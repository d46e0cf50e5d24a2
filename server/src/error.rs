use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tts_core::TtsError;

/// API Error types
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("TTS models not initialized")]
    NotInitialized,

    #[error("Audio player not initialized")]
    PlayerNotInitialized,

    #[error("No audio generated")]
    NoAudio,

    /// Any other generation, subprocess or encoding failure, reported verbatim.
    #[error("{0}")]
    Backend(String),

    #[error("{0}")]
    InvalidInput(String),
}

/// Error response structure
#[derive(Serialize)]
struct ErrorResponse {
    detail: String,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NotInitialized | ApiError::PlayerNotInitialized => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ApiError::NoAudio | ApiError::Backend(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::InvalidInput(_) => StatusCode::UNPROCESSABLE_ENTITY,
        }
    }
}

impl From<TtsError> for ApiError {
    fn from(err: TtsError) -> Self {
        match err {
            TtsError::PlayerNotInitialized => ApiError::PlayerNotInitialized,
            TtsError::NoAudio => ApiError::NoAudio,
            other => ApiError::Backend(other.to_string()),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::InvalidInput(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), "TTS error: {}", self);
        }

        let body = Json(ErrorResponse {
            detail: self.to_string(),
        });

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(ApiError::NotInitialized.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            ApiError::PlayerNotInitialized.status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(ApiError::NoAudio.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            ApiError::Backend("boom".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ApiError::InvalidInput("bad".into()).status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }

    #[test]
    fn test_backend_errors_keep_their_message() {
        let err = ApiError::from(TtsError::Engine(anyhow::anyhow!("espeak exited with 1")));
        assert_eq!(err.to_string(), "espeak exited with 1");
        assert!(matches!(ApiError::from(TtsError::NoAudio), ApiError::NoAudio));
        assert!(matches!(
            ApiError::from(TtsError::PlayerNotInitialized),
            ApiError::PlayerNotInitialized
        ));
    }
}
