use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use thiserror::Error;

use crate::state::{InvalidTransition, RevealError, ScoreError};
use crate::store::StoreError;

pub type CoreResult<T> = Result<T, CoreError>;

/// Every failure a core operation can report.
///
/// Validation and transition errors are never retryable as-is. `Storage`
/// is transient only for an outage. `Conflict` means the caller must re-fetch before retrying.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Score(#[from] ScoreError),
    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),
    #[error(transparent)]
    Reveal(#[from] RevealError),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("already exists: {0}")]
    AlreadyExists(String),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error(transparent)]
    Storage(#[from] StoreError),
    #[error("record {key} changed concurrently; refresh and retry")]
    Conflict { key: String },
}

impl CoreError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Stable code used in WebSocket error frames
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::Validation(_) | CoreError::Score(_) => "VALIDATION_FAILED",
            CoreError::InvalidTransition(_) => "INVALID_TRANSITION",
            CoreError::Reveal(_) => "REVEAL_FAILED",
            CoreError::NotFound(_) => "NOT_FOUND",
            CoreError::AlreadyExists(_) => "ALREADY_EXISTS",
            CoreError::Unauthorized(_) => "UNAUTHORIZED",
            CoreError::Storage(e) if e.is_transient() => "STORAGE_UNAVAILABLE",
            CoreError::Storage(_) => "STORAGE_ERROR",
            CoreError::Conflict { .. } => "CONFLICT",
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, CoreError::Storage(e) if e.is_transient())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            CoreError::Validation(_) | CoreError::Score(_) => StatusCode::BAD_REQUEST,
            CoreError::InvalidTransition(_) | CoreError::Reveal(_) => StatusCode::CONFLICT,
            CoreError::Conflict { .. } | CoreError::AlreadyExists(_) => StatusCode::CONFLICT,
            CoreError::NotFound(_) => StatusCode::NOT_FOUND,
            CoreError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            CoreError::Storage(e) if e.is_transient() => StatusCode::SERVICE_UNAVAILABLE,
            CoreError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

impl IntoResponse for CoreError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        if matches!(self, CoreError::Storage(_)) {
            tracing::error!("Request failed: {}", self);
        }
        let payload = Json(ErrorBody {
            code: self.code(),
            message: self.to_string(),
        });
        (status, payload).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EditState;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            CoreError::validation("bad").status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            CoreError::Conflict { key: "team:a".into() }.status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            CoreError::from(StoreError::unavailable("down")).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            CoreError::NotFound("team:a".into()).status(),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn test_transient_is_distinct_from_validation() {
        let transient = CoreError::from(StoreError::unavailable("down"));
        assert!(transient.is_transient());
        assert_eq!(transient.code(), "STORAGE_UNAVAILABLE");

        let invalid = CoreError::from(InvalidTransition {
            from: EditState::Normal,
            action: crate::state::EditAction::Allow,
        });
        assert!(!invalid.is_transient());
        assert_eq!(invalid.code(), "INVALID_TRANSITION");
    }

    #[test]
    fn test_encode_failure_is_not_an_outage() {
        // Non-string map keys cannot be encoded as JSON
        let mut map = std::collections::HashMap::new();
        map.insert((1, 2), "x");
        let err = CoreError::from(crate::store::to_record(&map).unwrap_err());

        assert!(!err.is_transient());
        assert_eq!(err.code(), "STORAGE_ERROR");
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
