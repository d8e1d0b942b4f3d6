use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use reading_client::StoreError;
use serde_json::json;

use crate::ingest::IngestError;

/// Every failure the API reports, rendered as
/// `{"error": {"code": "...", "message": "..."}}`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("missing or unknown bearer token")]
    Unauthenticated,
    #[error("{0}")]
    Forbidden(String),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Duplicate(String),
    #[error("internal server error")]
    Internal,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Duplicate(_) => StatusCode::CONFLICT,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Unauthenticated => "Unauthenticated",
            Self::Forbidden(_) => "Forbidden",
            Self::NotFound(_) => "NotFound",
            Self::Validation(_) => "ValidationError",
            Self::Duplicate(_) => "DuplicateReading",
            Self::Internal => "InternalError",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": { "code": self.code(), "message": self.to_string() }
        }));
        (self.status(), body).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateReading { .. } => Self::Duplicate(err.to_string()),
            StoreError::NotFound(what) => Self::NotFound(what),
            StoreError::Corrupt(_) | StoreError::Database(_) => {
                tracing::error!(error = %err, "storage failure");
                Self::Internal
            }
        }
    }
}

impl From<IngestError> for ApiError {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::InactiveMeter(_) | IngestError::InvalidValue(_) | IngestError::InvalidTimestamp(_) => {
                Self::Validation(err.to_string())
            }
            IngestError::Store(e) => e.into(),
            IngestError::Media(e) => {
                tracing::error!(error = %e, "failed to store photo");
                Self::Internal
            }
            IngestError::Resolve(e) => {
                tracing::error!(error = %e, "timestamp resolution task failed");
                Self::Internal
            }
        }
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        Self::Validation(format!("malformed multipart body: {}", err.body_text()))
    }
}
