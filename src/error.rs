use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// Crate-wide error type. Variants mirror the error kinds a caller needs
/// to branch on, not the place they were raised.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("corrupt data: {0}")]
    CorruptData(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cancelled")]
    Cancelled,
}

impl CoreError {
    fn kind(&self) -> &'static str {
        match self {
            CoreError::Validation(_) => "validation_error",
            CoreError::NotFound(_) => "not_found",
            CoreError::QuotaExceeded(_) => "quota_exceeded",
            CoreError::CorruptData(_) => "corrupt_data",
            CoreError::Io(_) => "io_error",
            CoreError::Cancelled => "cancelled",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            CoreError::Validation(_) => StatusCode::BAD_REQUEST,
            CoreError::NotFound(_) => StatusCode::NOT_FOUND,
            CoreError::QuotaExceeded(_) => StatusCode::PAYLOAD_TOO_LARGE,
            CoreError::CorruptData(_) => StatusCode::UNPROCESSABLE_ENTITY,
            CoreError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            CoreError::Cancelled => StatusCode::from_u16(499).unwrap(),
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(e: serde_json::Error) -> Self {
        CoreError::CorruptData(format!("json: {e}"))
    }
}

impl IntoResponse for CoreError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(json!({
            "error": self.kind(),
            "message": self.to_string(),
        }));
        (status, body).into_response()
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
