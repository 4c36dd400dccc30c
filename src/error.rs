use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Structurally invalid BAM/BAI data or SAM header text.
    #[error("format error: {0}")]
    Format(String),

    /// Fewer bytes were available than a declared length promised.
    #[error("truncated input: {0}")]
    Truncated(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid range: {0}")]
    InvalidRange(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Debug, Serialize)]
pub struct SliceError {
    pub error: SliceErrorBody,
}

#[derive(Debug, Serialize)]
pub struct SliceErrorBody {
    pub r#type: &'static str,
    pub message: String,
}

impl Error {
    /// Prefixes format and truncation messages with the input they came from,
    /// e.g. `"bam header"` or `"bai"`.
    pub fn context(self, what: &str) -> Self {
        match self {
            Error::Format(msg) => Error::Format(format!("{}: {}", what, msg)),
            Error::Truncated(msg) => Error::Truncated(format!("{}: {}", what, msg)),
            other => other,
        }
    }

    /// Whether this error describes malformed input data rather than a
    /// request or transport problem.
    pub fn is_malformed_input(&self) -> bool {
        matches!(self, Error::Format(_) | Error::Truncated(_))
    }

    fn error_type(&self) -> &'static str {
        match self {
            Error::Format(_) => "FormatError",
            Error::Truncated(_) => "TruncatedError",
            Error::NotFound(_) => "NotFound",
            Error::InvalidInput(_) => "InvalidInput",
            Error::InvalidRange(_) => "InvalidRange",
            Error::Io(_) | Error::Internal(_) => "InternalError",
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            Error::Format(_) | Error::Truncated(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Error::InvalidRange(_) => StatusCode::BAD_REQUEST,
            Error::Io(_) | Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let body = SliceError {
            error: SliceErrorBody {
                r#type: self.error_type(),
                message: self.to_string(),
            },
        };
        (self.status_code(), axum::Json(body)).into_response()
    }
}
