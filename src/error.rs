//! Error type returned by [`QaService`](crate::service::QaService).
//!
//! Callers branch on the variant; the HTTP layer maps each one to a status
//! code and a machine-readable `code` string.

use axum::http::StatusCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum QaError {
    /// The request itself is unusable (no PDFs, empty question, ...).
    #[error("{0}")]
    InvalidInput(String),

    /// The upload body exceeds `[server].max_upload_bytes`.
    #[error("{0}")]
    TooLarge(String),

    /// A question arrived before any document was indexed.
    #[error("Please upload a PDF first.")]
    NoIndex,

    /// An embedding or completion call failed.
    #[error("{0:#}")]
    Upstream(anyhow::Error),

    /// Persistence, task join or index consistency failure.
    #[error("{0:#}")]
    Internal(anyhow::Error),
}

impl QaError {
    pub fn invalid(message: impl Into<String>) -> Self {
        QaError::InvalidInput(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            QaError::InvalidInput(_) | QaError::NoIndex => StatusCode::BAD_REQUEST,
            QaError::TooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            QaError::Upstream(_) | QaError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            QaError::InvalidInput(_) => "bad_request",
            QaError::TooLarge(_) => "payload_too_large",
            QaError::NoIndex => "no_index",
            QaError::Upstream(_) => "upstream_error",
            QaError::Internal(_) => "internal",
        }
    }

    /// Text shown to HTTP clients. Server-side failures are prefixed with
    /// `Error: `; client errors are shown as is.
    pub fn client_message(&self) -> String {
        if self.status().is_server_error() {
            format!("Error: {}", self)
        } else {
            self.to_string()
        }
    }
}
