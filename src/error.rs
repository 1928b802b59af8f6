//! Error types shared by the session, reconciler, processor and HTTP layers.

use std::collections::BTreeMap;
use thiserror::Error;

/// Per-field validation messages, keyed by dotted field path.
pub type FieldErrors = BTreeMap<String, Vec<String>>;

/// Failure of a single call against the event platform.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("remote call to {url} failed with HTTP {status}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },

    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },

    #[error("unexpected response from {url}: {message}")]
    Decode { url: String, message: String },

    #[error("could not build HTTP client: {0}")]
    Client(String),
}

/// Failure while stamping a PDF.
#[derive(Debug, Error)]
pub enum WatermarkError {
    #[error("not a readable PDF: {0}")]
    Parse(String),

    #[error("watermark template has no pages")]
    EmptyTemplate,

    #[error("malformed page object: {0}")]
    Page(String),

    #[error("could not serialise stamped PDF: {0}")]
    Save(String),

    #[error("could not read watermark template: {0}")]
    Io(#[from] std::io::Error),

    #[error("watermark task failed: {0}")]
    Task(String),
}

/// Top-level error for every workflow the service exposes.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    NotFound(String),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("could not watermark {filename}: {source}")]
    Transform {
        filename: String,
        #[source]
        source: WatermarkError,
    },

    #[error("file {uuid} has no download url")]
    MissingDownloadUrl { uuid: String },

    #[error("no endpoint configured for editable type '{0}'")]
    MissingEndpoint(String),

    #[error("invalid request payload")]
    Validation(FieldErrors),

    #[error("event store error: {0}")]
    Store(String),
}

impl ServiceError {
    /// Single-field validation failure.
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut errors = FieldErrors::new();
        errors.insert(field.into(), vec![message.into()]);
        ServiceError::Validation(errors)
    }
}

impl From<rusqlite::Error> for ServiceError {
    fn from(e: rusqlite::Error) -> Self {
        ServiceError::Store(e.to_string())
    }
}
