use thiserror::Error;

use crate::worksheet::WorksheetKind;

/// Errors raised by the worksheet engine, the persistence layer and the
/// version coordinator.
///
/// Validation problems at the edit boundary are not errors: they come back as
/// [`EditOutcome::Rejected`](crate::editor::EditOutcome) so the caller can show
/// the warning and keep going.
#[derive(Debug, Error)]
pub enum WorksheetError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid json payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid base64 payload: {0}")]
    Encoding(#[from] base64::DecodeError),

    #[error("payload is not valid utf-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("archive error: {0}")]
    Archive(#[from] bincode::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("{kind} worksheet has no editable target {target}")]
    InvalidTarget { kind: WorksheetKind, target: String },

    #[error("invalid metadata for {kind}: {message}")]
    InvalidMetadata { kind: WorksheetKind, message: String },

    #[error("store error: {0}")]
    Store(String),
}

impl WorksheetError {
    /// True for the "no saved data yet" family of failures, which loads treat
    /// as a silent no-op.
    pub fn is_not_found(&self) -> bool {
        match self {
            WorksheetError::NotFound(_) => true,
            WorksheetError::Io(e) => e.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, WorksheetError>;
