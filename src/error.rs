use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TallyError {
    #[error("Database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Not a PDF container, or no extractable text layer.
    #[error("Please select a valid PDF ({0})")]
    UnreadablePdf(String),

    #[error("Statement parsing exceeded the {}s budget; retry or contact support for unusually large statements", .0.as_secs())]
    ParseTimeout(Duration),

    #[error("Account {0} does not belong to the current user")]
    ForbiddenAccount(i64),

    #[error("Invalid {field}: {reason}")]
    InvalidTransactionField { field: &'static str, reason: String },

    #[error("No transaction candidate at index {index} (session has {len})")]
    CandidateIndex { index: usize, len: usize },

    #[error("Please select at least one transaction to import")]
    EmptySelection,

    #[error("Review session not found or expired: {0}")]
    SessionNotFound(String),

    #[error("No ledger at {}; run `tally init` first", .0.display())]
    NotInitialized(std::path::PathBuf),

    #[error("Settings error: {0}")]
    Settings(String),
}

pub type Result<T> = std::result::Result<T, TallyError>;

impl TallyError {
    pub fn invalid_field(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidTransactionField {
            field,
            reason: reason.into(),
        }
    }
}
