//! JSON bodies exchanged with the review client.

use serde::Serialize;

use crate::models::{StatementMetadata, TransactionCandidate};
use crate::session::ParseSession;

pub const DISCLAIMER: &str = "Categories and amounts are best-effort guesses extracted from your statement. Please review every transaction before importing.";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    #[serde(flatten)]
    pub metadata: StatementMetadata,
    pub transaction_count: usize,
    pub lines_seen: usize,
    pub lines_parsed: usize,
    pub transactions: Vec<TransactionCandidate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    pub disclaimer: &'static str,
    pub checksum: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_id: Option<i64>,
}

impl UploadResponse {
    pub fn new(session: &ParseSession, session_token: Option<String>, account_id: Option<i64>) -> Self {
        let warning = (!session.warnings.is_empty()).then(|| {
            session
                .warnings
                .iter()
                .map(|w| w.message())
                .collect::<Vec<_>>()
                .join(" ")
        });
        Self {
            metadata: session.metadata.clone(),
            transaction_count: session.transaction_count(),
            lines_seen: session.lines_seen,
            lines_parsed: session.lines_parsed,
            transactions: session.candidates.clone(),
            warning,
            disclaimer: DISCLAIMER,
            checksum: session.checksum.clone(),
            session_token,
            account_id,
        }
    }
}
