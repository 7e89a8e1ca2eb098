//! Extractor → classifier → builder, producing one `ParseSession` per upload.

use std::time::{Duration, Instant};

use chrono::{DateTime, Local, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::builder::{build_candidate, RowRejection};
use crate::classifier::{
    classify, looks_like_continuation, LineTag, MetadataField, RowShape, YearResolver,
    HEADER_WINDOW_LINES, MAX_CONTINUATION_LINES,
};
use crate::error::{Result, TallyError};
use crate::extractor::{self, ExtractedDocument};
use crate::models::{StatementMetadata, TransactionCandidate};

pub const DEFAULT_PARSE_BUDGET: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy)]
pub struct ParseOptions {
    /// Upload date; yearless rows fall back to it when the statement names no period.
    pub reference_date: NaiveDate,
    pub budget: Duration,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            reference_date: Local::now().date_naive(),
            budget: DEFAULT_PARSE_BUDGET,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ParseWarning {
    /// The document had text but nothing shaped like a transaction.
    EmptyStatement,
    /// Rows that looked like transactions but failed amount or date parsing.
    DroppedRows { count: usize },
}

impl ParseWarning {
    pub fn message(&self) -> String {
        match self {
            Self::EmptyStatement => {
                "No transactions were recognized in this statement; it may use an unsupported layout."
                    .to_string()
            }
            Self::DroppedRows { count } => format!(
                "{count} transaction-like line(s) could not be read and were excluded; compare against the original statement."
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParseSession {
    pub metadata: StatementMetadata,
    pub candidates: Vec<TransactionCandidate>,
    /// Non-blank lines the classifier looked at.
    pub lines_seen: usize,
    /// Lines that produced a candidate.
    pub lines_parsed: usize,
    /// SHA-256 of the uploaded bytes, hex.
    pub checksum: String,
    #[serde(default)]
    pub warnings: Vec<ParseWarning>,
    pub created_at: DateTime<Utc>,
}

impl ParseSession {
    pub fn transaction_count(&self) -> usize {
        self.candidates.len()
    }
}

pub fn checksum(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Parse an uploaded statement. Fails only when the whole document is
/// unreadable or the budget runs out; bad rows are dropped and counted.
pub fn parse_statement(bytes: &[u8], opts: &ParseOptions) -> Result<ParseSession> {
    let started = Instant::now();
    let doc = extractor::extract(bytes, opts.budget)?;
    let remaining = opts.budget.saturating_sub(started.elapsed());
    let mut session = parse_document(&doc, opts.reference_date, Deadline::after(remaining))?;
    session.checksum = checksum(bytes);
    info!(
        candidates = session.transaction_count(),
        lines_seen = session.lines_seen,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "parsed statement"
    );
    Ok(session)
}

/// Same pipeline over already-extracted text (pages split on form feed).
#[cfg(test)]
pub fn parse_statement_text(text: &str, opts: &ParseOptions) -> Result<ParseSession> {
    let doc = ExtractedDocument::from_text(text);
    let mut session = parse_document(&doc, opts.reference_date, Deadline::after(opts.budget))?;
    session.checksum = checksum(text.as_bytes());
    Ok(session)
}

struct Deadline {
    at: Instant,
    budget: Duration,
}

impl Deadline {
    fn after(budget: Duration) -> Self {
        Self {
            at: Instant::now() + budget,
            budget,
        }
    }

    fn check(&self) -> Result<()> {
        if Instant::now() >= self.at {
            return Err(TallyError::ParseTimeout(self.budget));
        }
        Ok(())
    }
}

enum Tagged<'a> {
    Meta(Vec<MetadataField>),
    Row { shape: RowShape, page: usize, line: usize },
    Other(&'a str),
}

fn parse_document(
    doc: &ExtractedDocument,
    reference_date: NaiveDate,
    deadline: Deadline,
) -> Result<ParseSession> {
    // Pass 1: tag every non-blank line and collect header facts, so rows that
    // come before the period line still see it.
    let mut tagged: Vec<Tagged<'_>> = Vec::new();
    for (seen, line) in doc.lines().filter(|l| !l.text.is_empty()).enumerate() {
        if seen % 256 == 0 {
            deadline.check()?;
        }
        let tag = match classify(line.text, seen < HEADER_WINDOW_LINES) {
            LineTag::HeaderMetadata(fields) => Tagged::Meta(fields),
            LineTag::TransactionRow(shape) => Tagged::Row {
                shape,
                page: line.page,
                line: line.number,
            },
            LineTag::Ignorable => Tagged::Other(line.text),
        };
        tagged.push(tag);
    }

    let mut metadata = StatementMetadata::default();
    for fields in tagged.iter().filter_map(|t| match t {
        Tagged::Meta(fields) => Some(fields),
        _ => None,
    }) {
        for field in fields {
            merge_field(&mut metadata, field);
        }
    }

    let period = statement_period(&metadata, &tagged);
    let years = YearResolver::new(period, reference_date);

    // Pass 2: build candidates in document order.
    let mut candidates = Vec::new();
    let mut dropped = 0usize;
    for (pos, tag) in tagged.iter().enumerate() {
        let Tagged::Row { shape, page, line } = tag else {
            continue;
        };
        if pos % 256 == 0 {
            deadline.check()?;
        }
        let continuation: Vec<&str> = tagged[pos + 1..]
            .iter()
            .take(MAX_CONTINUATION_LINES)
            .map_while(|t| match t {
                Tagged::Other(text) if looks_like_continuation(text) => Some(*text),
                _ => None,
            })
            .collect();
        match build_candidate(candidates.len(), shape, &continuation, &years) {
            Ok(candidate) => candidates.push(candidate),
            Err(rejection) => {
                dropped += 1;
                match rejection {
                    RowRejection::InvalidAmount(raw) => {
                        debug!(page, line, amount = %raw, "dropped row: unreadable amount")
                    }
                    RowRejection::InvalidDate => {
                        debug!(page, line, description = %shape.description, "dropped row: impossible date")
                    }
                }
            }
        }
    }

    let mut warnings = Vec::new();
    if candidates.is_empty() {
        warnings.push(ParseWarning::EmptyStatement);
    }
    if dropped > 0 {
        warnings.push(ParseWarning::DroppedRows { count: dropped });
    }

    Ok(ParseSession {
        metadata,
        lines_seen: tagged.len(),
        lines_parsed: candidates.len(),
        candidates,
        checksum: String::new(),
        warnings,
        created_at: Utc::now(),
    })
}

/// First value wins, except the closing balance: statements repeat it per
/// page and the last one is the final figure.
fn merge_field(metadata: &mut StatementMetadata, field: &MetadataField) {
    match field {
        MetadataField::AccountNumber(n) => {
            metadata.account_number.get_or_insert_with(|| n.clone());
        }
        MetadataField::AccountName(n) => {
            metadata.account_name.get_or_insert_with(|| n.clone());
        }
        MetadataField::OpeningBalance { amount, as_of } => {
            if metadata.opening_balance.is_none() {
                metadata.opening_balance = Some(*amount);
                if let Some(date) = as_of {
                    metadata.period_start.get_or_insert(*date);
                }
            }
        }
        MetadataField::ClosingBalance { amount, as_of } => {
            metadata.closing_balance = Some(*amount);
            if let Some(date) = as_of {
                metadata.period_end = Some(*date);
            }
        }
        MetadataField::StatementDate(date) => {
            metadata.statement_date.get_or_insert(*date);
        }
        MetadataField::Period { start, end } => {
            if metadata.period_start.is_none() || metadata.period_end.is_none() {
                metadata.period_start = Some(*start);
                metadata.period_end = Some(*end);
            }
        }
    }
}

/// The window yearless dates are resolved against: the header period, else
/// the span of fully dated rows, else the statement date alone.
fn statement_period(
    metadata: &StatementMetadata,
    tagged: &[Tagged<'_>],
) -> Option<(NaiveDate, NaiveDate)> {
    match (metadata.period_start, metadata.period_end) {
        (Some(start), Some(end)) => return Some((start, end)),
        (Some(day), None) | (None, Some(day)) => return Some((day, day)),
        (None, None) => {}
    }
    let dated: Vec<NaiveDate> = tagged
        .iter()
        .filter_map(|t| match t {
            Tagged::Row { shape, .. } => shape
                .date
                .year
                .and_then(|y| NaiveDate::from_ymd_opt(y, shape.date.month, shape.date.day)),
            _ => None,
        })
        .collect();
    if let (Some(min), Some(max)) = (dated.iter().min(), dated.iter().max()) {
        return Some((*min, *max));
    }
    metadata.statement_date.map(|d| (d, d))
}
