//! PDF byte stream → page-ordered text lines.

use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use tracing::debug;

use crate::error::{Result, TallyError};

const PDF_MARKER: &[u8] = b"%PDF-";
// Producers may prepend junk before the header; readers tolerate it within 1 KiB.
const MARKER_SEARCH_WINDOW: usize = 1024;
const PAGE_BREAK: char = '\u{000C}';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextLine<'a> {
    /// 1-based page number.
    pub page: usize,
    /// 0-based position in the whole document, blank lines included.
    pub number: usize,
    pub text: &'a str,
}

/// Extracted text, normalized once. `lines()` can be called any number of
/// times and always yields the same sequence.
#[derive(Debug, Clone, Default)]
pub struct ExtractedDocument {
    pages: Vec<Vec<String>>,
}

impl ExtractedDocument {
    pub fn from_text(text: &str) -> Self {
        let pages = text
            .split(PAGE_BREAK)
            .map(|page| page.lines().map(normalize_line).collect::<Vec<_>>())
            .filter(|lines| lines.iter().any(|l| !l.is_empty()))
            .collect();
        Self { pages }
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn is_blank(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn lines(&self) -> impl Iterator<Item = TextLine<'_>> + Clone + '_ {
        self.pages
            .iter()
            .enumerate()
            .flat_map(|(idx, page)| page.iter().map(move |text| (idx + 1, text.as_str())))
            .enumerate()
            .map(|(number, (page, text))| TextLine { page, number, text })
    }
}

fn normalize_line(raw: &str) -> String {
    raw.replace('\u{00a0}', " ").trim().to_string()
}

fn has_pdf_marker(bytes: &[u8]) -> bool {
    let window = &bytes[..bytes.len().min(MARKER_SEARCH_WINDOW)];
    window.windows(PDF_MARKER.len()).any(|w| w == PDF_MARKER)
}

/// Server-side re-validation of an upload. The client's MIME claim is never
/// consulted.
pub fn validate_upload(filename: Option<&str>, bytes: &[u8]) -> Result<()> {
    if bytes.is_empty() {
        return Err(TallyError::UnreadablePdf("file is empty".into()));
    }
    if let Some(name) = filename {
        if !name.to_lowercase().ends_with(".pdf") {
            return Err(TallyError::UnreadablePdf(format!(
                "only PDF files are supported, got {name}"
            )));
        }
    }
    if !has_pdf_marker(bytes) {
        return Err(TallyError::UnreadablePdf("missing %PDF- header".into()));
    }
    Ok(())
}

/// Extract the text layer. The backend cannot be interrupted, so it runs on its
/// own thread and the caller stops waiting once `budget` is spent.
pub fn extract(bytes: &[u8], budget: Duration) -> Result<ExtractedDocument> {
    if !has_pdf_marker(bytes) {
        return Err(TallyError::UnreadablePdf("missing %PDF- header".into()));
    }

    let owned = bytes.to_vec();
    let (tx, rx) = mpsc::channel();
    thread::Builder::new()
        .name("pdf-extract".into())
        .spawn(move || {
            let outcome = std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem(&owned));
            let _ = tx.send(outcome);
        })?;

    let text = match rx.recv_timeout(budget) {
        Ok(Ok(Ok(text))) => text,
        Ok(Ok(Err(e))) => return Err(TallyError::UnreadablePdf(e.to_string())),
        Ok(Err(_)) => {
            return Err(TallyError::UnreadablePdf("malformed PDF structure".into()));
        }
        Err(RecvTimeoutError::Timeout) => return Err(TallyError::ParseTimeout(budget)),
        Err(RecvTimeoutError::Disconnected) => {
            return Err(TallyError::UnreadablePdf("text extraction aborted".into()));
        }
    };

    let doc = ExtractedDocument::from_text(&text);
    if doc.is_blank() {
        return Err(TallyError::UnreadablePdf("no extractable text layer".into()));
    }
    debug!(pages = doc.page_count(), "extracted statement text");
    Ok(doc)
}
