//! PDF text extraction.
//!
//! Pages are extracted one by one with `pdf-extract` and concatenated in
//! page order. Pages that yield no text (scanned images, blank pages) are
//! skipped. Malformed input returns [`ExtractError`]; the upload path uses
//! [`extract_pdf_text_lossy`], which logs the error and yields an empty
//! string so one bad file never fails a whole upload.
//!
//! [`TextExtractor`] is the seam the service calls through;
//! [`PdfTextExtractor`] is the `pdf-extract` implementation.

use std::panic::{self, AssertUnwindSafe};

/// Extraction error. Extraction never panics past this module.
#[derive(Debug)]
pub enum ExtractError {
    Pdf(String),
    /// The PDF parser panicked on malformed input.
    Panicked,
}

impl std::fmt::Display for ExtractError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractError::Pdf(e) => write!(f, "PDF extraction failed: {}", e),
            ExtractError::Panicked => write!(f, "PDF extraction failed: parser panicked"),
        }
    }
}

impl std::error::Error for ExtractError {}

/// Returns true when `filename` carries a `.pdf` suffix (ASCII case-insensitive).
pub fn is_pdf_filename(filename: &str) -> bool {
    let lower = filename.to_ascii_lowercase();
    lower.len() > ".pdf".len() && lower.ends_with(".pdf")
}

/// Extract the text of every page, skipping pages with no text.
pub fn extract_pdf_text(bytes: &[u8]) -> Result<String, ExtractError> {
    let pages = panic::catch_unwind(AssertUnwindSafe(|| {
        pdf_extract::extract_text_from_mem_by_pages(bytes)
    }))
    .map_err(|_| ExtractError::Panicked)?
    .map_err(|e| ExtractError::Pdf(e.to_string()))?;

    let mut text = String::new();
    for (i, page) in pages.iter().enumerate() {
        if page.trim().is_empty() {
            tracing::debug!(page = i + 1, "skipping page with no extractable text");
            continue;
        }
        text.push_str(page);
    }
    Ok(text)
}

/// Like [`extract_pdf_text`], but logs failures and returns an empty string.
pub fn extract_pdf_text_lossy(filename: &str, bytes: &[u8]) -> String {
    match extract_pdf_text(bytes) {
        Ok(text) => text,
        Err(e) => {
            tracing::warn!(file = filename, error = %e, "error reading PDF");
            String::new()
        }
    }
}

/// Turns the bytes of an uploaded file into plain text.
///
/// Implementations run on a blocking thread and must not fail: unreadable
/// input yields an empty string.
pub trait TextExtractor: Send + Sync {
    fn extract(&self, filename: &str, bytes: &[u8]) -> String;
}

/// The production extractor, backed by `pdf-extract`.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfTextExtractor;

impl TextExtractor for PdfTextExtractor {
    fn extract(&self, filename: &str, bytes: &[u8]) -> String {
        extract_pdf_text_lossy(filename, bytes)
    }
}
