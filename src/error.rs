//! Error types for the expensepal library.
//!
//! Three error types reflect three distinct failure modes:
//!
//! * [`ExpenseError`] — **Fatal**: the operation cannot proceed at all
//!   (bad input file, unreachable URL, provider not configured). Returned as
//!   `Err(ExpenseError)` from the extraction entry points.
//!
//! * [`PageError`] — **Non-fatal**: a single page of a policy document failed
//!   (unreadable image, reasoner error, unparseable reply) while the other
//!   pages are fine. Stored in [`crate::output::PolicyExtraction::page_errors`]
//!   so callers can inspect partial success.
//!
//! * [`ReasonerError`] — a single call to the external reasoner failed. It
//!   becomes a `PageError` inside the page processor, an `ExpenseError` for
//!   invoice and text extraction, and a violation message in a compliance
//!   verdict.
//!
//! Compliance checking itself never returns an error; see
//! [`crate::compliance::check_policy_compliance`].

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the expensepal library.
#[derive(Debug, Error)]
pub enum ExpenseError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("File not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a usable path, URL or file type.
    #[error("Invalid input '{input}': {reason}")]
    InvalidInput { input: String, reason: String },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    /// The file is not an image format the reasoner accepts.
    #[error("File is not a supported image (JPEG or PNG): '{path}'")]
    UnsupportedImage { path: PathBuf },

    // ── Fetch errors ──────────────────────────────────────────────────────
    /// HTTP URL was syntactically valid but the fetch failed.
    #[error("Failed to fetch '{url}': {reason}")]
    FetchFailed { url: String, reason: String },

    /// Fetch exceeded the configured timeout.
    #[error("Fetching '{url}' timed out after {secs}s")]
    FetchTimeout { url: String, secs: u64 },

    /// The fetched body is larger than the configured cap.
    #[error("Content at '{url}' is too large: {actual} bytes (limit {limit})")]
    ContentTooLarge { url: String, limit: u64, actual: u64 },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF '{path}' is encrypted and requires a password.")]
    PasswordRequired { path: PathBuf },

    /// A password was provided but it is wrong.
    #[error("Wrong password for PDF '{path}'")]
    WrongPassword { path: PathBuf },

    /// The requested page does not exist.
    #[error("Page {page} is out of range (document has {total} pages)")]
    PageOutOfRange { page: usize, total: usize },

    /// Rasterisation produced no pages at all.
    #[error("No images were extracted from '{path}'")]
    EmptyDocument { path: PathBuf },

    /// pdfium returned an error for a specific page.
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium or install pdfium system-wide."
    )]
    PdfiumBindingFailed(String),

    // ── Reasoner errors ───────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// The external reasoner call failed.
    #[error(transparent)]
    Reasoner(#[from] ReasonerError),

    /// The reasoner replied, but no JSON object could be recovered.
    #[error("No valid JSON found in {context} response")]
    NoValidJson { context: String },

    /// A JSON object was recovered but does not have the expected shape.
    #[error("Malformed {context} response: {detail}")]
    MalformedResponse { context: String, detail: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A failed call to the external reasoner.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReasonerError {
    /// Every candidate model reported itself unavailable.
    #[error("No available model found (tried: {}): {last_error}", tried.join(", "))]
    NoModelAvailable {
        tried: Vec<String>,
        last_error: String,
    },

    /// The provider returned an error that is not a model-availability signal.
    #[error("LLM API error from model '{model}': {detail}")]
    Api { model: String, detail: String },
}

/// A non-fatal error for a single page of a policy document.
///
/// The page contributes zero policies; its siblings are unaffected.
#[derive(Debug, Clone, Error, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum PageError {
    /// The rasterised page image could not be read back.
    #[error("Page {page}: could not read page image: {detail}")]
    ReadFailed { page: usize, detail: String },

    /// The reasoner call failed.
    #[error("Page {page}: reasoner call failed: {detail}")]
    ReasonerFailed { page: usize, detail: String },

    /// The reply contained no recoverable JSON object.
    #[error("Page {page}: no valid JSON in reasoner response")]
    NoValidJson { page: usize },

    /// The recovered JSON is not a policy list.
    #[error("Page {page}: malformed policy list: {detail}")]
    Malformed { page: usize, detail: String },
}

impl PageError {
    /// 1-based page number the error belongs to.
    pub fn page(&self) -> usize {
        match self {
            PageError::ReadFailed { page, .. }
            | PageError::ReasonerFailed { page, .. }
            | PageError::NoValidJson { page }
            | PageError::Malformed { page, .. } => *page,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_model_available_lists_candidates() {
        let e = ReasonerError::NoModelAvailable {
            tried: vec!["model-a".into(), "model-b".into()],
            last_error: "model not found".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("model-a, model-b"), "got: {msg}");
        assert!(msg.contains("model not found"));
    }

    #[test]
    fn reasoner_error_is_transparent_in_expense_error() {
        let e: ExpenseError = ReasonerError::Api {
            model: "claude".into(),
            detail: "throttled".into(),
        }
        .into();
        assert_eq!(e.to_string(), "LLM API error from model 'claude': throttled");
    }

    #[test]
    fn content_too_large_display() {
        let e = ExpenseError::ContentTooLarge {
            url: "https://example.org/policy".into(),
            limit: 10,
            actual: 42,
        };
        let msg = e.to_string();
        assert!(msg.contains("42 bytes"), "got: {msg}");
        assert!(msg.contains("limit 10"));
    }

    #[test]
    fn page_error_reports_its_page() {
        let e = PageError::Malformed {
            page: 7,
            detail: "missing field `text`".into(),
        };
        assert_eq!(e.page(), 7);
        assert!(e.to_string().starts_with("Page 7:"));
    }

    #[test]
    fn page_error_serialises_with_kind_tag() {
        let e = PageError::NoValidJson { page: 2 };
        let json = serde_json::to_value(&e).unwrap();
        assert_eq!(json["kind"], "noValidJson");
        assert_eq!(json["page"], 2);
    }
}
