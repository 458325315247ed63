//! Error types for the edgequake-pdf2rules library.
//!
//! Failures come in two scopes:
//!
//! * [`Pdf2RulesError`] — **Fatal**: the stage cannot proceed at all
//!   (bad input file, unreadable Markdown, provider not configured, output
//!   not writable). Returned as `Err(Pdf2RulesError)` from the entry points
//!   in [`crate::convert`] and [`crate::analyze`].
//!
//! * [`PageError`] / [`WindowError`] — **Non-fatal**: one page or one window
//!   failed (render glitch, API error, malformed model output) but every other
//!   unit is fine. They are stored next to the result they degrade
//!   ([`crate::output::PageResult`], [`crate::output::WindowOutcome`]) so a
//!   single bad unit never aborts the run.
//!
//! [`ParseError`] describes how a model response deviates from the strict
//! layout expected by [`crate::rules::parse`].

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-pdf2rules library.
#[derive(Debug, Error)]
pub enum Pdf2RulesError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("File not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    /// The Markdown input could not be read.
    #[error("Failed to read Markdown file '{path}': {source}")]
    InputReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}\nTry repairing with: qpdf --decrypt input.pdf output.pdf")]
    CorruptPdf { path: PathBuf, detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF '{path}' is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired { path: PathBuf },

    /// A password was provided but it is wrong.
    #[error("Wrong password for PDF '{path}'")]
    WrongPassword { path: PathBuf },

    /// Rendering resolution must be a positive DPI.
    #[error("Invalid rendering resolution: {dpi} DPI")]
    InvalidResolution { dpi: u32 },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Place libpdfium next to the binary, install it system-wide, or\n\
set PDFIUM_LIB_PATH=/path/to/libpdfium.\n"
    )]
    PdfiumBindingFailed(String),

    // ── Markdown document errors ──────────────────────────────────────────
    /// The Markdown document has no `## Page k` sections.
    #[error("Markdown document '{source_name}' contains no page sections")]
    EmptyDocument { source_name: String },

    /// Page sections are not numbered 1..N in order.
    #[error("Markdown document '{source_name}' is malformed: {detail}")]
    MalformedDocument { source_name: String, detail: String },

    // ── LLM errors ────────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// Every page failed; the Markdown carries placeholders only.
    #[error("All {total} pages failed.\nFirst error: {first_error}")]
    AllPagesFailed { total: usize, first_error: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write an output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single page.
///
/// The page is still written to the Markdown artifact, as a placeholder.
#[derive(Debug, Clone, PartialEq, Error, serde::Serialize, serde::Deserialize)]
pub enum PageError {
    /// Page rasterisation failed.
    #[error("Page {page}: rasterisation failed: {detail}")]
    RenderFailed { page: usize, detail: String },

    /// The rendered image could not be encoded for upload.
    #[error("Page {page}: image encoding failed: {detail}")]
    EncodeFailed { page: usize, detail: String },

    /// The vision call failed (service error, auth failure, empty answer).
    #[error("Page {page}: extraction call failed after {retries} retries: {detail}")]
    ExtractionFailed {
        page: usize,
        retries: u32,
        detail: String,
    },

    /// The vision call timed out.
    #[error("Page {page}: extraction call timed out after {secs}s")]
    Timeout { page: usize, secs: u64 },
}

impl PageError {
    /// 1-indexed page the error belongs to.
    pub fn page(&self) -> usize {
        match self {
            PageError::RenderFailed { page, .. }
            | PageError::EncodeFailed { page, .. }
            | PageError::ExtractionFailed { page, .. }
            | PageError::Timeout { page, .. } => *page,
        }
    }
}

/// A non-fatal error for one extraction window.
///
/// The window then contributes an empty result to consolidation.
#[derive(Debug, Clone, PartialEq, Error, serde::Serialize, serde::Deserialize)]
pub enum WindowError {
    /// The language-model call failed.
    #[error("extraction call failed after {retries} retries: {detail}")]
    ExtractionFailed { retries: u32, detail: String },

    /// The language-model call timed out.
    #[error("extraction call timed out after {secs}s")]
    Timeout { secs: u64 },

    /// The model answered, but not in the expected layout.
    #[error("unparseable model output: {0}")]
    Parse(#[from] ParseError),
}

/// How a model response deviates from the expected rule listing layout.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
pub enum ParseError {
    /// A required section heading is absent.
    #[error("missing section '{section}'")]
    MissingSection { section: String },

    /// Text appeared outside of any known section.
    #[error("unexpected text before the first section at line {line}: {text:?}")]
    UnexpectedText { line: usize, text: String },

    /// A line in the rules section does not follow `[Page p] Label: text`.
    #[error("malformed rule line {line}: {text:?}")]
    MalformedRuleLine { line: usize, text: String },

    /// A page reference is not a valid page or ascending range.
    #[error("invalid page reference at line {line}: {text:?}")]
    InvalidPageRef { line: usize, text: String },

    /// A page reference points outside the pages the window contained.
    #[error("page reference {reference} at line {line} is outside pages {start}-{end}")]
    PageOutOfWindow {
        line: usize,
        reference: String,
        start: usize,
        end: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_pages_failed_display() {
        let e = Pdf2RulesError::AllPagesFailed {
            total: 4,
            first_error: "Page 1: extraction call timed out after 60s".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("All 4 pages"), "got: {msg}");
        assert!(msg.contains("timed out"), "got: {msg}");
    }

    #[test]
    fn page_error_reports_its_page() {
        let e = PageError::Timeout { page: 7, secs: 30 };
        assert_eq!(e.page(), 7);
        assert!(e.to_string().contains("Page 7"));
    }

    #[test]
    fn window_error_wraps_parse_error() {
        let e: WindowError = ParseError::MissingSection {
            section: "EXTRACTED RULES".into(),
        }
        .into();
        assert!(e.to_string().contains("EXTRACTED RULES"));
        assert!(matches!(e, WindowError::Parse(_)));
    }

    #[test]
    fn page_out_of_window_display() {
        let e = ParseError::PageOutOfWindow {
            line: 4,
            reference: "Page 12".into(),
            start: 1,
            end: 10,
        };
        let msg = e.to_string();
        assert!(msg.contains("Page 12"));
        assert!(msg.contains("1-10"));
    }
}
