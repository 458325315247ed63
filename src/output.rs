//! Result types returned by both pipeline stages.
//!
//! Everything here derives `Serialize` so the CLI can emit a run as JSON
//! (`--json`) without a separate view model.

use crate::document::AssembledDocument;
use crate::error::{PageError, Pdf2RulesError, WindowError};
use crate::rules::types::{ConsolidatedReport, RuleExtractionResult};
use crate::rules::window::{Window, WindowPlan};
use serde::Serialize;
use std::ffi::OsString;
use std::ops::AddAssign;
use std::path::Path;
use tracing::warn;

/// Token counts reported by the provider for one or more calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TokenUsage {
    pub input_tokens: usize,
    pub output_tokens: usize,
}

impl AddAssign for TokenUsage {
    fn add_assign(&mut self, rhs: Self) {
        self.input_tokens += rhs.input_tokens;
        self.output_tokens += rhs.output_tokens;
    }
}

// ── Stage 1 ──────────────────────────────────────────────────────────────

/// What a [`crate::pipeline::llm::PageTranscriber`] returns for one page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transcription {
    pub markdown: String,
    pub usage: TokenUsage,
    /// Retries spent before the call succeeded.
    pub retries: u32,
}

/// Outcome of transcribing a single page.
///
/// Always produced, even on failure: `error` is then set and `markdown` is
/// empty.
#[derive(Debug, Clone, Serialize)]
pub struct PageResult {
    /// 1-indexed page number.
    pub page_num: usize,
    pub markdown: String,
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub duration_ms: u64,
    pub retries: u32,
    pub error: Option<PageError>,
}

impl PageResult {
    pub fn success(page_num: usize, transcription: Transcription, duration_ms: u64) -> Self {
        Self {
            page_num,
            markdown: transcription.markdown,
            input_tokens: transcription.usage.input_tokens,
            output_tokens: transcription.usage.output_tokens,
            duration_ms,
            retries: transcription.retries,
            error: None,
        }
    }

    pub fn failed(error: PageError, duration_ms: u64) -> Self {
        let retries = match &error {
            PageError::ExtractionFailed { retries, .. } => *retries,
            _ => 0,
        };
        Self {
            page_num: error.page(),
            markdown: String::new(),
            input_tokens: 0,
            output_tokens: 0,
            duration_ms,
            retries,
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Aggregate numbers for one stage-1 run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConversionStats {
    /// Page count reported by the PDF itself.
    pub total_pages: usize,
    pub processed_pages: usize,
    pub failed_pages: usize,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub render_duration_ms: u64,
    pub llm_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// Everything stage 1 produced.
#[derive(Debug, Clone, Serialize)]
pub struct ConversionOutput {
    /// Serialized Markdown artifact.
    pub markdown: String,
    #[serde(skip)]
    pub document: AssembledDocument,
    /// Per-page outcomes in page order.
    pub pages: Vec<PageResult>,
    pub stats: ConversionStats,
}

impl ConversionOutput {
    pub fn failed_pages(&self) -> impl Iterator<Item = &PageResult> {
        self.pages.iter().filter(|p| !p.is_success())
    }
}

// ── Stage 2 ──────────────────────────────────────────────────────────────

/// What a [`crate::rules::extract::RuleModel`] returns for one window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowExtraction {
    pub result: RuleExtractionResult,
    pub usage: TokenUsage,
    pub retries: u32,
}

/// Outcome of one window. On failure `result` is empty and `error` set.
#[derive(Debug, Clone, Serialize)]
pub struct WindowOutcome {
    pub window: Window,
    pub result: RuleExtractionResult,
    pub error: Option<WindowError>,
    pub usage: TokenUsage,
    pub retries: u32,
    pub duration_ms: u64,
}

impl WindowOutcome {
    pub fn success(window: Window, extraction: WindowExtraction, duration_ms: u64) -> Self {
        Self {
            window,
            result: extraction.result,
            error: None,
            usage: extraction.usage,
            retries: extraction.retries,
            duration_ms,
        }
    }

    pub fn failed(window: Window, error: WindowError, duration_ms: u64) -> Self {
        let retries = match &error {
            WindowError::ExtractionFailed { retries, .. } => *retries,
            _ => 0,
        };
        Self {
            window,
            result: RuleExtractionResult::default(),
            error: Some(error),
            usage: TokenUsage::default(),
            retries,
            duration_ms,
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Aggregate numbers for one stage-2 run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExtractionStats {
    pub total_pages: usize,
    pub total_windows: usize,
    pub successful_windows: usize,
    pub failed_windows: usize,
    /// Rules before deduplication.
    pub raw_rules: usize,
    /// Rules in the consolidated report.
    pub consolidated_rules: usize,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub total_duration_ms: u64,
}

/// Everything stage 2 produced.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionOutput {
    pub plan: WindowPlan,
    /// Per-window outcomes in window order.
    pub windows: Vec<WindowOutcome>,
    pub report: ConsolidatedReport,
    /// Serialized rules report, banner included.
    pub report_text: String,
    pub stats: ExtractionStats,
}

impl ExtractionOutput {
    pub fn failed_windows(&self) -> impl Iterator<Item = &WindowOutcome> {
        self.windows.iter().filter(|w| !w.is_success())
    }
}

// ── Writing ──────────────────────────────────────────────────────────────

/// Write `contents` to `path` via a sibling temp file and a rename, so a
/// reader never sees a half-written artifact.
pub async fn write_atomic(path: &Path, contents: &str) -> Result<(), Pdf2RulesError> {
    let write_err = |source| Pdf2RulesError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }

    let mut tmp_name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| OsString::from("output"));
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    tokio::fs::write(&tmp_path, contents)
        .await
        .map_err(write_err)?;
    if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
        if let Err(cleanup) = tokio::fs::remove_file(&tmp_path).await {
            warn!("Could not remove {}: {}", tmp_path.display(), cleanup);
        }
        return Err(write_err(e));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_page_keeps_retry_count() {
        let r = PageResult::failed(
            PageError::ExtractionFailed {
                page: 3,
                retries: 2,
                detail: "503".into(),
            },
            10,
        );
        assert_eq!(r.page_num, 3);
        assert_eq!(r.retries, 2);
        assert!(!r.is_success());
        assert!(r.markdown.is_empty());
    }

    #[test]
    fn failed_window_contributes_empty_result() {
        let w = Window {
            index: 0,
            start: 1,
            end: 10,
            overlap: 0,
        };
        let o = WindowOutcome::failed(w, WindowError::Timeout { secs: 5 }, 1);
        assert!(o.result.is_empty());
        assert!(!o.is_success());
    }

    #[test]
    fn usage_accumulates() {
        let mut total = TokenUsage::default();
        total += TokenUsage {
            input_tokens: 10,
            output_tokens: 3,
        };
        total += TokenUsage {
            input_tokens: 5,
            output_tokens: 1,
        };
        assert_eq!(total.input_tokens, 15);
        assert_eq!(total.output_tokens, 4);
    }

    #[tokio::test]
    async fn write_atomic_creates_parents_and_leaves_no_temp() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/out.md");
        write_atomic(&path, "hello").await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "hello");
        assert!(!dir.path().join("nested/out.md.tmp").exists());
    }

    #[tokio::test]
    async fn failed_rename_removes_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report");
        std::fs::create_dir(&path).unwrap();

        let err = write_atomic(&path, "hello").await.unwrap_err();
        assert!(matches!(err, Pdf2RulesError::OutputWriteFailed { .. }));
        assert!(!dir.path().join("report.tmp").exists());
        assert!(path.is_dir());
    }

    #[test]
    fn page_result_serialises_error() {
        let r = PageResult::failed(PageError::Timeout { page: 1, secs: 2 }, 0);
        let json = serde_json::to_string(&r).unwrap();
        assert!(json.contains("Timeout"), "got: {json}");
    }
}
