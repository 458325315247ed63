//! Both stages end to end, with scripted models in place of the hosted ones.
//!
//! Stage 1 starts from already-rendered pages so no pdfium library is
//! needed; everything from transcription onwards is the production path.

mod common;

use common::{rendered, rule_per_page, ScriptedModel, ScriptedTranscriber};
use edgequake_pdf2rules::output::write_atomic;
use edgequake_pdf2rules::{
    convert_rendered, extract_rules_to_file_with, extract_rules_with, AssembledDocument,
    ConversionConfig, ExtractionConfig, PageStatus, PipelineProgress, Pdf2RulesError,
    WindowRequest,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio_test::{assert_err, assert_ok};

fn page_text(k: usize) -> Option<String> {
    Some(format!("# Section {k}\n\nStaff must keep record {k}."))
}

#[tokio::test]
async fn pdf_pages_to_rules_report_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let md_path = dir.path().join("manual.md");
    let report_path = dir.path().join("manual_rules.txt");

    let conversion = convert_rendered(
        &ScriptedTranscriber(page_text),
        "manual.pdf",
        rendered(12),
        &ConversionConfig::default(),
    )
    .await;
    assert_eq!(conversion.stats.processed_pages, 12);
    assert_ok!(write_atomic(&md_path, &conversion.markdown).await);

    let extraction = assert_ok!(
        extract_rules_to_file_with(
            &ScriptedModel(rule_per_page),
            &md_path,
            &report_path,
            &ExtractionConfig::default(),
        )
        .await
    );

    // 12 pages > threshold 10: windows 1-10 and 9-12 share pages 9 and 10.
    assert_eq!(extraction.stats.total_windows, 2);
    assert_eq!(extraction.stats.raw_rules, 14);
    assert_eq!(extraction.stats.consolidated_rules, 12);

    let report = std::fs::read_to_string(&report_path).unwrap();
    assert!(report.contains("Total Pages: 12\n"));
    assert!(report.contains("Strategy: sliding-window (2 windows)\n"));
    assert_eq!(report.matches("[Page 9] Rule: Keep record 9.").count(), 1);
    assert_eq!(report.matches("[Page 10] Rule: Keep record 10.").count(), 1);
    assert!(report.contains("[Page 12] Rule: Keep record 12."));
    assert!(report.contains("Pages 1-10: Pages 1 to 10 of the manual."));
}

#[tokio::test]
async fn failed_page_stays_in_document_and_page_count() {
    let transcriber = ScriptedTranscriber(|k: usize| if k == 3 { None } else { page_text(k) });
    let conversion = convert_rendered(
        &transcriber,
        "manual.pdf",
        rendered(5),
        &ConversionConfig::default(),
    )
    .await;

    assert_eq!(conversion.stats.failed_pages, 1);
    assert!(conversion
        .markdown
        .contains("## Page 3\n\n[Extraction failed: Page 3: extraction call failed"));

    let reparsed = AssembledDocument::parse("manual.md", &conversion.markdown).unwrap();
    assert_eq!(reparsed.page_count(), 5);
    assert!(matches!(reparsed.pages[2].status, PageStatus::Failed { .. }));

    // The model sees the placeholder and can still cite pages around it.
    let seen_placeholder = AtomicUsize::new(0);
    let model = ScriptedModel::new(|req: &WindowRequest<'_>| {
        if req.text.contains("## Page 3\n\n[Extraction failed:") {
            seen_placeholder.fetch_add(1, Ordering::SeqCst);
        }
        rule_per_page(req)
    });
    let extraction = extract_rules_with(
        &model,
        "manual.md",
        &conversion.markdown,
        &ExtractionConfig::default(),
    )
    .await
    .unwrap();
    assert_eq!(extraction.plan.total_pages, 5);
    assert_eq!(seen_placeholder.load(Ordering::SeqCst), 1);
}

#[derive(Default)]
struct Counter {
    pages_ok: AtomicUsize,
    pages_failed: AtomicUsize,
    windows_ok: AtomicUsize,
    windows_total: AtomicUsize,
}

impl PipelineProgress for Counter {
    fn on_page_complete(&self, _page: usize, _total: usize, _len: usize) {
        self.pages_ok.fetch_add(1, Ordering::SeqCst);
    }

    fn on_page_error(&self, _page: usize, _total: usize, _error: String) {
        self.pages_failed.fetch_add(1, Ordering::SeqCst);
    }

    fn on_window_complete(&self, _window: usize, _total: usize, _rules: usize) {
        self.windows_ok.fetch_add(1, Ordering::SeqCst);
    }

    fn on_extraction_start(&self, _pages: usize, total_windows: usize) {
        self.windows_total.store(total_windows, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn progress_events_cover_every_unit() {
    let counter = Arc::new(Counter::default());

    let conv_config = ConversionConfig::builder()
        .concurrency(4)
        .progress_callback(counter.clone())
        .build()
        .unwrap();
    let transcriber = ScriptedTranscriber(|k: usize| if k % 7 == 0 { None } else { page_text(k) });
    let conversion = convert_rendered(&transcriber, "manual.pdf", rendered(25), &conv_config).await;

    let ext_config = ExtractionConfig::builder()
        .concurrency(2)
        .progress_callback(counter.clone())
        .build()
        .unwrap();
    let extraction = extract_rules_with(
        &ScriptedModel(rule_per_page),
        "manual.md",
        &conversion.markdown,
        &ext_config,
    )
    .await
    .unwrap();

    assert_eq!(counter.pages_ok.load(Ordering::SeqCst), 22);
    assert_eq!(counter.pages_failed.load(Ordering::SeqCst), 3);
    assert_eq!(counter.windows_total.load(Ordering::SeqCst), 3);
    assert_eq!(counter.windows_ok.load(Ordering::SeqCst), 3);
    assert_eq!(extraction.stats.consolidated_rules, 25);
}

#[tokio::test]
async fn unwritable_output_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("not_a_dir");
    std::fs::write(&blocker, "x").unwrap();

    let err = assert_err!(write_atomic(&blocker.join("out.md"), "content").await);
    assert!(matches!(err, Pdf2RulesError::OutputWriteFailed { .. }));
}

#[tokio::test]
async fn stage_two_rejects_foreign_markdown() {
    let err = assert_err!(
        extract_rules_with(
            &ScriptedModel(rule_per_page),
            "notes.md",
            "# Notes\n\n## Page 2\n\nstarts at two\n",
            &ExtractionConfig::default(),
        )
        .await
    );
    assert!(matches!(err, Pdf2RulesError::MalformedDocument { .. }));
}
