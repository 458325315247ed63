//! Stage 2 entry points: Markdown artifact → rules report.
//!
//! ## Flow
//!
//! 1. Read and re-parse the Markdown (page count comes from the sections)
//! 2. Plan windows ([`crate::rules::window::plan_windows`])
//! 3. Extract each window ([`crate::rules::extract::extract_windows`])
//! 4. Consolidate and render the report
//!
//! Window failures never fail the stage; they are recorded on the
//! [`ExtractionOutput`] and noted in the report. The `*_with` variants take
//! any [`RuleModel`].

use crate::config::ExtractionConfig;
use crate::document::AssembledDocument;
use crate::error::Pdf2RulesError;
use crate::output::{write_atomic, ExtractionOutput, ExtractionStats};
use crate::pipeline::input;
use crate::provider::resolve_provider;
use crate::rules::consolidate::{consolidate, render_report};
use crate::rules::extract::{extract_windows, LlmRuleModel, RuleModel};
use crate::rules::window::plan_windows;
use std::path::Path;
use std::time::Instant;
use tracing::{info, warn};

/// Extract rules from the Markdown artifact at `md_path` with the
/// configured provider.
///
/// # Errors
/// Fatal errors only: unreadable file, empty or malformed document, no
/// provider. Failed windows are reported in the output.
pub async fn extract_rules(
    md_path: impl AsRef<Path>,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, Pdf2RulesError> {
    let md_path = md_path.as_ref();
    let document = load_document(md_path).await?;
    let model = LlmRuleModel::new(resolve_provider(config.provider_spec())?, config);
    Ok(analyze_document(&model, &md_path.display().to_string(), &document, config).await)
}

/// Extract rules from in-memory Markdown with `model`.
///
/// `source_label` names the input in errors and in the report banner.
pub async fn extract_rules_with<M: RuleModel>(
    model: &M,
    source_label: &str,
    markdown: &str,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, Pdf2RulesError> {
    let document = AssembledDocument::parse(source_label, markdown)?;
    Ok(analyze_document(model, source_label, &document, config).await)
}

/// Extract rules from `md_path` and write the report to `output_path`.
///
/// The report is written even if every window failed; its notes then
/// list each failure.
pub async fn extract_rules_to_file(
    md_path: impl AsRef<Path>,
    output_path: impl AsRef<Path>,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, Pdf2RulesError> {
    let output = extract_rules(md_path, config).await?;
    write_report(&output, output_path.as_ref()).await?;
    Ok(output)
}

/// Like [`extract_rules_to_file`], but analyses with `model`.
pub async fn extract_rules_to_file_with<M: RuleModel>(
    model: &M,
    md_path: impl AsRef<Path>,
    output_path: impl AsRef<Path>,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, Pdf2RulesError> {
    let md_path = md_path.as_ref();
    let document = load_document(md_path).await?;
    let output = analyze_document(model, &md_path.display().to_string(), &document, config).await;
    write_report(&output, output_path.as_ref()).await?;
    Ok(output)
}

/// Run windowing, extraction and consolidation over a parsed document.
pub async fn analyze_document<M: RuleModel>(
    model: &M,
    source_label: &str,
    document: &AssembledDocument,
    config: &ExtractionConfig,
) -> ExtractionOutput {
    let start = Instant::now();
    let total_pages = document.page_count();
    let plan = plan_windows(total_pages, config);
    info!("Analysing {} pages: {}", total_pages, plan);

    if let Some(ref cb) = config.progress_callback {
        cb.on_extraction_start(total_pages, plan.windows.len());
    }

    let windows = extract_windows(model, document, &plan, config).await;
    let report = consolidate(&windows);
    let report_text = render_report(source_label, total_pages, &plan.to_string(), &report);

    let successful_windows = windows.iter().filter(|w| w.is_success()).count();
    let stats = ExtractionStats {
        total_pages,
        total_windows: windows.len(),
        successful_windows,
        failed_windows: windows.len() - successful_windows,
        raw_rules: windows.iter().map(|w| w.result.rules.len()).sum(),
        consolidated_rules: report.rules.len(),
        total_input_tokens: windows.iter().map(|w| w.usage.input_tokens as u64).sum(),
        total_output_tokens: windows.iter().map(|w| w.usage.output_tokens as u64).sum(),
        total_duration_ms: start.elapsed().as_millis() as u64,
    };

    if let Some(ref cb) = config.progress_callback {
        cb.on_extraction_complete(stats.total_windows, successful_windows);
    }

    info!(
        "Extraction complete: {}/{} windows, {} rules ({} before merge), {}ms",
        successful_windows,
        stats.total_windows,
        stats.consolidated_rules,
        stats.raw_rules,
        stats.total_duration_ms
    );

    ExtractionOutput {
        plan,
        windows,
        report,
        report_text,
        stats,
    }
}

async fn load_document(md_path: &Path) -> Result<AssembledDocument, Pdf2RulesError> {
    let markdown = input::read_markdown(md_path).await?;
    AssembledDocument::parse(&md_path.display().to_string(), &markdown)
}

async fn write_report(output: &ExtractionOutput, path: &Path) -> Result<(), Pdf2RulesError> {
    write_atomic(path, &output.report_text).await?;
    for w in output.failed_windows() {
        if let Some(e) = &w.error {
            warn!("{} contributed nothing: {}", w.window, e);
        }
    }
    info!("Wrote {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WindowError;
    use crate::output::{TokenUsage, WindowExtraction};
    use crate::rules::extract::WindowRequest;
    use crate::rules::parse::parse_extraction;

    /// Answers every window with the same rule on the window's first page.
    struct FirstPageModel;

    impl RuleModel for FirstPageModel {
        async fn extract_rules(
            &self,
            request: &WindowRequest<'_>,
        ) -> Result<WindowExtraction, WindowError> {
            let w = request.window;
            let raw = format!(
                "DOCUMENT SUMMARY:\nPart {}.\n\nEXTRACTED RULES:\n[Page {}] Rule: Sign the log.\n",
                w.number(),
                w.start
            );
            Ok(WindowExtraction {
                result: parse_extraction(&raw, w.start, w.end)?,
                usage: TokenUsage {
                    input_tokens: 10,
                    output_tokens: 2,
                },
                retries: 0,
            })
        }
    }

    fn markdown(n: usize) -> String {
        let mut md = format!("# m.pdf\n**Pages:** {n} | **Date:** 2024-01-01 00:00:00\n\n---\n\n");
        for i in 1..=n {
            md.push_str(&format!("## Page {i}\n\nText {i}\n\n---\n\n"));
        }
        md
    }

    #[tokio::test]
    async fn short_document_is_single_pass() {
        let config = ExtractionConfig::default();
        let out = extract_rules_with(&FirstPageModel, "m.md", &markdown(4), &config)
            .await
            .unwrap();
        assert_eq!(out.stats.total_windows, 1);
        assert_eq!(out.report.summary, "Part 1.");
        assert!(out.report_text.contains("Strategy: single-pass\n"));
        assert!(out.report_text.contains("[Page 1] Rule: Sign the log."));
    }

    #[tokio::test]
    async fn long_document_merges_repeated_rule() {
        let config = ExtractionConfig::default();
        let out = extract_rules_with(&FirstPageModel, "m.md", &markdown(25), &config)
            .await
            .unwrap();
        assert_eq!(out.stats.total_windows, 3);
        assert_eq!(out.stats.raw_rules, 3);
        assert_eq!(out.stats.consolidated_rules, 1);
        assert_eq!(out.report.rules[0].page_ref.to_string(), "Page 1-17");
        assert_eq!(out.stats.total_input_tokens, 30);
    }

    #[tokio::test]
    async fn document_without_sections_is_rejected() {
        let config = ExtractionConfig::default();
        let err = extract_rules_with(&FirstPageModel, "m.md", "# title only\n", &config)
            .await
            .unwrap_err();
        assert!(matches!(err, Pdf2RulesError::EmptyDocument { .. }));
    }
}
