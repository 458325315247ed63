//! Stage 1 entry points: PDF → Markdown artifact.
//!
//! Every entry point waits for all pages, assembles the
//! [`AssembledDocument`] and returns it together with per-page outcomes.
//! A page that fails to render or transcribe is kept as a placeholder
//! section; only when *no* page succeeded does the stage fail with
//! [`Pdf2RulesError::AllPagesFailed`].
//!
//! The `*_with` variants take any [`PageTranscriber`], which is how the
//! tests drive the stage without a hosted model.

use crate::config::ConversionConfig;
use crate::document::{AssembledDocument, DocumentHeader};
use crate::error::Pdf2RulesError;
use crate::output::{write_atomic, ConversionOutput, ConversionStats};
use crate::pipeline::input::{self, display_name};
use crate::pipeline::llm::{transcribe_pages, LlmTranscriber, PageTranscriber};
use crate::pipeline::render::{self, RenderedDocument};
use crate::provider::resolve_provider;
use std::path::Path;
use std::time::Instant;
use tracing::{info, warn};

/// Convert the PDF at `pdf_path` to Markdown with the configured provider.
///
/// # Returns
/// `Ok(ConversionOutput)` even if some pages failed
/// (check `output.stats.failed_pages`).
///
/// # Errors
/// Fatal errors only:
/// - File not found / permission denied / not a PDF
/// - Corrupt or password-protected PDF, missing pdfium library
/// - No provider could be resolved
/// - Every page failed
pub async fn convert(
    pdf_path: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Pdf2RulesError> {
    let pdf_path = input::resolve_pdf(pdf_path)?;
    let transcriber = LlmTranscriber::new(resolve_provider(config.provider_spec())?, config);
    let output = convert_resolved(&transcriber, &pdf_path, config).await?;
    require_any_page(output)
}

/// Like [`convert`], but transcribes with `transcriber`.
pub async fn convert_with<T: PageTranscriber>(
    transcriber: &T,
    pdf_path: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Pdf2RulesError> {
    let pdf_path = input::resolve_pdf(pdf_path)?;
    let output = convert_resolved(transcriber, &pdf_path, config).await?;
    require_any_page(output)
}

/// Convert a PDF and write the Markdown artifact to `output_path`.
///
/// The artifact is written before the all-pages-failed check so that
/// partial output always reaches disk; the write is atomic.
pub async fn convert_to_file(
    pdf_path: impl AsRef<Path>,
    output_path: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Pdf2RulesError> {
    let pdf_path = input::resolve_pdf(pdf_path)?;
    let transcriber = LlmTranscriber::new(resolve_provider(config.provider_spec())?, config);
    let output = convert_resolved(&transcriber, &pdf_path, config).await?;
    write_and_check(output, output_path.as_ref()).await
}

/// Like [`convert_to_file`], but transcribes with `transcriber`.
pub async fn convert_to_file_with<T: PageTranscriber>(
    transcriber: &T,
    pdf_path: impl AsRef<Path>,
    output_path: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Pdf2RulesError> {
    let pdf_path = input::resolve_pdf(pdf_path)?;
    let output = convert_resolved(transcriber, &pdf_path, config).await?;
    write_and_check(output, output_path.as_ref()).await
}

/// Synchronous wrapper around [`convert`].
///
/// Creates a temporary tokio runtime internally.
pub fn convert_sync(
    pdf_path: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Pdf2RulesError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| Pdf2RulesError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(convert(pdf_path, config))
}

/// Transcribe already-rendered pages and assemble the document.
///
/// This is the pdfium-free half of the stage: `rendered` may contain
/// per-page render failures, which become placeholder sections. Never
/// fails; the caller decides what an all-failed run means.
pub async fn convert_rendered<T: PageTranscriber>(
    transcriber: &T,
    source_name: &str,
    rendered: RenderedDocument,
    config: &ConversionConfig,
) -> ConversionOutput {
    let total_pages = rendered.page_count;
    if let Some(ref cb) = config.progress_callback {
        cb.on_conversion_start(total_pages);
    }

    let llm_start = Instant::now();
    let pages = transcribe_pages(transcriber, rendered.pages, config).await;
    let llm_duration_ms = llm_start.elapsed().as_millis() as u64;

    let document = AssembledDocument::assemble(
        DocumentHeader::new(source_name, total_pages),
        total_pages,
        &pages,
    );
    let markdown = document.to_markdown();

    let processed = pages.iter().filter(|p| p.is_success()).count();
    let stats = ConversionStats {
        total_pages,
        processed_pages: processed,
        failed_pages: total_pages - processed,
        total_input_tokens: pages.iter().map(|p| p.input_tokens as u64).sum(),
        total_output_tokens: pages.iter().map(|p| p.output_tokens as u64).sum(),
        render_duration_ms: 0,
        llm_duration_ms,
        total_duration_ms: llm_duration_ms,
    };

    if let Some(ref cb) = config.progress_callback {
        cb.on_conversion_complete(total_pages, processed);
    }

    ConversionOutput {
        markdown,
        document,
        pages,
        stats,
    }
}

// ── Internal helpers ─────────────────────────────────────────────────────

async fn convert_resolved<T: PageTranscriber>(
    transcriber: &T,
    pdf_path: &Path,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Pdf2RulesError> {
    let total_start = Instant::now();
    info!("Starting conversion: {}", pdf_path.display());

    let render_start = Instant::now();
    let rendered = render::render_pages(pdf_path, config).await?;
    let render_duration_ms = render_start.elapsed().as_millis() as u64;
    info!(
        "Rendered {} pages in {}ms",
        rendered.page_count, render_duration_ms
    );

    let mut output =
        convert_rendered(transcriber, &display_name(pdf_path), rendered, config).await;
    output.stats.render_duration_ms = render_duration_ms;
    output.stats.total_duration_ms = total_start.elapsed().as_millis() as u64;

    info!(
        "Conversion complete: {}/{} pages, {}ms total",
        output.stats.processed_pages, output.stats.total_pages, output.stats.total_duration_ms
    );
    Ok(output)
}

async fn write_and_check(
    output: ConversionOutput,
    output_path: &Path,
) -> Result<ConversionOutput, Pdf2RulesError> {
    if output.stats.total_pages > 0 {
        write_atomic(output_path, &output.markdown).await?;
        info!("Wrote {}", output_path.display());
    }
    require_any_page(output)
}

fn require_any_page(output: ConversionOutput) -> Result<ConversionOutput, Pdf2RulesError> {
    if output.stats.processed_pages > 0 {
        for page in output.failed_pages() {
            if let Some(e) = &page.error {
                warn!("Page {} left as placeholder: {}", page.page_num, e);
            }
        }
        return Ok(output);
    }

    let first_error = output
        .pages
        .iter()
        .find_map(|p| p.error.as_ref())
        .map(|e| e.to_string())
        .unwrap_or_else(|| "document has no pages".to_string());

    Err(Pdf2RulesError::AllPagesFailed {
        total: output.stats.total_pages,
        first_error,
    })
}
