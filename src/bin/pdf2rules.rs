//! CLI binary for edgequake-pdf2rules.
//!
//! A thin shim over the library crate: maps flags to `ConversionConfig` /
//! `ExtractionConfig`, runs one or both stages and prints a summary.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use edgequake_pdf2rules::{
    convert_to_file, extract_rules_to_file, ConversionConfig, ConversionOutput,
    ExtractionConfig, ExtractionOutput, ExtractionStrategy, PageImageFormat, PipelineProgress,
    ProgressCallback,
};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers ──────────────────────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress for both stages: one bar per stage plus a log line
/// per page or window. Pages complete out of order, so start times are
/// keyed by unit number.
struct CliProgress {
    bar: Mutex<ProgressBar>,
    start_times: Mutex<HashMap<usize, Instant>>,
}

impl CliProgress {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(TICKS),
        );
        bar.set_prefix("Preparing");
        bar.set_message("Opening input…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar: Mutex::new(bar),
            start_times: Mutex::new(HashMap::new()),
        })
    }

    fn bar(&self) -> ProgressBar {
        match self.bar.lock() {
            Ok(bar) => bar.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Replace the current bar with a counting bar for `total` units.
    fn start_stage(&self, prefix: &'static str, total: usize, unit: &str) {
        let bar = ProgressBar::new(total as u64);
        bar.set_style(
            ProgressStyle::with_template(&format!(
                "{{spinner:.cyan}} {{prefix:.bold}}  \
                 [{{bar:42.green/238}}] {{pos:>3}}/{{len}} {unit}  \
                 ⏱ {{elapsed_precise}}  ETA {{eta_precise}}"
            ))
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏  ")
            .tick_strings(TICKS),
        );
        bar.set_prefix(prefix);
        bar.enable_steady_tick(Duration::from_millis(80));

        if let Ok(mut current) = self.bar.lock() {
            current.finish_and_clear();
            *current = bar;
        }
    }

    fn mark_start(&self, key: usize) {
        if let Ok(mut times) = self.start_times.lock() {
            times.insert(key, Instant::now());
        }
    }

    fn elapsed_secs(&self, key: usize) -> f64 {
        self.start_times
            .lock()
            .ok()
            .and_then(|mut times| times.remove(&key))
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }

    fn summary(&self, what: &str, total: usize, ok: usize) {
        self.bar().finish_and_clear();
        let failed = total.saturating_sub(ok);
        if failed == 0 {
            eprintln!("{} {} {what} succeeded", green("✔"), bold(&ok.to_string()));
        } else {
            eprintln!(
                "{} {}/{} {what} succeeded  ({} failed)",
                if failed == total { red("✘") } else { cyan("⚠") },
                bold(&ok.to_string()),
                total,
                red(&failed.to_string()),
            );
        }
    }
}

fn truncate(msg: String) -> String {
    if msg.chars().count() > 80 {
        format!("{}\u{2026}", msg.chars().take(79).collect::<String>())
    } else {
        msg
    }
}

impl PipelineProgress for CliProgress {
    fn on_conversion_start(&self, total_pages: usize) {
        self.start_stage("Transcribing", total_pages, "pages");
        self.bar().println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Transcribing {total_pages} pages…"))
        ));
    }

    fn on_page_start(&self, page_num: usize, _total: usize) {
        self.mark_start(page_num);
        self.bar().set_message(format!("page {page_num}"));
    }

    fn on_page_complete(&self, page_num: usize, total: usize, markdown_len: usize) {
        let secs = self.elapsed_secs(page_num);
        let bar = self.bar();
        bar.println(format!(
            "  {} Page {:>3}/{:<3}  {:<8}  {}",
            green("✓"),
            page_num,
            total,
            dim(&format!("{markdown_len:>5} chars")),
            dim(&format!("{secs:.1}s")),
        ));
        bar.inc(1);
    }

    fn on_page_error(&self, page_num: usize, total: usize, error: String) {
        let secs = self.elapsed_secs(page_num);
        let bar = self.bar();
        bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}  {}",
            red("✗"),
            page_num,
            total,
            red(&truncate(error)),
            dim(&format!("{secs:.1}s")),
        ));
        bar.inc(1);
    }

    fn on_conversion_complete(&self, total_pages: usize, success_count: usize) {
        self.summary("pages", total_pages, success_count);
    }

    fn on_extraction_start(&self, total_pages: usize, total_windows: usize) {
        self.start_stage("Extracting", total_windows, "windows");
        self.bar().println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!(
                "Extracting rules from {total_pages} pages in {total_windows} window(s)…"
            ))
        ));
    }

    fn on_window_start(&self, window_num: usize, _total: usize, start: usize, end: usize) {
        self.mark_start(window_num);
        self.bar().set_message(format!("pages {start}-{end}"));
    }

    fn on_window_complete(&self, window_num: usize, total: usize, rule_count: usize) {
        let secs = self.elapsed_secs(window_num);
        let bar = self.bar();
        bar.println(format!(
            "  {} Window {:>2}/{:<2}  {:<10}  {}",
            green("✓"),
            window_num,
            total,
            dim(&format!("{rule_count:>4} rules")),
            dim(&format!("{secs:.1}s")),
        ));
        bar.inc(1);
    }

    fn on_window_error(&self, window_num: usize, total: usize, error: String) {
        let secs = self.elapsed_secs(window_num);
        let bar = self.bar();
        bar.println(format!(
            "  {} Window {:>2}/{:<2}  {}  {}",
            red("✗"),
            window_num,
            total,
            red(&truncate(error)),
            dim(&format!("{secs:.1}s")),
        ));
        bar.inc(1);
    }

    fn on_extraction_complete(&self, total_windows: usize, success_count: usize) {
        self.summary("windows", total_windows, success_count);
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Stage 1: PDF → Markdown
  pdf2rules transcribe manual.pdf -o manual.md

  # Stage 2: Markdown → rules report
  pdf2rules rules manual.md -o manual_rules.txt

  # Both stages
  pdf2rules run manual.pdf --markdown manual.md --report manual_rules.txt

  # Smaller windows, more overlap, two windows in flight
  pdf2rules rules manual.md --window-size 6 --overlap 3 --window-concurrency 2

  # Always analyse the whole document in one call
  pdf2rules rules manual.md --strategy single-pass

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  PDFIUM_LIB_PATH         Path to libpdfium
  PDF2RULES_*             Fallback for every flag (see --help of each command)
"#;

/// Transcribe PDFs with a vision model and extract page-referenced rules.
#[derive(Parser, Debug)]
#[command(
    name = "pdf2rules",
    version,
    about = "Transcribe PDFs with a vision model and extract page-referenced rules",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Print the full result as JSON on stdout.
    #[arg(long, global = true, env = "PDF2RULES_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, global = true, env = "PDF2RULES_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "PDF2RULES_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "PDF2RULES_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Stage 1: transcribe every page of a PDF into a Markdown document.
    Transcribe {
        /// PDF file to transcribe.
        pdf: PathBuf,

        /// Markdown output path.
        #[arg(short, long, env = "PDF2RULES_MARKDOWN", default_value = "extracted_content.md")]
        output: PathBuf,

        #[command(flatten)]
        model: ModelArgs,

        #[command(flatten)]
        transcribe: TranscribeArgs,
    },

    /// Stage 2: extract rules from a Markdown document written by `transcribe`.
    Rules {
        /// Markdown document to analyse.
        markdown: PathBuf,

        /// Rules report output path.
        #[arg(short, long, env = "PDF2RULES_REPORT", default_value = "extracted_rules.txt")]
        output: PathBuf,

        #[command(flatten)]
        model: ModelArgs,

        #[command(flatten)]
        extract: ExtractArgs,
    },

    /// Both stages: PDF → Markdown → rules report.
    Run {
        /// PDF file to process.
        pdf: PathBuf,

        /// Intermediate Markdown path.
        #[arg(long, env = "PDF2RULES_MARKDOWN", default_value = "extracted_content.md")]
        markdown: PathBuf,

        /// Rules report output path.
        #[arg(long, env = "PDF2RULES_REPORT", default_value = "extracted_rules.txt")]
        report: PathBuf,

        #[command(flatten)]
        model: ModelArgs,

        #[command(flatten)]
        transcribe: TranscribeArgs,

        #[command(flatten)]
        extract: ExtractArgs,
    },
}

/// Provider selection and call policy shared by both stages.
#[derive(Args, Debug)]
struct ModelArgs {
    /// LLM model ID (e.g. gpt-4o, claude-sonnet-4-20250514).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "PDF2RULES_PROVIDER")]
    provider: Option<String>,

    /// Retries per model call on failure.
    #[arg(long, env = "PDF2RULES_MAX_RETRIES", default_value_t = 0)]
    max_retries: u32,

    /// Initial retry delay in milliseconds, doubled per attempt.
    #[arg(long, env = "PDF2RULES_RETRY_BACKOFF_MS", default_value_t = 500)]
    retry_backoff_ms: u64,
}

#[derive(Args, Debug)]
struct TranscribeArgs {
    /// Rendering DPI (72–400).
    #[arg(long, env = "PDF2RULES_DPI", default_value_t = 150,
          value_parser = clap::value_parser!(u32).range(72..=400))]
    dpi: u32,

    /// Number of concurrent vision calls.
    #[arg(short = 'w', long, env = "PDF2RULES_WORKERS", default_value_t = 5)]
    workers: usize,

    /// Longest rendered edge in pixels.
    #[arg(long, env = "PDF2RULES_MAX_PIXELS", default_value_t = 2000)]
    max_pixels: u32,

    /// Upload pages as JPEG at this quality (1–100) instead of PNG.
    #[arg(long, env = "PDF2RULES_JPEG_QUALITY",
          value_parser = clap::value_parser!(u8).range(1..=100))]
    jpeg_quality: Option<u8>,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "PDF2RULES_PASSWORD")]
    password: Option<String>,

    /// Path to a text file containing a custom transcription prompt.
    #[arg(long, env = "PDF2RULES_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// Keep the model's Markdown exactly as returned.
    #[arg(long, env = "PDF2RULES_NO_CLEAN")]
    no_clean: bool,

    /// Max output tokens per page.
    #[arg(long, env = "PDF2RULES_PAGE_MAX_TOKENS", default_value_t = 1500)]
    page_max_tokens: usize,

    /// Per-page call timeout in seconds.
    #[arg(long, env = "PDF2RULES_PAGE_TIMEOUT", default_value_t = 120)]
    page_timeout: u64,
}

#[derive(Args, Debug)]
struct ExtractArgs {
    /// Documents with at most this many pages are analysed in one call.
    #[arg(long, env = "PDF2RULES_THRESHOLD", default_value_t = 10)]
    threshold: usize,

    /// Pages per window in sliding-window mode.
    #[arg(long, env = "PDF2RULES_WINDOW_SIZE", default_value_t = 10)]
    window_size: usize,

    /// Pages shared by consecutive windows.
    #[arg(long, env = "PDF2RULES_OVERLAP", default_value_t = 2)]
    overlap: usize,

    /// Windowing strategy.
    #[arg(long, env = "PDF2RULES_STRATEGY", value_enum, default_value = "auto")]
    strategy: StrategyArg,

    /// Number of windows analysed at once.
    #[arg(long, env = "PDF2RULES_WINDOW_CONCURRENCY", default_value_t = 1)]
    window_concurrency: usize,

    /// Max output tokens per window.
    #[arg(long, env = "PDF2RULES_WINDOW_MAX_TOKENS", default_value_t = 4000)]
    window_max_tokens: usize,

    /// Per-window call timeout in seconds.
    #[arg(long, env = "PDF2RULES_WINDOW_TIMEOUT", default_value_t = 180)]
    window_timeout: u64,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum StrategyArg {
    Auto,
    SinglePass,
    SlidingWindow,
}

impl From<StrategyArg> for ExtractionStrategy {
    fn from(v: StrategyArg) -> Self {
        match v {
            StrategyArg::Auto => ExtractionStrategy::Auto,
            StrategyArg::SinglePass => ExtractionStrategy::SinglePass,
            StrategyArg::SlidingWindow => ExtractionStrategy::SlidingWindow,
        }
    }
}

/// What `--json` prints for `run`.
#[derive(Serialize)]
struct RunOutput<'a> {
    conversion: &'a ConversionOutput,
    extraction: &'a ExtractionOutput,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar carries the user-facing feedback, so library INFO
    // logs are suppressed while it is shown.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let progress: Option<ProgressCallback> = if show_progress {
        Some(CliProgress::new() as Arc<dyn PipelineProgress>)
    } else {
        None
    };

    let clean = match &cli.command {
        Command::Transcribe {
            pdf,
            output,
            model,
            transcribe,
        } => {
            let config = conversion_config(model, transcribe, progress).await?;
            let out = run_transcribe(pdf, output, &config).await?;
            if cli.json {
                print_json(&out)?;
            } else if !cli.quiet {
                print_conversion_summary(&out, output);
            }
            out.stats.failed_pages == 0
        }

        Command::Rules {
            markdown,
            output,
            model,
            extract,
        } => {
            let config = extraction_config(model, extract, progress)?;
            let out = run_rules(markdown, output, &config).await?;
            if cli.json {
                print_json(&out)?;
            } else if !cli.quiet {
                print_extraction_summary(&out, output);
            }
            out.stats.failed_windows == 0
        }

        Command::Run {
            pdf,
            markdown,
            report,
            model,
            transcribe,
            extract,
        } => {
            let conv_config = conversion_config(model, transcribe, progress.clone()).await?;
            let ext_config = extraction_config(model, extract, progress)?;

            let conversion = run_transcribe(pdf, markdown, &conv_config).await?;
            if !cli.quiet && !cli.json {
                print_conversion_summary(&conversion, markdown);
            }
            let extraction = run_rules(markdown, report, &ext_config).await?;
            if cli.json {
                print_json(&RunOutput {
                    conversion: &conversion,
                    extraction: &extraction,
                })?;
            } else if !cli.quiet {
                print_extraction_summary(&extraction, report);
            }
            conversion.stats.failed_pages == 0 && extraction.stats.failed_windows == 0
        }
    };

    Ok(if clean {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn run_transcribe(
    pdf: &Path,
    output: &Path,
    config: &ConversionConfig,
) -> Result<ConversionOutput> {
    let out = convert_to_file(pdf, output, config)
        .await
        .with_context(|| format!("Transcription of '{}' failed", pdf.display()))?;
    for page in out.failed_pages() {
        if let Some(e) = &page.error {
            eprintln!("{} {}", red("✗"), e);
        }
    }
    Ok(out)
}

async fn run_rules(
    markdown: &Path,
    output: &Path,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput> {
    let out = extract_rules_to_file(markdown, output, config)
        .await
        .with_context(|| format!("Rule extraction from '{}' failed", markdown.display()))?;
    for w in out.failed_windows() {
        if let Some(e) = &w.error {
            eprintln!("{} {}: {}", red("✗"), w.window, e);
        }
    }
    Ok(out)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialise output")?;
    println!("{json}");
    Ok(())
}

fn print_conversion_summary(out: &ConversionOutput, path: &Path) {
    let stats = &out.stats;
    eprintln!(
        "{}  {}/{} pages  {}ms  →  {}",
        if stats.failed_pages == 0 {
            green("✔")
        } else {
            cyan("⚠")
        },
        stats.processed_pages,
        stats.total_pages,
        stats.total_duration_ms,
        bold(&path.display().to_string()),
    );
    eprintln!(
        "   {} tokens in  /  {} tokens out",
        dim(&stats.total_input_tokens.to_string()),
        dim(&stats.total_output_tokens.to_string()),
    );
}

fn print_extraction_summary(out: &ExtractionOutput, path: &Path) {
    let stats = &out.stats;
    eprintln!(
        "{}  {} rules ({} before merge) from {}/{} windows, {}  →  {}",
        if stats.failed_windows == 0 {
            green("✔")
        } else {
            cyan("⚠")
        },
        stats.consolidated_rules,
        stats.raw_rules,
        stats.successful_windows,
        stats.total_windows,
        out.plan,
        bold(&path.display().to_string()),
    );
    eprintln!(
        "   {} tokens in  /  {} tokens out  —  {}ms total",
        dim(&stats.total_input_tokens.to_string()),
        dim(&stats.total_output_tokens.to_string()),
        stats.total_duration_ms,
    );
}

/// Map CLI args to `ConversionConfig`.
async fn conversion_config(
    model: &ModelArgs,
    args: &TranscribeArgs,
    progress: Option<ProgressCallback>,
) -> Result<ConversionConfig> {
    let mut builder = ConversionConfig::builder()
        .dpi(args.dpi)
        .concurrency(args.workers)
        .max_rendered_pixels(args.max_pixels)
        .max_tokens(args.page_max_tokens)
        .api_timeout_secs(args.page_timeout)
        .max_retries(model.max_retries)
        .retry_backoff_ms(model.retry_backoff_ms)
        .clean_markdown(!args.no_clean);

    if let Some(quality) = args.jpeg_quality {
        builder = builder.image_format(PageImageFormat::Jpeg { quality });
    }
    if let Some(ref path) = args.system_prompt {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read system prompt from {:?}", path))?;
        builder = builder.system_prompt(prompt);
    }
    if let Some(ref pwd) = args.password {
        builder = builder.password(pwd.as_str());
    }
    if let Some(ref m) = model.model {
        builder = builder.model(m.as_str());
    }
    if let Some(ref p) = model.provider {
        builder = builder.provider_name(p.as_str());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid transcription configuration")
}

/// Map CLI args to `ExtractionConfig`.
fn extraction_config(
    model: &ModelArgs,
    args: &ExtractArgs,
    progress: Option<ProgressCallback>,
) -> Result<ExtractionConfig> {
    let mut builder = ExtractionConfig::builder()
        .threshold(args.threshold)
        .window_size(args.window_size)
        .overlap(args.overlap)
        .strategy(args.strategy.into())
        .concurrency(args.window_concurrency)
        .max_tokens(args.window_max_tokens)
        .api_timeout_secs(args.window_timeout)
        .max_retries(model.max_retries)
        .retry_backoff_ms(model.retry_backoff_ms);

    if let Some(ref m) = model.model {
        builder = builder.model(m.as_str());
    }
    if let Some(ref p) = model.provider {
        builder = builder.provider_name(p.as_str());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid extraction configuration")
}
