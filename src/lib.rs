//! # edgequake-pdf2rules
//!
//! Transcribe PDF documents to Markdown with a vision model, then extract
//! the rules, guidelines and constraints they contain, each annotated with
//! the page it came from.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │  stage 1: convert
//!  ├─ 1. Input       validate path and %PDF magic
//!  ├─ 2. Render      rasterise pages via pdfium (spawn_blocking)
//!  ├─ 3. Transcribe  concurrent vision calls, one per page
//!  └─ 4. Assemble    "## Page k" sections, failed pages as placeholders
//!        │
//!   Markdown artifact
//!        │  stage 2: analyze
//!  ├─ 5. Window      single pass, or overlapping page windows
//!  ├─ 6. Extract     one model call per window, strict output parser
//!  └─ 7. Consolidate merge duplicates from overlapping pages
//!        │
//!   rules report
//! ```
//!
//! The two stages share nothing but the Markdown artifact, so either can
//! be run on its own.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_pdf2rules::{convert_to_file, extract_rules_to_file};
//! use edgequake_pdf2rules::{ConversionConfig, ExtractionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / …
//!     let config = ConversionConfig::default();
//!     let pages = convert_to_file("manual.pdf", "manual.md", &config).await?;
//!     eprintln!("{} pages transcribed", pages.stats.processed_pages);
//!
//!     let config = ExtractionConfig::default();
//!     let rules = extract_rules_to_file("manual.md", "manual_rules.txt", &config).await?;
//!     println!("{}", rules.report_text);
//!     Ok(())
//! }
//! ```
//!
//! ## pdfium
//!
//! Stage 1 renders pages with a pdfium shared library that is loaded at
//! runtime and not shipped with this crate. Download a build for your
//! platform (for example from `bblanchon/pdfium-binaries`) and either:
//!
//! - set `PDFIUM_LIB_PATH=/path/to/libpdfium.so` (`.dylib` / `.dll`),
//! - place the library in the working directory, or
//! - install it on the system library path.
//!
//! Stage 2 never touches pdfium.
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdf2rules` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! ```toml
//! edgequake-pdf2rules = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod analyze;
pub mod config;
pub mod convert;
pub mod document;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod provider;
pub mod rules;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use analyze::{
    analyze_document, extract_rules, extract_rules_to_file, extract_rules_to_file_with,
    extract_rules_with,
};
pub use config::{
    ConversionConfig, ConversionConfigBuilder, ExtractionConfig, ExtractionConfigBuilder,
    ExtractionStrategy, PageImageFormat,
};
pub use convert::{
    convert, convert_rendered, convert_sync, convert_to_file, convert_to_file_with, convert_with,
};
pub use document::{AssembledDocument, DocumentHeader, DocumentPage, PageStatus};
pub use error::{PageError, ParseError, Pdf2RulesError, WindowError};
pub use output::{
    ConversionOutput, ConversionStats, ExtractionOutput, ExtractionStats, PageResult,
    TokenUsage, Transcription, WindowExtraction, WindowOutcome,
};
pub use pipeline::llm::{LlmTranscriber, PageTranscriber};
pub use pipeline::render::{PageImage, RenderedDocument};
pub use progress::{NoopProgress, PipelineProgress, ProgressCallback};
pub use rules::extract::{LlmRuleModel, RuleModel, WindowRequest};
pub use rules::types::{ConsolidatedReport, PageRef, RuleCategory, RuleExtractionResult, RuleRecord};
pub use rules::window::{PlannedStrategy, Window, WindowPlan};
