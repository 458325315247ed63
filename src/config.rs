//! Configuration types for both pipeline stages.
//!
//! Stage 1 (PDF → Markdown) is driven by [`ConversionConfig`], stage 2
//! (Markdown → rules report) by [`ExtractionConfig`]. Each is built once at
//! process start via its builder and then only read, so a config can be
//! shared across concurrent page or window tasks without synchronisation.
//!
//! The API credential never lives here: [`crate::provider`] lets
//! `edgequake-llm` read it from the environment.

use crate::error::Pdf2RulesError;
use crate::progress::ProgressCallback;
use crate::provider::ProviderSpec;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Model used when neither the config nor the environment names one.
pub const DEFAULT_MODEL: &str = "gpt-4o";

// ── Stage 1 ──────────────────────────────────────────────────────────────

/// Configuration for rendering a PDF and transcribing each page.
///
/// # Example
/// ```rust
/// use edgequake_pdf2rules::ConversionConfig;
///
/// let config = ConversionConfig::builder()
///     .dpi(150)
///     .concurrency(8)
///     .model("gpt-4o")
///     .build()
///     .unwrap();
/// assert_eq!(config.concurrency, 8);
/// ```
#[derive(Clone)]
pub struct ConversionConfig {
    /// Rendering DPI used when rasterising each PDF page. Range: 72–400. Default: 150.
    ///
    /// 100 renders faster, 200 reads small print better.
    pub dpi: u32,

    /// Maximum rendered image dimension (width or height) in pixels. Default: 2000.
    ///
    /// Applied after the DPI scale so an oversized page (posters, A0 drawings)
    /// cannot exhaust memory.
    pub max_rendered_pixels: u32,

    /// Number of vision calls in flight at once (worker-pool size). Default: 5.
    pub concurrency: usize,

    /// Vision model identifier. If None, uses [`DEFAULT_MODEL`].
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "ollama").
    /// If None along with `provider`, the provider is auto-detected.
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature. Default: 0.1.
    pub temperature: f32,

    /// Maximum tokens generated per page. Default: 1500.
    pub max_tokens: usize,

    /// Retry attempts after a failed vision call. Default: 0.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled per attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// Per-call timeout in seconds. Default: 120.
    pub api_timeout_secs: u64,

    /// How rendered pages are encoded for upload. Default: PNG.
    pub image_format: PageImageFormat,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Custom transcription prompt. If None, uses the built-in default.
    pub system_prompt: Option<String>,

    /// Run deterministic Markdown cleanup on each transcription. Default: true.
    pub clean_markdown: bool,

    /// Receives page-level progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            dpi: 150,
            max_rendered_pixels: 2000,
            concurrency: 5,
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.1,
            max_tokens: 1500,
            max_retries: 0,
            retry_backoff_ms: 500,
            api_timeout_secs: 120,
            image_format: PageImageFormat::default(),
            password: None,
            system_prompt: None,
            clean_markdown: true,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ConversionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionConfig")
            .field("dpi", &self.dpi)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("concurrency", &self.concurrency)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("image_format", &self.image_format)
            .field("clean_markdown", &self.clean_markdown)
            .finish()
    }
}

impl ConversionConfig {
    /// Create a new builder for `ConversionConfig`.
    pub fn builder() -> ConversionConfigBuilder {
        ConversionConfigBuilder {
            config: Self::default(),
        }
    }

    /// The provider-related fields, for [`crate::provider::resolve_provider`].
    pub fn provider_spec(&self) -> ProviderSpec<'_> {
        ProviderSpec {
            provider: self.provider.as_ref(),
            provider_name: self.provider_name.as_deref(),
            model: self.model.as_deref(),
        }
    }
}

/// Builder for [`ConversionConfig`].
pub struct ConversionConfigBuilder {
    config: ConversionConfig,
}

impl fmt::Debug for ConversionConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionConfigBuilder")
            .field("config", &self.config)
            .finish()
    }
}

impl ConversionConfigBuilder {
    /// Values outside 72–400 are rejected by [`Self::build`].
    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi;
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn image_format(mut self, format: PageImageFormat) -> Self {
        self.config.image_format = format;
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn clean_markdown(mut self, v: bool) -> Self {
        self.config.clean_markdown = v;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConversionConfig, Pdf2RulesError> {
        let c = &self.config;
        if c.dpi < 72 || c.dpi > 400 {
            return Err(Pdf2RulesError::InvalidConfig(format!(
                "DPI must be 72–400, got {}",
                c.dpi
            )));
        }
        if c.concurrency == 0 {
            return Err(Pdf2RulesError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        if c.api_timeout_secs == 0 {
            return Err(Pdf2RulesError::InvalidConfig(
                "API timeout must be ≥ 1 second".into(),
            ));
        }
        if let PageImageFormat::Jpeg { quality } = c.image_format {
            if quality == 0 || quality > 100 {
                return Err(Pdf2RulesError::InvalidConfig(format!(
                    "JPEG quality must be 1–100, got {quality}"
                )));
            }
        }
        Ok(self.config)
    }
}

/// Image encoding used for the vision request body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PageImageFormat {
    /// Lossless; keeps thin glyphs crisp. (default)
    #[default]
    Png,
    /// Smaller uploads for photo-heavy scans.
    Jpeg { quality: u8 },
}

// ── Stage 2 ──────────────────────────────────────────────────────────────

/// How the rule extractor splits a document into windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ExtractionStrategy {
    /// Single pass up to `threshold` pages, sliding window above. (default)
    #[default]
    Auto,
    /// Always send the whole document as one window.
    SinglePass,
    /// Always use overlapping windows, even for short documents.
    SlidingWindow,
}

/// Configuration for extracting rules from an assembled Markdown document.
///
/// # Example
/// ```rust
/// use edgequake_pdf2rules::ExtractionConfig;
///
/// let config = ExtractionConfig::builder()
///     .threshold(10)
///     .window_size(10)
///     .overlap(2)
///     .build()
///     .unwrap();
/// assert_eq!(config.overlap, 2);
///
/// // Windows must advance: overlap has to stay below the window size.
/// assert!(ExtractionConfig::builder().window_size(3).overlap(3).build().is_err());
/// ```
#[derive(Clone)]
pub struct ExtractionConfig {
    /// Documents with at most this many pages use a single pass. Default: 10.
    pub threshold: usize,

    /// Pages per window in sliding-window mode. Default: 10.
    pub window_size: usize,

    /// Pages shared by consecutive windows. Default: 2.
    pub overlap: usize,

    /// Strategy override. Default: [`ExtractionStrategy::Auto`].
    pub strategy: ExtractionStrategy,

    /// Number of window calls in flight at once. Default: 1 (sequential).
    pub concurrency: usize,

    /// Language model identifier. If None, uses [`DEFAULT_MODEL`].
    pub model: Option<String>,

    /// LLM provider name. If None along with `provider`, auto-detected.
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature. Default: 0.2.
    pub temperature: f32,

    /// Maximum tokens generated per window. Default: 4000.
    pub max_tokens: usize,

    /// Retry attempts after a failed call. Default: 0.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled per attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// Per-call timeout in seconds. Default: 180.
    pub api_timeout_secs: u64,

    /// Receives window-level progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            threshold: 10,
            window_size: 10,
            overlap: 2,
            strategy: ExtractionStrategy::default(),
            concurrency: 1,
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.2,
            max_tokens: 4000,
            max_retries: 0,
            retry_backoff_ms: 500,
            api_timeout_secs: 180,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("threshold", &self.threshold)
            .field("window_size", &self.window_size)
            .field("overlap", &self.overlap)
            .field("strategy", &self.strategy)
            .field("concurrency", &self.concurrency)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .finish()
    }
}

impl ExtractionConfig {
    /// Create a new builder for `ExtractionConfig`.
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }

    /// The provider-related fields, for [`crate::provider::resolve_provider`].
    pub fn provider_spec(&self) -> ProviderSpec<'_> {
        ProviderSpec {
            provider: self.provider.as_ref(),
            provider_name: self.provider_name.as_deref(),
            model: self.model.as_deref(),
        }
    }
}

/// Builder for [`ExtractionConfig`].
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl fmt::Debug for ExtractionConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfigBuilder")
            .field("config", &self.config)
            .finish()
    }
}

impl ExtractionConfigBuilder {
    pub fn threshold(mut self, pages: usize) -> Self {
        self.config.threshold = pages;
        self
    }

    pub fn window_size(mut self, pages: usize) -> Self {
        self.config.window_size = pages;
        self
    }

    pub fn overlap(mut self, pages: usize) -> Self {
        self.config.overlap = pages;
        self
    }

    pub fn strategy(mut self, strategy: ExtractionStrategy) -> Self {
        self.config.strategy = strategy;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractionConfig, Pdf2RulesError> {
        let c = &self.config;
        if c.threshold == 0 {
            return Err(Pdf2RulesError::InvalidConfig(
                "Single-pass threshold must be ≥ 1 page".into(),
            ));
        }
        if c.window_size == 0 {
            return Err(Pdf2RulesError::InvalidConfig(
                "Window size must be ≥ 1 page".into(),
            ));
        }
        if c.overlap >= c.window_size {
            return Err(Pdf2RulesError::InvalidConfig(format!(
                "Overlap ({}) must be smaller than the window size ({})",
                c.overlap, c.window_size
            )));
        }
        if c.concurrency == 0 {
            return Err(Pdf2RulesError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        if c.api_timeout_secs == 0 {
            return Err(Pdf2RulesError::InvalidConfig(
                "API timeout must be ≥ 1 second".into(),
            ));
        }
        Ok(self.config)
    }
}
