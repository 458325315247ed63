//! Vision transcription: turn each rendered page into Markdown.
//!
//! The model call sits behind [`PageTranscriber`] so the worker pool in
//! [`transcribe_pages`] can run against a deterministic stub in tests.
//! [`LlmTranscriber`] is the production implementation; all prompt text
//! lives in [`crate::prompts`].
//!
//! ## Worker pool
//!
//! `buffer_unordered(concurrency)` keeps at most `concurrency` calls in
//! flight. Each call owns its own result slot, completion order is
//! arbitrary, and results are sorted by page number once all have landed.

use crate::config::{ConversionConfig, PageImageFormat};
use crate::error::PageError;
use crate::output::{PageResult, Transcription};
use crate::pipeline::{encode, postprocess};
use crate::pipeline::render::PageImage;
use crate::prompts::{TRANSCRIBE_SYSTEM_PROMPT, TRANSCRIBE_USER_PROMPT};
use crate::provider::{chat_with_retry, CallFailure, CallPolicy};
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider};
use futures::stream::{self, StreamExt};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Turns one page image into Markdown text.
pub trait PageTranscriber: Send + Sync {
    fn transcribe(
        &self,
        page: &PageImage,
    ) -> impl Future<Output = Result<Transcription, PageError>> + Send;
}

/// [`PageTranscriber`] backed by a hosted vision model.
///
/// ## Message Layout
///
/// 1. **System message**: the transcription prompt (or the config override)
/// 2. **User message**: `"Extract content:"` with the page image attached
pub struct LlmTranscriber {
    provider: Arc<dyn LLMProvider>,
    system_prompt: String,
    temperature: f32,
    max_tokens: usize,
    image_format: PageImageFormat,
    policy: CallPolicy,
}

impl LlmTranscriber {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &ConversionConfig) -> Self {
        Self {
            provider,
            system_prompt: config
                .system_prompt
                .clone()
                .unwrap_or_else(|| TRANSCRIBE_SYSTEM_PROMPT.to_string()),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            image_format: config.image_format,
            policy: CallPolicy {
                max_retries: config.max_retries,
                retry_backoff_ms: config.retry_backoff_ms,
                timeout: Duration::from_secs(config.api_timeout_secs),
            },
        }
    }

    fn options(&self) -> CompletionOptions {
        CompletionOptions {
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_tokens),
            ..Default::default()
        }
    }
}

impl PageTranscriber for LlmTranscriber {
    async fn transcribe(&self, page: &PageImage) -> Result<Transcription, PageError> {
        let page_num = page.page_num;
        let image = encode::encode_page(&page.image, self.image_format).map_err(|e| {
            PageError::EncodeFailed {
                page: page_num,
                detail: e.to_string(),
            }
        })?;

        let messages = vec![
            ChatMessage::system(self.system_prompt.as_str()),
            ChatMessage::user_with_images(TRANSCRIBE_USER_PROMPT, vec![image]),
        ];

        let label = format!("Page {}", page_num);
        let reply = chat_with_retry(
            self.provider.as_ref(),
            &messages,
            &self.options(),
            self.policy,
            &label,
        )
        .await
        .map_err(|failure| match failure {
            CallFailure::TimedOut { secs } => PageError::Timeout {
                page: page_num,
                secs,
            },
            CallFailure::Failed { retries, detail } => PageError::ExtractionFailed {
                page: page_num,
                retries,
                detail,
            },
        })?;

        Ok(Transcription {
            markdown: reply.content,
            usage: reply.usage,
            retries: reply.retries,
        })
    }
}

/// Transcribe every rendered page with at most `config.concurrency` calls
/// in flight.
///
/// `pages` holds one slot per page; slots that failed to render become
/// failed results without a call. The returned vector is sorted by page
/// number and has exactly one entry per slot.
pub async fn transcribe_pages<T: PageTranscriber>(
    transcriber: &T,
    pages: Vec<Result<PageImage, PageError>>,
    config: &ConversionConfig,
) -> Vec<PageResult> {
    let total_pages = pages.len();
    let cb = config.progress_callback.as_ref();

    let mut results: Vec<PageResult> = stream::iter(pages.into_iter().map(move |slot| async move {
        let start = Instant::now();
        let outcome = match slot {
            Err(e) => Err(e),
            Ok(page) => {
                if let Some(cb) = cb {
                    cb.on_page_start(page.page_num, total_pages);
                }
                let page_num = page.page_num;
                transcriber.transcribe(&page).await.map(|t| (page_num, t))
            }
        };
        let duration_ms = start.elapsed().as_millis() as u64;

        let result = match outcome {
            Ok((page_num, mut t)) => {
                if config.clean_markdown {
                    t.markdown = postprocess::clean_markdown(&t.markdown);
                }
                PageResult::success(page_num, t, duration_ms)
            }
            Err(e) => PageResult::failed(e, duration_ms),
        };

        if let Some(cb) = cb {
            match &result.error {
                None => cb.on_page_complete(result.page_num, total_pages, result.markdown.len()),
                Some(e) => cb.on_page_error(result.page_num, total_pages, e.to_string()),
            }
        }
        debug!("Page {} finished in {}ms", result.page_num, duration_ms);
        result
    }))
    .buffer_unordered(config.concurrency.max(1))
    .collect()
    .await;

    results.sort_by_key(|r| r.page_num);
    results
}
