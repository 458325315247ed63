//! Rule extraction: one model call per window.
//!
//! [`RuleModel`] is the seam between the windowing/consolidation logic and
//! the hosted model, so both can be tested against a deterministic stub.
//! [`LlmRuleModel`] sends the window with the prompts from
//! [`crate::prompts`] and parses the answer with
//! [`crate::rules::parse::parse_extraction`].
//!
//! A call that fails, times out, or returns text that does not parse is
//! recorded against its window; the other windows carry on.

use crate::config::ExtractionConfig;
use crate::document::AssembledDocument;
use crate::error::WindowError;
use crate::output::{WindowExtraction, WindowOutcome};
use crate::prompts;
use crate::provider::{chat_with_retry, CallFailure, CallPolicy};
use crate::rules::parse::parse_extraction;
use crate::rules::window::{render_window, PlannedStrategy, Window, WindowPlan};
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider};
use futures::stream::{self, StreamExt};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Everything a model needs to analyse one window.
#[derive(Debug, Clone, Copy)]
pub struct WindowRequest<'a> {
    pub window: &'a Window,
    pub strategy: PlannedStrategy,
    pub total_pages: usize,
    /// The window's pages, each under a `## Page k` heading.
    pub text: &'a str,
}

/// Extracts a structured rule listing from one window of text.
pub trait RuleModel: Send + Sync {
    fn extract_rules(
        &self,
        request: &WindowRequest<'_>,
    ) -> impl Future<Output = Result<WindowExtraction, WindowError>> + Send;
}

/// [`RuleModel`] backed by a hosted language model.
pub struct LlmRuleModel {
    provider: Arc<dyn LLMProvider>,
    temperature: f32,
    max_tokens: usize,
    policy: CallPolicy,
}

impl LlmRuleModel {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &ExtractionConfig) -> Self {
        Self {
            provider,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            policy: CallPolicy {
                max_retries: config.max_retries,
                retry_backoff_ms: config.retry_backoff_ms,
                timeout: Duration::from_secs(config.api_timeout_secs),
            },
        }
    }

    fn messages(request: &WindowRequest<'_>) -> Vec<ChatMessage> {
        let w = request.window;
        match request.strategy {
            PlannedStrategy::SinglePass => vec![
                ChatMessage::system(prompts::single_pass_system_prompt()),
                ChatMessage::user(prompts::single_pass_user_message(
                    request.total_pages,
                    request.text,
                )),
            ],
            PlannedStrategy::SlidingWindow => vec![
                ChatMessage::system(prompts::window_system_prompt()),
                ChatMessage::user(prompts::window_user_message(
                    w.start,
                    w.end,
                    w.new_start(),
                    request.total_pages,
                    request.text,
                )),
            ],
        }
    }
}

impl RuleModel for LlmRuleModel {
    async fn extract_rules(
        &self,
        request: &WindowRequest<'_>,
    ) -> Result<WindowExtraction, WindowError> {
        let w = request.window;
        let options = CompletionOptions {
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_tokens),
            ..Default::default()
        };

        let reply = chat_with_retry(
            self.provider.as_ref(),
            &Self::messages(request),
            &options,
            self.policy,
            &w.to_string(),
        )
        .await
        .map_err(|failure| match failure {
            CallFailure::TimedOut { secs } => WindowError::Timeout { secs },
            CallFailure::Failed { retries, detail } => {
                WindowError::ExtractionFailed { retries, detail }
            }
        })?;

        let result = parse_extraction(&reply.content, w.start, w.end)?;
        Ok(WindowExtraction {
            result,
            usage: reply.usage,
            retries: reply.retries,
        })
    }
}

/// Run every window of `plan` through `model`, at most
/// `config.concurrency` at a time.
///
/// Returns one outcome per window, in window order.
pub async fn extract_windows<M: RuleModel>(
    model: &M,
    document: &AssembledDocument,
    plan: &WindowPlan,
    config: &ExtractionConfig,
) -> Vec<WindowOutcome> {
    let total_windows = plan.windows.len();
    let total_pages = plan.total_pages;
    let strategy = plan.strategy;
    let cb = config.progress_callback.as_ref();

    let mut outcomes: Vec<WindowOutcome> =
        stream::iter(plan.windows.iter().map(move |window| async move {
            if let Some(cb) = cb {
                cb.on_window_start(window.number(), total_windows, window.start, window.end);
            }
            let text = render_window(document, window);
            debug!("{}: {} chars", window, text.len());

            let request = WindowRequest {
                window,
                strategy,
                total_pages,
                text: &text,
            };
            let start = Instant::now();
            let result = model.extract_rules(&request).await;
            let duration_ms = start.elapsed().as_millis() as u64;

            let outcome = match result {
                Ok(extraction) => WindowOutcome::success(*window, extraction, duration_ms),
                Err(e) => {
                    warn!("{} failed: {}", window, e);
                    WindowOutcome::failed(*window, e, duration_ms)
                }
            };

            if let Some(cb) = cb {
                match &outcome.error {
                    None => cb.on_window_complete(
                        window.number(),
                        total_windows,
                        outcome.result.rules.len(),
                    ),
                    Some(e) => cb.on_window_error(window.number(), total_windows, e.to_string()),
                }
            }
            outcome
        }))
        .buffer_unordered(config.concurrency.max(1))
        .collect()
        .await;

    outcomes.sort_by_key(|o| o.window.index);
    outcomes
}
