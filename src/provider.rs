//! Resolution of the hosted model provider.
//!
//! Both stages talk to an `edgequake-llm` provider. Which one is resolved
//! from most-specific to least-specific:
//!
//! 1. **Pre-built provider** on the config: used as-is (tests, custom
//!    middleware).
//! 2. **Named provider + model** (`provider_name`): built by
//!    [`ProviderFactory::create_llm_provider`], which reads the matching API
//!    key (`OPENAI_API_KEY`, `ANTHROPIC_API_KEY`, …) from the environment.
//! 3. **Environment pair** `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`.
//! 4. **OpenAI** when `OPENAI_API_KEY` is set.
//! 5. **Full auto-detection** via [`ProviderFactory::from_env`].
//!
//! [`chat_with_retry`] wraps every model call made by either stage with the
//! same retry/timeout policy.
//!
//! ## Retry Strategy
//!
//! HTTP 429 / 503 errors from LLM APIs are transient and frequent under
//! concurrent load. Retries are off by default (`max_retries = 0`); when
//! enabled, exponential backoff (`retry_backoff_ms * 2^(attempt-1)`) spaces
//! them out: with 500 ms base and 3 retries the waits are 500 ms → 1 s → 2 s.
//! A timeout ends the call immediately and is not retried.

use crate::config::DEFAULT_MODEL;
use crate::error::Pdf2RulesError;
use crate::output::TokenUsage;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

/// The provider-related subset of a stage config.
#[derive(Clone, Copy)]
pub struct ProviderSpec<'a> {
    pub provider: Option<&'a Arc<dyn LLMProvider>>,
    pub provider_name: Option<&'a str>,
    pub model: Option<&'a str>,
}

/// Resolve the provider described by `spec`.
pub fn resolve_provider(spec: ProviderSpec<'_>) -> Result<Arc<dyn LLMProvider>, Pdf2RulesError> {
    if let Some(provider) = spec.provider {
        return Ok(Arc::clone(provider));
    }

    let model = spec.model.unwrap_or(DEFAULT_MODEL);

    if let Some(name) = spec.provider_name {
        return create_provider(name, model);
    }

    if let (Ok(prov), Ok(env_model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !env_model.is_empty() {
            return create_provider(&prov, spec.model.unwrap_or(&env_model));
        }
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            return create_provider("openai", model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| Pdf2RulesError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}

fn create_provider(
    provider_name: &str,
    model: &str,
) -> Result<Arc<dyn LLMProvider>, Pdf2RulesError> {
    debug!("Creating provider '{}' with model '{}'", provider_name, model);
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        Pdf2RulesError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

// ── Calling ──────────────────────────────────────────────────────────────

/// Retry and timeout settings for one model call.
#[derive(Debug, Clone, Copy)]
pub struct CallPolicy {
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    pub timeout: Duration,
}

/// A successful model answer.
#[derive(Debug, Clone)]
pub struct ChatReply {
    pub content: String,
    pub usage: TokenUsage,
    /// Retries spent before this answer arrived.
    pub retries: u32,
}

/// Why a model call produced no answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallFailure {
    /// The provider kept failing (or answered with nothing) until retries ran out.
    Failed { retries: u32, detail: String },
    TimedOut { secs: u64 },
}

/// Send `messages`, retrying failures and empty answers per `policy`.
///
/// `label` names the unit of work ("Page 3", "window 2 (pages 9-18)") in logs.
pub async fn chat_with_retry(
    provider: &dyn LLMProvider,
    messages: &[ChatMessage],
    options: &CompletionOptions,
    policy: CallPolicy,
    label: &str,
) -> Result<ChatReply, CallFailure> {
    let mut last_err: Option<String> = None;

    for attempt in 0..=policy.max_retries {
        if attempt > 0 {
            let backoff = policy.retry_backoff_ms * 2u64.pow(attempt - 1);
            warn!(
                "{}: retry {}/{} after {}ms",
                label, attempt, policy.max_retries, backoff
            );
            sleep(Duration::from_millis(backoff)).await;
        }

        match timeout(policy.timeout, provider.chat(messages, Some(options))).await {
            Err(_) => {
                warn!("{}: timed out after {:?}", label, policy.timeout);
                return Err(CallFailure::TimedOut {
                    secs: policy.timeout.as_secs(),
                });
            }
            Ok(Ok(response)) if response.content.trim().is_empty() => {
                warn!("{}: attempt {} returned an empty answer", label, attempt + 1);
                last_err = Some("empty response".to_string());
            }
            Ok(Ok(response)) => {
                debug!(
                    "{}: {} input tokens, {} output tokens",
                    label, response.prompt_tokens, response.completion_tokens
                );
                return Ok(ChatReply {
                    content: response.content,
                    usage: TokenUsage {
                        input_tokens: response.prompt_tokens,
                        output_tokens: response.completion_tokens,
                    },
                    retries: attempt,
                });
            }
            Ok(Err(e)) => {
                let err_msg = format!("{}", e);
                warn!("{}: attempt {} failed: {}", label, attempt + 1, err_msg);
                last_err = Some(err_msg);
            }
        }
    }

    Err(CallFailure::Failed {
        retries: policy.max_retries,
        detail: last_err.unwrap_or_else(|| "Unknown error".to_string()),
    })
}
