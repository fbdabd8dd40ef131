//! Model interaction: the backend seam and the retry/backoff wrapper.
//!
//! [`CompletionBackend`] is the only thing the auditor knows about the
//! hosted model. Production code uses [`EdgequakeBackend`], which forwards
//! to any `edgequake_llm` provider; tests plug in a scripted backend.
//!
//! ## Retry Strategy
//!
//! Hosted models answer bursts of traffic with 429s and, for some vendors,
//! spurious 400s. Every failed attempt except an authentication failure is
//! retried after `retry_backoff_ms * 2^(attempt-1)`: with the defaults the
//! waits are 1 s → 2 s → 4 s. Each attempt is bounded by `api_timeout_secs`.

use crate::config::AuditConfig;
use crate::error::{AuditError, BackendError};
use crate::progress::AuditPhase;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, warn};

/// One prompt, optionally with figures attached.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system: Option<String>,
    pub prompt: String,
    pub images: Vec<ImageData>,
    pub temperature: f32,
    pub max_tokens: usize,
}

impl CompletionRequest {
    /// A text-only request using the sampling settings from `config`.
    pub fn new(system: Option<&str>, prompt: impl Into<String>, config: &AuditConfig) -> Self {
        Self {
            system: system.map(str::to_string),
            prompt: prompt.into(),
            images: Vec::new(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }

    pub fn with_images(mut self, images: Vec<ImageData>) -> Self {
        self.images = images;
        self
    }
}

/// The model's reply.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Completion {
    pub text: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Anything that can answer a [`CompletionRequest`].
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Short label for logs, e.g. `gemini/gemini-2.0-flash`.
    fn name(&self) -> &str;

    async fn generate(&self, request: &CompletionRequest) -> Result<Completion, BackendError>;
}

/// [`CompletionBackend`] over an `edgequake_llm` provider.
pub struct EdgequakeBackend {
    provider: Arc<dyn LLMProvider>,
    label: String,
}

impl EdgequakeBackend {
    pub fn new(provider: Arc<dyn LLMProvider>, label: impl Into<String>) -> Self {
        Self {
            provider,
            label: label.into(),
        }
    }
}

#[async_trait]
impl CompletionBackend for EdgequakeBackend {
    fn name(&self) -> &str {
        &self.label
    }

    async fn generate(&self, request: &CompletionRequest) -> Result<Completion, BackendError> {
        let mut messages = Vec::with_capacity(2);
        if let Some(ref system) = request.system {
            messages.push(ChatMessage::system(system.as_str()));
        }
        if request.images.is_empty() {
            messages.push(ChatMessage::user(request.prompt.as_str()));
        } else {
            messages.push(ChatMessage::user_with_images(
                request.prompt.as_str(),
                request.images.clone(),
            ));
        }

        let options = CompletionOptions {
            temperature: Some(request.temperature),
            max_tokens: Some(request.max_tokens),
            ..Default::default()
        };

        let response = self
            .provider
            .chat(&messages, Some(&options))
            .await
            .map_err(|e| BackendError::classify(format!("{}", e)))?;

        Ok(Completion {
            text: response.content,
            input_tokens: response.prompt_tokens as u64,
            output_tokens: response.completion_tokens as u64,
        })
    }
}

/// A successful call and the number of attempts it took.
#[derive(Debug, Clone)]
pub struct CallOutcome {
    pub completion: Completion,
    pub attempts: u32,
}

/// Call the backend, retrying transient failures with exponential backoff.
///
/// # Errors
/// * [`AuditError::LlmApiError`] — non-retryable failure, or retries exhausted.
/// * [`AuditError::ApiTimeout`] — the final attempt timed out.
pub async fn call_with_retry(
    backend: &dyn CompletionBackend,
    phase: AuditPhase,
    request: &CompletionRequest,
    config: &AuditConfig,
) -> Result<CallOutcome, AuditError> {
    let start = Instant::now();
    let per_call = Duration::from_secs(config.api_timeout_secs);
    let mut last_err: Option<BackendError> = None;

    for attempt in 0..=config.max_retries {
        if attempt > 0 {
            let backoff = config.retry_backoff_ms.saturating_mul(2u64.saturating_pow(attempt - 1));
            let reason = last_err.as_ref().map(|e| e.to_string()).unwrap_or_default();
            warn!(
                "{}: retry {}/{} after {}ms ({})",
                phase, attempt, config.max_retries, backoff, reason
            );
            if let Some(ref cb) = config.progress_callback {
                cb.on_retry(phase, attempt, &reason);
            }
            sleep(Duration::from_millis(backoff)).await;
        }

        let result = match timeout(per_call, backend.generate(request)).await {
            Ok(r) => r,
            Err(_) => Err(BackendError::Timeout(config.api_timeout_secs)),
        };

        match result {
            Ok(completion) => {
                debug!(
                    "{}: {} input tokens, {} output tokens, {:?}",
                    phase,
                    completion.input_tokens,
                    completion.output_tokens,
                    start.elapsed()
                );
                return Ok(CallOutcome {
                    completion,
                    attempts: attempt + 1,
                });
            }
            Err(e) if !e.is_retryable() => {
                warn!("{}: attempt {} failed permanently: {}", phase, attempt + 1, e);
                return Err(AuditError::LlmApiError {
                    phase,
                    attempts: attempt + 1,
                    message: e.to_string(),
                });
            }
            Err(e) => {
                warn!("{}: attempt {} failed: {}", phase, attempt + 1, e);
                last_err = Some(e);
            }
        }
    }

    let attempts = config.max_retries + 1;
    Err(match last_err {
        Some(BackendError::Timeout(secs)) => AuditError::ApiTimeout { phase, secs },
        Some(e) => AuditError::LlmApiError {
            phase,
            attempts,
            message: e.to_string(),
        },
        None => AuditError::LlmApiError {
            phase,
            attempts,
            message: "Unknown error".to_string(),
        },
    })
}
