//! Retrying classifier: prompt, call, back off on throttling, parse.
//!
//! `classify` never fails. Every path ends in a `Verdict`:
//! 1. success → parsed model verdict
//! 2. rate limited → back off `min(base * 2^attempt, cap) + jitter` and resend
//!    the same request, up to `max_retries` times
//! 3. any other error → `Verdict::classification_failed()` immediately
//! 4. retries exhausted → `Verdict::rate_limited()`

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, error, warn};

use crate::config::ClassifierConfig;
use crate::llm::provider::{ChatMessage, CompletionRequest, LlmProvider};
use crate::error::LlmError;
use crate::llm::retry::{backoff_after_rate_limit, pacing_delay};
use crate::pipeline::parser::parse_verdict;
use crate::pipeline::prompt::{SYSTEM_PROMPT, build_classification_prompt};
use crate::pipeline::types::{Message, Verdict};

/// Token usage accumulated across calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub calls: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenUsage {
    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

/// Classifies messages one at a time against a single model.
pub struct Classifier {
    llm: Arc<dyn LlmProvider>,
    config: ClassifierConfig,
    calls: AtomicU64,
    input_tokens: AtomicU64,
    output_tokens: AtomicU64,
}

impl Classifier {
    pub fn new(llm: Arc<dyn LlmProvider>, config: ClassifierConfig) -> Self {
        Self {
            llm,
            config,
            calls: AtomicU64::new(0),
            input_tokens: AtomicU64::new(0),
            output_tokens: AtomicU64::new(0),
        }
    }

    pub fn model_name(&self) -> &str {
        self.llm.model_name()
    }

    /// Usage so far (successful calls only; failed calls report no tokens).
    pub fn usage(&self) -> TokenUsage {
        TokenUsage {
            calls: self.calls.load(Ordering::Relaxed),
            input_tokens: self.input_tokens.load(Ordering::Relaxed),
            output_tokens: self.output_tokens.load(Ordering::Relaxed),
        }
    }

    /// Classify one message. Suspends for the pacing delay first and for
    /// every backoff; never returns an error.
    pub async fn classify(&self, message: &Message) -> Verdict {
        let retry = &self.config.retry;

        let pacing = pacing_delay(retry);
        if !pacing.is_zero() {
            tokio::time::sleep(pacing).await;
        }

        let request = self.build_request(message);

        for attempt in 0..=retry.max_retries {
            match self.llm.complete(request.clone()).await {
                Ok(response) => {
                    self.calls.fetch_add(1, Ordering::Relaxed);
                    self.input_tokens
                        .fetch_add(u64::from(response.input_tokens), Ordering::Relaxed);
                    self.output_tokens
                        .fetch_add(u64::from(response.output_tokens), Ordering::Relaxed);

                    let verdict = parse_verdict(&response.content);
                    debug!(
                        id = %message.id,
                        category = verdict.category.as_str(),
                        confidence = verdict.confidence,
                        attempt = attempt + 1,
                        "Parsed classification"
                    );
                    return verdict;
                }
                Err(LlmError::RateLimited { retry_after, .. }) => {
                    if attempt == retry.max_retries {
                        break;
                    }
                    let delay = backoff_after_rate_limit(retry, attempt, retry_after);
                    warn!(
                        id = %message.id,
                        attempt = attempt + 1,
                        max_attempts = retry.max_retries + 1,
                        delay_secs = delay.as_secs_f64(),
                        retry_after_secs = retry_after.map(|d| d.as_secs_f64()),
                        "Rate limited, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    error!(id = %message.id, error = %e, "Classification error");
                    return Verdict::classification_failed();
                }
            }
        }

        warn!(
            id = %message.id,
            attempts = retry.max_retries + 1,
            "Max retries exceeded under rate limiting, continuing"
        );
        Verdict::rate_limited()
    }

    fn build_request(&self, message: &Message) -> CompletionRequest {
        CompletionRequest::new(vec![
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user(build_classification_prompt(
                message,
                self.config.body_char_limit,
            )),
        ])
        .with_temperature(self.config.temperature)
        .with_max_tokens(self.config.max_tokens)
    }
}
