use std::sync::Arc;

use async_trait::async_trait;
use futures_util::{StreamExt, stream};
use tracing::warn;

use super::LanguageModelMiddleware;
use crate::error::ErrorClass;
use crate::phase::CallPhase;
use crate::retry::{RetryConfig, with_retry};
use crate::telemetry;
use crate::traits::{LanguageModel, StreamResult};
use crate::types::{CallParameters, EventStream, GenerateResult, StreamError, StreamEvent};
use crate::{MuninnError, Result};

/// Retries transient failures by re-entering the inner chain.
///
/// `generate` is retried as a whole. For `stream`, establishment is
/// retried, and so is a retryable `Error` event that arrives before any
/// event has been passed on. Once the caller has seen output, a mid-stream
/// error is delivered as-is so nothing visible is ever repeated.
pub struct RetryMiddleware {
    config: RetryConfig,
}

impl RetryMiddleware {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }
}

#[async_trait]
impl LanguageModelMiddleware for RetryMiddleware {
    fn name(&self) -> &str {
        "retry"
    }

    async fn wrap_generate(
        &self,
        params: &CallParameters,
        next: &Arc<dyn LanguageModel>,
    ) -> Result<GenerateResult> {
        with_retry(
            &self.config,
            "generate",
            |e| self.config.classify(e),
            |_| next.do_generate(params),
        )
        .await
    }

    async fn wrap_stream(
        &self,
        params: &CallParameters,
        next: &Arc<dyn LanguageModel>,
    ) -> Result<StreamResult> {
        let mut attempts = 0u32;
        let result = with_retry(
            &self.config,
            "stream",
            |e| self.config.classify(e),
            |ctx| {
                attempts = ctx.attempt + 1;
                next.do_stream(params)
            },
        )
        .await?;

        let state = ResumeState {
            current: result.stream,
            next: next.clone(),
            params: params.clone(),
            config: self.config.clone(),
            attempts,
            emitted: false,
        };
        Ok(StreamResult {
            stream: Box::pin(stream::unfold(Some(state), |state| async move {
                let mut state = state?;
                let event = state.next_event().await?;
                state.emitted = true;
                let more = (!event.is_terminal()).then_some(state);
                Some((event, more))
            })),
            raw_call: result.raw_call,
        })
    }
}

/// Stream state for restarting before first output.
struct ResumeState {
    current: EventStream,
    next: Arc<dyn LanguageModel>,
    params: CallParameters,
    config: RetryConfig,
    /// Attempts made so far, counting establishment retries.
    attempts: u32,
    emitted: bool,
}

impl ResumeState {
    fn can_retry(&self, err: &MuninnError) -> bool {
        !self.emitted
            && self.attempts < self.config.max_attempts
            && self.config.classify(err) == ErrorClass::Retryable
    }

    /// Next event for the caller, restarting the inner chain on an early
    /// retryable failure.
    async fn next_event(&mut self) -> Option<StreamEvent> {
        loop {
            let failure = match self.current.next().await? {
                StreamEvent::Error(err) => err,
                event => return Some(event),
            };

            let err = MuninnError::from(failure.clone());
            if !self.can_retry(&err) {
                return Some(StreamEvent::Error(failure));
            }

            // Establishing a new stream may itself fail transiently.
            let mut err = err;
            loop {
                let delay = self.config.effective_delay(self.attempts - 1, err.retry_after());
                metrics::counter!(telemetry::RETRIES_TOTAL, "operation" => "stream").increment(1);
                warn!(
                    operation = "stream",
                    phase = %CallPhase::Retrying,
                    attempt = self.attempts,
                    max_attempts = self.config.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "restarting stream after transient error"
                );
                tokio::time::sleep(delay).await;
                self.attempts += 1;

                match self.next.do_stream(&self.params).await {
                    Ok(result) => {
                        self.current = result.stream;
                        break;
                    }
                    Err(e) if self.can_retry(&e) => err = e,
                    Err(e) => return Some(StreamEvent::Error(StreamError::from(&e))),
                }
            }
        }
    }
}
