use async_trait::async_trait;

use super::{ConversationMiddleware, ErrorMetadata, RunAgain};
use crate::error::ErrorClass;
use crate::retry::{RetryConfig, with_retry};
use crate::types::GenerateResult;
use crate::{MuninnError, Result};

/// Conversation-level retry of rate-limited calls.
///
/// Sees failures that surface above the model layer. Rate limits are
/// retried through [`RunAgain`] with the same backoff as the model-level
/// retry; anything else is returned unchanged.
#[derive(Debug, Clone)]
pub struct ErrorHandler {
    config: RetryConfig,
}

impl ErrorHandler {
    /// `config.max_attempts` counts the failed call as the first attempt.
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    fn classify(&self, err: &MuninnError) -> ErrorClass {
        if self.config.retry_on_rate_limit && err.is_rate_limit() {
            ErrorClass::Retryable
        } else {
            ErrorClass::Fatal
        }
    }
}

#[async_trait]
impl ConversationMiddleware for ErrorHandler {
    fn name(&self) -> &str {
        "error-handler"
    }

    async fn on_error(
        &self,
        error: MuninnError,
        run_again: &RunAgain<'_>,
        _metadata: &ErrorMetadata,
    ) -> Result<GenerateResult> {
        if self.classify(&error) == ErrorClass::Fatal {
            return Err(error);
        }

        // The failed call is attempt 0, so the first backoff is base_delay.
        let mut failed = Some(error);
        with_retry(
            &self.config,
            "conversation",
            |e| self.classify(e),
            |_| {
                let failed = failed.take();
                async move {
                    match failed {
                        Some(error) => Err(error),
                        None => run_again.call().await,
                    }
                }
            },
        )
        .await
    }
}
