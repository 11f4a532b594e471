//! Retry configuration, delay calculation, and the shared retry loop.
//!
//! [`with_retry`] is the single place retry logic lives. The language-model
//! [`RetryMiddleware`](crate::middleware::RetryMiddleware) and the
//! conversation-level [`ErrorHandler`](crate::conversation::ErrorHandler)
//! both delegate to it.

use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::ErrorClass;
use crate::phase::CallPhase;
use crate::telemetry;
use crate::{MuninnError, Result};

/// Configuration for retry behaviour on transient errors.
///
/// Uses exponential backoff: the wait after failed attempt `n` (0-indexed)
/// is `base_delay * 2^n`, capped at `max_delay`.
///
/// ```rust
/// # use muninn::RetryConfig;
/// # use std::time::Duration;
/// let config = RetryConfig::new()
///     .max_attempts(5)
///     .base_delay(Duration::from_millis(200));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of attempts (including the initial request).
    /// 1 = no retry. Default: 3.
    pub max_attempts: u32,
    /// Delay before the first retry. Default: 500ms.
    pub base_delay: Duration,
    /// Maximum delay between retries (caps exponential growth). Default: 30s.
    pub max_delay: Duration,
    /// Whether rate-limit errors are retried. Default: true.
    pub retry_on_rate_limit: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            retry_on_rate_limit: true,
        }
    }
}

impl RetryConfig {
    /// Create a new config with sensible defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a config that disables retries (single attempt).
    pub fn disabled() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Set maximum attempts (including the initial request).
    pub fn max_attempts(mut self, n: u32) -> Self {
        self.max_attempts = n;
        self
    }

    /// Set the delay before the first retry.
    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Set the maximum delay between retries.
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Retry (or stop retrying) on rate-limit errors.
    pub fn retry_on_rate_limit(mut self, enabled: bool) -> Self {
        self.retry_on_rate_limit = enabled;
        self
    }

    /// Calculate the delay for a given attempt number (0-indexed).
    ///
    /// Uses exponential backoff: `base_delay * 2^attempt`, capped at `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt));
        delay.min(self.max_delay)
    }

    /// Calculate the effective delay, respecting provider `retry_after` hints.
    ///
    /// If a `retry_after` duration is provided (from a `RateLimited` error),
    /// it takes precedence over the calculated backoff.
    pub fn effective_delay(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        retry_after.unwrap_or_else(|| self.delay_for_attempt(attempt))
    }

    /// Classify an error under this config.
    ///
    /// Transient errors are retryable, except rate limits when
    /// `retry_on_rate_limit` is off.
    pub fn classify(&self, err: &MuninnError) -> ErrorClass {
        if err.is_rate_limit() && !self.retry_on_rate_limit {
            return ErrorClass::Fatal;
        }
        err.class()
    }
}

/// Per-call retry state, passed by value into every attempt.
///
/// A fresh context is created for each top-level call; nothing outside
/// the call observes or mutates it.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryContext {
    /// Current attempt, 0-indexed.
    pub attempt: u32,
    pub max_attempts: u32,
    pub base_delay: Duration,
    /// Free-form annotations (e.g. `last_error`) visible to each attempt.
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl RetryContext {
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            attempt: 0,
            max_attempts: config.max_attempts.max(1),
            base_delay: config.base_delay,
            metadata: BTreeMap::new(),
        }
    }

    pub fn is_first_attempt(&self) -> bool {
        self.attempt == 0
    }

    /// Attempts left after the current one.
    pub fn remaining(&self) -> u32 {
        self.max_attempts.saturating_sub(self.attempt + 1)
    }

    /// Context for the next attempt after `err`.
    fn advance(mut self, err: &MuninnError) -> Self {
        self.attempt += 1;
        self.metadata
            .insert("last_error".into(), serde_json::Value::String(err.to_string()));
        self.metadata
            .insert("attempt".into(), serde_json::Value::from(self.attempt));
        self
    }
}

/// Execute an async operation with retry logic.
///
/// `call` receives the [`RetryContext`] for each attempt. Errors that
/// `classify` marks [`ErrorClass::Retryable`] are retried up to
/// `config.max_attempts` with exponential backoff; fatal errors and the
/// last error after the budget is spent are returned unmodified.
///
/// Emits exactly one log event per attempt.
pub async fn with_retry<F, Fut, T, C>(
    config: &RetryConfig,
    operation: &str,
    classify: C,
    mut call: F,
) -> Result<T>
where
    F: FnMut(RetryContext) -> Fut,
    Fut: Future<Output = Result<T>>,
    C: Fn(&MuninnError) -> ErrorClass,
{
    let mut ctx = RetryContext::new(config);
    loop {
        match call(ctx.clone()).await {
            Ok(value) => {
                if ctx.is_first_attempt() {
                    debug!(operation, phase = %CallPhase::Completed, "call succeeded");
                } else {
                    info!(
                        operation,
                        phase = %CallPhase::Completed,
                        attempts = ctx.attempt + 1,
                        "call succeeded after retry"
                    );
                }
                return Ok(value);
            }
            Err(e) => {
                let class = classify(&e);
                if class == ErrorClass::Fatal || ctx.remaining() == 0 {
                    warn!(
                        operation,
                        phase = %CallPhase::Failed,
                        attempt = ctx.attempt + 1,
                        max_attempts = ctx.max_attempts,
                        retryable = class == ErrorClass::Retryable,
                        error = %e,
                        "call failed"
                    );
                    return Err(e);
                }

                let delay = config.effective_delay(ctx.attempt, e.retry_after());
                metrics::counter!(telemetry::RETRIES_TOTAL, "operation" => operation.to_owned())
                    .increment(1);
                warn!(
                    operation,
                    phase = %CallPhase::Retrying,
                    attempt = ctx.attempt + 1,
                    max_attempts = ctx.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "retrying after transient error"
                );
                tokio::time::sleep(delay).await;
                ctx = ctx.advance(&e);
            }
        }
    }
}
