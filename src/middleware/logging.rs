use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures_util::StreamExt;
use tracing::{info, warn};

use super::LanguageModelMiddleware;
use crate::telemetry;
use crate::traits::{LanguageModel, StreamResult};
use crate::types::{CallParameters, GenerateResult, StreamEvent, Usage};
use crate::Result;

/// What the logging layer records besides outcome and timing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Log the full call parameters. Default: false.
    pub log_params: bool,
    /// Log the generated text. Default: false.
    pub log_results: bool,
}

impl LoggingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log_params(mut self, enabled: bool) -> Self {
        self.log_params = enabled;
        self
    }

    pub fn log_results(mut self, enabled: bool) -> Self {
        self.log_results = enabled;
        self
    }
}

/// Observes every call and its outcome. Never alters results or errors.
pub struct LoggingMiddleware {
    config: LoggingConfig,
}

impl LoggingMiddleware {
    pub fn new(config: LoggingConfig) -> Self {
        Self { config }
    }

    fn log_request(&self, operation: &'static str, model: &str, params: &CallParameters) {
        if self.config.log_params {
            let params = serde_json::to_string(params).unwrap_or_else(|e| format!("<{e}>"));
            info!(model, operation, %params, "model call");
        } else {
            info!(
                model,
                operation,
                messages = params.messages.len(),
                tools = params.tools.len(),
                "model call"
            );
        }
    }
}

fn record(model: &str, operation: &'static str, status: &'static str, started: Instant) {
    metrics::counter!(telemetry::REQUESTS_TOTAL,
        "model" => model.to_owned(),
        "operation" => operation,
        "status" => status,
    )
    .increment(1);
    metrics::histogram!(telemetry::REQUEST_DURATION_SECONDS,
        "model" => model.to_owned(),
        "operation" => operation,
    )
    .record(started.elapsed().as_secs_f64());
}

fn record_usage(model: &str, usage: &Usage) {
    metrics::counter!(telemetry::TOKENS_TOTAL,
        "model" => model.to_owned(),
        "direction" => "prompt",
    )
    .increment(u64::from(usage.prompt_tokens));
    metrics::counter!(telemetry::TOKENS_TOTAL,
        "model" => model.to_owned(),
        "direction" => "completion",
    )
    .increment(u64::from(usage.completion_tokens));
}

#[async_trait]
impl LanguageModelMiddleware for LoggingMiddleware {
    fn name(&self) -> &str {
        "logging"
    }

    async fn wrap_generate(
        &self,
        params: &CallParameters,
        next: &Arc<dyn LanguageModel>,
    ) -> Result<GenerateResult> {
        let model = next.name();
        self.log_request("generate", model, params);
        let started = Instant::now();

        match next.do_generate(params).await {
            Ok(result) => {
                record(model, "generate", "ok", started);
                if let Some(usage) = &result.usage {
                    record_usage(model, usage);
                }
                let elapsed_ms = started.elapsed().as_millis() as u64;
                if self.config.log_results {
                    info!(
                        model,
                        elapsed_ms,
                        finish_reason = ?result.finish_reason,
                        text = %result.text,
                        reasoning = result.reasoning.as_deref().unwrap_or(""),
                        "generate completed"
                    );
                } else {
                    info!(
                        model,
                        elapsed_ms,
                        finish_reason = ?result.finish_reason,
                        text_len = result.text.len(),
                        tool_calls = result.tool_calls.len(),
                        "generate completed"
                    );
                }
                Ok(result)
            }
            Err(e) => {
                record(model, "generate", "error", started);
                warn!(model, error = %e, "generate failed");
                Err(e)
            }
        }
    }

    async fn wrap_stream(
        &self,
        params: &CallParameters,
        next: &Arc<dyn LanguageModel>,
    ) -> Result<StreamResult> {
        let model = next.name().to_owned();
        self.log_request("stream", &model, params);
        let started = Instant::now();

        // Outcome metrics for an established stream are recorded on its
        // terminal event.
        let result = match next.do_stream(params).await {
            Ok(result) => result,
            Err(e) => {
                record(&model, "stream", "error", started);
                warn!(model = %model, error = %e, "stream failed to start");
                return Err(e);
            }
        };

        let cached = result.raw_call.is_cached();
        let log_results = self.config.log_results;
        let mut text = String::new();
        let mut events = 0usize;
        let stream = result.stream.inspect(move |event| {
            events += 1;
            match event {
                StreamEvent::TextDelta(delta) => text.push_str(delta),
                StreamEvent::Finish { reason, usage } => {
                    record(&model, "stream", "ok", started);
                    if let Some(usage) = usage {
                        record_usage(&model, usage);
                    }
                    let elapsed_ms = started.elapsed().as_millis() as u64;
                    if log_results {
                        info!(
                            model = %model,
                            cached,
                            events,
                            elapsed_ms,
                            finish_reason = ?reason,
                            text = %text,
                            "stream completed"
                        );
                    } else {
                        info!(
                            model = %model,
                            cached,
                            events,
                            elapsed_ms,
                            finish_reason = ?reason,
                            text_len = text.len(),
                            "stream completed"
                        );
                    }
                }
                StreamEvent::Error(err) => {
                    record(&model, "stream", "error", started);
                    warn!(
                        model = %model,
                        cached,
                        events,
                        error = %err.message,
                        retryable = err.retryable,
                        "stream ended with error"
                    );
                }
                _ => {}
            }
        });

        Ok(StreamResult {
            stream: Box::pin(stream),
            raw_call: result.raw_call,
        })
    }
}
