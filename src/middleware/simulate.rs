use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream;

use super::LanguageModelMiddleware;
use crate::traits::{LanguageModel, StreamResult};
use crate::types::{CallParameters, GenerateResult, StreamEvent, ToolCallDelta};
use crate::Result;

/// Serves `stream` calls from the inner `generate`.
///
/// For models or layers that only produce complete results. The whole
/// result becomes one burst of events: reasoning, text, one delta per tool
/// call, then `Finish`. `generate` passes through.
pub struct SimulateStreamingMiddleware;

impl SimulateStreamingMiddleware {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SimulateStreamingMiddleware {
    fn default() -> Self {
        Self::new()
    }
}

/// Event sequence equivalent to a completed result.
pub fn result_to_events(result: GenerateResult) -> Vec<StreamEvent> {
    let mut events = Vec::with_capacity(result.tool_calls.len() + 3);
    if let Some(reasoning) = result.reasoning.filter(|r| !r.is_empty()) {
        events.push(StreamEvent::ReasoningDelta(reasoning));
    }
    if !result.text.is_empty() {
        events.push(StreamEvent::TextDelta(result.text));
    }
    events.extend(
        result
            .tool_calls
            .iter()
            .enumerate()
            .map(|(index, call)| StreamEvent::ToolCallDelta(ToolCallDelta::complete(index, call))),
    );
    events.push(StreamEvent::Finish {
        reason: result.finish_reason,
        usage: result.usage,
    });
    events
}

#[async_trait]
impl LanguageModelMiddleware for SimulateStreamingMiddleware {
    fn name(&self) -> &str {
        "simulate-streaming"
    }

    async fn wrap_stream(
        &self,
        params: &CallParameters,
        next: &Arc<dyn LanguageModel>,
    ) -> Result<StreamResult> {
        let result = next.do_generate(params).await?;
        Ok(StreamResult::new(Box::pin(stream::iter(result_to_events(
            result,
        )))))
    }
}
