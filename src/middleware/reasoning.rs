use std::sync::Arc;

use async_trait::async_trait;

use super::LanguageModelMiddleware;
use crate::reasoning::{DEFAULT_TAG, ReasoningParser, SplitReasoningStream};
use crate::traits::{LanguageModel, StreamResult};
use crate::types::{CallParameters, GenerateResult};
use crate::Result;

/// Reasoning extraction settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReasoningConfig {
    /// Tag name without brackets. Default: `think`.
    pub tag_name: String,
    /// Treat text before any opening tag as reasoning. Default: false.
    pub start_with_reasoning: bool,
}

impl Default for ReasoningConfig {
    fn default() -> Self {
        Self {
            tag_name: DEFAULT_TAG.to_string(),
            start_with_reasoning: false,
        }
    }
}

impl ReasoningConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tag_name(mut self, tag: impl Into<String>) -> Self {
        self.tag_name = tag.into();
        self
    }

    pub fn start_with_reasoning(mut self, enabled: bool) -> Self {
        self.start_with_reasoning = enabled;
        self
    }

    fn parser(&self) -> ReasoningParser {
        ReasoningParser::new(&self.tag_name, self.start_with_reasoning)
    }
}

/// Moves tag-delimited reasoning out of the visible text.
///
/// `generate` results get the reasoning in [`GenerateResult::reasoning`]
/// (appended after any reasoning the provider already returned); streams
/// get `ReasoningDelta` events in place of the tagged text.
pub struct ExtractReasoningMiddleware {
    config: ReasoningConfig,
}

impl ExtractReasoningMiddleware {
    pub fn new(config: ReasoningConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl LanguageModelMiddleware for ExtractReasoningMiddleware {
    fn name(&self) -> &str {
        "extract-reasoning"
    }

    async fn wrap_generate(
        &self,
        params: &CallParameters,
        next: &Arc<dyn LanguageModel>,
    ) -> Result<GenerateResult> {
        let mut result = next.do_generate(params).await?;
        let (reasoning, text) = self.config.parser().split_complete(&result.text);
        result.text = text;
        if let Some(extracted) = reasoning {
            result.reasoning = Some(match result.reasoning.take() {
                Some(mut native) => {
                    native.push_str(&extracted);
                    native
                }
                None => extracted,
            });
        }
        Ok(result)
    }

    async fn wrap_stream(
        &self,
        params: &CallParameters,
        next: &Arc<dyn LanguageModel>,
    ) -> Result<StreamResult> {
        let result = next.do_stream(params).await?;
        Ok(StreamResult {
            stream: Box::pin(SplitReasoningStream::new(
                result.stream,
                self.config.parser(),
            )),
            raw_call: result.raw_call,
        })
    }
}
