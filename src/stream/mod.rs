//! Event-stream plumbing shared by the middleware layers.
//!
//! - [`tee::wrap_live_stream`] forwards a live stream while capturing it.
//! - [`replay::replay`] turns a captured sequence back into a stream.
//! - [`collect`] folds a stream into a [`GenerateResult`].

pub mod replay;
pub mod tee;

pub use replay::replay;
pub use tee::{Capture, TeeStream, wrap_live_stream};

use futures_util::{Stream, StreamExt};

use crate::types::{GenerateResult, StreamEvent, ToolCall};
use crate::{MuninnError, Result};

/// Consume a stream and assemble the equivalent completed result.
///
/// Text and reasoning deltas are concatenated in order, tool-call deltas
/// are merged by index. An `Error` event is returned as
/// [`MuninnError::Stream`]; a stream that ends without a terminal event
/// is also an error, since the pipeline never fabricates a `Finish`.
pub async fn collect<S>(stream: S) -> Result<GenerateResult>
where
    S: Stream<Item = StreamEvent>,
{
    let mut stream = std::pin::pin!(stream);
    let mut result = GenerateResult::default();
    let mut reasoning = String::new();
    let mut tool_calls: Vec<(usize, ToolCall)> = Vec::new();

    while let Some(event) = stream.next().await {
        match event {
            StreamEvent::TextDelta(text) => result.text.push_str(&text),
            StreamEvent::ReasoningDelta(text) => reasoning.push_str(&text),
            StreamEvent::ToolCallDelta(delta) => {
                let position = tool_calls.iter().position(|(index, _)| *index == delta.index);
                let call = match position {
                    Some(position) => &mut tool_calls[position].1,
                    None => {
                        tool_calls.push((delta.index, ToolCall::default()));
                        let last = tool_calls.len() - 1;
                        &mut tool_calls[last].1
                    }
                };
                if let Some(id) = delta.id {
                    call.id = id;
                }
                if let Some(name) = delta.name {
                    call.name = name;
                }
                call.arguments.push_str(&delta.arguments);
            }
            StreamEvent::Finish { reason, usage } => {
                result.finish_reason = reason;
                result.usage = usage;
                if !reasoning.is_empty() {
                    result.reasoning = Some(reasoning);
                }
                tool_calls.sort_by_key(|(index, _)| *index);
                result.tool_calls = tool_calls.into_iter().map(|(_, call)| call).collect();
                return Ok(result);
            }
            StreamEvent::Error(err) => return Err(err.into()),
        }
    }

    Err(MuninnError::Stream {
        message: "stream ended without a finish event".into(),
        retryable: false,
    })
}

#[cfg(test)]
mod tests {
    use futures_util::stream;

    use super::*;
    use crate::types::{FinishReason, StreamError, ToolCallDelta, Usage};

    #[tokio::test]
    async fn collect_assembles_text_reasoning_and_tools() {
        let events = vec![
            StreamEvent::ReasoningDelta("think".into()),
            StreamEvent::text("hel"),
            StreamEvent::ToolCallDelta(ToolCallDelta {
                index: 0,
                id: Some("call_1".into()),
                name: Some("search".into()),
                arguments: "{\"q\":".into(),
            }),
            StreamEvent::text("lo"),
            StreamEvent::ToolCallDelta(ToolCallDelta {
                index: 0,
                id: None,
                name: None,
                arguments: "\"rust\"}".into(),
            }),
            StreamEvent::Finish {
                reason: FinishReason::ToolCalls,
                usage: Some(Usage::new(3, 4)),
            },
        ];

        let result = collect(stream::iter(events)).await.unwrap();
        assert_eq!(result.text, "hello");
        assert_eq!(result.reasoning.as_deref(), Some("think"));
        assert_eq!(result.tool_calls.len(), 1);
        assert_eq!(result.tool_calls[0].name, "search");
        assert_eq!(result.tool_calls[0].arguments, "{\"q\":\"rust\"}");
        assert_eq!(result.finish_reason, FinishReason::ToolCalls);
        assert_eq!(result.usage.unwrap().total_tokens, 7);
    }

    #[tokio::test]
    async fn collect_surfaces_error_event() {
        let events = vec![
            StreamEvent::text("partial"),
            StreamEvent::Error(StreamError::new("upstream closed")),
        ];
        let err = collect(stream::iter(events)).await.unwrap_err();
        assert!(matches!(err, MuninnError::Stream { ref message, .. } if message == "upstream closed"));
    }

    #[tokio::test]
    async fn collect_rejects_unterminated_stream() {
        let err = collect(stream::iter(vec![StreamEvent::text("a")]))
            .await
            .unwrap_err();
        assert!(matches!(err, MuninnError::Stream { .. }));
    }
}
