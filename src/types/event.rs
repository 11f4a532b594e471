//! Streaming event types

use std::pin::Pin;
use std::time::Duration;

use futures_util::Stream;
use serde::{Deserialize, Serialize};

use super::response::{FinishReason, Usage};
use super::tool::ToolCallDelta;
use crate::MuninnError;

/// One discrete unit of a streamed model response.
///
/// Within one call the sequence is ordered and append-only, and ends with
/// exactly one [`Finish`](StreamEvent::Finish) or [`Error`](StreamEvent::Error).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Visible text chunk
    TextDelta(String),

    /// Reasoning text chunk, produced by the reasoning splitter or by
    /// providers with native reasoning output
    ReasoningDelta(String),

    /// Incremental tool call
    ToolCallDelta(ToolCallDelta),

    /// Stream complete
    Finish {
        reason: FinishReason,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        usage: Option<Usage>,
    },

    /// Stream failed
    Error(StreamError),
}

impl StreamEvent {
    pub fn text(text: impl Into<String>) -> Self {
        StreamEvent::TextDelta(text.into())
    }

    pub fn finish(reason: FinishReason) -> Self {
        StreamEvent::Finish {
            reason,
            usage: None,
        }
    }

    /// Whether this event ends the sequence.
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Finish { .. } | StreamEvent::Error(_))
    }

    /// Text carried by a `TextDelta`, if this is one.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            StreamEvent::TextDelta(text) => Some(text),
            _ => None,
        }
    }
}

/// Error carried inside a stream.
///
/// Kept as plain data so captured streams can be cached and replayed.
/// Rate-limit identity and the provider's retry hint survive the trip
/// through the stream so retry layers classify it like the original error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamError {
    pub message: String,
    /// Whether the provider considers the failure transient.
    #[serde(default)]
    pub retryable: bool,
    /// Set when the failure was a rate limit.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub rate_limited: bool,
    /// Provider retry hint, in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after_ms: Option<u64>,
}

impl StreamError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: false,
            rate_limited: false,
            retry_after_ms: None,
        }
    }

    pub fn retryable(message: impl Into<String>) -> Self {
        Self {
            retryable: true,
            ..Self::new(message)
        }
    }

    /// A rate-limit failure, optionally with the provider's retry hint.
    pub fn rate_limited(message: impl Into<String>, retry_after: Option<Duration>) -> Self {
        Self {
            retryable: true,
            rate_limited: true,
            retry_after_ms: retry_after.map(|d| d.as_millis() as u64),
            ..Self::new(message)
        }
    }

    pub fn retry_after(&self) -> Option<Duration> {
        self.retry_after_ms.map(Duration::from_millis)
    }
}

impl From<&MuninnError> for StreamError {
    fn from(err: &MuninnError) -> Self {
        Self {
            message: err.to_string(),
            retryable: err.is_transient(),
            rate_limited: err.is_rate_limit(),
            retry_after_ms: err.retry_after().map(|d| d.as_millis() as u64),
        }
    }
}

impl From<StreamError> for MuninnError {
    fn from(err: StreamError) -> Self {
        if err.rate_limited {
            return MuninnError::RateLimited {
                retry_after: err.retry_after(),
            };
        }
        MuninnError::Stream {
            message: err.message,
            retryable: err.retryable,
        }
    }
}

/// Boxed event sequence handed between pipeline layers.
pub type EventStream = Pin<Box<dyn Stream<Item = StreamEvent> + Send>>;
