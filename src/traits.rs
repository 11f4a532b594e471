//! Core LanguageModel trait

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::types::{CallParameters, EventStream, GenerateResult};
use crate::Result;

/// Boundary to the model-call collaborator.
///
/// Implementations perform the actual provider request. The pipeline never
/// looks at transport details; it only sees a completed
/// [`GenerateResult`] or an ordered [`EventStream`].
///
/// Middleware layers implement this trait too (see
/// [`Layered`](crate::middleware::Layered)), so a composed pipeline is
/// itself a `LanguageModel`.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Model name for logging and cache-key scoping.
    fn name(&self) -> &str;

    /// Non-streaming completion.
    async fn do_generate(&self, params: &CallParameters) -> Result<GenerateResult>;

    /// Streaming completion.
    ///
    /// Returns as soon as the stream is established; events are produced
    /// as the caller consumes them.
    async fn do_stream(&self, params: &CallParameters) -> Result<StreamResult>;
}

/// An established stream plus whatever call metadata the provider reported.
pub struct StreamResult {
    pub stream: EventStream,
    pub raw_call: RawCall,
}

impl StreamResult {
    pub fn new(stream: EventStream) -> Self {
        Self {
            stream,
            raw_call: RawCall::default(),
        }
    }
}

impl std::fmt::Debug for StreamResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamResult")
            .field("raw_call", &self.raw_call)
            .finish_non_exhaustive()
    }
}

/// Opaque provider call metadata.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawCall {
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl RawCall {
    /// Metadata key set on streams served from the response cache.
    pub const CACHED: &'static str = "cached";

    /// Metadata attached to a replayed stream.
    pub fn cached() -> Self {
        let mut metadata = BTreeMap::new();
        metadata.insert(Self::CACHED.to_string(), serde_json::Value::Bool(true));
        Self { metadata }
    }

    pub fn is_cached(&self) -> bool {
        self.metadata.get(Self::CACHED) == Some(&serde_json::Value::Bool(true))
    }
}
