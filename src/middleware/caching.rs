use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::LanguageModelMiddleware;
use crate::cache::{CacheConfig, CacheStore, CachedResult, derive_key};
use crate::phase::CallPhase;
use crate::stream::{Capture, replay, wrap_live_stream};
use crate::telemetry;
use crate::traits::{LanguageModel, RawCall, StreamResult};
use crate::types::{CallParameters, GenerateResult, StreamEvent};
use crate::Result;

/// Response cache for `generate` results and captured streams.
///
/// Keys are derived from the operation, the model name and the canonical
/// call parameters. A key that cannot be derived bypasses the cache.
///
/// A stream miss is forwarded live and captured as it is consumed; the
/// capture is stored once the stream ends or is dropped. A stream hit is
/// replayed from the capture without touching the model. Streams ending
/// in a retryable error are never stored, so a retry that re-enters this
/// layer reaches the model again.
pub struct CachingMiddleware {
    store: Arc<CacheStore>,
    config: CacheConfig,
}

impl CachingMiddleware {
    pub fn new(store: Arc<CacheStore>, config: CacheConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &Arc<CacheStore> {
        &self.store
    }

    fn key_for(
        &self,
        operation: &'static str,
        model: &str,
        params: &CallParameters,
    ) -> Option<String> {
        match derive_key(&(operation, model, params)) {
            Ok(key) => Some(key),
            Err(e) => {
                metrics::counter!(telemetry::CACHE_BYPASS_TOTAL, "operation" => operation)
                    .increment(1);
                debug!(operation, error = %e, "cache key unavailable, bypassing cache");
                None
            }
        }
    }
}

#[async_trait]
impl LanguageModelMiddleware for CachingMiddleware {
    fn name(&self) -> &str {
        "caching"
    }

    async fn wrap_generate(
        &self,
        params: &CallParameters,
        next: &Arc<dyn LanguageModel>,
    ) -> Result<GenerateResult> {
        let Some(key) = self.key_for("generate", next.name(), params) else {
            return next.do_generate(params).await;
        };

        if let Some(entry) = self.store.get(&key) {
            if let CachedResult::Generate(result) = entry.value {
                metrics::counter!(telemetry::CACHE_HITS_TOTAL, "operation" => "generate")
                    .increment(1);
                debug!(operation = "generate", phase = %CallPhase::Cached, "cache hit");
                return Ok(result);
            }
        }

        metrics::counter!(telemetry::CACHE_MISSES_TOTAL, "operation" => "generate").increment(1);
        debug!(operation = "generate", phase = %CallPhase::NetworkInFlight, "cache miss");
        let result = next.do_generate(params).await?;
        self.store
            .set(key, CachedResult::Generate(result.clone()), self.config.ttl);
        Ok(result)
    }

    async fn wrap_stream(
        &self,
        params: &CallParameters,
        next: &Arc<dyn LanguageModel>,
    ) -> Result<StreamResult> {
        let Some(key) = self.key_for("stream", next.name(), params) else {
            return next.do_stream(params).await;
        };

        if let Some(entry) = self.store.get(&key) {
            if let CachedResult::Stream { events, complete } = entry.value {
                metrics::counter!(telemetry::CACHE_HITS_TOTAL, "operation" => "stream")
                    .increment(1);
                debug!(
                    operation = "stream",
                    phase = %CallPhase::Cached,
                    events = events.len(),
                    complete,
                    "cache hit, replaying stream"
                );
                return Ok(StreamResult {
                    stream: replay(
                        events,
                        self.config.replay_initial_delay,
                        self.config.replay_chunk_delay,
                    ),
                    raw_call: RawCall::cached(),
                });
            }
        }

        metrics::counter!(telemetry::CACHE_MISSES_TOTAL, "operation" => "stream").increment(1);
        debug!(operation = "stream", phase = %CallPhase::NetworkInFlight, "cache miss");
        let live = next.do_stream(params).await?;

        let store = self.store.clone();
        let ttl = self.config.ttl;
        let cache_errors = self.config.cache_errors;
        let stream = wrap_live_stream(live.stream, move |capture| {
            if !should_store(&capture, cache_errors) {
                debug!(events = capture.events.len(), "stream capture not cached");
                return;
            }
            debug!(
                events = capture.events.len(),
                complete = capture.complete,
                "storing stream capture"
            );
            store.set(
                key,
                CachedResult::Stream {
                    events: capture.events,
                    complete: capture.complete,
                },
                ttl,
            );
        });

        Ok(StreamResult {
            stream: Box::pin(stream),
            raw_call: live.raw_call,
        })
    }
}

/// Whether a finished capture is worth storing.
///
/// Empty captures are skipped. Captures ending in an error are stored only
/// when error caching is on and the provider marked the error permanent.
fn should_store(capture: &Capture, cache_errors: bool) -> bool {
    match capture.events.last() {
        None => false,
        Some(StreamEvent::Error(err)) => cache_errors && !err.retryable,
        Some(_) => true,
    }
}
