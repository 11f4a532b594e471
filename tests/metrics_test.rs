//! Tests for metrics emitted by the pipeline.
//!
//! Uses `metrics_util::debugging::DebuggingRecorder` to capture and assert
//! on emitted metrics without needing a real exporter.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{StreamExt, stream};
use metrics_util::MetricKind;
use metrics_util::debugging::{DebugValue, DebuggingRecorder};

use muninn::telemetry;
use muninn::traits::{LanguageModel, StreamResult};
use muninn::types::{
    CallParameters, FinishReason, GenerateResult, Message, StreamError, StreamEvent, Usage,
};
use muninn::middleware::LoggingConfig;
use muninn::{CacheConfig, CacheStore, MuninnError, Pipeline, Result, RetryConfig};

// ============================================================================
// Mock model
// ============================================================================

struct UsageModel {
    failures: AtomicU32,
}

#[async_trait]
impl LanguageModel for UsageModel {
    fn name(&self) -> &str {
        "usage-model"
    }

    async fn do_generate(&self, _params: &CallParameters) -> Result<GenerateResult> {
        if self.failures.load(Ordering::SeqCst) > 0 {
            self.failures.fetch_sub(1, Ordering::SeqCst);
            return Err(MuninnError::Timeout);
        }
        Ok(GenerateResult::text("ok").with_usage(Usage::new(10, 5)))
    }

    async fn do_stream(&self, _params: &CallParameters) -> Result<StreamResult> {
        Ok(StreamResult::new(Box::pin(stream::iter(vec![
            StreamEvent::text("ok"),
            StreamEvent::Finish {
                reason: FinishReason::Stop,
                usage: Some(Usage::new(3, 2)),
            },
        ]))))
    }
}

fn model(failures: u32) -> Arc<UsageModel> {
    Arc::new(UsageModel {
        failures: AtomicU32::new(failures),
    })
}

fn params() -> CallParameters {
    CallParameters::new(vec![Message::user("hi")])
}

// ============================================================================
// Snapshot helpers
// ============================================================================

type SnapshotVec = Vec<(
    metrics_util::CompositeKey,
    Option<metrics::Unit>,
    Option<metrics::SharedString>,
    DebugValue,
)>;

/// Sum all counter values matching a metric name and optional label.
fn counter_total(snapshot: &SnapshotVec, name: &str, label: Option<(&str, &str)>) -> u64 {
    snapshot
        .iter()
        .filter(|(key, _, _, _)| key.kind() == MetricKind::Counter && key.key().name() == name)
        .filter(|(key, _, _, _)| {
            label.is_none_or(|(k, v)| {
                key.key()
                    .labels()
                    .any(|l| l.key() == k && l.value() == v)
            })
        })
        .map(|(_, _, _, value)| match value {
            DebugValue::Counter(v) => *v,
            _ => 0,
        })
        .sum()
}

fn has_histogram(snapshot: &SnapshotVec, name: &str) -> bool {
    snapshot
        .iter()
        .any(|(key, _, _, _)| key.kind() == MetricKind::Histogram && key.key().name() == name)
}

/// Runs async code within a local recorder scope on the multi-thread runtime.
fn recorded<F, T>(fut: F) -> (T, SnapshotVec)
where
    F: Future<Output = T>,
{
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    let out = metrics::with_local_recorder(&recorder, || {
        tokio::task::block_in_place(|| tokio::runtime::Handle::current().block_on(fut))
    });
    (out, snapshotter.snapshot().into_vec())
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn retried_call_counts_one_request_and_one_retry() {
    let pipeline = Pipeline::builder(model(1))
        .logging(LoggingConfig::new())
        .retry(RetryConfig::new().base_delay(Duration::from_millis(1)))
        .build();

    let (result, snapshot) = recorded(pipeline.generate(params()));
    assert!(result.is_ok());

    assert_eq!(counter_total(&snapshot, telemetry::REQUESTS_TOTAL, None), 1);
    assert_eq!(
        counter_total(&snapshot, telemetry::REQUESTS_TOTAL, Some(("status", "ok"))),
        1
    );
    assert_eq!(counter_total(&snapshot, telemetry::RETRIES_TOTAL, None), 1);
    assert!(has_histogram(&snapshot, telemetry::REQUEST_DURATION_SECONDS));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn failed_call_is_counted_as_error() {
    let pipeline = Pipeline::builder(model(5))
        .logging(LoggingConfig::new())
        .retry(RetryConfig::disabled())
        .build();

    let (result, snapshot) = recorded(pipeline.generate(params()));
    assert!(result.is_err());
    assert_eq!(
        counter_total(&snapshot, telemetry::REQUESTS_TOTAL, Some(("status", "error"))),
        1
    );
    assert_eq!(counter_total(&snapshot, telemetry::RETRIES_TOTAL, None), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn token_usage_is_recorded_by_direction() {
    let pipeline = Pipeline::builder(model(0))
        .logging(LoggingConfig::new())
        .build();

    let (_, snapshot) = recorded(async {
        pipeline.generate(params()).await.unwrap();
        let result = pipeline.stream(params()).await.unwrap();
        let _: Vec<_> = result.stream.collect().await;
    });

    assert_eq!(
        counter_total(&snapshot, telemetry::TOKENS_TOTAL, Some(("direction", "prompt"))),
        13
    );
    assert_eq!(
        counter_total(&snapshot, telemetry::TOKENS_TOTAL, Some(("direction", "completion"))),
        7
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn cache_hits_and_misses_are_counted() {
    let cache = CacheConfig::new();
    let pipeline = Pipeline::builder(model(0))
        .caching(Arc::new(CacheStore::from_config(&cache)), cache)
        .build();

    let (_, snapshot) = recorded(async {
        for _ in 0..3 {
            pipeline.generate(params()).await.unwrap();
        }
    });

    assert_eq!(
        counter_total(&snapshot, telemetry::CACHE_MISSES_TOTAL, Some(("operation", "generate"))),
        1
    );
    assert_eq!(
        counter_total(&snapshot, telemetry::CACHE_HITS_TOTAL, Some(("operation", "generate"))),
        2
    );
    assert_eq!(counter_total(&snapshot, telemetry::CACHE_BYPASS_TOTAL, None), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn cached_call_still_counts_as_request() {
    let cache = CacheConfig::new();
    let pipeline = Pipeline::builder(model(0))
        .logging(LoggingConfig::new())
        .caching(Arc::new(CacheStore::from_config(&cache)), cache)
        .build();

    let (_, snapshot) = recorded(async {
        pipeline.generate(params()).await.unwrap();
        pipeline.generate(params()).await.unwrap();
    });

    assert_eq!(counter_total(&snapshot, telemetry::REQUESTS_TOTAL, None), 2);
}

struct BrokenStreamModel;

#[async_trait]
impl LanguageModel for BrokenStreamModel {
    fn name(&self) -> &str {
        "broken-stream"
    }

    async fn do_generate(&self, _params: &CallParameters) -> Result<GenerateResult> {
        Err(MuninnError::InvalidRequest("unused".into()))
    }

    async fn do_stream(&self, _params: &CallParameters) -> Result<StreamResult> {
        Ok(StreamResult::new(Box::pin(stream::iter(vec![
            StreamEvent::text("partial"),
            StreamEvent::Error(StreamError::new("upstream closed")),
        ]))))
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn stream_ending_in_error_is_counted_as_error() {
    let pipeline = Pipeline::builder(Arc::new(BrokenStreamModel))
        .logging(LoggingConfig::new())
        .build();

    let (_, snapshot) = recorded(async {
        let result = pipeline.stream(params()).await.unwrap();
        let _: Vec<_> = result.stream.collect().await;
    });

    assert_eq!(counter_total(&snapshot, telemetry::REQUESTS_TOTAL, None), 1);
    assert_eq!(
        counter_total(&snapshot, telemetry::REQUESTS_TOTAL, Some(("status", "error"))),
        1
    );
    assert_eq!(
        counter_total(&snapshot, telemetry::REQUESTS_TOTAL, Some(("status", "ok"))),
        0
    );
    assert!(has_histogram(&snapshot, telemetry::REQUEST_DURATION_SECONDS));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn finished_stream_is_counted_once_as_ok() {
    let pipeline = Pipeline::builder(model(0))
        .logging(LoggingConfig::new())
        .build();

    let (_, snapshot) = recorded(async {
        let result = pipeline.stream(params()).await.unwrap();
        let _: Vec<_> = result.stream.collect().await;
    });

    assert_eq!(
        counter_total(&snapshot, telemetry::REQUESTS_TOTAL, Some(("status", "ok"))),
        1
    );
    assert_eq!(counter_total(&snapshot, telemetry::REQUESTS_TOTAL, None), 1);
}
