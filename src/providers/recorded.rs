//! Transcript playback model.

use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream;
use tokio_stream::wrappers::ReceiverStream;

use crate::stream::collect;
use crate::traits::{LanguageModel, StreamResult};
use crate::types::{CallParameters, EventStream, GenerateResult, StreamEvent};
use crate::{MuninnError, Result};

/// Number of events buffered between the playback task and the consumer.
pub const PLAYBACK_BUFFER: usize = 16;

/// A [`LanguageModel`] that plays back a fixed list of events.
///
/// Every call, whatever its parameters, replays the same transcript.
/// `generate` assembles the transcript into a [`GenerateResult`].
#[derive(Debug)]
pub struct RecordedModel {
    name: String,
    events: Vec<StreamEvent>,
    chunk_delay: Duration,
    calls: AtomicU32,
}

impl RecordedModel {
    pub fn new(name: impl Into<String>, events: Vec<StreamEvent>) -> Self {
        Self {
            name: name.into(),
            events,
            chunk_delay: Duration::ZERO,
            calls: AtomicU32::new(0),
        }
    }

    /// Parse a JSONL transcript: one serialized [`StreamEvent`] per line.
    ///
    /// Blank lines and lines starting with `#` are skipped.
    pub fn parse_jsonl(name: impl Into<String>, content: &str) -> Result<Self> {
        let events = content
            .lines()
            .enumerate()
            .filter(|(_, line)| {
                let line = line.trim();
                !line.is_empty() && !line.starts_with('#')
            })
            .map(|(n, line)| {
                serde_json::from_str(line).map_err(|e| {
                    MuninnError::Configuration(format!("transcript line {}: {e}", n + 1))
                })
            })
            .collect::<Result<Vec<StreamEvent>>>()?;
        Ok(Self::new(name, events))
    }

    /// Load a JSONL transcript from disk.
    pub fn from_jsonl(name: impl Into<String>, path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            MuninnError::Configuration(format!("Failed to read transcript {path:?}: {e}"))
        })?;
        Self::parse_jsonl(name, &content)
    }

    /// Pause between streamed events.
    pub fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = delay;
        self
    }

    pub fn events(&self) -> &[StreamEvent] {
        &self.events
    }

    /// Calls served so far, `generate` and `stream` combined.
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    fn playback(&self) -> EventStream {
        let events = self.events.clone();
        if self.chunk_delay.is_zero() {
            return Box::pin(stream::iter(events));
        }

        // Paced playback runs in its own task and stops when the consumer
        // drops the stream.
        let delay = self.chunk_delay;
        let (tx, rx) = tokio::sync::mpsc::channel(PLAYBACK_BUFFER);
        tokio::spawn(async move {
            for event in events {
                tokio::time::sleep(delay).await;
                if tx.send(event).await.is_err() {
                    break;
                }
            }
        });
        Box::pin(ReceiverStream::new(rx))
    }
}

#[async_trait]
impl LanguageModel for RecordedModel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn do_generate(&self, _params: &CallParameters) -> Result<GenerateResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut result = collect(stream::iter(self.events.clone())).await?;
        result.model = Some(self.name.clone());
        Ok(result)
    }

    async fn do_stream(&self, _params: &CallParameters) -> Result<StreamResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(StreamResult::new(self.playback()))
    }
}
