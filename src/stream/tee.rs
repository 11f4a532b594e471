//! Live-stream capture.
//!
//! [`TeeStream`] forwards every event of its source unchanged while keeping
//! a copy. When the source delivers its terminal event (or ends), the
//! captured events are handed to the completion callback exactly once. If
//! the consumer drops the stream first, the callback still fires from
//! `Drop` with whatever was captured, marked incomplete. Dropping the tee
//! drops the source with it, so no further events are requested.

use std::pin::Pin;
use std::task::{Context, Poll, ready};

use futures_util::Stream;
use pin_project_lite::pin_project;

use crate::types::StreamEvent;

/// Events captured by a [`TeeStream`].
#[derive(Debug, Clone, PartialEq)]
pub struct Capture {
    pub events: Vec<StreamEvent>,
    /// True when the source delivered a terminal event before the capture ended.
    pub complete: bool,
}

impl Capture {
    /// Whether the capture ends in an `Error` event.
    pub fn ends_in_error(&self) -> bool {
        matches!(self.events.last(), Some(StreamEvent::Error(_)))
    }
}

type OnComplete = Box<dyn FnOnce(Capture) + Send>;

pin_project! {
    /// Pass-through stream that records what it forwards.
    ///
    /// Created by [`wrap_live_stream`].
    pub struct TeeStream<S> {
        #[pin]
        inner: S,
        buffer: Vec<StreamEvent>,
        on_complete: Option<OnComplete>,
    }

    impl<S> PinnedDrop for TeeStream<S> {
        fn drop(this: Pin<&mut Self>) {
            let this = this.project();
            if let Some(on_complete) = this.on_complete.take() {
                on_complete(Capture {
                    events: std::mem::take(this.buffer),
                    complete: false,
                });
            }
        }
    }
}

/// Wrap `source` so that its events are captured for `on_complete`.
pub fn wrap_live_stream<S, F>(source: S, on_complete: F) -> TeeStream<S>
where
    S: Stream<Item = StreamEvent>,
    F: FnOnce(Capture) + Send + 'static,
{
    TeeStream {
        inner: source,
        buffer: Vec::new(),
        on_complete: Some(Box::new(on_complete)),
    }
}

impl<S> Stream for TeeStream<S>
where
    S: Stream<Item = StreamEvent>,
{
    type Item = StreamEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();
        if this.on_complete.is_none() {
            // Capture already delivered; anything after the terminal event
            // is forwarded untouched.
            return this.inner.poll_next(cx);
        }

        match ready!(this.inner.poll_next(cx)) {
            Some(event) => {
                this.buffer.push(event.clone());
                if event.is_terminal() {
                    if let Some(on_complete) = this.on_complete.take() {
                        on_complete(Capture {
                            events: std::mem::take(this.buffer),
                            complete: true,
                        });
                    }
                }
                Poll::Ready(Some(event))
            }
            None => {
                if let Some(on_complete) = this.on_complete.take() {
                    on_complete(Capture {
                        events: std::mem::take(this.buffer),
                        complete: false,
                    });
                }
                Poll::Ready(None)
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use futures_util::{StreamExt, stream};

    use super::*;
    use crate::types::FinishReason;

    fn sink() -> (Arc<Mutex<Vec<Capture>>>, impl FnOnce(Capture) + Send + 'static) {
        let captures = Arc::new(Mutex::new(Vec::new()));
        let captured = captures.clone();
        (captures, move |c| captured.lock().unwrap().push(c))
    }

    #[tokio::test]
    async fn forwards_and_captures_complete_stream() {
        let events = vec![
            StreamEvent::text("a"),
            StreamEvent::text("b"),
            StreamEvent::finish(FinishReason::Stop),
        ];
        let (captures, on_complete) = sink();
        let out: Vec<_> = wrap_live_stream(stream::iter(events.clone()), on_complete)
            .collect()
            .await;

        assert_eq!(out, events);
        let captures = captures.lock().unwrap();
        assert_eq!(captures.len(), 1);
        assert_eq!(captures[0].events, events);
        assert!(captures[0].complete);
    }

    #[tokio::test]
    async fn source_ending_without_terminal_is_incomplete() {
        let (captures, on_complete) = sink();
        let out: Vec<_> = wrap_live_stream(stream::iter(vec![StreamEvent::text("a")]), on_complete)
            .collect()
            .await;

        assert_eq!(out.len(), 1);
        let captures = captures.lock().unwrap();
        assert_eq!(captures.len(), 1);
        assert!(!captures[0].complete);
    }

    #[tokio::test]
    async fn dropping_before_first_poll_reports_empty_capture() {
        let (captures, on_complete) = sink();
        drop(wrap_live_stream(
            stream::iter(vec![StreamEvent::text("a")]),
            on_complete,
        ));

        let captures = captures.lock().unwrap();
        assert_eq!(captures.len(), 1);
        assert!(captures[0].events.is_empty());
        assert!(!captures[0].complete);
    }
}
