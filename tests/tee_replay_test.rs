//! Tests for live-stream capture and replay.

use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

use futures_util::{Stream, StreamExt, stream};
use muninn::stream::{Capture, replay, wrap_live_stream};
use muninn::types::{FinishReason, StreamError, StreamEvent};
use tokio::time::Instant;

/// Source that counts how many events were pulled from it.
struct CountingSource {
    events: std::vec::IntoIter<StreamEvent>,
    pulled: Arc<AtomicUsize>,
}

impl CountingSource {
    fn new(events: Vec<StreamEvent>) -> (Self, Arc<AtomicUsize>) {
        let pulled = Arc::new(AtomicUsize::new(0));
        (
            Self {
                events: events.into_iter(),
                pulled: pulled.clone(),
            },
            pulled,
        )
    }
}

impl Stream for CountingSource {
    type Item = StreamEvent;

    fn poll_next(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<StreamEvent>> {
        let next = self.events.next();
        if next.is_some() {
            self.pulled.fetch_add(1, Ordering::SeqCst);
        }
        Poll::Ready(next)
    }
}

fn five_events() -> Vec<StreamEvent> {
    vec![
        StreamEvent::text("one "),
        StreamEvent::text("two "),
        StreamEvent::text("three "),
        StreamEvent::text("four"),
        StreamEvent::finish(FinishReason::Stop),
    ]
}

type Captures = Arc<Mutex<Vec<Capture>>>;

fn recorder() -> (Captures, impl FnOnce(Capture) + Send + 'static) {
    let captures: Captures = Arc::default();
    let sink = captures.clone();
    (captures, move |capture| sink.lock().unwrap().push(capture))
}

fn joined_text(events: &[StreamEvent]) -> String {
    events.iter().filter_map(StreamEvent::as_text).collect()
}

// =========================================================================
// Tee
// =========================================================================

#[tokio::test]
async fn full_consumption_captures_everything_once() {
    let (source, _) = CountingSource::new(five_events());
    let (captures, on_complete) = recorder();

    let forwarded: Vec<_> = wrap_live_stream(source, on_complete).collect().await;

    assert_eq!(forwarded, five_events());
    let captures = captures.lock().unwrap();
    assert_eq!(captures.len(), 1);
    assert_eq!(captures[0].events, five_events());
    assert!(captures[0].complete);
}

#[tokio::test]
async fn abandoning_after_two_events_captures_exactly_two() {
    let (source, pulled) = CountingSource::new(five_events());
    let (captures, on_complete) = recorder();

    let mut tee = wrap_live_stream(source, on_complete);
    let first = tee.next().await.unwrap();
    let second = tee.next().await.unwrap();
    drop(tee);

    assert_eq!(pulled.load(Ordering::SeqCst), 2, "no events pulled after drop");
    let captures = captures.lock().unwrap();
    assert_eq!(captures.len(), 1);
    assert_eq!(captures[0].events, vec![first, second]);
    assert!(!captures[0].complete);
}

#[tokio::test]
async fn dropping_before_first_poll_reports_empty_capture() {
    let (source, pulled) = CountingSource::new(five_events());
    let (captures, on_complete) = recorder();

    drop(wrap_live_stream(source, on_complete));

    assert_eq!(pulled.load(Ordering::SeqCst), 0);
    let captures = captures.lock().unwrap();
    assert_eq!(captures.len(), 1);
    assert!(captures[0].events.is_empty());
}

#[tokio::test]
async fn error_event_completes_capture() {
    let events = vec![
        StreamEvent::text("partial"),
        StreamEvent::Error(StreamError::new("upstream closed")),
    ];
    let (captures, on_complete) = recorder();

    let forwarded: Vec<_> = wrap_live_stream(stream::iter(events.clone()), on_complete)
        .collect()
        .await;

    assert_eq!(forwarded, events);
    let captures = captures.lock().unwrap();
    assert_eq!(captures.len(), 1);
    assert!(captures[0].complete);
    assert!(captures[0].ends_in_error());
}

#[tokio::test]
async fn source_ending_without_terminal_is_incomplete() {
    let events = vec![StreamEvent::text("a"), StreamEvent::text("b")];
    let (captures, on_complete) = recorder();

    let _: Vec<_> = wrap_live_stream(stream::iter(events.clone()), on_complete)
        .collect()
        .await;

    let captures = captures.lock().unwrap();
    assert_eq!(captures.len(), 1);
    assert_eq!(captures[0].events, events);
    assert!(!captures[0].complete);
}

// =========================================================================
// Replay
// =========================================================================

#[tokio::test]
async fn replay_reproduces_captured_text_byte_for_byte() {
    let live = vec![
        StreamEvent::text("héllo "),
        StreamEvent::text("wörld 🌍"),
        StreamEvent::text(""),
        StreamEvent::finish(FinishReason::Stop),
    ];
    let (captures, on_complete) = recorder();
    let forwarded: Vec<_> = wrap_live_stream(stream::iter(live.clone()), on_complete)
        .collect()
        .await;

    let capture = captures.lock().unwrap().pop().unwrap();
    let replayed: Vec<_> = replay(capture.events, Duration::ZERO, Duration::ZERO)
        .collect()
        .await;

    assert_eq!(joined_text(&replayed), joined_text(&forwarded));
    assert_eq!(replayed, live);
}

#[tokio::test(start_paused = true)]
async fn replay_honours_initial_and_chunk_delays() {
    let start = Instant::now();
    let mut replayed = replay(
        five_events(),
        Duration::from_millis(100),
        Duration::from_millis(10),
    );

    replayed.next().await.unwrap();
    assert_eq!(start.elapsed(), Duration::from_millis(100));

    while replayed.next().await.is_some() {}
    assert_eq!(start.elapsed(), Duration::from_millis(140));
}

#[tokio::test]
async fn replay_of_empty_capture_ends_immediately() {
    let replayed: Vec<_> = replay(Vec::new(), Duration::ZERO, Duration::ZERO)
        .collect()
        .await;
    assert!(replayed.is_empty());
}
