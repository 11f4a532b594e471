//! Replay of captured event sequences.

use std::time::Duration;

use futures_util::stream;

use crate::types::{EventStream, StreamEvent};

/// Re-emit `events` as a fresh stream.
///
/// Waits `initial_delay` before the first event and `chunk_delay` before
/// each later one, so consumers that render incrementally see roughly the
/// cadence of a live call. Zero delays emit without suspending. Dropping
/// the stream drops any pending timer.
pub fn replay(
    events: Vec<StreamEvent>,
    initial_delay: Duration,
    chunk_delay: Duration,
) -> EventStream {
    Box::pin(stream::unfold(
        (events.into_iter(), true),
        move |(mut events, first)| async move {
            let event = events.next()?;
            let delay = if first { initial_delay } else { chunk_delay };
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            Some((event, (events, false)))
        },
    ))
}
