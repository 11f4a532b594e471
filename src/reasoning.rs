//! Streaming splitter for tag-delimited reasoning text.
//!
//! Some models interleave their reasoning with the answer, wrapped in a tag
//! such as `<think>...</think>`. [`ReasoningParser`] routes text between the
//! tags to the reasoning track and everything else to the content track,
//! one chunk at a time.
//!
//! A tag may be split across chunks (`"<th"` then `"ink>"`). When a chunk
//! ends with something that could still become the tag the parser is
//! waiting for, that suffix is held back until the next chunk settles it.
//! Only two modes exist: nested or repeated opening tags inside reasoning,
//! and closing tags outside it, are plain text. An unterminated tag at end
//! of stream is flushed as text, never an error.

use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::Stream;

use crate::types::{EventStream, StreamEvent};

/// Default reasoning tag name.
pub const DEFAULT_TAG: &str = "think";

/// Which track text is currently routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SplitMode {
    Reasoning,
    #[default]
    Visible,
}

impl SplitMode {
    fn flip(self) -> Self {
        match self {
            SplitMode::Reasoning => SplitMode::Visible,
            SplitMode::Visible => SplitMode::Reasoning,
        }
    }
}

/// A run of text routed to one track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Reasoning(String),
    Content(String),
}

impl Segment {
    fn new(mode: SplitMode, text: &str) -> Self {
        match mode {
            SplitMode::Reasoning => Segment::Reasoning(text.to_owned()),
            SplitMode::Visible => Segment::Content(text.to_owned()),
        }
    }

    pub fn text(&self) -> &str {
        match self {
            Segment::Reasoning(text) | Segment::Content(text) => text,
        }
    }

    fn into_event(self) -> StreamEvent {
        match self {
            Segment::Reasoning(text) => StreamEvent::ReasoningDelta(text),
            Segment::Content(text) => StreamEvent::TextDelta(text),
        }
    }
}

/// Per-stream parser state. Created at stream start, dropped at stream end.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReasoningState {
    /// Track the next text goes to. `Reasoning` means we are inside the tag.
    pub mode: SplitMode,
    /// Held-back suffix that may be the start of the next tag.
    pub pending: String,
}

impl ReasoningState {
    pub fn inside_tag(&self) -> bool {
        self.mode == SplitMode::Reasoning
    }
}

/// Chunk-boundary-safe reasoning/content splitter.
#[derive(Debug, Clone)]
pub struct ReasoningParser {
    open: String,
    close: String,
    state: ReasoningState,
}

impl ReasoningParser {
    /// Parser for `<tag_name>...</tag_name>`.
    ///
    /// With `start_with_reasoning`, text before any opening tag is already
    /// treated as reasoning (for models whose template emits the opening
    /// tag in the prompt).
    pub fn new(tag_name: &str, start_with_reasoning: bool) -> Self {
        let mode = if start_with_reasoning {
            SplitMode::Reasoning
        } else {
            SplitMode::Visible
        };
        Self {
            open: format!("<{tag_name}>"),
            close: format!("</{tag_name}>"),
            state: ReasoningState {
                mode,
                pending: String::new(),
            },
        }
    }

    pub fn state(&self) -> &ReasoningState {
        &self.state
    }

    /// Feed one chunk, returning the segments that are now settled.
    pub fn push(&mut self, chunk: &str) -> Vec<Segment> {
        let mut buffer = std::mem::take(&mut self.state.pending);
        buffer.push_str(chunk);

        let mut segments = Vec::new();
        let mut rest = buffer.as_str();
        loop {
            let tag = match self.state.mode {
                SplitMode::Visible => self.open.as_str(),
                SplitMode::Reasoning => self.close.as_str(),
            };

            if let Some(at) = rest.find(tag) {
                if at > 0 {
                    segments.push(Segment::new(self.state.mode, &rest[..at]));
                }
                self.state.mode = self.state.mode.flip();
                rest = &rest[at + tag.len()..];
                continue;
            }

            let held = partial_tag_suffix(rest, tag);
            let settled = &rest[..rest.len() - held];
            if !settled.is_empty() {
                segments.push(Segment::new(self.state.mode, settled));
            }
            self.state.pending = rest[rest.len() - held..].to_owned();
            return segments;
        }
    }

    /// End of input: release any held-back text literally to the current track.
    pub fn finish(&mut self) -> Option<Segment> {
        let pending = std::mem::take(&mut self.state.pending);
        if pending.is_empty() {
            None
        } else {
            Some(Segment::new(self.state.mode, &pending))
        }
    }

    /// Split a complete text in one go. Returns `(reasoning, content)`.
    ///
    /// Reasoning is `None` when no text was routed to the reasoning track.
    pub fn split_complete(mut self, text: &str) -> (Option<String>, String) {
        let mut reasoning = String::new();
        let mut content = String::new();
        let segments = self.push(text).into_iter().chain(self.finish());
        for segment in segments {
            match segment {
                Segment::Reasoning(text) => reasoning.push_str(&text),
                Segment::Content(text) => content.push_str(&text),
            }
        }
        ((!reasoning.is_empty()).then_some(reasoning), content)
    }
}

/// Length in bytes of the longest proper prefix of `tag` that `text` ends with.
fn partial_tag_suffix(text: &str, tag: &str) -> usize {
    tag.char_indices()
        .skip(1)
        .map(|(len, _)| len)
        .filter(|&len| text.ends_with(&tag[..len]))
        .max()
        .unwrap_or(0)
}

/// Stream adapter that applies a [`ReasoningParser`] to `TextDelta` events.
///
/// Non-text events pass through in their original position; held-back
/// text is flushed before them so ordering is never changed.
pub struct SplitReasoningStream {
    inner: EventStream,
    parser: ReasoningParser,
    ready: VecDeque<StreamEvent>,
    done: bool,
}

impl SplitReasoningStream {
    pub fn new(inner: EventStream, parser: ReasoningParser) -> Self {
        Self {
            inner,
            parser,
            ready: VecDeque::new(),
            done: false,
        }
    }

    fn flush(&mut self) {
        if let Some(segment) = self.parser.finish() {
            self.ready.push_back(segment.into_event());
        }
    }
}

impl Stream for SplitReasoningStream {
    type Item = StreamEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            if let Some(event) = self.ready.pop_front() {
                return Poll::Ready(Some(event));
            }
            if self.done {
                return Poll::Ready(None);
            }

            match self.inner.as_mut().poll_next(cx) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(Some(StreamEvent::TextDelta(text))) => {
                    let segments = self.parser.push(&text);
                    self.ready
                        .extend(segments.into_iter().map(Segment::into_event));
                }
                Poll::Ready(Some(event)) => {
                    self.flush();
                    self.ready.push_back(event);
                }
                Poll::Ready(None) => {
                    self.flush();
                    self.done = true;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(parser: &mut ReasoningParser, chunks: &[&str]) -> (String, String) {
        let mut reasoning = String::new();
        let mut content = String::new();
        let mut segments = Vec::new();
        for chunk in chunks {
            segments.extend(parser.push(chunk));
        }
        segments.extend(parser.finish());
        for segment in segments {
            match segment {
                Segment::Reasoning(t) => reasoning.push_str(&t),
                Segment::Content(t) => content.push_str(&t),
            }
        }
        (reasoning, content)
    }

    #[test]
    fn tag_split_across_chunks() {
        let mut parser = ReasoningParser::new("think", false);
        let (reasoning, content) = run(&mut parser, &["<th", "ink>hello</think>world"]);
        assert_eq!(reasoning, "hello");
        assert_eq!(content, "world");
    }

    #[test]
    fn closing_tag_split_across_chunks() {
        let mut parser = ReasoningParser::new("think", false);
        let (reasoning, content) = run(&mut parser, &["<think>abc</", "thi", "nk>def"]);
        assert_eq!(reasoning, "abc");
        assert_eq!(content, "def");
    }

    #[test]
    fn partial_prefix_is_held_back() {
        let mut parser = ReasoningParser::new("think", false);
        let segments = parser.push("answer <th");
        assert_eq!(segments, vec![Segment::Content("answer ".into())]);
        assert_eq!(parser.state().pending, "<th");
    }

    #[test]
    fn invalidated_prefix_is_released() {
        let mut parser = ReasoningParser::new("think", false);
        let (reasoning, content) = run(&mut parser, &["a <th", "is is text"]);
        assert_eq!(reasoning, "");
        assert_eq!(content, "a <this is text");
    }

    #[test]
    fn start_with_reasoning() {
        let mut parser = ReasoningParser::new("think", true);
        let (reasoning, content) = run(&mut parser, &["pondering", "</think>answer"]);
        assert_eq!(reasoning, "pondering");
        assert_eq!(content, "answer");
    }

    #[test]
    fn unterminated_tag_flushed_literally() {
        let mut parser = ReasoningParser::new("think", false);
        let (reasoning, content) = run(&mut parser, &["done <thi"]);
        assert_eq!(reasoning, "");
        assert_eq!(content, "done <thi");
    }

    #[test]
    fn unclosed_reasoning_stays_reasoning() {
        let mut parser = ReasoningParser::new("think", false);
        let (reasoning, content) = run(&mut parser, &["<think>still going</thi"]);
        assert_eq!(reasoning, "still going</thi");
        assert_eq!(content, "");
    }

    #[test]
    fn mismatched_closing_tag_is_text() {
        let mut parser = ReasoningParser::new("think", false);
        let (reasoning, content) = run(&mut parser, &["a</think>b"]);
        assert_eq!(reasoning, "");
        assert_eq!(content, "a</think>b");
    }

    #[test]
    fn nested_opening_tag_is_text() {
        let mut parser = ReasoningParser::new("think", false);
        let (reasoning, content) = run(&mut parser, &["<think>x<think>y</think>z"]);
        assert_eq!(reasoning, "x<think>y");
        assert_eq!(content, "z");
    }

    #[test]
    fn repeated_blocks_alternate() {
        let mut parser = ReasoningParser::new("think", false);
        let (reasoning, content) = run(&mut parser, &["<think>a</think>b<think>c</think>d"]);
        assert_eq!(reasoning, "ac");
        assert_eq!(content, "bd");
    }

    #[test]
    fn custom_tag_and_multibyte_text() {
        let mut parser = ReasoningParser::new("reason", false);
        let (reasoning, content) = run(&mut parser, &["héllo <rea", "son>ünïcode</reason>ok"]);
        assert_eq!(reasoning, "ünïcode");
        assert_eq!(content, "héllo ok");
    }

    #[test]
    fn every_single_byte_chunking_splits_the_same() {
        let input = "pre<think>inner</think>post";
        let chunks: Vec<String> = input.chars().map(String::from).collect();
        let refs: Vec<&str> = chunks.iter().map(String::as_str).collect();
        let mut parser = ReasoningParser::new("think", false);
        let (reasoning, content) = run(&mut parser, &refs);
        assert_eq!(reasoning, "inner");
        assert_eq!(content, "prepost");
    }

    #[test]
    fn split_complete_without_reasoning() {
        let parser = ReasoningParser::new("think", false);
        assert_eq!(parser.split_complete("plain"), (None, "plain".to_string()));
    }

    #[test]
    fn partial_suffix_lengths() {
        assert_eq!(partial_tag_suffix("abc<", "<think>"), 1);
        assert_eq!(partial_tag_suffix("abc<thin", "<think>"), 5);
        assert_eq!(partial_tag_suffix("abc", "<think>"), 0);
        // full tag is not a *proper* prefix
        assert_eq!(partial_tag_suffix("<think>", "<think>"), 0);
    }
}
