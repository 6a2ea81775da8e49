//! Reader for the crawl endpoint's `data: <json>` line stream.
//!
//! Only the subset of Server-Sent Events the backend emits is understood:
//! one JSON object per `data:` line. Other lines are ignored.
use std::collections::VecDeque;
use std::pin::Pin;

use bytes::{Bytes, BytesMut};
use client_logging::client_warn;
use futures_util::stream::{self, Stream, StreamExt};
use sitechat_core::ScrapeProgress;

use crate::ClientError;

/// Lazy, finite, non-restartable sequence of crawl progress frames.
pub type ScrapeEventStream = Pin<Box<dyn Stream<Item = Result<ScrapeProgress, ClientError>> + Send>>;

const DEFAULT_STREAM_ERROR: &str = "Scraping failed";

/// Splits incoming bytes on newlines and parses complete `data:` lines.
///
/// Bytes are buffered until a newline arrives, so multi-byte characters split
/// across chunks decode correctly.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: BytesMut,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) -> Vec<ScrapeProgress> {
        self.buffer.extend_from_slice(chunk);
        let mut frames = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line = self.buffer.split_to(pos + 1);
            if let Some(frame) = parse_line(&line[..pos]) {
                frames.push(frame);
            }
        }
        frames
    }

    /// Flushes a trailing line that was not newline-terminated.
    pub fn finish(&mut self) -> Option<ScrapeProgress> {
        if self.buffer.is_empty() {
            return None;
        }
        let line = self.buffer.split();
        parse_line(&line)
    }
}

fn parse_line(raw: &[u8]) -> Option<ScrapeProgress> {
    let line = String::from_utf8_lossy(raw);
    let line = line.trim_end_matches('\r');
    let payload = line.strip_prefix("data:")?.trim_start();
    if payload.is_empty() {
        return None;
    }
    match serde_json::from_str(payload) {
        Ok(frame) => Some(frame),
        Err(err) => {
            client_warn!("Skipping malformed stream frame ({}): {}", err, payload);
            None
        }
    }
}

struct ReaderState {
    body: Pin<Box<dyn Stream<Item = Result<Bytes, ClientError>> + Send>>,
    decoder: FrameDecoder,
    pending: VecDeque<ScrapeProgress>,
    finished: bool,
}

/// Wraps a byte stream into a stream of progress frames.
///
/// A `stage: "error"` frame is yielded as [`ClientError::Stream`] carrying its
/// message, and ends the sequence.
pub fn scrape_events<S>(body: S) -> ScrapeEventStream
where
    S: Stream<Item = Result<Bytes, ClientError>> + Send + 'static,
{
    let state = ReaderState {
        body: Box::pin(body),
        decoder: FrameDecoder::new(),
        pending: VecDeque::new(),
        finished: false,
    };

    Box::pin(stream::unfold(state, |mut state| async move {
        loop {
            if let Some(frame) = state.pending.pop_front() {
                if frame.is_error() {
                    state.finished = true;
                    state.pending.clear();
                    let message = if frame.message.trim().is_empty() {
                        DEFAULT_STREAM_ERROR.to_string()
                    } else {
                        frame.message
                    };
                    return Some((Err(ClientError::Stream(message)), state));
                }
                return Some((Ok(frame), state));
            }
            if state.finished {
                return None;
            }
            match state.body.next().await {
                Some(Ok(chunk)) => {
                    let frames = state.decoder.push(&chunk);
                    state.pending.extend(frames);
                }
                Some(Err(err)) => {
                    state.finished = true;
                    return Some((Err(err), state));
                }
                None => {
                    state.finished = true;
                    let tail = state.decoder.finish();
                    state.pending.extend(tail);
                }
            }
        }
    }))
}
