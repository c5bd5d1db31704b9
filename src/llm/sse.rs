//! Server-sent events decoding shared by the streaming providers.
//!
//! Bytes arrive in arbitrary pieces; lines are split on `\n` (a trailing
//! `\r` is dropped) and only `data: ` lines are surfaced. Each provider
//! supplies a parser turning one data payload into a chunk.

use anyhow::{Error, Result};
use futures_util::stream::{self, BoxStream, Stream, StreamExt};
use std::collections::VecDeque;

use super::ChunkStream;
use crate::types::StreamChunk;

/// Parse one `data:` payload. `Ok(None)` means "nothing to report".
pub type DataParser = fn(&str) -> Result<Option<StreamChunk>>;

/// Incremental line splitter for an SSE body.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    /// Feed raw bytes, returning the data payloads of every completed line.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);
        let mut payloads = Vec::new();
        while let Some(newline_pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline_pos).collect();
            if let Some(data) = data_of(&line[..line.len() - 1]) {
                payloads.push(data);
            }
        }
        payloads
    }

    /// Flush a final line that had no trailing newline.
    pub fn finish(&mut self) -> Vec<String> {
        let line = std::mem::take(&mut self.buffer);
        data_of(&line).into_iter().collect()
    }
}

fn data_of(line: &[u8]) -> Option<String> {
    let line = String::from_utf8_lossy(line);
    let line = line.trim_end_matches('\r');
    if line.is_empty() {
        return None;
    }
    line.strip_prefix("data:")
        .map(|d| d.strip_prefix(' ').unwrap_or(d).to_string())
}

struct DecodeState {
    bytes: BoxStream<'static, Result<Vec<u8>>>,
    decoder: SseDecoder,
    pending: VecDeque<Result<StreamChunk>>,
    parse: DataParser,
    finished: bool,
}

impl DecodeState {
    fn enqueue(&mut self, payloads: Vec<String>) {
        for data in payloads {
            if self.finished {
                return;
            }
            match (self.parse)(&data) {
                Ok(Some(StreamChunk::Done)) => {
                    self.pending.push_back(Ok(StreamChunk::Done));
                    self.finished = true;
                }
                Ok(Some(chunk)) => self.pending.push_back(Ok(chunk)),
                Ok(None) => {}
                Err(e) => {
                    self.pending.push_back(Err(e));
                    self.finished = true;
                }
            }
        }
    }
}

/// Turn a byte stream into a chunk stream. The stream ends after `Done`,
/// after the first error, or when the body ends.
pub fn decode_stream<S>(bytes: S, parse: DataParser) -> ChunkStream
where
    S: Stream<Item = Result<Vec<u8>>> + Send + 'static,
{
    let state = DecodeState {
        bytes: bytes.boxed(),
        decoder: SseDecoder::default(),
        pending: VecDeque::new(),
        parse,
        finished: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                return Some((item, state));
            }
            if state.finished {
                return None;
            }
            match state.bytes.next().await {
                Some(Ok(bytes)) => {
                    let payloads = state.decoder.feed(&bytes);
                    state.enqueue(payloads);
                }
                Some(Err(e)) => {
                    state.pending.push_back(Err(e.context("Stream read error")));
                    state.finished = true;
                }
                None => {
                    let payloads = state.decoder.finish();
                    state.enqueue(payloads);
                    state.finished = true;
                }
            }
        }
    })
    .boxed()
}

/// Chunk stream over a successful HTTP response body.
pub fn response_stream(response: reqwest::Response, parse: DataParser) -> ChunkStream {
    let bytes = response
        .bytes_stream()
        .map(|item| item.map(|b| b.to_vec()).map_err(Error::from));
    decode_stream(bytes, parse)
}
