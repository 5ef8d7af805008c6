use std::collections::VecDeque;
use std::marker::PhantomData;
use std::time::Duration;

use llamadeck_core::{LlamaDeckError, Result};
use reqwest::Response;
use serde::de::DeserializeOwned;

use crate::ollama::map_reqwest_error;

const PREVIEW_LEN: usize = 200;

/// Incremental newline-delimited JSON decoder.
///
/// Body chunks may split a record anywhere; bytes are buffered until a newline
/// completes the line. Blank lines are skipped.
#[derive(Debug)]
pub struct NdjsonDecoder<T> {
    buf: Vec<u8>,
    _record: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> NdjsonDecoder<T> {
    pub fn new() -> Self {
        Self {
            buf: Vec::new(),
            _record: PhantomData,
        }
    }

    /// Buffer `chunk` and decode every line it completes.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Result<T>> {
        self.buf.extend_from_slice(chunk);

        let mut records = Vec::new();
        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            if let Some(record) = parse_line(&line) {
                records.push(record);
            }
        }
        records
    }

    /// Decode whatever is left once the body has ended without a final newline.
    pub fn finish(&mut self) -> Option<Result<T>> {
        let rest = std::mem::take(&mut self.buf);
        parse_line(&rest)
    }
}

impl<T: DeserializeOwned> Default for NdjsonDecoder<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Pulls typed records out of a streaming response body.
///
/// Every read is bounded by `idle_timeout`; the first transport failure ends
/// the sequence.
pub(crate) struct RecordReader<T> {
    response: Response,
    decoder: NdjsonDecoder<T>,
    pending: VecDeque<Result<T>>,
    idle_timeout: Duration,
    finished: bool,
}

impl<T: DeserializeOwned> RecordReader<T> {
    pub(crate) fn new(response: Response, idle_timeout: Duration) -> Self {
        Self {
            response,
            decoder: NdjsonDecoder::new(),
            pending: VecDeque::new(),
            idle_timeout,
            finished: false,
        }
    }

    pub(crate) async fn next(&mut self) -> Option<Result<T>> {
        loop {
            if let Some(record) = self.pending.pop_front() {
                return Some(record);
            }
            if self.finished {
                return None;
            }

            match tokio::time::timeout(self.idle_timeout, self.response.chunk()).await {
                Err(_) => {
                    self.finished = true;
                    return Some(Err(LlamaDeckError::Timeout(format!(
                        "no data from server for {}s",
                        self.idle_timeout.as_secs()
                    ))));
                }
                Ok(Err(e)) => {
                    self.finished = true;
                    return Some(Err(map_reqwest_error(e)));
                }
                Ok(Ok(Some(chunk))) => self.pending.extend(self.decoder.feed(&chunk)),
                Ok(Ok(None)) => {
                    self.finished = true;
                    self.pending.extend(self.decoder.finish());
                }
            }
        }
    }
}

fn parse_line<T: DeserializeOwned>(line: &[u8]) -> Option<Result<T>> {
    let text = match std::str::from_utf8(line) {
        Ok(text) => text.trim(),
        Err(e) => return Some(Err(LlamaDeckError::Protocol(format!("record is not UTF-8: {}", e)))),
    };

    if text.is_empty() {
        return None;
    }

    Some(serde_json::from_str(text).map_err(|e| {
        let preview: String = text.chars().take(PREVIEW_LEN).collect();
        LlamaDeckError::Protocol(format!("malformed record '{}': {}", preview, e))
    }))
}
