//! Streaming response handling
//!
//! Ollama streams `/api/generate` as newline-delimited JSON objects
//! `{"response": "...", "done": false}`. Chunks may split lines anywhere, so
//! bytes are buffered until a full line is available.

use std::pin::Pin;

use futures::stream;
use futures::Stream;
use futures::StreamExt;
use serde::Deserialize;

use crate::errors::Result;
use crate::errors::TriageError;

/// Streaming response from the generation service
pub struct StreamingResponse {
    stream: Pin<Box<dyn Stream<Item = Result<String>> + Send>>,
}

#[derive(Debug, Deserialize)]
struct GenerateChunk {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

struct NdjsonState<S> {
    bytes: Pin<Box<S>>,
    buffer: Vec<u8>,
    finished: bool,
}

impl StreamingResponse {
    pub fn new(stream: Pin<Box<dyn Stream<Item = Result<String>> + Send>>) -> Self {
        Self { stream }
    }

    /// Text chunks of an NDJSON `/api/generate` response body
    pub fn from_ndjson(response: reqwest::Response) -> Self {
        Self::from_ndjson_bytes(response.bytes_stream())
    }

    /// Text chunks of any NDJSON byte stream; stops after `done: true`
    pub fn from_ndjson_bytes<S, B, E>(bytes: S) -> Self
    where
        S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
        B: AsRef<[u8]> + Send + 'static,
        E: std::fmt::Display + Send + 'static,
    {
        let state = NdjsonState {
            bytes: Box::pin(bytes),
            buffer: Vec::new(),
            finished: false,
        };

        let chunks = stream::unfold(state, |mut state| async move {
            loop {
                if state.finished {
                    return None;
                }

                if let Some(pos) = state.buffer.iter().position(|b| *b == b'\n') {
                    let line: Vec<u8> = state.buffer.drain(..=pos).collect();
                    match parse_line(&line) {
                        Ok(None) => continue,
                        Ok(Some(chunk)) => {
                            state.finished = chunk.done;
                            return Some((Ok(chunk.response), state));
                        }
                        Err(e) => {
                            state.finished = true;
                            return Some((Err(e), state));
                        }
                    }
                }

                match state.bytes.next().await {
                    Some(Ok(bytes)) => state.buffer.extend_from_slice(bytes.as_ref()),
                    Some(Err(e)) => {
                        state.finished = true;
                        return Some((Err(TriageError::HttpError(e.to_string())), state));
                    }
                    None => {
                        // last line may lack a trailing newline
                        state.finished = true;
                        let line = std::mem::take(&mut state.buffer);
                        return match parse_line(&line) {
                            Ok(None) => None,
                            Ok(Some(chunk)) => Some((Ok(chunk.response), state)),
                            Err(e) => Some((Err(e), state)),
                        };
                    }
                }
            }
        });

        Self::new(Box::pin(chunks))
    }

    /// Collect all chunks into a single string
    pub async fn collect_all(mut self) -> Result<String> {
        let mut result = String::new();
        while let Some(chunk) = self.stream.next().await {
            result.push_str(&chunk?);
        }
        Ok(result)
    }
}

fn parse_line(line: &[u8]) -> Result<Option<GenerateChunk>> {
    if line.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    let chunk: GenerateChunk = serde_json::from_slice(line)?;
    if let Some(error) = chunk.error {
        return Err(TriageError::HttpError(format!("generation stream error: {error}")));
    }
    Ok(Some(chunk))
}
