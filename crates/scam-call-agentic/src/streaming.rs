//! Server-sent events decoding for streamed completions
//!
//! All three providers stream as `text/event-stream`; only the JSON payload
//! of each `data:` line differs. Clients pass an extractor that turns one
//! payload into an optional text fragment.

use anyhow::{anyhow, Result};
use futures::StreamExt;
use tokio::sync::mpsc;

use crate::llm_client::{TextStream, STREAM_BUFFER_SIZE};

/// Incremental `data:` line splitter.
///
/// Bytes are buffered until a full line is available so multi-byte
/// characters split across network chunks are decoded intact.
#[derive(Debug, Default)]
pub(crate) struct SseDecoder {
    pending: Vec<u8>,
}

impl SseDecoder {
    /// Feed raw bytes, returning the payload of every completed `data:` line
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);
        let mut payloads = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            let line = line.trim_end_matches(['\n', '\r']);
            if let Some(data) = line.strip_prefix("data:") {
                payloads.push(data.strip_prefix(' ').unwrap_or(data).to_string());
            }
        }
        payloads
    }
}

/// Read an SSE response body on a background task and forward the text
/// fragments produced by `extract` into a [`TextStream`].
///
/// `extract` returns `Ok(None)` for payloads that carry no text and `Err`
/// for provider-reported errors, which end the stream.
pub(crate) fn spawn_sse_reader<F>(response: reqwest::Response, extract: F) -> TextStream
where
    F: Fn(&serde_json::Value) -> Result<Option<String>> + Send + 'static,
{
    let (tx, rx) = mpsc::channel(STREAM_BUFFER_SIZE);

    tokio::spawn(async move {
        let mut body = response.bytes_stream();
        let mut decoder = SseDecoder::default();

        while let Some(chunk) = body.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    let _ = tx.send(Err(anyhow!("stream transport error: {}", e))).await;
                    return;
                }
            };

            for payload in decoder.push(&chunk) {
                if payload.trim() == "[DONE]" {
                    return;
                }
                let value: serde_json::Value = match serde_json::from_str(&payload) {
                    Ok(v) => v,
                    Err(e) => {
                        tracing::debug!("Skipping undecodable stream payload: {}", e);
                        continue;
                    }
                };
                match extract(&value) {
                    Ok(Some(text)) if !text.is_empty() => {
                        // Receiver dropped: nobody is listening any more.
                        if tx.send(Ok(text)).await.is_err() {
                            return;
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        let _ = tx.send(Err(e)).await;
                        return;
                    }
                }
            }
        }
    });

    rx
}
