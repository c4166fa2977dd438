//! text/event-stream framing and a reqwest-backed push connector.

use crate::error::{Error, Result};
use async_trait::async_trait;
use bytes::{Buf, BytesMut};
use futures::stream::{self, BoxStream, StreamExt};
use tracing::debug;

/// Message payloads received from one push-channel connection
pub type PushStream = BoxStream<'static, Result<String>>;

/// Opens push-channel connections for a realtime subscription
#[async_trait]
pub trait PushConnector: Send + Sync {
    async fn connect(&self) -> Result<PushStream>;
}

/// Renders a payload as one SSE `data:` frame.
#[must_use]
pub fn encode_frame(payload: &str) -> String {
    let mut frame = String::with_capacity(payload.len() + 8);
    for line in payload.lines() {
        frame.push_str("data: ");
        frame.push_str(line);
        frame.push('\n');
    }
    frame.push('\n');
    frame
}

/// Incremental decoder yielding the `data` payload of each complete event
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: BytesMut,
}

impl SseDecoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds a chunk and returns every event completed by it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();

        while let Some((end, separator)) = find_event_end(&self.buffer) {
            let raw = self.buffer.split_to(end);
            self.buffer.advance(separator);
            if let Some(data) = event_data(&String::from_utf8_lossy(&raw)) {
                events.push(data);
            }
        }
        events
    }
}

fn find_event_end(buffer: &[u8]) -> Option<(usize, usize)> {
    let lf = buffer.windows(2).position(|w| w == b"\n\n").map(|i| (i, 2));
    let crlf = buffer.windows(4).position(|w| w == b"\r\n\r\n").map(|i| (i, 4));
    match (lf, crlf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    }
}

/// Joins the `data:` lines of one event; comments and other fields are skipped.
fn event_data(raw: &str) -> Option<String> {
    let lines: Vec<&str> = raw
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|data| data.strip_prefix(' ').unwrap_or(data))
        .collect();
    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n"))
    }
}

/// Connects to an SSE endpoint over HTTP
#[derive(Debug, Clone)]
pub struct SseConnector {
    client: reqwest::Client,
    url: String,
}

impl SseConnector {
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), url)
    }

    #[must_use]
    pub fn with_client(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl PushConnector for SseConnector {
    async fn connect(&self) -> Result<PushStream> {
        debug!("🔌 Opening push channel {}", self.url);
        let response = self
            .client
            .get(&self.url)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Transport {
                status: status.as_u16(),
                url: self.url.clone(),
            });
        }

        let mut decoder = SseDecoder::new();
        let messages = response
            .bytes_stream()
            .map(move |chunk| match chunk {
                Ok(bytes) => decoder.push(&bytes).into_iter().map(Ok).collect::<Vec<_>>(),
                Err(e) => vec![Err(Error::from(e))],
            })
            .flat_map(stream::iter);
        Ok(messages.boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decoder_handles_split_chunks() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: {\"type\":\"conn").is_empty());
        let events = decoder.push(b"ected\"}\n\n: keepalive\n\ndata: a\r\ndata: b\r\n\r\n");
        assert_eq!(events, vec![r#"{"type":"connected"}"#.to_string(), "a\nb".to_string()]);
    }

    #[test]
    fn test_encode_frame_round_trips_through_decoder() {
        let frame = encode_frame("{\"componentId\":\"x\"}");
        assert_eq!(frame, "data: {\"componentId\":\"x\"}\n\n");
        let mut decoder = SseDecoder::new();
        assert_eq!(decoder.push(frame.as_bytes()), vec!["{\"componentId\":\"x\"}".to_string()]);
    }
}
