use crate::{ChatCompletionChunk, CompletionError};
use bytes::Bytes;
use futures_util::Stream;
use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};
use tracing::warn;

/// Represents a single SSE event with both raw bytes and parsed content
#[derive(Debug, Clone)]
pub struct SSEEvent {
    /// The raw bytes of this SSE event (including "data: " prefix and newline)
    pub raw_bytes: Bytes,
    /// The parsed chunk
    pub chunk: ChatCompletionChunk,
}

/// SSE (Server-Sent Events) stream parser that buffers incomplete events
/// across HTTP chunks
pub struct SSEParser<S> {
    inner: S,
    buffer: Vec<u8>,
    pending: VecDeque<Result<SSEEvent, CompletionError>>,
    done: bool,
}

impl<S, E> SSEParser<S>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: std::fmt::Display,
{
    pub fn new(stream: S) -> Self {
        Self {
            inner: stream,
            buffer: Vec::new(),
            pending: VecDeque::new(),
            done: false,
        }
    }

    fn parse_data(data: &str) -> Result<Option<ChatCompletionChunk>, CompletionError> {
        // End-of-stream marker
        if data == "[DONE]" {
            return Ok(None);
        }

        serde_json::from_str::<ChatCompletionChunk>(data)
            .map(Some)
            .map_err(|e| {
                warn!("Failed to parse SSE chat chunk: {}", e);
                CompletionError::InvalidResponse(format!("Invalid JSON in SSE event: {e}"))
            })
    }

    /// Move every complete line in the buffer into the pending queue
    fn drain_lines(&mut self) {
        while let Some(newline_pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=newline_pos).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim();

            // Skip empty lines and comments
            if line.is_empty() || line.starts_with(':') {
                continue;
            }

            if let Some(data) = line.strip_prefix("data:") {
                match Self::parse_data(data.trim_start()) {
                    Ok(Some(chunk)) => self.pending.push_back(Ok(SSEEvent {
                        raw_bytes: Bytes::from(raw),
                        chunk,
                    })),
                    Ok(None) => self.done = true,
                    Err(e) => self.pending.push_back(Err(e)),
                }
            }
        }
    }
}

impl<S, E> Stream for SSEParser<S>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: std::fmt::Display,
{
    type Item = Result<SSEEvent, CompletionError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Poll::Ready(Some(event));
            }
            if self.done {
                return Poll::Ready(None);
            }

            match Pin::new(&mut self.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => {
                    self.buffer.extend_from_slice(&bytes);
                    self.drain_lines();
                }
                Poll::Ready(Some(Err(e))) => {
                    self.done = true;
                    return Poll::Ready(Some(Err(CompletionError::CompletionError(
                        e.to_string(),
                    ))));
                }
                Poll::Ready(None) => {
                    // A final event without trailing newline is still an event
                    if !self.buffer.is_empty() {
                        self.buffer.push(b'\n');
                        self.drain_lines();
                    }
                    self.done = true;
                    if let Some(event) = self.pending.pop_front() {
                        return Poll::Ready(Some(event));
                    }
                    return Poll::Ready(None);
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::{stream, StreamExt};

    fn chunk_line(content: &str) -> String {
        format!(
            "data: {{\"id\":\"c\",\"object\":\"chat.completion.chunk\",\"created\":0,\"model\":\"m\",\"choices\":[{{\"index\":0,\"delta\":{{\"content\":\"{content}\"}}}}]}}\n\n"
        )
    }

    fn contents(events: Vec<Result<SSEEvent, CompletionError>>) -> Vec<String> {
        events
            .into_iter()
            .map(|e| {
                e.unwrap().chunk.choices[0]
                    .delta
                    .as_ref()
                    .and_then(|d| d.content.clone())
                    .unwrap_or_default()
            })
            .collect()
    }

    #[tokio::test]
    async fn test_multiple_events_in_one_read() {
        let body = format!("{}{}data: [DONE]\n\n", chunk_line("Hel"), chunk_line("lo"));
        let inner = stream::iter(vec![Ok::<_, std::io::Error>(Bytes::from(body))]);

        let events: Vec<_> = SSEParser::new(inner).collect().await;
        assert_eq!(contents(events), vec!["Hel", "lo"]);
    }

    #[tokio::test]
    async fn test_event_split_across_reads() {
        let line = chunk_line("split");
        let (a, b) = line.split_at(17);
        let inner = stream::iter(vec![
            Ok::<_, std::io::Error>(Bytes::from(a.to_string())),
            Ok(Bytes::from(b.to_string())),
        ]);

        let events: Vec<_> = SSEParser::new(inner).collect().await;
        assert_eq!(contents(events), vec!["split"]);
    }

    #[tokio::test]
    async fn test_comments_skipped_and_done_stops_stream() {
        let body = format!(": keep-alive\n{}data: [DONE]\n\n{}", chunk_line("a"), chunk_line("b"));
        let inner = stream::iter(vec![Ok::<_, std::io::Error>(Bytes::from(body))]);

        let events: Vec<_> = SSEParser::new(inner).collect().await;
        assert_eq!(contents(events), vec!["a"]);
    }

    #[tokio::test]
    async fn test_malformed_json_surfaces_error() {
        let inner = stream::iter(vec![Ok::<_, std::io::Error>(Bytes::from(
            "data: {not json}\n\n",
        ))]);

        let events: Vec<_> = SSEParser::new(inner).collect().await;
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], Err(CompletionError::InvalidResponse(_))));
    }

    #[tokio::test]
    async fn test_transport_error_ends_stream() {
        let inner = stream::iter(vec![
            Ok(Bytes::from(chunk_line("x"))),
            Err(std::io::Error::other("connection reset")),
            Ok(Bytes::from(chunk_line("never"))),
        ]);

        let events: Vec<_> = SSEParser::new(inner).collect().await;
        assert_eq!(events.len(), 2);
        assert!(events[0].is_ok());
        assert!(matches!(events[1], Err(CompletionError::CompletionError(_))));
    }
}
