//! Server-sent events framing for response streams
//!
//! The streaming chat endpoint answers with `text/event-stream`. Each SSE
//! event carries one JSON stream event in its `data:` field(s). This module
//! splits the raw byte stream into SSE events and forwards the decoded
//! [`StreamEvent`]s over a channel, in arrival order.
//!
//! SSE field processing:
//!
//! - `data:` -- joined with `\n` when repeated, then decoded as a stream event.
//! - `event: ping` or `data: [PING]` (case-insensitive) -- discarded.
//! - `id:`, `retry:` and `:` comment lines -- ignored.

use bytes::Bytes;
use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::{DocuchatError, Result};
use crate::stream::StreamEvent;

/// Reads `byte_stream` until a terminal event, an error, or `abort` fires
///
/// Every decoded event is sent to `events_tx`. A read error, or the body
/// ending before `done`/`error`, is forwarded as an `Err` so the consumer sees
/// a transport failure. When `abort` is cancelled the function returns without
/// sending anything further.
///
/// # Arguments
///
/// * `byte_stream` - The raw HTTP response body as a stream of byte chunks.
/// * `events_tx` - Channel receiving decoded events.
/// * `abort` - Cancelled when the consumer no longer wants this stream.
pub async fn forward_sse_events<S>(
    byte_stream: S,
    events_tx: mpsc::UnboundedSender<Result<StreamEvent>>,
    abort: CancellationToken,
) where
    S: Stream<Item = reqwest::Result<Bytes>>,
{
    // Raw bytes are buffered so multi-byte characters split across chunks
    // decode correctly.
    let mut buffer: Vec<u8> = Vec::new();

    tokio::pin!(byte_stream);

    loop {
        let chunk = tokio::select! {
            _ = abort.cancelled() => {
                tracing::debug!("SSE read aborted");
                return;
            }
            chunk = byte_stream.next() => chunk,
        };

        let chunk = match chunk {
            Some(Ok(c)) => c,
            Some(Err(e)) => {
                let _ = events_tx.send(Err(DocuchatError::Stream(format!(
                    "connection lost: {}",
                    e
                ))
                .into()));
                return;
            }
            None => break,
        };

        buffer.extend_from_slice(&chunk);

        while let Some((end, delimiter_len)) = find_event_boundary(&buffer) {
            let block: Vec<u8> = buffer.drain(..end + delimiter_len).collect();
            let block = String::from_utf8_lossy(&block[..end]);
            if let Some(event) = decode_event_block(&block) {
                let terminal = event.is_terminal();
                if events_tx.send(Ok(event)).is_err() || terminal {
                    return;
                }
            }
        }
    }

    // Process any remaining partial event in the buffer.
    if !buffer.is_empty() {
        let block = String::from_utf8_lossy(&buffer);
        if let Some(event) = decode_event_block(&block) {
            let terminal = event.is_terminal();
            let _ = events_tx.send(Ok(event));
            if terminal {
                return;
            }
        }
    }

    let _ = events_tx.send(Err(DocuchatError::Stream(
        "response stream ended before completion".to_string(),
    )
    .into()));
}

/// Position and length of the first blank-line delimiter (`\n\n` or `\r\n\r\n`)
fn find_event_boundary(buffer: &[u8]) -> Option<(usize, usize)> {
    let lf = find_subslice(buffer, b"\n\n").map(|pos| (pos, 2));
    let crlf = find_subslice(buffer, b"\r\n\r\n").map(|pos| (pos, 4));
    match (lf, crlf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    }
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Decodes one SSE event block into a stream event
///
/// Returns `None` for pings, comment-only blocks and malformed payloads.
pub fn decode_event_block(block: &str) -> Option<StreamEvent> {
    let mut data_lines: Vec<&str> = Vec::new();
    let mut event_type: Option<&str> = None;

    for line in block.lines() {
        if let Some(value) = line.strip_prefix("data:") {
            data_lines.push(value.trim());
        } else if let Some(value) = line.strip_prefix("event:") {
            event_type = Some(value.trim());
        }
        // `id:`, `retry:` and `:` comments carry nothing for this client.
    }

    if event_type.is_some_and(|et| et.eq_ignore_ascii_case("ping")) {
        return None;
    }

    let data = data_lines.join("\n");
    if data.is_empty() || data.eq_ignore_ascii_case("[ping]") {
        return None;
    }

    StreamEvent::parse(&data)
}
