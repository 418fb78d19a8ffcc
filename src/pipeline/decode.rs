//! Streaming decoder (Bytes -> SSE `data:` payloads)
//!
//! Framing only: provider semantics live in each driver's `normalize_event`.

use crate::BoxStream;
use bytes::Bytes;
use futures::{stream, StreamExt};

/// Extracts the payload of an SSE `data:` line.
///
/// `event:` lines, comments, blank lines and anything else yield `None`.
pub fn data_payload(line: &str) -> Option<&str> {
    let line = line.trim_end_matches('\r');
    let rest = line.strip_prefix("data:")?;
    let payload = rest.strip_prefix(' ').unwrap_or(rest).trim();
    if payload.is_empty() {
        None
    } else {
        Some(payload)
    }
}

/// Splits an upstream byte stream into SSE `data:` payloads, in order.
///
/// Bytes are buffered until a full line is available, so multi-byte UTF-8
/// sequences split across network chunks decode correctly. A transport
/// error is forwarded once and ends the stream.
pub fn sse_data_lines(input: BoxStream<'static, Bytes>) -> BoxStream<'static, String> {
    let stream = stream::unfold(
        (input, Vec::<u8>::new(), false),
        |(mut input, mut buf, finished)| async move {
            if finished {
                return None;
            }
            loop {
                if let Some(idx) = buf.iter().position(|b| *b == b'\n') {
                    let line: Vec<u8> = buf.drain(..=idx).collect();
                    let line = String::from_utf8_lossy(&line[..idx]);
                    if let Some(payload) = data_payload(&line) {
                        return Some((Ok(payload.to_string()), (input, buf, false)));
                    }
                    continue;
                }

                match input.next().await {
                    Some(Ok(bytes)) => buf.extend_from_slice(&bytes),
                    Some(Err(e)) => return Some((Err(e), (input, buf, true))),
                    None => {
                        // EOF without trailing newline
                        let tail = String::from_utf8_lossy(&buf).to_string();
                        buf.clear();
                        return data_payload(&tail)
                            .map(|p| (Ok(p.to_string()), (input, buf, true)));
                    }
                }
            }
        },
    );

    Box::pin(stream)
}
