//! 流式归一化模块：把三种提供商的增量协议转换为统一的增量块序列。
//!
//! # Streaming Normalizer
//!
//! ```text
//! Raw Bytes → decode::sse_data_lines → driver normalize_event → StreamEvent
//!     │                 │                        │
//!   HTTP          `data:` payloads       Chunk / skip / Done
//! ```
//!
//! Every provider stream ends with exactly one [`StreamEvent::Done`] on a
//! clean end of input, whether the upstream sent its own terminator or just
//! closed the connection. A transport failure surfaces as one `Err` item and
//! ends the stream without `Done`.
//!
//! Streams are lazy: dropping one drops the upstream response body, which
//! aborts the read.

pub mod decode;

use crate::drivers::ProviderId;
use crate::types::StreamEvent;
use crate::{BoxStream, Result};
use futures::{stream, StreamExt};

/// Normalized provider stream.
pub type DeltaStream = BoxStream<'static, StreamEvent>;

/// Per-protocol translation of one `data:` payload.
///
/// `Ok(None)` means the event carries nothing for the client; `Err` marks a
/// malformed payload, which is skipped.
pub type EventNormalizer = fn(&str) -> Result<Option<StreamEvent>>;

/// Composes framing and per-protocol translation into a [`DeltaStream`].
pub fn normalize(
    input: BoxStream<'static, bytes::Bytes>,
    provider: ProviderId,
    normalizer: EventNormalizer,
) -> DeltaStream {
    let lines = decode::sse_data_lines(input);
    let stream = stream::unfold((lines, false), move |(mut lines, finished)| async move {
        if finished {
            return None;
        }
        loop {
            match lines.next().await {
                Some(Ok(payload)) => match normalizer(&payload) {
                    Ok(Some(StreamEvent::Done)) => {
                        return Some((Ok(StreamEvent::Done), (lines, true)));
                    }
                    Ok(Some(event)) => return Some((Ok(event), (lines, false))),
                    Ok(None) => continue,
                    Err(e) => {
                        tracing::debug!(provider = %provider, error = %e, "skipping malformed stream event");
                        continue;
                    }
                },
                Some(Err(e)) => {
                    tracing::warn!(provider = %provider, error = %e, "upstream stream read failed");
                    return Some((Err(e), (lines, true)));
                }
                None => return Some((Ok(StreamEvent::Done), (lines, true))),
            }
        }
    });
    Box::pin(stream)
}
