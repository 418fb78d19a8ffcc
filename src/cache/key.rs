//! Cache key generation.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt::Write as _;

use crate::types::ChatRequest;

pub const KEY_PREFIX: &str = "cache:exact:";

const FIELD_SEP: char = '\u{1f}';
const MESSAGE_SEP: char = '\u{1e}';
const ABSENT: &str = "-";

/// Store key of a cached response: `cache:exact:<sha256 hex>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Hex digest without the key prefix.
    pub fn digest(&self) -> &str {
        self.0.strip_prefix(KEY_PREFIX).unwrap_or(&self.0)
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

fn push_opt<T: std::fmt::Display>(out: &mut String, value: Option<T>) {
    out.push(FIELD_SEP);
    match value {
        Some(v) => {
            let _ = write!(out, "{}", v);
        }
        None => out.push_str(ABSENT),
    }
}

/// Caller-supplied text as `<byte len>:<text>`, so separators inside the
/// text cannot shift field boundaries.
fn push_text(out: &mut String, text: &str) {
    let _ = write!(out, "{}:", text.len());
    out.push_str(text);
}

/// Deterministic rendering of every field that affects the completion.
///
/// `stream` is not part of the rendering.
pub fn canonical_string(request: &ChatRequest) -> String {
    let mut out = String::with_capacity(64 + request.messages.iter().map(|m| m.content.len() + 16).sum::<usize>());
    push_text(&mut out, &request.model);
    out.push(FIELD_SEP);
    for (i, m) in request.messages.iter().enumerate() {
        if i > 0 {
            out.push(MESSAGE_SEP);
        }
        out.push_str(m.role.as_str());
        out.push(':');
        push_text(&mut out, &m.content);
    }
    push_opt(&mut out, request.temperature);
    push_opt(&mut out, request.max_tokens);
    push_opt(&mut out, request.top_p);
    out
}

/// Exact-match fingerprint of a request.
pub fn fingerprint(request: &ChatRequest) -> CacheKey {
    let mut hasher = Sha256::new();
    hasher.update(canonical_string(request).as_bytes());
    let hash: String = hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect();
    CacheKey(format!("{}{}", KEY_PREFIX, hash))
}
