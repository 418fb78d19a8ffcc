//! Streaming events: the canonical delta chunk every provider stream is normalized into.

use serde::{Deserialize, Serialize};

use super::message::MessageRole;
use super::response::Usage;

/// Role/content increment carried by a streamed choice.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Delta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<MessageRole>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamChoice {
    #[serde(default)]
    pub index: u32,
    #[serde(default)]
    pub delta: Delta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

/// One incremental unit of a streamed completion.
///
/// `usage` is only set on the chunk where the upstream protocol reports it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeltaChunk {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default = "default_object")]
    pub object: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default)]
    pub choices: Vec<StreamChoice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

fn default_object() -> String {
    "chat.completion.chunk".to_string()
}

impl DeltaChunk {
    pub fn new(choices: Vec<StreamChoice>) -> Self {
        Self {
            id: None,
            object: default_object(),
            created: None,
            model: None,
            choices,
            usage: None,
        }
    }

    /// Role-only chunk, emitted when a protocol announces the message separately.
    pub fn role(role: MessageRole) -> Self {
        Self::new(vec![StreamChoice {
            index: 0,
            delta: Delta {
                role: Some(role),
                content: None,
            },
            finish_reason: None,
        }])
    }

    /// Content-only chunk.
    pub fn content(text: impl Into<String>) -> Self {
        Self::new(vec![StreamChoice {
            index: 0,
            delta: Delta {
                role: None,
                content: Some(text.into()),
            },
            finish_reason: None,
        }])
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = Some(usage);
        self
    }

    /// Concatenated content across choices.
    pub fn text(&self) -> String {
        self.choices
            .iter()
            .filter_map(|c| c.delta.content.as_deref())
            .collect()
    }
}

/// Item of a normalized provider stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Chunk(DeltaChunk),
    /// Terminal sentinel; rendered as `data: [DONE]` on the wire.
    Done,
}

impl StreamEvent {
    pub fn as_chunk(&self) -> Option<&DeltaChunk> {
        match self {
            StreamEvent::Chunk(c) => Some(c),
            StreamEvent::Done => None,
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, StreamEvent::Done)
    }
}
