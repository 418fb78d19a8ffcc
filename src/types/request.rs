//! Unified chat-completion request.

use serde::{Deserialize, Serialize};

use super::message::{Message, MessageRole};
use crate::error::{Error, ErrorContext};

/// A chat-completion request in the gateway's unified (OpenAI-shaped) format.
///
/// Only the failover router rewrites `model`, when it substitutes a fallback
/// model for a retry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(default)]
    pub stream: bool,
}

impl ChatRequest {
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature: None,
            max_tokens: None,
            top_p: None,
            stream: false,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_top_p(mut self, top_p: f32) -> Self {
        self.top_p = Some(top_p);
        self
    }

    pub fn streaming(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    /// Same request aimed at another model.
    pub fn for_model(&self, model: &str) -> Self {
        let mut next = self.clone();
        next.model = model.to_string();
        next
    }

    pub fn has_system_message(&self) -> bool {
        self.messages.iter().any(|m| m.role == MessageRole::System)
    }

    /// Reject requests no provider could serve.
    pub fn validate(&self) -> Result<(), Error> {
        if self.model.trim().is_empty() {
            return Err(Error::validation_with_context(
                "model must not be empty",
                ErrorContext::new().with_field_path("request.model"),
            ));
        }
        if self.messages.is_empty() {
            return Err(Error::validation_with_context(
                "messages must not be empty",
                ErrorContext::new().with_field_path("request.messages"),
            ));
        }
        Ok(())
    }
}
