//! LLM provider abstraction.
//!
//! - [`openai`]: OpenAI-compatible streaming chat completions client
//!
//! The relay only needs one capability from a provider: open a streaming
//! completion for a model and an ordered message list, and yield text deltas
//! as they are generated.

pub mod openai;

use std::fmt;
use std::pin::Pin;

use async_trait::async_trait;
use futures::stream::Stream;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while opening or consuming a provider stream.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("provider request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("provider returned {status}: {message}")]
    Status { status: StatusCode, message: String },

    #[error("malformed stream chunk: {0}")]
    Malformed(String),

    #[error("provider error: {0}")]
    Upstream(String),
}

/// Author of a chat message.
///
/// History entries may carry any role string; unknown roles are forwarded
/// to the provider untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Role {
    Developer,
    User,
    Other(String),
}

impl Role {
    pub fn as_str(&self) -> &str {
        match self {
            Role::Developer => "developer",
            Role::User => "user",
            Role::Other(role) => role,
        }
    }
}

impl From<String> for Role {
    fn from(role: String) -> Self {
        match role.as_str() {
            "developer" => Role::Developer,
            "user" => Role::User,
            _ => Role::Other(role),
        }
    }
}

impl From<Role> for String {
    fn from(role: Role) -> Self {
        match role {
            Role::Other(role) => role,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single conversational turn sent to the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn developer(content: impl Into<String>) -> Self {
        Self {
            role: Role::Developer,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Assemble the conversation: developer instruction first, prior history in
/// its original order, and the current user message last.
pub fn build_messages(
    developer_message: &str,
    history: Vec<ChatMessage>,
    user_message: &str,
) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(ChatMessage::developer(developer_message));
    messages.extend(history);
    messages.push(ChatMessage::user(user_message));
    messages
}

/// One incremental update from the provider.
///
/// Role announcements, finish markers and usage reports arrive as deltas
/// without content.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Delta {
    pub content: Option<String>,
}

impl Delta {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
        }
    }

    /// The delta's text, if it carries any.
    pub fn into_text(self) -> Option<String> {
        self.content.filter(|text| !text.is_empty())
    }
}

/// Deltas in provider order. Dropping the stream releases the connection.
pub type DeltaStream = Pin<Box<dyn Stream<Item = Result<Delta, ProviderError>> + Send>>;

/// A chat completion backend that streams its output.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Open a streaming completion.
    ///
    /// Errors returned here happen before any output exists (connection,
    /// authentication, bad model). Errors during generation are items of the
    /// returned stream.
    async fn stream(
        &self,
        model: &str,
        messages: &[ChatMessage],
    ) -> Result<DeltaStream, ProviderError>;
}
