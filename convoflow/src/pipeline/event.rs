//! Normalized inbound events produced by platform adapters.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A chat message as handed over by a platform adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// The message text.
    pub content: String,
    /// Platform message id.
    pub id: String,
    /// Id of the message this one replies to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replied_to_id: Option<String>,
    /// Platform author handle.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    /// Whether the message carried attachments.
    #[serde(default)]
    pub has_attachments: bool,
}

impl Message {
    /// Creates a plain text message.
    #[must_use]
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            id: id.into(),
            replied_to_id: None,
            author: None,
            has_attachments: false,
        }
    }

    /// Sets the author.
    #[must_use]
    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    /// Marks this message as a reply.
    #[must_use]
    pub fn replying_to(mut self, id: impl Into<String>) -> Self {
        self.replied_to_id = Some(id.into());
        self
    }

    /// Flags attachments.
    #[must_use]
    pub fn with_attachments(mut self) -> Self {
        self.has_attachments = true;
        self
    }

    /// Returns the leading `/command` word, if the message starts with one.
    #[must_use]
    pub fn command(&self) -> Option<&str> {
        let word = self.content.split_whitespace().next()?;
        let name = word.strip_prefix('/')?;
        // Telegram style "/start@my_bot"
        let name = name.split('@').next().unwrap_or(name);
        (!name.is_empty()).then_some(name)
    }
}

/// A button or keyboard press.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyboardResponse {
    /// Platform interaction id.
    pub id: String,
    /// The developer-assigned button id.
    pub custom_id: String,
    /// Opaque platform payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attached_platform_data: Option<serde_json::Value>,
}

impl KeyboardResponse {
    /// Creates a keyboard response.
    #[must_use]
    pub fn new(id: impl Into<String>, custom_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            custom_id: custom_id.into(),
            attached_platform_data: None,
        }
    }

    /// Attaches platform data.
    #[must_use]
    pub fn with_platform_data(mut self, data: serde_json::Value) -> Self {
        self.attached_platform_data = Some(data);
        self
    }
}

/// Any event the engine can process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InboundEvent {
    /// A chat message.
    Message(Message),
    /// A keyboard response.
    Keyboard(KeyboardResponse),
}

impl InboundEvent {
    /// Short name of the event kind.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Message(_) => "message",
            Self::Keyboard(_) => "keyboard",
        }
    }

    /// The platform id of the event.
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Message(m) => &m.id,
            Self::Keyboard(k) => &k.id,
        }
    }

    /// The message, if this is one.
    #[must_use]
    pub fn as_message(&self) -> Option<&Message> {
        match self {
            Self::Message(m) => Some(m),
            Self::Keyboard(_) => None,
        }
    }

    /// The keyboard response, if this is one.
    #[must_use]
    pub fn as_keyboard(&self) -> Option<&KeyboardResponse> {
        match self {
            Self::Keyboard(k) => Some(k),
            Self::Message(_) => None,
        }
    }
}

impl From<Message> for InboundEvent {
    fn from(message: Message) -> Self {
        Self::Message(message)
    }
}

impl From<KeyboardResponse> for InboundEvent {
    fn from(response: KeyboardResponse) -> Self {
        Self::Keyboard(response)
    }
}

impl fmt::Display for InboundEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind(), self.id())
    }
}
