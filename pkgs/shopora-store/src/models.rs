//! Chat records kept by the store

use serde::{Deserialize, Serialize};
use std::fmt;

/// Prefix of every persisted conversation key
pub const STORAGE_KEY_PREFIX: &str = "chat_";

/// Address identifying a chat participant (an email in practice)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Key under which this identity's conversation is persisted
    pub fn storage_key(&self) -> String {
        format!("{}{}", STORAGE_KEY_PREFIX, self.0)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Identity {
    fn from(address: &str) -> Self {
        Self::new(address)
    }
}

impl From<String> for Identity {
    fn from(address: String) -> Self {
        Self(address)
    }
}

/// A single chat line as stored on the device
///
/// `timestamp` is the arrival time in milliseconds since epoch. Zero means
/// the message has not been stamped yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub from: String,
    pub to: String,
    #[serde(rename = "message")]
    pub body: String,
    #[serde(default)]
    pub timestamp: i64,
}

impl ChatMessage {
    pub fn new(
        from: impl Into<String>,
        to: impl Into<String>,
        body: impl Into<String>,
        timestamp: i64,
    ) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            body: body.into(),
            timestamp,
        }
    }

    pub fn is_stamped(&self) -> bool {
        self.timestamp > 0
    }

    pub fn is_from(&self, address: &str) -> bool {
        self.from == address
    }

    /// True once the message is older than `retention_ms` at `now_ms`
    pub fn is_expired(&self, now_ms: i64, retention_ms: i64) -> bool {
        now_ms.saturating_sub(self.timestamp) > retention_ms
    }
}

/// In-memory conversation for one identity, oldest message first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationHistory {
    identity: Identity,
    messages: Vec<ChatMessage>,
}

impl ConversationHistory {
    pub fn new(identity: Identity) -> Self {
        Self {
            identity,
            messages: Vec::new(),
        }
    }

    pub(crate) fn with_messages(identity: Identity, messages: Vec<ChatMessage>) -> Self {
        Self { identity, messages }
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }

    pub(crate) fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    pub(crate) fn retain_unexpired(&mut self, now_ms: i64, retention_ms: i64) {
        self.messages.retain(|m| !m.is_expired(now_ms, retention_ms));
    }
}
