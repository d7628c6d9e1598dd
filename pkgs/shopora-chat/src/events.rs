//! Wire-level chat events

use serde::{Deserialize, Serialize};
use shopora_store::{ChatMessage, Identity};

/// Event name binding a connection to an identity
pub const REGISTER_EVENT: &str = "register";

/// Event name carrying a chat message in either direction
pub const MESSAGE_EVENT: &str = "message";

/// Message payload as it travels over the transport
///
/// The sender may omit `timestamp`; the receiving side stamps arrival time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireMessage {
    pub from: String,
    pub to: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

impl WireMessage {
    /// Convert to a stored message stamped with the local arrival time
    pub fn into_chat_message(self, arrival_ms: i64) -> ChatMessage {
        ChatMessage::new(self.from, self.to, self.message, arrival_ms)
    }
}

impl From<&ChatMessage> for WireMessage {
    fn from(msg: &ChatMessage) -> Self {
        Self {
            from: msg.from.clone(),
            to: msg.to.clone(),
            message: msg.body.clone(),
            timestamp: msg.is_stamped().then_some(msg.timestamp),
        }
    }
}

/// Client to server
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    Register(Identity),
    Message(WireMessage),
}

impl ClientEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::Register(_) => REGISTER_EVENT,
            ClientEvent::Message(_) => MESSAGE_EVENT,
        }
    }
}

/// Server to client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    Message(WireMessage),
    /// Any event this client does not handle
    Other { name: String },
}
