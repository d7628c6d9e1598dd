//! Socket.IO v4 text framing over Engine.IO v4
//!
//! Engine.IO packets are a one-digit type followed by a payload. A `4`
//! (message) packet carries a Socket.IO packet, itself a one-digit type,
//! an optional `/namespace,` prefix, an optional ack id and a JSON body:
//!
//! ```text
//! 0{"sid":"..","pingInterval":25000,"pingTimeout":20000}   engine open
//! 2 / 3                                                     ping / pong
//! 40                                                        namespace connect
//! 42["message",{"from":"..","to":"..","message":".."}]      event
//! ```

use serde::Deserialize;
use serde_json::Value;

use crate::error::CodecError;
use crate::events::{ClientEvent, ServerEvent, WireMessage, MESSAGE_EVENT};

/// Engine.IO handshake parameters
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenInfo {
    pub sid: String,
    #[serde(default)]
    pub ping_interval: u64,
    #[serde(default)]
    pub ping_timeout: u64,
}

/// Decoded inbound frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Open(OpenInfo),
    Close,
    Ping,
    Pong,
    /// Namespace connect acknowledged
    Connected,
    Disconnected,
    Event(ServerEvent),
    ConnectError(String),
    /// Acks, binary packets, upgrades and noops
    Ignored,
}

/// Namespace connect request for the default namespace
pub fn connect_frame() -> &'static str {
    "40"
}

/// Reply to an engine ping
pub fn pong_frame() -> &'static str {
    "3"
}

pub fn encode_event(event: &ClientEvent) -> Result<String, CodecError> {
    let body = match event {
        ClientEvent::Register(identity) => serde_json::to_string(&(event.name(), identity))?,
        ClientEvent::Message(message) => serde_json::to_string(&(event.name(), message))?,
    };
    Ok(format!("42{}", body))
}

pub fn decode(text: &str) -> Result<Frame, CodecError> {
    let mut chars = text.chars();
    let engine_type = chars.next().ok_or(CodecError::Empty)?;
    let rest = chars.as_str();

    match engine_type {
        '0' => Ok(Frame::Open(serde_json::from_str(rest)?)),
        '1' => Ok(Frame::Close),
        '2' => Ok(Frame::Ping),
        '3' => Ok(Frame::Pong),
        '4' => decode_socket_packet(rest),
        '5' | '6' => Ok(Frame::Ignored),
        other => Err(CodecError::UnknownPacket(other)),
    }
}

fn decode_socket_packet(packet: &str) -> Result<Frame, CodecError> {
    let mut chars = packet.chars();
    let socket_type = chars.next().ok_or(CodecError::Empty)?;
    let body = strip_namespace_and_ack(chars.as_str());

    match socket_type {
        '0' => Ok(Frame::Connected),
        '1' => Ok(Frame::Disconnected),
        '2' => decode_event(body).map(Frame::Event),
        '4' => {
            let value: Value = serde_json::from_str(body)?;
            let message = value
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| value.to_string());
            Ok(Frame::ConnectError(message))
        }
        '3' | '5' | '6' => Ok(Frame::Ignored),
        other => Err(CodecError::UnknownPacket(other)),
    }
}

fn strip_namespace_and_ack(body: &str) -> &str {
    let body = if body.starts_with('/') {
        match body.find(',') {
            Some(idx) => &body[idx + 1..],
            None => "",
        }
    } else {
        body
    };
    body.trim_start_matches(|c: char| c.is_ascii_digit())
}

fn decode_event(body: &str) -> Result<ServerEvent, CodecError> {
    let value: Value = serde_json::from_str(body)?;
    let mut items = match value {
        Value::Array(items) if !items.is_empty() => items.into_iter(),
        other => return Err(CodecError::MalformedEvent(other.to_string())),
    };

    let name = match items.next() {
        Some(Value::String(name)) => name,
        Some(other) => return Err(CodecError::MalformedEvent(other.to_string())),
        None => return Err(CodecError::MalformedEvent(body.to_string())),
    };

    if name != MESSAGE_EVENT {
        return Ok(ServerEvent::Other { name });
    }

    let payload = items
        .next()
        .ok_or_else(|| CodecError::MalformedEvent("message event without payload".into()))?;
    let message: WireMessage = serde_json::from_value(payload)?;
    Ok(ServerEvent::Message(message))
}
