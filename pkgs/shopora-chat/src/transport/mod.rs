//! Duplex transports
//!
//! A transport carries `ClientEvent`s out and hands inbound chat messages to
//! at most one sink. Installing a sink drops the previous one, which ends the
//! stream on the old receiver.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::TransportError;
use crate::events::{ClientEvent, WireMessage};

mod memory;
mod socket_io;

pub use memory::{MemoryHub, MemoryTransport};
pub use socket_io::{socket_io_endpoint, SocketIoTransport};

/// Receiving end installed on a transport
pub type EventSink = mpsc::UnboundedSender<WireMessage>;

/// Inbound messages, in the order the transport delivered them
pub type MessageStream = mpsc::UnboundedReceiver<WireMessage>;

#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Establish the connection. Returns immediately when already open.
    async fn connect(&self) -> Result<(), TransportError>;

    fn is_open(&self) -> bool;

    /// Fire-and-forget emit. Fails with `NotConnected` when closed.
    async fn emit(&self, event: ClientEvent) -> Result<(), TransportError>;

    /// Replace the inbound sink. `None` detaches it.
    fn set_sink(&self, sink: Option<EventSink>);

    async fn close(&self);
}
