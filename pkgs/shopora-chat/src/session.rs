//! Connection session - one transport, one registration, one subscriber

use shopora_store::Identity;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::TransportError;
use crate::events::{ClientEvent, WireMessage};
use crate::transport::{MessageStream, Transport};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Unregistered,
    Registered(Identity),
}

/// Owns the binding between a transport and the current identity
///
/// The transport itself may be shared; the session only manages the
/// registration and the single inbound subscriber.
pub struct ConnectionSession<T: Transport> {
    transport: Arc<T>,
    state: SessionState,
}

impl<T: Transport> ConnectionSession<T> {
    pub fn new(transport: Arc<T>) -> Self {
        Self {
            transport,
            state: SessionState::Unregistered,
        }
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn registered_identity(&self) -> Option<&Identity> {
        match &self.state {
            SessionState::Registered(identity) => Some(identity),
            SessionState::Unregistered => None,
        }
    }

    pub fn is_registered(&self) -> bool {
        matches!(self.state, SessionState::Registered(_)) && self.transport.is_open()
    }

    /// Open the transport unless it already is
    ///
    /// A fresh connection carries no server-side binding, so the session
    /// drops back to `Unregistered`.
    pub async fn connect(&mut self) -> Result<(), TransportError> {
        if self.transport.is_open() {
            return Ok(());
        }
        self.state = SessionState::Unregistered;
        self.transport.connect().await
    }

    /// Bind the transport to `identity`
    ///
    /// Registering the identity that is already bound is a no-op. Returns
    /// whether the session ends up registered.
    pub async fn register(&mut self, identity: &Identity) -> bool {
        if self.is_registered() && self.registered_identity() == Some(identity) {
            debug!("Already registered as {}", identity);
            return true;
        }

        match self
            .transport
            .emit(ClientEvent::Register(identity.clone()))
            .await
        {
            Ok(()) => {
                info!("Registered as {}", identity);
                self.state = SessionState::Registered(identity.clone());
                true
            }
            Err(e) => {
                warn!("Registration as {} dropped: {}", identity, e);
                self.state = SessionState::Unregistered;
                false
            }
        }
    }

    /// Subscribe to inbound messages, replacing any earlier subscriber
    ///
    /// The previous stream ends once its sender is dropped here.
    pub fn on_message(&mut self) -> MessageStream {
        let (tx, rx) = mpsc::unbounded_channel();
        self.transport.set_sink(Some(tx));
        rx
    }

    /// Fire-and-forget send
    ///
    /// Dropped (and logged) when the session is not registered or the
    /// transport is closed. Returns whether the transport accepted it.
    pub async fn send(&self, message: WireMessage) -> bool {
        if !matches!(self.state, SessionState::Registered(_)) {
            warn!("Send to {} dropped: session not registered", message.to);
            return false;
        }
        match self.transport.emit(ClientEvent::Message(message)).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Send dropped: {}", e);
                false
            }
        }
    }

    /// Detach the subscriber and forget the registration
    ///
    /// The transport stays open for whoever else shares it.
    pub fn teardown(&mut self) {
        self.transport.set_sink(None);
        if let SessionState::Registered(identity) = &self.state {
            info!("Session for {} torn down", identity);
        }
        self.state = SessionState::Unregistered;
    }
}
