//! In-process relay standing in for the chat server
//!
//! `MemoryHub` keeps the routing table a Socket.IO chat server would keep:
//! each connection is bound to at most one identity, and a `message` event
//! is pushed to every connection bound to its recipient.

use async_trait::async_trait;
use parking_lot::Mutex;
use shopora_store::Identity;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use super::{EventSink, Transport};
use crate::error::TransportError;
use crate::events::{ClientEvent, WireMessage};

#[derive(Default)]
struct Connection {
    open: bool,
    sink: Option<EventSink>,
    bound_to: Option<Identity>,
}

struct HubState {
    online: bool,
    next_id: u64,
    connections: HashMap<u64, Connection>,
    emitted: Vec<(u64, ClientEvent)>,
}

impl Default for HubState {
    fn default() -> Self {
        Self {
            online: true,
            next_id: 0,
            connections: HashMap::new(),
            emitted: Vec::new(),
        }
    }
}

impl HubState {
    /// Push `message` to every open connection bound to `to`
    fn route(&mut self, to: &str, message: &WireMessage) -> usize {
        let mut delivered = 0;
        for conn in self.connections.values_mut() {
            let bound = conn.bound_to.as_ref().is_some_and(|id| id.as_str() == to);
            if !conn.open || !bound {
                continue;
            }
            if let Some(sink) = conn.sink.as_ref() {
                if sink.send(message.clone()).is_ok() {
                    delivered += 1;
                } else {
                    conn.sink = None;
                }
            }
        }
        delivered
    }
}

/// Shared relay; clones refer to the same hub
#[derive(Clone, Default)]
pub struct MemoryHub {
    state: Arc<Mutex<HubState>>,
}

impl MemoryHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// A new, not yet connected, transport attached to this hub
    pub fn transport(&self) -> MemoryTransport {
        let mut state = self.state.lock();
        state.next_id += 1;
        let id = state.next_id;
        state.connections.insert(id, Connection::default());
        MemoryTransport {
            hub: self.clone(),
            id,
        }
    }

    /// Server-side push of `message` to whoever is registered as `message.to`
    ///
    /// Returns the number of connections it reached.
    pub fn deliver(&self, message: WireMessage) -> usize {
        let to = message.to.clone();
        self.state.lock().route(&to, &message)
    }

    /// Open connections currently bound to `identity`
    pub fn binding_count(&self, identity: &Identity) -> usize {
        self.state
            .lock()
            .connections
            .values()
            .filter(|c| c.open && c.bound_to.as_ref() == Some(identity))
            .count()
    }

    /// Every event received from clients, in arrival order
    pub fn emitted(&self) -> Vec<ClientEvent> {
        self.state
            .lock()
            .emitted
            .iter()
            .map(|(_, event)| event.clone())
            .collect()
    }

    pub fn register_count(&self, identity: &Identity) -> usize {
        self.state
            .lock()
            .emitted
            .iter()
            .filter(|(_, e)| matches!(e, ClientEvent::Register(id) if id == identity))
            .count()
    }

    pub fn sent_messages(&self) -> Vec<WireMessage> {
        self.state
            .lock()
            .emitted
            .iter()
            .filter_map(|(_, e)| match e {
                ClientEvent::Message(m) => Some(m.clone()),
                ClientEvent::Register(_) => None,
            })
            .collect()
    }

    /// Take the hub down (closing every connection) or bring it back
    pub fn set_online(&self, online: bool) {
        let mut state = self.state.lock();
        state.online = online;
        if !online {
            for conn in state.connections.values_mut() {
                conn.open = false;
                conn.bound_to = None;
            }
        }
    }
}

/// One client connection to a `MemoryHub`
pub struct MemoryTransport {
    hub: MemoryHub,
    id: u64,
}

impl MemoryTransport {
    pub fn hub(&self) -> &MemoryHub {
        &self.hub
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        let mut state = self.hub.state.lock();
        if !state.online {
            return Err(TransportError::Handshake("hub is offline".to_string()));
        }
        if let Some(conn) = state.connections.get_mut(&self.id) {
            conn.open = true;
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        let state = self.hub.state.lock();
        state.connections.get(&self.id).is_some_and(|c| c.open)
    }

    async fn emit(&self, event: ClientEvent) -> Result<(), TransportError> {
        let mut state = self.hub.state.lock();
        let open = state.connections.get(&self.id).is_some_and(|c| c.open);
        if !open {
            return Err(TransportError::NotConnected);
        }
        state.emitted.push((self.id, event.clone()));

        match event {
            ClientEvent::Register(identity) => {
                debug!("Hub: connection {} bound to {}", self.id, identity);
                if let Some(conn) = state.connections.get_mut(&self.id) {
                    conn.bound_to = Some(identity);
                }
            }
            ClientEvent::Message(message) => {
                let to = message.to.clone();
                let reached = state.route(&to, &message);
                debug!("Hub: message to {} reached {} connection(s)", to, reached);
            }
        }
        Ok(())
    }

    fn set_sink(&self, sink: Option<EventSink>) {
        let mut state = self.hub.state.lock();
        if let Some(conn) = state.connections.get_mut(&self.id) {
            conn.sink = sink;
        }
    }

    async fn close(&self) {
        let mut state = self.hub.state.lock();
        if let Some(conn) = state.connections.get_mut(&self.id) {
            conn.open = false;
            conn.bound_to = None;
        }
    }
}

impl Drop for MemoryTransport {
    fn drop(&mut self) {
        self.hub.state.lock().connections.remove(&self.id);
    }
}
