//! Shopora Chat - realtime customer support chat client
//!
//! Connects a signed-in storefront customer to the support desk over a
//! Socket.IO channel and keeps a one-hour, per-customer history on the device.
//!
//! # Layers
//!
//! - **Transport**: `SocketIoTransport` speaks Engine.IO v4 / Socket.IO over a
//!   WebSocket; `MemoryHub` is an in-process relay with the same routing
//! - **Session**: `ConnectionSession` registers the identity once per
//!   connection and owns the single inbound subscriber
//! - **Identity**: `IdentityProvider` answers "who is signed in";
//!   `HttpIdentityProvider` asks the storefront backend
//! - **Widget**: `ChatWidget` holds visibility, input and the conversation,
//!   and is the only writer of the persisted history
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use shopora_chat::{
//!     ChatConfig, ChatWidget, ConnectionSession, HistoryStore, HttpIdentityProvider,
//!     SocketIoTransport, SqliteKvStore, TracingNotifier,
//! };
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ChatConfig::default();
//! let kv = SqliteKvStore::new(config.db_path.clone()).await?;
//! let transport = SocketIoTransport::new(&config.server_url, config.connect_timeout())?;
//!
//! let mut widget = ChatWidget::new(
//!     config.clone(),
//!     ConnectionSession::new(Arc::new(transport)),
//!     HistoryStore::new(kv),
//!     Arc::new(TracingNotifier),
//! );
//!
//! let provider = HttpIdentityProvider::new(&config.api_url)?;
//! widget.resolve_identity(&provider).await;
//!
//! if widget.open().await {
//!     widget.send_text("Where is my order?").await;
//!     while let Some(reply) = widget.next_inbound().await {
//!         widget.receive(reply).await;
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod config;
pub mod error;
pub mod events;
pub mod identity;
pub mod notify;
pub mod session;
pub mod transport;
pub mod widget;

pub use config::{ChatConfig, ChatConfigUpdates, DEFAULT_BACKEND_URL, DEFAULT_SUPPORT_ADDRESS};
pub use error::{ChatError, CodecError, TransportError};
pub use events::{ClientEvent, ServerEvent, WireMessage, MESSAGE_EVENT, REGISTER_EVENT};
pub use identity::{HttpIdentityProvider, IdentityProvider, IdentityState, StaticIdentityProvider};
pub use notify::{Notifier, TracingNotifier, LOGIN_REQUIRED_NOTICE};
pub use session::{ConnectionSession, SessionState};
pub use transport::{
    socket_io_endpoint, EventSink, MemoryHub, MemoryTransport, MessageStream, SocketIoTransport,
    Transport,
};
pub use widget::{ChatStatus, ChatWidget, Visibility};

pub use shopora_store::{
    ChatMessage, Clock, ConversationHistory, HistoryConfig, HistoryStore, Identity,
    KeyValueStore, ManualClock, MemoryKvStore, SqliteKvStore, StoreError, SystemClock,
};
