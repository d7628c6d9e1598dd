//! Shopora Store - persistent chat history for the support chat
//!
//! This crate owns everything the chat client keeps on the local device:
//!
//! - **Models**: `Identity`, `ChatMessage` and the in-memory `ConversationHistory`
//! - **Key-value persistence**: the `KeyValueStore` capability with a SQLite
//!   implementation on Sea-ORM (`SqliteKvStore`) and a process-local one
//!   (`MemoryKvStore`)
//! - **History**: `HistoryStore`, which layers the one-hour retention window
//!   on top of any key-value store
//!
//! # Storage layout
//!
//! One record per identity, keyed `chat_<identity>`. The value is a JSON list
//! of `{from, to, message, timestamp}` objects, oldest first. Every append
//! overwrites the whole record; the retention window keeps it small.
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use shopora_store::{ChatMessage, HistoryStore, Identity, SqliteKvStore};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let kv = SqliteKvStore::new("chat.db".into()).await?;
//! let history_store = HistoryStore::new(kv);
//!
//! let alice = Identity::new("alice@example.com");
//! let mut history = history_store.load(&alice).await?;
//! let msg = ChatMessage::new(alice.as_str(), "admin@shopora.com", "Where is my order?", 0);
//! history_store.append(&mut history, msg).await?;
//! # Ok(())
//! # }
//! ```

pub mod clock;
pub mod entities;
pub mod error;
pub mod history_store;
pub mod kv_store;
pub mod migration;
pub mod models;
pub mod sqlite_store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::StoreError;
pub use history_store::{HistoryConfig, HistoryStore, RETENTION_WINDOW_MS};
pub use kv_store::{KeyValueStore, MemoryKvStore};
pub use models::{ChatMessage, ConversationHistory, Identity, STORAGE_KEY_PREFIX};
pub use sqlite_store::SqliteKvStore;
