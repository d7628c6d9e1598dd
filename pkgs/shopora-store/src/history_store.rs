//! History store - expiry-aware conversation log per identity
//!
//! Each identity's conversation is one key-value record holding the whole
//! message list. Loading compacts the record eagerly: expired messages are
//! dropped and the filtered list is written back before it is returned, so
//! a stale message can never reappear after a partial expiry.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::error::StoreError;
use crate::kv_store::KeyValueStore;
use crate::models::{ChatMessage, ConversationHistory, Identity, STORAGE_KEY_PREFIX};

/// One hour, in milliseconds
pub const RETENTION_WINDOW_MS: i64 = 60 * 60 * 1000;

/// Configuration for the history store
#[derive(Debug, Clone)]
pub struct HistoryConfig {
    /// How long a message stays visible after it arrived (default: 1 hour)
    pub retention: Duration,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            retention: Duration::from_millis(RETENTION_WINDOW_MS as u64),
        }
    }
}

pub struct HistoryStore<S> {
    store: S,
    config: HistoryConfig,
    clock: Arc<dyn Clock>,
}

impl<S: KeyValueStore> HistoryStore<S> {
    /// History store on the wall clock with the default retention window
    pub fn new(store: S) -> Self {
        Self::with_config(store, HistoryConfig::default(), Arc::new(SystemClock))
    }

    pub fn with_config(store: S, config: HistoryConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            config,
            clock,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn now_millis(&self) -> i64 {
        self.clock.now_millis()
    }

    pub fn retention_ms(&self) -> i64 {
        self.config.retention.as_millis() as i64
    }

    /// Load the unexpired conversation for `identity`
    ///
    /// A missing record yields an empty history and writes nothing. A failed
    /// write-back is logged and the filtered history is still returned.
    pub async fn load(&self, identity: &Identity) -> Result<ConversationHistory, StoreError> {
        let (history, _write_back) = self.load_compacted(identity).await?;
        Ok(history)
    }

    /// Like `load`, also handing back the error of a failed write-back
    ///
    /// Only reading or parsing the record fails the call. The compacted
    /// history survives a write-back error so the caller can keep chatting.
    pub async fn load_compacted(
        &self,
        identity: &Identity,
    ) -> Result<(ConversationHistory, Option<StoreError>), StoreError> {
        let key = identity.storage_key();
        let Some(raw) = self.store.get(&key).await? else {
            debug!("No stored conversation for {}", identity);
            return Ok((ConversationHistory::new(identity.clone()), None));
        };

        let stored: Vec<ChatMessage> = serde_json::from_str(&raw)?;
        let total = stored.len();
        let now = self.now_millis();
        let retention = self.retention_ms();
        let valid: Vec<ChatMessage> = stored
            .into_iter()
            .filter(|m| !m.is_expired(now, retention))
            .collect();

        if valid.len() < total {
            info!(
                "Dropped {} expired message(s) for {}",
                total - valid.len(),
                identity
            );
        }

        let history = ConversationHistory::with_messages(identity.clone(), valid);
        let write_back = match self.persist(&history).await {
            Ok(()) => None,
            Err(e) => {
                warn!("Could not rewrite conversation for {}: {}", identity, e);
                Some(e)
            }
        };

        Ok((history, write_back))
    }

    /// Append `message` and persist the whole conversation
    ///
    /// The in-memory history is updated before the write, so it stays
    /// current even when persisting fails.
    pub async fn append(
        &self,
        history: &mut ConversationHistory,
        mut message: ChatMessage,
    ) -> Result<(), StoreError> {
        let now = self.now_millis();
        if !message.is_stamped() {
            message.timestamp = now;
        }

        let retention = self.retention_ms();
        history.retain_unexpired(now, retention);
        history.push(message);

        self.persist(history).await
    }

    /// Overwrite the stored record with `history`
    pub async fn persist(&self, history: &ConversationHistory) -> Result<(), StoreError> {
        let value = serde_json::to_string(history.messages())?;
        self.store
            .set(&history.identity().storage_key(), &value)
            .await
    }

    /// Raw stored messages for `identity`, without filtering or compaction
    pub async fn stored_messages(&self, identity: &Identity) -> Result<Vec<ChatMessage>, StoreError> {
        match self.store.get(&identity.storage_key()).await? {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(Vec::new()),
        }
    }

    /// Compact every stored conversation, deleting the ones left empty
    ///
    /// Returns the number of messages removed. Records that cannot be parsed
    /// are left alone.
    pub async fn purge_expired_all(&self) -> Result<usize, StoreError> {
        let now = self.now_millis();
        let retention = self.retention_ms();
        let mut removed = 0;

        for key in self.store.keys_with_prefix(STORAGE_KEY_PREFIX).await? {
            let Some(raw) = self.store.get(&key).await? else {
                continue;
            };
            let Ok(stored) = serde_json::from_str::<Vec<ChatMessage>>(&raw) else {
                debug!("Skipping unreadable record {}", key);
                continue;
            };

            let total = stored.len();
            let valid: Vec<ChatMessage> = stored
                .into_iter()
                .filter(|m| !m.is_expired(now, retention))
                .collect();

            if valid.is_empty() {
                self.store.delete(&key).await?;
            } else if valid.len() < total {
                self.store.set(&key, &serde_json::to_string(&valid)?).await?;
            }
            removed += total - valid.len();
        }

        if removed > 0 {
            info!("Purged {} expired message(s)", removed);
        }
        Ok(removed)
    }
}
