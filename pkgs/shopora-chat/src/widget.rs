//! Chat widget - visibility state machine, send and receive flows
//!
//! The widget is the single writer of the current identity's history: every
//! mutation goes through `&mut self`, and inbound messages queue on the
//! session's stream until the owner feeds them to `receive`. Failures are
//! absorbed here. The only one the user ever sees is the sign-in notice.

use shopora_store::{
    ChatMessage, ConversationHistory, HistoryStore, Identity, KeyValueStore, StoreError,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::ChatConfig;
use crate::events::WireMessage;
use crate::identity::{IdentityProvider, IdentityState};
use crate::notify::{Notifier, LOGIN_REQUIRED_NOTICE};
use crate::session::ConnectionSession;
use crate::transport::{MessageStream, Transport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Open,
    Closed,
}

/// Banner above the conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatStatus {
    AdminConnected,
    WaitingForAdmin,
}

impl ChatStatus {
    pub fn label(&self) -> &'static str {
        match self {
            ChatStatus::AdminConnected => "Admin connected",
            ChatStatus::WaitingForAdmin => "Waiting for admin",
        }
    }
}

pub struct ChatWidget<T: Transport, S: KeyValueStore> {
    config: ChatConfig,
    session: ConnectionSession<T>,
    history_store: HistoryStore<S>,
    notifier: Arc<dyn Notifier>,
    identity: IdentityState,
    history: Option<ConversationHistory>,
    inbound: Option<MessageStream>,
    visibility: Visibility,
    input: String,
    scroll_anchor: Option<usize>,
    unread: usize,
    persistence_degraded: bool,
}

impl<T: Transport, S: KeyValueStore> ChatWidget<T, S> {
    /// A closed widget waiting for identity resolution
    pub fn new(
        config: ChatConfig,
        session: ConnectionSession<T>,
        history_store: HistoryStore<S>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            config,
            session,
            history_store,
            notifier,
            identity: IdentityState::resolving(),
            history: None,
            inbound: None,
            visibility: Visibility::Closed,
            input: String::new(),
            scroll_anchor: None,
            unread: 0,
            persistence_degraded: false,
        }
    }

    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    pub fn session(&self) -> &ConnectionSession<T> {
        &self.session
    }

    pub fn history_store(&self) -> &HistoryStore<S> {
        &self.history_store
    }

    pub fn identity_state(&self) -> &IdentityState {
        &self.identity
    }

    // ---- identity gate ----

    pub fn begin_resolving(&mut self) {
        self.identity.resolving = true;
    }

    /// Resolve the identity once through `provider`
    ///
    /// Provider errors count as "signed out".
    pub async fn resolve_identity<P>(&mut self, provider: &P)
    where
        P: IdentityProvider + ?Sized,
    {
        self.begin_resolving();
        let identity = match provider.current_identity().await {
            Ok(identity) => identity,
            Err(e) => {
                warn!("Identity lookup failed: {}", e);
                None
            }
        };
        self.set_identity(identity).await;
    }

    /// Finish resolution with `identity`, setting up or tearing down the session
    pub async fn set_identity(&mut self, identity: Option<Identity>) {
        let previous = self.identity.identity.take();
        self.identity = IdentityState::resolved(identity.clone());

        match (previous, identity) {
            (Some(prev), Some(next)) if prev == next => self.ensure_session(&next).await,
            (Some(prev), Some(next)) => {
                info!("Identity changed from {} to {}", prev, next);
                self.teardown();
                self.ensure_session(&next).await;
            }
            (Some(prev), None) => {
                info!("{} signed out", prev);
                self.teardown();
            }
            (None, Some(next)) => self.ensure_session(&next).await,
            (None, None) => debug!("No identity available for chat"),
        }
    }

    /// Drop the session and the in-memory conversation; stored history stays
    pub async fn logout(&mut self) {
        self.set_identity(None).await;
    }

    fn teardown(&mut self) {
        self.session.teardown();
        self.inbound = None;
        self.history = None;
        self.visibility = Visibility::Closed;
        self.input.clear();
        self.scroll_anchor = None;
        self.unread = 0;
    }

    /// Connect, load history, subscribe and register, skipping finished steps
    async fn ensure_session(&mut self, identity: &Identity) {
        if let Err(e) = self.session.connect().await {
            warn!("Chat transport unavailable: {}", e);
        }

        if self.history.is_none() {
            let history = match self.history_store.load_compacted(identity).await {
                Ok((history, None)) => history,
                Ok((history, Some(e))) => {
                    self.record_store_failure(&e);
                    history
                }
                Err(e) => {
                    self.record_store_failure(&e);
                    ConversationHistory::new(identity.clone())
                }
            };
            debug!("Loaded {} message(s) for {}", history.len(), identity);
            self.history = Some(history);
        }

        if self.inbound.is_none() {
            self.inbound = Some(self.session.on_message());
        }

        self.session.register(identity).await;
    }

    fn record_store_failure(&mut self, error: &StoreError) {
        warn!(
            "Chat history could not be persisted, continuing in memory: {}",
            error
        );
        self.persistence_degraded = true;
    }

    /// Identity allowed to chat
    ///
    /// Silent while resolving; a signed-out user gets the sign-in notice.
    fn chat_identity(&self) -> Option<Identity> {
        if let Some(identity) = self.identity.ready() {
            return Some(identity.clone());
        }
        if !self.identity.resolving {
            self.notifier.notify(LOGIN_REQUIRED_NOTICE);
        }
        None
    }

    // ---- visibility ----

    pub fn visibility(&self) -> Visibility {
        self.visibility
    }

    pub fn is_open(&self) -> bool {
        self.visibility == Visibility::Open
    }

    /// Chat button behaviour
    pub async fn toggle(&mut self) {
        match self.visibility {
            Visibility::Open => self.close(),
            Visibility::Closed => {
                self.open().await;
            }
        }
    }

    /// Open the widget. Returns whether it is open afterwards.
    pub async fn open(&mut self) -> bool {
        let Some(identity) = self.chat_identity() else {
            return false;
        };

        self.ensure_session(&identity).await;
        self.visibility = Visibility::Open;
        self.unread = 0;
        self.scroll_to_newest();
        true
    }

    pub fn close(&mut self) {
        self.visibility = Visibility::Closed;
    }

    // ---- send flow ----

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn set_input(&mut self, text: impl Into<String>) {
        self.input = text.into();
    }

    /// Send the input buffer to support
    ///
    /// Returns whether a message was produced. The message is echoed into the
    /// history right away; delivery is best effort.
    pub async fn send(&mut self) -> bool {
        let Some(identity) = self.chat_identity() else {
            return false;
        };

        let body = self.input.trim();
        if body.is_empty() {
            return false;
        }

        let message = ChatMessage::new(
            identity.as_str(),
            self.config.support_address.as_str(),
            body,
            self.history_store.now_millis(),
        );

        if !self.session.is_registered() {
            self.ensure_session(&identity).await;
        }
        self.session.send(WireMessage::from(&message)).await;

        self.append(message).await;
        self.input.clear();
        true
    }

    pub async fn send_text(&mut self, text: impl Into<String>) -> bool {
        self.set_input(text);
        self.send().await
    }

    // ---- receive flow ----

    /// Apply one inbound message, stamped with the local arrival time
    pub async fn receive(&mut self, message: WireMessage) {
        if self.history.is_none() {
            debug!("Inbound message from {} after teardown, dropped", message.from);
            return;
        }
        let arrived = message.into_chat_message(self.history_store.now_millis());
        if !self.is_open() {
            self.unread += 1;
        }
        self.append(arrived).await;
    }

    /// Next message from the transport
    ///
    /// Pends forever while there is no subscription, so it can sit in a
    /// `select!` next to other event sources.
    pub async fn next_inbound(&mut self) -> Option<WireMessage> {
        match self.inbound.as_mut() {
            Some(stream) => {
                let next = stream.recv().await;
                if next.is_none() {
                    debug!("Inbound stream ended");
                    self.inbound = None;
                }
                next
            }
            None => std::future::pending().await,
        }
    }

    /// Apply every message already delivered. Returns how many.
    pub async fn drain_inbound(&mut self) -> usize {
        let mut pending = Vec::new();
        if let Some(stream) = self.inbound.as_mut() {
            while let Ok(message) = stream.try_recv() {
                pending.push(message);
            }
        }

        let count = pending.len();
        for message in pending {
            self.receive(message).await;
        }
        count
    }

    async fn append(&mut self, message: ChatMessage) {
        let Some(history) = self.history.as_mut() else {
            return;
        };
        if let Err(e) = self.history_store.append(history, message).await {
            self.record_store_failure(&e);
        }
        if self.is_open() {
            self.scroll_to_newest();
        }
    }

    // ---- view ----

    pub fn messages(&self) -> &[ChatMessage] {
        self.history
            .as_ref()
            .map(|h| h.messages())
            .unwrap_or_default()
    }

    pub fn status(&self) -> ChatStatus {
        let support = self.config.support_address.as_str();
        if self.messages().iter().any(|m| m.is_from(support)) {
            ChatStatus::AdminConnected
        } else {
            ChatStatus::WaitingForAdmin
        }
    }

    /// Index of the message the view is scrolled to, `None` when empty
    pub fn scroll_position(&self) -> Option<usize> {
        self.scroll_anchor
    }

    pub fn scroll_to_newest(&mut self) {
        self.scroll_anchor = self.messages().len().checked_sub(1);
    }

    /// Messages received while the widget was closed
    pub fn unread(&self) -> usize {
        self.unread
    }

    /// Set once a store read or write failed; history may not survive a restart
    pub fn persistence_degraded(&self) -> bool {
        self.persistence_degraded
    }
}
