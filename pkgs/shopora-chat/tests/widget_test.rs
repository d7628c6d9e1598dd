//! ChatWidget tests against the in-process hub
//!
//! Covers the identity gate, visibility, send and receive flows, retention
//! and the degraded paths (hub offline, store failing).

use async_trait::async_trait;
use parking_lot::Mutex;
use shopora_chat::{
    ChatConfig, ChatMessage, ChatStatus, ChatWidget, ClientEvent, ConnectionSession,
    HistoryConfig, HistoryStore, Identity, KeyValueStore, ManualClock, MemoryHub,
    MemoryKvStore, MemoryTransport, Notifier, SqliteKvStore, StaticIdentityProvider,
    StoreError, Visibility, WireMessage, LOGIN_REQUIRED_NOTICE,
};
use std::sync::Arc;
use tempfile::NamedTempFile;

const NOW: i64 = 1_700_000_000_000;
const MINUTE: i64 = 60 * 1000;
const ADMIN: &str = "admin@shopora.com";
const ALICE: &str = "alice@example.com";
const BOB: &str = "bob@example.com";

type Notices = Arc<Mutex<Vec<String>>>;

struct Harness {
    hub: MemoryHub,
    clock: Arc<ManualClock>,
    notices: Notices,
}

impl Harness {
    fn new() -> Self {
        Self {
            hub: MemoryHub::new(),
            clock: Arc::new(ManualClock::new(NOW)),
            notices: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn widget<S: KeyValueStore>(&self, kv: S) -> ChatWidget<MemoryTransport, S> {
        let notices = self.notices.clone();
        let notifier: Arc<dyn Notifier> =
            Arc::new(move |text: &str| notices.lock().push(text.to_string()));
        let history_store =
            HistoryStore::with_config(kv, HistoryConfig::default(), self.clock.clone());

        ChatWidget::new(
            ChatConfig::default(),
            ConnectionSession::new(Arc::new(self.hub.transport())),
            history_store,
            notifier,
        )
    }

    fn notices(&self) -> Vec<String> {
        self.notices.lock().clone()
    }
}

fn from_admin(to: &str, body: &str) -> WireMessage {
    WireMessage {
        from: ADMIN.to_string(),
        to: to.to_string(),
        message: body.to_string(),
        timestamp: None,
    }
}

/// Store whose writes always fail
#[derive(Default)]
struct FailingStore {
    inner: MemoryKvStore,
}

#[async_trait]
impl KeyValueStore for FailingStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.inner.get(key).await
    }

    async fn set(&self, _key: &str, _value: &str) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("storage full".to_string()))
    }

    async fn delete(&self, _key: &str) -> Result<bool, StoreError> {
        Err(StoreError::Unavailable("storage full".to_string()))
    }

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        self.inner.keys_with_prefix(prefix).await
    }
}

#[tokio::test]
async fn test_fresh_login_starts_empty_and_registered() {
    let h = Harness::new();
    let kv = MemoryKvStore::new();
    let mut widget = h.widget(kv.clone());
    let alice = Identity::new(ALICE);

    widget.set_identity(Some(alice.clone())).await;
    assert_eq!(widget.visibility(), Visibility::Closed);
    assert!(widget.open().await);

    assert!(widget.messages().is_empty());
    assert_eq!(widget.status(), ChatStatus::WaitingForAdmin);
    assert_eq!(widget.status().label(), "Waiting for admin");
    assert_eq!(widget.scroll_position(), None);
    assert_eq!(h.hub.binding_count(&alice), 1);
    assert!(widget.session().is_registered());
    assert!(kv.get(&alice.storage_key()).await.unwrap().is_none());
}

#[tokio::test]
async fn test_login_drops_expired_history() {
    let h = Harness::new();
    let kv = MemoryKvStore::new();
    let bob = Identity::new(BOB);
    let stored = vec![
        ChatMessage::new(BOB, ADMIN, "anyone there?", NOW - 120 * MINUTE),
        ChatMessage::new(ADMIN, BOB, "yes, how can I help?", NOW - 10 * MINUTE),
    ];
    kv.set(&bob.storage_key(), &serde_json::to_string(&stored).unwrap())
        .await
        .unwrap();

    let mut widget = h.widget(kv.clone());
    widget.set_identity(Some(bob.clone())).await;

    assert_eq!(widget.messages().len(), 1);
    assert_eq!(widget.messages()[0].body, "yes, how can I help?");
    assert_eq!(widget.status(), ChatStatus::AdminConnected);

    let persisted = widget.history_store().stored_messages(&bob).await.unwrap();
    assert_eq!(persisted, widget.messages());
}

#[tokio::test]
async fn test_logout_clears_view_but_keeps_storage() {
    let h = Harness::new();
    let kv = MemoryKvStore::new();
    let mut widget = h.widget(kv.clone());
    let alice = Identity::new(ALICE);

    widget.set_identity(Some(alice.clone())).await;
    assert!(widget.open().await);
    for body in ["hi", "order #12", "thanks"] {
        assert!(widget.send_text(body).await);
    }
    assert_eq!(widget.messages().len(), 3);

    widget.logout().await;

    assert_eq!(widget.visibility(), Visibility::Closed);
    assert!(widget.messages().is_empty());
    assert!(widget.identity_state().identity.is_none());
    assert!(!widget.session().is_registered());
    let persisted = widget.history_store().stored_messages(&alice).await.unwrap();
    assert_eq!(persisted.len(), 3);

    // No subscriber left for alice on this connection
    assert_eq!(h.hub.deliver(from_admin(ALICE, "still there?")), 0);
}

#[tokio::test]
async fn test_relogin_restores_history() {
    let h = Harness::new();
    let kv = MemoryKvStore::new();
    let mut widget = h.widget(kv.clone());
    let alice = Identity::new(ALICE);

    widget.set_identity(Some(alice.clone())).await;
    widget.send_text("first").await;
    widget.logout().await;

    h.clock.advance(5 * MINUTE);
    widget.set_identity(Some(alice)).await;

    assert_eq!(widget.messages().len(), 1);
    assert_eq!(widget.messages()[0].body, "first");
}

#[tokio::test]
async fn test_registration_is_idempotent() {
    let h = Harness::new();
    let mut widget = h.widget(MemoryKvStore::new());
    let alice = Identity::new(ALICE);

    widget.set_identity(Some(alice.clone())).await;
    widget.set_identity(Some(alice.clone())).await;
    widget.open().await;
    widget.close();
    widget.open().await;
    widget.send_text("hello").await;

    assert_eq!(h.hub.register_count(&alice), 1);
    assert_eq!(h.hub.deliver(from_admin(ALICE, "hello back")), 1);
    assert_eq!(widget.drain_inbound().await, 1);
    assert_eq!(widget.messages().len(), 2);
}

#[tokio::test]
async fn test_send_echoes_and_emits() {
    let h = Harness::new();
    let mut widget = h.widget(MemoryKvStore::new());
    let alice = Identity::new(ALICE);

    widget.set_identity(Some(alice.clone())).await;
    widget.open().await;
    widget.set_input("  Where is my order?  ");
    assert!(widget.send().await);

    assert_eq!(widget.input(), "");
    let echoed = &widget.messages()[0];
    assert_eq!(echoed.from, ALICE);
    assert_eq!(echoed.to, ADMIN);
    assert_eq!(echoed.body, "Where is my order?");
    assert_eq!(echoed.timestamp, NOW);
    assert_eq!(widget.scroll_position(), Some(0));

    let sent = h.hub.sent_messages();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].message, "Where is my order?");
    assert_eq!(sent[0].to, ADMIN);

    let persisted = widget.history_store().stored_messages(&alice).await.unwrap();
    assert_eq!(persisted.len(), 1);
}

#[tokio::test]
async fn test_blank_send_is_noop() {
    let h = Harness::new();
    let mut widget = h.widget(MemoryKvStore::new());
    widget.set_identity(Some(Identity::new(ALICE))).await;

    widget.set_input("   \n\t");
    assert!(!widget.send().await);
    assert!(!widget.send_text("").await);

    assert!(widget.messages().is_empty());
    assert!(h.hub.sent_messages().is_empty());
    assert!(h.notices().is_empty());
}

#[tokio::test]
async fn test_actions_while_resolving_do_nothing() {
    let h = Harness::new();
    let mut widget = h.widget(MemoryKvStore::new());

    widget.toggle().await;
    assert!(!widget.send_text("hello").await);

    assert_eq!(widget.visibility(), Visibility::Closed);
    assert!(h.notices().is_empty());
    assert!(h.hub.emitted().is_empty());
}

#[tokio::test]
async fn test_signed_out_user_gets_notice() {
    let h = Harness::new();
    let mut widget = h.widget(MemoryKvStore::new());
    widget
        .resolve_identity(&StaticIdentityProvider::new(None))
        .await;

    widget.toggle().await;
    assert_eq!(widget.visibility(), Visibility::Closed);
    assert!(!widget.send_text("hello").await);

    assert_eq!(
        h.notices(),
        vec![LOGIN_REQUIRED_NOTICE.to_string(), LOGIN_REQUIRED_NOTICE.to_string()]
    );
    assert!(h.hub.emitted().is_empty());
}

#[tokio::test]
async fn test_toggle_opens_and_closes() {
    let h = Harness::new();
    let mut widget = h.widget(MemoryKvStore::new());
    widget
        .resolve_identity(&StaticIdentityProvider::new(Some(Identity::new(ALICE))))
        .await;

    widget.toggle().await;
    assert!(widget.is_open());
    widget.toggle().await;
    assert!(!widget.is_open());
}

#[tokio::test]
async fn test_inbound_while_closed_counts_unread() {
    let h = Harness::new();
    let mut widget = h.widget(MemoryKvStore::new());
    widget.set_identity(Some(Identity::new(ALICE))).await;

    h.clock.advance(MINUTE);
    h.hub.deliver(from_admin(ALICE, "your parcel shipped"));
    h.hub.deliver(from_admin(ALICE, "tracking: ZX123"));
    assert_eq!(widget.drain_inbound().await, 2);

    assert_eq!(widget.visibility(), Visibility::Closed);
    assert_eq!(widget.unread(), 2);
    assert_eq!(widget.messages().len(), 2);
    assert_eq!(widget.messages()[0].timestamp, NOW + MINUTE);
    assert_eq!(widget.status(), ChatStatus::AdminConnected);
    assert_eq!(widget.scroll_position(), None);

    widget.open().await;
    assert_eq!(widget.unread(), 0);
    assert_eq!(widget.scroll_position(), Some(1));
}

#[tokio::test]
async fn test_inbound_is_stamped_on_arrival() {
    let h = Harness::new();
    let mut widget = h.widget(MemoryKvStore::new());
    widget.set_identity(Some(Identity::new(ALICE))).await;

    let mut reply = from_admin(ALICE, "hello");
    reply.timestamp = Some(42);
    h.hub.deliver(reply);

    let received = widget.next_inbound().await.unwrap();
    widget.receive(received).await;

    assert_eq!(widget.messages()[0].timestamp, NOW);
}

#[tokio::test]
async fn test_interleaved_messages_keep_order() {
    let h = Harness::new();
    let mut widget = h.widget(MemoryKvStore::new());
    let alice = Identity::new(ALICE);
    widget.set_identity(Some(alice.clone())).await;
    widget.open().await;

    widget.send_text("one").await;
    h.clock.advance(1000);
    h.hub.deliver(from_admin(ALICE, "two"));
    widget.drain_inbound().await;
    h.clock.advance(1000);
    widget.send_text("three").await;

    let bodies: Vec<&str> = widget.messages().iter().map(|m| m.body.as_str()).collect();
    assert_eq!(bodies, vec!["one", "two", "three"]);
    assert_eq!(widget.scroll_position(), Some(2));

    let persisted = widget.history_store().stored_messages(&alice).await.unwrap();
    assert_eq!(persisted, widget.messages());
}

#[tokio::test]
async fn test_append_purges_expired_messages() {
    let h = Harness::new();
    let mut widget = h.widget(MemoryKvStore::new());
    let alice = Identity::new(ALICE);
    widget.set_identity(Some(alice.clone())).await;

    widget.send_text("early").await;
    h.clock.advance(61 * MINUTE);
    widget.send_text("later").await;

    assert_eq!(widget.messages().len(), 1);
    assert_eq!(widget.messages()[0].body, "later");
    let persisted = widget.history_store().stored_messages(&alice).await.unwrap();
    assert_eq!(persisted.len(), 1);
}

#[tokio::test]
async fn test_switching_identity_swaps_conversation() {
    let h = Harness::new();
    let mut widget = h.widget(MemoryKvStore::new());
    let alice = Identity::new(ALICE);
    let bob = Identity::new(BOB);

    widget.set_identity(Some(alice.clone())).await;
    widget.open().await;
    widget.send_text("from alice").await;

    widget.set_identity(Some(bob.clone())).await;

    assert!(widget.messages().is_empty());
    assert_eq!(widget.visibility(), Visibility::Closed);
    assert_eq!(widget.session().registered_identity(), Some(&bob));
    assert_eq!(h.hub.binding_count(&bob), 1);
    assert_eq!(h.hub.binding_count(&alice), 0);

    widget.send_text("from bob").await;
    let persisted = widget.history_store().stored_messages(&alice).await.unwrap();
    assert_eq!(persisted.len(), 1);
    assert_eq!(persisted[0].body, "from alice");
}

#[tokio::test]
async fn test_hub_offline_keeps_local_echo() {
    let h = Harness::new();
    let mut widget = h.widget(MemoryKvStore::new());
    let alice = Identity::new(ALICE);
    h.hub.set_online(false);

    widget.set_identity(Some(alice.clone())).await;
    assert!(widget.open().await);
    assert!(widget.send_text("is anyone there?").await);

    assert_eq!(widget.messages().len(), 1);
    assert!(h.hub.sent_messages().is_empty());
    assert!(!widget.session().is_registered());

    h.hub.set_online(true);
    assert!(widget.send_text("hello?").await);

    assert_eq!(h.hub.register_count(&alice), 1);
    let sent = h.hub.sent_messages();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].message, "hello?");
    assert_eq!(widget.messages().len(), 2);

    // Replies reach the subscriber installed while offline
    h.hub.deliver(from_admin(ALICE, "yes"));
    assert_eq!(widget.drain_inbound().await, 1);
}

#[tokio::test]
async fn test_store_failure_degrades_but_chat_continues() {
    let h = Harness::new();
    let mut widget = h.widget(FailingStore::default());
    widget.set_identity(Some(Identity::new(ALICE))).await;
    assert!(!widget.persistence_degraded());

    assert!(widget.send_text("hello").await);

    assert!(widget.persistence_degraded());
    assert_eq!(widget.messages().len(), 1);
    assert_eq!(h.hub.sent_messages().len(), 1);
}

#[tokio::test]
async fn test_failed_write_back_keeps_loaded_history() {
    let h = Harness::new();
    let alice = Identity::new(ALICE);
    let store = FailingStore::default();
    let stored = vec![ChatMessage::new(ALICE, ADMIN, "a minute ago", NOW - MINUTE)];
    store
        .inner
        .set(&alice.storage_key(), &serde_json::to_string(&stored).unwrap())
        .await
        .unwrap();

    let mut widget = h.widget(store);
    widget.set_identity(Some(alice)).await;
    assert!(widget.open().await);

    assert_eq!(widget.messages().len(), 1);
    assert_eq!(widget.messages()[0].body, "a minute ago");
    assert!(widget.persistence_degraded());

    assert!(widget.send_text("still here").await);
    assert_eq!(widget.messages().len(), 2);
}

#[tokio::test]
async fn test_corrupt_record_starts_empty_and_degraded() {
    let h = Harness::new();
    let kv = MemoryKvStore::new();
    let alice = Identity::new(ALICE);
    kv.set(&alice.storage_key(), "{broken").await.unwrap();

    let mut widget = h.widget(kv.clone());
    widget.set_identity(Some(alice.clone())).await;
    assert!(widget.open().await);

    assert!(widget.messages().is_empty());
    assert!(widget.persistence_degraded());
    assert_eq!(
        kv.get(&alice.storage_key()).await.unwrap().as_deref(),
        Some("{broken")
    );

    assert!(widget.send_text("hello").await);
    let persisted = widget.history_store().stored_messages(&alice).await.unwrap();
    assert_eq!(persisted.len(), 1);
    assert_eq!(persisted[0].body, "hello");
}

#[tokio::test]
async fn test_inbound_after_logout_is_dropped() {
    let h = Harness::new();
    let mut widget = h.widget(MemoryKvStore::new());
    widget.set_identity(Some(Identity::new(ALICE))).await;
    widget.logout().await;

    widget.receive(from_admin(ALICE, "late reply")).await;

    assert!(widget.messages().is_empty());
    assert_eq!(widget.unread(), 0);
}

#[tokio::test]
async fn test_customer_and_admin_talk_through_hub() {
    let h = Harness::new();
    let mut customer = h.widget(MemoryKvStore::new());
    let mut admin = h.widget(MemoryKvStore::new());
    customer.set_identity(Some(Identity::new(ALICE))).await;
    admin.set_identity(Some(Identity::new(ADMIN))).await;

    customer.send_text("need help").await;
    let request = admin.next_inbound().await.unwrap();
    assert_eq!(request.from, ALICE);
    admin.receive(request).await;

    assert!(h
        .hub
        .emitted()
        .iter()
        .any(|e| matches!(e, ClientEvent::Message(m) if m.message == "need help")));
    assert_eq!(admin.messages().len(), 1);
}

#[tokio::test]
async fn test_history_survives_restart_with_sqlite() {
    let h = Harness::new();
    let temp_file = NamedTempFile::new().unwrap();
    let db_path = temp_file.path().to_path_buf();
    let alice = Identity::new(ALICE);

    {
        let kv = SqliteKvStore::new(db_path.clone()).await.unwrap();
        let mut widget = h.widget(kv);
        widget.set_identity(Some(alice.clone())).await;
        widget.send_text("before restart").await;
    }

    h.clock.advance(30 * MINUTE);
    let kv = SqliteKvStore::new(db_path).await.unwrap();
    let mut widget = h.widget(kv);
    widget.set_identity(Some(alice)).await;

    assert_eq!(widget.messages().len(), 1);
    assert_eq!(widget.messages()[0].body, "before restart");
    assert!(!widget.persistence_degraded());
}
