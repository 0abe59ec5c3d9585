//! Integration tests for the delivery flow, driven against a recording
//! transport instead of a live bot.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use linkdrop::bot::delivery::{self, EXPIRED_TEXT, NETWORK_ERROR_TEXT};
use linkdrop::bot::transport::{RelayTransport, TransportError};
use linkdrop::store::{JsonFileStore, MediaDescriptor, MediaKind, MediaStore};
use pretty_assertions::assert_eq;
use teloxide::types::{ChatId, MessageId};
use tokio::sync::Mutex;

const CHAT: ChatId = ChatId(42);

/// Everything the flow sent through the transport, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Event {
    Media { id: i32, file_id: String },
    Status { id: i32, text: String, key: String },
    Notice { text: String },
    Delete { id: i32 },
    Edit { id: i32, text: String, key: String },
}

/// Scripted outcome for one send call; the default is success.
#[derive(Debug, Clone, Copy)]
enum Outcome {
    Ok,
    Connectivity,
    Api,
}

impl Outcome {
    fn into_error(self) -> Option<TransportError> {
        match self {
            Self::Ok => None,
            Self::Connectivity => Some(TransportError::Connectivity(
                "connection reset by peer".to_string(),
            )),
            Self::Api => Some(TransportError::Api(
                "Bad Request: wrong file identifier".to_string(),
            )),
        }
    }
}

#[derive(Default)]
struct MockTransport {
    events: Mutex<Vec<Event>>,
    last_id: Mutex<i32>,
    media_outcomes: Mutex<Vec<Outcome>>,
    status_outcomes: Mutex<Vec<Outcome>>,
}

impl MockTransport {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn with_media_outcomes(outcomes: Vec<Outcome>) -> Arc<Self> {
        Arc::new(Self {
            media_outcomes: Mutex::new(outcomes),
            ..Self::default()
        })
    }

    fn with_status_outcomes(outcomes: Vec<Outcome>) -> Arc<Self> {
        Arc::new(Self {
            status_outcomes: Mutex::new(outcomes),
            ..Self::default()
        })
    }

    async fn alloc_id(&self) -> i32 {
        let mut last = self.last_id.lock().await;
        *last += 1;
        *last
    }

    async fn scripted(&self, outcomes: &Mutex<Vec<Outcome>>) -> Option<TransportError> {
        let mut outcomes = outcomes.lock().await;
        if outcomes.is_empty() {
            None
        } else {
            outcomes.remove(0).into_error()
        }
    }

    async fn record(&self, event: Event) {
        self.events.lock().await.push(event);
    }

    async fn events(&self) -> Vec<Event> {
        self.events.lock().await.clone()
    }
}

#[async_trait]
impl RelayTransport for MockTransport {
    async fn send_media(
        &self,
        _chat: ChatId,
        descriptor: &MediaDescriptor,
    ) -> Result<MessageId, TransportError> {
        if let Some(error) = self.scripted(&self.media_outcomes).await {
            return Err(error);
        }
        let id = self.alloc_id().await;
        self.record(Event::Media {
            id,
            file_id: descriptor.file_id.clone(),
        })
        .await;
        Ok(MessageId(id))
    }

    async fn send_status(
        &self,
        _chat: ChatId,
        text: &str,
        key: &str,
    ) -> Result<MessageId, TransportError> {
        if let Some(error) = self.scripted(&self.status_outcomes).await {
            return Err(error);
        }
        let id = self.alloc_id().await;
        self.record(Event::Status {
            id,
            text: text.to_string(),
            key: key.to_string(),
        })
        .await;
        Ok(MessageId(id))
    }

    async fn send_notice(&self, _chat: ChatId, text: &str) -> Result<(), TransportError> {
        self.record(Event::Notice {
            text: text.to_string(),
        })
        .await;
        Ok(())
    }

    async fn delete_message(
        &self,
        _chat: ChatId,
        message: MessageId,
    ) -> Result<(), TransportError> {
        self.record(Event::Delete { id: message.0 }).await;
        Ok(())
    }

    async fn edit_status(
        &self,
        _chat: ChatId,
        message: MessageId,
        text: &str,
        key: &str,
    ) -> Result<(), TransportError> {
        self.record(Event::Edit {
            id: message.0,
            text: text.to_string(),
            key: key.to_string(),
        })
        .await;
        Ok(())
    }
}

/// Store seeded with `keys`; each key maps to the file id `file-<key>`.
async fn seeded_store(keys: &[(&str, MediaKind)]) -> (tempfile::TempDir, JsonFileStore) {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = JsonFileStore::load(dir.path().join("store.json")).await;
    for (key, kind) in keys {
        store
            .put(
                (*key).to_string(),
                MediaDescriptor {
                    file_id: format!("file-{key}"),
                    kind: *kind,
                },
            )
            .await;
    }
    (dir, store)
}

fn short_delay() -> Duration {
    Duration::from_millis(20)
}

#[tokio::test]
async fn test_unknown_key_produces_no_outbound_traffic() {
    let (_dir, store) = seeded_store(&[]).await;
    let mock = MockTransport::new();

    let handles =
        delivery::deliver_keys(mock.clone(), &store, CHAT, "unknownKey", short_delay()).await;

    assert!(handles.is_empty());
    assert_eq!(mock.events().await, vec![]);
}

#[tokio::test]
async fn test_mixed_keys_deliver_only_the_existing_one() {
    let (_dir, store) = seeded_store(&[("abc123XY", MediaKind::Photo)]).await;
    let mock = MockTransport::new();

    let handles = delivery::deliver_keys(
        mock.clone(),
        &store,
        CHAT,
        "abc123XY,unknownKey",
        short_delay(),
    )
    .await;
    assert_eq!(handles.len(), 1);
    for handle in handles {
        handle.join().await;
    }

    let events = mock.events().await;
    let media: Vec<_> = events
        .iter()
        .filter(|e| matches!(e, Event::Media { .. }))
        .collect();
    assert_eq!(media.len(), 1);
    assert!(
        !events.iter().any(|e| matches!(e, Event::Notice { .. })),
        "unknown keys must fail silently: {events:?}"
    );
}

#[tokio::test]
async fn test_expiry_removes_media_and_marks_status() {
    let (_dir, store) = seeded_store(&[("abc123XY", MediaKind::Video)]).await;
    let mock = MockTransport::new();

    let handles =
        delivery::deliver_keys(mock.clone(), &store, CHAT, "abc123XY", short_delay()).await;
    for handle in handles {
        handle.join().await;
    }

    let events = mock.events().await;
    let media_id = events
        .iter()
        .find_map(|e| match e {
            Event::Media { id, .. } => Some(*id),
            _ => None,
        })
        .expect("media sent");
    let status_id = events
        .iter()
        .find_map(|e| match e {
            Event::Status { id, .. } => Some(*id),
            _ => None,
        })
        .expect("status sent");

    assert!(events.contains(&Event::Delete { id: media_id }));
    assert!(events.contains(&Event::Edit {
        id: status_id,
        text: EXPIRED_TEXT.to_string(),
        key: "abc123XY".to_string(),
    }));
}

#[tokio::test]
async fn test_retry_rearms_an_independent_timer() {
    let (_dir, store) = seeded_store(&[("abc123XY", MediaKind::Photo)]).await;
    let mock = MockTransport::new();

    // First delivery, then a second one as the retry button would trigger it
    let first = delivery::deliver_keys(mock.clone(), &store, CHAT, "abc123XY", short_delay()).await;
    let second =
        delivery::deliver_keys(mock.clone(), &store, CHAT, "abc123XY", short_delay()).await;
    for handle in first.into_iter().chain(second) {
        handle.join().await;
    }

    let events = mock.events().await;
    let deleted: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            Event::Delete { id } => Some(*id),
            _ => None,
        })
        .collect();
    assert_eq!(deleted.len(), 2);
    assert_ne!(deleted[0], deleted[1], "each delivery owns its own timer");
}

#[tokio::test]
async fn test_connectivity_failure_reports_network_notice() {
    let (_dir, store) = seeded_store(&[("abc123XY", MediaKind::Photo)]).await;
    let mock = MockTransport::with_media_outcomes(vec![Outcome::Connectivity]);

    let handles =
        delivery::deliver_keys(mock.clone(), &store, CHAT, "abc123XY", short_delay()).await;

    assert!(handles.is_empty());
    assert_eq!(
        mock.events().await,
        vec![Event::Notice {
            text: NETWORK_ERROR_TEXT.to_string(),
        }]
    );
}

#[tokio::test]
async fn test_api_failure_reports_the_error_text() {
    let (_dir, store) = seeded_store(&[("abc123XY", MediaKind::Photo)]).await;
    let mock = MockTransport::with_media_outcomes(vec![Outcome::Api]);

    let handles =
        delivery::deliver_keys(mock.clone(), &store, CHAT, "abc123XY", short_delay()).await;

    assert!(handles.is_empty());
    let events = mock.events().await;
    match &events[..] {
        [Event::Notice { text }] => {
            assert!(text.contains("Failed to send file"), "notice: {text}");
            assert!(text.contains("wrong file identifier"), "notice: {text}");
        }
        other => panic!("expected a single notice, got {other:?}"),
    }
}

#[tokio::test]
async fn test_failed_key_does_not_abort_the_rest() {
    let (_dir, store) = seeded_store(&[
        ("k1aaaaaa", MediaKind::Photo),
        ("k2bbbbbb", MediaKind::Video),
    ])
    .await;
    let mock = MockTransport::with_media_outcomes(vec![Outcome::Api]);

    let handles = delivery::deliver_keys(
        mock.clone(),
        &store,
        CHAT,
        "k1aaaaaa,k2bbbbbb",
        short_delay(),
    )
    .await;
    assert_eq!(handles.len(), 1);
    for handle in handles {
        handle.join().await;
    }

    let events = mock.events().await;
    assert!(events.iter().any(|e| matches!(e, Event::Notice { .. })));
    assert!(events.iter().any(
        |e| matches!(e, Event::Media { file_id, .. } if file_id == "file-k2bbbbbb")
    ));
}

#[tokio::test]
async fn test_status_failure_leaves_media_without_a_timer() {
    let (_dir, store) = seeded_store(&[("abc123XY", MediaKind::Photo)]).await;
    let mock = MockTransport::with_status_outcomes(vec![Outcome::Api]);

    let handles =
        delivery::deliver_keys(mock.clone(), &store, CHAT, "abc123XY", short_delay()).await;

    // No timer was armed: the orphaned media message is never deleted
    assert!(handles.is_empty());
    let events = mock.events().await;
    assert!(events.iter().any(|e| matches!(e, Event::Media { .. })));
    assert!(events.iter().any(|e| matches!(e, Event::Notice { .. })));
    assert!(!events.iter().any(|e| matches!(e, Event::Delete { .. })));
}

#[tokio::test]
async fn test_cancel_prevents_the_expiry_phase() {
    let (_dir, store) = seeded_store(&[("abc123XY", MediaKind::Photo)]).await;
    let mock = MockTransport::new();

    let handles = delivery::deliver_keys(
        mock.clone(),
        &store,
        CHAT,
        "abc123XY",
        Duration::from_secs(30),
    )
    .await;
    for handle in &handles {
        handle.cancel();
    }
    for handle in handles {
        handle.join().await;
    }

    let events = mock.events().await;
    assert!(!events.iter().any(|e| matches!(e, Event::Delete { .. })));
    assert!(!events.iter().any(|e| matches!(e, Event::Edit { .. })));
}

#[tokio::test]
async fn test_status_message_counts_down_the_delay() {
    let (_dir, store) = seeded_store(&[("abc123XY", MediaKind::Photo)]).await;
    let mock = MockTransport::new();

    let handles = delivery::deliver_keys(
        mock.clone(),
        &store,
        CHAT,
        "abc123XY",
        Duration::from_secs(15),
    )
    .await;
    for handle in &handles {
        handle.cancel();
    }
    for handle in handles {
        handle.join().await;
    }

    let events = mock.events().await;
    let status_text = events
        .iter()
        .find_map(|e| match e {
            Event::Status { text, key, .. } if key == "abc123XY" => Some(text.clone()),
            _ => None,
        })
        .expect("status sent");
    assert!(status_text.contains("15 seconds"), "status: {status_text}");
}
