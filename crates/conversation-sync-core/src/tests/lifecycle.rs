//! Session open and teardown.
//!
//! Covered:
//! - close cancels the tail subscription
//! - calls after close fail with `Closed`
//! - page results arriving after close are discarded
//! - dropping the handle tears the session down
//! - invalid participants and limits are rejected at open

use std::sync::Arc;
use std::time::Duration;

use super::{alice, config, numbered, numbered_range, open, thread, wait_for};
use crate::memory::MemoryMessageStore;
use crate::session::{ConversationSession, SessionConfig};
use crate::types::ParticipantId;
use crate::{MessageStore, SyncError, ValidationError};

async fn eventually<F: Fn() -> bool>(check: F) {
    for _ in 0..100 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached");
}

#[tokio::test]
async fn close_cancels_subscription() {
    let store = Arc::new(MemoryMessageStore::new());
    let mut session = open(&store, config(5, 5)).await;
    assert_eq!(store.tail_subscriber_count(&thread()), 1);

    session.close().await;
    assert_eq!(store.tail_subscriber_count(&thread()), 0);
    assert!(session.snapshot().closed);

    // Pushes after close go nowhere.
    store.insert(&thread(), numbered(1));
    assert!(session.snapshot().messages.is_empty());
}

#[tokio::test]
async fn calls_after_close_fail() {
    let store = Arc::new(MemoryMessageStore::new());
    let mut session = open(&store, config(5, 5)).await;
    session.close().await;

    assert_eq!(session.send_message("hi", None).await, Err(SyncError::Closed));
    assert_eq!(session.load_older_page().await, Err(SyncError::Closed));
    assert!(store.messages(&thread()).is_empty());

    // Closing twice is harmless.
    session.close().await;
}

#[tokio::test]
async fn late_page_result_is_discarded() {
    let store = Arc::new(MemoryMessageStore::new());
    store.seed(&thread(), numbered_range(0..10));
    let mut session = open(&store, config(3, 3)).await;
    wait_for(&session, |v| v.messages.len() == 3).await;

    store.hold_pages();
    let pending = session.load_older_page();
    eventually(|| store.page_request_count() == 1).await;

    session.close().await;
    store.release_pages();

    assert_eq!(pending.await, Err(SyncError::Closed));
    let view = session.snapshot();
    assert!(view.closed);
    assert_eq!(view.messages.len(), 3);
}

#[tokio::test]
async fn dropping_the_handle_tears_down() {
    let store = Arc::new(MemoryMessageStore::new());
    let session = open(&store, config(5, 5)).await;
    assert_eq!(store.tail_subscriber_count(&thread()), 1);

    drop(session);
    eventually(|| store.tail_subscriber_count(&thread()) == 0).await;
}

#[tokio::test]
async fn open_rejects_bad_input() {
    let store: Arc<dyn MessageStore> = Arc::new(MemoryMessageStore::new());

    let blank = ConversationSession::open(
        store.clone(),
        alice(),
        ParticipantId::from(""),
        SessionConfig::default(),
    )
    .await;
    assert!(matches!(
        blank,
        Err(SyncError::Validation(ValidationError::EmptyParticipant))
    ));

    let zero_tail = ConversationSession::open(
        store,
        alice(),
        ParticipantId::from("bob"),
        config(0, 5),
    )
    .await;
    assert!(matches!(
        zero_tail,
        Err(SyncError::Validation(ValidationError::ZeroLimit))
    ));
}
