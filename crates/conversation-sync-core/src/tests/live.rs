//! Sends and live tail pushes.
//!
//! Covered:
//! - a send reaches the view only through the tail
//! - both participants see the same thread
//! - blank text and missing names
//! - store failures on send
//! - tail errors are surfaced and cleared by the next window

use std::sync::Arc;

use super::{alice, bob, config, ids, numbered, numbered_range, open, thread, wait_for};
use crate::memory::{MemoryMessageStore, StoreOp};
use crate::session::{send_message, ConversationSession, DEFAULT_SENDER_NAME};
use crate::store::StoreError;
use crate::{IdScheme, MessageStore, SyncError, ValidationError};

#[tokio::test]
async fn send_arrives_through_tail() {
    let store = Arc::new(MemoryMessageStore::new());
    let mut session = open(&store, config(30, 30)).await;

    let id = session.send_message("hi", Some("Alice")).await.unwrap();
    let view = wait_for(&session, |v| v.messages.len() == 1).await;

    assert_eq!(view.messages[0].id, id);
    assert_eq!(view.messages[0].sender_id, alice());
    assert_eq!(store.messages(&thread()).len(), 1);
    session.close().await;
}

#[tokio::test]
async fn both_sides_share_one_thread() {
    let store = Arc::new(MemoryMessageStore::new());
    let shared: Arc<dyn MessageStore> = store.clone();

    let mut alice_side = open(&store, config(10, 10)).await;
    let mut bob_side = ConversationSession::open(shared, bob(), alice(), config(10, 10))
        .await
        .unwrap();
    assert_eq!(alice_side.conversation_id(), bob_side.conversation_id());

    alice_side.send_message("ping", Some("Alice")).await.unwrap();
    bob_side.send_message("pong", Some("Bob")).await.unwrap();

    for session in [&alice_side, &bob_side] {
        let view = wait_for(session, |v| v.messages.len() == 2).await;
        let texts: Vec<&str> = view.messages.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["ping", "pong"]);
    }

    alice_side.close().await;
    bob_side.close().await;
}

#[tokio::test]
async fn blank_text_is_rejected_without_store_call() {
    let store = Arc::new(MemoryMessageStore::new());
    let mut session = open(&store, config(10, 10)).await;

    assert_eq!(
        session.send_message("   \n", Some("Alice")).await,
        Err(SyncError::Validation(ValidationError::EmptyText))
    );
    assert!(store.messages(&thread()).is_empty());
    session.close().await;
}

#[tokio::test]
async fn missing_sender_name_falls_back() {
    let store = Arc::new(MemoryMessageStore::new());

    send_message(store.as_ref(), IdScheme::default(), &alice(), &bob(), "hey", None)
        .await
        .unwrap();
    send_message(store.as_ref(), IdScheme::default(), &alice(), &bob(), "again", Some(" "))
        .await
        .unwrap();

    let stored = store.messages(&thread());
    assert_eq!(stored.len(), 2);
    assert!(stored.iter().all(|m| m.sender_name == DEFAULT_SENDER_NAME));
}

#[tokio::test]
async fn send_uses_the_requested_id_scheme() {
    let store = Arc::new(MemoryMessageStore::new());
    send_message(store.as_ref(), IdScheme::LegacyJoin, &bob(), &alice(), "old", None)
        .await
        .unwrap();

    let legacy = crate::ConversationId::from("alice_bob");
    assert_eq!(store.messages(&legacy).len(), 1);
    assert!(store.messages(&thread()).is_empty());
}

#[tokio::test]
async fn send_failure_is_reported_and_view_untouched() {
    let store = Arc::new(MemoryMessageStore::new());
    store.seed(&thread(), numbered_range(0..2));
    let mut session = open(&store, config(10, 10)).await;
    wait_for(&session, |v| v.messages.len() == 2).await;

    store.fail_next(StoreOp::Append, StoreError::unavailable("offline"));
    assert_eq!(
        session.send_message("lost", None).await,
        Err(SyncError::StoreUnavailable(StoreError::Unavailable(
            "offline".into()
        )))
    );
    assert_eq!(ids(&session.snapshot().messages), vec!["m000", "m001"]);
    session.close().await;
}

#[tokio::test]
async fn tail_error_is_surfaced_then_cleared() {
    let store = Arc::new(MemoryMessageStore::new());
    let mut session = open(&store, config(10, 10)).await;

    store.push_tail_error(&thread(), StoreError::unavailable("socket closed"));
    let view = wait_for(&session, |v| v.tail_error.is_some()).await;
    assert_eq!(
        view.tail_error,
        Some(StoreError::Unavailable("socket closed".into()))
    );

    store.insert(&thread(), numbered(1));
    let view = wait_for(&session, |v| v.messages.len() == 1).await;
    assert_eq!(view.tail_error, None);
    session.close().await;
}

#[tokio::test]
async fn open_fails_when_subscribe_fails() {
    let store = Arc::new(MemoryMessageStore::new());
    store.fail_next(StoreOp::Subscribe, StoreError::unavailable("down"));

    let shared: Arc<dyn MessageStore> = store.clone();
    let result = ConversationSession::open(shared, alice(), bob(), config(10, 10)).await;
    assert!(matches!(result, Err(SyncError::StoreUnavailable(_))));
}

#[tokio::test]
async fn window_slides_with_new_messages() {
    let store = Arc::new(MemoryMessageStore::new());
    store.seed(&thread(), numbered_range(0..3));
    let mut session = open(&store, config(3, 3)).await;
    wait_for(&session, |v| v.messages.len() == 3).await;

    for n in 3..6 {
        store.insert(&thread(), numbered(n));
    }
    let view = wait_for(&session, |v| v.messages.len() == 6).await;
    assert_eq!(
        ids(&view.messages),
        vec!["m000", "m001", "m002", "m003", "m004", "m005"]
    );
    assert_eq!(store.tail_subscriber_count(&thread()), 1);
    session.close().await;
}
