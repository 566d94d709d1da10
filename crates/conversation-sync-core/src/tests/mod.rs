//! Integration tests for the conversation sync engine.
//!
//! - `ordering.rs`   - merged list stays deduplicated and ascending under any
//!   interleaving of tail windows and page results
//! - `pagination.rs` - older pages through a live session
//! - `live.rs`       - sends, tail pushes, and tail errors
//! - `lifecycle.rs`  - open, close, and late responses

mod lifecycle;
mod live;
mod ordering;

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, TimeZone, Utc};

use crate::memory::MemoryMessageStore;
use crate::session::{ConversationSession, SessionConfig};
use crate::types::{ConversationId, Message, MessageId, ParticipantId};
use crate::view::ViewSnapshot;
use crate::{conversation_id, MessageStore};

pub(crate) fn alice() -> ParticipantId {
    ParticipantId::from("alice")
}

pub(crate) fn bob() -> ParticipantId {
    ParticipantId::from("bob")
}

pub(crate) fn thread() -> ConversationId {
    conversation_id(&alice(), &bob()).unwrap()
}

pub(crate) fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
}

/// Message `m{n}` from alice at second `n`.
pub(crate) fn numbered(n: i64) -> Message {
    Message {
        id: MessageId::from(format!("m{n:03}")),
        sender_id: alice(),
        sender_name: "Alice".into(),
        text: format!("message {n}"),
        timestamp: at(n),
    }
}

pub(crate) fn numbered_range(range: std::ops::Range<i64>) -> Vec<Message> {
    range.map(numbered).collect()
}

pub(crate) fn ids(messages: &[Message]) -> Vec<String> {
    messages.iter().map(|m| m.id.to_string()).collect()
}

pub(crate) fn assert_ordered_unique(messages: &[Message]) {
    let mut seen = std::collections::HashSet::new();
    for message in messages {
        assert!(seen.insert(&message.id), "duplicate id {}", message.id);
    }
    for pair in messages.windows(2) {
        assert!(
            crate::policy::compare_messages(&pair[0], &pair[1]) != std::cmp::Ordering::Greater,
            "{} after {}",
            pair[0].id,
            pair[1].id
        );
    }
}

pub(crate) fn config(tail: usize, page: usize) -> SessionConfig {
    SessionConfig {
        tail_limit: tail,
        page_limit: page,
        ..SessionConfig::default()
    }
}

/// Opens a session for alice on `store`.
pub(crate) async fn open(store: &Arc<MemoryMessageStore>, config: SessionConfig) -> ConversationSession {
    let store: Arc<dyn MessageStore> = store.clone();
    ConversationSession::open(store, alice(), bob(), config)
        .await
        .unwrap()
}

/// Waits until the session's view satisfies `predicate`.
pub(crate) async fn wait_for<F>(session: &ConversationSession, predicate: F) -> ViewSnapshot
where
    F: FnMut(&ViewSnapshot) -> bool,
{
    let mut watch = session.watch();
    let snapshot = tokio::time::timeout(StdDuration::from_secs(5), watch.wait_for(predicate))
        .await
        .expect("timed out waiting for view")
        .expect("session dropped");
    snapshot.clone()
}

/// Basic workflow: open, receive the tail, page back, send, close.
#[tokio::test]
async fn basic_workflow() {
    let store = Arc::new(MemoryMessageStore::new());
    store.seed(&thread(), numbered_range(0..5));

    let mut session = open(&store, config(3, 2)).await;
    let view = wait_for(&session, |v| v.messages.len() == 3).await;
    assert_eq!(ids(&view.messages), vec!["m002", "m003", "m004"]);

    assert_eq!(session.load_older_page().await, Ok(2));
    assert_eq!(ids(&session.snapshot().messages), vec!["m000", "m001", "m002", "m003", "m004"]);

    let sent = session.send_message("  hello bob  ", Some("Alice")).await.unwrap();
    let view = wait_for(&session, |v| v.messages.iter().any(|m| m.id == sent)).await;
    let last = view.messages.last().unwrap();
    assert_eq!(last.text, "hello bob");
    assert_eq!(last.sender_name, "Alice");
    assert_ordered_unique(&view.messages);

    session.close().await;
    assert!(session.is_closed());
}
