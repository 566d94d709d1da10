//! The message store contract.
//!
//! A store persists messages per conversation, assigns ids and timestamps on
//! append, pushes the newest-K window to tail subscribers on every change, and
//! answers cursor queries for older history. Implementations live in their own
//! crates (SQLite, hosted REST) plus [`crate::memory::MemoryMessageStore`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use crate::types::{ConversationId, Message, NewMessage};

/// Errors reported by a store backend.
///
/// Backends convert their own error types into this one so the engine can
/// treat every backend the same way.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// Backend failed or could not be reached.
    #[error("{0}")]
    Unavailable(String),

    /// The request was abandoned before it produced a result.
    #[error("request cancelled")]
    Cancelled,
}

impl StoreError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        StoreError::Unavailable(message.into())
    }
}

/// One push from a tail subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TailEvent {
    /// The full newest-K window, ascending by timestamp. Replaces the
    /// previous window.
    Window(Vec<Message>),
    /// The subscription hit an error. Further windows may or may not follow.
    Error(StoreError),
}

type CancelHook = Box<dyn FnOnce() + Send + 'static>;

/// A live subscription to a conversation's newest messages.
///
/// Cancelling (explicitly or by drop) unregisters the subscription from the
/// store; no events are delivered afterwards.
pub struct TailSubscription {
    conversation_id: ConversationId,
    receiver: mpsc::UnboundedReceiver<TailEvent>,
    on_cancel: Option<CancelHook>,
}

impl TailSubscription {
    /// Wraps the receiving end of a store's tail channel.
    ///
    /// `on_cancel` runs exactly once, on [`cancel`](Self::cancel) or drop.
    pub fn new(
        conversation_id: ConversationId,
        receiver: mpsc::UnboundedReceiver<TailEvent>,
        on_cancel: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            conversation_id,
            receiver,
            on_cancel: Some(Box::new(on_cancel)),
        }
    }

    pub fn conversation_id(&self) -> &ConversationId {
        &self.conversation_id
    }

    /// Waits for the next event. `None` once cancelled or the store hung up.
    pub async fn recv(&mut self) -> Option<TailEvent> {
        if self.is_cancelled() {
            return None;
        }
        self.receiver.recv().await
    }

    /// Returns the next event if one is already queued.
    pub fn try_recv(&mut self) -> Option<TailEvent> {
        if self.is_cancelled() {
            return None;
        }
        self.receiver.try_recv().ok()
    }

    /// Stops delivery and releases the store-side registration. Idempotent.
    pub fn cancel(&mut self) {
        if let Some(hook) = self.on_cancel.take() {
            self.receiver.close();
            hook();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.on_cancel.is_none()
    }
}

impl Drop for TailSubscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl std::fmt::Debug for TailSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TailSubscription")
            .field("conversation_id", &self.conversation_id)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Persistent storage of conversation messages.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Appends a message, assigning its id and timestamp.
    async fn append(
        &self,
        conversation: &ConversationId,
        message: NewMessage,
    ) -> Result<Message, StoreError>;

    /// Subscribes to the newest `limit` messages.
    ///
    /// The current window is pushed immediately (possibly empty), then again
    /// after every change to the conversation.
    async fn subscribe_tail(
        &self,
        conversation: &ConversationId,
        limit: usize,
    ) -> Result<TailSubscription, StoreError>;

    /// Returns up to `limit` messages strictly older than `cursor`, ascending.
    async fn page_before(
        &self,
        conversation: &ConversationId,
        cursor: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Message>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn subscription() -> (
        mpsc::UnboundedSender<TailEvent>,
        TailSubscription,
        Arc<AtomicUsize>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancels = Arc::new(AtomicUsize::new(0));
        let counter = cancels.clone();
        let sub = TailSubscription::new(ConversationId::from("c"), rx, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        (tx, sub, cancels)
    }

    #[test]
    fn try_recv_delivers_in_order() {
        let (tx, mut sub, _) = subscription();
        tx.send(TailEvent::Window(vec![])).unwrap();
        tx.send(TailEvent::Error(StoreError::unavailable("down")))
            .unwrap();

        assert_eq!(sub.try_recv(), Some(TailEvent::Window(vec![])));
        assert_eq!(
            sub.try_recv(),
            Some(TailEvent::Error(StoreError::Unavailable("down".into())))
        );
        assert_eq!(sub.try_recv(), None);
    }

    #[test]
    fn cancel_runs_hook_once_and_stops_delivery() {
        let (tx, mut sub, cancels) = subscription();
        tx.send(TailEvent::Window(vec![])).unwrap();

        sub.cancel();
        sub.cancel();
        assert!(sub.is_cancelled());
        assert_eq!(cancels.load(Ordering::SeqCst), 1);
        assert_eq!(sub.try_recv(), None);
        assert!(tx.send(TailEvent::Window(vec![])).is_err());
    }

    #[test]
    fn drop_cancels() {
        let (_tx, sub, cancels) = subscription();
        drop(sub);
        assert_eq!(cancels.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn recv_returns_none_when_sender_dropped() {
        let (tx, mut sub, _) = subscription();
        drop(tx);
        assert_eq!(sub.recv().await, None);
    }
}
