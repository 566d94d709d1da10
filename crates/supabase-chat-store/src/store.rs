//! [`MessageStore`] and [`UserDirectory`] over the hosted REST API.
//!
//! PostgREST has no push channel, so each tail subscription runs a polling
//! task that re-reads the newest window and pushes it only when it differs
//! from the last one pushed. Local sends wake all pollers immediately.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use conversation_sync_core::{
    ConversationId, Message, MessageStore, NewMessage, StoreError, TailEvent, TailSubscription,
    UserDirectory, UserProfile,
};
use tokio::sync::{mpsc, Notify};
use tracing::{debug, warn};

use crate::client::SupabaseClient;

/// Default interval between tail polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Hosted message store and user directory.
#[derive(Debug, Clone)]
pub struct SupabaseChatStore {
    client: SupabaseClient,
    poll_interval: Duration,
    wake: Arc<Notify>,
}

impl SupabaseChatStore {
    pub fn new(client: SupabaseClient) -> Self {
        Self {
            client,
            poll_interval: DEFAULT_POLL_INTERVAL,
            wake: Arc::new(Notify::new()),
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn client(&self) -> &SupabaseClient {
        &self.client
    }
}

/// Decides which poll results become tail events.
///
/// A window is pushed only when it differs from the last pushed window. An
/// error is pushed once per failure streak.
#[derive(Debug, Default)]
pub struct TailPoller {
    last_window: Option<Vec<Message>>,
    failing: bool,
}

impl TailPoller {
    /// Starts from a window that was already delivered.
    pub fn with_window(window: Vec<Message>) -> Self {
        Self {
            last_window: Some(window),
            failing: false,
        }
    }

    pub fn observe(&mut self, result: Result<Vec<Message>, StoreError>) -> Option<TailEvent> {
        match result {
            Ok(window) => {
                self.failing = false;
                if self.last_window.as_ref() == Some(&window) {
                    return None;
                }
                self.last_window = Some(window.clone());
                Some(TailEvent::Window(window))
            }
            Err(err) => {
                if self.failing {
                    return None;
                }
                self.failing = true;
                Some(TailEvent::Error(err))
            }
        }
    }
}

async fn poll_tail(
    client: SupabaseClient,
    conversation: ConversationId,
    limit: usize,
    interval: Duration,
    wake: Arc<Notify>,
    mut poller: TailPoller,
    sender: mpsc::UnboundedSender<TailEvent>,
) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = wake.notified() => {}
            _ = sender.closed() => break,
        }

        let result = client
            .latest_messages(&conversation, limit)
            .await
            .map_err(StoreError::from);
        if let Err(err) = &result {
            warn!(conversation = %conversation, error = %err, "tail poll failed");
        }

        if let Some(event) = poller.observe(result) {
            if sender.send(event).is_err() {
                break;
            }
        }
    }
    debug!(conversation = %conversation, "tail poller stopped");
}

#[async_trait]
impl MessageStore for SupabaseChatStore {
    async fn append(
        &self,
        conversation: &ConversationId,
        message: NewMessage,
    ) -> Result<Message, StoreError> {
        let stored = self.client.insert_message(conversation, &message).await?;
        self.wake.notify_waiters();
        Ok(stored)
    }

    async fn subscribe_tail(
        &self,
        conversation: &ConversationId,
        limit: usize,
    ) -> Result<TailSubscription, StoreError> {
        let initial = self.client.latest_messages(conversation, limit).await?;

        let (sender, receiver) = mpsc::unbounded_channel();
        let _ = sender.send(TailEvent::Window(initial.clone()));

        let task = tokio::spawn(poll_tail(
            self.client.clone(),
            conversation.clone(),
            limit,
            self.poll_interval,
            self.wake.clone(),
            TailPoller::with_window(initial),
            sender,
        ));
        let abort = task.abort_handle();

        debug!(conversation = %conversation, limit, "tail poller started");
        Ok(TailSubscription::new(conversation.clone(), receiver, move || {
            abort.abort()
        }))
    }

    async fn page_before(
        &self,
        conversation: &ConversationId,
        cursor: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Message>, StoreError> {
        Ok(self
            .client
            .messages_before(conversation, cursor, limit)
            .await?)
    }
}

#[async_trait]
impl UserDirectory for SupabaseChatStore {
    async fn list_users(&self) -> Result<Vec<UserProfile>, StoreError> {
        Ok(self.client.list_users().await?)
    }

    async fn save_user(&self, user: UserProfile) -> Result<(), StoreError> {
        Ok(self.client.upsert_user(&user).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use conversation_sync_core::{MessageId, ParticipantId};

    fn msg(id: &str, secs: i64) -> Message {
        Message {
            id: MessageId::from(id),
            sender_id: ParticipantId::from("alice"),
            sender_name: "Alice".into(),
            text: id.into(),
            timestamp: Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap(),
        }
    }

    #[test]
    fn poller_pushes_only_changed_windows() {
        let mut poller = TailPoller::with_window(vec![msg("a", 1)]);

        assert_eq!(poller.observe(Ok(vec![msg("a", 1)])), None);
        assert_eq!(
            poller.observe(Ok(vec![msg("a", 1), msg("b", 2)])),
            Some(TailEvent::Window(vec![msg("a", 1), msg("b", 2)]))
        );
        assert_eq!(poller.observe(Ok(vec![msg("a", 1), msg("b", 2)])), None);
    }

    #[test]
    fn poller_reports_each_failure_streak_once() {
        let mut poller = TailPoller::default();
        let err = StoreError::unavailable("HTTP error");

        assert_eq!(
            poller.observe(Err(err.clone())),
            Some(TailEvent::Error(err.clone()))
        );
        assert_eq!(poller.observe(Err(err.clone())), None);

        // Recovery with an unchanged (empty) window is still a first push.
        assert_eq!(
            poller.observe(Ok(Vec::new())),
            Some(TailEvent::Window(Vec::new()))
        );
        assert_eq!(
            poller.observe(Err(err.clone())),
            Some(TailEvent::Error(err))
        );
    }

    #[test]
    fn store_defaults() {
        let client = SupabaseClient::new("https://test.supabase.co", "key").unwrap();
        let store = SupabaseChatStore::new(client).with_poll_interval(Duration::from_millis(250));
        assert_eq!(store.poll_interval, Duration::from_millis(250));
        assert_eq!(
            SupabaseChatStore::new(store.client().clone()).poll_interval,
            DEFAULT_POLL_INTERVAL
        );
    }
}
