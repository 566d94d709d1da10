//! In-memory message store and user directory.
//!
//! Used by the engine and CLI tests. Supports failure injection and can hold
//! page requests open to exercise in-flight behavior.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::Semaphore;
use tracing::debug;

use crate::directory::UserDirectory;
use crate::live::TailHub;
use crate::policy::compare_messages;
use crate::store::{MessageStore, StoreError, TailSubscription};
use crate::types::{ConversationId, Message, MessageId, NewMessage, ParticipantId, UserProfile};

/// Operations that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Append,
    Subscribe,
    Page,
    ListUsers,
    SaveUser,
}

#[derive(Debug, Default)]
struct MemoryState {
    conversations: HashMap<ConversationId, Vec<Message>>,
    users: BTreeMap<ParticipantId, UserProfile>,
    failures: HashMap<StoreOp, VecDeque<StoreError>>,
}

impl MemoryState {
    fn take_failure(&mut self, op: StoreOp) -> Result<(), StoreError> {
        match self.failures.get_mut(&op).and_then(VecDeque::pop_front) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn window(&self, conversation: &ConversationId, limit: usize) -> Vec<Message> {
        let messages = self
            .conversations
            .get(conversation)
            .map(Vec::as_slice)
            .unwrap_or_default();
        messages[messages.len().saturating_sub(limit)..].to_vec()
    }

    fn insert(&mut self, conversation: &ConversationId, message: Message) {
        let messages = self.conversations.entry(conversation.clone()).or_default();
        let at = messages.partition_point(|m| compare_messages(m, &message).is_le());
        messages.insert(at, message);
    }
}

/// Message store and user directory held in process memory.
#[derive(Debug)]
pub struct MemoryMessageStore {
    state: Mutex<MemoryState>,
    hub: Arc<TailHub>,
    page_requests: AtomicUsize,
    page_gate: Mutex<Option<Arc<Semaphore>>>,
}

impl Default for MemoryMessageStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryMessageStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            hub: TailHub::new(),
            page_requests: AtomicUsize::new(0),
            page_gate: Mutex::new(None),
        }
    }

    /// Inserts an existing message as if another client had appended it, and
    /// pushes the change to tail subscribers.
    pub fn insert(&self, conversation: &ConversationId, message: Message) {
        let mut state = self.state();
        state.insert(conversation, message);
        self.hub
            .publish(conversation, |limit| Ok(state.window(conversation, limit)));
    }

    /// Inserts messages without notifying subscribers.
    pub fn seed(&self, conversation: &ConversationId, messages: impl IntoIterator<Item = Message>) {
        let mut state = self.state();
        for message in messages {
            state.insert(conversation, message);
        }
    }

    /// All stored messages of a conversation, ascending.
    pub fn messages(&self, conversation: &ConversationId) -> Vec<Message> {
        self.state()
            .conversations
            .get(conversation)
            .cloned()
            .unwrap_or_default()
    }

    /// Makes the next call of `op` fail with `err`. Queued failures are
    /// consumed in order.
    pub fn fail_next(&self, op: StoreOp, err: StoreError) {
        self.state().failures.entry(op).or_default().push_back(err);
    }

    /// Pushes an error event to every tail subscriber of `conversation`.
    pub fn push_tail_error(&self, conversation: &ConversationId, err: StoreError) {
        self.hub.publish_error(conversation, err);
    }

    /// Number of `page_before` calls received so far.
    pub fn page_request_count(&self) -> usize {
        self.page_requests.load(Ordering::SeqCst)
    }

    pub fn tail_subscriber_count(&self, conversation: &ConversationId) -> usize {
        self.hub.subscriber_count(conversation)
    }

    /// Blocks subsequent `page_before` calls until [`release_pages`](Self::release_pages).
    pub fn hold_pages(&self) {
        *self.gate() = Some(Arc::new(Semaphore::new(0)));
    }

    /// Lets held and future `page_before` calls proceed.
    pub fn release_pages(&self) {
        if let Some(gate) = self.gate().take() {
            gate.close();
        }
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn gate(&self) -> MutexGuard<'_, Option<Arc<Semaphore>>> {
        self.page_gate.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl MessageStore for MemoryMessageStore {
    async fn append(
        &self,
        conversation: &ConversationId,
        message: NewMessage,
    ) -> Result<Message, StoreError> {
        let mut state = self.state();
        state.take_failure(StoreOp::Append)?;

        // Timestamps never go backwards within a conversation.
        let mut timestamp = Utc::now();
        if let Some(last) = state.conversations.get(conversation).and_then(|m| m.last()) {
            if timestamp <= last.timestamp {
                timestamp = last.timestamp + Duration::microseconds(1);
            }
        }

        let stored = Message {
            id: MessageId::new(),
            sender_id: message.sender_id,
            sender_name: message.sender_name,
            text: message.text,
            timestamp,
        };
        state.insert(conversation, stored.clone());
        self.hub
            .publish(conversation, |limit| Ok(state.window(conversation, limit)));

        debug!(conversation = %conversation, message_id = %stored.id, "message appended");
        Ok(stored)
    }

    async fn subscribe_tail(
        &self,
        conversation: &ConversationId,
        limit: usize,
    ) -> Result<TailSubscription, StoreError> {
        let mut state = self.state();
        state.take_failure(StoreOp::Subscribe)?;
        let initial = state.window(conversation, limit);
        Ok(self.hub.subscribe(conversation, limit, initial))
    }

    async fn page_before(
        &self,
        conversation: &ConversationId,
        cursor: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Message>, StoreError> {
        self.page_requests.fetch_add(1, Ordering::SeqCst);

        let gate = self.gate().clone();
        if let Some(gate) = gate {
            // Closing the semaphore is the release signal.
            let _ = gate.acquire().await;
        }

        let mut state = self.state();
        state.take_failure(StoreOp::Page)?;
        let messages = state
            .conversations
            .get(conversation)
            .map(Vec::as_slice)
            .unwrap_or_default();
        let older = &messages[..messages.partition_point(|m| m.timestamp < cursor)];
        Ok(older[older.len().saturating_sub(limit)..].to_vec())
    }
}

#[async_trait]
impl UserDirectory for MemoryMessageStore {
    async fn list_users(&self) -> Result<Vec<UserProfile>, StoreError> {
        let mut state = self.state();
        state.take_failure(StoreOp::ListUsers)?;
        Ok(state.users.values().cloned().collect())
    }

    async fn save_user(&self, user: UserProfile) -> Result<(), StoreError> {
        let mut state = self.state();
        state.take_failure(StoreOp::SaveUser)?;
        state.users.insert(user.id.clone(), user);
        Ok(())
    }
}
