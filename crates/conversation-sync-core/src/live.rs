//! Tail fan-out for store implementations.
//!
//! A store registers each tail subscriber here together with its window size.
//! After a committed change, the store calls [`TailHub::publish`] with a
//! function that reads the newest-N window; the hub computes one window per
//! distinct N and pushes it to every live subscriber of that conversation.
//!
//! Cancelled or dropped subscriptions unregister themselves; dead senders are
//! also pruned on publish.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::store::{StoreError, TailEvent, TailSubscription};
use crate::types::{ConversationId, Message};

#[derive(Debug)]
struct Subscriber {
    id: u64,
    limit: usize,
    sender: mpsc::UnboundedSender<TailEvent>,
}

/// Registry of tail subscribers for all conversations.
#[derive(Debug, Default)]
pub struct TailHub {
    subscribers: Mutex<HashMap<ConversationId, Vec<Subscriber>>>,
    next_id: AtomicU64,
}

impl TailHub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Registers a subscriber and pushes `initial_window` to it.
    ///
    /// The caller must read `initial_window` under the same lock that guards
    /// its writes, so no change can slip between the read and registration.
    pub fn subscribe(
        self: &Arc<Self>,
        conversation: &ConversationId,
        limit: usize,
        initial_window: Vec<Message>,
    ) -> TailSubscription {
        let (sender, receiver) = mpsc::unbounded_channel();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        // Cannot fail: the receiver is still alive.
        let _ = sender.send(TailEvent::Window(initial_window));

        self.lock()
            .entry(conversation.clone())
            .or_default()
            .push(Subscriber { id, limit, sender });

        debug!(conversation = %conversation, subscriber = id, limit, "tail subscribed");

        let hub: Weak<TailHub> = Arc::downgrade(self);
        let key = conversation.clone();
        TailSubscription::new(conversation.clone(), receiver, move || {
            if let Some(hub) = hub.upgrade() {
                hub.unsubscribe(&key, id);
            }
        })
    }

    /// Pushes a fresh window to every subscriber of `conversation`.
    ///
    /// `window` is called once per distinct subscriber limit. If it fails,
    /// affected subscribers receive [`TailEvent::Error`] instead.
    pub fn publish<F>(&self, conversation: &ConversationId, mut window: F)
    where
        F: FnMut(usize) -> Result<Vec<Message>, StoreError>,
    {
        let mut subscribers = self.lock();
        let Some(list) = subscribers.get_mut(conversation) else {
            return;
        };

        let mut windows: BTreeMap<usize, TailEvent> = BTreeMap::new();
        for subscriber in list.iter() {
            windows.entry(subscriber.limit).or_insert_with(|| {
                match window(subscriber.limit) {
                    Ok(messages) => TailEvent::Window(messages),
                    Err(err) => {
                        warn!(conversation = %conversation, error = %err, "tail window read failed");
                        TailEvent::Error(err)
                    }
                }
            });
        }

        list.retain(|subscriber| match windows.get(&subscriber.limit) {
            Some(event) => subscriber.sender.send(event.clone()).is_ok(),
            None => true,
        });
        if list.is_empty() {
            subscribers.remove(conversation);
        }
    }

    /// Pushes an error to every subscriber of `conversation`.
    pub fn publish_error(&self, conversation: &ConversationId, err: StoreError) {
        let mut subscribers = self.lock();
        if let Some(list) = subscribers.get_mut(conversation) {
            list.retain(|subscriber| subscriber.sender.send(TailEvent::Error(err.clone())).is_ok());
        }
    }

    /// Limits of the live subscribers of `conversation`.
    pub fn limits(&self, conversation: &ConversationId) -> Vec<usize> {
        self.lock()
            .get(conversation)
            .map(|list| list.iter().map(|s| s.limit).collect())
            .unwrap_or_default()
    }

    /// Conversations with at least one subscriber.
    pub fn conversations(&self) -> Vec<ConversationId> {
        self.lock().keys().cloned().collect()
    }

    pub fn subscriber_count(&self, conversation: &ConversationId) -> usize {
        self.lock().get(conversation).map_or(0, Vec::len)
    }

    fn unsubscribe(&self, conversation: &ConversationId, id: u64) {
        let mut subscribers = self.lock();
        if let Some(list) = subscribers.get_mut(conversation) {
            list.retain(|subscriber| subscriber.id != id);
            if list.is_empty() {
                subscribers.remove(conversation);
            }
        }
        debug!(conversation = %conversation, subscriber = id, "tail unsubscribed");
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ConversationId, Vec<Subscriber>>> {
        self.subscribers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
