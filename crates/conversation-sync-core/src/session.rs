//! The conversation session actor.
//!
//! A [`ConversationSession`] owns one [`ConversationView`] on a spawned task.
//! Callers talk to it through a queue; store calls run on their own tasks and
//! post their results back into the same queue, so the view is only ever
//! touched by the actor. Tail windows and page results are therefore applied
//! one at a time, in arrival order.
//!
//! [`close`](ConversationSession::close) cancels the tail subscription and
//! stops the actor. Page results that arrive afterwards find the queue gone
//! and are dropped; every later call returns [`SyncError::Closed`].

use std::future::Future;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::identity::IdScheme;
use crate::store::{MessageStore, StoreError, TailEvent, TailSubscription};
use crate::types::{ConversationId, Message, MessageId, NewMessage, ParticipantId};
use crate::view::{validate_limit, ConversationView, OlderPageRequest, ViewSnapshot};
use crate::{SyncError, ValidationError};

/// Name stored with a message when the sender has no display name.
pub const DEFAULT_SENDER_NAME: &str = "Me";

/// Window sizes for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Newest messages kept live (K).
    pub tail_limit: usize,
    /// Messages per older page (L).
    pub page_limit: usize,
    pub id_scheme: IdScheme,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            tail_limit: 30,
            page_limit: 30,
            id_scheme: IdScheme::default(),
        }
    }
}

/// Appends a message to the conversation between `from` and `to`.
///
/// The text is trimmed and must not be empty. Nothing is added to any local
/// view; the message shows up through the tail subscription.
pub async fn send_message(
    store: &dyn MessageStore,
    scheme: IdScheme,
    from: &ParticipantId,
    to: &ParticipantId,
    text: &str,
    sender_name: Option<&str>,
) -> Result<MessageId, SyncError> {
    let conversation = scheme.conversation_id(from, to)?;
    let message = new_message(from, text, sender_name)?;
    append(store, &conversation, message).await
}

fn new_message(
    from: &ParticipantId,
    text: &str,
    sender_name: Option<&str>,
) -> Result<NewMessage, ValidationError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(ValidationError::EmptyText);
    }
    let sender_name = sender_name
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .unwrap_or(DEFAULT_SENDER_NAME);

    Ok(NewMessage {
        sender_id: from.clone(),
        sender_name: sender_name.to_string(),
        text: text.to_string(),
    })
}

async fn append(
    store: &dyn MessageStore,
    conversation: &ConversationId,
    message: NewMessage,
) -> Result<MessageId, SyncError> {
    match store.append(conversation, message).await {
        Ok(stored) => {
            debug!(conversation = %conversation, message_id = %stored.id, "message sent");
            Ok(stored.id)
        }
        Err(err) => {
            warn!(conversation = %conversation, error = %err, "send failed");
            Err(SyncError::StoreUnavailable(err))
        }
    }
}

type Reply<T> = oneshot::Sender<Result<T, SyncError>>;

enum Event {
    Send {
        message: NewMessage,
        reply: Reply<MessageId>,
    },
    LoadOlder {
        limit: usize,
        reply: Reply<usize>,
    },
    PageLoaded {
        result: Result<Vec<Message>, StoreError>,
        reply: Reply<usize>,
    },
    Close {
        reply: oneshot::Sender<()>,
    },
}

/// Handle to a live conversation between `viewer` and `peer`.
pub struct ConversationSession {
    conversation_id: ConversationId,
    viewer: ParticipantId,
    page_limit: usize,
    events: mpsc::UnboundedSender<Event>,
    snapshots: watch::Receiver<ViewSnapshot>,
    task: Option<JoinHandle<()>>,
}

impl ConversationSession {
    /// Subscribes to the conversation's tail and starts the actor.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn open(
        store: Arc<dyn MessageStore>,
        viewer: ParticipantId,
        peer: ParticipantId,
        config: SessionConfig,
    ) -> Result<Self, SyncError> {
        let tail_limit = validate_limit(config.tail_limit)?;
        let page_limit = validate_limit(config.page_limit)?;
        let conversation_id = config.id_scheme.conversation_id(&viewer, &peer)?;

        let subscription = store
            .subscribe_tail(&conversation_id, tail_limit)
            .await
            .map_err(|err| {
                error!(conversation = %conversation_id, error = %err, "tail subscribe failed");
                SyncError::StoreUnavailable(err)
            })?;

        let view = ConversationView::new(conversation_id.clone());
        let (snapshot_tx, snapshots) = watch::channel(view.snapshot());
        let (events, inbox) = mpsc::unbounded_channel();

        let actor = SessionActor {
            store,
            view,
            subscription: Some(subscription),
            tail_error: None,
            events: events.downgrade(),
            snapshots: snapshot_tx,
        };
        let task = tokio::spawn(actor.run(inbox));

        info!(conversation = %conversation_id, viewer = %viewer, "conversation session opened");

        Ok(Self {
            conversation_id,
            viewer,
            page_limit,
            events,
            snapshots,
            task: Some(task),
        })
    }

    pub fn conversation_id(&self) -> &ConversationId {
        &self.conversation_id
    }

    pub fn viewer(&self) -> &ParticipantId {
        &self.viewer
    }

    /// Current merged view.
    pub fn snapshot(&self) -> ViewSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Receiver that is notified after every change to the view.
    pub fn watch(&self) -> watch::Receiver<ViewSnapshot> {
        self.snapshots.clone()
    }

    /// Sends `text` as the viewer. See [`send_message`].
    ///
    /// The request is queued before this returns; awaiting the future waits
    /// for the store's answer.
    pub fn send_message(
        &self,
        text: &str,
        sender_name: Option<&str>,
    ) -> impl Future<Output = Result<MessageId, SyncError>> + Send + 'static {
        let queued = new_message(&self.viewer, text, sender_name)
            .map_err(SyncError::from)
            .and_then(|message| {
                let (reply, answer) = oneshot::channel();
                self.queue(Event::Send { message, reply })?;
                Ok(answer)
            });
        async move { await_reply(queued?).await }
    }

    /// Loads one older page of the configured size. See
    /// [`load_older_page_with_limit`](Self::load_older_page_with_limit).
    pub fn load_older_page(&self) -> impl Future<Output = Result<usize, SyncError>> + Send + 'static {
        self.load_older_page_with_limit(self.page_limit)
    }

    /// Loads up to `limit` messages older than the oldest displayed one.
    ///
    /// Resolves to the number of messages inserted. Resolves to 0 without
    /// contacting the store while another page is loading, after history is
    /// exhausted, or before anything is displayed.
    pub fn load_older_page_with_limit(
        &self,
        limit: usize,
    ) -> impl Future<Output = Result<usize, SyncError>> + Send + 'static {
        let queued = validate_limit(limit)
            .map_err(SyncError::from)
            .and_then(|limit| {
                let (reply, answer) = oneshot::channel();
                self.queue(Event::LoadOlder { limit, reply })?;
                Ok(answer)
            });
        async move { await_reply(queued?).await }
    }

    /// Tears the session down and waits for the actor to stop.
    pub async fn close(&mut self) {
        let (reply, done) = oneshot::channel();
        if self.events.send(Event::Close { reply }).is_ok() {
            let _ = done.await;
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }

    pub fn is_closed(&self) -> bool {
        self.events.is_closed()
    }

    fn queue(&self, event: Event) -> Result<(), SyncError> {
        self.events.send(event).map_err(|_| SyncError::Closed)
    }
}

impl Drop for ConversationSession {
    fn drop(&mut self) {
        if self.task.is_some() {
            let (reply, _) = oneshot::channel();
            let _ = self.events.send(Event::Close { reply });
        }
    }
}

async fn await_reply<T>(answer: oneshot::Receiver<Result<T, SyncError>>) -> Result<T, SyncError> {
    answer.await.unwrap_or(Err(SyncError::Closed))
}

/// Sends a page result back to the actor, or `Cancelled` if the fetch task
/// is dropped first.
struct PageReply {
    events: mpsc::WeakUnboundedSender<Event>,
    reply: Option<Reply<usize>>,
}

impl PageReply {
    fn finish(mut self, result: Result<Vec<Message>, StoreError>) {
        if let Some(reply) = self.reply.take() {
            post(&self.events, Event::PageLoaded { result, reply });
        }
    }
}

impl Drop for PageReply {
    fn drop(&mut self) {
        if let Some(reply) = self.reply.take() {
            post(
                &self.events,
                Event::PageLoaded {
                    result: Err(StoreError::Cancelled),
                    reply,
                },
            );
        }
    }
}

fn post(events: &mpsc::WeakUnboundedSender<Event>, event: Event) {
    match events.upgrade() {
        Some(sender) => {
            if sender.send(event).is_err() {
                debug!("session closed, page result dropped");
            }
        }
        None => debug!("session closed, page result dropped"),
    }
}

enum Next {
    Event(Option<Event>),
    Tail(Option<TailEvent>),
}

struct SessionActor {
    store: Arc<dyn MessageStore>,
    view: ConversationView,
    subscription: Option<TailSubscription>,
    tail_error: Option<StoreError>,
    events: mpsc::WeakUnboundedSender<Event>,
    snapshots: watch::Sender<ViewSnapshot>,
}

impl SessionActor {
    async fn run(mut self, mut inbox: mpsc::UnboundedReceiver<Event>) {
        loop {
            let next = match self.subscription.as_mut() {
                Some(subscription) => tokio::select! {
                    event = inbox.recv() => Next::Event(event),
                    tail = subscription.recv() => Next::Tail(tail),
                },
                None => Next::Event(inbox.recv().await),
            };

            let event = match next {
                Next::Tail(tail) => {
                    self.on_tail(tail);
                    continue;
                }
                Next::Event(event) => event,
            };

            // All handles dropped.
            let Some(event) = event else {
                self.shutdown();
                break;
            };

            if let Event::Close { reply } = event {
                self.shutdown();
                let _ = reply.send(());
                break;
            }
            self.handle(event);
        }
    }

    fn handle(&mut self, event: Event) {
        match event {
            Event::Send { message, reply } => {
                let store = self.store.clone();
                let conversation = self.view.conversation_id().clone();
                tokio::spawn(async move {
                    let result = append(store.as_ref(), &conversation, message).await;
                    let _ = reply.send(result);
                });
            }
            Event::LoadOlder { limit, reply } => match self.view.begin_load_older(limit) {
                Some(request) => {
                    self.publish();
                    self.fetch_page(request, reply);
                }
                None => {
                    let _ = reply.send(Ok(0));
                }
            },
            Event::PageLoaded { result, reply } => {
                let outcome = self.view.complete_load_older(result);
                if let Err(err) = &outcome {
                    warn!(conversation = %self.view.conversation_id(), error = %err, "older page failed");
                }
                self.publish();
                let _ = reply.send(outcome);
            }
            Event::Close { .. } => {}
        }
    }

    fn fetch_page(&self, request: OlderPageRequest, reply: Reply<usize>) {
        let store = self.store.clone();
        let conversation = self.view.conversation_id().clone();
        let page_reply = PageReply {
            events: self.events.clone(),
            reply: Some(reply),
        };
        debug!(
            conversation = %conversation,
            cursor = %request.cursor,
            limit = request.limit,
            "requesting older page"
        );
        tokio::spawn(async move {
            let result = store
                .page_before(&conversation, request.cursor, request.limit)
                .await;
            page_reply.finish(result);
        });
    }

    fn on_tail(&mut self, event: Option<TailEvent>) {
        match event {
            Some(TailEvent::Window(messages)) => {
                self.tail_error = None;
                self.view.apply_tail(messages);
            }
            Some(TailEvent::Error(err)) => {
                error!(conversation = %self.view.conversation_id(), error = %err, "tail subscription error");
                self.tail_error = Some(err);
            }
            None => {
                warn!(conversation = %self.view.conversation_id(), "tail subscription ended");
                self.subscription = None;
            }
        }
        self.publish();
    }

    fn shutdown(&mut self) {
        if let Some(mut subscription) = self.subscription.take() {
            subscription.cancel();
        }
        self.view.close();
        self.publish();
        info!(conversation = %self.view.conversation_id(), "conversation session closed");
    }

    fn publish(&self) {
        let mut snapshot = self.view.snapshot();
        snapshot.tail_error = self.tail_error.clone();
        self.snapshots.send_replace(snapshot);
    }
}
