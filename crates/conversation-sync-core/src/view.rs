//! The merged conversation view.
//!
//! [`ConversationView`] owns the displayed message list and the pagination
//! cursor. It is a plain state machine: the session actor feeds it tail
//! windows and page results in whatever order the store delivers them, and
//! after every step the list is free of duplicate ids and sorted ascending by
//! timestamp.
//!
//! ```text
//!            begin_load_older            complete (non-empty page)
//!   Idle ───────────────────▶ Loading ───────────────────────────▶ Idle
//!     ▲                          │
//!     │ complete (error)         │ complete (empty page)
//!     └──────────────────────────┤
//!                                ▼
//!                            Exhausted
//! ```

use std::cmp::Ordering;
use std::collections::HashSet;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::policy::compare_messages;
use crate::store::StoreError;
use crate::types::{ConversationId, Message, MessageId};
use crate::{SyncError, ValidationError};

/// Older-page loading state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaginationState {
    Idle,
    Loading,
    /// The store returned an empty page; no further requests are made.
    Exhausted,
}

/// A page request handed out by [`ConversationView::begin_load_older`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OlderPageRequest {
    pub cursor: DateTime<Utc>,
    pub limit: usize,
}

/// Read-only copy of the view for renderers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewSnapshot {
    pub conversation_id: ConversationId,
    pub messages: Vec<Message>,
    pub oldest_cursor: Option<DateTime<Utc>>,
    pub has_more: bool,
    pub pagination: PaginationState,
    pub closed: bool,
    /// At least one tail window has been applied.
    pub synced: bool,
    /// Most recent error pushed by the tail subscription, if any.
    pub tail_error: Option<StoreError>,
}

/// Merged view of one conversation.
#[derive(Debug, Clone)]
pub struct ConversationView {
    conversation_id: ConversationId,
    messages: Vec<Message>,
    oldest_cursor: Option<DateTime<Utc>>,
    has_more: bool,
    loading_older: bool,
    exhausted: bool,
    synced: bool,
    closed: bool,
}

impl ConversationView {
    pub fn new(conversation_id: ConversationId) -> Self {
        Self {
            conversation_id,
            messages: Vec::new(),
            oldest_cursor: None,
            has_more: true,
            loading_older: false,
            exhausted: false,
            synced: false,
            closed: false,
        }
    }

    pub fn conversation_id(&self) -> &ConversationId {
        &self.conversation_id
    }

    /// Displayed messages, ascending by timestamp.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Timestamp of the oldest displayed message.
    pub fn oldest_cursor(&self) -> Option<DateTime<Utc>> {
        self.oldest_cursor
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    pub fn is_loading_older(&self) -> bool {
        self.loading_older
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Whether a tail window has been applied yet.
    pub fn is_synced(&self) -> bool {
        self.synced
    }

    pub fn pagination_state(&self) -> PaginationState {
        if self.loading_older {
            PaginationState::Loading
        } else if self.exhausted {
            PaginationState::Exhausted
        } else {
            PaginationState::Idle
        }
    }

    pub fn snapshot(&self) -> ViewSnapshot {
        ViewSnapshot {
            conversation_id: self.conversation_id.clone(),
            messages: self.messages.clone(),
            oldest_cursor: self.oldest_cursor,
            has_more: self.has_more,
            pagination: self.pagination_state(),
            closed: self.closed,
            synced: self.synced,
            tail_error: None,
        }
    }

    /// Merges a tail window into the view. Returns whether the list changed.
    ///
    /// Everything older than the window's first timestamp is kept (minus ids
    /// the window also carries); everything from that timestamp on is replaced
    /// by the window. An empty window clears the view.
    pub fn apply_tail(&mut self, mut tail: Vec<Message>) -> bool {
        if self.closed {
            debug!(conversation = %self.conversation_id, "tail window after close discarded");
            return false;
        }

        if !is_ordered(&tail) {
            if !timestamps_ascending(&tail) {
                warn!(
                    conversation = %self.conversation_id,
                    len = tail.len(),
                    "tail window not ascending, re-sorting"
                );
            }
            tail.sort_by(compare_messages);
        }

        let merged = match tail.first().map(|first| first.timestamp) {
            None => Vec::new(),
            Some(cutoff) => {
                let tail_ids: HashSet<&MessageId> = tail.iter().map(|m| &m.id).collect();
                let mut merged: Vec<Message> = self
                    .messages
                    .iter()
                    .filter(|m| m.timestamp < cutoff && !tail_ids.contains(&m.id))
                    .cloned()
                    .collect();
                merged.extend(tail.iter().cloned());
                dedupe_keep_first(merged)
            }
        };

        let changed = merged != self.messages || !self.synced;
        self.synced = true;
        self.messages = merged;
        self.refresh_cursor();

        debug!(
            conversation = %self.conversation_id,
            len = self.messages.len(),
            changed,
            "applied tail window"
        );
        changed
    }

    /// Claims the older-page slot.
    ///
    /// Returns `None` (and changes nothing) when closed, already loading,
    /// exhausted, or when nothing is displayed yet.
    pub fn begin_load_older(&mut self, limit: usize) -> Option<OlderPageRequest> {
        if self.closed || self.loading_older || !self.has_more || limit == 0 {
            return None;
        }
        let cursor = self.oldest_cursor?;
        self.loading_older = true;
        Some(OlderPageRequest { cursor, limit })
    }

    /// Releases the older-page slot and merges the result.
    ///
    /// Returns the number of messages actually inserted. The slot is released
    /// on every path, including errors.
    pub fn complete_load_older(
        &mut self,
        result: Result<Vec<Message>, StoreError>,
    ) -> Result<usize, SyncError> {
        self.loading_older = false;

        if self.closed {
            debug!(conversation = %self.conversation_id, "page after close discarded");
            return Err(SyncError::Closed);
        }

        let page = result?;
        if page.is_empty() {
            self.exhausted = true;
            self.has_more = false;
            debug!(conversation = %self.conversation_id, "history exhausted");
            return Ok(0);
        }

        let mut seen: HashSet<MessageId> = self.messages.iter().map(|m| m.id.clone()).collect();
        let mut fresh: Vec<Message> = page
            .into_iter()
            .filter(|m| seen.insert(m.id.clone()))
            .collect();
        let inserted = fresh.len();
        if inserted == 0 {
            return Ok(0);
        }

        let boundary_ok = match (fresh.last(), self.messages.first()) {
            (Some(last), Some(first)) => compare_messages(last, first) != Ordering::Greater,
            _ => true,
        };
        let page_sorted = is_ordered(&fresh);

        fresh.append(&mut self.messages);
        self.messages = fresh;
        if !(boundary_ok && page_sorted) {
            if !timestamps_ascending(&self.messages) {
                warn!(
                    conversation = %self.conversation_id,
                    "older page overlaps displayed messages, re-sorting"
                );
            }
            self.messages.sort_by(compare_messages);
        }
        self.refresh_cursor();

        debug!(
            conversation = %self.conversation_id,
            inserted,
            len = self.messages.len(),
            "prepended older page"
        );
        Ok(inserted)
    }

    /// Marks the view torn down. Later tail windows and page results are
    /// discarded.
    pub fn close(&mut self) {
        self.closed = true;
    }

    fn refresh_cursor(&mut self) {
        self.oldest_cursor = self.messages.first().map(|m| m.timestamp);
        self.has_more = self.oldest_cursor.is_some() && !self.exhausted;
    }
}

/// Rejects page and tail sizes of zero.
pub fn validate_limit(limit: usize) -> Result<usize, ValidationError> {
    if limit == 0 {
        Err(ValidationError::ZeroLimit)
    } else {
        Ok(limit)
    }
}

/// Ascending by timestamp, ties by id.
fn is_ordered(messages: &[Message]) -> bool {
    messages
        .windows(2)
        .all(|pair| compare_messages(&pair[0], &pair[1]) != Ordering::Greater)
}

fn timestamps_ascending(messages: &[Message]) -> bool {
    messages
        .windows(2)
        .all(|pair| pair[0].timestamp <= pair[1].timestamp)
}

fn dedupe_keep_first(messages: Vec<Message>) -> Vec<Message> {
    let mut seen = HashSet::with_capacity(messages.len());
    messages
        .into_iter()
        .filter(|m| seen.insert(m.id.clone()))
        .collect()
}
