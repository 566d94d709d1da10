//! # Conversation Sync Core
//!
//! The client-side sync engine for two-party chat threads: one canonical
//! conversation id per participant pair, a live tail of the newest messages
//! merged with cursor-paginated history, and the display policies that sit on
//! top of the merged list.
//!
//! ## Principles
//!
//! - **One thread per pair** - Both participants derive the same conversation id
//! - **The store is the only writer** - Sends append to the store; the view
//!   learns about them through the live tail
//! - **No duplicates, always ordered** - Every merge dedupes by message id and
//!   keeps ascending timestamp order
//! - **Single owner** - All view state lives in one actor; store responses are
//!   queued back into it
//!
//! ## Architecture
//!
//! ```text
//! SEND:
//!   validate → store.append → tail push → merge
//!
//! READ:
//!   tail window (newest K) + older pages (cursor, L) → merged view
//!
//! CLOSE:
//!   cancel tail → drop late page responses
//! ```
//!
//! ## Example
//!
//! ```rust
//! use conversation_sync_core::{conversation_id, ConversationView, ParticipantId};
//!
//! let alice = ParticipantId::from("alice");
//! let bob = ParticipantId::from("bob");
//! let id = conversation_id(&alice, &bob).unwrap();
//! assert_eq!(id, conversation_id(&bob, &alice).unwrap());
//!
//! let view = ConversationView::new(id);
//! assert!(view.messages().is_empty());
//! ```
//!
//! ## Crate Structure
//!
//! - [`types`] - Core types
//! - [`identity`] - Conversation id derivation
//! - [`policy`] - Ordering, burst grouping, and time labels
//! - [`view`] - Tail + pagination merge state machine
//! - [`viewport`] - Stick-to-bottom scroll decisions
//! - [`directory`] - User directory and contact list
//! - [`store`] - Message store contract and tail subscriptions
//! - [`live`] - Tail fan-out shared by store implementations
//! - [`memory`] - In-memory store
//! - [`session`] - Conversation session actor

pub mod directory;
pub mod identity;
pub mod live;
pub mod memory;
pub mod policy;
pub mod session;
pub mod store;
pub mod types;
pub mod view;
pub mod viewport;

#[cfg(test)]
mod tests;

pub use directory::{contacts_for, UserDirectory};
pub use identity::{conversation_id, legacy_conversation_id, IdScheme};
pub use live::TailHub;
pub use memory::MemoryMessageStore;
pub use policy::{compare_messages, is_same_burst, time_label, DisplayPolicy, TimelineRow};
pub use session::{send_message, ConversationSession, SessionConfig};
pub use store::{MessageStore, StoreError, TailEvent, TailSubscription};
pub use types::{ConversationId, Message, MessageId, NewMessage, ParticipantId, UserProfile};
pub use view::{ConversationView, OlderPageRequest, PaginationState, ViewSnapshot};
pub use viewport::{ScrollAction, ScrollMetrics, ViewportTracker};

/// Input rejected before reaching the store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// Participant id is empty or whitespace.
    #[error("participant id is empty")]
    EmptyParticipant,

    /// Participant id contains a control character.
    #[error("participant id {0:?} contains a control character")]
    MalformedParticipant(String),

    /// Participant id contains the legacy join separator.
    #[error("participant id {id:?} contains the separator {separator:?}")]
    SeparatorInParticipant { id: String, separator: char },

    /// Message text is empty after trimming.
    #[error("message text is empty")]
    EmptyText,

    /// Page or tail size of zero.
    #[error("limit must be at least 1")]
    ZeroLimit,

    /// Registration data rejected.
    #[error("invalid profile: {0}")]
    InvalidProfile(String),
}

/// Errors surfaced by the sync engine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
    /// The backing store failed or is unreachable.
    #[error("message store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),

    /// Input rejected locally.
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// The conversation session was torn down.
    #[error("conversation session is closed")]
    Closed,
}
