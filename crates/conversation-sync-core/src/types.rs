//! Core types for conversation sync.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Creates an id from an existing string.
            pub fn from_string(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            /// Returns the id as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

string_id!(
    /// Opaque identifier of a chat participant (issued by the user directory).
    ParticipantId
);

string_id!(
    /// Identifier of a two-party conversation, derived from both participants.
    ///
    /// Never construct one by hand for a live thread; use
    /// [`crate::identity::conversation_id`] so both sides agree.
    ConversationId
);

string_id!(
    /// Store-assigned message identifier, unique within a conversation.
    MessageId
);

impl ParticipantId {
    /// Creates a new random participant id.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for ParticipantId {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageId {
    /// Creates a new random message id.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

/// A stored chat message. Immutable once created.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub sender_id: ParticipantId,
    /// Display name captured at send time; not refreshed if the sender renames.
    pub sender_name: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

/// A message to be appended.
///
/// The store assigns the id and timestamp. Callers must NOT provide them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewMessage {
    pub sender_id: ParticipantId,
    pub sender_name: String,
    pub text: String,
}

/// A user directory entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: ParticipantId,
    pub name: String,
    pub email: String,
}

impl UserProfile {
    pub fn new(
        id: impl Into<ParticipantId>,
        name: impl Into<String>,
        email: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            email: email.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn participant_id_equality() {
        let id1 = ParticipantId::from_string("alice");
        let id2 = ParticipantId::from_string("alice");
        let id3 = ParticipantId::from_string("bob");
        assert_eq!(id1, id2);
        assert_ne!(id1, id3);
    }

    #[test]
    fn generated_ids_are_unique() {
        assert_ne!(ParticipantId::new(), ParticipantId::new());
        assert_ne!(MessageId::new(), MessageId::new());
    }

    #[test]
    fn ids_display_and_convert() {
        let id: MessageId = "m1".into();
        assert_eq!(id.as_str(), "m1");
        assert_eq!(format!("{}", id), "m1");

        let conversation = ConversationId::from(String::from("1:a1:b"));
        assert_eq!(conversation.to_string(), "1:a1:b");
    }

    #[test]
    fn ids_order_bytewise() {
        let mut ids = vec![
            ParticipantId::from("bob"),
            ParticipantId::from("Zed"),
            ParticipantId::from("alice"),
        ];
        ids.sort();
        let ordered: Vec<&str> = ids.iter().map(ParticipantId::as_str).collect();
        assert_eq!(ordered, vec!["Zed", "alice", "bob"]);
    }

    #[test]
    fn user_profile_new() {
        let user = UserProfile::new("u1", "Alice", "alice@example.com");
        assert_eq!(user.id.as_str(), "u1");
        assert_eq!(user.name, "Alice");
        assert_eq!(user.email, "alice@example.com");
    }
}
