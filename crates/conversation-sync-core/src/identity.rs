//! Conversation identity.
//!
//! Both participants of a thread must derive the same id without talking to
//! each other, so the id is a pure function of the unordered pair.
//!
//! The default encoding sorts the two ids bytewise and writes each one with a
//! decimal length prefix: `"{len(lo)}:{lo}{len(hi)}:{hi}"`. Because every
//! component is length-delimited, no two distinct pairs can produce the same
//! string, whatever characters the ids contain.
//!
//! The legacy encoding joins the sorted ids with `_`. It is kept for threads
//! created before length prefixing and rejects ids containing `_`, which is
//! the only way two pairs could alias under it.

use crate::types::{ConversationId, ParticipantId};
use crate::ValidationError;

/// Separator used by [`legacy_conversation_id`].
pub const LEGACY_SEPARATOR: char = '_';

/// How conversation ids are derived from the two participant ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdScheme {
    #[default]
    LengthPrefixed,
    LegacyJoin,
}

impl IdScheme {
    /// Derives the conversation id for `a` and `b` under this scheme.
    pub fn conversation_id(
        self,
        a: &ParticipantId,
        b: &ParticipantId,
    ) -> Result<ConversationId, ValidationError> {
        match self {
            IdScheme::LengthPrefixed => conversation_id(a, b),
            IdScheme::LegacyJoin => legacy_conversation_id(a, b),
        }
    }
}

/// Derives the canonical conversation id for a participant pair.
///
/// Symmetric: `conversation_id(a, b) == conversation_id(b, a)`. Fails only
/// for empty or malformed ids.
pub fn conversation_id(
    a: &ParticipantId,
    b: &ParticipantId,
) -> Result<ConversationId, ValidationError> {
    validate_participant(a)?;
    validate_participant(b)?;

    let (lo, hi) = ordered(a.as_str(), b.as_str());
    Ok(ConversationId(format!(
        "{}:{}{}:{}",
        lo.len(),
        lo,
        hi.len(),
        hi
    )))
}

/// Derives the `lo_hi` conversation id used by older clients.
pub fn legacy_conversation_id(
    a: &ParticipantId,
    b: &ParticipantId,
) -> Result<ConversationId, ValidationError> {
    for id in [a, b] {
        validate_participant(id)?;
        if id.as_str().contains(LEGACY_SEPARATOR) {
            return Err(ValidationError::SeparatorInParticipant {
                id: id.to_string(),
                separator: LEGACY_SEPARATOR,
            });
        }
    }

    let (lo, hi) = ordered(a.as_str(), b.as_str());
    Ok(ConversationId(format!("{lo}{LEGACY_SEPARATOR}{hi}")))
}

/// Rejects ids that are blank or carry control characters.
pub fn validate_participant(id: &ParticipantId) -> Result<(), ValidationError> {
    if id.as_str().trim().is_empty() {
        return Err(ValidationError::EmptyParticipant);
    }
    if id.as_str().chars().any(char::is_control) {
        return Err(ValidationError::MalformedParticipant(id.to_string()));
    }
    Ok(())
}

fn ordered<'a>(a: &'a str, b: &'a str) -> (&'a str, &'a str) {
    // str ordering is bytewise on UTF-8, independent of locale
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}
