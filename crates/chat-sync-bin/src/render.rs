//! Plain-text rendering of timelines and users.

use std::collections::HashSet;

use conversation_sync_core::{MessageId, TimelineRow, UserProfile};

/// Column that the viewer's own messages are right-aligned to.
const RIGHT_EDGE: usize = 72;

/// Lines for a timeline. A time header precedes every burst; the viewer's
/// messages are pushed to the right edge.
pub fn timeline_lines(rows: &[TimelineRow<'_>]) -> Vec<String> {
    let mut lines = Vec::with_capacity(rows.len());
    for row in rows {
        if row.show_time {
            lines.push(format!("--- {} ---", row.time_label));
        }
        let message = row.message;
        if row.is_mine {
            let text = format!("{} <", message.text);
            let width = text.chars().count();
            lines.push(format!("{}{}", " ".repeat(RIGHT_EDGE.saturating_sub(width)), text));
        } else {
            lines.push(format!("{}: {}", message.sender_name, message.text));
        }
    }
    lines
}

pub fn user_line(user: &UserProfile) -> String {
    format!("{}  {} <{}>", user.id, user.name, user.email)
}

/// Remembers which messages were already printed while following a tail.
#[derive(Debug, Default)]
pub struct PrintedMessages {
    seen: HashSet<MessageId>,
}

impl PrintedMessages {
    /// Keeps the rows not printed before and marks them printed.
    pub fn take_unseen<'a>(&mut self, rows: Vec<TimelineRow<'a>>) -> Vec<TimelineRow<'a>> {
        rows.into_iter()
            .filter(|row| self.seen.insert(row.message.id.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use conversation_sync_core::{DisplayPolicy, Message, ParticipantId};

    fn message(id: &str, sender: &str, secs: i64, text: &str) -> Message {
        Message {
            id: MessageId::from(id),
            sender_id: ParticipantId::from(sender),
            sender_name: sender.to_uppercase(),
            text: text.into(),
            timestamp: Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap(),
        }
    }

    #[test]
    fn bursts_share_one_header() {
        let messages = vec![
            message("1", "bob", 0, "hi"),
            message("2", "bob", 30, "there?"),
            message("3", "alice", 40, "yes"),
        ];
        let now = Utc.timestamp_opt(1_700_000_100, 0).unwrap();
        let rows = DisplayPolicy::default().timeline_rows(&messages, &ParticipantId::from("alice"), &now);

        let lines = timeline_lines(&rows);
        assert_eq!(lines.len(), 5);
        assert_eq!(lines[0], "--- 1 minute ago ---");
        assert_eq!(lines[1], "BOB: hi");
        assert_eq!(lines[2], "BOB: there?");
        assert_eq!(lines[3], "--- 1 minute ago ---");
        assert!(lines[4].ends_with("yes <"));
        assert_eq!(lines[4].chars().count(), RIGHT_EDGE);
    }

    #[test]
    fn printed_messages_are_skipped() {
        let messages = vec![message("1", "bob", 0, "a"), message("2", "bob", 1, "b")];
        let now = Utc.timestamp_opt(1_700_000_010, 0).unwrap();
        let policy = DisplayPolicy::default();
        let viewer = ParticipantId::from("alice");
        let mut printed = PrintedMessages::default();

        let first = printed.take_unseen(policy.timeline_rows(&messages[..1], &viewer, &now));
        assert_eq!(first.len(), 1);

        let second = printed.take_unseen(policy.timeline_rows(&messages, &viewer, &now));
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].message.id.as_str(), "2");
        assert!(!second[0].show_time);
    }

    #[test]
    fn user_line_shows_id_name_and_email() {
        let user = UserProfile::new("u1", "Ada", "ada@example.com");
        assert_eq!(user_line(&user), "u1  Ada <ada@example.com>");
    }
}
