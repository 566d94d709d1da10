//! Display policy: message ordering, burst grouping, and time labels.
//!
//! These are pure functions over the merged message list. The clock and time
//! zone are always injected so labels are reproducible in tests.

use std::cmp::Ordering;
use std::fmt::Display;

use chrono::{DateTime, Duration, TimeZone, Utc};

use crate::types::{Message, ParticipantId};

/// Same-sender gap (seconds) under which consecutive messages share one label.
pub const DEFAULT_BURST_WINDOW_SECS: i64 = 120;

/// Age (days) from which labels switch from relative to absolute.
pub const ABSOLUTE_LABEL_AFTER_DAYS: i64 = 7;

/// Total order used for display: timestamp, then message id.
///
/// Ties on timestamp are rare (stores assign millisecond or finer times) but
/// the id tiebreak keeps two clients from rendering them differently.
pub fn compare_messages(a: &Message, b: &Message) -> Ordering {
    a.timestamp
        .cmp(&b.timestamp)
        .then_with(|| a.id.as_str().cmp(b.id.as_str()))
}

/// Whether `current` continues the burst started by `previous` under the
/// default 120 second window.
pub fn is_same_burst(previous: &Message, current: &Message) -> bool {
    DisplayPolicy::default().is_same_burst(previous, current)
}

/// Formats a message time relative to `now`.
///
/// - calendar yesterday (in `now`'s zone): `"yesterday"`
/// - seven or more days old: absolute, e.g. `"Mar 4, 2026 at 9:05 AM"`
/// - otherwise relative, e.g. `"3 minutes ago"`, `"in 2 hours"`
pub fn time_label<Tz>(instant: DateTime<Utc>, now: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let local = instant.with_timezone(&now.timezone());

    if now.date_naive().pred_opt() == Some(local.date_naive()) {
        return "yesterday".to_string();
    }

    let age = now.clone().signed_duration_since(local.clone());
    if age.num_days() >= ABSOLUTE_LABEL_AFTER_DAYS {
        return local.format("%b %-d, %Y at %-I:%M %p").to_string();
    }

    relative_phrase(age)
}

fn relative_phrase(age: Duration) -> String {
    let seconds = age.num_seconds();
    if seconds == 0 {
        return "just now".to_string();
    }

    let magnitude = seconds.unsigned_abs();
    let (count, unit) = if magnitude < 60 {
        (magnitude, "second")
    } else if magnitude < 3_600 {
        (magnitude / 60, "minute")
    } else if magnitude < 86_400 {
        (magnitude / 3_600, "hour")
    } else {
        (magnitude / 86_400, "day")
    };
    let plural = if count == 1 { "" } else { "s" };

    if seconds > 0 {
        format!("{count} {unit}{plural} ago")
    } else {
        format!("in {count} {unit}{plural}")
    }
}

/// A message annotated for rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct TimelineRow<'a> {
    pub message: &'a Message,
    /// Sent by the viewer (rendered on the trailing side).
    pub is_mine: bool,
    /// First message of a burst; carries the time label.
    pub show_time: bool,
    /// Empty when `show_time` is false.
    pub time_label: String,
}

/// Tunables for burst grouping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayPolicy {
    pub burst_window: Duration,
}

impl Default for DisplayPolicy {
    fn default() -> Self {
        Self::with_burst_window_secs(DEFAULT_BURST_WINDOW_SECS)
    }
}

impl DisplayPolicy {
    pub fn with_burst_window_secs(secs: i64) -> Self {
        Self {
            burst_window: Duration::seconds(secs),
        }
    }

    /// Same sender and no more than `burst_window` apart.
    pub fn is_same_burst(&self, previous: &Message, current: &Message) -> bool {
        previous.sender_id == current.sender_id
            && current.timestamp.signed_duration_since(previous.timestamp) <= self.burst_window
    }

    /// Annotates an ordered message list for `viewer`.
    pub fn timeline_rows<'a, Tz>(
        &self,
        messages: &'a [Message],
        viewer: &ParticipantId,
        now: &DateTime<Tz>,
    ) -> Vec<TimelineRow<'a>>
    where
        Tz: TimeZone,
        Tz::Offset: Display,
    {
        let mut rows = Vec::with_capacity(messages.len());
        let mut previous: Option<&Message> = None;

        for message in messages {
            let show_time = previous.map_or(true, |prev| !self.is_same_burst(prev, message));
            rows.push(TimelineRow {
                message,
                is_mine: &message.sender_id == viewer,
                show_time,
                time_label: if show_time {
                    time_label(message.timestamp, now)
                } else {
                    String::new()
                },
            });
            previous = Some(message);
        }

        rows
    }
}
