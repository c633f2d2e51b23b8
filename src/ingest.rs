//! Message sanitizing and per-column ordering
//!
//! Every inbound message goes through the same pipeline: avatar fixup,
//! truncation to the display limit (skipped when the text carries a URL),
//! URL replacement with an inert placeholder link, then a stable insert
//! into the column's descending-recency list. Relative-age labels are
//! recomputed for the whole list on every insert.

use crate::protocol::RawMessage;
use chrono::{DateTime, TimeZone, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Avatar used when a message arrives without one
pub const DEFAULT_AVATAR: &str = "assets/img/image-default.png";

/// Display-text limit; URL-bearing messages are never truncated
pub const TRUNCATE_LIMIT: usize = 140;

/// A sanitized message ready for display
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub from: String,
    pub author: String,
    pub author_avatar: String,
    /// The untouched wire text
    pub original: String,
    /// Truncated and linkified display text
    pub message: String,
    /// Millisecond timestamp
    pub created_at: i64,
    /// Relative-age label, recomputed on every list insert
    pub date_ago: String,
}

/// Sanitizing pipeline with its compiled URL pattern
pub struct Sanitizer {
    url_re: Regex,
}

impl Sanitizer {
    pub fn new() -> Self {
        Self {
            url_re: Regex::new(
                r"(?i)(http|ftp|https)://[\w-]+(\.[\w-]+)+([\w\-.,@?^=%&:/~+#]*[\w\-@?^=%&/~+#])?",
            )
            .unwrap(),
        }
    }

    /// Run the full pipeline on one wire message.
    pub fn sanitize(&self, raw: &RawMessage, now: DateTime<Utc>) -> Message {
        let display = self.truncate(&raw.message);
        let display = self.linkify(&display, &raw.from);
        Message {
            from: raw.from.clone(),
            author: raw.author.clone(),
            author_avatar: fix_avatar(&raw.author_avatar),
            original: raw.message.clone(),
            message: display,
            created_at: raw.created_at,
            date_ago: relative_age(raw.created_at, now),
        }
    }

    /// Cut to `TRUNCATE_LIMIT` characters plus an ellipsis, unless the raw
    /// text contains a URL.
    fn truncate(&self, text: &str) -> String {
        if text.chars().count() > TRUNCATE_LIMIT && !self.url_re.is_match(text) {
            let cut: String = text.chars().take(TRUNCATE_LIMIT).collect();
            format!("{cut}...")
        } else {
            text.to_string()
        }
    }

    /// Replace every URL with an inert placeholder link tagged with the
    /// sender id.
    fn linkify(&self, text: &str, from: &str) -> String {
        self.url_re
            .replace_all(text, |captures: &regex::Captures<'_>| {
                format!(
                    "<a class=\"link-into-message {from}\" href=\"{}\" target=\"_blank\">∞</a>",
                    &captures[0]
                )
            })
            .into_owned()
    }
}

impl Default for Sanitizer {
    fn default() -> Self {
        Self::new()
    }
}

/// Default a blank avatar and prefix scheme-less `www` hosts.
pub fn fix_avatar(avatar: &str) -> String {
    if avatar.is_empty() {
        DEFAULT_AVATAR.to_string()
    } else if avatar.starts_with("www") {
        format!("http://{avatar}")
    } else {
        avatar.to_string()
    }
}

/// Insert a message keeping the list sorted by descending `created_at`.
///
/// Stable: the new message lands after existing entries with the same
/// timestamp, so ties keep arrival order. O(n) shift per insert, fine for
/// per-column list sizes. Every entry's relative-age label is refreshed.
pub fn insert_message(messages: &mut Vec<Message>, message: Message, now: DateTime<Utc>) {
    messages.push(message);
    let mut i = messages.len() - 1;
    while i > 0 && messages[i - 1].created_at < messages[i].created_at {
        messages.swap(i - 1, i);
        i -= 1;
    }
    for entry in messages.iter_mut() {
        entry.date_ago = relative_age(entry.created_at, now);
    }
}

/// Human relative-age label for a millisecond timestamp.
pub fn relative_age(created_at_ms: i64, now: DateTime<Utc>) -> String {
    let created = match Utc.timestamp_millis_opt(created_at_ms).single() {
        Some(instant) => instant,
        None => return "a long time ago".to_string(),
    };
    let seconds = (now - created).num_seconds().max(0);
    let minutes = seconds / 60;
    let hours = minutes / 60;
    let days = hours / 24;
    let months = days / 30;

    if seconds < 45 {
        "a few seconds ago".to_string()
    } else if seconds < 90 {
        "a minute ago".to_string()
    } else if minutes < 45 {
        format!("{minutes} minutes ago")
    } else if minutes < 90 {
        "an hour ago".to_string()
    } else if hours < 22 {
        format!("{hours} hours ago")
    } else if hours < 36 {
        "a day ago".to_string()
    } else if days < 26 {
        format!("{days} days ago")
    } else if days < 46 {
        "a month ago".to_string()
    } else if days < 320 {
        format!("{months} months ago")
    } else if days < 548 {
        "a year ago".to_string()
    } else {
        format!("{} years ago", days / 365)
    }
}
