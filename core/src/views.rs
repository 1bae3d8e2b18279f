/// Presentation helpers shared by the CLI and any other front end
use crate::models::Conversation;
use chrono::{DateTime, Duration, Local, NaiveDateTime};
use std::cmp::Ordering;

const SERVER_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Parse a server timestamp into local time.
///
/// Accepts RFC 3339 and the zone-less `yyyy-MM-ddTHH:mm:ss[.fff]` form the
/// server uses, which is taken as local time.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Local).naive_local());
    }
    NaiveDateTime::parse_from_str(raw, SERVER_TIME_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f"))
        .ok()
}

/// Conversations matching `query`, most recent first.
///
/// Matching is a case-insensitive substring test on the peer name and the
/// last message. Entries with unparseable timestamps keep their relative
/// order after the dated ones.
pub fn conversation_view(list: &[Conversation], query: &str) -> Vec<Conversation> {
    let needle = query.trim().to_lowercase();
    let mut matched: Vec<(Option<NaiveDateTime>, &Conversation)> = list
        .iter()
        .filter(|c| {
            needle.is_empty()
                || c.friend_name.to_lowercase().contains(&needle)
                || c.last_message.to_lowercase().contains(&needle)
        })
        .map(|c| (parse_timestamp(&c.last_time_stamp), c))
        .collect();

    // Stable sort, newest first
    matched.sort_by(|(a, _), (b, _)| match (a, b) {
        (Some(a), Some(b)) => b.cmp(a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });

    matched.into_iter().map(|(_, c)| c.clone()).collect()
}

/// Unread counter label: empty for zero, capped at `99+`
pub fn unread_badge(count: u32) -> String {
    match count {
        0 => String::new(),
        1..=99 => count.to_string(),
        _ => "99+".to_string(),
    }
}

/// Short label for a message time relative to `now`
pub fn format_chat_time(timestamp: &str, now: NaiveDateTime) -> String {
    let Some(ts) = parse_timestamp(timestamp) else {
        return timestamp.to_string();
    };

    if ts.date() == now.date() {
        ts.format("%H:%M").to_string()
    } else if ts.date() == (now - Duration::days(1)).date() {
        format!("Yesterday {}", ts.format("%H:%M"))
    } else {
        ts.format("%Y-%m-%d %H:%M").to_string()
    }
}
