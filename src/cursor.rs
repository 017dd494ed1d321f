//! Per-source publication cursors (`fetch_state.json`).
//!
//! Feeds for the timestamp-unreliable class re-emit their recent history on
//! every poll. The cursor remembers the newest publication time seen per
//! source so already-folded articles are dropped before filtering:
//!
//! ```json
//! { "feed:jiqizhixin": { "last_published_time": "2025-03-01T08:00:00" } }
//! ```
//!
//! Times are compared as naive UTC. The cursor only moves forward, and the
//! caller persists it after the knowledge base write succeeds.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::Article;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceCursor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_published_time: Option<String>,
}

/// Cursor state for every cursor-tracking source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FetchState {
    sources: BTreeMap<String, SourceCursor>,
}

impl FetchState {
    pub fn last_seen(&self, source: &str) -> Option<NaiveDateTime> {
        self.sources
            .get(source)
            .and_then(|c| c.last_published_time.as_deref())
            .and_then(parse_timestamp)
    }

    /// Move the cursor for `source` forward. Earlier times are ignored.
    /// Returns whether the cursor moved.
    pub fn advance(&mut self, source: &str, seen: NaiveDateTime) -> bool {
        if self.last_seen(source).is_some_and(|current| current >= seen) {
            return false;
        }
        self.sources.entry(source.to_string()).or_default().last_published_time =
            Some(seen.format("%Y-%m-%dT%H:%M:%S").to_string());
        true
    }

    pub fn sources(&self) -> impl Iterator<Item = &str> {
        self.sources.keys().map(String::as_str)
    }
}

/// Parse RFC 3339, naive ISO-8601 (`T` or space separated, optional
/// fraction, or a bare date) or epoch seconds into naive UTC.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let text = raw.trim();
    if text.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc).naive_utc());
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(text) {
        return Some(dt.with_timezone(&Utc).naive_utc());
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, format) {
            return Some(dt);
        }
    }
    if let Ok(date) = chrono::NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0);
    }
    if let Ok(seconds) = text.parse::<f64>() {
        if seconds.is_finite() {
            return DateTime::from_timestamp(seconds.trunc() as i64, 0).map(|dt| dt.naive_utc());
        }
    }
    None
}

/// Articles newer than the cursor, plus the newest time observed.
#[derive(Debug, Default)]
pub struct CursorFilter {
    pub fresh: Vec<Article>,
    pub skipped: usize,
    pub newest: Option<NaiveDateTime>,
}

/// Drop articles published at or before `last_seen`. Articles without a
/// parseable time are always kept.
pub fn filter_new_since(articles: Vec<Article>, last_seen: Option<NaiveDateTime>) -> CursorFilter {
    let mut outcome = CursorFilter {
        newest: last_seen,
        ..Default::default()
    };

    for article in articles {
        let published = article.publication_timestamp().and_then(parse_timestamp);
        if let (Some(published), Some(reference)) = (published, last_seen) {
            if published <= reference {
                outcome.skipped += 1;
                continue;
            }
        }
        if let Some(published) = published {
            if outcome.newest.map_or(true, |newest| published > newest) {
                outcome.newest = Some(published);
            }
        }
        outcome.fresh.push(article);
    }

    outcome
}
