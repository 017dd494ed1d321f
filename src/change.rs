//! Change detection between a fresh article and its stored version.

use crate::models::Article;
use crate::normalize::is_wechat;

/// Decide whether `fresh` materially differs from the stored `existing`.
///
/// WeChat-style articles on either side never count as changed: their feeds
/// re-emit partial metadata on every refresh. Otherwise trimmed content is
/// compared exactly, and when both contents are empty the change timestamps
/// are compared as strings (`fresh` must sort strictly later).
pub fn has_changed(fresh: &Article, existing: &Article) -> bool {
    if is_wechat(fresh) || is_wechat(existing) {
        return false;
    }

    let new_content = fresh.content.trim();
    let old_content = existing.content.trim();
    if !new_content.is_empty() || !old_content.is_empty() {
        return new_content != old_content;
    }

    match (fresh.change_timestamp(), existing.change_timestamp()) {
        (Some(new_time), Some(old_time)) => new_time > old_time,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(content: &str) -> Article {
        Article {
            platform: Some("yuque".into()),
            ..Article::new("yuque:handbook", "Page", content)
        }
    }

    #[test]
    fn identical_content_is_unchanged() {
        assert!(!has_changed(&doc("same"), &doc("same")));
    }

    #[test]
    fn surrounding_whitespace_is_ignored() {
        assert!(!has_changed(&doc("  same\n"), &doc("same")));
    }

    #[test]
    fn edited_content_is_changed() {
        assert!(has_changed(&doc("v2"), &doc("v1")));
        assert!(has_changed(&doc(""), &doc("v1")));
    }

    #[test]
    fn wechat_is_never_changed() {
        let mut fresh = doc("rewritten");
        fresh.platform = Some("wechat".into());
        assert!(!has_changed(&fresh, &doc("original")));
        assert!(!has_changed(&doc("original"), &fresh));
    }

    #[test]
    fn timestamps_decide_when_content_is_empty() {
        let mut fresh = doc("");
        let mut old = doc("");
        fresh.updated_at = Some("2025-02-01T00:00:00Z".into());
        old.updated_at = Some("2025-01-01T00:00:00Z".into());
        assert!(has_changed(&fresh, &old));
        assert!(!has_changed(&old, &fresh));
        assert!(!has_changed(&old, &old.clone()));
    }

    #[test]
    fn missing_timestamp_means_unchanged() {
        let mut fresh = doc("");
        fresh.published_at = Some("2025-02-01".into());
        assert!(!has_changed(&fresh, &doc("")));
    }

    #[test]
    fn updated_at_takes_precedence() {
        let mut fresh = doc("");
        let mut old = doc("");
        fresh.updated_at = Some("2025-01-01".into());
        fresh.published_at = Some("2025-09-09".into());
        old.updated_at = Some("2025-03-01".into());
        assert!(!has_changed(&fresh, &old));
    }
}
