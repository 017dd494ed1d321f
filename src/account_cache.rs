//! Account-name cache for feed connectors.
//!
//! Connectors remember the publishing account they resolved for each
//! article link, and the pipeline persists the cache next to the fetch
//! state. An article keeps the account name it was first stored under even
//! when the feed's configured `account` is renamed, until the cache is
//! cleared with `fusion run --refresh-accounts`.
//!
//! The cache is an ordinary value: built by the caller and shared through an
//! `Arc`.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

#[derive(Debug, Default)]
pub struct AccountCache {
    entries: RwLock<HashMap<String, String>>,
}

impl AccountCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, link: &str) -> Option<String> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.get(&normalize_link(link)).cloned()
    }

    pub fn insert(&self, link: &str, account: impl Into<String>) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.insert(normalize_link(link), account.into());
    }

    /// Drop one entry. Returns the removed account name, if any.
    pub fn invalidate(&self, link: &str) -> Option<String> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.remove(&normalize_link(link))
    }

    pub fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    /// Load persisted entries, replacing any with the same link.
    pub fn extend(&self, stored: impl IntoIterator<Item = (String, String)>) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        for (link, account) in stored {
            entries.insert(normalize_link(&link), account);
        }
    }

    /// Entries sorted by link, for persisting.
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries
            .iter()
            .map(|(link, account)| (link.clone(), account.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Trim, drop the fragment and any trailing slash.
fn normalize_link(link: &str) -> String {
    let trimmed = link.trim();
    let without_fragment = trimmed.split('#').next().unwrap_or(trimmed);
    without_fragment.trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_get_invalidate() {
        let cache = AccountCache::new();
        cache.insert("https://mp.weixin.qq.com/s/abc", "机器之心");
        assert_eq!(
            cache.get("https://mp.weixin.qq.com/s/abc/").as_deref(),
            Some("机器之心")
        );
        assert_eq!(
            cache.get(" https://mp.weixin.qq.com/s/abc#rd").as_deref(),
            Some("机器之心")
        );
        assert_eq!(
            cache.invalidate("https://mp.weixin.qq.com/s/abc").as_deref(),
            Some("机器之心")
        );
        assert!(cache.get("https://mp.weixin.qq.com/s/abc").is_none());
    }

    #[test]
    fn clear_empties_everything() {
        let cache = AccountCache::new();
        cache.insert("a", "one");
        cache.insert("b", "two");
        assert_eq!(cache.len(), 2);
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn snapshot_round_trips_through_extend() {
        let cache = AccountCache::new();
        cache.insert("https://mp.weixin.qq.com/s/b/", "two");
        cache.insert("https://mp.weixin.qq.com/s/a", "one");
        let snapshot = cache.snapshot();
        let links: Vec<&str> = snapshot.keys().map(String::as_str).collect();
        assert_eq!(
            links,
            vec!["https://mp.weixin.qq.com/s/a", "https://mp.weixin.qq.com/s/b"]
        );

        let restored = AccountCache::new();
        restored.extend(snapshot);
        assert_eq!(restored.get("https://mp.weixin.qq.com/s/b").as_deref(), Some("two"));
        assert_eq!(restored.len(), 2);
    }

    #[test]
    fn shared_between_threads() {
        let cache = std::sync::Arc::new(AccountCache::new());
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let cache = cache.clone();
                std::thread::spawn(move || cache.insert(&format!("link-{i}"), format!("acct-{i}")))
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(cache.len(), 4);
    }
}
