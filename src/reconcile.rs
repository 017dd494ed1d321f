//! Cross-run reconciliation of fresh articles against the stored knowledge base.
//!
//! # Split
//!
//! Each fresh article is matched by [`ArticleKey`] against the stored
//! records. A match that [`has_changed`] reports as unchanged is *reused*:
//! the fresh article's volatile fields are merged onto a copy of the stored
//! record, keeping its enrichment. Everything else *needs enrichment*.
//! Stored records whose key did not appear this run are *carried forward*
//! into the reused set untouched.
//!
//! # Combine
//!
//! The final list follows the fresh batch order, taking for each key the
//! enriched result, else the reused record, else the raw article. Reused
//! records never seen in the batch follow in stored order, and
//! [`retain_prior`] appends any stored record still missing, so a source
//! that failed to fetch never shrinks the knowledge base.
//!
//! # Stored order
//!
//! [`restore_stored_order`] puts every key that was already stored back at
//! its stored position and appends new keys after them in batch order. A
//! source whose articles were all dropped by its cursor therefore does not
//! move its records to the end, and two runs over unchanged sources write
//! the same file.

use std::collections::{HashMap, HashSet};

use crate::change::has_changed;
use crate::key::ArticleKey;
use crate::models::{Article, KnowledgeRecord};

/// Key-indexed records that keep their insertion order.
///
/// Inserting an existing key replaces the record in place.
#[derive(Debug, Default, Clone)]
pub struct ReusedRecords {
    entries: Vec<(ArticleKey, KnowledgeRecord)>,
    index: HashMap<ArticleKey, usize>,
}

impl ReusedRecords {
    pub fn insert(&mut self, key: ArticleKey, record: KnowledgeRecord) {
        match self.index.get(&key) {
            Some(&pos) => self.entries[pos].1 = record,
            None => {
                self.index.insert(key.clone(), self.entries.len());
                self.entries.push((key, record));
            }
        }
    }

    pub fn get(&self, key: &ArticleKey) -> Option<&KnowledgeRecord> {
        self.index.get(key).map(|&pos| &self.entries[pos].1)
    }

    pub fn contains_key(&self, key: &ArticleKey) -> bool {
        self.index.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ArticleKey, &KnowledgeRecord)> {
        self.entries.iter().map(|(k, r)| (k, r))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Output of [`split`].
#[derive(Debug, Default)]
pub struct SplitOutcome {
    pub needs_enrichment: Vec<Article>,
    pub reused: ReusedRecords,
    /// Fresh articles matched to an unchanged stored record.
    pub unchanged: usize,
    /// Stored records not present in the fresh batch.
    pub carried_forward: usize,
}

/// Partition fresh articles into "needs enrichment" and "reusable".
pub fn split(fresh: &[Article], existing: &[KnowledgeRecord]) -> SplitOutcome {
    split_with(fresh, existing, false)
}

/// Like [`split`], but with `retry_unenriched` set a stored record that was
/// never successfully enriched is queued again even when unchanged.
pub fn split_with(
    fresh: &[Article],
    existing: &[KnowledgeRecord],
    retry_unenriched: bool,
) -> SplitOutcome {
    let mut by_key = ReusedRecords::default();
    for record in existing {
        by_key.insert(record.key(), record.clone());
    }

    let mut outcome = SplitOutcome::default();
    let mut seen: HashSet<ArticleKey> = HashSet::new();

    for article in fresh {
        let key = article.key();
        seen.insert(key.clone());

        match by_key.get(&key) {
            Some(stored)
                if !has_changed(article, &stored.article)
                    && !(retry_unenriched && !stored.is_enriched()) =>
            {
                outcome.reused.insert(key, merge(article, stored));
                outcome.unchanged += 1;
            }
            _ => outcome.needs_enrichment.push(article.clone()),
        }
    }

    for (key, record) in by_key.iter() {
        if !seen.contains(key) {
            outcome.reused.insert(key.clone(), record.clone());
            outcome.carried_forward += 1;
        }
    }

    outcome
}

/// Copy the fresh article's volatile fields onto a stored record.
///
/// Enrichment and passthrough fields of the stored record are kept. Optional
/// fields are only overwritten when the fresh article has a value.
pub fn merge(fresh: &Article, stored: &KnowledgeRecord) -> KnowledgeRecord {
    let mut merged = stored.clone();
    let target = &mut merged.article;

    target.source = fresh.source.clone();
    target.title = fresh.title.clone();
    target.content = fresh.content.clone();

    let optional = [
        (&mut target.slug, &fresh.slug),
        (&mut target.id, &fresh.id),
        (&mut target.url, &fresh.url),
        (&mut target.link, &fresh.link),
        (&mut target.published_at, &fresh.published_at),
        (&mut target.published_time, &fresh.published_time),
        (&mut target.author, &fresh.author),
        (&mut target.content_format, &fresh.content_format),
        (&mut target.platform, &fresh.platform),
    ];
    for (slot, value) in optional {
        if value.is_some() {
            slot.clone_from(value);
        }
    }

    merged
}

/// Recombine enrichment results with reused records, in fresh batch order.
///
/// A key repeated in `order` is emitted once, at its first position, rather
/// than once per occurrence, so the knowledge base never holds two records
/// under one key.
pub fn combine(
    order: &[Article],
    enriched: Vec<KnowledgeRecord>,
    reused: &ReusedRecords,
) -> Vec<KnowledgeRecord> {
    let mut enriched_by_key: HashMap<ArticleKey, KnowledgeRecord> =
        enriched.into_iter().map(|r| (r.key(), r)).collect();

    let mut combined = Vec::with_capacity(order.len() + reused.len());
    let mut included: HashSet<ArticleKey> = HashSet::new();

    for article in order {
        let key = article.key();
        if included.contains(&key) {
            continue;
        }
        let record = enriched_by_key
            .remove(&key)
            .or_else(|| reused.get(&key).cloned())
            .unwrap_or_else(|| KnowledgeRecord::unenriched(article.clone()));
        combined.push(record);
        included.insert(key);
    }

    for (key, record) in reused.iter() {
        if !included.contains(key) {
            combined.push(record.clone());
            included.insert(key.clone());
        }
    }

    combined
}

/// Append stored records whose key is absent from `combined`.
///
/// Returns how many were appended.
pub fn retain_prior(combined: &mut Vec<KnowledgeRecord>, prior: &[KnowledgeRecord]) -> usize {
    let mut keys: HashSet<ArticleKey> = combined.iter().map(KnowledgeRecord::key).collect();
    let mut appended = 0;
    for record in prior {
        if keys.insert(record.key()) {
            combined.push(record.clone());
            appended += 1;
        }
    }
    appended
}

/// Reorder `records` so keys present in `prior` keep their stored
/// positions. Keys new this run follow, in their current order.
pub fn restore_stored_order(
    records: Vec<KnowledgeRecord>,
    prior: &[KnowledgeRecord],
) -> Vec<KnowledgeRecord> {
    let mut by_key: HashMap<ArticleKey, KnowledgeRecord> = HashMap::with_capacity(records.len());
    let mut fresh_order: Vec<ArticleKey> = Vec::with_capacity(records.len());
    for record in records {
        let key = record.key();
        if !by_key.contains_key(&key) {
            fresh_order.push(key.clone());
        }
        by_key.insert(key, record);
    }

    let mut ordered = Vec::with_capacity(by_key.len());
    for stored in prior {
        if let Some(record) = by_key.remove(&stored.key()) {
            ordered.push(record);
        }
    }
    for key in fresh_order {
        if let Some(record) = by_key.remove(&key) {
            ordered.push(record);
        }
    }
    ordered
}
