//! Within-batch near-duplicate filtering.
//!
//! Articles are visited in input order. Each one is either accepted as the
//! first member of its similarity class or rejected with a reason:
//!
//! | Reason | When |
//! |--------|------|
//! | `empty-content` | `content` is empty |
//! | `fingerprint-error` | the fingerprint engine refused the content |
//! | `near-duplicate` | Hamming distance to an accepted article is within the threshold |
//!
//! The comparison set is a plain list scanned front to back, and the first
//! match wins, so the earliest article of a cluster is always the canonical
//! one. Nothing is remembered between runs; cross-run identity belongs to
//! the reconciliation layer.

use tracing::{debug, warn};

use crate::fingerprint::{Fingerprint, Fingerprinter};
use crate::key::ArticleKey;
use crate::models::{Article, CanonicalRef, DuplicateReason, FilteredArticle};

/// What the filter decided for one article.
#[derive(Debug, Clone, PartialEq)]
pub enum DuplicateDecision {
    Unique(Fingerprint),
    Duplicate {
        reason: DuplicateReason,
        canonical: Option<CanonicalRef>,
        detail: Option<String>,
    },
}

/// An accepted article's place in the comparison set.
struct Accepted {
    fingerprint: Fingerprint,
    key: ArticleKey,
    title: String,
    source: String,
}

/// Stateful filter for one batch.
pub struct Deduplicator<'a> {
    fingerprinter: &'a Fingerprinter,
    threshold: u32,
    accepted: Vec<Accepted>,
}

impl<'a> Deduplicator<'a> {
    pub fn new(fingerprinter: &'a Fingerprinter, threshold: u32) -> Self {
        Self {
            fingerprinter,
            threshold,
            accepted: Vec::new(),
        }
    }

    /// Classify the next article. Accepted articles join the comparison set.
    pub fn check(&mut self, article: &Article) -> DuplicateDecision {
        if article.content.is_empty() {
            return DuplicateDecision::Duplicate {
                reason: DuplicateReason::EmptyContent,
                canonical: None,
                detail: None,
            };
        }

        let fingerprint = match self.fingerprinter.fingerprint(&article.content) {
            Ok(fp) => fp,
            Err(e) => {
                warn!(title = %article.title, source = %article.source, error = %e, "fingerprint failed");
                return DuplicateDecision::Duplicate {
                    reason: DuplicateReason::FingerprintError,
                    canonical: None,
                    detail: Some(e.to_string()),
                };
            }
        };

        for prior in &self.accepted {
            let distance = fingerprint.distance(&prior.fingerprint);
            if distance <= self.threshold {
                debug!(
                    title = %article.title,
                    canonical = %prior.title,
                    distance,
                    "near-duplicate"
                );
                return DuplicateDecision::Duplicate {
                    reason: DuplicateReason::NearDuplicate,
                    canonical: Some(CanonicalRef {
                        key: prior.key.to_string(),
                        title: prior.title.clone(),
                        source: prior.source.clone(),
                        distance,
                    }),
                    detail: None,
                };
            }
        }

        self.accepted.push(Accepted {
            fingerprint,
            key: article.key(),
            title: article.title.clone(),
            source: article.source.clone(),
        });
        DuplicateDecision::Unique(fingerprint)
    }
}

/// Result of filtering one batch.
#[derive(Debug, Default)]
pub struct DedupOutcome {
    pub unique: Vec<Article>,
    pub filtered: Vec<FilteredArticle>,
}

impl DedupOutcome {
    pub fn count(&self, reason: DuplicateReason) -> usize {
        self.filtered
            .iter()
            .filter(|f| f.filter_reason == reason)
            .count()
    }
}

/// Partition a batch into unique articles and audited rejects.
pub fn filter_duplicates(
    articles: Vec<Article>,
    threshold: u32,
    fingerprinter: &Fingerprinter,
) -> DedupOutcome {
    let mut dedup = Deduplicator::new(fingerprinter, threshold);
    let mut outcome = DedupOutcome::default();

    for article in articles {
        match dedup.check(&article) {
            DuplicateDecision::Unique(_) => outcome.unique.push(article),
            DuplicateDecision::Duplicate {
                reason,
                canonical,
                detail,
            } => outcome.filtered.push(FilteredArticle {
                article,
                filter_reason: reason,
                duplicate_of: canonical,
                filter_detail: detail,
            }),
        }
    }

    outcome
}
