//! Pipeline driver.
//!
//! One `fusion run` is one call to [`Pipeline::run`]:
//!
//! ```text
//! sources ──(concurrent)──► cursor filter ──► normalize ──► duplicate filter
//!                                                               │
//!   knowledge base ◄── retain prior ◄── combine ◄── enrich ◄── split
//! ```
//!
//! Records already in the knowledge base keep their stored positions; new
//! ones are appended in batch order.
//!
//! A source that fails to list contributes nothing and its stored records
//! are kept. Enrichment failures stay on the record. Only store writes and
//! "no source reachable" fail the run. The fetch-state cursor and the
//! account cache are saved after the knowledge base, so a failed write never
//! advances them.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use futures::future::join_all;
use tracing::{info, warn};

use crate::account_cache::AccountCache;
use crate::config::Config;
use crate::cursor::filter_new_since;
use crate::dedup::filter_duplicates;
use crate::enrich::{EnrichmentCoordinator, Enricher};
use crate::fingerprint::Fingerprinter;
use crate::llm::create_enricher;
use crate::models::{Article, DuplicateReason};
use crate::normalize::normalize_batch;
use crate::progress::{ProgressEvent, ProgressReporter};
use crate::reconcile::{combine, restore_stored_order, retain_prior, split_with};
use crate::store::KnowledgeStore;
use crate::traits::ConnectorRegistry;

/// Flags for one run.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Stop after reconciliation; write nothing.
    pub dry_run: bool,
    /// Forget persisted account names and resolve them again.
    pub refresh_accounts: bool,
    /// Re-enrich unchanged records whose last attempt did not succeed.
    pub retry_failed: bool,
}

/// What one source contributed.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceReport {
    pub source: String,
    pub fetched: usize,
    /// Dropped by the publication cursor.
    pub skipped: usize,
    pub error: Option<String>,
}

/// Counts for one run, printed by `fusion run`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunReport {
    pub sources: Vec<SourceReport>,
    pub raw: usize,
    pub cursor_skipped: usize,
    pub unique: usize,
    pub filtered_empty: usize,
    pub filtered_fingerprint: usize,
    pub filtered_near_duplicate: usize,
    pub reused: usize,
    pub carried_forward: usize,
    pub needs_enrichment: usize,
    pub enriched: usize,
    pub enrichment_failed: usize,
    pub total: usize,
    pub dry_run: bool,
}

impl RunReport {
    pub fn filtered(&self) -> usize {
        self.filtered_empty + self.filtered_fingerprint + self.filtered_near_duplicate
    }

    pub fn failed_sources(&self) -> usize {
        self.sources.iter().filter(|s| s.error.is_some()).count()
    }

    /// Print the run summary as `key: value` lines.
    pub fn print(&self) {
        if self.dry_run {
            println!("run (dry-run)");
        } else {
            println!("run");
        }
        for source in &self.sources {
            match &source.error {
                Some(error) => println!("  source {}: FAILED ({})", source.source, error),
                None if source.skipped > 0 => println!(
                    "  source {}: {} articles ({} before cursor)",
                    source.source, source.fetched, source.skipped
                ),
                None => println!("  source {}: {} articles", source.source, source.fetched),
            }
        }
        println!("  fetched: {}", self.raw);
        if self.cursor_skipped > 0 {
            println!("  skipped by cursor: {}", self.cursor_skipped);
        }
        println!("  unique: {}", self.unique);
        println!(
            "  filtered: {} (empty {}, unreadable {}, near-duplicate {})",
            self.filtered(),
            self.filtered_empty,
            self.filtered_fingerprint,
            self.filtered_near_duplicate
        );
        println!("  reused: {}", self.reused);
        println!("  carried forward: {}", self.carried_forward);
        println!("  needs enrichment: {}", self.needs_enrichment);
        if !self.dry_run {
            println!("  enriched: {}", self.enriched);
            println!("  enrichment failed: {}", self.enrichment_failed);
            println!("  knowledge base: {} records", self.total);
        }
        println!("ok");
    }
}

/// A configured pipeline: store, connectors and enricher.
pub struct Pipeline {
    config: Config,
    store: KnowledgeStore,
    registry: ConnectorRegistry,
    enricher: Arc<dyn Enricher>,
    accounts: Arc<AccountCache>,
}

impl Pipeline {
    /// Build connectors and the enricher from the config.
    pub fn from_config(config: Config) -> Result<Self> {
        let accounts = Arc::new(AccountCache::new());
        let registry = ConnectorRegistry::from_config(&config, Arc::clone(&accounts));
        let enricher = create_enricher(&config.enrichment)?;
        Ok(Self::new(config, registry, enricher, accounts))
    }

    pub fn new(
        config: Config,
        registry: ConnectorRegistry,
        enricher: Arc<dyn Enricher>,
        accounts: Arc<AccountCache>,
    ) -> Self {
        let store = KnowledgeStore::new(&config.store);
        Self {
            config,
            store,
            registry,
            enricher,
            accounts,
        }
    }

    pub fn store(&self) -> &KnowledgeStore {
        &self.store
    }

    pub fn accounts(&self) -> &Arc<AccountCache> {
        &self.accounts
    }

    pub async fn run(
        &self,
        options: RunOptions,
        progress: &dyn ProgressReporter,
    ) -> Result<RunReport> {
        if self.registry.is_empty() {
            bail!("No connectors configured. Add a [connectors.<type>.<name>] table to the config.");
        }
        let stored_accounts = self
            .store
            .load_accounts()
            .context("Failed to load account cache")?;
        if options.refresh_accounts {
            self.accounts.clear();
            info!(dropped = stored_accounts.len(), "account cache cleared");
        } else {
            self.accounts.extend(stored_accounts);
        }

        let mut report = RunReport {
            dry_run: options.dry_run,
            ..Default::default()
        };

        let mut fetch_state = self
            .store
            .load_fetch_state()
            .context("Failed to load fetch state")?;

        let fetches = self.registry.connectors().iter().map(|connector| async move {
            let label = connector.source_label();
            progress.report(ProgressEvent::Discovering {
                source: label.clone(),
            });
            let result = connector.list_documents().await;
            (label, connector.tracks_cursor(), result)
        });

        let mut batch: Vec<Article> = Vec::new();
        for (label, tracks_cursor, result) in join_all(fetches).await {
            let articles = match result {
                Ok(articles) => articles,
                Err(e) => {
                    warn!(source = %label, error = %e, "source failed, keeping its stored records");
                    report.sources.push(SourceReport {
                        source: label,
                        fetched: 0,
                        skipped: 0,
                        error: Some(e.to_string()),
                    });
                    continue;
                }
            };

            let fetched = articles.len();
            progress.report(ProgressEvent::Fetched {
                source: label.clone(),
                count: fetched as u64,
            });

            let (articles, skipped) = if tracks_cursor {
                let outcome = filter_new_since(articles, fetch_state.last_seen(&label));
                if let Some(newest) = outcome.newest {
                    fetch_state.advance(&label, newest);
                }
                (outcome.fresh, outcome.skipped)
            } else {
                (articles, 0)
            };

            info!(source = %label, fetched, skipped, "source listed");
            report.raw += fetched;
            report.cursor_skipped += skipped;
            report.sources.push(SourceReport {
                source: label,
                fetched,
                skipped,
                error: None,
            });
            batch.extend(articles);
        }

        if report.failed_sources() == report.sources.len() {
            bail!(
                "No source reachable ({} configured, all failed)",
                report.sources.len()
            );
        }

        normalize_batch(&mut batch);

        let fingerprinter = Fingerprinter::new(&self.config.dedup);
        let dedup = filter_duplicates(batch, self.config.dedup.threshold, &fingerprinter);
        report.unique = dedup.unique.len();
        report.filtered_empty = dedup.count(DuplicateReason::EmptyContent);
        report.filtered_fingerprint = dedup.count(DuplicateReason::FingerprintError);
        report.filtered_near_duplicate = dedup.count(DuplicateReason::NearDuplicate);
        info!(
            unique = report.unique,
            filtered = report.filtered(),
            "duplicate filter done"
        );

        let prior = self
            .store
            .load_records()
            .context("Failed to load knowledge base")?;
        let split = split_with(&dedup.unique, &prior, options.retry_failed);
        report.reused = split.unchanged;
        report.carried_forward = split.carried_forward;
        report.needs_enrichment = split.needs_enrichment.len();

        if options.dry_run {
            report.total = prior.len();
            return Ok(report);
        }

        let enriched = if self.enricher.is_enabled() && !split.needs_enrichment.is_empty() {
            let coordinator = EnrichmentCoordinator::new(
                Arc::clone(&self.enricher),
                self.config.enrichment.concurrency,
                Duration::from_secs(self.config.enrichment.timeout_secs),
            );
            let outcome = coordinator
                .enrich_all(split.needs_enrichment, progress)
                .await;
            report.enriched = outcome.enriched;
            report.enrichment_failed = outcome.failed;
            outcome.records
        } else {
            if !split.needs_enrichment.is_empty() {
                info!(
                    count = split.needs_enrichment.len(),
                    "enrichment disabled, storing articles unenriched"
                );
            }
            Vec::new()
        };

        let mut records = combine(&dedup.unique, enriched, &split.reused);
        let restored = retain_prior(&mut records, &prior);
        if restored > 0 {
            warn!(restored, "stored records missing from this run were kept");
        }
        let records = restore_stored_order(records, &prior);
        report.total = records.len();

        self.store
            .save_records(&records)
            .context("Failed to write knowledge base")?;
        self.store
            .save_filtered(&dedup.filtered)
            .context("Failed to write filtered audit")?;
        self.store
            .save_fetch_state(&fetch_state)
            .context("Failed to write fetch state")?;
        self.store
            .save_accounts(&self.accounts.snapshot())
            .context("Failed to write account cache")?;

        info!(total = report.total, "knowledge base written");
        Ok(report)
    }
}

/// Build a pipeline from the config and run it once.
pub async fn run_pipeline(
    config: &Config,
    options: RunOptions,
    progress: &dyn ProgressReporter,
) -> Result<RunReport> {
    let pipeline = Pipeline::from_config(config.clone())?;
    pipeline.run(options, progress).await
}
