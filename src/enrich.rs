//! Bounded-concurrency enrichment with per-article failure isolation.
//!
//! # Architecture
//!
//! ```text
//! articles ──► JoinSet (one task per article)
//!                 │  each task: acquire semaphore permit
//!                 │             timeout(catch_unwind(enricher.process))
//!                 ▼
//!              completion order ──► records + progress event per completion
//! ```
//!
//! The semaphore caps in-flight calls at `concurrency` no matter how large
//! the batch is. Every article comes back as a [`KnowledgeRecord`]:
//!
//! | Outcome | Record |
//! |---------|--------|
//! | `Ok(enrichment)` | enrichment fields, `llm_status = "ok"` |
//! | `Err(e)`, timeout or panic | original article, `llm_status = "FAILED"`, `llm_error` |
//! | task lost (join error) | original article, `llm_status = "FAILED"` |
//!
//! Records are returned in completion order; the reconciliation combine step
//! restores batch order.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use futures::FutureExt;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

use crate::error::EnrichmentError;
use crate::models::{Article, Enrichment, EnrichmentStatus, KnowledgeRecord};
use crate::progress::{ProgressEvent, ProgressReporter};

/// An external per-article analysis step.
///
/// Implementations should return `Err` for ordinary failures; the
/// coordinator turns errors, timeouts and panics into an inline marker on
/// the stored record.
///
/// # Example
///
/// ```rust
/// use async_trait::async_trait;
/// use info_fusion::enrich::Enricher;
/// use info_fusion::error::EnrichmentError;
/// use info_fusion::models::{Article, Enrichment};
///
/// struct TitleEcho;
///
/// #[async_trait]
/// impl Enricher for TitleEcho {
///     fn name(&self) -> &str { "echo" }
///
///     async fn process(&self, article: &Article) -> Result<Enrichment, EnrichmentError> {
///         Ok(Enrichment {
///             deep_summary: Some(article.title.clone()),
///             ..Default::default()
///         })
///     }
/// }
/// ```
#[async_trait]
pub trait Enricher: Send + Sync {
    fn name(&self) -> &str;

    /// A disabled enricher is never called; articles are stored unenriched.
    fn is_enabled(&self) -> bool {
        true
    }

    async fn process(&self, article: &Article) -> Result<Enrichment, EnrichmentError>;
}

/// Records produced by one [`EnrichmentCoordinator::enrich_all`] call.
#[derive(Debug, Default)]
pub struct EnrichmentOutcome {
    /// In completion order.
    pub records: Vec<KnowledgeRecord>,
    pub enriched: usize,
    pub failed: usize,
}

pub struct EnrichmentCoordinator {
    enricher: Arc<dyn Enricher>,
    concurrency: usize,
    timeout: Duration,
}

impl EnrichmentCoordinator {
    pub fn new(enricher: Arc<dyn Enricher>, concurrency: usize, timeout: Duration) -> Self {
        Self {
            enricher,
            concurrency: concurrency.max(1),
            timeout,
        }
    }

    pub fn enricher(&self) -> &Arc<dyn Enricher> {
        &self.enricher
    }

    /// Enrich every article; none is ever dropped.
    pub async fn enrich_all(
        &self,
        articles: Vec<Article>,
        progress: &dyn ProgressReporter,
    ) -> EnrichmentOutcome {
        let total = articles.len();
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();

        for (index, article) in articles.iter().cloned().enumerate() {
            let enricher = Arc::clone(&self.enricher);
            let semaphore = Arc::clone(&semaphore);
            let timeout = self.timeout;
            tasks.spawn(async move {
                let result = match semaphore.acquire_owned().await {
                    Ok(permit) => {
                        let result = attempt(enricher.as_ref(), &article, timeout).await;
                        drop(permit);
                        result
                    }
                    Err(e) => Err(EnrichmentError::NotConfigured(e.to_string())),
                };
                (index, article, result)
            });
        }

        let mut outcome = EnrichmentOutcome::default();
        let mut completed = vec![false; total];
        let mut finished = 0u64;

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, article, result)) => {
                    completed[index] = true;
                    let record = match result {
                        Ok(enrichment) => {
                            debug!(title = %article.title, "enriched");
                            outcome.enriched += 1;
                            succeeded(article, enrichment)
                        }
                        Err(e) => {
                            warn!(title = %article.title, error = %e, "enrichment failed");
                            outcome.failed += 1;
                            KnowledgeRecord::failed(article, e.to_string(), now())
                        }
                    };
                    outcome.records.push(record);
                }
                Err(e) => {
                    error!(error = %e, "enrichment task did not complete");
                }
            }
            finished += 1;
            progress.report(ProgressEvent::Enriching {
                n: finished,
                total: total as u64,
            });
        }

        // Tasks that never reported back keep their original article.
        for (index, done) in completed.iter().enumerate() {
            if !done {
                outcome.failed += 1;
                outcome.records.push(KnowledgeRecord::failed(
                    articles[index].clone(),
                    "enrichment task aborted",
                    now(),
                ));
            }
        }

        outcome
    }
}

/// One guarded call: panics and overruns become errors.
async fn attempt(
    enricher: &dyn Enricher,
    article: &Article,
    timeout: Duration,
) -> Result<Enrichment, EnrichmentError> {
    let call = AssertUnwindSafe(enricher.process(article)).catch_unwind();
    match tokio::time::timeout(timeout, call).await {
        Err(_) => Err(EnrichmentError::Timeout(timeout)),
        Ok(Err(panic)) => Err(EnrichmentError::Panicked(panic_message(panic.as_ref()))),
        Ok(Ok(result)) => result,
    }
}

fn succeeded(article: Article, mut enrichment: Enrichment) -> KnowledgeRecord {
    enrichment.llm_status = Some(EnrichmentStatus::Ok);
    enrichment.llm_error = None;
    enrichment.processed_at = Some(now());
    KnowledgeRecord {
        article,
        enrichment,
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

pub(crate) fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NoProgress;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Summarizes with the title; misbehaves on request.
    struct ScriptedEnricher {
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        delay: Duration,
    }

    impl ScriptedEnricher {
        fn new(delay: Duration) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
                delay,
            }
        }
    }

    #[async_trait]
    impl Enricher for ScriptedEnricher {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn process(&self, article: &Article) -> Result<Enrichment, EnrichmentError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(current, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            match article.title.as_str() {
                "explode" => panic!("model client crashed"),
                "refuse" => Err(EnrichmentError::Api {
                    status: 400,
                    body: "bad request".into(),
                }),
                "stall" => {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    Ok(Enrichment::default())
                }
                title => Ok(Enrichment {
                    deep_summary: Some(format!("summary of {title}")),
                    llm_model: Some("scripted-1".into()),
                    ..Default::default()
                }),
            }
        }
    }

    struct Recorder(Mutex<Vec<ProgressEvent>>);

    impl ProgressReporter for Recorder {
        fn report(&self, event: ProgressEvent) {
            self.0.lock().unwrap().push(event);
        }
    }

    fn batch(titles: &[&str]) -> Vec<Article> {
        titles
            .iter()
            .map(|t| Article::new("test", *t, format!("body of {t}")))
            .collect()
    }

    fn by_title<'a>(outcome: &'a EnrichmentOutcome, title: &str) -> &'a KnowledgeRecord {
        outcome
            .records
            .iter()
            .find(|r| r.article.title == title)
            .unwrap()
    }

    #[tokio::test]
    async fn successful_results_are_marked_ok() {
        let enricher = Arc::new(ScriptedEnricher::new(Duration::ZERO));
        let coordinator = EnrichmentCoordinator::new(enricher.clone(), 5, Duration::from_secs(5));
        let outcome = coordinator.enrich_all(batch(&["a", "b"]), &NoProgress).await;

        assert_eq!(outcome.enriched, 2);
        assert_eq!(outcome.failed, 0);
        let a = by_title(&outcome, "a");
        assert!(a.is_enriched());
        assert_eq!(a.enrichment.deep_summary.as_deref(), Some("summary of a"));
        assert!(a.enrichment.processed_at.is_some());
        assert_eq!(enricher.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn one_failure_never_drops_the_batch() {
        let enricher = Arc::new(ScriptedEnricher::new(Duration::ZERO));
        let coordinator = EnrichmentCoordinator::new(enricher, 3, Duration::from_secs(5));
        let outcome = coordinator
            .enrich_all(batch(&["a", "explode", "b", "c"]), &NoProgress)
            .await;

        assert_eq!(outcome.records.len(), 4);
        assert_eq!(outcome.enriched, 3);
        assert_eq!(outcome.failed, 1);
        let failed = by_title(&outcome, "explode");
        assert!(failed.is_failed());
        assert_eq!(failed.article.content, "body of explode");
        assert!(failed
            .enrichment
            .llm_error
            .as_deref()
            .unwrap()
            .contains("model client crashed"));
    }

    #[tokio::test]
    async fn errors_and_timeouts_become_markers() {
        let enricher = Arc::new(ScriptedEnricher::new(Duration::ZERO));
        let coordinator = EnrichmentCoordinator::new(enricher, 2, Duration::from_millis(200));
        let outcome = coordinator
            .enrich_all(batch(&["refuse", "stall", "fine"]), &NoProgress)
            .await;

        assert_eq!(outcome.failed, 2);
        assert!(by_title(&outcome, "refuse").is_failed());
        let stalled = by_title(&outcome, "stall");
        assert!(stalled.is_failed());
        assert!(stalled.enrichment.llm_error.as_deref().unwrap().contains("timed out"));
        assert!(by_title(&outcome, "fine").is_enriched());
    }

    #[tokio::test]
    async fn concurrency_is_bounded() {
        let enricher = Arc::new(ScriptedEnricher::new(Duration::from_millis(20)));
        let coordinator = EnrichmentCoordinator::new(enricher.clone(), 2, Duration::from_secs(5));
        let titles: Vec<String> = (0..8).map(|i| format!("doc-{i}")).collect();
        let refs: Vec<&str> = titles.iter().map(String::as_str).collect();
        let outcome = coordinator.enrich_all(batch(&refs), &NoProgress).await;

        assert_eq!(outcome.records.len(), 8);
        assert!(enricher.max_in_flight.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn progress_is_reported_per_completion() {
        let enricher = Arc::new(ScriptedEnricher::new(Duration::ZERO));
        let coordinator = EnrichmentCoordinator::new(enricher, 5, Duration::from_secs(5));
        let recorder = Recorder(Mutex::new(Vec::new()));
        coordinator.enrich_all(batch(&["a", "b", "c"]), &recorder).await;

        let events = recorder.0.lock().unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[2], ProgressEvent::Enriching { n: 3, total: 3 });
    }

    #[tokio::test]
    async fn empty_batch_makes_no_calls() {
        let enricher = Arc::new(ScriptedEnricher::new(Duration::ZERO));
        let coordinator = EnrichmentCoordinator::new(enricher.clone(), 5, Duration::from_secs(5));
        let outcome = coordinator.enrich_all(Vec::new(), &NoProgress).await;
        assert!(outcome.records.is_empty());
        assert_eq!(enricher.calls.load(Ordering::SeqCst), 0);
    }
}
