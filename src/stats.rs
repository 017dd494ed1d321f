//! Knowledge base statistics.
//!
//! A quick overview of what the store holds: record counts by enrichment
//! status, per-platform and per-source breakdowns, the size of the filtered
//! audit, and the publication cursors. Used by `fusion stats` to confirm
//! runs are folding articles in as expected.

use std::collections::BTreeMap;

use anyhow::Result;

use crate::config::Config;
use crate::cursor::parse_timestamp;
use crate::models::KnowledgeRecord;
use crate::store::KnowledgeStore;

/// Counts for one group of records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupStats {
    pub records: usize,
    pub enriched: usize,
    pub failed: usize,
}

impl GroupStats {
    fn add(&mut self, record: &KnowledgeRecord) {
        self.records += 1;
        if record.is_enriched() {
            self.enriched += 1;
        } else if record.is_failed() {
            self.failed += 1;
        }
    }

    pub fn pending(&self) -> usize {
        self.records - self.enriched - self.failed
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct KnowledgeStats {
    pub total: GroupStats,
    pub by_platform: BTreeMap<String, GroupStats>,
    pub by_source: BTreeMap<String, GroupStats>,
    /// Newest `processed_at` across all records.
    pub last_processed: Option<String>,
}

pub fn collect_stats(records: &[KnowledgeRecord]) -> KnowledgeStats {
    let mut stats = KnowledgeStats::default();
    for record in records {
        stats.total.add(record);
        let platform = record
            .article
            .platform
            .clone()
            .unwrap_or_else(|| "(none)".to_string());
        stats.by_platform.entry(platform).or_default().add(record);
        stats
            .by_source
            .entry(record.article.source.clone())
            .or_default()
            .add(record);

        if let Some(processed) = record.enrichment.processed_at.as_deref() {
            let newer = match (&stats.last_processed, parse_timestamp(processed)) {
                (None, _) => true,
                (Some(current), Some(candidate)) => {
                    parse_timestamp(current).map_or(true, |current| candidate > current)
                }
                (Some(_), None) => false,
            };
            if newer {
                stats.last_processed = Some(processed.to_string());
            }
        }
    }
    stats
}

/// Run the stats command: load the store and print a summary.
pub fn run_stats(config: &Config) -> Result<()> {
    let store = KnowledgeStore::new(&config.store);
    let records = store.load_records()?;
    let filtered = store.load_filtered()?;
    let fetch_state = store.load_fetch_state()?;
    let stats = collect_stats(&records);

    let kb_size = std::fs::metadata(store.knowledge_base_path())
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Info Fusion: Knowledge Base Stats");
    println!("=================================");
    println!();
    println!("  Store:       {}", store.knowledge_base_path().display());
    println!("  Size:        {}", format_bytes(kb_size));
    println!();
    println!("  Records:     {}", stats.total.records);
    println!(
        "  Enriched:    {} / {} ({}%)",
        stats.total.enriched,
        stats.total.records,
        percent(stats.total.enriched, stats.total.records)
    );
    println!("  Failed:      {}", stats.total.failed);
    println!("  Unenriched:  {}", stats.total.pending());
    println!("  Filtered:    {} (last run)", filtered.len());
    if let Some(last) = &stats.last_processed {
        println!("  Last enrich: {}", format_relative(last));
    }

    print_groups("PLATFORM", &stats.by_platform);
    print_groups("SOURCE", &stats.by_source);

    let cursors: Vec<&str> = fetch_state.sources().collect();
    if !cursors.is_empty() {
        println!();
        println!("  Cursors:");
        for source in cursors {
            let seen = fetch_state
                .last_seen(source)
                .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_else(|| "never".to_string());
            println!("  {:<32} {}", source, seen);
        }
    }

    println!();
    Ok(())
}

fn print_groups(title: &str, groups: &BTreeMap<String, GroupStats>) {
    if groups.is_empty() {
        return;
    }
    println!();
    println!(
        "  {:<32} {:>7} {:>9} {:>7}",
        title, "RECORDS", "ENRICHED", "FAILED"
    );
    println!("  {}", "-".repeat(58));
    for (name, group) in groups {
        println!(
            "  {:<32} {:>7} {:>9} {:>7}",
            name, group.records, group.enriched, group.failed
        );
    }
}

fn percent(part: usize, whole: usize) -> usize {
    if whole == 0 {
        0
    } else {
        part * 100 / whole
    }
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

/// "3 hours ago" for recent timestamps, the timestamp itself otherwise.
fn format_relative(timestamp: &str) -> String {
    let Some(then) = parse_timestamp(timestamp) else {
        return timestamp.to_string();
    };
    let delta = (chrono::Utc::now().naive_utc() - then).num_seconds();

    if delta < 0 {
        timestamp.to_string()
    } else if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        then.format("%Y-%m-%d %H:%M").to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Article, Enrichment, EnrichmentStatus};

    fn with_platform(platform: &str, source: &str) -> Article {
        Article {
            platform: Some(platform.into()),
            ..Article::new(source, "t", "c")
        }
    }

    #[test]
    fn groups_by_platform_and_status() {
        let records = vec![
            KnowledgeRecord {
                article: with_platform("wechat", "机器之心"),
                enrichment: Enrichment {
                    llm_status: Some(EnrichmentStatus::Ok),
                    processed_at: Some("2025-03-01T08:00:00Z".into()),
                    ..Default::default()
                },
            },
            KnowledgeRecord::failed(
                with_platform("wechat", "量子位"),
                "timeout",
                "2025-03-02T08:00:00Z".into(),
            ),
            KnowledgeRecord::unenriched(with_platform("yuque", "yuque:handbook")),
        ];

        let stats = collect_stats(&records);
        assert_eq!(
            stats.total,
            GroupStats {
                records: 3,
                enriched: 1,
                failed: 1
            }
        );
        assert_eq!(stats.total.pending(), 1);
        assert_eq!(stats.by_platform["wechat"].records, 2);
        assert_eq!(stats.by_platform["yuque"].pending(), 1);
        assert_eq!(stats.by_source.len(), 3);
        assert_eq!(stats.last_processed.as_deref(), Some("2025-03-02T08:00:00Z"));
    }

    #[test]
    fn formatting_helpers() {
        assert_eq!(percent(1, 3), 33);
        assert_eq!(percent(0, 0), 0);
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_relative("not a time"), "not a time");
    }
}
