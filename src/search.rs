//! Listing and substring search over the knowledge base.
//!
//! No index: the knowledge base is loaded and scanned. Search is a
//! case-insensitive substring match over the title, content, author and the
//! enrichment fields. Hits are ranked by where the query matched (title
//! first, then summary and key points, then everything else) and ties keep
//! knowledge base order.

use anyhow::Result;

use crate::config::Config;
use crate::models::{EnrichmentStatus, KnowledgeRecord};
use crate::store::KnowledgeStore;

const SNIPPET_CHARS: usize = 120;

/// One search hit.
#[derive(Debug, Clone)]
pub struct SearchHit<'a> {
    pub record: &'a KnowledgeRecord,
    pub score: u32,
    pub snippet: String,
}

/// Records from `source` (matched against the source label or the
/// platform), in knowledge base order.
pub fn list_records<'a>(
    records: &'a [KnowledgeRecord],
    source: Option<&str>,
    limit: Option<usize>,
) -> Vec<&'a KnowledgeRecord> {
    let wanted = source.map(str::to_lowercase);
    records
        .iter()
        .filter(|r| match &wanted {
            Some(wanted) => {
                r.article.source.to_lowercase().contains(wanted.as_str())
                    || r.article
                        .platform
                        .as_deref()
                        .is_some_and(|p| p.eq_ignore_ascii_case(wanted))
            }
            None => true,
        })
        .take(limit.unwrap_or(usize::MAX))
        .collect()
}

/// Rank records matching `query`.
pub fn search_records<'a>(
    records: &'a [KnowledgeRecord],
    query: &str,
    limit: Option<usize>,
) -> Vec<SearchHit<'a>> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return Vec::new();
    }

    let mut hits: Vec<SearchHit<'a>> = records
        .iter()
        .filter_map(|record| {
            let score = score(record, &needle);
            (score > 0).then(|| SearchHit {
                record,
                score,
                snippet: snippet(record, &needle),
            })
        })
        .collect();

    // stable: equal scores keep knowledge base order
    hits.sort_by(|a, b| b.score.cmp(&a.score));
    hits.truncate(limit.unwrap_or(usize::MAX));
    hits
}

fn contains(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(needle)
}

fn score(record: &KnowledgeRecord, needle: &str) -> u32 {
    let article = &record.article;
    let enrichment = &record.enrichment;
    let mut score = 0;

    if contains(&article.title, needle) {
        score += 8;
    }
    if enrichment
        .deep_summary
        .as_deref()
        .is_some_and(|s| contains(s, needle))
    {
        score += 4;
    }
    if enrichment.key_points.iter().any(|p| contains(p, needle)) {
        score += 4;
    }
    if enrichment
        .open_question
        .as_deref()
        .is_some_and(|q| contains(q, needle))
    {
        score += 2;
    }
    if article.author.as_deref().is_some_and(|a| contains(a, needle)) {
        score += 2;
    }
    if contains(&article.content, needle) {
        score += 1;
    }
    score
}

/// Up to [`SNIPPET_CHARS`] characters of content around the first match,
/// falling back to the summary or the start of the content.
fn snippet(record: &KnowledgeRecord, needle: &str) -> String {
    let content = &record.article.content;
    let chars: Vec<char> = content.chars().collect();
    let lowered: Vec<char> = content.to_lowercase().chars().collect();
    let needle_chars: Vec<char> = needle.chars().collect();

    // lowercasing can change char counts; only trust positions when it did not
    let position = if lowered.len() == chars.len() && !needle_chars.is_empty() {
        lowered
            .windows(needle_chars.len())
            .position(|w| w == needle_chars.as_slice())
    } else {
        None
    };

    let text: String = match position {
        Some(pos) => {
            let start = pos.saturating_sub(SNIPPET_CHARS / 3);
            chars.iter().skip(start).take(SNIPPET_CHARS).collect()
        }
        None => record
            .enrichment
            .deep_summary
            .as_deref()
            .unwrap_or(content)
            .chars()
            .take(SNIPPET_CHARS)
            .collect(),
    };
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn status_label(record: &KnowledgeRecord) -> &'static str {
    match record.enrichment.llm_status {
        Some(EnrichmentStatus::Ok) => "ok",
        Some(EnrichmentStatus::Failed) => "FAILED",
        None => "-",
    }
}

/// CLI entry point for `fusion list`.
pub fn run_list(config: &Config, source: Option<&str>, limit: Option<usize>) -> Result<()> {
    let records = KnowledgeStore::new(&config.store).load_records()?;
    let listed = list_records(&records, source, limit);
    if listed.is_empty() {
        println!("No records.");
        return Ok(());
    }

    for record in &listed {
        println!(
            "{:<6} {:<24} {}",
            status_label(record),
            record.article.source,
            record.article.title
        );
        println!("       key: {}", record.key());
    }
    println!();
    println!("{} of {} records", listed.len(), records.len());
    Ok(())
}

/// CLI entry point for `fusion search`.
pub fn run_search(config: &Config, query: &str, limit: Option<usize>) -> Result<()> {
    if query.trim().is_empty() {
        println!("No results.");
        return Ok(());
    }

    let records = KnowledgeStore::new(&config.store).load_records()?;
    let hits = search_records(&records, query, Some(limit.unwrap_or(20)));
    if hits.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, hit) in hits.iter().enumerate() {
        let article = &hit.record.article;
        println!(
            "{}. [{}] {} ({})",
            i + 1,
            hit.score,
            article.title,
            article.source
        );
        println!("    key: {}", hit.record.key());
        if !hit.snippet.is_empty() {
            println!("    {}", hit.snippet);
        }
    }
    Ok(())
}
