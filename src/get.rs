//! Record retrieval by key.
//!
//! Looks a record up in the knowledge base by its [`ArticleKey`] (the same
//! key `fusion list` and `fusion search` print). Records without
//! enrichment fields are shown with those sections omitted.

use anyhow::{bail, Result};

use crate::config::Config;
use crate::key::ArticleKey;
use crate::models::{EnrichmentStatus, KnowledgeRecord};
use crate::store::KnowledgeStore;

/// Find one record by key.
pub fn get_record(config: &Config, key: &str) -> Result<KnowledgeRecord> {
    let records = KnowledgeStore::new(&config.store).load_records()?;
    find_record(records, key)
}

fn find_record(records: Vec<KnowledgeRecord>, key: &str) -> Result<KnowledgeRecord> {
    let wanted = ArticleKey::from(key.trim());
    match records.into_iter().find(|r| r.key() == wanted) {
        Some(record) => Ok(record),
        None => bail!("record not found: {}", key),
    }
}

/// CLI entry point: print one record.
pub fn run_get(config: &Config, key: &str) -> Result<()> {
    let record = get_record(config, key)?;
    let article = &record.article;
    let enrichment = &record.enrichment;

    println!("--- Record ---");
    println!("key:          {}", record.key());
    println!("title:        {}", article.title);
    println!("source:       {}", article.source);
    if let Some(author) = &article.author {
        println!("author:       {}", author);
    }
    if let Some(platform) = &article.platform {
        println!("platform:     {}", platform);
    }
    if let Some(link) = article.display_link() {
        println!("link:         {}", link);
    }
    if let Some(published) = article.publication_timestamp() {
        println!("published:    {}", published);
    }
    let status = match enrichment.llm_status {
        Some(EnrichmentStatus::Ok) => "ok",
        Some(EnrichmentStatus::Failed) => "FAILED",
        None => "not enriched",
    };
    println!("enrichment:   {}", status);
    if let Some(error) = &enrichment.llm_error {
        println!("error:        {}", error);
    }
    if let Some(processed) = &enrichment.processed_at {
        println!("processed_at: {}", processed);
    }
    println!();

    if let Some(summary) = &enrichment.deep_summary {
        println!("--- Summary ---");
        println!("{}", summary);
        println!();
    }
    if !enrichment.key_points.is_empty() {
        println!("--- Key points ---");
        for point in &enrichment.key_points {
            println!("- {}", point);
        }
        println!();
    }
    if !enrichment.insights.is_empty() {
        println!("--- Insights ---");
        for insight in &enrichment.insights {
            println!("[{}] {}", insight.domain, insight.analysis);
            if !insight.connection.is_empty() {
                println!("  {}", insight.connection);
            }
        }
        println!();
    }
    if let Some(question) = &enrichment.open_question {
        println!("--- Open question ---");
        println!("{}", question);
        println!();
    }

    println!("--- Content ---");
    println!("{}", article.content);

    Ok(())
}
