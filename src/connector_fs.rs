//! Local directory connector.
//!
//! Walks `root` and turns every file matching `include_globs` (and none of
//! `exclude_globs`) into one article. Files are read as bytes and decoded
//! lossily, so a binary file still becomes an article and is rejected by the
//! duplicate filter with `fingerprint-error` instead of failing the source.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::Path;
use walkdir::WalkDir;

use crate::config::FilesystemConnectorConfig;
use crate::error::FetchError;
use crate::models::Article;
use crate::traits::Connector;

pub const PLATFORM_LOCAL: &str = "local";

pub struct FilesystemConnector {
    name: String,
    config: FilesystemConnectorConfig,
}

impl FilesystemConnector {
    pub fn new(name: String, config: FilesystemConnectorConfig) -> Self {
        Self { name, config }
    }

    pub fn root(&self) -> &Path {
        &self.config.root
    }
}

#[async_trait]
impl Connector for FilesystemConnector {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Markdown and text files from a local directory"
    }

    fn connector_type(&self) -> &str {
        "filesystem"
    }

    async fn list_documents(&self) -> Result<Vec<Article>, FetchError> {
        scan_directory(&self.name, &self.source_label(), &self.config)
    }
}

pub fn scan_directory(
    name: &str,
    source_label: &str,
    config: &FilesystemConnectorConfig,
) -> Result<Vec<Article>, FetchError> {
    let root = &config.root;
    if !root.is_dir() {
        return Err(FetchError::Config(format!(
            "filesystem root does not exist: {}",
            root.display()
        )));
    }

    let include_set = build_globset(&config.include_globs)?;

    let mut excludes = vec![
        "**/.git/**".to_string(),
        "**/target/**".to_string(),
        "**/node_modules/**".to_string(),
    ];
    excludes.extend(config.exclude_globs.iter().cloned());
    let exclude_set = build_globset(&excludes)?;

    let mut articles = Vec::new();
    for entry in WalkDir::new(root).follow_links(config.follow_symlinks) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().replace('\\', "/");

        if exclude_set.is_match(&rel_str) || !include_set.is_match(&rel_str) {
            continue;
        }

        articles.push(file_to_article(path, &rel_str, name, source_label)?);
    }

    articles.sort_by(|a, b| a.slug.cmp(&b.slug));
    Ok(articles)
}

fn file_to_article(
    path: &Path,
    relative_path: &str,
    name: &str,
    source_label: &str,
) -> Result<Article, FetchError> {
    let bytes = std::fs::read(path)?;
    let content = String::from_utf8_lossy(&bytes).into_owned();

    let modified: DateTime<Utc> = std::fs::metadata(path)?
        .modified()
        .map(DateTime::<Utc>::from)
        .unwrap_or_default();

    let is_markdown = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("md") || ext.eq_ignore_ascii_case("markdown"));

    let title = if is_markdown {
        first_heading(&content)
    } else {
        None
    }
    .unwrap_or_else(|| {
        path.file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| relative_path.to_string())
    });

    Ok(Article {
        slug: Some(format!("{name}/{relative_path}")),
        url: Some(format!("file://{}", path.display())),
        updated_at: Some(modified.to_rfc3339_opts(SecondsFormat::Secs, true)),
        platform: Some(PLATFORM_LOCAL.to_string()),
        content_format: Some(if is_markdown { "markdown" } else { "text" }.to_string()),
        ..Article::new(source_label, title, content)
    })
}

/// Text of the first ATX heading (`# Title`), if any.
fn first_heading(content: &str) -> Option<String> {
    content
        .lines()
        .map(str::trim_start)
        .find(|line| line.starts_with('#'))
        .map(|line| line.trim_start_matches('#').trim().to_string())
        .filter(|title| !title.is_empty())
}

fn build_globset(patterns: &[String]) -> Result<GlobSet, FetchError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}
