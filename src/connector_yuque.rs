//! Yuque (doc-platform) connector.
//!
//! Lists one repository (`group/book`) through the v2 API and fetches every
//! document body as Markdown:
//!
//! ```text
//! GET {base_url}/repos/{group}/{book}/docs            → metadata list
//! GET {base_url}/repos/{group}/{book}/docs/{slug}?raw=true → body (10 in flight)
//! ```
//!
//! A failing listing fails the source. A failing body fetch drops only that
//! document. Output follows the listing order.

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde_json::Value;
use tracing::{info, warn};

use crate::config::YuqueConnectorConfig;
use crate::error::FetchError;
use crate::models::Article;
use crate::normalize::PLATFORM_YUQUE;
use crate::traits::Connector;

const MAX_BODY_FETCHES: usize = 10;

pub struct YuqueConnector {
    name: String,
    config: YuqueConnectorConfig,
    client: reqwest::Client,
}

impl YuqueConnector {
    pub fn new(name: String, config: YuqueConnectorConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            name,
            config,
            client,
        }
    }

    pub fn token_env(&self) -> &str {
        &self.config.token_env
    }

    fn repo_url(&self) -> String {
        format!(
            "{}/repos/{}/{}/docs",
            self.config.base_url.trim_end_matches('/'),
            self.config.group,
            self.config.book
        )
    }

    async fn get_data(&self, url: &str, token: &str) -> Result<Value, FetchError> {
        let resp = self
            .client
            .get(url)
            .header("X-Auth-Token", token)
            .header("Content-Type", "application/json")
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        let mut json: Value = resp.json().await?;
        Ok(json.get_mut("data").map(Value::take).unwrap_or(Value::Null))
    }

    async fn fetch_body(&self, meta: &Value, token: &str) -> Option<Article> {
        let doc_ref = doc_reference(meta)?;
        let url = format!("{}/{}?raw=true", self.repo_url(), doc_ref);
        match self.get_data(&url, token).await {
            Ok(Value::Null) => None,
            Ok(detail) => Some(map_doc(&detail, &self.config, &self.source_label())),
            Err(e) => {
                warn!(source = %self.source_label(), doc = %doc_ref, error = %e, "document body fetch failed");
                None
            }
        }
    }
}

#[async_trait]
impl Connector for YuqueConnector {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Markdown documents from a Yuque repository"
    }

    fn connector_type(&self) -> &str {
        "yuque"
    }

    async fn list_documents(&self) -> Result<Vec<Article>, FetchError> {
        let token = std::env::var(&self.config.token_env)
            .ok()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                FetchError::Config(format!("{} environment variable not set", self.config.token_env))
            })?;

        let listing = self.get_data(&self.repo_url(), &token).await?;
        let metas = match listing {
            Value::Array(items) => items,
            Value::Null => Vec::new(),
            other => {
                return Err(FetchError::Malformed {
                    url: self.repo_url(),
                    reason: format!("expected a document list, got {}", type_name(&other)),
                })
            }
        };

        let listed = metas.len();
        let token = token.as_str();
        let articles: Vec<Article> = stream::iter(metas)
            .map(move |meta| async move { self.fetch_body(&meta, token).await })
            .buffered(MAX_BODY_FETCHES)
            .filter_map(|doc| async move { doc })
            .collect()
            .await;

        info!(source = %self.source_label(), listed, fetched = articles.len(), "yuque repository read");
        Ok(articles)
    }
}

/// Slug, or the numeric id when the slug is missing.
fn doc_reference(meta: &Value) -> Option<String> {
    match meta.get("slug") {
        Some(Value::String(slug)) if !slug.is_empty() => Some(slug.clone()),
        _ => match meta.get("id") {
            Some(Value::Number(id)) => Some(id.to_string()),
            Some(Value::String(id)) if !id.is_empty() => Some(id.clone()),
            _ => None,
        },
    }
}

/// Map a document detail payload to an article.
///
/// The slug is namespaced as `group/book/slug` so documents from different
/// repositories never share a key.
pub fn map_doc(detail: &Value, config: &YuqueConnectorConfig, source_label: &str) -> Article {
    let text = |field: &str| {
        detail
            .get(field)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    let doc_ref = doc_reference(detail);
    let content = text("body_markdown")
        .or_else(|| text("body"))
        .unwrap_or_default();

    Article {
        slug: doc_ref
            .as_ref()
            .map(|r| format!("{}/{}/{}", config.group, config.book, r)),
        url: text("url").or_else(|| {
            doc_ref.as_ref().map(|r| {
                format!("https://www.yuque.com/{}/{}/{}", config.group, config.book, r)
            })
        }),
        published_at: text("created_at"),
        updated_at: text("content_updated_at").or_else(|| text("updated_at")),
        author: detail
            .pointer("/creator/name")
            .or_else(|| detail.pointer("/user/name"))
            .and_then(Value::as_str)
            .map(str::to_string),
        content_format: Some("markdown".to_string()),
        platform: Some(PLATFORM_YUQUE.to_string()),
        ..Article::new(source_label, text("title").unwrap_or_default(), content)
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
