//! RSS/Atom feed connector.
//!
//! Built for official-account mirrors that republish WeChat articles as a
//! feed, but any RSS 2.0, Atom or JSON Feed works. Each entry becomes one
//! article; the feed's platform defaults to `wechat`, which puts its
//! articles in the timestamp-unreliable class and turns on the
//! publication-time cursor.
//!
//! The publishing account of an entry is resolved in this order:
//! the shared [`AccountCache`], the configured `account`, the entry's first
//! category, the entry's first author, and finally the feed title.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::SecondsFormat;
use feed_rs::model::{Entry, Feed};
use tracing::info;

use crate::account_cache::AccountCache;
use crate::config::FeedConnectorConfig;
use crate::error::FetchError;
use crate::models::Article;
use crate::traits::Connector;

pub struct FeedConnector {
    name: String,
    config: FeedConnectorConfig,
    accounts: Arc<AccountCache>,
    client: reqwest::Client,
}

impl FeedConnector {
    pub fn new(name: String, config: FeedConnectorConfig, accounts: Arc<AccountCache>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("info-fusion/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();
        Self {
            name,
            config,
            accounts,
            client,
        }
    }

    pub fn url(&self) -> &str {
        &self.config.url
    }
}

#[async_trait]
impl Connector for FeedConnector {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Articles from an RSS/Atom feed"
    }

    fn connector_type(&self) -> &str {
        "feed"
    }

    fn tracks_cursor(&self) -> bool {
        self.config.track_cursor
    }

    async fn list_documents(&self) -> Result<Vec<Article>, FetchError> {
        let url = &self.config.url;
        let resp = self.client.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.clone(),
                status: status.as_u16(),
            });
        }

        let bytes = resp.bytes().await?;
        let feed = feed_rs::parser::parse(&bytes[..]).map_err(|e| FetchError::Malformed {
            url: url.clone(),
            reason: e.to_string(),
        })?;

        let articles = map_feed(feed, &self.config, &self.accounts);
        info!(source = %self.source_label(), items = articles.len(), "feed parsed");
        Ok(articles)
    }
}

/// Convert parsed feed entries into articles, in feed order.
pub fn map_feed(feed: Feed, config: &FeedConnectorConfig, accounts: &AccountCache) -> Vec<Article> {
    let feed_title = feed
        .title
        .map(|t| t.content.trim().to_string())
        .filter(|t| !t.is_empty());

    feed.entries
        .into_iter()
        .map(|entry| map_entry(entry, feed_title.as_deref(), config, accounts))
        .collect()
}

fn map_entry(
    entry: Entry,
    feed_title: Option<&str>,
    config: &FeedConnectorConfig,
    accounts: &AccountCache,
) -> Article {
    let link = entry
        .links
        .first()
        .map(|l| l.href.trim().to_string())
        .or_else(|| entry.id.starts_with("http").then(|| entry.id.clone()));

    let author = entry
        .authors
        .first()
        .map(|p| p.name.trim().to_string())
        .filter(|n| !n.is_empty());

    let cached = link.as_deref().and_then(|l| accounts.get(l));
    let account = cached.or_else(|| {
        let derived = non_blank(config.account.as_deref())
            .or_else(|| {
                entry
                    .categories
                    .first()
                    .and_then(|c| non_blank(c.label.as_deref()).or(non_blank(Some(c.term.as_str()))))
            })
            .or(author.as_deref())
            .or(feed_title)
            .map(str::to_string);
        if let (Some(link), Some(account)) = (link.as_deref(), derived.as_deref()) {
            accounts.insert(link, account);
        }
        derived
    });

    let published_time = entry
        .published
        .or(entry.updated)
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Secs, true));

    let (content, content_format) = match (entry.content.and_then(|c| c.body), entry.summary) {
        (Some(body), _) => (body, "html"),
        (None, Some(summary)) => (summary.content, "text"),
        (None, None) => (String::new(), "text"),
    };

    let title = entry
        .title
        .map(|t| t.content.trim().to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| "Untitled".to_string());

    Article {
        link,
        author,
        published_time,
        platform: Some(config.platform.clone()),
        content_format: Some(content_format.to_string()),
        ..Article::new(account.unwrap_or_default(), title, content)
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    const RSS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>机器之心 RSS</title>
    <link>https://example.com</link>
    <description>mirror</description>
    <item>
      <title>大模型的下一步</title>
      <link>https://mp.weixin.qq.com/s/first</link>
      <category>机器之心</category>
      <author>张三</author>
      <pubDate>Sat, 01 Mar 2025 08:00:00 +0000</pubDate>
      <description>正文第一段</description>
    </item>
    <item>
      <title>  </title>
      <link>https://mp.weixin.qq.com/s/second</link>
      <pubDate>Sun, 02 Mar 2025 08:00:00 +0000</pubDate>
      <description>第二篇</description>
    </item>
  </channel>
</rss>"#;

    fn config(account: Option<&str>) -> FeedConnectorConfig {
        FeedConnectorConfig {
            url: "https://example.com/feed.xml".into(),
            platform: "wechat".into(),
            account: account.map(str::to_string),
            track_cursor: true,
            timeout_secs: 5,
        }
    }

    fn parse() -> Feed {
        feed_rs::parser::parse(RSS.as_bytes()).unwrap()
    }

    #[test]
    fn maps_entries_in_feed_order() {
        let cache = AccountCache::new();
        let articles = map_feed(parse(), &config(None), &cache);
        assert_eq!(articles.len(), 2);

        let first = &articles[0];
        assert_eq!(first.title, "大模型的下一步");
        assert_eq!(first.link.as_deref(), Some("https://mp.weixin.qq.com/s/first"));
        assert_eq!(first.source, "机器之心");
        assert_eq!(first.content, "正文第一段");
        assert_eq!(first.platform.as_deref(), Some("wechat"));
        assert_eq!(first.published_time.as_deref(), Some("2025-03-01T08:00:00Z"));

        let second = &articles[1];
        assert_eq!(second.title, "Untitled");
        assert_eq!(second.source, "机器之心 RSS");
    }

    #[test]
    fn configured_account_wins_and_is_cached() {
        let cache = AccountCache::new();
        let articles = map_feed(parse(), &config(Some("量子位")), &cache);
        assert!(articles.iter().all(|a| a.source == "量子位"));
        assert_eq!(
            cache.get("https://mp.weixin.qq.com/s/first").as_deref(),
            Some("量子位")
        );
    }

    #[test]
    fn cache_is_consulted_first_until_cleared() {
        let cache = AccountCache::new();
        cache.insert("https://mp.weixin.qq.com/s/first", "旧名字");
        let articles = map_feed(parse(), &config(Some("新名字")), &cache);
        assert_eq!(articles[0].source, "旧名字");
        assert_eq!(articles[1].source, "新名字");

        cache.clear();
        let articles = map_feed(parse(), &config(Some("新名字")), &cache);
        assert_eq!(articles[0].source, "新名字");
    }
}
