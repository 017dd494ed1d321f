//! Aggregation-time normalization of fetched articles.
//!
//! Connectors report platforms and authors inconsistently. Before the
//! duplicate filter sees a batch, every article is brought to one shape:
//! trimmed `source`/`author`, a canonical `platform`, and an author label
//! that names the publishing account for WeChat-style articles.
//!
//! [`normalize_article`] is idempotent.

use crate::models::Article;

/// Canonical platform for official-account feeds (timestamp-unreliable).
pub const PLATFORM_WECHAT: &str = "wechat";
/// Canonical platform for the doc-platform connector.
pub const PLATFORM_YUQUE: &str = "yuque";
/// Author label when neither an author nor an account is known.
pub const UNATTRIBUTED: &str = "unattributed";

const WECHAT_ALIASES: &[&str] = &[
    "wechat",
    "微信公众号",
    "weixin",
    "wx",
    "mp",
    "公众号",
    "official account",
];
const YUQUE_ALIASES: &[&str] = &["yuque", "语雀"];

/// Map a free-form platform label to its canonical form.
pub fn canonical_platform(raw: &str) -> String {
    let trimmed = raw.trim();
    let lowered = trimmed.to_lowercase();
    if WECHAT_ALIASES.contains(&lowered.as_str()) {
        PLATFORM_WECHAT.to_string()
    } else if YUQUE_ALIASES.contains(&lowered.as_str()) {
        PLATFORM_YUQUE.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Whether the article belongs to the timestamp-unreliable class.
///
/// Checks both `platform` and `source`, so records stored before
/// normalization existed are still recognized.
pub fn is_wechat(article: &Article) -> bool {
    let is_alias = |value: &str| WECHAT_ALIASES.contains(&value.trim().to_lowercase().as_str());
    article.platform.as_deref().is_some_and(is_alias) || is_alias(&article.source)
}

/// Guess a platform when the connector did not report one.
fn infer_platform(article: &Article) -> Option<String> {
    let source = article.source.to_lowercase();
    let link = article.display_link().unwrap_or_default();

    if source.contains("yuque") || source == "语雀" {
        Some(PLATFORM_YUQUE.to_string())
    } else if link.contains("mp.weixin.qq.com")
        || source.contains("wechat")
        || source.contains("微信公众号")
    {
        Some(PLATFORM_WECHAT.to_string())
    } else {
        None
    }
}

/// Normalize one article in place.
pub fn normalize_article(article: &mut Article) {
    article.source = article.source.trim().to_string();
    if let Some(author) = article.author.as_mut() {
        *author = author.trim().to_string();
    }

    let platform = article
        .platform
        .as_deref()
        .filter(|p| !p.trim().is_empty())
        .map(canonical_platform)
        .or_else(|| infer_platform(&*article));
    if platform.is_some() {
        article.platform = platform;
    }

    if article.platform.as_deref() == Some(PLATFORM_WECHAT) {
        let account = article.source.as_str();
        let author = article.author.as_deref().unwrap_or_default();
        let label = match (author.is_empty(), account.is_empty()) {
            (false, false) if author.contains(account) => author.to_string(),
            (false, false) => format!("{author} · {account}"),
            (true, false) => account.to_string(),
            (false, true) => author.to_string(),
            (true, true) => UNATTRIBUTED.to_string(),
        };
        article.author = Some(label);
    } else if article.author.as_deref().unwrap_or_default().is_empty()
        && !article.source.is_empty()
    {
        article.author = Some(article.source.clone());
    }
}

/// Normalize a whole batch.
pub fn normalize_batch(articles: &mut [Article]) {
    for article in articles.iter_mut() {
        normalize_article(article);
    }
}
