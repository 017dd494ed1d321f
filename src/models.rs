//! Core data models used throughout the pipeline.
//!
//! An [`Article`] is what a connector produces. A [`KnowledgeRecord`] is the
//! durable, possibly enriched form stored in the knowledge base, and a
//! [`FilteredArticle`] is the audit form of an article the duplicate filter
//! rejected. All three serialize to flat JSON objects so the stored files
//! stay readable by tools that know nothing about this crate.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::key::{derive_key, ArticleKey};

/// A document as produced by a connector, before enrichment.
///
/// Fields the pipeline does not interpret are kept in `extra` and written
/// back unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Article {
    #[serde(default, deserialize_with = "string_or_empty")]
    pub title: String,
    #[serde(default, deserialize_with = "string_or_empty")]
    pub content: String,
    #[serde(default, deserialize_with = "string_or_empty")]
    pub source: String,
    #[serde(
        default,
        deserialize_with = "lenient_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub author: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub platform: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub slug: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub id: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub link: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub url: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub published_time: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub published_at: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub updated_at: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub content_format: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Article {
    pub fn new(
        source: impl Into<String>,
        title: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            title: title.into(),
            content: content.into(),
            ..Default::default()
        }
    }

    /// The stable identity key of this article.
    pub fn key(&self) -> ArticleKey {
        derive_key(self)
    }

    /// Link used for display: `link`, falling back to `url`.
    pub fn display_link(&self) -> Option<&str> {
        non_empty(&self.link).or_else(|| non_empty(&self.url))
    }

    /// Change timestamp: `updated_at`, then `published_at`, then `published_time`.
    pub fn change_timestamp(&self) -> Option<&str> {
        non_empty(&self.updated_at)
            .or_else(|| non_empty(&self.published_at))
            .or_else(|| non_empty(&self.published_time))
    }

    /// Publication timestamp: `published_time`, then `published_at`, then `updated_at`.
    pub fn publication_timestamp(&self) -> Option<&str> {
        non_empty(&self.published_time)
            .or_else(|| non_empty(&self.published_at))
            .or_else(|| non_empty(&self.updated_at))
    }
}

/// Outcome recorded on a record after an enrichment attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnrichmentStatus {
    #[serde(rename = "ok")]
    Ok,
    #[serde(rename = "FAILED")]
    Failed,
}

/// One cross-disciplinary reading of an article.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Insight {
    #[serde(default, alias = "field")]
    pub domain: String,
    #[serde(default, alias = "insight")]
    pub analysis: String,
    #[serde(default)]
    pub connection: String,
}

/// Fields produced by an enricher, plus the attempt bookkeeping.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Enrichment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deep_summary: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub key_points: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub open_question: Option<String>,
    #[serde(
        rename = "cross_disciplinary_insights",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub insights: Vec<Insight>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llm_model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llm_status: Option<EnrichmentStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llm_error: Option<String>,
    /// Time of the last enrichment attempt (RFC 3339).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<String>,
}

impl Enrichment {
    /// Serialized key names, used to split a stored record into its parts.
    pub const FIELDS: &'static [&'static str] = &[
        "deep_summary",
        "key_points",
        "open_question",
        "cross_disciplinary_insights",
        "llm_model",
        "llm_status",
        "llm_error",
        "processed_at",
    ];

    pub fn is_empty(&self) -> bool {
        *self == Enrichment::default()
    }
}

/// A knowledge base entry: the article plus whatever enrichment it has.
///
/// Serializes flat (article fields, then enrichment fields). Deserialization
/// splits the object by [`Enrichment::FIELDS`] so enrichment keys never leak
/// into the article's passthrough map.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Map<String, Value>")]
pub struct KnowledgeRecord {
    #[serde(flatten)]
    pub article: Article,
    #[serde(flatten)]
    pub enrichment: Enrichment,
}

impl KnowledgeRecord {
    /// A record that has never been through an enricher.
    pub fn unenriched(article: Article) -> Self {
        Self {
            article,
            enrichment: Enrichment::default(),
        }
    }

    /// A record whose enrichment attempt failed; the article is kept as-is.
    pub fn failed(article: Article, error: impl Into<String>, processed_at: String) -> Self {
        Self {
            article,
            enrichment: Enrichment {
                llm_status: Some(EnrichmentStatus::Failed),
                llm_error: Some(error.into()),
                processed_at: Some(processed_at),
                ..Default::default()
            },
        }
    }

    pub fn key(&self) -> ArticleKey {
        derive_key(&self.article)
    }

    pub fn is_enriched(&self) -> bool {
        self.enrichment.llm_status == Some(EnrichmentStatus::Ok)
    }

    pub fn is_failed(&self) -> bool {
        self.enrichment.llm_status == Some(EnrichmentStatus::Failed)
    }
}

impl From<Article> for KnowledgeRecord {
    fn from(article: Article) -> Self {
        Self::unenriched(article)
    }
}

impl TryFrom<Map<String, Value>> for KnowledgeRecord {
    type Error = serde_json::Error;

    fn try_from(mut map: Map<String, Value>) -> Result<Self, Self::Error> {
        let mut enrichment = Map::new();
        for field in Enrichment::FIELDS {
            if let Some(value) = map.remove(*field) {
                enrichment.insert((*field).to_string(), value);
            }
        }
        Ok(Self {
            article: serde_json::from_value(Value::Object(map))?,
            enrichment: serde_json::from_value(Value::Object(enrichment))?,
        })
    }
}

/// Why the duplicate filter rejected an article.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DuplicateReason {
    EmptyContent,
    FingerprintError,
    NearDuplicate,
}

impl DuplicateReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DuplicateReason::EmptyContent => "empty-content",
            DuplicateReason::FingerprintError => "fingerprint-error",
            DuplicateReason::NearDuplicate => "near-duplicate",
        }
    }
}

/// The batch-canonical article a near-duplicate was matched against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalRef {
    pub key: String,
    pub title: String,
    pub source: String,
    pub distance: u32,
}

/// An article the duplicate filter rejected, kept whole for audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilteredArticle {
    #[serde(flatten)]
    pub article: Article,
    pub filter_reason: DuplicateReason,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duplicate_of: Option<CanonicalRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter_detail: Option<String>,
}

/// `Some(s)` when the option holds a non-empty string.
pub(crate) fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}

/// Accepts strings, numbers and booleans; `null` and a missing key become `None`.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Bool(b)) => Some(b.to_string()),
        Some(other) => Some(other.to_string()),
    })
}

fn string_or_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    lenient_string(deserializer).map(Option::unwrap_or_default)
}
