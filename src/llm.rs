//! Concrete enrichers backed by an OpenAI-compatible chat completions API.
//!
//! - **[`DisabledEnricher`]**: reports itself disabled; the pipeline stores
//!   articles unenriched and never calls it.
//! - **[`OpenAiEnricher`]**: one `POST {base_url}/chat/completions` per
//!   article, JSON-object response format, content truncated to
//!   `max_content_chars` characters.
//!
//! # Retry Strategy
//!
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)
//!
//! Any base URL that speaks the OpenAI wire format works (DashScope,
//! DeepSeek, a local vLLM server and so on).

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::config::EnrichmentConfig;
use crate::enrich::Enricher;
use crate::error::EnrichmentError;
use crate::models::{Article, Enrichment, Insight};

const SYSTEM_PROMPT: &str = "You are a rigorous cross-disciplinary analyst with a background in \
computer science, artificial intelligence, philosophy, sociology, literature, linguistics and \
neuroscience. Reply with a single JSON object and nothing else. Write in the language of the \
article.";

const RESPONSE_SHAPE: &str = r#"{
  "deep_summary": "about 200 words: the article's core idea, main arguments and conclusion",
  "key_points": ["3 to 5 short takeaways"],
  "cross_disciplinary_insights": [
    {
      "domain": "the most relevant field",
      "analysis": "a reading of the article from that field",
      "connection": "a concrete concept from that field the article connects to"
    }
  ],
  "open_question": "one open question worth further study"
}"#;

pub struct DisabledEnricher;

#[async_trait]
impl Enricher for DisabledEnricher {
    fn name(&self) -> &str {
        "disabled"
    }

    fn is_enabled(&self) -> bool {
        false
    }

    async fn process(&self, _article: &Article) -> Result<Enrichment, EnrichmentError> {
        Err(EnrichmentError::NotConfigured(
            "enrichment provider is disabled".to_string(),
        ))
    }
}

pub struct OpenAiEnricher {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    max_retries: u32,
    max_content_chars: usize,
}

impl OpenAiEnricher {
    /// # Errors
    ///
    /// Fails if `model` is unset or the API key variable is missing.
    pub fn new(config: &EnrichmentConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("enrichment.model required for OpenAI provider"))?;

        let api_key = match std::env::var(&config.api_key_env) {
            Ok(key) if !key.is_empty() => key,
            _ => bail!("{} environment variable not set", config.api_key_env),
        };

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key,
            model,
            max_retries: config.max_retries,
            max_content_chars: config.max_content_chars,
        })
    }

    fn request_body(&self, article: &Article) -> Value {
        let content: String = article.content.chars().take(self.max_content_chars).collect();
        let prompt = format!(
            "Title: {}\nContent:\n---\n{}\n---\n\nAnswer strictly in this JSON shape:\n{}",
            article.title, content, RESPONSE_SHAPE
        );
        serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": prompt },
            ],
            "stream": false,
            "response_format": { "type": "json_object" },
        })
    }
}

#[async_trait]
impl Enricher for OpenAiEnricher {
    fn name(&self) -> &str {
        &self.model
    }

    async fn process(&self, article: &Article) -> Result<Enrichment, EnrichmentError> {
        let body = self.request_body(article);
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                debug!(title = %article.title, attempt, ?delay, "retrying enrichment");
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post(&self.endpoint)
                .bearer_auth(&self.api_key)
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: Value = response.json().await?;
                        let mut enrichment = parse_completion(&json)?;
                        enrichment.llm_model = Some(self.model.clone());
                        return Ok(enrichment);
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    let err = EnrichmentError::Api {
                        status: status.as_u16(),
                        body: body_text,
                    };
                    if status.as_u16() == 429 || status.is_server_error() {
                        last_err = Some(err);
                        continue;
                    }
                    return Err(err);
                }
                Err(e) => {
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| {
            EnrichmentError::MalformedResponse("enrichment failed after retries".to_string())
        }))
    }
}

/// Extract the enrichment fields from a chat completion response.
pub fn parse_completion(json: &Value) -> Result<Enrichment, EnrichmentError> {
    let content = json
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            EnrichmentError::MalformedResponse("missing choices[0].message.content".to_string())
        })?;

    let payload: Value = serde_json::from_str(strip_code_fence(content))
        .map_err(|e| EnrichmentError::MalformedResponse(format!("content is not JSON: {e}")))?;
    if !payload.is_object() {
        return Err(EnrichmentError::MalformedResponse(
            "content is not a JSON object".to_string(),
        ));
    }

    let text = |field: &str| {
        payload
            .get(field)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    let key_points = payload
        .get("key_points")
        .or_else(|| payload.get("key_terms"))
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let insights = payload
        .get("cross_disciplinary_insights")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| serde_json::from_value::<Insight>(item.clone()).ok())
                .collect()
        })
        .unwrap_or_default();

    let enrichment = Enrichment {
        deep_summary: text("deep_summary"),
        key_points,
        open_question: text("open_question"),
        insights,
        ..Default::default()
    };

    if enrichment.deep_summary.is_none() {
        return Err(EnrichmentError::MalformedResponse(
            "response has no deep_summary".to_string(),
        ));
    }
    Ok(enrichment)
}

fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .map(str::trim)
        .unwrap_or(trimmed)
}

/// Create the enricher named by `enrichment.provider`.
///
/// | Config Value | Enricher |
/// |-------------|----------|
/// | `"disabled"` | [`DisabledEnricher`] |
/// | `"openai"` | [`OpenAiEnricher`] |
pub fn create_enricher(config: &EnrichmentConfig) -> Result<Arc<dyn Enricher>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledEnricher)),
        "openai" => Ok(Arc::new(OpenAiEnricher::new(config)?)),
        other => bail!("Unknown enrichment provider: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn completion(content: &str) -> Value {
        json!({ "choices": [ { "message": { "role": "assistant", "content": content } } ] })
    }

    #[test]
    fn parses_full_response() {
        let content = json!({
            "deep_summary": "  The article argues X.  ",
            "key_points": ["one", "two"],
            "cross_disciplinary_insights": [
                { "domain": "philosophy", "analysis": "a", "connection": "b" },
                { "field": "sociology", "insight": "c", "connection": "d" }
            ],
            "open_question": "Why?"
        })
        .to_string();
        let enrichment = parse_completion(&completion(&content)).unwrap();
        assert_eq!(enrichment.deep_summary.as_deref(), Some("The article argues X."));
        assert_eq!(enrichment.key_points, vec!["one", "two"]);
        assert_eq!(enrichment.insights.len(), 2);
        assert_eq!(enrichment.insights[1].domain, "sociology");
        assert_eq!(enrichment.open_question.as_deref(), Some("Why?"));
    }

    #[test]
    fn accepts_fenced_json() {
        let content = "```json\n{\"deep_summary\": \"ok\"}\n```";
        let enrichment = parse_completion(&completion(content)).unwrap();
        assert_eq!(enrichment.deep_summary.as_deref(), Some("ok"));
    }

    #[test]
    fn rejects_malformed_responses() {
        assert!(parse_completion(&json!({ "choices": [] })).is_err());
        assert!(parse_completion(&completion("not json")).is_err());
        assert!(parse_completion(&completion("[1, 2]")).is_err());
        assert!(parse_completion(&completion("{\"key_points\": []}")).is_err());
    }

    #[test]
    fn disabled_provider_is_not_enabled() {
        let enricher = create_enricher(&EnrichmentConfig::default()).unwrap();
        assert!(!enricher.is_enabled());
        assert_eq!(enricher.name(), "disabled");
    }

    #[test]
    fn openai_requires_api_key() {
        let config = EnrichmentConfig {
            provider: "openai".into(),
            model: Some("qwen-plus".into()),
            api_key_env: "INFO_FUSION_TEST_KEY_THAT_IS_NEVER_SET".into(),
            ..Default::default()
        };
        let err = create_enricher(&config).err().unwrap();
        assert!(err.to_string().contains("INFO_FUSION_TEST_KEY_THAT_IS_NEVER_SET"));
    }

    #[test]
    fn request_truncates_content() {
        let enricher = OpenAiEnricher {
            client: reqwest::Client::new(),
            endpoint: "http://localhost/chat/completions".into(),
            api_key: "k".into(),
            model: "m".into(),
            max_retries: 0,
            max_content_chars: 3,
        };
        let body = enricher.request_body(&Article::new("s", "T", "abcdef"));
        let prompt = body["messages"][1]["content"].as_str().unwrap();
        assert!(prompt.contains("---\nabc\n---"));
        assert_eq!(body["response_format"]["type"], "json_object");
    }
}
