use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub dedup: DedupConfig,
    #[serde(default)]
    pub enrichment: EnrichmentConfig,
    #[serde(default)]
    pub connectors: ConnectorsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    #[serde(default = "default_knowledge_base")]
    pub knowledge_base: PathBuf,
    #[serde(default = "default_filtered")]
    pub filtered: PathBuf,
    #[serde(default = "default_fetch_state")]
    pub fetch_state: PathBuf,
    /// Resolved feed account names, kept until `run --refresh-accounts`.
    #[serde(default = "default_accounts")]
    pub accounts: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            knowledge_base: default_knowledge_base(),
            filtered: default_filtered(),
            fetch_state: default_fetch_state(),
            accounts: default_accounts(),
        }
    }
}

fn default_knowledge_base() -> PathBuf {
    PathBuf::from("./data/knowledge_base.json")
}
fn default_filtered() -> PathBuf {
    PathBuf::from("./data/filtered_articles.json")
}
fn default_fetch_state() -> PathBuf {
    PathBuf::from("./data/fetch_state.json")
}
fn default_accounts() -> PathBuf {
    PathBuf::from("./data/account_cache.json")
}

#[derive(Debug, Deserialize, Clone)]
pub struct DedupConfig {
    /// Maximum Hamming distance (of 128 bits) treated as a near-duplicate.
    #[serde(default = "default_threshold")]
    pub threshold: u32,
    #[serde(default)]
    pub extra_stop_words: Vec<String>,
    /// Terms the CJK segmenter must keep whole.
    #[serde(default)]
    pub extra_vocabulary: Vec<String>,
    /// Token -> canonical token; merged over the built-in table.
    #[serde(default)]
    pub synonyms: BTreeMap<String, String>,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            extra_stop_words: Vec::new(),
            extra_vocabulary: Vec::new(),
            synonyms: BTreeMap::new(),
        }
    }
}

fn default_threshold() -> u32 {
    15
}

#[derive(Debug, Deserialize, Clone)]
pub struct EnrichmentConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_max_content_chars")]
    pub max_content_chars: usize,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            base_url: default_base_url(),
            api_key_env: default_api_key_env(),
            concurrency: default_concurrency(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            max_content_chars: default_max_content_chars(),
        }
    }
}

impl EnrichmentConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_api_key_env() -> String {
    "AI_API_KEY".to_string()
}
fn default_concurrency() -> usize {
    5
}
fn default_timeout_secs() -> u64 {
    120
}
fn default_max_retries() -> u32 {
    3
}
fn default_max_content_chars() -> usize {
    8000
}

/// Named connector instances, grouped by type: `[connectors.<type>.<name>]`.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct ConnectorsConfig {
    #[serde(default)]
    pub feed: BTreeMap<String, FeedConnectorConfig>,
    #[serde(default)]
    pub yuque: BTreeMap<String, YuqueConnectorConfig>,
    #[serde(default)]
    pub filesystem: BTreeMap<String, FilesystemConnectorConfig>,
}

impl ConnectorsConfig {
    pub fn len(&self) -> usize {
        self.feed.len() + self.yuque.len() + self.filesystem.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct FeedConnectorConfig {
    pub url: String,
    #[serde(default = "default_feed_platform")]
    pub platform: String,
    /// Account display name; derived from the feed when absent.
    #[serde(default)]
    pub account: Option<String>,
    #[serde(default = "default_true")]
    pub track_cursor: bool,
    #[serde(default = "default_fetch_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_feed_platform() -> String {
    "wechat".to_string()
}
fn default_true() -> bool {
    true
}
fn default_fetch_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct YuqueConnectorConfig {
    pub group: String,
    pub book: String,
    #[serde(default = "default_yuque_base_url")]
    pub base_url: String,
    #[serde(default = "default_yuque_token_env")]
    pub token_env: String,
    #[serde(default = "default_fetch_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_yuque_base_url() -> String {
    "https://www.yuque.com/api/v2".to_string()
}
fn default_yuque_token_env() -> String {
    "YUQUE_TOKEN".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct FilesystemConnectorConfig {
    pub root: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
}

fn default_include_globs() -> Vec<String> {
    vec!["**/*.md".to_string(), "**/*.txt".to_string()]
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    if config.dedup.threshold > 128 {
        bail!("dedup.threshold must be <= 128 (fingerprints are 128 bits)");
    }

    let enrichment = &config.enrichment;
    if enrichment.concurrency == 0 {
        bail!("enrichment.concurrency must be >= 1");
    }
    if enrichment.timeout_secs == 0 {
        bail!("enrichment.timeout_secs must be > 0");
    }
    match enrichment.provider.as_str() {
        "disabled" => {}
        "openai" => {
            if enrichment.model.as_deref().unwrap_or_default().is_empty() {
                bail!("enrichment.model must be specified when provider is 'openai'");
            }
        }
        other => bail!(
            "Unknown enrichment provider: '{}'. Must be disabled or openai.",
            other
        ),
    }

    for (name, feed) in &config.connectors.feed {
        if feed.url.trim().is_empty() {
            bail!("connectors.feed.{name}.url must not be empty");
        }
    }
    for (name, yuque) in &config.connectors.yuque {
        if yuque.group.trim().is_empty() || yuque.book.trim().is_empty() {
            bail!("connectors.yuque.{name}: group and book must not be empty");
        }
    }

    Ok(())
}
