//! Source connector trait and registry.
//!
//! Every source the pipeline reads from implements [`Connector`]. Built-in
//! connectors are created from the `[connectors.<type>.<name>]` tables by
//! [`ConnectorRegistry::from_config`]; custom Rust connectors can be added
//! with [`ConnectorRegistry::register`].
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │           ConnectorRegistry              │
//! │  ┌─────────┐ ┌─────────┐ ┌────────────┐  │
//! │  │ feed    │ │ yuque   │ │ filesystem │  │
//! │  │ (RSS)   │ │ (API)   │ │ custom ... │  │
//! │  └─────────┘ └─────────┘ └────────────┘  │
//! └──────────────┬───────────────────────────┘
//!                ▼
//!        run_pipeline() → fetch → filter → reconcile → enrich
//! ```
//!
//! # Usage
//!
//! ```rust
//! use info_fusion::traits::ConnectorRegistry;
//!
//! let mut connectors = ConnectorRegistry::new();
//! // connectors.register(Box::new(MyConnector::new()));
//! assert!(connectors.is_empty());
//! ```

use std::sync::Arc;

use async_trait::async_trait;

use crate::account_cache::AccountCache;
use crate::config::Config;
use crate::error::FetchError;
use crate::models::Article;

/// A source that lists articles for one run.
///
/// # Example
///
/// ```rust
/// use async_trait::async_trait;
/// use info_fusion::error::FetchError;
/// use info_fusion::models::Article;
/// use info_fusion::traits::Connector;
///
/// pub struct StaticConnector;
///
/// #[async_trait]
/// impl Connector for StaticConnector {
///     fn name(&self) -> &str { "static" }
///     fn description(&self) -> &str { "A fixed list of articles" }
///
///     async fn list_documents(&self) -> Result<Vec<Article>, FetchError> {
///         Ok(vec![Article::new("custom:static", "Hello", "First article")])
///     }
/// }
/// ```
#[async_trait]
pub trait Connector: Send + Sync {
    /// Instance name (e.g. `"jiqizhixin"`, `"handbook"`).
    fn name(&self) -> &str;

    /// One-line description, shown by `fusion sources`.
    fn description(&self) -> &str;

    /// Connector type identifier (e.g. `"feed"`, `"yuque"`). Custom
    /// connectors default to `"custom"`.
    fn connector_type(&self) -> &str {
        "custom"
    }

    /// `"{connector_type}:{name}"`; also the key of the fetch-state cursor.
    fn source_label(&self) -> String {
        format!("{}:{}", self.connector_type(), self.name())
    }

    /// Whether articles older than the stored cursor should be dropped.
    fn tracks_cursor(&self) -> bool {
        false
    }

    /// List this run's articles.
    ///
    /// An error drops this source for the run; the rest of the pipeline
    /// carries on and stored records from this source are kept.
    async fn list_documents(&self) -> Result<Vec<Article>, FetchError>;
}

/// Registry for connectors (built-in and custom).
pub struct ConnectorRegistry {
    connectors: Vec<Box<dyn Connector>>,
}

impl ConnectorRegistry {
    pub fn new() -> Self {
        Self {
            connectors: Vec::new(),
        }
    }

    /// Create a registry with every connector instance named in the config.
    ///
    /// Feed connectors share `accounts` for account-name lookups.
    pub fn from_config(config: &Config, accounts: Arc<AccountCache>) -> Self {
        use crate::connector_feed::FeedConnector;
        use crate::connector_fs::FilesystemConnector;
        use crate::connector_yuque::YuqueConnector;

        let mut registry = Self::new();

        for (name, cfg) in &config.connectors.feed {
            registry.register(Box::new(FeedConnector::new(
                name.clone(),
                cfg.clone(),
                Arc::clone(&accounts),
            )));
        }
        for (name, cfg) in &config.connectors.yuque {
            registry.register(Box::new(YuqueConnector::new(name.clone(), cfg.clone())));
        }
        for (name, cfg) in &config.connectors.filesystem {
            registry.register(Box::new(FilesystemConnector::new(
                name.clone(),
                cfg.clone(),
            )));
        }

        registry
    }

    pub fn register(&mut self, connector: Box<dyn Connector>) {
        self.connectors.push(connector);
    }

    pub fn connectors(&self) -> &[Box<dyn Connector>] {
        &self.connectors
    }

    /// Find a connector by its `"type:name"` label.
    pub fn find(&self, label: &str) -> Option<&dyn Connector> {
        self.connectors
            .iter()
            .find(|c| c.source_label() == label)
            .map(|c| c.as_ref())
    }

    pub fn is_empty(&self) -> bool {
        self.connectors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.connectors.len()
    }
}

impl Default for ConnectorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FilesystemConnectorConfig, YuqueConnectorConfig};

    struct Fixed;

    #[async_trait]
    impl Connector for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }
        fn description(&self) -> &str {
            "fixed"
        }
        async fn list_documents(&self) -> Result<Vec<Article>, FetchError> {
            Ok(vec![Article::new("custom:fixed", "t", "c")])
        }
    }

    #[test]
    fn default_label_and_cursor() {
        assert_eq!(Fixed.source_label(), "custom:fixed");
        assert!(!Fixed.tracks_cursor());
    }

    #[test]
    fn from_config_builds_every_instance() {
        let mut config = Config::default();
        config.connectors.yuque.insert(
            "handbook".into(),
            YuqueConnectorConfig {
                group: "team".into(),
                book: "handbook".into(),
                base_url: "http://localhost".into(),
                token_env: "YUQUE_TOKEN".into(),
                timeout_secs: 5,
            },
        );
        config.connectors.filesystem.insert(
            "notes".into(),
            FilesystemConnectorConfig {
                root: "/tmp".into(),
                include_globs: vec!["**/*.md".into()],
                exclude_globs: vec![],
                follow_symlinks: false,
            },
        );

        let mut registry = ConnectorRegistry::from_config(&config, Arc::new(AccountCache::new()));
        registry.register(Box::new(Fixed));
        assert_eq!(registry.len(), 3);
        assert!(registry.find("yuque:handbook").is_some());
        assert!(registry.find("filesystem:notes").is_some());
        assert!(registry.find("custom:fixed").is_some());
        assert!(registry.find("feed:missing").is_none());
    }
}
