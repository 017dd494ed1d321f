//! Connector health overview for `fusion sources`.
//!
//! The checks are local and cheap: nothing is fetched. A feed is healthy
//! when it has a URL, a yuque repository when its token variable is set, and
//! a directory when its root exists.

use anyhow::Result;

use crate::config::Config;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceStatus {
    /// `"type:name"`, as used in logs and the fetch state.
    pub label: String,
    pub target: String,
    pub status: String,
    pub healthy: bool,
    pub tracks_cursor: bool,
}

pub fn check_sources(config: &Config) -> Vec<SourceStatus> {
    let mut statuses = Vec::new();

    for (name, feed) in &config.connectors.feed {
        let healthy = !feed.url.trim().is_empty();
        statuses.push(SourceStatus {
            label: format!("feed:{name}"),
            target: feed.url.clone(),
            status: if healthy { "OK" } else { "NO URL" }.to_string(),
            healthy,
            tracks_cursor: feed.track_cursor,
        });
    }

    for (name, yuque) in &config.connectors.yuque {
        let token_set = std::env::var(&yuque.token_env).is_ok_and(|t| !t.is_empty());
        statuses.push(SourceStatus {
            label: format!("yuque:{name}"),
            target: format!("{}/{}", yuque.group, yuque.book),
            status: if token_set {
                "OK".to_string()
            } else {
                format!("{} NOT SET", yuque.token_env)
            },
            healthy: token_set,
            tracks_cursor: false,
        });
    }

    for (name, fs) in &config.connectors.filesystem {
        let exists = fs.root.is_dir();
        statuses.push(SourceStatus {
            label: format!("filesystem:{name}"),
            target: fs.root.display().to_string(),
            status: if exists { "OK" } else { "ROOT MISSING" }.to_string(),
            healthy: exists,
            tracks_cursor: false,
        });
    }

    statuses
}

pub fn list_sources(config: &Config) -> Result<()> {
    let statuses = check_sources(config);
    if statuses.is_empty() {
        println!("No connectors configured.");
        return Ok(());
    }

    println!(
        "{:<28} {:<20} {:<8} {:<7} TARGET",
        "SOURCE", "STATUS", "HEALTHY", "CURSOR"
    );
    for s in &statuses {
        println!(
            "{:<28} {:<20} {:<8} {:<7} {}",
            s.label,
            s.status,
            s.healthy,
            if s.tracks_cursor { "yes" } else { "no" },
            s.target
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FeedConnectorConfig, FilesystemConnectorConfig, YuqueConnectorConfig};

    #[test]
    fn reports_each_connector_kind() {
        let tmp = tempfile::TempDir::new().unwrap();
        let mut config = Config::default();
        config.connectors.feed.insert(
            "jiqizhixin".into(),
            FeedConnectorConfig {
                url: "https://rss.example.com/1.xml".into(),
                platform: "wechat".into(),
                account: None,
                track_cursor: true,
                timeout_secs: 30,
            },
        );
        config.connectors.yuque.insert(
            "handbook".into(),
            YuqueConnectorConfig {
                group: "team".into(),
                book: "handbook".into(),
                base_url: "https://www.yuque.com/api/v2".into(),
                token_env: "INFO_FUSION_SOURCES_TEST_TOKEN_UNSET".into(),
                timeout_secs: 30,
            },
        );
        config.connectors.filesystem.insert(
            "notes".into(),
            FilesystemConnectorConfig {
                root: tmp.path().to_path_buf(),
                include_globs: vec!["**/*.md".into()],
                exclude_globs: vec![],
                follow_symlinks: false,
            },
        );

        let statuses = check_sources(&config);
        assert_eq!(statuses.len(), 3);
        assert!(statuses[0].healthy && statuses[0].tracks_cursor);
        assert_eq!(statuses[1].label, "yuque:handbook");
        assert!(!statuses[1].healthy);
        assert!(statuses[1].status.ends_with("NOT SET"));
        assert!(statuses[2].healthy);
    }
}
