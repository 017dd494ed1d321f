//! JSON persistence for the knowledge base, the filtered audit, the
//! fetch-state cursors and the account-name cache.
//!
//! All four files are read wholesale at run start and rewritten wholesale
//! at run end. Writes go to a sibling `*.tmp` file which is then renamed over
//! the target, so a crashed run never leaves a half-written knowledge base.
//!
//! Reads are lenient: a missing file is empty, and a file that is not a JSON
//! array is logged and treated as empty so a corrupted store can be rebuilt
//! by the next run. Only I/O errors on read and any error on write are
//! returned.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::StoreConfig;
use crate::cursor::FetchState;
use crate::error::PersistenceError;
use crate::models::{FilteredArticle, KnowledgeRecord};

/// File locations of one knowledge base.
#[derive(Debug, Clone)]
pub struct KnowledgeStore {
    knowledge_base: PathBuf,
    filtered: PathBuf,
    fetch_state: PathBuf,
    accounts: PathBuf,
}

impl KnowledgeStore {
    pub fn new(config: &StoreConfig) -> Self {
        Self {
            knowledge_base: config.knowledge_base.clone(),
            filtered: config.filtered.clone(),
            fetch_state: config.fetch_state.clone(),
            accounts: config.accounts.clone(),
        }
    }

    pub fn knowledge_base_path(&self) -> &Path {
        &self.knowledge_base
    }

    pub fn filtered_path(&self) -> &Path {
        &self.filtered
    }

    pub fn fetch_state_path(&self) -> &Path {
        &self.fetch_state
    }

    pub fn accounts_path(&self) -> &Path {
        &self.accounts
    }

    /// Load every stored record. Elements that are not objects are skipped.
    pub fn load_records(&self) -> Result<Vec<KnowledgeRecord>, PersistenceError> {
        let Some(items) = read_array(&self.knowledge_base)? else {
            return Ok(Vec::new());
        };

        let total = items.len();
        let records: Vec<KnowledgeRecord> = items
            .into_iter()
            .enumerate()
            .filter_map(|(index, item)| match item {
                Value::Object(map) => match KnowledgeRecord::try_from(map) {
                    Ok(record) => Some(record),
                    Err(e) => {
                        warn!(path = %self.knowledge_base.display(), index, error = %e, "skipping unreadable knowledge base entry");
                        None
                    }
                },
                other => {
                    warn!(path = %self.knowledge_base.display(), index, kind = %kind(&other), "skipping malformed knowledge base entry");
                    None
                }
            })
            .collect();

        debug!(path = %self.knowledge_base.display(), loaded = records.len(), total, "knowledge base loaded");
        Ok(records)
    }

    pub fn save_records(&self, records: &[KnowledgeRecord]) -> Result<(), PersistenceError> {
        write_json(&self.knowledge_base, records)
    }

    /// Load the filtered audit from the last run. Unparseable entries are
    /// skipped.
    pub fn load_filtered(&self) -> Result<Vec<FilteredArticle>, PersistenceError> {
        let Some(items) = read_array(&self.filtered)? else {
            return Ok(Vec::new());
        };
        Ok(items
            .into_iter()
            .filter_map(|item| serde_json::from_value(item).ok())
            .collect())
    }

    /// Rewrite the filtered audit, or remove it when nothing was filtered.
    pub fn save_filtered(&self, filtered: &[FilteredArticle]) -> Result<(), PersistenceError> {
        if !filtered.is_empty() {
            return write_json(&self.filtered, filtered);
        }
        match std::fs::remove_file(&self.filtered) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(PersistenceError::Write {
                path: self.filtered.clone(),
                source,
            }),
        }
    }

    pub fn load_fetch_state(&self) -> Result<FetchState, PersistenceError> {
        let Some(text) = read_text(&self.fetch_state)? else {
            return Ok(FetchState::default());
        };
        Ok(serde_json::from_str(&text).unwrap_or_else(|e| {
            warn!(path = %self.fetch_state.display(), error = %e, "fetch state unreadable, starting without cursors");
            FetchState::default()
        }))
    }

    pub fn save_fetch_state(&self, state: &FetchState) -> Result<(), PersistenceError> {
        write_json(&self.fetch_state, state)
    }

    /// Link to account name. An unreadable file loads as empty.
    pub fn load_accounts(&self) -> Result<BTreeMap<String, String>, PersistenceError> {
        let Some(text) = read_text(&self.accounts)? else {
            return Ok(BTreeMap::new());
        };
        Ok(serde_json::from_str(&text).unwrap_or_else(|e| {
            warn!(path = %self.accounts.display(), error = %e, "account cache unreadable, starting empty");
            BTreeMap::new()
        }))
    }

    pub fn save_accounts(&self, accounts: &BTreeMap<String, String>) -> Result<(), PersistenceError> {
        write_json(&self.accounts, accounts)
    }
}

fn read_text(path: &Path) -> Result<Option<String>, PersistenceError> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(Some(String::from_utf8_lossy(&bytes).into_owned())),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(source) => Err(PersistenceError::Read {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// The file's top-level array, or `None` when the file is missing, blank or
/// not an array.
fn read_array(path: &Path) -> Result<Option<Vec<Value>>, PersistenceError> {
    let Some(text) = read_text(path)? else {
        return Ok(None);
    };
    if text.trim().is_empty() {
        return Ok(None);
    }
    match serde_json::from_str::<Value>(&text) {
        Ok(Value::Array(items)) => Ok(Some(items)),
        Ok(other) => {
            warn!(path = %path.display(), kind = %kind(&other), "store is not a JSON array, treating as empty");
            Ok(None)
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "store is not valid JSON, treating as empty");
            Ok(None)
        }
    }
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), PersistenceError> {
    let write_err = |source| PersistenceError::Write {
        path: path.to_path_buf(),
        source,
    };

    let mut json = serde_json::to_string_pretty(value).map_err(|source| PersistenceError::Encode {
        path: path.to_path_buf(),
        source,
    })?;
    json.push('\n');

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(write_err)?;
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    std::fs::write(&tmp, json).map_err(write_err)?;
    std::fs::rename(&tmp, path).map_err(|source| {
        let _ = std::fs::remove_file(&tmp);
        write_err(source)
    })
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Article, DuplicateReason};
    use tempfile::TempDir;

    fn store(dir: &Path) -> KnowledgeStore {
        KnowledgeStore::new(&StoreConfig {
            knowledge_base: dir.join("data/kb.json"),
            filtered: dir.join("data/filtered.json"),
            fetch_state: dir.join("data/state.json"),
            accounts: dir.join("data/accounts.json"),
        })
    }

    #[test]
    fn missing_files_load_empty() {
        let tmp = TempDir::new().unwrap();
        let store = store(tmp.path());
        assert!(store.load_records().unwrap().is_empty());
        assert!(store.load_filtered().unwrap().is_empty());
        assert_eq!(store.load_fetch_state().unwrap(), FetchState::default());
        assert!(store.load_accounts().unwrap().is_empty());
    }

    #[test]
    fn records_survive_a_save_and_load() {
        let tmp = TempDir::new().unwrap();
        let store = store(tmp.path());
        let mut article = Article::new("feed:a", "Title", "Body");
        article
            .extra
            .insert("read_count".into(), Value::from(42));
        let records = vec![KnowledgeRecord::unenriched(article)];

        store.save_records(&records).unwrap();
        let loaded = store.load_records().unwrap();
        assert_eq!(loaded, records);
        assert!(!tmp.path().join("data/kb.json.tmp").exists());
    }

    #[test]
    fn malformed_store_is_treated_as_empty() {
        let tmp = TempDir::new().unwrap();
        let store = store(tmp.path());
        std::fs::create_dir_all(tmp.path().join("data")).unwrap();

        std::fs::write(store.knowledge_base_path(), "{ not json").unwrap();
        assert!(store.load_records().unwrap().is_empty());

        std::fs::write(store.knowledge_base_path(), r#"{"title": "object"}"#).unwrap();
        assert!(store.load_records().unwrap().is_empty());

        std::fs::write(
            store.knowledge_base_path(),
            r#"[{"title": "kept", "content": "c", "source": "s"}, 7, "text"]"#,
        )
        .unwrap();
        let loaded = store.load_records().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].article.title, "kept");
    }

    #[test]
    fn empty_filtered_audit_removes_the_file() {
        let tmp = TempDir::new().unwrap();
        let store = store(tmp.path());
        let filtered = vec![FilteredArticle {
            article: Article::new("feed:a", "Empty", ""),
            filter_reason: DuplicateReason::EmptyContent,
            duplicate_of: None,
            filter_detail: None,
        }];

        store.save_filtered(&filtered).unwrap();
        assert!(store.filtered_path().exists());
        assert_eq!(store.load_filtered().unwrap().len(), 1);

        store.save_filtered(&[]).unwrap();
        assert!(!store.filtered_path().exists());
        store.save_filtered(&[]).unwrap();
    }

    #[test]
    fn fetch_state_round_trips() {
        let tmp = TempDir::new().unwrap();
        let store = store(tmp.path());
        let mut state = FetchState::default();
        let seen = chrono::NaiveDate::from_ymd_opt(2025, 3, 1)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap();
        state.advance("feed:a", seen);
        store.save_fetch_state(&state).unwrap();
        assert_eq!(store.load_fetch_state().unwrap(), state);
    }

    #[test]
    fn accounts_round_trip_and_tolerate_garbage() {
        let tmp = TempDir::new().unwrap();
        let store = store(tmp.path());
        let mut accounts = BTreeMap::new();
        accounts.insert("https://mp.weixin.qq.com/s/a".to_string(), "机器之心".to_string());
        store.save_accounts(&accounts).unwrap();
        assert_eq!(store.load_accounts().unwrap(), accounts);

        std::fs::write(store.accounts_path(), "[1, 2]").unwrap();
        assert!(store.load_accounts().unwrap().is_empty());
    }
}
