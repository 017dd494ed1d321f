use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use serde_json::Value;
use tempfile::TempDir;

fn fusion_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("fusion");
    path
}

const ALPHA: &str = "# Alpha Document\n\nThis is the alpha document about Rust programming.\n\nIt covers cargo, crates, ownership, borrowing and lifetimes in depth.";

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let files_dir = root.join("files");
    fs::create_dir_all(&files_dir).unwrap();
    fs::write(files_dir.join("alpha.md"), ALPHA).unwrap();
    fs::write(files_dir.join("alpha_copy.md"), ALPHA).unwrap();
    fs::write(
        files_dir.join("beta.md"),
        "# Beta Document\n\nThis document discusses Python and machine learning.\n\nDeep learning frameworks like PyTorch and JAX are compared on GPUs.",
    )
    .unwrap();
    fs::write(
        files_dir.join("gamma.txt"),
        "Gamma plain text file.\n\nContains notes about deployment and infrastructure.\n\nKubernetes, Docker and Terraform are mentioned here.",
    )
    .unwrap();
    fs::write(files_dir.join("empty.md"), "").unwrap();

    let config_content = format!(
        r#"[store]
knowledge_base = "{root}/data/knowledge_base.json"
filtered = "{root}/data/filtered_articles.json"
fetch_state = "{root}/data/fetch_state.json"
accounts = "{root}/data/account_cache.json"

[dedup]
threshold = 15

[enrichment]
provider = "disabled"

[connectors.filesystem.docs]
root = "{root}/files"
include_globs = ["**/*.md", "**/*.txt"]
"#,
        root = root.display()
    );

    let config_path = config_dir.join("fusion.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_fusion(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = fusion_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env("RUST_LOG", "info_fusion=warn")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run fusion binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

fn data_file(tmp: &TempDir, name: &str) -> PathBuf {
    tmp.path().join("data").join(name)
}

fn read_array(path: &Path) -> Vec<Value> {
    let text = fs::read_to_string(path).unwrap();
    match serde_json::from_str::<Value>(&text).unwrap() {
        Value::Array(items) => items,
        other => panic!("expected array, got {}", other),
    }
}

#[test]
fn test_run_filters_and_stores() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_fusion(&config_path, &["run", "--progress", "off"]);
    assert!(success, "run failed: {}", stderr);
    assert!(stdout.contains("source filesystem:docs: 5 articles"), "{}", stdout);
    assert!(stdout.contains("unique: 3"), "{}", stdout);
    assert!(
        stdout.contains("filtered: 2 (empty 1, unreadable 0, near-duplicate 1)"),
        "{}",
        stdout
    );
    assert!(stdout.contains("knowledge base: 3 records"), "{}", stdout);
    assert!(stdout.trim_end().ends_with("ok"));

    let records = read_array(&data_file(&tmp, "knowledge_base.json"));
    let slugs: Vec<&str> = records.iter().filter_map(|r| r["slug"].as_str()).collect();
    assert_eq!(slugs, vec!["docs/alpha.md", "docs/beta.md", "docs/gamma.txt"]);
    assert!(records.iter().all(|r| r.get("llm_status").is_none()));

    let filtered = read_array(&data_file(&tmp, "filtered_articles.json"));
    assert_eq!(filtered.len(), 2);
    let near = filtered
        .iter()
        .find(|f| f["filter_reason"] == "near-duplicate")
        .unwrap();
    assert_eq!(near["slug"], "docs/alpha_copy.md");
    assert_eq!(near["duplicate_of"]["key"], "docs/alpha.md");
    assert_eq!(near["duplicate_of"]["distance"], 0);
    assert!(filtered.iter().any(|f| f["filter_reason"] == "empty-content"));
}

#[test]
fn test_second_run_is_idempotent() {
    let (tmp, config_path) = setup_test_env();
    let kb = data_file(&tmp, "knowledge_base.json");

    let (_, stderr, success) = run_fusion(&config_path, &["run", "--progress", "off"]);
    assert!(success, "first run failed: {}", stderr);
    let first = fs::read(&kb).unwrap();

    let (stdout, stderr, success) = run_fusion(&config_path, &["run", "--progress", "off"]);
    assert!(success, "second run failed: {}", stderr);
    assert!(stdout.contains("reused: 3"), "{}", stdout);
    assert!(stdout.contains("needs enrichment: 0"), "{}", stdout);

    assert_eq!(first, fs::read(&kb).unwrap());
}

#[test]
fn test_dry_run_writes_nothing() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) =
        run_fusion(&config_path, &["run", "--dry-run", "--progress", "off"]);
    assert!(success, "dry run failed: {}", stderr);
    assert!(stdout.starts_with("run (dry-run)"), "{}", stdout);
    assert!(stdout.contains("needs enrichment: 3"), "{}", stdout);
    assert!(!data_file(&tmp, "knowledge_base.json").exists());
    assert!(!data_file(&tmp, "filtered_articles.json").exists());
}

#[test]
fn test_removed_file_is_carried_forward() {
    let (tmp, config_path) = setup_test_env();
    let (_, stderr, success) = run_fusion(&config_path, &["run", "--progress", "off"]);
    assert!(success, "{}", stderr);

    fs::remove_file(tmp.path().join("files/gamma.txt")).unwrap();
    let (stdout, stderr, success) = run_fusion(&config_path, &["run", "--progress", "off"]);
    assert!(success, "{}", stderr);
    assert!(stdout.contains("carried forward: 1"), "{}", stdout);

    let records = read_array(&data_file(&tmp, "knowledge_base.json"));
    assert_eq!(records.len(), 3);
}

#[test]
fn test_read_commands() {
    let (_tmp, config_path) = setup_test_env();
    let (_, stderr, success) = run_fusion(&config_path, &["run", "--progress", "off"]);
    assert!(success, "{}", stderr);

    let (stdout, _, success) = run_fusion(&config_path, &["list"]);
    assert!(success);
    assert!(stdout.contains("3 of 3 records"), "{}", stdout);

    let (stdout, _, success) = run_fusion(&config_path, &["search", "kubernetes"]);
    assert!(success);
    assert!(stdout.contains("gamma.txt"), "{}", stdout);
    assert!(!stdout.contains("Alpha Document"), "{}", stdout);

    let (stdout, _, success) = run_fusion(&config_path, &["search", "no-such-term-anywhere"]);
    assert!(success);
    assert!(stdout.contains("No results."));

    let (stdout, stderr, success) = run_fusion(&config_path, &["get", "docs/alpha.md"]);
    assert!(success, "{}", stderr);
    assert!(stdout.contains("title:        Alpha Document"), "{}", stdout);
    assert!(stdout.contains("enrichment:   not enriched"), "{}", stdout);

    let (_, _, success) = run_fusion(&config_path, &["get", "docs/missing.md"]);
    assert!(!success);

    let (stdout, _, success) = run_fusion(&config_path, &["stats"]);
    assert!(success);
    assert!(stdout.contains("Records:     3"), "{}", stdout);
    assert!(stdout.contains("Filtered:    2"), "{}", stdout);
}

#[test]
fn test_sources_reports_health() {
    let (_tmp, config_path) = setup_test_env();
    let (stdout, _, success) = run_fusion(&config_path, &["sources"]);
    assert!(success);
    assert!(stdout.contains("filesystem:docs"));
    assert!(stdout.contains("OK"));
}

#[test]
fn test_fingerprint_command() {
    let (tmp, config_path) = setup_test_env();
    let alpha = tmp.path().join("files/alpha.md");
    let copy = tmp.path().join("files/alpha_copy.md");

    let (stdout, stderr, success) = run_fusion(
        &config_path,
        &["fingerprint", alpha.to_str().unwrap(), copy.to_str().unwrap()],
    );
    assert!(success, "{}", stderr);
    assert!(stdout.contains("fingerprint: "));
    assert!(stdout.contains("distance: 0 (threshold 15, near-duplicate)"), "{}", stdout);
}

#[test]
fn test_missing_config_fails() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, success) = run_fusion(&tmp.path().join("nope.toml"), &["run"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"), "{}", stderr);
}
