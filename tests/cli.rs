use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn vcx_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_vcx"))
}

fn write_config(dir: &Path, body: &str) -> PathBuf {
    let config_dir = dir.join("config");
    fs::create_dir_all(&config_dir).unwrap();
    let path = config_dir.join("vcx.toml");
    fs::write(&path, body).unwrap();
    path
}

fn memory_config(dir: &Path) -> PathBuf {
    write_config(dir, "[store]\nbackend = \"memory\"\n")
}

fn run_vcx(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = vcx_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path)
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run vcx binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

#[test]
fn test_sources_on_empty_store() {
    let tmp = TempDir::new().unwrap();
    let config = memory_config(tmp.path());
    let (stdout, stderr, success) = run_vcx(&config, &["sources", "docs"]);
    assert!(success, "sources failed: {}", stderr);

    let json: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(
        json,
        serde_json::json!({ "storeName": "docs", "sources": [], "sourceCount": 0 })
    );
}

#[test]
fn test_unknown_backend_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let config = write_config(tmp.path(), "[store]\nbackend = \"milvus\"\n");
    let (_, stderr, success) = run_vcx(&config, &["sources", "docs"]);
    assert!(!success);
    assert!(
        stderr.contains("vector store \"milvus\" is not supported"),
        "unexpected stderr: {}",
        stderr
    );
}

#[test]
fn test_unknown_embedding_service_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let config = write_config(
        tmp.path(),
        "[store]\nbackend = \"memory\"\n[embedding]\nservice = \"einstein\"\n",
    );
    let (_, stderr, success) = run_vcx(&config, &["embed", "hello"]);
    assert!(!success);
    assert!(stderr.contains("embedding model service \"einstein\" is not supported"));
}

#[test]
fn test_missing_config_fails() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, success) = run_vcx(&tmp.path().join("nope.toml"), &["sources", "docs"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"));
}

#[test]
fn test_invalid_page_size_fails() {
    let tmp = TempDir::new().unwrap();
    let config = write_config(tmp.path(), "[store]\nbackend = \"memory\"\npage_size = 0\n");
    let (_, stderr, success) = run_vcx(&config, &["sources", "docs"]);
    assert!(!success);
    assert!(stderr.contains("page_size"));
}

#[test]
fn test_add_text_fails_when_embedding_disabled() {
    let tmp = TempDir::new().unwrap();
    let config = memory_config(tmp.path());
    let (_, stderr, success) = run_vcx(&config, &["add", "text", "docs", "some text"]);
    assert!(!success);
    assert!(stderr.contains("embedding service is disabled"));
}

#[test]
fn test_health_with_memory_store() {
    let tmp = TempDir::new().unwrap();
    let config = memory_config(tmp.path());
    let (stdout, stderr, success) = run_vcx(&config, &["health"]);
    assert!(success, "health failed: {}", stderr);

    let json: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(json["store"]["backend"], "memory");
    assert_eq!(json["store"]["healthy"], true);
    assert_eq!(json["embedding"]["service"], "disabled");
}

#[test]
fn test_remove_requires_selector() {
    let tmp = TempDir::new().unwrap();
    let config = memory_config(tmp.path());
    let (_, _, success) = run_vcx(&config, &["remove", "docs"]);
    assert!(!success);

    let (stdout, stderr, success) = run_vcx(&config, &["remove", "docs", "--ids", "a,b"]);
    assert!(success, "remove failed: {}", stderr);
    let json: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(json["ids"], serde_json::json!(["a", "b"]));
}

#[test]
fn test_completions_need_no_config() {
    let tmp = TempDir::new().unwrap();
    let (stdout, _, success) = run_vcx(&tmp.path().join("absent.toml"), &["completions", "bash"]);
    assert!(success);
    assert!(stdout.contains("vcx"));
}
