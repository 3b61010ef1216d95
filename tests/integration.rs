use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn tabvault_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_tabvault"))
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let config_content = format!(
        r#"[paths]
base = "{}/data"

[index]
feedback_rate = 0.1

[watch]
interval_secs = 1
"#,
        root.display()
    );

    let config_path = config_dir.join("tabvault.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn inbox(tmp: &TempDir) -> PathBuf {
    tmp.path().join("data").join("inbox")
}

fn drop_session(tmp: &TempDir, name: &str, tabs: &[(&str, &str)]) {
    let tabs: Vec<String> = tabs
        .iter()
        .map(|(t, u)| format!(r#"{{"title": "{}", "url": "{}"}}"#, t, u))
        .collect();
    fs::write(
        inbox(tmp).join(name),
        format!(r#"{{"tabs": [{}]}}"#, tabs.join(", ")),
    )
    .unwrap();
}

fn run_tabvault(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = tabvault_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run tabvault binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

fn init_with_sessions() -> (TempDir, PathBuf) {
    let (tmp, config_path) = setup_test_env();
    let (_, stderr, success) = run_tabvault(&config_path, &["init"]);
    assert!(success, "init failed: {}", stderr);

    drop_session(
        &tmp,
        "alpha_session.json",
        &[
            ("Rust async book", "https://rust-lang.github.io/async-book"),
            ("Tokio tutorial", "https://tokio.rs/tokio/tutorial"),
        ],
    );
    drop_session(
        &tmp,
        "beta_session.json",
        &[
            ("Python machine learning", "https://scikit-learn.org"),
            ("Tokio tutorial", "https://tokio.rs/tokio/tutorial"),
        ],
    );
    (tmp, config_path)
}

#[test]
fn test_init_creates_layout() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_tabvault(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));

    let data = tmp.path().join("data");
    assert!(data.join("inbox").is_dir());
    assert!(data.join("vault").is_dir());
    assert!(data.join("quarantine").is_dir());
    assert!(data.join("tabvault.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_tabvault(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_tabvault(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_ingest_archives_and_quarantines() {
    let (tmp, config_path) = init_with_sessions();
    fs::write(inbox(&tmp).join("gamma_session.json"), "{ truncated").unwrap();

    let (stdout, stderr, success) = run_tabvault(&config_path, &["ingest"]);
    assert!(success, "ingest failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("processed: 2"));
    assert!(stdout.contains("quarantined: 1"));
    assert!(stdout.contains("ok"));

    assert_eq!(fs::read_dir(inbox(&tmp)).unwrap().count(), 0);
    assert!(tmp
        .path()
        .join("data")
        .join("index.checkpoint.json")
        .exists());
}

#[test]
fn test_ingest_duplicate_content() {
    let (tmp, config_path) = init_with_sessions();
    run_tabvault(&config_path, &["ingest"]);

    drop_session(
        &tmp,
        "alpha_session.json",
        &[
            ("Rust async book", "https://rust-lang.github.io/async-book"),
            ("Tokio tutorial", "https://tokio.rs/tokio/tutorial"),
        ],
    );
    let (stdout, _, success) = run_tabvault(&config_path, &["ingest"]);
    assert!(success);
    assert!(stdout.contains("processed: 0"));
    assert!(stdout.contains("duplicates: 1"));
}

#[test]
fn test_search_keyword() {
    let (_tmp, config_path) = init_with_sessions();
    run_tabvault(&config_path, &["ingest"]);

    let (stdout, stderr, success) = run_tabvault(&config_path, &["search", "async"]);
    assert!(success, "search failed: {}", stderr);
    assert!(stdout.contains("Rust async book"));
    assert!(!stdout.contains("Python machine learning"));

    let (stdout, _, success) = run_tabvault(&config_path, &["search", "kubernetes"]);
    assert!(success);
    assert!(stdout.contains("No results."));
}

#[test]
fn test_similar() {
    let (_tmp, config_path) = init_with_sessions();
    run_tabvault(&config_path, &["ingest"]);

    let (stdout, stderr, success) =
        run_tabvault(&config_path, &["similar", "machine learning", "--limit", "1"]);
    assert!(success, "similar failed: {}", stderr);
    assert!(stdout.contains("Python machine learning"));
    assert!(stdout.contains("score:"));
}

#[test]
fn test_missions_and_observe() {
    let (_tmp, config_path) = init_with_sessions();

    let (stdout, _, success) = run_tabvault(&config_path, &["missions"]);
    assert!(success);
    assert!(stdout.contains("No missions."));

    let (_, stderr, success) = run_tabvault(
        &config_path,
        &["add-mission", "ml", "python machine learning models"],
    );
    assert!(success, "add-mission failed: {}", stderr);

    let (stdout, _, _) = run_tabvault(&config_path, &["missions"]);
    assert!(stdout.contains("ml"));
    assert!(stdout.contains("python machine learning models"));

    run_tabvault(&config_path, &["ingest"]);
    let (stdout, stderr, success) = run_tabvault(&config_path, &["observe"]);
    assert!(success, "observe failed: {}", stderr);
    assert!(stdout.contains("sessions observed: 2"));
    assert!(stdout.contains("ml ("));
}

#[test]
fn test_feedback() {
    let (_tmp, config_path) = init_with_sessions();
    run_tabvault(&config_path, &["ingest"]);

    let (stdout, stderr, success) = run_tabvault(
        &config_path,
        &["feedback", "1", "--score", "0.9", "--terms", "rust,tokio"],
    );
    assert!(success, "feedback failed: {}", stderr);
    assert!(stdout.contains("Feedback recorded"));

    let (_, stderr, success) = run_tabvault(&config_path, &["feedback", "999"]);
    assert!(!success);
    assert!(stderr.contains("No session with id 999"));

    let (stdout, _, _) = run_tabvault(&config_path, &["stats"]);
    assert!(stdout.contains("Feedback:     1"));
}

#[test]
fn test_export_graph() {
    let (tmp, config_path) = init_with_sessions();
    run_tabvault(&config_path, &["ingest"]);

    let out = tmp.path().join("out").join("graph.json");
    let (_, stderr, success) = run_tabvault(
        &config_path,
        &["export-graph", "--output", out.to_str().unwrap()],
    );
    assert!(success, "export-graph failed: {}", stderr);

    let graph: serde_json::Value = serde_json::from_str(&fs::read_to_string(&out).unwrap()).unwrap();
    assert_eq!(graph["nodes"].as_array().unwrap().len(), 3);
    let edges = graph["edges"].as_array().unwrap();
    assert_eq!(edges.len(), 2);
    for edge in edges {
        assert!(edge["source"].as_str().unwrap() < edge["target"].as_str().unwrap());
        assert_eq!(edge["weight"], 1);
    }

    let (stdout, _, success) = run_tabvault(&config_path, &["export-graph"]);
    assert!(success);
    assert!(stdout.contains("\"edges\""));
}

#[test]
fn test_stats() {
    let (_tmp, config_path) = init_with_sessions();
    run_tabvault(&config_path, &["ingest"]);

    let (stdout, stderr, success) = run_tabvault(&config_path, &["stats"]);
    assert!(success, "stats failed: {}", stderr);
    assert!(stdout.contains("Sessions:     2"));
    assert!(stdout.contains("Tabs:         4"));
    assert!(stdout.contains("Documents:    2"));
}

#[test]
fn test_reconcile_clean_vault() {
    let (_tmp, config_path) = init_with_sessions();
    run_tabvault(&config_path, &["ingest"]);

    let (stdout, stderr, success) = run_tabvault(&config_path, &["reconcile", "--prune-temp"]);
    assert!(success, "reconcile failed: {}", stderr);
    assert!(stdout.contains("scanned: 2"));
    assert!(stdout.contains("recorded: 0"));
    assert!(stdout.contains("pruned temps: 0"));
}

#[test]
fn test_corrupt_checkpoint_fails() {
    let (tmp, config_path) = init_with_sessions();
    fs::write(
        tmp.path().join("data").join("index.checkpoint.json"),
        "not a checkpoint",
    )
    .unwrap();

    let (_, stderr, success) = run_tabvault(&config_path, &["missions"]);
    assert!(!success);
    assert!(stderr.contains("corrupt"));

    let (_, _, success) = run_tabvault(&config_path, &["ingest"]);
    assert!(!success);
    assert_eq!(fs::read_dir(inbox(&tmp)).unwrap().count(), 2);
}

#[test]
fn test_missing_config_fails() {
    let (stdout, stderr, success) = run_tabvault(Path::new("/nonexistent/tabvault.toml"), &["stats"]);
    assert!(!success, "expected failure: stdout={}", stdout);
    assert!(stderr.contains("Failed to read config file"));
}
