use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn dyor_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("dyor");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();
    let config_path = config_dir.join("dyor.toml");
    fs::write(
        &config_path,
        "[server]\nbind = \"127.0.0.1:0\"\n\n[limits]\nmax_fetched_files = 5\n",
    )
    .unwrap();

    (tmp, config_path)
}

fn run_dyor(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = dyor_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run dyor binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

#[test]
fn test_diagram_sanitizes_text() {
    let (tmp, config) = setup_test_env();
    let file = tmp.path().join("flow.mmd");
    fs::write(&file, "%% draft\nA[Load user] --> B\n").unwrap();

    let (stdout, stderr, ok) = run_dyor(&config, &["diagram", file.to_str().unwrap()]);
    assert!(ok, "stderr: {}", stderr);
    assert_eq!(stdout, "graph TD\nA[\"Load user\"] --> B\n");
    assert!(stderr.lines().any(|l| l == "valid"));
}

#[test]
fn test_diagram_compiles_structured_json() {
    let (tmp, config) = setup_test_env();
    let file = tmp.path().join("flow.json");
    fs::write(
        &file,
        r#"{"direction":"LR","nodes":[{"id":"a","label":"Start"},{"id":"b","label":"End","shape":"circle"}],"edges":[{"from":"a","to":"b"}]}"#,
    )
    .unwrap();

    let (stdout, stderr, ok) = run_dyor(
        &config,
        &["diagram", file.to_str().unwrap(), "--structured"],
    );
    assert!(ok, "stderr: {}", stderr);
    assert!(stdout.starts_with("graph LR\n"));
    assert!(stdout.contains("a[\"Start\"]"));
    assert!(stdout.contains("a --> b"));
}

#[test]
fn test_diagram_reports_invalid() {
    let (tmp, config) = setup_test_env();
    let file = tmp.path().join("one.mmd");
    fs::write(&file, "sequenceDiagram\n").unwrap();

    let (_stdout, stderr, ok) = run_dyor(&config, &["diagram", file.to_str().unwrap()]);
    assert!(ok);
    assert!(stderr.contains("invalid:"));
}

#[test]
fn test_diagram_missing_file_fails() {
    let (tmp, config) = setup_test_env();
    let missing = tmp.path().join("absent.mmd");

    let (_stdout, stderr, ok) = run_dyor(&config, &["diagram", missing.to_str().unwrap()]);
    assert!(!ok);
    assert!(stderr.contains("Failed to read diagram file"));
}

#[test]
fn test_invalid_config_is_rejected() {
    let (tmp, _config) = setup_test_env();
    let bad = tmp.path().join("bad.toml");
    fs::write(&bad, "[limits]\nfetch_concurrency = 0\n").unwrap();

    let (_stdout, stderr, ok) = run_dyor(&bad, &["tree", "acme", "widgets"]);
    assert!(!ok);
    assert!(stderr.contains("fetch_concurrency"));
}

#[test]
fn test_unknown_search_kind_rejected() {
    let (_tmp, config) = setup_test_env();
    let (_stdout, stderr, ok) = run_dyor(
        &config,
        &["search", "acme", "widgets", "q", "--kind", "fuzzy"],
    );
    assert!(!ok);
    assert!(stderr.contains("fuzzy"));
}

#[test]
fn test_diagram_runs_without_valid_config() {
    let (tmp, _config) = setup_test_env();
    let bad = tmp.path().join("bad.toml");
    fs::write(&bad, "[limits]\nfetch_concurrency = 0\n").unwrap();
    let file = tmp.path().join("flow.mmd");
    fs::write(&file, "graph TD\nA --> B\n").unwrap();

    let (stdout, stderr, ok) = run_dyor(&bad, &["diagram", file.to_str().unwrap()]);
    assert!(ok, "stderr: {}", stderr);
    assert!(stdout.starts_with("graph TD\n"));
}

#[test]
fn test_help_lists_every_command() {
    let (_tmp, config) = setup_test_env();
    let (stdout, _stderr, ok) = run_dyor(&config, &["--help"]);
    assert!(ok);
    for command in ["serve", "tree", "select", "ask", "scan", "search", "diagram"] {
        assert!(
            stdout.lines().any(|l| l.trim_start().starts_with(command)),
            "missing {} in help:\n{}",
            command,
            stdout
        );
    }
}
