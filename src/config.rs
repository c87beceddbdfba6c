//! TOML configuration.
//!
//! Every section is optional: a missing file or a missing section yields the
//! defaults below. The hard caps in [`LimitsConfig`] bound latency and
//! upstream rate-limit usage on arbitrarily large repositories, so they live
//! in one place and are passed into each component.
//!
//! ```toml
//! [server]
//! bind = "127.0.0.1:3000"
//!
//! [github]
//! api_base = "https://api.github.com"
//! token_env = "GITHUB_TOKEN"
//!
//! [completion]
//! model = "gpt-4o-mini"
//! api_key_env = "OPENAI_API_KEY"
//!
//! [limits]
//! max_fetched_files = 20
//! fetch_concurrency = 4
//! ```

use anyhow::{bail, Context, Result};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub github: GitHubConfig,
    #[serde(default)]
    pub completion: CompletionConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub search: SearchConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:3000".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct GitHubConfig {
    #[serde(default = "default_github_api")]
    pub api_base: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Environment variable holding the optional bearer token.
    #[serde(default = "default_token_env")]
    pub token_env: String,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_base: default_github_api(),
            user_agent: default_user_agent(),
            timeout_secs: default_timeout_secs(),
            token_env: default_token_env(),
        }
    }
}

fn default_github_api() -> String {
    "https://api.github.com".to_string()
}
fn default_user_agent() -> String {
    "DYOR-Code-Analyzer".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_token_env() -> String {
    "GITHUB_TOKEN".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct CompletionConfig {
    #[serde(default = "default_completion_api")]
    pub api_base: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_completion_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            api_base: default_completion_api(),
            model: default_model(),
            timeout_secs: default_completion_timeout(),
            api_key_env: default_api_key_env(),
        }
    }
}

fn default_completion_api() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_completion_timeout() -> u64 {
    60
}
fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

/// Hard resource caps.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct LimitsConfig {
    pub max_selected_files: usize,
    /// AI escalation fires when the heuristic selects fewer paths than this.
    pub escalation_threshold: usize,
    pub max_ai_candidate_paths: usize,
    pub max_ai_selected_files: usize,
    pub max_fetched_files: usize,
    pub max_scanned_files: usize,
    pub max_file_chars: usize,
    pub max_search_files: usize,
    pub max_search_results: usize,
    pub dedup_line_window: usize,
    pub max_history_messages: usize,
    pub max_artifact_words: usize,
    pub max_quality_ai_chars: usize,
    pub fetch_concurrency: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_selected_files: 15,
            escalation_threshold: 3,
            max_ai_candidate_paths: 100,
            max_ai_selected_files: 10,
            max_fetched_files: 20,
            max_scanned_files: 20,
            max_file_chars: 50_000,
            max_search_files: 30,
            max_search_results: 100,
            dedup_line_window: 5,
            max_history_messages: 10,
            max_artifact_words: 5000,
            max_quality_ai_chars: 8000,
            fetch_concurrency: 4,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScanConfig {
    #[serde(default = "default_scan_globs")]
    pub include_globs: Vec<String>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            include_globs: default_scan_globs(),
        }
    }
}

fn default_scan_globs() -> Vec<String> {
    vec![
        "**/*.{js,jsx,ts,tsx,py,java,php,rb,go,rs}".to_string(),
        "package.json".to_string(),
    ]
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_search_globs")]
    pub include_globs: Vec<String>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            include_globs: default_search_globs(),
        }
    }
}

fn default_search_globs() -> Vec<String> {
    vec![
        "**/*.{js,jsx,ts,tsx,py,go,rs,java,rb,php,c,cpp,h,hpp,cs,swift,kt,scala,md,json,yaml,yml}"
            .to_string(),
    ]
}

/// Secrets resolved from the environment variables named in the config.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub github_token: Option<String>,
    pub completion_api_key: Option<String>,
}

impl Credentials {
    pub fn from_env(config: &Config) -> Self {
        Self {
            github_token: non_empty_env(&config.github.token_env),
            completion_api_key: non_empty_env(&config.completion.api_key_env),
        }
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Compile case-insensitive path globs.
pub fn build_globset(globs: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in globs {
        let glob = GlobBuilder::new(pattern)
            .case_insensitive(true)
            .literal_separator(false)
            .build()
            .with_context(|| format!("Invalid glob pattern: {}", pattern))?;
        builder.add(glob);
    }
    Ok(builder.build()?)
}

/// Load configuration from `path`, or defaults when the file does not exist.
pub fn load_config(path: &Path) -> Result<Config> {
    let config = if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content).with_context(|| "Failed to parse config file")?
    } else {
        tracing::info!(path = %path.display(), "config file not found, using defaults");
        Config::default()
    };

    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    let limits = &config.limits;
    let caps = [
        ("max_selected_files", limits.max_selected_files),
        ("escalation_threshold", limits.escalation_threshold),
        ("max_ai_candidate_paths", limits.max_ai_candidate_paths),
        ("max_ai_selected_files", limits.max_ai_selected_files),
        ("max_fetched_files", limits.max_fetched_files),
        ("max_scanned_files", limits.max_scanned_files),
        ("max_file_chars", limits.max_file_chars),
        ("max_search_files", limits.max_search_files),
        ("max_search_results", limits.max_search_results),
        ("dedup_line_window", limits.dedup_line_window),
        ("max_history_messages", limits.max_history_messages),
        ("max_artifact_words", limits.max_artifact_words),
        ("max_quality_ai_chars", limits.max_quality_ai_chars),
    ];
    for (name, value) in caps {
        if value == 0 {
            bail!("limits.{} must be > 0", name);
        }
    }

    if !(1..=8).contains(&limits.fetch_concurrency) {
        bail!("limits.fetch_concurrency must be in [1, 8]");
    }

    if limits.escalation_threshold > limits.max_selected_files {
        bail!("limits.escalation_threshold must be <= limits.max_selected_files");
    }

    if config.github.api_base.trim().is_empty() {
        bail!("github.api_base must not be empty");
    }
    if config.completion.api_base.trim().is_empty() {
        bail!("completion.api_base must not be empty");
    }

    build_globset(&config.scan.include_globs).context("scan.include_globs")?;
    build_globset(&config.search.include_globs).context("search.include_globs")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.limits, LimitsConfig::default());
        assert_eq!(config.github.user_agent, "DYOR-Code-Analyzer");
        assert_eq!(config.completion.model, "gpt-4o-mini");
    }

    #[test]
    fn test_partial_limits_keep_other_defaults() {
        let file = write_config("[limits]\nmax_fetched_files = 5\n");
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.limits.max_fetched_files, 5);
        assert_eq!(config.limits.max_file_chars, 50_000);
        assert_eq!(config.server.bind, "127.0.0.1:3000");
    }

    #[test]
    fn test_zero_limit_rejected() {
        let file = write_config("[limits]\nmax_selected_files = 0\n");
        let err = load_config(file.path()).unwrap_err();
        assert!(err.to_string().contains("max_selected_files"));
    }

    #[test]
    fn test_concurrency_bounds() {
        let file = write_config("[limits]\nfetch_concurrency = 16\n");
        assert!(load_config(file.path()).is_err());
    }

    #[test]
    fn test_threshold_above_cap_rejected() {
        let file = write_config("[limits]\nmax_selected_files = 2\n");
        assert!(load_config(file.path()).is_err());
    }

    #[test]
    fn test_invalid_glob_rejected() {
        let file = write_config("[scan]\ninclude_globs = [\"**/*.{js\"]\n");
        assert!(load_config(file.path()).is_err());
    }

    #[test]
    fn test_default_scan_globs_match() {
        let set = build_globset(&default_scan_globs()).unwrap();
        assert!(set.is_match("src/app.JS"));
        assert!(set.is_match("main.rs"));
        assert!(set.is_match("package.json"));
        assert!(!set.is_match("web/package.json.bak"));
        assert!(!set.is_match("README.md"));
    }
}
