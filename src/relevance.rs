//! Relevance selection.
//!
//! Picks a bounded, ordered subset of repository paths likely to answer a
//! question.
//!
//! # Algorithm
//!
//! 1. Match the lower-cased question against the [`Topic`] keyword table and
//!    union the marker sets of every matched topic ([`DEFAULT_MARKERS`] when
//!    nothing matches).
//! 2. Keep paths whose lower-cased form *contains* any marker. This is a
//!    substring test, not an extension-boundary test, so it can over-match
//!    (e.g. `assets/.json-cache/blob.bin` matches the `.json` marker).
//! 3. Put [`IMPORTANT_FILES`] found in the tree first, in priority order.
//! 4. Cap the list at `max_selected_files`.
//! 5. If fewer than `escalation_threshold` paths survive and a completion
//!    backend is available, ask it to pick paths. Its answer is accepted only
//!    when it parses to a non-empty JSON array whose entries exist in the
//!    tree; otherwise the heuristic result stands.
//!
//! The escalation step never fails the request.

use serde::Serialize;
use std::collections::HashSet;

use crate::completion::{strip_code_fences, ChatMessage, CompletionBackend, CompletionOptions};
use crate::config::LimitsConfig;
use crate::error::{AnalyzerError, Result};

/// Source-code extensions plus the npm manifest.
const SOURCE_MARKERS: &[&str] = &[
    ".js", ".jsx", ".ts", ".tsx", ".py", ".java", ".php", ".rb", ".go", ".rs", "package.json",
];

/// Markers used when no topic keyword matches.
pub const DEFAULT_MARKERS: &[&str] = &[
    ".js", ".jsx", ".ts", ".tsx", ".py", ".go", ".rs", ".java", ".md", ".json",
];

/// Files placed first whenever present, highest priority first.
pub const IMPORTANT_FILES: &[&str] = &[
    "README.md",
    "package.json",
    "tsconfig.json",
    "pyproject.toml",
    "go.mod",
    "Cargo.toml",
];

/// Question topics recognised by keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topic {
    Security,
    Vulnerability,
    Architecture,
    Readme,
    Config,
    Test,
    Style,
    Api,
}

impl Topic {
    pub const ALL: [Topic; 8] = [
        Topic::Security,
        Topic::Vulnerability,
        Topic::Architecture,
        Topic::Readme,
        Topic::Config,
        Topic::Test,
        Topic::Style,
        Topic::Api,
    ];

    /// Lower-case keyword searched for in the question.
    pub fn keyword(self) -> &'static str {
        match self {
            Topic::Security => "security",
            Topic::Vulnerability => "vulnerability",
            Topic::Architecture => "architecture",
            Topic::Readme => "readme",
            Topic::Config => "config",
            Topic::Test => "test",
            Topic::Style => "style",
            Topic::Api => "api",
        }
    }

    /// Path markers selected by this topic.
    pub fn markers(self) -> &'static [&'static str] {
        match self {
            Topic::Security | Topic::Vulnerability => SOURCE_MARKERS,
            Topic::Architecture => &[".md", ".json", ".yaml", ".yml", ".toml"],
            Topic::Readme => &["README.md", "readme.md", "README", "readme"],
            Topic::Config => &[".json", ".yaml", ".yml", ".toml", ".config.js", ".config.ts"],
            Topic::Test => &[".test.", ".spec.", "__tests__"],
            Topic::Style => &[".css", ".scss", ".sass", ".less", ".styled."],
            Topic::Api => &["api/", "routes/", "controllers/", "handlers/"],
        }
    }

    /// Topics whose keyword occurs in `question`.
    pub fn detect(question: &str) -> Vec<Topic> {
        let lower = question.to_lowercase();
        Topic::ALL
            .into_iter()
            .filter(|t| lower.contains(t.keyword()))
            .collect()
    }
}

/// How the selection was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionSource {
    Heuristic,
    Ai,
}

/// A question plus the full list of repository paths.
#[derive(Debug, Clone)]
pub struct RelevanceRequest {
    pub question: String,
    pub available_paths: Vec<String>,
}

/// Selected paths, all members of the request's `available_paths`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelevanceResult {
    pub selected_paths: Vec<String>,
    pub source: SelectionSource,
}

/// Lower-cased markers for `question`, deduplicated, in table order.
pub fn markers_for(question: &str) -> Vec<String> {
    let topics = Topic::detect(question);
    let raw: Vec<&str> = if topics.is_empty() {
        DEFAULT_MARKERS.to_vec()
    } else {
        topics.iter().flat_map(|t| t.markers().iter().copied()).collect()
    };

    let mut seen = HashSet::new();
    raw.into_iter()
        .map(str::to_lowercase)
        .filter(|m| seen.insert(m.clone()))
        .collect()
}

/// Keyword heuristic: important files first, then marker matches, capped.
pub fn heuristic_selection(question: &str, available: &[String], limit: usize) -> Vec<String> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut selected: Vec<String> = Vec::new();

    for important in IMPORTANT_FILES {
        let suffix = important.to_lowercase();
        if let Some(found) = available.iter().find(|p| p.to_lowercase().ends_with(&suffix)) {
            if seen.insert(found.as_str()) {
                selected.push(found.clone());
            }
        }
    }

    let markers = markers_for(question);
    for path in available {
        let lower = path.to_lowercase();
        if markers.iter().any(|m| lower.contains(m.as_str())) && seen.insert(path.as_str()) {
            selected.push(path.clone());
        }
    }

    selected.truncate(limit);
    selected
}

/// Parse a model reply as a JSON array of paths, tolerating code fences.
pub fn parse_path_list(reply: &str) -> Result<Vec<String>> {
    let cleaned = strip_code_fences(reply);
    let paths: Vec<String> = serde_json::from_str(&cleaned)?;
    if paths.is_empty() {
        return Err(AnalyzerError::Parse("empty path list".to_string()));
    }
    Ok(paths)
}

async fn ai_selection(
    backend: &dyn CompletionBackend,
    request: &RelevanceRequest,
    limits: &LimitsConfig,
) -> Result<Vec<String>> {
    let candidates: Vec<&str> = request
        .available_paths
        .iter()
        .take(limits.max_ai_candidate_paths)
        .map(String::as_str)
        .collect();

    let messages = vec![
        ChatMessage::system(format!(
            "You are a code analysis assistant. Given a question and a list of file paths, \
             select the most relevant files (max {}) that would help answer the question. \
             Return ONLY a JSON array of file paths, nothing else.",
            limits.max_ai_selected_files
        )),
        ChatMessage::user(format!(
            "Question: {}\n\nAvailable files:\n{}\n\nReturn a JSON array of the most relevant file paths:",
            request.question,
            candidates.join("\n")
        )),
    ];

    let reply = backend
        .complete(
            messages,
            CompletionOptions {
                max_tokens: 1000,
                temperature: 0.0,
            },
        )
        .await?;

    let available: HashSet<&str> = request.available_paths.iter().map(String::as_str).collect();
    let mut seen = HashSet::new();
    let mut picked: Vec<String> = parse_path_list(&reply)?
        .into_iter()
        .filter(|p| available.contains(p.as_str()) && seen.insert(p.clone()))
        .collect();
    picked.truncate(limits.max_selected_files);

    if picked.is_empty() {
        return Err(AnalyzerError::Parse(
            "model selected no paths present in the tree".to_string(),
        ));
    }
    Ok(picked)
}

/// Select relevant paths, escalating to the completion backend when the
/// heuristic finds too little.
pub async fn select_relevant(
    request: &RelevanceRequest,
    backend: Option<&dyn CompletionBackend>,
    limits: &LimitsConfig,
) -> RelevanceResult {
    let heuristic = heuristic_selection(
        &request.question,
        &request.available_paths,
        limits.max_selected_files,
    );

    let backend = match backend {
        Some(b) if heuristic.len() < limits.escalation_threshold => b,
        _ => {
            return RelevanceResult {
                selected_paths: heuristic,
                source: SelectionSource::Heuristic,
            }
        }
    };

    match ai_selection(backend, request, limits).await {
        Ok(selected_paths) => {
            tracing::debug!(count = selected_paths.len(), "using AI path selection");
            RelevanceResult {
                selected_paths,
                source: SelectionSource::Ai,
            }
        }
        Err(err) => {
            tracing::debug!(error = %err, "AI path selection failed, keeping heuristic");
            RelevanceResult {
                selected_paths: heuristic,
                source: SelectionSource::Heuristic,
            }
        }
    }
}
