//! Code quality analysis for a single file.
//!
//! Heuristic metrics are always computed. When a completion backend is
//! available its review (score, summary, issues) takes precedence; any
//! failure of that step leaves the heuristic report in place.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::completion::{strip_code_fences, ChatMessage, CompletionBackend, CompletionOptions};
use crate::config::LimitsConfig;
use crate::error::{AnalyzerError, Result};
use crate::github::RepoHost;

const REVIEW_OPTIONS: CompletionOptions = CompletionOptions {
    max_tokens: 1000,
    temperature: 0.0,
};

const REVIEW_PROMPT: &str = "Analyze this code for quality. Return JSON with: score (0-100), \
summary (1 sentence), issues (array of {severity, line, message}). Be concise.";

/// Branching constructs counted toward cyclomatic complexity.
static COMPLEXITY_INDICATORS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"if\s*\(",
        r"else\s*\{",
        r"for\s*\(",
        r"while\s*\(",
        r"switch\s*\(",
        r"try\s*\{",
        r"catch\s*\(",
        r"\?\s*.*\s*:",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap_or_else(|err| panic!("invalid complexity pattern {p}: {err}")))
    .collect()
});

/// Body of `POST /api/code-analyzer/quality`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityRequest {
    #[serde(default)]
    pub owner: String,
    #[serde(default)]
    pub repo: String,
    #[serde(default)]
    pub file_path: String,
}

impl QualityRequest {
    pub fn validate(&self) -> Result<()> {
        if self.owner.is_empty() || self.repo.is_empty() || self.file_path.is_empty() {
            return Err(AnalyzerError::BadRequest(
                "Missing required parameters".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ComplexityLevel {
    Low,
    Medium,
    High,
    #[serde(rename = "Very High")]
    VeryHigh,
}

impl ComplexityLevel {
    pub fn from_score(complexity: usize) -> Self {
        match complexity {
            0..=5 => ComplexityLevel::Low,
            6..=15 => ComplexityLevel::Medium,
            16..=30 => ComplexityLevel::High,
            _ => ComplexityLevel::VeryHigh,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ComplexityLevel::Low => "Low",
            ComplexityLevel::Medium => "Medium",
            ComplexityLevel::High => "High",
            ComplexityLevel::VeryHigh => "Very High",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityMetrics {
    pub lines: usize,
    pub code_lines: usize,
    pub comment_lines: usize,
    pub complexity: ComplexityLevel,
    pub cyclomatic_complexity: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityIssue {
    #[serde(default)]
    pub severity: String,
    #[serde(default)]
    pub line: Option<u64>,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QualityReport {
    pub score: u32,
    pub summary: String,
    pub metrics: QualityMetrics,
    pub issues: Vec<QualityIssue>,
}

#[derive(Debug, Deserialize)]
struct AiReview {
    score: Option<u32>,
    summary: Option<String>,
    #[serde(default)]
    issues: Vec<QualityIssue>,
}

fn is_comment(trimmed: &str) -> bool {
    trimmed.starts_with("//") || trimmed.starts_with('#')
}

/// Line counts and complexity for `content`.
pub fn compute_metrics(content: &str) -> QualityMetrics {
    let mut lines = 0;
    let mut code_lines = 0;
    let mut comment_lines = 0;
    for line in content.split('\n') {
        lines += 1;
        let trimmed = line.trim();
        if is_comment(trimmed) {
            comment_lines += 1;
        } else if !trimmed.is_empty() {
            code_lines += 1;
        }
    }

    let complexity = 1 + COMPLEXITY_INDICATORS
        .iter()
        .map(|re| re.find_iter(content).count())
        .sum::<usize>();

    QualityMetrics {
        lines,
        code_lines,
        comment_lines,
        complexity: ComplexityLevel::from_score(complexity),
        cyclomatic_complexity: complexity,
    }
}

/// 100 minus two points per complexity unit, minus ten when fewer than one
/// line in ten is a comment. Never below zero.
pub fn base_score(metrics: &QualityMetrics) -> u32 {
    let mut penalty = 2 * metrics.cyclomatic_complexity;
    // comment_lines < 10% of code_lines, in integers.
    if metrics.comment_lines * 10 < metrics.code_lines {
        penalty += 10;
    }
    100usize.saturating_sub(penalty) as u32
}

/// Heuristic-only report.
pub fn heuristic_report(content: &str) -> QualityReport {
    let metrics = compute_metrics(content);
    QualityReport {
        score: base_score(&metrics),
        summary: format!(
            "File has {} complexity with {} lines of code.",
            metrics.complexity.label().to_lowercase(),
            metrics.code_lines
        ),
        metrics,
        issues: Vec::new(),
    }
}

fn char_prefix(content: &str, max_chars: usize) -> &str {
    match content.char_indices().nth(max_chars) {
        Some((idx, _)) => &content[..idx],
        None => content,
    }
}

async fn ai_review(
    backend: &dyn CompletionBackend,
    path: &str,
    content: &str,
    max_chars: usize,
) -> Result<AiReview> {
    let messages = vec![
        ChatMessage::system(REVIEW_PROMPT),
        ChatMessage::user(format!(
            "Analyze this {}:\n\n{}",
            path,
            char_prefix(content, max_chars)
        )),
    ];
    let reply = backend.complete(messages, REVIEW_OPTIONS).await?;
    Ok(serde_json::from_str(&strip_code_fences(&reply))?)
}

/// Fetch one file by path and enforce the word cap.
pub async fn load_source(
    host: &dyn RepoHost,
    owner: &str,
    repo: &str,
    path: &str,
    max_words: usize,
) -> Result<String> {
    let file = host.get_file_content(owner, repo, path).await?;
    if file.content.is_empty() {
        return Err(AnalyzerError::BadRequest("No content available".to_string()));
    }
    if file.content.split_whitespace().count() > max_words {
        return Err(AnalyzerError::BadRequest(format!(
            "File is too large (over {} words)",
            max_words
        )));
    }
    Ok(file.content)
}

/// Analyze one file.
pub async fn analyze_quality(
    host: &dyn RepoHost,
    backend: Option<&dyn CompletionBackend>,
    request: &QualityRequest,
    limits: &LimitsConfig,
) -> Result<QualityReport> {
    let content = load_source(
        host,
        &request.owner,
        &request.repo,
        &request.file_path,
        limits.max_artifact_words,
    )
    .await?;

    let mut report = heuristic_report(&content);
    let Some(backend) = backend else {
        return Ok(report);
    };

    match ai_review(backend, &request.file_path, &content, limits.max_quality_ai_chars).await {
        Ok(review) => {
            if let Some(score) = review.score.filter(|s| *s > 0) {
                report.score = score.min(100);
            }
            if let Some(summary) = review.summary.filter(|s| !s.is_empty()) {
                report.summary = summary;
            }
            report.issues = review.issues;
        }
        Err(err) => {
            tracing::debug!(path = %request.file_path, error = %err, "AI quality review failed, using metrics only");
        }
    }
    Ok(report)
}
