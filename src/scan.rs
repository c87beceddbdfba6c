//! Security scanner.
//!
//! Runs the [`PATTERNS`](crate::patterns::PATTERNS) library over a bounded
//! set of repository files. Each file is fetched exactly once through the
//! fetch stage; files that fail to fetch are counted in the summary's debug
//! block and otherwise ignored, so "0 findings" and "nothing fetched" stay
//! distinguishable.
//!
//! Matching runs over whole contents, not line by line. Line numbers are
//! 1-based and derived from the newlines preceding each match. A finding
//! whose file and title repeat an earlier finding within the dedup window
//! is dropped.

use globset::GlobSet;
use serde::{Deserialize, Serialize};

use crate::config::LimitsConfig;
use crate::error::{AnalyzerError, Result};
use crate::fetch::{fetch_files, FetchTarget};
use crate::github::RepoHost;
use crate::models::FileRequest;
use crate::patterns::{SecurityPattern, Severity};

/// Body of `POST /api/code-analyzer/scan`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScanRequest {
    #[serde(default)]
    pub owner: String,
    #[serde(default)]
    pub repo: String,
    #[serde(default)]
    pub files: Vec<FileRequest>,
}

impl ScanRequest {
    pub fn validate(&self) -> Result<()> {
        if self.owner.is_empty() || self.repo.is_empty() {
            return Err(AnalyzerError::BadRequest("Missing owner or repo".to_string()));
        }
        Ok(())
    }
}

/// One reported pattern match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Finding {
    pub title: String,
    pub severity: Severity,
    pub description: String,
    pub recommendation: String,
    pub file: String,
    pub line: usize,
}

/// File counts for triaging an empty result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanDebug {
    pub total_files_provided: usize,
    pub code_files_found: usize,
    pub files_successfully_fetched: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanSummary {
    pub total: usize,
    pub critical: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    pub info: usize,
    pub debug: ScanDebug,
}

impl ScanSummary {
    pub fn new(findings: &[Finding], debug: ScanDebug) -> Self {
        let count = |s: Severity| findings.iter().filter(|f| f.severity == s).count();
        Self {
            total: findings.len(),
            critical: count(Severity::Critical),
            high: count(Severity::High),
            medium: count(Severity::Medium),
            low: count(Severity::Low),
            info: count(Severity::Info),
            debug,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    pub findings: Vec<Finding>,
    pub summary: ScanSummary,
}

/// Scan one file's contents. Informational patterns are skipped.
///
/// Returned findings are in discovery order, pattern by pattern.
pub fn scan_content(
    path: &str,
    content: &str,
    patterns: &[SecurityPattern],
    dedup_window: usize,
) -> Vec<Finding> {
    let mut findings: Vec<Finding> = Vec::new();

    for pattern in patterns.iter().filter(|p| p.severity != Severity::Info) {
        let mut cursor = 0;
        let mut line = 1;
        let mut counted_to = 0;

        while cursor <= content.len() {
            let Some(m) = pattern.regex.find_at(content, cursor) else {
                break;
            };

            line += content[counted_to..m.start()].matches('\n').count();
            counted_to = m.start();

            let duplicate = findings.iter().any(|f| {
                f.title == pattern.title && f.line.abs_diff(line) < dedup_window
            });
            if !duplicate && !pattern.is_excluded(&content[m.end()..]) {
                findings.push(Finding {
                    title: pattern.title.to_string(),
                    severity: pattern.severity,
                    description: pattern.description.to_string(),
                    recommendation: pattern.recommendation.to_string(),
                    file: path.to_string(),
                    line,
                });
            }

            // An empty match must still move the cursor.
            cursor = if m.end() > m.start() {
                m.end()
            } else {
                match content[m.end()..].chars().next() {
                    Some(c) => m.end() + c.len_utf8(),
                    None => break,
                }
            };
        }
    }

    findings
}

/// Stable sort, most severe first.
pub fn sort_findings(findings: &mut [Finding]) {
    findings.sort_by_key(|f| f.severity);
}

/// Scan the code files among `files`.
///
/// Files are filtered with `include`, capped at `max_scanned_files`, then
/// fetched once each (blob when a SHA is given, by path otherwise).
pub async fn scan_repository(
    host: &dyn RepoHost,
    owner: &str,
    repo: &str,
    files: &[FileRequest],
    include: &GlobSet,
    patterns: &[SecurityPattern],
    limits: &LimitsConfig,
) -> ScanReport {
    let code_files: Vec<&FileRequest> = files.iter().filter(|f| include.is_match(&f.path)).collect();
    let targets: Vec<FetchTarget> = code_files
        .iter()
        .take(limits.max_scanned_files)
        .map(|f| FetchTarget::from(*f))
        .collect();

    let outcome = fetch_files(
        host,
        owner,
        repo,
        &targets,
        limits.max_scanned_files,
        limits.fetch_concurrency,
    )
    .await;

    let mut findings: Vec<Finding> = outcome
        .files
        .iter()
        .flat_map(|file| scan_content(&file.path, &file.content, patterns, limits.dedup_line_window))
        .collect();
    sort_findings(&mut findings);

    let counts = ScanDebug {
        total_files_provided: files.len(),
        code_files_found: code_files.len(),
        files_successfully_fetched: outcome.files.len(),
    };
    tracing::info!(
        owner,
        repo,
        findings = findings.len(),
        scanned = counts.files_successfully_fetched,
        "scan complete"
    );

    let summary = ScanSummary::new(&findings, counts);
    ScanReport { findings, summary }
}
