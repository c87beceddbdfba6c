//! Code search over a bounded set of repository files.
//!
//! Three kinds:
//! - `text`: case-insensitive substring. Also used for unknown or missing
//!   `type` values.
//! - `regex`: case-insensitive regular expression; an invalid pattern falls
//!   back to `text`.
//! - `ast`: definition-shaped expressions (`function NAME(`, `class NAME {`,
//!   `def NAME(`, ...) around the escaped query. Despite the name this is a
//!   regex heuristic, not a parser.
//!
//! Matching is per line. Hits are ordered by file, then line.

use globset::GlobSet;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Deserializer, Serialize};

use crate::config::LimitsConfig;
use crate::error::{AnalyzerError, Result};
use crate::fetch::{fetch_files, FetchTarget};
use crate::github::RepoHost;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SearchKind {
    #[default]
    Text,
    Regex,
    Ast,
}

impl<'de> Deserialize<'de> for SearchKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(match raw.as_deref() {
            Some("regex") => SearchKind::Regex,
            Some("ast") => SearchKind::Ast,
            Some("text") | None => SearchKind::Text,
            Some(other) => {
                tracing::debug!(kind = other, "unknown search type, using text");
                SearchKind::Text
            }
        })
    }
}

/// Body of `POST /api/code-analyzer/search`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    #[serde(default)]
    pub owner: String,
    #[serde(default)]
    pub repo: String,
    #[serde(default)]
    pub file_paths: Vec<String>,
    #[serde(default)]
    pub query: String,
    #[serde(default, rename = "type")]
    pub kind: SearchKind,
}

impl SearchRequest {
    pub fn validate(&self) -> Result<()> {
        if self.owner.is_empty() || self.repo.is_empty() || self.query.is_empty() {
            return Err(AnalyzerError::BadRequest(
                "Missing required parameters".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchHit {
    pub file: String,
    pub line: usize,
    pub content: String,
}

/// Definition shapes; `{}` is replaced by the escaped query.
const DEFINITION_SHAPES: &[&str] = &[
    r"function\s+{}\s*\(",
    r"const\s+{}\s*=",
    r"let\s+{}\s*=",
    r"var\s+{}\s*=",
    r"class\s+{}\s*[{<]",
    r"def\s+{}\s*\(",
    r"async\s+function\s+{}",
    r"export\s+(const|let|var|function|class)\s+{}",
    r"{}\s*=\s*\(.*\)\s*=>",
];

/// A compiled line matcher.
#[derive(Debug)]
pub enum Matcher {
    /// Lower-cased needle.
    Text(String),
    Regex(Regex),
    AnyOf(Vec<Regex>),
}

fn case_insensitive(pattern: &str) -> std::result::Result<Regex, regex::Error> {
    RegexBuilder::new(pattern).case_insensitive(true).build()
}

impl Matcher {
    pub fn new(kind: SearchKind, query: &str) -> Self {
        let text = || Matcher::Text(query.to_lowercase());
        match kind {
            SearchKind::Text => text(),
            SearchKind::Regex => match case_insensitive(query) {
                Ok(re) => Matcher::Regex(re),
                Err(err) => {
                    tracing::debug!(query, error = %err, "invalid regex, using text search");
                    text()
                }
            },
            SearchKind::Ast => {
                let escaped = regex::escape(query);
                let shapes = DEFINITION_SHAPES
                    .iter()
                    .filter_map(|shape| case_insensitive(&shape.replace("{}", &escaped)).ok())
                    .collect();
                Matcher::AnyOf(shapes)
            }
        }
    }

    pub fn is_match(&self, line: &str) -> bool {
        match self {
            Matcher::Text(needle) => line.to_lowercase().contains(needle.as_str()),
            Matcher::Regex(re) => re.is_match(line),
            Matcher::AnyOf(shapes) => shapes.iter().any(|re| re.is_match(line)),
        }
    }
}

/// Append hits for one file, stopping at `limit` total hits.
pub fn search_content(path: &str, content: &str, matcher: &Matcher, limit: usize, hits: &mut Vec<SearchHit>) {
    for (index, line) in content.split('\n').enumerate() {
        if hits.len() >= limit {
            return;
        }
        if matcher.is_match(line) {
            hits.push(SearchHit {
                file: path.to_string(),
                line: index + 1,
                content: line.trim().to_string(),
            });
        }
    }
}

/// Search the first `max_search_files` paths accepted by `include`.
pub async fn search_repository(
    host: &dyn RepoHost,
    request: &SearchRequest,
    include: &GlobSet,
    limits: &LimitsConfig,
) -> Vec<SearchHit> {
    let targets: Vec<FetchTarget> = request
        .file_paths
        .iter()
        .filter(|p| include.is_match(p.as_str()))
        .take(limits.max_search_files)
        .map(|p| FetchTarget::Path(p.clone()))
        .collect();

    let outcome = fetch_files(
        host,
        &request.owner,
        &request.repo,
        &targets,
        limits.max_search_files,
        limits.fetch_concurrency,
    )
    .await;

    let matcher = Matcher::new(request.kind, &request.query);
    let mut hits = Vec::new();
    for file in &outcome.files {
        search_content(&file.path, &file.content, &matcher, limits.max_search_results, &mut hits);
    }

    tracing::info!(
        owner = %request.owner,
        repo = %request.repo,
        kind = ?request.kind,
        searched = outcome.files.len(),
        hits = hits.len(),
        "search complete"
    );
    hits
}
