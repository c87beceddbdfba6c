//! Core data types that flow through the analysis pipeline.
//!
//! Everything here is transient per request; nothing is persisted.

use serde::{Deserialize, Serialize};

/// Marker appended to content cut at the per-file character cap.
pub const TRUNCATION_MARKER: &str = "\n... (truncated)";

/// A blob in the repository tree at a point in history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRef {
    pub path: String,
    pub sha: String,
    #[serde(default)]
    pub size: u64,
}

/// File content retrieved from the code host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FetchedFile {
    pub path: String,
    pub content: String,
    pub truncated: bool,
}

impl FetchedFile {
    /// Build a fetched file, capping `content` at `max_chars` characters.
    pub fn new(path: impl Into<String>, content: String, max_chars: usize) -> Self {
        let (content, truncated) = truncate_content(content, max_chars);
        Self {
            path: path.into(),
            content,
            truncated,
        }
    }
}

/// Cut `content` to at most `max_chars` characters, appending
/// [`TRUNCATION_MARKER`] when anything was removed.
pub fn truncate_content(mut content: String, max_chars: usize) -> (String, bool) {
    match content.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => {
            content.truncate(byte_idx);
            content.push_str(TRUNCATION_MARKER);
            (content, true)
        }
        None => (content, false),
    }
}

/// Repository metadata returned alongside the tree.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RepoInfo {
    pub description: Option<String>,
    #[serde(default)]
    pub stargazers_count: u64,
    #[serde(default)]
    pub forks_count: u64,
    #[serde(default)]
    pub open_issues_count: u64,
    pub updated_at: Option<String>,
    pub language: Option<String>,
    pub default_branch: Option<String>,
}

/// A file named by a caller: a path, optionally with the blob SHA and size
/// taken from an earlier tree listing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct FileRequest {
    pub path: String,
    #[serde(default)]
    pub sha: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
}

impl FileRequest {
    pub fn path(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            sha: None,
            size: None,
        }
    }
}

impl From<&FileRef> for FileRequest {
    fn from(file: &FileRef) -> Self {
        Self {
            path: file.path.clone(),
            sha: Some(file.sha.clone()),
            size: Some(file.size),
        }
    }
}
