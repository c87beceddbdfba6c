//! Remote repository client.
//!
//! Wraps the code host's REST API: repository metadata, a recursive tree
//! listing, blob-by-SHA retrieval and content-by-path retrieval.
//!
//! # Round Trips
//!
//! [`RepoHost::list_tree`] issues a single recursive tree request against
//! `HEAD`, so listing cost is one round trip regardless of repository size or
//! directory depth. The host resolves `HEAD` to the default branch.
//!
//! # Authentication
//!
//! Every request carries `Accept: application/vnd.github.v3+json` and a fixed
//! `User-Agent`. A bearer token is attached when one is configured; without
//! it requests go out unauthenticated and are subject to the host's stricter
//! anonymous rate limits.
//!
//! # Content Decoding
//!
//! Base64 bodies (the host wraps them at 60 columns) are decoded after
//! stripping whitespace and converted to text lossily. Content longer than
//! the configured character cap is truncated with a visible marker, see
//! [`FetchedFile::new`].

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

use crate::config::GitHubConfig;
use crate::error::{AnalyzerError, Result};
use crate::models::{FetchedFile, FileRef, RepoInfo};

/// Read access to a remote code host.
///
/// Implemented by [`GitHubClient`]; tests substitute in-memory hosts.
#[async_trait]
pub trait RepoHost: Send + Sync {
    /// Repository metadata. `NotFound` when the repository does not exist.
    async fn repo_info(&self, owner: &str, repo: &str) -> Result<RepoInfo>;

    /// Every blob in the default branch, in one round trip.
    async fn list_tree(&self, owner: &str, repo: &str) -> Result<Vec<FileRef>>;

    /// Content of a blob identified by its SHA.
    async fn get_blob(&self, owner: &str, repo: &str, file: &FileRef) -> Result<FetchedFile>;

    /// Content of a file identified by path, for when the SHA is unknown.
    async fn get_file_content(&self, owner: &str, repo: &str, path: &str) -> Result<FetchedFile>;
}

/// [`RepoHost`] backed by the GitHub REST API (or a compatible server).
pub struct GitHubClient {
    http: reqwest::Client,
    api_base: Url,
    max_file_chars: usize,
}

#[derive(Deserialize)]
struct TreeResponse {
    #[serde(default)]
    tree: Vec<TreeEntry>,
    #[serde(default)]
    truncated: bool,
}

#[derive(Deserialize)]
struct TreeEntry {
    path: String,
    #[serde(rename = "type")]
    kind: String,
    sha: String,
    #[serde(default)]
    size: Option<u64>,
}

#[derive(Deserialize)]
struct BlobResponse {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    encoding: Option<String>,
}

#[derive(Deserialize)]
struct HostMessage {
    message: Option<String>,
}

impl GitHubClient {
    /// Build a client from configuration and an optional bearer token.
    pub fn new(config: &GitHubConfig, token: Option<&str>, max_file_chars: usize) -> Result<Self> {
        let api_base = Url::parse(config.api_base.trim_end_matches('/')).map_err(|e| {
            AnalyzerError::BadRequest(format!("invalid github.api_base '{}': {}", config.api_base, e))
        })?;

        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github.v3+json"),
        );
        if let Some(token) = token {
            let mut value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|_| AnalyzerError::BadRequest("invalid code host token".to_string()))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        } else {
            tracing::debug!("no code host token configured, requests are unauthenticated");
        }

        let http = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            api_base,
            max_file_chars,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.api_base.clone();
        url.path_segments_mut()
            .map_err(|_| AnalyzerError::BadRequest("github.api_base cannot be a base URL".into()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url, what: &str) -> Result<T> {
        let response = self.http.get(url).send().await?;
        let status = response.status();

        if status.is_success() {
            return Ok(response.json::<T>().await?);
        }

        let message = response
            .json::<HostMessage>()
            .await
            .ok()
            .and_then(|m| m.message)
            .unwrap_or_else(|| format!("Failed to fetch {}", what));

        if status == StatusCode::NOT_FOUND {
            Err(AnalyzerError::NotFound(message))
        } else {
            Err(AnalyzerError::Upstream {
                status: status.as_u16(),
                message,
            })
        }
    }
}

#[async_trait]
impl RepoHost for GitHubClient {
    async fn repo_info(&self, owner: &str, repo: &str) -> Result<RepoInfo> {
        let url = self.endpoint(&["repos", owner, repo])?;
        self.get_json(url, "repository").await
    }

    async fn list_tree(&self, owner: &str, repo: &str) -> Result<Vec<FileRef>> {
        let mut url = self.endpoint(&["repos", owner, repo, "git", "trees", "HEAD"])?;
        url.query_pairs_mut().append_pair("recursive", "1");

        let listing: TreeResponse = self.get_json(url, "repository tree").await?;
        if listing.truncated {
            tracing::warn!(owner, repo, "tree listing truncated by host");
        }

        let files: Vec<FileRef> = listing
            .tree
            .into_iter()
            .filter(|entry| entry.kind == "blob")
            .map(|entry| FileRef {
                path: entry.path,
                sha: entry.sha,
                size: entry.size.unwrap_or(0),
            })
            .collect();

        tracing::debug!(owner, repo, files = files.len(), "listed repository tree");
        Ok(files)
    }

    async fn get_blob(&self, owner: &str, repo: &str, file: &FileRef) -> Result<FetchedFile> {
        let url = self.endpoint(&["repos", owner, repo, "git", "blobs", &file.sha])?;
        let blob: BlobResponse = self.get_json(url, "blob").await?;
        let raw = blob
            .content
            .ok_or_else(|| AnalyzerError::Decode(format!("no content for {}", file.path)))?;
        let content = decode_content(&raw, blob.encoding.as_deref())?;
        Ok(FetchedFile::new(&file.path, content, self.max_file_chars))
    }

    async fn get_file_content(&self, owner: &str, repo: &str, path: &str) -> Result<FetchedFile> {
        let mut segments = vec!["repos", owner, repo, "contents"];
        segments.extend(path.split('/').filter(|s| !s.is_empty()));
        let url = self.endpoint(&segments)?;

        // Directories come back as arrays; only a single file object has content.
        let value: serde_json::Value = self.get_json(url, "file").await?;
        if !value.is_object() {
            return Err(AnalyzerError::Decode(format!("{} is not a file", path)));
        }
        let body: BlobResponse = serde_json::from_value(value)?;
        let raw = body
            .content
            .filter(|c| !c.is_empty())
            .ok_or_else(|| AnalyzerError::Decode(format!("no content available for {}", path)))?;
        let content = decode_content(&raw, body.encoding.as_deref())?;
        Ok(FetchedFile::new(path, content, self.max_file_chars))
    }
}

/// Decode an upstream content field into text.
pub fn decode_content(content: &str, encoding: Option<&str>) -> Result<String> {
    match encoding {
        Some(enc) if enc.eq_ignore_ascii_case("base64") => {
            let compact: String = content
                .chars()
                .filter(|c| !c.is_ascii_whitespace())
                .collect();
            let bytes = STANDARD
                .decode(compact)
                .map_err(|e| AnalyzerError::Decode(e.to_string()))?;
            Ok(String::from_utf8_lossy(&bytes).into_owned())
        }
        _ => Ok(content.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(api_base: &str) -> GitHubClient {
        let config = GitHubConfig {
            api_base: api_base.to_string(),
            ..GitHubConfig::default()
        };
        GitHubClient::new(&config, None, 50_000).unwrap()
    }

    #[test]
    fn test_decode_wrapped_base64() {
        // "fn main() {}\n" wrapped the way the host wraps long payloads
        let decoded = decode_content("Zm4gbWFp\nbigpIHt9\nCg==\n", Some("base64")).unwrap();
        assert_eq!(decoded, "fn main() {}\n");
    }

    #[test]
    fn test_decode_plain_passthrough() {
        assert_eq!(decode_content("plain", Some("utf-8")).unwrap(), "plain");
        assert_eq!(decode_content("plain", None).unwrap(), "plain");
    }

    #[test]
    fn test_decode_invalid_base64() {
        let err = decode_content("!!!", Some("base64")).unwrap_err();
        assert!(matches!(err, AnalyzerError::Decode(_)));
    }

    #[test]
    fn test_decode_invalid_utf8_is_lossy() {
        // 0xFF is never valid UTF-8
        let decoded = decode_content("/w==", Some("base64")).unwrap();
        assert_eq!(decoded, "\u{FFFD}");
    }

    #[test]
    fn test_endpoint_encodes_segments() {
        let c = client("https://api.github.com/");
        let url = c
            .endpoint(&["repos", "acme", "widgets", "contents", "docs", "a b.md"])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.github.com/repos/acme/widgets/contents/docs/a%20b.md"
        );
    }

    #[test]
    fn test_endpoint_keeps_base_path() {
        let c = client("https://ghe.example.com/api/v3");
        let url = c.endpoint(&["repos", "o", "r"]).unwrap();
        assert_eq!(url.as_str(), "https://ghe.example.com/api/v3/repos/o/r");
    }

    #[test]
    fn test_invalid_base_rejected() {
        let config = GitHubConfig {
            api_base: "not a url".to_string(),
            ..GitHubConfig::default()
        };
        assert!(GitHubClient::new(&config, None, 10).is_err());
    }
}
