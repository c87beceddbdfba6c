//! Fetch stage.
//!
//! Retrieves content for a bounded set of files. At most
//! `max_fetched_files` targets are fetched, `fetch_concurrency` at a time;
//! results are yielded in input order regardless of completion order.
//! A file that cannot be fetched is recorded in [`FetchOutcome::skipped`]
//! and logged, never surfaced as an error: the batch always succeeds with
//! whatever subset came back.

use futures::stream::{self, StreamExt};
use serde::Serialize;

use crate::github::RepoHost;
use crate::models::{FetchedFile, FileRef, FileRequest};

/// One file to fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchTarget {
    /// SHA known: fetched as a blob.
    Blob(FileRef),
    /// SHA unknown: fetched by path.
    Path(String),
}

impl FetchTarget {
    pub fn path(&self) -> &str {
        match self {
            FetchTarget::Blob(file) => &file.path,
            FetchTarget::Path(path) => path,
        }
    }
}

impl From<&FileRequest> for FetchTarget {
    fn from(req: &FileRequest) -> Self {
        match &req.sha {
            Some(sha) if !sha.is_empty() => FetchTarget::Blob(FileRef {
                path: req.path.clone(),
                sha: sha.clone(),
                size: req.size.unwrap_or(0),
            }),
            _ => FetchTarget::Path(req.path.clone()),
        }
    }
}

/// A file left out of the batch and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedFile {
    pub path: String,
    pub reason: String,
}

/// Result of one fetch batch.
#[derive(Debug, Clone, Default)]
pub struct FetchOutcome {
    pub files: Vec<FetchedFile>,
    pub skipped: Vec<SkippedFile>,
}

/// Resolve requested paths against a tree listing: paths present in the tree
/// become blob targets, the rest are fetched by path.
pub fn resolve_targets(requests: &[FileRequest], tree: &[FileRef]) -> Vec<FetchTarget> {
    requests
        .iter()
        .map(|req| match tree.iter().find(|f| f.path == req.path) {
            Some(file) => FetchTarget::Blob(file.clone()),
            None => FetchTarget::from(req),
        })
        .collect()
}

/// Fetch up to `max_files` targets with at most `concurrency` requests in
/// flight.
pub async fn fetch_files(
    host: &dyn RepoHost,
    owner: &str,
    repo: &str,
    targets: &[FetchTarget],
    max_files: usize,
    concurrency: usize,
) -> FetchOutcome {
    let results: Vec<_> = stream::iter(targets.iter().take(max_files).cloned())
        .map(move |target| async move {
            let fetched = match &target {
                FetchTarget::Blob(file) => host.get_blob(owner, repo, file).await,
                FetchTarget::Path(path) => host.get_file_content(owner, repo, path).await,
            };
            (target, fetched)
        })
        .buffered(concurrency.max(1))
        .collect()
        .await;

    let mut outcome = FetchOutcome::default();
    for (target, fetched) in results {
        match fetched {
            Ok(file) => outcome.files.push(file),
            Err(err) => {
                tracing::warn!(path = target.path(), error = %err, "skipping file");
                outcome.skipped.push(SkippedFile {
                    path: target.path().to_string(),
                    reason: err.to_string(),
                });
            }
        }
    }

    tracing::debug!(
        owner,
        repo,
        fetched = outcome.files.len(),
        skipped = outcome.skipped.len(),
        "fetch batch complete"
    );
    outcome
}


#[cfg(test)]
mod tests {
    use super::testing::MemoryHost;
    use super::*;

    fn path_targets(paths: &[String]) -> Vec<FetchTarget> {
        paths.iter().map(|p| FetchTarget::Path(p.clone())).collect()
    }

    #[tokio::test]
    async fn test_caps_at_max_files_and_keeps_order() {
        let names: Vec<String> = (0..25).map(|i| format!("src/f{:02}.rs", i)).collect();
        let files: Vec<(&str, &str)> = names.iter().map(|n| (n.as_str(), "fn x() {}")).collect();
        let host = MemoryHost::with_files(&files);

        let outcome = fetch_files(&host, "o", "r", &path_targets(&names), 20, 4).await;

        assert_eq!(host.fetch_count(), 20);
        let got: Vec<&str> = outcome.files.iter().map(|f| f.path.as_str()).collect();
        let want: Vec<&str> = names[..20].iter().map(String::as_str).collect();
        assert_eq!(got, want);
    }

    #[tokio::test]
    async fn test_partial_failure_returns_successes_in_order() {
        let host = MemoryHost::with_files(&[("a.rs", "a"), ("c.rs", "c")]);
        let targets = path_targets(&["a.rs".into(), "b.rs".into(), "c.rs".into()]);

        let outcome = fetch_files(&host, "o", "r", &targets, 20, 2).await;

        let got: Vec<&str> = outcome.files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(got, vec!["a.rs", "c.rs"]);
        assert_eq!(outcome.skipped.len(), 1);
        assert_eq!(outcome.skipped[0].path, "b.rs");
    }

    #[tokio::test]
    async fn test_order_independent_of_completion_order() {
        let mut host = MemoryHost::with_files(&[("slow.rs", "s"), ("fast.rs", "f")]);
        host.delays_ms.insert("slow.rs".into(), 50);
        let targets = path_targets(&["slow.rs".into(), "fast.rs".into()]);

        let outcome = fetch_files(&host, "o", "r", &targets, 20, 2).await;

        let got: Vec<&str> = outcome.files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(got, vec!["slow.rs", "fast.rs"]);
    }

    #[tokio::test]
    async fn test_all_failures_yield_empty_outcome() {
        let host = MemoryHost::default();
        let outcome = fetch_files(&host, "o", "r", &path_targets(&["x".into()]), 20, 4).await;
        assert!(outcome.files.is_empty());
        assert_eq!(outcome.skipped.len(), 1);
    }

    #[tokio::test]
    async fn test_fetch_runs_on_spawned_task() {
        let host: std::sync::Arc<dyn RepoHost> =
            std::sync::Arc::new(MemoryHost::with_files(&[("a.rs", "a"), ("b.rs", "b")]));
        let targets = path_targets(&["a.rs".into(), "b.rs".into()]);

        let outcome = tokio::spawn(async move {
            let owner = String::from("o");
            fetch_files(host.as_ref(), &owner, "r", &targets, 20, 2).await
        })
        .await
        .unwrap();

        let got: Vec<&str> = outcome.files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(got, vec!["a.rs", "b.rs"]);
    }

    #[test]
    fn test_resolve_targets_prefers_tree_sha() {
        let tree = vec![FileRef {
            path: "src/lib.rs".into(),
            sha: "abc".into(),
            size: 10,
        }];
        let requests = vec![FileRequest::path("src/lib.rs"), FileRequest::path("docs/x.md")];
        let targets = resolve_targets(&requests, &tree);
        assert_eq!(targets[0], FetchTarget::Blob(tree[0].clone()));
        assert_eq!(targets[1], FetchTarget::Path("docs/x.md".into()));
    }

    #[test]
    fn test_request_with_sha_becomes_blob() {
        let req = FileRequest {
            path: "a.rs".into(),
            sha: Some("s1".into()),
            size: Some(3),
        };
        match FetchTarget::from(&req) {
            FetchTarget::Blob(file) => {
                assert_eq!(file.sha, "s1");
                assert_eq!(file.size, 3);
            }
            other => panic!("expected blob target, got {:?}", other),
        }
    }
}
