//! End-to-end question answering.
//!
//! ```text
//! list_tree ──► select_relevant ──► fetch_files ──► assemble_context
//!                                                        │
//!                    caller ◄── relay ◄── backend.stream ◄┘
//! ```
//!
//! Everything up to the upstream stream start is awaited; the answer itself
//! is returned as a lazy event stream.

use futures::stream::{BoxStream, StreamExt};

use crate::chat::{build_messages, ChatRepoInfo, ChatRequest, CHAT_OPTIONS};
use crate::completion::{ChatMessage, CompletionBackend};
use crate::config::LimitsConfig;
use crate::context::assemble_context;
use crate::error::{AnalyzerError, Result};
use crate::fetch::{fetch_files, FetchTarget, SkippedFile};
use crate::github::RepoHost;
use crate::relay;
use crate::relevance::{select_relevant, RelevanceRequest, RelevanceResult};
use crate::sse::StreamEvent;

/// A started answer.
pub struct Answer {
    pub selection: RelevanceResult,
    pub files_loaded: usize,
    pub skipped: Vec<SkippedFile>,
    pub events: BoxStream<'static, StreamEvent>,
}

/// Start a streamed completion and relay it.
///
/// Never fails: an upstream that refuses to start yields the error event
/// followed by `Done`.
pub async fn stream_answer(
    backend: &dyn CompletionBackend,
    messages: Vec<ChatMessage>,
) -> BoxStream<'static, StreamEvent> {
    match backend.stream(messages, CHAT_OPTIONS).await {
        Ok(upstream) => relay::relay(upstream).boxed(),
        Err(err) => {
            tracing::warn!(error = %err, "completion stream failed to start");
            relay::failure(err.caller_message())
        }
    }
}

/// Answer `question` about `owner/repo`.
///
/// Fails only on required steps: a missing backend, or a tree listing the
/// host refuses. Selection and fetch degrade instead of failing.
pub async fn answer_question(
    host: &dyn RepoHost,
    backend: Option<&dyn CompletionBackend>,
    owner: &str,
    repo: &str,
    question: &str,
    limits: &LimitsConfig,
) -> Result<Answer> {
    let backend = backend.ok_or(AnalyzerError::NotConfigured("AI service"))?;

    let tree = host.list_tree(owner, repo).await?;
    let request = RelevanceRequest {
        question: question.to_string(),
        available_paths: tree.iter().map(|f| f.path.clone()).collect(),
    };
    let selection = select_relevant(&request, Some(backend), limits).await;
    tracing::info!(
        owner,
        repo,
        selected = selection.selected_paths.len(),
        source = ?selection.source,
        "selected files"
    );

    let targets: Vec<FetchTarget> = selection
        .selected_paths
        .iter()
        .filter_map(|path| tree.iter().find(|f| &f.path == path))
        .map(|f| FetchTarget::Blob(f.clone()))
        .collect();
    let outcome = fetch_files(
        host,
        owner,
        repo,
        &targets,
        limits.max_fetched_files,
        limits.fetch_concurrency,
    )
    .await;

    let chat = ChatRequest {
        question: question.to_string(),
        context: assemble_context(&outcome.files),
        repo_info: Some(ChatRepoInfo {
            owner: owner.to_string(),
            repo: repo.to_string(),
        }),
        ..ChatRequest::default()
    };
    let messages = build_messages(&chat, limits.max_history_messages);
    let events = stream_answer(backend, messages).await;

    Ok(Answer {
        selection,
        files_loaded: outcome.files.len(),
        skipped: outcome.skipped,
        events,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::testing::ScriptedBackend;
    use crate::fetch::testing::MemoryHost;
    use crate::relevance::SelectionSource;

    fn host() -> MemoryHost {
        MemoryHost::with_files(&[
            ("README.md", "# Demo"),
            ("src/server.js", "app.listen(3000)"),
            ("src/routes.js", "router.get('/')"),
            ("logo.png", "binary"),
        ])
    }

    #[tokio::test]
    async fn test_answer_streams_relayed_events() {
        let host = host();
        let backend = ScriptedBackend::streaming(&[
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\ndata: [DONE]\n\n",
        ]);

        let answer = answer_question(
            &host,
            Some(&backend),
            "acme",
            "demo",
            "How is the server started?",
            &LimitsConfig::default(),
        )
        .await
        .unwrap();

        assert_eq!(answer.selection.source, SelectionSource::Heuristic);
        assert_eq!(answer.selection.selected_paths[0], "README.md");
        assert_eq!(answer.files_loaded, answer.selection.selected_paths.len());
        assert!(answer.skipped.is_empty());

        let events: Vec<StreamEvent> = answer.events.collect().await;
        assert_eq!(
            events,
            vec![
                StreamEvent::Content("Hel".into()),
                StreamEvent::Content("lo".into()),
                StreamEvent::Done,
            ]
        );

        let (messages, options) = backend.last_call().unwrap();
        assert_eq!(options, CHAT_OPTIONS);
        assert!(messages[0].content.contains("### File: README.md"));
        assert!(messages[0].content.contains("**Repository**: acme/demo"));
        assert!(!messages[0].content.contains("logo.png"));
    }

    #[tokio::test]
    async fn test_upstream_refusal_becomes_error_then_done() {
        let host = host();
        let backend = ScriptedBackend::default();

        let answer = answer_question(
            &host,
            Some(&backend),
            "acme",
            "demo",
            "what is this?",
            &LimitsConfig::default(),
        )
        .await
        .unwrap();

        let events: Vec<StreamEvent> = answer.events.collect().await;
        assert_eq!(
            events,
            vec![
                StreamEvent::Error("Rate limit reached".into()),
                StreamEvent::Done
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_backend_is_not_configured() {
        let host = host();
        let result = answer_question(
            &host,
            None,
            "acme",
            "demo",
            "q",
            &LimitsConfig::default(),
        )
        .await;
        assert!(matches!(result, Err(AnalyzerError::NotConfigured(_))));
        assert_eq!(host.fetch_count(), 0);
    }
}
