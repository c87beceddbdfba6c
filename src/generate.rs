//! Artifact generation: documentation, tests or refactoring notes for one
//! file. Requires a completion backend.

use serde::{Deserialize, Serialize};

use crate::completion::{ChatMessage, CompletionBackend, CompletionOptions};
use crate::config::LimitsConfig;
use crate::error::{AnalyzerError, Result};
use crate::github::RepoHost;
use crate::quality::load_source;

const GENERATE_OPTIONS: CompletionOptions = CompletionOptions {
    max_tokens: 4000,
    temperature: 0.3,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Doc,
    Test,
    Refactor,
}

impl ArtifactKind {
    pub fn system_prompt(self) -> &'static str {
        match self {
            ArtifactKind::Doc => {
                "Generate comprehensive JSDoc/TSDoc documentation for all functions, classes, \
                 and exports in this code. Include parameter types, return types, and \
                 descriptions. Return ONLY the documented code."
            }
            ArtifactKind::Test => {
                "Generate comprehensive unit tests for this code using Jest. Include tests for \
                 all exported functions and edge cases. Return ONLY the test file code."
            }
            ArtifactKind::Refactor => {
                "Analyze this code and provide specific refactoring suggestions with examples. \
                 Focus on: code organization, naming, error handling, performance, and best \
                 practices. Be specific and actionable."
            }
        }
    }
}

/// Body of `POST /api/code-analyzer/generate`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    #[serde(default)]
    pub owner: String,
    #[serde(default)]
    pub repo: String,
    #[serde(default)]
    pub file_path: String,
    #[serde(default, rename = "type")]
    pub kind: Option<ArtifactKind>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Artifact {
    pub artifact: String,
}

/// Generate one artifact.
///
/// Parameters and backend presence are checked before anything is fetched.
pub async fn generate_artifact(
    host: &dyn RepoHost,
    backend: Option<&dyn CompletionBackend>,
    request: &GenerateRequest,
    limits: &LimitsConfig,
) -> Result<Artifact> {
    let kind = match request.kind {
        Some(kind) if !request.owner.is_empty() && !request.repo.is_empty() && !request.file_path.is_empty() => kind,
        _ => {
            return Err(AnalyzerError::BadRequest(
                "Missing required parameters".to_string(),
            ))
        }
    };
    let backend = backend.ok_or(AnalyzerError::NotConfigured("AI service"))?;

    let content = load_source(
        host,
        &request.owner,
        &request.repo,
        &request.file_path,
        limits.max_artifact_words,
    )
    .await?;

    let messages = vec![
        ChatMessage::system(kind.system_prompt()),
        ChatMessage::user(format!("File: {}\n\n{}", request.file_path, content)),
    ];
    let artifact = backend.complete(messages, GENERATE_OPTIONS).await?;
    tracing::info!(path = %request.file_path, kind = ?kind, chars = artifact.len(), "artifact generated");
    Ok(Artifact { artifact })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::testing::ScriptedBackend;
    use crate::fetch::testing::MemoryHost;

    fn request(kind: Option<ArtifactKind>) -> GenerateRequest {
        GenerateRequest {
            owner: "o".into(),
            repo: "r".into(),
            file_path: "src/math.js".into(),
            kind,
        }
    }

    #[tokio::test]
    async fn test_generates_tests() {
        let host = MemoryHost::with_files(&[("src/math.js", "export const add = (a, b) => a + b;")]);
        let backend = ScriptedBackend::replying("test('add', () => {});");

        let out = generate_artifact(
            &host,
            Some(&backend),
            &request(Some(ArtifactKind::Test)),
            &LimitsConfig::default(),
        )
        .await
        .unwrap();

        assert_eq!(out.artifact, "test('add', () => {});");
        let (messages, options) = backend.last_call().unwrap();
        assert_eq!(options, GENERATE_OPTIONS);
        assert!(messages[0].content.contains("Jest"));
        assert!(messages[1].content.starts_with("File: src/math.js\n\nexport const add"));
    }

    #[tokio::test]
    async fn test_requires_backend_before_fetching() {
        let host = MemoryHost::with_files(&[("src/math.js", "x")]);
        let err = generate_artifact(
            &host,
            None,
            &request(Some(ArtifactKind::Doc)),
            &LimitsConfig::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AnalyzerError::NotConfigured(_)));
        assert_eq!(host.fetch_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_kind_is_bad_request() {
        let host = MemoryHost::default();
        let backend = ScriptedBackend::replying("x");
        let err = generate_artifact(&host, Some(&backend), &request(None), &LimitsConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AnalyzerError::BadRequest(_)));
        assert_eq!(backend.call_count(), 0);
    }

    #[test]
    fn test_kind_parsing() {
        let req: GenerateRequest =
            serde_json::from_str(r#"{"owner":"o","repo":"r","filePath":"a.py","type":"refactor"}"#)
                .unwrap();
        assert_eq!(req.kind, Some(ArtifactKind::Refactor));
        assert!(serde_json::from_str::<GenerateRequest>(r#"{"type":"poem"}"#).is_err());
    }
}
