//! Chat prompt assembly.
//!
//! Builds the message list for a streamed answer: one system prompt that
//! embeds the repository context, the tail of the conversation history, and
//! the question.

use serde::{Deserialize, Serialize};

use crate::completion::{ChatMessage, CompletionOptions};
use crate::error::{AnalyzerError, Result};

/// Sampling options for streamed answers.
pub const CHAT_OPTIONS: CompletionOptions = CompletionOptions {
    max_tokens: 4096,
    temperature: 0.7,
};

/// Repository the conversation is about.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRepoInfo {
    #[serde(default)]
    pub owner: String,
    #[serde(default)]
    pub repo: String,
}

/// One earlier turn. `model` turns become assistant messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryMessage {
    pub role: String,
    pub content: String,
}

/// Public profile of the repository owner.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerProfile {
    #[serde(default)]
    pub login: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
}

/// Body of `POST /api/code-analyzer/chat`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub context: String,
    #[serde(default)]
    pub repo_info: Option<ChatRepoInfo>,
    #[serde(default)]
    pub history: Vec<HistoryMessage>,
    #[serde(default)]
    pub owner_profile: Option<OwnerProfile>,
}

impl ChatRequest {
    /// Reject requests missing the question or the context.
    pub fn validate(&self) -> Result<()> {
        if self.question.trim().is_empty() || self.context.trim().is_empty() {
            return Err(AnalyzerError::BadRequest(
                "Missing question or context".to_string(),
            ));
        }
        Ok(())
    }
}

const GUIDELINES: &str = "Guidelines:
- Answer questions about the code structure, architecture, and implementation
- When showing code flows or architecture, use Mermaid diagrams with ```mermaid code blocks
- Be concise but thorough
- Reference specific files when relevant using the format [filename](#preview-path/to/file)
- For tables, use standard markdown table syntax
- If asked about security, analyze patterns carefully
- When showing developer info, use the developer-card format:
  :::developer-card
  username: username
  name: Full Name
  bio: Bio text
  location: Location
  :::
- When showing repo info, use the repo-card format:
  :::repo-card
  owner: owner
  name: repo
  description: Description
  stars: 1234
  forks: 567
  language: JavaScript
  :::";

fn owner_line(profile: &OwnerProfile) -> Option<String> {
    let who = profile
        .name
        .as_deref()
        .filter(|n| !n.is_empty())
        .or(profile.login.as_deref())?;
    Some(format!(
        "**Owner**: {} - {}",
        who,
        profile.bio.as_deref().unwrap_or("")
    ))
}

/// System prompt naming the repository and embedding the code context.
pub fn system_prompt(
    repo: Option<&ChatRepoInfo>,
    owner: Option<&OwnerProfile>,
    context: &str,
) -> String {
    let repo = repo.cloned().unwrap_or_default();
    let mut prompt = format!(
        "You are a helpful AI assistant that analyzes GitHub repositories. \
         You have access to the following repository context:\n\n\
         **Repository**: {}/{}\n\n",
        repo.owner, repo.repo
    );
    if let Some(line) = owner.and_then(owner_line) {
        prompt.push_str(&line);
        prompt.push_str("\n\n");
    }
    prompt.push_str("**Code Context**:\n");
    prompt.push_str(context);
    prompt.push_str("\n\n");
    prompt.push_str(GUIDELINES);
    prompt
}

/// Map a history turn to a completion message. Anything but `model` is
/// treated as the user.
fn history_message(turn: &HistoryMessage) -> ChatMessage {
    if turn.role == "model" {
        ChatMessage::assistant(turn.content.clone())
    } else {
        ChatMessage::user(turn.content.clone())
    }
}

/// Full message list: system prompt, last `max_history` turns, question.
pub fn build_messages(request: &ChatRequest, max_history: usize) -> Vec<ChatMessage> {
    let skip = request.history.len().saturating_sub(max_history);

    let mut messages = Vec::with_capacity(max_history + 2);
    messages.push(ChatMessage::system(system_prompt(
        request.repo_info.as_ref(),
        request.owner_profile.as_ref(),
        &request.context,
    )));
    messages.extend(request.history.iter().skip(skip).map(history_message));
    messages.push(ChatMessage::user(request.question.clone()));
    messages
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> ChatRequest {
        ChatRequest {
            question: "How does routing work?".into(),
            context: "### File: src/app.js\n```\nrouter()\n```".into(),
            repo_info: Some(ChatRepoInfo {
                owner: "acme".into(),
                repo: "web".into(),
            }),
            ..ChatRequest::default()
        }
    }

    #[test]
    fn test_validate_requires_question_and_context() {
        assert!(request().validate().is_ok());

        let mut missing = request();
        missing.context.clear();
        assert!(matches!(
            missing.validate(),
            Err(AnalyzerError::BadRequest(_))
        ));
    }

    #[test]
    fn test_system_prompt_embeds_repo_and_context() {
        let req = request();
        let prompt = system_prompt(req.repo_info.as_ref(), None, &req.context);
        assert!(prompt.contains("**Repository**: acme/web"));
        assert!(prompt.contains("router()"));
        assert!(prompt.contains("#preview-path/to/file"));
        assert!(!prompt.contains("**Owner**"));
    }

    #[test]
    fn test_owner_line_prefers_name() {
        let owner = OwnerProfile {
            login: Some("jdoe".into()),
            name: Some("Jane Doe".into()),
            bio: Some("Builds things".into()),
        };
        let prompt = system_prompt(None, Some(&owner), "ctx");
        assert!(prompt.contains("**Owner**: Jane Doe - Builds things"));

        let login_only = OwnerProfile {
            login: Some("jdoe".into()),
            ..OwnerProfile::default()
        };
        let prompt = system_prompt(None, Some(&login_only), "ctx");
        assert!(prompt.contains("**Owner**: jdoe - "));
    }

    #[test]
    fn test_history_is_tail_limited_and_roles_mapped() {
        let mut req = request();
        req.history = (0..14)
            .map(|i| HistoryMessage {
                role: if i % 2 == 0 { "user".into() } else { "model".into() },
                content: format!("turn {}", i),
            })
            .collect();

        let messages = build_messages(&req, 10);
        assert_eq!(messages.len(), 12);
        assert_eq!(messages[0].role, "system");
        assert_eq!(messages[1].content, "turn 4");
        assert_eq!(messages[1].role, "user");
        assert_eq!(messages[2].role, "assistant");
        assert_eq!(messages[11], ChatMessage::user("How does routing work?"));
    }

    #[test]
    fn test_request_uses_camel_case() {
        let req: ChatRequest = serde_json::from_str(
            r#"{"question":"q","context":"c","repoInfo":{"owner":"o","repo":"r"},
                "ownerProfile":{"login":"o"},"history":[{"role":"model","content":"hi"}]}"#,
        )
        .unwrap();
        assert_eq!(req.repo_info.unwrap().repo, "r");
        assert_eq!(req.owner_profile.unwrap().login.as_deref(), Some("o"));
        assert_eq!(req.history.len(), 1);
    }
}
