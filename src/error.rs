//! Error taxonomy shared by every pipeline stage.
//!
//! Required top-level steps surface these to the caller (the HTTP layer maps
//! each variant to a status code in [`crate::server`]). Best-effort steps
//! return them too, and the caller decides to fall back; see
//! [`crate::relevance::select_relevant`] and [`crate::fetch::fetch_files`].

use thiserror::Error;

/// Errors produced by the analysis pipeline.
#[derive(Error, Debug)]
pub enum AnalyzerError {
    /// A required request field is missing or malformed.
    #[error("{0}")]
    BadRequest(String),

    /// The repository or resource does not exist on the code host.
    #[error("{0}")]
    NotFound(String),

    /// Non-2xx response from the code host or completion backend.
    #[error("upstream returned {status}: {message}")]
    Upstream { status: u16, message: String },

    /// Model output that could not be parsed into the expected shape.
    #[error("could not parse model output: {0}")]
    Parse(String),

    /// A mandatory collaborator (e.g. the completion backend) is absent.
    #[error("{0} not configured")]
    NotConfigured(&'static str),

    /// Network-level failure talking to an upstream.
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// Upstream body that could not be decoded into text.
    #[error("could not decode content: {0}")]
    Decode(String),
}

impl AnalyzerError {
    /// Message suitable for showing to the caller.
    ///
    /// Upstream errors are reduced to the upstream's own message, which is
    /// what the chat stream forwards in its `{error}` event.
    pub fn caller_message(&self) -> String {
        match self {
            AnalyzerError::Upstream { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

impl From<serde_json::Error> for AnalyzerError {
    fn from(err: serde_json::Error) -> Self {
        AnalyzerError::Parse(err.to_string())
    }
}

/// Result alias used across the library.
pub type Result<T, E = AnalyzerError> = std::result::Result<T, E>;
