//! HTTP surface.
//!
//! One JSON endpoint per pipeline stage, all `POST` under
//! `/api/code-analyzer/`. Any other method gets a JSON 405.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/api/code-analyzer/analyze` | Relevance selection |
//! | `POST` | `/api/code-analyzer/fetch` | Tree listing and/or file context |
//! | `POST` | `/api/code-analyzer/chat` | Streamed answer (event stream) |
//! | `POST` | `/api/code-analyzer/scan` | Security scan |
//! | `POST` | `/api/code-analyzer/search` | Text / regex / definition search |
//! | `POST` | `/api/code-analyzer/quality` | Single-file quality report |
//! | `POST` | `/api/code-analyzer/generate` | Docs / tests / refactoring notes |
//! | `POST` | `/api/code-analyzer/fix-diagram` | AI diagram repair |
//! | `POST` | `/api/code-analyzer/diagram` | Diagram sanitize + validate |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": "Missing owner or repo", "code": "bad_request" }
//! ```
//!
//! Codes: `bad_request` (400), `not_found` (404), `method_not_allowed` (405),
//! `upstream_error` (upstream status or 502), `not_configured` (503),
//! `internal` (500).
//!
//! The chat endpoint validates its body before streaming; once the stream
//! has started, failures are delivered in-band as `{error}` then `[DONE]`.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted for browser clients.

use axum::{
    body::Body,
    extract::{rejection::JsonRejection, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, MethodRouter},
    Json, Router,
};
use futures::stream::StreamExt;
use globset::GlobSet;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::chat::{build_messages, ChatRequest};
use crate::completion::{CompletionBackend, OpenAiClient};
use crate::config::{build_globset, Config, Credentials};
use crate::context::assemble_context;
use crate::diagram::{self, DiagramRequest, FixRequest, FixResponse};
use crate::error::AnalyzerError;
use crate::fetch::{fetch_files, resolve_targets, SkippedFile};
use crate::generate::{generate_artifact, GenerateRequest};
use crate::github::{GitHubClient, RepoHost};
use crate::models::{FileRef, FileRequest, RepoInfo};
use crate::patterns::PATTERNS;
use crate::pipeline::stream_answer;
use crate::quality::{analyze_quality, QualityRequest};
use crate::relevance::{select_relevant, RelevanceRequest, SelectionSource};
use crate::scan::{scan_repository, ScanRequest};
use crate::search::{search_repository, SearchRequest};

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    host: Arc<dyn RepoHost>,
    /// Absent when no API key is configured.
    completion: Option<Arc<dyn CompletionBackend>>,
    scan_globs: Arc<GlobSet>,
    search_globs: Arc<GlobSet>,
}

impl AppState {
    pub fn new(
        config: Config,
        host: Arc<dyn RepoHost>,
        completion: Option<Arc<dyn CompletionBackend>>,
    ) -> anyhow::Result<Self> {
        let scan_globs = build_globset(&config.scan.include_globs)?;
        let search_globs = build_globset(&config.search.include_globs)?;
        Ok(Self {
            config: Arc::new(config),
            host,
            completion,
            scan_globs: Arc::new(scan_globs),
            search_globs: Arc::new(search_globs),
        })
    }

    fn backend(&self) -> Option<&dyn CompletionBackend> {
        self.completion.as_deref()
    }
}

/// Starts the HTTP server on `[server].bind`.
///
/// Credentials come from the environment variables named in the config. The
/// server runs without a completion backend when no API key is set.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let credentials = Credentials::from_env(config);
    let host = GitHubClient::new(
        &config.github,
        credentials.github_token.as_deref(),
        config.limits.max_file_chars,
    )?;
    let completion: Option<Arc<dyn CompletionBackend>> = match &credentials.completion_api_key {
        Some(key) => Some(Arc::new(OpenAiClient::new(&config.completion, key.clone())?)),
        None => {
            tracing::warn!(
                env = %config.completion.api_key_env,
                "no completion API key, AI features disabled"
            );
            None
        }
    };

    let bind_addr = config.server.bind.clone();
    let state = AppState::new(config.clone(), Arc::new(host), completion)?;
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, "listening");
    axum::serve(listener, app).await?;

    Ok(())
}

/// Build the router. Exposed so tests can serve it on an ephemeral port.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api = Router::new()
        .route("/analyze", post_only(post(handle_analyze)))
        .route("/fetch", post_only(post(handle_fetch)))
        .route("/chat", post_only(post(handle_chat)))
        .route("/scan", post_only(post(handle_scan)))
        .route("/search", post_only(post(handle_search)))
        .route("/quality", post_only(post(handle_quality)))
        .route("/generate", post_only(post(handle_generate)))
        .route("/fix-diagram", post_only(post(handle_fix_diagram)))
        .route("/diagram", post_only(post(handle_diagram)));

    Router::new()
        .nest("/api/code-analyzer", api)
        .route("/health", get(handle_health))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn post_only(route: MethodRouter<AppState>) -> MethodRouter<AppState> {
    route.fallback(method_not_allowed)
}

// ============ Error response ============

/// Internal error type that converts into an Axum HTTP response.
#[derive(Debug)]
struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl AppError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(status = %self.status, code = self.code, error = %self.message, "request failed");
        } else {
            tracing::info!(status = %self.status, code = self.code, error = %self.message, "request rejected");
        }
        let body = json!({ "error": self.message, "code": self.code });
        (self.status, Json(body)).into_response()
    }
}

impl From<AnalyzerError> for AppError {
    fn from(err: AnalyzerError) -> Self {
        let message = err.caller_message();
        match err {
            AnalyzerError::BadRequest(_) => AppError::new(StatusCode::BAD_REQUEST, "bad_request", message),
            AnalyzerError::NotFound(_) => AppError::new(StatusCode::NOT_FOUND, "not_found", message),
            AnalyzerError::Upstream { status, .. } => {
                let status = StatusCode::from_u16(status)
                    .ok()
                    .filter(|s| s.is_client_error() || s.is_server_error())
                    .unwrap_or(StatusCode::BAD_GATEWAY);
                AppError::new(status, "upstream_error", message)
            }
            AnalyzerError::NotConfigured(_) => {
                AppError::new(StatusCode::SERVICE_UNAVAILABLE, "not_configured", message)
            }
            AnalyzerError::Transport(_) | AnalyzerError::Decode(_) => {
                AppError::new(StatusCode::BAD_GATEWAY, "upstream_error", message)
            }
            AnalyzerError::Parse(_) => AppError::new(StatusCode::INTERNAL_SERVER_ERROR, "internal", message),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::new(StatusCode::BAD_REQUEST, "bad_request", rejection.body_text())
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError::new(StatusCode::BAD_REQUEST, "bad_request", message)
}

async fn method_not_allowed() -> AppError {
    AppError::new(
        StatusCode::METHOD_NOT_ALLOWED,
        "method_not_allowed",
        "Method not allowed",
    )
}

type ApiResult<T> = Result<Json<T>, AppError>;

// ============ GET /health ============

/// JSON response body for `GET /health`.
#[derive(Serialize)]
struct HealthResponse {
    /// Always `"ok"` when the server is running.
    status: String,
    /// The crate version from `Cargo.toml`.
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /analyze ============

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnalyzeRequest {
    #[serde(default)]
    question: String,
    #[serde(default)]
    file_paths: Option<Vec<String>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AnalyzeResponse {
    relevant_files: Vec<String>,
    file_count: usize,
    source: SelectionSource,
}

async fn handle_analyze(
    State(state): State<AppState>,
    payload: Result<Json<AnalyzeRequest>, JsonRejection>,
) -> ApiResult<AnalyzeResponse> {
    let Json(req) = payload?;
    let available_paths = match req.file_paths {
        Some(paths) if !req.question.trim().is_empty() => paths,
        _ => return Err(bad_request("Missing question or filePaths")),
    };

    let request = RelevanceRequest {
        question: req.question,
        available_paths,
    };
    let result = select_relevant(&request, state.backend(), &state.config.limits).await;

    Ok(Json(AnalyzeResponse {
        file_count: result.selected_paths.len(),
        relevant_files: result.selected_paths,
        source: result.source,
    }))
}

// ============ POST /fetch ============

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FetchRequest {
    #[serde(default)]
    owner: String,
    #[serde(default)]
    repo: String,
    #[serde(default)]
    files: Vec<FileRequest>,
    #[serde(default)]
    fetch_tree: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FetchResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    context: Option<String>,
    tree: Vec<FileRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    files_loaded: Option<usize>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    skipped: Vec<SkippedFile>,
    repo_info: RepoInfo,
}

async fn handle_fetch(
    State(state): State<AppState>,
    payload: Result<Json<FetchRequest>, JsonRejection>,
) -> ApiResult<FetchResponse> {
    let Json(req) = payload?;
    if req.owner.is_empty() || req.repo.is_empty() {
        return Err(bad_request("Missing owner or repo"));
    }

    let repo_info = state.host.repo_info(&req.owner, &req.repo).await?;
    let tree = state.host.list_tree(&req.owner, &req.repo).await?;

    if req.fetch_tree || req.files.is_empty() {
        return Ok(Json(FetchResponse {
            context: None,
            tree,
            files_loaded: None,
            skipped: Vec::new(),
            repo_info,
        }));
    }

    let limits = &state.config.limits;
    let targets = resolve_targets(&req.files, &tree);
    let outcome = fetch_files(
        state.host.as_ref(),
        &req.owner,
        &req.repo,
        &targets,
        limits.max_fetched_files,
        limits.fetch_concurrency,
    )
    .await;

    Ok(Json(FetchResponse {
        context: Some(assemble_context(&outcome.files)),
        tree,
        files_loaded: Some(outcome.files.len()),
        skipped: outcome.skipped,
        repo_info,
    }))
}

// ============ POST /chat ============

async fn handle_chat(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(req) = payload?;
    req.validate()?;
    let backend = state
        .backend()
        .ok_or(AnalyzerError::NotConfigured("AI service"))?;

    let messages = build_messages(&req, state.config.limits.max_history_messages);
    tracing::info!(
        messages = messages.len(),
        context_chars = req.context.len(),
        "starting chat stream"
    );
    let events = stream_answer(backend, messages).await;
    let body = Body::from_stream(events.map(|event| Ok::<_, Infallible>(event.to_frame())));

    let mut response = Response::new(body);
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    Ok(response)
}

// ============ POST /scan, /search ============

async fn handle_scan(
    State(state): State<AppState>,
    payload: Result<Json<ScanRequest>, JsonRejection>,
) -> ApiResult<crate::scan::ScanReport> {
    let Json(req) = payload?;
    req.validate()?;
    let report = scan_repository(
        state.host.as_ref(),
        &req.owner,
        &req.repo,
        &req.files,
        &state.scan_globs,
        &PATTERNS,
        &state.config.limits,
    )
    .await;
    Ok(Json(report))
}

async fn handle_search(
    State(state): State<AppState>,
    payload: Result<Json<SearchRequest>, JsonRejection>,
) -> ApiResult<Vec<crate::search::SearchHit>> {
    let Json(req) = payload?;
    req.validate()?;
    let hits = search_repository(
        state.host.as_ref(),
        &req,
        &state.search_globs,
        &state.config.limits,
    )
    .await;
    Ok(Json(hits))
}

// ============ POST /quality, /generate ============

async fn handle_quality(
    State(state): State<AppState>,
    payload: Result<Json<QualityRequest>, JsonRejection>,
) -> ApiResult<crate::quality::QualityReport> {
    let Json(req) = payload?;
    req.validate()?;
    let report = analyze_quality(
        state.host.as_ref(),
        state.backend(),
        &req,
        &state.config.limits,
    )
    .await?;
    Ok(Json(report))
}

async fn handle_generate(
    State(state): State<AppState>,
    payload: Result<Json<GenerateRequest>, JsonRejection>,
) -> ApiResult<crate::generate::Artifact> {
    let Json(req) = payload?;
    let artifact = generate_artifact(
        state.host.as_ref(),
        state.backend(),
        &req,
        &state.config.limits,
    )
    .await?;
    Ok(Json(artifact))
}

// ============ POST /fix-diagram, /diagram ============

async fn handle_fix_diagram(
    State(state): State<AppState>,
    payload: Result<Json<FixRequest>, JsonRejection>,
) -> ApiResult<FixResponse> {
    let Json(req) = payload?;
    if req.code.trim().is_empty() {
        return Err(bad_request("Missing code"));
    }
    let backend = state
        .backend()
        .ok_or(AnalyzerError::NotConfigured("AI service"))?;
    let fixed = diagram::repair(backend, &req.code).await?;
    Ok(Json(FixResponse { fixed }))
}

async fn handle_diagram(
    payload: Result<Json<DiagramRequest>, JsonRejection>,
) -> ApiResult<diagram::DiagramResponse> {
    let Json(req) = payload?;
    let response = diagram::prepare(&req)?;
    if let Some(reason) = &response.validation.error {
        tracing::warn!(reason = %reason, "diagram failed validation");
    }
    Ok(Json(response))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_mapping() {
        let cases = [
            (AnalyzerError::BadRequest("x".into()), 400, "bad_request"),
            (AnalyzerError::NotFound("Not Found".into()), 404, "not_found"),
            (
                AnalyzerError::Upstream {
                    status: 403,
                    message: "rate limited".into(),
                },
                403,
                "upstream_error",
            ),
            (
                AnalyzerError::Upstream {
                    status: 302,
                    message: "moved".into(),
                },
                502,
                "upstream_error",
            ),
            (AnalyzerError::NotConfigured("AI service"), 503, "not_configured"),
            (AnalyzerError::Decode("bad".into()), 502, "upstream_error"),
            (AnalyzerError::Parse("bad".into()), 500, "internal"),
        ];
        for (err, status, code) in cases {
            let app: AppError = err.into();
            assert_eq!(app.status.as_u16(), status);
            assert_eq!(app.code, code);
        }
    }

    #[test]
    fn test_upstream_message_is_unwrapped() {
        let app: AppError = AnalyzerError::Upstream {
            status: 401,
            message: "Bad credentials".into(),
        }
        .into();
        assert_eq!(app.message, "Bad credentials");
    }
}
