//! Diagram tools for the restricted graph grammar the chat UI renders.
//!
//! - [`compile_structured`] turns a `{nodes, edges}` description into
//!   grammar text with sanitized ids and labels.
//! - [`sanitize`] normalizes grammar text. It is idempotent:
//!   `sanitize(&sanitize(x)) == sanitize(x)`.
//! - [`validate`] is advisory. It never blocks a render.
//! - [`render_with_repair`] renders through a [`DiagramRenderer`] and, only
//!   when rendering fails, asks the completion backend for a corrected
//!   source and tries once more.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

use crate::completion::{strip_code_fences, ChatMessage, CompletionBackend, CompletionOptions};
use crate::error::{AnalyzerError, Result};

const MAX_LABEL_CHARS: usize = 50;
const MAX_ID_CHARS: usize = 30;

/// Output of [`sanitize`] for empty input.
pub const EMPTY_DIAGRAM: &str = "graph TD\n    A[\"No content\"]";

/// First-line keywords of recognized diagram types.
pub const DIAGRAM_TYPES: &[&str] = &[
    "graph",
    "flowchart",
    "sequenceDiagram",
    "classDiagram",
    "stateDiagram",
    "erDiagram",
    "gantt",
    "pie",
    "gitGraph",
];

const DIRECTIONS: &[&str] = &["TD", "TB", "BT", "LR", "RL"];

const REPAIR_OPTIONS: CompletionOptions = CompletionOptions {
    max_tokens: 2000,
    temperature: 0.0,
};

const REPAIR_PROMPT: &str = "You are a Mermaid diagram expert. Fix the following Mermaid diagram \
syntax to make it valid. Return ONLY the fixed Mermaid code, no explanations or markdown code blocks.

Common fixes:
- Ensure proper graph declaration (graph TD, flowchart LR, etc.)
- Fix node syntax: A[Text] for rectangles, A(Text) for rounded, A{Text} for diamonds
- Fix edge syntax: --> for arrows, --- for lines
- Escape special characters in labels with quotes: A[\"Label with (special) chars\"]
- Ensure consistent node naming (no spaces in IDs)
- Fix subgraph syntax if present";

fn compile_regex(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|err| panic!("invalid diagram pattern {pattern}: {err}"))
}

static MARKUP: Lazy<Regex> = Lazy::new(|| compile_regex(r"<[^>]*>"));
static WHITESPACE: Lazy<Regex> = Lazy::new(|| compile_regex(r"\s+"));
static BROKEN_EDGE_LABEL: Lazy<Regex> = Lazy::new(|| compile_regex(r"-->\|([^|\n]+)\|>"));
static UNSAFE_BRACKET_LABEL: Lazy<Regex> =
    Lazy::new(|| compile_regex(r"\[([^\]\n]*[<>][^\]\n]*)\]"));
static SPACED_BRACKET_LABEL: Lazy<Regex> = Lazy::new(|| compile_regex(r#"(\w+)\[([^\]"\n]+)\]"#));

// ---------------------------------------------------------------------------
// Text sanitization
// ---------------------------------------------------------------------------

fn clean_label(text: &str) -> String {
    let text = text
        .replace(['`', '"'], "'")
        .replace(['<', '>'], "")
        .replace(['\\', '/', '\n', '\r'], " ");
    let text = WHITESPACE.replace_all(&text, " ");
    text.trim().chars().take(MAX_LABEL_CHARS).collect()
}

/// Make `text` safe inside a quoted label: no markup, no double quotes or
/// backticks, no slashes, one line, at most 50 characters.
///
/// When removing markup would leave nothing (`<x>`), only the angle
/// brackets are dropped so the text survives.
pub fn sanitize_label(text: &str) -> String {
    let stripped = clean_label(&MARKUP.replace_all(text, ""));
    if stripped.is_empty() {
        clean_label(text)
    } else {
        stripped
    }
}

/// Map `id` to `[A-Za-z0-9_]`, prefix `_` when it starts with a digit, and
/// cap it at 30 characters.
pub fn sanitize_node_id(id: &str) -> String {
    let mut out: String = id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    if out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    out.chars().take(MAX_ID_CHARS).collect()
}

// ---------------------------------------------------------------------------
// Structured form
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeShape {
    Rect,
    Rounded,
    Circle,
    Diamond,
    Database,
    Cloud,
    Hexagon,
}

impl NodeShape {
    /// Unknown names fall back to `Rect`.
    pub fn from_name(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "rounded" => NodeShape::Rounded,
            "circle" => NodeShape::Circle,
            "diamond" => NodeShape::Diamond,
            "database" => NodeShape::Database,
            "cloud" => NodeShape::Cloud,
            "hexagon" => NodeShape::Hexagon,
            _ => NodeShape::Rect,
        }
    }

    pub fn delimiters(self) -> (&'static str, &'static str) {
        match self {
            NodeShape::Rect => ("[", "]"),
            NodeShape::Rounded => ("(", ")"),
            NodeShape::Circle => ("((", "))"),
            NodeShape::Diamond => ("{", "}"),
            NodeShape::Database => ("[(", ")]"),
            NodeShape::Cloud => ("))", "(("),
            NodeShape::Hexagon => ("{{", "}}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeStyle {
    Arrow,
    Dotted,
    Thick,
    Line,
}

impl EdgeStyle {
    /// Unknown names fall back to `Arrow`.
    pub fn from_name(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "dotted" => EdgeStyle::Dotted,
            "thick" => EdgeStyle::Thick,
            "line" => EdgeStyle::Line,
            _ => EdgeStyle::Arrow,
        }
    }

    pub fn connector(self) -> &'static str {
        match self {
            EdgeStyle::Arrow => "-->",
            EdgeStyle::Dotted => "-.->",
            EdgeStyle::Thick => "==>",
            EdgeStyle::Line => "---",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSpec {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub shape: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeSpec {
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub to: String,
    #[serde(default, rename = "type")]
    pub style: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
}

/// Structured diagram description.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagramSpec {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub direction: Option<String>,
    #[serde(default)]
    pub nodes: Vec<NodeSpec>,
    #[serde(default)]
    pub edges: Vec<EdgeSpec>,
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

/// Compile a structured description into grammar text.
///
/// Deterministic: a node without an id is named `node{index}`, and edges
/// with a blank endpoint are dropped.
pub fn compile_structured(spec: &DiagramSpec) -> String {
    let mut lines = Vec::with_capacity(spec.nodes.len() + spec.edges.len() + 2);

    if let Some(title) = non_empty(spec.title.as_deref()) {
        lines.push(format!("%% {}", sanitize_label(title)));
    }

    let direction = spec
        .direction
        .as_deref()
        .map(str::to_ascii_uppercase)
        .filter(|d| DIRECTIONS.contains(&d.as_str()))
        .unwrap_or_else(|| "TD".to_string());
    lines.push(format!("graph {}", direction));

    for (index, node) in spec.nodes.iter().enumerate() {
        let raw_id = non_empty(node.id.as_deref());
        let id = raw_id
            .map(sanitize_node_id)
            .unwrap_or_else(|| format!("node{}", index));
        let label = non_empty(node.label.as_deref())
            .or(raw_id)
            .map(sanitize_label)
            .unwrap_or_else(|| id.clone());
        let (open, close) = NodeShape::from_name(node.shape.as_deref().unwrap_or("rect")).delimiters();
        lines.push(format!("  {}{}\"{}\"{}", id, open, label, close));
    }

    for edge in &spec.edges {
        if edge.from.trim().is_empty() || edge.to.trim().is_empty() {
            tracing::debug!(from = %edge.from, to = %edge.to, "dropping edge with blank endpoint");
            continue;
        }
        let from = sanitize_node_id(&edge.from);
        let to = sanitize_node_id(&edge.to);
        let connector = EdgeStyle::from_name(edge.style.as_deref().unwrap_or("arrow")).connector();
        match non_empty(edge.label.as_deref()) {
            Some(label) => lines.push(format!(
                "  {} {}|\"{}\"| {}",
                from,
                connector,
                sanitize_label(label),
                to
            )),
            None => lines.push(format!("  {} {} {}", from, connector, to)),
        }
    }

    lines.join("\n")
}

// ---------------------------------------------------------------------------
// Sanitize / validate
// ---------------------------------------------------------------------------

fn declares_type(line: &str) -> bool {
    let line = line.trim().to_lowercase();
    DIAGRAM_TYPES
        .iter()
        .any(|t| line.starts_with(&t.to_lowercase()))
}

/// Normalize grammar text.
///
/// Drops `%%` comment lines, normalizes line endings, declares `graph TD`
/// when the first line names no known type, repairs `-->|x|>` edges, and
/// quotes bracket labels that contain angle brackets or spaces.
pub fn sanitize(code: &str) -> String {
    let normalized = code.replace("\r\n", "\n").replace('\r', "\n");
    let kept: Vec<&str> = normalized
        .split('\n')
        .filter(|line| !line.trim_start().starts_with("%%"))
        .collect();
    let cleaned = kept.join("\n");
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        return EMPTY_DIAGRAM.to_string();
    }

    let first_line = cleaned.lines().next().unwrap_or_default();
    let text = if declares_type(first_line) {
        cleaned.to_string()
    } else {
        format!("graph TD\n{}", cleaned)
    };

    let text = BROKEN_EDGE_LABEL.replace_all(&text, "-->|$1|");
    let text = UNSAFE_BRACKET_LABEL.replace_all(&text, |caps: &Captures| {
        format!("[\"{}\"]", sanitize_label(&caps[1]))
    });
    let text = SPACED_BRACKET_LABEL.replace_all(&text, |caps: &Captures| {
        if caps[2].contains(' ') {
            format!("{}[\"{}\"]", &caps[1], sanitize_label(&caps[2]))
        } else {
            caps[0].to_string()
        }
    });
    text.into_owned()
}

/// Advisory validation result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Validation {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Validation {
    fn ok() -> Self {
        Self {
            valid: true,
            error: None,
        }
    }

    fn fail(reason: &str) -> Self {
        Self {
            valid: false,
            error: Some(reason.to_string()),
        }
    }
}

/// Check that `code` is non-empty, has at least two non-blank lines and
/// starts with a recognized type keyword.
pub fn validate(code: &str) -> Validation {
    if code.trim().is_empty() {
        return Validation::fail("Empty or invalid code");
    }
    let lines: Vec<&str> = code.lines().filter(|l| !l.trim().is_empty()).collect();
    if lines.len() < 2 {
        return Validation::fail("Diagram too short");
    }
    if !declares_type(lines[0]) {
        return Validation::fail("Invalid diagram type");
    }
    Validation::ok()
}

// ---------------------------------------------------------------------------
// Rendering and repair
// ---------------------------------------------------------------------------

/// External diagram renderer.
#[async_trait]
pub trait DiagramRenderer: Send + Sync {
    /// Render grammar text, returning the rendered document.
    async fn render(&self, source: &str) -> Result<String>;
}

/// Ask the completion backend to correct `code`. An empty reply yields
/// `code` unchanged.
pub async fn repair(backend: &dyn CompletionBackend, code: &str) -> Result<String> {
    let messages = vec![
        ChatMessage::system(REPAIR_PROMPT),
        ChatMessage::user(format!("Fix this Mermaid diagram:\n\n{}", code)),
    ];
    let reply = backend.complete(messages, REPAIR_OPTIONS).await?;
    let fixed = strip_code_fences(&reply);
    Ok(if fixed.is_empty() { code.to_string() } else { fixed })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    /// The source that rendered.
    pub source: String,
    pub output: String,
    pub repaired: bool,
}

/// Sanitize, validate (logged only), render; on a render failure repair once
/// through the backend and render again.
pub async fn render_with_repair(
    source: &str,
    renderer: &dyn DiagramRenderer,
    backend: Option<&dyn CompletionBackend>,
) -> Result<Rendered> {
    let sanitized = sanitize(source);
    let validation = validate(&sanitized);
    if let Some(reason) = &validation.error {
        tracing::warn!(reason = %reason, "diagram failed validation, rendering anyway");
    }

    let render_err = match renderer.render(&sanitized).await {
        Ok(output) => {
            return Ok(Rendered {
                source: sanitized,
                output,
                repaired: false,
            })
        }
        Err(err) => err,
    };

    let Some(backend) = backend else {
        return Err(render_err);
    };
    let fixed = match repair(backend, &sanitized).await {
        Ok(fixed) => sanitize(&fixed),
        Err(err) => {
            tracing::debug!(error = %err, "diagram repair failed");
            return Err(render_err);
        }
    };

    let output = renderer.render(&fixed).await?;
    Ok(Rendered {
        source: fixed,
        output,
        repaired: true,
    })
}

// ---------------------------------------------------------------------------
// HTTP bodies
// ---------------------------------------------------------------------------

/// Body of `POST /api/code-analyzer/diagram`: grammar text or a structured
/// description.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DiagramRequest {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub diagram: Option<DiagramSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiagramResponse {
    pub code: String,
    #[serde(flatten)]
    pub validation: Validation,
}

/// Compile when structured, then sanitize and validate.
pub fn prepare(request: &DiagramRequest) -> Result<DiagramResponse> {
    let source = match (&request.diagram, &request.code) {
        (Some(spec), _) => compile_structured(spec),
        (None, Some(code)) if !code.trim().is_empty() => code.clone(),
        _ => {
            return Err(AnalyzerError::BadRequest(
                "Missing code or diagram".to_string(),
            ))
        }
    };
    let code = sanitize(&source);
    let validation = validate(&code);
    Ok(DiagramResponse { code, validation })
}

/// Body of `POST /api/code-analyzer/fix-diagram`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FixRequest {
    #[serde(default)]
    pub code: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FixResponse {
    pub fixed: String,
}
