//! # DYOR Code Analyzer
//!
//! Ask questions about a remote code repository and get streamed answers
//! grounded in the repository's own files.
//!
//! A question is answered by selecting the files most likely to matter,
//! fetching them from the code host under hard caps, concatenating them into
//! one context block, and relaying a streamed completion back to the caller
//! as framed events. The same fetch machinery drives a regex security
//! scanner, code search, per-file quality reports, artifact generation, and
//! a diagram sanitizer.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌───────────┐   ┌─────────┐   ┌──────────┐
//! │  Relevance │──▶│   Fetch   │──▶│ Context │──▶│  Relay   │──▶ events
//! │  Selector  │   │ (bounded) │   │Assembler│   │ (frames) │
//! └────────────┘   └─────┬─────┘   └─────────┘   └──────────┘
//!                        │
//!             ┌──────────┼──────────┐
//!             ▼          ▼          ▼
//!         ┌──────┐  ┌────────┐  ┌─────────┐
//!         │ Scan │  │ Search │  │ Quality │
//!         └──────┘  └────────┘  └─────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! dyor tree rust-lang regex
//! dyor ask rust-lang regex "how are literals optimized?"
//! dyor scan some-org some-repo
//! dyor serve
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration, limits, credentials |
//! | [`error`] | Error taxonomy |
//! | [`models`] | Core data types |
//! | [`github`] | Code host client |
//! | [`completion`] | Text-completion backend |
//! | [`relevance`] | Relevance selection |
//! | [`fetch`] | Bounded file fetching |
//! | [`context`] | Context assembly |
//! | [`sse`] | Event framing |
//! | [`relay`] | Streaming relay |
//! | [`chat`] | Chat prompt assembly |
//! | [`pipeline`] | End-to-end question answering |
//! | [`patterns`] | Security pattern library |
//! | [`scan`] | Security scanner |
//! | [`search`] | Code search |
//! | [`quality`] | Code quality reports |
//! | [`generate`] | Artifact generation |
//! | [`diagram`] | Diagram tooling |
//! | [`server`] | HTTP server |
//! | [`telemetry`] | Tracing setup |

pub mod chat;
pub mod completion;
pub mod config;
pub mod context;
pub mod diagram;
pub mod error;
pub mod fetch;
pub mod generate;
pub mod github;
pub mod models;
pub mod patterns;
pub mod pipeline;
pub mod quality;
pub mod relay;
pub mod relevance;
pub mod scan;
pub mod search;
pub mod server;
pub mod sse;
pub mod telemetry;
