//! # DYOR CLI (`dyor`)
//!
//! Command-line front end for the analyzer. Every command reads the same
//! TOML configuration as the HTTP server; credentials come from the
//! environment variables the config names.
//!
//! ## Usage
//!
//! ```bash
//! dyor --config ./config/dyor.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `dyor serve` | Start the HTTP server |
//! | `dyor tree <owner> <repo>` | List every file path in one round trip |
//! | `dyor select <owner> <repo> "<question>"` | Show which files a question would load |
//! | `dyor ask <owner> <repo> "<question>"` | Stream an answer grounded in the repository |
//! | `dyor scan <owner> <repo>` | Run the security pattern scan |
//! | `dyor search <owner> <repo> "<query>"` | Text, regex, or definition search |
//! | `dyor diagram <file>` | Sanitize and validate a diagram |
//!
//! ## Examples
//!
//! ```bash
//! # Which files would answer this?
//! dyor select tokio-rs axum "how does routing work?"
//!
//! # Find definitions of `Router`
//! dyor search tokio-rs axum Router --kind ast
//!
//! # Compile a structured diagram description
//! dyor diagram flow.json --structured
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand};
use futures::StreamExt;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::Level;

use dyor::completion::{CompletionBackend, OpenAiClient};
use dyor::config::{self, build_globset, Config, Credentials};
use dyor::diagram::{self, DiagramRequest, DiagramSpec};
use dyor::github::{GitHubClient, RepoHost};
use dyor::models::FileRequest;
use dyor::patterns::PATTERNS;
use dyor::relevance::{select_relevant, RelevanceRequest};
use dyor::search::{search_repository, SearchKind, SearchRequest};
use dyor::sse::StreamEvent;
use dyor::{pipeline, scan, server, telemetry};

/// DYOR: ask questions about a remote repository and get grounded answers.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/dyor.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "dyor",
    about = "Ask questions about a remote code repository and get streamed, grounded answers",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/dyor.toml`. A missing file means defaults.
    #[arg(long, global = true, default_value = "./config/dyor.toml")]
    config: PathBuf,

    /// Emit logs as JSON lines on stderr.
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    #[command(flatten)]
    Repo(RepoCommands),

    /// Sanitize and validate a diagram file.
    Diagram {
        /// Diagram grammar text, or a JSON description with `--structured`.
        file: PathBuf,

        /// Treat the file as a JSON `{title, direction, nodes, edges}` description.
        #[arg(long)]
        structured: bool,
    },
}

/// Commands that talk to the code host and therefore need configuration.
#[derive(Subcommand)]
enum RepoCommands {
    /// Start the HTTP server on `[server].bind`.
    Serve,

    /// List every file path in a repository.
    Tree { owner: String, repo: String },

    /// Show which files would be loaded to answer a question.
    Select {
        owner: String,
        repo: String,
        question: String,
    },

    /// Answer a question about a repository, streaming to stdout.
    ///
    /// Requires the completion API key.
    Ask {
        owner: String,
        repo: String,
        question: String,
    },

    /// Scan a repository's code files for risky patterns.
    Scan { owner: String, repo: String },

    /// Search the code files of a repository.
    Search {
        owner: String,
        repo: String,
        query: String,

        /// `text` (substring), `regex`, or `ast` (definition shapes).
        #[arg(long, value_enum, default_value_t = SearchKind::Text)]
        kind: SearchKind,
    },
}

struct Clients {
    host: GitHubClient,
    completion: Option<OpenAiClient>,
}

impl Clients {
    fn from_config(cfg: &Config) -> anyhow::Result<Self> {
        let credentials = Credentials::from_env(cfg);
        let host = GitHubClient::new(
            &cfg.github,
            credentials.github_token.as_deref(),
            cfg.limits.max_file_chars,
        )?;
        let completion = credentials
            .completion_api_key
            .map(|key| OpenAiClient::new(&cfg.completion, key))
            .transpose()?;
        Ok(Self { host, completion })
    }

    fn backend(&self) -> Option<&dyn CompletionBackend> {
        self.completion.as_ref().map(|c| c as &dyn CompletionBackend)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    telemetry::init_tracing(cli.json_logs, Level::INFO);

    let command = match cli.command {
        // Diagram work is local and needs no config.
        Commands::Diagram { file, structured } => return run_diagram(&file, structured),
        Commands::Repo(command) => command,
    };

    let cfg = config::load_config(&cli.config)?;

    match command {
        RepoCommands::Serve => {
            server::run_server(&cfg).await?;
        }
        RepoCommands::Tree { owner, repo } => {
            let clients = Clients::from_config(&cfg)?;
            let tree = clients.host.list_tree(&owner, &repo).await?;
            for file in &tree {
                println!("{}", file.path);
            }
            eprintln!("{} files", tree.len());
        }
        RepoCommands::Select {
            owner,
            repo,
            question,
        } => {
            let clients = Clients::from_config(&cfg)?;
            let tree = clients.host.list_tree(&owner, &repo).await?;
            let request = RelevanceRequest {
                question,
                available_paths: tree.into_iter().map(|f| f.path).collect(),
            };
            let result = select_relevant(&request, clients.backend(), &cfg.limits).await;
            println!("source: {:?}", result.source);
            for path in &result.selected_paths {
                println!("  {}", path);
            }
        }
        RepoCommands::Ask {
            owner,
            repo,
            question,
        } => {
            let clients = Clients::from_config(&cfg)?;
            run_ask(&clients, &owner, &repo, &question, &cfg).await?;
        }
        RepoCommands::Scan { owner, repo } => {
            let clients = Clients::from_config(&cfg)?;
            let tree = clients.host.list_tree(&owner, &repo).await?;
            let files: Vec<FileRequest> = tree.iter().map(FileRequest::from).collect();
            let include = build_globset(&cfg.scan.include_globs)?;
            let report = scan::scan_repository(
                &clients.host,
                &owner,
                &repo,
                &files,
                &include,
                &PATTERNS,
                &cfg.limits,
            )
            .await;

            for finding in &report.findings {
                println!(
                    "[{}] {}:{} {}",
                    finding.severity.as_str(),
                    finding.file,
                    finding.line,
                    finding.title
                );
                println!("    {}", finding.recommendation);
            }
            let summary = &report.summary;
            println!(
                "{} findings ({} critical, {} high, {} medium, {} low, {} info) in {} of {} code files",
                summary.total,
                summary.critical,
                summary.high,
                summary.medium,
                summary.low,
                summary.info,
                summary.debug.files_successfully_fetched,
                summary.debug.code_files_found
            );
        }
        RepoCommands::Search {
            owner,
            repo,
            query,
            kind,
        } => {
            let clients = Clients::from_config(&cfg)?;
            let tree = clients.host.list_tree(&owner, &repo).await?;
            let request = SearchRequest {
                owner,
                repo,
                file_paths: tree.into_iter().map(|f| f.path).collect(),
                query,
                kind,
            };
            let include = build_globset(&cfg.search.include_globs)?;
            let hits = search_repository(&clients.host, &request, &include, &cfg.limits).await;
            if hits.is_empty() {
                println!("No results.");
            }
            for hit in &hits {
                println!("{}:{}: {}", hit.file, hit.line, hit.content);
            }
        }
    }

    Ok(())
}

async fn run_ask(
    clients: &Clients,
    owner: &str,
    repo: &str,
    question: &str,
    cfg: &Config,
) -> anyhow::Result<()> {
    let answer = pipeline::answer_question(
        &clients.host,
        clients.backend(),
        owner,
        repo,
        question,
        &cfg.limits,
    )
    .await?;

    eprintln!(
        "Using {} files ({:?} selection)",
        answer.files_loaded, answer.selection.source
    );
    for skipped in &answer.skipped {
        eprintln!("  skipped {}: {}", skipped.path, skipped.reason);
    }

    let mut stdout = std::io::stdout();
    let mut events = answer.events;
    let mut failure = None;
    while let Some(event) = events.next().await {
        match event {
            StreamEvent::Content(text) => {
                stdout.write_all(text.as_bytes())?;
                stdout.flush()?;
            }
            StreamEvent::Error(message) => failure = Some(message),
            StreamEvent::Done => break,
        }
    }
    println!();

    match failure {
        Some(message) => anyhow::bail!("answer stream failed: {}", message),
        None => Ok(()),
    }
}

fn run_diagram(file: &Path, structured: bool) -> anyhow::Result<()> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read diagram file: {}", file.display()))?;

    let request = if structured {
        let spec: DiagramSpec =
            serde_json::from_str(&content).with_context(|| "Failed to parse diagram JSON")?;
        DiagramRequest {
            code: None,
            diagram: Some(spec),
        }
    } else {
        DiagramRequest {
            code: Some(content),
            diagram: None,
        }
    };

    let response = diagram::prepare(&request)?;
    println!("{}", response.code);
    match response.validation.error {
        Some(reason) => eprintln!("invalid: {}", reason),
        None => eprintln!("valid"),
    }
    Ok(())
}
