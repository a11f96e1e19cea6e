use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};

use researchflow_core::config_file;
use researchflow_core::scholar::{SearchFilters, SortOrder};
use researchflow_core::{ChatTurn, Config, CoreError, DocumentReference, Pipeline, Provider};
use researchflow_pdf_mupdf::MupdfBackend;

mod output;

use output::ColorMode;

/// Research Flow - extract, summarize, discuss and typeset academic papers
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Config file to use instead of the default lookup
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    /// Generator provider (gemini or ollama)
    #[arg(long, global = true)]
    provider: Option<Provider>,

    /// Generator model
    #[arg(long, global = true)]
    model: Option<String>,

    /// Google Gemini API key
    #[arg(long, global = true)]
    google_api_key: Option<String>,

    /// Semantic Scholar API key
    #[arg(long, global = true)]
    s2_api_key: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the plain text of a document
    Extract {
        /// URL, path to a .pdf/.txt file, or inline text
        source: String,

        /// Treat SOURCE as inline text
        #[arg(long)]
        text: bool,
    },

    /// Summarize a document into problem / methodology / results / conclusion
    Summarize {
        /// URL, path to a .pdf/.txt file, or inline text
        source: String,

        /// Treat SOURCE as inline text
        #[arg(long)]
        text: bool,

        /// Question the summary should pay particular attention to
        #[arg(short, long)]
        query: Option<String>,

        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Ask a question about a document
    Chat {
        /// URL, path to a .pdf/.txt file, or inline text
        source: String,

        /// Treat SOURCE as inline text
        #[arg(long)]
        text: bool,

        /// The question
        #[arg(short, long)]
        message: String,

        /// JSON file with earlier turns: [{"role": "user", "content": "..."}, ...]
        #[arg(long)]
        history: Option<PathBuf>,
    },

    /// Typeset a .pdf or .txt file in a conference/journal style with LaTeX
    Format {
        /// Path to the .pdf or .txt file
        file: PathBuf,

        /// Target style, e.g. "IEEE" or "ACM SIGCHI"
        #[arg(short, long)]
        style: String,

        /// Base name of the output files (defaults to the input file stem)
        #[arg(short, long)]
        name: Option<String>,

        /// Directory for the .tex/.pdf artifacts
        #[arg(long)]
        artifact_dir: Option<PathBuf>,
    },

    /// Search Semantic Scholar for articles
    Search {
        /// Natural-language query
        query: String,

        /// Result order: default, recency or citations
        #[arg(long, default_value = "default")]
        sort: SortOrder,

        #[arg(long)]
        year_from: Option<i32>,

        #[arg(long)]
        year_to: Option<i32>,

        /// Pagination offset
        #[arg(long, default_value_t = 0)]
        offset: u32,

        /// Only papers with an open-access PDF
        #[arg(long)]
        open_access: bool,

        /// Search with the query as written, without rewriting it
        #[arg(long)]
        no_optimize: bool,

        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = build_config(&cli)?;
    tracing::debug!(config = ?config, "resolved configuration");
    let color = ColorMode(!cli.no_color);
    let mut stdout = std::io::stdout();

    match cli.command {
        Command::Extract { source, text } => {
            let pipeline = Pipeline::new(config, Arc::new(MupdfBackend::new()));
            let document = pipeline.extract(resolve_source(&source, text)?).await?;
            if document.is_truncated() {
                tracing::warn!(
                    chars = document.text().chars().count(),
                    "document was truncated"
                );
            }
            writeln!(stdout, "{}", document.text())?;
        }
        Command::Summarize {
            source,
            text,
            query,
            json,
        } => {
            let pipeline = Pipeline::new(config, Arc::new(MupdfBackend::new()));
            let summary = pipeline
                .summarize(resolve_source(&source, text)?, query.as_deref())
                .await?;
            if json {
                writeln!(stdout, "{}", serde_json::to_string_pretty(&summary)?)?;
            } else {
                output::print_summary(&mut stdout, &summary, color)?;
            }
        }
        Command::Chat {
            source,
            text,
            message,
            history,
        } => {
            let mut messages = match history {
                Some(path) => load_history(&path)?,
                None => Vec::new(),
            };
            messages.push(ChatTurn::user(message));
            let pipeline = Pipeline::new(config, Arc::new(MupdfBackend::new()));
            let reply = pipeline
                .chat(resolve_source(&source, text)?, &messages)
                .await?;
            writeln!(stdout, "{reply}")?;
        }
        Command::Format {
            file,
            style,
            name,
            artifact_dir,
        } => {
            let mut config = config;
            if let Some(dir) = artifact_dir {
                config.artifact_dir = dir;
            }
            let name = name.unwrap_or_else(|| {
                file.file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "document".into())
            });
            let reference = upload(&file)?;
            let pipeline = Pipeline::new(config, Arc::new(MupdfBackend::new()));
            match pipeline.format(reference, &style, &name).await {
                Ok(artifact) => output::print_artifact(&mut stdout, &artifact, color)?,
                Err(CoreError::CompilationFailed(artifact)) => {
                    output::print_artifact(&mut stdout, &artifact, color)?;
                    anyhow::bail!("LaTeX compilation failed; the .tex file was kept");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Command::Search {
            query,
            sort,
            year_from,
            year_to,
            offset,
            open_access,
            no_optimize,
            json,
        } => {
            let filters = SearchFilters {
                sort,
                year_from,
                year_to,
                offset,
                open_access_only: open_access,
            };
            let pipeline = Pipeline::new(config, Arc::new(MupdfBackend::new()));
            let hits = pipeline.search(&query, &filters, !no_optimize).await?;
            if json {
                writeln!(stdout, "{}", serde_json::to_string_pretty(&hits)?)?;
            } else {
                output::print_hits(&mut stdout, &hits, color)?;
            }
        }
    }
    Ok(())
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        tracing_subscriber::EnvFilter::new("researchflow=debug")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("researchflow=info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Resolve configuration: CLI flags > env vars > config file > defaults
fn build_config(cli: &Cli) -> anyhow::Result<Config> {
    let file = match &cli.config {
        Some(path) => config_file::load_from_path(path).ok_or_else(|| {
            anyhow::anyhow!("could not read config file {}", path.display())
        })?,
        None => config_file::load_config(),
    };

    let mut config = Config::default();
    file.apply_to(&mut config);

    if let Ok(key) = std::env::var("GOOGLE_API_KEY") {
        config.google_api_key = Some(key);
    }
    if let Ok(model) = std::env::var("GEMINI_MODEL") {
        config.model = model;
    }
    if let Ok(key) = std::env::var("SEMANTIC_API_KEY") {
        config.s2_api_key = Some(key);
    }
    if let Ok(provider) = std::env::var("RESEARCHFLOW_PROVIDER") {
        config.provider = provider
            .parse()
            .map_err(|e: String| anyhow::anyhow!("RESEARCHFLOW_PROVIDER: {e}"))?;
    }
    if let Ok(endpoint) = std::env::var("OLLAMA_ENDPOINT") {
        config.ollama_endpoint = endpoint;
    }

    if let Some(provider) = cli.provider {
        config.provider = provider;
    }
    if let Some(model) = &cli.model {
        config.model = model.clone();
    }
    if let Some(key) = &cli.google_api_key {
        config.google_api_key = Some(key.clone());
    }
    if let Some(key) = &cli.s2_api_key {
        config.s2_api_key = Some(key.clone());
    }
    Ok(config)
}

/// A URL, an existing file, or else inline text.
fn resolve_source(source: &str, force_text: bool) -> anyhow::Result<DocumentReference> {
    if force_text {
        return Ok(DocumentReference::Text(source.to_string()));
    }
    let trimmed = source.trim();
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        return Ok(DocumentReference::Url(trimmed.to_string()));
    }
    let path = Path::new(trimmed);
    if path.is_file() {
        return upload(path);
    }
    Ok(DocumentReference::Text(source.to_string()))
}

fn upload(path: &Path) -> anyhow::Result<DocumentReference> {
    let bytes = std::fs::read(path)
        .map_err(|e| anyhow::anyhow!("could not read {}: {e}", path.display()))?;
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok(DocumentReference::Upload { filename, bytes })
}

fn load_history(path: &Path) -> anyhow::Result<Vec<ChatTurn>> {
    let content = std::fs::read_to_string(path)?;
    let turns: Vec<ChatTurn> = serde_json::from_str(&content)
        .map_err(|e| anyhow::anyhow!("invalid chat history in {}: {e}", path.display()))?;
    Ok(turns)
}
