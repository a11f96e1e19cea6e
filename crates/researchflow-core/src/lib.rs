use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod acquire;
pub mod backend;
pub mod chat;
pub mod compile;
pub mod config_file;
pub mod explore;
pub mod extract;
pub mod fragment;
pub mod generator;
pub mod pipeline;
pub mod scholar;
pub mod summary;
pub mod text_utils;

// Re-export for convenience
pub use acquire::{AcquisitionAttempt, Acquirer, AttemptOutcome, Strategy};
pub use backend::{BackendError, PdfBackend};
pub use chat::{ChatResponder, ChatSession};
pub use compile::ArtifactCompiler;
pub use extract::{DocumentKind, TextExtractor};
pub use fragment::extract_first_json_object;
pub use generator::{GenerationOptions, GeneratorError, TextGenerator};
pub use pipeline::Pipeline;
pub use summary::Summarizer;

/// A caller-supplied reference to a document.
#[derive(Debug, Clone)]
pub enum DocumentReference {
    /// Raw article text.
    Text(String),
    /// A URL that points to a PDF or to an HTML landing page.
    Url(String),
    /// An uploaded `.pdf` or `.txt` file.
    Upload { filename: String, bytes: Vec<u8> },
}

/// Plain text recovered from a document.
///
/// Immutable once built; `text` is never empty (an empty result is an
/// [`CoreError::ExtractionFailed`] instead).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedDocument {
    text: String,
    page_count: usize,
    truncated: bool,
}

impl ExtractedDocument {
    /// Build a document, cutting `text` to `max_chars` characters if given.
    pub(crate) fn new(text: String, page_count: usize, max_chars: Option<usize>) -> Self {
        match max_chars {
            Some(limit) if text.chars().count() > limit => Self {
                text: text_utils::truncate_chars(&text, limit).to_string(),
                page_count,
                truncated: true,
            },
            _ => Self {
                text,
                page_count,
                truncated: false,
            },
        }
    }

    /// Wrap inline text supplied by the caller.
    pub fn from_text(text: impl Into<String>) -> Result<Self, CoreError> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(CoreError::ExtractionFailed("input text is empty".into()));
        }
        Ok(Self::new(text, 1, None))
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn page_count(&self) -> usize {
        self.page_count
    }

    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    pub fn into_text(self) -> String {
        self.text
    }
}

/// The four-section summary of an article. Every field is always present.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuredSummary {
    pub problem: String,
    pub methodology: String,
    pub results: String,
    pub conclusion: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

/// One message of a conversation about a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// A request to typeset `source_text` in a named conference/journal style.
#[derive(Debug, Clone)]
pub struct FormattingJob {
    pub source_text: String,
    pub style: String,
    pub base_filename: String,
}

/// Output of a formatting job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledArtifact {
    pub tex_path: PathBuf,
    pub pdf_path: Option<PathBuf>,
    pub compiled: bool,
    pub diagnostics: String,
}

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("could not acquire a document from {url}: {reason}")]
    AcquisitionFailed { url: String, reason: String },
    #[error("no text could be extracted: {0}")]
    ExtractionFailed(String),
    #[error("invalid model output: {message}")]
    InvalidModelOutput { message: String, excerpt: String },
    #[error("LaTeX compilation failed for {}", .0.tex_path.display())]
    CompilationFailed(Box<CompiledArtifact>),
    #[error("generator error: {0}")]
    Generator(#[from] GeneratorError),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("search error: {0}")]
    Search(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Which text generator backs the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Gemini,
    Ollama,
}

impl std::str::FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "gemini" => Ok(Provider::Gemini),
            "ollama" => Ok(Provider::Ollama),
            other => Err(format!("unknown provider: {other}")),
        }
    }
}

/// Process-wide configuration, built once at startup and handed to each
/// component when it is constructed.
#[derive(Clone)]
pub struct Config {
    pub google_api_key: Option<String>,
    pub s2_api_key: Option<String>,
    pub provider: Provider,
    pub model: String,
    /// Model used for LaTeX formatting (the heaviest generation).
    pub format_model: String,
    pub ollama_endpoint: String,
    /// Ask for schema-constrained output when the provider supports it.
    pub schema_output: bool,
    pub response_language: String,
    pub fetch_timeout_secs: u64,
    pub archive_lookup_timeout_secs: u64,
    pub archive_fetch_timeout_secs: u64,
    pub index_timeout_secs: u64,
    pub generator_timeout_secs: u64,
    pub compile_timeout_secs: u64,
    pub summary_char_limit: usize,
    pub chat_char_limit: usize,
    pub max_document_chars: usize,
    pub max_download_bytes: usize,
    pub artifact_dir: PathBuf,
    pub compiler_program: String,
    pub compiler_args: Vec<String>,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("google_api_key", &self.google_api_key.as_ref().map(|_| "***"))
            .field("s2_api_key", &self.s2_api_key.as_ref().map(|_| "***"))
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("format_model", &self.format_model)
            .field("ollama_endpoint", &self.ollama_endpoint)
            .field("schema_output", &self.schema_output)
            .field("response_language", &self.response_language)
            .field("fetch_timeout_secs", &self.fetch_timeout_secs)
            .field(
                "archive_lookup_timeout_secs",
                &self.archive_lookup_timeout_secs,
            )
            .field("archive_fetch_timeout_secs", &self.archive_fetch_timeout_secs)
            .field("index_timeout_secs", &self.index_timeout_secs)
            .field("generator_timeout_secs", &self.generator_timeout_secs)
            .field("compile_timeout_secs", &self.compile_timeout_secs)
            .field("summary_char_limit", &self.summary_char_limit)
            .field("chat_char_limit", &self.chat_char_limit)
            .field("max_document_chars", &self.max_document_chars)
            .field("max_download_bytes", &self.max_download_bytes)
            .field("artifact_dir", &self.artifact_dir)
            .field("compiler_program", &self.compiler_program)
            .field("compiler_args", &self.compiler_args)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            google_api_key: None,
            s2_api_key: None,
            provider: Provider::Gemini,
            model: "gemini-2.0-flash".into(),
            format_model: "gemini-2.5-pro".into(),
            ollama_endpoint: generator::ollama::DEFAULT_ENDPOINT.into(),
            schema_output: true,
            response_language: "Portuguese".into(),
            fetch_timeout_secs: 20,
            archive_lookup_timeout_secs: 10,
            archive_fetch_timeout_secs: 30,
            index_timeout_secs: 10,
            generator_timeout_secs: 120,
            compile_timeout_secs: 120,
            summary_char_limit: 50_000,
            chat_char_limit: 100_000,
            max_document_chars: 2_000_000,
            max_download_bytes: 100 * 1024 * 1024,
            artifact_dir: PathBuf::from("./artifacts"),
            compiler_program: "pdflatex".into(),
            compiler_args: vec![
                "-interaction=nonstopmode".into(),
                "-halt-on-error".into(),
            ],
        }
    }
}

impl Config {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn archive_lookup_timeout(&self) -> Duration {
        Duration::from_secs(self.archive_lookup_timeout_secs)
    }

    pub fn archive_fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.archive_fetch_timeout_secs)
    }

    pub fn index_timeout(&self) -> Duration {
        Duration::from_secs(self.index_timeout_secs)
    }

    pub fn generator_timeout(&self) -> Duration {
        Duration::from_secs(self.generator_timeout_secs)
    }

    pub fn compile_timeout(&self) -> Duration {
        Duration::from_secs(self.compile_timeout_secs)
    }
}
