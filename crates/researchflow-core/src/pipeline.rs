//! Entry point tying extraction, acquisition and the generation stages
//! together for one request.

use std::sync::Arc;

use crate::acquire::Acquirer;
use crate::backend::PdfBackend;
use crate::chat::ChatResponder;
use crate::compile::ArtifactCompiler;
use crate::explore;
use crate::extract::{DocumentKind, TextExtractor};
use crate::generator::{GeneratorError, TextGenerator, build_generator};
use crate::scholar::{ArticleHit, SearchFilters, SemanticScholar};
use crate::summary::{Summarizer, SummaryRequest};
use crate::{
    ChatTurn, CompiledArtifact, Config, CoreError, DocumentReference, ExtractedDocument,
    FormattingJob, StructuredSummary,
};

/// Holds the configuration and long-lived collaborators. Every call is
/// independent; nothing is cached between calls.
pub struct Pipeline {
    config: Config,
    extractor: TextExtractor,
    acquirer: Acquirer,
    generator: Option<Arc<dyn TextGenerator>>,
    format_generator: Option<Arc<dyn TextGenerator>>,
}

impl Pipeline {
    pub fn new(config: Config, backend: Arc<dyn PdfBackend>) -> Self {
        let extractor = TextExtractor::new(backend).with_max_chars(config.max_document_chars);
        let acquirer = Acquirer::from_config(&config, extractor.clone());
        let generator = usable(build_generator(&config, &config.model));
        let format_generator = usable(build_generator(&config, &config.format_model));
        Self {
            config,
            extractor,
            acquirer,
            generator,
            format_generator,
        }
    }

    /// Replace the generators (the second one writes LaTeX).
    pub fn with_generators(
        mut self,
        generator: Arc<dyn TextGenerator>,
        format_generator: Arc<dyn TextGenerator>,
    ) -> Self {
        self.generator = Some(generator);
        self.format_generator = Some(format_generator);
        self
    }

    pub fn with_acquirer(mut self, acquirer: Acquirer) -> Self {
        self.acquirer = acquirer;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn extractor(&self) -> &TextExtractor {
        &self.extractor
    }

    /// Resolve any document reference to text.
    pub async fn extract(&self, reference: DocumentReference) -> Result<ExtractedDocument, CoreError> {
        match reference {
            DocumentReference::Text(text) => {
                if text.trim().is_empty() {
                    return Err(CoreError::ExtractionFailed("input text is empty".into()));
                }
                Ok(ExtractedDocument::new(
                    text,
                    1,
                    Some(self.config.max_document_chars),
                ))
            }
            DocumentReference::Url(url) => {
                let url = url.trim();
                if !(url.starts_with("http://") || url.starts_with("https://")) {
                    return Err(CoreError::InvalidInput(format!("not an http(s) URL: {url}")));
                }
                self.acquirer.fetch_document_text(url).await
            }
            DocumentReference::Upload { filename, bytes } => {
                let kind = DocumentKind::from_filename(&filename).ok_or_else(|| {
                    CoreError::InvalidInput(format!(
                        "unsupported file type for {filename}: expected .pdf or .txt"
                    ))
                })?;
                tracing::debug!(file = %filename, bytes = bytes.len(), kind = ?kind, "extracting upload");
                let extractor = self.extractor.clone();
                tokio::task::spawn_blocking(move || extractor.extract_bytes(&bytes, kind))
                    .await
                    .map_err(|e| CoreError::ExtractionFailed(format!("extraction task failed: {e}")))?
            }
        }
    }

    pub async fn summarize(
        &self,
        reference: DocumentReference,
        focus_query: Option<&str>,
    ) -> Result<StructuredSummary, CoreError> {
        let generator = self.generator()?;
        let document = self.extract(reference).await?;
        let mut request = SummaryRequest::new(document);
        if let Some(focus) = focus_query {
            request = request.with_focus(focus);
        }
        Summarizer::new(generator, &self.config)
            .summarize(&request)
            .await
    }

    pub async fn chat(
        &self,
        reference: DocumentReference,
        messages: &[ChatTurn],
    ) -> Result<String, CoreError> {
        let generator = self.generator()?;
        let document = self.extract(reference).await?;
        ChatResponder::new(generator, &self.config)
            .reply(document.text(), messages)
            .await
    }

    /// Typeset the referenced document in `style` and compile it.
    pub async fn format(
        &self,
        reference: DocumentReference,
        style: &str,
        base_filename: &str,
    ) -> Result<CompiledArtifact, CoreError> {
        let generator = self.generator()?;
        let format_generator = self
            .format_generator
            .clone()
            .ok_or_else(not_configured)?;
        let document = self.extract(reference).await?;
        let job = FormattingJob {
            source_text: document.into_text(),
            style: style.to_string(),
            base_filename: base_filename.to_string(),
        };
        ArtifactCompiler::new(generator, format_generator, &self.config)
            .compile(&job)
            .await
    }

    /// Search for articles, rewriting the query with the generator first when
    /// `optimize` is set and a generator is available.
    pub async fn search(
        &self,
        query: &str,
        filters: &SearchFilters,
        optimize: bool,
    ) -> Result<Vec<ArticleHit>, CoreError> {
        let index = SemanticScholar::new(
            reqwest::Client::new(),
            self.config.s2_api_key.clone(),
            self.config.index_timeout(),
        );
        let generator = if optimize {
            if self.generator.is_none() {
                tracing::warn!("no generator configured, searching with the query as written");
            }
            self.generator.as_deref()
        } else {
            None
        };
        explore::search_articles(&index, generator, query, filters).await
    }

    fn generator(&self) -> Result<Arc<dyn TextGenerator>, CoreError> {
        self.generator.clone().ok_or_else(not_configured)
    }
}

fn usable(built: Result<Arc<dyn TextGenerator>, GeneratorError>) -> Option<Arc<dyn TextGenerator>> {
    match built {
        Ok(generator) => Some(generator),
        Err(e) => {
            tracing::debug!(error = %e, "generator unavailable");
            None
        }
    }
}

fn not_configured() -> CoreError {
    CoreError::Generator(GeneratorError::NotConfigured(
        "no generator available; set GOOGLE_API_KEY or use the ollama provider".into(),
    ))
}
