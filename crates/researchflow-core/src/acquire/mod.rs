//! Turning a URL into extracted document text.
//!
//! The controller walks an explicit, ordered strategy chain:
//!
//! 1. identifier resolution through an academic index (optional rewrite of
//!    the target URL),
//! 2. the fetch chain ([`FETCH_CHAIN`]): a direct fetch, then an archived
//!    snapshot of the same target,
//! 3. content negotiation: a non-PDF response is searched for a PDF link,
//!    which is fetched once more,
//! 4. extraction from a temporary file that is always removed.

pub mod archive;
pub mod fetch;
pub mod html;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

pub use archive::{Wayback, WebArchive};
pub use fetch::{FetchError, FetchedPage, Fetcher, HttpFetcher};

use crate::extract::{DocumentKind, TextExtractor};
use crate::scholar::SemanticScholar;
use crate::{Config, CoreError, ExtractedDocument};

/// An academic index that can map its own paper URLs to open-access PDFs.
pub trait PaperIndex: Send + Sync {
    fn name(&self) -> &str;

    /// The index's paper identifier embedded in `url`, if the URL belongs to
    /// this index.
    fn paper_id(&self, url: &str) -> Option<String>;

    /// Open-access PDF URL for `paper_id`, if the index knows one.
    fn resolve_pdf<'a>(
        &'a self,
        paper_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Option<String>> + Send + 'a>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    IdentifierResolution,
    DirectFetch,
    ArchiveSnapshot,
    LinkedPdf,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::IdentifierResolution => "identifier",
            Strategy::DirectFetch => "direct",
            Strategy::ArchiveSnapshot => "archive",
            Strategy::LinkedPdf => "linked-pdf",
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fetch strategies, tried in order until one returns a response.
pub const FETCH_CHAIN: &[Strategy] = &[Strategy::DirectFetch, Strategy::ArchiveSnapshot];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success(String),
    Failure(String),
}

/// One step of the chain. Attempts are only logged; callers see the final
/// outcome.
#[derive(Debug, Clone)]
pub struct AcquisitionAttempt {
    pub strategy: Strategy,
    pub target: String,
    pub outcome: AttemptOutcome,
}

/// Append-only record of the attempts made for one URL.
#[derive(Debug, Default)]
struct AttemptLog {
    attempts: Vec<AcquisitionAttempt>,
}

impl AttemptLog {
    fn success(&mut self, strategy: Strategy, target: &str, detail: impl Into<String>) {
        let detail = detail.into();
        tracing::debug!(strategy = %strategy, target = %target, detail = %detail, "acquisition step succeeded");
        self.attempts.push(AcquisitionAttempt {
            strategy,
            target: target.to_string(),
            outcome: AttemptOutcome::Success(detail),
        });
    }

    fn failure(&mut self, strategy: Strategy, target: &str, reason: impl Into<String>) {
        let reason = reason.into();
        tracing::warn!(strategy = %strategy, target = %target, reason = %reason, "acquisition step failed");
        self.attempts.push(AcquisitionAttempt {
            strategy,
            target: target.to_string(),
            outcome: AttemptOutcome::Failure(reason),
        });
    }

    /// "direct: HTTP 404; archive: no snapshot available"
    fn failure_summary(&self) -> String {
        self.attempts
            .iter()
            .filter_map(|a| match &a.outcome {
                AttemptOutcome::Failure(reason) => Some(format!("{}: {}", a.strategy, reason)),
                AttemptOutcome::Success(_) => None,
            })
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// A PDF payload that acquisition settled on.
#[derive(Debug, Clone)]
pub struct ResolvedPdf {
    /// URL the PDF bytes were served from.
    pub url: String,
    pub bytes: Vec<u8>,
}

/// Resolves URLs to PDF payloads and extracts their text.
pub struct Acquirer {
    fetcher: Arc<dyn Fetcher>,
    archive: Option<Arc<dyn WebArchive>>,
    index: Option<Arc<dyn PaperIndex>>,
    extractor: TextExtractor,
    fetch_timeout: Duration,
    archive_fetch_timeout: Duration,
}

impl Acquirer {
    pub fn new(fetcher: Arc<dyn Fetcher>, extractor: TextExtractor) -> Self {
        Self {
            fetcher,
            archive: None,
            index: None,
            extractor,
            fetch_timeout: Duration::from_secs(20),
            archive_fetch_timeout: Duration::from_secs(30),
        }
    }

    /// Wire up the HTTP fetcher, the Wayback Machine and Semantic Scholar
    /// from `config`.
    pub fn from_config(config: &Config, extractor: TextExtractor) -> Self {
        let client = reqwest::Client::builder()
            .pool_idle_timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        let fetcher = HttpFetcher::with_client(client.clone(), config.max_download_bytes);
        let archive = Wayback::new(client.clone(), config.archive_lookup_timeout());
        let index = SemanticScholar::new(
            client,
            config.s2_api_key.clone(),
            config.index_timeout(),
        );
        Self::new(Arc::new(fetcher), extractor)
            .with_archive(Arc::new(archive))
            .with_index(Arc::new(index))
            .with_timeouts(config.fetch_timeout(), config.archive_fetch_timeout())
    }

    pub fn with_archive(mut self, archive: Arc<dyn WebArchive>) -> Self {
        self.archive = Some(archive);
        self
    }

    pub fn with_index(mut self, index: Arc<dyn PaperIndex>) -> Self {
        self.index = Some(index);
        self
    }

    pub fn with_timeouts(mut self, fetch: Duration, archive_fetch: Duration) -> Self {
        self.fetch_timeout = fetch;
        self.archive_fetch_timeout = archive_fetch;
        self
    }

    /// Resolve `url` to a PDF and extract its text.
    pub async fn fetch_document_text(&self, url: &str) -> Result<ExtractedDocument, CoreError> {
        let pdf = self.acquire_pdf(url).await?;
        let extractor = self.extractor.clone();
        tokio::task::spawn_blocking(move || extractor.extract_bytes(&pdf.bytes, DocumentKind::Pdf))
            .await
            .map_err(|e| CoreError::ExtractionFailed(format!("extraction task failed: {e}")))?
    }

    /// Run the strategy chain and return the PDF payload it settles on.
    pub async fn acquire_pdf(&self, url: &str) -> Result<ResolvedPdf, CoreError> {
        let mut log = AttemptLog::default();
        let url = url.trim();

        let target = match self.resolve_identifier(url, &mut log).await {
            Some(pdf_url) => pdf_url,
            None => url.to_string(),
        };

        let Some(page) = self.run_fetch_chain(&target, &mut log).await else {
            return Err(fail(url, &log));
        };

        if page.is_pdf() {
            return Ok(ResolvedPdf {
                url: page.final_url,
                bytes: page.body,
            });
        }

        // Landing page: look for the real PDF.
        let html = page.body_text();
        let Some(link) = find_linked_pdf(&html, &page.final_url) else {
            log.failure(
                Strategy::LinkedPdf,
                &page.final_url,
                "no PDF link found in HTML",
            );
            return Err(fail(url, &log));
        };

        match self.fetcher.fetch(&link, self.fetch_timeout).await {
            Ok(linked) if linked.is_pdf() => {
                log.success(
                    Strategy::LinkedPdf,
                    &link,
                    format!("{} bytes", linked.body.len()),
                );
                Ok(ResolvedPdf {
                    url: linked.final_url,
                    bytes: linked.body,
                })
            }
            Ok(linked) => {
                log.failure(
                    Strategy::LinkedPdf,
                    &link,
                    format!(
                        "linked document is not a PDF ({})",
                        linked.content_type.as_deref().unwrap_or("no content type")
                    ),
                );
                Err(fail(url, &log))
            }
            Err(e) => {
                log.failure(Strategy::LinkedPdf, &link, e.to_string());
                Err(fail(url, &log))
            }
        }
    }

    async fn resolve_identifier(&self, url: &str, log: &mut AttemptLog) -> Option<String> {
        let index = self.index.as_ref()?;
        let paper_id = index.paper_id(url)?;
        match index.resolve_pdf(&paper_id).await {
            Some(pdf_url) => {
                log.success(
                    Strategy::IdentifierResolution,
                    url,
                    format!("{} -> {}", index.name(), pdf_url),
                );
                Some(pdf_url)
            }
            None => {
                log.failure(
                    Strategy::IdentifierResolution,
                    url,
                    format!("{} has no open-access PDF for {}", index.name(), paper_id),
                );
                None
            }
        }
    }

    async fn run_fetch_chain(&self, target: &str, log: &mut AttemptLog) -> Option<FetchedPage> {
        for &strategy in FETCH_CHAIN {
            let (candidate, timeout) = match strategy {
                Strategy::ArchiveSnapshot => {
                    let Some(archive) = self.archive.as_ref() else {
                        log.failure(strategy, target, "no web archive configured");
                        continue;
                    };
                    match archive.available_snapshot(target).await {
                        Some(snapshot) => {
                            tracing::warn!(url = %target, snapshot = %snapshot, archive = archive.name(), "falling back to archived snapshot");
                            (snapshot, self.archive_fetch_timeout)
                        }
                        None => {
                            log.failure(strategy, target, "no snapshot available");
                            continue;
                        }
                    }
                }
                _ => (target.to_string(), self.fetch_timeout),
            };

            match self.fetcher.fetch(&candidate, timeout).await {
                Ok(page) => {
                    log.success(
                        strategy,
                        &candidate,
                        format!(
                            "{} bytes ({})",
                            page.body.len(),
                            page.content_type.as_deref().unwrap_or("no content type")
                        ),
                    );
                    return Some(page);
                }
                Err(e) => log.failure(strategy, &candidate, e.to_string()),
            }
        }
        None
    }
}

fn find_linked_pdf(html: &str, base_url: &str) -> Option<String> {
    let link = html::find_pdf_link(html)?;
    html::resolve_link(base_url, &link)
}

fn fail(url: &str, log: &AttemptLog) -> CoreError {
    CoreError::AcquisitionFailed {
        url: url.to_string(),
        reason: log.failure_summary(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_order_is_direct_then_archive() {
        assert_eq!(
            FETCH_CHAIN,
            &[Strategy::DirectFetch, Strategy::ArchiveSnapshot]
        );
    }

    #[test]
    fn failure_summary_lists_only_failures() {
        let mut log = AttemptLog::default();
        log.failure(Strategy::DirectFetch, "https://a", "HTTP 403 from https://a");
        log.success(Strategy::ArchiveSnapshot, "https://snap", "10 bytes");
        log.failure(Strategy::LinkedPdf, "https://snap", "no PDF link found in HTML");
        assert_eq!(
            log.failure_summary(),
            "direct: HTTP 403 from https://a; linked-pdf: no PDF link found in HTML"
        );
        assert_eq!(log.attempts.len(), 3);
    }

    #[test]
    fn linked_pdf_is_absolute() {
        let html = r#"<meta name="citation_pdf_url" content="/x.pdf">"#;
        assert_eq!(
            find_linked_pdf(html, "https://site.example/paper").as_deref(),
            Some("https://site.example/x.pdf")
        );
    }
}
