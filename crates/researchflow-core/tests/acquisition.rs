//! Acquisition chain against scripted network collaborators.

use std::collections::HashMap;
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use researchflow_core::acquire::{FetchError, FetchedPage, Fetcher, PaperIndex, WebArchive};
use researchflow_core::{Acquirer, BackendError, CoreError, PdfBackend, TextExtractor};

const PDF_BYTES: &[u8] = b"%PDF-1.4 fake";
const FETCH_TIMEOUT: Duration = Duration::from_secs(1);
const ARCHIVE_FETCH_TIMEOUT: Duration = Duration::from_secs(7);

/// Fetcher serving canned responses; unknown URLs fail with HTTP 404.
#[derive(Default)]
struct ScriptedFetcher {
    pages: HashMap<String, Result<FetchedPage, u16>>,
    requested: Mutex<Vec<(String, Duration)>>,
}

impl ScriptedFetcher {
    fn serve_pdf(mut self, url: &str) -> Self {
        self.pages.insert(
            url.to_string(),
            Ok(FetchedPage {
                final_url: url.to_string(),
                content_type: Some("application/pdf".into()),
                body: PDF_BYTES.to_vec(),
            }),
        );
        self
    }

    fn serve_html(mut self, url: &str, html: &str) -> Self {
        self.pages.insert(
            url.to_string(),
            Ok(FetchedPage {
                final_url: url.to_string(),
                content_type: Some("text/html; charset=utf-8".into()),
                body: html.as_bytes().to_vec(),
            }),
        );
        self
    }

    fn fail(mut self, url: &str, status: u16) -> Self {
        self.pages.insert(url.to_string(), Err(status));
        self
    }

    fn requested(&self) -> Vec<String> {
        self.requested
            .lock()
            .unwrap()
            .iter()
            .map(|(url, _)| url.clone())
            .collect()
    }

    fn timeouts(&self) -> Vec<Duration> {
        self.requested
            .lock()
            .unwrap()
            .iter()
            .map(|(_, timeout)| *timeout)
            .collect()
    }
}

impl Fetcher for ScriptedFetcher {
    fn fetch<'a>(
        &'a self,
        url: &'a str,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<FetchedPage, FetchError>> + Send + 'a>> {
        self.requested
            .lock()
            .unwrap()
            .push((url.to_string(), timeout));
        let result = match self.pages.get(url) {
            Some(Ok(page)) => Ok(page.clone()),
            Some(Err(status)) => Err(FetchError::Status {
                status: *status,
                url: url.to_string(),
            }),
            None => Err(FetchError::Status {
                status: 404,
                url: url.to_string(),
            }),
        };
        Box::pin(async move { result })
    }
}

struct FixedArchive(Option<String>);

impl WebArchive for FixedArchive {
    fn name(&self) -> &str {
        "fixed archive"
    }

    fn available_snapshot<'a>(
        &'a self,
        _url: &'a str,
    ) -> Pin<Box<dyn Future<Output = Option<String>> + Send + 'a>> {
        let snapshot = self.0.clone();
        Box::pin(async move { snapshot })
    }
}

/// Recognises `https://index.example/paper/<id>` and maps every id to one PDF.
struct FixedIndex(Option<String>);

impl PaperIndex for FixedIndex {
    fn name(&self) -> &str {
        "fixed index"
    }

    fn paper_id(&self, url: &str) -> Option<String> {
        url.strip_prefix("https://index.example/paper/")
            .map(str::to_string)
    }

    fn resolve_pdf<'a>(
        &'a self,
        _paper_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Option<String>> + Send + 'a>> {
        let pdf = self.0.clone();
        Box::pin(async move { pdf })
    }
}

struct OnePageBackend;

impl PdfBackend for OnePageBackend {
    fn page_texts(&self, _path: &Path) -> Result<Vec<Result<String, BackendError>>, BackendError> {
        Ok(vec![Ok("Deep learning for protein folding.".to_string())])
    }
}

fn acquirer(fetcher: Arc<ScriptedFetcher>) -> Acquirer {
    let extractor = TextExtractor::new(Arc::new(OnePageBackend));
    Acquirer::new(fetcher, extractor)
        .with_timeouts(FETCH_TIMEOUT, ARCHIVE_FETCH_TIMEOUT)
}

#[tokio::test]
async fn direct_pdf_is_extracted() {
    let fetcher = Arc::new(ScriptedFetcher::default().serve_pdf("https://site.example/paper.pdf"));
    let doc = acquirer(fetcher.clone())
        .fetch_document_text("https://site.example/paper.pdf")
        .await
        .unwrap();
    assert_eq!(doc.text(), "Deep learning for protein folding.");
    assert_eq!(fetcher.requested(), vec!["https://site.example/paper.pdf"]);
}

#[tokio::test]
async fn archive_snapshot_is_used_when_direct_fetch_fails() {
    let snapshot = "https://web.archive.org/web/2020/https://dead.example/p.pdf";
    let fetcher = Arc::new(
        ScriptedFetcher::default()
            .fail("https://dead.example/p.pdf", 403)
            .serve_pdf(snapshot),
    );
    let acq = acquirer(fetcher.clone())
        .with_archive(Arc::new(FixedArchive(Some(snapshot.to_string()))));

    let pdf = acq.acquire_pdf("https://dead.example/p.pdf").await.unwrap();
    assert_eq!(pdf.url, snapshot);
    assert_eq!(pdf.bytes, PDF_BYTES);
    assert_eq!(
        fetcher.requested(),
        vec!["https://dead.example/p.pdf", snapshot]
    );
    // Snapshots are slower to serve and get the longer budget.
    assert_eq!(fetcher.timeouts(), vec![FETCH_TIMEOUT, ARCHIVE_FETCH_TIMEOUT]);
}

#[tokio::test]
async fn no_snapshot_means_acquisition_failure() {
    let fetcher = Arc::new(ScriptedFetcher::default().fail("https://dead.example/p.pdf", 500));
    let acq = acquirer(fetcher).with_archive(Arc::new(FixedArchive(None)));

    let err = acq.acquire_pdf("https://dead.example/p.pdf").await.unwrap_err();
    match err {
        CoreError::AcquisitionFailed { url, reason } => {
            assert_eq!(url, "https://dead.example/p.pdf");
            assert!(reason.contains("direct"), "reason: {reason}");
            assert!(reason.contains("archive"), "reason: {reason}");
        }
        other => panic!("expected AcquisitionFailed, got {other:?}"),
    }
}

#[tokio::test]
async fn relative_pdf_link_in_landing_page_is_followed() {
    let html = r#"<html><head>
        <meta name="citation_pdf_url" content="/x.pdf">
        </head><body><a href="/other.pdf">other</a></body></html>"#;
    let fetcher = Arc::new(
        ScriptedFetcher::default()
            .serve_html("https://site.example/paper", html)
            .serve_pdf("https://site.example/x.pdf"),
    );

    let pdf = acquirer(fetcher.clone())
        .acquire_pdf("https://site.example/paper")
        .await
        .unwrap();
    assert_eq!(pdf.url, "https://site.example/x.pdf");
    assert_eq!(
        fetcher.requested(),
        vec!["https://site.example/paper", "https://site.example/x.pdf"]
    );
    assert_eq!(fetcher.timeouts(), vec![FETCH_TIMEOUT, FETCH_TIMEOUT]);
}

#[tokio::test]
async fn landing_page_without_pdf_link_fails() {
    let fetcher = Arc::new(ScriptedFetcher::default().serve_html(
        "https://site.example/paper",
        "<html><body><p>Abstract only.</p><a href=\"#top\">top</a></body></html>",
    ));

    let err = acquirer(fetcher)
        .acquire_pdf("https://site.example/paper")
        .await
        .unwrap_err();
    match err {
        CoreError::AcquisitionFailed { reason, .. } => {
            assert!(reason.contains("linked-pdf"), "reason: {reason}");
        }
        other => panic!("expected AcquisitionFailed, got {other:?}"),
    }
}

#[tokio::test]
async fn linked_document_must_be_a_pdf() {
    let fetcher = Arc::new(
        ScriptedFetcher::default()
            .serve_html(
                "https://site.example/paper",
                r#"<a href="/download/paper.pdf">PDF</a>"#,
            )
            .serve_html("https://site.example/download/paper.pdf", "<html>login</html>"),
    );

    let err = acquirer(fetcher)
        .acquire_pdf("https://site.example/paper")
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::AcquisitionFailed { .. }));
}

#[tokio::test]
async fn index_identifier_is_resolved_first() {
    let fetcher = Arc::new(ScriptedFetcher::default().serve_pdf("https://oa.example/full.pdf"));
    let acq = acquirer(fetcher.clone()).with_index(Arc::new(FixedIndex(Some(
        "https://oa.example/full.pdf".into(),
    ))));

    let pdf = acq
        .acquire_pdf("https://index.example/paper/abc123")
        .await
        .unwrap();
    assert_eq!(pdf.url, "https://oa.example/full.pdf");
    assert_eq!(fetcher.requested(), vec!["https://oa.example/full.pdf"]);
    assert_eq!(fetcher.timeouts(), vec![FETCH_TIMEOUT]);
}

#[tokio::test]
async fn unresolved_identifier_falls_back_to_the_original_url() {
    let fetcher = Arc::new(
        ScriptedFetcher::default().serve_pdf("https://index.example/paper/abc123"),
    );
    let acq = acquirer(fetcher.clone()).with_index(Arc::new(FixedIndex(None)));

    let pdf = acq
        .acquire_pdf("https://index.example/paper/abc123")
        .await
        .unwrap();
    assert_eq!(pdf.url, "https://index.example/paper/abc123");
}
