//! Plain-text extraction from PDF and UTF-8 text payloads.

use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Arc;

use crate::backend::PdfBackend;
use crate::{CoreError, ExtractedDocument};

/// The two payload kinds the extractor understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    Txt,
}

impl DocumentKind {
    /// Pick the kind from a filename extension (case-insensitive).
    pub fn from_filename(name: &str) -> Option<Self> {
        let ext = Path::new(name).extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "pdf" => Some(DocumentKind::Pdf),
            "txt" => Some(DocumentKind::Txt),
            _ => None,
        }
    }
}

/// Returns true when `bytes` start with the PDF magic number.
pub fn is_pdf_bytes(bytes: &[u8]) -> bool {
    bytes.starts_with(b"%PDF-")
}

/// Turns PDF or text payloads into an [`ExtractedDocument`].
///
/// All methods block; async callers should run them on
/// `tokio::task::spawn_blocking`.
#[derive(Clone)]
pub struct TextExtractor {
    backend: Arc<dyn PdfBackend>,
    max_chars: Option<usize>,
}

impl TextExtractor {
    pub fn new(backend: Arc<dyn PdfBackend>) -> Self {
        Self {
            backend,
            max_chars: None,
        }
    }

    /// Cap the extracted text at `max_chars` characters; longer documents are
    /// cut and flagged as truncated.
    pub fn with_max_chars(mut self, max_chars: usize) -> Self {
        self.max_chars = Some(max_chars);
        self
    }

    /// Extract text from a file on disk.
    pub fn extract_path(
        &self,
        path: &Path,
        kind: DocumentKind,
    ) -> Result<ExtractedDocument, CoreError> {
        match kind {
            DocumentKind::Pdf => self.extract_pdf_path(path),
            DocumentKind::Txt => {
                let bytes = std::fs::read(path)?;
                self.decode_txt(&bytes)
            }
        }
    }

    /// Extract text from a seekable stream. The stream is rewound first, so a
    /// partially consumed reader is fine.
    pub fn extract_reader<R: Read + Seek>(
        &self,
        reader: &mut R,
        kind: DocumentKind,
    ) -> Result<ExtractedDocument, CoreError> {
        reader.seek(SeekFrom::Start(0))?;
        match kind {
            DocumentKind::Pdf => {
                let mut file = tempfile::Builder::new()
                    .prefix("researchflow-")
                    .suffix(".pdf")
                    .tempfile()?;
                std::io::copy(reader, &mut file)?;
                file.flush()?;
                // `file` is removed on drop, whichever way this returns.
                self.extract_pdf_path(file.path())
            }
            DocumentKind::Txt => {
                let mut bytes = Vec::new();
                reader.read_to_end(&mut bytes)?;
                self.decode_txt(&bytes)
            }
        }
    }

    /// Extract text from an in-memory payload.
    pub fn extract_bytes(
        &self,
        bytes: &[u8],
        kind: DocumentKind,
    ) -> Result<ExtractedDocument, CoreError> {
        self.extract_reader(&mut std::io::Cursor::new(bytes), kind)
    }

    fn extract_pdf_path(&self, path: &Path) -> Result<ExtractedDocument, CoreError> {
        let pages = self
            .backend
            .page_texts(path)
            .map_err(|e| CoreError::ExtractionFailed(e.to_string()))?;
        let page_count = pages.len();

        let mut decoded = Vec::with_capacity(page_count);
        for (index, page) in pages.into_iter().enumerate() {
            match page {
                Ok(text) if !text.trim().is_empty() => decoded.push(text),
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(page = index + 1, error = %e, "skipping unreadable PDF page");
                }
            }
        }

        let text = decoded.join("\n\n").trim().to_string();
        if text.is_empty() {
            return Err(CoreError::ExtractionFailed(format!(
                "no readable text in {page_count} page(s)"
            )));
        }
        tracing::debug!(pages = page_count, chars = text.len(), "extracted PDF text");
        Ok(ExtractedDocument::new(text, page_count, self.max_chars))
    }

    fn decode_txt(&self, bytes: &[u8]) -> Result<ExtractedDocument, CoreError> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| CoreError::ExtractionFailed(format!("text is not valid UTF-8: {e}")))?
            .trim();
        if text.is_empty() {
            return Err(CoreError::ExtractionFailed("text file is empty".into()));
        }
        Ok(ExtractedDocument::new(text.to_string(), 1, self.max_chars))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::backend::BackendError;
    use std::io::Cursor;
    use std::sync::Mutex;

    /// Backend returning canned pages and recording the paths it was given.
    pub(crate) struct FakeBackend {
        pub pages: Vec<Result<String, String>>,
        pub seen_paths: Mutex<Vec<std::path::PathBuf>>,
    }

    impl FakeBackend {
        pub fn new(pages: Vec<Result<&str, &str>>) -> Self {
            Self {
                pages: pages
                    .into_iter()
                    .map(|p| p.map(str::to_string).map_err(str::to_string))
                    .collect(),
                seen_paths: Mutex::new(Vec::new()),
            }
        }
    }

    impl PdfBackend for FakeBackend {
        fn page_texts(
            &self,
            path: &Path,
        ) -> Result<Vec<Result<String, BackendError>>, BackendError> {
            assert!(path.exists(), "backend should see a real file");
            self.seen_paths.lock().unwrap().push(path.to_path_buf());
            Ok(self
                .pages
                .iter()
                .enumerate()
                .map(|(i, p)| match p {
                    Ok(text) => Ok(text.clone()),
                    Err(reason) => Err(BackendError::PageError {
                        page: i + 1,
                        reason: reason.clone(),
                    }),
                })
                .collect())
        }
    }

    struct BrokenBackend;

    impl PdfBackend for BrokenBackend {
        fn page_texts(
            &self,
            _path: &Path,
        ) -> Result<Vec<Result<String, BackendError>>, BackendError> {
            Err(BackendError::OpenError("not a PDF".into()))
        }
    }

    fn extractor(pages: Vec<Result<&str, &str>>) -> (TextExtractor, Arc<FakeBackend>) {
        let backend = Arc::new(FakeBackend::new(pages));
        (TextExtractor::new(backend.clone()), backend)
    }

    #[test]
    fn unreadable_pages_are_skipped() {
        let (ex, _) = extractor(vec![Ok("  Intro  "), Err("bad xref"), Ok("Results\n")]);
        let doc = ex.extract_bytes(b"%PDF-1.7", DocumentKind::Pdf).unwrap();
        assert_eq!(doc.text(), "Intro  \n\nResults");
        assert_eq!(doc.page_count(), 3);
    }

    #[test]
    fn zero_pages_is_an_error() {
        let (ex, _) = extractor(vec![]);
        assert!(matches!(
            ex.extract_bytes(b"%PDF-1.7", DocumentKind::Pdf),
            Err(CoreError::ExtractionFailed(_))
        ));
    }

    #[test]
    fn all_pages_unreadable_is_an_error() {
        let (ex, _) = extractor(vec![Err("a"), Ok("   "), Err("b")]);
        assert!(matches!(
            ex.extract_bytes(b"%PDF-1.7", DocumentKind::Pdf),
            Err(CoreError::ExtractionFailed(_))
        ));
    }

    #[test]
    fn open_failure_is_extraction_failure() {
        let ex = TextExtractor::new(Arc::new(BrokenBackend));
        assert!(matches!(
            ex.extract_bytes(b"garbage", DocumentKind::Pdf),
            Err(CoreError::ExtractionFailed(_))
        ));
    }

    #[test]
    fn pdf_temp_file_is_removed() {
        let (ex, backend) = extractor(vec![Ok("text")]);
        ex.extract_bytes(b"%PDF-1.4", DocumentKind::Pdf).unwrap();
        let seen = backend.seen_paths.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(!seen[0].exists());
    }

    #[test]
    fn reader_is_rewound_before_reading() {
        let (ex, _) = extractor(vec![]);
        let mut cursor = Cursor::new(b"  full text body \n".to_vec());
        let mut skip = [0u8; 6];
        cursor.read_exact(&mut skip).unwrap();
        let doc = ex.extract_reader(&mut cursor, DocumentKind::Txt).unwrap();
        assert_eq!(doc.text(), "full text body");
    }

    #[test]
    fn txt_must_be_utf8_and_non_empty() {
        let (ex, _) = extractor(vec![]);
        assert!(matches!(
            ex.extract_bytes(&[0xff, 0xfe, 0x00], DocumentKind::Txt),
            Err(CoreError::ExtractionFailed(_))
        ));
        assert!(matches!(
            ex.extract_bytes(b" \n\t ", DocumentKind::Txt),
            Err(CoreError::ExtractionFailed(_))
        ));
    }

    #[test]
    fn txt_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("paper.txt");
        std::fs::write(&path, "Abstract\nWe study things.").unwrap();
        let (ex, _) = extractor(vec![]);
        let doc = ex.extract_path(&path, DocumentKind::Txt).unwrap();
        assert_eq!(doc.text(), "Abstract\nWe study things.");
    }

    #[test]
    fn max_chars_truncates() {
        let (ex, _) = extractor(vec![]);
        let ex = ex.with_max_chars(5);
        let doc = ex.extract_bytes(b"abcdefghij", DocumentKind::Txt).unwrap();
        assert_eq!(doc.text(), "abcde");
        assert!(doc.is_truncated());
    }

    #[test]
    fn kind_from_filename() {
        assert_eq!(DocumentKind::from_filename("a.PDF"), Some(DocumentKind::Pdf));
        assert_eq!(DocumentKind::from_filename("notes.txt"), Some(DocumentKind::Txt));
        assert_eq!(DocumentKind::from_filename("paper.docx"), None);
        assert_eq!(DocumentKind::from_filename("README"), None);
    }

    #[test]
    fn pdf_magic() {
        assert!(is_pdf_bytes(b"%PDF-1.5\n..."));
        assert!(!is_pdf_bytes(b"<!DOCTYPE html>"));
    }
}
