use std::path::Path;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("failed to open PDF: {0}")]
    OpenError(String),
    #[error("failed to decode page {page}: {reason}")]
    PageError { page: usize, reason: String },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Trait for PDF text-layer backends.
///
/// Implementors only decode pages; joining, trimming and the empty-document
/// check live in [`crate::extract::TextExtractor`].
pub trait PdfBackend: Send + Sync {
    /// Decode every page of the PDF at `path`, in order.
    ///
    /// The outer error means the document itself could not be opened. A page
    /// whose text layer cannot be decoded yields an inner `Err` and the
    /// remaining pages are still returned.
    fn page_texts(&self, path: &Path) -> Result<Vec<Result<String, BackendError>>, BackendError>;
}
