use std::path::Path;

use mupdf::{Document, Page, TextPageFlags};

use researchflow_core::{BackendError, PdfBackend};

/// MuPDF-based implementation of [`PdfBackend`].
///
/// This crate is the sole AGPL island: it isolates the mupdf dependency so
/// that the rest of the workspace does not transitively depend on it.
#[derive(Debug, Default, Clone, Copy)]
pub struct MupdfBackend;

impl MupdfBackend {
    pub fn new() -> Self {
        Self
    }
}

impl PdfBackend for MupdfBackend {
    fn page_texts(&self, path: &Path) -> Result<Vec<Result<String, BackendError>>, BackendError> {
        let path_str = path
            .to_str()
            .ok_or_else(|| BackendError::OpenError("invalid path encoding".into()))?;

        let document =
            Document::open(path_str).map_err(|e| BackendError::OpenError(e.to_string()))?;

        let pages = document
            .pages()
            .map_err(|e| BackendError::OpenError(e.to_string()))?;

        let mut texts = Vec::new();
        for (index, page_result) in pages.enumerate() {
            let page_number = index + 1;
            let text = page_result
                .map_err(|e| e.to_string())
                .and_then(|page| page_text(&page))
                .map_err(|reason| BackendError::PageError {
                    page: page_number,
                    reason,
                });
            if let Err(e) = &text {
                tracing::debug!(error = %e, "mupdf could not decode page");
            }
            texts.push(text);
        }
        Ok(texts)
    }
}

/// Text of one page, block by block and line by line.
fn page_text(page: &Page) -> Result<String, String> {
    let text_page = page
        .to_text_page(TextPageFlags::empty())
        .map_err(|e| e.to_string())?;

    let mut out = String::new();
    for block in text_page.blocks() {
        for line in block.lines() {
            let line_text: String = line
                .chars()
                .map(|c| c.char().unwrap_or('\u{FFFD}'))
                .collect();
            out.push_str(line_text.trim_end());
            out.push('\n');
        }
        // Blank line between blocks keeps paragraphs apart.
        out.push('\n');
    }
    Ok(out)
}
