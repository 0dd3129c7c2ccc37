use crate::error::IngestError;
use crate::models::PageDocument;
use lopdf::Document;
use std::path::Path;

/// Pulls raw per-page text out of a PDF file.
pub trait PdfExtractor: Send + Sync {
    /// One entry per physical page, in page order, `page` starting at 1.
    fn extract_pages(&self, path: &Path) -> Result<Vec<PageDocument>, IngestError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfExtractor;

impl PdfExtractor for LopdfExtractor {
    fn extract_pages(&self, path: &Path) -> Result<Vec<PageDocument>, IngestError> {
        if !path.is_file() {
            return Err(IngestError::pdf_parse(path, "file does not exist or is not a regular file"));
        }

        let document = Document::load(path).map_err(|error| IngestError::pdf_parse(path, error))?;
        let source = path.to_string_lossy().to_string();

        let mut pages = Vec::new();
        for (index, (page_no, _page_id)) in document.get_pages().into_iter().enumerate() {
            let text = document
                .extract_text(&[page_no])
                .map_err(|error| IngestError::pdf_parse(path, format!("page {page_no}: {error}")))?;

            pages.push(PageDocument {
                text,
                source: source.clone(),
                page: index as u32 + 1,
            });
        }

        Ok(pages)
    }
}
