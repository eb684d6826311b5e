//! PDF page text extraction.
//!
//! Uses pdf-extract to pull the text layer out of a PDF one page at a time,
//! then normalizes the whitespace of each page.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, error, info};

use super::{validate_range, PageSource, ProviderError, ProviderResult};
use crate::models::PageText;

static WHITESPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Collapse every whitespace run (newlines included) to a single space.
///
/// Leading and trailing whitespace is collapsed, not removed.
pub fn normalize_page_text(text: &str) -> String {
    let text = text.replace('\n', " ");
    WHITESPACE_RUN.replace_all(&text, " ").into_owned()
}

/// Normalize every extracted page, keeping page order and blank pages.
pub fn normalize_pages(raw_pages: Vec<String>) -> Vec<PageText> {
    raw_pages.iter().map(|page| normalize_page_text(page)).collect()
}

/// Page source backed by a PDF file on disk.
///
/// The text layer is extracted once, when the extractor is opened.
#[derive(Debug, Clone)]
pub struct PdfTextExtractor {
    path: PathBuf,
    name: String,
    pages: Vec<PageText>,
}

impl PdfTextExtractor {
    /// Open a PDF and extract the text of every page.
    ///
    /// # Errors
    /// Returns `ProviderError::NotFound` if the file does not exist,
    /// `ProviderError::InvalidFile` if it does not have a `.pdf` extension, and
    /// `ProviderError::ExtractionError` if the PDF cannot be parsed
    pub async fn open(path: impl AsRef<Path>) -> ProviderResult<Self> {
        let path = path.as_ref().to_path_buf();

        if !path.exists() {
            error!("The file '{}' does not exist.", path.display());
            return Err(ProviderError::NotFound(path.display().to_string()));
        }
        let is_pdf = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));
        if !is_pdf {
            error!("The file '{}' is not a PDF.", path.display());
            return Err(ProviderError::InvalidFile(format!(
                "{} is not a PDF",
                path.display()
            )));
        }

        let bytes = tokio::fs::read(&path).await?;
        let raw_pages =
            tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem_by_pages(&bytes))
                .await
                .map_err(|e| ProviderError::ExtractionError(e.to_string()))?
                .map_err(|e| ProviderError::ExtractionError(e.to_string()))?;

        let pages = normalize_pages(raw_pages);
        info!("Extracted {} pages from {}", pages.len(), path.display());

        Ok(Self {
            name: format!("pdf:{}", path.display()),
            path,
            pages,
        })
    }

    /// Path of the underlying PDF.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl PageSource for PdfTextExtractor {
    fn page_count(&self) -> usize {
        self.pages.len()
    }

    async fn get_pages(&self, start_page: usize, end_page: Option<usize>) -> ProviderResult<Vec<PageText>> {
        let end_page = validate_range(start_page, end_page, self.pages.len())?;
        debug!("Reading pages {}..={} of {}", start_page, end_page, self.name);

        Ok(self
            .pages
            .get(start_page - 1..end_page)
            .map(|pages| pages.to_vec())
            .unwrap_or_default())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
