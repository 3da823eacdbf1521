//! services/api/src/adapters/extractor.rs
//!
//! This module contains the text extraction adapter. It implements the
//! `TextExtractor` port: PDFs are read page by page with `lopdf`, images are
//! passed through the `tesseract` command-line tool.
//!
//! Extraction never fails outright. Every problem is reported as a page whose
//! text is a bracketed placeholder, so an upload always yields at least one page.

use async_trait::async_trait;
use lopdf::Document as PdfDocument;
use std::path::{Path, PathBuf};
use studyflow_core::domain::{ExtractedPage, FileType};
use studyflow_core::ports::TextExtractor;
use tokio::fs;
use tokio::process::Command;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

pub const OCR_UNAVAILABLE: &str =
    "[Image uploaded successfully but OCR is not available. Tesseract OCR needs to be installed.]";
pub const NO_IMAGE_TEXT: &str = "[No text could be extracted from this image]";
pub const NO_PDF_CONTENT: &str = "[No content could be extracted from this PDF]";

/// A `TextExtractor` for PDFs and images.
#[derive(Debug)]
pub struct DocumentExtractor {
    tesseract_path: String,
    ocr_available: OnceCell<bool>,
}

impl DocumentExtractor {
    pub fn new(tesseract_path: impl Into<String>) -> Self {
        Self {
            tesseract_path: tesseract_path.into(),
            ocr_available: OnceCell::new(),
        }
    }

    /// Runs `tesseract --version` once and remembers whether it worked.
    pub async fn ocr_available(&self) -> bool {
        *self
            .ocr_available
            .get_or_init(|| async {
                let available = Command::new(&self.tesseract_path)
                    .arg("--version")
                    .output()
                    .await
                    .map(|output| output.status.success())
                    .unwrap_or(false);
                if available {
                    info!("Tesseract OCR found at '{}'", self.tesseract_path);
                } else {
                    warn!(
                        "Tesseract OCR not found at '{}'; images will not be read",
                        self.tesseract_path
                    );
                }
                available
            })
            .await
    }

    async fn extract_image(&self, path: &Path) -> String {
        if !self.ocr_available().await {
            return OCR_UNAVAILABLE.to_string();
        }

        // tesseract <image> stdout
        let output = Command::new(&self.tesseract_path)
            .arg(path.as_os_str())
            .arg("stdout")
            .output()
            .await;

        match output {
            Ok(output) if output.status.success() => {
                let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
                if text.is_empty() {
                    NO_IMAGE_TEXT.to_string()
                } else {
                    debug!("OCR extracted {} characters from {}", text.len(), path.display());
                    text
                }
            }
            Ok(output) => format!(
                "[Error extracting text: tesseract exited with {}: {}]",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ),
            Err(e) => format!("[Error extracting text: {}]", e),
        }
    }
}

fn single_page(text: impl Into<String>) -> Vec<ExtractedPage> {
    vec![ExtractedPage {
        page_number: 1,
        text: text.into(),
    }]
}

/// Reads every page of a PDF. Runs on a blocking thread.
fn extract_pdf(path: &Path) -> Vec<ExtractedPage> {
    let document = match PdfDocument::load(path) {
        Ok(document) => document,
        Err(e) => return single_page(format!("[Error reading PDF: {}]", e)),
    };

    let pages: Vec<ExtractedPage> = document
        .get_pages()
        .keys()
        .enumerate()
        .map(|(index, &pdf_page)| {
            let page_number = index as u32 + 1;
            let text = match document.extract_text(&[pdf_page]) {
                Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
                Ok(_) => format!("[Page {} - No text could be extracted]", page_number),
                Err(e) => format!("[Error extracting text from page {}: {}]", page_number, e),
            };
            ExtractedPage { page_number, text }
        })
        .collect();

    if pages.is_empty() {
        return single_page(NO_PDF_CONTENT);
    }
    pages
}

#[async_trait]
impl TextExtractor for DocumentExtractor {
    async fn extract(&self, path: &Path, file_type: FileType) -> Vec<ExtractedPage> {
        match fs::metadata(path).await {
            Ok(meta) if meta.len() == 0 => return single_page("[Error opening file: File is empty]"),
            Ok(_) => {}
            Err(e) => return single_page(format!("[Error opening file: {}]", e)),
        }

        let pages = match file_type {
            FileType::Pdf => {
                let owned: PathBuf = path.to_path_buf();
                tokio::task::spawn_blocking(move || extract_pdf(&owned))
                    .await
                    .unwrap_or_else(|e| single_page(format!("[Error reading PDF: {}]", e)))
            }
            t if t.is_image() => single_page(self.extract_image(path).await),
            _ => single_page("[Error extracting text: Unsupported file type]"),
        };

        info!("Extracted {} page(s) from {}", pages.len(), path.display());
        pages
    }
}
