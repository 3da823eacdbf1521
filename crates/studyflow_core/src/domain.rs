//! crates/studyflow_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any storage or serialization format.

use chrono::{DateTime, Utc};

/// The kinds of source files a document can be built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Pdf,
    Png,
    Jpg,
    Jpeg,
    Unknown,
}

impl FileType {
    /// Detects the type from a file name's extension, ignoring case.
    pub fn from_file_name(file_name: &str) -> Self {
        match file_name.rsplit_once('.') {
            Some((_, ext)) => Self::from_extension(ext),
            None => FileType::Unknown,
        }
    }

    pub fn from_extension(ext: &str) -> Self {
        match ext.to_ascii_lowercase().as_str() {
            "pdf" => FileType::Pdf,
            "png" => FileType::Png,
            "jpg" => FileType::Jpg,
            "jpeg" => FileType::Jpeg,
            _ => FileType::Unknown,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            FileType::Pdf => "pdf",
            FileType::Png => "png",
            FileType::Jpg => "jpg",
            FileType::Jpeg => "jpeg",
            FileType::Unknown => "unknown",
        }
    }

    pub fn is_image(&self) -> bool {
        matches!(self, FileType::Png | FileType::Jpg | FileType::Jpeg)
    }

    /// Only PDFs and images can be uploaded.
    pub fn is_supported(&self) -> bool {
        !matches!(self, FileType::Unknown)
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            FileType::Pdf => "application/pdf",
            FileType::Png => "image/png",
            FileType::Jpg | FileType::Jpeg => "image/jpeg",
            FileType::Unknown => "application/octet-stream",
        }
    }
}

/// One unit of extracted content with its derived summary and the user's notes.
///
/// `page_number` is positional: it always equals the page's index in
/// `Document::pages` plus one, and is rewritten after every insertion or removal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub page_number: u32,
    pub text: String,
    pub summary: String,
    pub notes: String,
}

impl Page {
    pub fn new(page_number: u32, text: impl Into<String>) -> Self {
        Self {
            page_number,
            text: text.into(),
            summary: String::new(),
            notes: String::new(),
        }
    }
}

/// The raw output of text extraction, before it becomes part of a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedPage {
    pub page_number: u32,
    pub text: String,
}

/// Tracks which stored files make up a document's source artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceState {
    /// No source file is known (a stub created by add-page).
    Missing,
    /// A single uploaded file.
    Single { file: String },
    /// Several PDFs combined into `file`; `parts` lists the inputs in order.
    Merged { file: String, parts: Vec<String> },
    /// Several files that could not be combined. Each one remains accessible.
    Separate { files: Vec<String> },
}

impl SourceState {
    /// The file a client should download to see the whole document, if there is one.
    pub fn primary_file(&self) -> Option<&str> {
        match self {
            SourceState::Missing => None,
            SourceState::Single { file } | SourceState::Merged { file, .. } => Some(file),
            SourceState::Separate { files } => files.last().map(String::as_str),
        }
    }

    pub fn is_merged(&self) -> bool {
        matches!(self, SourceState::Merged { .. })
    }

    /// Every stored file that belongs to the document, oldest first.
    pub fn files(&self) -> Vec<&str> {
        match self {
            SourceState::Missing => Vec::new(),
            SourceState::Single { file } => vec![file],
            SourceState::Merged { file, parts } => {
                let mut files: Vec<&str> = parts.iter().map(String::as_str).collect();
                files.push(file);
                files
            }
            SourceState::Separate { files } => files.iter().map(String::as_str).collect(),
        }
    }
}

/// A document uploaded by a user, identified by `file_id`.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub file_id: String,
    pub original_name: String,
    pub file_type: FileType,
    pub file_url: Option<String>,
    pub download_url: Option<String>,
    pub pages: Vec<Page>,
    pub source: SourceState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document {
    /// An empty placeholder used when add-page targets an id with no stored record.
    pub fn stub(file_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            file_id: file_id.into(),
            original_name: String::new(),
            file_type: FileType::Unknown,
            file_url: None,
            download_url: None,
            pages: Vec::new(),
            source: SourceState::Missing,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn page(&self, page_number: u32) -> Option<&Page> {
        self.pages.iter().find(|p| p.page_number == page_number)
    }

    pub fn page_mut(&mut self, page_number: u32) -> Option<&mut Page> {
        self.pages.iter_mut().find(|p| p.page_number == page_number)
    }

    /// Appends extracted pages after the existing ones and returns how many were added.
    ///
    /// New pages are numbered from `pages.len() + 1` in extraction order; existing
    /// pages keep their numbers.
    pub fn append_pages(&mut self, extracted: Vec<ExtractedPage>) -> usize {
        let start_page_num = self.pages.len() as u32 + 1;
        let added = extracted.len();
        for (i, page) in extracted.into_iter().enumerate() {
            self.pages.push(Page::new(start_page_num + i as u32, page.text));
        }
        added
    }

    /// Drops the page with the given number, then renumbers what is left by position.
    ///
    /// Returns whether a page was removed. Renumbering happens either way.
    pub fn remove_page(&mut self, page_number: u32) -> bool {
        let before = self.pages.len();
        self.pages.retain(|p| p.page_number != page_number);
        self.renumber();
        self.pages.len() != before
    }

    pub fn renumber(&mut self) {
        for (i, page) in self.pages.iter_mut().enumerate() {
            page.page_number = i as u32 + 1;
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Everything an assistant needs to answer a question about a document.
#[derive(Debug, Clone)]
pub struct QaContext {
    pub document_id: String,
    /// The page the question was scoped to, if any.
    pub page_number: Option<u32>,
    /// The pages in scope: the requested page, or all of them.
    pub pages: Vec<Page>,
    /// The number of the document's first page.
    pub first_page_number: u32,
}

impl QaContext {
    /// The in-scope page texts joined together, with page markers when there are several.
    pub fn combined_text(&self) -> String {
        if self.pages.len() == 1 {
            return self.pages[0].text.clone();
        }
        self.pages
            .iter()
            .map(|p| format!("--- Page {} ---\n{}", p.page_number, p.text))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    pub fn is_blank(&self) -> bool {
        self.pages.iter().all(|p| p.text.trim().is_empty())
    }
}

/// Text produced by an assistant, with the generative model that wrote it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssistantReply {
    pub text: String,
    /// `None` when the text came from the deterministic fallback.
    pub model: Option<String>,
}

impl AssistantReply {
    pub fn fallback(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            model: None,
        }
    }
}
