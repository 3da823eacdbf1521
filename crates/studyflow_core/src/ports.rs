//! crates/studyflow_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of specific implementations like the filesystem, OCR engines,
//! object storage, or generative-model APIs.

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::domain::{AssistantReply, Document, ExtractedPage, FileType, QaContext};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., disk, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Stored data is corrupt: {0}")]
    Corrupt(String),
    #[error("Service unavailable: {0}")]
    Unavailable(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

/// Persists one record per document id in a single canonical location.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Loads a document. Missing records are `NotFound`; undecodable ones are `Corrupt`.
    async fn get(&self, file_id: &str) -> PortResult<Document>;

    /// Writes a document, replacing any previous record with the same id.
    async fn put(&self, document: &Document) -> PortResult<()>;
}

/// Stores uploaded source files and generated artifacts (merged PDFs).
#[async_trait]
pub trait FileStorage: Send + Sync {
    /// Saves bytes under `file_name` and returns the stored file's local path.
    async fn save(&self, file_name: &str, data: &[u8]) -> PortResult<PathBuf>;

    /// The local path a stored file lives at (whether or not it exists yet).
    fn path_for(&self, file_name: &str) -> PathBuf;

    /// The URL clients use to download a stored file.
    fn download_url(&self, file_name: &str) -> String;
}

/// A located object in remote storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub key: String,
    pub url: String,
}

/// Mirrors source files into a cloud bucket.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Uploads a file and returns where it can be fetched from.
    async fn upload(
        &self,
        file_id: &str,
        original_name: &str,
        file_type: FileType,
        data: &[u8],
    ) -> PortResult<StoredObject>;

    /// Looks for an uploaded object whose key carries the given document id.
    async fn find(&self, file_id: &str) -> PortResult<Option<StoredObject>>;
}

/// Turns a stored file into ordered page records.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    /// Never fails and never returns an empty list: every failure becomes a
    /// single page carrying a bracketed error text such as `"[Error opening file: ...]"`.
    async fn extract(&self, path: &Path, file_type: FileType) -> Vec<ExtractedPage>;
}

/// Combines several PDFs into one.
#[async_trait]
pub trait PdfMerger: Send + Sync {
    /// Writes the pages of `inputs`, in order, to `output` and returns the page count.
    async fn merge(&self, inputs: &[PathBuf], output: &Path) -> PortResult<usize>;
}

/// Produces natural-language output about page text.
#[async_trait]
pub trait AssistantService: Send + Sync {
    /// Summarizes a single page of text. `model` selects a catalogue entry, if supported.
    async fn summarize(&self, text: &str, model: Option<&str>) -> PortResult<AssistantReply>;

    /// Answers a question based on the pages in `context`.
    async fn answer_question(
        &self,
        question: &str,
        context: &QaContext,
        model: Option<&str>,
    ) -> PortResult<AssistantReply>;
}
