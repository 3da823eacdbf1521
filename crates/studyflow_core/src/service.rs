//! crates/studyflow_core/src/service.rs
//!
//! The document page-lifecycle workflow: upload, add-page, remove-page, analyze,
//! notes, and question answering. Every read-modify-write of a document runs
//! under that document's lock, so concurrent mutations of one id never overwrite
//! each other.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::domain::{AssistantReply, Document, FileType, Page, QaContext, SourceState};
use crate::heuristics::ERROR_MARKER;
use crate::ports::{
    AssistantService, DocumentStore, FileStorage, ObjectStorage, PdfMerger, PortError,
    TextExtractor,
};

//=========================================================================================
// Fixed User-Facing Texts
//=========================================================================================

/// Texts shorter than this (in characters) are not worth summarizing.
pub const MIN_SUMMARY_CHARS: usize = 100;

pub const TOO_SHORT_SUMMARY: &str = "Text too short to summarize meaningfully.";
pub const EXTRACTION_ERROR_SUMMARY: &str =
    "Could not generate summary due to text extraction error.";
pub const EMPTY_PAGE_SUMMARY: &str = "No text available to summarize.";
pub const SUMMARY_FAILED: &str = "Error generating summary.";

pub const DOCUMENT_NOT_FOUND_ANSWER: &str =
    "Document not found or not processed yet. Please try uploading again.";
pub const CORRUPT_DOCUMENT_ANSWER: &str =
    "Document data could not be read. Please try uploading again.";
pub const NO_CONTENT_ANSWER: &str = "No content found in this document.";
pub const NO_TEXT_ANSWER: &str =
    "No readable text found in this document to answer the question.";
pub const ANSWER_FAILED: &str = "Error processing your question. Please try again.";

//=========================================================================================
// Service Error Type
//=========================================================================================

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("{0}")]
    InvalidInput(String),
    #[error("{0}")]
    NotFound(String),
    #[error(transparent)]
    Port(#[from] PortError),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

/// What an add-page call changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddPageOutcome {
    pub document_id: String,
    pub pages_added: usize,
    pub total_pages: usize,
    pub merged: bool,
}

//=========================================================================================
// Per-Document Locks
//=========================================================================================

/// Hands out one async mutex per document id.
#[derive(Default)]
pub struct DocumentLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl DocumentLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to `file_id`. Access ends when the guard is dropped.
    pub async fn acquire(&self, file_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            // Entries nobody holds or waits on only have the map's reference left.
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks.entry(file_id.to_string()).or_default().clone()
        };
        lock.lock_owned().await
    }

    /// The number of ids currently tracked.
    pub fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

//=========================================================================================
// The Document Service
//=========================================================================================

pub struct DocumentService {
    store: Arc<dyn DocumentStore>,
    files: Arc<dyn FileStorage>,
    extractor: Arc<dyn TextExtractor>,
    merger: Arc<dyn PdfMerger>,
    assistant: Arc<dyn AssistantService>,
    object_storage: Option<Arc<dyn ObjectStorage>>,
    locks: DocumentLocks,
}

impl DocumentService {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        files: Arc<dyn FileStorage>,
        extractor: Arc<dyn TextExtractor>,
        merger: Arc<dyn PdfMerger>,
        assistant: Arc<dyn AssistantService>,
    ) -> Self {
        Self {
            store,
            files,
            extractor,
            merger,
            assistant,
            object_storage: None,
            locks: DocumentLocks::new(),
        }
    }

    /// Mirrors uploads into a bucket and uses it to rebuild missing records.
    pub fn with_object_storage(mut self, object_storage: Arc<dyn ObjectStorage>) -> Self {
        self.object_storage = Some(object_storage);
        self
    }

    /// Stores a new source file, extracts its pages, and persists a fresh document.
    pub async fn upload(&self, original_name: &str, data: &[u8]) -> ServiceResult<Document> {
        let file_type = check_upload(original_name, data)?;
        let file_id = Uuid::new_v4().to_string();
        let file_name = format!("{}.{}", file_id, file_type.extension());

        let path = self.files.save(&file_name, data).await?;
        info!("Saved upload '{}' as {}", original_name, path.display());

        let pages = self.extractor.extract(&path, file_type).await;

        let mut document = Document::stub(&file_id);
        document.original_name = original_name.to_string();
        document.file_type = file_type;
        document.download_url = Some(self.files.download_url(&file_name));
        document.source = SourceState::Single { file: file_name };
        document.file_url = self
            .mirror_upload(&file_id, original_name, file_type, data)
            .await;
        let page_count = document.append_pages(pages);
        self.summarize_new_pages(&mut document, page_count).await;

        self.store.put(&document).await?;
        info!("Created document {} with {} page(s)", file_id, page_count);
        Ok(document)
    }

    /// Appends the pages of a newly uploaded file to an existing document.
    ///
    /// A missing record is replaced by a stub (rebuilt from object storage when
    /// possible). When both the document and the new file are PDFs the two are
    /// merged; a failed merge keeps both files as separate artifacts.
    pub async fn add_page(
        &self,
        file_id: &str,
        original_name: &str,
        data: &[u8],
    ) -> ServiceResult<AddPageOutcome> {
        check_document_id(file_id)?;
        let file_type = check_upload(original_name, data)?;

        let _guard = self.locks.acquire(file_id).await;
        let mut document = match self.store.get(file_id).await {
            Ok(document) => document,
            Err(PortError::NotFound(_)) => {
                warn!("Document {} not found; creating a new one", file_id);
                self.recover_stub(file_id).await
            }
            Err(e) => return Err(e.into()),
        };

        let file_name = format!(
            "{}_{}.{}",
            file_id,
            Uuid::new_v4().simple(),
            file_type.extension()
        );
        let path = self.files.save(&file_name, data).await?;
        let pages = self.extractor.extract(&path, file_type).await;
        let pages_added = document.append_pages(pages);
        self.summarize_new_pages(&mut document, pages_added).await;
        if document.original_name.is_empty() {
            document.original_name = original_name.to_string();
        }

        self.attach_source(&mut document, file_name, file_type).await;
        document.touch();
        self.store.put(&document).await?;

        info!(
            "Added {} page(s) to document {} ({} total)",
            pages_added,
            file_id,
            document.pages.len()
        );
        Ok(AddPageOutcome {
            document_id: document.file_id.clone(),
            pages_added,
            total_pages: document.pages.len(),
            merged: document.source.is_merged(),
        })
    }

    /// Removes the page with the given number and renumbers the rest from 1.
    ///
    /// An unknown page number leaves the pages as they are, but the document is
    /// still renumbered and saved.
    pub async fn remove_page(&self, file_id: &str, page_number: u32) -> ServiceResult<Document> {
        check_document_id(file_id)?;
        let _guard = self.locks.acquire(file_id).await;
        let mut document = self.load(file_id).await?;

        if document.remove_page(page_number) {
            info!("Removed page {} from document {}", page_number, file_id);
        } else {
            warn!("Document {} has no page {}", file_id, page_number);
        }

        document.touch();
        self.store.put(&document).await?;
        Ok(document)
    }

    /// Recomputes every page's summary.
    pub async fn analyze(&self, file_id: &str, model: Option<&str>) -> ServiceResult<Document> {
        check_document_id(file_id)?;
        let _guard = self.locks.acquire(file_id).await;
        let mut document = self.load(file_id).await?;

        for page in document.pages.iter_mut() {
            page.summary = self.page_summary(&page.text, model).await;
        }

        document.touch();
        self.store.put(&document).await?;
        info!("Analyzed {} page(s) of document {}", document.pages.len(), file_id);
        Ok(document)
    }

    pub async fn document(&self, file_id: &str) -> ServiceResult<Document> {
        check_document_id(file_id)?;
        self.load(file_id).await
    }

    /// Replaces the notes of one page.
    pub async fn update_notes(
        &self,
        file_id: &str,
        page_number: u32,
        notes: &str,
    ) -> ServiceResult<Page> {
        check_document_id(file_id)?;
        let _guard = self.locks.acquire(file_id).await;
        let mut document = self.load(file_id).await?;

        let page = document.page_mut(page_number).ok_or_else(|| {
            ServiceError::NotFound(format!(
                "Page {} not found in document {}",
                page_number, file_id
            ))
        })?;
        page.notes = notes.to_string();
        let page = page.clone();

        document.touch();
        self.store.put(&document).await?;
        Ok(page)
    }

    /// Summarizes one page of text. Never fails: problems become fixed texts.
    /// Degrading to a heuristic summary is the injected assistant's job.
    pub async fn summarize(&self, text: &str, model: Option<&str>) -> AssistantReply {
        if text.starts_with(ERROR_MARKER) {
            return AssistantReply::fallback(EXTRACTION_ERROR_SUMMARY);
        }
        if text.chars().count() < MIN_SUMMARY_CHARS {
            return AssistantReply::fallback(TOO_SHORT_SUMMARY);
        }

        match self.assistant.summarize(text, model).await {
            Ok(reply) => reply,
            Err(e) => {
                error!("Summary generation failed: {}", e);
                AssistantReply::fallback(SUMMARY_FAILED)
            }
        }
    }

    /// Answers a question about a whole document or one of its pages.
    ///
    /// Every failure is reported as a user-facing sentence instead of an error.
    pub async fn answer(
        &self,
        question: &str,
        file_id: &str,
        page_number: Option<u32>,
        model: Option<&str>,
    ) -> AssistantReply {
        if check_document_id(file_id).is_err() {
            return AssistantReply::fallback(DOCUMENT_NOT_FOUND_ANSWER);
        }

        let document = match self.store.get(file_id).await {
            Ok(document) => document,
            Err(PortError::NotFound(_)) => {
                return AssistantReply::fallback(DOCUMENT_NOT_FOUND_ANSWER)
            }
            Err(PortError::Corrupt(reason)) => {
                error!("Document {} is corrupt: {}", file_id, reason);
                return AssistantReply::fallback(CORRUPT_DOCUMENT_ANSWER);
            }
            Err(e) => {
                error!("Failed to load document {}: {}", file_id, e);
                return AssistantReply::fallback(ANSWER_FAILED);
            }
        };

        let Some(first_page) = document.pages.first() else {
            return AssistantReply::fallback(NO_CONTENT_ANSWER);
        };
        let first_page_number = first_page.page_number;

        let pages = match page_number {
            Some(n) => match document.page(n) {
                Some(page) => vec![page.clone()],
                None => {
                    return AssistantReply::fallback(format!(
                        "Page {} not found in this document.",
                        n
                    ))
                }
            },
            None => document.pages.clone(),
        };

        let context = QaContext {
            document_id: document.file_id.clone(),
            page_number,
            pages,
            first_page_number,
        };
        if context.is_blank() {
            return AssistantReply::fallback(NO_TEXT_ANSWER);
        }

        match self.assistant.answer_question(question, &context, model).await {
            Ok(reply) => reply,
            Err(e) => {
                error!("Failed to answer question about {}: {}", file_id, e);
                AssistantReply::fallback(ANSWER_FAILED)
            }
        }
    }

    //=====================================================================================
    // Helpers
    //=====================================================================================

    async fn page_summary(&self, text: &str, model: Option<&str>) -> String {
        if text.trim().is_empty() {
            return EMPTY_PAGE_SUMMARY.to_string();
        }
        self.summarize(text, model).await.text
    }

    /// Fills in the summaries of the last `count` pages, the ones just extracted.
    async fn summarize_new_pages(&self, document: &mut Document, count: usize) {
        let start = document.pages.len().saturating_sub(count);
        for page in document.pages[start..].iter_mut() {
            page.summary = self.page_summary(&page.text, None).await;
        }
    }

    async fn load(&self, file_id: &str) -> ServiceResult<Document> {
        self.store.get(file_id).await.map_err(|e| match e {
            PortError::NotFound(_) => {
                ServiceError::NotFound(format!("Document {} not found", file_id))
            }
            other => ServiceError::Port(other),
        })
    }

    async fn mirror_upload(
        &self,
        file_id: &str,
        original_name: &str,
        file_type: FileType,
        data: &[u8],
    ) -> Option<String> {
        let storage = self.object_storage.as_ref()?;
        match storage.upload(file_id, original_name, file_type, data).await {
            Ok(object) => {
                info!("Mirrored {} to object storage as {}", file_id, object.key);
                Some(object.url)
            }
            Err(e) => {
                warn!("Failed to mirror {} to object storage: {}", file_id, e);
                None
            }
        }
    }

    /// Builds the stand-in for a document whose record is gone.
    async fn recover_stub(&self, file_id: &str) -> Document {
        let mut stub = Document::stub(file_id);
        let Some(storage) = self.object_storage.as_ref() else {
            return stub;
        };

        match storage.find(file_id).await {
            Ok(Some(object)) => {
                info!("Recovered metadata for {} from object {}", file_id, object.key);
                stub.original_name = original_name_from_key(&object.key, file_id);
                stub.file_type = FileType::from_file_name(&object.key);
                stub.file_url = Some(object.url);
            }
            Ok(None) => {}
            Err(e) => warn!("Object storage lookup for {} failed: {}", file_id, e),
        }
        stub
    }

    /// Records a newly stored file in the document's source state, merging PDFs.
    async fn attach_source(&self, document: &mut Document, new_file: String, file_type: FileType) {
        let current = std::mem::replace(&mut document.source, SourceState::Missing);

        let next = match current {
            SourceState::Missing => {
                document.file_type = file_type;
                SourceState::Single { file: new_file }
            }
            SourceState::Single { file } if mergeable(document.file_type, file_type) => {
                self.merge_into(&document.file_id, file.clone(), vec![file], new_file)
                    .await
            }
            SourceState::Merged { file, parts } if mergeable(document.file_type, file_type) => {
                self.merge_into(&document.file_id, file, parts, new_file).await
            }
            SourceState::Single { file } | SourceState::Merged { file, .. } => {
                SourceState::Separate {
                    files: vec![file, new_file],
                }
            }
            SourceState::Separate { mut files } => {
                files.push(new_file);
                SourceState::Separate { files }
            }
        };
        document.source = next;

        if let Some(primary) = document.source.primary_file() {
            document.download_url = Some(self.files.download_url(primary));
        }
    }

    async fn merge_into(
        &self,
        file_id: &str,
        current: String,
        mut parts: Vec<String>,
        new_file: String,
    ) -> SourceState {
        let merged_name = format!("{}_merged_{}.pdf", file_id, Uuid::new_v4().simple());
        let inputs: Vec<PathBuf> = vec![
            self.files.path_for(&current),
            self.files.path_for(&new_file),
        ];

        match self
            .merger
            .merge(&inputs, &self.files.path_for(&merged_name))
            .await
        {
            Ok(page_count) => {
                info!(
                    "Merged {} and {} into {} ({} pages)",
                    current, new_file, merged_name, page_count
                );
                parts.push(new_file);
                SourceState::Merged {
                    file: merged_name,
                    parts,
                }
            }
            Err(e) => {
                warn!("PDF merge failed for {}, keeping files separate: {}", file_id, e);
                SourceState::Separate {
                    files: vec![current, new_file],
                }
            }
        }
    }
}

fn mergeable(document_type: FileType, new_type: FileType) -> bool {
    document_type == FileType::Pdf && new_type == FileType::Pdf
}

/// Validates an uploaded file's name and contents and returns its type.
fn check_upload(original_name: &str, data: &[u8]) -> ServiceResult<FileType> {
    if original_name.trim().is_empty() {
        return Err(ServiceError::InvalidInput("No selected file".to_string()));
    }
    let file_type = FileType::from_file_name(original_name);
    if !file_type.is_supported() {
        return Err(ServiceError::InvalidInput("File type not allowed".to_string()));
    }
    if data.is_empty() {
        return Err(ServiceError::InvalidInput("Uploaded file is empty".to_string()));
    }
    Ok(file_type)
}

/// Document ids become file names, so only a safe character set is accepted.
pub fn check_document_id(file_id: &str) -> ServiceResult<()> {
    let valid = !file_id.is_empty()
        && file_id.len() <= 128
        && file_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(ServiceError::InvalidInput(format!(
            "Invalid document id '{}'",
            file_id
        )))
    }
}

/// Turns `uploads/{stem}_{id}.{ext}` back into `{stem}.{ext}`.
fn original_name_from_key(key: &str, file_id: &str) -> String {
    let file_name = key.rsplit('/').next().unwrap_or(key);
    file_name.replacen(&format!("_{}", file_id), "", 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ExtractedPage;
    use crate::heuristics::HeuristicAssistant;
    use crate::ports::{PortResult, StoredObject};
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};

    //=====================================================================================
    // In-memory port implementations
    //=====================================================================================

    #[derive(Default)]
    struct MemoryStore {
        documents: AsyncMutex<HashMap<String, Document>>,
        corrupt: AsyncMutex<Vec<String>>,
    }

    #[async_trait]
    impl DocumentStore for MemoryStore {
        async fn get(&self, file_id: &str) -> PortResult<Document> {
            tokio::task::yield_now().await;
            if self.corrupt.lock().await.iter().any(|id| id == file_id) {
                return Err(PortError::Corrupt(file_id.to_string()));
            }
            self.documents
                .lock()
                .await
                .get(file_id)
                .cloned()
                .ok_or_else(|| PortError::NotFound(file_id.to_string()))
        }

        async fn put(&self, document: &Document) -> PortResult<()> {
            tokio::task::yield_now().await;
            self.documents
                .lock()
                .await
                .insert(document.file_id.clone(), document.clone());
            Ok(())
        }
    }

    /// Stores file contents in memory; each `|` in a file starts a new page.
    #[derive(Default)]
    struct MemoryFiles {
        files: Mutex<HashMap<PathBuf, Vec<u8>>>,
    }

    impl MemoryFiles {
        fn contents(&self, path: &Path) -> Option<Vec<u8>> {
            self.files.lock().unwrap().get(path).cloned()
        }

        fn exists(&self, file_name: &str) -> bool {
            self.files.lock().unwrap().contains_key(&self.path_for(file_name))
        }
    }

    #[async_trait]
    impl FileStorage for MemoryFiles {
        async fn save(&self, file_name: &str, data: &[u8]) -> PortResult<PathBuf> {
            let path = self.path_for(file_name);
            self.files.lock().unwrap().insert(path.clone(), data.to_vec());
            Ok(path)
        }

        fn path_for(&self, file_name: &str) -> PathBuf {
            PathBuf::from("/mem").join(file_name)
        }

        fn download_url(&self, file_name: &str) -> String {
            format!("/uploads/{}", file_name)
        }
    }

    struct SplitExtractor {
        files: Arc<MemoryFiles>,
    }

    #[async_trait]
    impl TextExtractor for SplitExtractor {
        async fn extract(&self, path: &Path, _file_type: FileType) -> Vec<ExtractedPage> {
            let text = self
                .files
                .contents(path)
                .map(|bytes| String::from_utf8_lossy(&bytes).to_string())
                .unwrap_or_else(|| "[Error opening file: missing]".to_string());
            text.split('|')
                .enumerate()
                .map(|(i, t)| ExtractedPage {
                    page_number: i as u32 + 1,
                    text: t.to_string(),
                })
                .collect()
        }
    }

    struct FakeMerger {
        fail: bool,
        files: Arc<MemoryFiles>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl PdfMerger for FakeMerger {
        async fn merge(&self, inputs: &[PathBuf], output: &Path) -> PortResult<usize> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(PortError::Unexpected("broken xref table".to_string()));
            }
            let mut combined = Vec::new();
            for input in inputs {
                combined.extend(self.files.contents(input).unwrap_or_default());
            }
            self.files.files.lock().unwrap().insert(output.to_path_buf(), combined);
            Ok(inputs.len())
        }
    }

    struct FailingAssistant;

    #[async_trait]
    impl AssistantService for FailingAssistant {
        async fn summarize(&self, _text: &str, _model: Option<&str>) -> PortResult<AssistantReply> {
            Err(PortError::Unavailable("model offline".to_string()))
        }

        async fn answer_question(
            &self,
            _question: &str,
            _context: &QaContext,
            _model: Option<&str>,
        ) -> PortResult<AssistantReply> {
            Err(PortError::Unavailable("model offline".to_string()))
        }
    }

    struct FakeBucket {
        objects: Vec<StoredObject>,
    }

    #[async_trait]
    impl ObjectStorage for FakeBucket {
        async fn upload(
            &self,
            file_id: &str,
            _original_name: &str,
            file_type: FileType,
            _data: &[u8],
        ) -> PortResult<StoredObject> {
            Ok(StoredObject {
                key: format!("uploads/{}.{}", file_id, file_type.extension()),
                url: format!("https://bucket.example/{}", file_id),
            })
        }

        async fn find(&self, file_id: &str) -> PortResult<Option<StoredObject>> {
            Ok(self.objects.iter().find(|o| o.key.contains(file_id)).cloned())
        }
    }

    struct Harness {
        service: Arc<DocumentService>,
        store: Arc<MemoryStore>,
        files: Arc<MemoryFiles>,
        merger: Arc<FakeMerger>,
    }

    fn harness_with(
        merge_fails: bool,
        assistant: Arc<dyn AssistantService>,
        bucket: Option<FakeBucket>,
    ) -> Harness {
        let store = Arc::new(MemoryStore::default());
        let files = Arc::new(MemoryFiles::default());
        let extractor = Arc::new(SplitExtractor {
            files: files.clone(),
        });
        let merger = Arc::new(FakeMerger {
            fail: merge_fails,
            files: files.clone(),
            calls: AtomicUsize::new(0),
        });
        let mut service = DocumentService::new(
            store.clone(),
            files.clone(),
            extractor,
            merger.clone(),
            assistant,
        );
        if let Some(bucket) = bucket {
            service = service.with_object_storage(Arc::new(bucket));
        }
        Harness {
            service: Arc::new(service),
            store,
            files,
            merger,
        }
    }

    fn harness() -> Harness {
        harness_with(false, Arc::new(HeuristicAssistant::new()), None)
    }

    fn numbers(document: &Document) -> Vec<u32> {
        document.pages.iter().map(|p| p.page_number).collect()
    }

    fn texts(document: &Document) -> Vec<&str> {
        document.pages.iter().map(|p| p.text.as_str()).collect()
    }

    fn long_text() -> String {
        "Cells are the basic building blocks of all living organisms and carry out many functions. "
            .repeat(4)
    }

    //=====================================================================================
    // Upload
    //=====================================================================================

    #[tokio::test]
    async fn upload_extracts_and_persists_pages() {
        let h = harness();
        let doc = h.service.upload("lecture.pdf", b"one|two|three").await.unwrap();

        assert_eq!(doc.file_type, FileType::Pdf);
        assert_eq!(doc.original_name, "lecture.pdf");
        assert_eq!(numbers(&doc), vec![1, 2, 3]);
        let expected_file = format!("{}.pdf", doc.file_id);
        assert_eq!(doc.source, SourceState::Single { file: expected_file.clone() });
        assert_eq!(doc.download_url, Some(format!("/uploads/{}", expected_file)));
        assert!(h.files.exists(&expected_file));

        let stored = h.store.get(&doc.file_id).await.unwrap();
        assert_eq!(stored, doc);
    }

    #[tokio::test]
    async fn upload_rejects_unsupported_or_empty_files() {
        let h = harness();
        assert!(matches!(
            h.service.upload("notes.docx", b"data").await,
            Err(ServiceError::InvalidInput(_))
        ));
        assert!(matches!(
            h.service.upload("scan.png", b"").await,
            Err(ServiceError::InvalidInput(_))
        ));
        assert!(matches!(
            h.service.upload("", b"data").await,
            Err(ServiceError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn upload_records_object_storage_url() {
        let h = harness_with(
            false,
            Arc::new(HeuristicAssistant::new()),
            Some(FakeBucket { objects: vec![] }),
        );
        let doc = h.service.upload("photo.JPG", b"text").await.unwrap();
        assert_eq!(doc.file_type, FileType::Jpg);
        assert_eq!(
            doc.file_url,
            Some(format!("https://bucket.example/{}", doc.file_id))
        );
    }

    //=====================================================================================
    // Add-page
    //=====================================================================================

    #[tokio::test]
    async fn add_page_appends_after_existing_pages() {
        let h = harness();
        let doc = h.service.upload("a.pdf", b"p1|p2").await.unwrap();

        let outcome = h
            .service
            .add_page(&doc.file_id, "b.pdf", b"p3|p4|p5")
            .await
            .unwrap();
        assert_eq!(outcome.pages_added, 3);
        assert_eq!(outcome.total_pages, 5);

        let stored = h.store.get(&doc.file_id).await.unwrap();
        assert_eq!(numbers(&stored), vec![1, 2, 3, 4, 5]);
        assert_eq!(texts(&stored), vec!["p1", "p2", "p3", "p4", "p5"]);
    }

    #[tokio::test]
    async fn add_page_keeps_existing_summaries_and_notes() {
        let h = harness();
        let doc = h.service.upload("a.pdf", b"p1").await.unwrap();
        h.service.update_notes(&doc.file_id, 1, "remember this").await.unwrap();

        h.service.add_page(&doc.file_id, "b.png", b"p2").await.unwrap();
        let stored = h.store.get(&doc.file_id).await.unwrap();
        assert_eq!(stored.pages[0].notes, "remember this");
        assert_eq!(stored.pages[1].notes, "");
    }

    #[tokio::test]
    async fn add_page_merges_two_pdfs() {
        let h = harness();
        let doc = h.service.upload("a.pdf", b"p1").await.unwrap();
        let outcome = h.service.add_page(&doc.file_id, "b.pdf", b"p2").await.unwrap();
        assert!(outcome.merged);

        let stored = h.store.get(&doc.file_id).await.unwrap();
        match &stored.source {
            SourceState::Merged { file, parts } => {
                assert!(file.starts_with(&format!("{}_merged_", doc.file_id)));
                assert_eq!(parts.len(), 2);
                assert_eq!(parts[0], format!("{}.pdf", doc.file_id));
                assert_eq!(stored.download_url, Some(format!("/uploads/{}", file)));
            }
            other => panic!("expected merged source, got {:?}", other),
        }

        // A third PDF is merged onto the combined file.
        h.service.add_page(&doc.file_id, "c.pdf", b"p3").await.unwrap();
        let stored = h.store.get(&doc.file_id).await.unwrap();
        match &stored.source {
            SourceState::Merged { parts, .. } => assert_eq!(parts.len(), 3),
            other => panic!("expected merged source, got {:?}", other),
        }
        assert_eq!(h.merger.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failed_merge_keeps_files_separate() {
        let h = harness_with(true, Arc::new(HeuristicAssistant::new()), None);
        let doc = h.service.upload("a.pdf", b"p1").await.unwrap();
        let outcome = h.service.add_page(&doc.file_id, "b.pdf", b"p2").await.unwrap();

        assert!(!outcome.merged);
        assert_eq!(outcome.total_pages, 2);
        let stored = h.store.get(&doc.file_id).await.unwrap();
        match &stored.source {
            SourceState::Separate { files } => {
                assert_eq!(files.len(), 2);
                assert_eq!(stored.download_url, Some(format!("/uploads/{}", files[1])));
            }
            other => panic!("expected separate files, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn image_added_to_pdf_is_not_merged() {
        let h = harness();
        let doc = h.service.upload("a.pdf", b"p1").await.unwrap();
        h.service.add_page(&doc.file_id, "scan.png", b"p2").await.unwrap();

        assert_eq!(h.merger.calls.load(Ordering::SeqCst), 0);
        let stored = h.store.get(&doc.file_id).await.unwrap();
        assert!(matches!(stored.source, SourceState::Separate { .. }));
    }

    #[tokio::test]
    async fn add_page_to_unknown_document_creates_it() {
        let h = harness();
        let outcome = h.service.add_page("fresh-id", "notes.pdf", b"only").await.unwrap();
        assert_eq!(outcome.pages_added, 1);

        let stored = h.store.get("fresh-id").await.unwrap();
        assert_eq!(numbers(&stored), vec![1]);
        assert_eq!(stored.file_type, FileType::Pdf);
        assert_eq!(stored.original_name, "notes.pdf");
        assert!(matches!(stored.source, SourceState::Single { .. }));
    }

    #[tokio::test]
    async fn add_page_recovers_metadata_from_object_storage() {
        let bucket = FakeBucket {
            objects: vec![StoredObject {
                key: "uploads/biology_abc-123.pdf".to_string(),
                url: "https://bucket.example/biology".to_string(),
            }],
        };
        let h = harness_with(false, Arc::new(HeuristicAssistant::new()), Some(bucket));
        h.service.add_page("abc-123", "more.pdf", b"x").await.unwrap();

        let stored = h.store.get("abc-123").await.unwrap();
        assert_eq!(stored.original_name, "biology.pdf");
        assert_eq!(stored.file_url.as_deref(), Some("https://bucket.example/biology"));
    }

    #[tokio::test]
    async fn add_page_refuses_to_overwrite_corrupt_record() {
        let h = harness();
        h.store.corrupt.lock().await.push("broken".to_string());
        let result = h.service.add_page("broken", "a.pdf", b"x").await;
        assert!(matches!(result, Err(ServiceError::Port(PortError::Corrupt(_)))));
    }

    #[tokio::test]
    async fn add_page_rejects_unsafe_ids() {
        let h = harness();
        let result = h.service.add_page("../etc/passwd", "a.pdf", b"x").await;
        assert!(matches!(result, Err(ServiceError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn concurrent_add_pages_lose_no_updates() {
        let h = harness();
        let doc = h.service.upload("a.pdf", b"start").await.unwrap();

        let mut tasks = Vec::new();
        for i in 0..10 {
            let service = h.service.clone();
            let file_id = doc.file_id.clone();
            tasks.push(tokio::spawn(async move {
                service
                    .add_page(&file_id, "extra.png", format!("added {i}").as_bytes())
                    .await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let stored = h.store.get(&doc.file_id).await.unwrap();
        assert_eq!(stored.pages.len(), 11);
        assert_eq!(numbers(&stored), (1..=11).collect::<Vec<u32>>());
    }

    //=====================================================================================
    // Remove-page
    //=====================================================================================

    #[tokio::test]
    async fn remove_page_renumbers_contiguously() {
        let h = harness();
        let doc = h.service.upload("a.pdf", b"a|b|c|d").await.unwrap();

        let updated = h.service.remove_page(&doc.file_id, 2).await.unwrap();
        assert_eq!(numbers(&updated), vec![1, 2, 3]);
        assert_eq!(texts(&updated), vec!["a", "c", "d"]);

        let updated = h.service.remove_page(&doc.file_id, 1).await.unwrap();
        assert_eq!(numbers(&updated), vec![1, 2]);
        assert_eq!(texts(&updated), vec!["c", "d"]);
    }

    #[tokio::test]
    async fn remove_missing_page_is_an_idempotent_no_op() {
        let h = harness();
        let doc = h.service.upload("a.pdf", b"a|b").await.unwrap();

        let once = h.service.remove_page(&doc.file_id, 9).await.unwrap();
        let twice = h.service.remove_page(&doc.file_id, 9).await.unwrap();
        assert_eq!(once.pages.len(), 2);
        assert_eq!(once.pages, twice.pages);
        assert_eq!(numbers(&twice), vec![1, 2]);
    }

    #[tokio::test]
    async fn remove_page_on_unknown_document_is_not_found() {
        let h = harness();
        let result = h.service.remove_page("nope", 1).await;
        assert!(matches!(result, Err(ServiceError::NotFound(_))));
    }

    //=====================================================================================
    // Analyze, notes, and summaries
    //=====================================================================================

    #[tokio::test]
    async fn analyze_summarizes_every_page() {
        let h = harness();
        let body = format!("{}| |short|[Error extracting text from page 4: bad]", long_text());
        let doc = h.service.upload("a.pdf", body.as_bytes()).await.unwrap();

        let analyzed = h.service.analyze(&doc.file_id, None).await.unwrap();
        assert!(analyzed.pages[0].summary.starts_with("This page discusses Cells are the basic building"));
        assert_eq!(analyzed.pages[1].summary, EMPTY_PAGE_SUMMARY);
        assert_eq!(analyzed.pages[2].summary, TOO_SHORT_SUMMARY);
        assert_eq!(analyzed.pages[3].summary, EXTRACTION_ERROR_SUMMARY);

        let stored = h.store.get(&doc.file_id).await.unwrap();
        assert_eq!(stored.pages, analyzed.pages);
    }

    #[tokio::test]
    async fn summarize_applies_fixed_rules_before_the_assistant() {
        let h = harness_with(false, Arc::new(FailingAssistant), None);
        assert_eq!(h.service.summarize("hi", None).await.text, TOO_SHORT_SUMMARY);
        assert_eq!(
            h.service.summarize("[Error opening file: x]", None).await.text,
            EXTRACTION_ERROR_SUMMARY
        );
        let long_error = format!("[Error reading PDF: {}]", "x".repeat(300));
        assert_eq!(
            h.service.summarize(&long_error, None).await.text,
            EXTRACTION_ERROR_SUMMARY
        );
    }

    #[tokio::test]
    async fn failed_summary_becomes_a_message() {
        let h = harness_with(false, Arc::new(FailingAssistant), None);
        let reply = h.service.summarize(&long_text(), Some("gpt-4o")).await;
        assert_eq!(reply.text, SUMMARY_FAILED);
        assert_eq!(reply.model, None);
    }

    #[tokio::test]
    async fn upload_summarizes_extracted_pages() {
        let h = harness();
        let body = format!("{}| |short", long_text());
        let doc = h.service.upload("a.pdf", body.as_bytes()).await.unwrap();

        let stored = h.store.get(&doc.file_id).await.unwrap();
        assert_eq!(stored.pages[0].summary, HeuristicAssistant::summary_for(&long_text()));
        assert_eq!(stored.pages[1].summary, EMPTY_PAGE_SUMMARY);
        assert_eq!(stored.pages[2].summary, TOO_SHORT_SUMMARY);
    }

    #[tokio::test]
    async fn add_page_summarizes_only_the_new_pages() {
        let h = harness();
        let doc = h.service.upload("a.pdf", b"first").await.unwrap();
        let mut stored = h.store.get(&doc.file_id).await.unwrap();
        stored.pages[0].summary = "edited by hand".to_string();
        h.store.put(&stored).await.unwrap();

        h.service
            .add_page(&doc.file_id, "b.pdf", long_text().as_bytes())
            .await
            .unwrap();
        let stored = h.store.get(&doc.file_id).await.unwrap();
        assert_eq!(stored.pages[0].summary, "edited by hand");
        assert!(stored.pages[1].summary.starts_with("This page discusses Cells"));
    }

    #[tokio::test]
    async fn notes_are_persisted() {
        let h = harness();
        let doc = h.service.upload("a.pdf", b"a|b").await.unwrap();

        let page = h.service.update_notes(&doc.file_id, 2, "check figure 3").await.unwrap();
        assert_eq!(page.page_number, 2);
        let stored = h.store.get(&doc.file_id).await.unwrap();
        assert_eq!(stored.pages[1].notes, "check figure 3");

        assert!(matches!(
            h.service.update_notes(&doc.file_id, 5, "x").await,
            Err(ServiceError::NotFound(_))
        ));
        assert!(matches!(
            h.service.update_notes("missing", 1, "x").await,
            Err(ServiceError::NotFound(_))
        ));
    }

    //=====================================================================================
    // Question answering
    //=====================================================================================

    #[tokio::test]
    async fn answer_reports_missing_documents_and_pages() {
        let h = harness();
        assert_eq!(
            h.service.answer("what?", "missing", Some(1), None).await.text,
            DOCUMENT_NOT_FOUND_ANSWER
        );

        h.store.put(&Document::stub("empty")).await.unwrap();
        assert_eq!(
            h.service.answer("what?", "empty", None, None).await.text,
            NO_CONTENT_ANSWER
        );

        let doc = h.service.upload("a.pdf", b"Some page text here").await.unwrap();
        assert_eq!(
            h.service.answer("what?", &doc.file_id, Some(4), None).await.text,
            "Page 4 not found in this document."
        );
    }

    #[tokio::test]
    async fn answer_rejects_whitespace_only_context() {
        let h = harness();
        let doc = h.service.upload("a.pdf", b"  |\n").await.unwrap();
        assert_eq!(
            h.service.answer("why?", &doc.file_id, None, None).await.text,
            NO_TEXT_ANSWER
        );
    }

    #[tokio::test]
    async fn answer_reports_corrupt_records() {
        let h = harness();
        h.store.corrupt.lock().await.push("bad".to_string());
        assert_eq!(
            h.service.answer("what?", "bad", None, None).await.text,
            CORRUPT_DOCUMENT_ANSWER
        );
    }

    #[tokio::test]
    async fn answer_scopes_to_the_requested_page() {
        let h = harness();
        let doc = h
            .service
            .upload("a.pdf", b"Enzymes catalyse reactions|Volcanoes erupt magma")
            .await
            .unwrap();

        let reply = h.service.answer("how?", &doc.file_id, Some(2), None).await;
        assert!(reply.text.starts_with("The process involving Volcanoes and erupt"));
        assert_eq!(reply.model, None);
    }

    #[tokio::test]
    async fn answer_failure_becomes_a_message() {
        let h = harness_with(false, Arc::new(FailingAssistant), None);
        let doc = h.service.upload("a.pdf", b"Enzymes catalyse reactions").await.unwrap();
        assert_eq!(
            h.service.answer("how?", &doc.file_id, None, None).await.text,
            ANSWER_FAILED
        );
    }

    //=====================================================================================
    // Locks and helpers
    //=====================================================================================

    #[tokio::test]
    async fn released_locks_are_pruned() {
        let locks = DocumentLocks::new();
        {
            let _a = locks.acquire("a").await;
            let _b = locks.acquire("b").await;
            assert_eq!(locks.len(), 2);
        }
        let _c = locks.acquire("c").await;
        assert_eq!(locks.len(), 1);
    }

    #[test]
    fn document_ids_are_restricted() {
        assert!(check_document_id("0b7c2f1e-5a9d-4c1b-8f3e-2d6a7b8c9d0e").is_ok());
        assert!(check_document_id("with_underscore").is_ok());
        assert!(check_document_id("").is_err());
        assert!(check_document_id("a/b").is_err());
        assert!(check_document_id("..").is_err());
    }

    #[test]
    fn original_name_is_rebuilt_from_object_key() {
        assert_eq!(
            original_name_from_key("uploads/chapter_one_abc.pdf", "abc"),
            "chapter_one.pdf"
        );
        assert_eq!(original_name_from_key("abc.png", "abc"), "abc.png");
    }
}
