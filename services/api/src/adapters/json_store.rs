//! services/api/src/adapters/json_store.rs
//!
//! This module contains the document store adapter, the concrete implementation
//! of the `DocumentStore` port from the `core` crate. Each document is one JSON
//! file named after its id inside a single data directory.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use studyflow_core::domain::{Document, FileType, Page, SourceState};
use studyflow_core::ports::{DocumentStore, PortError, PortResult};
use studyflow_core::service::check_document_id;
use tokio::fs;
use tracing::debug;
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A document store that implements the `DocumentStore` port with JSON files.
#[derive(Clone, Debug)]
pub struct JsonFileStore {
    root: PathBuf,
}

impl JsonFileStore {
    /// Creates a new `JsonFileStore` rooted at `root`. The directory is created on first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, file_id: &str) -> PortResult<PathBuf> {
        check_document_id(file_id)
            .map_err(|_| PortError::NotFound(format!("Invalid document id '{}'", file_id)))?;
        Ok(self.root.join(format!("{}.json", file_id)))
    }
}

//=========================================================================================
// "Impure" Storage Record Structs
//=========================================================================================

#[derive(Serialize, Deserialize, Default, Clone, Copy)]
#[serde(rename_all = "lowercase")]
enum FileTypeRecord {
    Pdf,
    Png,
    Jpg,
    Jpeg,
    #[default]
    Unknown,
}

impl From<FileType> for FileTypeRecord {
    fn from(file_type: FileType) -> Self {
        match file_type {
            FileType::Pdf => FileTypeRecord::Pdf,
            FileType::Png => FileTypeRecord::Png,
            FileType::Jpg => FileTypeRecord::Jpg,
            FileType::Jpeg => FileTypeRecord::Jpeg,
            FileType::Unknown => FileTypeRecord::Unknown,
        }
    }
}

impl From<FileTypeRecord> for FileType {
    fn from(record: FileTypeRecord) -> Self {
        match record {
            FileTypeRecord::Pdf => FileType::Pdf,
            FileTypeRecord::Png => FileType::Png,
            FileTypeRecord::Jpg => FileType::Jpg,
            FileTypeRecord::Jpeg => FileType::Jpeg,
            FileTypeRecord::Unknown => FileType::Unknown,
        }
    }
}

#[derive(Serialize, Deserialize, Default)]
#[serde(tag = "state", rename_all = "snake_case")]
enum SourceRecord {
    #[default]
    Missing,
    Single {
        file: String,
    },
    Merged {
        file: String,
        parts: Vec<String>,
    },
    Separate {
        files: Vec<String>,
    },
}

impl SourceRecord {
    fn from_domain(source: &SourceState) -> Self {
        match source.clone() {
            SourceState::Missing => SourceRecord::Missing,
            SourceState::Single { file } => SourceRecord::Single { file },
            SourceState::Merged { file, parts } => SourceRecord::Merged { file, parts },
            SourceState::Separate { files } => SourceRecord::Separate { files },
        }
    }

    fn to_domain(self) -> SourceState {
        match self {
            SourceRecord::Missing => SourceState::Missing,
            SourceRecord::Single { file } => SourceState::Single { file },
            SourceRecord::Merged { file, parts } => SourceState::Merged { file, parts },
            SourceRecord::Separate { files } => SourceState::Separate { files },
        }
    }
}

#[derive(Serialize, Deserialize)]
struct PageRecord {
    page_number: u32,
    #[serde(default)]
    text: String,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    notes: String,
}

#[derive(Serialize, Deserialize)]
struct DocumentRecord {
    #[serde(default)]
    file_id: String,
    #[serde(default)]
    original_name: String,
    #[serde(default)]
    file_type: FileTypeRecord,
    #[serde(default)]
    file_url: Option<String>,
    #[serde(default)]
    download_url: Option<String>,
    #[serde(default)]
    pages: Vec<PageRecord>,
    #[serde(default)]
    source: SourceRecord,
    #[serde(default = "Utc::now")]
    created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    updated_at: DateTime<Utc>,
}

impl DocumentRecord {
    fn from_domain(document: &Document) -> Self {
        Self {
            file_id: document.file_id.clone(),
            original_name: document.original_name.clone(),
            file_type: document.file_type.into(),
            file_url: document.file_url.clone(),
            download_url: document.download_url.clone(),
            pages: document
                .pages
                .iter()
                .map(|p| PageRecord {
                    page_number: p.page_number,
                    text: p.text.clone(),
                    summary: p.summary.clone(),
                    notes: p.notes.clone(),
                })
                .collect(),
            source: SourceRecord::from_domain(&document.source),
            created_at: document.created_at,
            updated_at: document.updated_at,
        }
    }

    /// Records written without an id belong to the file they were read from.
    fn to_domain(self, file_id: &str) -> Document {
        Document {
            file_id: if self.file_id.is_empty() {
                file_id.to_string()
            } else {
                self.file_id
            },
            original_name: self.original_name,
            file_type: self.file_type.into(),
            file_url: self.file_url,
            download_url: self.download_url,
            pages: self
                .pages
                .into_iter()
                .map(|p| Page {
                    page_number: p.page_number,
                    text: p.text,
                    summary: p.summary,
                    notes: p.notes,
                })
                .collect(),
            source: self.source.to_domain(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

//=========================================================================================
// `DocumentStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl DocumentStore for JsonFileStore {
    async fn get(&self, file_id: &str) -> PortResult<Document> {
        let path = self.path_for(file_id)?;
        let bytes = fs::read(&path).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => PortError::NotFound(format!("Document {} not found", file_id)),
            _ => PortError::Unexpected(format!("Failed to read {}: {}", path.display(), e)),
        })?;

        let record: DocumentRecord = serde_json::from_slice(&bytes)
            .map_err(|e| PortError::Corrupt(format!("{}: {}", path.display(), e)))?;
        Ok(record.to_domain(file_id))
    }

    async fn put(&self, document: &Document) -> PortResult<()> {
        let path = self.path_for(&document.file_id)?;
        fs::create_dir_all(&self.root)
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        let json = serde_json::to_vec_pretty(&DocumentRecord::from_domain(document))
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        // Write beside the target, then rename over it, so readers never see half a record.
        let temp_path = self
            .root
            .join(format!(".{}.{}.tmp", document.file_id, Uuid::new_v4().simple()));
        fs::write(&temp_path, &json)
            .await
            .map_err(|e| PortError::Unexpected(format!("Failed to write {}: {}", temp_path.display(), e)))?;
        if let Err(e) = fs::rename(&temp_path, &path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(PortError::Unexpected(format!(
                "Failed to replace {}: {}",
                path.display(),
                e
            )));
        }

        debug!("Saved document {} to {}", document.file_id, path.display());
        Ok(())
    }
}
