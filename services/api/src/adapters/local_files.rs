//! services/api/src/adapters/local_files.rs
//!
//! Stores uploaded source files and merged PDFs in a local directory that the
//! router also serves under `/uploads`.

use async_trait::async_trait;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use studyflow_core::ports::{FileStorage, PortError, PortResult};
use tokio::fs;
use tracing::debug;

static UNSAFE_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9._-]+").expect("static pattern is valid"));

/// Reduces a client-supplied name to a single safe path component.
pub fn secure_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned = UNSAFE_CHARS.replace_all(base.trim(), "_");
    cleaned.trim_start_matches('.').to_string()
}

/// A `FileStorage` backed by a local directory.
#[derive(Clone, Debug)]
pub struct LocalFileStorage {
    root: PathBuf,
    url_prefix: String,
}

impl LocalFileStorage {
    pub fn new(root: impl Into<PathBuf>, url_prefix: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            url_prefix: url_prefix.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl FileStorage for LocalFileStorage {
    async fn save(&self, file_name: &str, data: &[u8]) -> PortResult<PathBuf> {
        let path = self.path_for(file_name);
        fs::create_dir_all(&self.root)
            .await
            .map_err(|e| PortError::Unexpected(format!("Failed to create {}: {}", self.root.display(), e)))?;
        fs::write(&path, data)
            .await
            .map_err(|e| PortError::Unexpected(format!("Failed to write {}: {}", path.display(), e)))?;
        debug!("Stored {} bytes at {}", data.len(), path.display());
        Ok(path)
    }

    fn path_for(&self, file_name: &str) -> PathBuf {
        self.root.join(secure_file_name(file_name))
    }

    fn download_url(&self, file_name: &str) -> String {
        format!("{}/{}", self.url_prefix, secure_file_name(file_name))
    }
}
