//! services/api/src/adapters/s3_storage.rs
//!
//! Mirrors uploaded source files into an S3-compatible bucket. Objects are
//! keyed `uploads/{original stem}_{file_id}.{ext}`, which lets a lost document
//! record be rebuilt from its id.

use crate::adapters::local_files::secure_file_name;
use crate::config::S3Config;
use async_trait::async_trait;
use s3::creds::Credentials;
use s3::{Bucket, Region};
use std::sync::Arc;
use studyflow_core::domain::FileType;
use studyflow_core::ports::{ObjectStorage, PortError, PortResult, StoredObject};
use tracing::debug;

const KEY_PREFIX: &str = "uploads/";

/// An `ObjectStorage` backed by `rust-s3`.
#[derive(Clone)]
pub struct S3ObjectStorage {
    bucket: Arc<Bucket>,
}

impl S3ObjectStorage {
    pub fn new(config: &S3Config) -> PortResult<Self> {
        let region = match &config.endpoint {
            Some(endpoint) => Region::Custom {
                region: config.region.clone(),
                endpoint: endpoint.clone(),
            },
            None => config
                .region
                .parse::<Region>()
                .map_err(|e| PortError::Unexpected(format!("Invalid S3 region: {}", e)))?,
        };

        let credentials = Credentials::new(
            config.access_key.as_deref(),
            config.secret_key.as_deref(),
            None,
            None,
            None,
        )
        .map_err(|e| PortError::Unavailable(format!("S3 credentials: {}", e)))?;

        let mut bucket = Bucket::new(&config.bucket, region, credentials)
            .map_err(|e| PortError::Unavailable(format!("S3 bucket: {}", e)))?;
        // Self-hosted endpoints (MinIO and friends) expect path-style addressing.
        if config.endpoint.is_some() {
            bucket = bucket.with_path_style();
        }

        Ok(Self {
            bucket: Arc::from(bucket),
        })
    }

    fn object_url(&self, key: &str) -> String {
        format!("{}/{}", self.bucket.url().trim_end_matches('/'), key)
    }
}

/// `uploads/{stem}_{file_id}.{ext}`, with the stem reduced to safe characters.
pub fn object_key(file_id: &str, original_name: &str, file_type: FileType) -> String {
    let secured = secure_file_name(original_name);
    let stem = match secured.rsplit_once('.') {
        Some((stem, _)) => stem,
        None => secured.as_str(),
    }
    .trim_matches('_');
    if stem.is_empty() {
        format!("{}{}.{}", KEY_PREFIX, file_id, file_type.extension())
    } else {
        format!("{}{}_{}.{}", KEY_PREFIX, stem, file_id, file_type.extension())
    }
}

/// Whether `key` was produced by `object_key` for this document id.
fn key_matches(key: &str, file_id: &str) -> bool {
    let name = key.strip_prefix(KEY_PREFIX).unwrap_or(key);
    let stem = name.rsplit_once('.').map(|(stem, _)| stem).unwrap_or(name);
    stem == file_id || stem.ends_with(&format!("_{}", file_id))
}

#[async_trait]
impl ObjectStorage for S3ObjectStorage {
    async fn upload(
        &self,
        file_id: &str,
        original_name: &str,
        file_type: FileType,
        data: &[u8],
    ) -> PortResult<StoredObject> {
        let key = object_key(file_id, original_name, file_type);
        let response = self
            .bucket
            .put_object_with_content_type(&key, data, file_type.content_type())
            .await
            .map_err(|e| PortError::Unavailable(format!("S3 upload of {} failed: {}", key, e)))?;

        let status = response.status_code();
        if !(200..300).contains(&status) {
            return Err(PortError::Unavailable(format!(
                "S3 upload of {} returned status {}",
                key, status
            )));
        }

        debug!("Uploaded {} bytes to s3://{}", data.len(), key);
        Ok(StoredObject {
            url: self.object_url(&key),
            key,
        })
    }

    async fn find(&self, file_id: &str) -> PortResult<Option<StoredObject>> {
        let results = self
            .bucket
            .list(KEY_PREFIX.to_string(), None)
            .await
            .map_err(|e| PortError::Unavailable(format!("S3 listing failed: {}", e)))?;

        let found = results
            .into_iter()
            .flat_map(|page| page.contents)
            .find(|object| key_matches(&object.key, file_id));

        Ok(found.map(|object| StoredObject {
            url: self.object_url(&object.key),
            key: object.key,
        }))
    }
}
