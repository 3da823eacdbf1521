//! services/api/src/web/state.rs
//!
//! Defines the application's shared state and how it is assembled from the
//! configuration.

use crate::adapters::{
    DocumentExtractor, FallbackAssistant, JsonFileStore, LocalFileStorage, LopdfMerger,
    OpenAiAssistant, S3ObjectStorage,
};
use crate::config::Config;
use crate::error::ApiError;
use async_openai::{config::OpenAIConfig, Client};
use std::sync::Arc;
use studyflow_core::{
    ports::AssistantService, service::DocumentService, HeuristicAssistant,
};
use tracing::{info, warn};

/// URL prefix the upload directory is served under.
pub const UPLOADS_ROUTE: &str = "/uploads";

//=========================================================================================
// AppState (Shared Across All Requests)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub documents: Arc<DocumentService>,
}

impl AppState {
    /// Wires every adapter named by the configuration into a `DocumentService`.
    pub async fn from_config(config: Config) -> Result<Self, ApiError> {
        tokio::fs::create_dir_all(&config.upload_dir).await?;
        tokio::fs::create_dir_all(&config.data_dir).await?;

        let store = Arc::new(JsonFileStore::new(config.data_dir.clone()));
        let files = Arc::new(LocalFileStorage::new(config.upload_dir.clone(), UPLOADS_ROUTE));
        let extractor = Arc::new(DocumentExtractor::new(config.tesseract_path.clone()));
        // Probe once so a missing OCR engine shows up in the startup logs.
        extractor.ocr_available().await;
        let merger = Arc::new(LopdfMerger::new());
        let assistant = select_assistant(&config);

        let mut documents = DocumentService::new(store, files, extractor, merger, assistant);
        if let Some(s3) = &config.s3 {
            match S3ObjectStorage::new(s3) {
                Ok(storage) => {
                    info!("Mirroring uploads to bucket '{}'", s3.bucket);
                    documents = documents.with_object_storage(Arc::new(storage));
                }
                Err(e) => warn!("Object storage disabled: {}", e),
            }
        }

        Ok(Self {
            config: Arc::new(config),
            documents: Arc::new(documents),
        })
    }
}

/// The remote model when an API key is configured, otherwise the heuristics alone.
fn select_assistant(config: &Config) -> Arc<dyn AssistantService> {
    match &config.openai_api_key {
        Some(api_key) => {
            let mut openai_config = OpenAIConfig::new().with_api_key(api_key);
            if let Some(base) = &config.openai_api_base {
                openai_config = openai_config.with_api_base(base);
            }
            let remote = OpenAiAssistant::new(
                Client::with_config(openai_config),
                config.default_model.clone(),
            );
            info!("Using OpenAI assistant with default model {}", config.default_model);
            Arc::new(FallbackAssistant::new(Arc::new(remote)))
        }
        None => {
            warn!("OPENAI_API_KEY not set; summaries and answers use the heuristic assistant");
            Arc::new(HeuristicAssistant::new())
        }
    }
}
