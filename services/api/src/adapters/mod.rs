pub mod extractor;
pub mod fallback;
pub mod json_store;
pub mod local_files;
pub mod openai_assistant;
pub mod pdf_merge;
pub mod s3_storage;

pub use extractor::DocumentExtractor;
pub use fallback::FallbackAssistant;
pub use json_store::JsonFileStore;
pub use local_files::LocalFileStorage;
pub use openai_assistant::OpenAiAssistant;
pub use pdf_merge::LopdfMerger;
pub use s3_storage::S3ObjectStorage;
