pub mod domain;
pub mod heuristics;
pub mod models;
pub mod ports;
pub mod service;

pub use domain::{AssistantReply, Document, ExtractedPage, FileType, Page, QaContext, SourceState};
pub use heuristics::HeuristicAssistant;
pub use ports::{
    AssistantService, DocumentStore, FileStorage, ObjectStorage, PdfMerger, PortError,
    PortResult, StoredObject, TextExtractor,
};
pub use service::{AddPageOutcome, DocumentService, ServiceError, ServiceResult};
