//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints and the master
//! definition for the OpenAPI specification.

use crate::adapters::local_files::secure_file_name;
use crate::error::ApiError;
use crate::web::state::AppState;
use axum::{
    extract::{rejection::JsonRejection, Multipart, Path, State},
    response::{IntoResponse, Json},
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use studyflow_core::{
    domain::{Document, Page},
    models::{ModelInfo, SUPPORTED_MODELS},
    service::ServiceError,
};
use tracing::{info, warn};
use utoipa::{OpenApi, ToSchema};

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        upload_handler,
        add_page_handler,
        remove_page_handler,
        analyze_handler,
        summaries_handler,
        ask_handler,
        notes_handler,
        models_handler,
    ),
    components(
        schemas(
            UploadResponse, AddPageResponse, RemovePageRequest, RemovePageResponse,
            AnalyzeRequest, AnalyzeResponse, DocumentView, PageView, AskRequest,
            AskResponse, NotesRequest, NotesResponse, ModelsResponse, ModelView, PageId,
            DocumentRef, ErrorResponse
        )
    ),
    tags(
        (name = "StudyFlow API", description = "Upload study material, manage its pages, and ask questions about it.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

/// The body of every error response.
#[derive(Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
}

/// A page reference sent either as a JSON number or as a numeric string.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(untagged)]
pub enum PageId {
    Number(u32),
    Text(String),
}

impl PageId {
    /// `Ok(None)` for an empty string; an error for anything non-numeric.
    fn number(&self) -> Result<Option<u32>, ApiError> {
        match self {
            PageId::Number(n) => Ok(Some(*n)),
            PageId::Text(text) if text.trim().is_empty() => Ok(None),
            PageId::Text(text) => text
                .trim()
                .parse()
                .map(Some)
                .map_err(|_| ApiError::BadRequest(format!("Invalid page id '{}'", text))),
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct UploadResponse {
    message: String,
    file_id: String,
    filename: String,
    status: String,
    page_count: usize,
    file_url: Option<String>,
    download_url: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct AddPageResponse {
    success: bool,
    document_id: String,
    pages_added: usize,
    total_pages: usize,
    is_merged: bool,
}

/// The id spellings clients send for a document. Each spelling is its own key,
/// so a body may carry several of them.
#[derive(Deserialize, ToSchema)]
pub struct DocumentRef {
    #[serde(rename = "documentId")]
    document_id_camel: Option<String>,
    document_id: Option<String>,
    #[serde(rename = "fileId")]
    file_id_camel: Option<String>,
    file_id: Option<String>,
}

impl DocumentRef {
    /// The first non-empty id, trying document ids before file ids.
    pub fn document_id(self) -> Option<String> {
        [self.document_id_camel, self.document_id, self.file_id_camel, self.file_id]
            .into_iter()
            .flatten()
            .find(|id| !id.trim().is_empty())
    }

    /// The first non-empty id, trying file ids before document ids.
    pub fn file_id(self) -> Option<String> {
        [self.file_id_camel, self.file_id, self.document_id_camel, self.document_id]
            .into_iter()
            .flatten()
            .find(|id| !id.trim().is_empty())
    }
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RemovePageRequest {
    #[serde(flatten)]
    ids: DocumentRef,
    #[serde(alias = "page_id")]
    page_id: Option<PageId>,
}

#[derive(Serialize, ToSchema)]
pub struct RemovePageResponse {
    success: bool,
    document_id: String,
    total_pages: usize,
}

#[derive(Deserialize, Default, ToSchema)]
pub struct AnalyzeRequest {
    model: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct AnalyzeResponse {
    status: String,
    message: String,
    file_id: String,
    pages_analyzed: usize,
}

#[derive(Serialize, ToSchema)]
pub struct PageView {
    page_number: u32,
    text: String,
    summary: String,
    notes: String,
}

impl From<&Page> for PageView {
    fn from(page: &Page) -> Self {
        Self {
            page_number: page.page_number,
            text: page.text.clone(),
            summary: page.summary.clone(),
            notes: page.notes.clone(),
        }
    }
}

/// A stored document as returned to clients.
#[derive(Serialize, ToSchema)]
pub struct DocumentView {
    file_id: String,
    original_name: String,
    file_type: String,
    file_url: Option<String>,
    download_url: Option<String>,
    is_merged: bool,
    source_files: Vec<String>,
    pages: Vec<PageView>,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
    /// True when no record exists and the pages are sample content.
    placeholder: bool,
}

impl From<&Document> for DocumentView {
    fn from(document: &Document) -> Self {
        Self {
            file_id: document.file_id.clone(),
            original_name: document.original_name.clone(),
            file_type: document.file_type.extension().to_string(),
            file_url: document.file_url.clone(),
            download_url: document.download_url.clone(),
            is_merged: document.source.is_merged(),
            source_files: document.source.files().into_iter().map(str::to_string).collect(),
            pages: document.pages.iter().map(PageView::from).collect(),
            created_at: Some(document.created_at),
            updated_at: Some(document.updated_at),
            placeholder: false,
        }
    }
}

impl DocumentView {
    /// Sample content shown for ids that have no stored record.
    fn placeholder(file_id: &str) -> Self {
        let pages = (1..=2)
            .map(|n| PageView {
                page_number: n,
                text: format!("Sample extracted text from page {}...", n),
                summary: format!("This is a summary of page {}.", n),
                notes: String::new(),
            })
            .collect();
        Self {
            file_id: file_id.to_string(),
            original_name: String::new(),
            file_type: "unknown".to_string(),
            file_url: None,
            download_url: None,
            is_merged: false,
            source_files: Vec::new(),
            pages,
            created_at: None,
            updated_at: None,
            placeholder: true,
        }
    }
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AskRequest {
    question: Option<String>,
    #[serde(flatten)]
    ids: DocumentRef,
    #[serde(alias = "page_id")]
    page_id: Option<PageId>,
    model: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct AskResponse {
    answer: String,
    model_used: Option<String>,
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NotesRequest {
    #[serde(alias = "user_notes")]
    user_notes: Option<String>,
    #[serde(flatten)]
    ids: DocumentRef,
}

#[derive(Serialize, ToSchema)]
pub struct NotesResponse {
    status: String,
    message: String,
    document_id: String,
    page_number: u32,
    notes: String,
}

#[derive(Serialize, ToSchema)]
pub struct ModelView {
    id: String,
    name: String,
    description: String,
    max_input_tokens: usize,
    max_output_tokens: u32,
    input_cost_per_1k: f64,
    output_cost_per_1k: f64,
}

impl From<&ModelInfo> for ModelView {
    fn from(model: &ModelInfo) -> Self {
        Self {
            id: model.id.to_string(),
            name: model.name.to_string(),
            description: model.description.to_string(),
            max_input_tokens: model.max_input_tokens,
            max_output_tokens: model.max_output_tokens,
            input_cost_per_1k: model.input_cost_per_1k,
            output_cost_per_1k: model.output_cost_per_1k,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct ModelsResponse {
    default_model: String,
    models: Vec<ModelView>,
}

//=========================================================================================
// Request Helpers
//=========================================================================================

/// The parts of a multipart upload form we care about.
struct UploadForm {
    file: Option<(String, Bytes)>,
    fields: HashMap<String, String>,
}

impl UploadForm {
    async fn read(mut multipart: Multipart) -> Result<Self, ApiError> {
        let mut form = UploadForm {
            file: None,
            fields: HashMap::new(),
        };
        while let Some(field) = multipart.next_field().await? {
            let name = field.name().unwrap_or_default().to_string();
            if name == "file" {
                let file_name = secure_file_name(field.file_name().unwrap_or_default());
                let data = field.bytes().await?;
                form.file = Some((file_name, data));
            } else {
                let value = field.text().await?;
                form.fields.insert(name, value);
            }
        }
        Ok(form)
    }

    fn document_id(&self) -> Option<String> {
        ["documentId", "document_id", "fileId", "file_id"]
            .iter()
            .filter_map(|key| self.fields.get(*key))
            .map(|value| value.trim())
            .find(|value| !value.is_empty())
            .map(str::to_string)
    }

    fn into_file(self) -> Result<(String, Bytes), ApiError> {
        self.file
            .ok_or_else(|| ApiError::BadRequest("No file part".to_string()))
    }
}

fn required(value: Option<String>) -> Result<String, ApiError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::BadRequest("Missing required fields".to_string()))
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// Upload a PDF or image and extract its pages.
///
/// Accepts a multipart/form-data request with a `file` part.
#[utoipa::path(
    post,
    path = "/api/upload",
    request_body(content_type = "multipart/form-data", description = "The document to upload, in a `file` part."),
    responses(
        (status = 200, description = "Document created", body = UploadResponse),
        (status = 400, description = "Missing file or unsupported type", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn upload_handler(
    State(app_state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let (file_name, data) = UploadForm::read(multipart).await?.into_file()?;
    let document = app_state.documents.upload(&file_name, &data).await?;

    Ok(Json(UploadResponse {
        message: "File uploaded successfully".to_string(),
        file_id: document.file_id.clone(),
        filename: document.original_name.clone(),
        status: "processed".to_string(),
        page_count: document.pages.len(),
        file_url: document.file_url.clone(),
        download_url: document.download_url.clone(),
    }))
}

/// Append the pages of another file to an existing document.
///
/// Accepts a multipart/form-data request with a `file` part and a `documentId` field.
#[utoipa::path(
    post,
    path = "/api/add-page",
    request_body(content_type = "multipart/form-data", description = "A `file` part and a `documentId` field."),
    responses(
        (status = 200, description = "Pages appended", body = AddPageResponse),
        (status = 400, description = "Missing file or document id", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn add_page_handler(
    State(app_state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let form = UploadForm::read(multipart).await?;
    let document_id = form
        .document_id()
        .ok_or_else(|| ApiError::BadRequest("Missing documentId".to_string()))?;
    let (file_name, data) = form.into_file()?;

    let outcome = app_state
        .documents
        .add_page(&document_id, &file_name, &data)
        .await?;

    Ok(Json(AddPageResponse {
        success: true,
        document_id: outcome.document_id,
        pages_added: outcome.pages_added,
        total_pages: outcome.total_pages,
        is_merged: outcome.merged,
    }))
}

/// Remove one page from a document and renumber the rest.
#[utoipa::path(
    post,
    path = "/api/remove-page",
    request_body = RemovePageRequest,
    responses(
        (status = 200, description = "Page removed", body = RemovePageResponse),
        (status = 400, description = "Missing fields", body = ErrorResponse),
        (status = 404, description = "Document not found", body = ErrorResponse)
    )
)]
pub async fn remove_page_handler(
    State(app_state): State<Arc<AppState>>,
    payload: Result<Json<RemovePageRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(payload) = payload?;
    let document_id = required(payload.ids.document_id())?;
    let page_number = match payload.page_id {
        Some(page_id) => page_id.number()?,
        None => None,
    }
    .ok_or_else(|| ApiError::BadRequest("Missing required fields".to_string()))?;

    let document = app_state
        .documents
        .remove_page(&document_id, page_number)
        .await?;

    Ok(Json(RemovePageResponse {
        success: true,
        document_id: document.file_id,
        total_pages: document.pages.len(),
    }))
}

/// Recompute the summary of every page.
#[utoipa::path(
    post,
    path = "/api/analyze/{file_id}",
    params(("file_id" = String, Path, description = "The document id.")),
    request_body(content = AnalyzeRequest, description = "Optional model selection."),
    responses(
        (status = 200, description = "Summaries recomputed", body = AnalyzeResponse),
        (status = 404, description = "Document not found", body = ErrorResponse)
    )
)]
pub async fn analyze_handler(
    State(app_state): State<Arc<AppState>>,
    Path(file_id): Path<String>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    // The body is optional, so it is parsed by hand instead of through `Json`.
    let request: AnalyzeRequest = if body.iter().all(u8::is_ascii_whitespace) {
        AnalyzeRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::BadRequest(format!("Invalid JSON body: {}", e)))?
    };

    let document = app_state
        .documents
        .analyze(&file_id, request.model.as_deref())
        .await?;

    Ok(Json(AnalyzeResponse {
        status: "success".to_string(),
        message: "Analysis complete".to_string(),
        file_id: document.file_id,
        pages_analyzed: document.pages.len(),
    }))
}

/// Fetch a document with its pages, summaries, and notes.
///
/// Ids with no stored record get sample placeholder content.
#[utoipa::path(
    get,
    path = "/api/summaries/{file_id}",
    params(("file_id" = String, Path, description = "The document id.")),
    responses(
        (status = 200, description = "The document, or placeholder content", body = DocumentView),
        (status = 400, description = "Invalid document id", body = ErrorResponse),
        (status = 500, description = "The record could not be read", body = ErrorResponse)
    )
)]
pub async fn summaries_handler(
    State(app_state): State<Arc<AppState>>,
    Path(file_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    match app_state.documents.document(&file_id).await {
        Ok(document) => Ok(Json(DocumentView::from(&document))),
        Err(ServiceError::NotFound(_)) => {
            warn!("No record for {}; returning placeholder content", file_id);
            Ok(Json(DocumentView::placeholder(&file_id)))
        }
        Err(e) => Err(e.into()),
    }
}

/// Ask a question about a whole document or one page of it.
#[utoipa::path(
    post,
    path = "/api/ask",
    request_body = AskRequest,
    responses(
        (status = 200, description = "The answer (failures are reported as answer text)", body = AskResponse),
        (status = 400, description = "Missing fields", body = ErrorResponse)
    )
)]
pub async fn ask_handler(
    State(app_state): State<Arc<AppState>>,
    payload: Result<Json<AskRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(payload) = payload?;
    let question = required(payload.question)?;
    let file_id = required(payload.ids.file_id())?;
    let page_number = match &payload.page_id {
        Some(page_id) => page_id.number()?,
        None => None,
    };

    info!("Question about {} (page {:?})", file_id, page_number);
    let reply = app_state
        .documents
        .answer(&question, &file_id, page_number, payload.model.as_deref())
        .await;

    Ok(Json(AskResponse {
        answer: reply.text,
        model_used: reply.model,
    }))
}

/// Replace the notes of one page.
#[utoipa::path(
    put,
    path = "/api/notes/{page_id}",
    params(("page_id" = u32, Path, description = "The page number.")),
    request_body = NotesRequest,
    responses(
        (status = 200, description = "Notes saved", body = NotesResponse),
        (status = 400, description = "Missing fields", body = ErrorResponse),
        (status = 404, description = "Document or page not found", body = ErrorResponse)
    )
)]
pub async fn notes_handler(
    State(app_state): State<Arc<AppState>>,
    Path(page_id): Path<String>,
    payload: Result<Json<NotesRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(payload) = payload?;
    let page_number = PageId::Text(page_id)
        .number()?
        .ok_or_else(|| ApiError::BadRequest("Missing required fields".to_string()))?;
    let notes = payload
        .user_notes
        .ok_or_else(|| ApiError::BadRequest("Missing required fields".to_string()))?;
    let document_id = required(payload.ids.document_id())?;

    let page = app_state
        .documents
        .update_notes(&document_id, page_number, &notes)
        .await?;

    Ok(Json(NotesResponse {
        status: "success".to_string(),
        message: "Notes updated successfully".to_string(),
        document_id,
        page_number: page.page_number,
        notes: page.notes,
    }))
}

/// List the models the assistant can be asked to use.
#[utoipa::path(
    get,
    path = "/api/models",
    responses(
        (status = 200, description = "The model catalogue", body = ModelsResponse)
    )
)]
pub async fn models_handler(State(app_state): State<Arc<AppState>>) -> Json<ModelsResponse> {
    Json(ModelsResponse {
        default_model: app_state.config.default_model.clone(),
        models: SUPPORTED_MODELS.iter().map(ModelView::from).collect(),
    })
}
