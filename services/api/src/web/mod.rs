pub mod rest;
pub mod state;

use crate::config::ConfigError;
use crate::error::ApiError;
use axum::{
    extract::DefaultBodyLimit,
    http::{header::CONTENT_TYPE, HeaderValue, Method},
    routing::{get, post, put},
    Router,
};
use rest::{
    add_page_handler, analyze_handler, ask_handler, models_handler, notes_handler,
    remove_page_handler, summaries_handler, upload_handler, ApiDoc,
};
use state::{AppState, UPLOADS_ROUTE};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Builds the complete application: the JSON API under `/api`, stored uploads
/// under `/uploads`, and the Swagger UI.
pub fn router(app_state: Arc<AppState>) -> Result<Router, ApiError> {
    let config = app_state.config.clone();

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE]);
    let cors = match &config.cors_origin {
        Some(origin) => cors.allow_origin(origin.parse::<HeaderValue>().map_err(|e| {
            ApiError::Config(ConfigError::InvalidValue("CORS_ORIGIN".to_string(), e.to_string()))
        })?),
        None => cors.allow_origin(Any),
    };

    let api_router = Router::new()
        .route("/api/upload", post(upload_handler))
        .route("/api/add-page", post(add_page_handler))
        .route("/api/remove-page", post(remove_page_handler))
        .route("/api/analyze/{file_id}", post(analyze_handler))
        .route("/api/summaries/{file_id}", get(summaries_handler))
        .route("/api/ask", post(ask_handler))
        .route("/api/notes/{page_id}", put(notes_handler))
        .route("/api/models", get(models_handler))
        .layer(DefaultBodyLimit::max(config.max_upload_bytes))
        .with_state(app_state);

    // Merge the API router with the static files and Swagger UI for a complete application.
    let app = Router::new()
        .merge(api_router)
        .nest_service(UPLOADS_ROUTE, ServeDir::new(&config.upload_dir))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    Ok(app)
}
