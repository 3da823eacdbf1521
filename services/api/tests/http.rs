//! Router-level tests: each request goes through the full axum stack with
//! file-backed adapters in a temporary directory and the heuristic assistant.

use api_lib::{config::Config, web};
use axum::{
    body::Body,
    http::{header::CONTENT_TYPE, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document as PdfDocument, Object, Stream};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

const BOUNDARY: &str = "studyflow-test-boundary";

async fn test_app(dir: &TempDir) -> Router {
    let vars: HashMap<&str, String> = HashMap::from([
        ("UPLOAD_DIR", dir.path().join("uploads").display().to_string()),
        ("DATA_DIR", dir.path().join("data").display().to_string()),
        ("TESSERACT_PATH", "/nonexistent/tesseract".to_string()),
    ]);
    let config = Config::from_lookup(|key| vars.get(key).cloned()).unwrap();
    let state = web::state::AppState::from_config(config).await.unwrap();
    web::router(Arc::new(state)).unwrap()
}

fn pdf_bytes(texts: &[&str]) -> Vec<u8> {
    let mut doc = PdfDocument::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids: Vec<Object> = Vec::new();
    for text in texts {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 24.into()]),
                Operation::new("Td", vec![72.into(), 720.into()]),
                Operation::new("Tj", vec![Object::string_literal(*text)]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        kids.push(
            doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            })
            .into(),
        );
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! { "Type" => "Catalog", "Pages" => pages_id });
    doc.trailer.set("Root", catalog_id);

    let mut out = Vec::new();
    doc.save_to(&mut out).unwrap();
    out
}

enum Part<'a> {
    Field(&'a str, &'a str),
    File(&'a str, &'a str, &'a [u8]),
}

fn field<'a>(name: &'a str, value: &'a str) -> Part<'a> {
    Part::Field(name, value)
}

fn file<'a>(name: &'a str, file_name: &'a str, data: &'a [u8]) -> Part<'a> {
    Part::File(name, file_name, data)
}

fn multipart(parts: &[Part<'_>]) -> Body {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        match part {
            Part::Field(name, value) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name).as_bytes(),
                );
                body.extend_from_slice(value.as_bytes());
            }
            Part::File(name, file_name, data) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
                        name, file_name
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(data);
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    Body::from(body)
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

async fn post_form(app: &Router, uri: &str, parts: Vec<Part<'_>>) -> (StatusCode, Value) {
    let request = Request::post(uri)
        .header(
            CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(multipart(&parts))
        .unwrap();
    send(app, request).await
}

async fn send_json(app: &Router, method: &str, uri: &str, body: Value) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    send(app, request).await
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    send(app, Request::get(uri).body(Body::empty()).unwrap()).await
}

#[tokio::test]
async fn models_lists_the_catalogue() {
    let dir = TempDir::new().unwrap();
    let app = test_app(&dir).await;

    let (status, body) = get(&app, "/api/models").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["default_model"], "gpt-4o-mini");
    let ids: Vec<&str> = body["models"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["gpt-4o-mini", "gpt-4o", "gpt-3.5-turbo"]);
}

#[tokio::test]
async fn asking_about_an_unknown_document_answers_with_a_message() {
    let dir = TempDir::new().unwrap();
    let app = test_app(&dir).await;

    let (status, body) = send_json(
        &app,
        "POST",
        "/api/ask",
        json!({ "question": "What is this?", "fileId": "does-not-exist" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["answer"],
        "Document not found or not processed yet. Please try uploading again."
    );
    assert!(body["model_used"].is_null());
}

#[tokio::test]
async fn missing_fields_are_bad_requests() {
    let dir = TempDir::new().unwrap();
    let app = test_app(&dir).await;

    let (status, body) = send_json(&app, "POST", "/api/ask", json!({ "fileId": "abc" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Missing required fields");

    let (status, body) = post_form(&app, "/api/upload", vec![field("note", "hello")]).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "No file part");

    let (status, body) =
        post_form(&app, "/api/upload", vec![file("file", "notes.txt", b"plain text")]).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "File type not allowed");
}

#[tokio::test]
async fn removing_from_an_unknown_document_is_not_found() {
    let dir = TempDir::new().unwrap();
    let app = test_app(&dir).await;

    let (status, body) = send_json(
        &app,
        "POST",
        "/api/remove-page",
        json!({ "documentId": "nope", "pageId": 1 }),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("nope"));
}

#[tokio::test]
async fn bodies_may_carry_several_id_spellings() {
    let dir = TempDir::new().unwrap();
    let app = test_app(&dir).await;

    let (status, body) = send_json(
        &app,
        "POST",
        "/api/remove-page",
        json!({ "documentId": "first", "fileId": "second", "pageId": 1 }),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("first"));

    let (status, body) = send_json(
        &app,
        "POST",
        "/api/ask",
        json!({ "question": "What?", "fileId": "a", "file_id": "b", "documentId": "c" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["answer"],
        "Document not found or not processed yet. Please try uploading again."
    );
}

#[tokio::test]
async fn unknown_documents_get_placeholder_summaries() {
    let dir = TempDir::new().unwrap();
    let app = test_app(&dir).await;

    let (status, body) = get(&app, "/api/summaries/never-uploaded").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["placeholder"], true);
    assert_eq!(body["pages"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn document_page_lifecycle() {
    let dir = TempDir::new().unwrap();
    let app = test_app(&dir).await;

    // Upload a two-page PDF.
    let first = pdf_bytes(&["Cell structure", "Cell division"]);
    let (status, body) = post_form(&app, "/api/upload", vec![file("file", "biology.pdf", &first)]).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["message"], "File uploaded successfully");
    assert_eq!(body["page_count"], 2);
    let file_id = body["file_id"].as_str().unwrap().to_string();

    // The stored source file is served back.
    let download_url = body["download_url"].as_str().unwrap().to_string();
    let response = app
        .clone()
        .oneshot(Request::get(download_url.as_str()).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Pages are summarized as soon as they are extracted.
    let (_, view) = get(&app, &format!("/api/summaries/{}", file_id)).await;
    assert_eq!(
        view["pages"][0]["summary"],
        "Text too short to summarize meaningfully."
    );

    // Appending another PDF numbers its page after the existing ones and merges the files.
    let second = pdf_bytes(&["Genetics"]);
    let (status, body) = post_form(
        &app,
        "/api/add-page",
        vec![
            field("documentId", &file_id),
            file("file", "genetics.pdf", &second),
        ],
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["pages_added"], 1);
    assert_eq!(body["total_pages"], 3);
    assert_eq!(body["is_merged"], true);

    let (_, body) = get(&app, &format!("/api/summaries/{}", file_id)).await;
    let numbers: Vec<u64> = body["pages"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["page_number"].as_u64().unwrap())
        .collect();
    assert_eq!(numbers, vec![1, 2, 3]);
    assert_eq!(body["is_merged"], true);

    // Remove the middle page; a numeric string is accepted as the page id.
    let (status, body) = send_json(
        &app,
        "POST",
        "/api/remove-page",
        json!({ "document_id": file_id, "page_id": "2" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_pages"], 2);

    // Notes persist.
    let (status, body) = send_json(
        &app,
        "PUT",
        "/api/notes/2",
        json!({ "userNotes": "Review before the exam", "fileId": file_id }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");

    let (status, _) = send_json(
        &app,
        "PUT",
        "/api/notes/9",
        json!({ "userNotes": "x", "fileId": file_id }),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Analyze fills every summary.
    let (status, body) = send_json(&app, "POST", &format!("/api/analyze/{}", file_id), json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["pages_analyzed"], 2);

    let (_, body) = get(&app, &format!("/api/summaries/{}", file_id)).await;
    let pages = body["pages"].as_array().unwrap();
    assert_eq!(pages.len(), 2);
    assert_eq!(pages[1]["page_number"], 2);
    assert_eq!(pages[1]["notes"], "Review before the exam");
    assert!(pages.iter().all(|p| !p["summary"].as_str().unwrap().is_empty()));
    assert_eq!(body["placeholder"], false);

    // Questions about a page that no longer exists get a message.
    let (status, body) = send_json(
        &app,
        "POST",
        "/api/ask",
        json!({ "question": "why?", "file_id": file_id, "pageId": 3 }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["answer"], "Page 3 not found in this document.");
}

#[tokio::test]
async fn adding_to_a_missing_document_creates_it() {
    let dir = TempDir::new().unwrap();
    let app = test_app(&dir).await;

    let pdf = pdf_bytes(&["Only page"]);
    let (status, body) = post_form(
        &app,
        "/api/add-page",
        vec![
            file("file", "solo.pdf", &pdf),
            field("document_id", "fresh-doc"),
        ],
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["document_id"], "fresh-doc");
    assert_eq!(body["pages_added"], 1);
    assert_eq!(body["total_pages"], 1);
    assert_eq!(body["is_merged"], false);
}
