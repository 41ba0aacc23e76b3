//! Upload Routes
//!
//! HTTP endpoints for the resumable chunked upload protocol.
//!
//! Endpoints:
//! - POST /api/v1/books/chunk - Upload one chunk (multipart)
//! - POST /api/v1/books/finalize - Assemble chunks into a book
//! - POST /api/v1/books/cleanup - Cancel an upload
//! - GET /api/v1/books/upload/:upload_id/progress - Poll upload progress

use axum::{
    extract::{
        multipart::{Field, Multipart},
        Path, State,
    },
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::books::Book;
use crate::upload::{
    ChunkUploadAck, ChunkUploadRequest, CoverUpload, UploadError, UploadOrchestrator,
    UploadProgress,
};

// ============================================================================
// State
// ============================================================================

/// Upload-specific state
#[derive(Clone)]
pub struct UploadState {
    pub orchestrator: UploadOrchestrator,
}

// ============================================================================
// Error Response
// ============================================================================

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    code: String,
}

impl IntoResponse for UploadError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        let code = match &self {
            UploadError::SessionNotFound => "SESSION_NOT_FOUND",
            UploadError::SessionRequired => "SESSION_REQUIRED",
            UploadError::MetadataRequired => "METADATA_REQUIRED",
            UploadError::ChunkRequired => "CHUNK_REQUIRED",
            UploadError::ChunkIndexOutOfBounds { .. } => "CHUNK_INDEX_OUT_OF_BOUNDS",
            UploadError::MissingChunk { .. } => "MISSING_CHUNK",
            UploadError::IncompleteUpload { .. } => "INCOMPLETE_UPLOAD",
            UploadError::InvalidCover(_) => "INVALID_COVER",
            UploadError::InvalidRequest(_) => "INVALID_REQUEST",
            UploadError::FinalizeFailed(_) => "FINALIZE_FAILED",
            UploadError::CorruptSession(_) => "CORRUPT_SESSION",
            UploadError::Store(_) => "STORE_ERROR",
        };

        let body = Json(ErrorResponse {
            error: self.to_string(),
            code: code.to_string(),
        });

        (status, body).into_response()
    }
}

// ============================================================================
// Router
// ============================================================================

/// Create the upload router
pub fn router<S>(state: UploadState) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new()
        .route("/chunk", post(upload_chunk))
        .route("/finalize", post(finalize))
        .route("/cleanup", post(cleanup))
        .route("/upload/:upload_id/progress", get(get_progress))
        .with_state(state)
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /api/v1/books/chunk
///
/// Upload a single chunk as multipart form data. The first chunk
/// (chunkIndex 0) must carry the book metadata fields.
async fn upload_chunk(
    State(state): State<UploadState>,
    mut multipart: Multipart,
) -> Result<Json<ChunkUploadAck>, UploadError> {
    let mut upload_id = None;
    let mut chunk_index = None;
    let mut total_chunks = None;
    let mut chunk = None;
    let mut title = None;
    let mut author = None;
    let mut description = None;
    let mut original_filename = None;
    let mut cover = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| UploadError::InvalidRequest(e.to_string()))?
    {
        let Some(name) = field.name().map(ToString::to_string) else {
            continue;
        };

        match name.as_str() {
            "uploadId" => upload_id = Some(field_text(field).await?),
            "chunkIndex" => chunk_index = Some(field_u32(field, "chunkIndex").await?),
            "totalChunks" => total_chunks = Some(field_u32(field, "totalChunks").await?),
            "chunk" => chunk = Some(field_bytes(field).await?),
            "title" => title = Some(field_text(field).await?),
            "author" => author = Some(field_text(field).await?),
            "description" => description = Some(field_text(field).await?),
            "originalFilename" => original_filename = Some(field_text(field).await?),
            "cover" => {
                let filename = field.file_name().unwrap_or("cover.jpg").to_string();
                let content_type = field.content_type().unwrap_or("image/jpeg").to_string();
                cover = Some(CoverUpload {
                    filename,
                    content_type,
                    bytes: field_bytes(field).await?,
                });
            }
            _ => {}
        }
    }

    let request = ChunkUploadRequest {
        upload_id: require(upload_id, "uploadId")?,
        chunk_index: require(chunk_index, "chunkIndex")?,
        total_chunks: require(total_chunks, "totalChunks")?,
        chunk: chunk.ok_or(UploadError::ChunkRequired)?,
        title,
        author,
        description,
        original_filename,
        cover,
    };

    let ack = state.orchestrator.upload_chunk(request).await?;
    Ok(Json(ack))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadIdRequest {
    upload_id: String,
}

/// POST /api/v1/books/finalize
///
/// Assemble all chunks and create the book record.
async fn finalize(
    State(state): State<UploadState>,
    Json(request): Json<UploadIdRequest>,
) -> Result<Json<Book>, UploadError> {
    let book = state.orchestrator.finalize_upload(&request.upload_id).await?;
    Ok(Json(book))
}

/// POST /api/v1/books/cleanup
///
/// Abandon an upload and discard its session and chunks. Idempotent.
async fn cleanup(
    State(state): State<UploadState>,
    Json(request): Json<UploadIdRequest>,
) -> Result<StatusCode, UploadError> {
    state.orchestrator.cleanup_upload(&request.upload_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/books/upload/:upload_id/progress
///
/// Returns the progress view, or JSON null if the session is unknown.
async fn get_progress(
    State(state): State<UploadState>,
    Path(upload_id): Path<String>,
) -> Result<Json<Option<UploadProgress>>, UploadError> {
    let progress = state.orchestrator.get_upload_progress(&upload_id).await?;
    Ok(Json(progress))
}

// ============================================================================
// Helpers
// ============================================================================

async fn field_text(field: Field<'_>) -> Result<String, UploadError> {
    field
        .text()
        .await
        .map_err(|e| UploadError::InvalidRequest(e.to_string()))
}

async fn field_bytes(field: Field<'_>) -> Result<Vec<u8>, UploadError> {
    field
        .bytes()
        .await
        .map(|bytes| bytes.to_vec())
        .map_err(|e| UploadError::InvalidRequest(e.to_string()))
}

async fn field_u32(field: Field<'_>, name: &str) -> Result<u32, UploadError> {
    field_text(field).await?.parse().map_err(|_| {
        UploadError::InvalidRequest(format!("{name} must be a non-negative integer"))
    })
}

fn require<T>(value: Option<T>, name: &str) -> Result<T, UploadError> {
    value.ok_or_else(|| UploadError::InvalidRequest(format!("{name} is required")))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::books::{AudioTrack, CreateBook, CreateBookError, NewBook};
    use crate::store::MemoryStore;
    use crate::upload::SessionManager;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use chrono::Utc;
    use std::sync::Arc;
    use tower::ServiceExt;

    struct StubCreator;

    #[async_trait]
    impl CreateBook for StubCreator {
        async fn create(&self, book: NewBook) -> Result<Book, CreateBookError> {
            Ok(Book {
                id: "book-1".to_string(),
                title: book.title,
                author: book.author,
                description: book.description,
                cover_key: None,
                audio: AudioTrack {
                    storage_key: format!("books/audio/{}", book.audio.filename),
                    format: "mp3".to_string(),
                    codec: None,
                    duration_secs: 0,
                    bitrate: 0,
                    sample_rate: 0,
                    channels: 0,
                    size: book.audio.size as u64,
                },
                created_at: Utc::now(),
            })
        }
    }

    fn test_app() -> Router {
        let sessions = SessionManager::new(Arc::new(MemoryStore::new()));
        let orchestrator = UploadOrchestrator::new(sessions, Arc::new(StubCreator));
        router(UploadState { orchestrator })
    }

    const BOUNDARY: &str = "----test-boundary";

    fn multipart_body(fields: &[(&str, &[u8])]) -> Body {
        let mut body = Vec::new();
        for (name, value) in fields {
            body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
            if *name == "chunk" {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"blob\"\r\n\
                         Content-Type: application/octet-stream\r\n\r\n"
                    )
                    .as_bytes(),
                );
            } else {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
                );
            }
            body.extend_from_slice(value);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        Body::from(body)
    }

    fn chunk_request(fields: &[(&str, &[u8])]) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/chunk")
            .header(
                "content-type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(multipart_body(fields))
            .unwrap()
    }

    fn json_request(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn first_chunk_fields<'a>() -> Vec<(&'a str, &'a [u8])> {
        vec![
            ("uploadId", b"u1".as_slice()),
            ("chunkIndex", b"0".as_slice()),
            ("totalChunks", b"2".as_slice()),
            ("title", b"The Title".as_slice()),
            ("author", b"The Author".as_slice()),
            ("originalFilename", b"book.mp3".as_slice()),
            ("chunk", b"first-half".as_slice()),
        ]
    }

    #[tokio::test]
    async fn test_chunk_upload_acks() {
        let app = test_app();

        let response = app.oneshot(chunk_request(&first_chunk_fields())).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["success"], true);
        assert_eq!(json["message"], "Chunk 1/2 uploaded successfully");
    }

    #[tokio::test]
    async fn test_chunk_without_session_is_rejected() {
        let app = test_app();

        let response = app
            .oneshot(chunk_request(&[
                ("uploadId", b"ghost".as_slice()),
                ("chunkIndex", b"1".as_slice()),
                ("totalChunks", b"2".as_slice()),
                ("chunk", b"late".as_slice()),
            ]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["code"], "SESSION_REQUIRED");
    }

    #[tokio::test]
    async fn test_chunk_missing_fields_is_rejected() {
        let app = test_app();

        let response = app
            .oneshot(chunk_request(&[("chunkIndex", b"0".as_slice())]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["code"], "INVALID_REQUEST");
    }

    #[tokio::test]
    async fn test_finalize_incomplete_upload() {
        let app = test_app();

        app.clone()
            .oneshot(chunk_request(&first_chunk_fields()))
            .await
            .unwrap();

        let response = app
            .oneshot(json_request("/finalize", r#"{"uploadId":"u1"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert_eq!(json["code"], "INCOMPLETE_UPLOAD");
        assert_eq!(json["error"], "Incomplete upload: 1/2 chunks received");
    }

    #[tokio::test]
    async fn test_finalize_complete_upload_returns_book() {
        let app = test_app();

        app.clone()
            .oneshot(chunk_request(&first_chunk_fields()))
            .await
            .unwrap();
        app.clone()
            .oneshot(chunk_request(&[
                ("uploadId", b"u1".as_slice()),
                ("chunkIndex", b"1".as_slice()),
                ("totalChunks", b"2".as_slice()),
                ("chunk", b"second-half".as_slice()),
            ]))
            .await
            .unwrap();

        let response = app
            .oneshot(json_request("/finalize", r#"{"uploadId":"u1"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["title"], "The Title");
        assert_eq!(json["audio"]["storageKey"], "books/audio/book.mp3");
    }

    #[tokio::test]
    async fn test_progress_endpoint() {
        let app = test_app();

        app.clone()
            .oneshot(chunk_request(&first_chunk_fields()))
            .await
            .unwrap();

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/upload/u1/progress")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["uploadedChunks"], 1);
        assert_eq!(json["totalChunks"], 2);
        assert_eq!(json["progress"], 50.0);

        // Unknown uploads report null rather than an error
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/upload/unknown/progress")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_json(response).await.is_null());
    }

    #[tokio::test]
    async fn test_cleanup_returns_no_content() {
        let app = test_app();

        app.clone()
            .oneshot(chunk_request(&first_chunk_fields()))
            .await
            .unwrap();

        let response = app
            .clone()
            .oneshot(json_request("/cleanup", r#"{"uploadId":"u1"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        // Cleaned-up upload no longer reports progress
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/upload/u1/progress")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert!(body_json(response).await.is_null());
    }
}
