//! Upload Orchestrator
//!
//! Request-facing glue between the HTTP layer and the session manager.
//! Validates the client protocol, reassembles finished uploads, and hands
//! the result to the book-creation collaborator.

use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};

use crate::books::{AssembledAudio, Book, CoverFile, CreateBook, NewBook};

use super::session::SessionManager;
use super::types::{
    ChunkUploadAck, CoverPayload, SessionMetadata, UploadError, UploadProgress, UploadSession,
};

/// One arriving chunk, as decoded from the multipart request
#[derive(Debug, Clone)]
pub struct ChunkUploadRequest {
    pub upload_id: String,
    pub chunk_index: u32,
    pub total_chunks: u32,
    pub chunk: Vec<u8>,
    pub title: Option<String>,
    pub author: Option<String>,
    pub description: Option<String>,
    pub original_filename: Option<String>,
    pub cover: Option<CoverUpload>,
}

/// Raw cover image bytes from the request
#[derive(Debug, Clone)]
pub struct CoverUpload {
    pub bytes: Vec<u8>,
    pub filename: String,
    pub content_type: String,
}

/// Orchestrates chunk upload, finalize, and cleanup
#[derive(Clone)]
pub struct UploadOrchestrator {
    sessions: SessionManager,
    books: Arc<dyn CreateBook>,
}

impl UploadOrchestrator {
    pub fn new(sessions: SessionManager, books: Arc<dyn CreateBook>) -> Self {
        Self { sessions, books }
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    /// Validate and ingest one chunk
    pub async fn upload_chunk(
        &self,
        request: ChunkUploadRequest,
    ) -> Result<ChunkUploadAck, UploadError> {
        if request.chunk.is_empty() {
            return Err(UploadError::ChunkRequired);
        }

        // Metadata travels only with the first chunk
        let metadata = if request.chunk_index == 0 {
            let (title, author) = match (request.title, request.author) {
                (Some(title), Some(author)) => (title, author),
                _ => return Err(UploadError::MetadataRequired),
            };

            Some(SessionMetadata {
                title,
                author,
                description: request.description,
                cover: request.cover.map(|cover| CoverPayload {
                    data: BASE64.encode(&cover.bytes),
                    filename: cover.filename,
                    content_type: cover.content_type,
                }),
            })
        } else {
            None
        };

        self.sessions
            .handle_chunk_upload(
                &request.upload_id,
                request.chunk_index,
                request.total_chunks,
                &request.chunk,
                metadata,
                request.original_filename,
            )
            .await
    }

    /// Assemble a complete upload and create the book.
    ///
    /// The session is discarded after the wrapped section regardless of
    /// outcome; only the pre-checks leave it intact for a retry.
    pub async fn finalize_upload(&self, upload_id: &str) -> Result<Book, UploadError> {
        let session = self
            .sessions
            .get_session(upload_id)
            .await?
            .ok_or(UploadError::SessionNotFound)?;

        if !self.sessions.is_upload_complete(upload_id).await? {
            return Err(UploadError::IncompleteUpload {
                uploaded: session.uploaded_chunks,
                total: session.total_chunks,
            });
        }

        let result = self.assemble_and_create(upload_id, &session).await;

        if let Err(e) = self.sessions.cleanup_session(upload_id).await {
            tracing::warn!(
                upload_id = %upload_id,
                error = %e,
                "Failed to clean up session after finalize"
            );
        }

        result
    }

    async fn assemble_and_create(
        &self,
        upload_id: &str,
        session: &UploadSession,
    ) -> Result<Book, UploadError> {
        let chunks = self.sessions.get_all_chunks(upload_id).await?;

        let total_len = chunks.iter().map(Vec::len).sum();
        let mut bytes = Vec::with_capacity(total_len);
        for chunk in &chunks {
            bytes.extend_from_slice(chunk);
        }

        tracing::info!(
            upload_id = %upload_id,
            chunks = chunks.len(),
            size = bytes.len(),
            "Assembled upload"
        );

        let filename = session
            .original_filename
            .clone()
            .unwrap_or_else(|| "audio.mp3".to_string());
        let content_type = mime_from_filename(&filename);
        let size = bytes.len();

        let audio = AssembledAudio {
            bytes,
            filename,
            content_type,
            size,
        };

        let cover = match &session.metadata.cover {
            Some(payload) => Some(CoverFile {
                bytes: BASE64
                    .decode(&payload.data)
                    .map_err(|e| UploadError::InvalidCover(e.to_string()))?,
                filename: payload.filename.clone(),
                content_type: payload.content_type.clone(),
            }),
            None => None,
        };

        let new_book = NewBook {
            title: session.metadata.title.clone(),
            author: session.metadata.author.clone(),
            description: session.metadata.description.clone(),
            audio,
            cover,
        };

        self.books
            .create(new_book)
            .await
            .map_err(|e| UploadError::FinalizeFailed(e.to_string()))
    }

    /// Explicit client-initiated cancellation; idempotent
    pub async fn cleanup_upload(&self, upload_id: &str) -> Result<(), UploadError> {
        self.sessions.cleanup_session(upload_id).await
    }

    /// Progress view for polling clients
    pub async fn get_upload_progress(
        &self,
        upload_id: &str,
    ) -> Result<Option<UploadProgress>, UploadError> {
        self.sessions.get_upload_progress(upload_id).await
    }
}

/// Infer a MIME type from the filename extension
fn mime_from_filename(filename: &str) -> String {
    let extension = filename
        .rsplit('.')
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase();

    match extension.as_str() {
        "mp3" => "audio/mpeg".to_string(),
        "mp4" | "m4a" | "m4b" => "audio/mp4".to_string(),
        "ogg" => "audio/ogg".to_string(),
        "wav" => "audio/wav".to_string(),
        "flac" => "audio/flac".to_string(),
        "aac" => "audio/aac".to_string(),
        _ => mime_guess::from_path(filename)
            .first()
            .map(|mime| mime.to_string())
            .unwrap_or_else(|| "audio/mpeg".to_string()),
    }
}

// ============================================================================
// Tests
// ============================================================================
