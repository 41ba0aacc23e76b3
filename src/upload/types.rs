//! Upload types for the chunked upload protocol

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::StoreError;

// ============================================================================
// Constants
// ============================================================================

/// Session record expiry: 2 hours
pub const SESSION_TTL_SECS: u64 = 60 * 60 * 2;

/// Chunk payload expiry: 4 hours.
/// Deliberately longer than the session TTL so a late session refresh can
/// never outlive the chunks it references.
pub const CHUNK_TTL_SECS: u64 = 60 * 60 * 4;

/// Janitor staleness cutoff, independent of TTL
pub const STALE_SESSION_HOURS: i64 = 6;

/// Janitor sweep period: 5 minutes
pub const JANITOR_INTERVAL_SECS: u64 = 300;

// ============================================================================
// Session Types
// ============================================================================

/// Upload session state, persisted as JSON in the Session Store
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadSession {
    /// Book metadata captured with the first chunk
    pub metadata: SessionMetadata,

    /// Chunk count declared by the client; immutable for the session
    pub total_chunks: u32,

    /// Count of distinct chunk indices stored so far
    pub uploaded_chunks: u32,

    /// Session creation time, used by the janitor staleness check
    pub created_at: DateTime<Utc>,

    /// Store keys of received chunks, for bulk deletion on cleanup
    pub chunk_keys: Vec<String>,

    /// Filename from the first chunk's request, used for content-type
    /// inference at finalize
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_filename: Option<String>,
}

impl UploadSession {
    /// Check if all declared chunks have been received
    pub fn is_complete(&self) -> bool {
        self.uploaded_chunks == self.total_chunks
    }

    /// Progress percentage, rounded to two decimal places
    pub fn progress(&self) -> f64 {
        if self.total_chunks == 0 {
            return 0.0;
        }
        let raw = f64::from(self.uploaded_chunks) / f64::from(self.total_chunks) * 100.0;
        (raw * 100.0).round() / 100.0
    }
}

/// Metadata needed to create the book once assembly succeeds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMetadata {
    pub title: String,

    pub author: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover: Option<CoverPayload>,
}

impl SessionMetadata {
    /// Shallow-merge: replace required fields, keep existing optional
    /// fields that the update left out
    pub fn merge_from(&mut self, other: SessionMetadata) {
        self.title = other.title;
        self.author = other.author;
        if other.description.is_some() {
            self.description = other.description;
        }
        if other.cover.is_some() {
            self.cover = other.cover;
        }
    }
}

/// Cover image carried inside the session JSON.
/// The session envelope is text, so the image bytes ride base64-encoded
/// and are reconstructed at finalize time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoverPayload {
    /// Base64-encoded image bytes
    pub data: String,

    pub filename: String,

    pub content_type: String,
}

// ============================================================================
// Wire DTOs
// ============================================================================

/// Acknowledgment for a stored chunk
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkUploadAck {
    pub success: bool,
    pub message: String,
}

/// Derived read-only progress view
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadProgress {
    pub uploaded_chunks: u32,
    pub total_chunks: u32,
    pub progress: f64,
}

// ============================================================================
// Error Types
// ============================================================================

/// Upload error types
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("Upload session not found")]
    SessionNotFound,

    #[error("Upload session not found. Cannot upload chunk without existing session.")]
    SessionRequired,

    #[error("Metadata is required for the first chunk")]
    MetadataRequired,

    #[error("Chunk data is required")]
    ChunkRequired,

    #[error("Chunk index {index} out of bounds for {total} declared chunks")]
    ChunkIndexOutOfBounds { index: u32, total: u32 },

    #[error("Chunk {index} not found for upload {upload_id}")]
    MissingChunk { upload_id: String, index: u32 },

    #[error("Incomplete upload: {uploaded}/{total} chunks received")]
    IncompleteUpload { uploaded: u32, total: u32 },

    #[error("Invalid cover payload: {0}")]
    InvalidCover(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Failed to finalize upload: {0}")]
    FinalizeFailed(String),

    #[error("Corrupt session record: {0}")]
    CorruptSession(#[from] serde_json::Error),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl UploadError {
    /// Get HTTP status code for this error
    pub fn status_code(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            Self::SessionNotFound
            | Self::SessionRequired
            | Self::MetadataRequired
            | Self::ChunkRequired
            | Self::ChunkIndexOutOfBounds { .. }
            | Self::MissingChunk { .. }
            | Self::IncompleteUpload { .. }
            | Self::InvalidCover(_)
            | Self::InvalidRequest(_)
            | Self::FinalizeFailed(_) => StatusCode::BAD_REQUEST,
            Self::CorruptSession(_) | Self::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(uploaded: u32, total: u32) -> UploadSession {
        UploadSession {
            metadata: SessionMetadata {
                title: "T".to_string(),
                author: "A".to_string(),
                description: None,
                cover: None,
            },
            total_chunks: total,
            uploaded_chunks: uploaded,
            created_at: Utc::now(),
            chunk_keys: Vec::new(),
            original_filename: None,
        }
    }

    #[test]
    fn test_progress_rounds_to_two_decimals() {
        assert_eq!(session(1, 4).progress(), 25.0);
        assert_eq!(session(1, 3).progress(), 33.33);
        assert_eq!(session(2, 3).progress(), 66.67);
    }

    #[test]
    fn test_progress_zero_total_chunks() {
        assert_eq!(session(0, 0).progress(), 0.0);
    }

    #[test]
    fn test_metadata_merge_keeps_unset_optionals() {
        let mut metadata = SessionMetadata {
            title: "Old".to_string(),
            author: "Old Author".to_string(),
            description: Some("kept".to_string()),
            cover: None,
        };

        metadata.merge_from(SessionMetadata {
            title: "New".to_string(),
            author: "New Author".to_string(),
            description: None,
            cover: None,
        });

        assert_eq!(metadata.title, "New");
        assert_eq!(metadata.author, "New Author");
        assert_eq!(metadata.description.as_deref(), Some("kept"));
    }

    #[test]
    fn test_session_round_trips_through_json() {
        let session = session(2, 5);
        let json = serde_json::to_string(&session).unwrap();
        assert!(json.contains("\"totalChunks\":5"));

        let parsed: UploadSession = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.uploaded_chunks, 2);
        assert!(parsed.original_filename.is_none());
    }
}
