//! Book creation boundary
//!
//! The upload orchestrator hands a fully assembled audio file to the
//! [`CreateBook`] collaborator, which produces the permanent record. The
//! default implementation is [`BookService`].

mod service;

pub use service::BookService;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A created book record
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Book {
    pub id: String,
    pub title: String,
    pub author: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_key: Option<String>,
    pub audio: AudioTrack,
    pub created_at: DateTime<Utc>,
}

/// Stored audio file properties
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioTrack {
    pub storage_key: String,
    pub format: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub codec: Option<String>,
    pub duration_secs: u64,
    pub bitrate: u32,
    pub sample_rate: u32,
    pub channels: u8,
    pub size: u64,
}

/// Assembled audio file handed over at finalize
#[derive(Debug, Clone)]
pub struct AssembledAudio {
    pub bytes: Vec<u8>,
    pub filename: String,
    pub content_type: String,
    pub size: usize,
}

/// Cover image reconstructed from the session
#[derive(Debug, Clone)]
pub struct CoverFile {
    pub bytes: Vec<u8>,
    pub filename: String,
    pub content_type: String,
}

/// Everything needed to create a book
#[derive(Debug, Clone)]
pub struct NewBook {
    pub title: String,
    pub author: String,
    pub description: Option<String>,
    pub audio: AssembledAudio,
    pub cover: Option<CoverFile>,
}

/// Book creation error types
#[derive(Debug, thiserror::Error)]
pub enum CreateBookError {
    #[error("Unreadable audio payload: {0}")]
    AudioMetadata(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Entity-creation collaborator invoked exactly once per successful assembly
#[async_trait]
pub trait CreateBook: Send + Sync {
    async fn create(&self, book: NewBook) -> Result<Book, CreateBookError>;
}
