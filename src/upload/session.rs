//! Upload Session Manager
//!
//! Owns the lifecycle of upload sessions persisted in the Session Store:
//! creation, idempotent chunk accounting, ordered retrieval, TTL
//! refreshes, and cleanup (explicit or via the janitor sweep).

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::store::{chunk_key, session_key, SessionStore, TtlState, SESSION_KEY_PREFIX};

use super::types::{
    ChunkUploadAck, SessionMetadata, UploadError, UploadProgress, UploadSession, CHUNK_TTL_SECS,
    JANITOR_INTERVAL_SECS, SESSION_TTL_SECS, STALE_SESSION_HOURS,
};

/// Manages upload sessions
#[derive(Clone)]
pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    session_ttl: Duration,
    chunk_ttl: Duration,
}

impl SessionManager {
    /// Create a new session manager with production TTLs
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self::with_ttls(
            store,
            Duration::from_secs(SESSION_TTL_SECS),
            Duration::from_secs(CHUNK_TTL_SECS),
        )
    }

    /// Create a session manager with custom TTLs
    pub fn with_ttls(store: Arc<dyn SessionStore>, session_ttl: Duration, chunk_ttl: Duration) -> Self {
        Self {
            store,
            session_ttl,
            chunk_ttl,
        }
    }

    // ========================================================================
    // Session Lifecycle
    // ========================================================================

    /// Create a new upload session.
    ///
    /// Does not enforce exclusivity on its own; creation is funneled
    /// through the chunk-index-0 path in [`handle_chunk_upload`].
    ///
    /// [`handle_chunk_upload`]: Self::handle_chunk_upload
    pub async fn create_session(
        &self,
        upload_id: &str,
        total_chunks: u32,
        metadata: SessionMetadata,
        original_filename: Option<String>,
    ) -> Result<(), UploadError> {
        let session = UploadSession {
            metadata,
            total_chunks,
            uploaded_chunks: 0,
            created_at: Utc::now(),
            chunk_keys: Vec::new(),
            original_filename,
        };

        self.write_session(upload_id, &session).await?;

        tracing::info!(
            upload_id = %upload_id,
            total_chunks = total_chunks,
            "Created upload session"
        );

        Ok(())
    }

    /// Get a session by upload id; `None` means missing or expired
    pub async fn get_session(&self, upload_id: &str) -> Result<Option<UploadSession>, UploadError> {
        let raw = self.store.get_text(&session_key(upload_id)).await?;

        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// Store a chunk payload and account for it in the session.
    ///
    /// A retried index overwrites the payload but never double-counts,
    /// and an index outside the declared range is rejected before
    /// anything is written, so `uploadedChunks` can never exceed
    /// `totalChunks`. The session read-modify-write here is not
    /// transactional; chunks for one upload are expected to arrive from
    /// a single client connection.
    pub async fn store_chunk(
        &self,
        upload_id: &str,
        chunk_index: u32,
        chunk: &[u8],
    ) -> Result<(), UploadError> {
        let mut session = self
            .get_session(upload_id)
            .await?
            .ok_or(UploadError::SessionNotFound)?;

        if chunk_index >= session.total_chunks {
            return Err(UploadError::ChunkIndexOutOfBounds {
                index: chunk_index,
                total: session.total_chunks,
            });
        }

        let key = chunk_key(upload_id, chunk_index);
        self.store.put_bytes(&key, chunk, self.chunk_ttl).await?;

        if !session.chunk_keys.contains(&key) {
            session.chunk_keys.push(key);
            session.uploaded_chunks += 1;
        }

        // Rewriting refreshes the session TTL
        self.write_session(upload_id, &session).await?;

        tracing::debug!(
            upload_id = %upload_id,
            chunk_index = chunk_index,
            uploaded_chunks = session.uploaded_chunks,
            total_chunks = session.total_chunks,
            "Chunk stored"
        );

        Ok(())
    }

    /// Read all chunks in index order, ready for direct concatenation
    pub async fn get_all_chunks(&self, upload_id: &str) -> Result<Vec<Vec<u8>>, UploadError> {
        let session = self
            .get_session(upload_id)
            .await?
            .ok_or(UploadError::SessionNotFound)?;

        let mut chunks = Vec::with_capacity(session.total_chunks as usize);

        for index in 0..session.total_chunks {
            let chunk = self
                .store
                .get_bytes(&chunk_key(upload_id, index))
                .await?
                .ok_or_else(|| UploadError::MissingChunk {
                    upload_id: upload_id.to_string(),
                    index,
                })?;

            chunks.push(chunk);
        }

        Ok(chunks)
    }

    /// Shallow-merge new metadata into the session
    pub async fn update_session_metadata(
        &self,
        upload_id: &str,
        metadata: SessionMetadata,
    ) -> Result<(), UploadError> {
        let mut session = self
            .get_session(upload_id)
            .await?
            .ok_or(UploadError::SessionNotFound)?;

        session.metadata.merge_from(metadata);
        self.write_session(upload_id, &session).await
    }

    /// Whether every declared chunk has been received
    pub async fn is_upload_complete(&self, upload_id: &str) -> Result<bool, UploadError> {
        Ok(self
            .get_session(upload_id)
            .await?
            .map(|session| session.is_complete())
            .unwrap_or(false))
    }

    /// Reset the session's expiry to the full TTL without rewriting it.
    /// No-op when the session key does not exist.
    pub async fn extend_session_ttl(&self, upload_id: &str) -> Result<(), UploadError> {
        let key = session_key(upload_id);

        if self.store.exists(&key).await? {
            self.store.expire(&key, self.session_ttl).await?;
        }

        Ok(())
    }

    /// Delete the session and every chunk it references.
    /// Idempotent; a missing session is a no-op.
    pub async fn cleanup_session(&self, upload_id: &str) -> Result<(), UploadError> {
        let session = match self.get_session(upload_id).await? {
            Some(session) => session,
            None => return Ok(()),
        };

        self.store.delete(&session.chunk_keys).await?;
        self.store.delete(&[session_key(upload_id)]).await?;

        tracing::info!(
            upload_id = %upload_id,
            chunks = session.chunk_keys.len(),
            "Cleaned up upload session"
        );

        Ok(())
    }

    // ========================================================================
    // Chunk-upload orchestration
    // ========================================================================

    /// Combined entry point for one arriving chunk: create or refresh the
    /// session, store the payload, and extend the TTL as an activity signal.
    pub async fn handle_chunk_upload(
        &self,
        upload_id: &str,
        chunk_index: u32,
        total_chunks: u32,
        chunk: &[u8],
        metadata: Option<SessionMetadata>,
        original_filename: Option<String>,
    ) -> Result<ChunkUploadAck, UploadError> {
        if chunk_index >= total_chunks {
            return Err(UploadError::ChunkIndexOutOfBounds {
                index: chunk_index,
                total: total_chunks,
            });
        }

        let existing = self.get_session(upload_id).await?;

        match existing {
            None => {
                if chunk_index != 0 {
                    return Err(UploadError::SessionRequired);
                }
                let metadata = metadata.ok_or(UploadError::MetadataRequired)?;
                self.create_session(upload_id, total_chunks, metadata, original_filename)
                    .await?;
            }
            Some(_) => {
                // Retry of chunk 0 may carry corrected metadata
                if chunk_index == 0 {
                    if let Some(metadata) = metadata {
                        self.update_session_metadata(upload_id, metadata).await?;
                    }
                }
            }
        }

        self.store_chunk(upload_id, chunk_index, chunk).await?;
        self.extend_session_ttl(upload_id).await?;

        Ok(ChunkUploadAck {
            success: true,
            message: format!(
                "Chunk {}/{} uploaded successfully",
                chunk_index + 1,
                total_chunks
            ),
        })
    }

    /// Derived read-only progress view
    pub async fn get_upload_progress(
        &self,
        upload_id: &str,
    ) -> Result<Option<UploadProgress>, UploadError> {
        Ok(self.get_session(upload_id).await?.map(|session| UploadProgress {
            uploaded_chunks: session.uploaded_chunks,
            total_chunks: session.total_chunks,
            progress: session.progress(),
        }))
    }

    // ========================================================================
    // Janitor
    // ========================================================================

    /// Sweep session keys: assign a TTL to keys missing one, and purge
    /// sessions whose `createdAt` is past the staleness cutoff.
    ///
    /// A safety net independent of TTL refresh; tolerates keys vanishing
    /// between the scan and the inspection.
    ///
    /// Returns the number of sessions cleaned up.
    pub async fn cleanup_expired_sessions(&self) -> Result<usize, UploadError> {
        let pattern = format!("{}*", SESSION_KEY_PREFIX);
        let keys = self.store.scan(&pattern).await?;
        let mut cleaned = 0;

        for key in keys {
            match self.store.ttl(&key).await? {
                TtlState::Missing => continue,
                TtlState::NoExpiry => {
                    tracing::warn!(key = %key, "Session key had no expiry, assigning one");
                    self.store.expire(&key, self.session_ttl).await?;
                }
                TtlState::Expires(_) => {}
            }

            let raw = match self.store.get_text(&key).await? {
                Some(raw) => raw,
                None => continue, // expired between scan and read
            };

            let session: UploadSession = match serde_json::from_str(&raw) {
                Ok(session) => session,
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "Skipping unreadable session record");
                    continue;
                }
            };

            let age = Utc::now() - session.created_at;
            if age.num_seconds() > STALE_SESSION_HOURS * 3600 {
                let upload_id = key.trim_start_matches(SESSION_KEY_PREFIX);
                self.cleanup_session(upload_id).await?;
                cleaned += 1;
            }
        }

        if cleaned > 0 {
            tracing::info!(count = cleaned, "Janitor removed stale upload sessions");
        }

        Ok(cleaned)
    }

    /// Upload ids of every live session key
    pub async fn get_all_active_sessions(&self) -> Result<Vec<String>, UploadError> {
        let pattern = format!("{}*", SESSION_KEY_PREFIX);
        let keys = self.store.scan(&pattern).await?;

        Ok(keys
            .into_iter()
            .map(|key| key.trim_start_matches(SESSION_KEY_PREFIX).to_string())
            .collect())
    }

    /// Start the background janitor task
    pub fn start_janitor(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(Duration::from_secs(JANITOR_INTERVAL_SECS));

            loop {
                interval.tick().await;
                if let Err(e) = self.cleanup_expired_sessions().await {
                    tracing::warn!(error = %e, "Janitor sweep failed");
                }
            }
        })
    }

    // ========================================================================
    // Internal
    // ========================================================================

    async fn write_session(
        &self,
        upload_id: &str,
        session: &UploadSession,
    ) -> Result<(), UploadError> {
        let json = serde_json::to_string(session)?;
        self.store
            .put_text(&session_key(upload_id), &json, self.session_ttl)
            .await?;
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
