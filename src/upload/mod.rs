//! Resumable Chunked Upload Module
//!
//! Large audio files arrive in bounded-size pieces tracked by a
//! server-side session in the Session Store:
//! 1. The first chunk (index 0) carries the book metadata and creates
//!    the session
//! 2. Chunks accumulate with idempotent accounting; retries never
//!    double-count
//! 3. Finalize reassembles the chunks in index order and hands the
//!    result to the book-creation path
//! 4. Explicit cleanup, TTL expiry, or the janitor sweep discard
//!    partial state

pub mod orchestrator;
pub mod session;
pub mod types;

pub use orchestrator::{ChunkUploadRequest, CoverUpload, UploadOrchestrator};
pub use session::SessionManager;
pub use types::*;
