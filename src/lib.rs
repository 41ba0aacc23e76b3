//! Fonoteca Server
//!
//! A self-hosted audiobook server with native S3 storage and resumable
//! chunked uploads backed by a TTL session store.

pub mod books;
pub mod config;
pub mod db;
pub mod error;
pub mod routes;
pub mod storage;
pub mod store;
pub mod upload;
