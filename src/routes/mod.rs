//! HTTP route modules

pub mod upload;
