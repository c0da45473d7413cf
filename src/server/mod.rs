//! HTTP server.
//!
//! - [`api`]: Routes, handlers and shared state
//! - [`error`]: Error-to-response mapping
//! - [`streaming`]: Provider-to-client text relay

pub mod api;
pub mod error;
pub mod streaming;
