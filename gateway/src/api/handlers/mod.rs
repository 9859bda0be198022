//! HTTP request handlers.
//!
//! - [`generate`]: text, image, document and audio generation endpoints
//!
//! Handlers return [`crate::errors::Error`], which converts into an HTTP status code and a JSON
//! `{"error": ...}` body.

pub mod generate;
