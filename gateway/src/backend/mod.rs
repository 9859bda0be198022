//! Inference backend seam.
//!
//! Handlers only ever talk to an [`InferenceBackend`]. The production implementation is
//! [`GeminiClient`], which speaks the Gemini REST API over `reqwest`; tests substitute an
//! in-process fake (see `test_utils`).

mod gemini;
pub mod wire;

use async_trait::async_trait;
use reqwest::StatusCode;
use std::path::Path;
use thiserror::Error;

pub use gemini::GeminiClient;

use crate::types::{GenerationResult, Turn, UploadedAsset};

/// Operations the gateway needs from a generative model provider.
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    /// Run one generation request against `model` and return the generated text.
    async fn generate_content(&self, model: &str, contents: &[Turn]) -> Result<GenerationResult, BackendError>;

    /// Upload a local file to the provider's asset store and return a reference to it.
    async fn upload_file(&self, local_path: &Path, mime_type: &str) -> Result<UploadedAsset, BackendError>;
}

/// Failures reported by (or while talking to) the inference backend.
///
/// The `Display` of [`BackendError::Api`] is the provider's own message, unmodified, since
/// that is what ends up in the client-facing `error` field.
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("{message}")]
    Api { status: StatusCode, message: String },

    #[error("{0}")]
    Transport(#[from] reqwest::Error),

    #[error("Failed to read file for upload: {0}")]
    Io(#[from] std::io::Error),

    #[error("error decoding response body: {0}")]
    Decode(String),

    #[error("{0}")]
    Protocol(String),

    #[error("Prompt was blocked: {reason}")]
    Blocked { reason: String },

    #[error("Model returned no candidates")]
    NoCandidates,
}
