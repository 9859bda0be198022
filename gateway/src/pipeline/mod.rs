//! The upload-to-inference request pipeline.
//!
//! Every generation request goes through the same stages:
//!
//! 1. [`intake`] extracts the prompt and at most one uploaded file, stored on local disk.
//! 2. [`transcode`] turns the file into a content part, either inline base64 or a reference to a
//!    copy uploaded to the backend's asset store, as selected by [`TranscodeStrategy`].
//! 3. [`dispatch`] sends one user turn to the configured model.
//! 4. [`run`] deletes the uploaded file whatever the outcome, then hands the result back.
//!
//! No stage keeps state across requests.

pub mod dispatch;
pub mod intake;
pub mod transcode;

pub use intake::{GenerationRequest, TempUpload, UploadedFile};
pub use transcode::{TranscodeError, TranscodeStrategy};

use crate::backend::InferenceBackend;
use crate::config::TranscodeConfig;
use crate::errors::Result;
use crate::types::GenerationResult;

/// Transcode and dispatch a request without releasing its upload.
pub async fn generate(
    backend: &dyn InferenceBackend,
    model: &str,
    strategies: &TranscodeConfig,
    request: &GenerationRequest,
) -> Result<GenerationResult> {
    let parts = transcode::transcode_request(request, strategies, backend).await?;
    let result = dispatch::dispatch(backend, model, parts).await?;
    Ok(result)
}

/// Run the pipeline to completion, then delete the request's upload on success and failure alike.
pub async fn run(
    backend: &dyn InferenceBackend,
    model: &str,
    strategies: &TranscodeConfig,
    request: GenerationRequest,
) -> Result<GenerationResult> {
    let result = generate(backend, model, strategies, &request).await;
    request.cleanup().await;
    result
}
