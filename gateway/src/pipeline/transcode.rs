//! Turning a stored upload into the content part the backend receives.

use base64::{Engine as _, engine::general_purpose};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument};

use super::intake::{GenerationRequest, UploadedFile};
use crate::backend::{BackendError, InferenceBackend};
use crate::config::TranscodeConfig;
use crate::types::ContentPart;

/// How a binary payload is handed to the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TranscodeStrategy {
    /// Embed the bytes in the generation request as base64. Memory use grows with the file size.
    Inline,
    /// Upload the file to the backend's asset store first and send only the returned reference.
    RemoteReference,
}

#[derive(Error, Debug)]
pub enum TranscodeError {
    #[error("Failed to read uploaded file: {0}")]
    Read(#[from] std::io::Error),

    #[error(transparent)]
    Upload(#[from] BackendError),
}

impl TranscodeStrategy {
    #[instrument(skip_all, fields(strategy = ?self, mime_type = %file.mime_type, size_bytes = file.size_bytes))]
    pub async fn transcode(self, file: &UploadedFile, backend: &dyn InferenceBackend) -> Result<ContentPart, TranscodeError> {
        match self {
            TranscodeStrategy::Inline => {
                let bytes = tokio::fs::read(&file.local_path).await?;
                debug!(bytes = bytes.len(), "Encoding payload inline");
                Ok(ContentPart::InlineBlob {
                    data: general_purpose::STANDARD.encode(bytes),
                    mime_type: file.mime_type.clone(),
                })
            }
            TranscodeStrategy::RemoteReference => {
                let asset = backend.upload_file(&file.local_path, &file.mime_type).await?;
                debug!(uri = %asset.uri, name = ?asset.name, "Payload uploaded as asset");
                Ok(ContentPart::FileReference {
                    uri: asset.uri,
                    mime_type: asset.mime_type,
                })
            }
        }
    }
}

/// Build the parts of the user turn: the prompt first, then the payload if there is one.
pub async fn transcode_request(
    request: &GenerationRequest,
    strategies: &TranscodeConfig,
    backend: &dyn InferenceBackend,
) -> Result<Vec<ContentPart>, TranscodeError> {
    let mut parts = vec![ContentPart::text(request.prompt_text.clone())];

    if let Some(file) = request.uploaded_file() {
        let strategy = strategies.strategy_for(file.kind);
        parts.push(strategy.transcode(file, backend).await?);
    }

    Ok(parts)
}
