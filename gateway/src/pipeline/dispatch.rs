use tracing::{info, instrument};

use crate::backend::{BackendError, InferenceBackend};
use crate::types::{ContentPart, GenerationResult, Turn};

/// Send `parts` to `model` as a single user turn.
#[instrument(skip_all, fields(model = %model, parts = parts.len()))]
pub async fn dispatch(backend: &dyn InferenceBackend, model: &str, parts: Vec<ContentPart>) -> Result<GenerationResult, BackendError> {
    debug_assert!(!parts.is_empty(), "a generation request needs at least one part");

    let contents = [Turn::user(parts)];
    let result = backend.generate_content(model, &contents).await?;

    info!(output_chars = result.output_text.chars().count(), "Generated content");
    Ok(result)
}
