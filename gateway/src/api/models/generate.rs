use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Body of `POST /generate-text`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct GenerateTextRequest {
    /// Prompt sent to the model. Required.
    #[serde(default)]
    #[schema(example = "Write a haiku about the sea.")]
    pub prompt: Option<String>,
}

/// Successful generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct GenerateResponse {
    /// Text generated by the model, unmodified
    pub output: String,
}

/// Failed request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// Human-readable description of the failure
    #[schema(example = "quota exceeded")]
    pub error: String,
}
