use crate::api::models::generate::{ErrorResponse, GenerateResponse, GenerateTextRequest};
use crate::errors::{Error, Result};
use crate::pipeline::{self, GenerationRequest, intake};
use crate::types::PayloadKind;
use crate::AppState;
use axum::{
    Json,
    extract::{Multipart, State, multipart::MultipartRejection, rejection::JsonRejection},
};
use tracing::instrument;

async fn respond(state: &AppState, request: GenerationRequest) -> Result<Json<GenerateResponse>> {
    let result = pipeline::run(
        state.backend.as_ref(),
        &state.config.backend.model,
        &state.config.transcode,
        request,
    )
    .await?;

    Ok(Json(GenerateResponse {
        output: result.output_text,
    }))
}

async fn generate_from_payload(
    state: &AppState,
    multipart: std::result::Result<Multipart, MultipartRejection>,
    kind: PayloadKind,
) -> Result<Json<GenerateResponse>> {
    let multipart = multipart.map_err(|e| Error::bad_request(e.body_text()))?;
    let request = intake::receive_payload_form(multipart, kind, &state.config.uploads.dir).await?;
    respond(state, request).await
}

#[utoipa::path(
    post,
    path = "/generate-text",
    tag = "generate",
    summary = "Generate from text",
    description = "Send a text prompt to the model and return the generated text.",
    request_body = GenerateTextRequest,
    responses(
        (status = 200, description = "Content generated", body = GenerateResponse),
        (status = 400, description = "Missing prompt or malformed JSON", body = ErrorResponse),
        (status = 500, description = "The model call failed", body = ErrorResponse)
    )
)]
#[instrument(skip_all)]
pub async fn generate_text(
    State(state): State<AppState>,
    body: std::result::Result<Json<GenerateTextRequest>, JsonRejection>,
) -> Result<Json<GenerateResponse>> {
    let Json(body) = body.map_err(|e| Error::bad_request(e.body_text()))?;
    let request = intake::receive_text(body.prompt)?;
    respond(&state, request).await
}

#[utoipa::path(
    post,
    path = "/generate-from-image",
    tag = "generate",
    summary = "Generate from an image",
    description = "Upload one image in the `image` field, with an optional `prompt` field \
        (default: \"Describe this uploaded image.\").",
    request_body(content_type = "multipart/form-data", description = "`image` file and optional `prompt` text"),
    responses(
        (status = 200, description = "Content generated", body = GenerateResponse),
        (status = 400, description = "No image uploaded or malformed form", body = ErrorResponse),
        (status = 413, description = "Payload too large", body = ErrorResponse),
        (status = 500, description = "Upload or model call failed", body = ErrorResponse)
    )
)]
#[instrument(skip_all)]
pub async fn generate_from_image(
    State(state): State<AppState>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<Json<GenerateResponse>> {
    generate_from_payload(&state, multipart, PayloadKind::Image).await
}

#[utoipa::path(
    post,
    path = "/generate-from-document",
    tag = "generate",
    summary = "Generate from a document",
    description = "Upload one document in the `document` field, with an optional `prompt` field \
        (default: \"Describe this uploaded document.\").",
    request_body(content_type = "multipart/form-data", description = "`document` file and optional `prompt` text"),
    responses(
        (status = 200, description = "Content generated", body = GenerateResponse),
        (status = 400, description = "No document uploaded or malformed form", body = ErrorResponse),
        (status = 413, description = "Payload too large", body = ErrorResponse),
        (status = 500, description = "Model call failed", body = ErrorResponse)
    )
)]
#[instrument(skip_all)]
pub async fn generate_from_document(
    State(state): State<AppState>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<Json<GenerateResponse>> {
    generate_from_payload(&state, multipart, PayloadKind::Document).await
}

#[utoipa::path(
    post,
    path = "/generate-from-audio",
    tag = "generate",
    summary = "Generate from audio",
    description = "Upload one audio file in the `audio` field, with an optional `prompt` field \
        (default: \"Describe this uploaded audio.\").",
    request_body(content_type = "multipart/form-data", description = "`audio` file and optional `prompt` text"),
    responses(
        (status = 200, description = "Content generated", body = GenerateResponse),
        (status = 400, description = "No audio uploaded or malformed form", body = ErrorResponse),
        (status = 413, description = "Payload too large", body = ErrorResponse),
        (status = 500, description = "Model call failed", body = ErrorResponse)
    )
)]
#[instrument(skip_all)]
pub async fn generate_from_audio(
    State(state): State<AppState>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<Json<GenerateResponse>> {
    generate_from_payload(&state, multipart, PayloadKind::Audio).await
}
