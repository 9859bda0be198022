//! OpenAPI documentation for the generation endpoints, served at `/docs`.

use utoipa::OpenApi;

use crate::api;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "GenAI Gateway",
        description = "Forward text, images, documents and audio to a generative model and get text back."
    ),
    paths(
        api::handlers::generate::generate_text,
        api::handlers::generate::generate_from_image,
        api::handlers::generate::generate_from_document,
        api::handlers::generate::generate_from_audio,
    ),
    components(
        schemas(
            api::models::generate::GenerateTextRequest,
            api::models::generate::GenerateResponse,
            api::models::generate::ErrorResponse,
        )
    ),
    tags(
        (name = "generate", description = "Content generation")
    )
)]
pub struct ApiDoc;
