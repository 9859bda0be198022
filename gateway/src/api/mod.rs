//! API layer for HTTP request handling and data models.
//!
//! - **[`handlers`]**: Axum route handlers for the generation endpoints
//! - **[`models`]**: Request/response bodies
//!
//! All endpoints are documented with OpenAPI annotations using `utoipa`; the document is served
//! at `/docs`.

pub mod handlers;
pub mod models;
