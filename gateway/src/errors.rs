use crate::api::models::generate::ErrorResponse;
use crate::backend::BackendError;
use crate::pipeline::TranscodeError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error as ThisError;

/// Message used when a failure carries no description of its own.
pub const GENERIC_FAILURE_MESSAGE: &str = "Failed to generate content.";

#[derive(ThisError, Debug)]
pub enum Error {
    /// Missing or unparseable request data, rejected before any backend call
    #[error("{message}")]
    BadRequest { message: String },

    /// The request body exceeded the configured size limit
    #[error("{message}")]
    PayloadTooLarge { message: String },

    /// The upload could not be received into scratch storage
    #[error("Failed to store uploaded file: {message}")]
    Intake { message: String },

    /// The stored payload could not be turned into a content part
    #[error(transparent)]
    Transcode(#[from] TranscodeError),

    /// The generation call failed
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// Unexpected error with full context chain
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Error::BadRequest { message: message.into() }
    }

    /// Validation failures are the client's fault; everything past validation is reported as a
    /// server error, whatever the underlying cause.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Error::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Error::Intake { .. } | Error::Transcode(_) | Error::Backend(_) | Error::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The message returned in the `error` field of the response body
    pub fn user_message(&self) -> String {
        let message = match self {
            Error::Other(_) => String::new(),
            other => other.to_string(),
        };

        if message.trim().is_empty() {
            GENERIC_FAILURE_MESSAGE.to_string()
        } else {
            message
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        match &self {
            Error::BadRequest { .. } | Error::PayloadTooLarge { .. } => {
                tracing::debug!("Client error: {}", self);
            }
            Error::Backend(_) => {
                tracing::error!("Error generating content: {:#}", self);
            }
            Error::Intake { .. } | Error::Transcode(_) | Error::Other(_) => {
                tracing::error!("Internal service error: {:#}", self);
            }
        }

        let body = ErrorResponse { error: self.user_message() };
        (self.status_code(), Json(body)).into_response()
    }
}

/// Type alias for handler results
pub type Result<T> = std::result::Result<T, Error>;
