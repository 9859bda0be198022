//! # genai-gateway: HTTP front door for generative models
//!
//! `genai-gateway` accepts text prompts and uploaded images, documents or audio over plain HTTP,
//! forwards them to a generative model (Google Gemini by default) and returns the generated text.
//! Clients never see provider credentials or provider-specific request formats.
//!
//! ## Endpoints
//!
//! | Route | Body | Notes |
//! |-------|------|-------|
//! | `POST /generate-text` | JSON `{"prompt": "..."}` | |
//! | `POST /generate-from-image` | multipart, file field `image` | optional `prompt` field |
//! | `POST /generate-from-document` | multipart, file field `document` | optional `prompt` field |
//! | `POST /generate-from-audio` | multipart, file field `audio` | optional `prompt` field |
//!
//! Success is `200 {"output": "..."}`. Failures are `{"error": "..."}`, with status 500 for
//! anything that went wrong upstream. `/healthz`, `/docs` and (optionally) `/internal/metrics`
//! sit alongside.
//!
//! ## Request flow
//!
//! Each request is independent. Uploaded files are streamed to the configured upload directory,
//! converted into a content part by the [`pipeline`] (either inlined as base64 or uploaded to the
//! provider's file store and referenced by URI), sent to the model as a single user turn through
//! an [`backend::InferenceBackend`], and deleted again before the response is returned, whether
//! generation succeeded or not.
//!
//! ## Quick Start
//!
//! ```no_run
//! use clap::Parser;
//! use genai_gateway::{Application, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = genai_gateway::config::Args::parse();
//!     let config = Config::load(&args)?;
//!     genai_gateway::telemetry::init_telemetry(config.enable_otel_export)?;
//!
//!     Application::new(config)?
//!         .serve(async {
//!             tokio::signal::ctrl_c().await.expect("Failed to listen for Ctrl+C");
//!         })
//!         .await
//! }
//! ```
//!
//! See the [`config`] module for configuration options.

pub mod api;
pub mod backend;
pub mod config;
pub mod errors;
mod openapi;
pub mod pipeline;
pub mod telemetry;
#[cfg(test)]
pub(crate) mod test_utils;
pub mod types;

use anyhow::Context;
use axum::extract::DefaultBodyLimit;
use axum::http::HeaderValue;
use axum::{
    Router,
    routing::{get, post},
};
use axum_prometheus::PrometheusMetricLayer;
use bon::Builder;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, info, instrument};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

use crate::backend::{GeminiClient, InferenceBackend};
use crate::config::CorsOrigin;
use crate::openapi::ApiDoc;
pub use config::Config;

/// State shared by every handler. Nothing in it is mutated after startup.
#[derive(Clone, Builder)]
pub struct AppState {
    pub config: Config,
    pub backend: Arc<dyn InferenceBackend>,
}

fn create_cors_layer(config: &Config) -> anyhow::Result<CorsLayer> {
    let allowed = &config.cors.allowed_origins;

    let allow_origin = if allowed.contains(&CorsOrigin::Wildcard) {
        AllowOrigin::any()
    } else {
        let mut origins = Vec::new();
        for origin in allowed {
            if let CorsOrigin::Url(url) = origin {
                // Origins never carry a path, but `Url` always renders one
                origins.push(url.as_str().trim_end_matches('/').parse::<HeaderValue>()?);
            }
        }
        AllowOrigin::list(origins)
    };

    let mut cors = CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([axum::http::Method::GET, axum::http::Method::POST])
        .allow_headers([axum::http::header::CONTENT_TYPE]);

    if let Some(max_age) = config.cors.max_age {
        cors = cors.max_age(std::time::Duration::from_secs(max_age));
    }

    Ok(cors)
}

/// Build the router: the four generation routes plus health, docs and optional metrics, wrapped
/// in CORS and request tracing.
#[instrument(skip_all)]
pub fn build_router(state: &AppState) -> anyhow::Result<Router> {
    use api::handlers::generate;

    let body_limit = DefaultBodyLimit::max(state.config.uploads.max_body_bytes);

    let mut router = Router::new()
        .route("/generate-text", post(generate::generate_text))
        .route("/generate-from-image", post(generate::generate_from_image))
        .route("/generate-from-document", post(generate::generate_from_document))
        .route("/generate-from-audio", post(generate::generate_from_audio))
        .layer(body_limit)
        .with_state(state.clone())
        .route("/healthz", get(|| async { "OK" }))
        .merge(Scalar::with_url("/docs", ApiDoc::openapi()))
        .layer(create_cors_layer(&state.config)?);

    if state.config.enable_metrics {
        let (prometheus_layer, metric_handle) = PrometheusMetricLayer::pair();
        router = router
            .route("/internal/metrics", get(|| async move { metric_handle.render() }))
            .layer(prometheus_layer);
    }

    let router = router.layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_request(DefaultOnRequest::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    );

    Ok(router)
}

/// A configured gateway, ready to serve.
pub struct Application {
    router: Router,
    config: Config,
}

impl Application {
    /// Build the application against the Gemini API described by `config.backend`.
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let backend = Arc::new(GeminiClient::new(&config.backend)?);
        Self::new_with_backend(config, backend)
    }

    pub fn new_with_backend(config: Config, backend: Arc<dyn InferenceBackend>) -> anyhow::Result<Self> {
        std::fs::create_dir_all(&config.uploads.dir)
            .with_context(|| format!("Failed to create upload directory {}", config.uploads.dir.display()))?;

        let state = AppState::builder().config(config.clone()).backend(backend).build();
        let router = build_router(&state)?;

        Ok(Self { router, config })
    }

    #[cfg(test)]
    pub fn into_test_server(self) -> axum_test::TestServer {
        axum_test::TestServer::new(self.router.into_make_service()).expect("Failed to create test server")
    }

    /// Serve until `shutdown` resolves. In-flight requests are allowed to finish, so their uploads
    /// are still cleaned up.
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!(
            "Gateway listening on http://{}, using model {}",
            bind_addr, self.config.backend.model
        );

        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await?;

        Ok(())
    }
}
