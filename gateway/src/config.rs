//! Application configuration management.
//!
//! Configuration is loaded from a YAML file with environment variable overrides. The file path
//! defaults to `config.yaml` but can be specified via the `-f` flag or the `GATEWAY_CONFIG`
//! environment variable. A missing file is not an error: every field has a default except the
//! backend API key.
//!
//! ## Loading Priority
//!
//! Sources are merged in the following order (later sources override earlier ones):
//!
//! 1. **YAML config file** - Base configuration (default: `config.yaml`)
//! 2. **Environment variables** - Variables prefixed with `GATEWAY_` override YAML values
//! 3. **`PORT` and `GOOGLE_GEMINI_API_KEY`** - Conventional variables, mapped onto `port` and
//!    `backend.api_key`
//!
//! Nested values use double underscores, e.g. `GATEWAY_BACKEND__MODEL=gemini-2.5-flash` sets
//! `backend.model`.
//!
//! ## Example
//!
//! ```yaml
//! host: 0.0.0.0
//! port: 3000
//! backend:
//!   model: gemini-2.0-flash
//!   request_timeout: 2m
//! uploads:
//!   dir: /var/tmp/genai-gateway
//! transcode:
//!   image: remote_reference
//!   document: inline
//!   audio: inline
//! cors:
//!   allowed_origins: ["https://app.example.com"]
//! ```

use clap::Parser;
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};
use url::Url;

use crate::pipeline::TranscodeStrategy;
use crate::types::PayloadKind;

/// Simple CLI args - just for specifying config file
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short = 'f', long, env = "GATEWAY_CONFIG", default_value = "config.yaml")]
    pub config: String,

    /// Validate configuration and exit without starting the server.
    #[arg(long)]
    pub validate: bool,
}

/// Main application configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// HTTP server host to bind to (e.g., "0.0.0.0" for all interfaces)
    pub host: String,
    /// HTTP server port to bind to
    pub port: u16,
    /// Inference backend connection settings
    pub backend: BackendConfig,
    /// Scratch storage for multipart uploads
    pub uploads: UploadsConfig,
    /// How each payload kind is handed to the backend
    pub transcode: TranscodeConfig,
    pub cors: CorsConfig,
    /// Enable Prometheus metrics endpoint at `/internal/metrics`
    pub enable_metrics: bool,
    /// Enable OpenTelemetry OTLP export for distributed tracing
    pub enable_otel_export: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct BackendConfig {
    /// Root of the Gemini REST API
    pub base_url: Url,
    /// API key sent in the `x-goog-api-key` header. Required.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Model every generation request is sent to
    pub model: String,
    /// Per-request timeout for backend calls. Unset means no client-side timeout.
    #[serde(with = "humantime_serde")]
    pub request_timeout: Option<Duration>,
    /// TCP connect timeout for backend calls
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: Url::parse("https://generativelanguage.googleapis.com").expect("static URL is valid"),
            api_key: None,
            model: "gemini-2.0-flash".to_string(),
            request_timeout: None,
            connect_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct UploadsConfig {
    /// Directory uploaded files are written to while a request is in flight
    pub dir: PathBuf,
    /// Maximum request body size accepted by the server, in bytes
    pub max_body_bytes: usize,
}

impl Default for UploadsConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("uploads"),
            max_body_bytes: 100 * 1024 * 1024,
        }
    }
}

/// Transcoding strategy per payload kind.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct TranscodeConfig {
    pub image: TranscodeStrategy,
    pub document: TranscodeStrategy,
    pub audio: TranscodeStrategy,
}

impl Default for TranscodeConfig {
    fn default() -> Self {
        Self {
            image: TranscodeStrategy::RemoteReference,
            document: TranscodeStrategy::Inline,
            audio: TranscodeStrategy::Inline,
        }
    }
}

impl TranscodeConfig {
    pub fn strategy_for(&self, kind: PayloadKind) -> TranscodeStrategy {
        match kind {
            PayloadKind::Image => self.image,
            PayloadKind::Document => self.document,
            PayloadKind::Audio => self.audio,
        }
    }
}

/// CORS configuration. No origins means no CORS headers are sent.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct CorsConfig {
    /// Allowed origins for CORS requests
    pub allowed_origins: Vec<CorsOrigin>,
    /// Cache preflight requests for this many seconds
    pub max_age: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum CorsOrigin {
    /// Allow all origins (`*`)
    #[serde(deserialize_with = "parse_wildcard", serialize_with = "serialize_wildcard")]
    Wildcard,
    /// Specific origin URL (e.g., `https://app.example.com`)
    #[serde(deserialize_with = "parse_url")]
    Url(Url),
}

fn parse_wildcard<'de, D>(deserializer: D) -> Result<(), D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    if s == "*" {
        Ok(())
    } else {
        Err(serde::de::Error::custom("Expected '*'"))
    }
}

fn serialize_wildcard<S>(serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str("*")
}

fn parse_url<'de, D>(deserializer: D) -> Result<Url, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    Url::parse(&s).map_err(serde::de::Error::custom)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            backend: BackendConfig::default(),
            uploads: UploadsConfig::default(),
            transcode: TranscodeConfig::default(),
            cors: CorsConfig::default(),
            enable_metrics: false,
            enable_otel_export: false,
        }
    }
}

impl Config {
    #[allow(clippy::result_large_err)]
    pub fn load(args: &Args) -> Result<Self, figment::Error> {
        let config: Self = Self::figment(args).extract()?;
        config.validate().map_err(|e| figment::Error::from(e.to_string()))?;
        Ok(config)
    }

    /// Validate the configuration for consistency and required fields
    pub fn validate(&self) -> anyhow::Result<()> {
        match self.backend.api_key.as_deref() {
            Some(key) if !key.trim().is_empty() => {}
            _ => anyhow::bail!(
                "Config validation: backend.api_key is not configured. \
                 Set GOOGLE_GEMINI_API_KEY or GATEWAY_BACKEND__API_KEY, or add backend.api_key to the config file."
            ),
        }

        if self.backend.model.trim().is_empty() {
            anyhow::bail!("Config validation: backend.model cannot be empty");
        }

        if self.uploads.max_body_bytes == 0 {
            anyhow::bail!("Config validation: uploads.max_body_bytes must be greater than zero");
        }

        Ok(())
    }

    pub fn figment(args: &Args) -> Figment {
        Figment::new()
            // Load base config file
            .merge(Yaml::file(&args.config))
            // Environment variables can still override specific values
            .merge(Env::prefixed("GATEWAY_").ignore(&["config"]).split("__"))
            // Conventional variables used by hosting platforms and the Gemini SDKs
            .merge(Env::raw().only(&["PORT"]))
            .merge(
                Env::raw()
                    .only(&["GOOGLE_GEMINI_API_KEY"])
                    .map(|_| "backend.api_key".into()),
            )
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
