//! Shared fixtures for unit and handler tests.

use async_trait::async_trait;
use axum_test::TestServer;
use reqwest::StatusCode;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, Once};
use tempfile::TempDir;
use tokio::sync::Barrier;
use url::Url;

use crate::backend::{BackendError, InferenceBackend};
use crate::config::{BackendConfig, Config, UploadsConfig};
use crate::types::{GenerationResult, Turn, UploadedAsset};

/// reqwest is built without a default crypto provider, so one has to be installed before any
/// client is constructed.
pub fn install_crypto_provider() {
    static INSTALL: Once = Once::new();
    INSTALL.call_once(|| {
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
    });
}

pub fn test_backend_config(base_url: Url) -> BackendConfig {
    BackendConfig {
        base_url,
        api_key: Some("test-key".to_string()),
        model: "gemini-2.0-flash".to_string(),
        ..Default::default()
    }
}

pub fn create_test_config(upload_dir: &Path) -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        backend: test_backend_config("http://localhost:1".parse().unwrap()),
        uploads: UploadsConfig {
            dir: upload_dir.to_path_buf(),
            ..Default::default()
        },
        // The metrics layer installs a process-wide recorder
        enable_metrics: false,
        enable_otel_export: false,
        ..Default::default()
    }
}

pub fn create_test_app_with_config(config: Config, backend: Arc<dyn InferenceBackend>) -> TestServer {
    let app = crate::Application::new_with_backend(config, backend).expect("Failed to create application");
    app.into_test_server()
}

/// Test server backed by `backend`, storing uploads in a fresh temporary directory.
pub fn create_test_app(backend: Arc<dyn InferenceBackend>) -> (TestServer, TempDir) {
    let uploads = tempfile::tempdir().expect("Failed to create upload dir");
    let server = create_test_app_with_config(create_test_config(uploads.path()), backend);
    (server, uploads)
}

pub fn upload_dir_entries(dir: &Path) -> Vec<PathBuf> {
    std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadCall {
    pub path: PathBuf,
    pub mime_type: String,
    /// Size of the file at upload time, `None` if it was already gone
    pub size_bytes: Option<u64>,
}

#[derive(Debug, Clone)]
pub enum BackendCall {
    Upload(UploadCall),
    Generate {
        model: String,
        contents: Vec<Turn>,
        /// Number of files in the observed directory while the call was in flight
        files_present: Option<usize>,
    },
}

/// In-process [`InferenceBackend`] that records every call and replies from a script.
pub struct RecordingBackend {
    reply: Result<String, String>,
    upload_uri: String,
    upload_failure: Option<String>,
    observe_dir: Option<PathBuf>,
    rendezvous: Option<Arc<Barrier>>,
    calls: Mutex<Vec<BackendCall>>,
}

impl RecordingBackend {
    fn new(reply: Result<String, String>) -> Self {
        Self {
            reply,
            upload_uri: "https://files.example/v1beta/files/test-file".to_string(),
            upload_failure: None,
            observe_dir: None,
            rendezvous: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn replying(text: &str) -> Self {
        Self::new(Ok(text.to_string()))
    }

    /// Every generation fails with a 429 carrying `message`.
    pub fn failing(message: &str) -> Self {
        Self::new(Err(message.to_string()))
    }

    pub fn with_upload_uri(mut self, uri: &str) -> Self {
        self.upload_uri = uri.to_string();
        self
    }

    pub fn with_failing_uploads(mut self, message: &str) -> Self {
        self.upload_failure = Some(message.to_string());
        self
    }

    /// Count the entries of `dir` during each generation call.
    pub fn observing_dir(mut self, dir: &Path) -> Self {
        self.observe_dir = Some(dir.to_path_buf());
        self
    }

    /// Hold each generation call until `parties` calls are in flight together.
    pub fn with_rendezvous(mut self, parties: usize) -> Self {
        self.rendezvous = Some(Arc::new(Barrier::new(parties)));
        self
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn uploads(&self) -> Vec<UploadCall> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                BackendCall::Upload(upload) => Some(upload),
                BackendCall::Generate { .. } => None,
            })
            .collect()
    }

    /// Turns sent across all generation calls, in call order.
    pub fn generated_contents(&self) -> Vec<Turn> {
        self.calls()
            .into_iter()
            .flat_map(|call| match call {
                BackendCall::Generate { contents, .. } => contents,
                BackendCall::Upload(_) => Vec::new(),
            })
            .collect()
    }

    pub fn files_seen_during_generation(&self) -> Vec<usize> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                BackendCall::Generate { files_present, .. } => files_present,
                BackendCall::Upload(_) => None,
            })
            .collect()
    }

    fn record(&self, call: BackendCall) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl InferenceBackend for RecordingBackend {
    async fn generate_content(&self, model: &str, contents: &[Turn]) -> Result<GenerationResult, BackendError> {
        if let Some(barrier) = &self.rendezvous {
            barrier.wait().await;
        }
        let files_present = self.observe_dir.as_deref().map(|dir| upload_dir_entries(dir).len());
        if let Some(barrier) = &self.rendezvous {
            // Nobody returns (and cleans up) until every party has looked
            barrier.wait().await;
        }

        self.record(BackendCall::Generate {
            model: model.to_string(),
            contents: contents.to_vec(),
            files_present,
        });

        match &self.reply {
            Ok(text) => Ok(GenerationResult { output_text: text.clone() }),
            Err(message) => Err(BackendError::Api {
                status: StatusCode::TOO_MANY_REQUESTS,
                message: message.clone(),
            }),
        }
    }

    async fn upload_file(&self, local_path: &Path, mime_type: &str) -> Result<UploadedAsset, BackendError> {
        let size_bytes = tokio::fs::metadata(local_path).await.ok().map(|m| m.len());
        self.record(BackendCall::Upload(UploadCall {
            path: local_path.to_path_buf(),
            mime_type: mime_type.to_string(),
            size_bytes,
        }));

        if let Some(message) = &self.upload_failure {
            return Err(BackendError::Api {
                status: StatusCode::BAD_REQUEST,
                message: message.clone(),
            });
        }

        Ok(UploadedAsset {
            name: Some("files/test-file".to_string()),
            uri: self.upload_uri.clone(),
            mime_type: mime_type.to_string(),
        })
    }
}
