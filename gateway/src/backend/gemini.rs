//! `reqwest` implementation of [`InferenceBackend`] for the Gemini REST API.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, header::CONTENT_LENGTH};
use std::{path::Path, time::Duration};
use tokio_util::io::ReaderStream;
use tracing::{debug, instrument, warn};
use url::Url;

use super::{BackendError, InferenceBackend, wire};
use crate::config::BackendConfig;
use crate::types::{GenerationResult, Turn, UploadedAsset};

const API_KEY_HEADER: &str = "x-goog-api-key";
const UPLOAD_URL_HEADER: &str = "x-goog-upload-url";

pub struct GeminiClient {
    client: Client,
    base_url: Url,
    api_key: String,
    request_timeout: Option<Duration>,
}

impl GeminiClient {
    pub fn new(config: &BackendConfig) -> anyhow::Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| anyhow::anyhow!("backend.api_key is not configured"))?;
        let client = Client::builder().connect_timeout(config.connect_timeout).build()?;

        Ok(Self {
            client,
            base_url: ensure_slash(&config.base_url),
            api_key,
            request_timeout: config.request_timeout,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, BackendError> {
        self.base_url
            .join(path)
            .map_err(|e| BackendError::Protocol(format!("Failed to construct backend URL: {e}")))
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        let request = request.header(API_KEY_HEADER, &self.api_key);
        match self.request_timeout {
            Some(timeout) => request.timeout(timeout),
            None => request,
        }
    }
}

/// Makes sure a url has a trailing slash, so that `join` appends rather than replaces the last
/// path segment.
fn ensure_slash(url: &Url) -> Url {
    if url.path().ends_with('/') {
        url.clone()
    } else {
        let mut new_url = url.clone();
        let mut path = new_url.path().to_string();
        path.push('/');
        new_url.set_path(&path);
        new_url
    }
}

/// Turn a non-2xx response into [`BackendError::Api`], preferring the provider's own message.
async fn error_from_response(response: Response) -> BackendError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    tracing::debug!(%status, body = %body, "Backend returned an error response");

    let message = match serde_json::from_str::<wire::ErrorEnvelope>(&body) {
        Ok(envelope) if !envelope.error.message.is_empty() => envelope.error.message,
        _ if body.trim().is_empty() => format!("Backend request failed with status {status}"),
        _ => format!("Backend request failed with status {status}: {body}"),
    };

    BackendError::Api { status, message }
}

async fn decode<T: serde::de::DeserializeOwned>(response: Response) -> Result<T, BackendError> {
    let body_text = response.text().await?;
    serde_json::from_str(&body_text).map_err(|e| {
        tracing::error!("Failed to parse backend response as JSON. Error: {}", e);
        tracing::debug!("Response body was: {}", body_text);
        BackendError::Decode(e.to_string())
    })
}

#[async_trait]
impl InferenceBackend for GeminiClient {
    #[instrument(skip_all, fields(model = %model))]
    async fn generate_content(&self, model: &str, contents: &[Turn]) -> Result<GenerationResult, BackendError> {
        let url = self.endpoint(&format!("v1beta/models/{model}:generateContent"))?;
        let body = wire::GenerateContentRequest {
            contents: contents.iter().map(wire::Content::from).collect(),
        };

        debug!("Sending generateContent request to {}", url);
        let response = self.authorized(self.client.post(url)).json(&body).send().await?;
        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let parsed: wire::GenerateContentResponse = decode(response).await?;
        match parsed.text() {
            Some(output_text) => {
                if output_text.is_empty() {
                    warn!(finish_reason = ?parsed.finish_reason(), "Model returned a candidate without text");
                }
                Ok(GenerationResult { output_text })
            }
            None => match parsed.prompt_feedback.and_then(|feedback| feedback.block_reason) {
                Some(reason) => Err(BackendError::Blocked { reason }),
                None => Err(BackendError::NoCandidates),
            },
        }
    }

    /// Uploads through the resumable protocol: one call opens an upload session, a second call
    /// sends the bytes and finalizes it.
    #[instrument(skip_all, fields(mime_type = %mime_type))]
    async fn upload_file(&self, local_path: &Path, mime_type: &str) -> Result<UploadedAsset, BackendError> {
        let size_bytes = tokio::fs::metadata(local_path).await?.len();
        let display_name = local_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());

        let start = self
            .authorized(self.client.post(self.endpoint("upload/v1beta/files")?))
            .header("X-Goog-Upload-Protocol", "resumable")
            .header("X-Goog-Upload-Command", "start")
            .header("X-Goog-Upload-Header-Content-Length", size_bytes.to_string())
            .header("X-Goog-Upload-Header-Content-Type", mime_type)
            .json(&wire::UploadFileRequest {
                file: wire::UploadFileMetadata { display_name },
            })
            .send()
            .await?;
        if !start.status().is_success() {
            return Err(error_from_response(start).await);
        }

        let session_url = start
            .headers()
            .get(UPLOAD_URL_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned)
            .ok_or_else(|| BackendError::Protocol("Upload session response did not include an upload URL".to_string()))?;

        debug!(size_bytes, "Streaming file to upload session");
        let file = tokio::fs::File::open(local_path).await?;
        let finalize = self
            .authorized(self.client.post(session_url))
            .header(CONTENT_LENGTH, size_bytes)
            .header("X-Goog-Upload-Offset", "0")
            .header("X-Goog-Upload-Command", "upload, finalize")
            .body(reqwest::Body::wrap_stream(ReaderStream::new(file)))
            .send()
            .await?;
        if !finalize.status().is_success() {
            return Err(error_from_response(finalize).await);
        }

        let uploaded: wire::UploadFileResponse = decode(finalize).await?;
        debug!(uri = %uploaded.file.uri, "File uploaded to backend");

        Ok(UploadedAsset {
            name: uploaded.file.name,
            uri: uploaded.file.uri,
            mime_type: uploaded.file.mime_type,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{install_crypto_provider, test_backend_config};
    use crate::types::ContentPart;
    use reqwest::StatusCode;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> GeminiClient {
        install_crypto_provider();
        let config = test_backend_config(server.uri().parse().unwrap());
        GeminiClient::new(&config).unwrap()
    }

    #[test]
    fn test_ensure_slash() {
        let url = Url::parse("https://example.com/api").unwrap();
        assert_eq!(ensure_slash(&url).as_str(), "https://example.com/api/");
        let url = Url::parse("https://example.com/api/").unwrap();
        assert_eq!(ensure_slash(&url).as_str(), "https://example.com/api/");
    }

    #[test]
    fn test_new_requires_api_key() {
        install_crypto_provider();
        let mut config = test_backend_config("http://localhost:1".parse().unwrap());
        config.api_key = None;
        assert!(GeminiClient::new(&config).is_err());
    }

    #[tokio::test]
    async fn test_generate_content_posts_user_turn() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-2.0-flash:generateContent"))
            .and(header("x-goog-api-key", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{
                    "content": { "role": "model", "parts": [{ "text": "A red square." }] },
                    "finishReason": "STOP"
                }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let turn = Turn::user(vec![
            ContentPart::text("Describe this uploaded image."),
            ContentPart::FileReference {
                uri: "https://files.example/abc".to_string(),
                mime_type: "image/png".to_string(),
            },
        ]);

        let result = client.generate_content("gemini-2.0-flash", &[turn]).await.unwrap();
        assert_eq!(result.output_text, "A red square.");

        let requests = server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(
            body,
            json!({
                "contents": [{
                    "role": "user",
                    "parts": [
                        { "text": "Describe this uploaded image." },
                        { "fileData": { "mimeType": "image/png", "fileUri": "https://files.example/abc" } }
                    ]
                }]
            })
        );
    }

    #[tokio::test]
    async fn test_generate_content_surfaces_backend_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_json(json!({
                "error": { "code": 429, "message": "quota exceeded", "status": "RESOURCE_EXHAUSTED" }
            })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client
            .generate_content("gemini-2.0-flash", &[Turn::user(vec![ContentPart::text("hi")])])
            .await
            .unwrap_err();

        match &err {
            BackendError::Api { status, message } => {
                assert_eq!(*status, StatusCode::TOO_MANY_REQUESTS);
                assert_eq!(message, "quota exceeded");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(err.to_string(), "quota exceeded");
    }

    #[tokio::test]
    async fn test_generate_content_non_json_error_keeps_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client
            .generate_content("gemini-2.0-flash", &[Turn::user(vec![ContentPart::text("hi")])])
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "Backend request failed with status 502 Bad Gateway: bad gateway");
    }

    #[tokio::test]
    async fn test_generate_content_blocked_prompt() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "promptFeedback": { "blockReason": "SAFETY" }
            })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client
            .generate_content("gemini-2.0-flash", &[Turn::user(vec![ContentPart::text("hi")])])
            .await
            .unwrap_err();

        assert!(matches!(err, BackendError::Blocked { ref reason } if reason == "SAFETY"));
    }

    #[tokio::test]
    async fn test_generate_content_candidate_without_text_is_empty_output() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{ "content": { "role": "model" }, "finishReason": "MAX_TOKENS" }]
            })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let result = client
            .generate_content("gemini-2.0-flash", &[Turn::user(vec![ContentPart::text("hi")])])
            .await
            .unwrap();

        assert_eq!(result.output_text, "");
    }

    #[tokio::test]
    async fn test_upload_file_uses_resumable_session() {
        let server = MockServer::start().await;
        let session_url = format!("{}/upload-session/42", server.uri());

        Mock::given(method("POST"))
            .and(path("/upload/v1beta/files"))
            .and(header("x-goog-api-key", "test-key"))
            .and(header("x-goog-upload-protocol", "resumable"))
            .and(header("x-goog-upload-command", "start"))
            .and(header("x-goog-upload-header-content-length", "10"))
            .and(header("x-goog-upload-header-content-type", "image/png"))
            .respond_with(ResponseTemplate::new(200).insert_header("x-goog-upload-url", session_url.as_str()))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/upload-session/42"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "file": {
                    "name": "files/abc-123",
                    "mimeType": "image/png",
                    "sizeBytes": "10",
                    "uri": "https://generativelanguage.googleapis.com/v1beta/files/abc-123",
                    "state": "ACTIVE"
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("0123456789abcdef");
        tokio::fs::write(&file_path, b"0123456789").await.unwrap();

        let client = client_for(&server);
        let asset = client.upload_file(&file_path, "image/png").await.unwrap();

        assert_eq!(asset.name.as_deref(), Some("files/abc-123"));
        assert_eq!(asset.uri, "https://generativelanguage.googleapis.com/v1beta/files/abc-123");
        assert_eq!(asset.mime_type, "image/png");

        let requests = server.received_requests().await.unwrap();
        let start_body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(start_body, json!({ "file": { "display_name": "0123456789abcdef" } }));

        let finalize = &requests[1];
        assert_eq!(finalize.body, b"0123456789");
        assert_eq!(
            finalize.headers.get("x-goog-upload-command").and_then(|v| v.to_str().ok()),
            Some("upload, finalize")
        );
        assert_eq!(
            finalize.headers.get("x-goog-upload-offset").and_then(|v| v.to_str().ok()),
            Some("0")
        );
    }

    #[tokio::test]
    async fn test_upload_file_without_session_url_fails() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("upload");
        tokio::fs::write(&file_path, b"abc").await.unwrap();

        let client = client_for(&server);
        let err = client.upload_file(&file_path, "audio/mpeg").await.unwrap_err();
        assert!(matches!(err, BackendError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_upload_missing_file_is_io_error() {
        let server = MockServer::start().await;
        let client = client_for(&server);
        let err = client
            .upload_file(Path::new("/definitely/not/here"), "image/png")
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Io(_)));
        assert!(server.received_requests().await.unwrap().is_empty());
    }
}
