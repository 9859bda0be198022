//! Request intake: pulling the prompt and the single uploaded file out of a request.
//!
//! Uploaded files are streamed to a uniquely named file in the upload directory and wrapped in a
//! [`TempUpload`] guard as soon as the file exists on disk. The guard owns the file: it is removed
//! by [`TempUpload::cleanup`] on the normal path, and by `Drop` if the request is abandoned before
//! that (an intake error part-way through, or the handler future being dropped).

use axum::extract::multipart::{Field, Multipart, MultipartError};
use axum::http::StatusCode;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::errors::{Error, Result};
use crate::types::PayloadKind;

const PROMPT_FIELD: &str = "prompt";
const FALLBACK_MIME_TYPE: &str = "application/octet-stream";

/// A multipart attachment written to scratch storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub kind: PayloadKind,
    pub local_path: PathBuf,
    pub mime_type: String,
    pub size_bytes: u64,
    /// File name declared by the client. Never used to build paths.
    pub original_name: Option<String>,
}

/// Owning guard over an [`UploadedFile`]'s backing file. The file is deleted exactly once.
#[derive(Debug)]
pub struct TempUpload {
    file: UploadedFile,
    released: bool,
}

impl TempUpload {
    async fn create(
        dir: &Path,
        kind: PayloadKind,
        mime_type: String,
        original_name: Option<String>,
    ) -> std::io::Result<(Self, tokio::fs::File)> {
        let local_path = dir.join(Uuid::new_v4().simple().to_string());
        let handle = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&local_path)
            .await?;

        let upload = Self {
            file: UploadedFile {
                kind,
                local_path,
                mime_type,
                size_bytes: 0,
                original_name,
            },
            released: false,
        };
        Ok((upload, handle))
    }

    pub fn file(&self) -> &UploadedFile {
        &self.file
    }

    /// Delete the backing file. Failures are logged and otherwise ignored.
    pub async fn cleanup(mut self) {
        self.released = true;
        match tokio::fs::remove_file(&self.file.local_path).await {
            Ok(()) => debug!(path = %self.file.local_path.display(), "Deleted uploaded file"),
            Err(e) => warn!(path = %self.file.local_path.display(), error = %e, "Error deleting uploaded file"),
        }
    }
}

impl Drop for TempUpload {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        match std::fs::remove_file(&self.file.local_path) {
            Ok(()) => debug!(path = %self.file.local_path.display(), "Deleted abandoned upload"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.file.local_path.display(), error = %e, "Error deleting abandoned upload"),
        }
    }
}

/// A prompt plus at most one uploaded file, owned by the request that received it.
#[derive(Debug)]
pub struct GenerationRequest {
    pub prompt_text: String,
    pub payload: Option<TempUpload>,
}

impl GenerationRequest {
    pub fn uploaded_file(&self) -> Option<&UploadedFile> {
        self.payload.as_ref().map(TempUpload::file)
    }

    /// Release the uploaded file, if any.
    pub async fn cleanup(self) {
        if let Some(upload) = self.payload {
            upload.cleanup().await;
        }
    }
}

/// Intake for the text-only endpoint: the prompt is required.
pub fn receive_text(prompt: Option<String>) -> Result<GenerationRequest> {
    let prompt_text = prompt.ok_or_else(|| Error::bad_request("Missing required field: 'prompt'"))?;
    Ok(GenerationRequest {
        prompt_text,
        payload: None,
    })
}

fn multipart_error(e: MultipartError) -> Error {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        Error::PayloadTooLarge { message: e.body_text() }
    } else {
        Error::bad_request(format!("Failed to parse multipart data: {}", e.body_text()))
    }
}

/// Intake for the payload endpoints.
///
/// Reads an optional `prompt` text field (falling back to the kind's default prompt) and exactly
/// one file under the kind's field name. Other text fields and file parts without a file name are
/// ignored; other file fields, a second file, or no file at all are rejected.
#[instrument(skip_all, fields(kind = %kind))]
pub async fn receive_payload_form(mut multipart: Multipart, kind: PayloadKind, upload_dir: &Path) -> Result<GenerationRequest> {
    let mut prompt: Option<String> = None;
    let mut upload: Option<TempUpload> = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let field_name = field.name().unwrap_or("").to_string();
        // Browsers send an empty file input as a part with `filename=""`
        let is_file = field.file_name().is_some_and(|name| !name.is_empty());

        match (field_name.as_str(), is_file) {
            (name, true) if name == kind.field_name() => {
                if upload.is_some() {
                    return Err(Error::bad_request(format!("Only one {kind} file may be uploaded.")));
                }
                upload = Some(store_field(field, kind, upload_dir).await?);
            }
            (_, true) => {
                return Err(Error::bad_request(format!("Unexpected file field '{field_name}'")));
            }
            (PROMPT_FIELD, false) => {
                prompt = Some(field.text().await.map_err(multipart_error)?);
            }
            _ => {
                // Ignore unknown text fields
            }
        }
    }

    let upload = upload.ok_or_else(|| Error::bad_request(kind.missing_file_message()))?;

    Ok(GenerationRequest {
        prompt_text: prompt.unwrap_or_else(|| kind.default_prompt().to_string()),
        payload: Some(upload),
    })
}

/// Declared content type, else a guess from the file name, else `application/octet-stream`.
fn resolve_mime_type(content_type: Option<&str>, file_name: Option<&str>) -> String {
    content_type
        .filter(|ct| !ct.trim().is_empty())
        .map(str::to_owned)
        .or_else(|| file_name.and_then(|name| mime_guess::from_path(name).first_raw()).map(str::to_owned))
        .unwrap_or_else(|| FALLBACK_MIME_TYPE.to_string())
}

async fn store_field(mut field: Field<'_>, kind: PayloadKind, upload_dir: &Path) -> Result<TempUpload> {
    let original_name = field.file_name().map(str::to_owned);
    let mime_type = resolve_mime_type(field.content_type(), original_name.as_deref());

    let (mut upload, mut handle) = TempUpload::create(upload_dir, kind, mime_type, original_name)
        .await
        .map_err(|e| Error::Intake { message: e.to_string() })?;

    while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
        handle
            .write_all(&chunk)
            .await
            .map_err(|e| Error::Intake { message: e.to_string() })?;
        upload.file.size_bytes += chunk.len() as u64;
    }
    handle.flush().await.map_err(|e| Error::Intake { message: e.to_string() })?;

    info!(
        path = %upload.file.local_path.display(),
        mime_type = %upload.file.mime_type,
        size_bytes = upload.file.size_bytes,
        original_name = ?upload.file.original_name,
        "Stored uploaded file"
    );

    Ok(upload)
}

#[cfg(test)]
impl TempUpload {
    pub(crate) async fn for_tests(dir: &Path, kind: PayloadKind, mime_type: &str, bytes: &[u8]) -> Self {
        let (mut upload, mut handle) = Self::create(dir, kind, mime_type.to_string(), None).await.unwrap();
        handle.write_all(bytes).await.unwrap();
        handle.flush().await.unwrap();
        upload.file.size_bytes = bytes.len() as u64;
        upload
    }
}
