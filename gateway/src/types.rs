//! Request-scoped domain types shared by the pipeline, the backend client and the handlers.

use std::fmt;

/// The kind of binary payload a generation endpoint accepts.
///
/// Each kind fixes the multipart field name the file must arrive under and the prompt used
/// when the client does not send one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PayloadKind {
    Image,
    Document,
    Audio,
}

impl PayloadKind {
    /// Multipart field carrying the file.
    pub fn field_name(self) -> &'static str {
        match self {
            PayloadKind::Image => "image",
            PayloadKind::Document => "document",
            PayloadKind::Audio => "audio",
        }
    }

    /// Prompt used when the request has no `prompt` field.
    pub fn default_prompt(self) -> &'static str {
        match self {
            PayloadKind::Image => "Describe this uploaded image.",
            PayloadKind::Document => "Describe this uploaded document.",
            PayloadKind::Audio => "Describe this uploaded audio.",
        }
    }

    pub fn missing_file_message(self) -> String {
        format!("No {self} file uploaded.")
    }
}

impl fmt::Display for PayloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.field_name())
    }
}

/// One piece of a conversational turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentPart {
    Text(String),
    /// Bytes embedded in the request, base64 encoded.
    InlineBlob { data: String, mime_type: String },
    /// Content previously uploaded to the backend's asset store.
    FileReference { uri: String, mime_type: String },
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        ContentPart::Text(text.into())
    }
}

/// Author of a turn. The gateway only ever sends user turns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
        }
    }
}

/// A role-attributed group of content parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub role: Role,
    pub parts: Vec<ContentPart>,
}

impl Turn {
    pub fn user(parts: Vec<ContentPart>) -> Self {
        Self { role: Role::User, parts }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationResult {
    pub output_text: String,
}

/// Handle to a backend-side copy of an uploaded file. The gateway never owns the asset itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedAsset {
    /// Backend resource name (e.g. `files/abc-123`), when the backend reports one.
    pub name: Option<String>,
    pub uri: String,
    pub mime_type: String,
}
