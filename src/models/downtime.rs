use chrono::{DateTime, Utc};

/// A downtime report ready to be sent to the collaborator, attachments decoded.
#[derive(Debug, Clone, PartialEq)]
pub struct Downtime {
    pub machine_id: String,
    pub reason: Option<String>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub image: Option<Attachment>,
    pub audio: Option<Attachment>,
    /// Only set for reports replayed from the outbox.
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Attachment {
    pub bytes: Vec<u8>,
    pub mime: String,
    pub file_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentKind {
    Image,
    Audio,
}

impl AttachmentKind {
    pub fn field_name(self) -> &'static str {
        match self {
            AttachmentKind::Image => "image",
            AttachmentKind::Audio => "audio",
        }
    }

    pub fn default_mime(self) -> &'static str {
        match self {
            AttachmentKind::Image => "image/jpeg",
            AttachmentKind::Audio => "audio/webm",
        }
    }
}

impl Attachment {
    /// Build an attachment named `<stem>.<ext>`, the extension derived from the MIME type.
    pub fn new(kind: AttachmentKind, bytes: Vec<u8>, mime: Option<&str>, stem: &str) -> Self {
        let mime = mime
            .filter(|m| !m.is_empty())
            .unwrap_or(kind.default_mime())
            .to_string();
        let file_name = format!("{stem}.{}", extension_for(&mime));
        Self {
            bytes,
            mime,
            file_name,
        }
    }
}

fn extension_for(mime: &str) -> &'static str {
    match mime {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/png" => "png",
        "image/webp" => "webp",
        "image/gif" => "gif",
        "audio/webm" => "webm",
        "audio/ogg" => "ogg",
        "audio/mpeg" => "mp3",
        "audio/wav" | "audio/x-wav" => "wav",
        "audio/mp4" => "m4a",
        _ => "bin",
    }
}
