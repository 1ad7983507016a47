use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

use super::downtime::{Attachment, AttachmentKind, Downtime};

/// A downtime submission in its canonical field set.
///
/// Older clients send `root_cause`/`sub_category` and `*_base64` attachment
/// fields; those are accepted as aliases and normalised here, so nothing
/// downstream ever sees the alternative shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DowntimeSubmission {
    #[serde(alias = "machineId")]
    pub machine_id: String,
    #[serde(default, alias = "root_cause", alias = "reasonCode")]
    pub reason: Option<String>,
    #[serde(default, alias = "sub_category", alias = "categoryCode")]
    pub category: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, alias = "image_base64", alias = "imageData", alias = "imageDataUrl")]
    pub image: Option<EncodedAttachment>,
    #[serde(default, alias = "audio_base64", alias = "audioData", alias = "audioDataUrl")]
    pub audio: Option<EncodedAttachment>,
}

impl DowntimeSubmission {
    /// Deserialize and normalise a submission from a parsed request body.
    pub fn from_value(value: serde_json::Value) -> Result<Self, String> {
        let submission: DowntimeSubmission =
            serde_json::from_value(value).map_err(|e| format!("Invalid submission: {e}"))?;
        submission.normalize()
    }

    /// Trim fields, turn empty values into `None`, and require `machine_id`.
    pub fn normalize(self) -> Result<Self, String> {
        let machine_id = self.machine_id.trim().to_string();
        if machine_id.is_empty() {
            return Err("machine_id is required".to_string());
        }

        Ok(Self {
            machine_id,
            reason: non_empty(self.reason),
            category: non_empty(self.category),
            description: non_empty(self.description),
            image: self.image.filter(|a| !a.data.is_empty()),
            audio: self.audio.filter(|a| !a.data.is_empty()),
        })
    }

    /// Decode attachments for a direct send.
    pub fn to_downtime(&self) -> Result<Downtime, String> {
        let image = self
            .image
            .as_ref()
            .map(|a| a.to_attachment(AttachmentKind::Image, "image"))
            .transpose()?;
        let audio = self
            .audio
            .as_ref()
            .map(|a| a.to_attachment(AttachmentKind::Audio, "audio"))
            .transpose()?;

        Ok(Downtime {
            machine_id: self.machine_id.clone(),
            reason: self.reason.clone(),
            category: self.category.clone(),
            description: self.description.clone(),
            image,
            audio,
            created_at: None,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// A binary attachment kept inline as base64 text.
///
/// Serialises as a `data:` URL when the MIME type is known, plain base64 otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EncodedAttachment {
    pub data: String,
    pub mime: Option<String>,
}

impl EncodedAttachment {
    pub fn from_bytes(bytes: &[u8], mime: Option<String>) -> Self {
        Self {
            data: STANDARD.encode(bytes),
            mime: mime.filter(|m| !m.is_empty()),
        }
    }

    /// Accepts plain base64 or a `data:<mime>;base64,<payload>` URL.
    pub fn parse(raw: &str) -> Result<Self, String> {
        let raw = raw.trim();
        let (mime, payload) = match raw.strip_prefix("data:") {
            Some(rest) => {
                let (header, payload) = rest.split_once(',').ok_or("Malformed data URL")?;
                let mime = header
                    .strip_suffix(";base64")
                    .ok_or("Data URL attachments must be base64 encoded")?;
                ((!mime.is_empty()).then(|| mime.to_string()), payload)
            }
            None => (None, raw),
        };

        STANDARD
            .decode(payload)
            .map_err(|e| format!("Invalid base64 attachment: {e}"))?;

        Ok(Self {
            data: payload.to_string(),
            mime,
        })
    }

    pub fn decode(&self) -> Result<Vec<u8>, String> {
        STANDARD
            .decode(&self.data)
            .map_err(|e| format!("Invalid base64 attachment: {e}"))
    }

    pub fn to_attachment(&self, kind: AttachmentKind, stem: &str) -> Result<Attachment, String> {
        Ok(Attachment::new(
            kind,
            self.decode()?,
            self.mime.as_deref(),
            stem,
        ))
    }
}

impl TryFrom<String> for EncodedAttachment {
    type Error = String;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        Self::parse(&raw)
    }
}

impl From<EncodedAttachment> for String {
    fn from(attachment: EncodedAttachment) -> Self {
        match attachment.mime {
            Some(mime) => format!("data:{mime};base64,{}", attachment.data),
            None => attachment.data,
        }
    }
}
