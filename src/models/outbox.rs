use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::downtime::{AttachmentKind, Downtime};
use super::submission::{DowntimeSubmission, EncodedAttachment};

/// One queued submission. Present means not yet acknowledged by the collaborator.
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize, PartialEq, Eq)]
pub struct OutboxRecord {
    pub id: Uuid,
    pub machine_id: String,
    pub reason: Option<String>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub image_data: Option<String>,
    pub image_mime: Option<String>,
    pub audio_data: Option<String>,
    pub audio_mime: Option<String>,
    /// Epoch milliseconds at write time. Sent along with the report; queue
    /// order comes from the store, not from this.
    pub created_at: i64,
}

impl OutboxRecord {
    pub fn from_submission(submission: DowntimeSubmission, id: Uuid, created_at: i64) -> Self {
        let (image_data, image_mime) = split(submission.image);
        let (audio_data, audio_mime) = split(submission.audio);
        Self {
            id,
            machine_id: submission.machine_id,
            reason: submission.reason,
            category: submission.category,
            description: submission.description,
            image_data,
            image_mime,
            audio_data,
            audio_mime,
            created_at,
        }
    }

    /// Rebuild binary attachments for delivery. Files are named after the record id.
    pub fn to_downtime(&self) -> Result<Downtime, String> {
        let stem = self.id.to_string();
        let image = self
            .image_data
            .as_ref()
            .map(|data| {
                encoded(data, &self.image_mime).to_attachment(AttachmentKind::Image, &stem)
            })
            .transpose()?;
        let audio = self
            .audio_data
            .as_ref()
            .map(|data| {
                encoded(data, &self.audio_mime).to_attachment(AttachmentKind::Audio, &stem)
            })
            .transpose()?;

        Ok(Downtime {
            machine_id: self.machine_id.clone(),
            reason: self.reason.clone(),
            category: self.category.clone(),
            description: self.description.clone(),
            image,
            audio,
            created_at: DateTime::<Utc>::from_timestamp_millis(self.created_at),
        })
    }
}

fn split(attachment: Option<EncodedAttachment>) -> (Option<String>, Option<String>) {
    match attachment {
        Some(a) => (Some(a.data), a.mime),
        None => (None, None),
    }
}

fn encoded(data: &str, mime: &Option<String>) -> EncodedAttachment {
    EncodedAttachment {
        data: data.to_string(),
        mime: mime.clone(),
    }
}

/// Queue-inspection view of a record, without attachment payloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxEntry {
    pub id: Uuid,
    pub machine_id: String,
    pub reason: Option<String>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub has_image: bool,
    pub has_audio: bool,
    pub created_at: i64,
}

impl From<&OutboxRecord> for OutboxEntry {
    fn from(record: &OutboxRecord) -> Self {
        Self {
            id: record.id,
            machine_id: record.machine_id.clone(),
            reason: record.reason.clone(),
            category: record.category.clone(),
            description: record.description.clone(),
            has_image: record.image_data.is_some(),
            has_audio: record.audio_data.is_some(),
            created_at: record.created_at,
        }
    }
}
