pub mod downtime;
pub mod outbox;
pub mod submission;

pub use downtime::{Attachment, AttachmentKind, Downtime};
pub use outbox::{OutboxEntry, OutboxRecord};
pub use submission::{DowntimeSubmission, EncodedAttachment};
