use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use crate::models::DowntimeSubmission;

/// Foreground → background delegate.
///
/// Wire shape: `{"type": "QUEUE_DOWNTIME", "payload": {...}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientMessage {
    QueueDowntime(DowntimeSubmission),
}

/// Background delegate → open pages.
#[derive(Debug)]
pub enum WorkerMessage {
    /// `{"type": "REQUEST_TOKEN"}`, answered on the private `reply` channel.
    RequestToken { reply: mpsc::Sender<TokenReply> },
}

/// Page → delegate answer to a token request: `{"token": string | null}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenReply {
    pub token: Option<String>,
}

/// Outcome of a write performed by the delegate on a client's behalf.
pub type QueueReply = oneshot::Sender<Result<Uuid, sqlx::Error>>;

#[derive(Debug)]
pub(crate) enum DelegateMessage {
    Register { tag: String },
    Client {
        message: ClientMessage,
        reply: Option<QueueReply>,
    },
}
