use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};

use crate::models::{Attachment, Downtime};

/// The remote collaborator that accepts downtime reports.
#[async_trait]
pub trait Deliver: Send + Sync {
    /// Send one report. `Ok` only for a 2xx acceptance.
    async fn deliver(&self, downtime: &Downtime, token: Option<&str>) -> Result<(), DeliveryError>;
}

#[derive(Debug, Clone)]
pub enum DeliveryError {
    /// Transport failure: unreachable, timed out, connection reset.
    Network(String),
    /// The collaborator answered with a non-2xx status.
    Rejected { status: u16, body: String },
    /// The queued payload could not be turned back into a request.
    Encoding(String),
}

impl DeliveryError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, DeliveryError::Rejected { status: 401 | 403, .. })
    }

    /// Retrying will not help. Informational: the drain path treats every
    /// failure the same way.
    pub fn is_permanent(&self) -> bool {
        match self {
            DeliveryError::Network(_) => false,
            DeliveryError::Rejected { status, .. } => {
                (400..500).contains(status) && *status != 408 && *status != 429
            }
            DeliveryError::Encoding(_) => true,
        }
    }
}

impl std::fmt::Display for DeliveryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeliveryError::Network(msg) => write!(f, "Request failed: {msg}"),
            DeliveryError::Rejected { status, body } if body.is_empty() => {
                write!(f, "Rejected with status {status}")
            }
            DeliveryError::Rejected { status, body } => {
                write!(f, "Rejected with status {status}: {body}")
            }
            DeliveryError::Encoding(msg) => write!(f, "Invalid payload: {msg}"),
        }
    }
}

impl std::error::Error for DeliveryError {}

/// HTTP client for the collaborator's logging endpoint.
///
/// Built once by the composition root and shared; the bearer token is passed
/// per call since it comes from different places in each execution context.
pub struct ApiClient {
    client: reqwest::Client,
    log_url: String,
}

impl ApiClient {
    pub fn new(log_url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: reqwest::Client::builder().timeout(timeout).build()?,
            log_url: log_url.into(),
        })
    }

    pub fn log_url(&self) -> &str {
        &self.log_url
    }

    fn build_form(downtime: &Downtime) -> Result<Form, DeliveryError> {
        let mut form = Form::new()
            .text("machine_id", downtime.machine_id.clone())
            .text("reason", downtime.reason.clone().unwrap_or_default())
            .text("category", downtime.category.clone().unwrap_or_default())
            .text(
                "description",
                downtime.description.clone().unwrap_or_default(),
            );

        if let Some(created_at) = downtime.created_at {
            form = form.text("created_at", created_at.to_rfc3339());
        }
        if let Some(image) = &downtime.image {
            form = form.part("image", file_part(image)?);
        }
        if let Some(audio) = &downtime.audio {
            form = form.part("audio", file_part(audio)?);
        }

        Ok(form)
    }
}

fn file_part(attachment: &Attachment) -> Result<Part, DeliveryError> {
    Part::bytes(attachment.bytes.clone())
        .file_name(attachment.file_name.clone())
        .mime_str(&attachment.mime)
        .map_err(|e| DeliveryError::Encoding(format!("bad MIME type {}: {e}", attachment.mime)))
}

#[async_trait]
impl Deliver for ApiClient {
    async fn deliver(&self, downtime: &Downtime, token: Option<&str>) -> Result<(), DeliveryError> {
        let form = Self::build_form(downtime)?;

        let mut req = self.client.post(&self.log_url).multipart(form);
        if let Some(token) = token {
            req = req.bearer_auth(token);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| DeliveryError::Network(e.to_string()))?;

        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }

        let body = resp
            .text()
            .await
            .unwrap_or_default()
            .chars()
            .take(1024)
            .collect::<String>();

        Err(DeliveryError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}
