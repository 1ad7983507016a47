use std::collections::HashMap;

use axum::http::HeaderMap;
use axum::http::header::CONTENT_TYPE;
use bytes::Bytes;
use serde_json::{Map, Value};

use crate::models::{DowntimeSubmission, EncodedAttachment};

/// Parse a submission body: JSON, urlencoded form, or multipart with binary
/// `image`/`audio` parts.
pub async fn parse_submission(
    headers: &HeaderMap,
    body: Bytes,
) -> Result<DowntimeSubmission, String> {
    let content_type = headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok());

    if content_type.is_some_and(|ct| ct.contains("multipart/form-data")) {
        let form = parse_multipart(headers, body).await?;
        return form.into_submission();
    }

    let value = parse_body(content_type, &body)?;
    DowntimeSubmission::from_value(value)
}

/// Parse a request body based on Content-Type header.
pub fn parse_body(content_type: Option<&str>, body: &[u8]) -> Result<Value, String> {
    let ct = content_type.unwrap_or("application/json");

    if ct.contains("application/json") {
        serde_json::from_slice(body).map_err(|e| format!("Invalid JSON: {e}"))
    } else if ct.contains("application/x-www-form-urlencoded") {
        parse_form_urlencoded(body)
    } else {
        serde_json::from_slice(body)
            .or_else(|_| parse_form_urlencoded(body))
            .map_err(|e| format!("Unable to parse body: {e}"))
    }
}

fn parse_form_urlencoded(body: &[u8]) -> Result<Value, String> {
    let body_str = std::str::from_utf8(body).map_err(|e| format!("Invalid UTF-8: {e}"))?;

    let mut map = Map::new();
    for (k, v) in form_urlencoded::parse(body_str.as_bytes()) {
        map.insert(k.into_owned(), Value::String(v.into_owned()));
    }
    Ok(Value::Object(map))
}

#[derive(Debug, Default)]
pub struct MultipartForm {
    pub fields: Map<String, Value>,
    pub files: HashMap<String, UploadedFile>,
}

#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub bytes: Bytes,
    pub content_type: Option<String>,
    pub file_name: Option<String>,
}

impl MultipartForm {
    /// Text parts become fields; file parts named `image`/`audio` become
    /// inline attachments.
    pub fn into_submission(mut self) -> Result<DowntimeSubmission, String> {
        let image = self.files.remove("image");
        let audio = self.files.remove("audio");

        let mut submission = DowntimeSubmission::from_value(Value::Object(self.fields))?;

        if let Some(file) = image.filter(|f| !f.bytes.is_empty()) {
            submission.image = Some(EncodedAttachment::from_bytes(&file.bytes, file.content_type));
        }
        if let Some(file) = audio.filter(|f| !f.bytes.is_empty()) {
            submission.audio = Some(EncodedAttachment::from_bytes(&file.bytes, file.content_type));
        }

        Ok(submission)
    }
}

/// Parse multipart form data using multer.
pub async fn parse_multipart(headers: &HeaderMap, body: Bytes) -> Result<MultipartForm, String> {
    let boundary = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|ct| multer::parse_boundary(ct).ok())
        .ok_or_else(|| "Missing multipart boundary".to_string())?;

    let stream = futures_util::stream::once(async { Ok::<_, std::io::Error>(body) });
    let mut multipart = multer::Multipart::new(stream, boundary);

    let mut form = MultipartForm::default();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| format!("Multipart error: {e}"))?
    {
        let name = field.name().unwrap_or("unknown").to_string();

        if field.file_name().is_some() {
            let file_name = field.file_name().map(str::to_string);
            let content_type = field.content_type().map(|m| m.essence_str().to_string());
            let bytes = field
                .bytes()
                .await
                .map_err(|e| format!("File read error: {e}"))?;
            form.files.insert(
                name,
                UploadedFile {
                    bytes,
                    content_type,
                    file_name,
                },
            );
        } else {
            let value = field
                .text()
                .await
                .map_err(|e| format!("Field read error: {e}"))?;
            form.fields.insert(name, Value::String(value));
        }
    }

    Ok(form)
}
