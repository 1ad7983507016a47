use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::error::AppError;
use crate::state::SharedState;
use crate::submission::pipeline::PipelineResult;
use crate::submission::{parser, pipeline};

pub async fn submit(
    State(state): State<SharedState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    let submission = parser::parse_submission(&headers, body)
        .await
        .map_err(AppError::BadRequest)?;

    match pipeline::run(&state, submission).await? {
        PipelineResult::Sent => Ok((StatusCode::CREATED, Json(json!({ "status": "sent" }))).into_response()),
        PipelineResult::Queued(record) => Ok((
            StatusCode::ACCEPTED,
            Json(json!({ "status": "queued", "id": record.id })),
        )
            .into_response()),
    }
}
