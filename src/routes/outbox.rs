use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::json;
use uuid::Uuid;

use crate::db;
use crate::error::AppError;
use crate::models::OutboxEntry;
use crate::outbox::{DrainReport, writer};
use crate::state::SharedState;
use crate::submission::parser;
use crate::sync::ClientMessage;

/// Pending records, oldest first.
pub async fn list(State(state): State<SharedState>) -> Result<Json<serde_json::Value>, AppError> {
    let records = db::outbox::list_pending(&state.pool).await?;
    let items: Vec<OutboxEntry> = records.iter().map(OutboxEntry::from).collect();

    Ok(Json(json!({
        "items": items,
        "total": items.len(),
    })))
}

pub async fn get(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<OutboxEntry>, AppError> {
    let record = db::outbox::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Queued item not found".to_string()))?;

    Ok(Json(OutboxEntry::from(&record)))
}

/// Hand a submission to the background delegate without trying to send it.
/// Answers once the delegate has stored it; falls back to a local write when
/// the delegate is not running.
pub async fn queue(
    State(state): State<SharedState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    let submission = parser::parse_submission(&headers, body)
        .await
        .map_err(AppError::BadRequest)?;

    if let Ok(reply) = state
        .sync
        .post_message_with_reply(ClientMessage::QueueDowntime(submission.clone()))
    {
        // The delegate handles messages between passes, so a running pass
        // can hold the reply back for up to one execution window.
        let wait = state.config.background.window + state.config.request_timeout;

        match tokio::time::timeout(wait, reply).await {
            Ok(Ok(stored)) => {
                let id = stored?;
                return Ok((
                    StatusCode::ACCEPTED,
                    Json(json!({ "status": "queued", "via": "background", "id": id })),
                )
                    .into_response());
            }
            // Dropped unanswered: the delegate stopped before writing anything.
            Ok(Err(_)) => {}
            Err(_) => {
                return Err(AppError::Unavailable(
                    "Background delegate did not confirm the write in time".to_string(),
                ));
            }
        }
    }

    tracing::warn!("Background delegate not running, queueing locally");
    let record = writer::enqueue(&state.pool, submission, None).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "status": "queued", "via": "local", "id": record.id })),
    )
        .into_response())
}

/// Explicit retry: one foreground drain pass, now.
pub async fn sync(State(state): State<SharedState>) -> Result<Json<DrainReport>, AppError> {
    if !state.connectivity.is_online() {
        return Err(AppError::Unavailable(
            "Offline, queued items will be sent when the connection returns".to_string(),
        ));
    }

    let token = state.session.token();
    let report = state.drainer.drain(token.as_deref(), None).await?;

    if report.unauthorized {
        tracing::warn!("Session token rejected by the server, clearing it");
        state.session.clear();
    }
    Ok(Json(report))
}

/// Give up on a queued item. Lets an operator clear a record the server
/// will never accept.
pub async fn abandon(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, AppError> {
    if !db::outbox::delete(&state.pool, id).await? {
        return Err(AppError::NotFound("Queued item not found".to_string()));
    }

    tracing::info!("Queued item {id} abandoned by operator");
    Ok(Json(json!({ "status": "deleted" })))
}
