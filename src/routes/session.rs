use axum::Json;
use axum::extract::State;
use serde::Deserialize;
use serde_json::json;

use crate::error::AppError;
use crate::state::SharedState;

#[derive(Deserialize)]
pub struct SessionRequest {
    pub token: String,
}

pub async fn set(
    State(state): State<SharedState>,
    Json(req): Json<SessionRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let token = req.token.trim();
    if token.is_empty() {
        return Err(AppError::BadRequest("token is required".to_string()));
    }

    state.session.set_token(token.to_string());

    // Records held back for lack of a token can go now.
    if let Err(e) = state.sync.register() {
        tracing::debug!("Background sync not registered after login: {e}");
    }

    Ok(Json(json!({ "status": "ok" })))
}

pub async fn clear(State(state): State<SharedState>) -> Json<serde_json::Value> {
    state.session.clear();
    Json(json!({ "status": "ok" }))
}
