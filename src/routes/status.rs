use axum::Json;
use axum::extract::State;
use serde_json::json;

use crate::db;
use crate::error::AppError;
use crate::state::SharedState;

pub async fn status(State(state): State<SharedState>) -> Result<Json<serde_json::Value>, AppError> {
    let pending = db::outbox::count(&state.pool).await?;
    let background = *state.sync_state.borrow();

    Ok(Json(json!({
        "online": state.connectivity.is_online(),
        "pending": pending,
        "authenticated": state.session.token().is_some(),
        "background": background,
        "background_available": state.sync.is_available(),
        "sync_tag": state.sync.tag(),
        "open_pages": state.bridge.page_count(),
        "last_drain": state.drainer.last_report(),
    })))
}
