use axum::Json;
use axum::extract::State;
use serde::Deserialize;
use serde_json::json;

use crate::state::SharedState;

#[derive(Deserialize)]
pub struct ConnectivityRequest {
    pub online: bool,
}

/// Online/offline events reported by the UI shell.
pub async fn set(
    State(state): State<SharedState>,
    Json(req): Json<ConnectivityRequest>,
) -> Json<serde_json::Value> {
    let changed = state.connectivity.set_online(req.online);
    Json(json!({ "online": req.online, "changed": changed }))
}
