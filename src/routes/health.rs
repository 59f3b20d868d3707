use axum::{extract::State, Json};
use chrono::Utc;
use serde_json::{json, Value};

use crate::state::AppState;

/// GET /health — liveness only; does not touch the database.
pub async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status":      "OK",
        "timestamp":   Utc::now().to_rfc3339(),
        "service":     env!("CARGO_PKG_NAME"),
        "version":     env!("CARGO_PKG_VERSION"),
        "environment": state.config.app_env,
    }))
}
