//! Development-only: expose the text of internal errors in the response body.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::{errors::InternalDetail, state::AppState};

pub async fn expose_internal_detail(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    let res = next.run(req).await;
    if !state.config.is_development() {
        return res;
    }
    match res.extensions().get::<InternalDetail>().cloned() {
        Some(InternalDetail(detail)) => (
            res.status(),
            Json(json!({ "error": "Internal server error", "detail": detail })),
        )
            .into_response(),
        None => res,
    }
}
