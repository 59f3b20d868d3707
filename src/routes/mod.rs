use axum::{
    extract::OriginalUri,
    http::{Method, StatusCode},
    middleware,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde_json::json;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    middleware::{auth_guard::require_auth, error_detail::expose_internal_detail},
    state::AppState,
};

mod appointments;
mod auth;
mod doctors;
mod files;
mod health;
mod patients;

/// The complete HTTP application: `/health`, the `/api` tree, a JSON 404
/// fallback and the cross-cutting layers.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .nest("/api", all_routes(state.clone()))
        .fallback(not_found)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .layer(middleware::from_fn_with_state(state.clone(), expose_internal_detail)),
        )
        .with_state(state)
}

/// Build the full `/api` router.
///
/// Register and login are public; every other route is wrapped in the
/// bearer-token [`require_auth`] middleware, and each route adds its own
/// role allow-list on top.
pub fn all_routes(state: AppState) -> Router<AppState> {
    let max_upload = state.config.max_upload_bytes;
    let auth_mw = middleware::from_fn_with_state(state, require_auth);
    Router::new()
        .merge(auth::public_router())
        .merge(
            Router::new()
                .merge(auth::router())
                .merge(patients::router())
                .merge(doctors::router())
                .merge(appointments::router())
                .merge(files::router(max_upload))
                .route_layer(auth_mw),
        )
}

async fn not_found(method: Method, OriginalUri(uri): OriginalUri) -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error":  "Route not found",
            "path":   uri.path(),
            "method": method.as_str(),
        })),
    )
}

/// `%term%` for `LIKE`, with the wildcard characters of `term` escaped.
pub(crate) fn contains_pattern(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for c in term.trim().chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}
