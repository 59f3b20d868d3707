//! Shared application state — injected into every handler via `axum::extract::State`.

use crate::{
    auth::token::TokenService,
    config::Config,
    db::Db,
    services::storage::FileStorage,
};

/// Application-wide state passed via axum `State<AppState>`.
///
/// Everything here is built once in `main`. The pool is `Arc`-backed and the
/// remaining fields are small, so cloning per request is cheap.
#[derive(Clone)]
pub struct AppState {
    pub pool:    Db,
    pub config:  Config,
    pub tokens:  TokenService,
    pub storage: FileStorage,
}
