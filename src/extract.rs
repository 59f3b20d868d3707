//! Extractors whose rejections are `AppError::Validation`, so malformed
//! bodies and query strings get the same JSON 400 as every other input error.

use axum::extract::{FromRequest, FromRequestParts};

use crate::errors::AppError;

/// `axum::Json` with a JSON 400 on a missing/invalid body or content type.
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct JsonBody<T>(pub T);

/// `axum::extract::Query` with a JSON 400 on an unparsable query string.
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(AppError))]
pub struct QueryParams<T>(pub T);
