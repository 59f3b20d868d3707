//! Application error type — every handler returns `AppResult<T>`.

use axum::{
    extract::{
        multipart::MultipartRejection,
        rejection::{JsonRejection, QueryRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{message}")]
    Validation {
        message: String,
        details: Vec<String>,
    },
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    Conflict(String),
    #[error("authentication required")]
    Unauthenticated,
    #[error("access denied")]
    Forbidden,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        AppError::Validation { message: message.into(), details: Vec::new() }
    }

    pub fn internal(message: impl std::fmt::Display) -> Self {
        AppError::Internal(anyhow::anyhow!("{message}"))
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation { .. } => StatusCode::BAD_REQUEST,
            AppError::NotFound(_)       => StatusCode::NOT_FOUND,
            AppError::Conflict(_)       => StatusCode::CONFLICT,
            AppError::Unauthenticated   => StatusCode::UNAUTHORIZED,
            AppError::Forbidden         => StatusCode::FORBIDDEN,
            AppError::Internal(_)       => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Internal(anyhow::Error::new(err))
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut details: Vec<String> = errors
            .field_errors()
            .into_iter()
            .flat_map(|(field, errs)| {
                errs.iter().map(move |e| match &e.message {
                    Some(msg) => format!("{field}: {msg}"),
                    None      => format!("{field}: invalid value ({})", e.code),
                })
            })
            .collect();
        details.sort();
        AppError::Validation { message: "Invalid input data".into(), details }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation { message: "Invalid request body".into(), details: vec![rejection.body_text()] }
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::Validation { message: "Invalid query parameters".into(), details: vec![rejection.body_text()] }
    }
}

impl From<MultipartRejection> for AppError {
    fn from(rejection: MultipartRejection) -> Self {
        AppError::Validation { message: "Invalid multipart body".into(), details: vec![rejection.body_text()] }
    }
}

/// Full error text of an internal failure, attached to the response so the
/// `expose_internal_detail` middleware can surface it in development.
#[derive(Debug, Clone)]
pub struct InternalDetail(pub String);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        match self {
            AppError::Internal(err) => {
                tracing::error!(error = ?err, "Internal server error");
                let mut res = (status, Json(json!({ "error": "Internal server error" }))).into_response();
                res.extensions_mut().insert(InternalDetail(format!("{err:#}")));
                res
            }
            AppError::Validation { message, details } if !details.is_empty() => {
                (status, Json(json!({ "error": message, "details": details }))).into_response()
            }
            other => (status, Json(json!({ "error": other.to_string() }))).into_response(),
        }
    }
}

/// Returns `true` when the error is a duplicate-key violation reported by the store.
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.is_unique_violation())
}

/// Returns `true` when a row is still referenced by (or references a missing) foreign key.
pub fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.is_foreign_key_violation())
}

#[cfg(test)]
mod tests {
    use super::*;
    use validator::Validate;

    #[test]
    fn status_codes_follow_error_kind() {
        assert_eq!(AppError::validation("x").status(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::NotFound("Patient").status(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::Conflict("dup".into()).status(), StatusCode::CONFLICT);
        assert_eq!(AppError::Unauthenticated.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(AppError::Forbidden.status(), StatusCode::FORBIDDEN);
        assert_eq!(AppError::internal("boom").status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn internal_error_hides_detail_but_attaches_extension() {
        let res = AppError::internal("disk on fire").into_response();
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let detail = res.extensions().get::<InternalDetail>().expect("detail extension");
        assert!(detail.0.contains("disk on fire"));
    }

    #[test]
    fn not_found_message_names_the_entity() {
        assert_eq!(AppError::NotFound("Doctor").to_string(), "Doctor not found");
    }

    #[derive(Validate)]
    struct Probe {
        #[validate(email(message = "must be a valid email"))]
        email: String,
    }

    #[test]
    fn validation_errors_become_field_details() {
        let err: AppError = Probe { email: "nope".into() }.validate().unwrap_err().into();
        match err {
            AppError::Validation { details, .. } => {
                assert_eq!(details, vec!["email: must be a valid email".to_string()]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
