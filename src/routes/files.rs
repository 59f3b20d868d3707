//! `/files` routes — medical file attachments with multipart upload and
//! streamed download.

use axum::{
    body::Body,
    extract::{
        multipart::{MultipartError, MultipartRejection}, DefaultBodyLimit, Extension, Multipart, Path,
        State,
    },
    http::{
        header::{CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE},
        HeaderValue, StatusCode,
    },
    middleware,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::json;
use tokio_util::io::ReaderStream;

use crate::{
    extract::QueryParams,
    errors::{AppError, AppResult},
    middleware::{
        auth_guard::AuthUser,
        role_guard::{require_role, Allowed},
    },
    models::{MedicalFileRow, Page, PageQuery, Role},
    services::files::{self, Upload},
    state::AppState,
};

/// Multipart framing and the small text fields on top of the file itself.
const FORM_OVERHEAD: usize = 64 * 1024;

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

pub fn router(max_upload_bytes: usize) -> Router<AppState> {
    let readers  = middleware::from_fn_with_state(Allowed(&[Role::Admin, Role::Doctor, Role::Staff]), require_role);
    let clinical = middleware::from_fn_with_state(Allowed(&[Role::Admin, Role::Doctor]), require_role);

    Router::new()
        .route("/files/upload", post(upload_file).route_layer(readers.clone()))
        .route("/files/patient/{patient_id}", get(list_patient_files).route_layer(readers.clone()))
        .route("/files/download/{file_id}", get(download_file).route_layer(readers))
        .route("/files/{file_id}", delete(delete_file).route_layer(clinical))
        .layer(DefaultBodyLimit::max(max_upload_bytes.saturating_add(FORM_OVERHEAD)))
}

// ── Row types ────────────────────────────────────────────────

#[derive(sqlx::FromRow, Serialize)]
struct FileListRow {
    #[sqlx(flatten)]
    #[serde(flatten)]
    file:              MedicalFileRow,
    uploaded_by_email: Option<String>,
    uploaded_by_name:  Option<String>,
}

// ── Helpers ──────────────────────────────────────────────────

fn multipart_error(err: MultipartError) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::validation("File too large")
    } else {
        AppError::validation(format!("Invalid multipart body: {}", err.body_text()))
    }
}

/// `attachment` disposition with an ASCII fallback name plus the exact
/// UTF-8 name in `filename*`.
fn content_disposition(original_name: &str) -> HeaderValue {
    let fallback: String = original_name
        .chars()
        .map(|c| if c == ' ' || (c.is_ascii_graphic() && c != '"' && c != '\\') { c } else { '_' })
        .collect();
    let value = format!(
        "attachment; filename=\"{fallback}\"; filename*=UTF-8''{}",
        urlencoding::encode(original_name)
    );
    HeaderValue::from_str(&value).unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}

// ── Handlers ─────────────────────────────────────────────────

/// Upload a medical file via `multipart/form-data`.
///
/// Fields:
/// * `file`        — the document (required)
/// * `patient_id`  — owning patient (required)
/// * `description` — optional free text
async fn upload_file(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    multipart: Result<Multipart, MultipartRejection>,
) -> AppResult<impl IntoResponse> {
    let mut multipart = multipart?;
    let mut file_data: Option<(String, String, Vec<u8>)> = None; // (original name, content type, bytes)
    let mut patient_id: Option<String> = None;
    let mut description: Option<String> = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        match field.name() {
            Some("file") => {
                let orig_name = field.file_name()
                    .map(|s| s.to_owned())
                    .unwrap_or_else(|| "upload".into());
                let content_type = field.content_type()
                    .map(|s| s.to_owned())
                    .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.into());
                let bytes = field.bytes().await.map_err(multipart_error)?;
                file_data = Some((orig_name, content_type, bytes.to_vec()));
            }
            Some("patient_id") => {
                patient_id = Some(field.text().await.map_err(multipart_error)?.trim().to_owned());
            }
            Some("description") => {
                let text = field.text().await.map_err(multipart_error)?;
                description = Some(text).filter(|t| !t.trim().is_empty());
            }
            _ => {}
        }
    }

    let (original_name, content_type, bytes) =
        file_data.ok_or_else(|| AppError::validation("No file uploaded"))?;
    if bytes.len() > state.config.max_upload_bytes {
        return Err(AppError::validation("File too large"));
    }
    let patient_id = patient_id
        .filter(|p| !p.is_empty())
        .ok_or_else(|| AppError::validation("patient_id is required"))?;

    let file = files::upload(&state.pool, &state.storage, Upload {
        patient_id,
        original_name,
        content_type,
        bytes,
        description,
        uploaded_by: user.user_id,
    })
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "File uploaded successfully", "file": file })),
    ))
}

/// GET /files/patient/{patient_id}?page=&limit= — newest first.
async fn list_patient_files(
    State(state): State<AppState>,
    Path(patient_id): Path<String>,
    QueryParams(q): QueryParams<PageQuery>,
) -> AppResult<impl IntoResponse> {
    let page = Page::from(q);

    let rows = sqlx::query_as::<_, FileListRow>(
        "SELECT mf.id, mf.patient_id, mf.filename, mf.original_name, mf.file_path, mf.file_type,
                mf.file_size, mf.description, mf.uploaded_by, mf.created_at,
                u.email AS uploaded_by_email, prof.full_name AS uploaded_by_name
         FROM medical_files mf
         LEFT JOIN users u ON mf.uploaded_by = u.id
         LEFT JOIN profiles prof ON u.id = prof.user_id
         WHERE mf.patient_id = ?
         ORDER BY mf.created_at DESC
         LIMIT ? OFFSET ?",
    )
    .bind(&patient_id)
    .bind(page.limit)
    .bind(page.offset())
    .fetch_all(&state.pool)
    .await?;

    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM medical_files WHERE patient_id = ?")
        .bind(&patient_id)
        .fetch_one(&state.pool)
        .await?;

    Ok(Json(json!({ "files": rows, "pagination": page.meta(total) })))
}

/// GET /files/download/{file_id} — streams the stored bytes.
async fn download_file(
    State(state): State<AppState>,
    Path(file_id): Path<String>,
) -> AppResult<Response> {
    let (row, file) = files::open_download(&state.pool, &state.storage, &file_id).await?;
    attachment(&row, file).await
}

/// Stream `file` as a download named after `row`. The length comes from the
/// file on disk, not from the stored `file_size`.
async fn attachment(row: &MedicalFileRow, file: tokio::fs::File) -> AppResult<Response> {
    let len = file.metadata().await.map_err(AppError::internal)?.len();
    let content_type = HeaderValue::from_str(&row.file_type)
        .unwrap_or_else(|_| HeaderValue::from_static(DEFAULT_CONTENT_TYPE));

    let mut res = Body::from_stream(ReaderStream::new(file)).into_response();
    let headers = res.headers_mut();
    headers.insert(CONTENT_TYPE, content_type);
    headers.insert(CONTENT_DISPOSITION, content_disposition(&row.original_name));
    headers.insert(CONTENT_LENGTH, HeaderValue::from(len));
    Ok(res)
}

/// DELETE /files/{file_id}
async fn delete_file(
    State(state): State<AppState>,
    Path(file_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    files::delete(&state.pool, &state.storage, &file_id).await?;
    Ok(Json(json!({ "message": "File deleted successfully" })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disposition_keeps_ascii_names_readable() {
        let value = content_disposition("exame 2024.pdf");
        assert_eq!(
            value.to_str().unwrap(),
            "attachment; filename=\"exame 2024.pdf\"; filename*=UTF-8''exame%202024.pdf"
        );
    }

    #[tokio::test]
    async fn download_length_follows_the_file_on_disk() {
        let dir = std::env::temp_dir().join(format!("hospital-download-{}", uuid::Uuid::new_v4()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let path = dir.join("exam.txt");
        tokio::fs::write(&path, b"hemograma").await.unwrap();

        let row = MedicalFileRow {
            id:            "f1".into(),
            patient_id:    "p1".into(),
            filename:      "exam.txt".into(),
            original_name: "exame.txt".into(),
            file_path:     path.to_string_lossy().into_owned(),
            file_type:     "text/plain".into(),
            file_size:     4096,
            description:   None,
            uploaded_by:   None,
            created_at:    chrono::Utc::now().naive_utc(),
        };
        let file = tokio::fs::File::open(&path).await.unwrap();
        let res = attachment(&row, file).await.unwrap();

        assert_eq!(res.headers()[CONTENT_LENGTH], "9");
        assert_eq!(res.headers()[CONTENT_TYPE], "text/plain");
        let body = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"hemograma");

        let _ = tokio::fs::remove_dir_all(&dir).await;
    }

    #[test]
    fn disposition_escapes_quotes_and_non_ascii() {
        let value = content_disposition("raio-x \"tórax\".png");
        let text = value.to_str().unwrap();
        assert!(text.starts_with("attachment; filename=\"raio-x _t_rax_.png\""));
        assert!(text.ends_with("filename*=UTF-8''raio-x%20%22t%C3%B3rax%22.png"));
    }
}
