//! `/patients` routes — listing, stats and CRUD for patient records.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{delete, get, post, put},
    Json, Router,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::{MySql, QueryBuilder};
use validator::Validate;

use crate::{
    extract::{JsonBody, QueryParams},
    errors::{is_foreign_key_violation, AppError, AppResult},
    helpers::format_phone,
    middleware::role_guard::{require_role, Allowed},
    models::{validate_blood_type, Page, PageQuery, PatientRow, Role},
    routes::contains_pattern,
    services::patients::{self, CreatePatient, PATIENT_SELECT},
    state::AppState,
};

pub fn router() -> Router<AppState> {
    let readers = middleware::from_fn_with_state(Allowed(&[Role::Admin, Role::Doctor, Role::Staff]), require_role);
    let writers = middleware::from_fn_with_state(Allowed(&[Role::Admin, Role::Staff]), require_role);
    let admins  = middleware::from_fn_with_state(Allowed(&[Role::Admin]), require_role);

    Router::new()
        .route(
            "/patients",
            get(list_patients)
                .route_layer(readers.clone())
                .merge(post(create_patient).route_layer(writers.clone())),
        )
        .route("/patients/stats", get(patient_stats).route_layer(readers.clone()))
        .route(
            "/patients/{id}",
            get(get_patient)
                .route_layer(readers)
                .merge(put(update_patient).route_layer(writers))
                .merge(delete(delete_patient).route_layer(admins)),
        )
}

// ── Payload types ─────────────────────────────────────────────

#[derive(Deserialize)]
struct ListQuery {
    page:       Option<u32>,
    limit:      Option<u32>,
    search:     Option<String>,
    blood_type: Option<String>,
}

#[derive(Deserialize, Validate)]
struct CreatePatientBody {
    #[validate(length(min = 1, max = 255, message = "is required"))]
    full_name:         String,
    cpf:               String,
    #[validate(email(message = "must be a valid email"))]
    email:             Option<String>,
    #[validate(length(min = 6, message = "must be at least 6 characters"))]
    password:          Option<String>,
    phone:             Option<String>,
    date_of_birth:     Option<NaiveDate>,
    address:           Option<String>,
    emergency_contact: Option<String>,
    health_insurance:  Option<String>,
    #[validate(custom(function = "validate_blood_type"))]
    blood_type:        Option<String>,
    allergies:         Option<String>,
}

#[derive(Deserialize, Validate)]
struct UpdatePatientBody {
    #[validate(length(min = 1, max = 255, message = "must not be empty"))]
    full_name:         Option<String>,
    phone:             Option<String>,
    date_of_birth:     Option<NaiveDate>,
    address:           Option<String>,
    emergency_contact: Option<String>,
    health_insurance:  Option<String>,
    #[validate(custom(function = "validate_blood_type"))]
    blood_type:        Option<String>,
    allergies:         Option<String>,
}

#[derive(sqlx::FromRow, Serialize)]
struct PatientTotals {
    total_patients:            i64,
    blood_types_count:         i64,
    insurance_companies_count: i64,
}

#[derive(sqlx::FromRow, Serialize)]
struct BloodTypeCount {
    blood_type: String,
    count:      i64,
}

// ── Helpers ───────────────────────────────────────────────────

/// Appends the list filters. Used by both the page query and the count query.
fn push_filters(qb: &mut QueryBuilder<'_, MySql>, q: &ListQuery) {
    qb.push(" WHERE 1 = 1");
    if let Some(term) = q.search.as_deref().filter(|s| !s.trim().is_empty()) {
        let pattern = contains_pattern(term);
        qb.push(" AND (prof.full_name LIKE ")
            .push_bind(pattern.clone())
            .push(" OR p.cpf LIKE ")
            .push_bind(pattern)
            .push(")");
    }
    if let Some(blood_type) = q.blood_type.as_deref().filter(|s| !s.is_empty()) {
        qb.push(" AND p.blood_type = ").push_bind(blood_type.to_owned());
    }
}

async fn find_patient(state: &AppState, id: &str) -> AppResult<PatientRow> {
    sqlx::query_as::<_, PatientRow>(&format!("{PATIENT_SELECT} WHERE p.id = ?"))
        .bind(id)
        .fetch_optional(&state.pool)
        .await?
        .ok_or(AppError::NotFound("Patient"))
}

// ── Handlers ──────────────────────────────────────────────────

/// GET /patients?page=&limit=&search=&blood_type=
async fn list_patients(
    State(state): State<AppState>,
    QueryParams(q): QueryParams<ListQuery>,
) -> AppResult<impl IntoResponse> {
    let page = Page::from(PageQuery { page: q.page, limit: q.limit });

    let mut count = QueryBuilder::<MySql>::new(
        "SELECT COUNT(*) FROM patients p
         JOIN users u ON p.user_id = u.id
         JOIN profiles prof ON u.id = prof.user_id",
    );
    push_filters(&mut count, &q);
    let total: i64 = count.build_query_scalar().fetch_one(&state.pool).await?;

    let mut list = QueryBuilder::<MySql>::new(PATIENT_SELECT);
    push_filters(&mut list, &q);
    list.push(" ORDER BY p.created_at DESC LIMIT ")
        .push_bind(page.limit)
        .push(" OFFSET ")
        .push_bind(page.offset());
    let rows: Vec<PatientRow> = list.build_query_as().fetch_all(&state.pool).await?;

    Ok(Json(json!({ "patients": rows, "pagination": page.meta(total) })))
}

/// GET /patients/stats
async fn patient_stats(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let totals = sqlx::query_as::<_, PatientTotals>(
        "SELECT COUNT(*) AS total_patients,
                COUNT(DISTINCT blood_type) AS blood_types_count,
                COUNT(DISTINCT health_insurance) AS insurance_companies_count
         FROM patients",
    )
    .fetch_one(&state.pool)
    .await?;

    let blood_types = sqlx::query_as::<_, BloodTypeCount>(
        "SELECT blood_type, COUNT(*) AS count
         FROM patients
         WHERE blood_type IS NOT NULL
         GROUP BY blood_type
         ORDER BY count DESC",
    )
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(json!({ "statistics": totals, "blood_types": blood_types })))
}

/// GET /patients/{id}
async fn get_patient(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let patient = find_patient(&state, &id).await?;
    Ok(Json(json!({ "patient": patient })))
}

/// POST /patients
async fn create_patient(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<CreatePatientBody>,
) -> AppResult<impl IntoResponse> {
    body.validate()?;
    let patient = patients::create_patient(&state.pool, CreatePatient {
        full_name:         body.full_name,
        cpf:               body.cpf,
        email:             body.email,
        password:          body.password,
        phone:             body.phone,
        date_of_birth:     body.date_of_birth,
        address:           body.address,
        emergency_contact: body.emergency_contact,
        health_insurance:  body.health_insurance,
        blood_type:        body.blood_type,
        allergies:         body.allergies,
    })
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Patient created successfully", "patient": patient })),
    ))
}

/// PUT /patients/{id} — fields left out keep their value.
async fn update_patient(
    State(state): State<AppState>,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<UpdatePatientBody>,
) -> AppResult<impl IntoResponse> {
    body.validate()?;
    let existing = find_patient(&state, &id).await?;

    let mut tx = state.pool.begin().await?;
    sqlx::query(
        "UPDATE patients SET
            emergency_contact = COALESCE(?, emergency_contact),
            health_insurance  = COALESCE(?, health_insurance),
            blood_type        = COALESCE(?, blood_type),
            allergies         = COALESCE(?, allergies)
         WHERE id = ?",
    )
    .bind(&body.emergency_contact)
    .bind(&body.health_insurance)
    .bind(&body.blood_type)
    .bind(&body.allergies)
    .bind(&id)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        "UPDATE profiles SET
            full_name     = COALESCE(?, full_name),
            phone         = COALESCE(?, phone),
            date_of_birth = COALESCE(?, date_of_birth),
            address       = COALESCE(?, address)
         WHERE user_id = ?",
    )
    .bind(body.full_name.as_deref().map(str::trim))
    .bind(body.phone.as_deref().map(format_phone))
    .bind(body.date_of_birth)
    .bind(&body.address)
    .bind(&existing.user_id)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;

    let patient = find_patient(&state, &id).await?;
    tracing::info!(patient_id = %id, "Patient updated");
    Ok(Json(json!({ "message": "Patient updated successfully", "patient": patient })))
}

/// DELETE /patients/{id} — removes the account, the patient row and the
/// patient's medical files. Patients with appointments cannot be deleted.
async fn delete_patient(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let existing = find_patient(&state, &id).await?;

    let has_appointments: bool =
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM appointments WHERE patient_id = ?)")
            .bind(&id)
            .fetch_one(&state.pool)
            .await?;
    if has_appointments {
        return Err(AppError::Conflict("Patient has appointments and cannot be deleted".into()));
    }

    let paths: Vec<String> = sqlx::query_scalar("SELECT file_path FROM medical_files WHERE patient_id = ?")
        .bind(&id)
        .fetch_all(&state.pool)
        .await?;

    // Cascades to profiles, patients and medical_files.
    sqlx::query("DELETE FROM users WHERE id = ?")
        .bind(&existing.user_id)
        .execute(&state.pool)
        .await
        .map_err(|e| {
            if is_foreign_key_violation(&e) {
                AppError::Conflict("Patient has appointments and cannot be deleted".into())
            } else {
                AppError::from(e)
            }
        })?;

    for path in &paths {
        if let Err(err) = state.storage.remove(path).await {
            tracing::warn!(error = %err, path = %path, "Could not remove medical file from disk");
        }
    }

    tracing::info!(patient_id = %id, files = paths.len(), "Patient deleted");
    Ok(Json(json!({ "message": "Patient deleted successfully" })))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn search(term: &str) -> ListQuery {
        ListQuery { page: None, limit: None, search: Some(term.into()), blood_type: Some("O+".into()) }
    }

    #[test]
    fn filters_bind_search_on_name_and_cpf() {
        let mut qb = QueryBuilder::<MySql>::new("SELECT COUNT(*) FROM patients p");
        push_filters(&mut qb, &search("silva"));
        assert_eq!(
            qb.sql(),
            "SELECT COUNT(*) FROM patients p WHERE 1 = 1 AND (prof.full_name LIKE ? OR p.cpf LIKE ?) AND p.blood_type = ?"
        );
    }

    #[test]
    fn blank_filters_are_ignored() {
        let mut qb = QueryBuilder::<MySql>::new("SELECT 1");
        push_filters(&mut qb, &ListQuery { page: None, limit: None, search: Some("  ".into()), blood_type: None });
        assert_eq!(qb.sql(), "SELECT 1 WHERE 1 = 1");
    }

    #[test]
    fn blood_type_outside_the_list_is_rejected() {
        let body = CreatePatientBody {
            full_name:         "Ana".into(),
            cpf:               "529.982.247-25".into(),
            email:             None,
            password:          None,
            phone:             None,
            date_of_birth:     None,
            address:           None,
            emergency_contact: None,
            health_insurance:  None,
            blood_type:        Some("C+".into()),
            allergies:         None,
        };
        assert!(body.validate().is_err());
    }
}
