//! `/doctors` routes. Deleting a doctor only deactivates it; inactive doctors
//! disappear from listings and can no longer be booked.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::{MySql, QueryBuilder};
use validator::Validate;

use crate::{
    extract::{JsonBody, QueryParams},
    errors::{AppError, AppResult},
    helpers::format_phone,
    middleware::role_guard::{require_role, Allowed},
    models::{DoctorRow, Page, PageQuery, Role},
    routes::contains_pattern,
    services::doctors::{self, CreateDoctor, DOCTOR_SELECT},
    state::AppState,
};

pub fn router() -> Router<AppState> {
    let readers = middleware::from_fn_with_state(Allowed(&[Role::Admin, Role::Doctor, Role::Staff]), require_role);
    let stats   = middleware::from_fn_with_state(Allowed(&[Role::Admin, Role::Staff]), require_role);
    let admins  = middleware::from_fn_with_state(Allowed(&[Role::Admin]), require_role);

    Router::new()
        .route(
            "/doctors",
            get(list_doctors)
                .route_layer(readers.clone())
                .merge(post(create_doctor).route_layer(admins.clone())),
        )
        .route("/doctors/stats", get(doctor_stats).route_layer(stats))
        .route(
            "/doctors/{id}",
            get(get_doctor)
                .route_layer(readers)
                .merge(put(update_doctor).route_layer(admins.clone()))
                .merge(delete(deactivate_doctor).route_layer(admins)),
        )
}

// ── Payload types ─────────────────────────────────────────────

#[derive(Deserialize)]
struct ListQuery {
    page:      Option<u32>,
    limit:     Option<u32>,
    specialty: Option<String>,
    search:    Option<String>,
}

#[derive(Deserialize, Validate)]
struct CreateDoctorBody {
    #[validate(email(message = "must be a valid email"))]
    email:            String,
    #[validate(length(min = 6, message = "must be at least 6 characters"))]
    password:         String,
    #[validate(length(min = 1, max = 255, message = "is required"))]
    full_name:        String,
    #[validate(length(min = 1, max = 20, message = "is required"))]
    crm:              String,
    #[validate(length(min = 1, max = 100, message = "is required"))]
    specialty:        String,
    #[validate(range(min = 0.0, message = "must not be negative"))]
    consultation_fee: Option<f64>,
    phone:            Option<String>,
}

#[derive(Deserialize, Validate)]
struct UpdateDoctorBody {
    #[validate(length(min = 1, max = 255, message = "must not be empty"))]
    full_name:        Option<String>,
    phone:            Option<String>,
    #[validate(length(min = 1, max = 100, message = "must not be empty"))]
    specialty:        Option<String>,
    #[validate(range(min = 0.0, message = "must not be negative"))]
    consultation_fee: Option<f64>,
}

#[derive(sqlx::FromRow, Serialize)]
struct DoctorTotals {
    total_doctors:        i64,
    total_specialties:    i64,
    avg_consultation_fee: Option<f64>,
}

#[derive(sqlx::FromRow, Serialize)]
struct SpecialtyCount {
    specialty: String,
    count:     i64,
}

// ── Helpers ───────────────────────────────────────────────────

fn push_filters(qb: &mut QueryBuilder<'_, MySql>, q: &ListQuery) {
    qb.push(" WHERE d.active = 1");
    if let Some(specialty) = q.specialty.as_deref().filter(|s| !s.trim().is_empty()) {
        qb.push(" AND d.specialty LIKE ").push_bind(contains_pattern(specialty));
    }
    if let Some(term) = q.search.as_deref().filter(|s| !s.trim().is_empty()) {
        qb.push(" AND prof.full_name LIKE ").push_bind(contains_pattern(term));
    }
}

async fn find_active_doctor(state: &AppState, id: &str) -> AppResult<DoctorRow> {
    sqlx::query_as::<_, DoctorRow>(&format!("{DOCTOR_SELECT} WHERE d.id = ? AND d.active = 1"))
        .bind(id)
        .fetch_optional(&state.pool)
        .await?
        .ok_or(AppError::NotFound("Doctor"))
}

// ── Handlers ──────────────────────────────────────────────────

/// GET /doctors?page=&limit=&specialty=&search=
async fn list_doctors(
    State(state): State<AppState>,
    QueryParams(q): QueryParams<ListQuery>,
) -> AppResult<impl IntoResponse> {
    let page = Page::from(PageQuery { page: q.page, limit: q.limit });

    let mut count = QueryBuilder::<MySql>::new(
        "SELECT COUNT(*) FROM doctors d
         JOIN users u ON d.user_id = u.id
         JOIN profiles prof ON u.id = prof.user_id",
    );
    push_filters(&mut count, &q);
    let total: i64 = count.build_query_scalar().fetch_one(&state.pool).await?;

    let mut list = QueryBuilder::<MySql>::new(DOCTOR_SELECT);
    push_filters(&mut list, &q);
    list.push(" ORDER BY prof.full_name LIMIT ")
        .push_bind(page.limit)
        .push(" OFFSET ")
        .push_bind(page.offset());
    let rows: Vec<DoctorRow> = list.build_query_as().fetch_all(&state.pool).await?;

    Ok(Json(json!({ "doctors": rows, "pagination": page.meta(total) })))
}

/// GET /doctors/stats — active doctors only.
async fn doctor_stats(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let totals = sqlx::query_as::<_, DoctorTotals>(
        "SELECT COUNT(*) AS total_doctors,
                COUNT(DISTINCT specialty) AS total_specialties,
                AVG(consultation_fee) AS avg_consultation_fee
         FROM doctors
         WHERE active = 1",
    )
    .fetch_one(&state.pool)
    .await?;

    let specialties = sqlx::query_as::<_, SpecialtyCount>(
        "SELECT specialty, COUNT(*) AS count
         FROM doctors
         WHERE active = 1
         GROUP BY specialty
         ORDER BY count DESC",
    )
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(json!({ "statistics": totals, "specialties": specialties })))
}

/// GET /doctors/{id}
async fn get_doctor(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let doctor = find_active_doctor(&state, &id).await?;
    Ok(Json(json!({ "doctor": doctor })))
}

/// POST /doctors
async fn create_doctor(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<CreateDoctorBody>,
) -> AppResult<impl IntoResponse> {
    body.validate()?;
    let doctor = doctors::create_doctor(&state.pool, CreateDoctor {
        email:            body.email,
        password:         body.password,
        full_name:        body.full_name,
        crm:              body.crm,
        specialty:        body.specialty,
        consultation_fee: body.consultation_fee,
        phone:            body.phone,
    })
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Doctor created successfully", "doctor": doctor })),
    ))
}

/// PUT /doctors/{id}
async fn update_doctor(
    State(state): State<AppState>,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<UpdateDoctorBody>,
) -> AppResult<impl IntoResponse> {
    body.validate()?;
    let existing = find_active_doctor(&state, &id).await?;

    let mut tx = state.pool.begin().await?;
    sqlx::query(
        "UPDATE doctors SET
            specialty        = COALESCE(?, specialty),
            consultation_fee = COALESCE(?, consultation_fee)
         WHERE id = ?",
    )
    .bind(body.specialty.as_deref().map(str::trim))
    .bind(body.consultation_fee)
    .bind(&id)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        "UPDATE profiles SET
            full_name = COALESCE(?, full_name),
            phone     = COALESCE(?, phone)
         WHERE user_id = ?",
    )
    .bind(body.full_name.as_deref().map(str::trim))
    .bind(body.phone.as_deref().map(format_phone))
    .bind(&existing.user_id)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;

    let doctor = find_active_doctor(&state, &id).await?;
    tracing::info!(doctor_id = %id, "Doctor updated");
    Ok(Json(json!({ "message": "Doctor updated successfully", "doctor": doctor })))
}

/// DELETE /doctors/{id} — soft delete. Existing appointments are kept.
async fn deactivate_doctor(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let result = sqlx::query("UPDATE doctors SET active = 0 WHERE id = ? AND active = 1")
        .bind(&id)
        .execute(&state.pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Doctor"));
    }

    tracing::info!(doctor_id = %id, "Doctor deactivated");
    Ok(Json(json!({ "message": "Doctor deactivated successfully" })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listing_is_limited_to_active_doctors() {
        let mut qb = QueryBuilder::<MySql>::new("SELECT COUNT(*) FROM doctors d");
        push_filters(&mut qb, &ListQuery {
            page:      None,
            limit:     None,
            specialty: Some("cardio".into()),
            search:    Some("souza".into()),
        });
        assert_eq!(
            qb.sql(),
            "SELECT COUNT(*) FROM doctors d WHERE d.active = 1 AND d.specialty LIKE ? AND prof.full_name LIKE ?"
        );
    }

    #[test]
    fn negative_fee_is_rejected() {
        let body = UpdateDoctorBody {
            full_name:        None,
            phone:            None,
            specialty:        None,
            consultation_fee: Some(-10.0),
        };
        assert!(body.validate().is_err());
    }
}
