//! `/appointments` routes. Booking and status changes go through
//! `services::scheduler`; everything else is read-only.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, patch, post},
    Json, Router,
};
use chrono::{DateTime, Days, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::json;
use sqlx::{MySql, QueryBuilder};
use validator::Validate;

use crate::{
    extract::{JsonBody, QueryParams},
    errors::{AppError, AppResult},
    middleware::role_guard::{require_role, Allowed},
    models::{AppointmentRow, AppointmentStatus, Page, PageQuery, Role},
    services::scheduler::{self, BookingRequest, StatusChange},
    state::AppState,
};

pub fn router() -> Router<AppState> {
    let readers = middleware::from_fn_with_state(Allowed(&[Role::Admin, Role::Doctor, Role::Staff]), require_role);
    let booking = middleware::from_fn_with_state(Allowed(&[Role::Admin, Role::Staff]), require_role);
    let clinical = middleware::from_fn_with_state(Allowed(&[Role::Admin, Role::Doctor]), require_role);

    Router::new()
        .route(
            "/appointments",
            get(list_appointments)
                .route_layer(readers.clone())
                .merge(post(create_appointment).route_layer(booking.clone())),
        )
        .route("/appointments/stats", get(appointment_stats).route_layer(booking))
        .route("/appointments/{id}", get(get_appointment).route_layer(readers))
        .route("/appointments/{id}/status", patch(update_status).route_layer(clinical))
}

// ── Row / payload types ──────────────────────────────────────

const DETAIL_SELECT: &str =
    "SELECT a.id, a.patient_id, a.doctor_id, a.appointment_date, a.status,
            a.diagnosis, a.prescription, a.notes, a.created_at,
            pp.full_name AS patient_name, p.cpf AS patient_cpf,
            dp.full_name AS doctor_name, d.crm AS doctor_crm, d.specialty AS doctor_specialty
     FROM appointments a
     JOIN patients p  ON a.patient_id = p.id
     JOIN profiles pp ON p.user_id = pp.user_id
     JOIN doctors d   ON a.doctor_id = d.id
     JOIN profiles dp ON d.user_id = dp.user_id";

const COUNT_SELECT: &str = "SELECT COUNT(*) FROM appointments a";

/// Appointment joined with the names shown in listings.
#[derive(sqlx::FromRow, Serialize)]
struct AppointmentDetail {
    #[sqlx(flatten)]
    #[serde(flatten)]
    appointment:      AppointmentRow,
    patient_name:     String,
    patient_cpf:      String,
    doctor_name:      String,
    doctor_crm:       String,
    doctor_specialty: String,
}

#[derive(Deserialize)]
struct ListQuery {
    page:       Option<u32>,
    limit:      Option<u32>,
    patient_id: Option<String>,
    doctor_id:  Option<String>,
    status:     Option<String>,
    start_date: Option<NaiveDate>,
    end_date:   Option<NaiveDate>,
}

#[derive(Deserialize, Validate)]
struct CreateAppointmentBody {
    #[validate(length(min = 1, message = "is required"))]
    patient_id:       String,
    #[validate(length(min = 1, message = "is required"))]
    doctor_id:        String,
    #[serde(deserialize_with = "utc_or_naive")]
    appointment_date: DateTime<Utc>,
    #[validate(length(max = 2000, message = "is too long"))]
    notes:            Option<String>,
}

#[derive(Deserialize)]
struct StatusBody {
    status:       String,
    diagnosis:    Option<String>,
    prescription: Option<String>,
}

#[derive(sqlx::FromRow, Serialize)]
struct StatusTotals {
    total_appointments: i64,
    scheduled:          i64,
    completed:          i64,
    cancelled:          i64,
    no_show:            i64,
}

#[derive(sqlx::FromRow, Serialize)]
struct MonthlyCount {
    month: String,
    count: i64,
}

// ── Helpers ───────────────────────────────────────────────────

/// RFC 3339, or a date-time without offset which is read as UTC.
fn parse_appointment_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

fn utc_or_naive<'de, D: Deserializer<'de>>(de: D) -> Result<DateTime<Utc>, D::Error> {
    let raw = String::deserialize(de)?;
    parse_appointment_date(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("appointment_date: invalid date-time `{raw}`")))
}

fn parse_status(raw: &str) -> AppResult<AppointmentStatus> {
    raw.trim()
        .parse()
        .map_err(|_| AppError::validation("Invalid status"))
}

/// Filters on the `a` alias only, so the count query needs no joins.
/// `end_date` is inclusive of the whole day.
fn push_filters(qb: &mut QueryBuilder<'_, MySql>, q: &ListQuery) -> AppResult<()> {
    qb.push(" WHERE 1 = 1");
    if let Some(patient_id) = q.patient_id.as_deref().filter(|s| !s.is_empty()) {
        qb.push(" AND a.patient_id = ").push_bind(patient_id.to_owned());
    }
    if let Some(doctor_id) = q.doctor_id.as_deref().filter(|s| !s.is_empty()) {
        qb.push(" AND a.doctor_id = ").push_bind(doctor_id.to_owned());
    }
    if let Some(status) = q.status.as_deref().filter(|s| !s.is_empty()) {
        qb.push(" AND a.status = ").push_bind(parse_status(status)?.as_str());
    }
    if let Some(start) = q.start_date {
        qb.push(" AND a.appointment_date >= ").push_bind(start.and_time(chrono::NaiveTime::MIN));
    }
    if let Some(end) = q.end_date {
        let next_day = end
            .checked_add_days(Days::new(1))
            .ok_or_else(|| AppError::validation("end_date is out of range"))?;
        qb.push(" AND a.appointment_date < ").push_bind(next_day.and_time(chrono::NaiveTime::MIN));
    }
    Ok(())
}

async fn find_detail(state: &AppState, id: &str) -> AppResult<AppointmentDetail> {
    sqlx::query_as::<_, AppointmentDetail>(&format!("{DETAIL_SELECT} WHERE a.id = ?"))
        .bind(id)
        .fetch_optional(&state.pool)
        .await?
        .ok_or(AppError::NotFound("Appointment"))
}

// ── Handlers ──────────────────────────────────────────────────

/// POST /appointments
async fn create_appointment(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<CreateAppointmentBody>,
) -> AppResult<impl IntoResponse> {
    body.validate()?;
    let appointment = scheduler::book(&state.pool, BookingRequest {
        patient_id:       body.patient_id,
        doctor_id:        body.doctor_id,
        appointment_date: body.appointment_date,
        notes:            body.notes,
    })
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Appointment scheduled successfully", "appointment": appointment })),
    ))
}

/// GET /appointments?page=&limit=&patient_id=&doctor_id=&status=&start_date=&end_date=
async fn list_appointments(
    State(state): State<AppState>,
    QueryParams(q): QueryParams<ListQuery>,
) -> AppResult<impl IntoResponse> {
    let page = Page::from(PageQuery { page: q.page, limit: q.limit });

    let mut count = QueryBuilder::<MySql>::new(COUNT_SELECT);
    push_filters(&mut count, &q)?;
    let total: i64 = count.build_query_scalar().fetch_one(&state.pool).await?;

    let mut list = QueryBuilder::<MySql>::new(DETAIL_SELECT);
    push_filters(&mut list, &q)?;
    list.push(" ORDER BY a.appointment_date DESC LIMIT ")
        .push_bind(page.limit)
        .push(" OFFSET ")
        .push_bind(page.offset());
    let rows: Vec<AppointmentDetail> = list.build_query_as().fetch_all(&state.pool).await?;

    Ok(Json(json!({ "appointments": rows, "pagination": page.meta(total) })))
}

/// GET /appointments/{id}
async fn get_appointment(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let appointment = find_detail(&state, &id).await?;
    Ok(Json(json!({ "appointment": appointment })))
}

/// PATCH /appointments/{id}/status
async fn update_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<StatusBody>,
) -> AppResult<impl IntoResponse> {
    let change = StatusChange {
        status:       parse_status(&body.status)?,
        diagnosis:    body.diagnosis,
        prescription: body.prescription,
    };
    let appointment = scheduler::update_status(&state.pool, &id, change).await?;
    Ok(Json(json!({
        "message": "Appointment status updated successfully",
        "appointment": appointment,
    })))
}

/// GET /appointments/stats — totals per status and a six-month trend.
async fn appointment_stats(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let totals = sqlx::query_as::<_, StatusTotals>(
        "SELECT COUNT(*) AS total_appointments,
                COUNT(CASE WHEN status = 'scheduled' THEN 1 END) AS scheduled,
                COUNT(CASE WHEN status = 'completed' THEN 1 END) AS completed,
                COUNT(CASE WHEN status = 'cancelled' THEN 1 END) AS cancelled,
                COUNT(CASE WHEN status = 'no_show' THEN 1 END) AS no_show
         FROM appointments",
    )
    .fetch_one(&state.pool)
    .await?;

    let monthly = sqlx::query_as::<_, MonthlyCount>(
        "SELECT DATE_FORMAT(appointment_date, '%Y-%m') AS month, COUNT(*) AS count
         FROM appointments
         WHERE appointment_date >= DATE_SUB(CURDATE(), INTERVAL 6 MONTH)
         GROUP BY month
         ORDER BY month",
    )
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(json!({ "statistics": totals, "monthly_trends": monthly })))
}
