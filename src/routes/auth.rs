use axum::{
    extract::{Extension, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::json;
use validator::Validate;

use crate::{
    auth::{hash_password, reject_unknown_user, token::Identity, verify_password},
    errors::{AppError, AppResult},
    extract::JsonBody,
    helpers::{format_phone, validate_cpf_field},
    middleware::auth_guard::{authenticate, bearer_token, AuthUser},
    models::Role,
    services::{
        accounts::{self, NewAccount},
        doctors::{self, CreateDoctor},
        patients::{self, CreatePatient},
    },
    state::AppState,
};

// ── Request / response types ──────────────────────────────────

#[derive(Deserialize, Validate)]
struct RegisterRequest {
    #[validate(email(message = "must be a valid email"))]
    email:     String,
    #[validate(length(min = 6, message = "must be at least 6 characters"))]
    password:  String,
    role:      String,
    #[validate(length(min = 1, max = 255, message = "is required"))]
    full_name: String,
    phone:     Option<String>,
    #[validate(custom(function = "validate_cpf_field"))]
    cpf:       Option<String>,
    crm:       Option<String>,
    specialty: Option<String>,
}

#[derive(Deserialize, Validate)]
struct LoginRequest {
    #[validate(email(message = "must be a valid email"))]
    email:    String,
    #[validate(length(min = 1, message = "is required"))]
    password: String,
}

#[derive(Deserialize, Validate)]
struct UpdateProfileRequest {
    #[validate(length(min = 1, max = 255, message = "must not be empty"))]
    full_name:     Option<String>,
    phone:         Option<String>,
    date_of_birth: Option<NaiveDate>,
    address:       Option<String>,
}

#[derive(Serialize)]
struct UserSummary {
    id:        String,
    email:     String,
    role:      Role,
    full_name: String,
}

#[derive(sqlx::FromRow)]
struct CredentialRow {
    id:            String,
    email:         String,
    password_hash: String,
    role:          String,
    full_name:     String,
}

#[derive(sqlx::FromRow, Serialize)]
struct ProfileRow {
    id:            String,
    email:         String,
    role:          String,
    created_at:    NaiveDateTime,
    full_name:     String,
    phone:         Option<String>,
    date_of_birth: Option<NaiveDate>,
    address:       Option<String>,
}

const PROFILE_SELECT: &str =
    "SELECT u.id, u.email, u.role, u.created_at, p.full_name, p.phone, p.date_of_birth, p.address
     FROM users u
     JOIN profiles p ON u.id = p.user_id
     WHERE u.id = ?";

// ── Router ────────────────────────────────────────────────────

/// Routes reachable without a token.
pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login",    post(login))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/auth/profile", get(profile).put(update_profile))
}

// ── Handlers ──────────────────────────────────────────────────

/// Admin and staff accounts may only be opened by a signed-in admin.
/// Without a token that is a 403, decided before any query.
async fn require_admin_caller(state: &AppState, headers: &HeaderMap) -> AppResult<()> {
    if bearer_token(headers).is_none() {
        return Err(AppError::Forbidden);
    }
    let caller = authenticate(&state.pool, &state.tokens, headers).await?;
    if caller.role != Role::Admin {
        tracing::debug!(user_id = %caller.user_id, role = %caller.role, "Privileged registration refused");
        return Err(AppError::Forbidden);
    }
    Ok(())
}

/// POST /auth/register — create an account and sign it in.
///
/// Patients need a CPF and doctors need CRM + specialty; those go through
/// the same services as the admin-side create endpoints.
async fn register(
    State(state): State<AppState>,
    headers: HeaderMap,
    JsonBody(body): JsonBody<RegisterRequest>,
) -> AppResult<impl IntoResponse> {
    body.validate()?;
    let role: Role = body
        .role
        .parse()
        .map_err(|_| AppError::validation("Invalid role"))?;
    if matches!(role, Role::Admin | Role::Staff) {
        require_admin_caller(&state, &headers).await?;
    }

    let email = body.email.trim().to_lowercase();
    if accounts::email_exists(&state.pool, &email).await? {
        return Err(AppError::Conflict("Email is already registered".into()));
    }

    let full_name = body.full_name.trim().to_owned();
    let user_id = match role {
        Role::Patient => {
            let cpf = body.cpf.ok_or_else(|| AppError::validation("cpf is required for patients"))?;
            let row = patients::create_patient(&state.pool, CreatePatient {
                full_name: full_name.clone(),
                cpf,
                email:     Some(email.clone()),
                password:  Some(body.password),
                phone:     body.phone,
                ..Default::default()
            })
            .await?;
            row.user_id
        }
        Role::Doctor => {
            let (Some(crm), Some(specialty)) = (body.crm, body.specialty) else {
                return Err(AppError::validation("crm and specialty are required for doctors"));
            };
            let row = doctors::create_doctor(&state.pool, CreateDoctor {
                email:            email.clone(),
                password:         body.password,
                full_name:        full_name.clone(),
                crm,
                specialty,
                consultation_fee: None,
                phone:            body.phone,
            })
            .await?;
            row.user_id
        }
        Role::Admin | Role::Staff => {
            let account = NewAccount {
                email:         email.clone(),
                password_hash: hash_password(&body.password)?,
                role,
                full_name:     full_name.clone(),
                phone:         body.phone.as_deref().map(format_phone),
                date_of_birth: None,
                address:       None,
            };
            accounts::create_account(&state.pool, &account).await?
        }
    };

    let identity = Identity { id: user_id, email, role };
    let token = state.tokens.issue(&identity).map_err(AppError::internal)?;
    tracing::info!(user_id = %identity.id, role = %role, "User registered");

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "User created successfully",
            "user": UserSummary {
                id:    identity.id,
                email: identity.email,
                role,
                full_name,
            },
            "token": token,
        })),
    ))
}

/// POST /auth/login — any unknown email or wrong password is the same 401.
async fn login(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<LoginRequest>,
) -> AppResult<impl IntoResponse> {
    body.validate()?;
    let email = body.email.trim().to_lowercase();

    let row = sqlx::query_as::<_, CredentialRow>(
        "SELECT u.id, u.email, u.password_hash, u.role, p.full_name
         FROM users u
         JOIN profiles p ON u.id = p.user_id
         WHERE u.email = ?
         LIMIT 1",
    )
    .bind(&email)
    .fetch_optional(&state.pool)
    .await?;
    let Some(row) = row else {
        return Err(reject_unknown_user(&body.password));
    };

    verify_password(&body.password, &row.password_hash)?;

    let role: Role = row
        .role
        .parse()
        .map_err(|e| AppError::internal(format!("user {} has {e}", row.id)))?;
    let identity = Identity { id: row.id, email: row.email, role };
    let token = state.tokens.issue(&identity).map_err(AppError::internal)?;
    tracing::info!(user_id = %identity.id, "Login");

    Ok(Json(json!({
        "message": "Login successful",
        "user": UserSummary {
            id:        identity.id,
            email:     identity.email,
            role,
            full_name: row.full_name,
        },
        "token": token,
    })))
}

/// GET /auth/profile
async fn profile(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> AppResult<impl IntoResponse> {
    let row = fetch_profile(&state, &user.user_id).await?;
    Ok(Json(json!({ "user": row })))
}

/// PUT /auth/profile — fields left out keep their value.
async fn update_profile(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    JsonBody(body): JsonBody<UpdateProfileRequest>,
) -> AppResult<impl IntoResponse> {
    body.validate()?;

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
    .bind(&user.user_id)
    .execute(&state.pool)
    .await?;

    let row = fetch_profile(&state, &user.user_id).await?;
    Ok(Json(json!({ "message": "Profile updated successfully", "user": row })))
}

async fn fetch_profile(state: &AppState, user_id: &str) -> AppResult<ProfileRow> {
    sqlx::query_as::<_, ProfileRow>(PROFILE_SELECT)
        .bind(user_id)
        .fetch_optional(&state.pool)
        .await?
        .ok_or(AppError::NotFound("User"))
}
