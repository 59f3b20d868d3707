//! Patient creation: CPF validation, uniqueness checks, account + patient rows.

use std::future::Future;

use chrono::NaiveDate;
use uuid::Uuid;

use crate::{
    auth::{hash_password, unusable_password_hash},
    db::Db,
    errors::{AppError, AppResult},
    helpers::{digits, format_cpf, format_phone, validate_cpf},
    models::{PatientRow, Role},
    services::accounts::{self, conflict_or_internal, NewAccount},
};

pub const PATIENT_SELECT: &str =
    "SELECT p.id, p.user_id, p.cpf, p.emergency_contact, p.health_insurance, p.blood_type, p.allergies,
            u.email, prof.full_name, prof.phone, prof.date_of_birth, prof.address, p.created_at
     FROM patients p
     JOIN users u ON p.user_id = u.id
     JOIN profiles prof ON u.id = prof.user_id";

#[derive(Debug, Clone, Default)]
pub struct CreatePatient {
    pub full_name:         String,
    pub cpf:               String,
    pub email:             Option<String>,
    pub password:          Option<String>,
    pub phone:             Option<String>,
    pub date_of_birth:     Option<NaiveDate>,
    pub address:           Option<String>,
    pub emergency_contact: Option<String>,
    pub health_insurance:  Option<String>,
    pub blood_type:        Option<String>,
    pub allergies:         Option<String>,
}

/// Patient-specific columns, with the CPF already formatted.
#[derive(Debug, Clone)]
pub struct NewPatient {
    pub cpf:               String,
    pub emergency_contact: Option<String>,
    pub health_insurance:  Option<String>,
    pub blood_type:        Option<String>,
    pub allergies:         Option<String>,
}

pub trait PatientStore {
    fn cpf_exists(&self, cpf: &str) -> impl Future<Output = AppResult<bool>> + Send;
    fn email_exists(&self, email: &str) -> impl Future<Output = AppResult<bool>> + Send;
    fn insert_patient(
        &self,
        account: &NewAccount,
        patient: &NewPatient,
    ) -> impl Future<Output = AppResult<PatientRow>> + Send;
}

pub async fn create_patient<S: PatientStore>(store: &S, input: CreatePatient) -> AppResult<PatientRow> {
    if input.full_name.trim().is_empty() {
        return Err(AppError::validation("full_name is required"));
    }
    if !validate_cpf(&input.cpf) {
        return Err(AppError::validation("Invalid CPF"));
    }
    let cpf = format_cpf(&input.cpf);

    if store.cpf_exists(&cpf).await? {
        return Err(AppError::Conflict("CPF is already registered".into()));
    }

    let email = input
        .email
        .map(|e| e.trim().to_lowercase())
        .unwrap_or_else(|| format!("{}@patient.local", digits(&cpf)));
    if store.email_exists(&email).await? {
        return Err(AppError::Conflict("Email is already registered".into()));
    }

    let password_hash = match input.password.as_deref() {
        Some(pw) => hash_password(pw)?,
        None     => unusable_password_hash()?,
    };

    let account = NewAccount {
        email,
        password_hash,
        role:          Role::Patient,
        full_name:     input.full_name.trim().to_owned(),
        phone:         input.phone.as_deref().map(format_phone),
        date_of_birth: input.date_of_birth,
        address:       input.address,
    };
    let patient = NewPatient {
        cpf,
        emergency_contact: input.emergency_contact,
        health_insurance:  input.health_insurance,
        blood_type:        input.blood_type,
        allergies:         input.allergies,
    };

    let row = store.insert_patient(&account, &patient).await?;
    tracing::info!(patient_id = %row.id, cpf = %row.cpf, "Patient created");
    Ok(row)
}

impl PatientStore for Db {
    async fn cpf_exists(&self, cpf: &str) -> AppResult<bool> {
        let taken: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM patients WHERE cpf = ?)")
            .bind(cpf)
            .fetch_one(self)
            .await?;
        Ok(taken)
    }

    async fn email_exists(&self, email: &str) -> AppResult<bool> {
        accounts::email_exists(self, email).await
    }

    async fn insert_patient(&self, account: &NewAccount, patient: &NewPatient) -> AppResult<PatientRow> {
        let mut tx = self.begin().await?;
        let user_id = accounts::insert_account(&mut tx, account).await?;

        let patient_id = Uuid::new_v4().to_string();
        sqlx::query(
            "INSERT INTO patients (id, user_id, cpf, emergency_contact, health_insurance, blood_type, allergies)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&patient_id)
        .bind(&user_id)
        .bind(&patient.cpf)
        .bind(&patient.emergency_contact)
        .bind(&patient.health_insurance)
        .bind(&patient.blood_type)
        .bind(&patient.allergies)
        .execute(&mut *tx)
        .await
        .map_err(|e| conflict_or_internal(e, "CPF is already registered"))?;

        let row = sqlx::query_as::<_, PatientRow>(&format!("{PATIENT_SELECT} WHERE p.id = ?"))
            .bind(&patient_id)
            .fetch_one(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(row)
    }
}
