//! Doctor creation. The account gets a real, hashed credential.

use std::future::Future;

use uuid::Uuid;

use crate::{
    auth::{hash_password, MIN_PASSWORD_LEN},
    db::Db,
    errors::{AppError, AppResult},
    helpers::format_phone,
    models::{DoctorRow, Role},
    services::accounts::{self, conflict_or_internal, NewAccount},
};

pub const DOCTOR_SELECT: &str =
    "SELECT d.id, d.user_id, d.crm, d.specialty, d.consultation_fee, d.active,
            u.email, prof.full_name, prof.phone, d.created_at
     FROM doctors d
     JOIN users u ON d.user_id = u.id
     JOIN profiles prof ON u.id = prof.user_id";

#[derive(Debug, Clone, Default)]
pub struct CreateDoctor {
    pub email:            String,
    pub password:         String,
    pub full_name:        String,
    pub crm:              String,
    pub specialty:        String,
    pub consultation_fee: Option<f64>,
    pub phone:            Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewDoctor {
    pub crm:              String,
    pub specialty:        String,
    pub consultation_fee: Option<f64>,
}

pub trait DoctorStore {
    fn crm_exists(&self, crm: &str) -> impl Future<Output = AppResult<bool>> + Send;
    fn email_exists(&self, email: &str) -> impl Future<Output = AppResult<bool>> + Send;
    fn insert_doctor(
        &self,
        account: &NewAccount,
        doctor: &NewDoctor,
    ) -> impl Future<Output = AppResult<DoctorRow>> + Send;
}

pub async fn create_doctor<S: DoctorStore>(store: &S, input: CreateDoctor) -> AppResult<DoctorRow> {
    let crm = input.crm.trim().to_uppercase();
    if crm.is_empty() {
        return Err(AppError::validation("crm is required"));
    }
    if input.specialty.trim().is_empty() {
        return Err(AppError::validation("specialty is required"));
    }
    if input.full_name.trim().is_empty() {
        return Err(AppError::validation("full_name is required"));
    }
    if input.password.len() < MIN_PASSWORD_LEN {
        return Err(AppError::validation(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    if matches!(input.consultation_fee, Some(fee) if !fee.is_finite() || fee < 0.0) {
        return Err(AppError::validation("consultation_fee must be a non-negative number"));
    }

    if store.crm_exists(&crm).await? {
        return Err(AppError::Conflict("CRM is already registered".into()));
    }
    let email = input.email.trim().to_lowercase();
    if store.email_exists(&email).await? {
        return Err(AppError::Conflict("Email is already registered".into()));
    }

    let account = NewAccount {
        email,
        password_hash: hash_password(&input.password)?,
        role:          Role::Doctor,
        full_name:     input.full_name.trim().to_owned(),
        phone:         input.phone.as_deref().map(format_phone),
        date_of_birth: None,
        address:       None,
    };
    let doctor = NewDoctor {
        crm,
        specialty:        input.specialty.trim().to_owned(),
        consultation_fee: input.consultation_fee,
    };

    let row = store.insert_doctor(&account, &doctor).await?;
    tracing::info!(doctor_id = %row.id, crm = %row.crm, "Doctor created");
    Ok(row)
}

impl DoctorStore for Db {
    async fn crm_exists(&self, crm: &str) -> AppResult<bool> {
        let taken: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM doctors WHERE crm = ?)")
            .bind(crm)
            .fetch_one(self)
            .await?;
        Ok(taken)
    }

    async fn email_exists(&self, email: &str) -> AppResult<bool> {
        accounts::email_exists(self, email).await
    }

    async fn insert_doctor(&self, account: &NewAccount, doctor: &NewDoctor) -> AppResult<DoctorRow> {
        let mut tx = self.begin().await?;
        let user_id = accounts::insert_account(&mut tx, account).await?;

        let doctor_id = Uuid::new_v4().to_string();
        sqlx::query(
            "INSERT INTO doctors (id, user_id, crm, specialty, consultation_fee, active)
             VALUES (?, ?, ?, ?, ?, 1)",
        )
        .bind(&doctor_id)
        .bind(&user_id)
        .bind(&doctor.crm)
        .bind(&doctor.specialty)
        .bind(doctor.consultation_fee)
        .execute(&mut *tx)
        .await
        .map_err(|e| conflict_or_internal(e, "CRM is already registered"))?;

        let row = sqlx::query_as::<_, DoctorRow>(&format!("{DOCTOR_SELECT} WHERE d.id = ?"))
            .bind(&doctor_id)
            .fetch_one(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(row)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::auth::verify_password;

    #[derive(Default)]
    struct MemoryDoctors {
        rows:   Mutex<Vec<DoctorRow>>,
        hashes: Mutex<Vec<String>>,
    }

    impl DoctorStore for MemoryDoctors {
        async fn crm_exists(&self, crm: &str) -> AppResult<bool> {
            Ok(self.rows.lock().unwrap().iter().any(|d| d.crm == crm))
        }

        async fn email_exists(&self, email: &str) -> AppResult<bool> {
            Ok(self.rows.lock().unwrap().iter().any(|d| d.email == email))
        }

        async fn insert_doctor(&self, account: &NewAccount, doctor: &NewDoctor) -> AppResult<DoctorRow> {
            let row = DoctorRow {
                id:               Uuid::new_v4().to_string(),
                user_id:          Uuid::new_v4().to_string(),
                crm:              doctor.crm.clone(),
                specialty:        doctor.specialty.clone(),
                consultation_fee: doctor.consultation_fee,
                active:           true,
                email:            account.email.clone(),
                full_name:        account.full_name.clone(),
                phone:            account.phone.clone(),
                created_at:       chrono::Utc::now().naive_utc(),
            };
            self.hashes.lock().unwrap().push(account.password_hash.clone());
            self.rows.lock().unwrap().push(row.clone());
            Ok(row)
        }
    }

    fn house() -> CreateDoctor {
        CreateDoctor {
            email:            "house@hospital.test".into(),
            password:         "vicodin1".into(),
            full_name:        "Gregory House".into(),
            crm:              "crm-sp 123456".into(),
            specialty:        "Diagnostics".into(),
            consultation_fee: Some(350.0),
            phone:            None,
        }
    }

    #[tokio::test]
    async fn stores_a_hash_of_the_given_password() {
        let store = MemoryDoctors::default();
        let row = create_doctor(&store, house()).await.unwrap();

        assert_eq!(row.crm, "CRM-SP 123456");
        let hash = store.hashes.lock().unwrap()[0].clone();
        assert!(verify_password("vicodin1", &hash).is_ok());
    }

    #[tokio::test]
    async fn duplicate_crm_is_a_conflict() {
        let store = MemoryDoctors::default();
        create_doctor(&store, house()).await.unwrap();

        let mut twin = house();
        twin.email = "wilson@hospital.test".into();
        assert!(matches!(create_doctor(&store, twin).await, Err(AppError::Conflict(_))));
        assert_eq!(store.rows.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn short_password_is_rejected() {
        let store = MemoryDoctors::default();
        let mut input = house();
        input.password = "123".into();
        assert!(matches!(create_doctor(&store, input).await, Err(AppError::Validation { .. })));
    }

    #[tokio::test]
    async fn negative_fee_is_rejected() {
        let store = MemoryDoctors::default();
        let mut input = house();
        input.consultation_fee = Some(-1.0);
        assert!(matches!(create_doctor(&store, input).await, Err(AppError::Validation { .. })));
    }
}
