//! User + profile rows, created together for every kind of account.

use chrono::NaiveDate;
use sqlx::MySqlConnection;
use uuid::Uuid;

use crate::{
    db::Db,
    errors::{is_unique_violation, AppError, AppResult},
    models::Role,
};

#[derive(Debug, Clone)]
pub struct NewAccount {
    pub email:         String,
    pub password_hash: String,
    pub role:          Role,
    pub full_name:     String,
    pub phone:         Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub address:       Option<String>,
}

/// Insert the `users` and `profiles` rows on `conn` (normally an open
/// transaction) and return the new user id.
pub async fn insert_account(conn: &mut MySqlConnection, account: &NewAccount) -> AppResult<String> {
    let user_id = Uuid::new_v4().to_string();

    sqlx::query("INSERT INTO users (id, email, password_hash, role) VALUES (?, ?, ?, ?)")
        .bind(&user_id)
        .bind(&account.email)
        .bind(&account.password_hash)
        .bind(account.role.as_str())
        .execute(&mut *conn)
        .await
        .map_err(|e| conflict_or_internal(e, "Email is already registered"))?;

    sqlx::query(
        "INSERT INTO profiles (id, user_id, full_name, phone, date_of_birth, address)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(&user_id)
    .bind(&account.full_name)
    .bind(&account.phone)
    .bind(account.date_of_birth)
    .bind(&account.address)
    .execute(&mut *conn)
    .await?;

    Ok(user_id)
}

/// Create an account that has no role-specific record (admin, staff).
pub async fn create_account(pool: &Db, account: &NewAccount) -> AppResult<String> {
    let mut tx = pool.begin().await?;
    let user_id = insert_account(&mut tx, account).await?;
    tx.commit().await?;
    Ok(user_id)
}

pub async fn email_exists(pool: &Db, email: &str) -> AppResult<bool> {
    let taken: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE email = ?)")
        .bind(email)
        .fetch_one(pool)
        .await?;
    Ok(taken)
}

/// Map a duplicate-key failure to `Conflict(message)`, anything else to `Internal`.
pub fn conflict_or_internal(err: sqlx::Error, message: &str) -> AppError {
    if is_unique_violation(&err) {
        AppError::Conflict(message.to_owned())
    } else {
        err.into()
    }
}
