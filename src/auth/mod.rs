pub mod seed;
pub mod token;

use std::sync::OnceLock;

use argon2::{
    password_hash::{rand_core::OsRng, SaltString},
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
};
use uuid::Uuid;

use crate::errors::{AppError, AppResult};

pub const MIN_PASSWORD_LEN: usize = 6;

// ── Password helpers ──────────────────────────────────────────

pub fn hash_password(password: &str) -> AppResult<String> {
    let salt    = SaltString::generate(&mut OsRng);
    let argon2  = Argon2::default();
    let hash    = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Hashing failed: {e}")))?;
    Ok(hash.to_string())
}

/// Constant-time comparison of `password` against a stored PHC hash.
/// Any mismatch, including an unparsable hash, is reported as `Unauthenticated`.
pub fn verify_password(password: &str, hash: &str) -> AppResult<()> {
    let parsed = PasswordHash::new(hash).map_err(|_| AppError::Unauthenticated)?;
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .map_err(|_| AppError::Unauthenticated)
}

/// Hash of a random secret nobody knows. Used for accounts created without a
/// password, so they exist but cannot log in.
pub fn unusable_password_hash() -> AppResult<String> {
    hash_password(&format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple()))
}

/// Argon2 hash that no password matches, computed once.
fn dummy_hash() -> &'static str {
    static DUMMY: OnceLock<String> = OnceLock::new();
    DUMMY.get_or_init(|| unusable_password_hash().unwrap_or_default())
}

/// Failed login for an email with no account. Runs the same argon2
/// verification a known email would, then reports `Unauthenticated`.
pub fn reject_unknown_user(password: &str) -> AppError {
    let _ = verify_password(password, dummy_hash());
    AppError::Unauthenticated
}
