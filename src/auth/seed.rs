use crate::{
    auth::{hash_password, MIN_PASSWORD_LEN},
    config::Config,
    db::Db,
    models::Role,
    services::accounts::{self, NewAccount},
};

const ADMIN_FULL_NAME: &str = "Administrator";

/// Seeds the admin account from `ADMIN_EMAIL` / `ADMIN_PASSWORD`.
/// Safe to call on every startup — an existing account is left untouched.
pub async fn seed_admin(pool: &Db, config: &Config) -> anyhow::Result<()> {
    let (Some(email), Some(password)) = (&config.admin_email, &config.admin_password) else {
        tracing::debug!("ADMIN_EMAIL/ADMIN_PASSWORD not set, skipping admin seed");
        return Ok(());
    };
    let email = email.trim().to_lowercase();

    if accounts::email_exists(pool, &email).await? {
        tracing::debug!(%email, "Admin account already present");
        return Ok(());
    }
    if password.len() < MIN_PASSWORD_LEN {
        anyhow::bail!("ADMIN_PASSWORD must be at least {MIN_PASSWORD_LEN} characters");
    }

    let account = NewAccount {
        email:         email.clone(),
        password_hash: hash_password(password)?,
        role:          Role::Admin,
        full_name:     ADMIN_FULL_NAME.into(),
        phone:         None,
        date_of_birth: None,
        address:       None,
    };
    let user_id = accounts::create_account(pool, &account).await?;
    tracing::info!(%user_id, %email, "Seeded admin account");
    Ok(())
}
