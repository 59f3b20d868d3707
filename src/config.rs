use dotenvy::dotenv;
use std::{env, time::Duration};
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct Config {
    // Database
    pub db_host:          String,
    pub db_port:          u16,
    pub db_name:          String,
    pub db_user:          String,
    pub db_password:      String,
    pub db_max_connections:      u32,
    pub db_connect_retries:      u32,
    pub db_connect_backoff_secs: u64,

    // Backend
    pub backend_host:     String,
    pub backend_port:     u16,

    // Tokens
    pub jwt_secret:       String,
    pub jwt_expires_in:   Duration,

    // Medical file storage
    pub upload_dir:       String,
    pub max_upload_bytes: usize,

    // Seed admin (only seeded when both are set)
    pub admin_email:      Option<String>,
    pub admin_password:   Option<String>,

    // App
    pub app_env:          String,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv().ok();

        fn require(key: &str) -> Result<String, ConfigError> {
            env::var(key).map_err(|_| ConfigError::MissingVar(key.to_string()))
        }

        fn optional(key: &str) -> Option<String> {
            env::var(key).ok().filter(|v| !v.trim().is_empty())
        }

        fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
            match env::var(key) {
                Ok(raw) => raw
                    .parse::<T>()
                    .map_err(|_| ConfigError::InvalidValue(key.to_string(), raw)),
                Err(_) => Ok(default),
            }
        }

        let jwt_expires_in = match env::var("JWT_EXPIRES_IN") {
            Ok(raw) => parse_duration(&raw)
                .ok_or_else(|| ConfigError::InvalidValue("JWT_EXPIRES_IN".into(), raw))?,
            Err(_) => Duration::from_secs(24 * 60 * 60),
        };

        Ok(Self {
            db_host:      env::var("DB_HOST").unwrap_or_else(|_| "db".into()),
            db_port:      parse_or("DB_PORT", 3306)?,
            db_name:      require("DB_NAME")?,
            db_user:      require("DB_USER")?,
            db_password:  require("DB_PASSWORD")?,
            db_max_connections:      parse_or("DB_MAX_CONNECTIONS", 20)?,
            db_connect_retries:      parse_or("DB_CONNECT_RETRIES", 5)?,
            db_connect_backoff_secs: parse_or("DB_CONNECT_BACKOFF_SECS", 2)?,

            backend_host: env::var("BACKEND_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            backend_port: parse_or("BACKEND_PORT", 8080)?,

            jwt_secret:   require("JWT_SECRET")?,
            jwt_expires_in,

            upload_dir:       env::var("UPLOAD_DIR").unwrap_or_else(|_| "uploads/medical".into()),
            max_upload_bytes: parse_or("MAX_UPLOAD_BYTES", 10 * 1024 * 1024)?,

            admin_email:    optional("ADMIN_EMAIL"),
            admin_password: optional("ADMIN_PASSWORD"),

            app_env:      env::var("APP_ENV").unwrap_or_else(|_| "development".into()),
        })
    }

    pub fn is_development(&self) -> bool {
        self.app_env == "development"
    }
}

/// Parse `"90"`, `"45s"`, `"30m"`, `"24h"` or `"7d"` into a [`Duration`].
pub fn parse_duration(raw: &str) -> Option<Duration> {
    let raw = raw.trim();
    let split = raw.find(|c: char| !c.is_ascii_digit()).unwrap_or(raw.len());
    let (digits, unit) = raw.split_at(split);
    let value: u64 = digits.parse().ok()?;
    let secs = match unit {
        "" | "s" => value,
        "m"      => value.checked_mul(60)?,
        "h"      => value.checked_mul(60 * 60)?,
        "d"      => value.checked_mul(24 * 60 * 60)?,
        _        => return None,
    };
    (secs > 0).then(|| Duration::from_secs(secs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durations_accept_common_units() {
        assert_eq!(parse_duration("90"), Some(Duration::from_secs(90)));
        assert_eq!(parse_duration("45s"), Some(Duration::from_secs(45)));
        assert_eq!(parse_duration("30m"), Some(Duration::from_secs(1800)));
        assert_eq!(parse_duration("24h"), Some(Duration::from_secs(86_400)));
        assert_eq!(parse_duration(" 7d "), Some(Duration::from_secs(604_800)));
    }

    #[test]
    fn durations_reject_garbage() {
        assert_eq!(parse_duration(""), None);
        assert_eq!(parse_duration("h"), None);
        assert_eq!(parse_duration("10w"), None);
        assert_eq!(parse_duration("0"), None);
        assert_eq!(parse_duration("-5m"), None);
    }
}
