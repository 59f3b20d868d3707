pub mod pagination;

use std::{fmt, str::FromStr};

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

pub use pagination::{Page, PageQuery};

// ── Roles ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Doctor,
    Patient,
    Staff,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin   => "admin",
            Role::Doctor  => "doctor",
            Role::Patient => "patient",
            Role::Staff   => "staff",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin"   => Ok(Role::Admin),
            "doctor"  => Ok(Role::Doctor),
            "patient" => Ok(Role::Patient),
            "staff"   => Ok(Role::Staff),
            other     => Err(UnknownVariant(other.to_owned())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown value: {0}")]
pub struct UnknownVariant(pub String);

// ── Appointment status ───────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Scheduled,
    Completed,
    Cancelled,
    NoShow,
}

impl AppointmentStatus {
    pub const ALL: [AppointmentStatus; 4] = [
        AppointmentStatus::Scheduled,
        AppointmentStatus::Completed,
        AppointmentStatus::Cancelled,
        AppointmentStatus::NoShow,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AppointmentStatus::Scheduled => "scheduled",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Cancelled => "cancelled",
            AppointmentStatus::NoShow    => "no_show",
        }
    }

    /// Every status except `cancelled` occupies the doctor's slot.
    pub fn is_active(self) -> bool {
        self != AppointmentStatus::Cancelled
    }
}

impl FromStr for AppointmentStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownVariant(s.to_owned()))
    }
}

// ── Blood types ──────────────────────────────────────────────

pub const BLOOD_TYPES: &[&str] = &["A+", "A-", "B+", "B-", "AB+", "AB-", "O+", "O-"];

pub fn validate_blood_type(value: &str) -> Result<(), validator::ValidationError> {
    if BLOOD_TYPES.contains(&value) {
        Ok(())
    } else {
        Err(validator::ValidationError::new("blood_type")
            .with_message("must be one of A+, A-, B+, B-, AB+, AB-, O+, O-".into()))
    }
}

// ── Rows ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct PatientRow {
    pub id:                String,
    pub user_id:           String,
    pub cpf:               String,
    pub emergency_contact: Option<String>,
    pub health_insurance:  Option<String>,
    pub blood_type:        Option<String>,
    pub allergies:         Option<String>,
    pub email:             String,
    pub full_name:         String,
    pub phone:             Option<String>,
    pub date_of_birth:     Option<NaiveDate>,
    pub address:           Option<String>,
    pub created_at:        NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct DoctorRow {
    pub id:               String,
    pub user_id:          String,
    pub crm:              String,
    pub specialty:        String,
    pub consultation_fee: Option<f64>,
    pub active:           bool,
    pub email:            String,
    pub full_name:        String,
    pub phone:            Option<String>,
    pub created_at:       NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct AppointmentRow {
    pub id:               String,
    pub patient_id:       String,
    pub doctor_id:        String,
    pub appointment_date: NaiveDateTime,
    pub status:           String,
    pub diagnosis:        Option<String>,
    pub prescription:     Option<String>,
    pub notes:            Option<String>,
    pub created_at:       NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct MedicalFileRow {
    pub id:            String,
    pub patient_id:    String,
    pub filename:      String,
    pub original_name: String,
    pub file_path:     String,
    pub file_type:     String,
    pub file_size:     i64,
    pub description:   Option<String>,
    pub uploaded_by:   Option<String>,
    pub created_at:    NaiveDateTime,
}
