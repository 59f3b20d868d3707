//! Appointment booking and status changes.
//!
//! Booking order is fixed: patient exists, doctor exists and is active, the
//! doctor's slot is free, then insert. The `appointments` table also carries a
//! unique index over `(doctor_id, appointment_date, active_slot)`, so two
//! requests racing past the slot check cannot both insert; the loser gets the
//! same `Conflict` as a request that failed the check.

use std::future::Future;

use chrono::{DateTime, NaiveDateTime, SubsecRound, Utc};
use uuid::Uuid;

use crate::{
    db::Db,
    errors::{AppError, AppResult},
    models::{AppointmentRow, AppointmentStatus},
    services::accounts::conflict_or_internal,
};

const SLOT_TAKEN: &str = "Doctor already has an appointment at this time";

pub const APPOINTMENT_SELECT: &str =
    "SELECT id, patient_id, doctor_id, appointment_date, status, diagnosis, prescription, notes, created_at
     FROM appointments";

#[derive(Debug, Clone)]
pub struct BookingRequest {
    pub patient_id:       String,
    pub doctor_id:        String,
    pub appointment_date: DateTime<Utc>,
    pub notes:            Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewAppointment {
    pub id:               String,
    pub patient_id:       String,
    pub doctor_id:        String,
    pub appointment_date: NaiveDateTime,
    pub notes:            Option<String>,
}

#[derive(Debug, Clone)]
pub struct StatusChange {
    pub status:       AppointmentStatus,
    pub diagnosis:    Option<String>,
    pub prescription: Option<String>,
}

pub trait ScheduleStore {
    fn patient_exists(&self, patient_id: &str) -> impl Future<Output = AppResult<bool>> + Send;
    fn active_doctor_exists(&self, doctor_id: &str) -> impl Future<Output = AppResult<bool>> + Send;
    /// Is there an appointment with status other than `cancelled` at exactly `at`?
    fn slot_taken(&self, doctor_id: &str, at: NaiveDateTime) -> impl Future<Output = AppResult<bool>> + Send;
    /// Insert with status `scheduled`. A slot collision is reported as `Conflict`.
    fn insert_appointment(&self, new: &NewAppointment) -> impl Future<Output = AppResult<AppointmentRow>> + Send;
    /// Returns `None` when no appointment has this id. A slot collision is reported as `Conflict`.
    fn change_status(
        &self,
        id: &str,
        change: &StatusChange,
    ) -> impl Future<Output = AppResult<Option<AppointmentRow>>> + Send;
}

/// Appointment times are compared at whole-second precision, which is what
/// the `DATETIME` column stores.
pub fn slot_time(at: DateTime<Utc>) -> NaiveDateTime {
    at.trunc_subsecs(0).naive_utc()
}

pub async fn book<S: ScheduleStore>(store: &S, req: BookingRequest) -> AppResult<AppointmentRow> {
    if !store.patient_exists(&req.patient_id).await? {
        return Err(AppError::NotFound("Patient"));
    }
    if !store.active_doctor_exists(&req.doctor_id).await? {
        return Err(AppError::NotFound("Doctor"));
    }

    let at = slot_time(req.appointment_date);
    if store.slot_taken(&req.doctor_id, at).await? {
        return Err(AppError::Conflict(SLOT_TAKEN.into()));
    }

    let new = NewAppointment {
        id:               Uuid::new_v4().to_string(),
        patient_id:       req.patient_id,
        doctor_id:        req.doctor_id,
        appointment_date: at,
        notes:            req.notes,
    };
    let row = store.insert_appointment(&new).await?;

    tracing::info!(
        appointment_id = %row.id,
        patient_id = %row.patient_id,
        doctor_id = %row.doctor_id,
        at = %row.appointment_date,
        "Appointment scheduled"
    );
    Ok(row)
}

/// Any status may follow any other; only the target value is checked (by the
/// type). Omitted diagnosis/prescription keep their stored values.
pub async fn update_status<S: ScheduleStore>(
    store: &S,
    id: &str,
    change: StatusChange,
) -> AppResult<AppointmentRow> {
    let row = store
        .change_status(id, &change)
        .await?
        .ok_or(AppError::NotFound("Appointment"))?;
    tracing::info!(appointment_id = %row.id, status = %row.status, "Appointment status updated");
    Ok(row)
}

impl ScheduleStore for Db {
    async fn patient_exists(&self, patient_id: &str) -> AppResult<bool> {
        let found: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM patients WHERE id = ?)")
            .bind(patient_id)
            .fetch_one(self)
            .await?;
        Ok(found)
    }

    async fn active_doctor_exists(&self, doctor_id: &str) -> AppResult<bool> {
        let found: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM doctors WHERE id = ? AND active = 1)")
                .bind(doctor_id)
                .fetch_one(self)
                .await?;
        Ok(found)
    }

    async fn slot_taken(&self, doctor_id: &str, at: NaiveDateTime) -> AppResult<bool> {
        let taken: bool = sqlx::query_scalar(
            "SELECT EXISTS(
                SELECT 1 FROM appointments
                WHERE doctor_id = ? AND appointment_date = ? AND status <> 'cancelled')",
        )
        .bind(doctor_id)
        .bind(at)
        .fetch_one(self)
        .await?;
        Ok(taken)
    }

    async fn insert_appointment(&self, new: &NewAppointment) -> AppResult<AppointmentRow> {
        sqlx::query(
            "INSERT INTO appointments (id, patient_id, doctor_id, appointment_date, status, notes)
             VALUES (?, ?, ?, ?, 'scheduled', ?)",
        )
        .bind(&new.id)
        .bind(&new.patient_id)
        .bind(&new.doctor_id)
        .bind(new.appointment_date)
        .bind(&new.notes)
        .execute(self)
        .await
        .map_err(|e| conflict_or_internal(e, SLOT_TAKEN))?;

        let row = sqlx::query_as::<_, AppointmentRow>(&format!("{APPOINTMENT_SELECT} WHERE id = ?"))
            .bind(&new.id)
            .fetch_one(self)
            .await?;
        Ok(row)
    }

    async fn change_status(&self, id: &str, change: &StatusChange) -> AppResult<Option<AppointmentRow>> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM appointments WHERE id = ?)")
            .bind(id)
            .fetch_one(self)
            .await?;
        if !exists {
            return Ok(None);
        }

        sqlx::query(
            "UPDATE appointments
             SET status = ?,
                 diagnosis = COALESCE(?, diagnosis),
                 prescription = COALESCE(?, prescription)
             WHERE id = ?",
        )
        .bind(change.status.as_str())
        .bind(&change.diagnosis)
        .bind(&change.prescription)
        .bind(id)
        .execute(self)
        .await
        .map_err(|e| conflict_or_internal(e, SLOT_TAKEN))?;

        let row = sqlx::query_as::<_, AppointmentRow>(&format!("{APPOINTMENT_SELECT} WHERE id = ?"))
            .bind(id)
            .fetch_optional(self)
            .await?;
        Ok(row)
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::{HashMap, HashSet},
        sync::Mutex,
    };

    use chrono::TimeZone;

    use super::*;

    /// In-memory store that enforces the active-slot uniqueness like the real index.
    #[derive(Default)]
    struct MemorySchedule {
        patients:    HashSet<String>,
        /// doctor id -> active flag
        doctors:     HashMap<String, bool>,
        rows:        Mutex<Vec<AppointmentRow>>,
        /// When set, `slot_taken` reports every slot free.
        blind_check: bool,
    }

    impl MemorySchedule {
        fn with(patients: &[&str], active: &[&str], inactive: &[&str]) -> Self {
            Self {
                patients: patients.iter().map(|s| s.to_string()).collect(),
                doctors:  active
                    .iter()
                    .map(|s| (s.to_string(), true))
                    .chain(inactive.iter().map(|s| (s.to_string(), false)))
                    .collect(),
                ..Default::default()
            }
        }

        fn collides(rows: &[AppointmentRow], doctor_id: &str, at: NaiveDateTime, skip: Option<&str>) -> bool {
            rows.iter().any(|a| {
                Some(a.id.as_str()) != skip
                    && a.doctor_id == doctor_id
                    && a.appointment_date == at
                    && a.status != "cancelled"
            })
        }
    }

    impl ScheduleStore for MemorySchedule {
        async fn patient_exists(&self, patient_id: &str) -> AppResult<bool> {
            Ok(self.patients.contains(patient_id))
        }

        async fn active_doctor_exists(&self, doctor_id: &str) -> AppResult<bool> {
            Ok(self.doctors.get(doctor_id).copied().unwrap_or(false))
        }

        async fn slot_taken(&self, doctor_id: &str, at: NaiveDateTime) -> AppResult<bool> {
            if self.blind_check {
                return Ok(false);
            }
            Ok(Self::collides(&self.rows.lock().unwrap(), doctor_id, at, None))
        }

        async fn insert_appointment(&self, new: &NewAppointment) -> AppResult<AppointmentRow> {
            let mut rows = self.rows.lock().unwrap();
            if Self::collides(&rows, &new.doctor_id, new.appointment_date, None) {
                return Err(AppError::Conflict(SLOT_TAKEN.into()));
            }
            let row = AppointmentRow {
                id:               new.id.clone(),
                patient_id:       new.patient_id.clone(),
                doctor_id:        new.doctor_id.clone(),
                appointment_date: new.appointment_date,
                status:           "scheduled".into(),
                diagnosis:        None,
                prescription:     None,
                notes:            new.notes.clone(),
                created_at:       Utc::now().naive_utc(),
            };
            rows.push(row.clone());
            Ok(row)
        }

        async fn change_status(&self, id: &str, change: &StatusChange) -> AppResult<Option<AppointmentRow>> {
            let mut rows = self.rows.lock().unwrap();
            let Some(idx) = rows.iter().position(|a| a.id == id) else {
                return Ok(None);
            };
            let (doctor_id, at) = (rows[idx].doctor_id.clone(), rows[idx].appointment_date);
            if change.status.is_active() && Self::collides(&rows, &doctor_id, at, Some(id)) {
                return Err(AppError::Conflict(SLOT_TAKEN.into()));
            }
            let row = &mut rows[idx];
            row.status = change.status.as_str().into();
            if let Some(d) = &change.diagnosis {
                row.diagnosis = Some(d.clone());
            }
            if let Some(p) = &change.prescription {
                row.prescription = Some(p.clone());
            }
            Ok(Some(row.clone()))
        }
    }

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, hour, 0, 0).unwrap()
    }

    fn request(doctor: &str, when: DateTime<Utc>) -> BookingRequest {
        BookingRequest {
            patient_id:       "p1".into(),
            doctor_id:        doctor.into(),
            appointment_date: when,
            notes:            None,
        }
    }

    fn store() -> MemorySchedule {
        MemorySchedule::with(&["p1"], &["d1"], &["d-retired"])
    }

    #[tokio::test]
    async fn books_a_free_slot_as_scheduled() {
        let store = store();
        let row = book(&store, request("d1", at(9))).await.unwrap();
        assert_eq!(row.status, "scheduled");
        assert_eq!(row.appointment_date, at(9).naive_utc());
    }

    #[tokio::test]
    async fn same_doctor_same_time_conflicts() {
        let store = store();
        book(&store, request("d1", at(9))).await.unwrap();

        let err = book(&store, request("d1", at(9))).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert_eq!(store.rows.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn same_doctor_other_time_succeeds() {
        let store = store();
        book(&store, request("d1", at(9))).await.unwrap();
        book(&store, request("d1", at(10))).await.unwrap();
        assert_eq!(store.rows.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn sub_second_difference_is_the_same_slot() {
        let store = store();
        book(&store, request("d1", at(9))).await.unwrap();
        let later = at(9) + chrono::Duration::milliseconds(400);
        assert!(matches!(book(&store, request("d1", later)).await, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn cancelled_appointment_frees_the_slot() {
        let store = store();
        let first = book(&store, request("d1", at(9))).await.unwrap();
        update_status(
            &store,
            &first.id,
            StatusChange { status: AppointmentStatus::Cancelled, diagnosis: None, prescription: None },
        )
        .await
        .unwrap();

        book(&store, request("d1", at(9))).await.unwrap();
    }

    #[tokio::test]
    async fn inactive_doctor_looks_like_a_missing_one() {
        let store = store();
        let inactive = book(&store, request("d-retired", at(9))).await.unwrap_err();
        let missing  = book(&store, request("d-unknown", at(9))).await.unwrap_err();

        assert!(matches!(inactive, AppError::NotFound("Doctor")));
        assert!(matches!(missing, AppError::NotFound("Doctor")));
        assert_eq!(inactive.to_string(), missing.to_string());
    }

    #[tokio::test]
    async fn missing_patient_is_checked_first() {
        let store = store();
        let mut req = request("d-unknown", at(9));
        req.patient_id = "nobody".into();
        assert!(matches!(book(&store, req).await, Err(AppError::NotFound("Patient"))));
    }

    #[tokio::test]
    async fn race_past_the_check_still_conflicts_on_insert() {
        let mut store = store();
        store.blind_check = true;
        book(&store, request("d1", at(9))).await.unwrap();

        assert!(matches!(book(&store, request("d1", at(9))).await, Err(AppError::Conflict(_))));
        assert_eq!(store.rows.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn status_change_keeps_omitted_notes_and_allows_any_transition() {
        let store = store();
        let row = book(&store, request("d1", at(9))).await.unwrap();

        let done = update_status(
            &store,
            &row.id,
            StatusChange {
                status:       AppointmentStatus::Completed,
                diagnosis:    Some("Flu".into()),
                prescription: None,
            },
        )
        .await
        .unwrap();
        assert_eq!(done.status, "completed");

        let back = update_status(
            &store,
            &row.id,
            StatusChange { status: AppointmentStatus::Scheduled, diagnosis: None, prescription: None },
        )
        .await
        .unwrap();
        assert_eq!(back.status, "scheduled");
        assert_eq!(back.diagnosis.as_deref(), Some("Flu"));
    }

    #[tokio::test]
    async fn reactivating_into_a_taken_slot_conflicts() {
        let store = store();
        let first = book(&store, request("d1", at(9))).await.unwrap();
        let cancel = StatusChange { status: AppointmentStatus::Cancelled, diagnosis: None, prescription: None };
        update_status(&store, &first.id, cancel).await.unwrap();
        book(&store, request("d1", at(9))).await.unwrap();

        let revive = StatusChange { status: AppointmentStatus::Scheduled, diagnosis: None, prescription: None };
        assert!(matches!(update_status(&store, &first.id, revive).await, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn unknown_appointment_is_not_found() {
        let store = store();
        let change = StatusChange { status: AppointmentStatus::NoShow, diagnosis: None, prescription: None };
        assert!(matches!(
            update_status(&store, "missing", change).await,
            Err(AppError::NotFound("Appointment"))
        ));
    }
}
