//! Medical file upload, download and deletion.
//!
//! The patient is checked before anything touches the disk. Once the binary is
//! written, any failure to record its metadata removes it again.

use std::future::Future;

use uuid::Uuid;

use crate::{
    db::Db,
    errors::{AppError, AppResult},
    models::MedicalFileRow,
    services::storage::FileStorage,
};

pub const FILE_SELECT: &str =
    "SELECT id, patient_id, filename, original_name, file_path, file_type, file_size,
            description, uploaded_by, created_at
     FROM medical_files";

#[derive(Debug, Clone)]
pub struct Upload {
    pub patient_id:    String,
    pub original_name: String,
    pub content_type:  String,
    pub bytes:         Vec<u8>,
    pub description:   Option<String>,
    pub uploaded_by:   String,
}

#[derive(Debug, Clone)]
pub struct NewMedicalFile {
    pub id:            String,
    pub patient_id:    String,
    pub filename:      String,
    pub original_name: String,
    pub file_path:     String,
    pub file_type:     String,
    pub file_size:     i64,
    pub description:   Option<String>,
    pub uploaded_by:   String,
}

pub trait MedicalFileStore {
    fn patient_exists(&self, patient_id: &str) -> impl Future<Output = AppResult<bool>> + Send;
    fn insert_file(&self, file: &NewMedicalFile) -> impl Future<Output = AppResult<MedicalFileRow>> + Send;
    fn find_file(&self, id: &str) -> impl Future<Output = AppResult<Option<MedicalFileRow>>> + Send;
    /// Returns `false` when no row had this id.
    fn delete_file(&self, id: &str) -> impl Future<Output = AppResult<bool>> + Send;
}

pub async fn upload<S: MedicalFileStore>(
    store: &S,
    storage: &FileStorage,
    upload: Upload,
) -> AppResult<MedicalFileRow> {
    if upload.bytes.is_empty() {
        return Err(AppError::validation("No file uploaded"));
    }
    if !store.patient_exists(&upload.patient_id).await? {
        return Err(AppError::NotFound("Patient"));
    }

    let stored = storage.store(&upload.original_name, &upload.bytes).await?;
    let new = NewMedicalFile {
        id:            Uuid::new_v4().to_string(),
        patient_id:    upload.patient_id,
        filename:      stored.filename,
        original_name: upload.original_name,
        file_path:     stored.path.clone(),
        file_type:     upload.content_type,
        file_size:     i64::try_from(upload.bytes.len()).unwrap_or(i64::MAX),
        description:   upload.description,
        uploaded_by:   upload.uploaded_by,
    };

    match store.insert_file(&new).await {
        Ok(row) => {
            tracing::info!(file_id = %row.id, patient_id = %row.patient_id, size = row.file_size, "Medical file uploaded");
            Ok(row)
        }
        Err(err) => {
            if let Err(cleanup) = storage.remove(&stored.path).await {
                tracing::warn!(error = %cleanup, path = %stored.path, "Could not remove orphaned upload");
            }
            Err(err)
        }
    }
}

/// Look up a file for download. Both the row and the bytes on disk must exist.
pub async fn open_download<S: MedicalFileStore>(
    store: &S,
    storage: &FileStorage,
    id: &str,
) -> AppResult<(MedicalFileRow, tokio::fs::File)> {
    let row = store.find_file(id).await?.ok_or(AppError::NotFound("File"))?;
    if !storage.exists(&row.file_path).await {
        tracing::warn!(file_id = %row.id, path = %row.file_path, "Medical file missing on disk");
        return Err(AppError::NotFound("File"));
    }
    let file = storage.open(&row.file_path).await?;
    Ok((row, file))
}

pub async fn delete<S: MedicalFileStore>(store: &S, storage: &FileStorage, id: &str) -> AppResult<()> {
    let row = store.find_file(id).await?.ok_or(AppError::NotFound("File"))?;
    if !store.delete_file(id).await? {
        return Err(AppError::NotFound("File"));
    }
    // Row is gone either way; a stuck file on disk is only worth a warning.
    if let Err(err) = storage.remove(&row.file_path).await {
        tracing::warn!(error = %err, path = %row.file_path, "Could not remove medical file from disk");
    }
    tracing::info!(file_id = %row.id, "Medical file deleted");
    Ok(())
}

impl MedicalFileStore for Db {
    async fn patient_exists(&self, patient_id: &str) -> AppResult<bool> {
        let found: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM patients WHERE id = ?)")
            .bind(patient_id)
            .fetch_one(self)
            .await?;
        Ok(found)
    }

    async fn insert_file(&self, file: &NewMedicalFile) -> AppResult<MedicalFileRow> {
        sqlx::query(
            "INSERT INTO medical_files
             (id, patient_id, filename, original_name, file_path, file_type, file_size, description, uploaded_by)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&file.id)
        .bind(&file.patient_id)
        .bind(&file.filename)
        .bind(&file.original_name)
        .bind(&file.file_path)
        .bind(&file.file_type)
        .bind(file.file_size)
        .bind(&file.description)
        .bind(&file.uploaded_by)
        .execute(self)
        .await?;

        let row = sqlx::query_as::<_, MedicalFileRow>(&format!("{FILE_SELECT} WHERE id = ?"))
            .bind(&file.id)
            .fetch_one(self)
            .await?;
        Ok(row)
    }

    async fn find_file(&self, id: &str) -> AppResult<Option<MedicalFileRow>> {
        let row = sqlx::query_as::<_, MedicalFileRow>(&format!("{FILE_SELECT} WHERE id = ?"))
            .bind(id)
            .fetch_optional(self)
            .await?;
        Ok(row)
    }

    async fn delete_file(&self, id: &str) -> AppResult<bool> {
        let affected = sqlx::query("DELETE FROM medical_files WHERE id = ?")
            .bind(id)
            .execute(self)
            .await?
            .rows_affected();
        Ok(affected > 0)
    }
}
