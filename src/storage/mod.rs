//! Storage port.
//!
//! Everything the service persists goes through the [`Store`] trait. Two
//! implementations exist: [`SeaOrmStore`] over a relational database and
//! [`MemoryStore`], an in-memory fixture store used when the database is
//! deliberately disabled or unreachable at startup.
mod database;
mod memory;

pub use database::SeaOrmStore;
pub use memory::MemoryStore;

use crate::auth::Role;
use crate::errors::StoreError;
use crate::settings::{Settings, StorageBackend};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Kind tag of every job created by the participant import.
pub const PARTICIPANT_IMPORT_KIND: &str = "participant_enrollment";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: String,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,
    pub email: Option<String>,
    pub enabled: bool,
    pub created_at: i64,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub id: String,
    pub username: String,
    pub password_hash: String,
    pub role: Role,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RefreshToken {
    pub token: String,
    pub user_id: String,
    pub created_at: i64,
    pub expires_at: i64,
    pub revoked: bool,
    pub parent_token: Option<String>, // For token rotation tracking
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Provider {
    pub id: i64,
    pub name: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Course {
    pub id: i64,
    pub code: String,
    pub name: String,
    pub provider_id: Option<i64>,
    pub instructor_id: Option<String>,
    pub created_at: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewCourse {
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub provider_id: Option<i64>,
    #[serde(default)]
    pub instructor_id: Option<String>,
}

/// Full replacement of a course's mutable fields; the code is immutable.
#[derive(Debug, Clone, Deserialize)]
pub struct CourseUpdate {
    pub name: String,
    #[serde(default)]
    pub provider_id: Option<i64>,
    #[serde(default)]
    pub instructor_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Participant {
    pub id: i64,
    pub email: String,
    pub name: String,
    pub provider_id: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone)]
pub struct NewParticipant {
    pub email: String,
    pub name: String,
    pub provider_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Enrollment {
    pub id: i64,
    pub participant_id: i64,
    pub course_id: i64,
    pub role: Option<String>,
    pub import_job_id: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone)]
pub struct NewEnrollment {
    pub participant_id: i64,
    pub course_id: i64,
    pub role: Option<String>,
    pub import_job_id: Option<i64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ImportStatus {
    Processing,
    Completed,
    Failed,
}

impl ImportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportStatus::Processing => "PROCESSING",
            ImportStatus::Completed => "COMPLETED",
            ImportStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for ImportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImportStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PROCESSING" => Ok(ImportStatus::Processing),
            "COMPLETED" => Ok(ImportStatus::Completed),
            "FAILED" => Ok(ImportStatus::Failed),
            other => Err(StoreError::Backend(format!("unknown import status {other}"))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ImportJob {
    pub id: i64,
    pub kind: String,
    pub status: ImportStatus,
    pub provider_id: Option<i64>,
    pub course_id: Option<i64>,
    pub total_rows: i64,
    pub processed_rows: i64,
    pub success_count: i64,
    pub failure_count: i64,
    pub error_message: Option<String>,
    pub created_by: Option<String>,
    pub started_at: i64,
    pub completed_at: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct NewImportJob {
    pub total_rows: i64,
    pub created_by: Option<String>,
}

/// Terminal state written once when an import finishes.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportCompletion {
    pub status: ImportStatus,
    pub processed_rows: i64,
    pub success_count: i64,
    pub failure_count: i64,
    pub error_message: Option<String>,
    pub provider_id: Option<i64>,
    pub course_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: i64,
    pub import_job_id: Option<i64>,
    pub file_name: String,
    pub checksum: String,
    pub size_bytes: i64,
    pub mime_type: String,
    pub metadata: Value,
    pub provider_id: Option<i64>,
    pub course_id: Option<i64>,
    pub created_at: i64,
}

#[derive(Debug, Clone)]
pub struct NewDocument {
    pub import_job_id: Option<i64>,
    pub file_name: String,
    pub checksum: String,
    pub size_bytes: i64,
    pub mime_type: String,
    pub metadata: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Attendance {
    pub id: i64,
    pub enrollment_id: i64,
    pub session_date: NaiveDate,
    pub present: bool,
    pub recorded_by: String,
    pub recorded_at: i64,
}

#[derive(Debug, Clone)]
pub struct NewAttendance {
    pub enrollment_id: i64,
    pub session_date: NaiveDate,
    pub present: bool,
    pub recorded_by: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Grade {
    pub id: i64,
    pub enrollment_id: i64,
    pub score: f64,
    pub recorded_by: String,
    pub recorded_at: i64,
}

#[derive(Debug, Clone)]
pub struct NewGrade {
    pub enrollment_id: i64,
    pub score: f64,
    pub recorded_by: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobExecution {
    pub id: i64,
    pub job_name: String,
    pub started_at: i64,
    pub completed_at: Option<i64>,
    pub success: Option<bool>,
    pub error_message: Option<String>,
    pub records_processed: Option<i64>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Store: Send + Sync {
    /// Cheap round trip used by health checks and backend selection.
    async fn ping(&self) -> Result<(), StoreError>;

    // Users
    async fn create_user(&self, user: NewUser) -> Result<User, StoreError>;
    async fn get_user(&self, id: &str) -> Result<Option<User>, StoreError>;
    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>, StoreError>;

    // Refresh tokens
    async fn insert_refresh_token(&self, token: RefreshToken) -> Result<(), StoreError>;
    /// Returns the token only while it is unrevoked and unexpired.
    async fn get_refresh_token(&self, token: &str) -> Result<Option<RefreshToken>, StoreError>;
    async fn revoke_refresh_token(&self, token: &str) -> Result<(), StoreError>;
    /// Revoke the token if it is still active, in one step.
    ///
    /// Returns the token only to the caller that actually revoked it, so two
    /// concurrent rotations of the same token cannot both succeed.
    async fn consume_refresh_token(&self, token: &str)
        -> Result<Option<RefreshToken>, StoreError>;
    async fn cleanup_expired_refresh_tokens(&self) -> Result<u64, StoreError>;

    // Providers
    /// Create-if-absent by exact name, else return the existing provider.
    async fn upsert_provider(&self, name: &str) -> Result<Provider, StoreError>;
    async fn get_provider(&self, id: i64) -> Result<Option<Provider>, StoreError>;
    async fn list_providers(&self) -> Result<Vec<Provider>, StoreError>;

    // Courses
    async fn create_course(&self, course: NewCourse) -> Result<Course, StoreError>;
    async fn get_course(&self, id: i64) -> Result<Option<Course>, StoreError>;
    async fn find_course_by_code(&self, code: &str) -> Result<Option<Course>, StoreError>;
    async fn list_courses(&self) -> Result<Vec<Course>, StoreError>;
    async fn update_course(&self, id: i64, update: CourseUpdate) -> Result<Course, StoreError>;
    /// Refuses with `Conflict` while the course still has enrollments.
    async fn delete_course(&self, id: i64) -> Result<(), StoreError>;

    // Participants and enrollments
    /// Keyed by email; name and provider are overwritten on conflict.
    async fn upsert_participant(&self, participant: NewParticipant)
        -> Result<Participant, StoreError>;
    async fn get_participant(&self, id: i64) -> Result<Option<Participant>, StoreError>;
    async fn find_enrollment(
        &self,
        participant_id: i64,
        course_id: i64,
    ) -> Result<Option<Enrollment>, StoreError>;
    /// Keyed by (participant, course); role and import job are overwritten on conflict.
    async fn upsert_enrollment(&self, enrollment: NewEnrollment)
        -> Result<Enrollment, StoreError>;
    async fn list_enrollments(&self, course_id: i64) -> Result<Vec<Enrollment>, StoreError>;

    // Import jobs and documents
    async fn create_import_job(&self, job: NewImportJob) -> Result<ImportJob, StoreError>;
    async fn finish_import_job(
        &self,
        id: i64,
        completion: ImportCompletion,
    ) -> Result<ImportJob, StoreError>;
    async fn get_import_job(&self, id: i64) -> Result<Option<ImportJob>, StoreError>;
    async fn list_import_jobs(&self) -> Result<Vec<ImportJob>, StoreError>;
    async fn create_document(&self, document: NewDocument) -> Result<Document, StoreError>;
    async fn link_document(
        &self,
        id: i64,
        provider_id: Option<i64>,
        course_id: Option<i64>,
    ) -> Result<(), StoreError>;
    async fn get_document_for_job(&self, import_job_id: i64)
        -> Result<Option<Document>, StoreError>;

    // Attendance and grades
    async fn upsert_attendance(&self, record: NewAttendance) -> Result<Attendance, StoreError>;
    async fn list_attendance(&self, course_id: i64) -> Result<Vec<Attendance>, StoreError>;
    async fn upsert_grade(&self, grade: NewGrade) -> Result<Grade, StoreError>;
    async fn list_grades(&self, course_id: i64) -> Result<Vec<Grade>, StoreError>;

    // Maintenance job log
    async fn start_job_execution(&self, job_name: &str) -> Result<i64, StoreError>;
    async fn complete_job_execution(
        &self,
        id: i64,
        success: bool,
        error_message: Option<String>,
        records_processed: Option<i64>,
    ) -> Result<(), StoreError>;
    async fn list_job_executions(&self, limit: u64) -> Result<Vec<JobExecution>, StoreError>;
}

/// Select the storage backend from settings.
///
/// With `storage.fallback_to_memory` set, an unreachable database degrades to
/// the fixture-backed in-memory store instead of aborting startup.
pub async fn init(settings: &Settings) -> Result<Arc<dyn Store>, StoreError> {
    match settings.storage.backend {
        StorageBackend::Memory => {
            tracing::info!("Using in-memory fixture storage");
            Ok(Arc::new(MemoryStore::with_fixtures()))
        }
        StorageBackend::Database => match SeaOrmStore::connect(&settings.database).await {
            Ok(store) => Ok(Arc::new(store)),
            Err(StoreError::Unavailable(reason)) if settings.storage.fallback_to_memory => {
                tracing::warn!(
                    %reason,
                    "Database unreachable, falling back to in-memory fixture storage"
                );
                Ok(Arc::new(MemoryStore::with_fixtures()))
            }
            Err(e) => Err(e),
        },
    }
}
