use super::{
    Attendance, Course, CourseUpdate, Document, Enrollment, Grade, ImportCompletion, ImportJob,
    ImportStatus, JobExecution, NewAttendance, NewCourse, NewDocument, NewEnrollment, NewGrade,
    NewImportJob, NewParticipant, NewUser, Participant, Provider, RefreshToken, Store, User,
    PARTICIPANT_IMPORT_KIND,
};
use crate::entities;
use crate::errors::StoreError;
use crate::settings::Database as DbCfg;
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::ActiveValue::NotSet;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Database, DatabaseConnection, EntityTrait, IntoActiveModel,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set,
};
use sea_orm_migration::MigratorTrait;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Relational [`Store`] over a SeaORM connection (SQLite or PostgreSQL).
#[derive(Clone)]
pub struct SeaOrmStore {
    db: DatabaseConnection,
}

impl SeaOrmStore {
    /// Connect, apply pending migrations and ping once.
    pub async fn connect(cfg: &DbCfg) -> Result<Self, StoreError> {
        let db = Database::connect(&cfg.url).await?;
        migration::Migrator::up(&db, None).await?;
        db.ping().await?;
        tracing::info!("Connected to database and applied migrations");
        Ok(Self { db })
    }

    /// Wrap an already migrated connection.
    pub fn from_connection(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }

    async fn enrollment_ids_for_course(&self, course_id: i64) -> Result<Vec<i64>, StoreError> {
        use entities::enrollment::{Column, Entity};

        let ids = Entity::find()
            .select_only()
            .column(Column::Id)
            .filter(Column::CourseId.eq(course_id))
            .into_tuple::<i64>()
            .all(&self.db)
            .await?;
        Ok(ids)
    }
}

fn user_from_model(model: entities::user::Model) -> Result<User, StoreError> {
    let role = model
        .role
        .parse()
        .map_err(|e: String| StoreError::Backend(e))?;
    Ok(User {
        id: model.id,
        username: model.username,
        password_hash: model.password_hash,
        role,
        email: model.email,
        enabled: model.enabled != 0,
        created_at: model.created_at,
    })
}

fn refresh_token_from_model(model: entities::refresh_token::Model) -> RefreshToken {
    RefreshToken {
        token: model.token,
        user_id: model.user_id,
        created_at: model.created_at,
        expires_at: model.expires_at,
        revoked: model.revoked != 0,
        parent_token: model.parent_token,
    }
}

impl From<entities::provider::Model> for Provider {
    fn from(model: entities::provider::Model) -> Self {
        Provider {
            id: model.id,
            name: model.name,
            created_at: model.created_at,
        }
    }
}

impl From<entities::course::Model> for Course {
    fn from(model: entities::course::Model) -> Self {
        Course {
            id: model.id,
            code: model.code,
            name: model.name,
            provider_id: model.provider_id,
            instructor_id: model.instructor_id,
            created_at: model.created_at,
        }
    }
}

impl From<entities::participant::Model> for Participant {
    fn from(model: entities::participant::Model) -> Self {
        Participant {
            id: model.id,
            email: model.email,
            name: model.name,
            provider_id: model.provider_id,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

impl From<entities::enrollment::Model> for Enrollment {
    fn from(model: entities::enrollment::Model) -> Self {
        Enrollment {
            id: model.id,
            participant_id: model.participant_id,
            course_id: model.course_id,
            role: model.role,
            import_job_id: model.import_job_id,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

impl From<entities::grade::Model> for Grade {
    fn from(model: entities::grade::Model) -> Self {
        Grade {
            id: model.id,
            enrollment_id: model.enrollment_id,
            score: model.score,
            recorded_by: model.recorded_by,
            recorded_at: model.recorded_at,
        }
    }
}

impl From<entities::job_execution::Model> for JobExecution {
    fn from(model: entities::job_execution::Model) -> Self {
        JobExecution {
            id: model.id,
            job_name: model.job_name,
            started_at: model.started_at,
            completed_at: model.completed_at,
            success: model.success.map(|s| s != 0),
            error_message: model.error_message,
            records_processed: model.records_processed,
        }
    }
}

fn import_job_from_model(model: entities::import_job::Model) -> Result<ImportJob, StoreError> {
    Ok(ImportJob {
        id: model.id,
        kind: model.kind,
        status: model.status.parse()?,
        provider_id: model.provider_id,
        course_id: model.course_id,
        total_rows: model.total_rows,
        processed_rows: model.processed_rows,
        success_count: model.success_count,
        failure_count: model.failure_count,
        error_message: model.error_message,
        created_by: model.created_by,
        started_at: model.started_at,
        completed_at: model.completed_at,
    })
}

fn document_from_model(model: entities::document::Model) -> Result<Document, StoreError> {
    let metadata = serde_json::from_str(&model.metadata)
        .map_err(|e| StoreError::Backend(format!("document {} metadata: {e}", model.id)))?;
    Ok(Document {
        id: model.id,
        import_job_id: model.import_job_id,
        file_name: model.file_name,
        checksum: model.checksum,
        size_bytes: model.size_bytes,
        mime_type: model.mime_type,
        metadata,
        provider_id: model.provider_id,
        course_id: model.course_id,
        created_at: model.created_at,
    })
}

fn attendance_from_model(model: entities::attendance::Model) -> Result<Attendance, StoreError> {
    let session_date = NaiveDate::parse_from_str(&model.session_date, DATE_FORMAT)
        .map_err(|e| StoreError::Backend(format!("attendance {} date: {e}", model.id)))?;
    Ok(Attendance {
        id: model.id,
        enrollment_id: model.enrollment_id,
        session_date,
        present: model.present != 0,
        recorded_by: model.recorded_by,
        recorded_at: model.recorded_at,
    })
}

#[async_trait]
impl Store for SeaOrmStore {
    async fn ping(&self) -> Result<(), StoreError> {
        self.db.ping().await?;
        Ok(())
    }

    async fn create_user(&self, user: NewUser) -> Result<User, StoreError> {
        let model = entities::user::ActiveModel {
            id: Set(user.id),
            username: Set(user.username),
            password_hash: Set(user.password_hash),
            role: Set(user.role.as_str().to_string()),
            email: Set(user.email),
            enabled: Set(1),
            created_at: Set(Utc::now().timestamp()),
        }
        .insert(&self.db)
        .await?;
        user_from_model(model)
    }

    async fn get_user(&self, id: &str) -> Result<Option<User>, StoreError> {
        entities::user::Entity::find_by_id(id.to_string())
            .one(&self.db)
            .await?
            .map(user_from_model)
            .transpose()
    }

    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        use entities::user::{Column, Entity};

        Entity::find()
            .filter(Column::Username.eq(username))
            .one(&self.db)
            .await?
            .map(user_from_model)
            .transpose()
    }

    async fn insert_refresh_token(&self, token: RefreshToken) -> Result<(), StoreError> {
        entities::refresh_token::ActiveModel {
            token: Set(token.token),
            user_id: Set(token.user_id),
            created_at: Set(token.created_at),
            expires_at: Set(token.expires_at),
            revoked: Set(i64::from(token.revoked)),
            parent_token: Set(token.parent_token),
        }
        .insert(&self.db)
        .await?;
        Ok(())
    }

    async fn get_refresh_token(&self, token: &str) -> Result<Option<RefreshToken>, StoreError> {
        let Some(model) = entities::refresh_token::Entity::find_by_id(token.to_string())
            .one(&self.db)
            .await?
        else {
            return Ok(None);
        };

        // Check if token is expired or revoked
        let now = Utc::now().timestamp();
        if model.revoked != 0 || now > model.expires_at {
            return Ok(None);
        }
        Ok(Some(refresh_token_from_model(model)))
    }

    async fn revoke_refresh_token(&self, token: &str) -> Result<(), StoreError> {
        if let Some(model) = entities::refresh_token::Entity::find_by_id(token.to_string())
            .one(&self.db)
            .await?
        {
            let mut active = model.into_active_model();
            active.revoked = Set(1);
            active.update(&self.db).await?;
        }
        Ok(())
    }

    async fn consume_refresh_token(
        &self,
        token: &str,
    ) -> Result<Option<RefreshToken>, StoreError> {
        use entities::refresh_token::{Column, Entity};

        let now = Utc::now().timestamp();
        let result = Entity::update_many()
            .col_expr(Column::Revoked, Expr::value(1))
            .filter(Column::Token.eq(token))
            .filter(Column::Revoked.eq(0))
            .filter(Column::ExpiresAt.gte(now))
            .exec(&self.db)
            .await?;
        if result.rows_affected != 1 {
            return Ok(None);
        }

        Ok(Entity::find_by_id(token.to_string())
            .one(&self.db)
            .await?
            .map(refresh_token_from_model))
    }

    async fn cleanup_expired_refresh_tokens(&self) -> Result<u64, StoreError> {
        use entities::refresh_token::{Column, Entity};

        let now = Utc::now().timestamp();
        let result = Entity::delete_many()
            .filter(Column::ExpiresAt.lt(now))
            .exec(&self.db)
            .await?;
        Ok(result.rows_affected)
    }

    async fn upsert_provider(&self, name: &str) -> Result<Provider, StoreError> {
        use entities::provider::{Column, Entity};

        let find = || Entity::find().filter(Column::Name.eq(name)).one(&self.db);
        if let Some(existing) = find().await? {
            return Ok(existing.into());
        }

        let insert = entities::provider::ActiveModel {
            id: NotSet,
            name: Set(name.to_string()),
            created_at: Set(Utc::now().timestamp()),
        }
        .insert(&self.db)
        .await;

        match insert.map_err(StoreError::from) {
            Ok(model) => Ok(model.into()),
            // Lost a race with a concurrent insert of the same name
            Err(StoreError::Conflict(_)) => find()
                .await?
                .map(Provider::from)
                .ok_or_else(|| StoreError::NotFound(format!("provider {name}"))),
            Err(e) => Err(e),
        }
    }

    async fn get_provider(&self, id: i64) -> Result<Option<Provider>, StoreError> {
        Ok(entities::provider::Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .map(Provider::from))
    }

    async fn list_providers(&self) -> Result<Vec<Provider>, StoreError> {
        use entities::provider::{Column, Entity};

        let models = Entity::find()
            .order_by_asc(Column::Name)
            .all(&self.db)
            .await?;
        Ok(models.into_iter().map(Provider::from).collect())
    }

    async fn create_course(&self, course: NewCourse) -> Result<Course, StoreError> {
        let model = entities::course::ActiveModel {
            id: NotSet,
            code: Set(course.code),
            name: Set(course.name),
            provider_id: Set(course.provider_id),
            instructor_id: Set(course.instructor_id),
            created_at: Set(Utc::now().timestamp()),
        }
        .insert(&self.db)
        .await?;
        Ok(model.into())
    }

    async fn get_course(&self, id: i64) -> Result<Option<Course>, StoreError> {
        Ok(entities::course::Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .map(Course::from))
    }

    async fn find_course_by_code(&self, code: &str) -> Result<Option<Course>, StoreError> {
        use entities::course::{Column, Entity};

        Ok(Entity::find()
            .filter(Column::Code.eq(code))
            .one(&self.db)
            .await?
            .map(Course::from))
    }

    async fn list_courses(&self) -> Result<Vec<Course>, StoreError> {
        use entities::course::{Column, Entity};

        let models = Entity::find()
            .order_by_asc(Column::Code)
            .all(&self.db)
            .await?;
        Ok(models.into_iter().map(Course::from).collect())
    }

    async fn update_course(&self, id: i64, update: CourseUpdate) -> Result<Course, StoreError> {
        let model = entities::course::Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("course {id}")))?;

        let mut active = model.into_active_model();
        active.name = Set(update.name);
        active.provider_id = Set(update.provider_id);
        active.instructor_id = Set(update.instructor_id);
        Ok(active.update(&self.db).await?.into())
    }

    async fn delete_course(&self, id: i64) -> Result<(), StoreError> {
        use entities::enrollment::{Column, Entity};

        let enrolled = Entity::find()
            .filter(Column::CourseId.eq(id))
            .count(&self.db)
            .await?;
        if enrolled > 0 {
            return Err(StoreError::Conflict(format!(
                "course {id} still has {enrolled} enrollments"
            )));
        }

        let result = entities::course::Entity::delete_by_id(id)
            .exec(&self.db)
            .await?;
        if result.rows_affected == 0 {
            return Err(StoreError::NotFound(format!("course {id}")));
        }
        Ok(())
    }

    async fn upsert_participant(
        &self,
        participant: NewParticipant,
    ) -> Result<Participant, StoreError> {
        use entities::participant::{Column, Entity};

        let now = Utc::now().timestamp();
        let email = participant.email.clone();
        let model = entities::participant::ActiveModel {
            id: NotSet,
            email: Set(participant.email),
            name: Set(participant.name),
            provider_id: Set(participant.provider_id),
            created_at: Set(now),
            updated_at: Set(now),
        };

        Entity::insert(model)
            .on_conflict(
                OnConflict::column(Column::Email)
                    .update_columns([Column::Name, Column::ProviderId, Column::UpdatedAt])
                    .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await?;

        Entity::find()
            .filter(Column::Email.eq(email.as_str()))
            .one(&self.db)
            .await?
            .map(Participant::from)
            .ok_or_else(|| StoreError::NotFound(format!("participant {email}")))
    }

    async fn get_participant(&self, id: i64) -> Result<Option<Participant>, StoreError> {
        Ok(entities::participant::Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .map(Participant::from))
    }

    async fn find_enrollment(
        &self,
        participant_id: i64,
        course_id: i64,
    ) -> Result<Option<Enrollment>, StoreError> {
        use entities::enrollment::{Column, Entity};

        Ok(Entity::find()
            .filter(Column::ParticipantId.eq(participant_id))
            .filter(Column::CourseId.eq(course_id))
            .one(&self.db)
            .await?
            .map(Enrollment::from))
    }

    async fn upsert_enrollment(&self, enrollment: NewEnrollment) -> Result<Enrollment, StoreError> {
        use entities::enrollment::{Column, Entity};

        let now = Utc::now().timestamp();
        let (participant_id, course_id) = (enrollment.participant_id, enrollment.course_id);
        let model = entities::enrollment::ActiveModel {
            id: NotSet,
            participant_id: Set(participant_id),
            course_id: Set(course_id),
            role: Set(enrollment.role),
            import_job_id: Set(enrollment.import_job_id),
            created_at: Set(now),
            updated_at: Set(now),
        };

        Entity::insert(model)
            .on_conflict(
                OnConflict::columns([Column::ParticipantId, Column::CourseId])
                    .update_columns([Column::Role, Column::ImportJobId, Column::UpdatedAt])
                    .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await?;

        self.find_enrollment(participant_id, course_id)
            .await?
            .ok_or_else(|| {
                StoreError::NotFound(format!("enrollment {participant_id}/{course_id}"))
            })
    }

    async fn list_enrollments(&self, course_id: i64) -> Result<Vec<Enrollment>, StoreError> {
        use entities::enrollment::{Column, Entity};

        let models = Entity::find()
            .filter(Column::CourseId.eq(course_id))
            .order_by_asc(Column::Id)
            .all(&self.db)
            .await?;
        Ok(models.into_iter().map(Enrollment::from).collect())
    }

    async fn create_import_job(&self, job: NewImportJob) -> Result<ImportJob, StoreError> {
        let model = entities::import_job::ActiveModel {
            id: NotSet,
            kind: Set(PARTICIPANT_IMPORT_KIND.to_string()),
            status: Set(ImportStatus::Processing.as_str().to_string()),
            provider_id: Set(None),
            course_id: Set(None),
            total_rows: Set(job.total_rows),
            processed_rows: Set(0),
            success_count: Set(0),
            failure_count: Set(0),
            error_message: Set(None),
            created_by: Set(job.created_by),
            started_at: Set(Utc::now().timestamp()),
            completed_at: Set(None),
        }
        .insert(&self.db)
        .await?;
        import_job_from_model(model)
    }

    async fn finish_import_job(
        &self,
        id: i64,
        completion: ImportCompletion,
    ) -> Result<ImportJob, StoreError> {
        let model = entities::import_job::Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("import job {id}")))?;

        let mut active = model.into_active_model();
        active.status = Set(completion.status.as_str().to_string());
        active.processed_rows = Set(completion.processed_rows);
        active.success_count = Set(completion.success_count);
        active.failure_count = Set(completion.failure_count);
        active.error_message = Set(completion.error_message);
        active.provider_id = Set(completion.provider_id);
        active.course_id = Set(completion.course_id);
        active.completed_at = Set(Some(Utc::now().timestamp()));
        import_job_from_model(active.update(&self.db).await?)
    }

    async fn get_import_job(&self, id: i64) -> Result<Option<ImportJob>, StoreError> {
        entities::import_job::Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .map(import_job_from_model)
            .transpose()
    }

    async fn list_import_jobs(&self) -> Result<Vec<ImportJob>, StoreError> {
        use entities::import_job::{Column, Entity};

        Entity::find()
            .order_by_desc(Column::StartedAt)
            .order_by_desc(Column::Id)
            .all(&self.db)
            .await?
            .into_iter()
            .map(import_job_from_model)
            .collect()
    }

    async fn create_document(&self, document: NewDocument) -> Result<Document, StoreError> {
        let metadata = serde_json::to_string(&document.metadata)
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        let model = entities::document::ActiveModel {
            id: NotSet,
            import_job_id: Set(document.import_job_id),
            file_name: Set(document.file_name),
            checksum: Set(document.checksum),
            size_bytes: Set(document.size_bytes),
            mime_type: Set(document.mime_type),
            metadata: Set(metadata),
            provider_id: Set(None),
            course_id: Set(None),
            created_at: Set(Utc::now().timestamp()),
        }
        .insert(&self.db)
        .await?;
        document_from_model(model)
    }

    async fn link_document(
        &self,
        id: i64,
        provider_id: Option<i64>,
        course_id: Option<i64>,
    ) -> Result<(), StoreError> {
        let model = entities::document::Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("document {id}")))?;

        let mut active = model.into_active_model();
        active.provider_id = Set(provider_id);
        active.course_id = Set(course_id);
        active.update(&self.db).await?;
        Ok(())
    }

    async fn get_document_for_job(
        &self,
        import_job_id: i64,
    ) -> Result<Option<Document>, StoreError> {
        use entities::document::{Column, Entity};

        Entity::find()
            .filter(Column::ImportJobId.eq(import_job_id))
            .one(&self.db)
            .await?
            .map(document_from_model)
            .transpose()
    }

    async fn upsert_attendance(&self, record: NewAttendance) -> Result<Attendance, StoreError> {
        use entities::attendance::{Column, Entity};

        let session_date = record.session_date.format(DATE_FORMAT).to_string();
        let model = entities::attendance::ActiveModel {
            id: NotSet,
            enrollment_id: Set(record.enrollment_id),
            session_date: Set(session_date.clone()),
            present: Set(i64::from(record.present)),
            recorded_by: Set(record.recorded_by),
            recorded_at: Set(Utc::now().timestamp()),
        };

        Entity::insert(model)
            .on_conflict(
                OnConflict::columns([Column::EnrollmentId, Column::SessionDate])
                    .update_columns([Column::Present, Column::RecordedBy, Column::RecordedAt])
                    .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await?;

        let model = Entity::find()
            .filter(Column::EnrollmentId.eq(record.enrollment_id))
            .filter(Column::SessionDate.eq(session_date.as_str()))
            .one(&self.db)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("attendance {session_date}")))?;
        attendance_from_model(model)
    }

    async fn list_attendance(&self, course_id: i64) -> Result<Vec<Attendance>, StoreError> {
        use entities::attendance::{Column, Entity};

        let enrollment_ids = self.enrollment_ids_for_course(course_id).await?;
        if enrollment_ids.is_empty() {
            return Ok(Vec::new());
        }

        Entity::find()
            .filter(Column::EnrollmentId.is_in(enrollment_ids))
            .order_by_asc(Column::SessionDate)
            .order_by_asc(Column::EnrollmentId)
            .all(&self.db)
            .await?
            .into_iter()
            .map(attendance_from_model)
            .collect()
    }

    async fn upsert_grade(&self, grade: NewGrade) -> Result<Grade, StoreError> {
        use entities::grade::{Column, Entity};

        let model = entities::grade::ActiveModel {
            id: NotSet,
            enrollment_id: Set(grade.enrollment_id),
            score: Set(grade.score),
            recorded_by: Set(grade.recorded_by),
            recorded_at: Set(Utc::now().timestamp()),
        };

        Entity::insert(model)
            .on_conflict(
                OnConflict::column(Column::EnrollmentId)
                    .update_columns([Column::Score, Column::RecordedBy, Column::RecordedAt])
                    .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await?;

        Entity::find()
            .filter(Column::EnrollmentId.eq(grade.enrollment_id))
            .one(&self.db)
            .await?
            .map(Grade::from)
            .ok_or_else(|| StoreError::NotFound(format!("grade {}", grade.enrollment_id)))
    }

    async fn list_grades(&self, course_id: i64) -> Result<Vec<Grade>, StoreError> {
        use entities::grade::{Column, Entity};

        let enrollment_ids = self.enrollment_ids_for_course(course_id).await?;
        if enrollment_ids.is_empty() {
            return Ok(Vec::new());
        }

        let models = Entity::find()
            .filter(Column::EnrollmentId.is_in(enrollment_ids))
            .order_by_asc(Column::EnrollmentId)
            .all(&self.db)
            .await?;
        Ok(models.into_iter().map(Grade::from).collect())
    }

    async fn start_job_execution(&self, job_name: &str) -> Result<i64, StoreError> {
        let execution = entities::job_execution::ActiveModel {
            id: NotSet,
            job_name: Set(job_name.to_string()),
            started_at: Set(Utc::now().timestamp()),
            completed_at: Set(None),
            success: Set(None),
            error_message: Set(None),
            records_processed: Set(None),
        };

        let result = execution.insert(&self.db).await?;
        Ok(result.id)
    }

    async fn complete_job_execution(
        &self,
        id: i64,
        success: bool,
        error_message: Option<String>,
        records_processed: Option<i64>,
    ) -> Result<(), StoreError> {
        if let Some(execution) = entities::job_execution::Entity::find_by_id(id)
            .one(&self.db)
            .await?
        {
            let mut active = execution.into_active_model();
            active.completed_at = Set(Some(Utc::now().timestamp()));
            active.success = Set(Some(i64::from(success)));
            active.error_message = Set(error_message);
            active.records_processed = Set(records_processed);
            active.update(&self.db).await?;
        }
        Ok(())
    }

    async fn list_job_executions(&self, limit: u64) -> Result<Vec<JobExecution>, StoreError> {
        use entities::job_execution::{Column, Entity};

        let models = Entity::find()
            .order_by_desc(Column::StartedAt)
            .order_by_desc(Column::Id)
            .limit(limit)
            .all(&self.db)
            .await?;
        Ok(models.into_iter().map(JobExecution::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use serde_json::json;
    use tempfile::NamedTempFile;

    /// Test database helper that keeps temp file alive
    struct TestDb {
        store: SeaOrmStore,
        _temp_file: NamedTempFile,
    }

    impl TestDb {
        async fn new() -> Self {
            let temp_file = NamedTempFile::new().expect("Failed to create temp file");
            let db_path = temp_file.path().to_str().expect("Invalid temp file path");
            let cfg = DbCfg {
                url: format!("sqlite://{}?mode=rwc", db_path),
            };

            let store = SeaOrmStore::connect(&cfg)
                .await
                .expect("Failed to connect to test database");

            Self {
                store,
                _temp_file: temp_file,
            }
        }
    }

    async fn course(store: &SeaOrmStore, code: &str) -> Course {
        store
            .create_course(NewCourse {
                code: code.to_string(),
                name: format!("Course {code}"),
                provider_id: None,
                instructor_id: None,
            })
            .await
            .expect("Failed to create course")
    }

    async fn participant(store: &SeaOrmStore, email: &str) -> Participant {
        store
            .upsert_participant(NewParticipant {
                email: email.to_string(),
                name: "Ana".to_string(),
                provider_id: None,
            })
            .await
            .expect("Failed to upsert participant")
    }

    // ============================================================================
    // Users and refresh tokens
    // ============================================================================

    #[tokio::test]
    async fn test_create_and_get_user() {
        let test_db = TestDb::new().await;
        let store = &test_db.store;

        let created = store
            .create_user(NewUser {
                id: "u-1".to_string(),
                username: "ana".to_string(),
                password_hash: "hash".to_string(),
                role: Role::Instructor,
                email: None,
            })
            .await
            .expect("Failed to create user");
        assert!(created.enabled);

        let by_name = store
            .get_user_by_username("ana")
            .await
            .expect("Query failed")
            .expect("User not found");
        assert_eq!(by_name.id, "u-1");
        assert_eq!(by_name.role, Role::Instructor);

        assert!(store.get_user("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_username_is_conflict() {
        let test_db = TestDb::new().await;
        let store = &test_db.store;

        let new_user = |id: &str| NewUser {
            id: id.to_string(),
            username: "dup".to_string(),
            password_hash: "hash".to_string(),
            role: Role::Reporter,
            email: None,
        };
        store.create_user(new_user("a")).await.expect("first insert");

        let err = store.create_user(new_user("b")).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn test_refresh_token_revoked_and_expired_are_hidden() {
        let test_db = TestDb::new().await;
        let store = &test_db.store;
        let now = Utc::now().timestamp();

        let token = |t: &str, expires_at: i64| RefreshToken {
            token: t.to_string(),
            user_id: "u-1".to_string(),
            created_at: now,
            expires_at,
            revoked: false,
            parent_token: None,
        };
        store.insert_refresh_token(token("live", now + 60)).await.unwrap();
        store.insert_refresh_token(token("old", now - 60)).await.unwrap();

        assert!(store.get_refresh_token("live").await.unwrap().is_some());
        assert!(store.get_refresh_token("old").await.unwrap().is_none());

        store.revoke_refresh_token("live").await.unwrap();
        assert!(store.get_refresh_token("live").await.unwrap().is_none());

        let removed = store.cleanup_expired_refresh_tokens().await.unwrap();
        assert_eq!(removed, 1);
    }

    #[tokio::test]
    async fn test_consume_refresh_token_only_once() {
        let test_db = TestDb::new().await;
        let store = &test_db.store;
        let now = Utc::now().timestamp();

        for (t, expires_at) in [("live", now + 60), ("old", now - 60)] {
            store
                .insert_refresh_token(RefreshToken {
                    token: t.to_string(),
                    user_id: "u-1".to_string(),
                    created_at: now,
                    expires_at,
                    revoked: false,
                    parent_token: None,
                })
                .await
                .unwrap();
        }

        let consumed = store.consume_refresh_token("live").await.unwrap().unwrap();
        assert_eq!(consumed.user_id, "u-1");
        assert!(consumed.revoked);

        assert!(store.consume_refresh_token("live").await.unwrap().is_none());
        assert!(store.consume_refresh_token("old").await.unwrap().is_none());
        assert!(store.consume_refresh_token("missing").await.unwrap().is_none());
    }

    // ============================================================================
    // Providers and courses
    // ============================================================================

    #[tokio::test]
    async fn test_upsert_provider_reuses_existing() {
        let test_db = TestDb::new().await;
        let store = &test_db.store;

        let first = store.upsert_provider("P1").await.unwrap();
        let second = store.upsert_provider("P1").await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(store.list_providers().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_course_code_is_unique() {
        let test_db = TestDb::new().await;
        let store = &test_db.store;

        course(store, "CUR-001").await;
        let err = store
            .create_course(NewCourse {
                code: "CUR-001".to_string(),
                name: "Again".to_string(),
                provider_id: None,
                instructor_id: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_update_and_delete_course() {
        let test_db = TestDb::new().await;
        let store = &test_db.store;
        let created = course(store, "CUR-002").await;

        let updated = store
            .update_course(
                created.id,
                CourseUpdate {
                    name: "Renamed".to_string(),
                    provider_id: None,
                    instructor_id: Some("u-9".to_string()),
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.name, "Renamed");
        assert_eq!(updated.code, "CUR-002");
        assert_eq!(updated.instructor_id.as_deref(), Some("u-9"));

        store.delete_course(created.id).await.unwrap();
        assert!(store.get_course(created.id).await.unwrap().is_none());
        assert!(matches!(
            store.delete_course(created.id).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_course_with_enrollments_is_conflict() {
        let test_db = TestDb::new().await;
        let store = &test_db.store;
        let c = course(store, "CUR-003").await;
        let p = participant(store, "a@x.com").await;

        store
            .upsert_enrollment(NewEnrollment {
                participant_id: p.id,
                course_id: c.id,
                role: None,
                import_job_id: None,
            })
            .await
            .unwrap();

        assert!(matches!(
            store.delete_course(c.id).await,
            Err(StoreError::Conflict(_))
        ));
    }

    // ============================================================================
    // Participants and enrollments
    // ============================================================================

    #[tokio::test]
    async fn test_upsert_participant_overwrites_name() {
        let test_db = TestDb::new().await;
        let store = &test_db.store;

        let first = participant(store, "a@x.com").await;
        let second = store
            .upsert_participant(NewParticipant {
                email: "a@x.com".to_string(),
                name: "Ana Pérez".to_string(),
                provider_id: None,
            })
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.name, "Ana Pérez");
        assert_eq!(second.created_at, first.created_at);
    }

    #[tokio::test]
    async fn test_upsert_enrollment_keyed_by_participant_and_course() {
        let test_db = TestDb::new().await;
        let store = &test_db.store;
        let c = course(store, "CUR-004").await;
        let p = participant(store, "b@x.com").await;

        assert!(store.find_enrollment(p.id, c.id).await.unwrap().is_none());

        let first = store
            .upsert_enrollment(NewEnrollment {
                participant_id: p.id,
                course_id: c.id,
                role: None,
                import_job_id: Some(1),
            })
            .await
            .unwrap();
        let second = store
            .upsert_enrollment(NewEnrollment {
                participant_id: p.id,
                course_id: c.id,
                role: Some("oyente".to_string()),
                import_job_id: Some(2),
            })
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.role.as_deref(), Some("oyente"));
        assert_eq!(second.import_job_id, Some(2));
        assert_eq!(store.list_enrollments(c.id).await.unwrap().len(), 1);
    }

    // ============================================================================
    // Import jobs and documents
    // ============================================================================

    #[tokio::test]
    async fn test_import_job_lifecycle() {
        let test_db = TestDb::new().await;
        let store = &test_db.store;

        let job = store
            .create_import_job(NewImportJob {
                total_rows: 3,
                created_by: Some("u-1".to_string()),
            })
            .await
            .unwrap();
        assert_eq!(job.status, ImportStatus::Processing);
        assert_eq!(job.kind, PARTICIPANT_IMPORT_KIND);
        assert!(job.completed_at.is_none());

        let done = store
            .finish_import_job(
                job.id,
                ImportCompletion {
                    status: ImportStatus::Completed,
                    processed_rows: 3,
                    success_count: 2,
                    failure_count: 1,
                    error_message: Some("Fila 3: boom".to_string()),
                    provider_id: Some(4),
                    course_id: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(done.status, ImportStatus::Completed);
        assert_eq!(done.provider_id, Some(4));
        assert!(done.completed_at.is_some());

        let listed = store.list_import_jobs().await.unwrap();
        assert_eq!(listed, vec![done]);
    }

    #[tokio::test]
    async fn test_document_metadata_and_link() {
        let test_db = TestDb::new().await;
        let store = &test_db.store;

        let doc = store
            .create_document(NewDocument {
                import_job_id: Some(7),
                file_name: "p.csv".to_string(),
                checksum: "abc".to_string(),
                size_bytes: 12,
                mime_type: "text/csv".to_string(),
                metadata: json!({ "rowCount": 2 }),
            })
            .await
            .unwrap();

        store.link_document(doc.id, Some(1), Some(2)).await.unwrap();

        let loaded = store.get_document_for_job(7).await.unwrap().unwrap();
        assert_eq!(loaded.metadata["rowCount"], 2);
        assert_eq!(loaded.provider_id, Some(1));
        assert_eq!(loaded.course_id, Some(2));
    }

    // ============================================================================
    // Attendance and grades
    // ============================================================================

    #[tokio::test]
    async fn test_attendance_and_grades_upsert() {
        let test_db = TestDb::new().await;
        let store = &test_db.store;
        let c = course(store, "CUR-005").await;
        let p = participant(store, "c@x.com").await;
        let enrollment = store
            .upsert_enrollment(NewEnrollment {
                participant_id: p.id,
                course_id: c.id,
                role: None,
                import_job_id: None,
            })
            .await
            .unwrap();

        let date = NaiveDate::from_ymd_opt(2025, 3, 4).unwrap();
        for present in [false, true] {
            store
                .upsert_attendance(NewAttendance {
                    enrollment_id: enrollment.id,
                    session_date: date,
                    present,
                    recorded_by: "u-1".to_string(),
                })
                .await
                .unwrap();
        }
        let attendance = store.list_attendance(c.id).await.unwrap();
        assert_eq!(attendance.len(), 1);
        assert!(attendance[0].present);
        assert_eq!(attendance[0].session_date, date);

        for score in [40.0, 75.5] {
            store
                .upsert_grade(NewGrade {
                    enrollment_id: enrollment.id,
                    score,
                    recorded_by: "u-1".to_string(),
                })
                .await
                .unwrap();
        }
        let grades = store.list_grades(c.id).await.unwrap();
        assert_eq!(grades.len(), 1);
        assert_eq!(grades[0].score, 75.5);

        let other = course(store, "CUR-006").await;
        assert!(store.list_grades(other.id).await.unwrap().is_empty());
    }

    // ============================================================================
    // Job executions
    // ============================================================================

    #[tokio::test]
    async fn test_job_execution_log() {
        let test_db = TestDb::new().await;
        let store = &test_db.store;

        let id = store
            .start_job_execution("cleanup_expired_refresh_tokens")
            .await
            .unwrap();
        store
            .complete_job_execution(id, true, None, Some(5))
            .await
            .unwrap();

        let runs = store.list_job_executions(10).await.unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].success, Some(true));
        assert_eq!(runs[0].records_processed, Some(5));
    }
}
