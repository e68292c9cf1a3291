use super::{
    Attendance, Course, CourseUpdate, Document, Enrollment, Grade, ImportCompletion, ImportJob,
    ImportStatus, JobExecution, NewAttendance, NewCourse, NewDocument, NewEnrollment, NewGrade,
    NewImportJob, NewParticipant, NewUser, Participant, Provider, RefreshToken, Store, User,
    PARTICIPANT_IMPORT_KIND,
};
use crate::errors::StoreError;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::Mutex;

#[derive(Default)]
struct Tables {
    next_id: i64,
    users: Vec<User>,
    refresh_tokens: HashMap<String, RefreshToken>,
    providers: Vec<Provider>,
    courses: Vec<Course>,
    participants: Vec<Participant>,
    enrollments: Vec<Enrollment>,
    import_jobs: Vec<ImportJob>,
    documents: Vec<Document>,
    attendance: Vec<Attendance>,
    grades: Vec<Grade>,
    job_executions: Vec<JobExecution>,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn enrollment_ids(&self, course_id: i64) -> Vec<i64> {
        self.enrollments
            .iter()
            .filter(|e| e.course_id == course_id)
            .map(|e| e.id)
            .collect()
    }
}

/// In-memory [`Store`]. Nothing survives a restart.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store seeded with the demo catalogue: two providers and three courses.
    pub fn with_fixtures() -> Self {
        let mut tables = Tables::default();
        let now = Utc::now().timestamp();

        for name in ["Formación Norte", "Formación Sur"] {
            let id = tables.next_id();
            tables.providers.push(Provider {
                id,
                name: name.to_string(),
                created_at: now,
            });
        }
        let north = tables.providers[0].id;
        let south = tables.providers[1].id;

        for (code, name, provider_id) in [
            ("CUR-001", "Prevención de riesgos laborales", north),
            ("CUR-002", "Atención al cliente", north),
            ("CUR-003", "Ofimática avanzada", south),
        ] {
            let id = tables.next_id();
            tables.courses.push(Course {
                id,
                code: code.to_string(),
                name: name.to_string(),
                provider_id: Some(provider_id),
                instructor_id: None,
                created_at: now,
            });
        }

        Self {
            tables: Mutex::new(tables),
        }
    }
}

fn not_found(what: impl Into<String>) -> StoreError {
    StoreError::NotFound(what.into())
}

#[async_trait]
impl Store for MemoryStore {
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn create_user(&self, user: NewUser) -> Result<User, StoreError> {
        let mut t = self.tables.lock().await;
        if t.users.iter().any(|u| u.username == user.username) {
            return Err(StoreError::Conflict(format!("username {}", user.username)));
        }
        let user = User {
            id: user.id,
            username: user.username,
            password_hash: user.password_hash,
            role: user.role,
            email: user.email,
            enabled: true,
            created_at: Utc::now().timestamp(),
        };
        t.users.push(user.clone());
        Ok(user)
    }

    async fn get_user(&self, id: &str) -> Result<Option<User>, StoreError> {
        let t = self.tables.lock().await;
        Ok(t.users.iter().find(|u| u.id == id).cloned())
    }

    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let t = self.tables.lock().await;
        Ok(t.users.iter().find(|u| u.username == username).cloned())
    }

    async fn insert_refresh_token(&self, token: RefreshToken) -> Result<(), StoreError> {
        let mut t = self.tables.lock().await;
        if t.refresh_tokens.contains_key(&token.token) {
            return Err(StoreError::Conflict("refresh token".to_string()));
        }
        t.refresh_tokens.insert(token.token.clone(), token);
        Ok(())
    }

    async fn get_refresh_token(&self, token: &str) -> Result<Option<RefreshToken>, StoreError> {
        let t = self.tables.lock().await;
        let now = Utc::now().timestamp();
        Ok(t.refresh_tokens
            .get(token)
            .filter(|rt| !rt.revoked && now <= rt.expires_at)
            .cloned())
    }

    async fn revoke_refresh_token(&self, token: &str) -> Result<(), StoreError> {
        let mut t = self.tables.lock().await;
        if let Some(rt) = t.refresh_tokens.get_mut(token) {
            rt.revoked = true;
        }
        Ok(())
    }

    async fn consume_refresh_token(
        &self,
        token: &str,
    ) -> Result<Option<RefreshToken>, StoreError> {
        let mut t = self.tables.lock().await;
        let now = Utc::now().timestamp();
        match t.refresh_tokens.get_mut(token) {
            Some(rt) if !rt.revoked && now <= rt.expires_at => {
                rt.revoked = true;
                Ok(Some(rt.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn cleanup_expired_refresh_tokens(&self) -> Result<u64, StoreError> {
        let mut t = self.tables.lock().await;
        let now = Utc::now().timestamp();
        let before = t.refresh_tokens.len();
        t.refresh_tokens.retain(|_, rt| rt.expires_at >= now);
        Ok((before - t.refresh_tokens.len()) as u64)
    }

    async fn upsert_provider(&self, name: &str) -> Result<Provider, StoreError> {
        let mut t = self.tables.lock().await;
        if let Some(existing) = t.providers.iter().find(|p| p.name == name) {
            return Ok(existing.clone());
        }
        let provider = Provider {
            id: t.next_id(),
            name: name.to_string(),
            created_at: Utc::now().timestamp(),
        };
        t.providers.push(provider.clone());
        Ok(provider)
    }

    async fn get_provider(&self, id: i64) -> Result<Option<Provider>, StoreError> {
        let t = self.tables.lock().await;
        Ok(t.providers.iter().find(|p| p.id == id).cloned())
    }

    async fn list_providers(&self) -> Result<Vec<Provider>, StoreError> {
        let t = self.tables.lock().await;
        let mut providers = t.providers.clone();
        providers.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(providers)
    }

    async fn create_course(&self, course: NewCourse) -> Result<Course, StoreError> {
        let mut t = self.tables.lock().await;
        if t.courses.iter().any(|c| c.code == course.code) {
            return Err(StoreError::Conflict(format!("course code {}", course.code)));
        }
        let course = Course {
            id: t.next_id(),
            code: course.code,
            name: course.name,
            provider_id: course.provider_id,
            instructor_id: course.instructor_id,
            created_at: Utc::now().timestamp(),
        };
        t.courses.push(course.clone());
        Ok(course)
    }

    async fn get_course(&self, id: i64) -> Result<Option<Course>, StoreError> {
        let t = self.tables.lock().await;
        Ok(t.courses.iter().find(|c| c.id == id).cloned())
    }

    async fn find_course_by_code(&self, code: &str) -> Result<Option<Course>, StoreError> {
        let t = self.tables.lock().await;
        Ok(t.courses.iter().find(|c| c.code == code).cloned())
    }

    async fn list_courses(&self) -> Result<Vec<Course>, StoreError> {
        let t = self.tables.lock().await;
        let mut courses = t.courses.clone();
        courses.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(courses)
    }

    async fn update_course(&self, id: i64, update: CourseUpdate) -> Result<Course, StoreError> {
        let mut t = self.tables.lock().await;
        let course = t
            .courses
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| not_found(format!("course {id}")))?;
        course.name = update.name;
        course.provider_id = update.provider_id;
        course.instructor_id = update.instructor_id;
        Ok(course.clone())
    }

    async fn delete_course(&self, id: i64) -> Result<(), StoreError> {
        let mut t = self.tables.lock().await;
        let enrolled = t.enrollments.iter().filter(|e| e.course_id == id).count();
        if enrolled > 0 {
            return Err(StoreError::Conflict(format!(
                "course {id} still has {enrolled} enrollments"
            )));
        }
        let before = t.courses.len();
        t.courses.retain(|c| c.id != id);
        if t.courses.len() == before {
            return Err(not_found(format!("course {id}")));
        }
        Ok(())
    }

    async fn upsert_participant(
        &self,
        participant: NewParticipant,
    ) -> Result<Participant, StoreError> {
        let mut t = self.tables.lock().await;
        let now = Utc::now().timestamp();
        if let Some(existing) = t
            .participants
            .iter_mut()
            .find(|p| p.email == participant.email)
        {
            existing.name = participant.name;
            existing.provider_id = participant.provider_id;
            existing.updated_at = now;
            return Ok(existing.clone());
        }
        let created = Participant {
            id: t.next_id(),
            email: participant.email,
            name: participant.name,
            provider_id: participant.provider_id,
            created_at: now,
            updated_at: now,
        };
        t.participants.push(created.clone());
        Ok(created)
    }

    async fn get_participant(&self, id: i64) -> Result<Option<Participant>, StoreError> {
        let t = self.tables.lock().await;
        Ok(t.participants.iter().find(|p| p.id == id).cloned())
    }

    async fn find_enrollment(
        &self,
        participant_id: i64,
        course_id: i64,
    ) -> Result<Option<Enrollment>, StoreError> {
        let t = self.tables.lock().await;
        Ok(t.enrollments
            .iter()
            .find(|e| e.participant_id == participant_id && e.course_id == course_id)
            .cloned())
    }

    async fn upsert_enrollment(&self, enrollment: NewEnrollment) -> Result<Enrollment, StoreError> {
        let mut t = self.tables.lock().await;
        let now = Utc::now().timestamp();
        if let Some(existing) = t.enrollments.iter_mut().find(|e| {
            e.participant_id == enrollment.participant_id && e.course_id == enrollment.course_id
        }) {
            existing.role = enrollment.role;
            existing.import_job_id = enrollment.import_job_id;
            existing.updated_at = now;
            return Ok(existing.clone());
        }
        let created = Enrollment {
            id: t.next_id(),
            participant_id: enrollment.participant_id,
            course_id: enrollment.course_id,
            role: enrollment.role,
            import_job_id: enrollment.import_job_id,
            created_at: now,
            updated_at: now,
        };
        t.enrollments.push(created.clone());
        Ok(created)
    }

    async fn list_enrollments(&self, course_id: i64) -> Result<Vec<Enrollment>, StoreError> {
        let t = self.tables.lock().await;
        Ok(t.enrollments
            .iter()
            .filter(|e| e.course_id == course_id)
            .cloned()
            .collect())
    }

    async fn create_import_job(&self, job: NewImportJob) -> Result<ImportJob, StoreError> {
        let mut t = self.tables.lock().await;
        let job = ImportJob {
            id: t.next_id(),
            kind: PARTICIPANT_IMPORT_KIND.to_string(),
            status: ImportStatus::Processing,
            provider_id: None,
            course_id: None,
            total_rows: job.total_rows,
            processed_rows: 0,
            success_count: 0,
            failure_count: 0,
            error_message: None,
            created_by: job.created_by,
            started_at: Utc::now().timestamp(),
            completed_at: None,
        };
        t.import_jobs.push(job.clone());
        Ok(job)
    }

    async fn finish_import_job(
        &self,
        id: i64,
        completion: ImportCompletion,
    ) -> Result<ImportJob, StoreError> {
        let mut t = self.tables.lock().await;
        let job = t
            .import_jobs
            .iter_mut()
            .find(|j| j.id == id)
            .ok_or_else(|| not_found(format!("import job {id}")))?;
        job.status = completion.status;
        job.processed_rows = completion.processed_rows;
        job.success_count = completion.success_count;
        job.failure_count = completion.failure_count;
        job.error_message = completion.error_message;
        job.provider_id = completion.provider_id;
        job.course_id = completion.course_id;
        job.completed_at = Some(Utc::now().timestamp());
        Ok(job.clone())
    }

    async fn get_import_job(&self, id: i64) -> Result<Option<ImportJob>, StoreError> {
        let t = self.tables.lock().await;
        Ok(t.import_jobs.iter().find(|j| j.id == id).cloned())
    }

    async fn list_import_jobs(&self) -> Result<Vec<ImportJob>, StoreError> {
        let t = self.tables.lock().await;
        Ok(t.import_jobs.iter().rev().cloned().collect())
    }

    async fn create_document(&self, document: NewDocument) -> Result<Document, StoreError> {
        let mut t = self.tables.lock().await;
        let document = Document {
            id: t.next_id(),
            import_job_id: document.import_job_id,
            file_name: document.file_name,
            checksum: document.checksum,
            size_bytes: document.size_bytes,
            mime_type: document.mime_type,
            metadata: document.metadata,
            provider_id: None,
            course_id: None,
            created_at: Utc::now().timestamp(),
        };
        t.documents.push(document.clone());
        Ok(document)
    }

    async fn link_document(
        &self,
        id: i64,
        provider_id: Option<i64>,
        course_id: Option<i64>,
    ) -> Result<(), StoreError> {
        let mut t = self.tables.lock().await;
        let document = t
            .documents
            .iter_mut()
            .find(|d| d.id == id)
            .ok_or_else(|| not_found(format!("document {id}")))?;
        document.provider_id = provider_id;
        document.course_id = course_id;
        Ok(())
    }

    async fn get_document_for_job(
        &self,
        import_job_id: i64,
    ) -> Result<Option<Document>, StoreError> {
        let t = self.tables.lock().await;
        Ok(t.documents
            .iter()
            .find(|d| d.import_job_id == Some(import_job_id))
            .cloned())
    }

    async fn upsert_attendance(&self, record: NewAttendance) -> Result<Attendance, StoreError> {
        let mut t = self.tables.lock().await;
        let now = Utc::now().timestamp();
        if let Some(existing) = t.attendance.iter_mut().find(|a| {
            a.enrollment_id == record.enrollment_id && a.session_date == record.session_date
        }) {
            existing.present = record.present;
            existing.recorded_by = record.recorded_by;
            existing.recorded_at = now;
            return Ok(existing.clone());
        }
        let created = Attendance {
            id: t.next_id(),
            enrollment_id: record.enrollment_id,
            session_date: record.session_date,
            present: record.present,
            recorded_by: record.recorded_by,
            recorded_at: now,
        };
        t.attendance.push(created.clone());
        Ok(created)
    }

    async fn list_attendance(&self, course_id: i64) -> Result<Vec<Attendance>, StoreError> {
        let t = self.tables.lock().await;
        let ids = t.enrollment_ids(course_id);
        let mut records: Vec<Attendance> = t
            .attendance
            .iter()
            .filter(|a| ids.contains(&a.enrollment_id))
            .cloned()
            .collect();
        records.sort_by_key(|a| (a.session_date, a.enrollment_id));
        Ok(records)
    }

    async fn upsert_grade(&self, grade: NewGrade) -> Result<Grade, StoreError> {
        let mut t = self.tables.lock().await;
        let now = Utc::now().timestamp();
        if let Some(existing) = t
            .grades
            .iter_mut()
            .find(|g| g.enrollment_id == grade.enrollment_id)
        {
            existing.score = grade.score;
            existing.recorded_by = grade.recorded_by;
            existing.recorded_at = now;
            return Ok(existing.clone());
        }
        let created = Grade {
            id: t.next_id(),
            enrollment_id: grade.enrollment_id,
            score: grade.score,
            recorded_by: grade.recorded_by,
            recorded_at: now,
        };
        t.grades.push(created.clone());
        Ok(created)
    }

    async fn list_grades(&self, course_id: i64) -> Result<Vec<Grade>, StoreError> {
        let t = self.tables.lock().await;
        let ids = t.enrollment_ids(course_id);
        Ok(t.grades
            .iter()
            .filter(|g| ids.contains(&g.enrollment_id))
            .cloned()
            .collect())
    }

    async fn start_job_execution(&self, job_name: &str) -> Result<i64, StoreError> {
        let mut t = self.tables.lock().await;
        let id = t.next_id();
        t.job_executions.push(JobExecution {
            id,
            job_name: job_name.to_string(),
            started_at: Utc::now().timestamp(),
            completed_at: None,
            success: None,
            error_message: None,
            records_processed: None,
        });
        Ok(id)
    }

    async fn complete_job_execution(
        &self,
        id: i64,
        success: bool,
        error_message: Option<String>,
        records_processed: Option<i64>,
    ) -> Result<(), StoreError> {
        let mut t = self.tables.lock().await;
        if let Some(run) = t.job_executions.iter_mut().find(|r| r.id == id) {
            run.completed_at = Some(Utc::now().timestamp());
            run.success = Some(success);
            run.error_message = error_message;
            run.records_processed = records_processed;
        }
        Ok(())
    }

    async fn list_job_executions(&self, limit: u64) -> Result<Vec<JobExecution>, StoreError> {
        let t = self.tables.lock().await;
        Ok(t.job_executions
            .iter()
            .rev()
            .take(limit as usize)
            .cloned()
            .collect())
    }
}
