use super::upserter::RowOutcome;
use super::ImportSummary;
use crate::errors::StoreError;
use crate::storage::{ImportCompletion, ImportJob, ImportStatus, NewImportJob, Store};
use std::collections::BTreeSet;

/// Counters and associations for one import job, persisted once at the end.
pub struct JobTracker<'a> {
    store: &'a dyn Store,
    job_id: i64,
    total: usize,
    created: u64,
    updated: u64,
    errors: Vec<String>,
    providers: BTreeSet<i64>,
    courses: BTreeSet<i64>,
    document_id: Option<i64>,
}

fn single(ids: &BTreeSet<i64>) -> Option<i64> {
    match ids.len() {
        1 => ids.iter().next().copied(),
        _ => None,
    }
}

impl<'a> JobTracker<'a> {
    /// Create the job in PROCESSING.
    pub async fn start(
        store: &'a dyn Store,
        total: usize,
        created_by: Option<String>,
    ) -> Result<JobTracker<'a>, StoreError> {
        let job = store
            .create_import_job(NewImportJob {
                total_rows: total as i64,
                created_by,
            })
            .await?;
        tracing::info!(import_job_id = job.id, total_rows = total, "Import job started");

        Ok(Self {
            store,
            job_id: job.id,
            total,
            created: 0,
            updated: 0,
            errors: Vec::new(),
            providers: BTreeSet::new(),
            courses: BTreeSet::new(),
            document_id: None,
        })
    }

    pub fn job_id(&self) -> i64 {
        self.job_id
    }

    pub fn attach_document(&mut self, document_id: i64) {
        self.document_id = Some(document_id);
    }

    pub fn record_success(&mut self, outcome: RowOutcome, provider_id: i64, course_id: i64) {
        match outcome {
            RowOutcome::Created => self.created += 1,
            RowOutcome::Updated => self.updated += 1,
        }
        self.providers.insert(provider_id);
        self.courses.insert(course_id);
    }

    pub fn record_failure(&mut self, message: String) {
        self.errors.push(message);
    }

    fn succeeded(&self) -> i64 {
        (self.created + self.updated) as i64
    }

    /// COMPLETED, whether or not individual rows failed.
    pub async fn complete(&self) -> Result<ImportJob, StoreError> {
        let failures = self.errors.len() as i64;
        let completion = ImportCompletion {
            status: ImportStatus::Completed,
            processed_rows: self.succeeded() + failures,
            success_count: self.succeeded(),
            failure_count: failures,
            error_message: (!self.errors.is_empty()).then(|| self.errors.join("\n")),
            provider_id: single(&self.providers),
            course_id: single(&self.courses),
        };
        self.finish(completion).await
    }

    /// FAILED; the fatal error counts as one extra failure.
    pub async fn fail(&self, message: &str) -> Result<ImportJob, StoreError> {
        let failures = self.errors.len() as i64 + 1;
        let completion = ImportCompletion {
            status: ImportStatus::Failed,
            processed_rows: self.succeeded() + failures,
            success_count: self.succeeded(),
            failure_count: failures,
            error_message: Some(message.to_string()),
            provider_id: single(&self.providers),
            course_id: single(&self.courses),
        };
        self.finish(completion).await
    }

    async fn finish(&self, completion: ImportCompletion) -> Result<ImportJob, StoreError> {
        let (provider_id, course_id) = (completion.provider_id, completion.course_id);
        let job = self.store.finish_import_job(self.job_id, completion).await?;
        if let Some(document_id) = self.document_id {
            self.store
                .link_document(document_id, provider_id, course_id)
                .await?;
        }
        tracing::info!(
            import_job_id = job.id,
            status = %job.status,
            success = job.success_count,
            failure = job.failure_count,
            "Import job finished"
        );
        Ok(job)
    }

    pub fn summary(&self, error: Option<String>) -> ImportSummary {
        ImportSummary {
            created: self.created,
            updated: self.updated,
            errors: self.errors.clone(),
            total: self.total,
            import_job_id: self.job_id,
            error,
        }
    }
}
