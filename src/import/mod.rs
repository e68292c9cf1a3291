//! Participant-enrollment import.
//!
//! One upload is processed as a single sequential pass: parse the file,
//! open an import job, then resolve and upsert each row in order. A row that
//! fails validation or references something missing is recorded and
//! skipped, including storage errors caused by that row's data. Only an
//! unreachable store ends the pass early and marks the job FAILED.
pub mod parser;
pub mod resolver;
pub mod template;
pub mod tracker;
pub mod upserter;

use crate::errors::StoreError;
use crate::storage::{NewDocument, Store};
use parser::{ImportRow, ParseError};
use serde::Serialize;
use serde_json::json;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracker::JobTracker;
use upserter::RowOutcome;

#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub created: u64,
    pub updated: u64,
    pub errors: Vec<String>,
    pub total: usize,
    pub import_job_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ImportReport {
    pub summary: ImportSummary,
    /// The pass was aborted and the job is FAILED.
    pub fatal: bool,
}

/// Failures before any job exists.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("could not read the uploaded file: {0}")]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Why a single row was not imported.
#[derive(Debug, Error)]
pub enum RowError {
    #[error("Faltan datos obligatorios ({})", .0.join(", "))]
    MissingFields(Vec<&'static str>),
    #[error("Curso {0} no existe")]
    UnknownCourse(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl RowError {
    /// Whether the error is about the store as a whole rather than this row.
    pub fn is_fatal(&self) -> bool {
        matches!(self, RowError::Store(e) if e.is_fatal())
    }
}

async fn import_row(
    store: &dyn Store,
    row: &ImportRow,
    import_job_id: i64,
) -> Result<(RowOutcome, i64, i64), RowError> {
    let resolved = resolver::resolve(store, row).await?;
    let outcome = upserter::upsert_row(store, &resolved, import_job_id).await?;
    Ok((outcome, resolved.provider.id, resolved.course.id))
}

async fn process(
    store: &dyn Store,
    tracker: &mut JobTracker<'_>,
    file: &UploadedFile,
    rows: &[ImportRow],
) -> Result<(), StoreError> {
    let document = store
        .create_document(NewDocument {
            import_job_id: Some(tracker.job_id()),
            file_name: file.file_name.clone(),
            checksum: format!("{:x}", Sha256::digest(&file.bytes)),
            size_bytes: file.bytes.len() as i64,
            mime_type: file.mime_type.clone(),
            metadata: json!({ "rowCount": rows.len() }),
        })
        .await?;
    tracker.attach_document(document.id);

    for (idx, row) in rows.iter().enumerate() {
        match import_row(store, row, tracker.job_id()).await {
            Ok((outcome, provider_id, course_id)) => {
                tracker.record_success(outcome, provider_id, course_id)
            }
            Err(RowError::Store(e)) if e.is_fatal() => return Err(e),
            Err(e) => {
                tracing::debug!(import_job_id = tracker.job_id(), row = idx + 1, error = %e, "Row rejected");
                tracker.record_failure(format!("Fila {}: {}", idx + 1, e));
            }
        }
    }
    Ok(())
}

/// Import every row of `file`.
///
/// Returns `Err` only when nothing was started: the file could not be parsed
/// or the job could not be created. Once the job exists the outcome is
/// always a report, with `fatal` set when the pass was aborted.
pub async fn run_import(
    store: &dyn Store,
    file: &UploadedFile,
    created_by: Option<String>,
) -> Result<ImportReport, ImportError> {
    let rows = parser::parse_rows(&file.bytes, &file.mime_type, &file.file_name)?;
    let mut tracker = JobTracker::start(store, rows.len(), created_by).await?;

    let outcome = match process(store, &mut tracker, file, &rows).await {
        Ok(()) => tracker.complete().await.map(|_| ()),
        Err(e) => Err(e),
    };

    match outcome {
        Ok(()) => Ok(ImportReport {
            summary: tracker.summary(None),
            fatal: false,
        }),
        Err(e) => {
            let message = e.to_string();
            tracing::error!(import_job_id = tracker.job_id(), error = %message, "Import aborted");
            if let Err(persist) = tracker.fail(&message).await {
                tracing::error!(
                    import_job_id = tracker.job_id(),
                    error = %persist,
                    "Could not mark import job as failed"
                );
            }
            Ok(ImportReport {
                summary: tracker.summary(Some(message)),
                fatal: true,
            })
        }
    }
}
