use super::resolver::ResolvedRow;
use super::RowError;
use crate::storage::{NewEnrollment, NewParticipant, Store};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowOutcome {
    Created,
    Updated,
}

pub fn display_name(first_name: &str, last_name: Option<&str>) -> String {
    let first = first_name.trim();
    match last_name.map(str::trim).filter(|l| !l.is_empty()) {
        Some(last) => format!("{first} {last}"),
        None => first.to_string(),
    }
}

/// Upsert the participant and its enrollment in the resolved course.
///
/// Created/updated is decided by reading the enrollment before writing it.
/// The read and the write are separate statements, so concurrent imports of
/// the same pair can miscount; the stored row is still last-write-wins.
pub async fn upsert_row(
    store: &dyn Store,
    row: &ResolvedRow,
    import_job_id: i64,
) -> Result<RowOutcome, RowError> {
    let participant = store
        .upsert_participant(NewParticipant {
            email: row.email.clone(),
            name: display_name(&row.first_name, row.last_name.as_deref()),
            provider_id: Some(row.provider.id),
        })
        .await?;

    let existing = store.find_enrollment(participant.id, row.course.id).await?;

    store
        .upsert_enrollment(NewEnrollment {
            participant_id: participant.id,
            course_id: row.course.id,
            role: row.role.clone(),
            import_job_id: Some(import_job_id),
        })
        .await?;

    Ok(if existing.is_some() {
        RowOutcome::Updated
    } else {
        RowOutcome::Created
    })
}
