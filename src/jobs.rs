use crate::errors::{CampusError, StoreError};
use crate::storage::Store;
use std::sync::Arc;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

pub const CLEANUP_REFRESH_TOKENS: &str = "cleanup_expired_refresh_tokens";

/// Jobs that can be run by name, with their cron schedule.
pub const JOBS: [(&str, &str); 1] = [(CLEANUP_REFRESH_TOKENS, "0 30 * * * *")];

pub fn is_known_job(name: &str) -> bool {
    JOBS.iter().any(|(n, _)| *n == name)
}

async fn run_job(store: &dyn Store, job_name: &str) -> Result<u64, StoreError> {
    match job_name {
        CLEANUP_REFRESH_TOKENS => store.cleanup_expired_refresh_tokens().await,
        other => Err(StoreError::NotFound(format!("job {other}"))),
    }
}

/// Run one job and record it in the execution log.
///
/// A failed run is logged, not returned; only failing to write the log is an error.
pub async fn execute(store: &dyn Store, job_name: &str) -> Result<(), StoreError> {
    let execution_id = store.start_job_execution(job_name).await?;

    match run_job(store, job_name).await {
        Ok(count) => {
            info!(job = job_name, records = count, "Job completed");
            store
                .complete_job_execution(execution_id, true, None, Some(count as i64))
                .await
        }
        Err(e) => {
            error!(job = job_name, error = %e, "Job failed");
            store
                .complete_job_execution(execution_id, false, Some(e.to_string()), None)
                .await
        }
    }
}

/// Initialize and start the job scheduler with all background tasks
pub async fn init_scheduler(store: Arc<dyn Store>) -> Result<JobScheduler, CampusError> {
    let sched = JobScheduler::new()
        .await
        .map_err(|e| CampusError::Other(format!("Failed to create job scheduler: {}", e)))?;

    for (name, schedule) in JOBS {
        let store = store.clone();
        let job = Job::new_async(schedule, move |_uuid, _l| {
            let store = store.clone();
            Box::pin(async move {
                info!("Running {} job", name);
                if let Err(e) = execute(store.as_ref(), name).await {
                    error!(job = name, error = %e, "Could not record job execution");
                }
            })
        })
        .map_err(|e| CampusError::Other(format!("Failed to create {} job: {}", name, e)))?;

        sched
            .add(job)
            .await
            .map_err(|e| CampusError::Other(format!("Failed to add {} job: {}", name, e)))?;
    }

    sched
        .start()
        .await
        .map_err(|e| CampusError::Other(format!("Failed to start job scheduler: {}", e)))?;

    info!("Job scheduler started with {} jobs", JOBS.len());

    Ok(sched)
}

/// Manually trigger a job by name (admin API)
pub async fn trigger_job_manually(store: &dyn Store, job_name: &str) -> Result<(), StoreError> {
    if !is_known_job(job_name) {
        return Err(StoreError::NotFound(format!("job {job_name}")));
    }
    info!("Manually triggering job: {}", job_name);
    execute(store, job_name).await
}
