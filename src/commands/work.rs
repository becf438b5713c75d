use std::path::Path;
use std::sync::Arc;

use futures::StreamExt;
use tracing::info;

use crate::commands::{build_orchestrator, load_config};
use crate::models::JobStatus;

pub struct WorkOptions {
    /// Run one specific job instead of sweeping all pending jobs.
    pub job_id: Option<String>,
    /// Concurrent jobs in a sweep (0 = unlimited).
    pub max_concurrent: usize,
    /// Provider base URL override.
    pub url: Option<String>,
    /// Provider timeout override in seconds.
    pub timeout: Option<u64>,
}

/// Claim and run pending jobs. Everything a job needs is read back from its
/// persisted record, so the sweep takes no per-job parameters and it is safe
/// to run several workers against the same store.
pub async fn run_worker(project_root: &Path, options: WorkOptions) -> anyhow::Result<()> {
    let config = load_config(project_root)?.with_overrides(options.url.clone(), options.timeout);
    let orchestrator = Arc::new(build_orchestrator(project_root, config)?);

    let jobs = match &options.job_id {
        Some(id) => vec![id.clone()],
        None => orchestrator
            .store()
            .list_jobs(Some(JobStatus::Pending))?
            .into_iter()
            .map(|j| j.id)
            .collect(),
    };

    if jobs.is_empty() {
        println!("No pending jobs.");
        return Ok(());
    }
    info!("Running {} job(s)", jobs.len());

    let limit = match options.max_concurrent {
        0 => None,
        n => Some(n),
    };

    let mut completed = 0usize;
    let mut failed = 0usize;
    let mut skipped = 0usize;

    let outcomes: Vec<_> = futures::stream::iter(jobs)
        .map(|id| {
            let orchestrator = orchestrator.clone();
            async move { orchestrator.run(&id).await }
        })
        .buffer_unordered(limit.unwrap_or(usize::MAX))
        .collect()
        .await;

    for outcome in outcomes {
        match outcome {
            Ok(job) => match job.status {
                JobStatus::Completed => {
                    completed += 1;
                    println!(
                        "✓ {} completed ({} files)",
                        job.id,
                        job.files.as_ref().map_or(0, |f| f.len())
                    );
                }
                JobStatus::Failed => {
                    failed += 1;
                    println!(
                        "✗ {} failed: {}",
                        job.id,
                        job.error.as_deref().unwrap_or("unknown error")
                    );
                }
                _ => {
                    skipped += 1;
                    println!("- {} skipped ({:?})", job.id, job.status);
                }
            },
            Err(e) => {
                failed += 1;
                eprintln!("✗ worker error: {}", e);
            }
        }
    }

    println!();
    println!("{} completed, {} failed, {} skipped", completed, failed, skipped);
    Ok(())
}
