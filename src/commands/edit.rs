use std::path::Path;

use anyhow::Context;

use crate::commands::{build_orchestrator, load_config};
use crate::core::Store;

pub struct EditOptions {
    pub job_id: String,
    pub request: String,
    /// Optional paths the change should be limited to.
    pub scope: Vec<String>,
}

/// Rework a completed job's output from a change request.
pub async fn edit_job(project_root: &Path, options: EditOptions) -> anyhow::Result<()> {
    let config = load_config(project_root)?;
    let orchestrator = build_orchestrator(project_root, config)?;

    let before = orchestrator
        .store()
        .get_job(&options.job_id)
        .context("failed to read job")?
        .and_then(|j| j.files)
        .unwrap_or_default();

    let updated = orchestrator
        .edit(&options.job_id, &options.request, &options.scope)
        .await?;

    let changed = updated.changed_paths(&before);
    println!("Edited job {} ({} files stored)", options.job_id, updated.len());
    if changed.is_empty() {
        println!("No files changed.");
    } else {
        println!("Changed:");
        for path in changed {
            println!("  {}", path);
        }
    }
    Ok(())
}
