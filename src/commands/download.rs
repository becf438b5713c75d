use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};

use crate::commands::{load_config, open_store};
use crate::core::Store;
use crate::error::SiteForgeError;
use crate::models::JobStatus;

/// Write a job's stored archive to disk.
pub fn download_archive(project_root: &Path, job_id: &str, out: &PathBuf) -> anyhow::Result<()> {
    let config = load_config(project_root)?;
    let store = open_store(project_root, &config)?;

    let job = store
        .get_job(job_id)?
        .ok_or_else(|| SiteForgeError::JobNotFound(job_id.to_string()))?;
    if job.status != JobStatus::Completed {
        bail!("job {} is {:?}, nothing to download", job_id, job.status);
    }

    let Some(bytes) = store.load_archive(job_id)? else {
        bail!("archive for job {} is no longer stored", job_id);
    };

    fs::write(out, &bytes).with_context(|| format!("failed to write {}", out.display()))?;
    println!("Wrote {} ({} bytes)", out.display(), bytes.len());
    Ok(())
}
