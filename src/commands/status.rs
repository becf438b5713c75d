use std::path::Path;

use crate::commands::{load_config, open_store};
use crate::core::Store;
use crate::error::SiteForgeError;
use crate::models::GenerationJob;

/// Show one job in detail, or all jobs one line each. Polling this is how
/// callers learn a job's outcome; `work` itself reports only to the console
/// that invoked it.
pub fn show_status(project_root: &Path, job_id: Option<&str>, verbose: bool) -> anyhow::Result<()> {
    let config = load_config(project_root)?;
    let store = open_store(project_root, &config)?;

    match job_id {
        Some(id) => {
            let job = store
                .get_job(id)?
                .ok_or_else(|| SiteForgeError::JobNotFound(id.to_string()))?;
            print_job(&job, verbose);
        }
        None => {
            let mut jobs = store.list_jobs(None)?;
            if jobs.is_empty() {
                println!("No jobs.");
                return Ok(());
            }
            jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at));
            for job in &jobs {
                println!(
                    "{}  {:<10}  {:>6}c  {}",
                    job.id,
                    format!("{:?}", job.status).to_lowercase(),
                    job.reserved_cents,
                    truncate(&job.prompt, 60)
                );
            }
        }
    }
    Ok(())
}

fn print_job(job: &GenerationJob, verbose: bool) {
    println!("Job:       {}", job.id);
    println!("Status:    {:?}", job.status);
    println!("Team:      {}", job.team_id);
    println!("Owner:     {}", job.owner_id);
    println!("Tier:      {}", job.tier.as_str());
    println!("Kind:      {:?}", job.output_kind);
    println!("Reserved:  {}c", job.reserved_cents);
    println!("Cost:      {}c", job.realized_cost_cents);
    println!("Created:   {}", job.created_at.to_rfc3339());
    if let Some(at) = job.completed_at {
        println!("Finished:  {}", at.to_rfc3339());
    }
    if let Some(error) = &job.error {
        println!("Error:     {}", error);
    }
    if let Some(files) = &job.files {
        println!("Files:     {}", files.len());
        if verbose {
            for path in files.paths() {
                println!("  {}", path);
            }
        }
    }
    if let Some(report) = &job.report {
        println!(
            "Report:    {} errors, {} warnings, {} attempts",
            report.errors.len(),
            report.warnings.len(),
            report.attempts
        );
        if verbose && !report.summary().is_empty() {
            for line in report.summary().lines() {
                println!("  {}", line);
            }
        }
    }
}

fn truncate(s: &str, max: usize) -> String {
    let line = s.lines().next().unwrap_or("");
    if line.chars().count() <= max {
        line.to_string()
    } else {
        let cut: String = line.chars().take(max).collect();
        format!("{}...", cut)
    }
}
