//! Structural validation of generated output and the repair loop.
//!
//! Validation is advisory for the job lifecycle: blocking errors drive
//! repair rounds, but exhausting the round ceiling with errors still present
//! completes the job carrying the final report. Only pipeline errors
//! (provider, codec on the first parse, storage) fail a job.

use std::time::Duration;

use tracing::{debug, warn};

use crate::core::codec;
use crate::core::provider::{complete_with_deadline, Provider, TokenUsage};
use crate::core::prompts;
use crate::models::{FileSet, GenerationJob, OutputKind, ValidationConfig, ValidationReport};

/// What a generated file set must structurally satisfy.
pub struct StructuralPolicy {
    required_paths: Vec<String>,
    min_file_bytes: usize,
}

impl StructuralPolicy {
    pub fn for_kind(kind: OutputKind, config: &ValidationConfig) -> Self {
        Self {
            required_paths: vec![kind.entry_path().to_string()],
            min_file_bytes: config.min_file_bytes,
        }
    }

    /// Check a file set. `attempts` on the returned report is left at zero;
    /// the repair loop owns that counter.
    pub fn validate(&self, files: &FileSet) -> ValidationReport {
        let mut report = ValidationReport::clean(0);

        for required in &self.required_paths {
            match files.get(required) {
                None => report
                    .errors
                    .push(format!("required file {} is missing", required)),
                Some(content) if content.len() < self.min_file_bytes => report.errors.push(format!(
                    "required file {} is only {} bytes (minimum {})",
                    required,
                    content.len(),
                    self.min_file_bytes
                )),
                Some(_) => {}
            }
        }

        for (path, content) in files.iter() {
            if content.lines().any(is_fence_line) {
                report
                    .errors
                    .push(format!("residual code fence inside {}", path));
            }
        }

        for (path, _) in files.iter() {
            if self.required_paths.iter().any(|r| r == path) {
                continue;
            }
            let referenced = files
                .iter()
                .any(|(other, content)| other != path && content.contains(file_name(path)));
            if !referenced {
                report
                    .warnings
                    .push(format!("{} is not referenced by any other file", path));
            }
        }

        report
    }
}

fn is_fence_line(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.starts_with("```") || trimmed.starts_with("~~~")
}

fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Outcome of the validation/repair loop.
pub struct RepairOutcome {
    pub files: FileSet,
    pub report: ValidationReport,
    pub usage: TokenUsage,
}

/// Validate and, while blocking errors remain, ask the provider for a
/// corrected file set. `attempts_used` counts provider calls already spent
/// on this output (the initial generation); the loop stops once total calls
/// reach `max_attempts`.
///
/// A repair response that fails to parse, or a provider error mid-repair,
/// keeps the previous file set and ends the loop: the job already has
/// deliverable output and the report records what is still wrong.
pub async fn repair_loop(
    provider: &dyn Provider,
    deadline: Duration,
    job: &GenerationJob,
    mut files: FileSet,
    policy: &StructuralPolicy,
    max_attempts: u32,
    attempts_used: u32,
) -> RepairOutcome {
    let mut usage = TokenUsage::default();
    let mut attempts = attempts_used;
    let mut report = policy.validate(&files);
    report.attempts = attempts;

    while report.has_errors() && attempts < max_attempts {
        debug!(
            "Job {}: {} blocking errors after attempt {}, requesting repair",
            job.id,
            report.errors.len(),
            attempts
        );
        let (system, user) = prompts::repair_prompt(job, &files, &report);
        let completion = match complete_with_deadline(provider, deadline, &system, &user).await {
            Ok(completion) => completion,
            Err(err) => {
                warn!("Job {}: repair call failed, keeping current output: {}", job.id, err);
                break;
            }
        };
        attempts += 1;
        usage.add(completion.usage);

        match codec::parse_file_blocks(&completion.text) {
            Ok(delta) => files.merge(delta),
            Err(err) => {
                warn!(
                    "Job {}: repair response unparseable, keeping current output: {}",
                    job.id, err
                );
                report.attempts = attempts;
                break;
            }
        }
        report = policy.validate(&files);
        report.attempts = attempts;
    }

    RepairOutcome {
        files,
        report,
        usage,
    }
}
