//! Job lifecycle: create, run, edit.
//!
//! `create` is the only place money is reserved and `run` is the only place
//! it is refunded. `run` is safe under at-least-once delivery: the claim on
//! the job record serializes workers, terminal jobs absorb duplicates, and
//! a failed pipeline refunds exactly once.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::core::archive;
use crate::core::codec;
use crate::core::ledger::Ledger;
use crate::core::prompts;
use crate::core::provider::{complete_with_deadline, CostTable, ProviderRegistry};
use crate::core::store::{ClaimOutcome, Store};
use crate::core::validation::{repair_loop, StructuralPolicy};
use crate::error::{Result, SiteForgeError, StoreError};
use crate::models::{
    Config, CreateRequest, FileSet, GenerationJob, JobStatus, ValidationReport,
};

/// Wall-clock slack over the HTTP client's own timeout, so the socket
/// timeout fires first and the outer bound only catches stalled backends.
const DEADLINE_GRACE_SECONDS: u64 = 5;

struct PipelineOutput {
    files: FileSet,
    report: ValidationReport,
    realized_cost_cents: i64,
    archive: Vec<u8>,
}

pub struct Orchestrator {
    store: Arc<dyn Store>,
    ledger: Ledger,
    registry: ProviderRegistry,
    cost_table: CostTable,
    config: Config,
    deadline: Duration,
}

impl Orchestrator {
    pub fn new(store: Arc<dyn Store>, registry: ProviderRegistry, config: Config) -> Self {
        let deadline =
            Duration::from_secs(config.provider.timeout_seconds + DEADLINE_GRACE_SECONDS);
        Self {
            ledger: Ledger::new(store.clone()),
            store,
            registry,
            cost_table: CostTable::from_pricing(&config.pricing),
            config,
            deadline,
        }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Validate, price, reserve, persist. Synchronous: no provider call
    /// happens here, the job comes back Pending. A validation or credit
    /// rejection leaves no job row and no transaction.
    pub fn create(&self, request: CreateRequest) -> Result<GenerationJob> {
        request.validate().map_err(SiteForgeError::InvalidRequest)?;

        let price = self.config.pricing.price_cents(request.tier);
        let job = GenerationJob::from_request(request, price);

        self.ledger
            .reserve(&job.team_id, price, &job.id, &job.owner_id)?;

        if let Err(err) = self.store.insert_job(&job) {
            // The reservation already committed; give it back before
            // surfacing the storage failure.
            if let Err(refund_err) = self.ledger.refund(&job) {
                error!(
                    "Could not roll back reservation for job {}: {}",
                    job.id, refund_err
                );
            }
            return Err(err.into());
        }

        info!(
            "Created job {} for team {} ({}c reserved)",
            job.id, job.team_id, price
        );
        Ok(job)
    }

    /// Execute one job to a terminal state. At-least-once safe: a terminal
    /// job is returned unchanged, a job already claimed by another worker is
    /// left alone, and pipeline errors are captured into the job record
    /// rather than propagated.
    pub async fn run(&self, job_id: &str) -> Result<GenerationJob> {
        let mut job = match self.store.claim_pending(job_id).map_err(not_found)? {
            ClaimOutcome::Claimed(job) => job,
            ClaimOutcome::AlreadyTerminal(job) => {
                debug!("Job {} already {:?}, nothing to do", job.id, job.status);
                return Ok(job);
            }
            ClaimOutcome::NotClaimable(job) => {
                debug!("Job {} is held by another worker", job.id);
                return Ok(job);
            }
        };

        match self.pipeline(&job).await {
            Ok(output) => {
                job.complete(output.files, output.report, output.realized_cost_cents);
                if let Err(err) = self.store.store_output(&job, &output.archive) {
                    return self.fail_job(job, format!("failed to persist output: {}", err));
                }
                self.ledger.settle(&job);
                info!(
                    "Job {} completed ({} files, {} attempts)",
                    job.id,
                    job.files.as_ref().map_or(0, FileSet::len),
                    job.report.as_ref().map_or(0, |r| r.attempts)
                );
                Ok(job)
            }
            Err(err) => self.fail_job(job, err.to_string()),
        }
    }

    /// Generation call, parse, repair loop, archive.
    async fn pipeline(&self, job: &GenerationJob) -> Result<PipelineOutput> {
        let provider = self.registry.provider_for(job.tier)?;

        let (system, user) = prompts::generation_prompt(job);
        let completion =
            complete_with_deadline(provider.as_ref(), self.deadline, &system, &user).await?;
        let mut usage = completion.usage;

        let files = codec::parse_file_blocks(&completion.text)?;
        debug!("Job {}: parsed {} files", job.id, files.len());

        let policy = StructuralPolicy::for_kind(job.output_kind, &self.config.validation);
        let outcome = repair_loop(
            provider.as_ref(),
            self.deadline,
            job,
            files,
            &policy,
            self.config.validation.max_attempts,
            1,
        )
        .await;
        usage.add(outcome.usage);

        let model = self.registry.model_for(job.tier)?;
        let realized_cost_cents = self.cost_table.cost_cents(model, &usage);
        let archive = archive::build(&outcome.files)?;

        Ok(PipelineOutput {
            files: outcome.files,
            report: outcome.report,
            realized_cost_cents,
            archive,
        })
    }

    /// Refund once, mark failed, persist. The refund is guarded at the
    /// ledger, so a redelivered failure cannot pay a team twice.
    fn fail_job(&self, mut job: GenerationJob, message: String) -> Result<GenerationJob> {
        warn!("Job {} failed: {}", job.id, message);
        if let Err(err) = self.ledger.refund(&job) {
            error!("Refund for failed job {} did not apply: {}", job.id, err);
        }
        job.fail(message);
        self.store.update_job(&job).map_err(not_found)?;
        Ok(job)
    }

    /// Rework a completed job's output from a change request. Synchronous
    /// from the caller's point of view and free of ledger interaction: one
    /// provider call, no repair loop. Success replaces the stored file set
    /// and archive together; any failure leaves stored state untouched.
    pub async fn edit(
        &self,
        job_id: &str,
        instruction: &str,
        scope_hints: &[String],
    ) -> Result<FileSet> {
        if instruction.trim().is_empty() {
            return Err(SiteForgeError::InvalidRequest(
                "change request must not be empty".to_string(),
            ));
        }

        let mut job = self
            .store
            .get_job(job_id)?
            .ok_or_else(|| SiteForgeError::JobNotFound(job_id.to_string()))?;

        if job.status != JobStatus::Completed {
            return Err(SiteForgeError::EditRejected(format!(
                "job {} is {:?}, only completed jobs can be edited",
                job.id, job.status
            )));
        }
        let Some(current) = job.files.clone() else {
            return Err(SiteForgeError::EditRejected(format!(
                "output for job {} is no longer stored",
                job.id
            )));
        };

        let provider = self.registry.provider_for(job.tier)?;
        let (system, user) = prompts::edit_prompt(&job, &current, instruction, scope_hints);
        let completion =
            complete_with_deadline(provider.as_ref(), self.deadline, &system, &user).await?;

        let delta = codec::parse_file_blocks(&completion.text)?;
        let mut updated = current;
        updated.merge(delta);

        let archive = archive::build(&updated)?;

        let model = self.registry.model_for(job.tier)?;
        job.realized_cost_cents += self.cost_table.cost_cents(model, &completion.usage);
        job.files = Some(updated.clone());
        self.store.store_output(&job, &archive)?;

        info!("Edited job {} ({} files stored)", job.id, updated.len());
        Ok(updated)
    }
}

fn not_found(err: StoreError) -> SiteForgeError {
    match err {
        StoreError::JobNotFound(id) => SiteForgeError::JobNotFound(id),
        other => other.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::store::MemoryStore;
    use crate::models::{ModelTier, OutputKind, TeamBalance};
    use std::collections::HashMap;

    fn orchestrator(balance: i64) -> Orchestrator {
        let store = Arc::new(MemoryStore::new());
        store
            .upsert_team(&TeamBalance::new("team-1", balance, 0))
            .unwrap();
        Orchestrator::new(
            store,
            ProviderRegistry::from_providers(HashMap::new()),
            Config::default(),
        )
    }

    fn request() -> CreateRequest {
        CreateRequest {
            prompt: "a plumber landing page".to_string(),
            language: "en".to_string(),
            tier: ModelTier::Standard,
            output_kind: OutputKind::Website,
            layout_hint: None,
            site_name: None,
            owner_id: "user-1".to_string(),
            team_id: "team-1".to_string(),
        }
    }

    #[test]
    fn test_create_reserves_and_persists_pending() {
        let orch = orchestrator(1000);
        let job = orch.create(request()).unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.reserved_cents, 500);
        assert_eq!(orch.ledger().balance("team-1").unwrap().balance_cents, 500);
        assert!(orch.store().get_job(&job.id).unwrap().is_some());
    }

    #[test]
    fn test_create_invalid_request_has_no_side_effects() {
        let orch = orchestrator(1000);
        let mut req = request();
        req.prompt = "  ".to_string();
        assert!(matches!(
            orch.create(req).unwrap_err(),
            SiteForgeError::InvalidRequest(_)
        ));
        assert_eq!(orch.ledger().balance("team-1").unwrap().balance_cents, 1000);
        assert!(orch.store().list_jobs(None).unwrap().is_empty());
    }

    #[test]
    fn test_create_over_limit_has_no_side_effects() {
        let orch = orchestrator(100);
        let err = orch.create(request()).unwrap_err();
        assert!(err.is_preflight());
        assert_eq!(orch.ledger().balance("team-1").unwrap().balance_cents, 100);
        assert!(orch.store().list_jobs(None).unwrap().is_empty());
        assert!(orch.ledger().transactions("team-1").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_run_unknown_job() {
        let orch = orchestrator(1000);
        assert!(matches!(
            orch.run("no-such-job").await.unwrap_err(),
            SiteForgeError::JobNotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_edit_rejects_pending_job() {
        let orch = orchestrator(1000);
        let job = orch.create(request()).unwrap();
        assert!(matches!(
            orch.edit(&job.id, "make it blue", &[]).await.unwrap_err(),
            SiteForgeError::EditRejected(_)
        ));
    }

    #[tokio::test]
    async fn test_edit_rejects_empty_instruction() {
        let orch = orchestrator(1000);
        assert!(matches!(
            orch.edit("any", "  ", &[]).await.unwrap_err(),
            SiteForgeError::InvalidRequest(_)
        ));
    }
}
