use chrono::{DateTime, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{FileSet, ValidationReport};

/// Lifecycle of a generation job.
///
/// Transitions are monotonic: pending -> generating -> completed | failed.
/// Terminal states absorb; a duplicate worker delivery that finds a terminal
/// job must return without doing anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Reserved and persisted, waiting for a worker
    Pending,
    /// Claimed by a worker, provider call in flight
    Generating,
    /// Terminal: output persisted
    Completed,
    /// Terminal: refunded, error message set
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, JobStatus::Pending)
    }
}

/// Requested model capability. A closed set mapped through the provider
/// registry; orchestration never names a vendor or model string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ModelTier {
    Standard,
    Premium,
}

impl ModelTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelTier::Standard => "standard",
            ModelTier::Premium => "premium",
        }
    }
}

/// What kind of output the job produces. Selects the system prompt and the
/// structural policy the result is validated against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum OutputKind {
    Website,
    Php,
}

impl OutputKind {
    /// Entry file the output must always contain.
    pub fn entry_path(&self) -> &'static str {
        match self {
            OutputKind::Website => "index.html",
            OutputKind::Php => "index.php",
        }
    }
}

/// Incoming create request, before any side effect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRequest {
    pub prompt: String,
    pub language: String,
    pub tier: ModelTier,
    pub output_kind: OutputKind,
    #[serde(default)]
    pub layout_hint: Option<String>,
    #[serde(default)]
    pub site_name: Option<String>,
    pub owner_id: String,
    pub team_id: String,
}

impl CreateRequest {
    /// Field validation. Synchronous, no side effect: a rejected request
    /// leaves no job row and no transaction.
    pub fn validate(&self) -> Result<(), String> {
        if self.prompt.trim().is_empty() {
            return Err("prompt must not be empty".to_string());
        }
        if self.language.trim().is_empty() {
            return Err("language must not be empty".to_string());
        }
        if self.owner_id.trim().is_empty() {
            return Err("owner id must not be empty".to_string());
        }
        if self.team_id.trim().is_empty() {
            return Err("team id must not be empty".to_string());
        }
        Ok(())
    }
}

/// One unit of generation work with its own billing and lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationJob {
    pub id: String,
    pub owner_id: String,
    pub team_id: String,
    pub prompt: String,
    pub language: String,
    pub tier: ModelTier,
    pub output_kind: OutputKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layout_hint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub site_name: Option<String>,
    pub status: JobStatus,
    /// Customer-facing price, set at creation, never mutated after refund.
    pub reserved_cents: i64,
    /// Internal token cost, reporting only. Zero until completion.
    pub realized_cost_cents: i64,
    /// Non-null iff status == Failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Nullable so the external retention sweep can drop old output without
    /// breaking job metadata.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub files: Option<FileSet>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<ValidationReport>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl GenerationJob {
    /// Build a pending job from a validated request and its reserved price.
    pub fn from_request(request: CreateRequest, reserved_cents: i64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            owner_id: request.owner_id,
            team_id: request.team_id,
            prompt: request.prompt,
            language: request.language,
            tier: request.tier,
            output_kind: request.output_kind,
            layout_hint: request.layout_hint,
            site_name: request.site_name,
            status: JobStatus::Pending,
            reserved_cents,
            realized_cost_cents: 0,
            error: None,
            files: None,
            report: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Transition to completed with the produced output and realized cost.
    pub fn complete(&mut self, files: FileSet, report: ValidationReport, realized_cost_cents: i64) {
        self.status = JobStatus::Completed;
        self.files = Some(files);
        self.report = Some(report);
        self.realized_cost_cents = realized_cost_cents;
        self.error = None;
        self.completed_at = Some(Utc::now());
    }

    /// Transition to failed. Realized cost is zeroed; the refund itself is
    /// the ledger's business, not the job record's.
    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = JobStatus::Failed;
        self.error = Some(error.into());
        self.realized_cost_cents = 0;
        self.completed_at = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> CreateRequest {
        CreateRequest {
            prompt: "a bakery landing page".to_string(),
            language: "en".to_string(),
            tier: ModelTier::Standard,
            output_kind: OutputKind::Website,
            layout_hint: None,
            site_name: Some("Crumb & Crust".to_string()),
            owner_id: "user-1".to_string(),
            team_id: "team-1".to_string(),
        }
    }

    #[test]
    fn test_status_is_terminal() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Generating.is_terminal());
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(
            serde_json::to_string(&JobStatus::Pending).unwrap(),
            "\"pending\""
        );
        assert_eq!(
            serde_json::to_string(&JobStatus::Completed).unwrap(),
            "\"completed\""
        );
    }

    #[test]
    fn test_validate_rejects_empty_prompt() {
        let mut req = request();
        req.prompt = "   ".to_string();
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_missing_team() {
        let mut req = request();
        req.team_id = String::new();
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_from_request_starts_pending() {
        let job = GenerationJob::from_request(request(), 700);
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.reserved_cents, 700);
        assert_eq!(job.realized_cost_cents, 0);
        assert!(job.error.is_none());
        assert!(job.files.is_none());
        assert!(job.completed_at.is_none());
    }

    #[test]
    fn test_complete_sets_output_and_clears_error() {
        let mut job = GenerationJob::from_request(request(), 700);
        let mut files = FileSet::new();
        files.insert("index.html", "<html></html>");
        job.complete(files.clone(), ValidationReport::clean(1), 42);
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.files, Some(files));
        assert_eq!(job.realized_cost_cents, 42);
        assert!(job.error.is_none());
        assert!(job.completed_at.is_some());
    }

    #[test]
    fn test_fail_sets_error_and_zeroes_cost() {
        let mut job = GenerationJob::from_request(request(), 700);
        job.realized_cost_cents = 99;
        job.fail("provider timeout");
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error.as_deref(), Some("provider timeout"));
        assert_eq!(job.realized_cost_cents, 0);
    }

    #[test]
    fn test_entry_path_per_kind() {
        assert_eq!(OutputKind::Website.entry_path(), "index.html");
        assert_eq!(OutputKind::Php.entry_path(), "index.php");
    }
}
