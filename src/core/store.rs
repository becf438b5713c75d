//! Persistence for jobs, team balances, and the transaction ledger.
//!
//! Workers are stateless; the store is the only shared mutable resource, so
//! every cross-worker invariant lives behind a conditional write here:
//! `claim_pending` is the pending->generating claim and
//! `compare_and_set_balance` is the reservation guard.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::StoreError;
use crate::models::{
    BalanceTransaction, GenerationJob, JobStatus, TeamBalance, TransactionKind,
};

/// Result of attempting to claim a pending job for execution.
#[derive(Debug)]
pub enum ClaimOutcome {
    /// This caller won the pending->generating write.
    Claimed(GenerationJob),
    /// The job already finished; duplicate delivery, do nothing.
    AlreadyTerminal(GenerationJob),
    /// Another worker holds the job right now.
    NotClaimable(GenerationJob),
}

/// Job and billing persistence.
pub trait Store: Send + Sync {
    fn insert_job(&self, job: &GenerationJob) -> Result<(), StoreError>;
    fn get_job(&self, id: &str) -> Result<Option<GenerationJob>, StoreError>;
    /// Overwrite a job record (metadata transitions: generating, failed, ...).
    fn update_job(&self, job: &GenerationJob) -> Result<(), StoreError>;
    /// Conditional pending->generating write; only one claimant wins.
    fn claim_pending(&self, id: &str) -> Result<ClaimOutcome, StoreError>;
    fn list_jobs(&self, status: Option<JobStatus>) -> Result<Vec<GenerationJob>, StoreError>;
    /// Persist a job record together with its archive, all-or-nothing from
    /// the point of view of readers going through the job record.
    fn store_output(&self, job: &GenerationJob, archive: &[u8]) -> Result<(), StoreError>;
    fn load_archive(&self, job_id: &str) -> Result<Option<Vec<u8>>, StoreError>;

    fn upsert_team(&self, team: &TeamBalance) -> Result<(), StoreError>;
    fn team_balance(&self, team_id: &str) -> Result<Option<TeamBalance>, StoreError>;
    /// Atomic conditional balance write: succeeds only if the stored balance
    /// still equals `expected_cents`.
    fn compare_and_set_balance(
        &self,
        team_id: &str,
        expected_cents: i64,
        new_cents: i64,
    ) -> Result<bool, StoreError>;
    fn append_transaction(&self, tx: &BalanceTransaction) -> Result<(), StoreError>;
    fn transactions_for_team(&self, team_id: &str) -> Result<Vec<BalanceTransaction>, StoreError>;
    /// Whether a refund transaction already exists for this job.
    fn has_refund_for_job(&self, job_id: &str) -> Result<bool, StoreError>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct State {
    jobs: BTreeMap<String, GenerationJob>,
    teams: BTreeMap<String, TeamBalance>,
    transactions: Vec<BalanceTransaction>,
}

fn claim_in_state(state: &mut State, id: &str) -> Result<ClaimOutcome, StoreError> {
    let job = state
        .jobs
        .get_mut(id)
        .ok_or_else(|| StoreError::JobNotFound(id.to_string()))?;
    if job.status.is_terminal() {
        return Ok(ClaimOutcome::AlreadyTerminal(job.clone()));
    }
    if !job.status.is_pending() {
        return Ok(ClaimOutcome::NotClaimable(job.clone()));
    }
    job.status = JobStatus::Generating;
    Ok(ClaimOutcome::Claimed(job.clone()))
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

/// Mutex-guarded in-memory store. Embedded use and tests.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    state: State,
    archives: BTreeMap<String, Vec<u8>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Store for MemoryStore {
    fn insert_job(&self, job: &GenerationJob) -> Result<(), StoreError> {
        self.lock().state.jobs.insert(job.id.clone(), job.clone());
        Ok(())
    }

    fn get_job(&self, id: &str) -> Result<Option<GenerationJob>, StoreError> {
        Ok(self.lock().state.jobs.get(id).cloned())
    }

    fn update_job(&self, job: &GenerationJob) -> Result<(), StoreError> {
        let mut inner = self.lock();
        if !inner.state.jobs.contains_key(&job.id) {
            return Err(StoreError::JobNotFound(job.id.clone()));
        }
        inner.state.jobs.insert(job.id.clone(), job.clone());
        Ok(())
    }

    fn claim_pending(&self, id: &str) -> Result<ClaimOutcome, StoreError> {
        claim_in_state(&mut self.lock().state, id)
    }

    fn list_jobs(&self, status: Option<JobStatus>) -> Result<Vec<GenerationJob>, StoreError> {
        Ok(self
            .lock()
            .state
            .jobs
            .values()
            .filter(|j| status.map_or(true, |s| j.status == s))
            .cloned()
            .collect())
    }

    fn store_output(&self, job: &GenerationJob, archive: &[u8]) -> Result<(), StoreError> {
        let mut inner = self.lock();
        if !inner.state.jobs.contains_key(&job.id) {
            return Err(StoreError::JobNotFound(job.id.clone()));
        }
        inner.state.jobs.insert(job.id.clone(), job.clone());
        inner.archives.insert(job.id.clone(), archive.to_vec());
        Ok(())
    }

    fn load_archive(&self, job_id: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.lock().archives.get(job_id).cloned())
    }

    fn upsert_team(&self, team: &TeamBalance) -> Result<(), StoreError> {
        self.lock()
            .state
            .teams
            .insert(team.team_id.clone(), team.clone());
        Ok(())
    }

    fn team_balance(&self, team_id: &str) -> Result<Option<TeamBalance>, StoreError> {
        Ok(self.lock().state.teams.get(team_id).cloned())
    }

    fn compare_and_set_balance(
        &self,
        team_id: &str,
        expected_cents: i64,
        new_cents: i64,
    ) -> Result<bool, StoreError> {
        let mut inner = self.lock();
        let team = inner
            .state
            .teams
            .get_mut(team_id)
            .ok_or_else(|| StoreError::TeamNotFound(team_id.to_string()))?;
        if team.balance_cents != expected_cents {
            return Ok(false);
        }
        team.balance_cents = new_cents;
        Ok(true)
    }

    fn append_transaction(&self, tx: &BalanceTransaction) -> Result<(), StoreError> {
        self.lock().state.transactions.push(tx.clone());
        Ok(())
    }

    fn transactions_for_team(&self, team_id: &str) -> Result<Vec<BalanceTransaction>, StoreError> {
        Ok(self
            .lock()
            .state
            .transactions
            .iter()
            .filter(|t| t.team_id == team_id)
            .cloned()
            .collect())
    }

    fn has_refund_for_job(&self, job_id: &str) -> Result<bool, StoreError> {
        Ok(self.lock().state.transactions.iter().any(|t| {
            t.kind == TransactionKind::Refund && t.job_id.as_deref() == Some(job_id)
        }))
    }
}

// ---------------------------------------------------------------------------
// File-backed store
// ---------------------------------------------------------------------------

/// JSON state file plus a sibling archives directory. The state file is
/// shared with other worker processes, so nothing is cached: every
/// operation takes an OS-level lock on a sibling lock file, re-reads the
/// state from disk, and (for writes) saves it back through a temp file and
/// an atomic rename. The conditional writes (`claim_pending`,
/// `compare_and_set_balance`) are therefore conditional on durable state.
pub struct FileStore {
    state_file: PathBuf,
    archives_dir: PathBuf,
    lock_file: PathBuf,
}

impl FileStore {
    pub fn open(data_dir: &Path) -> Result<Self, StoreError> {
        let archives_dir = data_dir.join("archives");
        fs::create_dir_all(&archives_dir)
            .map_err(|e| StoreError::WriteError(archives_dir.clone(), e))?;

        let store = Self {
            state_file: data_dir.join("store.json"),
            archives_dir,
            lock_file: data_dir.join("store.lock"),
        };

        let state = store.read_state()?;
        info!(
            "Opened store: {} jobs, {} teams, {} transactions",
            state.jobs.len(),
            state.teams.len(),
            state.transactions.len()
        );

        Ok(store)
    }

    fn lock_handle(&self) -> Result<File, StoreError> {
        OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&self.lock_file)
            .map_err(|e| StoreError::LockError(self.lock_file.clone(), e))
    }

    /// Exclusive cross-process lock, held until the returned handle drops.
    fn lock_exclusive(&self) -> Result<File, StoreError> {
        let handle = self.lock_handle()?;
        handle
            .lock()
            .map_err(|e| StoreError::LockError(self.lock_file.clone(), e))?;
        Ok(handle)
    }

    fn lock_shared(&self) -> Result<File, StoreError> {
        let handle = self.lock_handle()?;
        handle
            .lock_shared()
            .map_err(|e| StoreError::LockError(self.lock_file.clone(), e))?;
        Ok(handle)
    }

    /// Read the state off disk. Callers must already hold the lock.
    fn load(&self) -> Result<State, StoreError> {
        if !self.state_file.exists() {
            debug!("State file does not exist, starting fresh");
            return Ok(State::default());
        }
        let content = fs::read_to_string(&self.state_file)
            .map_err(|e| StoreError::ReadError(self.state_file.clone(), e))?;
        if content.trim().is_empty() {
            return Ok(State::default());
        }
        serde_json::from_str(&content)
            .map_err(|e| StoreError::ParseError(self.state_file.clone(), e.to_string()))
    }

    fn read_state(&self) -> Result<State, StoreError> {
        let _lock = self.lock_shared()?;
        self.load()
    }

    /// Save state atomically (write to temp, then rename). Callers must
    /// already hold the exclusive lock.
    fn save(&self, state: &State) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(state)
            .map_err(|e| StoreError::ParseError(self.state_file.clone(), e.to_string()))?;

        let temp_file = self.state_file.with_extension("json.tmp");
        fs::write(&temp_file, &json).map_err(|e| StoreError::WriteError(temp_file.clone(), e))?;
        fs::rename(&temp_file, &self.state_file)
            .map_err(|e| StoreError::WriteError(self.state_file.clone(), e))?;
        Ok(())
    }

    fn archive_path(&self, job_id: &str) -> PathBuf {
        self.archives_dir.join(format!("{}.zip", job_id))
    }
}

impl Store for FileStore {
    fn insert_job(&self, job: &GenerationJob) -> Result<(), StoreError> {
        let _lock = self.lock_exclusive()?;
        let mut state = self.load()?;
        state.jobs.insert(job.id.clone(), job.clone());
        self.save(&state)
    }

    fn get_job(&self, id: &str) -> Result<Option<GenerationJob>, StoreError> {
        Ok(self.read_state()?.jobs.get(id).cloned())
    }

    fn update_job(&self, job: &GenerationJob) -> Result<(), StoreError> {
        let _lock = self.lock_exclusive()?;
        let mut state = self.load()?;
        if !state.jobs.contains_key(&job.id) {
            return Err(StoreError::JobNotFound(job.id.clone()));
        }
        state.jobs.insert(job.id.clone(), job.clone());
        self.save(&state)
    }

    fn claim_pending(&self, id: &str) -> Result<ClaimOutcome, StoreError> {
        let _lock = self.lock_exclusive()?;
        let mut state = self.load()?;
        let outcome = claim_in_state(&mut state, id)?;
        if matches!(outcome, ClaimOutcome::Claimed(_)) {
            self.save(&state)?;
        }
        Ok(outcome)
    }

    fn list_jobs(&self, status: Option<JobStatus>) -> Result<Vec<GenerationJob>, StoreError> {
        Ok(self
            .read_state()?
            .jobs
            .values()
            .filter(|j| status.map_or(true, |s| j.status == s))
            .cloned()
            .collect())
    }

    fn store_output(&self, job: &GenerationJob, archive: &[u8]) -> Result<(), StoreError> {
        let _lock = self.lock_exclusive()?;
        let mut state = self.load()?;
        if !state.jobs.contains_key(&job.id) {
            return Err(StoreError::JobNotFound(job.id.clone()));
        }

        // Swap the archive in before committing the job record, keeping the
        // previous archive as a backup: if the record write fails, the old
        // archive is restored so the record a reader sees always pairs with
        // the archive on disk.
        let final_path = self.archive_path(&job.id);
        let temp_path = final_path.with_extension("zip.tmp");
        let backup_path = final_path.with_extension("zip.bak");
        fs::write(&temp_path, archive).map_err(|e| StoreError::WriteError(temp_path.clone(), e))?;

        let had_previous = final_path.exists();
        if had_previous {
            fs::rename(&final_path, &backup_path)
                .map_err(|e| StoreError::WriteError(backup_path.clone(), e))?;
        }
        fs::rename(&temp_path, &final_path)
            .map_err(|e| StoreError::WriteError(final_path.clone(), e))?;

        state.jobs.insert(job.id.clone(), job.clone());
        if let Err(err) = self.save(&state) {
            if had_previous {
                let _ = fs::rename(&backup_path, &final_path);
            } else {
                let _ = fs::remove_file(&final_path);
            }
            return Err(err);
        }
        if had_previous {
            let _ = fs::remove_file(&backup_path);
        }
        Ok(())
    }

    fn load_archive(&self, job_id: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let _lock = self.lock_shared()?;
        let path = self.archive_path(job_id);
        if !path.exists() {
            return Ok(None);
        }
        fs::read(&path)
            .map(Some)
            .map_err(|e| StoreError::ReadError(path, e))
    }

    fn upsert_team(&self, team: &TeamBalance) -> Result<(), StoreError> {
        let _lock = self.lock_exclusive()?;
        let mut state = self.load()?;
        state.teams.insert(team.team_id.clone(), team.clone());
        self.save(&state)
    }

    fn team_balance(&self, team_id: &str) -> Result<Option<TeamBalance>, StoreError> {
        Ok(self.read_state()?.teams.get(team_id).cloned())
    }

    fn compare_and_set_balance(
        &self,
        team_id: &str,
        expected_cents: i64,
        new_cents: i64,
    ) -> Result<bool, StoreError> {
        let _lock = self.lock_exclusive()?;
        let mut state = self.load()?;
        let team = state
            .teams
            .get_mut(team_id)
            .ok_or_else(|| StoreError::TeamNotFound(team_id.to_string()))?;
        if team.balance_cents != expected_cents {
            return Ok(false);
        }
        team.balance_cents = new_cents;
        self.save(&state)?;
        Ok(true)
    }

    fn append_transaction(&self, tx: &BalanceTransaction) -> Result<(), StoreError> {
        let _lock = self.lock_exclusive()?;
        let mut state = self.load()?;
        state.transactions.push(tx.clone());
        self.save(&state)
    }

    fn transactions_for_team(&self, team_id: &str) -> Result<Vec<BalanceTransaction>, StoreError> {
        Ok(self
            .read_state()?
            .transactions
            .iter()
            .filter(|t| t.team_id == team_id)
            .cloned()
            .collect())
    }

    fn has_refund_for_job(&self, job_id: &str) -> Result<bool, StoreError> {
        Ok(self.read_state()?.transactions.iter().any(|t| {
            t.kind == TransactionKind::Refund && t.job_id.as_deref() == Some(job_id)
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CreateRequest, FileSet, ModelTier, OutputKind};
    use tempfile::TempDir;

    fn job() -> GenerationJob {
        GenerationJob::from_request(
            CreateRequest {
                prompt: "landing page".to_string(),
                language: "en".to_string(),
                tier: ModelTier::Standard,
                output_kind: OutputKind::Website,
                layout_hint: None,
                site_name: None,
                owner_id: "user-1".to_string(),
                team_id: "team-1".to_string(),
            },
            700,
        )
    }

    #[test]
    fn test_memory_claim_pending_once() {
        let store = MemoryStore::new();
        let j = job();
        store.insert_job(&j).unwrap();

        match store.claim_pending(&j.id).unwrap() {
            ClaimOutcome::Claimed(claimed) => assert_eq!(claimed.status, JobStatus::Generating),
            other => panic!("expected Claimed, got {:?}", other),
        }
        // Second claim sees the job in flight.
        assert!(matches!(
            store.claim_pending(&j.id).unwrap(),
            ClaimOutcome::NotClaimable(_)
        ));
    }

    #[test]
    fn test_memory_claim_terminal_job() {
        let store = MemoryStore::new();
        let mut j = job();
        j.fail("boom");
        store.insert_job(&j).unwrap();
        assert!(matches!(
            store.claim_pending(&j.id).unwrap(),
            ClaimOutcome::AlreadyTerminal(_)
        ));
    }

    #[test]
    fn test_memory_claim_missing_job() {
        let store = MemoryStore::new();
        assert!(store.claim_pending("nope").is_err());
    }

    #[test]
    fn test_memory_cas_balance() {
        let store = MemoryStore::new();
        store
            .upsert_team(&TeamBalance::new("team-1", 1000, 0))
            .unwrap();

        assert!(store.compare_and_set_balance("team-1", 1000, 300).unwrap());
        // Stale expectation loses.
        assert!(!store.compare_and_set_balance("team-1", 1000, 0).unwrap());
        assert_eq!(
            store.team_balance("team-1").unwrap().unwrap().balance_cents,
            300
        );
    }

    #[test]
    fn test_memory_cas_unknown_team() {
        let store = MemoryStore::new();
        assert!(store.compare_and_set_balance("ghost", 0, 10).is_err());
    }

    #[test]
    fn test_memory_refund_lookup() {
        let store = MemoryStore::new();
        let tx = BalanceTransaction::new(
            "team-1",
            700,
            300,
            1000,
            "refund",
            "system",
            Some("job-1".to_string()),
            TransactionKind::Refund,
        );
        assert!(!store.has_refund_for_job("job-1").unwrap());
        store.append_transaction(&tx).unwrap();
        assert!(store.has_refund_for_job("job-1").unwrap());
        assert!(!store.has_refund_for_job("job-2").unwrap());
    }

    #[test]
    fn test_file_store_persistence() {
        let dir = TempDir::new().unwrap();
        let j = job();
        let id = j.id.clone();

        {
            let store = FileStore::open(dir.path()).unwrap();
            store.insert_job(&j).unwrap();
            store
                .upsert_team(&TeamBalance::new("team-1", 1000, 0))
                .unwrap();
        }

        // Reload from disk.
        let store = FileStore::open(dir.path()).unwrap();
        assert!(store.get_job(&id).unwrap().is_some());
        assert_eq!(
            store.team_balance("team-1").unwrap().unwrap().balance_cents,
            1000
        );
    }

    #[test]
    fn test_file_store_output_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        let mut j = job();
        store.insert_job(&j).unwrap();

        let mut files = FileSet::new();
        files.insert("index.html", "<html>stored output</html>");
        j.files = Some(files);
        store.store_output(&j, b"PK-archive-bytes").unwrap();

        let loaded = store.get_job(&j.id).unwrap().unwrap();
        assert!(loaded.files.is_some());
        assert_eq!(
            store.load_archive(&j.id).unwrap().as_deref(),
            Some(b"PK-archive-bytes".as_ref())
        );
    }

    #[test]
    fn test_file_store_cas_across_handles() {
        let dir = TempDir::new().unwrap();
        let a = FileStore::open(dir.path()).unwrap();
        let b = FileStore::open(dir.path()).unwrap();
        a.upsert_team(&TeamBalance::new("team-1", 1000, 0)).unwrap();

        assert!(a.compare_and_set_balance("team-1", 1000, 300).unwrap());
        // The second handle checks against durable state, not a cached copy,
        // so its stale expectation loses.
        assert!(!b.compare_and_set_balance("team-1", 1000, 600).unwrap());
        assert_eq!(
            b.team_balance("team-1").unwrap().unwrap().balance_cents,
            300
        );
    }

    #[test]
    fn test_file_store_transactions_merge_across_handles() {
        let dir = TempDir::new().unwrap();
        let a = FileStore::open(dir.path()).unwrap();
        let b = FileStore::open(dir.path()).unwrap();

        let tx = |note: &str| {
            BalanceTransaction::new(
                "team-1",
                -700,
                1000,
                300,
                note,
                "user-1",
                Some("job-1".to_string()),
                TransactionKind::Reservation,
            )
        };
        a.append_transaction(&tx("first")).unwrap();
        b.append_transaction(&tx("second")).unwrap();

        // Neither append may clobber the other.
        assert_eq!(a.transactions_for_team("team-1").unwrap().len(), 2);
    }

    #[test]
    fn test_file_store_claim_across_handles() {
        let dir = TempDir::new().unwrap();
        let a = FileStore::open(dir.path()).unwrap();
        let b = FileStore::open(dir.path()).unwrap();
        let j = job();
        a.insert_job(&j).unwrap();

        assert!(matches!(
            a.claim_pending(&j.id).unwrap(),
            ClaimOutcome::Claimed(_)
        ));
        assert!(matches!(
            b.claim_pending(&j.id).unwrap(),
            ClaimOutcome::NotClaimable(_)
        ));
    }

    #[test]
    fn test_file_store_replaced_output_pairs_with_record() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        let mut j = job();
        store.insert_job(&j).unwrap();

        let mut files = FileSet::new();
        files.insert("index.html", "<html>v1</html>");
        j.files = Some(files.clone());
        store.store_output(&j, b"archive-v1").unwrap();

        files.insert("index.html", "<html>v2</html>");
        j.files = Some(files);
        store.store_output(&j, b"archive-v2").unwrap();

        let loaded = store.get_job(&j.id).unwrap().unwrap();
        assert_eq!(
            loaded.files.unwrap().get("index.html"),
            Some("<html>v2</html>")
        );
        assert_eq!(
            store.load_archive(&j.id).unwrap().as_deref(),
            Some(b"archive-v2".as_ref())
        );
        // No backup left behind after a clean replace.
        assert!(!dir
            .path()
            .join("archives")
            .join(format!("{}.zip.bak", j.id))
            .exists());
    }

    #[test]
    fn test_file_store_missing_archive() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        assert!(store.load_archive("nope").unwrap().is_none());
    }

    #[test]
    fn test_list_jobs_by_status() {
        let store = MemoryStore::new();
        let pending = job();
        let mut failed = job();
        failed.fail("x");
        store.insert_job(&pending).unwrap();
        store.insert_job(&failed).unwrap();

        assert_eq!(store.list_jobs(None).unwrap().len(), 2);
        assert_eq!(
            store.list_jobs(Some(JobStatus::Pending)).unwrap().len(),
            1
        );
        assert_eq!(store.list_jobs(Some(JobStatus::Failed)).unwrap().len(), 1);
    }
}
