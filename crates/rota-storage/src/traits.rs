use rota_core::{Cursor, Member, MemberId, PoolId, RotationPool, RunId, RunRecord, Task, TaskId};

/// Everything a committed run writes, applied as one unit.
#[derive(Clone, Debug)]
pub struct RunCommit {
    pub pool_id: PoolId,
    /// Pool version the run was planned against.
    pub expected_version: u64,
    pub cursor: Cursor,
    pub run: RunRecord,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommitOutcome {
    Committed,
    /// The pool's version no longer matches; nothing was written.
    Conflict,
}

pub trait Storage: Send + Sync {
    fn list_pools(&self) -> anyhow::Result<Vec<RotationPool>>;
    fn get_pool(&self, pool_id: &PoolId) -> anyhow::Result<Option<RotationPool>>;

    /// Insert or update pool configuration. The cursor and version of an existing pool
    /// are kept; a new pool starts from the never-run cursor.
    fn upsert_pool(&self, pool: &RotationPool) -> anyhow::Result<()>;
    /// Remove a pool with its cursor, runs and lease. Returns false if it did not exist.
    fn delete_pool(&self, pool_id: &PoolId) -> anyhow::Result<bool>;

    /// Attempt to take the pool's lease. Expired leases are reclaimed.
    fn try_acquire_lease(&self, pool_id: &PoolId, worker_id: &str, ttl_secs: i64, now_unix: i64) -> anyhow::Result<bool>;
    fn release_lease(&self, pool_id: &PoolId, worker_id: &str) -> anyhow::Result<()>;

    /// Advance the cursor and record the run atomically, guarded by `expected_version`.
    fn commit_run(&self, commit: &RunCommit) -> anyhow::Result<CommitOutcome>;

    /// Runs of a pool, oldest first.
    fn list_runs(&self, pool_id: &PoolId) -> anyhow::Result<Vec<RunRecord>>;
    fn get_run(&self, run_id: &RunId) -> anyhow::Result<Option<RunRecord>>;
    /// Committed runs not yet handed off, oldest first.
    fn undelivered_runs(&self) -> anyhow::Result<Vec<RunRecord>>;
    fn mark_delivered(&self, run_id: &RunId, now_unix: i64) -> anyhow::Result<()>;
}

/// Resolves the ids a pool refers to. `Ok(None)` means the id no longer exists.
pub trait Directory: Send + Sync {
    fn resolve_member(&self, id: &MemberId) -> anyhow::Result<Option<Member>>;
    fn resolve_task(&self, id: &TaskId) -> anyhow::Result<Option<Task>>;

    fn list_members(&self) -> anyhow::Result<Vec<Member>>;
    fn list_tasks(&self) -> anyhow::Result<Vec<Task>>;
}
