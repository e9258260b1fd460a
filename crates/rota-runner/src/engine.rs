use anyhow::Result;
use chrono::NaiveDate;
use rota_core::{evaluate, plan_run, MemberId, PoolId, RotationPool, RunId, RunPlan, RunRecord, SkipReason, TaskId, Trigger};
use rota_storage::{CommitOutcome, Directory, RunCommit, Storage};
use tracing::{debug, info, warn};

use crate::sink::AssignmentSink;

pub const DEFAULT_LEASE_TTL_SECS: i64 = 300;

/// A pool's lists after resolving ids against the directory, stored order kept.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResolvedRoster {
    pub members: Vec<MemberId>,
    pub tasks: Vec<TaskId>,
    pub missing_members: Vec<MemberId>,
    pub missing_tasks: Vec<TaskId>,
}

/// Resolve a pool's ids, dropping any that are gone or fail to resolve.
/// The pool's stored lists are left as they are.
pub fn resolve_roster(directory: &dyn Directory, pool: &RotationPool) -> ResolvedRoster {
    let mut roster = ResolvedRoster::default();
    for id in &pool.member_ids {
        match directory.resolve_member(id) {
            Ok(Some(_)) => roster.members.push(id.clone()),
            Ok(None) => roster.missing_members.push(id.clone()),
            Err(e) => {
                warn!(pool = %pool.id, member = %id, "member lookup failed: {e:#}");
                roster.missing_members.push(id.clone());
            }
        }
    }
    for id in &pool.task_ids {
        match directory.resolve_task(id) {
            Ok(Some(_)) => roster.tasks.push(id.clone()),
            Ok(None) => roster.missing_tasks.push(id.clone()),
            Err(e) => {
                warn!(pool = %pool.id, task = %id, "task lookup failed: {e:#}");
                roster.missing_tasks.push(id.clone());
            }
        }
    }
    roster
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PoolOutcome {
    Assigned { run_id: RunId, assignments: usize, delivered: bool },
    Skipped(SkipReason),
    /// Storage failed; nothing was committed and the pool stays due.
    Failed(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PoolReport {
    pub pool_id: PoolId,
    pub outcome: PoolOutcome,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TickReport {
    pub date: NaiveDate,
    /// Runs from earlier ticks handed off during this one.
    pub redelivered: usize,
    pub pools: Vec<PoolReport>,
}

impl TickReport {
    pub fn has_failures(&self) -> bool {
        self.pools.iter().any(|p| matches!(p.outcome, PoolOutcome::Failed(_)))
    }

    pub fn assigned(&self) -> impl Iterator<Item = &PoolReport> {
        self.pools.iter().filter(|p| matches!(p.outcome, PoolOutcome::Assigned { .. }))
    }
}

/// Runs due pools once per tick and hands committed runs to the sink.
pub struct RotationEngine<'a> {
    storage: &'a dyn Storage,
    directory: &'a dyn Directory,
    sink: &'a dyn AssignmentSink,
    worker_id: String,
    lease_ttl_secs: i64,
}

impl<'a> RotationEngine<'a> {
    pub fn new(
        storage: &'a dyn Storage,
        directory: &'a dyn Directory,
        sink: &'a dyn AssignmentSink,
        worker_id: impl Into<String>,
    ) -> Self {
        Self {
            storage,
            directory,
            sink,
            worker_id: worker_id.into(),
            lease_ttl_secs: DEFAULT_LEASE_TTL_SECS,
        }
    }

    pub fn with_lease_ttl(mut self, ttl_secs: i64) -> Self {
        self.lease_ttl_secs = ttl_secs;
        self
    }

    /// Evaluate every pool for `today`.
    ///
    /// Only a failure to list pools fails the tick; per-pool storage errors are
    /// reported as [`PoolOutcome::Failed`] and the remaining pools still run.
    pub fn tick(&self, today: NaiveDate, now_unix: i64) -> Result<TickReport> {
        let redelivered = self.redeliver(now_unix);
        let pools = self.storage.list_pools()?;

        let mut reports = Vec::with_capacity(pools.len());
        for pool in pools {
            let outcome = match evaluate(&pool, today) {
                Trigger::Skip(reason) => {
                    debug!(pool = %pool.id, reason = reason.as_str(), "not due");
                    PoolOutcome::Skipped(reason)
                }
                Trigger::Due => match self.run_pool(&pool.id, today, now_unix) {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        warn!(pool = %pool.id, "run failed, pool stays due: {e:#}");
                        PoolOutcome::Failed(format!("{e:#}"))
                    }
                },
            };
            reports.push(PoolReport { pool_id: pool.id, outcome });
        }

        Ok(TickReport { date: today, redelivered, pools: reports })
    }

    /// Run one pool under its lease.
    pub fn run_pool(&self, pool_id: &PoolId, today: NaiveDate, now_unix: i64) -> Result<PoolOutcome> {
        if !self.storage.try_acquire_lease(pool_id, &self.worker_id, self.lease_ttl_secs, now_unix)? {
            debug!(pool = %pool_id, "lease held elsewhere");
            return Ok(PoolOutcome::Skipped(SkipReason::Locked));
        }
        let result = self.run_locked(pool_id, today, now_unix);
        if let Err(e) = self.storage.release_lease(pool_id, &self.worker_id) {
            warn!(pool = %pool_id, "release lease: {e:#}");
        }
        result
    }

    fn run_locked(&self, pool_id: &PoolId, today: NaiveDate, now_unix: i64) -> Result<PoolOutcome> {
        // re-read under the lease; the listed snapshot may be stale
        let Some(pool) = self.storage.get_pool(pool_id)? else {
            return Ok(PoolOutcome::Skipped(SkipReason::Conflict));
        };
        let roster = resolve_roster(self.directory, &pool);
        if !roster.missing_members.is_empty() || !roster.missing_tasks.is_empty() {
            warn!(
                pool = %pool.id,
                missing_members = roster.missing_members.len(),
                missing_tasks = roster.missing_tasks.len(),
                "skipping unresolved ids for this run"
            );
        }

        let (batch, cursor) = match plan_run(&pool, &roster.members, &roster.tasks, today) {
            RunPlan::Skip(reason) => {
                debug!(pool = %pool.id, reason = reason.as_str(), "skipped");
                return Ok(PoolOutcome::Skipped(reason));
            }
            RunPlan::Run { batch, cursor } => (batch, cursor),
        };

        let commit = RunCommit {
            pool_id: pool.id.clone(),
            expected_version: pool.version,
            cursor,
            run: RunRecord {
                id: RunId::for_pool_date(&pool.id, today),
                pool_id: pool.id.clone(),
                run_date: today,
                assignments: batch.assignments,
                delivered: false,
            },
        };

        match self.storage.commit_run(&commit)? {
            CommitOutcome::Conflict => {
                info!(pool = %pool.id, "cursor moved underneath us; leaving run to the other writer");
                Ok(PoolOutcome::Skipped(SkipReason::Conflict))
            }
            CommitOutcome::Committed => {
                info!(pool = %pool.id, run = %commit.run.id, assignments = commit.run.assignments.len(), "run committed");
                let delivered = self.deliver(&commit.run, now_unix);
                Ok(PoolOutcome::Assigned {
                    run_id: commit.run.id,
                    assignments: commit.run.assignments.len(),
                    delivered,
                })
            }
        }
    }

    fn deliver(&self, run: &RunRecord, now_unix: i64) -> bool {
        if let Err(e) = self.sink.deliver(run) {
            warn!(run = %run.id, "hand-off failed, will retry next tick: {e:#}");
            return false;
        }
        if let Err(e) = self.storage.mark_delivered(&run.id, now_unix) {
            warn!(run = %run.id, "mark delivered: {e:#}");
        }
        true
    }

    /// Hand off committed runs an earlier tick could not deliver.
    ///
    /// Each run is handed off under its pool's lease, so a worker still delivering
    /// a fresh run keeps others from sending it again.
    fn redeliver(&self, now_unix: i64) -> usize {
        let pending = match self.storage.undelivered_runs() {
            Ok(p) => p,
            Err(e) => {
                warn!("load undelivered runs: {e:#}");
                return 0;
            }
        };

        let mut delivered = 0;
        for run in &pending {
            match self.redeliver_locked(run, now_unix) {
                Ok(true) => delivered += 1,
                Ok(false) => {}
                Err(e) => warn!(run = %run.id, "redelivery failed: {e:#}"),
            }
        }
        delivered
    }

    fn redeliver_locked(&self, run: &RunRecord, now_unix: i64) -> Result<bool> {
        if !self.storage.try_acquire_lease(&run.pool_id, &self.worker_id, self.lease_ttl_secs, now_unix)? {
            debug!(pool = %run.pool_id, run = %run.id, "lease held elsewhere; leaving run for its holder");
            return Ok(false);
        }
        // the holder we waited on may have delivered it meanwhile
        let result = match self.storage.get_run(&run.id) {
            Ok(Some(current)) if !current.delivered => Ok(self.deliver(&current, now_unix)),
            Ok(_) => Ok(false),
            Err(e) => Err(e),
        };
        if let Err(e) = self.storage.release_lease(&run.pool_id, &self.worker_id) {
            warn!(pool = %run.pool_id, "release lease: {e:#}");
        }
        result
    }
}
