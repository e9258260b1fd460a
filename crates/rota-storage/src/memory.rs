use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use anyhow::anyhow;
use rota_core::{Cursor, Member, MemberId, PoolId, RotationPool, RunId, RunRecord, Task, TaskId};

use crate::traits::{CommitOutcome, Directory, RunCommit, Storage};

/// In-memory storage and directory for tests. Not durable.
#[derive(Default)]
pub struct InMemoryStorage {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    pools: BTreeMap<String, RotationPool>,
    leases: HashMap<String, Lease>,
    runs: Vec<RunRecord>,
    members: BTreeMap<String, Member>,
    tasks: BTreeMap<String, Task>,
}

struct Lease {
    worker_id: String,
    expires_at_unix: i64,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> anyhow::Result<MutexGuard<'_, Inner>> {
        self.inner.lock().map_err(|_| anyhow!("in-memory storage lock poisoned"))
    }

    pub fn upsert_member(&self, member: Member) -> anyhow::Result<()> {
        self.lock()?.members.insert(member.id.0.clone(), member);
        Ok(())
    }

    pub fn upsert_task(&self, task: Task) -> anyhow::Result<()> {
        self.lock()?.tasks.insert(task.id.0.clone(), task);
        Ok(())
    }

    pub fn remove_member(&self, id: &MemberId) -> anyhow::Result<bool> {
        Ok(self.lock()?.members.remove(&id.0).is_some())
    }

    pub fn remove_task(&self, id: &TaskId) -> anyhow::Result<bool> {
        Ok(self.lock()?.tasks.remove(&id.0).is_some())
    }
}

impl Storage for InMemoryStorage {
    fn list_pools(&self) -> anyhow::Result<Vec<RotationPool>> {
        Ok(self.lock()?.pools.values().cloned().collect())
    }

    fn get_pool(&self, pool_id: &PoolId) -> anyhow::Result<Option<RotationPool>> {
        Ok(self.lock()?.pools.get(&pool_id.0).cloned())
    }

    fn upsert_pool(&self, pool: &RotationPool) -> anyhow::Result<()> {
        let mut inner = self.lock()?;
        let mut next = pool.clone();
        match inner.pools.get(&pool.id.0) {
            Some(existing) => {
                next.cursor = existing.cursor;
                next.version = existing.version;
            }
            None => {
                next.cursor = Cursor::default();
                next.version = 0;
            }
        }
        inner.pools.insert(pool.id.0.clone(), next);
        Ok(())
    }

    fn delete_pool(&self, pool_id: &PoolId) -> anyhow::Result<bool> {
        let mut inner = self.lock()?;
        let existed = inner.pools.remove(&pool_id.0).is_some();
        inner.leases.remove(&pool_id.0);
        inner.runs.retain(|r| r.pool_id != *pool_id);
        Ok(existed)
    }

    fn try_acquire_lease(&self, pool_id: &PoolId, worker_id: &str, ttl_secs: i64, now_unix: i64) -> anyhow::Result<bool> {
        let mut inner = self.lock()?;
        if let Some(l) = inner.leases.get(&pool_id.0) {
            if l.expires_at_unix > now_unix {
                return Ok(false);
            }
        }
        inner.leases.insert(pool_id.0.clone(), Lease {
            worker_id: worker_id.to_string(),
            expires_at_unix: now_unix + ttl_secs,
        });
        Ok(true)
    }

    fn release_lease(&self, pool_id: &PoolId, worker_id: &str) -> anyhow::Result<()> {
        let mut inner = self.lock()?;
        if let Some(l) = inner.leases.get(&pool_id.0) {
            if l.worker_id == worker_id {
                inner.leases.remove(&pool_id.0);
            }
        }
        Ok(())
    }

    fn commit_run(&self, commit: &RunCommit) -> anyhow::Result<CommitOutcome> {
        let mut inner = self.lock()?;
        if inner.runs.iter().any(|r| r.id == commit.run.id) {
            return Ok(CommitOutcome::Conflict);
        }
        let Some(pool) = inner.pools.get_mut(&commit.pool_id.0) else {
            return Ok(CommitOutcome::Conflict);
        };
        if pool.version != commit.expected_version {
            return Ok(CommitOutcome::Conflict);
        }
        pool.cursor = commit.cursor;
        pool.version += 1;
        inner.runs.push(RunRecord { delivered: false, ..commit.run.clone() });
        Ok(CommitOutcome::Committed)
    }

    fn list_runs(&self, pool_id: &PoolId) -> anyhow::Result<Vec<RunRecord>> {
        Ok(self.lock()?.runs.iter().filter(|r| r.pool_id == *pool_id).cloned().collect())
    }

    fn get_run(&self, run_id: &RunId) -> anyhow::Result<Option<RunRecord>> {
        Ok(self.lock()?.runs.iter().find(|r| r.id == *run_id).cloned())
    }

    fn undelivered_runs(&self) -> anyhow::Result<Vec<RunRecord>> {
        Ok(self.lock()?.runs.iter().filter(|r| !r.delivered).cloned().collect())
    }

    fn mark_delivered(&self, run_id: &RunId, _now_unix: i64) -> anyhow::Result<()> {
        let mut inner = self.lock()?;
        if let Some(r) = inner.runs.iter_mut().find(|r| r.id == *run_id) {
            r.delivered = true;
        }
        Ok(())
    }
}

impl Directory for InMemoryStorage {
    fn resolve_member(&self, id: &MemberId) -> anyhow::Result<Option<Member>> {
        Ok(self.lock()?.members.get(&id.0).cloned())
    }

    fn resolve_task(&self, id: &TaskId) -> anyhow::Result<Option<Task>> {
        Ok(self.lock()?.tasks.get(&id.0).cloned())
    }

    fn list_members(&self) -> anyhow::Result<Vec<Member>> {
        Ok(self.lock()?.members.values().cloned().collect())
    }

    fn list_tasks(&self) -> anyhow::Result<Vec<Task>> {
        Ok(self.lock()?.tasks.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rota_core::Assignment;

    fn pool(id: &str) -> RotationPool {
        let mut p = RotationPool::new(PoolId::from_str(id), "test pool");
        p.member_ids = vec![MemberId::from_str("a")];
        p.task_ids = vec![TaskId::from_str("t")];
        p
    }

    fn commit(pool_id: &str, expected_version: u64, d: u32) -> RunCommit {
        let date = NaiveDate::from_ymd_opt(2024, 3, d).unwrap();
        let pool_id = PoolId::from_str(pool_id);
        RunCommit {
            pool_id: pool_id.clone(),
            expected_version,
            cursor: Cursor { last_run_date: Some(date), last_member_index: Some(0), last_task_index: Some(0) },
            run: RunRecord {
                id: RunId::for_pool_date(&pool_id, date),
                pool_id,
                run_date: date,
                assignments: vec![Assignment {
                    turn_number: 1,
                    member_id: MemberId::from_str("a"),
                    task_id: TaskId::from_str("t"),
                }],
                delivered: false,
            },
        }
    }

    #[test]
    fn test_new_creates_empty_storage() {
        let storage = InMemoryStorage::new();
        assert!(storage.list_pools().unwrap().is_empty());
        assert!(storage.undelivered_runs().unwrap().is_empty());
        assert!(storage.list_members().unwrap().is_empty());
    }

    #[test]
    fn test_upsert_and_get_pool() {
        let storage = InMemoryStorage::new();
        storage.upsert_pool(&pool("p1")).unwrap();
        let got = storage.get_pool(&PoolId::from_str("p1")).unwrap().unwrap();
        assert_eq!(got.name, "test pool");
        assert!(storage.get_pool(&PoolId::from_str("nope")).unwrap().is_none());
    }

    #[test]
    fn test_upsert_keeps_cursor_of_existing_pool() {
        let storage = InMemoryStorage::new();
        storage.upsert_pool(&pool("p1")).unwrap();
        assert_eq!(storage.commit_run(&commit("p1", 0, 4)).unwrap(), CommitOutcome::Committed);

        let mut edited = pool("p1");
        edited.name = "renamed".into();
        edited.cursor = Cursor::default();
        storage.upsert_pool(&edited).unwrap();

        let got = storage.get_pool(&PoolId::from_str("p1")).unwrap().unwrap();
        assert_eq!(got.name, "renamed");
        assert_eq!(got.version, 1);
        assert_eq!(got.cursor.last_member_index, Some(0));
    }

    #[test]
    fn test_commit_is_version_guarded() {
        let storage = InMemoryStorage::new();
        storage.upsert_pool(&pool("p1")).unwrap();
        assert_eq!(storage.commit_run(&commit("p1", 0, 4)).unwrap(), CommitOutcome::Committed);
        assert_eq!(storage.commit_run(&commit("p1", 0, 5)).unwrap(), CommitOutcome::Conflict);
        assert_eq!(storage.list_runs(&PoolId::from_str("p1")).unwrap().len(), 1);
    }

    #[test]
    fn test_commit_rejects_duplicate_run() {
        let storage = InMemoryStorage::new();
        storage.upsert_pool(&pool("p1")).unwrap();
        storage.commit_run(&commit("p1", 0, 4)).unwrap();
        assert_eq!(storage.commit_run(&commit("p1", 1, 4)).unwrap(), CommitOutcome::Conflict);
    }

    #[test]
    fn test_commit_to_missing_pool_conflicts() {
        let storage = InMemoryStorage::new();
        assert_eq!(storage.commit_run(&commit("ghost", 0, 4)).unwrap(), CommitOutcome::Conflict);
        assert!(storage.undelivered_runs().unwrap().is_empty());
    }

    #[test]
    fn test_delivery_outbox() {
        let storage = InMemoryStorage::new();
        storage.upsert_pool(&pool("p1")).unwrap();
        let c = commit("p1", 0, 4);
        storage.commit_run(&c).unwrap();
        assert_eq!(storage.undelivered_runs().unwrap().len(), 1);
        storage.mark_delivered(&c.run.id, 0).unwrap();
        assert!(storage.undelivered_runs().unwrap().is_empty());
        assert!(storage.list_runs(&c.pool_id).unwrap()[0].delivered);
        assert!(storage.get_run(&c.run.id).unwrap().unwrap().delivered);
    }

    #[test]
    fn test_lease_is_exclusive_until_expiry() {
        let storage = InMemoryStorage::new();
        let p = PoolId::from_str("p1");
        assert!(storage.try_acquire_lease(&p, "w1", 60, 1000).unwrap());
        assert!(!storage.try_acquire_lease(&p, "w2", 60, 1030).unwrap());
        assert!(storage.try_acquire_lease(&p, "w2", 60, 1060).unwrap());

        // only the holder may release
        storage.release_lease(&p, "w1").unwrap();
        assert!(!storage.try_acquire_lease(&p, "w1", 60, 1070).unwrap());
        storage.release_lease(&p, "w2").unwrap();
        assert!(storage.try_acquire_lease(&p, "w1", 60, 1070).unwrap());
    }

    #[test]
    fn test_delete_pool_drops_runs() {
        let storage = InMemoryStorage::new();
        storage.upsert_pool(&pool("p1")).unwrap();
        storage.commit_run(&commit("p1", 0, 4)).unwrap();
        assert!(storage.delete_pool(&PoolId::from_str("p1")).unwrap());
        assert!(!storage.delete_pool(&PoolId::from_str("p1")).unwrap());
        assert!(storage.undelivered_runs().unwrap().is_empty());
    }

    #[test]
    fn test_directory_resolves_known_ids() {
        let storage = InMemoryStorage::new();
        storage.upsert_member(Member { id: MemberId::from_str("a"), display_name: "Ana".into() }).unwrap();
        storage.upsert_task(Task { id: TaskId::from_str("t"), title: "Dishes".into() }).unwrap();
        assert_eq!(storage.resolve_member(&MemberId::from_str("a")).unwrap().unwrap().display_name, "Ana");
        assert!(storage.resolve_member(&MemberId::from_str("b")).unwrap().is_none());
        assert!(storage.remove_task(&TaskId::from_str("t")).unwrap());
        assert!(storage.resolve_task(&TaskId::from_str("t")).unwrap().is_none());
    }
}
