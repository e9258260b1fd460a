use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;
use rusqlite::types::Type;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use rota_core::{
    Assignment, Cursor, Frequency, Member, MemberId, PoolId, RotationPool, RunId, RunRecord, Task, TaskId, WeekdaySet,
};
use rota_storage::{CommitOutcome, Directory, RunCommit, Storage};

const POOL_COLUMNS: &str = "id, name, description, is_active, member_ids_json, task_ids_json, active_weekdays_json, \
     frequency, tasks_per_member, start_date, end_date, last_run_date, last_member_index, last_task_index, version";

pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn = Connection::open(db_path).with_context(|| format!("open sqlite db {}", db_path.display()))?;
        // several `rota tick` processes may share one db
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        let init_sql = include_str!("../migrations/0001_init.sql");
        conn.execute_batch(init_sql).context("apply schema")?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| anyhow!("sqlite connection lock poisoned"))
    }

    pub fn upsert_member(&self, member: &Member) -> Result<()> {
        let conn = self.lock()?;
        write_member(&conn, member)
    }

    pub fn upsert_task(&self, task: &Task) -> Result<()> {
        let conn = self.lock()?;
        write_task(&conn, task)
    }

    /// Write members, tasks and pool configurations in one transaction.
    /// Existing cursors are kept, as with `upsert_pool`.
    pub fn import(&self, members: &[Member], tasks: &[Task], pools: &[RotationPool]) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        for m in members {
            write_member(&tx, m)?;
        }
        for t in tasks {
            write_task(&tx, t)?;
        }
        for p in pools {
            write_pool(&tx, p).with_context(|| format!("import pool {}", p.id))?;
        }
        tx.commit().context("commit import")?;
        Ok(())
    }

    pub fn remove_member(&self, id: &MemberId) -> Result<bool> {
        let conn = self.lock()?;
        Ok(conn.execute("DELETE FROM members WHERE id=?1", params![id.0])? > 0)
    }

    pub fn remove_task(&self, id: &TaskId) -> Result<bool> {
        let conn = self.lock()?;
        Ok(conn.execute("DELETE FROM tasks WHERE id=?1", params![id.0])? > 0)
    }

    fn pool_from_row(r: &Row) -> rusqlite::Result<RotationPool> {
        let member_ids: Vec<MemberId> = json_column(r, 4)?;
        let task_ids: Vec<TaskId> = json_column(r, 5)?;
        let active_weekdays: WeekdaySet = json_column(r, 6)?;
        let frequency: Frequency = r
            .get::<_, String>(7)?
            .parse()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(7, Type::Text, Box::new(e)))?;
        Ok(RotationPool {
            id: PoolId::from_str(r.get::<_, String>(0)?),
            name: r.get(1)?,
            description: r.get(2)?,
            is_active: r.get(3)?,
            member_ids,
            task_ids,
            active_weekdays,
            frequency,
            tasks_per_member: r.get(8)?,
            start_date: r.get(9)?,
            end_date: r.get(10)?,
            cursor: Cursor {
                last_run_date: r.get(11)?,
                last_member_index: index_from_sql(r.get(12)?),
                last_task_index: index_from_sql(r.get(13)?),
            },
            version: r.get::<_, i64>(14)? as u64,
        })
    }

    fn load_runs(conn: &Connection, filter_sql: &str, filter: &[&dyn rusqlite::ToSql]) -> Result<Vec<RunRecord>> {
        let mut runs = vec![];
        {
            let sql = format!(
                "SELECT id, pool_id, run_date, delivered_at FROM runs {} ORDER BY created_at, run_date",
                filter_sql
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(filter, |r| {
                let delivered_at: Option<i64> = r.get(3)?;
                Ok(RunRecord {
                    id: RunId::from_str(r.get::<_, String>(0)?),
                    pool_id: PoolId::from_str(r.get::<_, String>(1)?),
                    run_date: r.get::<_, NaiveDate>(2)?,
                    assignments: vec![],
                    delivered: delivered_at.is_some(),
                })
            })?;
            for row in rows {
                runs.push(row?);
            }
        }

        let mut stmt =
            conn.prepare("SELECT turn_number, member_id, task_id FROM assignments WHERE run_id=?1 ORDER BY turn_number")?;
        for run in runs.iter_mut() {
            let rows = stmt.query_map(params![run.id.0], |r| {
                Ok(Assignment {
                    turn_number: r.get(0)?,
                    member_id: MemberId::from_str(r.get::<_, String>(1)?),
                    task_id: TaskId::from_str(r.get::<_, String>(2)?),
                })
            })?;
            for row in rows {
                run.assignments.push(row?);
            }
        }
        Ok(runs)
    }
}

impl Storage for SqliteStorage {
    fn list_pools(&self) -> Result<Vec<RotationPool>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!("SELECT {POOL_COLUMNS} FROM pools ORDER BY id"))?;
        let rows = stmt.query_map([], Self::pool_from_row)?;
        let mut pools = vec![];
        for row in rows {
            pools.push(row?);
        }
        Ok(pools)
    }

    fn get_pool(&self, pool_id: &PoolId) -> Result<Option<RotationPool>> {
        let conn = self.lock()?;
        let pool = conn
            .query_row(
                &format!("SELECT {POOL_COLUMNS} FROM pools WHERE id=?1"),
                params![pool_id.0],
                Self::pool_from_row,
            )
            .optional()?;
        Ok(pool)
    }

    fn upsert_pool(&self, pool: &RotationPool) -> Result<()> {
        let conn = self.lock()?;
        write_pool(&conn, pool)
    }

    fn delete_pool(&self, pool_id: &PoolId) -> Result<bool> {
        let conn = self.lock()?;
        // runs, assignments and leases go with it via ON DELETE CASCADE
        Ok(conn.execute("DELETE FROM pools WHERE id=?1", params![pool_id.0])? > 0)
    }

    fn try_acquire_lease(&self, pool_id: &PoolId, worker_id: &str, ttl_secs: i64, now_unix: i64) -> Result<bool> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM leases WHERE pool_id=?1 AND expires_at <= ?2", params![pool_id.0, now_unix])?;

        // primary key on pool_id ensures exclusivity
        let res = tx.execute(
            "INSERT INTO leases(pool_id, worker_id, acquired_at, expires_at) VALUES (?1, ?2, ?3, ?4)",
            params![pool_id.0, worker_id, now_unix, now_unix + ttl_secs],
        );

        match res {
            Ok(_) => {
                tx.commit()?;
                Ok(true)
            }
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                tx.commit()?;
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn release_lease(&self, pool_id: &PoolId, worker_id: &str) -> Result<()> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM leases WHERE pool_id=?1 AND worker_id=?2", params![pool_id.0, worker_id])?;
        Ok(())
    }

    fn commit_run(&self, commit: &RunCommit) -> Result<CommitOutcome> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let updated = tx.execute(
            "UPDATE pools SET last_run_date=?1, last_member_index=?2, last_task_index=?3, version=version+1
             WHERE id=?4 AND version=?5",
            params![
                commit.cursor.last_run_date,
                index_to_sql(commit.cursor.last_member_index),
                index_to_sql(commit.cursor.last_task_index),
                commit.pool_id.0,
                commit.expected_version as i64,
            ],
        )?;
        if updated == 0 {
            // dropping tx rolls back
            return Ok(CommitOutcome::Conflict);
        }

        let inserted = tx.execute(
            "INSERT OR IGNORE INTO runs(id, pool_id, run_date, created_at, delivered_at) VALUES (?1, ?2, ?3, ?4, NULL)",
            params![commit.run.id.0, commit.pool_id.0, commit.run.run_date, crate::now_unix()],
        )?;
        if inserted == 0 {
            return Ok(CommitOutcome::Conflict);
        }

        {
            let mut stmt =
                tx.prepare("INSERT INTO assignments(run_id, turn_number, member_id, task_id) VALUES (?1, ?2, ?3, ?4)")?;
            for a in &commit.run.assignments {
                stmt.execute(params![commit.run.id.0, a.turn_number, a.member_id.0, a.task_id.0])?;
            }
        }

        tx.commit().context("commit run")?;
        Ok(CommitOutcome::Committed)
    }

    fn list_runs(&self, pool_id: &PoolId) -> Result<Vec<RunRecord>> {
        let conn = self.lock()?;
        Self::load_runs(&conn, "WHERE pool_id=?1", &[&pool_id.0])
    }

    fn get_run(&self, run_id: &RunId) -> Result<Option<RunRecord>> {
        let conn = self.lock()?;
        Ok(Self::load_runs(&conn, "WHERE id=?1", &[&run_id.0])?.pop())
    }

    fn undelivered_runs(&self) -> Result<Vec<RunRecord>> {
        let conn = self.lock()?;
        Self::load_runs(&conn, "WHERE delivered_at IS NULL", &[])
    }

    fn mark_delivered(&self, run_id: &RunId, now_unix: i64) -> Result<()> {
        let conn = self.lock()?;
        conn.execute("UPDATE runs SET delivered_at=?1 WHERE id=?2", params![now_unix, run_id.0])?;
        Ok(())
    }
}

impl Directory for SqliteStorage {
    fn resolve_member(&self, id: &MemberId) -> Result<Option<Member>> {
        let conn = self.lock()?;
        let member = conn
            .query_row("SELECT id, display_name FROM members WHERE id=?1", params![id.0], |r| {
                Ok(Member { id: MemberId::from_str(r.get::<_, String>(0)?), display_name: r.get(1)? })
            })
            .optional()?;
        Ok(member)
    }

    fn resolve_task(&self, id: &TaskId) -> Result<Option<Task>> {
        let conn = self.lock()?;
        let task = conn
            .query_row("SELECT id, title FROM tasks WHERE id=?1", params![id.0], |r| {
                Ok(Task { id: TaskId::from_str(r.get::<_, String>(0)?), title: r.get(1)? })
            })
            .optional()?;
        Ok(task)
    }

    fn list_members(&self) -> Result<Vec<Member>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT id, display_name FROM members ORDER BY id")?;
        let rows = stmt.query_map([], |r| {
            Ok(Member { id: MemberId::from_str(r.get::<_, String>(0)?), display_name: r.get(1)? })
        })?;
        let mut members = vec![];
        for row in rows {
            members.push(row?);
        }
        Ok(members)
    }

    fn list_tasks(&self) -> Result<Vec<Task>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT id, title FROM tasks ORDER BY id")?;
        let rows = stmt.query_map([], |r| Ok(Task { id: TaskId::from_str(r.get::<_, String>(0)?), title: r.get(1)? }))?;
        let mut tasks = vec![];
        for row in rows {
            tasks.push(row?);
        }
        Ok(tasks)
    }
}

fn write_member(conn: &Connection, member: &Member) -> Result<()> {
    conn.execute(
        "INSERT INTO members(id, display_name) VALUES (?1, ?2)
         ON CONFLICT(id) DO UPDATE SET display_name=excluded.display_name",
        params![member.id.0, member.display_name],
    )?;
    Ok(())
}

fn write_task(conn: &Connection, task: &Task) -> Result<()> {
    conn.execute(
        "INSERT INTO tasks(id, title) VALUES (?1, ?2) ON CONFLICT(id) DO UPDATE SET title=excluded.title",
        params![task.id.0, task.title],
    )?;
    Ok(())
}

/// Configuration columns only; the cursor and version of an existing pool are left alone.
fn write_pool(conn: &Connection, pool: &RotationPool) -> Result<()> {
    conn.execute(
        "INSERT INTO pools(id, name, description, is_active, member_ids_json, task_ids_json, active_weekdays_json,
                           frequency, tasks_per_member, start_date, end_date)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
         ON CONFLICT(id) DO UPDATE SET
           name=excluded.name,
           description=excluded.description,
           is_active=excluded.is_active,
           member_ids_json=excluded.member_ids_json,
           task_ids_json=excluded.task_ids_json,
           active_weekdays_json=excluded.active_weekdays_json,
           frequency=excluded.frequency,
           tasks_per_member=excluded.tasks_per_member,
           start_date=excluded.start_date,
           end_date=excluded.end_date",
        params![
            pool.id.0,
            pool.name,
            pool.description,
            pool.is_active,
            serde_json::to_string(&pool.member_ids)?,
            serde_json::to_string(&pool.task_ids)?,
            serde_json::to_string(&pool.active_weekdays)?,
            pool.frequency.as_str(),
            pool.tasks_per_member,
            pool.start_date,
            pool.end_date,
        ],
    )?;
    Ok(())
}

fn json_column<T: serde::de::DeserializeOwned>(r: &Row, idx: usize) -> rusqlite::Result<T> {
    let s: String = r.get(idx)?;
    serde_json::from_str(&s).map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Cursor indices are stored with -1 for "never run".
fn index_from_sql(v: i64) -> Option<usize> {
    (v >= 0).then_some(v as usize)
}

fn index_to_sql(v: Option<usize>) -> i64 {
    v.map_or(-1, |i| i as i64)
}

pub fn now_unix() -> i64 {
    chrono::Utc::now().timestamp()
}
