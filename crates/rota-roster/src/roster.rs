use std::collections::HashSet;

use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;
use rota_core::{Frequency, Member, MemberId, PoolId, RotationPool, Task, TaskId, WeekdaySet};
use serde::{Deserialize, Serialize};

/// Bulk authoring format: members, tasks and the pools that rotate them.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Roster {
    #[serde(default)]
    pub members: Vec<MemberEntry>,
    #[serde(default)]
    pub tasks: Vec<TaskEntry>,
    #[serde(default)]
    pub pools: Vec<PoolEntry>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MemberEntry {
    pub id: String,
    pub name: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TaskEntry {
    pub id: String,
    pub title: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PoolEntry {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub members: Vec<String>,
    #[serde(default)]
    pub tasks: Vec<String>,
    #[serde(default = "WeekdaySet::all")]
    pub weekdays: WeekdaySet,
    #[serde(default)]
    pub frequency: Frequency,
    #[serde(default = "default_tasks_per_member")]
    pub tasks_per_member: u32,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
}

fn default_active() -> bool {
    true
}

fn default_tasks_per_member() -> u32 {
    1
}

impl PoolEntry {
    /// Pool configuration with a fresh cursor. Storage keeps the existing cursor on upsert.
    pub fn to_pool(&self) -> RotationPool {
        let mut pool = RotationPool::new(PoolId::from_str(self.id.clone()), self.name.clone());
        pool.description = self.description.clone();
        pool.is_active = self.active;
        pool.member_ids = self.members.iter().map(|m| MemberId::from_str(m.clone())).collect();
        pool.task_ids = self.tasks.iter().map(|t| TaskId::from_str(t.clone())).collect();
        pool.active_weekdays = self.weekdays;
        pool.frequency = self.frequency;
        pool.tasks_per_member = self.tasks_per_member;
        pool.start_date = self.start_date;
        pool.end_date = self.end_date;
        pool
    }
}

impl Roster {
    pub fn members(&self) -> Vec<Member> {
        self.members
            .iter()
            .map(|m| Member { id: MemberId::from_str(m.id.clone()), display_name: m.name.clone() })
            .collect()
    }

    pub fn tasks(&self) -> Vec<Task> {
        self.tasks
            .iter()
            .map(|t| Task { id: TaskId::from_str(t.id.clone()), title: t.title.clone() })
            .collect()
    }

    pub fn pools(&self) -> Vec<RotationPool> {
        self.pools.iter().map(PoolEntry::to_pool).collect()
    }
}

pub fn load_roster(path: &std::path::Path) -> Result<Roster> {
    let s = std::fs::read_to_string(path).with_context(|| format!("read roster: {}", path.display()))?;
    parse_roster(&s)
}

pub fn parse_roster(s: &str) -> Result<Roster> {
    let roster: Roster = serde_yaml::from_str(s).with_context(|| "parse roster yaml")?;
    validate_roster(&roster)?;
    Ok(roster)
}

/// Structural checks only. Pool-level rules live in rota-validate.
pub fn validate_roster(roster: &Roster) -> Result<()> {
    unique_ids("member", roster.members.iter().map(|m| m.id.as_str()))?;
    unique_ids("task", roster.tasks.iter().map(|t| t.id.as_str()))?;
    unique_ids("pool", roster.pools.iter().map(|p| p.id.as_str()))?;
    for pool in &roster.pools {
        if pool.name.trim().is_empty() {
            return Err(anyhow!("pool {} missing name", pool.id));
        }
        if pool.members.iter().chain(pool.tasks.iter()).any(|id| id.trim().is_empty()) {
            return Err(anyhow!("pool {} lists an empty id", pool.id));
        }
    }
    Ok(())
}

fn unique_ids<'a>(kind: &str, ids: impl Iterator<Item = &'a str>) -> Result<()> {
    let mut seen = HashSet::new();
    for id in ids {
        if id.trim().is_empty() {
            return Err(anyhow!("{kind} with empty id"));
        }
        if !seen.insert(id) {
            return Err(anyhow!("duplicate {kind} id {id}"));
        }
    }
    Ok(())
}
