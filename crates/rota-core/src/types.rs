use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{ids::*, model::*};

/// A member as seen through the directory.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub id: MemberId,
    pub display_name: String,
}

/// A task as seen through the directory.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
}

/// Persisted scheduler position for one pool.
///
/// Indices are positional into the pool's member/task lists as they were when the
/// last run happened. `None` means the pool has never run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    pub last_run_date: Option<NaiveDate>,
    pub last_member_index: Option<usize>,
    pub last_task_index: Option<usize>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RotationPool {
    pub id: PoolId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub is_active: bool,
    pub task_ids: Vec<TaskId>,
    pub member_ids: Vec<MemberId>,
    pub active_weekdays: WeekdaySet,
    pub frequency: Frequency,
    pub tasks_per_member: u32,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub cursor: Cursor,
    /// Optimistic concurrency token, bumped by every committed run.
    #[serde(default)]
    pub version: u64,
}

impl RotationPool {
    /// An active daily pool that may run on any weekday, with one task per member.
    pub fn new(id: PoolId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            description: String::new(),
            is_active: true,
            task_ids: vec![],
            member_ids: vec![],
            active_weekdays: WeekdaySet::all(),
            frequency: Frequency::Daily,
            tasks_per_member: 1,
            start_date: None,
            end_date: None,
            cursor: Cursor::default(),
            version: 0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    /// 1-based position in the run's assignment order.
    pub turn_number: u32,
    pub member_id: MemberId,
    pub task_id: TaskId,
}

/// One committed run and the assignments it produced.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: RunId,
    pub pool_id: PoolId,
    pub run_date: NaiveDate,
    pub assignments: Vec<Assignment>,
    pub delivered: bool,
}
