use chrono::NaiveDate;

use crate::{Assignment, Cursor, MemberId, TaskId};

/// Output of one pass of the assignment walk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Batch {
    pub assignments: Vec<Assignment>,
    pub last_member_index: Option<usize>,
    pub last_task_index: Option<usize>,
}

impl Batch {
    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }
}

impl Cursor {
    /// Cursor after `batch` ran on `date`. An empty batch leaves the cursor untouched.
    pub fn advance(&self, batch: &Batch, date: NaiveDate) -> Cursor {
        if batch.is_empty() {
            return *self;
        }
        Cursor {
            last_run_date: Some(date),
            last_member_index: batch.last_member_index,
            last_task_index: batch.last_task_index,
        }
    }
}

/// Compute the next run's assignments.
///
/// Members are walked cyclically from the one after `cursor.last_member_index`; each
/// receives up to `tasks_per_member` tasks. The task offset is a single counter for the
/// whole run starting after `cursor.last_task_index`, so tasks never restart per member.
/// At most `min(members * tasks_per_member, tasks)` assignments are produced, which keeps
/// every task unique within the run.
///
/// Pure: identical inputs always yield identical output.
pub fn next_batch(members: &[MemberId], tasks: &[TaskId], tasks_per_member: u32, cursor: &Cursor) -> Batch {
    let m = members.len();
    let n = tasks.len();
    let k = tasks_per_member as usize;

    let unchanged = Batch {
        assignments: vec![],
        last_member_index: cursor.last_member_index,
        last_task_index: cursor.last_task_index,
    };
    if m == 0 || n == 0 {
        return unchanged;
    }

    let total = m.saturating_mul(k).min(n);
    if total == 0 {
        return unchanged;
    }

    let member_start = cursor.last_member_index.map_or(0, |i| (i + 1) % m);
    let task_start = cursor.last_task_index.map_or(0, |i| (i + 1) % n);

    let mut assignments = Vec::with_capacity(total);
    let mut last_member = None;
    let mut last_task = None;
    let mut task_offset = 0usize;

    'members: for step in 0..m {
        let mi = (member_start + step) % m;
        for _ in 0..k {
            if assignments.len() == total {
                break 'members;
            }
            let ti = (task_start + task_offset) % n;
            task_offset += 1;
            assignments.push(Assignment {
                turn_number: assignments.len() as u32 + 1,
                member_id: members[mi].clone(),
                task_id: tasks[ti].clone(),
            });
            last_member = Some(mi);
            last_task = Some(ti);
        }
    }

    Batch {
        assignments,
        last_member_index: last_member,
        last_task_index: last_task,
    }
}
