use chrono::NaiveDate;

use crate::{evaluate, next_batch, Batch, Cursor, MemberId, RotationPool, SkipReason, TaskId, Trigger};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RunPlan {
    Skip(SkipReason),
    Run { batch: Batch, cursor: Cursor },
}

/// Trigger check plus assignment walk for one pool on one day.
///
/// `members` and `tasks` are the pool's lists after resolution, in stored order.
/// Both the live engine and the forecast go through here.
pub fn plan_run(pool: &RotationPool, members: &[MemberId], tasks: &[TaskId], today: NaiveDate) -> RunPlan {
    if let Trigger::Skip(reason) = evaluate(pool, today) {
        return RunPlan::Skip(reason);
    }
    let batch = next_batch(members, tasks, pool.tasks_per_member, &pool.cursor);
    if batch.is_empty() {
        return RunPlan::Skip(SkipReason::EmptyRoster);
    }
    let cursor = pool.cursor.advance(&batch, today);
    RunPlan::Run { batch, cursor }
}
