use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::{Frequency, RotationPool};

/// Why a pool did not run on a given tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    Inactive,
    BeforeStart,
    AfterEnd,
    InactiveWeekday,
    AlreadyRanThisPeriod,
    /// No resolvable members or tasks, so the batch came out empty.
    EmptyRoster,
    /// Another worker holds the pool's lease.
    Locked,
    /// The pool's cursor moved between read and commit.
    Conflict,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::Inactive => "inactive",
            SkipReason::BeforeStart => "before_start",
            SkipReason::AfterEnd => "after_end",
            SkipReason::InactiveWeekday => "inactive_weekday",
            SkipReason::AlreadyRanThisPeriod => "already_ran_this_period",
            SkipReason::EmptyRoster => "empty_roster",
            SkipReason::Locked => "locked",
            SkipReason::Conflict => "conflict",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Trigger {
    Due,
    Skip(SkipReason),
}

/// Sunday that starts the week containing `date`, clamped to the earliest representable date.
pub fn week_start(date: NaiveDate) -> NaiveDate {
    date.checked_sub_signed(Duration::days(date.weekday().num_days_from_sunday() as i64))
        .unwrap_or(NaiveDate::MIN)
}

/// Decide whether `pool` should run on `today`.
///
/// Checks run in order: active flag, date window (inclusive on both ends), weekday
/// filter, then the once-per-period rule. A recorded last run later than `today`
/// counts as already ran so the cursor date never moves backwards.
pub fn evaluate(pool: &RotationPool, today: NaiveDate) -> Trigger {
    if !pool.is_active {
        return Trigger::Skip(SkipReason::Inactive);
    }
    if matches!(pool.start_date, Some(start) if today < start) {
        return Trigger::Skip(SkipReason::BeforeStart);
    }
    if matches!(pool.end_date, Some(end) if today > end) {
        return Trigger::Skip(SkipReason::AfterEnd);
    }
    if !pool.active_weekdays.contains(today.weekday()) {
        return Trigger::Skip(SkipReason::InactiveWeekday);
    }
    if let Some(last) = pool.cursor.last_run_date {
        let ran = match pool.frequency {
            Frequency::Daily => last >= today,
            Frequency::Weekly => week_start(last) >= week_start(today),
        };
        if ran {
            return Trigger::Skip(SkipReason::AlreadyRanThisPeriod);
        }
    }
    Trigger::Due
}

pub fn is_due(pool: &RotationPool, today: NaiveDate) -> bool {
    evaluate(pool, today) == Trigger::Due
}
