use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{plan_run, Assignment, MemberId, RotationPool, RunPlan, TaskId};

/// Range of calendar days a forecast scans.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ForecastWindow {
    pub from: NaiveDate,
    pub days: u32,
    pub max_runs: Option<usize>,
}

impl ForecastWindow {
    pub const DEFAULT_DAYS: u32 = 7;
    /// Longest window scanned, about ten years.
    pub const MAX_DAYS: u32 = 3660;

    pub fn days(from: NaiveDate, days: u32) -> Self {
        Self { from, days, max_runs: None }
    }

    pub fn with_max_runs(mut self, max_runs: usize) -> Self {
        self.max_runs = Some(max_runs);
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForecastDay {
    pub date: NaiveDate,
    pub assignments: Vec<Assignment>,
}

/// Simulate upcoming runs of `pool` without touching it.
///
/// Works on a private copy of the pool whose cursor advances after each simulated run,
/// exactly as a committed run would advance the stored one. Stops after `window.days`
/// days (at most [`ForecastWindow::MAX_DAYS`]), after `window.max_runs` runs, once past
/// the pool's end date, or at the last representable date.
pub fn forecast(pool: &RotationPool, members: &[MemberId], tasks: &[TaskId], window: &ForecastWindow) -> Vec<ForecastDay> {
    let mut sim = pool.clone();
    let mut days = vec![];

    let span = window.days.min(ForecastWindow::MAX_DAYS) as usize;
    for date in window.from.iter_days().take(span) {
        if window.max_runs.is_some_and(|max| days.len() >= max) {
            break;
        }
        if matches!(pool.end_date, Some(end) if date > end) {
            break;
        }
        if let RunPlan::Run { batch, cursor } = plan_run(&sim, members, tasks, date) {
            sim.cursor = cursor;
            days.push(ForecastDay { date, assignments: batch.assignments });
        }
    }

    days
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Frequency, PoolId, WeekdaySet};

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    fn pool() -> RotationPool {
        let mut p = RotationPool::new(PoolId::from_str("p"), "dishes");
        p.member_ids = ["A", "B", "C"].iter().map(|m| MemberId::from_str(*m)).collect();
        p.task_ids = (1..=4).map(|i| TaskId::from_str(format!("T{i}"))).collect();
        p
    }

    #[test]
    fn forecast_leaves_pool_untouched() {
        let p = pool();
        let before = p.clone();
        let days = forecast(&p, &p.member_ids, &p.task_ids, &ForecastWindow::days(day(4), 7));
        assert_eq!(days.len(), 7);
        assert_eq!(p, before);
    }

    #[test]
    fn forecast_carries_the_cursor_between_days() {
        let p = pool();
        let days = forecast(&p, &p.member_ids, &p.task_ids, &ForecastWindow::days(day(4), 2));
        let tasks: Vec<Vec<&str>> = days
            .iter()
            .map(|d| d.assignments.iter().map(|a| a.task_id.as_str()).collect())
            .collect();
        assert_eq!(tasks, vec![vec!["T1", "T2", "T3"], vec!["T4", "T1", "T2"]]);
    }

    #[test]
    fn forecast_stops_at_end_date() {
        let mut p = pool();
        p.end_date = Some(day(6));
        let days = forecast(&p, &p.member_ids, &p.task_ids, &ForecastWindow::days(day(4), 30));
        assert_eq!(days.iter().map(|d| d.date).collect::<Vec<_>>(), vec![day(4), day(5), day(6)]);
    }

    #[test]
    fn forecast_respects_max_runs_and_weekly_cadence() {
        let mut p = pool();
        p.frequency = Frequency::Weekly;
        p.active_weekdays = WeekdaySet::from_days(&[2, 4]).unwrap();
        let window = ForecastWindow::days(day(3), 60).with_max_runs(3);
        let days = forecast(&p, &p.member_ids, &p.task_ids, &window);
        // first active day of each week: Tuesdays 5th, 12th, 19th
        assert_eq!(days.iter().map(|d| d.date).collect::<Vec<_>>(), vec![day(5), day(12), day(19)]);
    }

    #[test]
    fn forecast_of_empty_roster_is_empty() {
        let p = pool();
        assert!(forecast(&p, &[], &p.task_ids, &ForecastWindow::days(day(4), 7)).is_empty());
    }

    #[test]
    fn forecast_stops_at_the_last_representable_date() {
        let p = pool();
        let from = NaiveDate::MAX - chrono::Duration::days(2);
        let days = forecast(&p, &p.member_ids, &p.task_ids, &ForecastWindow::days(from, 7));
        assert_eq!(days.len(), 3);
        assert_eq!(days.last().map(|d| d.date), Some(NaiveDate::MAX));
    }

    #[test]
    fn forecast_span_is_capped() {
        let p = pool();
        let days = forecast(&p, &p.member_ids, &p.task_ids, &ForecastWindow::days(day(4), u32::MAX));
        assert_eq!(days.len(), ForecastWindow::MAX_DAYS as usize);
    }
}
