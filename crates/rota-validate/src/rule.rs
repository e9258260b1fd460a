use std::collections::HashSet;
use std::hash::Hash;

use crate::types::{Finding, Severity, ValidateInput, ValidationCategory};

pub trait Rule: Send + Sync {
    fn id(&self) -> &str;
    fn category(&self) -> ValidationCategory;
    fn eval(&self, input: &ValidateInput) -> Vec<Finding>;

    fn finding(&self, severity: Severity, message: String) -> Finding {
        Finding {
            rule_id: self.id().to_string(),
            category: self.category(),
            severity,
            message,
        }
    }
}

/// A quota of zero would make every run empty.
pub struct TasksPerMemberRule;

impl Rule for TasksPerMemberRule {
    fn id(&self) -> &str {
        "tasks_per_member"
    }

    fn category(&self) -> ValidationCategory {
        ValidationCategory::Schedule
    }

    fn eval(&self, input: &ValidateInput) -> Vec<Finding> {
        if input.pool.tasks_per_member < 1 {
            return vec![self.finding(Severity::Fail, "tasks_per_member must be at least 1".to_string())];
        }
        vec![]
    }
}

pub struct DateWindowRule;

impl Rule for DateWindowRule {
    fn id(&self) -> &str {
        "date_window"
    }

    fn category(&self) -> ValidationCategory {
        ValidationCategory::Schedule
    }

    fn eval(&self, input: &ValidateInput) -> Vec<Finding> {
        match (input.pool.start_date, input.pool.end_date) {
            (Some(start), Some(end)) if start > end => vec![self.finding(
                Severity::Fail,
                format!("start_date {start} is after end_date {end}"),
            )],
            _ => vec![],
        }
    }
}

pub struct ActiveWeekdaysRule;

impl Rule for ActiveWeekdaysRule {
    fn id(&self) -> &str {
        "active_weekdays"
    }

    fn category(&self) -> ValidationCategory {
        ValidationCategory::Schedule
    }

    fn eval(&self, input: &ValidateInput) -> Vec<Finding> {
        if input.pool.active_weekdays.is_empty() {
            return vec![self.finding(Severity::Warn, "no active weekdays; pool will never run".to_string())];
        }
        vec![]
    }
}

pub struct RosterShapeRule;

impl Rule for RosterShapeRule {
    fn id(&self) -> &str {
        "roster_shape"
    }

    fn category(&self) -> ValidationCategory {
        ValidationCategory::Roster
    }

    fn eval(&self, input: &ValidateInput) -> Vec<Finding> {
        let pool = input.pool;
        let mut out = vec![];
        if pool.member_ids.is_empty() {
            out.push(self.finding(Severity::Warn, "pool has no members".to_string()));
        }
        if pool.task_ids.is_empty() {
            out.push(self.finding(Severity::Warn, "pool has no tasks".to_string()));
        }
        for dup in duplicates(&pool.member_ids) {
            out.push(self.finding(Severity::Warn, format!("member {dup} listed more than once")));
        }
        for dup in duplicates(&pool.task_ids) {
            out.push(self.finding(Severity::Warn, format!("task {dup} listed more than once")));
        }
        out
    }
}

/// Ids that no longer resolve are skipped at run time, but usually mean a stale pool.
pub struct DanglingIdsRule;

impl Rule for DanglingIdsRule {
    fn id(&self) -> &str {
        "dangling_ids"
    }

    fn category(&self) -> ValidationCategory {
        ValidationCategory::Directory
    }

    fn eval(&self, input: &ValidateInput) -> Vec<Finding> {
        let members = input
            .unresolved_members
            .iter()
            .map(|id| self.finding(Severity::Warn, format!("member {id} not found in directory")));
        let tasks = input
            .unresolved_tasks
            .iter()
            .map(|id| self.finding(Severity::Warn, format!("task {id} not found in directory")));
        members.chain(tasks).collect()
    }
}

pub fn default_rules() -> Vec<Box<dyn Rule>> {
    vec![
        Box::new(TasksPerMemberRule),
        Box::new(DateWindowRule),
        Box::new(ActiveWeekdaysRule),
        Box::new(RosterShapeRule),
        Box::new(DanglingIdsRule),
    ]
}

pub fn validate_pool(input: &ValidateInput) -> Vec<Finding> {
    default_rules().iter().flat_map(|r| r.eval(input)).collect()
}

fn duplicates<T: Eq + Hash + Clone>(items: &[T]) -> Vec<T> {
    let mut seen = HashSet::new();
    let mut reported = HashSet::new();
    let mut out = vec![];
    for item in items {
        if !seen.insert(item) && reported.insert(item) {
            out.push(item.clone());
        }
    }
    out
}
