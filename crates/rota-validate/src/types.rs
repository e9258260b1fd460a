use rota_core::{MemberId, RotationPool, TaskId};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum ValidationCategory {
    Schedule,
    Roster,
    Directory,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum Severity {
    Warn,
    Fail,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Finding {
    pub rule_id: String,
    pub category: ValidationCategory,
    pub severity: Severity,
    pub message: String,
}

#[derive(Clone, Debug)]
pub struct ValidateInput<'a> {
    pub pool: &'a RotationPool,
    /// Ids the directory could not resolve. Left empty when no directory is consulted.
    pub unresolved_members: Vec<MemberId>,
    pub unresolved_tasks: Vec<TaskId>,
}

impl<'a> ValidateInput<'a> {
    pub fn new(pool: &'a RotationPool) -> Self {
        Self { pool, unresolved_members: vec![], unresolved_tasks: vec![] }
    }
}

pub fn has_failures(findings: &[Finding]) -> bool {
    findings.iter().any(|f| f.severity == Severity::Fail)
}
