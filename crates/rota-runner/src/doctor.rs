use anyhow::Result;
use rota_core::{PoolId, RotationPool};
use rota_storage::{Directory, Storage};
use rota_validate::{validate_pool, Finding, ValidateInput};

use crate::engine::resolve_roster;

#[derive(Clone, Debug)]
pub struct PoolHealth {
    pub pool_id: PoolId,
    pub findings: Vec<Finding>,
}

/// Validate a pool with its ids checked against the directory.
pub fn check_pool(directory: &dyn Directory, pool: &RotationPool) -> Vec<Finding> {
    let roster = resolve_roster(directory, pool);
    let input = ValidateInput {
        pool,
        unresolved_members: roster.missing_members,
        unresolved_tasks: roster.missing_tasks,
    };
    validate_pool(&input)
}

/// Findings for every stored pool; pools with none are included with an empty list.
pub fn doctor(storage: &dyn Storage, directory: &dyn Directory) -> Result<Vec<PoolHealth>> {
    let pools = storage.list_pools()?;
    Ok(pools
        .iter()
        .map(|pool| PoolHealth { pool_id: pool.id.clone(), findings: check_pool(directory, pool) })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rota_core::{Member, MemberId, TaskId};
    use rota_storage::InMemoryStorage;
    use rota_validate::Severity;

    #[test]
    fn reports_dangling_and_zero_quota() {
        let storage = InMemoryStorage::new();
        storage.upsert_member(Member { id: MemberId::from_str("ana"), display_name: "Ana".into() }).unwrap();

        let mut ok = RotationPool::new(PoolId::from_str("a-ok"), "ok");
        ok.member_ids = vec![MemberId::from_str("ana")];
        ok.task_ids = vec![TaskId::from_str("gone")];
        storage.upsert_pool(&ok).unwrap();

        let mut bad = RotationPool::new(PoolId::from_str("b-bad"), "bad");
        bad.member_ids = vec![MemberId::from_str("ana")];
        bad.tasks_per_member = 0;
        storage.upsert_pool(&bad).unwrap();

        let report = doctor(&storage, &storage).unwrap();
        assert_eq!(report.len(), 2);

        let first = &report[0];
        assert_eq!(first.pool_id, PoolId::from_str("a-ok"));
        assert!(first.findings.iter().any(|f| f.rule_id == "dangling_ids" && f.severity == Severity::Warn));

        let second = &report[1];
        assert!(second.findings.iter().any(|f| f.rule_id == "tasks_per_member" && f.severity == Severity::Fail));
    }
}
