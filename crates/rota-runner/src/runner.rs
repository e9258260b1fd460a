use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;
use rota_core::{forecast, ForecastDay, ForecastWindow, PoolId, RotationPool};
use rota_roster::Roster;
use rota_storage::Storage;
use rota_storage_sqlite::SqliteStorage;
use rota_validate::{has_failures, validate_pool, Finding, Severity, ValidateInput};
use tracing::info;

use crate::doctor::{check_pool, doctor, PoolHealth};
use crate::engine::{resolve_roster, RotationEngine, TickReport};
use crate::sink::{AssignmentSink, FanoutSink, JsonLinesSink, LogSink};
use crate::util::now_unix;
use crate::Config;

/// Counts of what a roster import wrote, plus the warnings raised for its pools.
#[derive(Clone, Debug, Default)]
pub struct ImportSummary {
    pub members: usize,
    pub tasks: usize,
    pub pools: usize,
    pub warnings: Vec<(PoolId, Finding)>,
}

pub struct Runner {
    pub root: PathBuf,
    pub cfg: Config,
    pub storage: SqliteStorage,
    pub worker_id: String,
}

impl Runner {
    pub fn open(root: PathBuf) -> Result<Self> {
        let cfg_path = Config::config_path(&root);
        let cfg = if cfg_path.exists() {
            Config::load_from(&cfg_path)?
        } else {
            let cfg = Config::default();
            cfg.save_to(&cfg_path)?;
            cfg
        };

        let storage = SqliteStorage::open(&cfg.db_path(&root))?;
        let worker_id = cfg.worker_id();
        Ok(Self { root, cfg, storage, worker_id })
    }

    pub fn init(root: &Path) -> Result<()> {
        let cfg_path = Config::config_path(root);
        let cfg = if cfg_path.exists() {
            Config::load_from(&cfg_path)?
        } else {
            let cfg = Config::default();
            cfg.save_to(&cfg_path)?;
            cfg
        };
        // create db
        let _ = SqliteStorage::open(&cfg.db_path(root))?;
        Ok(())
    }

    pub fn engine<'a>(&'a self, sink: &'a dyn AssignmentSink) -> RotationEngine<'a> {
        RotationEngine::new(&self.storage, &self.storage, sink, self.worker_id.clone())
            .with_lease_ttl(self.cfg.engine.lease_ttl_secs)
    }

    /// Log sink, plus the JSON-lines file when one is configured.
    pub fn default_sink(&self) -> Box<dyn AssignmentSink> {
        match self.cfg.jsonl_path(&self.root) {
            Some(path) => Box::new(FanoutSink(vec![Box::new(LogSink), Box::new(JsonLinesSink::new(path))])),
            None => Box::new(LogSink),
        }
    }

    pub fn tick(&self, today: NaiveDate, sink: &dyn AssignmentSink) -> Result<TickReport> {
        let report = self.engine(sink).tick(today, now_unix())?;
        info!(
            date = %today,
            assigned = report.assigned().count(),
            redelivered = report.redelivered,
            failed = report.has_failures(),
            "tick finished"
        );
        Ok(report)
    }

    /// Window from the configured defaults, overridden where given.
    ///
    /// A run count without a day count scans as far as needed to reach it, up to
    /// [`ForecastWindow::MAX_DAYS`].
    pub fn forecast_window(&self, from: NaiveDate, days: Option<u32>, max_runs: Option<usize>) -> ForecastWindow {
        let days = match (days, max_runs) {
            (Some(days), _) => days,
            (None, Some(_)) => ForecastWindow::MAX_DAYS,
            (None, None) => self.cfg.forecast.days,
        };
        ForecastWindow {
            from,
            days: days.min(ForecastWindow::MAX_DAYS),
            max_runs: max_runs.or(self.cfg.forecast.max_runs),
        }
    }

    /// Upcoming runs for one pool, resolved the same way a tick resolves them.
    pub fn forecast(&self, pool_id: &PoolId, window: &ForecastWindow) -> Result<Vec<ForecastDay>> {
        let pool = self.require_pool(pool_id)?;
        let roster = resolve_roster(&self.storage, &pool);
        Ok(forecast(&pool, &roster.members, &roster.tasks, window))
    }

    pub fn require_pool(&self, pool_id: &PoolId) -> Result<RotationPool> {
        self.storage.get_pool(pool_id)?.ok_or_else(|| anyhow!("unknown pool {pool_id}"))
    }

    /// Validate and store a pool's configuration. Its cursor is untouched.
    /// Returns the warnings that did not block the save.
    pub fn save_pool(&self, pool: &RotationPool) -> Result<Vec<Finding>> {
        let findings = check_pool(&self.storage, pool);
        if has_failures(&findings) {
            return Err(anyhow!("pool {} rejected: {}", pool.id, failure_summary(&findings)));
        }
        self.storage.upsert_pool(pool).with_context(|| format!("save pool {}", pool.id))?;
        info!(pool = %pool.id, warnings = findings.len(), "pool saved");
        Ok(findings)
    }

    pub fn delete_pool(&self, pool_id: &PoolId) -> Result<bool> {
        let existed = self.storage.delete_pool(pool_id)?;
        if existed {
            info!(pool = %pool_id, "pool deleted");
        }
        Ok(existed)
    }

    /// Write a roster's members, tasks and pools in one transaction.
    /// Nothing is written if any pool fails validation or any write fails.
    pub fn import_roster(&self, roster: &Roster) -> Result<ImportSummary> {
        let pools = roster.pools();
        for pool in &pools {
            let findings = validate_pool(&ValidateInput::new(pool));
            if has_failures(&findings) {
                return Err(anyhow!("pool {} rejected: {}", pool.id, failure_summary(&findings)));
            }
        }

        let members = roster.members();
        let tasks = roster.tasks();
        self.storage.import(&members, &tasks, &pools).context("import roster")?;

        let mut summary =
            ImportSummary { members: members.len(), tasks: tasks.len(), pools: pools.len(), ..Default::default() };
        for pool in &pools {
            for f in check_pool(&self.storage, pool) {
                summary.warnings.push((pool.id.clone(), f));
            }
        }
        info!(members = summary.members, tasks = summary.tasks, pools = summary.pools, "roster imported");
        Ok(summary)
    }

    pub fn doctor(&self) -> Result<Vec<PoolHealth>> {
        doctor(&self.storage, &self.storage)
    }
}

fn failure_summary(findings: &[Finding]) -> String {
    findings
        .iter()
        .filter(|f| f.severity == Severity::Fail)
        .map(|f| format!("{}: {}", f.rule_id, f.message))
        .collect::<Vec<_>>()
        .join("; ")
}
