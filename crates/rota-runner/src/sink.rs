use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use rota_core::{RunId, RunRecord};
use serde::Deserialize;
use tracing::{debug, info};

/// Receives committed runs for materialization in the task system.
///
/// Hand-off is at least once. A run is delivered again if marking it delivered fails,
/// the worker stops between the two, or its lease expires mid hand-off. `RunRecord::id`
/// is stable, so implementations should treat it as an idempotency key.
pub trait AssignmentSink: Send + Sync {
    fn deliver(&self, run: &RunRecord) -> Result<()>;
}

/// Logs each assignment at info level.
pub struct LogSink;

impl AssignmentSink for LogSink {
    fn deliver(&self, run: &RunRecord) -> Result<()> {
        for a in &run.assignments {
            info!(
                pool = %run.pool_id,
                run = %run.id,
                turn = a.turn_number,
                member = %a.member_id,
                task = %a.task_id,
                "assigned"
            );
        }
        Ok(())
    }
}

/// Prints runs for interactive use.
pub struct StdoutSink;

impl AssignmentSink for StdoutSink {
    fn deliver(&self, run: &RunRecord) -> Result<()> {
        println!("{} {} ({})", run.run_date, run.pool_id, run.id);
        for a in &run.assignments {
            println!("  #{} {} -> {}", a.turn_number, a.member_id, a.task_id);
        }
        Ok(())
    }
}

/// Appends one JSON line per run to a file another process consumes.
///
/// A run whose id is already in the file is not written again, so redelivery leaves
/// a single line per run.
pub struct JsonLinesSink {
    path: PathBuf,
}

#[derive(Deserialize)]
struct LineId {
    id: RunId,
}

impl JsonLinesSink {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    fn contains(&self, run_id: &RunId) -> Result<bool> {
        let f = match std::fs::File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e).with_context(|| format!("open {}", self.path.display())),
        };
        for line in BufReader::new(f).lines() {
            let line = line.with_context(|| format!("read {}", self.path.display()))?;
            // lines that do not parse belong to someone else
            if serde_json::from_str::<LineId>(&line).is_ok_and(|l| l.id == *run_id) {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

impl AssignmentSink for JsonLinesSink {
    fn deliver(&self, run: &RunRecord) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        if self.contains(&run.id)? {
            debug!(run = %run.id, path = %self.path.display(), "already written");
            return Ok(());
        }
        let mut line = serde_json::to_string(run).context("serialize run")?;
        line.push('\n');
        let mut f = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("open {}", self.path.display()))?;
        f.write_all(line.as_bytes()).with_context(|| format!("append {}", self.path.display()))?;
        Ok(())
    }
}

/// Delivers to each sink in order, stopping at the first error.
pub struct FanoutSink(pub Vec<Box<dyn AssignmentSink>>);

impl AssignmentSink for FanoutSink {
    fn deliver(&self, run: &RunRecord) -> Result<()> {
        for sink in &self.0 {
            sink.deliver(run)?;
        }
        Ok(())
    }
}
