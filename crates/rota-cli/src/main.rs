use anyhow::{anyhow, Context};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use rota_core::{evaluate, parse_date, Frequency, Member, MemberId, PoolId, RotaError, RotationPool, Task, TaskId, Trigger, WeekdaySet};
use rota_runner::{today, PoolOutcome, Runner, StdoutSink};
use rota_storage::{Directory, Storage};
use rota_validate::Severity;

#[derive(Parser)]
#[command(name = "rota", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Initialize rota in the current directory (creates .rota/, config, db)
    Init,

    /// Show every pool with today's trigger decision and its cursor
    Status,

    /// Add or rename a member
    MemberAdd {
        /// Generated when omitted
        #[arg(long)]
        id: Option<String>,
        #[arg(long)]
        name: String,
    },

    /// Remove a member from the directory. Pools listing it skip it from then on.
    MemberRemove {
        #[arg(long)]
        id: String,
    },

    /// Add or retitle a task
    TaskAdd {
        /// Generated when omitted
        #[arg(long)]
        id: Option<String>,
        #[arg(long)]
        title: String,
    },

    /// Remove a task from the directory
    TaskRemove {
        #[arg(long)]
        id: String,
    },

    /// Create or update a pool's configuration (its cursor is kept)
    PoolAdd {
        /// Generated when omitted
        #[arg(long)]
        id: Option<String>,
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "")]
        description: String,
        /// Member ids in rotation order, comma separated
        #[arg(long, value_delimiter = ',')]
        members: Vec<String>,
        /// Task ids in rotation order, comma separated
        #[arg(long, value_delimiter = ',')]
        tasks: Vec<String>,
        /// Day numbers the pool may run on, Sunday = 0
        #[arg(long, value_delimiter = ',', default_value = "0,1,2,3,4,5,6")]
        weekdays: Vec<u8>,
        #[arg(long, default_value = "daily")]
        frequency: Frequency,
        #[arg(long, default_value_t = 1)]
        tasks_per_member: u32,
        #[arg(long, value_parser = parse_day)]
        start: Option<NaiveDate>,
        #[arg(long, value_parser = parse_day)]
        end: Option<NaiveDate>,
        #[arg(long)]
        inactive: bool,
    },

    /// Print a pool as JSON
    PoolShow {
        #[arg(long)]
        id: String,
    },

    /// Delete a pool with its cursor and run history
    PoolDelete {
        #[arg(long)]
        id: String,
    },

    /// Import members, tasks and pools from a roster YAML file
    Import {
        #[arg(long)]
        file: String,
    },

    /// Run every due pool once
    Tick {
        /// Defaults to the local date
        #[arg(long, value_parser = parse_day)]
        date: Option<NaiveDate>,
        /// Print assignments as they are handed off
        #[arg(long)]
        print: bool,
    },

    /// Preview upcoming runs of a pool without changing it
    Forecast {
        #[arg(long)]
        pool: String,
        #[arg(long, value_parser = parse_day)]
        from: Option<NaiveDate>,
        #[arg(long)]
        days: Option<u32>,
        /// Stop after this many runs
        #[arg(long)]
        runs: Option<usize>,
        #[arg(long)]
        json: bool,
    },

    /// List committed runs of a pool
    Runs {
        #[arg(long)]
        pool: String,
        #[arg(long)]
        json: bool,
    },

    /// Validate every pool against the directory
    Doctor,
}

fn parse_day(s: &str) -> Result<NaiveDate, RotaError> {
    parse_date(s)
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let cli = Cli::parse();
    let root = std::env::current_dir()?;

    match cli.cmd {
        Command::Init => {
            Runner::init(&root)?;
            println!("Initialized rota in {}", root.display());
        }
        Command::Status => {
            let r = Runner::open(root)?;
            let today = today();
            let pools = r.storage.list_pools()?;
            println!("Pools: {}", pools.len());
            for p in pools {
                let decision = match evaluate(&p, today) {
                    Trigger::Due => "due".to_string(),
                    Trigger::Skip(reason) => reason.as_str().to_string(),
                };
                let last = p.cursor.last_run_date.map_or("never".to_string(), |d| d.to_string());
                println!(
                    "- {} [{}] {} members, {} tasks, last run {}: {}",
                    p.id,
                    p.frequency.as_str(),
                    p.member_ids.len(),
                    p.task_ids.len(),
                    last,
                    decision
                );
            }
            println!("Undelivered runs: {}", r.storage.undelivered_runs()?.len());
        }
        Command::MemberAdd { id, name } => {
            let r = Runner::open(root)?;
            let id = id.map_or_else(MemberId::new, MemberId::from_str);
            r.storage.upsert_member(&Member { id: id.clone(), display_name: name })?;
            println!("Added member {}", id);
        }
        Command::MemberRemove { id } => {
            let r = Runner::open(root)?;
            if !r.storage.remove_member(&MemberId::from_str(id.clone()))? {
                return Err(anyhow!("unknown member {id}"));
            }
            println!("Removed member {}", id);
        }
        Command::TaskAdd { id, title } => {
            let r = Runner::open(root)?;
            let id = id.map_or_else(TaskId::new, TaskId::from_str);
            r.storage.upsert_task(&Task { id: id.clone(), title })?;
            println!("Added task {}", id);
        }
        Command::TaskRemove { id } => {
            let r = Runner::open(root)?;
            if !r.storage.remove_task(&TaskId::from_str(id.clone()))? {
                return Err(anyhow!("unknown task {id}"));
            }
            println!("Removed task {}", id);
        }
        Command::PoolAdd {
            id,
            name,
            description,
            members,
            tasks,
            weekdays,
            frequency,
            tasks_per_member,
            start,
            end,
            inactive,
        } => {
            let r = Runner::open(root)?;
            let id = id.map_or_else(PoolId::new, PoolId::from_str);
            let mut pool = RotationPool::new(id.clone(), name);
            pool.description = description;
            pool.is_active = !inactive;
            pool.member_ids = members.into_iter().map(MemberId::from_str).collect();
            pool.task_ids = tasks.into_iter().map(TaskId::from_str).collect();
            pool.active_weekdays = WeekdaySet::from_days(&weekdays)?;
            pool.frequency = frequency;
            pool.tasks_per_member = tasks_per_member;
            pool.start_date = start;
            pool.end_date = end;

            let warnings = r.save_pool(&pool)?;
            for w in &warnings {
                println!("warn [{}] {}", w.rule_id, w.message);
            }
            println!("Saved pool {}", id);
        }
        Command::PoolShow { id } => {
            let r = Runner::open(root)?;
            let pool = r.require_pool(&PoolId::from_str(id))?;
            println!("{}", serde_json::to_string_pretty(&pool)?);
        }
        Command::PoolDelete { id } => {
            let r = Runner::open(root)?;
            if !r.delete_pool(&PoolId::from_str(id.clone()))? {
                return Err(anyhow!("unknown pool {id}"));
            }
            println!("Deleted pool {}", id);
        }
        Command::Import { file } => {
            let r = Runner::open(root)?;
            let roster = rota_roster::load_roster(std::path::Path::new(&file))?;
            let summary = r.import_roster(&roster).with_context(|| format!("import {file}"))?;
            for (pool_id, w) in &summary.warnings {
                println!("warn {} [{}] {}", pool_id, w.rule_id, w.message);
            }
            println!(
                "Imported {} members, {} tasks, {} pools",
                summary.members, summary.tasks, summary.pools
            );
        }
        Command::Tick { date, print } => {
            let r = Runner::open(root)?;
            let date = date.unwrap_or_else(today);
            let report = if print { r.tick(date, &StdoutSink)? } else { r.tick(date, r.default_sink().as_ref())? };

            if report.redelivered > 0 {
                println!("Redelivered {} earlier runs", report.redelivered);
            }
            for p in &report.pools {
                match &p.outcome {
                    PoolOutcome::Assigned { run_id, assignments, delivered } => {
                        let note = if *delivered { "" } else { " (hand-off pending)" };
                        println!("- {} assigned {} ({}){}", p.pool_id, assignments, run_id, note);
                    }
                    PoolOutcome::Skipped(reason) => println!("- {} skipped: {}", p.pool_id, reason.as_str()),
                    PoolOutcome::Failed(msg) => println!("- {} FAILED: {}", p.pool_id, msg),
                }
            }
            if report.has_failures() {
                return Err(anyhow!("tick {} had failures; affected pools stay due", date));
            }
        }
        Command::Forecast { pool, from, days, runs, json } => {
            let r = Runner::open(root)?;
            let window = r.forecast_window(from.unwrap_or_else(today), days, runs);
            let days = r.forecast(&PoolId::from_str(pool.clone()), &window)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&days)?);
            } else {
                println!("Forecast for {} from {} ({} days)", pool, window.from, window.days);
                for d in days {
                    println!("{}", d.date);
                    for a in d.assignments {
                        println!("  #{} {} -> {}", a.turn_number, a.member_id, a.task_id);
                    }
                }
            }
        }
        Command::Runs { pool, json } => {
            let r = Runner::open(root)?;
            let runs = r.storage.list_runs(&PoolId::from_str(pool))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&runs)?);
            } else {
                for run in runs {
                    let state = if run.delivered { "delivered" } else { "pending" };
                    println!("{} {} {} assignments [{}]", run.run_date, run.id, run.assignments.len(), state);
                }
            }
        }
        Command::Doctor => {
            let r = Runner::open(root)?;
            let health = r.doctor()?;
            let mut failed = false;
            for h in &health {
                for f in &h.findings {
                    let level = match f.severity {
                        Severity::Warn => "warn",
                        Severity::Fail => {
                            failed = true;
                            "FAIL"
                        }
                    };
                    println!("{} {} [{}] {}", level, h.pool_id, f.rule_id, f.message);
                }
            }
            let members = r.storage.list_members()?.len();
            let tasks = r.storage.list_tasks()?.len();
            println!("{} pools, {} members, {} tasks", health.len(), members, tasks);
            if failed {
                return Err(anyhow!("doctor found failing pools"));
            }
            println!("OK");
        }
    }

    Ok(())
}
