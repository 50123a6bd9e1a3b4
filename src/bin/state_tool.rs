use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use procflow::core::PartitionId;
use procflow::scheduler::ClockModification;
use procflow::stream::{LogStream, QueryService, log_dir, state_dir};
use procflow::{Db, DurabilityMode};
use serde_json::{Value, json};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "state-tool")]
#[command(about = "Inspects the persisted state of a procflow partition")]
struct Cli {
    /// Data directory of the partition
    dir: PathBuf,

    #[arg(long, default_value_t = 1)]
    partition: PartitionId,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Entity counts, last processed position and clock
    Summary,
    /// Keys of banned process instances
    Banned,
    /// Number of entries per column family
    ColumnFamilies,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let db = open_state(&cli.dir)?;

    let output = match cli.command {
        Command::Summary => summary(&db, &cli.dir, cli.partition)?,
        Command::Banned => json!(QueryService::new(&db, cli.partition).banned_instances()?),
        Command::ColumnFamilies => column_families(&db)?,
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn open_state(dir: &Path) -> Result<Db> {
    let state = state_dir(dir);
    if !state.is_dir() {
        bail!("No partition state found at '{}'", state.display());
    }
    Db::open(&state, DurabilityMode::None, usize::MAX)
        .with_context(|| format!("Failed to open state at '{}'", state.display()))
}

fn summary(db: &Db, dir: &Path, partition: PartitionId) -> Result<Value> {
    let query = QueryService::new(db, partition);
    let log = if log_dir(dir).is_dir() {
        let log = LogStream::open_read_only(log_dir(dir), partition)
            .context("Failed to read partition log")?;
        json!({ "records": log.len()?, "last_position": log.last_position()? })
    } else {
        Value::Null
    };

    Ok(json!({
        "partition_id": partition,
        "last_processed_position": query.last_processed_position()?,
        "processes": query.process_count()?,
        "element_instances": query.element_instance_count()?,
        "jobs": query.job_count()?,
        "timers": query.timer_count()?,
        "signal_subscriptions": query.signal_subscription_count()?,
        "incidents": query.incident_count()?,
        "banned_instances": query.banned_instances()?.len(),
        "clock": render_clock(query.clock_modification()?),
        "log": log,
    }))
}

fn render_clock(modification: ClockModification) -> Value {
    match modification {
        ClockModification::None => json!({ "modification": "none" }),
        ClockModification::Pin { time } => json!({
            "modification": "pinned",
            "time": time,
            "at": render_millis(time),
        }),
        ClockModification::Offset { offset } => {
            json!({ "modification": "offset", "offset_ms": offset })
        }
    }
}

fn render_millis(millis: i64) -> Option<String> {
    DateTime::<Utc>::from_timestamp_millis(millis).map(|time| time.to_rfc3339())
}

fn column_families(db: &Db) -> Result<Value> {
    let sizes = db.column_family_sizes()?;
    let mut families = serde_json::Map::new();
    for (family, count) in sizes {
        families.insert(family.name().to_string(), json!(count));
    }
    Ok(Value::Object(families))
}
