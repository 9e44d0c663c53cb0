//! AtlasMVCC CLI
//!
//! Command-line interface over a snapshot-backed store: write versions,
//! inspect them, and sweep obsolete ones.

use std::collections::BTreeMap;
use std::sync::Arc;

use atlasmvcc::kvs::{is_tombstone, Cell, InMemoryKeyValueService, KeyValueService, TOMBSTONE};
use atlasmvcc::lock::LockService;
use atlasmvcc::schema::{NamePattern, Namespace, SweepStrategy, TableMetadata};
use atlasmvcc::sweep::{
    CleanupFollower, Follower, SweepCursor, SweepOrchestrator, SweepProgressLedger, SweepStrategyManager,
    SweepTarget, SweepTaskRunner,
};
use atlasmvcc::timestamp::SweepTimestamps;
use atlasmvcc::{Config, Result};
use bytes::Bytes;
use clap::{ArgGroup, Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

/// AtlasMVCC CLI
#[derive(Parser, Debug)]
#[command(name = "atlasmvcc-cli")]
#[command(about = "Inspect and sweep a multi-version store")]
#[command(version)]
struct Args {
    /// Data directory holding the store snapshot
    #[arg(short, long, default_value = "./atlasmvcc_data")]
    data_dir: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a table with a sweep strategy
    CreateTable {
        #[arg(short, long)]
        table: String,

        /// conservative, thorough or nothing
        #[arg(short, long, default_value = "conservative")]
        strategy: String,
    },

    /// Write a version of a cell
    Put {
        #[arg(short, long)]
        table: String,
        #[arg(short, long)]
        row: String,
        #[arg(short, long)]
        column: String,
        #[arg(short, long)]
        value: String,

        /// Commit timestamp (default: one past the latest written)
        #[arg(long)]
        timestamp: Option<u64>,
    },

    /// Write a tombstone for a cell
    Delete {
        #[arg(short, long)]
        table: String,
        #[arg(short, long)]
        row: String,
        #[arg(short, long)]
        column: String,

        #[arg(long)]
        timestamp: Option<u64>,
    },

    /// Print every version of a table
    Dump {
        #[arg(short, long)]
        table: String,
    },

    /// Sweep old table rows
    Sweep(SweepArgs),

    /// Print recorded sweep progress
    Progress,
}

#[derive(clap::Args, Debug)]
#[command(group(ArgGroup::new("target").required(true).args(["namespace", "table", "all"])))]
struct SweepArgs {
    /// A namespace to sweep
    #[arg(short, long)]
    namespace: Option<String>,

    /// A table to sweep
    #[arg(short, long)]
    table: Option<String>,

    /// A row to start from (hex encoded bytes)
    #[arg(short, long, requires = "table")]
    row: Option<String>,

    /// Sweep all tables
    #[arg(short, long)]
    all: bool,

    /// Sweep batch size
    #[arg(short, long, default_value = "2000")]
    batch: usize,

    /// Milliseconds to pause between each batch of deletes
    #[arg(short, long, default_value = "5000")]
    pause: u64,

    /// Tables swept in parallel
    #[arg(long, default_value = "1")]
    threads: usize,

    /// Sweep bound (default: one past the latest written timestamp)
    #[arg(long)]
    sweep_ts: Option<u64>,

    /// Lock client id for the per-table sweep locks
    #[arg(long)]
    lock_client: Option<String>,

    /// Skip compaction after sweeping
    #[arg(long)]
    no_compact: bool,
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,atlasmvcc=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    match run(args) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            tracing::error!("{}", e);
            std::process::exit(1);
        }
    }
}

fn run(args: Args) -> Result<i32> {
    let config = Config::builder().data_dir(&args.data_dir).build();
    let snapshot = config.snapshot_path();
    let kvs = Arc::new(InMemoryKeyValueService::open_or_create(&snapshot)?);

    match args.command {
        Commands::CreateTable { table, strategy } => {
            let strategy: SweepStrategy = strategy.parse()?;
            kvs.create_table(&table)?;
            kvs.put_metadata_for_table(&table, TableMetadata::new(strategy))?;
            println!("Created table {} with sweep strategy {}", table, strategy);
        }
        Commands::Put { table, row, column, value, timestamp } => {
            let ts = timestamp.unwrap_or(kvs.latest_timestamp() + 1);
            write_version(&kvs, &table, &row, &column, Bytes::from(value.into_bytes()), ts)?;
            println!("Wrote {}/{}/{} at {}", table, row, column, ts);
        }
        Commands::Delete { table, row, column, timestamp } => {
            let ts = timestamp.unwrap_or(kvs.latest_timestamp() + 1);
            write_version(&kvs, &table, &row, &column, Bytes::from_static(TOMBSTONE), ts)?;
            println!("Deleted {}/{}/{} at {}", table, row, column, ts);
        }
        Commands::Dump { table } => {
            for version in kvs.scan_all_versions(&table, &[], usize::MAX)? {
                let value = if is_tombstone(&version.value) {
                    "<tombstone>".to_string()
                } else {
                    String::from_utf8_lossy(&version.value).into_owned()
                };
                println!(
                    "{}\t{}\t{}\t{}",
                    String::from_utf8_lossy(&version.cell.row),
                    String::from_utf8_lossy(&version.cell.column),
                    version.timestamp,
                    value
                );
            }
            return Ok(0);
        }
        Commands::Sweep(sweep) => {
            let code = run_sweep(&kvs, &args.data_dir, sweep)?;
            kvs.save_snapshot(&snapshot)?;
            return Ok(code);
        }
        Commands::Progress => {
            let ledger = SweepProgressLedger::new(kvs.clone())?;
            for (table, progress) in ledger.all()? {
                println!(
                    "{}\twrites={}\texamined={}\tdeleted={}\tlast_sweep_ms={}",
                    table,
                    progress.write_count,
                    progress.cells_examined,
                    progress.cells_deleted,
                    progress
                        .last_sweep_time_ms
                        .map_or_else(|| "never".to_string(), |ms| ms.to_string())
                );
            }
            return Ok(0);
        }
    }

    kvs.save_snapshot(&snapshot)?;
    Ok(0)
}

fn write_version(
    kvs: &Arc<InMemoryKeyValueService>,
    table: &str,
    row: &str,
    column: &str,
    value: Bytes,
    ts: u64,
) -> Result<()> {
    let mut values = BTreeMap::new();
    values.insert(Cell::from_strs(row, column), value);
    kvs.put(table, &values, ts)?;

    let ledger = SweepProgressLedger::new(kvs.clone())?;
    ledger.record_writes(table, 1)
}

fn run_sweep(kvs: &Arc<InMemoryKeyValueService>, data_dir: &str, args: SweepArgs) -> Result<i32> {
    let mut builder = Config::builder()
        .data_dir(data_dir)
        .sweep_batch_size(args.batch)
        .sweep_pause_ms(args.pause)
        .sweep_threads(args.threads)
        .compact_after_sweep(!args.no_compact);
    if let Some(id) = &args.lock_client {
        builder = builder.lock_client_id(id);
    }
    let config = builder.build();

    let target = if let Some(table) = args.table {
        let start = match &args.row {
            Some(row) => SweepCursor::parse_hex(row)?,
            None => SweepCursor::Start,
        };
        SweepTarget::Table { name: table, start }
    } else if let Some(namespace) = args.namespace {
        SweepTarget::Namespace(Namespace::create_with(&namespace, NamePattern::LooselyChecked)?)
    } else {
        SweepTarget::All
    };

    let shared: Arc<dyn KeyValueService> = kvs.clone();
    let sweep_ts = args.sweep_ts.unwrap_or(kvs.latest_timestamp() + 1);
    let strategies = Arc::new(SweepStrategyManager::from_key_value_service(shared.clone())?);
    let followers: Vec<Arc<dyn Follower>> = vec![Arc::new(CleanupFollower::new())];
    let runner = Arc::new(SweepTaskRunner::new(
        shared.clone(),
        Arc::new(SweepTimestamps::fixed(sweep_ts)),
        strategies,
        followers,
    ));
    let ledger = Arc::new(SweepProgressLedger::new(shared.clone())?);
    let orchestrator = SweepOrchestrator::new(runner, shared, ledger, Arc::new(LockService::new()), &config)?;

    tracing::info!("Sweeping with bound {}", sweep_ts);

    let mut failures = 0;
    for outcome in orchestrator.sweep(&target)? {
        match outcome {
            Ok(summary) => println!(
                "Finished sweeping {}, examined {} unique cells, deleted {} cells.",
                summary.table, summary.cells_examined, summary.cells_deleted
            ),
            Err(e) => {
                failures += 1;
                eprintln!("{}", e);
            }
        }
    }

    Ok(if failures == 0 { 0 } else { 1 })
}
