//! Binary entry point for floodgate.
//!
//! Operates the dedup cache against a configured store: single-message
//! checks and records, JSON-lines batch deduplication, manual expiry sweeps
//! and per-bucket statistics.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
// Allow print_stderr in main binary for CLI output
#![allow(clippy::print_stderr)]
#![allow(clippy::print_stdout)]
// Allow needless_pass_by_value for command functions
#![allow(clippy::needless_pass_by_value)]
// Allow multiple crate versions from transitive dependencies
#![allow(clippy::multiple_crate_versions)]

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use floodgate::config::{FloodgateConfig, StoreKind};
use floodgate::models::MessageRecord;
use floodgate::observability::{self, InitOptions};
use floodgate::services::deduplication::{
    Clock, DedupCache, DeduplicationService, Deduplicator, ManualClock, SystemClock, read_records,
};
use floodgate::storage::{self, KvStore};
use floodgate::{Message, Topic};
use std::io::{self, BufReader, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

type CliCache = DedupCache<Arc<dyn KvStore>, Arc<dyn Clock>>;

/// Floodgate - date-bucketed message deduplication.
#[derive(Parser)]
#[command(name = "floodgate")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Store backend: memory or sqlite.
    #[arg(long, global = true)]
    store: Option<StoreKind>,

    /// `SQLite` database path.
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Pretend the current time is this RFC 3339 instant.
    #[arg(long, global = true, value_parser = parse_instant)]
    now: Option<DateTime<Utc>>,

    /// Print a Prometheus metrics snapshot to stderr on exit instead of
    /// serving the configured scrape port.
    #[arg(long, global = true)]
    print_metrics: bool,

    #[command(subcommand)]
    command: Commands,
}

/// One message given on the command line.
#[derive(Args)]
struct MessageArgs {
    /// Filter identity the message is scoped to.
    #[arg(short, long)]
    filter: String,

    /// Topic as 4-byte hex, e.g. 0x01020304.
    #[arg(short, long)]
    topic: Topic,

    /// Payload text.
    #[arg(short, long, conflicts_with = "payload_hex", required_unless_present = "payload_hex")]
    payload: Option<String>,

    /// Payload as hex bytes.
    #[arg(long)]
    payload_hex: Option<String>,
}

impl MessageArgs {
    fn message(&self) -> Result<Message> {
        let payload = match (&self.payload, &self.payload_hex) {
            (Some(text), _) => text.as_bytes().to_vec(),
            (None, Some(hex_payload)) => {
                hex::decode(hex_payload).context("--payload-hex is not valid hex")?
            },
            (None, None) => bail!("one of --payload or --payload-hex is required"),
        };
        Ok(Message::new(payload, self.topic))
    }
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Report whether a message was seen within the window.
    Check(MessageArgs),

    /// Record a message as seen today.
    Record(MessageArgs),

    /// Deduplicate JSON-lines messages, printing only the unseen ones.
    Dedupe {
        /// Filter identity to deduplicate for.
        #[arg(short, long)]
        filter: String,

        /// Input file; stdin when absent or "-".
        #[arg(short, long)]
        input: Option<PathBuf>,
    },

    /// Delete every bucket older than yesterday.
    Sweep,

    /// Show entry counts per bucket.
    Stats {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e:#}");
            return ExitCode::FAILURE;
        },
    };

    let observability = match observability::init_from_config(
        &config.observability,
        InitOptions {
            verbose: cli.verbose,
            force_metrics: cli.print_metrics,
        },
    ) {
        Ok(handle) => handle,
        Err(e) => {
            eprintln!("Failed to initialize observability: {e}");
            return ExitCode::FAILURE;
        },
    };

    let result = run_command(cli.command, &config, cli.now);

    if let Some(rendered) = observability.render_metrics() {
        eprintln!("{rendered}");
    }

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        },
    }
}

/// Resolves configuration: file, then environment, then CLI flags.
fn load_config(cli: &Cli) -> Result<FloodgateConfig> {
    let config = match &cli.config {
        Some(path) => FloodgateConfig::load_from_file(path)?,
        None => FloodgateConfig::load_default(),
    };
    let mut config = config.apply_env_overrides()?;

    if let Some(store) = cli.store {
        config = config.with_store(store);
    }
    if let Some(db) = &cli.db {
        config = config.with_db_path(db.clone());
    }
    Ok(config)
}

fn parse_instant(s: &str) -> std::result::Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| format!("expected RFC 3339 time, e.g. 2018-04-25T10:00:00Z: {e}"))
}

fn open_cache(config: &FloodgateConfig, now: Option<DateTime<Utc>>) -> Result<CliCache> {
    let store = storage::open_store(config)?;
    let clock: Arc<dyn Clock> = match now {
        Some(at) => Arc::new(ManualClock::new(at)),
        None => Arc::new(SystemClock),
    };
    Ok(DedupCache::with_clock(store, clock))
}

/// Runs the selected command.
fn run_command(
    command: Commands,
    config: &FloodgateConfig,
    now: Option<DateTime<Utc>>,
) -> Result<ExitCode> {
    let cache = open_cache(config, now)?;

    match command {
        Commands::Check(args) => cmd_check(&cache, &args),
        Commands::Record(args) => cmd_record(&cache, &args),
        Commands::Dedupe { filter, input } => cmd_dedupe(cache, &filter, input),
        Commands::Sweep => cmd_sweep(&cache),
        Commands::Stats { json } => cmd_stats(&cache, json),
    }
}

fn cmd_check(cache: &CliCache, args: &MessageArgs) -> Result<ExitCode> {
    let message = args.message()?;
    let seen = cache.has(&args.filter, &message)?;
    println!("{}", if seen { "duplicate" } else { "new" });
    Ok(ExitCode::SUCCESS)
}

fn cmd_record(cache: &CliCache, args: &MessageArgs) -> Result<ExitCode> {
    let message = args.message()?;
    let report = cache.put(&args.filter, std::slice::from_ref(&message))?;
    println!("recorded {} (expired {})", report.written, report.expired);
    Ok(ExitCode::SUCCESS)
}

fn cmd_dedupe(cache: CliCache, filter: &str, input: Option<PathBuf>) -> Result<ExitCode> {
    let messages = match input.filter(|p| p.as_os_str() != "-") {
        Some(path) => {
            let file = std::fs::File::open(&path)
                .with_context(|| format!("failed to open {}", path.display()))?;
            read_records(BufReader::new(file), filter)?
        },
        None => read_records(io::stdin().lock(), filter)?,
    };

    let service = DeduplicationService::new(cache);
    let outcome = service.deduplicate(filter, messages);

    let mut out = io::stdout().lock();
    for message in &outcome.new_messages {
        let record = MessageRecord::from_message(message, Some(filter));
        serde_json::to_writer(&mut out, &record)?;
        writeln!(out)?;
    }
    out.flush()?;

    eprintln!(
        "{} new, {} duplicate, {} unchecked",
        outcome.new_messages.len(),
        outcome.duplicates,
        outcome.check_failures
    );

    match outcome.record_error {
        Some(e) if e.write_landed() => {
            eprintln!("Warning: {e}");
            Ok(ExitCode::SUCCESS)
        },
        Some(e) => Err(e).context("new messages were delivered but not recorded"),
        None => Ok(ExitCode::SUCCESS),
    }
}

fn cmd_sweep(cache: &CliCache) -> Result<ExitCode> {
    let expired = cache.expire_stale_buckets()?;
    println!("expired {expired} keys");
    Ok(ExitCode::SUCCESS)
}

fn cmd_stats(cache: &CliCache, json: bool) -> Result<ExitCode> {
    let counts = cache.bucket_counts()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&counts)?);
        return Ok(ExitCode::SUCCESS);
    }

    if counts.is_empty() {
        println!("No entries.");
        return Ok(ExitCode::SUCCESS);
    }

    println!("{:<10} {:>10}", "BUCKET", "ENTRIES");
    for (bucket, count) in &counts {
        println!("{bucket:<10} {count:>10}");
    }
    println!("{:<10} {:>10}", "total", counts.values().sum::<usize>());
    Ok(ExitCode::SUCCESS)
}
