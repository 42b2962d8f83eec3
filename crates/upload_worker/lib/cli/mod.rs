use std::path::PathBuf;

use crate::build_info;
use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    about = "Uploads converted wiki pages into the workspace tool",
    version = build_info::VERSION_WITH_COMMIT,
    long_version = build_info::VERSION_WITH_COMMIT
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Store the blocks of every staged document under a fresh batch id
    Ingest(IngestArgs),
    /// Run one upload job for a batch
    Upload(UploadArgs),
    /// Repair the distributed semaphore by hand
    Sweep(SweepArgs),
    /// Watch the staging directory and upload new documents until stopped
    Serve(ServeArgs),
    /// Print the page-status report for a time window
    Dashboard(DashboardArgs),
}

impl Command {
    pub fn mode(&self) -> &'static str {
        match self {
            Command::Ingest(_) => "ingest",
            Command::Upload(_) => "upload",
            Command::Sweep(_) => "sweep",
            Command::Serve(_) => "serve",
            Command::Dashboard(_) => "dashboard",
        }
    }

    pub fn common(&self) -> &CommonArgs {
        match self {
            Command::Ingest(args) => &args.common,
            Command::Upload(args) => &args.common,
            Command::Sweep(args) => &args.common,
            Command::Serve(args) => &args.common,
            Command::Dashboard(args) => &args.common,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct CommonArgs {
    #[arg(long = "database-url")]
    pub database_url: Option<String>,
    #[arg(long = "log-level", default_value = "info")]
    pub log_level: String,
}

#[derive(Args, Debug, Clone)]
pub struct IngestArgs {
    #[command(flatten)]
    pub common: CommonArgs,
    #[arg(long = "staging-dir")]
    pub staging_dir: PathBuf,
    #[arg(long = "max-receive-count", default_value_t = 3)]
    pub max_receive_count: u32,
}

#[derive(Args, Debug, Clone)]
pub struct UploadArgs {
    #[command(flatten)]
    pub common: CommonArgs,
    #[arg(long = "batch-id")]
    pub batch_id: String,
    /// Where the batch's source document and its parenturl.txt live.
    #[arg(long = "staging-dir")]
    pub staging_dir: PathBuf,
    /// Overrides MAX_BLOCKS.
    #[arg(long = "max-blocks")]
    pub max_blocks: Option<i64>,
    #[arg(long = "chunk-timeout-secs", default_value_t = 600)]
    pub chunk_timeout_secs: u64,
    #[arg(long = "job-timeout-secs", default_value_t = 86_400)]
    pub job_timeout_secs: u64,
    #[arg(long = "lock-attempts", default_value_t = 720)]
    pub lock_attempts: u32,
}

#[derive(Args, Debug, Clone)]
pub struct SweepArgs {
    #[command(flatten)]
    pub common: CommonArgs,
    /// Force-clear this execution's slot.
    #[arg(long = "owner-id", conflicts_with = "reconcile")]
    pub owner_id: Option<String>,
    /// Reset the lock count to the number of recorded owners.
    #[arg(long, default_value_t = false)]
    pub reconcile: bool,
    /// Overrides LOCK_NAME.
    #[arg(long = "lock-name")]
    pub lock_name: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub common: CommonArgs,
    #[arg(long = "staging-dir")]
    pub staging_dir: PathBuf,
    #[arg(long = "poll-interval-secs", default_value_t = 5)]
    pub poll_interval_secs: u64,
    /// Treat documents already staged at startup as new arrivals.
    #[arg(long = "ingest-existing", default_value_t = false)]
    pub ingest_existing: bool,
    #[arg(long = "metrics-bind", default_value = "0.0.0.0:3000")]
    pub metrics_bind: String,
    #[arg(long = "max-blocks")]
    pub max_blocks: Option<i64>,
    #[arg(long = "chunk-timeout-secs", default_value_t = 600)]
    pub chunk_timeout_secs: u64,
    #[arg(long = "lock-attempts", default_value_t = 720)]
    pub lock_attempts: u32,
}

#[derive(Args, Debug, Clone)]
pub struct DashboardArgs {
    #[command(flatten)]
    pub common: CommonArgs,
    /// Window start, epoch milliseconds.
    #[arg(long)]
    pub start: i64,
    /// Window end, epoch milliseconds.
    #[arg(long)]
    pub end: i64,
    #[arg(long = "tz-offset-minutes", allow_hyphen_values = true)]
    pub tz_offset_minutes: Option<i32>,
}

pub fn parse_args() -> Cli {
    Cli::parse()
}
