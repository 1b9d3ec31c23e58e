// aqua - water purchase, yield and consumption ledger (headless)

mod entries;
mod exit_codes;
mod master;
mod rates;
mod readings;
mod reports;
mod settings;
mod util;

use std::path::PathBuf;
use std::process::ExitCode;

use aqualedger_engine::{Ledger, LedgerError};
use aqualedger_io::{json, StoreError, LEDGER_FORMAT_VERSION};
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing_subscriber::EnvFilter;

use exit_codes::{
    EXIT_CONFIG, EXIT_ERROR, EXIT_INVALID_INPUT, EXIT_NOT_FOUND, EXIT_STORE, EXIT_SUCCESS,
    EXIT_USAGE,
};
use settings::{Context, Settings};

#[derive(Parser)]
#[command(name = "aqua")]
#[command(about = "Water purchase, yield and consumption ledger")]
#[command(version)]
struct Cli {
    /// Ledger file [default: from settings.toml, else the platform data dir]
    #[arg(long, global = true, env = "AQUALEDGER_LEDGER")]
    ledger: Option<PathBuf>,

    /// Settings file [default: <config dir>/aqualedger/settings.toml]
    #[arg(long, global = true, env = "AQUALEDGER_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an empty ledger file
    #[command(after_help = "\
Examples:
  aqua --ledger campus.aqua init")]
    Init,

    /// Sources, locations, vehicles and consumption categories
    #[command(subcommand)]
    Master(master::MasterCommands),

    /// Enter, list and import rates
    #[command(subcommand)]
    Rate(rates::RateCommands),

    /// Water movements (purchases and internal hauls)
    #[command(subcommand)]
    Entry(entries::EntryCommands),

    /// Borewell and well yield readings
    #[command(subcommand)]
    Yield(readings::YieldCommands),

    /// Consumption meter readings
    #[command(subcommand)]
    Consumption(readings::ConsumptionCommands),

    /// Run a report (JSON or CSV on stdout)
    #[command(after_help = "\
Examples:
  aqua report summary --start 2024-01-01 --end 2024-12-31 --by month
  aqua report vendor-usage --start 2024-04-01 --format csv
  aqua report site-detail --location Hostel --start 2024-02-01 --end 2024-02-29
  aqua report dashboard --day 2024-02-15
  aqua report multi-month --day 2024-06-30 --months 6")]
    Report(reports::ReportArgs),

    /// Export movements or a full ledger snapshot
    #[command(subcommand)]
    Export(reports::ExportCommands),

    /// Replace the ledger with a JSON snapshot
    #[command(after_help = "\
Examples:
  aqua export snapshot backup.json
  aqua restore backup.json --force")]
    Restore {
        /// Snapshot written by `aqua export snapshot`
        file: PathBuf,

        /// Overwrite a non-empty ledger
        #[arg(long)]
        force: bool,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("AQUALEDGER_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing();

    let result = Settings::load(cli.config.as_deref())
        .map(|s| s.into_context(cli.ledger))
        .and_then(|ctx| run(&ctx, cli.command));

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

fn run(ctx: &Context, command: Commands) -> Result<(), CliError> {
    match command {
        Commands::Init => cmd_init(ctx),
        Commands::Master(cmd) => master::run(ctx, cmd),
        Commands::Rate(cmd) => rates::run(ctx, cmd),
        Commands::Entry(cmd) => entries::run(ctx, cmd),
        Commands::Yield(cmd) => readings::run_yield(ctx, cmd),
        Commands::Consumption(cmd) => readings::run_consumption(ctx, cmd),
        Commands::Report(args) => reports::run(ctx, args),
        Commands::Export(cmd) => reports::run_export(ctx, cmd),
        Commands::Restore { file, force } => cmd_restore(ctx, file, force),
    }
}

// ============================================================================
// init / restore
// ============================================================================

fn cmd_init(ctx: &Context) -> Result<(), CliError> {
    if ctx.ledger_path.exists() {
        return Err(CliError::args(format!("{} already exists", ctx.ledger_path.display()))
            .with_hint("pick another --ledger path"));
    }
    ctx.save(&Ledger::new())?;
    util::print_json(&json!({
        "ledger": ctx.ledger_path.display().to_string(),
        "format_version": LEDGER_FORMAT_VERSION,
    }))
}

fn cmd_restore(ctx: &Context, file: PathBuf, force: bool) -> Result<(), CliError> {
    let restored = json::import_snapshot(&file)?;
    let current = ctx.load()?;
    if !force && !current.is_empty() {
        return Err(CliError::args("ledger is not empty")
            .with_hint("pass --force to overwrite it"));
    }
    ctx.save(&restored)?;
    let parts = restored.to_parts();
    util::print_json(&json!({
        "ledger": ctx.ledger_path.display().to_string(),
        "movements": parts.movements.len(),
        "yields": parts.yields.len(),
        "consumptions": parts.consumptions.len(),
    }))
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn args(msg: impl Into<String>) -> Self {
        Self { code: EXIT_USAGE, message: msg.into(), hint: None }
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self { code: EXIT_ERROR, message: msg.into(), hint: None }
    }

    pub fn store(msg: impl Into<String>) -> Self {
        Self { code: EXIT_STORE, message: msg.into(), hint: None }
    }

    /// Add a hint to an existing error.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

impl From<LedgerError> for CliError {
    fn from(err: LedgerError) -> Self {
        let (code, hint) = match &err {
            LedgerError::InvalidDate { .. } => (EXIT_INVALID_INPUT, Some("dates are YYYY-MM-DD")),
            LedgerError::InvalidInput(_) | LedgerError::Duplicate { .. } => (EXIT_INVALID_INPUT, None),
            LedgerError::NotFound { .. } => (EXIT_NOT_FOUND, Some("`aqua master list` shows what exists")),
            LedgerError::Config(_) => (EXIT_CONFIG, None),
        };
        Self { code, message: err.to_string(), hint: hint.map(str::to_string) }
    }
}

impl From<StoreError> for CliError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Ledger(e) => e.into(),
            StoreError::Import { .. } => Self { code: EXIT_INVALID_INPUT, message: err.to_string(), hint: None },
            StoreError::UnsupportedVersion { .. } => {
                Self::store(err.to_string()).with_hint("upgrade aqua to open this ledger")
            }
            other => Self::store(other.to_string()),
        }
    }
}
