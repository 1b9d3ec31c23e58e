// report / export: every report as JSON or CSV, movement and snapshot export

use std::fs::File;
use std::io::{self, BufWriter};
use std::path::PathBuf;

use aqualedger_core::*;
use aqualedger_engine::report::{self, DateRange, Granularity};
use aqualedger_engine::{EngineConfig, Ledger, LedgerError};
use aqualedger_io::{csv, json};
use clap::{Args, Subcommand, ValueEnum};
use serde::Serialize;
use serde_json::json;

use crate::settings::Context;
use crate::util::{self, date_arg, print_json, today};
use crate::CliError;

#[derive(Clone, Copy, ValueEnum)]
pub enum ReportKind {
    /// Movements by day/month/year with water-category breakdown
    Summary,
    /// Yearly summary over the last configured number of years
    Trend,
    WaterType,
    VendorUsage,
    VehicleUtilization,
    CapacityUtilization,
    CostComparison,
    SiteConsumption,
    /// Needs --location
    SiteDetail,
    /// Needs --vendor
    VendorDetail,
    RateDetails,
    DailyYield,
    DailyConsumption,
    /// Needs --start and --end
    CategoryMonthly,
    /// Month containing --day
    Dashboard,
    /// --months months ending with the month of --day
    MultiMonth,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum By {
    Day,
    Month,
    Year,
}

impl From<By> for Granularity {
    fn from(by: By) -> Self {
        match by {
            By::Day => Granularity::Day,
            By::Month => Granularity::Month,
            By::Year => Granularity::Year,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Csv,
}

#[derive(Args)]
pub struct ReportArgs {
    #[arg(value_enum)]
    kind: ReportKind,

    /// First day, YYYY-MM-DD
    #[arg(long)]
    start: Option<String>,

    /// Last day, YYYY-MM-DD
    #[arg(long)]
    end: Option<String>,

    #[arg(long, value_enum, default_value = "month")]
    by: By,

    /// Anchor day for dashboard and multi-month [default: today]
    #[arg(long)]
    day: Option<String>,

    #[arg(long, default_value_t = 6)]
    months: u32,

    /// Location name (site-detail)
    #[arg(long)]
    location: Option<String>,

    /// Vendor name (vendor-detail)
    #[arg(long)]
    vendor: Option<String>,

    #[arg(long, value_enum, default_value = "json")]
    format: OutputFormat,
}

fn emit<T: Serialize>(report: &T, format: OutputFormat) -> Result<(), CliError> {
    match format {
        OutputFormat::Json => print_json(report),
        OutputFormat::Csv => {
            let stdout = io::stdout();
            csv::export_report(report, stdout.lock())?;
            Ok(())
        }
    }
}

fn need<'a>(value: &'a Option<String>, flag: &str, kind: &str) -> Result<&'a str, CliError> {
    value
        .as_deref()
        .ok_or_else(|| CliError::args(format!("{kind} needs {flag}")))
}

pub fn run(ctx: &Context, args: ReportArgs) -> Result<(), CliError> {
    let ledger = ctx.load()?;
    let range = DateRange::parse(args.start.as_deref(), args.end.as_deref())?;
    let day = match &args.day {
        Some(d) => date_arg("day", d)?,
        None => today(),
    };
    build(&ledger, &ctx.config, &args, &range, day)
}

fn build(
    ledger: &Ledger,
    config: &EngineConfig,
    args: &ReportArgs,
    range: &DateRange,
    day: chrono::NaiveDate,
) -> Result<(), CliError> {
    let f = args.format;
    match args.kind {
        ReportKind::Summary => emit(&report::summary(ledger, range, args.by.into(), config), f),
        ReportKind::Trend => {
            let range = if range.start.is_none() && range.end.is_none() {
                report::default_trend_range(ledger, config)?
            } else {
                *range
            };
            emit(&report::summary(ledger, &range, Granularity::Year, config), f)
        }
        ReportKind::WaterType => emit(&report::water_type_consumption(ledger, range, config), f),
        ReportKind::VendorUsage => emit(&report::vendor_usage(ledger, range, config), f),
        ReportKind::VehicleUtilization => emit(&report::vehicle_utilization(ledger, range, config), f),
        ReportKind::CapacityUtilization => emit(&report::capacity_utilization(ledger, range), f),
        ReportKind::CostComparison => emit(&report::cost_comparison(ledger, range, config), f),
        ReportKind::SiteConsumption => emit(&report::site_consumption(ledger, range, config), f),
        ReportKind::SiteDetail => {
            let id = util::location(ledger, need(&args.location, "--location", "site-detail")?)?;
            emit(&report::site_detail(ledger, id, range, config)?, f)
        }
        ReportKind::VendorDetail => {
            let id = util::source(ledger, need(&args.vendor, "--vendor", "vendor-detail")?, SourceKind::Vendor)?;
            emit(&report::vendor_detail(ledger, id, range, config)?, f)
        }
        ReportKind::RateDetails => emit(&report::rate_details(ledger), f),
        ReportKind::DailyYield => emit(&report::daily_yield(ledger, range, config), f),
        ReportKind::DailyConsumption => emit(&report::daily_normal_consumption(ledger, range, config), f),
        ReportKind::CategoryMonthly => {
            let (Some(start), Some(end)) = (range.start, range.end) else {
                return Err(LedgerError::invalid("category-monthly needs --start and --end").into());
            };
            emit(&report::category_monthly_breakdown(ledger, start, end, config)?, f)
        }
        ReportKind::Dashboard => emit(&report::dashboard(ledger, day, config)?, f),
        ReportKind::MultiMonth => emit(&report::multi_month(ledger, day, args.months, config)?, f),
    }
}

// ============================================================================
// export
// ============================================================================

#[derive(Subcommand)]
pub enum ExportCommands {
    /// Movements as CSV, one row per entry
    #[command(after_help = "\
Examples:
  aqua export movements --start 2024-04-01 --end 2025-03-31 -o fy2024.csv
  aqua export movements | head -5")]
    Movements {
        #[arg(long)]
        start: Option<String>,

        #[arg(long)]
        end: Option<String>,

        /// Output file (omit for stdout)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },

    /// Whole ledger as a versioned JSON document (see `aqua restore`)
    Snapshot { output: PathBuf },
}

pub fn run_export(ctx: &Context, cmd: ExportCommands) -> Result<(), CliError> {
    let ledger = ctx.load()?;
    match cmd {
        ExportCommands::Movements { start, end, output } => {
            let range = DateRange::parse(start.as_deref(), end.as_deref())?;
            match output {
                Some(path) => {
                    let file = File::create(&path).map_err(|e| CliError::io(format!("{}: {e}", path.display())))?;
                    let rows = csv::export_movements(&ledger, &range, BufWriter::new(file))?;
                    eprintln!("wrote {rows} movements to {}", path.display());
                    Ok(())
                }
                None => {
                    let stdout = io::stdout();
                    csv::export_movements(&ledger, &range, stdout.lock())?;
                    Ok(())
                }
            }
        }
        ExportCommands::Snapshot { output } => {
            json::export_snapshot(&ledger, &output)?;
            print_json(&json!({ "snapshot": output.display().to_string() }))
        }
    }
}
