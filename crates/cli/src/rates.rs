// rate: effective-dated rate entry, rate details, rate sheet import

use std::path::PathBuf;

use aqualedger_core::*;
use aqualedger_engine::rates::{GeneralRateDraft, InternalRateDraft, PipelineRateDraft, VendorRateDraft};
use aqualedger_engine::report::rate_details;
use aqualedger_io::csv;
use clap::{Subcommand, ValueEnum};
use rust_decimal::Decimal;
use serde_json::json;

use crate::settings::Context;
use crate::util::{self, date_arg, print_json};
use crate::CliError;

#[derive(Subcommand)]
pub enum RateCommands {
    /// Add a vendor rate (per load or per liter)
    #[command(after_help = "\
Examples:
  aqua rate add-vendor 'Sri Murugan Water' --water-type drinking --basis per_load \\
      --rate 1500 --capacity 12000 --effective 2024-01-01
  aqua rate add-vendor 'Sri Murugan Water' --water-type normal --basis per_liter \\
      --rate 0.08 --effective 2024-04-01")]
    AddVendor {
        vendor: String,

        #[arg(long)]
        water_type: WaterType,

        /// per_load or per_liter
        #[arg(long)]
        basis: CostBasis,

        /// Cost per load, or cost per liter
        #[arg(long)]
        rate: Decimal,

        /// Tanker capacity in liters (per-load rates)
        #[arg(long)]
        capacity: Option<Decimal>,

        #[arg(long)]
        effective: String,
    },

    /// Add a per-trip rate for a campus tanker at a loading point
    AddInternal {
        vehicle: String,

        #[arg(long)]
        loading: String,

        #[arg(long)]
        cost_per_load: Decimal,

        #[arg(long)]
        effective: String,
    },

    /// Add a pipeline cost per liter
    AddPipeline {
        source: String,

        #[arg(long)]
        cost_per_liter: Decimal,

        #[arg(long)]
        effective: String,
    },

    /// Add campus-wide normal/drinking water costs per liter
    AddGeneral {
        #[arg(long)]
        normal: Decimal,

        #[arg(long)]
        drinking: Decimal,

        #[arg(long)]
        effective: String,

        /// Entry date, breaks ties between equal effective dates [default: effective]
        #[arg(long)]
        entered: Option<String>,
    },

    /// Current rates per vendor, vehicle and pipeline (JSON)
    List,

    /// Import a rate sheet (CSV; all rows or none)
    #[command(after_help = "\
Columns:
  vendor    vendor, water_type, cost_basis, rate_value, vehicle_capacity, effective_date
  internal  vehicle, loading_location, cost_per_load, effective_date
  pipeline  source, cost_per_liter, effective_date
  general   entry_date, effective_date, normal_water_rate, drinking_water_rate")]
    Import {
        #[arg(value_enum)]
        sheet: RateSheet,

        file: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
pub enum RateSheet {
    Vendor,
    Internal,
    Pipeline,
    General,
}

pub fn run(ctx: &Context, cmd: RateCommands) -> Result<(), CliError> {
    match cmd {
        RateCommands::AddVendor { vendor, water_type, basis, rate, capacity, effective } => {
            let effective_date = date_arg("effective_date", &effective)?;
            let rate = ctx.write(|l| {
                let draft = VendorRateDraft {
                    source: util::source(l, &vendor, SourceKind::Vendor)?,
                    water_type,
                    cost_basis: basis,
                    rate_value: rate,
                    vehicle_capacity: capacity.map(Liters),
                    effective_date,
                };
                Ok(l.add_vendor_rate(draft)?)
            })?;
            print_json(&rate)
        }
        RateCommands::AddInternal { vehicle, loading, cost_per_load, effective } => {
            let effective_date = date_arg("effective_date", &effective)?;
            let rate = ctx.write(|l| {
                let draft = InternalRateDraft {
                    vehicle: util::vehicle(l, &vehicle)?,
                    loading_location: util::location(l, &loading)?,
                    cost_per_load,
                    effective_date,
                };
                Ok(l.add_internal_rate(draft)?)
            })?;
            print_json(&rate)
        }
        RateCommands::AddPipeline { source, cost_per_liter, effective } => {
            let effective_date = date_arg("effective_date", &effective)?;
            let rate = ctx.write(|l| {
                let draft = PipelineRateDraft {
                    source: util::source(l, &source, SourceKind::Pipeline)?,
                    cost_per_liter,
                    effective_date,
                };
                Ok(l.add_pipeline_rate(draft)?)
            })?;
            print_json(&rate)
        }
        RateCommands::AddGeneral { normal, drinking, effective, entered } => {
            let effective_date = date_arg("effective_date", &effective)?;
            let entry_date = match entered {
                Some(d) => date_arg("entry_date", &d)?,
                None => effective_date,
            };
            let draft = GeneralRateDraft {
                entry_date,
                effective_date,
                normal_water_rate: normal,
                drinking_water_rate: drinking,
            };
            let rate = ctx.write(|l| Ok(l.add_general_rate(draft)?))?;
            print_json(&rate)
        }
        RateCommands::List => {
            let ledger = ctx.load()?;
            print_json(&rate_details(&ledger))
        }
        RateCommands::Import { sheet, file } => {
            let content = csv::read_file_as_utf8(&file)?;
            let imported = ctx.write(|l| {
                let n = match sheet {
                    RateSheet::Vendor => csv::import_vendor_rates(l, &content)?,
                    RateSheet::Internal => csv::import_internal_rates(l, &content)?,
                    RateSheet::Pipeline => csv::import_pipeline_rates(l, &content)?,
                    RateSheet::General => csv::import_general_rates(l, &content)?,
                };
                Ok(n)
            })?;
            print_json(&json!({ "imported": imported }))
        }
    }
}
