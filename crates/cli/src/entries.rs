// entry: record, update, delete and cost-preview water movements

use aqualedger_core::*;
use aqualedger_engine::ledger::{EnteredQuantity, MovementDraft};
use aqualedger_engine::request::{CostRequest, SourceType};
use aqualedger_engine::Ledger;
use clap::{Args, Subcommand, ValueEnum};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::settings::Context;
use crate::util::{self, date_arg, print_json};
use crate::CliError;

#[derive(Subcommand)]
pub enum EntryCommands {
    /// Record a movement; quantity and cost are derived when not given
    #[command(after_help = "\
Examples:
  aqua entry add --via vendor --source 'Sri Murugan Water' --date 2024-02-01 \\
      --water-type drinking --loads 2 --unloading Hostel
  aqua entry add --via internal --vehicle 'Tanker 1' --loading 'Muthu Nagar' \\
      --date 2024-02-01 --unloading Kitchen --shift morning
  aqua entry add --via pipeline --source 'Corporation Line' --date 2024-02-01 --meter 1542")]
    Add(MovementArgs),

    /// Replace a movement; cost is re-resolved for the new fields
    Update {
        id: u64,

        #[command(flatten)]
        args: MovementArgs,
    },

    /// Delete a movement
    Delete { id: u64 },

    /// Show one movement
    Show { id: u64 },

    /// Cost a movement without recording it
    #[command(after_help = "\
Examples:
  aqua entry cost --via vendor --source 'Sri Murugan Water' --date 2024-02-01 --loads 1
  aqua entry cost --via pipeline --source 'Corporation Line' --date 2024-02-01 --kl 12")]
    Cost(MovementArgs),

    /// Last meter reading of a pipeline and its rate on a date
    LastReading {
        source: String,

        #[arg(long)]
        date: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
pub enum Via {
    Vendor,
    Pipeline,
    Internal,
}

#[derive(Args)]
pub struct MovementArgs {
    #[arg(long, value_enum)]
    via: Via,

    /// YYYY-MM-DD
    #[arg(long)]
    date: Option<String>,

    /// Vendor or pipeline name
    #[arg(long)]
    source: Option<String>,

    /// Campus tanker (internal hauls)
    #[arg(long)]
    vehicle: Option<String>,

    /// Loading point
    #[arg(long)]
    loading: Option<String>,

    /// Site the water was delivered to
    #[arg(long)]
    unloading: Option<String>,

    #[arg(long)]
    shift: Option<Shift>,

    #[arg(long, default_value = "drinking")]
    water_type: WaterType,

    #[arg(long, default_value_t = 1)]
    loads: u32,

    /// Quantity in liters
    #[arg(long, conflicts_with = "kl")]
    liters: Option<Decimal>,

    /// Quantity in kiloliters
    #[arg(long)]
    kl: Option<Decimal>,

    /// Pipeline meter reading (kiloliters)
    #[arg(long)]
    meter: Option<i64>,

    /// Per-load liters when the tanker was not filled to capacity
    #[arg(long)]
    manual_capacity: Option<Decimal>,

    /// Cost by quantity instead of per load
    #[arg(long = "override")]
    manual_override: bool,

    #[arg(long, default_value = "")]
    comments: String,
}

fn required<'a>(flag: &str, value: &'a Option<String>) -> Result<&'a str, CliError> {
    value
        .as_deref()
        .ok_or_else(|| CliError::args(format!("{flag} is required for this source")))
}

impl MovementArgs {
    fn source_ref(&self, ledger: &Ledger) -> Result<SourceRef, CliError> {
        Ok(match self.via {
            Via::Vendor => SourceRef::Vendor {
                source: util::source(ledger, required("--source", &self.source)?, SourceKind::Vendor)?,
            },
            Via::Pipeline => SourceRef::Pipeline {
                source: util::source(ledger, required("--source", &self.source)?, SourceKind::Pipeline)?,
            },
            Via::Internal => SourceRef::Internal {
                vehicle: util::vehicle(ledger, required("--vehicle", &self.vehicle)?)?,
                loading_location: util::location(ledger, required("--loading", &self.loading)?)?,
            },
        })
    }

    fn draft(&self, ledger: &Ledger) -> Result<MovementDraft, CliError> {
        let date = date_arg("entry_date", required("--date", &self.date)?)?;
        let mut draft = MovementDraft::new(date, self.source_ref(ledger)?);
        if !matches!(self.via, Via::Internal) {
            draft.loading_location = self.loading.as_deref().map(|n| util::location(ledger, n)).transpose()?;
        }
        draft.unloading_location = self.unloading.as_deref().map(|n| util::location(ledger, n)).transpose()?;
        draft.shift = self.shift;
        draft.water_type = self.water_type;
        draft.load_count = self.loads;
        draft.meter_current = self.meter;
        draft.quantity = match (self.liters, self.kl) {
            (Some(l), _) => Some(EnteredQuantity::Liters(Liters(l))),
            (None, Some(kl)) => Some(EnteredQuantity::Kiloliters(Kiloliters(kl))),
            (None, None) => None,
        };
        draft.manual_capacity_liters = self.manual_capacity.map(Liters);
        draft.is_manual_override = self.manual_override;
        draft.comments = self.comments.clone();
        Ok(draft)
    }

    /// Preview requests carry kiloliters for pipelines and liters otherwise.
    fn cost_request(&self, ledger: &Ledger) -> Result<CostRequest, CliError> {
        let source = self.source_ref(ledger)?;
        let liters = match (self.liters, self.kl) {
            (Some(l), _) => l,
            (None, Some(kl)) => Kiloliters(kl).to_liters().value(),
            (None, None) => Decimal::ZERO,
        };
        let (source_type, amount) = match source {
            SourceRef::Vendor { .. } => (SourceType::Vendor, liters),
            SourceRef::Pipeline { .. } => (SourceType::Pipeline, Liters(liters).to_kl().value()),
            SourceRef::Internal { .. } => (SourceType::Internal, liters),
        };
        let (vehicle_id, loading_location_id) = match source {
            SourceRef::Internal { vehicle, loading_location } => (Some(vehicle.0), Some(loading_location.0)),
            _ => (None, None),
        };
        Ok(CostRequest {
            source_type,
            source_id: source.source_id().map(|s| s.0),
            vehicle_id,
            loading_location_id,
            water_type: Some(self.water_type.label().to_string()),
            quantity_liters: amount.to_f64().unwrap_or(0.0),
            load_count: Some(self.loads),
            entry_date: self.date.clone(),
            is_manual_override: self.manual_override,
        })
    }
}

pub fn run(ctx: &Context, cmd: EntryCommands) -> Result<(), CliError> {
    match cmd {
        EntryCommands::Add(args) => {
            let entry = ctx.write(|l| {
                let draft = args.draft(l)?;
                Ok(l.record_movement(draft)?)
            })?;
            print_json(&entry)
        }
        EntryCommands::Update { id, args } => {
            let entry = ctx.write(|l| {
                let draft = args.draft(l)?;
                Ok(l.update_movement(EntryId(id), draft)?)
            })?;
            print_json(&entry)
        }
        EntryCommands::Delete { id } => {
            let entry = ctx.write(|l| Ok(l.delete_movement(EntryId(id))?))?;
            print_json(&entry)
        }
        EntryCommands::Show { id } => {
            let ledger = ctx.load()?;
            print_json(ledger.movement(EntryId(id))?)
        }
        EntryCommands::Cost(args) => {
            let ledger = ctx.load()?;
            let request = args.cost_request(&ledger)?;
            print_json(&ledger.preview(request)?)
        }
        EntryCommands::LastReading { source, date } => {
            let ledger = ctx.load()?;
            let date = date_arg("date", &date)?;
            let source = util::source(&ledger, &source, SourceKind::Pipeline)?;
            print_json(&ledger.last_pipeline_reading(source, date)?)
        }
    }
}
