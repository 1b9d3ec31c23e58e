// yield / consumption: meter readings, bulk sheets, CSV import

use std::path::PathBuf;

use aqualedger_core::*;
use aqualedger_engine::ledger::{ConsumptionDraft, ReadingKind, YieldDraft};
use aqualedger_io::csv;
use clap::Subcommand;
use serde_json::json;

use crate::settings::Context;
use crate::util::{self, date_arg, print_json};
use crate::CliError;

#[derive(Subcommand)]
pub enum YieldCommands {
    /// Record a yield reading; yield is the meter delta in liters
    #[command(after_help = "\
Examples:
  aqua yield record --date 2024-02-02 --location 'Bore 3' --reading 47
  aqua yield record --date 2024-02-02 --location 'Open Well' --liters 8000")]
    Record {
        #[arg(long)]
        date: String,

        #[arg(long)]
        location: String,

        /// Meter reading (kiloliters)
        #[arg(long, default_value_t = 0)]
        reading: i64,

        /// Yield in liters, for manual-yield locations
        #[arg(long)]
        liters: Option<i64>,

        #[arg(long, default_value = "")]
        comment: String,
    },

    /// Replace a yield reading; the next reading at the location is recomputed
    Update {
        id: u64,

        #[arg(long)]
        date: String,

        #[arg(long)]
        location: String,

        #[arg(long, default_value_t = 0)]
        reading: i64,

        #[arg(long)]
        liters: Option<i64>,

        #[arg(long, default_value = "")]
        comment: String,
    },

    /// Delete a yield reading
    Delete { id: u64 },

    /// Bulk-entry pre-fill: every active location with its previous reading
    Sheet {
        #[arg(long)]
        date: String,
    },

    /// Import one day of readings (CSV: location, current_reading, yield_liters, comment)
    Import {
        #[arg(long)]
        date: String,

        file: PathBuf,
    },

    /// Latest reading at a location on or before a date
    Last {
        location: String,

        #[arg(long)]
        date: String,
    },
}

#[derive(Subcommand)]
pub enum ConsumptionCommands {
    /// Record a consumption reading
    #[command(after_help = "\
Examples:
  aqua consumption record --date 2024-02-02 --location 'Hostel A' --reading 1312
  aqua consumption record --date 2024-02-02 --location 'Hostel A' --type drinking --reading 88")]
    Record {
        #[arg(long)]
        date: String,

        #[arg(long)]
        location: String,

        #[arg(long = "type", default_value = "Normal")]
        consumption_type: ConsumptionType,

        /// Meter reading (kiloliters)
        #[arg(long)]
        reading: i64,

        #[arg(long, default_value = "")]
        comment: String,
    },

    /// Replace a consumption reading; the next reading at the location is recomputed
    Update {
        id: u64,

        #[arg(long)]
        date: String,

        #[arg(long)]
        location: String,

        #[arg(long = "type", default_value = "Normal")]
        consumption_type: ConsumptionType,

        #[arg(long)]
        reading: i64,

        #[arg(long, default_value = "")]
        comment: String,
    },

    /// Delete a consumption reading
    Delete { id: u64 },

    /// Bulk-entry pre-fill for one consumption type
    Sheet {
        #[arg(long)]
        date: String,

        #[arg(long = "type", default_value = "Normal")]
        consumption_type: ConsumptionType,
    },

    /// Import one day of readings (CSV: location, consumption_type, current_reading, comment)
    Import {
        #[arg(long)]
        date: String,

        file: PathBuf,
    },

    /// Latest reading at a location on or before a date
    Last {
        location: String,

        #[arg(long = "type", default_value = "Normal")]
        consumption_type: ConsumptionType,

        #[arg(long)]
        date: String,
    },
}

pub fn run_yield(ctx: &Context, cmd: YieldCommands) -> Result<(), CliError> {
    match cmd {
        YieldCommands::Record { date, location, reading, liters, comment } => {
            let date = date_arg("date", &date)?;
            let entry = ctx.write(|l| {
                let draft = YieldDraft {
                    date,
                    location: util::yield_location(l, &location)?,
                    current_reading: reading,
                    yield_liters: liters,
                    comment,
                };
                Ok(l.record_yield(draft)?)
            })?;
            print_json(&entry)
        }
        YieldCommands::Update { id, date, location, reading, liters, comment } => {
            let date = date_arg("date", &date)?;
            let entry = ctx.write(|l| {
                let draft = YieldDraft {
                    date,
                    location: util::yield_location(l, &location)?,
                    current_reading: reading,
                    yield_liters: liters,
                    comment,
                };
                Ok(l.update_yield(EntryId(id), draft)?)
            })?;
            print_json(&entry)
        }
        YieldCommands::Delete { id } => {
            let entry = ctx.write(|l| Ok(l.delete_yield(EntryId(id))?))?;
            print_json(&entry)
        }
        YieldCommands::Sheet { date } => {
            let date = date_arg("date", &date)?;
            let ledger = ctx.load()?;
            print_json(&ledger.bulk_yield_sheet(date))
        }
        YieldCommands::Import { date, file } => {
            let date = date_arg("date", &date)?;
            let content = csv::read_file_as_utf8(&file)?;
            let outcome = ctx.write(|l| Ok(csv::import_yield_readings(l, date, &content)?))?;
            print_json(&outcome)
        }
        YieldCommands::Last { location, date } => {
            let date = date_arg("date", &date)?;
            let ledger = ctx.load()?;
            let id = util::yield_location(&ledger, &location)?;
            let reading = ledger.last_reading(ReadingKind::Yield, id.0, date)?;
            print_json(&json!({ "location": location, "date": date, "last_reading": reading }))
        }
    }
}

pub fn run_consumption(ctx: &Context, cmd: ConsumptionCommands) -> Result<(), CliError> {
    match cmd {
        ConsumptionCommands::Record { date, location, consumption_type, reading, comment } => {
            let date = date_arg("date", &date)?;
            let entry = ctx.write(|l| {
                let draft = ConsumptionDraft {
                    date,
                    location: util::consumption_location(l, &location, consumption_type)?,
                    current_reading: reading,
                    comment,
                };
                Ok(l.record_consumption(draft)?)
            })?;
            print_json(&entry)
        }
        ConsumptionCommands::Update { id, date, location, consumption_type, reading, comment } => {
            let date = date_arg("date", &date)?;
            let entry = ctx.write(|l| {
                let draft = ConsumptionDraft {
                    date,
                    location: util::consumption_location(l, &location, consumption_type)?,
                    current_reading: reading,
                    comment,
                };
                Ok(l.update_consumption(EntryId(id), draft)?)
            })?;
            print_json(&entry)
        }
        ConsumptionCommands::Delete { id } => {
            let entry = ctx.write(|l| Ok(l.delete_consumption(EntryId(id))?))?;
            print_json(&entry)
        }
        ConsumptionCommands::Sheet { date, consumption_type } => {
            let date = date_arg("date", &date)?;
            let ledger = ctx.load()?;
            print_json(&ledger.bulk_consumption_sheet(date, consumption_type))
        }
        ConsumptionCommands::Import { date, file } => {
            let date = date_arg("date", &date)?;
            let content = csv::read_file_as_utf8(&file)?;
            let outcome = ctx.write(|l| Ok(csv::import_consumption_readings(l, date, &content)?))?;
            print_json(&outcome)
        }
        ConsumptionCommands::Last { location, consumption_type, date } => {
            let date = date_arg("date", &date)?;
            let ledger = ctx.load()?;
            let id = util::consumption_location(&ledger, &location, consumption_type)?;
            let reading = ledger.last_reading(ReadingKind::Consumption, id.0, date)?;
            print_json(&json!({ "location": location, "date": date, "last_reading": reading }))
        }
    }
}
