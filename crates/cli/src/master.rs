// master: sources, locations, vehicles, yield/consumption locations, categories

use aqualedger_core::*;
use clap::{Subcommand, ValueEnum};
use rust_decimal::Decimal;

use crate::settings::Context;
use crate::util::{self, print_json, print_table};
use crate::CliError;

#[derive(Subcommand)]
pub enum MasterCommands {
    /// Add a vendor, pipeline, bore or well
    #[command(after_help = "\
Examples:
  aqua master add-source 'Sri Murugan Water' --kind vendor
  aqua master add-source 'Corporation Line' --kind pipeline")]
    AddSource {
        name: String,

        /// Vendor, Pipeline, Internal_Bore or Internal_Well
        #[arg(long)]
        kind: SourceKind,
    },

    /// Add a loading or unloading point
    AddLocation {
        name: String,

        /// "Loading" marks a loading point; anything else is a site
        #[arg(long = "type", default_value = "Unloading")]
        location_type: String,

        #[arg(long, default_value_t = 0)]
        sort: i32,
    },

    /// Add a campus tanker
    AddVehicle {
        name: String,

        /// Nominal capacity in liters
        #[arg(long)]
        capacity: Decimal,
    },

    /// Add a borewell or well
    AddYieldLocation {
        name: String,

        #[arg(long = "type")]
        yield_type: YieldType,

        /// Yield is entered by hand instead of derived from the meter
        #[arg(long)]
        manual: bool,

        #[arg(long, default_value_t = 0)]
        sort: i32,
    },

    /// Add a consumption meter location
    AddConsumptionLocation {
        name: String,

        #[arg(long = "type", default_value = "Normal")]
        consumption_type: ConsumptionType,

        /// Category name
        #[arg(long)]
        category: Option<String>,

        #[arg(long, default_value_t = 0)]
        sort: i32,
    },

    /// Add a consumption category with its headcounts
    AddCategory {
        name: String,

        #[arg(long, default_value_t = 0)]
        students: u32,

        /// Alternate headcount for drinking-water metrics
        #[arg(long, default_value_t = 0)]
        second_count: u32,

        /// Leave out of per-capita figures
        #[arg(long)]
        excluded: bool,

        #[arg(long, default_value_t = 0)]
        exclude_value: u32,
    },

    /// List master records
    List {
        #[arg(value_enum)]
        kind: MasterKind,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
pub enum MasterKind {
    Sources,
    Locations,
    Vehicles,
    YieldLocations,
    ConsumptionLocations,
    Categories,
}

pub fn run(ctx: &Context, cmd: MasterCommands) -> Result<(), CliError> {
    match cmd {
        MasterCommands::AddSource { name, kind } => {
            let source = ctx.write(|l| Ok(l.add_source(&name, kind)?))?;
            print_json(&source)
        }
        MasterCommands::AddLocation { name, location_type, sort } => {
            let location = ctx.write(|l| Ok(l.add_location(&name, &location_type, sort)?))?;
            print_json(&location)
        }
        MasterCommands::AddVehicle { name, capacity } => {
            let vehicle = ctx.write(|l| Ok(l.add_vehicle(&name, Liters(capacity))?))?;
            print_json(&vehicle)
        }
        MasterCommands::AddYieldLocation { name, yield_type, manual, sort } => {
            let location = ctx.write(|l| Ok(l.add_yield_location(&name, yield_type, manual, sort)?))?;
            print_json(&location)
        }
        MasterCommands::AddConsumptionLocation { name, consumption_type, category, sort } => {
            let location = ctx.write(|l| {
                let category = category.as_deref().map(|c| util::category(l, c)).transpose()?;
                Ok(l.add_consumption_location(&name, consumption_type, category, sort)?)
            })?;
            print_json(&location)
        }
        MasterCommands::AddCategory { name, students, second_count, excluded, exclude_value } => {
            let mut category = Category::new(CategoryId(0), name);
            category.student_count = students;
            category.second_count = second_count;
            category.has_student_count = students > 0;
            category.is_excluded = excluded;
            category.exclude_value = exclude_value;
            let category = ctx.write(|l| Ok(l.add_category(category)?))?;
            print_json(&category)
        }
        MasterCommands::List { kind, json } => cmd_list(ctx, kind, json),
    }
}

fn active(flag: bool) -> String {
    if flag { "yes" } else { "no" }.to_string()
}

fn cmd_list(ctx: &Context, kind: MasterKind, json: bool) -> Result<(), CliError> {
    let ledger = ctx.load()?;
    match kind {
        MasterKind::Sources => {
            let items: Vec<&Source> = ledger.sources().collect();
            if json {
                return print_json(&items);
            }
            let rows = items
                .iter()
                .map(|s| vec![s.id.to_string(), s.name.clone(), s.kind.to_string(), active(s.active)])
                .collect::<Vec<_>>();
            print_table(&["id", "name", "kind", "active"], &rows)
        }
        MasterKind::Locations => {
            let items: Vec<&Location> = ledger.locations().collect();
            if json {
                return print_json(&items);
            }
            let rows = items
                .iter()
                .map(|l| {
                    vec![l.id.to_string(), l.name.clone(), l.location_type.clone(), active(l.active)]
                })
                .collect::<Vec<_>>();
            print_table(&["id", "name", "type", "active"], &rows)
        }
        MasterKind::Vehicles => {
            let items: Vec<&InternalVehicle> = ledger.vehicles().collect();
            if json {
                return print_json(&items);
            }
            let rows = items
                .iter()
                .map(|v| vec![v.id.to_string(), v.name.clone(), v.capacity.value().normalize().to_string()])
                .collect::<Vec<_>>();
            print_table(&["id", "name", "capacity_liters"], &rows)
        }
        MasterKind::YieldLocations => {
            let items: Vec<&YieldLocation> = ledger.yield_locations().collect();
            if json {
                return print_json(&items);
            }
            let rows = items
                .iter()
                .map(|y| {
                    vec![
                        y.id.to_string(),
                        y.name.clone(),
                        y.yield_type.to_string(),
                        active(y.is_manual_yield),
                        active(y.active),
                    ]
                })
                .collect::<Vec<_>>();
            print_table(&["id", "name", "type", "manual", "active"], &rows)
        }
        MasterKind::ConsumptionLocations => {
            let items: Vec<&ConsumptionLocation> = ledger.consumption_locations().collect();
            if json {
                return print_json(&items);
            }
            let rows = items
                .iter()
                .map(|c| {
                    let category = c
                        .category
                        .and_then(|id| ledger.category(id).ok())
                        .map(|cat| cat.name.clone())
                        .unwrap_or_default();
                    vec![c.id.to_string(), c.name.clone(), c.consumption_type.to_string(), category, active(c.active)]
                })
                .collect::<Vec<_>>();
            print_table(&["id", "name", "type", "category", "active"], &rows)
        }
        MasterKind::Categories => {
            let items: Vec<&Category> = ledger.categories().collect();
            if json {
                return print_json(&items);
            }
            let rows = items
                .iter()
                .map(|c| {
                    vec![
                        c.id.to_string(),
                        c.name.clone(),
                        c.student_count.to_string(),
                        c.second_count.to_string(),
                        active(c.is_excluded),
                    ]
                })
                .collect::<Vec<_>>();
            print_table(&["id", "name", "students", "second_count", "excluded"], &rows)
        }
    }
}
