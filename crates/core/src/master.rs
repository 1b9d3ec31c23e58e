//! Master data: sources, locations, vehicles, yield/consumption points, categories.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ids::*;
use crate::units::Liters;

// ---------------------------------------------------------------------------
// Labels
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseLabelError {
    pub kind: &'static str,
    pub value: String,
}

impl fmt::Display for ParseLabelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown {} '{}'", self.kind, self.value)
    }
}

impl std::error::Error for ParseLabelError {}

/// Declares a closed label set: wire label, Display, FromStr (wire label or
/// case-insensitive alias), and `ALL`.
macro_rules! label_enum {
    (
        $(#[$meta:meta])*
        $name:ident, $kind:literal {
            $($variant:ident => $label:literal $(| $alias:literal)*),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $label)] $variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn label(self) -> &'static str {
                match self {
                    $($name::$variant => $label),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.label())
            }
        }

        impl FromStr for $name {
            type Err = ParseLabelError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let t = s.trim();
                $(
                    if t == $label || t.eq_ignore_ascii_case(stringify!($variant))
                        $(|| t.eq_ignore_ascii_case($alias))*
                    {
                        return Ok($name::$variant);
                    }
                )+
                Err(ParseLabelError { kind: $kind, value: s.to_string() })
            }
        }
    };
}

label_enum!(
    /// Water quality tag on purchases and rates.
    WaterType, "water type" {
        Drinking => "Drinking Water" | "drinking",
        Normal => "Normal Water (Salt)" | "normal" | "salt",
    }
);

label_enum!(
    SourceKind, "source kind" {
        InternalBore => "Internal_Bore" | "bore",
        InternalWell => "Internal_Well" | "well",
        Pipeline => "Pipeline",
        Vendor => "Vendor",
    }
);

label_enum!(
    Shift, "shift" {
        Morning => "Morning",
        Evening => "Evening",
        Night => "Night",
    }
);

label_enum!(
    YieldType, "yield type" {
        Borewell => "Borewell",
        Well => "Well",
    }
);

label_enum!(
    ConsumptionType, "consumption type" {
        Normal => "Normal",
        Drinking => "Drinking",
    }
);

impl Default for WaterType {
    fn default() -> Self {
        WaterType::Drinking
    }
}

impl ConsumptionType {
    /// Water type a consumption reading is costed at.
    pub fn water_type(self) -> WaterType {
        match self {
            ConsumptionType::Normal => WaterType::Normal,
            ConsumptionType::Drinking => WaterType::Drinking,
        }
    }
}

// ---------------------------------------------------------------------------
// Entities
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub id: SourceId,
    pub name: String,
    pub kind: SourceKind,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub id: LocationId,
    pub name: String,
    /// Free-form, e.g. "Loading" or "Unloading".
    pub location_type: String,
    pub active: bool,
    pub sort_order: i32,
}

impl Location {
    pub fn is_loading_point(&self) -> bool {
        self.location_type.eq_ignore_ascii_case("loading")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InternalVehicle {
    pub id: VehicleId,
    pub name: String,
    pub capacity: Liters,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YieldLocation {
    pub id: YieldLocationId,
    pub name: String,
    pub yield_type: YieldType,
    pub is_manual_yield: bool,
    pub active: bool,
    pub sort_order: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsumptionLocation {
    pub id: ConsumptionLocationId,
    pub name: String,
    pub consumption_type: ConsumptionType,
    pub category: Option<CategoryId>,
    pub active: bool,
    pub sort_order: i32,
}

/// Consumption grouping with headcounts for per-capita metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    pub active: bool,
    pub student_count: u32,
    /// Alternate headcount, used for drinking water by matching categories.
    pub second_count: u32,
    pub has_student_count: bool,
    pub is_excluded: bool,
    pub exclude_value: u32,
}

impl Category {
    pub fn new(id: CategoryId, name: impl Into<String>) -> Self {
        Category {
            id,
            name: name.into(),
            active: true,
            student_count: 0,
            second_count: 0,
            has_student_count: false,
            is_excluded: false,
            exclude_value: 0,
        }
    }

    /// Headcount for normal-water metrics.
    pub fn normal_head_count(&self) -> u32 {
        self.student_count
    }

    /// Headcount for drinking-water metrics. Categories whose name contains
    /// one of `keywords` (case-insensitive) use `second_count` when it is set.
    pub fn drinking_head_count(&self, keywords: &[String]) -> u32 {
        let upper = self.name.to_uppercase();
        let matches = keywords.iter().any(|k| upper.contains(&k.to_uppercase()));
        if matches && self.second_count > 0 {
            self.second_count
        } else {
            self.student_count
        }
    }
}
