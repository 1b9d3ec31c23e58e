use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<$name> for u64 {
            fn from(id: $name) -> u64 {
                id.0
            }
        }
    };
}

define_id!(
    /// Vendor, pipeline or internal bore/well.
    SourceId
);
define_id!(
    /// Loading or unloading point on campus.
    LocationId
);
define_id!(
    /// Campus-owned tanker.
    VehicleId
);
define_id!(
    /// Any effective-dated rate row. Assigned in insertion order.
    RateId
);
define_id!(
    /// Movement, yield or consumption entry. Assigned in creation order.
    EntryId
);
define_id!(YieldLocationId);
define_id!(ConsumptionLocationId);
define_id!(CategoryId);
