use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl $name {
            pub fn value(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($label, " {}"), self.0)
            }
        }
    };
}

entity_id!(
    /// Row id of a PackageVersion, also the node id used by graph traversal
    PackageVersionId,
    "package version"
);
entity_id!(LinkId, "link");
entity_id!(GraphId, "graph");
entity_id!(AdvisoryId, "advisory");
entity_id!(ReportId, "report");
entity_id!(ScanId, "scan");
