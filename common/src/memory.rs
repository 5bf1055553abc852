use serde::{Deserialize, Serialize};
use std::fmt;

/// Model residency policy between pipeline stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryMode {
    /// Keep every stage loaded between requests.
    #[default]
    Maximum,
    /// Unload each stage as soon as its work is done; the next request reloads.
    Minimum,
}

impl MemoryMode {
    pub fn unload_after_stage(&self) -> bool {
        matches!(self, Self::Minimum)
    }
}

impl fmt::Display for MemoryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Maximum => f.write_str("maximum"),
            Self::Minimum => f.write_str("minimum"),
        }
    }
}
