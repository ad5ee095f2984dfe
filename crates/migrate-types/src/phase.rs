use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ParseError;

/// Ordered migration phase, stored under `MigrationCurrentPhase` and used as
/// the `<phase>` segment of composite metadata keys. Ordering matters:
/// `None(0) < Copy(1) < Catchup(2) < Downtime(3)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum MigrationPhase {
    None = 0,
    Copy = 1,
    Catchup = 2,
    Downtime = 3,
}

impl MigrationPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Copy => "Copy",
            Self::Catchup => "Catchup",
            Self::Downtime => "Downtime",
        }
    }
}

impl fmt::Display for MigrationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MigrationPhase {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "None" => Ok(Self::None),
            "Copy" => Ok(Self::Copy),
            "Catchup" => Ok(Self::Catchup),
            "Downtime" => Ok(Self::Downtime),
            other => Err(ParseError::InvalidEnum {
                type_name: "MigrationPhase",
                value: other.to_string(),
            }),
        }
    }
}

/// Behavior-carrying variant of [`MigrationPhase`]. `Catchup` carries its own
/// iteration number; `Copy` and `Downtime` run exactly once (iteration 1).
///
/// Per the redesign note in the source spec, this replaces a base-class
/// `PhaseWorkloadBase` hierarchy: `compute_start_sn`/`compute_end_sn` match on
/// this enum instead of relying on virtual dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PhaseKind {
    Copy,
    Catchup(u32),
    Downtime,
}

impl PhaseKind {
    pub fn phase(self) -> MigrationPhase {
        match self {
            Self::Copy => MigrationPhase::Copy,
            Self::Catchup(_) => MigrationPhase::Catchup,
            Self::Downtime => MigrationPhase::Downtime,
        }
    }

    /// The iteration number used in composite metadata keys. Only `Catchup`
    /// iterates in the source system; `Copy` and `Downtime` are always 1.
    pub fn iter(self) -> u32 {
        match self {
            Self::Copy | Self::Downtime => 1,
            Self::Catchup(iter) => iter,
        }
    }
}

impl fmt::Display for PhaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.phase(), self.iter())
    }
}
