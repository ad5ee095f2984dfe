use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ParseError;

/// Global migration mode, stored under `MigrationCurrentStatus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MigrationState {
    None,
    InProgress,
    Completed,
    Aborted,
}

impl MigrationState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "None",
            Self::InProgress => "InProgress",
            Self::Completed => "Completed",
            Self::Aborted => "Aborted",
        }
    }
}

impl fmt::Display for MigrationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MigrationState {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "None" => Ok(Self::None),
            "InProgress" => Ok(Self::InProgress),
            "Completed" => Ok(Self::Completed),
            "Aborted" => Ok(Self::Aborted),
            other => Err(ParseError::InvalidEnum {
                type_name: "MigrationState",
                value: other.to_string(),
            }),
        }
    }
}

/// Status of a single phase or worker invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkerStatus {
    InProgress,
    Completed,
    Failed,
}

impl WorkerStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InProgress => "InProgress",
            Self::Completed => "Completed",
            Self::Failed => "Failed",
        }
    }
}

impl fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkerStatus {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "InProgress" => Ok(Self::InProgress),
            "Completed" => Ok(Self::Completed),
            "Failed" => Ok(Self::Failed),
            other => Err(ParseError::InvalidEnum {
                type_name: "WorkerStatus",
                value: other.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migration_state_round_trips_through_its_string() {
        for state in [
            MigrationState::None,
            MigrationState::InProgress,
            MigrationState::Completed,
            MigrationState::Aborted,
        ] {
            assert_eq!(state.as_str().parse::<MigrationState>().unwrap(), state);
        }
    }

    #[test]
    fn migration_state_rejects_unknown_value() {
        assert!(matches!(
            "Bogus".parse::<MigrationState>(),
            Err(ParseError::InvalidEnum { .. })
        ));
    }

    #[test]
    fn worker_status_round_trips_through_its_string() {
        for status in [
            WorkerStatus::InProgress,
            WorkerStatus::Completed,
            WorkerStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<WorkerStatus>().unwrap(), status);
        }
    }
}
