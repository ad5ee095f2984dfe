use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};

use crate::error::ParseError;
use crate::phase::MigrationPhase;
use crate::state::MigrationState;

/// All persisted metadata rows are strings (spec.md §3: "All fields are
/// strings"). This is the typed view a caller asks for; parsing one out of
/// the raw stored string is the one place corruption can surface.
#[derive(Debug, Clone, PartialEq)]
pub enum StoredValue {
    Long(i64),
    Int(i32),
    Timestamp(DateTime<Utc>),
    State(MigrationState),
    Phase(MigrationPhase),
}

impl StoredValue {
    pub fn to_raw(&self) -> String {
        match self {
            Self::Long(v) => v.to_string(),
            Self::Int(v) => v.to_string(),
            // ISO-8601 UTC, per spec.md §6 ("dates are ISO-8601 UTC").
            Self::Timestamp(v) => v.to_rfc3339_opts(SecondsFormat::Micros, true),
            Self::State(v) => v.to_string(),
            Self::Phase(v) => v.to_string(),
        }
    }
}

/// Parses a raw stored string as a 64-bit sequence number or counter.
pub fn parse_long(raw: &str) -> Result<i64, ParseError> {
    raw.parse().map_err(|_| ParseError::InvalidInt {
        value: raw.to_string(),
    })
}

/// Parses a raw stored string as a 32-bit count (worker count, iteration).
pub fn parse_int(raw: &str) -> Result<i32, ParseError> {
    raw.parse().map_err(|_| ParseError::InvalidInt {
        value: raw.to_string(),
    })
}

/// Parses a raw stored string as an ISO-8601 UTC timestamp.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, ParseError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| ParseError::InvalidTimestamp {
            value: raw.to_string(),
        })
}

pub fn parse_state(raw: &str) -> Result<MigrationState, ParseError> {
    MigrationState::from_str(raw)
}

pub fn parse_phase(raw: &str) -> Result<MigrationPhase, ParseError> {
    MigrationPhase::from_str(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn long_round_trips() {
        let v = StoredValue::Long(123_456_789);
        assert_eq!(parse_long(&v.to_raw()).unwrap(), 123_456_789);
    }

    #[test]
    fn timestamp_round_trips() {
        let ts = Utc.with_ymd_and_hms(2026, 7, 27, 12, 0, 0).unwrap();
        let v = StoredValue::Timestamp(ts);
        assert_eq!(parse_timestamp(&v.to_raw()).unwrap(), ts);
    }

    #[test]
    fn invalid_int_is_a_parse_error() {
        assert!(matches!(
            parse_long("not-a-number"),
            Err(ParseError::InvalidInt { .. })
        ));
    }

    #[test]
    fn invalid_timestamp_is_a_parse_error() {
        assert!(matches!(
            parse_timestamp("not-a-date"),
            Err(ParseError::InvalidTimestamp { .. })
        ));
    }
}
