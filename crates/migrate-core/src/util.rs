use std::str::FromStr;

use chrono::{DateTime, Utc};
use migrate_metadata::MetadataError;
use migrate_types::ParseError;

/// Parses a raw stored string into `T`, mapping a failure into
/// `MetadataError::Corrupt` tagged with the offending key (spec.md §7,
/// "Parse/Corruption ... fatal").
pub(crate) fn parse_or_corrupt<T>(raw: &str, key: &str) -> Result<T, MetadataError>
where
    T: FromStr<Err = ParseError>,
{
    raw.parse().map_err(|source| MetadataError::Corrupt {
        key: key.to_string(),
        source,
    })
}

/// As [`parse_or_corrupt`], for timestamps: `DateTime<Utc>`'s own `FromStr`
/// has a `chrono::ParseError`, not this workspace's [`ParseError`], so it
/// goes through `migrate_types::parse_timestamp` instead.
pub(crate) fn parse_timestamp_or_corrupt(raw: &str, key: &str) -> Result<DateTime<Utc>, MetadataError> {
    migrate_types::parse_timestamp(raw).map_err(|source| MetadataError::Corrupt {
        key: key.to_string(),
        source,
    })
}

/// As [`parse_or_corrupt`], for sequence numbers and counters: `i64`'s own
/// `FromStr` has a `std::num::ParseIntError`, so it goes through
/// `migrate_types::parse_long` instead.
pub(crate) fn parse_long_or_corrupt(raw: &str, key: &str) -> Result<i64, MetadataError> {
    migrate_types::parse_long(raw).map_err(|source| MetadataError::Corrupt {
        key: key.to_string(),
        source,
    })
}
