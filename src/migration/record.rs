//! `AppliedVersion` - rows of the bookkeeping table

use crate::migration::VersionId;
use crate::TideError;
use chrono::{DateTime, NaiveDateTime, Utc};

/// A version recorded as applied in the bookkeeping table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedVersion {
    pub version: VersionId,

    /// When the version was executed or marked
    pub executed_at: DateTime<Utc>,

    /// `SHA-256` of the migration file at the time it was recorded
    pub checksum: Option<String>,
}

impl AppliedVersion {
    #[must_use]
    pub fn new(version: VersionId, executed_at: DateTime<Utc>, checksum: Option<String>) -> Self {
        Self {
            version,
            executed_at,
            checksum,
        }
    }

    /// Build from a row selected as `version, executed_at::text, checksum`
    ///
    /// # Errors
    ///
    /// Returns `TideError::ParseError` if the timestamp text is not recognised.
    pub fn from_row(row: &may_postgres::Row) -> Result<Self, TideError> {
        let version: String = row.get(0);
        let executed_at: String = row.get(1);
        let checksum: Option<String> = row.get(2);

        Ok(Self {
            version: VersionId::new(version),
            executed_at: parse_timestamp(&executed_at)?,
            checksum,
        })
    }
}

/// Parse a PostgreSQL `TIMESTAMP` rendered as text
///
/// # Errors
///
/// Returns `TideError::ParseError` if none of the known formats match.
pub fn parse_timestamp(text: &str) -> Result<DateTime<Utc>, TideError> {
    const FORMATS: [&str; 4] = [
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
    ];

    FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .map(|naive| naive.and_utc())
        .ok_or_else(|| {
            TideError::ParseError(format!(
                "Failed to parse timestamp '{text}': unrecognized format"
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_parse_timestamp_formats() {
        let ts = parse_timestamp("2024-01-20 12:30:45.123456").unwrap();
        assert_eq!((ts.year(), ts.month(), ts.day()), (2024, 1, 20));
        assert_eq!((ts.hour(), ts.minute(), ts.second()), (12, 30, 45));

        assert!(parse_timestamp("2024-01-20 12:30:45").is_ok());
        assert!(parse_timestamp("2024-01-20T12:30:45").is_ok());
    }

    #[test]
    fn test_parse_timestamp_rejects_garbage() {
        let err = parse_timestamp("yesterday").unwrap_err();
        assert!(err.to_string().contains("unrecognized format"));
    }
}
