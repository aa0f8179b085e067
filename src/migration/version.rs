//! Version identifiers, aliases and discovered migration versions

use chrono::NaiveDateTime;
use std::cmp::Ordering;
use std::fmt;
use std::path::PathBuf;

/// Identifier of a migration version, normally a `YYYYMMDDHHMMSS` timestamp
///
/// All-digit identifiers compare numerically (so `"900"` sorts before
/// `"1000"`) and sort before every other identifier, which compare as plain
/// strings. The sentinel [`VersionId::zero`] sorts before every real version.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VersionId(String);

impl VersionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The "nothing applied" version
    pub fn zero() -> Self {
        Self("0".to_string())
    }

    pub fn is_zero(&self) -> bool {
        self.0 == "0"
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Human-readable form: `2024-01-20 12:00:00` for timestamp ids, the raw id otherwise
    pub fn format(&self) -> String {
        match NaiveDateTime::parse_from_str(&self.0, "%Y%m%d%H%M%S") {
            Ok(ts) => ts.format("%Y-%m-%d %H:%M:%S").to_string(),
            Err(_) => self.0.clone(),
        }
    }

    fn numeric_digits(&self) -> Option<&str> {
        if !self.0.is_empty() && self.0.bytes().all(|b| b.is_ascii_digit()) {
            Some(self.0.trim_start_matches('0'))
        } else {
            None
        }
    }
}

impl Ord for VersionId {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.numeric_digits(), other.numeric_digits()) {
            (Some(a), Some(b)) => a
                .len()
                .cmp(&b.len())
                .then_with(|| a.cmp(b))
                // "007" and "7" are numerically equal; keep Ord consistent with Eq
                .then_with(|| self.0.cmp(&other.0)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => self.0.cmp(&other.0),
        }
    }
}

impl PartialOrd for VersionId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for VersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for VersionId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for VersionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Symbolic or literal reference to a version
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Alias {
    First,
    Prev,
    Current,
    Next,
    Latest,
    Version(VersionId),
}

impl Alias {
    pub fn parse(input: &str) -> Self {
        match input.trim() {
            "first" => Alias::First,
            "prev" => Alias::Prev,
            "current" => Alias::Current,
            "next" => Alias::Next,
            "latest" => Alias::Latest,
            other => Alias::Version(VersionId::new(other)),
        }
    }
}

impl fmt::Display for Alias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Alias::First => f.write_str("first"),
            Alias::Prev => f.write_str("prev"),
            Alias::Current => f.write_str("current"),
            Alias::Next => f.write_str("next"),
            Alias::Latest => f.write_str("latest"),
            Alias::Version(id) => write!(f, "{id}"),
        }
    }
}

/// Direction a version is executed in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    /// Applied state a version ends up in after running in this direction
    pub fn marks_applied(self) -> bool {
        matches!(self, Direction::Up)
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Up => f.write_str("up"),
            Direction::Down => f.write_str("down"),
        }
    }
}

/// A migration version discovered on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Version {
    pub id: VersionId,
    /// Name part of the file name (`m20240120120000_create_users.sql` → `create_users`)
    pub name: Option<String>,
    pub description: Option<String>,
    pub path: PathBuf,
    /// `SHA-256` checksum of the file content
    pub checksum: String,
    pub up: Vec<String>,
    pub down: Vec<String>,
}

impl Version {
    pub fn statements(&self, direction: Direction) -> &[String] {
        match direction {
            Direction::Up => &self.up,
            Direction::Down => &self.down,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_ordering_matches_string_ordering() {
        let mut ids: Vec<VersionId> = ["20240301000000", "20231231235959", "20240101000000"]
            .into_iter()
            .map(VersionId::from)
            .collect();
        ids.sort();
        let sorted: Vec<&str> = ids.iter().map(VersionId::as_str).collect();
        assert_eq!(sorted, ["20231231235959", "20240101000000", "20240301000000"]);
    }

    #[test]
    fn test_numeric_ordering_for_unequal_lengths() {
        assert!(VersionId::new("900") < VersionId::new("1000"));
        assert!(VersionId::zero() < VersionId::new("1"));
        assert!(VersionId::zero() < VersionId::new("20240101000000"));
    }

    #[test]
    fn test_leading_zeros_are_not_equal_ids() {
        let a = VersionId::new("007");
        let b = VersionId::new("7");
        assert_ne!(a, b);
        assert_ne!(a.cmp(&b), Ordering::Equal);
    }

    #[test]
    fn test_non_numeric_ids_sort_lexically() {
        assert!(VersionId::new("abc") < VersionId::new("abd"));
    }

    #[test]
    fn test_mixed_ids_are_totally_ordered() {
        assert!(VersionId::new("9") < VersionId::new("10"));
        assert!(VersionId::new("10") < VersionId::new("1a"));
        assert!(VersionId::new("9") < VersionId::new("1a"));

        let mut ids: Vec<VersionId> = ["9", "10", "1a", "8", "11", "1b", "7", "12"]
            .into_iter()
            .map(VersionId::from)
            .collect();
        ids.sort();
        let sorted: Vec<&str> = ids.iter().map(VersionId::as_str).collect();
        assert_eq!(sorted, ["7", "8", "9", "10", "11", "12", "1a", "1b"]);

        for a in &ids {
            for b in &ids {
                for c in &ids {
                    if a < b && b < c {
                        assert!(a < c, "{a} < {b} < {c}");
                    }
                }
                assert_eq!(a.cmp(b), b.cmp(a).reverse());
            }
        }
    }

    #[test]
    fn test_format() {
        assert_eq!(VersionId::new("20240120120000").format(), "2024-01-20 12:00:00");
        assert_eq!(VersionId::new("42").format(), "42");
    }

    #[test]
    fn test_alias_parse() {
        assert_eq!(Alias::parse("latest"), Alias::Latest);
        assert_eq!(Alias::parse("prev"), Alias::Prev);
        assert_eq!(
            Alias::parse("20240101000000"),
            Alias::Version(VersionId::new("20240101000000"))
        );
    }
}
