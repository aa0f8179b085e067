//! `TideExecutor` - the seam between the ledger and PostgreSQL
//!
//! Everything that talks to the database (the version store, schema
//! introspection, migration execution) goes through this trait, so the
//! higher layers never hold a `may_postgres::Client` directly.

use may_postgres::types::ToSql;
use may_postgres::{Client, Error as PostgresError, Row};
use std::fmt;

/// Database execution error
#[derive(Debug)]
pub enum TideError {
    /// `PostgreSQL` error from `may_postgres`
    PostgresError(PostgresError),
    /// Query execution error
    QueryError(String),
    /// Row parsing/conversion error
    ParseError(String),
    /// Other execution errors
    Other(String),
}

impl fmt::Display for TideError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TideError::PostgresError(e) => write!(f, "PostgreSQL error: {e}"),
            TideError::QueryError(s) => write!(f, "Query error: {s}"),
            TideError::ParseError(s) => write!(f, "Parse error: {s}"),
            TideError::Other(s) => write!(f, "Execution error: {s}"),
        }
    }
}

impl std::error::Error for TideError {}

impl From<PostgresError> for TideError {
    fn from(err: PostgresError) -> Self {
        TideError::PostgresError(err)
    }
}

/// Trait for executing database operations
///
/// Implemented by [`MayPostgresExecutor`] and by [`crate::transaction::Transaction`],
/// so code written against `&dyn TideExecutor` runs the same inside or outside a
/// transaction.
pub trait TideExecutor {
    /// Execute a SQL statement and return the number of rows affected
    ///
    /// # Errors
    ///
    /// Returns `TideError` if the statement fails.
    fn execute(&self, query: &str, params: &[&dyn ToSql]) -> Result<u64, TideError>;

    /// Execute a query and return all rows
    ///
    /// # Errors
    ///
    /// Returns `TideError` if the query fails.
    fn query_all(&self, query: &str, params: &[&dyn ToSql]) -> Result<Vec<Row>, TideError>;

    /// Name of the connected database, used for status output
    ///
    /// # Errors
    ///
    /// Returns `TideError` if the lookup query fails.
    fn database_name(&self) -> Result<String, TideError> {
        let rows = self.query_all("SELECT current_database()::text", &[])?;
        rows.first()
            .map(|row| row.get::<_, String>(0))
            .ok_or_else(|| TideError::QueryError("current_database() returned no rows".to_string()))
    }
}

/// Implementation of `TideExecutor` for `may_postgres::Client`
pub struct MayPostgresExecutor {
    client: Client,
}

impl MayPostgresExecutor {
    /// Create a new executor from a `may_postgres::Client`
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Get a reference to the underlying client
    pub fn client(&self) -> &Client {
        &self.client
    }
}

impl TideExecutor for MayPostgresExecutor {
    fn execute(&self, query: &str, params: &[&dyn ToSql]) -> Result<u64, TideError> {
        log::trace!("execute: {query}");
        self.client.execute(query, params).map_err(TideError::PostgresError)
    }

    fn query_all(&self, query: &str, params: &[&dyn ToSql]) -> Result<Vec<Row>, TideError> {
        log::trace!("query: {query}");
        self.client.query(query, params).map_err(TideError::PostgresError)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tide_error_display() {
        let err = TideError::QueryError("test error".to_string());
        assert!(err.to_string().contains("Query error"));
    }

    #[test]
    fn test_tide_error_all_variants() {
        // PostgresError needs a live connection, the rest can be built directly
        let err = TideError::ParseError("bad timestamp".to_string());
        assert_eq!(err.to_string(), "Parse error: bad timestamp");

        let err = TideError::Other("boom".to_string());
        assert_eq!(err.to_string(), "Execution error: boom");
    }
}
