//! # Tidemark
//!
//! Migration ledger for PostgreSQL on the `may` coroutine runtime.
//!
//! Tracks which timestamped SQL migrations have been applied, resolves
//! version aliases (`first`, `prev`, `current`, `next`, `latest`), runs
//! migrations up or down and generates new ones from a schema diff. The
//! `tidemark-migrate` binary is the command-line front end.

pub mod config;
pub mod connection;
pub mod executor;
#[cfg(feature = "metrics")]
pub mod metrics;
pub mod migration;
pub mod transaction;

pub use config::TidemarkConfig;
pub use connection::{connect, ConnectionError};
pub use executor::{MayPostgresExecutor, TideError, TideExecutor};
pub use transaction::{Transaction, TransactionError};
