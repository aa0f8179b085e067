//! Tidemark Migration CLI library
//!
//! Argument definitions, settings resolution and the subcommand handlers
//! behind the `tidemark-migrate` binary.

pub mod cli;
pub mod commands;
pub mod error;
pub mod prompt;
pub mod settings;

pub use error::CliError;
