//! Table/column schema model shared by introspection, target schema files and the differ
//!
//! A target schema file lists tables and their columns, in TOML:
//!
//! ```toml
//! [[tables]]
//! name = "users"
//!
//! [[tables.columns]]
//! name = "id"
//! type = "bigint"
//! primary_key = true
//!
//! [[tables.columns]]
//! name = "email"
//! type = "varchar(255)"
//! ```
//!
//! or the equivalent JSON (`.json` extension).

use crate::migration::MigrationError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    #[serde(default)]
    pub tables: Vec<TableSchema>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    #[serde(default)]
    pub columns: Vec<ColumnSchema>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    #[serde(default)]
    pub nullable: bool,
    #[serde(default)]
    pub primary_key: bool,
    /// Raw SQL default expression
    #[serde(default)]
    pub default: Option<String>,
}

impl ColumnSchema {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            nullable: false,
            primary_key: false,
            default: None,
        }
    }

    #[must_use]
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    #[must_use]
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }
}

impl TableSchema {
    pub fn new(name: impl Into<String>, columns: Vec<ColumnSchema>) -> Self {
        Self {
            name: name.into(),
            columns,
        }
    }

    pub fn column(&self, name: &str) -> Option<&ColumnSchema> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn primary_key(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| c.primary_key)
            .map(|c| c.name.as_str())
            .collect()
    }

    /// Name without any `schema.` qualifier
    pub fn unqualified_name(&self) -> &str {
        self.name.rsplit('.').next().unwrap_or(&self.name)
    }
}

impl Schema {
    pub fn new(tables: Vec<TableSchema>) -> Self {
        Self { tables }
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn table(&self, name: &str) -> Option<&TableSchema> {
        self.tables.iter().find(|t| t.name == name)
    }

    pub fn table_names(&self) -> Vec<&str> {
        self.tables.iter().map(|t| t.name.as_str()).collect()
    }

    pub fn drop_table(&mut self, name: &str) {
        self.tables.retain(|t| t.name != name);
    }

    /// Keep only tables whose unqualified name matches `filter`
    pub fn retain_matching(&mut self, filter: &Regex) {
        self.tables.retain(|t| {
            let keep = filter.is_match(t.unqualified_name());
            if !keep {
                log::debug!("Filter expression excludes table {}", t.name);
            }
            keep
        });
    }

    /// Load a target schema from a `.toml` or `.json` file
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::Io` if the file can't be read and
    /// `MigrationError::InvalidFormat` if it can't be parsed.
    pub fn from_file(path: &Path) -> Result<Self, MigrationError> {
        let content = fs::read_to_string(path).map_err(|error| MigrationError::Io {
            path: path.to_path_buf(),
            error,
        })?;

        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));

        let parsed: Result<Schema, String> = if is_json {
            serde_json::from_str(&content).map_err(|e| e.to_string())
        } else {
            toml::from_str(&content).map_err(|e| e.to_string())
        };

        parsed.map_err(|e| {
            MigrationError::InvalidFormat(format!("Invalid schema file {}: {}", path.display(), e))
        })
    }
}
