//! Reads the current schema of a PostgreSQL database from `information_schema`

use crate::migration::schema::{ColumnSchema, Schema, TableSchema};
use crate::migration::MigrationError;
use crate::TideExecutor;
use std::collections::BTreeMap;

const COLUMNS_SQL: &str = "SELECT c.table_name::text, c.column_name::text, c.data_type::text, \
     c.udt_name::text, c.character_maximum_length::int, c.numeric_precision::int, \
     c.numeric_scale::int, c.is_nullable::text, c.column_default::text \
     FROM information_schema.columns c \
     JOIN information_schema.tables t \
       ON t.table_schema = c.table_schema AND t.table_name = c.table_name \
     WHERE c.table_schema = current_schema() AND t.table_type = 'BASE TABLE' \
     ORDER BY c.table_name, c.ordinal_position";

const PRIMARY_KEYS_SQL: &str = "SELECT k.table_name::text, k.column_name::text \
     FROM information_schema.table_constraints tc \
     JOIN information_schema.key_column_usage k \
       ON k.constraint_schema = tc.constraint_schema AND k.constraint_name = tc.constraint_name \
     WHERE tc.table_schema = current_schema() AND tc.constraint_type = 'PRIMARY KEY' \
     ORDER BY k.table_name, k.ordinal_position";

/// Load every base table in the connection's current schema
///
/// # Errors
///
/// Returns `MigrationError::Database` if either catalogue query fails.
pub fn introspect_schema(executor: &dyn TideExecutor) -> Result<Schema, MigrationError> {
    let mut tables: BTreeMap<String, Vec<ColumnSchema>> = BTreeMap::new();

    for row in executor.query_all(COLUMNS_SQL, &[])? {
        let table: String = row.get(0);
        let data_type: String = row.get(2);
        let udt_name: String = row.get(3);
        let is_nullable: String = row.get(7);

        let column = ColumnSchema {
            name: row.get(1),
            data_type: column_type(&data_type, &udt_name, row.get(4), row.get(5), row.get(6)),
            nullable: is_nullable.eq_ignore_ascii_case("YES"),
            primary_key: false,
            default: row.get(8),
        };
        tables.entry(table).or_default().push(column);
    }

    for row in executor.query_all(PRIMARY_KEYS_SQL, &[])? {
        let table: String = row.get(0);
        let column: String = row.get(1);
        if let Some(col) = tables
            .get_mut(&table)
            .and_then(|cols| cols.iter_mut().find(|c| c.name == column))
        {
            col.primary_key = true;
        }
    }

    log::debug!("Introspected {} tables", tables.len());

    Ok(Schema::new(
        tables
            .into_iter()
            .map(|(name, columns)| TableSchema::new(name, columns))
            .collect(),
    ))
}

/// Type spelling for one `information_schema.columns` row
fn column_type(
    data_type: &str,
    udt_name: &str,
    char_length: Option<i32>,
    precision: Option<i32>,
    scale: Option<i32>,
) -> String {
    match (data_type, char_length, precision) {
        ("character varying", Some(len), _) => format!("varchar({len})"),
        ("character", Some(len), _) => format!("char({len})"),
        ("numeric", _, Some(p)) => format!("numeric({p},{})", scale.unwrap_or(0)),
        ("USER-DEFINED" | "ARRAY", _, _) => udt_name.to_string(),
        (other, _, _) => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::type_mapping::canonical_type;

    #[test]
    fn test_column_type_sized() {
        assert_eq!(column_type("character varying", "varchar", Some(255), None, None), "varchar(255)");
        assert_eq!(column_type("character", "bpchar", Some(3), None, None), "char(3)");
        assert_eq!(column_type("numeric", "numeric", None, Some(10), Some(2)), "numeric(10,2)");
    }

    #[test]
    fn test_column_type_unsized() {
        assert_eq!(column_type("character varying", "varchar", None, None, None), "character varying");
        assert_eq!(column_type("numeric", "numeric", None, None, None), "numeric");
        assert_eq!(column_type("integer", "int4", None, Some(32), Some(0)), "integer");
    }

    #[test]
    fn test_user_defined_types_use_udt_name() {
        assert_eq!(column_type("USER-DEFINED", "citext", None, None, None), "citext");
        assert_eq!(column_type("ARRAY", "_int4", None, None, None), "_int4");
    }

    #[test]
    fn test_introspected_spelling_is_canonical() {
        let ty = column_type("timestamp without time zone", "timestamp", None, None, None);
        assert_eq!(canonical_type(&ty), canonical_type("DateTime"));
    }
}
