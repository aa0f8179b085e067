//! SQL for the bookkeeping table that records applied versions

use crate::migration::{MigrationError, VersionId};
use once_cell::sync::Lazy;
use regex::Regex;
use sea_query::{ColumnDef, Expr, Order, PostgresQueryBuilder, Query, Table};

static TABLE_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,62}$").expect("table name pattern is valid"));

/// Reject table names that would need schema qualification or quoting tricks
///
/// # Errors
///
/// Returns `MigrationError::InvalidArgument` for anything but a plain identifier.
pub fn validate_table_name(table: &str) -> Result<(), MigrationError> {
    if TABLE_NAME.is_match(table) {
        Ok(())
    } else {
        Err(MigrationError::InvalidArgument(format!(
            "Invalid version table name '{table}': expected a plain SQL identifier"
        )))
    }
}

/// `CREATE TABLE IF NOT EXISTS` for the bookkeeping table
///
/// Columns:
/// - `version` - version identifier, primary key
/// - `executed_at` - when the version was executed or marked
/// - `checksum` - SHA-256 of the migration file when recorded
pub fn create_table_sql(table: &str) -> String {
    Table::create()
        .table(table.to_string())
        .if_not_exists()
        .col(
            ColumnDef::new("version")
                .string()
                .string_len(255)
                .not_null()
                .primary_key(),
        )
        .col(ColumnDef::new("executed_at").timestamp().not_null())
        .col(ColumnDef::new("checksum").string().string_len(64).null())
        .build(PostgresQueryBuilder)
}

/// Select every recorded version, timestamps rendered as text
pub fn select_versions_sql(table: &str) -> String {
    Query::select()
        .column("version")
        .expr(Expr::cust("executed_at::text"))
        .column("checksum")
        .from(table.to_string())
        .order_by("version", Order::Asc)
        .to_string(PostgresQueryBuilder)
}

/// Record `version` as applied
pub fn insert_version_sql(table: &str, version: &VersionId, checksum: Option<&str>) -> String {
    Query::insert()
        .into_table(table.to_string())
        .columns(["version", "executed_at", "checksum"])
        .values_panic([
            version.as_str().into(),
            Expr::current_timestamp().into(),
            checksum.map(str::to_string).into(),
        ])
        .to_string(PostgresQueryBuilder)
}

/// Forget `version`
pub fn delete_version_sql(table: &str, version: &VersionId) -> String {
    Query::delete()
        .from_table(table.to_string())
        .and_where(Expr::col("version").eq(version.as_str()))
        .to_string(PostgresQueryBuilder)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_table_name() {
        assert!(validate_table_name("tidemark_migration_versions").is_ok());
        assert!(validate_table_name("_versions2").is_ok());
        assert!(validate_table_name("public.versions").is_err());
        assert!(validate_table_name("versions; DROP TABLE x").is_err());
        assert!(validate_table_name("").is_err());
    }

    #[test]
    fn test_create_table_sql() {
        let sql = create_table_sql("tidemark_migration_versions");
        assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS"));
        assert!(sql.contains("\"tidemark_migration_versions\""));
        assert!(sql.contains("\"version\""));
        assert!(sql.contains("\"executed_at\""));
        assert!(sql.contains("\"checksum\""));
    }

    #[test]
    fn test_insert_and_delete_inline_the_version() {
        let version = VersionId::new("20240101000000");

        let insert = insert_version_sql("versions", &version, Some("abc"));
        assert!(insert.starts_with("INSERT INTO \"versions\""));
        assert!(insert.contains("'20240101000000'"));
        assert!(insert.contains("'abc'"));

        let delete = delete_version_sql("versions", &version);
        assert!(delete.starts_with("DELETE FROM \"versions\""));
        assert!(delete.contains("'20240101000000'"));
    }

    #[test]
    fn test_insert_escapes_quotes() {
        let version = VersionId::new("2024'01");
        let insert = insert_version_sql("versions", &version, None);
        assert!(!insert.contains("'2024'01'"));
    }
}
