//! Schema comparison
//!
//! [`SchemaDiffer`] is the seam the ledger depends on for `diff`; the
//! bundled [`PostgresSchemaDiffer`] compares tables and columns and renders
//! PostgreSQL DDL through `SeaQuery`.

use crate::migration::schema::{ColumnSchema, Schema, TableSchema};
use crate::migration::type_mapping::{apply_column_type, canonical_type};
use sea_query::{ColumnDef, Expr, Index, PostgresQueryBuilder, Table};

/// Up and down statements produced by a diff
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaDiff {
    pub up: Vec<String>,
    pub down: Vec<String>,
}

impl SchemaDiff {
    pub fn is_empty(&self) -> bool {
        self.up.is_empty() && self.down.is_empty()
    }
}

/// Produces the statements that turn one schema into another
pub trait SchemaDiffer {
    /// Statements migrating `from` into `to`
    fn migrate_sql(&self, from: &Schema, to: &Schema) -> Vec<String>;

    /// Both directions: `up` turns `current` into `target`, `down` reverses it
    fn diff(&self, current: &Schema, target: &Schema) -> SchemaDiff {
        SchemaDiff {
            up: self.migrate_sql(current, target),
            down: self.migrate_sql(target, current),
        }
    }
}

/// Table/column differ for PostgreSQL
///
/// Emits, in order: `CREATE TABLE` for new tables, `ALTER TABLE` for added,
/// changed and dropped columns, then `DROP TABLE` for removed tables.
/// Column types are compared after [`canonical_type`] normalisation; column
/// defaults and primary key changes on existing tables are not compared.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresSchemaDiffer;

impl SchemaDiffer for PostgresSchemaDiffer {
    fn migrate_sql(&self, from: &Schema, to: &Schema) -> Vec<String> {
        let mut creates = Vec::new();
        let mut alters = Vec::new();
        let mut drops = Vec::new();

        for target in &to.tables {
            match from.table(&target.name) {
                None => creates.push(create_table_sql(target)),
                Some(current) => alters.extend(alter_table_sql(current, target)),
            }
        }

        for current in &from.tables {
            if to.table(&current.name).is_none() {
                drops.push(
                    Table::drop()
                        .table(current.name.clone())
                        .build(PostgresQueryBuilder),
                );
            }
        }

        creates.into_iter().chain(alters).chain(drops).collect()
    }
}

fn column_def(column: &ColumnSchema, with_constraints: bool) -> ColumnDef {
    let mut def = ColumnDef::new(column.name.clone());
    apply_column_type(&canonical_type(&column.data_type), &mut def);

    if column.nullable && !column.primary_key {
        def.null();
    } else {
        def.not_null();
    }

    if with_constraints {
        if let Some(default) = &column.default {
            def.default(Expr::cust(default.clone()));
        }
    }
    def
}

fn create_table_sql(table: &TableSchema) -> String {
    let primary_key = table.primary_key();
    let mut stmt = Table::create();
    stmt.table(table.name.clone());

    for column in &table.columns {
        let mut def = column_def(column, true);
        if primary_key.len() == 1 && column.primary_key {
            def.primary_key();
        }
        stmt.col(&mut def);
    }

    if primary_key.len() > 1 {
        let mut index = Index::create();
        for name in &primary_key {
            index.col(Expr::col(name.to_string()));
        }
        stmt.primary_key(&mut index);
    }

    stmt.build(PostgresQueryBuilder)
}

fn column_changed(current: &ColumnSchema, target: &ColumnSchema) -> bool {
    let nullable = |c: &ColumnSchema| c.nullable && !c.primary_key;
    canonical_type(&current.data_type) != canonical_type(&target.data_type)
        || nullable(current) != nullable(target)
}

fn alter_table_sql(current: &TableSchema, target: &TableSchema) -> Vec<String> {
    let mut statements = Vec::new();

    for column in &target.columns {
        let stmt = match current.column(&column.name) {
            None => Table::alter()
                .table(target.name.clone())
                .add_column(column_def(column, true))
                .build(PostgresQueryBuilder),
            Some(existing) if column_changed(existing, column) => Table::alter()
                .table(target.name.clone())
                .modify_column(column_def(column, false))
                .build(PostgresQueryBuilder),
            Some(_) => continue,
        };
        statements.push(stmt);
    }

    for column in &current.columns {
        if target.column(&column.name).is_none() {
            statements.push(
                Table::alter()
                    .table(target.name.clone())
                    .drop_column(column.name.clone())
                    .build(PostgresQueryBuilder),
            );
        }
    }

    statements
}

#[cfg(test)]
mod tests {
    use super::*;

    fn users(columns: Vec<ColumnSchema>) -> TableSchema {
        TableSchema::new("users", columns)
    }

    #[test]
    fn test_identical_schemas_produce_nothing() {
        let schema = Schema::new(vec![users(vec![
            ColumnSchema::new("id", "bigint").primary_key(),
            ColumnSchema::new("email", "text"),
        ])]);
        assert!(PostgresSchemaDiffer.diff(&schema, &schema).is_empty());
    }

    #[test]
    fn test_type_aliases_are_not_changes() {
        let current = Schema::new(vec![users(vec![ColumnSchema::new("id", "int8")])]);
        let target = Schema::new(vec![users(vec![ColumnSchema::new("id", "i64")])]);
        assert!(PostgresSchemaDiffer.diff(&current, &target).is_empty());
    }

    #[test]
    fn test_new_table_creates_and_drops() {
        let current = Schema::default();
        let target = Schema::new(vec![users(vec![
            ColumnSchema::new("id", "bigint").primary_key(),
            ColumnSchema::new("nickname", "text").nullable(),
        ])]);

        let diff = PostgresSchemaDiffer.diff(&current, &target);
        assert_eq!(diff.up.len(), 1);
        assert!(diff.up[0].starts_with("CREATE TABLE \"users\""));
        assert!(diff.up[0].contains("PRIMARY KEY"));
        assert_eq!(diff.down, vec!["DROP TABLE \"users\"".to_string()]);
    }

    #[test]
    fn test_composite_primary_key() {
        let target = Schema::new(vec![TableSchema::new(
            "memberships",
            vec![
                ColumnSchema::new("user_id", "bigint").primary_key(),
                ColumnSchema::new("group_id", "bigint").primary_key(),
            ],
        )]);

        let up = PostgresSchemaDiffer.migrate_sql(&Schema::default(), &target);
        assert_eq!(up.len(), 1);
        assert!(up[0].contains("PRIMARY KEY (\"user_id\", \"group_id\")"));
    }

    #[test]
    fn test_column_changes() {
        let current = Schema::new(vec![users(vec![
            ColumnSchema::new("id", "bigint").primary_key(),
            ColumnSchema::new("legacy", "text"),
            ColumnSchema::new("age", "integer"),
        ])]);
        let target = Schema::new(vec![users(vec![
            ColumnSchema::new("id", "bigint").primary_key(),
            ColumnSchema::new("age", "bigint"),
            ColumnSchema::new("email", "varchar(255)").nullable(),
        ])]);

        let up = PostgresSchemaDiffer.migrate_sql(&current, &target);
        assert_eq!(up.len(), 3);
        assert!(up[0].starts_with("ALTER TABLE \"users\""));
        assert!(up[0].contains("\"age\""));
        assert!(up[1].contains("ADD COLUMN \"email\""));
        assert!(up[2].contains("DROP COLUMN \"legacy\""));

        let down = PostgresSchemaDiffer.migrate_sql(&target, &current);
        assert!(down.iter().any(|s| s.contains("ADD COLUMN \"legacy\"")));
        assert!(down.iter().any(|s| s.contains("DROP COLUMN \"email\"")));
    }

    #[test]
    fn test_nullability_change_is_detected() {
        let current = Schema::new(vec![users(vec![ColumnSchema::new("email", "text").nullable()])]);
        let target = Schema::new(vec![users(vec![ColumnSchema::new("email", "text")])]);
        let up = PostgresSchemaDiffer.migrate_sql(&current, &target);
        assert_eq!(up.len(), 1);
        assert!(up[0].contains("NOT NULL"));
    }

    #[test]
    fn test_statement_order_creates_alters_drops() {
        let current = Schema::new(vec![
            TableSchema::new("old", vec![ColumnSchema::new("id", "integer")]),
            users(vec![ColumnSchema::new("id", "integer")]),
        ]);
        let target = Schema::new(vec![
            users(vec![
                ColumnSchema::new("id", "integer"),
                ColumnSchema::new("name", "text"),
            ]),
            TableSchema::new("fresh", vec![ColumnSchema::new("id", "integer")]),
        ]);

        let up = PostgresSchemaDiffer.migrate_sql(&current, &target);
        assert_eq!(up.len(), 3);
        assert!(up[0].starts_with("CREATE TABLE \"fresh\""));
        assert!(up[1].starts_with("ALTER TABLE \"users\""));
        assert!(up[2].starts_with("DROP TABLE \"old\""));
    }
}
