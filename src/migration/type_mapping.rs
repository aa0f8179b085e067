//! Column type normalisation and mapping onto `SeaQuery` `ColumnDef`s.
//!
//! Target schemas are written by hand (`type = "string"`, `type = "i64"`,
//! `type = "varchar(120)"`) while introspection reports PostgreSQL's
//! `information_schema` spelling (`character varying`, `timestamp without
//! time zone`). Both sides are reduced to one canonical spelling before the
//! differ compares them.

use once_cell::sync::Lazy;
use regex::Regex;
use sea_query::ColumnDef;

static SIZED_TYPE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([a-z][a-z ]*?)\s*\(\s*(\d+)\s*(?:,\s*(\d+)\s*)?\)$").expect("sized type pattern is valid")
});

/// Reduce a type name to its canonical spelling
///
/// - "Integer" / "int4" / "i32" → `integer`
/// - "String" / "Text" → `text`
/// - "character varying(80)" / "varchar(80)" → `varchar(80)`
/// - "timestamp without time zone" / "DateTime" → `timestamp`
/// - unknown types are lower-cased and passed through
pub fn canonical_type(raw: &str) -> String {
    let lowered = raw.trim().to_lowercase();

    if let Some(caps) = SIZED_TYPE.captures(&lowered) {
        let base = caps[1].trim();
        let size = &caps[2];
        let scale = caps.get(3).map(|m| m.as_str());
        return match (base, scale) {
            ("varchar" | "character varying" | "string", None) => format!("varchar({size})"),
            ("char" | "character" | "bpchar", None) => format!("char({size})"),
            ("numeric" | "decimal", Some(scale)) => format!("numeric({size},{scale})"),
            ("numeric" | "decimal", None) => format!("numeric({size},0)"),
            _ => lowered.clone(),
        };
    }

    let canonical = match lowered.as_str() {
        "integer" | "int" | "int4" | "i32" | "serial" => "integer",
        "bigint" | "int8" | "i64" | "big_integer" | "bigserial" => "bigint",
        "smallint" | "int2" | "i16" => "smallint",
        "text" | "string" => "text",
        "varchar" | "character varying" => "varchar",
        "char" | "character" | "bpchar" => "char",
        "boolean" | "bool" => "boolean",
        "real" | "float" | "float4" | "f32" => "real",
        "double" | "double precision" | "float8" | "f64" | "double_precision" => "double precision",
        "json" => "json",
        "jsonb" => "jsonb",
        "timestamp" | "datetime" | "timestamp without time zone" => "timestamp",
        "timestamptz" | "timestamp with time zone" => "timestamptz",
        "date" => "date",
        "time" | "time without time zone" => "time",
        "uuid" => "uuid",
        "bytea" | "binary" | "bytes" | "blob" => "bytea",
        "numeric" | "decimal" => "numeric",
        other => other,
    };
    canonical.to_string()
}

/// Set the column type on `def` from a canonical type name
pub(crate) fn apply_column_type(canonical: &str, def: &mut ColumnDef) {
    if let Some(caps) = SIZED_TYPE.captures(canonical) {
        let size: u32 = caps[2].parse().unwrap_or(0);
        match (caps[1].trim(), caps.get(3)) {
            ("varchar", None) => {
                def.string_len(size);
                return;
            }
            ("char", None) => {
                def.char_len(size);
                return;
            }
            ("numeric", Some(scale)) => {
                def.decimal_len(size, scale.as_str().parse().unwrap_or(0));
                return;
            }
            _ => {}
        }
    }

    match canonical {
        "integer" => {
            def.integer();
        }
        "bigint" => {
            def.big_integer();
        }
        "smallint" => {
            def.small_integer();
        }
        "text" => {
            def.text();
        }
        "varchar" => {
            def.string();
        }
        "char" => {
            def.char();
        }
        "boolean" => {
            def.boolean();
        }
        "real" => {
            def.float();
        }
        "double precision" => {
            def.double();
        }
        "json" => {
            def.json();
        }
        "jsonb" => {
            def.json_binary();
        }
        "timestamp" => {
            def.timestamp();
        }
        "timestamptz" => {
            def.timestamp_with_time_zone();
        }
        "date" => {
            def.date();
        }
        "time" => {
            def.time();
        }
        "uuid" => {
            def.uuid();
        }
        "bytea" => {
            def.binary();
        }
        "numeric" => {
            def.decimal();
        }
        other => {
            def.custom(other.to_string());
        }
    }
}
