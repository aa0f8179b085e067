//! Migration file discovery and parsing
//!
//! A migration is one SQL file named `m{YYYYMMDDHHMMSS}.sql` or
//! `m{YYYYMMDDHHMMSS}_{name}.sql`, split into sections by marker comments:
//!
//! ```sql
//! -- description: Create users table
//! -- migrate:up
//! CREATE TABLE users (id INTEGER PRIMARY KEY);
//!
//! -- migrate:down
//! DROP TABLE users;
//! ```

use crate::migration::checksum::checksum;
use crate::migration::{MigrationError, Version, VersionId};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};

static FILENAME_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^m(\d{14})(?:_(.+))?\.sql$").expect("migration filename pattern is valid")
});

pub const UP_MARKER: &str = "migrate:up";
pub const DOWN_MARKER: &str = "migrate:down";
pub const DESCRIPTION_PREFIX: &str = "description:";

/// Parse a migration file name into its version and optional name
///
/// Returns `Ok(None)` for files that are not migrations at all (anything not
/// shaped `m*.sql`), and an error for files that look like migrations but
/// don't match the pattern.
///
/// # Example
/// - `m20240120120000_create_users_table.sql` → (`20240120120000`, `Some("create_users_table")`)
/// - `m20240120120000.sql` → (`20240120120000`, `None`)
pub fn parse_filename(filename: &str) -> Result<Option<(VersionId, Option<String>)>, MigrationError> {
    if !filename.starts_with('m') || !filename.ends_with(".sql") {
        return Ok(None);
    }

    let caps = FILENAME_PATTERN.captures(filename).ok_or_else(|| {
        MigrationError::InvalidFormat(format!(
            "Migration file name '{}' does not match expected pattern: m{{YYYYMMDDHHMMSS}}_{{name}}.sql",
            filename
        ))
    })?;

    let version = VersionId::new(&caps[1]);
    let name = caps.get(2).map(|m| m.as_str().to_string());
    Ok(Some((version, name)))
}

/// File name for a new migration
pub fn migration_filename(version: &VersionId, name: Option<&str>) -> String {
    match name {
        Some(name) => format!("m{}_{}.sql", version, name),
        None => format!("m{}.sql", version),
    }
}

/// Sections of a parsed migration file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedMigration {
    pub description: Option<String>,
    pub up: Vec<String>,
    pub down: Vec<String>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Section {
    Preamble,
    Up,
    Down,
}

/// Split migration file content into its `up` and `down` statements
///
/// Statements end at a line whose last character outside quoted text and
/// trailing comments is `;` (the `;` is dropped). Single-quoted strings and
/// dollar-quoted bodies (`$$ ... $$`, `$tag$ ... $tag$`) may span lines and
/// are kept intact, so function and `DO` blocks stay one statement. Comment
/// lines and blank lines outside quoted text are skipped.
///
/// # Errors
///
/// Returns `MigrationError::InvalidFormat` if SQL appears before the first
/// section marker.
pub fn parse_content(content: &str) -> Result<ParsedMigration, MigrationError> {
    let mut parsed = ParsedMigration::default();
    let mut section = Section::Preamble;
    let mut buffer: Vec<&str> = Vec::new();
    let mut quote = Quote::None;

    for (line_no, line) in content.lines().enumerate() {
        let trimmed = line.trim();

        if quote != Quote::None {
            buffer.push(line);
            let (next, ends_statement) = scan_line(line, quote);
            quote = next;
            if ends_statement {
                flush(&mut buffer, section, &mut parsed);
            }
            continue;
        }

        if let Some(comment) = trimmed.strip_prefix("--") {
            let comment = comment.trim_start_matches('-').trim();
            let next = match comment {
                UP_MARKER => Some(Section::Up),
                DOWN_MARKER => Some(Section::Down),
                _ => None,
            };
            if let Some(next) = next {
                flush(&mut buffer, section, &mut parsed);
                section = next;
            } else if let Some(description) = comment.strip_prefix(DESCRIPTION_PREFIX) {
                if section == Section::Preamble && parsed.description.is_none() {
                    let description = description.trim();
                    if !description.is_empty() {
                        parsed.description = Some(description.to_string());
                    }
                }
            }
            continue;
        }

        if trimmed.is_empty() && buffer.is_empty() {
            continue;
        }

        if section == Section::Preamble {
            return Err(MigrationError::InvalidFormat(format!(
                "line {}: SQL found before a '-- {}' or '-- {}' marker",
                line_no + 1,
                UP_MARKER,
                DOWN_MARKER
            )));
        }

        buffer.push(line);
        let (next, ends_statement) = scan_line(line, Quote::None);
        quote = next;
        if ends_statement {
            flush(&mut buffer, section, &mut parsed);
        }
    }

    if quote != Quote::None {
        return Err(MigrationError::InvalidFormat(format!(
            "unterminated {} at end of file",
            quote
        )));
    }

    flush(&mut buffer, section, &mut parsed);
    Ok(parsed)
}

static DOLLAR_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\$(?:[A-Za-z_][A-Za-z0-9_]*)?\$").expect("dollar quote pattern is valid"));

/// Quoted text still open at the end of a line
#[derive(Debug, Clone, PartialEq, Eq)]
enum Quote {
    None,
    Single,
    /// Holds the full delimiter, e.g. `$$` or `$body$`
    Dollar(String),
}

impl std::fmt::Display for Quote {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Quote::None => f.write_str("nothing"),
            Quote::Single => f.write_str("string literal"),
            Quote::Dollar(tag) => write!(f, "{tag} quoted body"),
        }
    }
}

/// Scan one line starting inside `quote`
///
/// Returns the quoting open at the end of the line and whether the line ends
/// a statement.
fn scan_line(line: &str, mut quote: Quote) -> (Quote, bool) {
    let mut ends_statement = false;
    let mut i = 0;

    while i < line.len() {
        let rest = &line[i..];
        match &quote {
            Quote::Single => match rest.find('\'') {
                // '' is an escaped quote
                Some(pos) if rest[pos + 1..].starts_with('\'') => i += pos + 2,
                Some(pos) => {
                    quote = Quote::None;
                    i += pos + 1;
                }
                None => break,
            },
            Quote::Dollar(tag) => match rest.find(tag.as_str()) {
                Some(pos) => {
                    i += pos + tag.len();
                    quote = Quote::None;
                }
                None => break,
            },
            Quote::None => {
                if rest.starts_with("--") {
                    break;
                }
                let Some(c) = rest.chars().next() else {
                    break;
                };
                if c == '\'' {
                    quote = Quote::Single;
                    ends_statement = false;
                } else if let Some(tag) = DOLLAR_TAG.find(rest) {
                    quote = Quote::Dollar(tag.as_str().to_string());
                    ends_statement = false;
                    i += tag.len();
                    continue;
                } else if c == ';' {
                    ends_statement = true;
                } else if !c.is_whitespace() {
                    ends_statement = false;
                }
                i += c.len_utf8();
            }
        }
    }

    let ends_statement = ends_statement && quote == Quote::None;
    (quote, ends_statement)
}

fn flush(buffer: &mut Vec<&str>, section: Section, parsed: &mut ParsedMigration) {
    if buffer.is_empty() {
        return;
    }
    let joined = buffer.join("\n");
    buffer.clear();

    let statement = joined.trim().trim_end_matches(';').trim_end();
    if statement.is_empty() {
        return;
    }
    match section {
        Section::Up => parsed.up.push(statement.to_string()),
        Section::Down => parsed.down.push(statement.to_string()),
        Section::Preamble => {}
    }
}

/// Load a single migration file
///
/// # Errors
///
/// Returns `MigrationError` if the file can't be read or parsed.
pub fn load_version(path: &Path, id: VersionId, name: Option<String>) -> Result<Version, MigrationError> {
    let content = fs::read_to_string(path).map_err(|error| MigrationError::Io {
        path: path.to_path_buf(),
        error,
    })?;

    let parsed = parse_content(&content).map_err(|e| match e {
        MigrationError::InvalidFormat(msg) => {
            MigrationError::InvalidFormat(format!("{}: {}", path.display(), msg))
        }
        other => other,
    })?;

    let description = parsed
        .description
        .or_else(|| name.as_ref().map(|n| n.replace('_', " ")));

    Ok(Version {
        id,
        name,
        description,
        path: path.to_path_buf(),
        checksum: checksum(content.as_bytes()),
        up: parsed.up,
        down: parsed.down,
    })
}

/// Discover all migration versions in a directory
///
/// Returns them sorted by version (oldest first).
///
/// # Errors
///
/// Returns errors if:
/// - The directory doesn't exist (`DirectoryNotFound`)
/// - A migration file has an invalid name or content
/// - Two files carry the same version
pub fn discover_versions(migrations_dir: &Path) -> Result<Vec<Version>, MigrationError> {
    if !migrations_dir.is_dir() {
        return Err(MigrationError::DirectoryNotFound(migrations_dir.to_path_buf()));
    }

    let io_err = |error| MigrationError::Io {
        path: migrations_dir.to_path_buf(),
        error,
    };

    let mut versions: Vec<Version> = Vec::new();
    for entry in fs::read_dir(migrations_dir).map_err(io_err)? {
        let path: PathBuf = entry.map_err(io_err)?.path();
        if !path.is_file() {
            continue;
        }

        let Some(filename) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Some((id, name)) = parse_filename(filename)? else {
            log::debug!("Skipping non-migration file {}", path.display());
            continue;
        };

        versions.push(load_version(&path, id, name)?);
    }

    versions.sort_by(|a, b| a.id.cmp(&b.id));

    if let Some(pair) = versions.windows(2).find(|pair| pair[0].id == pair[1].id) {
        return Err(MigrationError::InvalidFormat(format!(
            "Duplicate migration version {} ({} and {})",
            pair[0].id,
            pair[0].path.display(),
            pair[1].path.display()
        )));
    }

    log::debug!(
        "Discovered {} migration(s) in {}",
        versions.len(),
        migrations_dir.display()
    );
    Ok(versions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_filename() {
        let (version, name) = parse_filename("m20240120120000_create_users_table.sql")
            .unwrap()
            .unwrap();
        assert_eq!(version.as_str(), "20240120120000");
        assert_eq!(name.as_deref(), Some("create_users_table"));

        let (version, name) = parse_filename("m20240120120000.sql").unwrap().unwrap();
        assert_eq!(version.as_str(), "20240120120000");
        assert!(name.is_none());
    }

    #[test]
    fn test_parse_filename_ignores_other_files() {
        assert!(parse_filename("README.md").unwrap().is_none());
        assert!(parse_filename("schema.sql").unwrap().is_none());
        assert!(parse_filename("m20240120120000_x.rs").unwrap().is_none());
    }

    #[test]
    fn test_parse_filename_rejects_malformed_migration() {
        assert!(parse_filename("m2024_short.sql").is_err());
    }

    #[test]
    fn test_parse_content_sections() {
        let parsed = parse_content(
            "-- description: Create users\n\
             -- migrate:up\n\
             CREATE TABLE users (\n    id INTEGER PRIMARY KEY\n);\n\
             CREATE INDEX users_id ON users (id);\n\
             \n\
             -- migrate:down\n\
             DROP TABLE users;\n",
        )
        .unwrap();

        assert_eq!(parsed.description.as_deref(), Some("Create users"));
        assert_eq!(
            parsed.up,
            vec![
                "CREATE TABLE users (\n    id INTEGER PRIMARY KEY\n)".to_string(),
                "CREATE INDEX users_id ON users (id)".to_string(),
            ]
        );
        assert_eq!(parsed.down, vec!["DROP TABLE users".to_string()]);
    }

    #[test]
    fn test_parse_content_unterminated_last_statement() {
        let parsed = parse_content("-- migrate:up\nSELECT 1\n-- migrate:down\nSELECT 2").unwrap();
        assert_eq!(parsed.up, vec!["SELECT 1".to_string()]);
        assert_eq!(parsed.down, vec!["SELECT 2".to_string()]);
    }

    #[test]
    fn test_parse_content_keeps_function_bodies_whole() {
        let function = "CREATE FUNCTION touch() RETURNS trigger AS $$\n\
                        BEGIN\n    \
                        -- keep updated_at current\n    \
                        NEW.updated_at = now();\n    \
                        RETURN NEW;\n\
                        END;\n\
                        $$ LANGUAGE plpgsql";
        let content = format!(
            "-- migrate:up\n\
             {function};\n\
             CREATE TRIGGER users_touch BEFORE UPDATE ON users FOR EACH ROW EXECUTE FUNCTION touch();\n\
             -- migrate:down\n\
             DROP FUNCTION touch() CASCADE;\n"
        );

        let parsed = parse_content(&content).unwrap();
        assert_eq!(parsed.up.len(), 2);
        assert_eq!(parsed.up[0], function);
        assert!(parsed.up[1].starts_with("CREATE TRIGGER users_touch"));
        assert_eq!(parsed.down, vec!["DROP FUNCTION touch() CASCADE".to_string()]);
    }

    #[test]
    fn test_parse_content_tagged_dollar_quotes_and_strings() {
        let parsed = parse_content(
            "-- migrate:up\n\
             DO $body$\nBEGIN\n    RAISE NOTICE 'done; $$ not a delimiter';\nEND\n$body$;\n\
             INSERT INTO notes (text) VALUES ('line one;\nit''s line two;');\n\
             SELECT $1 FROM t;\n",
        )
        .unwrap();

        assert_eq!(
            parsed.up,
            vec![
                "DO $body$\nBEGIN\n    RAISE NOTICE 'done; $$ not a delimiter';\nEND\n$body$".to_string(),
                "INSERT INTO notes (text) VALUES ('line one;\nit''s line two;')".to_string(),
                "SELECT $1 FROM t".to_string(),
            ]
        );
    }

    #[test]
    fn test_parse_content_rejects_unterminated_body() {
        let err = parse_content("-- migrate:up\nDO $$\nBEGIN\nEND;\n").unwrap_err();
        assert!(err.to_string().contains("unterminated $$ quoted body"));
    }

    #[test]
    fn test_parse_content_rejects_sql_before_marker() {
        let err = parse_content("CREATE TABLE t (id INT);\n-- migrate:up\n").unwrap_err();
        assert!(err.to_string().contains("line 1"));
    }

    #[test]
    fn test_discover_missing_directory() {
        let result = discover_versions(Path::new("/nonexistent/path/that/does/not/exist"));
        assert!(matches!(result, Err(MigrationError::DirectoryNotFound(_))));
    }

    #[test]
    fn test_discover_sorts_and_describes() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("m20240102000000_add_email.sql"),
            "-- migrate:up\nALTER TABLE users ADD COLUMN email TEXT;\n-- migrate:down\nALTER TABLE users DROP COLUMN email;\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("m20240101000000_create_users.sql"),
            "-- description: Users table\n-- migrate:up\nCREATE TABLE users (id INT);\n",
        )
        .unwrap();
        fs::write(dir.path().join("notes.txt"), "not a migration").unwrap();

        let versions = discover_versions(dir.path()).unwrap();
        assert_eq!(versions.len(), 2);
        assert_eq!(versions[0].id.as_str(), "20240101000000");
        assert_eq!(versions[0].description.as_deref(), Some("Users table"));
        assert_eq!(versions[1].description.as_deref(), Some("add email"));
        assert!(versions[0].down.is_empty());
    }

    #[test]
    fn test_discover_rejects_duplicate_versions() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("m20240101000000_a.sql"), "-- migrate:up\n").unwrap();
        fs::write(dir.path().join("m20240101000000_b.sql"), "-- migrate:up\n").unwrap();

        let err = discover_versions(dir.path()).unwrap_err();
        assert!(err.to_string().contains("Duplicate migration version"));
    }
}
