//! Writes new migration files, blank or filled from a schema diff

use crate::migration::file::{migration_filename, DESCRIPTION_PREFIX, DOWN_MARKER, UP_MARKER};
use crate::migration::{MigrationError, VersionId};
use chrono::Utc;
use std::fs;
use std::path::{Path, PathBuf};

/// Version id for a migration created now
pub fn version_now() -> VersionId {
    VersionId::new(Utc::now().format("%Y%m%d%H%M%S").to_string())
}

/// Lower-case a free-form name into a file-name-safe slug
///
/// `"Add Users Table!"` becomes `add_users_table`.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.trim().chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('_') {
            slug.push('_');
        }
    }
    slug.trim_matches('_').to_string()
}

/// Migration file content
pub fn render(description: Option<&str>, up: &[String], down: &[String]) -> String {
    let mut out = String::new();
    if let Some(description) = description {
        out.push_str(&format!("-- {DESCRIPTION_PREFIX} {description}\n"));
    }

    out.push_str(&format!("-- {UP_MARKER}\n"));
    for statement in up {
        out.push_str(statement.trim_end_matches(';'));
        out.push_str(";\n");
    }

    out.push_str(&format!("\n-- {DOWN_MARKER}\n"));
    for statement in down {
        out.push_str(statement.trim_end_matches(';'));
        out.push_str(";\n");
    }
    out
}

/// Write a migration for the current time into `dir`
///
/// # Errors
///
/// See [`generate_version`].
pub fn generate(
    dir: &Path,
    name: Option<&str>,
    up: &[String],
    down: &[String],
) -> Result<PathBuf, MigrationError> {
    generate_version(dir, &version_now(), name, up, down)
}

/// Write a migration with an explicit version into `dir`
///
/// # Errors
///
/// - `DirectoryNotFound` if `dir` doesn't exist
/// - `InvalidArgument` if a migration for `version` already exists there
/// - `Io` if the file can't be written
pub fn generate_version(
    dir: &Path,
    version: &VersionId,
    name: Option<&str>,
    up: &[String],
    down: &[String],
) -> Result<PathBuf, MigrationError> {
    if !dir.is_dir() {
        return Err(MigrationError::DirectoryNotFound(dir.to_path_buf()));
    }

    let slug = name.map(slugify).filter(|s| !s.is_empty());
    let path = dir.join(migration_filename(version, slug.as_deref()));

    let prefix = format!("m{version}");
    let clash = fs::read_dir(dir)
        .map_err(|error| MigrationError::Io {
            path: dir.to_path_buf(),
            error,
        })?
        .filter_map(Result::ok)
        .filter_map(|entry| entry.file_name().into_string().ok())
        .find(|existing| {
            existing.ends_with(".sql")
                && (existing == &format!("{prefix}.sql") || existing.starts_with(&format!("{prefix}_")))
        });
    if let Some(existing) = clash {
        return Err(MigrationError::InvalidArgument(format!(
            "A migration for version {version} already exists: {existing}"
        )));
    }

    let description = name.map(str::trim).filter(|s| !s.is_empty());
    fs::write(&path, render(description, up, down)).map_err(|error| MigrationError::Io {
        path: path.clone(),
        error,
    })?;

    log::info!("Generated new migration file {}", path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::file::discover_versions;
    use tempfile::TempDir;

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Add Users Table!"), "add_users_table");
        assert_eq!(slugify("  create--invoices  "), "create_invoices");
        assert_eq!(slugify("!!!"), "");
    }

    #[test]
    fn test_blank_template_round_trips_through_discovery() {
        let dir = TempDir::new().unwrap();
        let path = generate_version(dir.path(), &VersionId::new("20240120120000"), Some("Create users"), &[], &[])
            .unwrap();
        assert_eq!(path.file_name().unwrap(), "m20240120120000_create_users.sql");

        let versions = discover_versions(dir.path()).unwrap();
        assert_eq!(versions.len(), 1);
        assert_eq!(versions[0].description.as_deref(), Some("Create users"));
        assert!(versions[0].up.is_empty());
    }

    #[test]
    fn test_statements_are_written() {
        let dir = TempDir::new().unwrap();
        let up = vec!["CREATE TABLE \"users\" ( \"id\" bigint NOT NULL PRIMARY KEY )".to_string()];
        let down = vec!["DROP TABLE \"users\";".to_string()];
        generate_version(dir.path(), &VersionId::new("20240120120000"), None, &up, &down).unwrap();

        let versions = discover_versions(dir.path()).unwrap();
        assert_eq!(versions[0].up, up);
        assert_eq!(versions[0].down, vec!["DROP TABLE \"users\"".to_string()]);
    }

    #[test]
    fn test_refuses_to_clobber_existing_version() {
        let dir = TempDir::new().unwrap();
        let version = VersionId::new("20240120120000");
        generate_version(dir.path(), &version, Some("first"), &[], &[]).unwrap();

        let err = generate_version(dir.path(), &version, Some("second"), &[], &[]).unwrap_err();
        assert!(matches!(err, MigrationError::InvalidArgument(_)));
        let err = generate_version(dir.path(), &version, Some("first"), &[], &[]).unwrap_err();
        assert!(matches!(err, MigrationError::InvalidArgument(_)));
    }

    #[test]
    fn test_missing_directory() {
        let err = generate(Path::new("/nonexistent/tidemark/migrations"), None, &[], &[]).unwrap_err();
        assert!(matches!(err, MigrationError::DirectoryNotFound(_)));
    }
}
