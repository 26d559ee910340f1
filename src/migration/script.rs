use crate::error::{Error, Result};
use std::collections::HashSet;

/// Scripts compiled into the binary, as `(file name, body)`.
const EMBEDDED: &[(&str, &str)] = &[
    (
        "20250101000000_projects.sql",
        include_str!("../../migrations/20250101000000_projects.sql"),
    ),
    (
        "20250101000100_clients.sql",
        include_str!("../../migrations/20250101000100_clients.sql"),
    ),
    (
        "20250101000200_variables.sql",
        include_str!("../../migrations/20250101000200_variables.sql"),
    ),
];

/// One versioned SQL script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Migration {
    pub version: String,
    pub name: String,
    pub statements: String,
    pub file_name: String,
}

impl Migration {
    /// Split `<version>_<name>.sql` on its first underscore.
    pub fn parse(file_name: &str, statements: impl Into<String>) -> Result<Self> {
        let stem = file_name.strip_suffix(".sql").ok_or_else(|| {
            Error::Config(format!(
                "migration '{}' must have a .sql extension",
                file_name
            ))
        })?;
        let (version, name) = stem.split_once('_').ok_or_else(|| {
            Error::Config(format!(
                "migration '{}' must be named <version>_<name>.sql",
                file_name
            ))
        })?;
        if version.is_empty() {
            return Err(Error::Config(format!(
                "migration '{}' has an empty version",
                file_name
            )));
        }

        Ok(Self {
            version: version.to_string(),
            name: name.to_string(),
            statements: statements.into(),
            file_name: file_name.to_string(),
        })
    }
}

/// Ordered, validated script set.
///
/// Order is lexicographic by file name; version prefixes are expected to be
/// zero-padded so that matches numeric order.
#[derive(Debug, Clone, Default)]
pub struct MigrationSet {
    migrations: Vec<Migration>,
}

impl MigrationSet {
    /// The scripts compiled into this binary.
    pub fn embedded() -> Result<Self> {
        Self::from_files(EMBEDDED.iter().map(|(f, body)| (*f, *body)))
    }

    pub fn from_files<I, F, B>(files: I) -> Result<Self>
    where
        I: IntoIterator<Item = (F, B)>,
        F: AsRef<str>,
        B: Into<String>,
    {
        let mut migrations = files
            .into_iter()
            .map(|(file, body)| Migration::parse(file.as_ref(), body))
            .collect::<Result<Vec<_>>>()?;
        migrations.sort_by(|a, b| a.file_name.cmp(&b.file_name));

        let mut seen = HashSet::new();
        for m in &migrations {
            if !seen.insert(m.version.as_str()) {
                return Err(Error::Config(format!(
                    "migration version '{}' is used by more than one script",
                    m.version
                )));
            }
        }

        Ok(Self { migrations })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Migration> {
        self.migrations.iter()
    }

    pub fn len(&self) -> usize {
        self.migrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }

    /// Scripts whose version is not in `applied`, in script order.
    pub fn pending<'a>(&'a self, applied: &HashSet<String>) -> Vec<&'a Migration> {
        self.migrations
            .iter()
            .filter(|m| !applied.contains(&m.version))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_splits_on_first_underscore() {
        let m = Migration::parse("002_add_col.sql", "ALTER TABLE t ADD c int;").unwrap();
        assert_eq!(m.version, "002");
        assert_eq!(m.name, "add_col");
    }

    #[test]
    fn test_missing_underscore_is_config_error() {
        let err = Migration::parse("002addcol.sql", "").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(Migration::parse("_init.sql", "").is_err());
        assert!(Migration::parse("001_init.txt", "").is_err());
    }

    #[test]
    fn test_sorted_by_file_name() {
        let set = MigrationSet::from_files([
            ("003_seed.sql", ""),
            ("001_init.sql", ""),
            ("002_add_col.sql", ""),
        ])
        .unwrap();
        let versions: Vec<&str> = set.iter().map(|m| m.version.as_str()).collect();
        assert_eq!(versions, vec!["001", "002", "003"]);
    }

    #[test]
    fn test_duplicate_version_rejected() {
        let err = MigrationSet::from_files([("001_a.sql", ""), ("001_b.sql", "")]).unwrap_err();
        assert!(err.to_string().contains("'001'"));
    }

    #[test]
    fn test_pending_keeps_script_order() {
        let set = MigrationSet::from_files([
            ("001_init.sql", ""),
            ("002_add_col.sql", ""),
            ("003_seed.sql", ""),
        ])
        .unwrap();
        let applied: HashSet<String> = ["002".to_string()].into_iter().collect();
        let pending = set.pending(&applied);
        let versions: Vec<&str> = pending.iter().map(|m| m.version.as_str()).collect();
        assert_eq!(versions, vec!["001", "003"]);
    }

    #[test]
    fn test_embedded_scripts_load() {
        let set = MigrationSet::embedded().unwrap();
        assert_eq!(set.len(), EMBEDDED.len());
        assert!(set.iter().all(|m| !m.statements.trim().is_empty()));
    }
}
