use std::collections::BTreeSet;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::database::connection::TenantHandle;

/// Ledger table kept in every tenant database
pub const LEDGER_TABLE: &str = "_schema_migrations";

const BASELINE_SQL: &str = include_str!("../../migrations/tenant/0001_baseline.sql");

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Migration {
    pub version: i64,
    pub name: String,
    pub sql: String,
}

impl Migration {
    pub fn new(version: i64, name: impl Into<String>, sql: impl Into<String>) -> Self {
        Self {
            version,
            name: name.into(),
            sql: sql.into(),
        }
    }

    /// `0002_add_index` style label used in logs and errors
    pub fn label(&self) -> String {
        format!("{:04}_{}", self.version, self.name)
    }
}

#[derive(Debug, Error)]
pub enum MigrationSetError {
    #[error("Duplicate migration version {0}")]
    DuplicateVersion(i64),

    #[error("Invalid migration file name: {0} (expected <version>_<name>.sql)")]
    InvalidFileName(String),

    #[error("Failed to read migrations from {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// A failed migration run. `applied_through` is the highest version present
/// in the ledger afterwards, so a retry resumes instead of restarting.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("migration step '{step}' failed: {message}")]
pub struct MigrationFailure {
    pub step: String,
    pub version: Option<i64>,
    pub message: String,
    pub applied_through: Option<i64>,
}

/// Ordered set of tenant schema migrations
#[derive(Debug, Clone, Default)]
pub struct Migrator {
    migrations: Vec<Migration>,
}

impl Migrator {
    pub fn new(mut migrations: Vec<Migration>) -> Result<Self, MigrationSetError> {
        migrations.sort_by_key(|m| m.version);
        for pair in migrations.windows(2) {
            if pair[0].version == pair[1].version {
                return Err(MigrationSetError::DuplicateVersion(pair[0].version));
            }
        }
        Ok(Self { migrations })
    }

    /// Baseline schema shipped with the binary
    pub fn builtin() -> Self {
        Self {
            migrations: vec![Migration::new(1, "baseline", BASELINE_SQL)],
        }
    }

    /// Load `<version>_<name>.sql` files from a directory
    pub fn from_dir(dir: &Path) -> Result<Self, MigrationSetError> {
        let io_err = |source| MigrationSetError::Io {
            path: dir.display().to_string(),
            source,
        };

        let mut migrations = Vec::new();
        for entry in std::fs::read_dir(dir).map_err(io_err)? {
            let path = entry.map_err(io_err)?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("sql") {
                continue;
            }
            let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
            let (version, name) = parse_file_stem(stem)
                .ok_or_else(|| MigrationSetError::InvalidFileName(path.display().to_string()))?;
            let sql = std::fs::read_to_string(&path).map_err(io_err)?;
            migrations.push(Migration::new(version, name, sql));
        }

        Self::new(migrations)
    }

    pub fn migrations(&self) -> &[Migration] {
        &self.migrations
    }

    pub fn latest_version(&self) -> Option<i64> {
        self.migrations.last().map(|m| m.version)
    }

    pub fn contains(&self, version: i64) -> bool {
        self.migrations.iter().any(|m| m.version == version)
    }

    /// Migrations not yet in `applied`, up to and including `target`
    pub fn pending<'a>(&'a self, applied: &BTreeSet<i64>, target: Option<i64>) -> Vec<&'a Migration> {
        self.migrations
            .iter()
            .filter(|m| !applied.contains(&m.version))
            .filter(|m| target.map_or(true, |t| m.version <= t))
            .collect()
    }

    /// Apply pending migrations in order, returning the highest applied
    /// version. Steps already recorded in the ledger are skipped.
    pub async fn apply<H: TenantHandle>(
        &self,
        handle: &H,
        target: Option<i64>,
    ) -> Result<Option<i64>, MigrationFailure> {
        let mut applied = handle
            .applied_migrations()
            .await
            .map_err(|e| MigrationFailure {
                step: "read ledger".to_string(),
                version: None,
                message: e.to_string(),
                applied_through: None,
            })?;

        let pending = self.pending(&applied, target);
        if pending.is_empty() {
            debug!("No pending migrations");
        }

        for migration in pending {
            if let Err(e) = handle.apply_migration(migration).await {
                warn!(step = %migration.label(), error = %e, "Migration failed");
                return Err(MigrationFailure {
                    step: migration.label(),
                    version: Some(migration.version),
                    message: e.to_string(),
                    applied_through: applied.last().copied(),
                });
            }
            info!(step = %migration.label(), "Applied migration");
            applied.insert(migration.version);
        }

        Ok(applied.last().copied())
    }
}

fn parse_file_stem(stem: &str) -> Option<(i64, String)> {
    let (version, name) = stem.split_once('_')?;
    let version = version.parse().ok()?;
    if name.is_empty() {
        return None;
    }
    Some((version, name.to_string()))
}
