use std::fs;
use std::path::PathBuf;

use tenant_router::database::migrations::{MigrationSetError, Migrator};
use uuid::Uuid;

struct ScratchDir(PathBuf);

impl ScratchDir {
    fn new() -> Self {
        let path = std::env::temp_dir().join(format!("tenant-router-migrations-{}", Uuid::new_v4()));
        fs::create_dir_all(&path).unwrap();
        Self(path)
    }

    fn write(&self, name: &str, sql: &str) {
        fs::write(self.0.join(name), sql).unwrap();
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.0);
    }
}

#[test]
fn loads_directory_in_version_order() {
    let dir = ScratchDir::new();
    dir.write("0002_add_orders.sql", "CREATE TABLE orders (id uuid primary key);");
    dir.write("0001_baseline.sql", "CREATE TABLE customers (id uuid primary key);");
    dir.write("README.md", "not a migration");

    let migrator = Migrator::from_dir(&dir.0).unwrap();
    let labels: Vec<String> = migrator.migrations().iter().map(|m| m.label()).collect();
    assert_eq!(labels, ["0001_baseline", "0002_add_orders"]);
    assert_eq!(migrator.latest_version(), Some(2));
    assert!(migrator.contains(2));
    assert!(!migrator.contains(3));
}

#[test]
fn rejects_unversioned_and_duplicate_files() {
    let dir = ScratchDir::new();
    dir.write("baseline.sql", "SELECT 1;");
    assert!(matches!(Migrator::from_dir(&dir.0), Err(MigrationSetError::InvalidFileName(_))));

    let dir = ScratchDir::new();
    dir.write("0001_a.sql", "SELECT 1;");
    dir.write("1_b.sql", "SELECT 2;");
    assert!(matches!(Migrator::from_dir(&dir.0), Err(MigrationSetError::DuplicateVersion(1))));
}

#[test]
fn missing_directory_is_an_io_error() {
    let missing = std::env::temp_dir().join(format!("tenant-router-missing-{}", Uuid::new_v4()));
    assert!(matches!(Migrator::from_dir(&missing), Err(MigrationSetError::Io { .. })));
}

#[test]
fn builtin_baseline_is_version_one() {
    let migrator = Migrator::builtin();
    assert_eq!(migrator.latest_version(), Some(1));
    assert!(!migrator.migrations()[0].sql.trim().is_empty());
}
