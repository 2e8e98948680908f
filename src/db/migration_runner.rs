//! Versioned schema migrations.
//!
//! Every migration runs in its own transaction and records the sha256 of its
//! SQL in `schema_migrations`; editing a migration after it shipped is
//! detected on the next startup.

use chrono::Utc;
use rusqlite::{params, Connection, DatabaseName, Result};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

const BACKUPS_TO_KEEP: usize = 5;
const BACKUP_PREFIX: &str = "pre_migration_v";

#[derive(Debug, Clone, Copy)]
pub struct Migration {
    pub version: u32,
    pub name: &'static str,
    pub sql: &'static str,
}

impl Migration {
    pub fn checksum(&self) -> String {
        format!("{:x}", Sha256::digest(self.sql.as_bytes()))
    }
}

/// Ordered by version, starting at 0 (the bookkeeping table itself)
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 0,
        name: "bootstrap",
        sql: include_str!("migrations/000_bootstrap.sql"),
    },
    Migration {
        version: 1,
        name: "initial_schema",
        sql: include_str!("migrations/001_initial_schema.sql"),
    },
    Migration {
        version: 2,
        name: "add_import_batches",
        sql: include_str!("migrations/002_add_import_batches.sql"),
    },
];

fn schema_error(message: String) -> rusqlite::Error {
    rusqlite::Error::SqliteFailure(rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_ERROR), Some(message))
}

/// `None` until the bootstrap migration has run
pub fn current_version(conn: &Connection) -> Result<Option<u32>> {
    let tracked: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'schema_migrations')",
        [],
        |row| row.get(0),
    )?;
    if !tracked {
        return Ok(None);
    }

    conn.query_row("SELECT MAX(version) FROM schema_migrations", [], |row| row.get(0))
}

/// Apply everything newer than the stored version and return how many ran.
///
/// An existing file database is copied to `backups/` next to it first.
/// New and in-memory databases are not backed up.
pub fn migrate(conn: &Connection, db_path: &str) -> Result<usize> {
    let current = current_version(conn)?;
    let pending: Vec<&Migration> = MIGRATIONS
        .iter()
        .filter(|m| current.is_none_or(|v| m.version > v))
        .collect();

    let Some(target) = pending.last() else {
        log::debug!("Schema is current at version {:?}", current);
        return Ok(0);
    };

    if current.is_some() && db_path != ":memory:" {
        backup_before(conn, db_path, target.version)?;
    }

    for migration in &pending {
        apply(conn, migration).inspect_err(|e| {
            log::error!(
                "Migration {} ({}) failed and was rolled back: {}",
                migration.version,
                migration.name,
                e
            )
        })?;
    }

    log::info!("Schema migrated from {:?} to version {}", current, target.version);
    Ok(pending.len())
}

fn apply(conn: &Connection, migration: &Migration) -> Result<()> {
    let started = Instant::now();
    let tx = conn.unchecked_transaction()?;

    tx.execute_batch(migration.sql)?;
    tx.execute(
        "INSERT INTO schema_migrations (version, name, applied_at, checksum, execution_time_ms)
         VALUES (?, ?, ?, ?, ?)",
        params![
            migration.version,
            migration.name,
            Utc::now().timestamp(),
            migration.checksum(),
            started.elapsed().as_millis() as i64
        ],
    )?;

    tx.commit()?;
    log::info!("Applied migration {} ({})", migration.version, migration.name);
    Ok(())
}

/// Fail when an applied migration no longer matches the SQL compiled into
/// this binary, or when the database is newer than the binary.
pub fn verify(conn: &Connection) -> Result<()> {
    let mut stmt = conn.prepare("SELECT version, checksum FROM schema_migrations ORDER BY version")?;
    let applied = stmt.query_map([], |row| Ok((row.get::<_, u32>(0)?, row.get::<_, Option<String>>(1)?)))?;

    for row in applied {
        let (version, stored) = row?;
        let Some(migration) = MIGRATIONS.iter().find(|m| m.version == version) else {
            return Err(schema_error(format!(
                "Database schema version {} is newer than this build supports",
                version
            )));
        };

        if stored.as_deref() != Some(migration.checksum().as_str()) {
            log::error!("Checksum mismatch for migration {} ({})", version, migration.name);
            return Err(schema_error(format!(
                "Migration {} ({}) was modified after it was applied; restore it or use a backup",
                version, migration.name
            )));
        }
    }

    Ok(())
}

fn backup_before(conn: &Connection, db_path: &str, target_version: u32) -> Result<PathBuf> {
    let dir = Path::new(db_path)
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join("backups");
    fs::create_dir_all(&dir)
        .map_err(|e| schema_error(format!("Cannot create backup directory {}: {}", dir.display(), e)))?;

    let path = dir.join(format!(
        "{}{}_{}.db",
        BACKUP_PREFIX,
        target_version,
        Utc::now().format("%Y%m%d%H%M%S%3f")
    ));
    conn.backup(DatabaseName::Main, &path, None)?;
    log::info!("Backed up database to {}", path.display());

    prune_backups(&dir);
    Ok(path)
}

fn backup_stamp(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .and_then(|s| s.rsplit('_').next())
        .unwrap_or_default()
        .to_string()
}

/// Keep the newest backups, ordered by the timestamp in the file name
fn prune_backups(dir: &Path) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };

    let mut backups: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(BACKUP_PREFIX) && n.ends_with(".db"))
        })
        .collect();
    backups.sort_by_key(|p| backup_stamp(p));

    let excess = backups.len().saturating_sub(BACKUPS_TO_KEEP);
    for old in &backups[..excess] {
        if let Err(e) = fs::remove_file(old) {
            log::warn!("Could not remove old backup {}: {}", old.display(), e);
        }
    }
}
