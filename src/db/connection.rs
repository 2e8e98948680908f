use rusqlite::{Connection, Result};
use std::sync::Mutex;
use crate::db::migration_runner;

pub struct Database {
    pub conn: Mutex<Connection>,
}

impl Database {
    pub fn new(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path)?;

        // WAL so readers are not blocked while a batch is being written
        conn.pragma_update(None, "journal_mode", "WAL")?;

        Self::initialize(conn, db_path)
    }

    /// Private in-memory database with the full schema applied
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::initialize(conn, ":memory:")
    }

    fn initialize(conn: Connection, db_path: &str) -> Result<Self> {
        conn.execute("PRAGMA foreign_keys = ON", [])?;

        let applied = migration_runner::migrate(&conn, db_path)?;
        migration_runner::verify(&conn)?;

        let version = migration_runner::current_version(&conn)?;
        log::info!("Database ready at schema version {:?} ({} migrations applied)", version, applied);

        Ok(Database {
            conn: Mutex::new(conn),
        })
    }
}
