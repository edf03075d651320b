//! Database connection management.
//!
//! The [`Database`] struct owns a [`rusqlite::Connection`] and guarantees that
//! migrations (schema and legacy state keys) are run before any other
//! operation.

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use rusqlite::Connection;

use crate::error::{Result, StoreError};
use crate::migrations;

const DB_FILE_NAME: &str = "fairway.db";

/// Wrapper around a [`rusqlite::Connection`].
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open (or create) the default application database.
    ///
    /// The database file is placed in the platform-appropriate data directory:
    /// - Linux:   `~/.local/share/fairway/fairway.db`
    /// - macOS:   `~/Library/Application Support/com.fairway.fairway/fairway.db`
    /// - Windows: `{FOLDERID_RoamingAppData}\fairway\fairway\data\fairway.db`
    pub fn new() -> Result<Self> {
        let project_dirs =
            ProjectDirs::from("com", "fairway", "fairway").ok_or(StoreError::NoDataDir)?;
        Self::open_in(project_dirs.data_dir())
    }

    /// Open (or create) `fairway.db` inside `data_dir`, creating the
    /// directory if needed.
    pub fn open_in(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)?;
        let db_path = data_dir.join(DB_FILE_NAME);

        tracing::info!(path = %db_path.display(), "opening database");

        Self::open_at(&db_path)
    }

    /// Open (or create) a database at an explicit path.
    pub fn open_at(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::prepare(conn)
    }

    /// A throwaway database that lives for the session only.
    pub fn open_in_memory() -> Result<Self> {
        tracing::warn!("using in-memory database, state will not persist");
        Self::prepare(Connection::open_in_memory()?)
    }

    fn prepare(conn: Connection) -> Result<Self> {
        migrations::run_migrations(&conn)?;
        let db = Self { conn };
        db.set_aside_unreadable_state()?;
        db.migrate_legacy_state()?;
        Ok(db)
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Return the filesystem path of the open database (if any).
    pub fn path(&self) -> Option<PathBuf> {
        self.conn
            .path()
            .filter(|p| !p.is_empty())
            .map(PathBuf::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_in(&dir.path().join("nested")).expect("should open");
        assert!(db.path().unwrap().ends_with(DB_FILE_NAME));

        let version: u32 = db
            .conn()
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap();
        assert_eq!(version, 1);
    }

    #[test]
    fn in_memory_has_no_path() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.path().is_none());
    }
}
