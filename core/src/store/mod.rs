//! SQLite persistence layer.
//!
//! RULE: Only the store talks to the database.
//! The scheduler and runner call store methods and never execute SQL directly.

use crate::{
    error::EngineResult,
    types::Namespace,
};
mod dataset;
mod ledger;
pub use dataset::UploadSummary;
pub use ledger::JournalEntry;
use rusqlite::{params, Connection};
use std::sync::{Mutex, MutexGuard, PoisonError};

pub struct NamespaceStore {
    conn: Mutex<Connection>,
}

impl NamespaceStore {
    pub fn open(path: &str) -> EngineResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI,
        )?;
        // WAL mode only for real files (shared-memory and :memory: ignore it).
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> EngineResult<Self> {
        let conn = Connection::open(":memory:")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Open and migrate in one step.
    pub fn open_migrated(path: &str) -> EngineResult<Self> {
        let store = if path == ":memory:" {
            Self::in_memory()?
        } else {
            Self::open(path)?
        };
        store.migrate()?;
        Ok(store)
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> EngineResult<()> {
        self.conn()
            .execute_batch(include_str!("../../../migrations/001_foundation.sql"))?;
        Ok(())
    }

    /// A panic mid-write drops its `rusqlite::Transaction`, which rolls back,
    /// so a poisoned connection is still consistent.
    pub(crate) fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ── Namespace ──────────────────────────────────────────────

    pub fn list_namespaces(&self) -> EngineResult<Vec<Namespace>> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT namespace FROM namespace ORDER BY namespace ASC")?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn has_namespace(&self, namespace: &str) -> EngineResult<bool> {
        let found: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM namespace WHERE namespace = ?1",
            params![namespace],
            |row| row.get(0),
        )?;
        Ok(found > 0)
    }
}
