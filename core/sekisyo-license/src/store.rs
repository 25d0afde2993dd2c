//! Persistence for license state.
//!
//! The registry only ever reads a whole [`LicenseState`] and writes a whole
//! one back, so a backend needs nothing more than keyed get/put.

use crate::error::{LicenseError, LicenseResult};
use crate::record::LicenseState;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// Keyed storage for license state.
pub trait LicenseStore: Send + Sync {
    /// Returns the stored state for `id`, if any was ever written.
    fn get(&self, id: &str) -> LicenseResult<Option<LicenseState>>;

    /// Replaces the stored state for `id`.
    fn put(&self, id: &str, state: &LicenseState) -> LicenseResult<()>;

    /// Returns every stored entry.
    fn all(&self) -> LicenseResult<Vec<(String, LicenseState)>>;
}

fn poisoned<T>(_: T) -> LicenseError {
    LicenseError::Storage("license store lock poisoned".to_string())
}

/// In-memory store. Contents are lost when dropped.
#[derive(Debug, Default)]
pub struct MemoryLicenseStore {
    entries: Mutex<HashMap<String, LicenseState>>,
}

impl MemoryLicenseStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LicenseStore for MemoryLicenseStore {
    fn get(&self, id: &str) -> LicenseResult<Option<LicenseState>> {
        let entries = self.entries.lock().map_err(poisoned)?;
        Ok(entries.get(id).cloned())
    }

    fn put(&self, id: &str, state: &LicenseState) -> LicenseResult<()> {
        let mut entries = self.entries.lock().map_err(poisoned)?;
        entries.insert(id.to_string(), state.clone());
        Ok(())
    }

    fn all(&self) -> LicenseResult<Vec<(String, LicenseState)>> {
        let entries = self.entries.lock().map_err(poisoned)?;
        let mut all: Vec<_> = entries
            .iter()
            .map(|(id, state)| (id.clone(), state.clone()))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(all)
    }
}

/// License state backed by a SQLite table.
pub struct SqliteLicenseStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteLicenseStore {
    /// Opens (or creates) a store at the given path.
    pub fn open(path: impl AsRef<Path>) -> LicenseResult<Self> {
        let conn = Connection::open(path.as_ref())
            .map_err(|e| LicenseError::Storage(format!("failed to open license store: {e}")))?;
        Self::with_connection(conn)
    }

    /// Opens an in-memory store (for testing).
    pub fn open_in_memory() -> LicenseResult<Self> {
        let conn = Connection::open_in_memory().map_err(|e| {
            LicenseError::Storage(format!("failed to open in-memory license store: {e}"))
        })?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> LicenseResult<Self> {
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn conn(&self) -> LicenseResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(poisoned)
    }

    fn init_schema(&self) -> LicenseResult<()> {
        self.conn()?
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS licenses (
                    id TEXT PRIMARY KEY,
                    license TEXT NOT NULL,
                    valid INTEGER NOT NULL,
                    last_checked TEXT,
                    failed INTEGER NOT NULL
                );
                ",
            )
            .map_err(|e| LicenseError::Storage(format!("failed to init license schema: {e}")))?;
        Ok(())
    }
}

type StateRow = (String, bool, Option<String>, i64);

fn state_from_row((license_key, valid, last_checked, failed): StateRow) -> LicenseResult<LicenseState> {
    let last_checked = last_checked
        .map(|ts| {
            DateTime::parse_from_rfc3339(&ts)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|e| LicenseError::Storage(format!("invalid last_checked '{ts}': {e}")))
        })
        .transpose()?;
    let consecutive_failures = u32::try_from(failed)
        .map_err(|_| LicenseError::Storage(format!("invalid failure count {failed}")))?;
    Ok(LicenseState {
        license_key,
        valid,
        last_checked,
        consecutive_failures,
    })
}

impl LicenseStore for SqliteLicenseStore {
    fn get(&self, id: &str) -> LicenseResult<Option<LicenseState>> {
        let conn = self.conn()?;
        let row: Option<StateRow> = conn
            .query_row(
                "SELECT license, valid, last_checked, failed FROM licenses WHERE id = ?1",
                params![id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()
            .map_err(|e| LicenseError::Storage(format!("failed to load license for {id}: {e}")))?;
        row.map(state_from_row).transpose()
    }

    fn put(&self, id: &str, state: &LicenseState) -> LicenseResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO licenses (id, license, valid, last_checked, failed) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                id,
                state.license_key,
                state.valid,
                state.last_checked.map(|t| t.to_rfc3339()),
                i64::from(state.consecutive_failures),
            ],
        )
        .map_err(|e| LicenseError::Storage(format!("failed to save license for {id}: {e}")))?;
        Ok(())
    }

    fn all(&self) -> LicenseResult<Vec<(String, LicenseState)>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT id, license, valid, last_checked, failed FROM licenses ORDER BY id")
            .map_err(|e| LicenseError::Storage(format!("failed to prepare license query: {e}")))?;
        let rows = stmt
            .query_map([], |row| {
                let id: String = row.get(0)?;
                Ok((id, (row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)))
            })
            .map_err(|e| LicenseError::Storage(format!("failed to query licenses: {e}")))?;

        let mut result = Vec::new();
        for row in rows {
            let (id, state_row) =
                row.map_err(|e| LicenseError::Storage(format!("failed to read license row: {e}")))?;
            result.push((id, state_from_row(state_row)?));
        }
        Ok(result)
    }
}
