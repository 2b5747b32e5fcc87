//! Run Store – SQLite persistence for the run log.
//!
//! Records are stored as their JSON layout so the file stays readable by
//! anything that understands a [`RunRecord`]; loading goes back through
//! [`RunRecord::from_json`] and therefore through the same validation as a
//! live append.
//!
//! # Storage layout
//!
//! | column    | type    | description                                  |
//! |-----------|---------|----------------------------------------------|
//! | seq       | INTEGER | Insertion order (primary key)                |
//! | cycle_id  | TEXT    | Unique cycle identifier                      |
//! | timestamp | TEXT    | RFC-3339 close time (UTC)                    |
//! | record    | TEXT    | Full record as JSON                          |
//!
//! # Example
//!
//! ```rust
//! use chrono::Utc;
//! use triad_memory::run_store::RunStore;
//! use triad_types::RunRecord;
//!
//! let store = RunStore::open_in_memory().unwrap();
//! let record = RunRecord {
//!     cycle_id: "cycle-1".into(),
//!     timestamp: Utc::now(),
//!     bound_count: 3,
//!     failed_count: 0,
//!     ..Default::default()
//! };
//! store.append(&record).unwrap();
//!
//! let log = store.load_log().unwrap();
//! assert_eq!(log.tally().total_bound, 3);
//! ```

use rusqlite::{Connection, OptionalExtension, params};
use thiserror::Error;
use tracing::debug;
use triad_types::{RecordError, RunRecord};

use crate::run_log::{RunLog, RunLogError};

#[derive(Error, Debug)]
pub enum RunStoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error(transparent)]
    Record(#[from] RecordError),
    #[error(transparent)]
    Log(#[from] RunLogError),
}

/// SQLite-backed store of [`RunRecord`]s.
pub struct RunStore {
    conn: Connection,
}

impl RunStore {
    /// Open (or create) a persistent SQLite database at `path`.
    pub fn open(path: &str) -> Result<Self, RunStoreError> {
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    /// Open a temporary in-memory database.
    pub fn open_in_memory() -> Result<Self, RunStoreError> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), RunStoreError> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS run_records (
                seq       INTEGER PRIMARY KEY AUTOINCREMENT,
                cycle_id  TEXT NOT NULL UNIQUE,
                timestamp TEXT NOT NULL,
                record    TEXT NOT NULL
            );",
        )?;
        Ok(())
    }

    /// Persist one record. A second record with the same `cycle_id` is
    /// rejected by the unique constraint.
    pub fn append(&self, record: &RunRecord) -> Result<(), RunStoreError> {
        record.validate()?;
        let json = serde_json::to_string(record)?;
        self.conn.execute(
            "INSERT INTO run_records (cycle_id, timestamp, record) VALUES (?1, ?2, ?3)",
            params![record.cycle_id, record.timestamp.to_rfc3339(), json],
        )?;
        debug!(cycle_id = %record.cycle_id, "run record persisted");
        Ok(())
    }

    /// All records in insertion order.
    pub fn load_all(&self) -> Result<Vec<RunRecord>, RunStoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT record FROM run_records ORDER BY seq ASC")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut records = Vec::new();
        for raw in rows {
            records.push(RunRecord::from_json(&raw?)?);
        }
        Ok(records)
    }

    /// Rebuild a [`RunLog`] from everything persisted.
    pub fn load_log(&self) -> Result<RunLog, RunStoreError> {
        Ok(RunLog::from_records(self.load_all()?)?)
    }

    pub fn get(&self, cycle_id: &str) -> Result<Option<RunRecord>, RunStoreError> {
        let raw: Option<String> = self
            .conn
            .query_row(
                "SELECT record FROM run_records WHERE cycle_id = ?1",
                params![cycle_id],
                |row| row.get(0),
            )
            .optional()?;
        raw.map(|r| RunRecord::from_json(&r))
            .transpose()
            .map_err(RunStoreError::from)
    }

    pub fn count(&self) -> Result<u64, RunStoreError> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM run_records", [], |row| row.get(0))?;
        Ok(n.max(0) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use triad_types::{NodeId, NodeKind, SnapshotNode};

    fn record(id: &str, bound: u64) -> RunRecord {
        RunRecord {
            cycle_id: id.to_string(),
            timestamp: Utc::now(),
            bound_count: bound,
            failed_count: 0,
            unused_emergence_count: 0,
            carry_forward_snapshot: vec![SnapshotNode {
                id: NodeId::from(format!("{id}.n0")),
                kind: NodeKind::Collaboration,
                content: "ask about scope".into(),
                age: 1,
            }],
            ..Default::default()
        }
    }

    #[test]
    fn append_and_load_in_order() {
        let store = RunStore::open_in_memory().unwrap();
        for (i, id) in ["b", "a", "c"].iter().enumerate() {
            store.append(&record(id, i as u64)).unwrap();
        }
        let ids: Vec<String> = store
            .load_all()
            .unwrap()
            .into_iter()
            .map(|r| r.cycle_id)
            .collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
        assert_eq!(store.count().unwrap(), 3);
    }

    #[test]
    fn duplicate_cycle_id_is_rejected() {
        let store = RunStore::open_in_memory().unwrap();
        store.append(&record("a", 1)).unwrap();
        let err = store.append(&record("a", 2)).unwrap_err();
        assert!(matches!(err, RunStoreError::Sqlite(_)));
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn invalid_record_is_not_persisted() {
        let store = RunStore::open_in_memory().unwrap();
        let err = store.append(&record("", 1)).unwrap_err();
        assert!(matches!(err, RunStoreError::Record(_)));
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn get_returns_stored_record() {
        let store = RunStore::open_in_memory().unwrap();
        let r = record("a", 7);
        store.append(&r).unwrap();
        assert_eq!(store.get("a").unwrap(), Some(r));
        assert_eq!(store.get("missing").unwrap(), None);
    }

    #[test]
    fn load_log_rebuilds_tallies() {
        let store = RunStore::open_in_memory().unwrap();
        store.append(&record("a", 2)).unwrap();
        store.append(&record("b", 5)).unwrap();
        let log = store.load_log().unwrap();
        assert_eq!(log.tally().total_bound, 7);
        assert_eq!(log.with_carry_forward().len(), 2);
    }

    #[test]
    fn records_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runs.db");
        let path = path.to_str().unwrap();
        {
            let store = RunStore::open(path).unwrap();
            store.append(&record("a", 1)).unwrap();
        }
        let store = RunStore::open(path).unwrap();
        assert_eq!(store.load_all().unwrap()[0].cycle_id, "a");
    }
}
