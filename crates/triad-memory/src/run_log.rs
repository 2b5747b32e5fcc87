//! Run Log – append-only history of closed cycles.
//!
//! Every closed cycle produces one [`RunRecord`]. The log keeps them in
//! append order and maintains four running aggregates incrementally, so
//! [`RunLog::tally`] never rescans history:
//!
//! * total bound nodes,
//! * total failed nodes,
//! * unused emergence nodes,
//! * failures keyed by node kind.
//!
//! `append` is the only mutator. [`RunLog::snapshot`] hands out an immutable,
//! versioned copy for the boot scorer; later appends never show through it.
//!
//! # Example
//!
//! ```rust
//! use chrono::Utc;
//! use triad_memory::run_log::RunLog;
//! use triad_types::RunRecord;
//!
//! let mut log = RunLog::new();
//! log.append(RunRecord {
//!     cycle_id: "cycle-1".into(),
//!     timestamp: Utc::now(),
//!     bound_count: 4,
//!     failed_count: 1,
//!     ..Default::default()
//! })
//! .unwrap();
//!
//! assert_eq!(log.tally().total_bound, 4);
//! assert_eq!(log.version(), 1);
//! ```

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use triad_types::{NodeKind, PathStyle, RecordError, RunRecord, SnapshotNode};

// ─────────────────────────────────────────────────────────────────────────────
// Error type
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum RunLogError {
    #[error("Invalid run record: {0}")]
    InvalidRecord(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<RecordError> for RunLogError {
    fn from(e: RecordError) -> Self {
        match e {
            RecordError::InvalidRecord(msg) => RunLogError::InvalidRecord(msg),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tally
// ─────────────────────────────────────────────────────────────────────────────

/// Running aggregates over every appended record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tally {
    pub runs: u64,
    pub total_bound: u64,
    pub total_failed: u64,
    pub unused_emergence: u64,
    pub failed_by_kind: BTreeMap<NodeKind, u64>,
}

impl Tally {
    fn absorb(&mut self, record: &RunRecord) {
        self.runs += 1;
        self.total_bound += record.bound_count;
        self.total_failed += record.failed_count;
        self.unused_emergence += record.unused_emergence_count;
        for (kind, count) in &record.failed_by_kind {
            *self.failed_by_kind.entry(*kind).or_insert(0) += count;
        }
    }

    /// Recorded failures of `kind` across all runs.
    pub fn fail_count(&self, kind: NodeKind) -> u64 {
        self.failed_by_kind.get(&kind).copied().unwrap_or(0)
    }

    /// Share of recorded failures attributed to each kind. Empty when nothing
    /// has failed yet.
    pub fn fail_rate_by_type(&self) -> BTreeMap<NodeKind, f64> {
        let attributed: u64 = self.failed_by_kind.values().sum();
        if attributed == 0 {
            return BTreeMap::new();
        }
        self.failed_by_kind
            .iter()
            .map(|(kind, count)| (*kind, *count as f64 / attributed as f64))
            .collect()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// RunLog
// ─────────────────────────────────────────────────────────────────────────────

/// Append-only, in-memory run history. Single writer; share snapshots for
/// reading.
#[derive(Debug, Clone, Default)]
pub struct RunLog {
    records: Vec<RunRecord>,
    ids: HashSet<String>,
    tally: Tally,
}

impl RunLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a log, and its tallies, from previously persisted records.
    pub fn from_records(records: impl IntoIterator<Item = RunRecord>) -> Result<Self, RunLogError> {
        let mut log = Self::new();
        for record in records {
            log.append(record)?;
        }
        Ok(log)
    }

    /// Append a closed cycle's record. Returns the new log version.
    ///
    /// Fails only on malformed input: a record that does not validate, or
    /// one whose `cycle_id` is already present.
    pub fn append(&mut self, record: RunRecord) -> Result<u64, RunLogError> {
        record.validate()?;
        if self.ids.contains(&record.cycle_id) {
            return Err(RunLogError::InvalidRecord(format!(
                "duplicate cycle_id {}",
                record.cycle_id
            )));
        }
        self.tally.absorb(&record);
        self.ids.insert(record.cycle_id.clone());
        debug!(cycle_id = %record.cycle_id, version = self.records.len() + 1, "run record appended");
        self.records.push(record);
        Ok(self.version())
    }

    /// Parse, validate and append a record in its JSON layout.
    pub fn append_json(&mut self, raw: &str) -> Result<u64, RunLogError> {
        let record = RunRecord::from_json(raw)?;
        self.append(record)
    }

    /// Monotonic version; equals the number of appended records.
    pub fn version(&self) -> u64 {
        self.records.len() as u64
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// All records, oldest first.
    pub fn records(&self) -> &[RunRecord] {
        &self.records
    }

    pub fn get(&self, cycle_id: &str) -> Option<&RunRecord> {
        self.records.iter().find(|r| r.cycle_id == cycle_id)
    }

    pub fn tally(&self) -> &Tally {
        &self.tally
    }

    /// The last `n` records, most recent first.
    pub fn recent(&self, n: usize) -> Vec<&RunRecord> {
        self.records.iter().rev().take(n).collect()
    }

    pub fn fail_rate_by_type(&self) -> BTreeMap<NodeKind, f64> {
        self.tally.fail_rate_by_type()
    }

    /// Records with at least one failed node.
    pub fn with_failures(&self) -> Vec<&RunRecord> {
        self.records.iter().filter(|r| r.failed_count > 0).collect()
    }

    /// Records that left nodes to carry forward.
    pub fn with_carry_forward(&self) -> Vec<&RunRecord> {
        self.records
            .iter()
            .filter(|r| !r.carry_forward_snapshot.is_empty())
            .collect()
    }

    pub fn all_unused_emergence_count(&self) -> u64 {
        self.tally.unused_emergence
    }

    /// Records that left emergence nodes unbound.
    pub fn with_emergence(&self) -> Vec<&RunRecord> {
        self.records
            .iter()
            .filter(|r| !r.unused_emergence.is_empty())
            .collect()
    }

    /// Every unbound emergence node on record, most recent cycle first.
    pub fn all_unused_emergence(&self) -> Vec<&SnapshotNode> {
        self.records
            .iter()
            .rev()
            .flat_map(|r| &r.unused_emergence)
            .collect()
    }

    /// Majority path style over the last `last_n` records. `None` when none
    /// of them recorded a style.
    pub fn dominant_style(&self, last_n: usize) -> Option<PathStyle> {
        majority_style(self.records.iter().rev().take(last_n))
    }

    /// The whole log as a pretty-printed JSON array.
    pub fn export_json(&self) -> Result<String, RunLogError> {
        Ok(serde_json::to_string_pretty(&self.records)?)
    }

    /// Immutable copy of the log at its current version.
    pub fn snapshot(&self) -> RunLogSnapshot {
        RunLogSnapshot {
            version: self.version(),
            records: self.records.clone(),
            tally: self.tally.clone(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// RunLogSnapshot
// ─────────────────────────────────────────────────────────────────────────────

/// Frozen view of a [`RunLog`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunLogSnapshot {
    version: u64,
    records: Vec<RunRecord>,
    tally: Tally,
}

impl RunLogSnapshot {
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Records, oldest first.
    pub fn records(&self) -> &[RunRecord] {
        &self.records
    }

    pub fn tally(&self) -> &Tally {
        &self.tally
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// The last `n` records, most recent first.
    pub fn recent(&self, n: usize) -> impl Iterator<Item = &RunRecord> {
        self.records.iter().rev().take(n)
    }

    /// Failed share of resolved `kind` nodes over the last `window`
    /// records, in `[0, 1]`. Records written without `bound_by_kind` count
    /// their failures against zero successes.
    pub fn failure_rate(&self, kind: NodeKind, window: usize) -> f64 {
        let (mut failed, mut bound) = (0u64, 0u64);
        for record in self.recent(window) {
            failed += record.failed_by_kind.get(&kind).copied().unwrap_or(0);
            bound += record.bound_by_kind.get(&kind).copied().unwrap_or(0);
        }
        match failed + bound {
            0 => 0.0,
            total => failed as f64 / total as f64,
        }
    }

    pub fn dominant_style(&self, last_n: usize) -> Option<PathStyle> {
        majority_style(self.recent(last_n))
    }
}

fn majority_style<'a>(records: impl Iterator<Item = &'a RunRecord>) -> Option<PathStyle> {
    let (mut tool, mut collab) = (0usize, 0usize);
    for style in records.filter_map(|r| r.dominant_style) {
        match style {
            PathStyle::Tool => tool += 1,
            PathStyle::Collab => collab += 1,
        }
    }
    match (tool, collab) {
        (0, 0) => None,
        (t, c) if t >= c => Some(PathStyle::Tool),
        _ => Some(PathStyle::Collab),
    }
}
