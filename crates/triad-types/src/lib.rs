//! `triad-types` – shared vocabulary of the turn/path scheduler.
//!
//! Everything that crosses a crate boundary lives here: the [`Node`] planning
//! unit with its closed [`NodeKind`] / [`NodeStatus`] enumerations, the
//! [`SnapshotNode`] form used in persisted history, and the [`RunRecord`]
//! written once per completed cycle.
//!
//! # Persisted layout
//!
//! A [`RunRecord`] serializes to JSON as
//!
//! ```text
//! { cycle_id, timestamp (RFC-3339), bound_count, failed_count,
//!   unused_emergence_count, carry_forward_snapshot: [{id, type, content}] }
//! ```
//!
//! plus optional extras (`dormant_snapshot`, `failed_by_kind`,
//! `bound_by_kind`, `emergence_count`, `reclaims_used`, `resolved_ids`,
//! `dominant_style`, `unused_emergence`) that default when absent.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ─────────────────────────────────────────────────────────────────────────────
// NodeKind
// ─────────────────────────────────────────────────────────────────────────────

/// The role a node plays in a plan.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "kebab-case")]
pub enum NodeKind {
    /// Baseline: a tool call or task expectation.
    ToolCall,
    /// Baseline: back-and-forth with the user.
    Collaboration,
    /// Tool node earned mid-turn (reclaimed from the reserve pool).
    ToolExtension,
    /// Collaboration node earned mid-turn (reclaimed from the reserve pool).
    CollabExtension,
    /// Created on the fly while a turn is active.
    Emergence,
    /// Flattened out of a row that was not chosen.
    UnchosenMarker,
}

impl NodeKind {
    pub const ALL: [NodeKind; 6] = [
        NodeKind::ToolCall,
        NodeKind::Collaboration,
        NodeKind::ToolExtension,
        NodeKind::CollabExtension,
        NodeKind::Emergence,
        NodeKind::UnchosenMarker,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::ToolCall => "tool-call",
            NodeKind::Collaboration => "collaboration",
            NodeKind::ToolExtension => "tool-extension",
            NodeKind::CollabExtension => "collab-extension",
            NodeKind::Emergence => "emergence",
            NodeKind::UnchosenMarker => "unchosen-marker",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == s)
    }

    /// Single-character rendering used by the CLI.
    pub fn glyph(&self) -> char {
        match self {
            NodeKind::ToolCall => '○',
            NodeKind::Collaboration => '◉',
            NodeKind::ToolExtension => '◇',
            NodeKind::CollabExtension => '◆',
            NodeKind::Emergence => '✦',
            NodeKind::UnchosenMarker => '─',
        }
    }

    /// The extension kind a reserve node becomes when reclaimed, given the
    /// kind it had before it was flattened.
    pub fn extension_for(origin: NodeKind) -> NodeKind {
        match origin {
            NodeKind::ToolCall | NodeKind::ToolExtension => NodeKind::ToolExtension,
            _ => NodeKind::CollabExtension,
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which family of nodes dominated the executed path of a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum PathStyle {
    Tool,
    Collab,
}

impl PathStyle {
    /// Majority over `kinds`; ties go to [`PathStyle::Tool`]. Returns `None`
    /// when no tool or collaboration kind is present.
    pub fn dominant(kinds: impl IntoIterator<Item = NodeKind>) -> Option<Self> {
        let (mut tool, mut collab) = (0usize, 0usize);
        for kind in kinds {
            match kind {
                NodeKind::ToolCall | NodeKind::ToolExtension => tool += 1,
                NodeKind::Collaboration | NodeKind::CollabExtension => collab += 1,
                _ => {}
            }
        }
        match (tool, collab) {
            (0, 0) => None,
            (t, c) if t >= c => Some(PathStyle::Tool),
            _ => Some(PathStyle::Collab),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PathStyle::Tool => "tool",
            PathStyle::Collab => "collab",
        }
    }
}

impl fmt::Display for PathStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// NodeStatus
// ─────────────────────────────────────────────────────────────────────────────

/// Lifecycle state of a node.
///
/// Within a turn transitions only move forward:
/// `open → {bound | failed | dormant}` and `dormant → failed`.
/// `dormant → open` happens only when a node is planted into a later cycle
/// (see [`Node::plant`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Open,
    Bound,
    Dormant,
    Failed,
}

impl NodeStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, NodeStatus::Bound | NodeStatus::Failed)
    }

    pub fn can_become(&self, to: NodeStatus) -> bool {
        matches!(
            (*self, to),
            (NodeStatus::Open, NodeStatus::Bound)
                | (NodeStatus::Open, NodeStatus::Failed)
                | (NodeStatus::Open, NodeStatus::Dormant)
                | (NodeStatus::Dormant, NodeStatus::Failed)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeStatus::Open => "open",
            NodeStatus::Bound => "bound",
            NodeStatus::Dormant => "dormant",
            NodeStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A status change that would break monotonicity.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("illegal status transition {from} -> {to}")]
pub struct StatusError {
    pub from: NodeStatus,
    pub to: NodeStatus,
}

// ─────────────────────────────────────────────────────────────────────────────
// NodeId
// ─────────────────────────────────────────────────────────────────────────────

/// Immutable node identity.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Node
// ─────────────────────────────────────────────────────────────────────────────

/// Atomic planning unit.
///
/// `id` and `origin` never change after creation. `kind` is relabelled when
/// the node moves between a row and the reserve pool; `status` and `content`
/// (the result payload) change as the plan executes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    id: NodeId,
    kind: NodeKind,
    origin: NodeKind,
    status: NodeStatus,
    content: String,
    age: u32,
}

impl Node {
    pub fn new(id: NodeId, kind: NodeKind, content: impl Into<String>) -> Self {
        Self {
            id,
            kind,
            origin: kind,
            status: NodeStatus::Open,
            content: content.into(),
            age: 0,
        }
    }

    pub fn id(&self) -> &NodeId {
        &self.id
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    /// Kind the node was created with, before any relabelling.
    pub fn origin(&self) -> NodeKind {
        self.origin
    }

    pub fn status(&self) -> NodeStatus {
        self.status
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    /// Number of cycle boundaries this node has crossed.
    pub fn age(&self) -> u32 {
        self.age
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Move to `to`, refusing any transition that is not forward progress.
    pub fn set_status(&mut self, to: NodeStatus) -> Result<(), StatusError> {
        if !self.status.can_become(to) {
            return Err(StatusError {
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }

    pub fn set_content(&mut self, content: impl Into<String>) {
        self.content = content.into();
    }

    pub fn relabel(&mut self, kind: NodeKind) {
        self.kind = kind;
    }

    /// Age this node by one cycle boundary.
    pub fn carried(mut self) -> Self {
        self.age = self.age.saturating_add(1);
        self
    }

    /// Prepare a seed for placement in a new row.
    pub fn plant(mut self) -> Self {
        self.kind = self.origin;
        if self.status == NodeStatus::Dormant {
            self.status = NodeStatus::Open;
        }
        self
    }

    pub fn snapshot(&self) -> SnapshotNode {
        SnapshotNode {
            id: self.id.clone(),
            kind: self.origin,
            content: self.content.clone(),
            age: self.age,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// SnapshotNode
// ─────────────────────────────────────────────────────────────────────────────

/// A node as persisted inside a [`RunRecord`]. `type` is the node's origin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SnapshotNode {
    pub id: NodeId,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    pub content: String,
    #[serde(default)]
    pub age: u32,
}

impl SnapshotNode {
    /// Rehydrate as an open node carrying the recorded age.
    pub fn to_node(&self) -> Node {
        Node {
            id: self.id.clone(),
            kind: self.kind,
            origin: self.kind,
            status: NodeStatus::Open,
            content: self.content.clone(),
            age: self.age,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// RunRecord
// ─────────────────────────────────────────────────────────────────────────────

/// Rejection of a malformed run record.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    #[error("invalid run record: {0}")]
    InvalidRecord(String),
}

/// Summary of one completed cycle. Immutable once written.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RunRecord {
    pub cycle_id: String,
    pub timestamp: DateTime<Utc>,
    pub bound_count: u64,
    pub failed_count: u64,
    pub unused_emergence_count: u64,
    pub carry_forward_snapshot: Vec<SnapshotNode>,
    #[serde(default)]
    pub dormant_snapshot: Vec<SnapshotNode>,
    #[serde(default)]
    pub failed_by_kind: BTreeMap<NodeKind, u64>,
    #[serde(default)]
    pub bound_by_kind: BTreeMap<NodeKind, u64>,
    #[serde(default)]
    pub emergence_count: u64,
    #[serde(default)]
    pub reclaims_used: u64,
    /// Nodes that reached `bound` or `failed` during this cycle. Older
    /// snapshots of these ids are stale.
    #[serde(default)]
    pub resolved_ids: Vec<NodeId>,
    #[serde(default)]
    pub dominant_style: Option<PathStyle>,
    /// Emergence nodes created this cycle that never bound.
    #[serde(default)]
    pub unused_emergence: Vec<SnapshotNode>,
}

/// Signed mirror of [`RunRecord`] so negative counts surface as
/// [`RecordError::InvalidRecord`] instead of a bare parse error.
#[derive(Deserialize)]
struct RunRecordWire {
    cycle_id: String,
    timestamp: DateTime<Utc>,
    bound_count: i64,
    failed_count: i64,
    unused_emergence_count: i64,
    carry_forward_snapshot: Vec<SnapshotNode>,
    #[serde(default)]
    dormant_snapshot: Vec<SnapshotNode>,
    #[serde(default)]
    failed_by_kind: BTreeMap<NodeKind, i64>,
    #[serde(default)]
    bound_by_kind: BTreeMap<NodeKind, i64>,
    #[serde(default)]
    emergence_count: i64,
    #[serde(default)]
    reclaims_used: i64,
    #[serde(default)]
    resolved_ids: Vec<NodeId>,
    #[serde(default)]
    dominant_style: Option<PathStyle>,
    #[serde(default)]
    unused_emergence: Vec<SnapshotNode>,
}

fn non_negative(field: &str, value: i64) -> Result<u64, RecordError> {
    u64::try_from(value)
        .map_err(|_| RecordError::InvalidRecord(format!("{field} is negative ({value})")))
}

impl TryFrom<RunRecordWire> for RunRecord {
    type Error = RecordError;

    fn try_from(w: RunRecordWire) -> Result<Self, Self::Error> {
        let mut failed_by_kind = BTreeMap::new();
        for (kind, count) in w.failed_by_kind {
            failed_by_kind.insert(kind, non_negative(kind.as_str(), count)?);
        }
        let mut bound_by_kind = BTreeMap::new();
        for (kind, count) in w.bound_by_kind {
            bound_by_kind.insert(kind, non_negative(kind.as_str(), count)?);
        }
        let record = RunRecord {
            cycle_id: w.cycle_id,
            timestamp: w.timestamp,
            bound_count: non_negative("bound_count", w.bound_count)?,
            failed_count: non_negative("failed_count", w.failed_count)?,
            unused_emergence_count: non_negative(
                "unused_emergence_count",
                w.unused_emergence_count,
            )?,
            carry_forward_snapshot: w.carry_forward_snapshot,
            dormant_snapshot: w.dormant_snapshot,
            failed_by_kind,
            bound_by_kind,
            emergence_count: non_negative("emergence_count", w.emergence_count)?,
            reclaims_used: non_negative("reclaims_used", w.reclaims_used)?,
            resolved_ids: w.resolved_ids,
            dominant_style: w.dominant_style,
            unused_emergence: w.unused_emergence,
        };
        record.validate()?;
        Ok(record)
    }
}

impl RunRecord {
    /// Parse and validate a record from its JSON layout.
    pub fn from_json(raw: &str) -> Result<Self, RecordError> {
        let wire: RunRecordWire = serde_json::from_str(raw)
            .map_err(|e| RecordError::InvalidRecord(e.to_string()))?;
        RunRecord::try_from(wire)
    }

    pub fn to_json(&self) -> Result<String, RecordError> {
        serde_json::to_string(self).map_err(|e| RecordError::InvalidRecord(e.to_string()))
    }

    /// Check the cross-field invariants a well-formed record satisfies.
    pub fn validate(&self) -> Result<(), RecordError> {
        if self.cycle_id.trim().is_empty() {
            return Err(RecordError::InvalidRecord("cycle_id is empty".into()));
        }
        let by_kind: u64 = self.failed_by_kind.values().sum();
        if by_kind > self.failed_count {
            return Err(RecordError::InvalidRecord(format!(
                "failed_by_kind sums to {by_kind} but failed_count is {}",
                self.failed_count
            )));
        }
        let bound_by_kind: u64 = self.bound_by_kind.values().sum();
        if bound_by_kind > self.bound_count {
            return Err(RecordError::InvalidRecord(format!(
                "bound_by_kind sums to {bound_by_kind} but bound_count is {}",
                self.bound_count
            )));
        }
        if self.emergence_count > 0 && self.unused_emergence_count > self.emergence_count {
            return Err(RecordError::InvalidRecord(format!(
                "unused_emergence_count {} exceeds emergence_count {}",
                self.unused_emergence_count, self.emergence_count
            )));
        }
        let blank = self
            .carry_forward_snapshot
            .iter()
            .chain(&self.dormant_snapshot)
            .chain(&self.unused_emergence)
            .map(|n| &n.id)
            .chain(&self.resolved_ids)
            .any(|id| id.as_str().is_empty());
        if blank {
            return Err(RecordError::InvalidRecord("node reference without id".into()));
        }
        Ok(())
    }
}

/// JSON Schema describing the persisted [`RunRecord`] layout.
pub fn run_record_schema() -> schemars::schema::RootSchema {
    schemars::schema_for!(RunRecord)
}
