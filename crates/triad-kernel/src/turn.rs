//! [`Turn`] – one step of the three-step cycle.
//!
//! A turn moves through three phases:
//!
//! | phase      | entered by                 | allowed operations                                  |
//! |------------|----------------------------|-----------------------------------------------------|
//! | `Planning` | [`Turn::plan`]             | [`select`][Turn::select], [`select_with_input`][Turn::select_with_input], [`force_end`][Turn::force_end] |
//! | `Active`   | a successful `select`      | `flatten`, `reclaim`, `emerge`, `resolve`, `fail`, `pause`, `carry_forward_reserve`, `complete`, `force_end` |
//! | `Complete` | `complete` or `force_end`  | read-only                                           |
//!
//! # Budget
//!
//! Turn *k* of a cycle must be planned with at least `3·k` nodes across its
//! rows. Seeds carried in from earlier turns ride along in an extra row and do
//! not count toward the floor; emergence nodes are exempt as well.
//!
//! # Conservation
//!
//! Nodes are never created or destroyed after planning, except emergence
//! nodes. Selection relocates the nodes of every other row into the reserve
//! pool, reclaim moves one reserve node into the chosen row, and completion
//! moves the remaining reserve into `carry_forward` and paused nodes into
//! `dormant`. [`Turn::node_count`] therefore always equals the planned count
//! plus the number of emergence nodes.
//!
//! # Example
//!
//! ```rust
//! use triad_kernel::fail_marker::FailMarker;
//! use triad_kernel::row::{NodeDraft, RowId, RowProposal};
//! use triad_kernel::turn::{Turn, TurnIndex};
//!
//! let mut turn = Turn::plan(
//!     1,
//!     TurnIndex::First,
//!     vec![
//!         RowProposal::new(vec![NodeDraft::tool("read"), NodeDraft::tool("patch")]),
//!         RowProposal::new(vec![NodeDraft::collab("ask first")]),
//!     ],
//!     Vec::new(),
//! )
//! .unwrap();
//!
//! turn.select(RowId(0)).unwrap();
//! assert_eq!(turn.reserve().len(), 1);
//!
//! let ids: Vec<_> = turn.executed().iter().map(|n| n.id().clone()).collect();
//! for id in &ids {
//!     turn.resolve(id, "done").unwrap();
//! }
//! turn.carry_forward_reserve().unwrap();
//! turn.complete(&FailMarker::default()).unwrap();
//! assert_eq!(turn.carry_forward().len(), 1);
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};
use triad_types::{Node, NodeId, NodeKind, NodeStatus, StatusError};

use crate::fail_marker::{FailMark, FailMarker};
use crate::row::{Row, RowId, RowProposal};

/// Reclaims permitted per turn.
pub const MAX_RECLAIMS_PER_TURN: u8 = 1;

// ─────────────────────────────────────────────────────────────────────────────
// Error type
// ─────────────────────────────────────────────────────────────────────────────

/// Misuse of a turn. All variants are caller errors; nothing is retried.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TurnError {
    #[error("Budget violation: turn needs {required} nodes, rows propose {proposed}")]
    BudgetViolation { required: usize, proposed: usize },
    #[error("Row {row} claims {covers} budget slots but holds {len} nodes")]
    UndersizedRow { row: RowId, covers: usize, len: usize },
    #[error("Invalid selection: row {0} does not exist or is flat")]
    InvalidSelection(RowId),
    #[error("Row {0} is already selected")]
    AlreadySelected(RowId),
    #[error("Reclaim already used this turn")]
    ReclaimExhausted,
    #[error("Node not found: {0}")]
    NotFound(NodeId),
    #[error("Turn is not active (phase: {0})")]
    NotActive(TurnPhase),
    #[error("Node {node}: {source}")]
    InvalidTransition { node: NodeId, source: StatusError },
    #[error(
        "Turn incomplete: {unresolved} unresolved node(s), {reserve} reserve node(s) not carried forward"
    )]
    Incomplete { unresolved: usize, reserve: usize },
}

// ─────────────────────────────────────────────────────────────────────────────
// TurnIndex / TurnPhase
// ─────────────────────────────────────────────────────────────────────────────

/// Position of a turn within its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TurnIndex {
    First,
    Second,
    Third,
}

impl TurnIndex {
    pub fn number(&self) -> usize {
        match self {
            TurnIndex::First => 1,
            TurnIndex::Second => 2,
            TurnIndex::Third => 3,
        }
    }

    /// Baseline node budget: `3·k`.
    pub fn budget(&self) -> usize {
        3 * self.number()
    }

    /// Row lengths of the default plan; they sum to the budget.
    pub fn baseline_shape(&self) -> &'static [usize] {
        match self {
            TurnIndex::First => &[2, 1],
            TurnIndex::Second => &[3, 2, 1],
            TurnIndex::Third => &[4, 3, 2],
        }
    }

    pub fn next(&self) -> Option<TurnIndex> {
        match self {
            TurnIndex::First => Some(TurnIndex::Second),
            TurnIndex::Second => Some(TurnIndex::Third),
            TurnIndex::Third => None,
        }
    }
}

impl fmt::Display for TurnIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "turn {}", self.number())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TurnPhase {
    Planning,
    Active,
    Complete,
}

impl fmt::Display for TurnPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TurnPhase::Planning => f.write_str("planning"),
            TurnPhase::Active => f.write_str("active"),
            TurnPhase::Complete => f.write_str("complete"),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Turn
// ─────────────────────────────────────────────────────────────────────────────

/// One step of a cycle. Owns its rows and reserve pool exclusively.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    cycle: u64,
    index: TurnIndex,
    budget: usize,
    rows: Vec<Row>,
    chosen: Option<RowId>,
    reserve: Vec<Node>,
    reclaimed: Option<NodeId>,
    reclaims_used: u8,
    emerged: usize,
    planned: usize,
    carry_forward: Vec<Node>,
    dormant: Vec<Node>,
    marks: Vec<FailMark>,
    phase: TurnPhase,
    forced: bool,
}

impl Turn {
    /// Check `proposals` against the budget of `index` without building.
    pub fn validate(index: TurnIndex, proposals: &[RowProposal]) -> Result<(), TurnError> {
        for (i, p) in proposals.iter().enumerate() {
            if p.len() < p.covers() {
                return Err(TurnError::UndersizedRow {
                    row: RowId(i),
                    covers: p.covers(),
                    len: p.len(),
                });
            }
        }
        let proposed: usize = proposals.iter().map(RowProposal::len).sum();
        if proposed < index.budget() {
            return Err(TurnError::BudgetViolation {
                required: index.budget(),
                proposed,
            });
        }
        Ok(())
    }

    /// Build a turn from pre-planned rows.
    ///
    /// `seeds` become an extra trailing row outside the budget. Each seed is
    /// restored to its original kind and, if it was dormant, reopened.
    pub fn plan(
        cycle: u64,
        index: TurnIndex,
        proposals: Vec<RowProposal>,
        seeds: Vec<Node>,
    ) -> Result<Self, TurnError> {
        Self::validate(index, &proposals)?;

        let k = index.number();
        let mut rows = Vec::with_capacity(proposals.len() + 1);
        let mut planned = 0;
        for (r, proposal) in proposals.into_iter().enumerate() {
            let nodes: Vec<Node> = proposal
                .into_drafts()
                .into_iter()
                .enumerate()
                .map(|(p, d)| {
                    Node::new(NodeId::new(format!("c{cycle}.t{k}.r{r}.p{p}")), d.kind, d.content)
                })
                .collect();
            planned += nodes.len();
            rows.push(Row::new(RowId(r), nodes, false));
        }
        if !seeds.is_empty() {
            planned += seeds.len();
            let nodes = seeds.into_iter().map(Node::plant).collect();
            rows.push(Row::new(RowId(rows.len()), nodes, true));
        }

        info!(cycle, turn = k, rows = rows.len(), planned, "turn planned");
        Ok(Self {
            cycle,
            index,
            budget: index.budget(),
            rows,
            chosen: None,
            reserve: Vec::new(),
            reclaimed: None,
            reclaims_used: 0,
            emerged: 0,
            planned,
            carry_forward: Vec::new(),
            dormant: Vec::new(),
            marks: Vec::new(),
            phase: TurnPhase::Planning,
            forced: false,
        })
    }

    // ── accessors ────────────────────────────────────────────────────────────

    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    pub fn index(&self) -> TurnIndex {
        self.index
    }

    pub fn budget(&self) -> usize {
        self.budget
    }

    pub fn phase(&self) -> TurnPhase {
        self.phase
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn row(&self, id: RowId) -> Option<&Row> {
        self.rows.get(id.0)
    }

    pub fn chosen(&self) -> Option<RowId> {
        self.chosen
    }

    pub fn chosen_row(&self) -> Option<&Row> {
        self.chosen.and_then(|id| self.row(id))
    }

    /// Nodes of the executed plan: the chosen row, including reclaimed and
    /// emergence nodes. Empty before selection.
    pub fn executed(&self) -> &[Node] {
        self.chosen_row().map(Row::nodes).unwrap_or(&[])
    }

    pub fn reserve(&self) -> &[Node] {
        &self.reserve
    }

    pub fn reclaimed(&self) -> Option<&NodeId> {
        self.reclaimed.as_ref()
    }

    pub fn reclaims_used(&self) -> u8 {
        self.reclaims_used
    }

    pub fn emerged(&self) -> usize {
        self.emerged
    }

    pub fn carry_forward(&self) -> &[Node] {
        &self.carry_forward
    }

    pub fn dormant(&self) -> &[Node] {
        &self.dormant
    }

    pub fn fail_marks(&self) -> &[FailMark] {
        &self.marks
    }

    pub fn is_forced(&self) -> bool {
        self.forced
    }

    pub fn is_complete(&self) -> bool {
        self.phase == TurnPhase::Complete
    }

    /// Nodes planned at construction, seeds included.
    pub fn planned(&self) -> usize {
        self.planned
    }

    /// Every node currently owned by the turn, wherever it sits.
    pub fn node_count(&self) -> usize {
        self.rows.iter().map(Row::len).sum::<usize>()
            + self.reserve.len()
            + self.carry_forward.len()
            + self.dormant.len()
    }

    /// Find a node anywhere in the turn.
    pub fn find(&self, id: &NodeId) -> Option<&Node> {
        self.rows
            .iter()
            .find_map(|r| r.get(id))
            .or_else(|| {
                self.reserve
                    .iter()
                    .chain(&self.carry_forward)
                    .chain(&self.dormant)
                    .find(|n| n.id() == id)
            })
    }

    /// `(unresolved, reserve)` counts still blocking natural completion.
    pub fn pending(&self) -> (usize, usize) {
        let unresolved = self
            .executed()
            .iter()
            .filter(|n| n.status() == NodeStatus::Open)
            .count();
        (unresolved, self.reserve.len())
    }

    pub fn can_complete(&self) -> bool {
        self.phase == TurnPhase::Active && self.pending() == (0, 0)
    }

    // ── selection ────────────────────────────────────────────────────────────

    /// Choose the row to pursue. Every other row is flattened into the
    /// reserve pool, in row order.
    pub fn select(&mut self, row: RowId) -> Result<(), TurnError> {
        if let Some(chosen) = self.chosen {
            return Err(TurnError::AlreadySelected(chosen));
        }
        if self.phase != TurnPhase::Planning {
            return Err(TurnError::NotActive(self.phase));
        }
        if self.rows.get(row.0).is_none_or(Row::is_flat) {
            return Err(TurnError::InvalidSelection(row));
        }

        self.rows[row.0].mark_chosen();
        self.chosen = Some(row);
        self.phase = TurnPhase::Active;
        for i in 0..self.rows.len() {
            if i != row.0 {
                self.flatten(RowId(i))?;
            }
        }
        info!(
            cycle = self.cycle,
            turn = self.index.number(),
            row = row.0,
            reserve = self.reserve.len(),
            "row selected"
        );
        Ok(())
    }

    /// [`select`][Self::select], then fold the caller's input into every
    /// chosen node: an empty node takes `input` as its content, a planned one
    /// keeps its plan followed by a `[user]:` line.
    pub fn select_with_input(&mut self, row: RowId, input: &str) -> Result<(), TurnError> {
        self.select(row)?;
        let input = input.trim();
        if input.is_empty() {
            return Ok(());
        }
        for node in self.executed_mut() {
            let content = if node.content().is_empty() {
                input.to_string()
            } else {
                format!("{}\n[user]: {input}", node.content())
            };
            node.set_content(content);
        }
        Ok(())
    }

    /// Move an unchosen row's nodes into the reserve pool. Returns how many
    /// nodes moved; flattening a flat row moves none. Only valid once a row
    /// has been selected.
    pub fn flatten(&mut self, row: RowId) -> Result<usize, TurnError> {
        self.ensure_active()?;
        if Some(row) == self.chosen {
            return Err(TurnError::InvalidSelection(row));
        }
        let r = self
            .rows
            .get_mut(row.0)
            .ok_or(TurnError::InvalidSelection(row))?;
        let moved = r.flatten();
        let n = moved.len();
        self.reserve.extend(moved);
        Ok(n)
    }

    // ── active-turn operations ───────────────────────────────────────────────

    fn ensure_active(&self) -> Result<(), TurnError> {
        if self.phase == TurnPhase::Active {
            Ok(())
        } else {
            Err(TurnError::NotActive(self.phase))
        }
    }

    fn chosen_row_mut(&mut self) -> Result<&mut Row, TurnError> {
        self.ensure_active()?;
        let id = self.chosen.ok_or(TurnError::NotActive(self.phase))?;
        Ok(&mut self.rows[id.0])
    }

    fn executed_node_mut(&mut self, id: &NodeId) -> Result<&mut Node, TurnError> {
        self.chosen_row_mut()?
            .get_mut(id)
            .ok_or_else(|| TurnError::NotFound(id.clone()))
    }

    pub(crate) fn executed_mut(&mut self) -> &mut [Node] {
        match self.chosen {
            Some(id) => self.rows[id.0].nodes_mut(),
            None => &mut [],
        }
    }

    pub(crate) fn record_marks(&mut self, marks: &[FailMark]) {
        self.marks.extend_from_slice(marks);
    }

    /// Promote one reserve node into the chosen row as an extension.
    pub fn reclaim(&mut self, id: &NodeId) -> Result<&Node, TurnError> {
        self.ensure_active()?;
        if self.reclaims_used >= MAX_RECLAIMS_PER_TURN {
            return Err(TurnError::ReclaimExhausted);
        }
        let pos = self
            .reserve
            .iter()
            .position(|n| n.id() == id)
            .ok_or_else(|| TurnError::NotFound(id.clone()))?;

        let mut node = self.reserve.remove(pos);
        node.relabel(NodeKind::extension_for(node.origin()));
        self.reclaims_used += 1;
        self.reclaimed = Some(node.id().clone());
        debug!(node = %node.id(), kind = %node.kind(), "node reclaimed");

        let row = self.chosen_row_mut()?;
        row.push(node);
        Ok(&row.nodes()[row.len() - 1])
    }

    /// Append a freshly created emergence node to the chosen row.
    pub fn emerge(&mut self, content: impl Into<String>) -> Result<NodeId, TurnError> {
        self.ensure_active()?;
        let id = NodeId::new(format!(
            "c{}.t{}.e{}",
            self.cycle,
            self.index.number(),
            self.emerged
        ));
        let node = Node::new(id.clone(), NodeKind::Emergence, content);
        self.chosen_row_mut()?.push(node);
        self.emerged += 1;
        debug!(node = %id, "emergence node created");
        Ok(id)
    }

    /// Record a successful outcome: `open → bound`, payload stored.
    pub fn resolve(&mut self, id: &NodeId, payload: impl Into<String>) -> Result<(), TurnError> {
        let node = self.executed_node_mut(id)?;
        node.set_status(NodeStatus::Bound)
            .map_err(|source| TurnError::InvalidTransition {
                node: id.clone(),
                source,
            })?;
        node.set_content(payload);
        debug!(node = %id, "node bound");
        Ok(())
    }

    /// Record a failure reported by the caller.
    pub fn fail(&mut self, id: &NodeId, reason: &str) -> Result<(), TurnError> {
        let node = self.executed_node_mut(id)?;
        node.set_status(NodeStatus::Failed)
            .map_err(|source| TurnError::InvalidTransition {
                node: id.clone(),
                source,
            })?;
        let kind = node.kind();
        self.marks.push(FailMark {
            node: id.clone(),
            kind,
            reasons: vec![format!("reported: {reason}")],
        });
        debug!(node = %id, reason, "node failed by caller");
        Ok(())
    }

    /// Pause a node. It keeps its identity and payload and leaves the turn as
    /// dormant on completion.
    pub fn pause(&mut self, id: &NodeId) -> Result<(), TurnError> {
        let node = self.executed_node_mut(id)?;
        node.set_status(NodeStatus::Dormant)
            .map_err(|source| TurnError::InvalidTransition {
                node: id.clone(),
                source,
            })?;
        debug!(node = %id, "node paused");
        Ok(())
    }

    /// Explicitly carry the remaining reserve pool forward.
    pub fn carry_forward_reserve(&mut self) -> Result<usize, TurnError> {
        self.ensure_active()?;
        let n = self.reserve.len();
        self.carry_forward.append(&mut self.reserve);
        Ok(n)
    }

    // ── completion ───────────────────────────────────────────────────────────

    /// Natural completion. Requires every executed node to be resolved and
    /// the reserve pool to be empty or carried forward; then runs `marker`.
    pub fn complete(&mut self, marker: &FailMarker) -> Result<&[FailMark], TurnError> {
        self.ensure_active()?;
        let (unresolved, reserve) = self.pending();
        if unresolved > 0 || reserve > 0 {
            return Err(TurnError::Incomplete {
                unresolved,
                reserve,
            });
        }
        marker.scan(self);
        self.park_dormant();
        self.phase = TurnPhase::Complete;
        info!(
            cycle = self.cycle,
            turn = self.index.number(),
            failed = self.marks.len(),
            carried = self.carry_forward.len(),
            "turn complete"
        );
        Ok(&self.marks)
    }

    /// Abandon the turn. Never fails.
    ///
    /// Every non-terminal executed node becomes `failed`, and the reserve
    /// pool empties into `carry_forward`. Before selection every row is
    /// flattened first, so all planned nodes end up carried forward.
    pub fn force_end(&mut self, marker: &FailMarker) -> &[FailMark] {
        if self.phase == TurnPhase::Complete {
            return &self.marks;
        }
        if self.chosen.is_none() {
            for row in &mut self.rows {
                self.reserve.extend(row.flatten());
            }
        }

        marker.scan(self);
        let mut forced = Vec::new();
        for node in self.executed_mut() {
            if !node.is_terminal() && node.set_status(NodeStatus::Failed).is_ok() {
                forced.push(FailMark {
                    node: node.id().clone(),
                    kind: node.kind(),
                    reasons: vec!["force-ended".to_string()],
                });
            }
        }
        self.marks.extend(forced);
        self.carry_forward.append(&mut self.reserve);
        self.phase = TurnPhase::Complete;
        self.forced = true;
        warn!(
            cycle = self.cycle,
            turn = self.index.number(),
            failed = self.marks.len(),
            carried = self.carry_forward.len(),
            "turn force-ended"
        );
        &self.marks
    }

    fn park_dormant(&mut self) {
        if let Some(id) = self.chosen {
            let parked = self.rows[id.0].extract(|n| n.status() == NodeStatus::Dormant);
            self.dormant.extend(parked);
        }
    }

    pub(crate) fn take_carry_forward(&mut self) -> Vec<Node> {
        std::mem::take(&mut self.carry_forward)
    }

    pub(crate) fn take_dormant(&mut self) -> Vec<Node> {
        std::mem::take(&mut self.dormant)
    }

    /// ASCII rendering of all rows, one per line.
    pub fn render(&self) -> String {
        let mut lines = vec![format!("Turn {} (budget {})", self.index.number(), self.budget)];
        for row in &self.rows {
            let marker = if row.is_chosen() { "▶" } else { " " };
            lines.push(format!("  {marker} {}", row.render()));
        }
        if !self.reserve.is_empty() {
            lines.push(format!("    reserve: {}", self.reserve.len()));
        }
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row::NodeDraft;

    fn tools(n: usize) -> RowProposal {
        RowProposal::new((0..n).map(|i| NodeDraft::tool(format!("step {i}"))).collect())
    }

    fn first_turn() -> Turn {
        Turn::plan(1, TurnIndex::First, vec![tools(2), tools(1)], Vec::new()).unwrap()
    }

    fn ids(nodes: &[Node]) -> Vec<NodeId> {
        nodes.iter().map(|n| n.id().clone()).collect()
    }

    fn resolve_all(turn: &mut Turn) {
        for id in ids(turn.executed()) {
            turn.resolve(&id, "ok").unwrap();
        }
    }

    #[test]
    fn budget_is_three_k() {
        assert_eq!(TurnIndex::First.budget(), 3);
        assert_eq!(TurnIndex::Second.budget(), 6);
        assert_eq!(TurnIndex::Third.budget(), 9);
        assert_eq!(TurnIndex::Third.next(), None);
    }

    #[test]
    fn plan_below_budget_is_rejected() {
        let err = Turn::plan(1, TurnIndex::Second, vec![tools(3), tools(2)], Vec::new()).unwrap_err();
        assert_eq!(err, TurnError::BudgetViolation { required: 6, proposed: 5 });
    }

    #[test]
    fn plan_may_exceed_budget() {
        let turn = Turn::plan(1, TurnIndex::First, vec![tools(5)], Vec::new()).unwrap();
        assert_eq!(turn.planned(), 5);
    }

    #[test]
    fn row_claiming_more_slots_than_nodes_is_rejected() {
        let err =
            Turn::plan(1, TurnIndex::First, vec![tools(2).covering(3), tools(1)], Vec::new())
                .unwrap_err();
        assert!(matches!(err, TurnError::UndersizedRow { covers: 3, len: 2, .. }));
    }

    #[test]
    fn seeds_do_not_count_toward_budget() {
        let seed = Node::new(NodeId::from("old"), NodeKind::ToolCall, "left over");
        let err = Turn::plan(2, TurnIndex::First, vec![tools(2)], vec![seed]).unwrap_err();
        assert!(matches!(err, TurnError::BudgetViolation { proposed: 2, .. }));
    }

    #[test]
    fn seeds_form_a_trailing_row_with_original_ids() {
        let seed = Node::new(NodeId::from("old"), NodeKind::Collaboration, "left over");
        let turn = Turn::plan(2, TurnIndex::First, vec![tools(3)], vec![seed]).unwrap();
        let last = turn.rows().last().unwrap();
        assert!(last.is_seed());
        assert_eq!(last.nodes()[0].id().as_str(), "old");
        assert_eq!(turn.planned(), 4);
    }

    #[test]
    fn node_ids_encode_position() {
        let turn = first_turn();
        assert_eq!(turn.rows()[1].nodes()[0].id().as_str(), "c1.t1.r1.p0");
    }

    #[test]
    fn select_flattens_other_rows_into_reserve() {
        let mut turn = first_turn();
        turn.select(RowId(0)).unwrap();
        assert_eq!(turn.phase(), TurnPhase::Active);
        assert_eq!(turn.reserve().len(), 1);
        assert_eq!(turn.reserve()[0].kind(), NodeKind::UnchosenMarker);
        assert!(turn.rows()[1].is_empty());
        assert_eq!(turn.node_count(), turn.planned());
    }

    #[test]
    fn select_unknown_row_is_invalid() {
        let mut turn = first_turn();
        assert_eq!(turn.select(RowId(7)), Err(TurnError::InvalidSelection(RowId(7))));
        assert_eq!(turn.phase(), TurnPhase::Planning);
    }

    #[test]
    fn reselect_is_rejected() {
        let mut turn = first_turn();
        turn.select(RowId(0)).unwrap();
        assert_eq!(turn.select(RowId(1)), Err(TurnError::AlreadySelected(RowId(0))));
    }

    #[test]
    fn flatten_is_idempotent() {
        let mut turn = first_turn();
        turn.select(RowId(0)).unwrap();
        let before = turn.reserve().to_vec();
        assert_eq!(turn.flatten(RowId(1)).unwrap(), 0);
        assert_eq!(turn.reserve(), before.as_slice());
    }

    #[test]
    fn flatten_chosen_row_is_rejected() {
        let mut turn = first_turn();
        turn.select(RowId(0)).unwrap();
        assert!(turn.flatten(RowId(0)).is_err());
    }

    #[test]
    fn flatten_before_selection_is_rejected() {
        let mut turn = first_turn();
        assert_eq!(
            turn.flatten(RowId(1)),
            Err(TurnError::NotActive(TurnPhase::Planning))
        );
        assert!(turn.reserve().is_empty());
        turn.select(RowId(1)).unwrap();
        assert_eq!(turn.executed().len(), 1);
        assert_eq!(turn.executed()[0].kind(), NodeKind::ToolCall);
    }

    #[test]
    fn flat_row_cannot_be_selected() {
        let mut turn = first_turn();
        turn.rows[1].flatten();
        assert_eq!(turn.select(RowId(1)), Err(TurnError::InvalidSelection(RowId(1))));
        assert_eq!(turn.phase(), TurnPhase::Planning);
        assert_eq!(turn.chosen(), None);
    }

    #[test]
    fn select_with_input_folds_input_into_chosen_nodes() {
        let mut turn = Turn::plan(
            1,
            TurnIndex::First,
            vec![
                RowProposal::new(vec![NodeDraft::tool("grep logs"), NodeDraft::tool("")]),
                tools(1),
            ],
            Vec::new(),
        )
        .unwrap();
        turn.select_with_input(RowId(0), "  the build is red ").unwrap();
        let contents: Vec<&str> = turn.executed().iter().map(Node::content).collect();
        assert_eq!(contents, vec!["grep logs\n[user]: the build is red", "the build is red"]);
        assert_eq!(turn.reserve()[0].content(), "step 0");
    }

    #[test]
    fn select_with_blank_input_keeps_plans() {
        let mut turn = first_turn();
        turn.select_with_input(RowId(0), "   ").unwrap();
        assert_eq!(turn.executed()[0].content(), "step 0");
    }

    #[test]
    fn baseline_rows_fill_each_budget() {
        for index in [TurnIndex::First, TurnIndex::Second, TurnIndex::Third] {
            let rows = RowProposal::baseline(index);
            let total: usize = rows.iter().map(RowProposal::len).sum();
            assert_eq!(total, index.budget());
            assert!(Turn::validate(index, &rows).is_ok());
        }
        let first = RowProposal::baseline(TurnIndex::First);
        assert!(first.iter().flat_map(RowProposal::drafts).all(|d| d.kind == NodeKind::ToolCall));
        let second = RowProposal::baseline(TurnIndex::Second);
        let kinds: Vec<NodeKind> = second.iter().map(|r| r.drafts()[0].kind).collect();
        assert_eq!(
            kinds,
            vec![NodeKind::Collaboration, NodeKind::Collaboration, NodeKind::ToolCall]
        );
        assert!(second.iter().flat_map(RowProposal::drafts).all(|d| d.content.is_empty()));
    }

    #[test]
    fn paused_node_stays_dormant_for_the_rest_of_the_turn() {
        let mut turn = first_turn();
        turn.select(RowId(0)).unwrap();
        let id = turn.executed()[0].id().clone();
        turn.pause(&id).unwrap();
        assert!(matches!(
            turn.pause(&id),
            Err(TurnError::InvalidTransition { .. })
        ));
        assert!(matches!(
            turn.resolve(&id, "late"),
            Err(TurnError::InvalidTransition { .. })
        ));
        assert_eq!(turn.find(&id).unwrap().status(), NodeStatus::Dormant);
    }

    #[test]
    fn reclaim_moves_one_node_as_extension() {
        let mut turn = Turn::plan(
            1,
            TurnIndex::First,
            vec![tools(2), RowProposal::new(vec![NodeDraft::collab("a"), NodeDraft::tool("b")])],
            Vec::new(),
        )
        .unwrap();
        turn.select(RowId(0)).unwrap();
        let target = turn.reserve()[0].id().clone();
        let kind = turn.reclaim(&target).unwrap().kind();
        assert_eq!(kind, NodeKind::CollabExtension);
        assert_eq!(turn.executed().len(), 3);
        assert_eq!(turn.reclaimed(), Some(&target));
        assert_eq!(turn.node_count(), turn.planned());
    }

    #[test]
    fn second_reclaim_is_exhausted() {
        let mut turn = Turn::plan(1, TurnIndex::First, vec![tools(1), tools(2)], Vec::new()).unwrap();
        turn.select(RowId(0)).unwrap();
        let reserve = ids(turn.reserve());
        turn.reclaim(&reserve[0]).unwrap();
        assert_eq!(turn.reclaim(&reserve[1]).unwrap_err(), TurnError::ReclaimExhausted);
        assert_eq!(turn.reclaim(&reserve[0]).unwrap_err(), TurnError::ReclaimExhausted);
    }

    #[test]
    fn reclaim_unknown_node_is_not_found() {
        let mut turn = first_turn();
        turn.select(RowId(0)).unwrap();
        let err = turn.reclaim(&NodeId::from("ghost")).unwrap_err();
        assert!(matches!(err, TurnError::NotFound(_)));
        assert_eq!(turn.reclaims_used(), 0);
    }

    #[test]
    fn reclaim_before_selection_is_not_active() {
        let mut turn = first_turn();
        let err = turn.reclaim(&NodeId::from("c1.t1.r1.p0")).unwrap_err();
        assert_eq!(err, TurnError::NotActive(TurnPhase::Planning));
    }

    #[test]
    fn emergence_is_exempt_from_budget_and_counted() {
        let mut turn = first_turn();
        turn.select(RowId(0)).unwrap();
        let id = turn.emerge("new idea").unwrap();
        assert_eq!(id.as_str(), "c1.t1.e0");
        assert_eq!(turn.executed().last().unwrap().kind(), NodeKind::Emergence);
        assert_eq!(turn.node_count(), turn.planned() + turn.emerged());
    }

    #[test]
    fn reserve_nodes_cannot_be_resolved() {
        let mut turn = first_turn();
        turn.select(RowId(0)).unwrap();
        let reserve_id = turn.reserve()[0].id().clone();
        assert!(matches!(turn.resolve(&reserve_id, "x"), Err(TurnError::NotFound(_))));
    }

    #[test]
    fn resolve_twice_is_invalid_transition() {
        let mut turn = first_turn();
        turn.select(RowId(0)).unwrap();
        let id = turn.executed()[0].id().clone();
        turn.resolve(&id, "ok").unwrap();
        assert!(matches!(
            turn.resolve(&id, "again"),
            Err(TurnError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn complete_requires_resolution_and_cleared_reserve() {
        let mut turn = first_turn();
        turn.select(RowId(0)).unwrap();
        let marker = FailMarker::default();
        assert_eq!(
            turn.complete(&marker).unwrap_err(),
            TurnError::Incomplete { unresolved: 2, reserve: 1 }
        );
        resolve_all(&mut turn);
        assert_eq!(
            turn.complete(&marker).unwrap_err(),
            TurnError::Incomplete { unresolved: 0, reserve: 1 }
        );
        assert_eq!(turn.carry_forward_reserve().unwrap(), 1);
        assert!(turn.can_complete());
        turn.complete(&marker).unwrap();
        assert!(turn.is_complete());
    }

    #[test]
    fn scenario_two_rows_select_and_complete() {
        let mut turn = first_turn();
        let row_b = turn.rows()[1].nodes()[0].id().clone();
        turn.select(RowId(0)).unwrap();
        assert_eq!(ids(turn.reserve()), vec![row_b.clone()]);

        resolve_all(&mut turn);
        turn.carry_forward_reserve().unwrap();
        let marks = turn.complete(&FailMarker::default()).unwrap();
        assert!(marks.is_empty());
        assert_eq!(ids(turn.carry_forward()), vec![row_b]);
        assert_eq!(turn.node_count(), turn.planned());
    }

    #[test]
    fn complete_runs_fail_marker_over_dormant_nodes() {
        let mut turn = Turn::plan(1, TurnIndex::First, vec![tools(3)], Vec::new()).unwrap();
        turn.select(RowId(0)).unwrap();
        let nodes = ids(turn.executed());
        turn.resolve(&nodes[0], "ok").unwrap();
        turn.pause(&nodes[1]).unwrap();
        turn.resolve(&nodes[2], "ok").unwrap();
        turn.complete(&FailMarker::default()).unwrap();
        assert_eq!(turn.dormant().len(), 1);
        assert_eq!(turn.executed().len(), 2);
        assert_eq!(turn.node_count(), turn.planned());
    }

    #[test]
    fn dormant_node_with_empty_payload_fails_on_completion() {
        let mut turn = Turn::plan(
            1,
            TurnIndex::First,
            vec![RowProposal::new(vec![
                NodeDraft::tool(""),
                NodeDraft::tool("a"),
                NodeDraft::tool("b"),
            ])],
            Vec::new(),
        )
        .unwrap();
        turn.select(RowId(0)).unwrap();
        let nodes = ids(turn.executed());
        turn.pause(&nodes[0]).unwrap();
        turn.resolve(&nodes[1], "ok").unwrap();
        turn.resolve(&nodes[2], "ok").unwrap();
        let marks = turn.complete(&FailMarker::default()).unwrap().to_vec();
        assert_eq!(marks.len(), 1);
        assert!(turn.dormant().is_empty());
        assert_eq!(turn.find(&nodes[0]).unwrap().status(), NodeStatus::Failed);
    }

    #[test]
    fn scenario_force_end_fails_open_nodes() {
        let mut turn = Turn::plan(1, TurnIndex::First, vec![tools(4), tools(2)], Vec::new()).unwrap();
        turn.select(RowId(0)).unwrap();
        let marker = FailMarker::default();
        let marks = turn.force_end(&marker).to_vec();
        assert_eq!(marks.len(), 4);
        assert!(turn.executed().iter().all(|n| n.status() == NodeStatus::Failed));
        assert!(turn.reserve().is_empty());
        assert_eq!(turn.carry_forward().len(), 2);
        assert!(turn.is_forced());
    }

    #[test]
    fn force_end_fails_paused_nodes_too() {
        let mut turn = Turn::plan(1, TurnIndex::First, vec![tools(3)], Vec::new()).unwrap();
        turn.select(RowId(0)).unwrap();
        let first = turn.executed()[0].id().clone();
        turn.pause(&first).unwrap();
        turn.force_end(&FailMarker::default());
        assert!(turn.executed().iter().all(|n| n.status() == NodeStatus::Failed));
    }

    #[test]
    fn force_end_before_selection_carries_everything() {
        let mut turn = first_turn();
        turn.force_end(&FailMarker::default());
        assert_eq!(turn.carry_forward().len(), 3);
        assert!(turn.fail_marks().is_empty());
        assert_eq!(turn.select(RowId(0)).unwrap_err(), TurnError::NotActive(TurnPhase::Complete));
    }

    #[test]
    fn force_end_is_idempotent() {
        let mut turn = first_turn();
        turn.select(RowId(0)).unwrap();
        let marker = FailMarker::default();
        let first = turn.force_end(&marker).to_vec();
        let second = turn.force_end(&marker).to_vec();
        assert_eq!(first, second);
    }

    #[test]
    fn fail_marker_rescan_changes_nothing() {
        let mut turn = first_turn();
        turn.select(RowId(0)).unwrap();
        let marker = FailMarker::default();
        turn.force_end(&marker);
        let snapshot = turn.executed().to_vec();
        assert!(marker.scan(&mut turn).is_empty());
        assert_eq!(turn.executed(), snapshot.as_slice());
    }

    #[test]
    fn caller_reported_failure_is_recorded() {
        let mut turn = first_turn();
        turn.select(RowId(0)).unwrap();
        let id = turn.executed()[0].id().clone();
        turn.fail(&id, "tool crashed").unwrap();
        assert_eq!(turn.fail_marks()[0].reasons, vec!["reported: tool crashed".to_string()]);
    }

    #[test]
    fn render_marks_chosen_row() {
        let mut turn = first_turn();
        turn.select(RowId(0)).unwrap();
        let text = turn.render();
        assert!(text.contains("▶ ○───○"));
        assert!(text.contains("reserve: 1"));
    }
}
