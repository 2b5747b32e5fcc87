//! [`Cycle`] – three turns in sequence.
//!
//! Turns run strictly in order; the next turn may only begin once the
//! previous one is complete or force-ended. Reserve nodes carried forward by
//! turn 1 or 2 seed the following turn of the same cycle. Whatever turn 3
//! carries forward leaves the cycle through [`Cycle::close`], aged by one,
//! and seeds the next cycle's first turn.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::info;
use triad_types::{Node, NodeId, NodeKind, NodeStatus, PathStyle, RunRecord};
use uuid::Uuid;

use crate::row::RowProposal;
use crate::turn::{Turn, TurnError, TurnIndex};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CycleError {
    #[error("{0} is still in progress")]
    TurnInProgress(TurnIndex),
    #[error("Cycle already ran all three turns")]
    CycleFull,
    #[error("No turn has been started")]
    NoActiveTurn,
    #[error("Cycle cannot close before turn 3 completes")]
    NotFinished,
    #[error(transparent)]
    Turn(#[from] TurnError),
}

/// A running cycle.
#[derive(Debug, Clone)]
pub struct Cycle {
    id: Uuid,
    ordinal: u64,
    turns: Vec<Turn>,
    seeds: Vec<Node>,
    closed: bool,
}

impl Cycle {
    /// Start cycle number `ordinal`. `seeds` ride along with turn 1 outside
    /// its budget.
    pub fn new(ordinal: u64, seeds: Vec<Node>) -> Self {
        let id = Uuid::new_v4();
        info!(cycle = ordinal, %id, seeds = seeds.len(), "cycle started");
        Self {
            id,
            ordinal,
            turns: Vec::with_capacity(3),
            seeds,
            closed: false,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn ordinal(&self) -> u64 {
        self.ordinal
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// Seeds waiting for turn 1. Empty once turn 1 has been planned.
    pub fn seeds(&self) -> &[Node] {
        &self.seeds
    }

    /// The most recently begun turn.
    pub fn current(&self) -> Option<&Turn> {
        self.turns.last()
    }

    pub fn current_mut(&mut self) -> Result<&mut Turn, CycleError> {
        self.turns.last_mut().ok_or(CycleError::NoActiveTurn)
    }

    /// Index the next call to [`begin_turn`][Self::begin_turn] would plan.
    pub fn next_index(&self) -> Option<TurnIndex> {
        match self.turns.last() {
            None => Some(TurnIndex::First),
            Some(t) => t.index().next(),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.turns.len() == 3 && self.turns.iter().all(Turn::is_complete)
    }

    /// Plan the next turn.
    ///
    /// Seeds are only consumed once the proposals pass the budget check, so
    /// a rejected plan can be corrected and resubmitted.
    pub fn begin_turn(&mut self, proposals: Vec<RowProposal>) -> Result<&mut Turn, CycleError> {
        if let Some(last) = self.turns.last() {
            if !last.is_complete() {
                return Err(CycleError::TurnInProgress(last.index()));
            }
        }
        let index = self.next_index().ok_or(CycleError::CycleFull)?;
        Turn::validate(index, &proposals)?;

        let seeds = match self.turns.last_mut() {
            Some(prev) => prev.take_carry_forward(),
            None => std::mem::take(&mut self.seeds),
        };
        let turn = Turn::plan(self.ordinal, index, proposals, seeds)?;
        self.turns.push(turn);
        self.current_mut()
    }

    /// Close a finished cycle and tally it.
    ///
    /// Turn 3's carry-forward and every parked dormant node leave the cycle
    /// aged by one boundary.
    pub fn close(&mut self) -> Result<CycleSummary, CycleError> {
        if !self.is_finished() || self.closed {
            return Err(CycleError::NotFinished);
        }

        let mut summary = CycleSummary {
            cycle_id: self.id.to_string(),
            ordinal: self.ordinal,
            ..CycleSummary::default()
        };
        let mut path_kinds = Vec::new();
        for turn in &mut self.turns {
            summary.reclaims += u64::from(turn.reclaims_used());
            summary.emergence += turn.emerged() as u64;
            path_kinds.extend(turn.executed().iter().map(Node::kind));
            for node in turn.executed().iter().chain(turn.dormant()) {
                match node.status() {
                    NodeStatus::Bound => {
                        summary.bound += 1;
                        *summary.bound_by_kind.entry(node.origin()).or_insert(0) += 1;
                    }
                    NodeStatus::Failed => {
                        summary.failed += 1;
                        *summary.failed_by_kind.entry(node.origin()).or_insert(0) += 1;
                    }
                    _ => {}
                }
                if node.is_terminal() {
                    summary.resolved.push(node.id().clone());
                }
                if node.origin() == NodeKind::Emergence && node.status() != NodeStatus::Bound {
                    summary.unused_emergence += 1;
                    summary.unused_ideas.push(node.clone());
                }
            }
            summary
                .dormant
                .extend(turn.take_dormant().into_iter().map(Node::carried));
        }
        if let Some(last) = self.turns.last_mut() {
            summary.carry_forward = last
                .take_carry_forward()
                .into_iter()
                .map(Node::carried)
                .collect();
        }
        summary.style = PathStyle::dominant(path_kinds);
        self.closed = true;

        info!(
            cycle = self.ordinal,
            bound = summary.bound,
            failed = summary.failed,
            carried = summary.carry_forward.len(),
            dormant = summary.dormant.len(),
            "cycle closed"
        );
        Ok(summary)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// CycleSummary
// ─────────────────────────────────────────────────────────────────────────────

/// Tallies and leftovers of a closed cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleSummary {
    pub cycle_id: String,
    pub ordinal: u64,
    pub bound: u64,
    pub failed: u64,
    /// Failures keyed by the node's original kind.
    pub failed_by_kind: BTreeMap<NodeKind, u64>,
    pub bound_by_kind: BTreeMap<NodeKind, u64>,
    pub emergence: u64,
    pub unused_emergence: u64,
    pub reclaims: u64,
    /// Ids of executed nodes that ended bound or failed.
    pub resolved: Vec<NodeId>,
    /// Emergence nodes that did not bind.
    pub unused_ideas: Vec<Node>,
    pub style: Option<PathStyle>,
    pub carry_forward: Vec<Node>,
    pub dormant: Vec<Node>,
}

impl CycleSummary {
    pub fn to_record(&self, timestamp: DateTime<Utc>) -> RunRecord {
        RunRecord {
            cycle_id: self.cycle_id.clone(),
            timestamp,
            bound_count: self.bound,
            failed_count: self.failed,
            unused_emergence_count: self.unused_emergence,
            carry_forward_snapshot: self.carry_forward.iter().map(Node::snapshot).collect(),
            dormant_snapshot: self.dormant.iter().map(Node::snapshot).collect(),
            failed_by_kind: self.failed_by_kind.clone(),
            bound_by_kind: self.bound_by_kind.clone(),
            emergence_count: self.emergence,
            reclaims_used: self.reclaims,
            resolved_ids: self.resolved.clone(),
            dominant_style: self.style,
            unused_emergence: self.unused_ideas.iter().map(Node::snapshot).collect(),
        }
    }
}
