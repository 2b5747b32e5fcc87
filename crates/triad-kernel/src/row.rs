//! Rows – candidate paths competing for selection within a turn.
//!
//! A [`RowProposal`] is what the caller hands in before the input is known;
//! the turn turns each proposal into a [`Row`] of freshly identified nodes.
//! Once a sibling row is chosen, a row is *flattened*: its nodes are relabelled
//! [`NodeKind::UnchosenMarker`] and handed to the turn's reserve pool.

use std::fmt;

use serde::{Deserialize, Serialize};
use triad_types::{Node, NodeId, NodeKind};

use crate::turn::TurnIndex;

/// Position of a row within its turn, in proposal order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RowId(pub usize);

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Proposals
// ─────────────────────────────────────────────────────────────────────────────

/// A node the caller wants planned, before it has an identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeDraft {
    pub kind: NodeKind,
    pub content: String,
}

impl NodeDraft {
    pub fn new(kind: NodeKind, content: impl Into<String>) -> Self {
        Self {
            kind,
            content: content.into(),
        }
    }

    pub fn tool(content: impl Into<String>) -> Self {
        Self::new(NodeKind::ToolCall, content)
    }

    pub fn collab(content: impl Into<String>) -> Self {
        Self::new(NodeKind::Collaboration, content)
    }
}

/// One pre-planned path.
///
/// `covers` is the number of baseline budget slots the row claims; by default
/// it equals the number of drafts. A row that claims more slots than it has
/// nodes is rejected when the turn is planned.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RowProposal {
    drafts: Vec<NodeDraft>,
    covers: usize,
}

impl RowProposal {
    pub fn new(drafts: Vec<NodeDraft>) -> Self {
        let covers = drafts.len();
        Self { drafts, covers }
    }

    /// Default empty rows for `index`: two rows for turn 1, three after.
    ///
    /// Turn 1 is all tool calls. Later turns open with a collaboration row,
    /// and a single-node row is a tool call.
    pub fn baseline(index: TurnIndex) -> Vec<RowProposal> {
        index
            .baseline_shape()
            .iter()
            .enumerate()
            .map(|(i, &len)| {
                let kind = match (index, i, len) {
                    (TurnIndex::First, _, _) => NodeKind::ToolCall,
                    (_, 0, _) => NodeKind::Collaboration,
                    (_, _, 1) => NodeKind::ToolCall,
                    _ => NodeKind::Collaboration,
                };
                RowProposal::new((0..len).map(|_| NodeDraft::new(kind, "")).collect())
            })
            .collect()
    }

    /// Claim `slots` baseline slots for this row.
    pub fn covering(mut self, slots: usize) -> Self {
        self.covers = slots;
        self
    }

    pub fn drafts(&self) -> &[NodeDraft] {
        &self.drafts
    }

    pub fn covers(&self) -> usize {
        self.covers
    }

    pub fn len(&self) -> usize {
        self.drafts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drafts.is_empty()
    }

    pub(crate) fn into_drafts(self) -> Vec<NodeDraft> {
        self.drafts
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Row
// ─────────────────────────────────────────────────────────────────────────────

/// An ordered sequence of nodes owned by exactly one turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    id: RowId,
    nodes: Vec<Node>,
    chosen: bool,
    flattened: bool,
    seed: bool,
}

impl Row {
    pub(crate) fn new(id: RowId, nodes: Vec<Node>, seed: bool) -> Self {
        Self {
            id,
            nodes,
            chosen: false,
            flattened: false,
            seed,
        }
    }

    pub fn id(&self) -> RowId {
        self.id
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn is_chosen(&self) -> bool {
        self.chosen
    }

    pub fn is_flat(&self) -> bool {
        self.flattened
    }

    /// Whether this row holds carried-over seeds rather than budgeted nodes.
    pub fn is_seed(&self) -> bool {
        self.seed
    }

    pub fn get(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id() == id)
    }

    pub(crate) fn get_mut(&mut self, id: &NodeId) -> Option<&mut Node> {
        self.nodes.iter_mut().find(|n| n.id() == id)
    }

    pub(crate) fn nodes_mut(&mut self) -> &mut [Node] {
        &mut self.nodes
    }

    pub(crate) fn mark_chosen(&mut self) {
        self.chosen = true;
    }

    pub(crate) fn push(&mut self, node: Node) {
        self.nodes.push(node);
    }

    /// Remove every node for which `pred` holds, preserving order.
    pub(crate) fn extract(&mut self, pred: impl Fn(&Node) -> bool) -> Vec<Node> {
        let (taken, kept): (Vec<Node>, Vec<Node>) =
            std::mem::take(&mut self.nodes).into_iter().partition(|n| pred(n));
        self.nodes = kept;
        taken
    }

    /// Hand every node over as an unchosen marker, in row order.
    ///
    /// A row that is already flat yields nothing.
    pub(crate) fn flatten(&mut self) -> Vec<Node> {
        if self.flattened {
            return Vec::new();
        }
        self.flattened = true;
        let mut nodes = std::mem::take(&mut self.nodes);
        for node in &mut nodes {
            node.relabel(NodeKind::UnchosenMarker);
        }
        nodes
    }

    /// ASCII rendering: glyphs joined by rails, or a bare rail once flat.
    pub fn render(&self) -> String {
        if self.flattened {
            return "─".repeat(3);
        }
        self.nodes
            .iter()
            .map(|n| n.kind().glyph().to_string())
            .collect::<Vec<_>>()
            .join("───")
    }
}
