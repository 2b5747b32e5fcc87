//! [`FailMarker`] – post-turn failure scanner.
//!
//! Runs once when a turn completes (naturally or through `force_end`) over
//! the executed plan: the chosen row, which also holds reclaimed and
//! emergence nodes. Reserve-pool nodes are never inspected.
//!
//! A node is marked [`NodeStatus::Failed`] when, at scan time, any of the
//! enabled [`FailCriteria`] hold:
//!
//! * it is still `open` (never resolved),
//! * its payload is empty,
//! * its payload contains one of the configured error indicators
//!   (case-insensitive substring match).
//!
//! `bound` and `failed` nodes are skipped, so a second scan changes nothing.
//!
//! # Example
//!
//! ```rust
//! use triad_kernel::fail_marker::FailMarker;
//! use triad_types::{Node, NodeId, NodeKind, NodeStatus};
//!
//! let marker = FailMarker::default();
//! let mut nodes = vec![
//!     Node::new(NodeId::from("a"), NodeKind::ToolCall, "read config"),
//!     Node::new(NodeId::from("b"), NodeKind::ToolCall, "write patch"),
//! ];
//! nodes[1].set_status(NodeStatus::Bound).unwrap();
//!
//! let marks = marker.mark(&mut nodes);
//! assert_eq!(marks.len(), 1);
//! assert_eq!(nodes[0].status(), NodeStatus::Failed);
//! assert!(marker.mark(&mut nodes).is_empty());
//! ```

use serde::{Deserialize, Serialize};
use tracing::debug;
use triad_types::{Node, NodeId, NodeKind, NodeStatus};

use crate::turn::Turn;

/// Indicators that flag a payload as an error report.
pub const DEFAULT_ERROR_INDICATORS: [&str; 7] = [
    "error",
    "failed",
    "exception",
    "timeout",
    "not found",
    "permission denied",
    "abort",
];

// ─────────────────────────────────────────────────────────────────────────────
// FailCriteria
// ─────────────────────────────────────────────────────────────────────────────

/// What counts as a failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailCriteria {
    /// Fail nodes still `open` at scan time.
    pub check_unresolved: bool,
    /// Fail nodes whose payload is empty or whitespace.
    pub check_empty: bool,
    /// Fail nodes whose payload contains any of these (lowercased) strings.
    pub error_indicators: Vec<String>,
}

impl Default for FailCriteria {
    fn default() -> Self {
        Self {
            check_unresolved: true,
            check_empty: true,
            error_indicators: DEFAULT_ERROR_INDICATORS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl FailCriteria {
    pub fn with_indicators(indicators: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            error_indicators: indicators
                .into_iter()
                .map(|s| s.into().to_lowercase())
                .collect(),
            ..Self::default()
        }
    }
}

/// One node flagged by a scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailMark {
    pub node: NodeId,
    pub kind: NodeKind,
    pub reasons: Vec<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// FailMarker
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct FailMarker {
    criteria: FailCriteria,
}

impl FailMarker {
    pub fn new(criteria: FailCriteria) -> Self {
        Self { criteria }
    }

    pub fn criteria(&self) -> &FailCriteria {
        &self.criteria
    }

    /// Scan `nodes`, failing every node that meets a criterion.
    pub fn mark(&self, nodes: &mut [Node]) -> Vec<FailMark> {
        let mut marks = Vec::new();
        for node in nodes.iter_mut() {
            if matches!(node.status(), NodeStatus::Bound | NodeStatus::Failed) {
                continue;
            }
            let reasons = self.reasons(node);
            if reasons.is_empty() {
                continue;
            }
            // Only open and dormant nodes reach here; both may fail.
            if node.set_status(NodeStatus::Failed).is_ok() {
                debug!(node = %node.id(), ?reasons, "node marked failed");
                marks.push(FailMark {
                    node: node.id().clone(),
                    kind: node.kind(),
                    reasons,
                });
            }
        }
        marks
    }

    /// Scan the executed nodes of `turn` and record the marks on it.
    pub fn scan(&self, turn: &mut Turn) -> Vec<FailMark> {
        let marks = self.mark(turn.executed_mut());
        turn.record_marks(&marks);
        marks
    }

    fn reasons(&self, node: &Node) -> Vec<String> {
        let mut reasons = Vec::new();
        if self.criteria.check_unresolved && node.status() == NodeStatus::Open {
            reasons.push("never resolved".to_string());
        }
        let payload = node.content();
        if self.criteria.check_empty && payload.trim().is_empty() {
            reasons.push("empty payload".to_string());
        }
        let lowered = payload.to_lowercase();
        if let Some(kw) = self
            .criteria
            .error_indicators
            .iter()
            .find(|kw| !kw.is_empty() && lowered.contains(kw.as_str()))
        {
            reasons.push(format!("payload contains '{kw}'"));
        }
        reasons
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str, content: &str) -> Node {
        Node::new(NodeId::from(id), NodeKind::ToolCall, content)
    }

    fn bound(id: &str, content: &str) -> Node {
        let mut n = node(id, content);
        n.set_status(NodeStatus::Bound).unwrap();
        n
    }

    fn dormant(id: &str, content: &str) -> Node {
        let mut n = node(id, content);
        n.set_status(NodeStatus::Dormant).unwrap();
        n
    }

    #[test]
    fn open_node_is_marked_never_resolved() {
        let marker = FailMarker::default();
        let mut nodes = vec![node("a", "plan")];
        let marks = marker.mark(&mut nodes);
        assert_eq!(marks[0].reasons, vec!["never resolved".to_string()]);
        assert_eq!(nodes[0].status(), NodeStatus::Failed);
    }

    #[test]
    fn bound_node_is_never_reversed() {
        let marker = FailMarker::default();
        let mut nodes = vec![bound("a", "Error: disk full"), bound("b", "")];
        assert!(marker.mark(&mut nodes).is_empty());
        assert!(nodes.iter().all(|n| n.status() == NodeStatus::Bound));
    }

    #[test]
    fn dormant_with_empty_payload_fails() {
        let marker = FailMarker::default();
        let mut nodes = vec![dormant("a", "  ")];
        let marks = marker.mark(&mut nodes);
        assert_eq!(marks[0].reasons, vec!["empty payload".to_string()]);
    }

    #[test]
    fn dormant_with_error_payload_fails() {
        let marker = FailMarker::default();
        let mut nodes = vec![dormant("a", "Permission Denied on /etc")];
        let marks = marker.mark(&mut nodes);
        assert_eq!(marks[0].reasons, vec!["payload contains 'permission denied'".to_string()]);
    }

    #[test]
    fn healthy_dormant_node_survives() {
        let marker = FailMarker::default();
        let mut nodes = vec![dormant("a", "resume the migration later")];
        assert!(marker.mark(&mut nodes).is_empty());
        assert_eq!(nodes[0].status(), NodeStatus::Dormant);
    }

    #[test]
    fn open_node_collects_every_reason() {
        let marker = FailMarker::default();
        let mut nodes = vec![node("a", "")];
        let marks = marker.mark(&mut nodes);
        assert_eq!(marks[0].reasons.len(), 2);
    }

    #[test]
    fn marking_is_idempotent() {
        let marker = FailMarker::default();
        let mut nodes = vec![node("a", "x"), bound("b", "ok"), dormant("c", "")];
        let first = marker.mark(&mut nodes);
        let after_first = nodes.clone();
        let second = marker.mark(&mut nodes);
        assert_eq!(first.len(), 2);
        assert!(second.is_empty());
        assert_eq!(nodes, after_first);
    }

    #[test]
    fn disabled_criteria_are_ignored() {
        let marker = FailMarker::new(FailCriteria {
            check_unresolved: false,
            check_empty: false,
            error_indicators: vec![],
        });
        let mut nodes = vec![node("a", "")];
        assert!(marker.mark(&mut nodes).is_empty());
        assert_eq!(nodes[0].status(), NodeStatus::Open);
    }

    #[test]
    fn custom_indicators_are_lowercased() {
        let marker = FailMarker::new(FailCriteria::with_indicators(["PANIC"]));
        let mut nodes = vec![dormant("a", "thread panicked")];
        assert_eq!(marker.mark(&mut nodes).len(), 1);
    }
}
