//! Collaborator seams.
//!
//! The scheduler consumes three outside services through these traits and
//! never looks behind them:
//!
//! - [`ContextClassifier`] turns the incoming input into a [`TaskProfile`],
//!   which the boot scorer uses as its relevance signal.
//! - [`ContentStore`] is an opaque key → content store backing node payloads.
//!   Its eviction policy is its own business.
//! - [`TagIndex`] annotates freshly created emergence nodes. Annotation is
//!   purely additive; the state machine never reads tags back.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use triad_memory::boot_scorer::{KeywordRelevance, Relevance};
use triad_types::{Node, NodeId, SnapshotNode};

// ─────────────────────────────────────────────────────────────────────────────
// Context classifier
// ─────────────────────────────────────────────────────────────────────────────

/// What a classifier concluded about the incoming input.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskProfile {
    pub category: String,
    /// Emphasis per processing layer, `0.0..=1.0`. Carried through untouched.
    pub layer_weights: BTreeMap<String, f64>,
    /// Terms matched against historical node content.
    pub keywords: Vec<String>,
}

impl Relevance for TaskProfile {
    fn relevance(&self, node: &SnapshotNode) -> f64 {
        KeywordRelevance::new(&self.keywords).relevance(node)
    }
}

pub trait ContextClassifier {
    fn classify(&self, input: &str) -> TaskProfile;
}

// ─────────────────────────────────────────────────────────────────────────────
// Content store
// ─────────────────────────────────────────────────────────────────────────────

pub trait ContentStore {
    fn get(&self, key: &NodeId) -> Option<String>;
    fn put(&mut self, key: NodeId, content: String);
    /// Drop `key`, returning what was stored.
    fn evict(&mut self, key: &NodeId) -> Option<String>;
}

/// Unbounded in-process [`ContentStore`].
#[derive(Debug, Clone, Default)]
pub struct MemoryContentStore {
    entries: HashMap<NodeId, String>,
}

impl MemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ContentStore for MemoryContentStore {
    fn get(&self, key: &NodeId) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn put(&mut self, key: NodeId, content: String) {
        self.entries.insert(key, content);
    }

    fn evict(&mut self, key: &NodeId) -> Option<String> {
        self.entries.remove(key)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tag index
// ─────────────────────────────────────────────────────────────────────────────

pub trait TagIndex {
    /// Record descriptive tags for `node` and return them.
    fn annotate(&mut self, node: &Node) -> Vec<String>;
}
