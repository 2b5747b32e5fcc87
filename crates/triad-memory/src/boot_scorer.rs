//! Boot Scorer – cold vs. context boot.
//!
//! Before a cycle starts, the scorer looks at the nodes that recent cycles
//! left behind (carried-forward reserve and parked dormant nodes) and scores
//! each one:
//!
//! ```text
//! score = w_recency   · recency(age)
//!       + w_relevance · relevance(node, context)
//!       - w_fail      · fail_rate(kind)
//! ```
//!
//! `recency(a) = 1 / (1 + a)` where `a` is the node's age in cycles,
//! `relevance` is supplied by the caller through [`Relevance`] and clamped to
//! `[0, 1]`, and `fail_rate` is the failed share of resolved nodes of that
//! kind over the same `window` records, also in `[0, 1]`. If no candidate
//! reaches the threshold the decision is a cold boot; otherwise the `top_k`
//! best candidates become seeds.
//!
//! A node that a newer record lists in `resolved_ids` is no longer a
//! candidate, even if an older record still carries it.
//!
//! A context boot also suggests a [`PathStyle`] for the first turn and lists
//! recent unbound emergence nodes as ideas. Ideas are advisory; they are
//! never planted.
//!
//! Scoring reads a [`RunLogSnapshot`] and mutates nothing, so the same
//! snapshot and context always produce the same decision.
//!
//! # Example
//!
//! ```rust
//! use triad_memory::boot_scorer::{BootMode, BootScorer, NoRelevance};
//! use triad_memory::run_log::RunLog;
//!
//! let log = RunLog::new();
//! let decision = BootScorer::default().decide(&log.snapshot(), &NoRelevance);
//! assert_eq!(decision.mode, BootMode::Cold);
//! ```

use std::cmp::Ordering;
use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};
use triad_types::{Node, NodeId, NodeKind, PathStyle, SnapshotNode};

use crate::run_log::RunLogSnapshot;

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BootConfigError {
    #[error("Weight {name} must be non-negative and finite, got {value}")]
    InvalidWeight { name: &'static str, value: f64 },
    #[error("Threshold must be finite, got {0}")]
    InvalidThreshold(f64),
    #[error("{name} must be at least 1, got {value}")]
    InvalidLimit { name: &'static str, value: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BootWeights {
    pub w_recency: f64,
    pub w_relevance: f64,
    pub w_fail: f64,
}

impl Default for BootWeights {
    fn default() -> Self {
        Self {
            w_recency: 1.0,
            w_relevance: 2.0,
            w_fail: 1.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BootConfig {
    pub weights: BootWeights,
    /// Minimum best score for a context boot.
    pub threshold: f64,
    /// Maximum number of seeds returned by a context boot.
    pub top_k: usize,
    /// Number of most recent records consulted for candidates.
    pub window: usize,
}

impl Default for BootConfig {
    fn default() -> Self {
        Self {
            weights: BootWeights::default(),
            threshold: 0.3,
            top_k: 5,
            window: 10,
        }
    }
}

impl BootConfig {
    /// Reject negative or non-finite weights, a non-finite threshold and
    /// zero `top_k` or `window`.
    pub fn validate(&self) -> Result<(), BootConfigError> {
        let w = &self.weights;
        for (name, value) in [
            ("w_recency", w.w_recency),
            ("w_relevance", w.w_relevance),
            ("w_fail", w.w_fail),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(BootConfigError::InvalidWeight { name, value });
            }
        }
        if !self.threshold.is_finite() {
            return Err(BootConfigError::InvalidThreshold(self.threshold));
        }
        for (name, value) in [("top_k", self.top_k), ("window", self.window)] {
            if value == 0 {
                return Err(BootConfigError::InvalidLimit { name, value });
            }
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Relevance
// ─────────────────────────────────────────────────────────────────────────────

/// Caller-supplied relevance of a historical node to the incoming context.
///
/// Values outside `[0, 1]` are clamped by the scorer; `NaN` counts as `0`.
pub trait Relevance {
    fn relevance(&self, node: &SnapshotNode) -> f64;
}

impl<T: Relevance + ?Sized> Relevance for &T {
    fn relevance(&self, node: &SnapshotNode) -> f64 {
        (**self).relevance(node)
    }
}

/// No context available; every node is equally irrelevant.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRelevance;

impl Relevance for NoRelevance {
    fn relevance(&self, _node: &SnapshotNode) -> f64 {
        0.0
    }
}

/// Share of context terms that appear in the node's content.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeywordRelevance {
    terms: Vec<String>,
}

impl KeywordRelevance {
    /// Terms are the lowercased alphanumeric words of `text` with at least
    /// three characters, deduplicated.
    pub fn from_text(text: &str) -> Self {
        Self::new(
            text.split(|c: char| !c.is_alphanumeric())
                .filter(|w| w.chars().count() >= 3),
        )
    }

    pub fn new(terms: impl IntoIterator<Item = impl AsRef<str>>) -> Self {
        let mut seen = HashSet::new();
        let terms = terms
            .into_iter()
            .map(|t| t.as_ref().to_lowercase())
            .filter(|t| !t.is_empty() && seen.insert(t.clone()))
            .collect();
        Self { terms }
    }

    pub fn terms(&self) -> &[String] {
        &self.terms
    }
}

impl Relevance for KeywordRelevance {
    fn relevance(&self, node: &SnapshotNode) -> f64 {
        if self.terms.is_empty() {
            return 0.0;
        }
        let content = node.content.to_lowercase();
        let hits = self
            .terms
            .iter()
            .filter(|t| content.contains(t.as_str()))
            .count();
        hits as f64 / self.terms.len() as f64
    }
}

pub fn recency(age: u32) -> f64 {
    1.0 / (1.0 + f64::from(age))
}

// ─────────────────────────────────────────────────────────────────────────────
// Decision
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BootMode {
    /// Turn 1 starts without seeds.
    Cold,
    /// Turn 1 is seeded with the decision's top candidates.
    Context,
}

/// Where a candidate was found in its record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SeedSource {
    CarryForward,
    Dormant,
}

/// `Hot` seeds clear twice the threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SeedTier {
    Hot,
    Warm,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredSeed {
    /// Snapshot with `age` already advanced to the current cycle.
    pub node: SnapshotNode,
    pub source: SeedSource,
    /// Record the candidate was taken from.
    pub cycle_id: String,
    pub recency: f64,
    pub relevance: f64,
    pub fail_rate: f64,
    pub score: f64,
    pub tier: SeedTier,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BootDecision {
    pub mode: BootMode,
    /// Empty for a cold boot.
    pub seeds: Vec<ScoredSeed>,
    pub top_score: Option<f64>,
    pub reason: String,
    /// [`RunLogSnapshot::version`] the decision was computed against.
    pub log_version: u64,
    /// Path style to lean towards in turn 1. Always `tool` on a cold boot.
    pub suggested_style: PathStyle,
    /// Unbound emergence nodes from recent cycles, newest first.
    pub ideas: Vec<SnapshotNode>,
}

impl BootDecision {
    pub fn is_cold(&self) -> bool {
        self.mode == BootMode::Cold
    }

    /// Seeds as open nodes, ready to plant in turn 1.
    pub fn seed_nodes(&self) -> Vec<Node> {
        self.seeds.iter().map(|s| s.node.to_node()).collect()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// BootScorer
// ─────────────────────────────────────────────────────────────────────────────

struct Candidate {
    node: SnapshotNode,
    source: SeedSource,
    cycle_id: String,
}

#[derive(Debug, Clone, Default)]
pub struct BootScorer {
    config: BootConfig,
}

impl BootScorer {
    pub fn new(config: BootConfig) -> Result<Self, BootConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &BootConfig {
        &self.config
    }

    /// Weighted score from its three inputs.
    pub fn score(&self, recency: f64, relevance: f64, fail_rate: f64) -> f64 {
        let w = &self.config.weights;
        w.w_recency * recency + w.w_relevance * relevance - w.w_fail * fail_rate
    }

    /// Decide how the next cycle boots.
    pub fn decide(&self, snapshot: &RunLogSnapshot, context: &dyn Relevance) -> BootDecision {
        let version = snapshot.version();
        if snapshot.is_empty() {
            return self.cold("no prior runs".into(), None, version);
        }

        let candidates = self.candidates(snapshot);
        if candidates.is_empty() {
            return self.cold("no carried or dormant nodes in recent runs".into(), None, version);
        }

        let threshold = self.config.threshold;
        let mut scored: Vec<ScoredSeed> = candidates
            .into_iter()
            .map(|c| {
                let recency = recency(c.node.age);
                let relevance = clamp_unit(context.relevance(&c.node));
                let fail_rate = snapshot.failure_rate(c.node.kind, self.config.window);
                let score = self.score(recency, relevance, fail_rate);
                let tier = if score >= threshold * 2.0 {
                    SeedTier::Hot
                } else {
                    SeedTier::Warm
                };
                debug!(node = %c.node.id, score, recency, relevance, fail_rate, "boot candidate scored");
                ScoredSeed {
                    node: c.node,
                    source: c.source,
                    cycle_id: c.cycle_id,
                    recency,
                    relevance,
                    fail_rate,
                    score,
                    tier,
                }
            })
            .collect();
        scored.sort_by(|a, b| match b.score.total_cmp(&a.score) {
            Ordering::Equal => a.node.id.as_str().cmp(b.node.id.as_str()),
            other => other,
        });

        let top = scored[0].score;
        if top < threshold {
            let unpenalised = scored
                .iter()
                .any(|s| self.score(s.recency, s.relevance, 0.0) >= threshold);
            if unpenalised {
                warn!(top, threshold, "cold boot forced by failure penalties");
            }
            return self.cold(
                format!("top score {top:.2} below threshold {threshold:.2}"),
                Some(top),
                version,
            );
        }

        scored.truncate(self.config.top_k);
        let hot = scored.iter().filter(|s| s.tier == SeedTier::Hot).count();
        let reason = format!(
            "context boot: {} seed(s), {hot} hot, top score {top:.2}",
            scored.len()
        );
        let suggested_style = snapshot
            .dominant_style(self.config.window)
            .unwrap_or(PathStyle::Tool);
        let ideas: Vec<SnapshotNode> = snapshot
            .recent(self.config.window)
            .flat_map(|r| r.unused_emergence.iter().cloned())
            .take(self.config.top_k)
            .collect();
        info!(seeds = scored.len(), hot, top, version, style = %suggested_style, ideas = ideas.len(), "context boot");
        BootDecision {
            mode: BootMode::Context,
            seeds: scored,
            top_score: Some(top),
            reason,
            log_version: version,
            suggested_style,
            ideas,
        }
    }

    /// Carry-forward and dormant nodes of the `window` most recent records,
    /// deduplicated by id with the most recent occurrence kept. Ids resolved
    /// by a newer record are skipped. Ages are advanced by the number of
    /// records appended since.
    fn candidates(&self, snapshot: &RunLogSnapshot) -> Vec<Candidate> {
        let mut seen: HashSet<NodeId> = HashSet::new();
        let mut out = Vec::new();
        for (since, record) in snapshot.recent(self.config.window).enumerate() {
            let since = u32::try_from(since).unwrap_or(u32::MAX);
            let nodes = record
                .carry_forward_snapshot
                .iter()
                .map(|n| (n, SeedSource::CarryForward))
                .chain(record.dormant_snapshot.iter().map(|n| (n, SeedSource::Dormant)));
            for (node, source) in nodes {
                if !seen.insert(node.id.clone()) {
                    continue;
                }
                let mut node = node.clone();
                node.age = node.age.saturating_add(since);
                out.push(Candidate {
                    node,
                    source,
                    cycle_id: record.cycle_id.clone(),
                });
            }
            seen.extend(record.resolved_ids.iter().cloned());
        }
        out
    }

    fn cold(&self, reason: String, top_score: Option<f64>, log_version: u64) -> BootDecision {
        info!(%reason, "cold boot");
        BootDecision {
            mode: BootMode::Cold,
            seeds: Vec::new(),
            top_score,
            reason: format!("cold boot: {reason}"),
            log_version,
            suggested_style: PathStyle::Tool,
            ideas: Vec::new(),
        }
    }
}

fn clamp_unit(v: f64) -> f64 {
    if v.is_nan() { 0.0 } else { v.clamp(0.0, 1.0) }
}

/// Most frequent failing kind in `snapshot`, if any has failed.
pub fn riskiest_kind(snapshot: &RunLogSnapshot) -> Option<NodeKind> {
    snapshot
        .tally()
        .failed_by_kind
        .iter()
        .filter(|(_, n)| **n > 0)
        .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
        .map(|(k, _)| *k)
}
