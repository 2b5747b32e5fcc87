//! [`Scheduler`] – the glue loop.
//!
//! Owns the running [`Cycle`], the [`FailMarker`], the [`RunLog`] and, when a
//! persistence path is configured, the [`RunStore`]. Callers drive it one
//! operation at a time:
//!
//! 1. **Boot** – [`Scheduler::boot`] scores the run log against the incoming
//!    input and starts a cycle that is either cold or seeded.
//! 2. **Plan / select** – [`begin_turn`][Scheduler::begin_turn] and
//!    [`select`][Scheduler::select].
//! 3. **Execute** – `resolve`, `fail`, `pause`, `reclaim`, `emerge`.
//! 4. **Finish** – [`end_turn`][Scheduler::end_turn] or
//!    [`force_end`][Scheduler::force_end]. Finishing turn 3 closes the cycle,
//!    appends its [`RunRecord`] to the log (and the store), and starts the
//!    next cycle seeded with the carry-forward.
//!
//! # Example
//!
//! ```rust
//! use triad_kernel::{NodeDraft, RowId, RowProposal};
//! use triad_runtime::scheduler::{Scheduler, SchedulerConfig};
//!
//! let mut scheduler = Scheduler::new(SchedulerConfig::default()).unwrap();
//! assert!(scheduler.boot("fix the login bug").unwrap().is_cold());
//!
//! scheduler
//!     .begin_turn(vec![RowProposal::new(vec![
//!         NodeDraft::tool("grep for login"),
//!         NodeDraft::tool("read handler"),
//!         NodeDraft::collab("confirm repro steps"),
//!     ])])
//!     .unwrap();
//! scheduler.select(RowId(0)).unwrap();
//! let outcome = scheduler.force_end().unwrap();
//! assert_eq!(outcome.marks.len(), 3);
//! ```

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};
use triad_kernel::{
    Cycle, CycleError, DEFAULT_ERROR_INDICATORS, FailCriteria, FailMark, FailMarker, RowId,
    RowProposal, Turn, TurnError, TurnIndex,
};
use triad_memory::{
    BootConfig, BootConfigError, BootDecision, BootScorer, KeywordRelevance, RunLog, RunLogError,
    RunStore, RunStoreError,
};
use triad_types::{Node, NodeId, RunRecord};

use crate::collab::{ContentStore, ContextClassifier, TagIndex};

// ─────────────────────────────────────────────────────────────────────────────
// Error type
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error(transparent)]
    Turn(#[from] TurnError),
    #[error(transparent)]
    Cycle(#[from] CycleError),
    #[error(transparent)]
    RunLog(#[from] RunLogError),
    #[error(transparent)]
    Store(#[from] RunStoreError),
    #[error(transparent)]
    BootConfig(#[from] BootConfigError),
    #[error("Cycle {0} already has turns in progress; boot before planning")]
    CycleInProgress(u64),
}

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub boot: BootConfig,
    /// Case-insensitive substrings that flag a payload as an error report.
    pub error_indicators: Vec<String>,
    /// SQLite file for run history. `None` keeps history in memory only.
    pub persistence_path: Option<String>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            boot: BootConfig::default(),
            error_indicators: DEFAULT_ERROR_INDICATORS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            persistence_path: None,
        }
    }
}

/// What finishing a turn produced.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnOutcome {
    pub cycle: u64,
    pub index: TurnIndex,
    pub marks: Vec<FailMark>,
    pub forced: bool,
    /// Present when the turn closed its cycle.
    pub record: Option<RunRecord>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Scheduler
// ─────────────────────────────────────────────────────────────────────────────

pub struct Scheduler {
    marker: FailMarker,
    scorer: BootScorer,
    log: RunLog,
    store: Option<RunStore>,
    cycle: Option<Cycle>,
    next_ordinal: u64,
    last_boot: Option<BootDecision>,
    classifier: Option<Box<dyn ContextClassifier>>,
    content: Option<Box<dyn ContentStore>>,
    tags: Option<Box<dyn TagIndex>>,
}

impl Scheduler {
    /// Build a scheduler, reloading run history from `persistence_path` when
    /// one is configured.
    pub fn new(config: SchedulerConfig) -> Result<Self, SchedulerError> {
        let store = match &config.persistence_path {
            Some(path) => {
                info!("opening run store at: {}", path);
                Some(RunStore::open(path)?)
            }
            None => {
                warn!("no persistence_path configured; run history is kept in memory only");
                None
            }
        };
        let log = match &store {
            Some(s) => s.load_log()?,
            None => RunLog::new(),
        };
        let mut scheduler = Self::with_log(config, log)?;
        scheduler.store = store;
        Ok(scheduler)
    }

    /// Build a scheduler over an existing log, without persistence.
    pub fn with_log(config: SchedulerConfig, log: RunLog) -> Result<Self, SchedulerError> {
        let scorer = BootScorer::new(config.boot)?;
        let marker = FailMarker::new(FailCriteria::with_indicators(config.error_indicators));
        let next_ordinal = log.version() + 1;
        info!(runs = log.len(), next_cycle = next_ordinal, "scheduler ready");
        Ok(Self {
            marker,
            scorer,
            log,
            store: None,
            cycle: None,
            next_ordinal,
            last_boot: None,
            classifier: None,
            content: None,
            tags: None,
        })
    }

    /// Persist closed cycles to `store` from now on.
    pub fn with_store(mut self, store: RunStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_classifier(mut self, classifier: Box<dyn ContextClassifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    pub fn with_content_store(mut self, content: Box<dyn ContentStore>) -> Self {
        self.content = Some(content);
        self
    }

    pub fn with_tag_index(mut self, tags: Box<dyn TagIndex>) -> Self {
        self.tags = Some(tags);
        self
    }

    // ── accessors ────────────────────────────────────────────────────────────

    pub fn log(&self) -> &RunLog {
        &self.log
    }

    pub fn cycle(&self) -> Option<&Cycle> {
        self.cycle.as_ref()
    }

    pub fn current_turn(&self) -> Option<&Turn> {
        self.cycle.as_ref().and_then(Cycle::current)
    }

    pub fn last_boot(&self) -> Option<&BootDecision> {
        self.last_boot.as_ref()
    }

    pub fn content_store(&self) -> Option<&dyn ContentStore> {
        self.content.as_deref()
    }

    pub fn fail_marker(&self) -> &FailMarker {
        &self.marker
    }

    // ── boot ─────────────────────────────────────────────────────────────────

    /// Score the run log against `input` and start a fresh cycle.
    ///
    /// Only allowed before the pending cycle has planned any turn; a cycle
    /// opened automatically after the previous one closed is replaced.
    pub fn boot(&mut self, input: &str) -> Result<&BootDecision, SchedulerError> {
        let pending = self
            .cycle
            .as_ref()
            .map(|c| (c.ordinal(), c.turns().is_empty()));
        let ordinal = match pending {
            Some((n, false)) => return Err(SchedulerError::CycleInProgress(n)),
            Some((n, true)) => n,
            None => self.take_ordinal(),
        };

        let snapshot = self.log.snapshot();
        let decision = match &self.classifier {
            Some(classifier) => {
                let profile = classifier.classify(input);
                debug!(category = %profile.category, "input classified");
                self.scorer.decide(&snapshot, &profile)
            }
            None => self
                .scorer
                .decide(&snapshot, &KeywordRelevance::from_text(input)),
        };
        info!(cycle = ordinal, mode = ?decision.mode, reason = %decision.reason, "boot decided");

        self.cycle = Some(Cycle::new(ordinal, decision.seed_nodes()));
        Ok(self.last_boot.insert(decision))
    }

    fn take_ordinal(&mut self) -> u64 {
        let n = self.next_ordinal;
        self.next_ordinal += 1;
        n
    }

    // ── turn operations ──────────────────────────────────────────────────────

    /// Plan the next turn, starting a cold cycle if none is running.
    pub fn begin_turn(&mut self, proposals: Vec<RowProposal>) -> Result<&Turn, SchedulerError> {
        if self.cycle.is_none() {
            let ordinal = self.take_ordinal();
            self.cycle = Some(Cycle::new(ordinal, Vec::new()));
        }
        let cycle = Self::running(&mut self.cycle)?;
        let turn = cycle.begin_turn(proposals)?;
        Ok(turn)
    }

    /// Plan the next turn from the default row shapes for its position.
    pub fn begin_baseline_turn(&mut self) -> Result<&Turn, SchedulerError> {
        let index = match &self.cycle {
            None => TurnIndex::First,
            Some(cycle) => cycle.next_index().unwrap_or(TurnIndex::Third),
        };
        self.begin_turn(RowProposal::baseline(index))
    }

    pub fn select(&mut self, row: RowId) -> Result<(), SchedulerError> {
        Ok(Self::turn(&mut self.cycle)?.select(row)?)
    }

    /// Select `row` and fold the user's `input` into its nodes.
    pub fn select_with_input(&mut self, row: RowId, input: &str) -> Result<(), SchedulerError> {
        Ok(Self::turn(&mut self.cycle)?.select_with_input(row, input)?)
    }

    pub fn reclaim(&mut self, id: &NodeId) -> Result<Node, SchedulerError> {
        Ok(Self::turn(&mut self.cycle)?.reclaim(id)?.clone())
    }

    /// Append an emergence node and hand it to the tag index.
    pub fn emerge(&mut self, content: impl Into<String>) -> Result<NodeId, SchedulerError> {
        let turn = Self::turn(&mut self.cycle)?;
        let id = turn.emerge(content)?;
        if let (Some(tags), Some(node)) = (self.tags.as_mut(), turn.find(&id)) {
            let annotated = tags.annotate(node);
            debug!(node = %id, tags = ?annotated, "emergence node annotated");
        }
        Ok(id)
    }

    /// Bind a node and hand its payload to the content store.
    pub fn resolve(&mut self, id: &NodeId, payload: impl Into<String>) -> Result<(), SchedulerError> {
        let payload = payload.into();
        Self::turn(&mut self.cycle)?.resolve(id, payload.clone())?;
        if let Some(content) = self.content.as_mut() {
            content.put(id.clone(), payload);
        }
        Ok(())
    }

    pub fn fail(&mut self, id: &NodeId, reason: &str) -> Result<(), SchedulerError> {
        Ok(Self::turn(&mut self.cycle)?.fail(id, reason)?)
    }

    pub fn pause(&mut self, id: &NodeId) -> Result<(), SchedulerError> {
        Ok(Self::turn(&mut self.cycle)?.pause(id)?)
    }

    pub fn carry_forward_reserve(&mut self) -> Result<usize, SchedulerError> {
        Ok(Self::turn(&mut self.cycle)?.carry_forward_reserve()?)
    }

    /// Complete the current turn naturally.
    pub fn end_turn(&mut self) -> Result<TurnOutcome, SchedulerError> {
        let turn = Self::turn(&mut self.cycle)?;
        let marks = turn.complete(&self.marker)?.to_vec();
        self.finish_turn(marks, false)
    }

    /// Abandon the current turn. Fails only when there is no turn to end.
    pub fn force_end(&mut self) -> Result<TurnOutcome, SchedulerError> {
        let turn = Self::turn(&mut self.cycle)?;
        if turn.is_complete() {
            return Err(CycleError::NoActiveTurn.into());
        }
        let marks = turn.force_end(&self.marker).to_vec();
        self.finish_turn(marks, true)
    }

    /// Whether a turn has been planned and not yet finished.
    pub fn has_open_turn(&self) -> bool {
        self.current_turn().is_some_and(|t| !t.is_complete())
    }

    fn running(cycle: &mut Option<Cycle>) -> Result<&mut Cycle, SchedulerError> {
        cycle
            .as_mut()
            .ok_or(SchedulerError::Cycle(CycleError::NoActiveTurn))
    }

    fn turn(cycle: &mut Option<Cycle>) -> Result<&mut Turn, SchedulerError> {
        Ok(Self::running(cycle)?.current_mut()?)
    }

    fn finish_turn(&mut self, marks: Vec<FailMark>, forced: bool) -> Result<TurnOutcome, SchedulerError> {
        if let Some(content) = self.content.as_mut() {
            for mark in &marks {
                content.evict(&mark.node);
            }
        }

        let cycle = Self::running(&mut self.cycle)?;
        let ordinal = cycle.ordinal();
        let index = cycle
            .current()
            .map(Turn::index)
            .ok_or(CycleError::NoActiveTurn)?;

        let record = if cycle.is_finished() {
            Some(self.roll_over()?)
        } else {
            None
        };

        Ok(TurnOutcome {
            cycle: ordinal,
            index,
            marks,
            forced,
            record,
        })
    }

    /// Close the finished cycle, record it, and open the next one seeded with
    /// its carry-forward.
    fn roll_over(&mut self) -> Result<RunRecord, SchedulerError> {
        let cycle = Self::running(&mut self.cycle)?;
        let summary = cycle.close()?;
        let record = summary.to_record(Utc::now());

        self.log.append(record.clone())?;
        if let Some(store) = &self.store {
            if let Err(e) = store.append(&record) {
                warn!(cycle_id = %record.cycle_id, "failed to persist run record: {e}");
            }
        }

        let ordinal = self.take_ordinal();
        info!(
            closed = summary.ordinal,
            next = ordinal,
            seeds = summary.carry_forward.len(),
            "cycle rolled over"
        );
        self.cycle = Some(Cycle::new(ordinal, summary.carry_forward));
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::{MemoryContentStore, TaskProfile};
    use std::cell::RefCell;
    use std::collections::BTreeMap;
    use std::rc::Rc;
    use triad_kernel::NodeDraft;
    use triad_types::{NodeKind, NodeStatus};

    fn tools(n: usize) -> RowProposal {
        RowProposal::new((0..n).map(|i| NodeDraft::tool(format!("step {i}"))).collect())
    }

    fn executed_ids(s: &Scheduler) -> Vec<NodeId> {
        s.current_turn()
            .map(|t| t.executed().iter().map(|n| n.id().clone()).collect())
            .unwrap_or_default()
    }

    /// Run one turn: chosen row of exactly the budget, `spare` reserve nodes
    /// carried forward.
    fn run_turn(s: &mut Scheduler, spare: usize) -> TurnOutcome {
        let index = s
            .cycle()
            .and_then(Cycle::next_index)
            .unwrap_or(TurnIndex::First);
        let mut rows = vec![tools(index.budget())];
        if spare > 0 {
            rows.push(RowProposal::new(
                (0..spare).map(|i| NodeDraft::collab(format!("later {i}"))).collect(),
            ));
        }
        s.begin_turn(rows).unwrap();
        s.select(RowId(0)).unwrap();
        for id in executed_ids(s) {
            s.resolve(&id, "ok").unwrap();
        }
        s.carry_forward_reserve().unwrap();
        s.end_turn().unwrap()
    }

    fn scheduler() -> Scheduler {
        Scheduler::new(SchedulerConfig::default()).unwrap()
    }

    #[test]
    fn first_boot_is_cold() {
        let mut s = scheduler();
        let decision = s.boot("anything").unwrap();
        assert!(decision.is_cold());
        assert_eq!(s.cycle().unwrap().ordinal(), 1);
    }

    #[test]
    fn begin_turn_without_boot_starts_cold_cycle() {
        let mut s = scheduler();
        s.begin_turn(vec![tools(3)]).unwrap();
        assert_eq!(s.cycle().unwrap().ordinal(), 1);
        assert!(s.has_open_turn());
    }

    #[test]
    fn full_cycle_records_and_seeds_next() {
        let mut s = scheduler();
        s.boot("").unwrap();
        assert!(run_turn(&mut s, 0).record.is_none());
        assert!(run_turn(&mut s, 0).record.is_none());
        let outcome = run_turn(&mut s, 2);

        let record = outcome.record.unwrap();
        assert_eq!(record.bound_count, 3 + 6 + 9);
        assert_eq!(record.failed_count, 0);
        assert_eq!(record.carry_forward_snapshot.len(), 2);
        assert_eq!(record.carry_forward_snapshot[0].kind, NodeKind::Collaboration);
        assert_eq!(s.log().len(), 1);

        let next = s.cycle().unwrap();
        assert_eq!(next.ordinal(), 2);
        assert_eq!(next.seeds().len(), 2);
        assert!(next.seeds().iter().all(|n| n.age() == 1));

        let turn = s.begin_turn(vec![tools(3)]).unwrap();
        assert_eq!(turn.budget(), 3);
        assert!(turn.rows().last().unwrap().is_seed());
    }

    #[test]
    fn boot_after_history_seeds_from_carry_forward() {
        let mut s = scheduler();
        run_turn(&mut s, 0);
        run_turn(&mut s, 0);
        run_turn(&mut s, 1);

        let decision = s.boot("later").unwrap().clone();
        assert!(!decision.is_cold());
        assert_eq!(decision.log_version, 1);
        assert_eq!(decision.seeds.len(), 1);
        // The auto-opened cycle is replaced, keeping its ordinal.
        assert_eq!(s.cycle().unwrap().ordinal(), 2);
        assert_eq!(s.cycle().unwrap().seeds().len(), 1);
    }

    #[test]
    fn boot_mid_cycle_is_rejected() {
        let mut s = scheduler();
        s.begin_turn(vec![tools(3)]).unwrap();
        assert!(matches!(s.boot("x"), Err(SchedulerError::CycleInProgress(1))));
    }

    #[test]
    fn forced_turns_still_close_the_cycle() {
        let mut s = scheduler();
        for _ in 0..3 {
            let index = s.cycle().and_then(Cycle::next_index).unwrap_or(TurnIndex::First);
            s.begin_turn(vec![tools(index.budget())]).unwrap();
            s.select(RowId(0)).unwrap();
            let outcome = s.force_end().unwrap();
            assert!(outcome.forced);
            if index == TurnIndex::Third {
                assert_eq!(outcome.record.unwrap().failed_count, 18);
            }
        }
        assert_eq!(s.log().tally().fail_count(NodeKind::ToolCall), 18);
    }

    #[test]
    fn node_bound_in_a_later_cycle_is_not_reseeded() {
        let mut s = scheduler();
        run_turn(&mut s, 0);
        run_turn(&mut s, 0);
        run_turn(&mut s, 1);
        let carried = s.log().records()[0].carry_forward_snapshot[0].id.clone();

        let decision = s.boot("later").unwrap();
        assert_eq!(decision.seeds[0].node.id, carried);
        s.begin_turn(vec![tools(3)]).unwrap();
        s.select(RowId(0)).unwrap();
        s.reclaim(&carried).unwrap();
        for id in executed_ids(&s) {
            s.resolve(&id, "done").unwrap();
        }
        s.end_turn().unwrap();
        run_turn(&mut s, 0);
        run_turn(&mut s, 0);
        assert!(s.log().records()[1].resolved_ids.contains(&carried));

        let decision = s.boot("later").unwrap();
        assert!(decision.seeds.iter().all(|seed| seed.node.id != carried));
        assert!(decision.is_cold());
    }

    #[test]
    fn bad_cycle_does_not_lock_out_context_boots() {
        let mut s = scheduler();
        for _ in 0..3 {
            let index = s.cycle().and_then(Cycle::next_index).unwrap_or(TurnIndex::First);
            s.begin_turn(vec![tools(index.budget())]).unwrap();
            s.select(RowId(0)).unwrap();
            s.force_end().unwrap();
        }
        run_turn(&mut s, 0);
        run_turn(&mut s, 0);
        s.begin_turn(vec![
            tools(9),
            RowProposal::new(vec![NodeDraft::tool("deploy staging")]),
        ])
        .unwrap();
        s.select(RowId(0)).unwrap();
        for id in executed_ids(&s) {
            s.resolve(&id, "ok").unwrap();
        }
        s.carry_forward_reserve().unwrap();
        s.end_turn().unwrap();

        let decision = s.boot("deploy staging").unwrap();
        assert!(!decision.is_cold());
        assert_eq!(decision.seeds[0].node.content, "deploy staging");
        assert!((decision.seeds[0].fail_rate - 0.5).abs() < 1e-9);
    }

    #[test]
    fn baseline_turn_uses_default_rows() {
        let mut s = scheduler();
        let turn = s.begin_baseline_turn().unwrap();
        assert_eq!(turn.rows().len(), 2);
        assert_eq!(turn.planned(), 3);
        s.select_with_input(RowId(0), "summarise the diff").unwrap();
        let turn = s.current_turn().unwrap();
        assert!(turn.executed().iter().all(|n| n.content() == "summarise the diff"));
    }

    #[test]
    fn force_end_without_turn_is_an_error() {
        let mut s = scheduler();
        assert!(matches!(
            s.force_end(),
            Err(SchedulerError::Cycle(CycleError::NoActiveTurn))
        ));
        run_turn(&mut s, 0);
        assert!(s.force_end().is_err());
    }

    #[test]
    fn end_turn_reports_incomplete() {
        let mut s = scheduler();
        s.begin_turn(vec![tools(3)]).unwrap();
        s.select(RowId(0)).unwrap();
        assert!(matches!(
            s.end_turn(),
            Err(SchedulerError::Turn(TurnError::Incomplete { unresolved: 3, .. }))
        ));
    }

    #[test]
    fn content_store_tracks_payloads() {
        let mut s = scheduler().with_content_store(Box::new(MemoryContentStore::new()));
        s.begin_turn(vec![tools(3)]).unwrap();
        s.select(RowId(0)).unwrap();
        let ids = executed_ids(&s);
        s.resolve(&ids[0], "found it").unwrap();
        let store = s.content_store().unwrap();
        assert_eq!(store.get(&ids[0]).as_deref(), Some("found it"));

        s.resolve(&ids[1], "error: file missing").unwrap();
        s.force_end().unwrap();
        let store = s.content_store().unwrap();
        // Bound nodes are never failed, so their payloads stay.
        assert!(store.get(&ids[1]).is_some());
        assert!(store.get(&ids[2]).is_none());
    }

    struct RecordingTags(Rc<RefCell<Vec<NodeId>>>);

    impl TagIndex for RecordingTags {
        fn annotate(&mut self, node: &Node) -> Vec<String> {
            self.0.borrow_mut().push(node.id().clone());
            vec![node.kind().to_string()]
        }
    }

    #[test]
    fn emergence_nodes_are_annotated() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut s = scheduler().with_tag_index(Box::new(RecordingTags(Rc::clone(&seen))));
        s.begin_turn(vec![tools(3)]).unwrap();
        s.select(RowId(0)).unwrap();
        let id = s.emerge("what about caching?").unwrap();
        assert_eq!(*seen.borrow(), vec![id.clone()]);
        let node = s.current_turn().unwrap().find(&id).unwrap();
        assert_eq!(node.status(), NodeStatus::Open);
    }

    struct FixedClassifier;

    impl ContextClassifier for FixedClassifier {
        fn classify(&self, _input: &str) -> TaskProfile {
            TaskProfile {
                category: "feature".into(),
                layer_weights: BTreeMap::new(),
                keywords: vec!["later".into()],
            }
        }
    }

    #[test]
    fn classifier_profile_drives_relevance() {
        let mut s = scheduler().with_classifier(Box::new(FixedClassifier));
        run_turn(&mut s, 0);
        run_turn(&mut s, 0);
        run_turn(&mut s, 1);
        let decision = s.boot("unrelated words").unwrap();
        assert_eq!(decision.seeds[0].relevance, 1.0);
    }

    #[test]
    fn reclaim_returns_extension_node() {
        let mut s = scheduler();
        s.begin_turn(vec![tools(3), tools(1)]).unwrap();
        s.select(RowId(0)).unwrap();
        let reserve = s.current_turn().unwrap().reserve()[0].id().clone();
        let node = s.reclaim(&reserve).unwrap();
        assert_eq!(node.kind(), NodeKind::ToolExtension);
        assert!(matches!(
            s.reclaim(&reserve),
            Err(SchedulerError::Turn(TurnError::ReclaimExhausted))
        ));
    }

    #[test]
    fn history_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runs.db").to_string_lossy().into_owned();
        let config = SchedulerConfig {
            persistence_path: Some(path),
            ..SchedulerConfig::default()
        };
        {
            let mut s = Scheduler::new(config.clone()).unwrap();
            run_turn(&mut s, 0);
            run_turn(&mut s, 0);
            run_turn(&mut s, 2);
        }
        let mut s = Scheduler::new(config).unwrap();
        assert_eq!(s.log().len(), 1);
        assert!(!s.boot("").unwrap().is_cold());
        assert_eq!(s.cycle().unwrap().ordinal(), 2);
    }

    #[test]
    fn in_memory_store_receives_records() {
        let mut s = scheduler().with_store(RunStore::open_in_memory().unwrap());
        run_turn(&mut s, 0);
        run_turn(&mut s, 0);
        run_turn(&mut s, 0);
        assert_eq!(s.store.as_ref().unwrap().count().unwrap(), 1);
    }
}
