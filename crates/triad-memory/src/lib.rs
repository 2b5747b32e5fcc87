//! `triad-memory` – Run History & Boot Scoring.
//!
//! Remembers how past cycles ended and uses that history to decide how the
//! next one starts.
//!
//! # Modules
//!
//! - [`run_log`] – [`RunLog`][run_log::RunLog]: the append-only record of
//!   closed cycles with incrementally maintained tallies, and the versioned
//!   [`RunLogSnapshot`][run_log::RunLogSnapshot] handed to the scorer.
//! - [`run_store`] – [`RunStore`][run_store::RunStore]: persists run records
//!   to a local SQLite database and rebuilds a `RunLog` from it.
//! - [`boot_scorer`] – [`BootScorer`][boot_scorer::BootScorer]: scores the
//!   nodes recent cycles left behind by recency, relevance and failure
//!   history, and decides between a cold and a context boot.

pub mod boot_scorer;
pub mod run_log;
pub mod run_store;

pub use boot_scorer::{
    BootConfig, BootConfigError, BootDecision, BootMode, BootScorer, BootWeights,
    KeywordRelevance, NoRelevance, Relevance, ScoredSeed, SeedSource, SeedTier,
};
pub use run_log::{RunLog, RunLogError, RunLogSnapshot, Tally};
pub use run_store::{RunStore, RunStoreError};
