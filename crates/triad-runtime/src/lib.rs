//! `triad-runtime` – The Glue Loop
//!
//! Wires the turn state machine, the fail marker, the run history and the
//! boot scorer into one sequential driver, and connects it to the outside
//! collaborators it depends on.
//!
//! # Modules
//!
//! - [`scheduler`] – [`Scheduler`][scheduler::Scheduler]: boots cycles from
//!   run history, delegates turn operations to `triad-kernel`, and records
//!   every closed cycle in the [`RunLog`][triad_memory::RunLog] (and the
//!   SQLite store when one is configured).
//! - [`collab`] – the [`ContextClassifier`][collab::ContextClassifier],
//!   [`ContentStore`][collab::ContentStore] and
//!   [`TagIndex`][collab::TagIndex] seams, plus the in-memory
//!   [`MemoryContentStore`][collab::MemoryContentStore].
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: installs the
//!   global `tracing` subscriber, with JSON output via `TRIAD_LOG_FORMAT=json`
//!   and optional OTLP span export via `OTEL_EXPORTER_OTLP_ENDPOINT`.

pub mod collab;
pub mod scheduler;
pub mod telemetry;

pub use collab::{ContentStore, ContextClassifier, MemoryContentStore, TagIndex, TaskProfile};
pub use scheduler::{Scheduler, SchedulerConfig, SchedulerError, TurnOutcome};
pub use telemetry::{LogFormat, TracerProviderGuard, init_tracing};
