//! `triad-kernel` – Turn & Path State Machine
//!
//! Allocates planning nodes across a repeating three-turn cycle, picks one
//! candidate path per turn and recycles the rest. Everything here is
//! synchronous and in-memory; persistence and scoring live in `triad-memory`.
//!
//! # Modules
//!
//! - [`row`] – [`Row`][row::Row] and [`RowProposal`][row::RowProposal]:
//!   candidate paths proposed before the input is known, and the flatten
//!   operation that turns an unchosen row into reserve nodes.
//! - [`turn`] – [`Turn`][turn::Turn]: the `3·k` budget floor, selection,
//!   the single per-turn reclaim, emergence, node resolution and both natural
//!   and forced completion.
//! - [`cycle`] – [`Cycle`][cycle::Cycle]: runs three turns in order, threads
//!   carried reserve nodes between them and tallies the closed cycle into a
//!   [`RunRecord`][triad_types::RunRecord].
//! - [`fail_marker`] – [`FailMarker`][fail_marker::FailMarker]: the
//!   idempotent post-turn scan that fails unresolved, empty or error-bearing
//!   nodes of the executed plan.

pub mod cycle;
pub mod fail_marker;
pub mod row;
pub mod turn;

pub use cycle::{Cycle, CycleError, CycleSummary};
pub use fail_marker::{DEFAULT_ERROR_INDICATORS, FailCriteria, FailMark, FailMarker};
pub use row::{NodeDraft, Row, RowId, RowProposal};
pub use turn::{MAX_RECLAIMS_PER_TURN, Turn, TurnError, TurnIndex, TurnPhase};
