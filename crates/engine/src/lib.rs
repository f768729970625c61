//! Worker-side incremental checking engine.
//!
//! One [`CheckEngine`] owns the incremental program state for a single
//! partition of the watched tree. The analyzers themselves are pluggable
//! black boxes behind [`CheckAnalyzer`] and [`LintAnalyzer`]; the engine
//! contributes change detection, dependency-based invalidation, partition
//! ownership, cooperative cancellation, and per-file fault recovery.

pub mod analyzer;
pub mod engine;
pub mod partition;
pub mod state;

pub use analyzer::{AnalyzerFault, CancelProbe, CheckAnalyzer, CheckOutput, LintAnalyzer};
pub use engine::{CheckEngine, EngineOptions, IterationOutcome, PartitionReport};
pub use partition::Partition;
pub use state::ProgramState;
