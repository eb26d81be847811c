//! Score aggregation
//!
//! Combines phase results into one bounded total as a pure function, so the
//! same phase outcomes always produce the same breakdown.

pub mod score;

pub use score::{aggregate, PhaseResults, ScoreBreakdown};
