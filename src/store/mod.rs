//! Persistence
//!
//! Candidate source files keyed by model and challenge, and the append-only
//! JSON result store.

pub mod results;
pub mod workspace;

pub use results::{summarize, AttemptRecord, ChallengeRun, ModelSummary, ResultStore};
pub use workspace::{sanitize_model, CandidateWorkspace};
