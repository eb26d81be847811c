//! scorebox: a sandboxed scoring and retry harness for model-generated handlers
//!
//! # Architecture
//!
//! Data flows one way through the crate:
//!
//! ```text
//! runner::controller -> runner::generate -> store::workspace
//!     -> judge::evaluator { analysis -> judge::loader -> judge::functional }
//!     -> verdict::score -> store::results
//! ```
//!
//! ## Challenges ([`challenge`])
//! - Fixed level table (1..5) and the data-driven functional cases per level
//!
//! ## Static Analysis ([`analysis`])
//! - Syntax validity and structural conformance of candidate source, in-process,
//!   without executing anything
//!
//! ## Sandbox ([`sandbox`])
//! - [`sandbox::process`]: child process in its own group, wall-clock deadline, group kill
//! - [`sandbox::output`]: bounded stdout/stderr collection
//! - [`sandbox::scripts`]: the Python loader and functional driver scripts
//!
//! ## Judge ([`judge`])
//! - [`judge::loader`]: instantiate the candidate in an isolated child
//! - [`judge::functional`]: run the level's cases, parse the `SCORE:` line
//! - [`judge::evaluator`]: the phase pipeline with its short-circuit rules
//!
//! ## Verdict ([`verdict`])
//! - [`verdict::score`]: pure aggregation of phase results into a bounded total
//!
//! ## Runner ([`runner`])
//! - Retry controller state machine and the prompt/generation collaborators
//!
//! ## Store ([`store`])
//! - Append-only JSON result store and deterministic candidate paths
//!
//! ## Observability ([`observability`])
//! - Structured progress events and their sinks
//!
//! # Design Principles
//!
//! 1. **Untrusted code never runs in-process** - only in a killed-on-deadline child
//! 2. **Phases degrade, never fail** - every phase has a numeric floor
//! 3. **Scoring is a pure function** - the aggregator sees only phase results
//! 4. **Rendering is a consumer** - components emit events, sinks decide how to show them

// Challenge catalogue
pub mod challenge;

// Static analysis
pub mod analysis;

// Isolated child-process execution
pub mod sandbox;

// Phase pipeline
pub mod judge;

// Score aggregation
pub mod verdict;

// Retry controller and collaborators
pub mod runner;

// Result store and candidate files
pub mod store;

// Progress events
pub mod observability;

// Configuration & shared types
pub mod config;

// CLI entrypoint wiring for the scorebox binary.
pub mod cli;

pub use config::types::*;
