/// Core types shared across the scorebox pipeline
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Scoring phase, in pipeline order
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Phase {
    #[serde(rename = "syntax")]
    Syntax,
    #[serde(rename = "structure")]
    Structure,
    #[serde(rename = "loads")]
    Loads,
    #[serde(rename = "functionality")]
    Functionality,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Syntax => "syntax",
            Phase::Structure => "structure",
            Phase::Loads => "loads",
            Phase::Functionality => "functionality",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a phase (or a whole attempt) fell back to its numeric floor.
///
/// None of these abort a run. They are recorded next to the score so a reader
/// of the result store can tell a 0 from a timeout apart from a 0 from bad syntax.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum Degradation {
    /// Source did not parse; attempt scores 0 and no child is spawned
    #[serde(rename = "syntax_invalid")]
    SyntaxInvalid,
    /// Candidate could not be instantiated; functional phase skipped
    #[serde(rename = "load_failure")]
    LoadFailure,
    /// No entry class could be resolved, so nothing was loaded
    #[serde(rename = "missing_entry_point")]
    MissingEntryPoint,
    /// Loader or functional child hit its deadline and was killed
    #[serde(rename = "phase_timeout")]
    PhaseTimeout,
    /// Functional child printed no parseable `SCORE:` line
    #[serde(rename = "score_parse_failure")]
    ScoreParseFailure,
    /// Level has no functional cases defined
    #[serde(rename = "no_test_cases")]
    NoTestCases,
    /// Prompt construction, generation or candidate persistence failed
    #[serde(rename = "generation_failure")]
    GenerationFailure,
}

impl std::fmt::Display for Degradation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Degradation::SyntaxInvalid => "syntax_invalid",
            Degradation::LoadFailure => "load_failure",
            Degradation::MissingEntryPoint => "missing_entry_point",
            Degradation::PhaseTimeout => "phase_timeout",
            Degradation::ScoreParseFailure => "score_parse_failure",
            Degradation::NoTestCases => "no_test_cases",
            Degradation::GenerationFailure => "generation_failure",
        };
        f.write_str(label)
    }
}

/// Output integrity of a captured child stream
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum OutputIntegrity {
    #[default]
    #[serde(rename = "complete")]
    Complete,
    #[serde(rename = "truncated_by_limit")]
    TruncatedByLimit,
    #[serde(rename = "collection_timed_out")]
    CollectionTimedOut,
    #[serde(rename = "read_error")]
    ReadError,
}

impl std::fmt::Display for OutputIntegrity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputIntegrity::Complete => write!(f, "complete"),
            OutputIntegrity::TruncatedByLimit => write!(f, "truncated_by_limit"),
            OutputIntegrity::CollectionTimedOut => write!(f, "collection_timed_out"),
            OutputIntegrity::ReadError => write!(f, "read_error"),
        }
    }
}

/// Error types for scorebox operations
#[derive(Error, Debug)]
pub enum ScoreboxError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Process error: {0}")]
    Process(String),

    #[error("Generation failed: {0}")]
    Generation(String),

    #[error("Analyzer error: {0}")]
    Analyzer(String),

    #[error("Result store error: {0}")]
    Store(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ScoreboxError>;
