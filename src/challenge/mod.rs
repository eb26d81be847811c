//! Challenge catalogue.
//!
//! A challenge is fixed at build time: its level picks the name from a lookup
//! table and the functional cases from [`cases`]. Nothing here is mutated.

pub mod cases;

use crate::config::types::{Result, ScoreboxError};
use cases::FunctionalCase;
use serde::{Deserialize, Serialize};

pub const MIN_LEVEL: u8 = 1;
pub const MAX_LEVEL: u8 = 5;

const LEVEL_NAMES: [&str; 5] = ["echo", "counter", "collector", "executor", "sync"];

/// A scenario a candidate handler must satisfy
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Challenge {
    level: u8,
}

impl Challenge {
    pub fn from_level(level: u8) -> Result<Self> {
        if !(MIN_LEVEL..=MAX_LEVEL).contains(&level) {
            return Err(ScoreboxError::Config(format!(
                "challenge level {level} is outside {MIN_LEVEL}..={MAX_LEVEL}"
            )));
        }
        Ok(Self { level })
    }

    /// Every level, easiest first
    pub fn all() -> Vec<Self> {
        (MIN_LEVEL..=MAX_LEVEL).map(|level| Self { level }).collect()
    }

    pub fn level(&self) -> u8 {
        self.level
    }

    pub fn name(&self) -> &'static str {
        LEVEL_NAMES[usize::from(self.level - MIN_LEVEL)]
    }

    /// `level<N>_<name>`, used for directories and result records
    pub fn slug(&self) -> String {
        format!("level{}_{}", self.level, self.name())
    }

    pub fn test_cases(&self) -> &'static [FunctionalCase] {
        cases::cases_for_level(self.level)
    }
}

impl TryFrom<u8> for Challenge {
    type Error = ScoreboxError;

    fn try_from(level: u8) -> Result<Self> {
        Self::from_level(level)
    }
}

impl From<Challenge> for u8 {
    fn from(challenge: Challenge) -> Self {
        challenge.level
    }
}

impl std::fmt::Display for Challenge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.slug())
    }
}
