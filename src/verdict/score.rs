/// Short-circuit score aggregation over phase outcomes
///
/// | syntax | loads        | total                                   |
/// |--------|--------------|-----------------------------------------|
/// | no     | -            | 0                                       |
/// | yes    | no / unknown | 10 + structure                          |
/// | yes    | yes          | 10 + structure + 20 + functionality     |
use serde::{Deserialize, Serialize};

pub const SYNTAX_POINTS: u32 = 10;
pub const STRUCTURE_MAX: u32 = 20;
pub const LOAD_POINTS: u32 = 20;
pub const FUNCTIONAL_MAX: u32 = 50;
pub const MAX_TOTAL: u32 = SYNTAX_POINTS + STRUCTURE_MAX + LOAD_POINTS + FUNCTIONAL_MAX;

/// Per-phase points; `total()` is always the field sum and never exceeds [`MAX_TOTAL`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub syntax: u32,
    pub structure: u32,
    pub loads: u32,
    pub functionality: u32,
}

impl ScoreBreakdown {
    pub fn total(&self) -> u32 {
        self.syntax + self.structure + self.loads + self.functionality
    }
}

/// Raw outcomes of the phases that actually ran
///
/// `None` means the phase was never reached.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PhaseResults {
    pub syntax_ok: bool,
    pub structure: u32,
    pub loads: Option<bool>,
    pub functionality: Option<u32>,
}

/// Apply the short-circuit table and clamp every field to its ceiling
pub fn aggregate(phases: &PhaseResults) -> ScoreBreakdown {
    if !phases.syntax_ok {
        return ScoreBreakdown::default();
    }

    let mut breakdown = ScoreBreakdown {
        syntax: SYNTAX_POINTS,
        structure: phases.structure.min(STRUCTURE_MAX),
        ..ScoreBreakdown::default()
    };

    if phases.loads != Some(true) {
        return breakdown;
    }

    breakdown.loads = LOAD_POINTS;
    breakdown.functionality = phases.functionality.unwrap_or(0).min(FUNCTIONAL_MAX);
    breakdown
}
