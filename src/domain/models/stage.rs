//! Execution stages.
//!
//! Every plan runs its steps through the same fixed stage sequence. The
//! per-stage duration weights are a fixed schedule, not caller-supplied.

use serde::{Deserialize, Serialize};

/// Ordered stage tags for plan steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Analysis,
    Design,
    Implementation,
    Testing,
    Integration,
}

impl Stage {
    /// The fixed stage order used when generating plan steps.
    pub const ORDER: [Self; 5] = [
        Self::Analysis,
        Self::Design,
        Self::Implementation,
        Self::Testing,
        Self::Integration,
    ];

    /// Fraction of the work item's estimated duration allotted to this stage.
    ///
    /// Weights sum to 1.0.
    pub const fn duration_weight(self) -> f64 {
        match self {
            Self::Analysis => 0.10,
            Self::Design | Self::Integration => 0.15,
            Self::Implementation => 0.40,
            Self::Testing => 0.20,
        }
    }

    /// Baseline complexity of work in this stage (1-10).
    pub const fn base_complexity(self) -> u8 {
        match self {
            Self::Analysis => 3,
            Self::Design => 5,
            Self::Implementation => 7,
            Self::Testing => 4,
            Self::Integration => 6,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Analysis => "analysis",
            Self::Design => "design",
            Self::Implementation => "implementation",
            Self::Testing => "testing",
            Self::Integration => "integration",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
