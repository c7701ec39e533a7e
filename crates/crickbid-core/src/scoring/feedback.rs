// Structured grader feedback stored alongside every scored idea.

use serde::{Deserialize, Serialize};

/// Points awarded per criterion. Each criterion is scored out of
/// `ScoreBreakdown::CRITERION_MAX`; the four sum to the 0-100 quality score.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub relevance: f64,
    pub originality: f64,
    pub feasibility: f64,
    pub impact: f64,
}

impl ScoreBreakdown {
    pub const CRITERION_MAX: f64 = 25.0;

    pub fn total(&self) -> f64 {
        self.relevance + self.originality + self.feasibility + self.impact
    }

    /// Copy with every criterion clamped to `0..=CRITERION_MAX`.
    pub fn clamped(&self) -> Self {
        let c = |v: f64| {
            if v.is_nan() {
                0.0
            } else {
                v.clamp(0.0, Self::CRITERION_MAX)
            }
        };
        Self {
            relevance: c(self.relevance),
            originality: c(self.originality),
            feasibility: c(self.feasibility),
            impact: c(self.impact),
        }
    }
}

/// Grader verdict on one idea.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Feedback {
    pub breakdown: ScoreBreakdown,
    pub rationale: String,
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub improvements: Vec<String>,
}

impl Feedback {
    /// Feedback recorded when an admin overrides a score.
    pub fn audit(breakdown: ScoreBreakdown, rationale: impl Into<String>) -> Self {
        Self {
            breakdown,
            rationale: rationale.into(),
            strengths: Vec::new(),
            improvements: Vec::new(),
        }
    }
}
