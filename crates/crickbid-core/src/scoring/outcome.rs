// Quality score -> cricket outcome.
//
// Two threshold tables exist and are deliberately kept apart: the one applied
// when an idea is first graded, and the stricter one applied when an admin
// audit overrides the score.

use serde::{Deserialize, Serialize};

/// The result of one ball.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    pub runs: u8,
    pub is_wicket: bool,
    pub is_extra: bool,
}

impl Outcome {
    pub const DOT: Outcome = Outcome {
        runs: 0,
        is_wicket: false,
        is_extra: false,
    };

    pub const WICKET: Outcome = Outcome {
        runs: 0,
        is_wicket: true,
        is_extra: false,
    };

    pub const fn runs(runs: u8) -> Outcome {
        Outcome {
            runs,
            is_wicket: false,
            is_extra: false,
        }
    }
}

/// Which threshold table to apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoringScale {
    /// Applied to the grader's score on submission.
    Initial,
    /// Applied when an admin audit replaces the score.
    Audit,
}

impl ScoringScale {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScoringScale::Initial => "initial",
            ScoringScale::Audit => "audit",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "initial" => Some(ScoringScale::Initial),
            "audit" => Some(ScoringScale::Audit),
            _ => None,
        }
    }

    /// `(inclusive lower bound, outcome)` pairs, highest first. Anything
    /// below the last bound is a wicket.
    fn brackets(&self) -> &'static [(f64, Outcome)] {
        const INITIAL: &[(f64, Outcome)] = &[
            (85.0, Outcome::runs(6)),
            (75.0, Outcome::runs(4)),
            (60.0, Outcome::runs(2)),
            (50.0, Outcome::runs(1)),
            (40.0, Outcome::DOT),
        ];
        const AUDIT: &[(f64, Outcome)] = &[
            (95.0, Outcome::runs(6)),
            (80.0, Outcome::runs(4)),
            (60.0, Outcome::runs(2)),
            (40.0, Outcome::runs(1)),
        ];
        match self {
            ScoringScale::Initial => INITIAL,
            ScoringScale::Audit => AUDIT,
        }
    }
}

/// Clamp a raw grader score into 0..=100. NaN becomes 0.
pub fn clamp_score(score: f64) -> f64 {
    if score.is_nan() {
        0.0
    } else {
        score.clamp(0.0, 100.0)
    }
}

/// Map a quality score to a ball outcome. Total over all `f64` inputs.
pub fn score_to_outcome(score: f64, scale: ScoringScale) -> Outcome {
    let score = clamp_score(score);
    scale
        .brackets()
        .iter()
        .find(|(floor, _)| score >= *floor)
        .map(|(_, outcome)| *outcome)
        .unwrap_or(Outcome::WICKET)
}
