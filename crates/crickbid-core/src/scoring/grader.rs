// The external idea grader seen from the core.

use async_trait::async_trait;
use thiserror::Error;

use super::feedback::Feedback;

/// A graded idea: raw 0-100 quality score plus structured feedback.
#[derive(Debug, Clone, PartialEq)]
pub struct Grade {
    pub score: f64,
    pub feedback: Feedback,
}

#[derive(Debug, Error)]
pub enum GraderError {
    #[error("grader not configured")]
    NotConfigured,

    #[error("grader request failed: {0}")]
    Request(String),

    #[error("grader returned an unusable response: {0}")]
    BadResponse(String),
}

/// Scores a submission against a case statement.
///
/// Implementations may be slow; the core never holds a transaction across
/// this call.
#[async_trait]
pub trait Grader: Send + Sync {
    async fn grade(&self, case_statement: &str, content: &str) -> Result<Grade, GraderError>;
}

/// A grader that returns the same grade for every submission.
#[derive(Debug, Clone)]
pub struct FixedGrader(pub Grade);

#[async_trait]
impl Grader for FixedGrader {
    async fn grade(&self, _case_statement: &str, _content: &str) -> Result<Grade, GraderError> {
        Ok(self.0.clone())
    }
}
