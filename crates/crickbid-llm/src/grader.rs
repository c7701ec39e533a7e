// `Grader` backed by the Claude API.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use crickbid_core::config::Config;
use crickbid_core::scoring::feedback::{Feedback, ScoreBreakdown};
use crickbid_core::scoring::grader::{Grade, Grader, GraderError};

use crate::client::ClaudeClient;
use crate::prompt;

/// The JSON object the model is asked to reply with.
#[derive(Debug, Deserialize)]
struct Verdict {
    relevance: f64,
    originality: f64,
    feasibility: f64,
    impact: f64,
    #[serde(default)]
    rationale: String,
    #[serde(default)]
    strengths: Vec<String>,
    #[serde(default)]
    improvements: Vec<String>,
}

/// Turn the model's reply into a grade.
///
/// Tolerates prose or a code fence around the object by taking the outermost
/// braces. Sub-scores are clamped to their range and the overall score is
/// their sum, so it always lands in 0-100.
pub fn parse_grade(text: &str) -> Result<Grade, GraderError> {
    let start = text.find('{');
    let end = text.rfind('}');
    let json = match (start, end) {
        (Some(s), Some(e)) if s < e => &text[s..=e],
        _ => {
            return Err(GraderError::BadResponse(
                "no JSON object in grader reply".into(),
            ))
        }
    };
    let verdict: Verdict =
        serde_json::from_str(json).map_err(|e| GraderError::BadResponse(e.to_string()))?;

    let breakdown = ScoreBreakdown {
        relevance: verdict.relevance,
        originality: verdict.originality,
        feasibility: verdict.feasibility,
        impact: verdict.impact,
    }
    .clamped();

    Ok(Grade {
        score: breakdown.total(),
        feedback: Feedback {
            breakdown,
            rationale: verdict.rationale.trim().to_string(),
            strengths: verdict.strengths,
            improvements: verdict.improvements,
        },
    })
}

// ---------------------------------------------------------------------------
// ClaudeGrader
// ---------------------------------------------------------------------------

pub struct ClaudeGrader {
    client: ClaudeClient,
    max_tokens: u32,
    timeout: Duration,
}

impl ClaudeGrader {
    pub fn new(client: ClaudeClient, max_tokens: u32, timeout: Duration) -> Self {
        Self {
            client,
            max_tokens,
            timeout,
        }
    }
}

#[async_trait]
impl Grader for ClaudeGrader {
    async fn grade(&self, case_statement: &str, content: &str) -> Result<Grade, GraderError> {
        let system = prompt::system_prompt();
        let user = prompt::build_grading_prompt(case_statement, content);

        let completion = tokio::time::timeout(
            self.timeout,
            self.client.complete(&system, &user, self.max_tokens),
        )
        .await
        .map_err(|_| {
            GraderError::Request(format!("timed out after {}s", self.timeout.as_secs()))
        })?
        .map_err(|e| GraderError::Request(e.to_string()))?;

        debug!(
            model = self.client.model(),
            input_tokens = completion.input_tokens,
            output_tokens = completion.output_tokens,
            "grading reply received"
        );
        parse_grade(&completion.text).inspect_err(|e| {
            warn!(error = %e, "unusable grading reply");
        })
    }
}

// ---------------------------------------------------------------------------
// LlmGrader wrapper
// ---------------------------------------------------------------------------

/// Either a live Claude grader or a disabled one that refuses every call.
pub enum LlmGrader {
    Active(ClaudeGrader),
    Disabled,
}

impl LlmGrader {
    /// `Active` when credentials carry an API key, otherwise `Disabled`.
    pub fn from_config(config: &Config) -> Self {
        match &config.credentials.anthropic_api_key {
            Some(key) if !key.trim().is_empty() => {
                let client = ClaudeClient::new(key.clone(), config.grader.model.clone());
                LlmGrader::Active(ClaudeGrader::new(
                    client,
                    config.grader.max_tokens,
                    Duration::from_secs(config.grader.timeout_secs),
                ))
            }
            _ => LlmGrader::Disabled,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, LlmGrader::Active(_))
    }
}

#[async_trait]
impl Grader for LlmGrader {
    async fn grade(&self, case_statement: &str, content: &str) -> Result<Grade, GraderError> {
        match self {
            LlmGrader::Active(grader) => grader.grade(case_statement, content).await,
            LlmGrader::Disabled => Err(GraderError::NotConfigured),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_json_reply_parses() {
        let reply = r#"{"relevance": 22, "originality": 18, "feasibility": 20, "impact": 25,
            "rationale": " Tight fit. ", "strengths": ["cheap"], "improvements": []}"#;
        let grade = parse_grade(reply).unwrap();
        assert_eq!(grade.score, 85.0);
        assert_eq!(grade.feedback.rationale, "Tight fit.");
        assert_eq!(grade.feedback.strengths, vec!["cheap".to_string()]);
    }

    #[test]
    fn fenced_reply_with_prose_parses() {
        let reply = "Here you go:\n```json\n{\"relevance\": 10, \"originality\": 10, \
                     \"feasibility\": 10, \"impact\": 5}\n```";
        let grade = parse_grade(reply).unwrap();
        assert_eq!(grade.score, 35.0);
        assert!(grade.feedback.rationale.is_empty());
    }

    #[test]
    fn out_of_range_sub_scores_are_clamped() {
        let reply = r#"{"relevance": 40, "originality": -3, "feasibility": 25, "impact": 25}"#;
        let grade = parse_grade(reply).unwrap();
        assert_eq!(grade.feedback.breakdown.relevance, 25.0);
        assert_eq!(grade.feedback.breakdown.originality, 0.0);
        assert_eq!(grade.score, 75.0);
    }

    #[test]
    fn unusable_replies_are_errors() {
        assert!(matches!(
            parse_grade("I refuse to grade this."),
            Err(GraderError::BadResponse(_))
        ));
        assert!(matches!(
            parse_grade(r#"{"relevance": 10}"#),
            Err(GraderError::BadResponse(_))
        ));
    }

    #[tokio::test]
    async fn disabled_grader_is_not_configured() {
        let err = LlmGrader::Disabled.grade("case", "idea").await.unwrap_err();
        assert!(matches!(err, GraderError::NotConfigured));
        assert!(!LlmGrader::Disabled.is_active());
    }
}
