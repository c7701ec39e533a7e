// Match lifecycle and ball recording.

pub mod aggregate;
pub mod backfill;
pub mod publish;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use tracing::info;

use crate::config::MatchFormat;
use crate::db::{fetch_idea, fetch_match};
use crate::error::{CoreError, CoreResult};
use crate::ids::{IdeaId, MatchId, PlayerId, TeamId};
use crate::models::{CaseStudy, Idea, Match, MatchStatus, Side};
use crate::scoring::feedback::{Feedback, ScoreBreakdown};
use crate::scoring::outcome::{clamp_score, score_to_outcome, ScoringScale};

pub use aggregate::{recompute_team_totals, TeamTotals};
pub use backfill::{advance_virtual_balls, BackfillReport};
pub use publish::PublishOutcome;

fn wrong_state(m: &Match, expected: MatchStatus) -> CoreError {
    CoreError::InvalidMatchState {
        match_id: m.id,
        status: m.status.as_str(),
        expected: expected.as_str(),
    }
}

fn ensure_unpublished(m: &Match) -> CoreResult<()> {
    if m.published {
        return Err(CoreError::MatchPublished(m.id));
    }
    Ok(())
}

/// The match is live and `team` plays in it. Returns the team's side.
pub fn ensure_accepting(m: &Match, team: TeamId) -> CoreResult<Side> {
    ensure_unpublished(m)?;
    if m.status != MatchStatus::InProgress {
        return Err(wrong_state(m, MatchStatus::InProgress));
    }
    aggregate::side_for(m, team)
}

/// A graded submission ready to become a ball.
#[derive(Debug, Clone)]
pub struct NewBall<'a> {
    pub team: TeamId,
    pub captain: Option<PlayerId>,
    pub content: &'a str,
    pub score: f64,
    pub feedback: &'a Feedback,
}

/// The stored ball and the team's totals after it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordedBall {
    pub idea: Idea,
    pub totals: TeamTotals,
}

/// Store a graded idea as the team's next ball and re-aggregate its totals.
pub fn record_ball(
    conn: &Connection,
    match_id: MatchId,
    ball: &NewBall<'_>,
    now: DateTime<Utc>,
    format: &MatchFormat,
) -> CoreResult<RecordedBall> {
    let m = fetch_match(conn, match_id)?;
    let side = ensure_accepting(&m, ball.team)?;
    if aggregate::innings_complete(m.side(side), format) {
        return Err(CoreError::InningsComplete {
            match_id,
            team: ball.team,
        });
    }

    let next: u32 = conn.query_row(
        "SELECT COALESCE(MAX(ball_index), 0) + 1 FROM ideas WHERE match_id = ?1 AND team_id = ?2",
        params![match_id, ball.team],
        |row| row.get(0),
    )?;
    if next > format.max_balls {
        return Err(CoreError::InningsComplete {
            match_id,
            team: ball.team,
        });
    }

    let score = clamp_score(ball.score);
    let outcome = score_to_outcome(score, ScoringScale::Initial);
    let feedback = serde_json::to_string(ball.feedback)?;
    let id: IdeaId = conn.query_row(
        "INSERT INTO ideas
             (match_id, team_id, captain_id, content, score, runs, is_wicket, is_extra,
              ball_index, feedback, scale, is_virtual, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, 0, ?12)
         RETURNING id",
        params![
            match_id,
            ball.team,
            ball.captain,
            ball.content,
            score,
            outcome.runs,
            outcome.is_wicket,
            outcome.is_extra,
            next,
            feedback,
            ScoringScale::Initial.as_str(),
            now.timestamp_millis(),
        ],
        |row| row.get(0),
    )?;

    let totals = recompute_team_totals(conn, match_id, ball.team)?;
    Ok(RecordedBall {
        idea: fetch_idea(conn, id)?,
        totals,
    })
}

/// An admin override of a ball's score.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScoreAdjustment {
    pub score: f64,
    /// Replaces the stored breakdown when set.
    pub breakdown: Option<ScoreBreakdown>,
    /// Replaces the stored rationale when set.
    pub rationale: Option<String>,
}

/// Re-score an existing ball in place with the audit scale, then
/// re-aggregate its team. Refused once the match is published.
pub fn adjust_idea(
    conn: &Connection,
    idea_id: IdeaId,
    adjustment: &ScoreAdjustment,
) -> CoreResult<RecordedBall> {
    let idea = fetch_idea(conn, idea_id)?;
    let m = fetch_match(conn, idea.match_id)?;
    ensure_unpublished(&m)?;

    let score = clamp_score(adjustment.score);
    let outcome = score_to_outcome(score, ScoringScale::Audit);
    // The grader's strengths and improvements no longer describe the score.
    let previous = idea.feedback.unwrap_or_default();
    let feedback = Feedback::audit(
        adjustment
            .breakdown
            .map_or(previous.breakdown, |b| b.clamped()),
        adjustment
            .rationale
            .clone()
            .unwrap_or(previous.rationale),
    );

    conn.execute(
        "UPDATE ideas
         SET score = ?1, runs = ?2, is_wicket = ?3, is_extra = ?4, feedback = ?5, scale = ?6
         WHERE id = ?7",
        params![
            score,
            outcome.runs,
            outcome.is_wicket,
            outcome.is_extra,
            serde_json::to_string(&feedback)?,
            ScoringScale::Audit.as_str(),
            idea_id,
        ],
    )?;
    let totals = recompute_team_totals(conn, idea.match_id, idea.team_id)?;
    info!(idea = %idea_id, score, runs = outcome.runs, wicket = outcome.is_wicket, "ball re-scored");
    Ok(RecordedBall {
        idea: fetch_idea(conn, idea_id)?,
        totals,
    })
}

/// SCHEDULED -> IN_PROGRESS. Starts the match clock.
pub fn start_match(conn: &Connection, match_id: MatchId, now: DateTime<Utc>) -> CoreResult<Match> {
    let m = fetch_match(conn, match_id)?;
    if m.status != MatchStatus::Scheduled {
        return Err(wrong_state(&m, MatchStatus::Scheduled));
    }
    if m.team1.team_id.is_none() || m.team2.team_id.is_none() {
        return Err(CoreError::InvalidInput {
            field: "match",
            message: format!("match {match_id} does not have two teams"),
        });
    }
    let changed = conn.execute(
        "UPDATE matches SET status = 'in_progress', started_at = ?1
         WHERE id = ?2 AND status = 'scheduled'",
        params![now.timestamp_millis(), match_id],
    )?;
    if changed == 0 {
        return Err(CoreError::Conflict(format!("match {match_id} changed state")));
    }
    info!(%match_id, "match started");
    fetch_match(conn, match_id)
}

/// IN_PROGRESS or REVIEW_PENDING -> COMPLETED, with fresh totals.
pub fn complete_match(conn: &Connection, match_id: MatchId) -> CoreResult<Match> {
    let m = fetch_match(conn, match_id)?;
    ensure_unpublished(&m)?;
    if !matches!(
        m.status,
        MatchStatus::InProgress | MatchStatus::ReviewPending
    ) {
        return Err(wrong_state(&m, MatchStatus::ReviewPending));
    }
    aggregate::recompute_match(conn, match_id)?;
    conn.execute(
        "UPDATE matches SET status = 'completed'
         WHERE id = ?1 AND status IN ('in_progress', 'review_pending')",
        params![match_id],
    )?;
    info!(%match_id, "match completed");
    fetch_match(conn, match_id)
}

/// Set a side's narrative summary and flat NRR bonus.
pub fn set_side_adjustment(
    conn: &Connection,
    match_id: MatchId,
    team: TeamId,
    summary: Option<&str>,
    nrr_bonus: f64,
) -> CoreResult<Match> {
    if !nrr_bonus.is_finite() {
        return Err(CoreError::InvalidInput {
            field: "nrr_bonus",
            message: "must be a finite number".into(),
        });
    }
    let m = fetch_match(conn, match_id)?;
    ensure_unpublished(&m)?;
    let prefix = aggregate::side_for(&m, team)?.prefix();
    conn.execute(
        &format!("UPDATE matches SET {prefix}_summary = ?1, {prefix}_bonus = ?2 WHERE id = ?3"),
        params![summary, nrr_bonus, match_id],
    )?;
    fetch_match(conn, match_id)
}

/// Give the match the lowest-numbered unused case study and mark it used.
pub fn assign_case(conn: &Connection, match_id: MatchId) -> CoreResult<CaseStudy> {
    let m = fetch_match(conn, match_id)?;
    ensure_unpublished(&m)?;
    let case = conn
        .query_row(
            "UPDATE case_studies SET used = 1
             WHERE id = (SELECT id FROM case_studies WHERE used = 0 ORDER BY id LIMIT 1)
             RETURNING id, title, statement, used",
            [],
            |row| {
                Ok(CaseStudy {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    statement: row.get(2)?,
                    used: row.get(3)?,
                })
            },
        )
        .optional()?
        .ok_or(CoreError::NoCaseAvailable)?;

    conn.execute(
        "UPDATE matches SET case_id = ?1, case_statement = ?2 WHERE id = ?3",
        params![case.id, case.statement, match_id],
    )?;
    info!(%match_id, case = %case.id, title = %case.title, "case assigned");
    Ok(case)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::from_millis;
    use crate::db::tests::test_db;
    use crate::db::Database;
    use crate::models::MatchKind;
    use crate::scoring::outcome::Outcome;

    fn live(db: &Database) -> (MatchId, TeamId, TeamId) {
        let a = db.insert_team("A", 0).unwrap();
        let b = db.insert_team("B", 0).unwrap();
        let m = db.create_match(MatchKind::League, Some(a), Some(b)).unwrap();
        db.write(|tx| start_match(tx, m, from_millis(0))).unwrap();
        (m, a, b)
    }

    fn ball(team: TeamId, score: f64, feedback: &Feedback) -> NewBall<'_> {
        NewBall {
            team,
            captain: None,
            content: "pilot with two clinics",
            score,
            feedback,
        }
    }

    #[test]
    fn balls_take_consecutive_indices() {
        let db = test_db();
        let (m, a, _) = live(&db);
        let fb = Feedback::default();
        let fmt = MatchFormat::default();

        let first = db
            .write(|tx| record_ball(tx, m, &ball(a, 90.0, &fb), from_millis(1), &fmt))
            .unwrap();
        let second = db
            .write(|tx| record_ball(tx, m, &ball(a, 35.0, &fb), from_millis(2), &fmt))
            .unwrap();

        assert_eq!(first.idea.ball_index, 1);
        assert_eq!(first.idea.outcome, Outcome::runs(6));
        assert_eq!(second.idea.ball_index, 2);
        assert!(second.idea.outcome.is_wicket);
        assert_eq!(
            second.totals,
            TeamTotals {
                runs: 6,
                wickets: 1,
                balls: 2
            }
        );
    }

    #[test]
    fn scheduled_match_refuses_balls() {
        let db = test_db();
        let a = db.insert_team("A", 0).unwrap();
        let b = db.insert_team("B", 0).unwrap();
        let m = db.create_match(MatchKind::League, Some(a), Some(b)).unwrap();
        let fb = Feedback::default();
        let result = db.write(|tx| {
            record_ball(tx, m, &ball(a, 80.0, &fb), from_millis(0), &MatchFormat::default())
        });
        assert!(matches!(result, Err(CoreError::InvalidMatchState { .. })));
    }

    #[test]
    fn full_innings_refuses_more_balls() {
        let db = test_db();
        let (m, a, _) = live(&db);
        let fb = Feedback::default();
        let fmt = MatchFormat {
            max_balls: 2,
            max_wickets: 10,
            ball_interval_secs: 10,
        };
        for _ in 0..2 {
            db.write(|tx| record_ball(tx, m, &ball(a, 60.0, &fb), from_millis(0), &fmt))
                .unwrap();
        }
        assert!(matches!(
            db.write(|tx| record_ball(tx, m, &ball(a, 60.0, &fb), from_millis(0), &fmt)),
            Err(CoreError::InningsComplete { .. })
        ));
    }

    #[test]
    fn audit_uses_audit_scale_and_recomputes() {
        let db = test_db();
        let (m, a, _) = live(&db);
        let fb = Feedback {
            rationale: "novel".into(),
            strengths: vec!["clear owner".into()],
            ..Feedback::default()
        };
        let fmt = MatchFormat::default();
        let rec = db
            .write(|tx| record_ball(tx, m, &ball(a, 90.0, &fb), from_millis(0), &fmt))
            .unwrap();
        assert_eq!(rec.totals.runs, 6);

        let adjusted = db
            .write(|tx| {
                adjust_idea(
                    tx,
                    rec.idea.id,
                    &ScoreAdjustment {
                        score: 90.0,
                        breakdown: None,
                        rationale: Some("overlaps an existing programme".into()),
                    },
                )
            })
            .unwrap();
        // Same score, stricter table: a four.
        assert_eq!(adjusted.idea.outcome, Outcome::runs(4));
        assert_eq!(adjusted.idea.scale, ScoringScale::Audit);
        assert_eq!(adjusted.idea.id, rec.idea.id);
        assert_eq!(adjusted.totals.runs, 4);
        assert_eq!(db.get_match(m).unwrap().team1.runs, 4);
        let audited = adjusted.idea.feedback.unwrap();
        assert_eq!(audited.rationale, "overlaps an existing programme");
        assert_eq!(audited.breakdown, fb.breakdown);
        assert!(audited.strengths.is_empty());
    }

    #[test]
    fn lifecycle_runs_in_order() {
        let db = test_db();
        let (m, a, _) = live(&db);
        assert!(matches!(
            db.write(|tx| start_match(tx, m, from_millis(0))),
            Err(CoreError::InvalidMatchState { .. })
        ));
        let done = db.write(|tx| complete_match(tx, m)).unwrap();
        assert_eq!(done.status, MatchStatus::Completed);
        assert!(db.write(|tx| complete_match(tx, m)).is_err());

        let adjusted = db
            .write(|tx| set_side_adjustment(tx, m, a, Some("Strong finish"), 0.25))
            .unwrap();
        assert_eq!(adjusted.team1.summary.as_deref(), Some("Strong finish"));
        assert_eq!(adjusted.team1.nrr_bonus, 0.25);
        assert!(db
            .write(|tx| set_side_adjustment(tx, m, a, None, f64::NAN))
            .is_err());
    }

    #[test]
    fn cases_are_handed_out_once() {
        let db = test_db();
        let (m, _, _) = live(&db);
        db.add_case_study("Cold chain", "Cut vaccine spoilage in transit").unwrap();

        let case = db.write(|tx| assign_case(tx, m)).unwrap();
        assert!(case.used);
        assert_eq!(
            db.get_match(m).unwrap().case_statement.as_deref(),
            Some("Cut vaccine spoilage in transit")
        );
        assert!(matches!(
            db.write(|tx| assign_case(tx, m)),
            Err(CoreError::NoCaseAvailable)
        ));
    }
}
