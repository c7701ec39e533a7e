// Publication: freeze a completed match into score records, or take it back.

use rusqlite::params;
use serde::Serialize;
use tracing::info;

use super::aggregate::recompute_match;
use crate::config::{MatchFormat, PointsConfig};
use crate::db::{fetch_match, Database};
use crate::error::{CoreError, CoreResult};
use crate::ids::{MatchId, TeamId};
use crate::models::{Match, MatchResult, MatchStatus, ScoreRecord, SideScore};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum PublishOutcome {
    Published {
        winner: Option<TeamId>,
        records: Vec<ScoreRecord>,
    },
    /// Already published. Nothing was rewritten.
    AlreadyPublished,
}

/// Balls an innings counts for NRR: the full allotment when all out.
pub fn nrr_balls(side: &SideScore, format: &MatchFormat) -> u32 {
    if side.wickets >= format.max_wickets {
        format.max_balls
    } else {
        side.balls
    }
}

/// Winner by runs. `None` is a tie.
pub fn winner_of(m: &Match) -> Option<TeamId> {
    use std::cmp::Ordering;
    match m.team1.runs.cmp(&m.team2.runs) {
        Ordering::Greater => m.team1.team_id,
        Ordering::Less => m.team2.team_id,
        Ordering::Equal => None,
    }
}

/// The two score records a match produces, side one first.
pub fn score_records_for(
    m: &Match,
    format: &MatchFormat,
    points: &PointsConfig,
) -> CoreResult<Vec<ScoreRecord>> {
    let (Some(t1), Some(t2)) = (m.team1.team_id, m.team2.team_id) else {
        return Err(CoreError::InvalidInput {
            field: "match",
            message: format!("match {} does not have two teams", m.id),
        });
    };
    let winner = winner_of(m);

    let record = |team: TeamId, opponent: TeamId, own: &SideScore, other: &SideScore| {
        let result = match winner {
            None => MatchResult::Tied,
            Some(w) if w == team => MatchResult::Won,
            Some(_) => MatchResult::Lost,
        };
        let earned = match result {
            MatchResult::Won => points.win,
            MatchResult::Tied => points.tie,
            MatchResult::Lost => points.loss,
        };
        ScoreRecord {
            match_id: m.id,
            team_id: team,
            opponent_id: opponent,
            result,
            points: earned,
            runs_for: own.runs,
            balls_for: nrr_balls(own, format),
            runs_against: other.runs,
            balls_against: nrr_balls(other, format),
            nrr_bonus: own.nrr_bonus,
        }
    };

    Ok(vec![
        record(t1, t2, &m.team1, &m.team2),
        record(t2, t1, &m.team2, &m.team1),
    ])
}

/// Publish a completed match: recompute both sides from their ideas, set
/// the winner and write fresh score records, all in one transaction.
pub fn publish(
    db: &Database,
    match_id: MatchId,
    format: &MatchFormat,
    points: &PointsConfig,
) -> CoreResult<PublishOutcome> {
    let outcome = db.write(|tx| {
        let m = fetch_match(tx, match_id)?;
        if m.published {
            return Ok(PublishOutcome::AlreadyPublished);
        }
        if m.status != MatchStatus::Completed {
            return Err(CoreError::InvalidMatchState {
                match_id,
                status: m.status.as_str(),
                expected: MatchStatus::Completed.as_str(),
            });
        }

        let m = recompute_match(tx, match_id)?;
        let records = score_records_for(&m, format, points)?;
        let winner = winner_of(&m);

        tx.execute(
            "DELETE FROM score_records WHERE match_id = ?1",
            params![match_id],
        )?;
        {
            let mut insert = tx.prepare(
                "INSERT INTO score_records
                     (match_id, team_id, opponent_id, result, points,
                      runs_for, balls_for, runs_against, balls_against, nrr_bonus)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            )?;
            for r in &records {
                insert.execute(params![
                    r.match_id,
                    r.team_id,
                    r.opponent_id,
                    r.result,
                    r.points,
                    r.runs_for,
                    r.balls_for,
                    r.runs_against,
                    r.balls_against,
                    r.nrr_bonus,
                ])?;
            }
        }
        let changed = tx.execute(
            "UPDATE matches SET published = 1, winner_id = ?1 WHERE id = ?2 AND published = 0",
            params![winner, match_id],
        )?;
        if changed == 0 {
            return Err(CoreError::Conflict(format!(
                "match {match_id} was published concurrently"
            )));
        }
        Ok(PublishOutcome::Published { winner, records })
    })?;

    if let PublishOutcome::Published { winner, .. } = &outcome {
        info!(%match_id, winner = ?winner, "match published");
    }
    Ok(outcome)
}

/// Remove a match from the standings. Returns `false` when it was not
/// published. Ideas are left alone.
pub fn unpublish(db: &Database, match_id: MatchId) -> CoreResult<bool> {
    let changed = db.write(|tx| {
        fetch_match(tx, match_id)?;
        tx.execute(
            "DELETE FROM score_records WHERE match_id = ?1",
            params![match_id],
        )?;
        let changed = tx.execute(
            "UPDATE matches SET published = 0, winner_id = NULL WHERE id = ?1 AND published = 1",
            params![match_id],
        )?;
        Ok(changed > 0)
    })?;
    if changed {
        info!(%match_id, "match unpublished");
    }
    Ok(changed)
}
