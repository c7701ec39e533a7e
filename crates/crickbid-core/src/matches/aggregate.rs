// Match totals are always re-derived from the full set of ideas, never
// incremented, so concurrent submissions cannot lose a contribution.

use rusqlite::{params, Connection};
use serde::Serialize;

use crate::config::MatchFormat;
use crate::db::fetch_match;
use crate::error::{CoreError, CoreResult};
use crate::ids::{MatchId, TeamId};
use crate::models::{Match, Side, SideScore};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TeamTotals {
    pub runs: u32,
    pub wickets: u32,
    /// Legal deliveries. Extras score but do not count as a ball.
    pub balls: u32,
}

/// Sum the ideas of (match, team).
pub fn aggregate(conn: &Connection, match_id: MatchId, team: TeamId) -> CoreResult<TeamTotals> {
    let totals = conn.query_row(
        "SELECT COALESCE(SUM(runs), 0),
                COALESCE(SUM(is_wicket), 0),
                COALESCE(SUM(CASE WHEN is_extra = 0 THEN 1 ELSE 0 END), 0)
         FROM ideas WHERE match_id = ?1 AND team_id = ?2",
        params![match_id, team],
        |row| {
            Ok(TeamTotals {
                runs: row.get(0)?,
                wickets: row.get(1)?,
                balls: row.get(2)?,
            })
        },
    )?;
    Ok(totals)
}

pub(crate) fn side_for(m: &Match, team: TeamId) -> CoreResult<Side> {
    m.side_of(team).ok_or(CoreError::TeamNotInMatch {
        match_id: m.id,
        team,
    })
}

/// Re-aggregate (match, team) and write the result into the team's side of
/// the match row. Calling it again without new ideas changes nothing.
pub fn recompute_team_totals(
    conn: &Connection,
    match_id: MatchId,
    team: TeamId,
) -> CoreResult<TeamTotals> {
    let m = fetch_match(conn, match_id)?;
    let side = side_for(&m, team)?;
    let totals = aggregate(conn, match_id, team)?;
    let prefix = side.prefix();
    conn.execute(
        &format!(
            "UPDATE matches SET {prefix}_runs = ?1, {prefix}_wickets = ?2, {prefix}_balls = ?3
             WHERE id = ?4"
        ),
        params![totals.runs, totals.wickets, totals.balls, match_id],
    )?;
    Ok(totals)
}

/// Recompute both sides that have a team assigned.
pub fn recompute_match(conn: &Connection, match_id: MatchId) -> CoreResult<Match> {
    let m = fetch_match(conn, match_id)?;
    for team in [m.team1.team_id, m.team2.team_id].into_iter().flatten() {
        recompute_team_totals(conn, match_id, team)?;
    }
    fetch_match(conn, match_id)
}

/// Whether a side's innings is over: out of balls or all out.
pub fn innings_complete(side: &SideScore, format: &MatchFormat) -> bool {
    side.balls >= format.max_balls || side.wickets >= format.max_wickets
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::tests::test_db;
    use crate::models::MatchKind;

    fn insert_ball(conn: &Connection, m: MatchId, team: TeamId, idx: u32, runs: u8, wicket: bool) {
        conn.execute(
            "INSERT INTO ideas (match_id, team_id, content, score, runs, is_wicket, ball_index, created_at)
             VALUES (?1, ?2, 'idea', 50, ?3, ?4, ?5, 0)",
            params![m, team, runs, wicket, idx],
        )
        .unwrap();
    }

    #[test]
    fn totals_match_sum_of_ideas_and_are_idempotent() {
        let db = test_db();
        let a = db.insert_team("A", 0).unwrap();
        let b = db.insert_team("B", 0).unwrap();
        let m = db.create_match(MatchKind::League, Some(a), Some(b)).unwrap();

        let totals = db
            .write(|tx| {
                insert_ball(tx, m, a, 1, 6, false);
                insert_ball(tx, m, a, 2, 0, true);
                insert_ball(tx, m, a, 3, 4, false);
                insert_ball(tx, m, b, 1, 1, false);
                recompute_team_totals(tx, m, a)
            })
            .unwrap();
        assert_eq!(
            totals,
            TeamTotals {
                runs: 10,
                wickets: 1,
                balls: 3
            }
        );

        let again = db.write(|tx| recompute_team_totals(tx, m, a)).unwrap();
        assert_eq!(again, totals);

        let row = db.get_match(m).unwrap();
        assert_eq!(row.team1.runs, 10);
        assert_eq!(row.team1.wickets, 1);
        // Side two not recomputed yet.
        assert_eq!(row.team2.runs, 0);

        let row = db.write(|tx| recompute_match(tx, m)).unwrap();
        assert_eq!(row.team2.runs, 1);
    }

    #[test]
    fn outsider_team_is_rejected() {
        let db = test_db();
        let a = db.insert_team("A", 0).unwrap();
        let b = db.insert_team("B", 0).unwrap();
        let c = db.insert_team("C", 0).unwrap();
        let m = db.create_match(MatchKind::League, Some(a), Some(b)).unwrap();
        assert!(matches!(
            db.write(|tx| recompute_team_totals(tx, m, c)),
            Err(CoreError::TeamNotInMatch { .. })
        ));
    }

    #[test]
    fn innings_ends_on_balls_or_wickets() {
        let format = MatchFormat::default();
        let mut side = SideScore {
            team_id: None,
            runs: 0,
            wickets: 0,
            balls: 119,
            balls_confirmed: 0,
            summary: None,
            nrr_bonus: 0.0,
        };
        assert!(!innings_complete(&side, &format));
        side.balls = 120;
        assert!(innings_complete(&side, &format));
        side.balls = 30;
        side.wickets = 10;
        assert!(innings_complete(&side, &format));
    }
}
