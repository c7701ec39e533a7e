// League table and player leaderboard.
//
// Both are recomputed from scratch on every call: the team table from the
// score records of published matches, the leaderboard from the real (not
// virtual) balls of published matches.

use std::cmp::Ordering;
use std::collections::HashMap;

use rusqlite::Connection;
use serde::Serialize;

use crate::db::{list_teams, SCORE_COLUMNS};
use crate::error::CoreResult;
use crate::ids::{PlayerId, TeamId};
use crate::models::{overs_display, MatchResult, ScoreRecord, Team};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TeamStanding {
    pub team_id: TeamId,
    pub name: String,
    pub played: u32,
    pub won: u32,
    pub tied: u32,
    pub lost: u32,
    pub points: i64,
    pub runs_for: u32,
    pub balls_for: u32,
    pub runs_against: u32,
    pub balls_against: u32,
    pub nrr_bonus: f64,
    pub nrr: f64,
}

impl TeamStanding {
    fn empty(team: &Team) -> Self {
        Self {
            team_id: team.id,
            name: team.name.clone(),
            played: 0,
            won: 0,
            tied: 0,
            lost: 0,
            points: 0,
            runs_for: 0,
            balls_for: 0,
            runs_against: 0,
            balls_against: 0,
            nrr_bonus: 0.0,
            nrr: 0.0,
        }
    }

    pub fn overs_faced(&self) -> String {
        overs_display(self.balls_for)
    }

    pub fn overs_bowled(&self) -> String {
        overs_display(self.balls_against)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlayerStanding {
    pub player_id: PlayerId,
    pub name: String,
    pub team_id: Option<TeamId>,
    pub balls: u32,
    pub runs: u32,
    pub dismissals: u32,
    pub fours: u32,
    pub sixes: u32,
    pub average_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Standings {
    pub teams: Vec<TeamStanding>,
    pub players: Vec<PlayerStanding>,
}

/// Runs per over, 0 when no balls were bowled.
fn run_rate(runs: u32, balls: u32) -> f64 {
    if balls == 0 {
        0.0
    } else {
        f64::from(runs) / (f64::from(balls) / 6.0)
    }
}

/// Net run rate: scoring rate minus conceding rate.
pub fn net_run_rate(runs_for: u32, balls_for: u32, runs_against: u32, balls_against: u32) -> f64 {
    run_rate(runs_for, balls_for) - run_rate(runs_against, balls_against)
}

/// Points desc, NRR desc, wins desc, then name.
fn rank(a: &TeamStanding, b: &TeamStanding) -> Ordering {
    b.points
        .cmp(&a.points)
        .then_with(|| b.nrr.total_cmp(&a.nrr))
        .then_with(|| b.won.cmp(&a.won))
        .then_with(|| a.name.cmp(&b.name))
}

/// Fold score records into a ranked table. Every team appears, played or
/// not. Records for unknown teams are ignored.
pub fn team_table(teams: &[Team], records: &[ScoreRecord]) -> Vec<TeamStanding> {
    let mut rows: HashMap<TeamId, TeamStanding> = teams
        .iter()
        .map(|t| (t.id, TeamStanding::empty(t)))
        .collect();

    for r in records {
        let Some(row) = rows.get_mut(&r.team_id) else {
            continue;
        };
        row.played += 1;
        match r.result {
            MatchResult::Won => row.won += 1,
            MatchResult::Tied => row.tied += 1,
            MatchResult::Lost => row.lost += 1,
        }
        row.points += r.points;
        row.runs_for += r.runs_for;
        row.balls_for += r.balls_for;
        row.runs_against += r.runs_against;
        row.balls_against += r.balls_against;
        row.nrr_bonus += r.nrr_bonus;
    }

    let mut table: Vec<TeamStanding> = rows
        .into_values()
        .map(|mut row| {
            row.nrr = net_run_rate(
                row.runs_for,
                row.balls_for,
                row.runs_against,
                row.balls_against,
            ) + row.nrr_bonus;
            row
        })
        .collect();
    table.sort_by(rank);
    table
}

fn player_table(conn: &Connection) -> CoreResult<Vec<PlayerStanding>> {
    let mut stmt = conn.prepare(
        "SELECT p.id, p.name, p.team_id,
                COUNT(*),
                COALESCE(SUM(i.runs), 0),
                COALESCE(SUM(i.is_wicket), 0),
                COALESCE(SUM(CASE WHEN i.runs = 4 THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN i.runs = 6 THEN 1 ELSE 0 END), 0),
                AVG(i.score)
         FROM ideas i
         JOIN matches m ON m.id = i.match_id
         JOIN players p ON p.id = i.captain_id
         WHERE m.published = 1 AND i.is_virtual = 0
         GROUP BY p.id
         ORDER BY 5 DESC, 9 DESC, p.name ASC",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok(PlayerStanding {
                player_id: row.get(0)?,
                name: row.get(1)?,
                team_id: row.get(2)?,
                balls: row.get(3)?,
                runs: row.get(4)?,
                dismissals: row.get(5)?,
                fours: row.get(6)?,
                sixes: row.get(7)?,
                average_score: row.get(8)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Full standings from the current database state.
pub fn standings(conn: &Connection) -> CoreResult<Standings> {
    let teams = list_teams(conn)?;
    let mut stmt = conn.prepare(&format!(
        "SELECT {SCORE_COLUMNS} FROM score_records s
         WHERE EXISTS (SELECT 1 FROM matches m WHERE m.id = s.match_id AND m.published = 1)"
    ))?;
    let records = stmt
        .query_map([], crate::db::score_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Standings {
        teams: team_table(&teams, &records),
        players: player_table(conn)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::MatchId;

    fn team(id: i64, name: &str) -> Team {
        Team {
            id: TeamId(id),
            name: name.into(),
            balance: 0,
            owner_id: None,
            captain_id: None,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn rec(
        m: i64,
        t: i64,
        o: i64,
        result: MatchResult,
        points: i64,
        rf: u32,
        bf: u32,
        ra: u32,
        ba: u32,
    ) -> ScoreRecord {
        ScoreRecord {
            match_id: MatchId(m),
            team_id: TeamId(t),
            opponent_id: TeamId(o),
            result,
            points,
            runs_for: rf,
            balls_for: bf,
            runs_against: ra,
            balls_against: ba,
            nrr_bonus: 0.0,
        }
    }

    #[test]
    fn zero_balls_give_zero_rate() {
        assert_eq!(net_run_rate(0, 0, 0, 0), 0.0);
        assert_eq!(net_run_rate(12, 6, 0, 0), 12.0);
    }

    #[test]
    fn win_plus_tie_scores_three_points() {
        let teams = [team(1, "A"), team(2, "B")];
        let records = [
            rec(1, 1, 2, MatchResult::Won, 2, 10, 6, 8, 6),
            rec(1, 2, 1, MatchResult::Lost, 0, 8, 6, 10, 6),
            rec(2, 1, 2, MatchResult::Tied, 1, 7, 6, 7, 6),
            rec(2, 2, 1, MatchResult::Tied, 1, 7, 6, 7, 6),
        ];
        let table = team_table(&teams, &records);
        let a = &table[0];
        assert_eq!(a.name, "A");
        assert_eq!((a.played, a.won, a.tied, a.lost), (2, 1, 1, 0));
        assert_eq!(a.points, 3);
        // 17 runs off 2 overs minus 15 off 2 overs.
        assert!((a.nrr - 1.0).abs() < 1e-9);
        assert!((table[1].nrr + 1.0).abs() < 1e-9);
    }

    #[test]
    fn ties_broken_by_nrr_then_wins_then_name() {
        let teams = [team(1, "Zebras"), team(2, "Ants"), team(3, "Moles")];
        let records = [
            rec(1, 1, 3, MatchResult::Won, 2, 20, 6, 10, 6),
            rec(2, 2, 3, MatchResult::Won, 2, 12, 6, 10, 6),
        ];
        let table = team_table(&teams, &records);
        assert_eq!(table[0].name, "Zebras");
        assert_eq!(table[1].name, "Ants");

        let table = team_table(&[team(1, "Zebras"), team(2, "Ants")], &[]);
        assert_eq!(table[0].name, "Ants");
    }

    #[test]
    fn bonus_is_added_to_nrr() {
        let teams = [team(1, "A")];
        let mut r = rec(1, 1, 2, MatchResult::Won, 2, 6, 6, 6, 6);
        r.nrr_bonus = 0.5;
        let table = team_table(&teams, &[r]);
        assert!((table[0].nrr - 0.5).abs() < 1e-9);
    }

    #[test]
    fn unplayed_teams_are_listed() {
        let table = team_table(&[team(1, "A"), team(2, "B")], &[]);
        assert_eq!(table.len(), 2);
        assert!(table.iter().all(|t| t.played == 0 && t.nrr == 0.0));
    }
}
