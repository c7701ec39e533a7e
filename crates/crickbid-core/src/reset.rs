// Bulk maintenance resets. Each scope runs in one transaction.

use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::db::Database;
use crate::error::CoreResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResetScope {
    /// Every balance back to the starting balance.
    Wallets,
    /// Auctioned players back to the pool; open lots closed. Captains stay.
    Rosters,
    /// Ideas, score records and match progress wiped.
    MatchResults,
    /// Case studies marked unused.
    CaseUsage,
    /// All of the above plus the bid audit log.
    Everything,
}

/// Rows touched per table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResetReport {
    pub teams: usize,
    pub players: usize,
    pub bids: usize,
    pub matches: usize,
    pub ideas: usize,
    pub score_records: usize,
    pub case_studies: usize,
}

fn wallets(conn: &Connection, starting_balance: i64, report: &mut ResetReport) -> CoreResult<()> {
    report.teams += conn.execute("UPDATE teams SET balance = ?1", params![starting_balance])?;
    Ok(())
}

fn rosters(conn: &Connection, report: &mut ResetReport) -> CoreResult<()> {
    report.players += conn.execute(
        "UPDATE players
         SET team_id = NULL, sold_price = NULL, auctioned = 0, auction_status = 'idle',
             current_bid = base_price, current_bidder = NULL, expires_at = NULL
         WHERE auctioned = 1 OR auction_status <> 'idle'",
        [],
    )?;
    Ok(())
}

fn match_results(conn: &Connection, report: &mut ResetReport) -> CoreResult<()> {
    report.score_records += conn.execute("DELETE FROM score_records", [])?;
    report.ideas += conn.execute("DELETE FROM ideas", [])?;
    report.matches += conn.execute(
        "UPDATE matches
         SET status = 'scheduled', published = 0, winner_id = NULL, started_at = NULL,
             team1_runs = 0, team1_wickets = 0, team1_balls = 0, team1_confirmed = 0,
             team1_summary = NULL, team1_bonus = 0,
             team2_runs = 0, team2_wickets = 0, team2_balls = 0, team2_confirmed = 0,
             team2_summary = NULL, team2_bonus = 0",
        [],
    )?;
    Ok(())
}

fn case_usage(conn: &Connection, report: &mut ResetReport) -> CoreResult<()> {
    report.case_studies += conn.execute("UPDATE case_studies SET used = 0", [])?;
    Ok(())
}

/// Apply `scope`. Nothing outside the scope is touched, and a failure
/// leaves every table as it was.
pub fn reset(db: &Database, scope: ResetScope, starting_balance: i64) -> CoreResult<ResetReport> {
    let report = db.write(|tx| {
        let mut report = ResetReport::default();
        match scope {
            ResetScope::Wallets => wallets(tx, starting_balance, &mut report)?,
            ResetScope::Rosters => rosters(tx, &mut report)?,
            ResetScope::MatchResults => match_results(tx, &mut report)?,
            ResetScope::CaseUsage => case_usage(tx, &mut report)?,
            ResetScope::Everything => {
                wallets(tx, starting_balance, &mut report)?;
                rosters(tx, &mut report)?;
                match_results(tx, &mut report)?;
                case_usage(tx, &mut report)?;
                report.bids += tx.execute("DELETE FROM bids", [])?;
            }
        }
        Ok(report)
    })?;
    info!(?scope, ?report, "reset applied");
    Ok(report)
}
