// Dot-ball backfill.
//
// Balls that elapse on the match clock without a real submission become
// virtual dot balls. Wall-clock time only decides how far the confirmed
// counter should have advanced; the counter itself never goes back and a
// slot that already holds a ball is never overwritten.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::Serialize;
use tracing::{debug, info};

use super::aggregate::{innings_complete, recompute_team_totals};
use crate::config::MatchFormat;
use crate::db::{fetch_match, Database};
use crate::error::CoreResult;
use crate::ids::MatchId;
use crate::models::{Match, MatchStatus, Side};

/// What one advance did to a match.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BackfillReport {
    /// Virtual balls inserted for side one and side two.
    pub inserted: [u32; 2],
    /// This call moved the match to review.
    pub capped: bool,
}

/// Ball count the match clock says should have been bowled by `now`.
pub fn target_balls(m: &Match, now: DateTime<Utc>, format: &MatchFormat) -> u32 {
    let Some(started) = m.started_at else {
        return 0;
    };
    let elapsed = (now - started).num_seconds().max(0) as u64;
    let due = elapsed / u64::from(format.ball_interval_secs.max(1));
    due.min(u64::from(format.max_balls)) as u32
}

/// Advance one side to `target`. Returns the number of virtual balls added.
fn advance_side(
    conn: &Connection,
    m: &Match,
    side: Side,
    target: u32,
    now: DateTime<Utc>,
    format: &MatchFormat,
) -> CoreResult<u32> {
    let score = m.side(side);
    let Some(team) = score.team_id else {
        return Ok(0);
    };
    if target <= score.balls_confirmed {
        return Ok(0);
    }

    let mut inserted = 0;
    if score.wickets < format.max_wickets {
        let mut stmt = conn.prepare(
            "INSERT OR IGNORE INTO ideas
                 (match_id, team_id, content, score, runs, is_wicket, is_extra,
                  ball_index, scale, is_virtual, created_at)
             VALUES (?1, ?2, '', 0, 0, 0, 0, ?3, 'initial', 1, ?4)",
        )?;
        for index in (score.balls_confirmed + 1)..=target {
            inserted += stmt.execute(params![m.id, team, index, now.timestamp_millis()])? as u32;
        }
    }

    let prefix = side.prefix();
    conn.execute(
        &format!(
            "UPDATE matches SET {prefix}_confirmed = MAX({prefix}_confirmed, ?1) WHERE id = ?2"
        ),
        params![target, m.id],
    )?;
    if inserted > 0 {
        recompute_team_totals(conn, m.id, team)?;
    }
    Ok(inserted)
}

/// Bring an in-progress match up to the match clock, then send it to review
/// once both innings are complete. The status flip is conditional, so only
/// one caller ever reports `capped`.
pub fn advance_virtual_balls(
    conn: &Connection,
    match_id: MatchId,
    now: DateTime<Utc>,
    format: &MatchFormat,
) -> CoreResult<BackfillReport> {
    let m = fetch_match(conn, match_id)?;
    let mut report = BackfillReport::default();
    if m.status != MatchStatus::InProgress || m.published {
        return Ok(report);
    }

    let target = target_balls(&m, now, format);
    report.inserted[0] = advance_side(conn, &m, Side::One, target, now, format)?;
    report.inserted[1] = advance_side(conn, &m, Side::Two, target, now, format)?;

    let m = fetch_match(conn, match_id)?;
    let both_done = m.team1.team_id.is_some()
        && m.team2.team_id.is_some()
        && innings_complete(&m.team1, format)
        && innings_complete(&m.team2, format);
    if both_done {
        let changed = conn.execute(
            "UPDATE matches SET status = 'review_pending' WHERE id = ?1 AND status = 'in_progress'",
            params![match_id],
        )?;
        report.capped = changed == 1;
        if report.capped {
            info!(%match_id, "both innings complete, match awaiting review");
        }
    }
    if report.inserted != [0, 0] {
        debug!(%match_id, inserted = ?report.inserted, target, "virtual balls added");
    }
    Ok(report)
}

/// Advance every in-progress match, one transaction each.
pub fn advance_all(
    db: &Database,
    now: DateTime<Utc>,
    format: &MatchFormat,
) -> CoreResult<Vec<(MatchId, BackfillReport)>> {
    let live: Vec<MatchId> = db.read(|c| {
        let mut stmt = c.prepare(
            "SELECT id FROM matches WHERE status = 'in_progress' AND published = 0 ORDER BY id",
        )?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    })?;

    live.into_iter()
        .map(|id| {
            let report = db.write(|tx| advance_virtual_balls(tx, id, now, format))?;
            Ok((id, report))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::from_millis;
    use crate::db::tests::test_db;
    use crate::db::list_ideas;
    use crate::models::MatchKind;
    use chrono::Duration;

    fn live_match(db: &Database, start: DateTime<Utc>) -> (MatchId, crate::ids::TeamId) {
        let a = db.insert_team("A", 0).unwrap();
        let b = db.insert_team("B", 0).unwrap();
        let m = db.create_match(MatchKind::League, Some(a), Some(b)).unwrap();
        db.write(|tx| {
            tx.execute(
                "UPDATE matches SET status = 'in_progress', started_at = ?1 WHERE id = ?2",
                params![start.timestamp_millis(), m],
            )?;
            Ok(())
        })
        .unwrap();
        (m, a)
    }

    fn small() -> MatchFormat {
        MatchFormat {
            max_balls: 6,
            max_wickets: 2,
            ball_interval_secs: 10,
        }
    }

    #[test]
    fn fills_elapsed_balls_with_dots() {
        let db = test_db();
        let t0 = from_millis(0);
        let (m, a) = live_match(&db, t0);

        let report = db
            .write(|tx| advance_virtual_balls(tx, m, t0 + Duration::seconds(35), &small()))
            .unwrap();
        assert_eq!(report.inserted, [3, 3]);
        assert!(!report.capped);

        let ideas = db.ideas_for(m, a).unwrap();
        assert_eq!(ideas.len(), 3);
        assert!(ideas.iter().all(|i| i.is_virtual && i.outcome.runs == 0));
        let row = db.get_match(m).unwrap();
        assert_eq!(row.team1.balls, 3);
        assert_eq!(row.team1.balls_confirmed, 3);
    }

    #[test]
    fn real_balls_are_never_overwritten() {
        let db = test_db();
        let t0 = from_millis(0);
        let (m, a) = live_match(&db, t0);
        db.write(|tx| {
            tx.execute(
                "INSERT INTO ideas (match_id, team_id, content, score, runs, is_wicket, ball_index, created_at)
                 VALUES (?1, ?2, 'real', 90, 6, 0, 2, 0)",
                params![m, a],
            )?;
            Ok(())
        })
        .unwrap();

        db.write(|tx| advance_virtual_balls(tx, m, t0 + Duration::seconds(30), &small()))
            .unwrap();
        let ideas = db.read(|c| list_ideas(c, m, Some(a))).unwrap();
        assert_eq!(ideas.len(), 3);
        assert_eq!(ideas[1].content, "real");
        assert!(!ideas[1].is_virtual);
        assert_eq!(db.get_match(m).unwrap().team1.runs, 6);
    }

    #[test]
    fn confirmed_counter_never_decreases() {
        let db = test_db();
        let t0 = from_millis(100_000);
        let (m, _) = live_match(&db, t0);
        let fmt = small();

        db.write(|tx| advance_virtual_balls(tx, m, t0 + Duration::seconds(40), &fmt))
            .unwrap();
        // Clock stepped backwards.
        let report = db
            .write(|tx| advance_virtual_balls(tx, m, t0 + Duration::seconds(5), &fmt))
            .unwrap();
        assert_eq!(report.inserted, [0, 0]);
        assert_eq!(db.get_match(m).unwrap().team1.balls_confirmed, 4);
    }

    #[test]
    fn caps_and_moves_to_review_exactly_once() {
        let db = test_db();
        let t0 = from_millis(0);
        let (m, a) = live_match(&db, t0);
        let fmt = small();
        let late = t0 + Duration::minutes(10);

        let first = db
            .write(|tx| advance_virtual_balls(tx, m, late, &fmt))
            .unwrap();
        assert!(first.capped);
        assert_eq!(db.ideas_for(m, a).unwrap().len(), 6);
        assert_eq!(db.get_match(m).unwrap().status, MatchStatus::ReviewPending);

        let second = db
            .write(|tx| advance_virtual_balls(tx, m, late, &fmt))
            .unwrap();
        assert_eq!(second, BackfillReport::default());
    }

    #[test]
    fn all_out_side_gets_no_more_balls() {
        let db = test_db();
        let t0 = from_millis(0);
        let (m, a) = live_match(&db, t0);
        db.write(|tx| {
            for idx in 1..=2u32 {
                tx.execute(
                    "INSERT INTO ideas (match_id, team_id, content, score, runs, is_wicket, ball_index, created_at)
                     VALUES (?1, ?2, 'weak', 10, 0, 1, ?3, 0)",
                    params![m, a, idx],
                )?;
            }
            recompute_team_totals(tx, m, a)?;
            Ok(())
        })
        .unwrap();

        let report = db
            .write(|tx| advance_virtual_balls(tx, m, t0 + Duration::minutes(5), &small()))
            .unwrap();
        assert_eq!(report.inserted, [0, 6]);
        assert!(report.capped);
        assert_eq!(db.ideas_for(m, a).unwrap().len(), 2);
    }

    #[test]
    fn advance_all_skips_idle_matches() {
        let db = test_db();
        let t0 = from_millis(0);
        let (live, _) = live_match(&db, t0);
        let a = db.insert_team("C", 0).unwrap();
        let b = db.insert_team("D", 0).unwrap();
        db.create_match(MatchKind::League, Some(a), Some(b)).unwrap();

        let reports = advance_all(&db, t0 + Duration::seconds(20), &small()).unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].0, live);
    }
}
