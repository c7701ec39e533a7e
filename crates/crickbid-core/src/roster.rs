// Roster cap checks, evaluated against live state at bid time.

use rusqlite::{params, Connection};

use crate::error::CoreResult;
use crate::ids::{PlayerId, TeamId};

/// Players the team won at auction. Captains are assigned, not auctioned,
/// and do not count.
pub fn won_count(conn: &Connection, team: TeamId) -> CoreResult<usize> {
    let n: i64 = conn.query_row(
        "SELECT COUNT(*) FROM players WHERE team_id = ?1 AND auctioned = 1",
        params![team],
        |row| row.get(0),
    )?;
    Ok(n as usize)
}

/// Open lots, other than `except`, on which `team` is the leading bidder.
pub fn leading_count(conn: &Connection, team: TeamId, except: PlayerId) -> CoreResult<usize> {
    let n: i64 = conn.query_row(
        "SELECT COUNT(*) FROM players
         WHERE auction_status = 'active' AND current_bidder = ?1 AND id <> ?2",
        params![team, except],
        |row| row.get(0),
    )?;
    Ok(n as usize)
}

/// Whether `team` may bid on `player` without exceeding `cap`.
///
/// Leading bids on other open lots are counted as if already won, so a team
/// cannot end up over the cap when several lots close at once.
pub fn can_accept_bid(
    conn: &Connection,
    team: TeamId,
    player: PlayerId,
    cap: usize,
) -> CoreResult<bool> {
    let committed = won_count(conn, team)? + leading_count(conn, team, player)?;
    Ok(committed < cap)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::tests::{new_player, test_db};

    fn give(db: &crate::db::Database, team: TeamId, n: usize) {
        for i in 0..n {
            let p = db.add_player(&new_player(&format!("P{i}"), 10)).unwrap();
            db.write(|tx| {
                tx.execute(
                    "UPDATE players SET team_id = ?1, auctioned = 1, sold_price = 10,
                     auction_status = 'sold' WHERE id = ?2",
                    params![team, p],
                )?;
                Ok(())
            })
            .unwrap();
        }
    }

    #[test]
    fn below_cap_accepts() {
        let db = test_db();
        let team = db.insert_team("Falcons", 0).unwrap();
        give(&db, team, 4);
        let target = db.add_player(&new_player("Next", 10)).unwrap();
        assert!(db.read(|c| can_accept_bid(c, team, target, 5)).unwrap());
    }

    #[test]
    fn at_cap_refuses() {
        let db = test_db();
        let team = db.insert_team("Falcons", 0).unwrap();
        give(&db, team, 5);
        let target = db.add_player(&new_player("Next", 10)).unwrap();
        assert!(!db.read(|c| can_accept_bid(c, team, target, 5)).unwrap());
    }

    #[test]
    fn captain_does_not_count() {
        let db = test_db();
        let team = db.insert_team("Falcons", 0).unwrap();
        let cap = db.add_player(&new_player("Cap", 0)).unwrap();
        db.set_team_leadership(team, Some(cap), None).unwrap();
        assert_eq!(db.read(|c| won_count(c, team)).unwrap(), 0);
    }

    #[test]
    fn leading_bids_elsewhere_count() {
        let db = test_db();
        let team = db.insert_team("Falcons", 0).unwrap();
        give(&db, team, 4);
        let other = db.add_player(&new_player("Other", 10)).unwrap();
        let target = db.add_player(&new_player("Target", 10)).unwrap();
        db.write(|tx| {
            tx.execute(
                "UPDATE players SET auction_status = 'active', current_bidder = ?1 WHERE id = ?2",
                params![team, other],
            )?;
            Ok(())
        })
        .unwrap();

        assert!(!db.read(|c| can_accept_bid(c, team, target, 5)).unwrap());
        // Raising its own lead on the same lot is still allowed.
        assert!(db.read(|c| can_accept_bid(c, team, other, 5)).unwrap());
    }
}
