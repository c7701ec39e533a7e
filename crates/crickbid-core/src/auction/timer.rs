// Expiry sweep. Called from every status poll and from the background tick;
// redundant calls are harmless because closing is a conditional update.

use chrono::{DateTime, Utc};
use rusqlite::params;
use tracing::warn;

use super::engine::finalize;
use super::lot::FinalizeOutcome;
use crate::db::Database;
use crate::error::CoreResult;
use crate::ids::PlayerId;

/// Close `player`'s lot if its window has elapsed.
pub fn finalize_if_expired(
    db: &Database,
    player: PlayerId,
    now: DateTime<Utc>,
) -> CoreResult<FinalizeOutcome> {
    finalize(db, player, now, false)
}

/// Close every lot whose window elapsed by `now`. Returns only the lots this
/// call closed. A lot whose winner can no longer pay stays open and is
/// logged; it needs an admin to cancel it or top the team up.
pub fn sweep_expired(db: &Database, now: DateTime<Utc>) -> CoreResult<Vec<FinalizeOutcome>> {
    let due: Vec<PlayerId> = db.read(|c| {
        let mut stmt = c.prepare(
            "SELECT id FROM players
             WHERE auction_status = 'active' AND expires_at <= ?1
             ORDER BY expires_at, id",
        )?;
        let ids = stmt
            .query_map(params![now.timestamp_millis()], |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    })?;

    let mut closed = Vec::new();
    for player in due {
        match finalize(db, player, now, false) {
            Ok(outcome) if outcome.closed_now() => closed.push(outcome),
            Ok(_) => {}
            Err(e) => warn!(%player, error = %e, "could not close expired lot"),
        }
    }
    Ok(closed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auction::engine::{place_bid, start};
    use crate::config::AuctionConfig;
    use crate::db::tests::{new_player, test_db};
    use crate::models::Caller;
    use chrono::Duration;

    #[test]
    fn sweep_closes_only_expired_lots() {
        let db = test_db();
        let team = db.insert_team("X", 1_000).unwrap();
        let config = AuctionConfig {
            single_lot: false,
            ..AuctionConfig::default()
        };
        let t0 = crate::clock::from_millis(1_000_000);

        let a = db.add_player(&new_player("A", 100)).unwrap();
        let b = db.add_player(&new_player("B", 100)).unwrap();
        start(&db, a, t0, &config).unwrap();
        start(&db, b, t0 + Duration::seconds(20), &config).unwrap();
        place_bid(&db, &Caller::admin(), a, team, 100, t0, &config).unwrap();

        let closed = sweep_expired(&db, t0 + Duration::seconds(31)).unwrap();
        assert_eq!(closed.len(), 1);
        assert!(matches!(closed[0], FinalizeOutcome::Sold { player, .. } if player == a));

        // A second sweep at the same instant finds nothing to do.
        assert!(sweep_expired(&db, t0 + Duration::seconds(31))
            .unwrap()
            .is_empty());
        assert_eq!(db.team(team).unwrap().balance, 900);

        let closed = sweep_expired(&db, t0 + Duration::seconds(60)).unwrap();
        assert_eq!(closed, vec![FinalizeOutcome::Unsold { player: b }]);
    }
}
