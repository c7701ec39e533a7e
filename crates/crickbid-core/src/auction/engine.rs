// Auction state machine: open, bid, close.
//
// Every transition is a conditional UPDATE keyed on the state the caller last
// read, executed inside an immediate transaction. Several processes may drive
// the same database file; whichever commit lands first wins and the others
// observe the new state.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use tracing::{debug, info};

use super::lot::{self, FinalizeOutcome, LotView};
use crate::config::AuctionConfig;
use crate::db::{bids_for_player, fetch_player, fetch_team, player_from_row, Database, PLAYER_COLUMNS};
use crate::error::{CoreError, CoreResult};
use crate::ids::{PlayerId, TeamId};
use crate::ledger;
use crate::models::{AuctionStatus, Caller, Player, Team};
use crate::roster;

/// An accepted bid.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BidReceipt {
    pub bid_id: i64,
    pub player: PlayerId,
    pub team: TeamId,
    pub amount: i64,
    pub expires_at: DateTime<Utc>,
}

/// The caller must be an admin or the captain/owner of record of `team`.
///
/// The team row is re-read so a stale team claim from the session layer is
/// never trusted.
pub fn authorize(conn: &Connection, caller: &Caller, team: TeamId) -> CoreResult<Team> {
    let record = fetch_team(conn, team)?;
    if caller.is_admin() {
        return Ok(record);
    }
    let Some(pid) = caller.player_id else {
        return Err(CoreError::Unauthorized(team));
    };
    let of_record = record.captain_id == Some(pid) || record.owner_id == Some(pid);
    if caller.team_id != Some(team) || !of_record {
        return Err(CoreError::Unauthorized(team));
    }
    Ok(record)
}

pub fn require_admin(caller: &Caller) -> CoreResult<()> {
    if caller.is_admin() {
        Ok(())
    } else {
        Err(CoreError::AdminOnly)
    }
}

/// Any open lot other than `except`.
fn other_open_lot(conn: &Connection, except: PlayerId) -> CoreResult<Option<PlayerId>> {
    let id = conn
        .query_row(
            "SELECT id FROM players WHERE auction_status = 'active' AND id <> ?1
             ORDER BY id LIMIT 1",
            params![except],
            |row| row.get(0),
        )
        .optional()?;
    Ok(id)
}

/// Open a lot for `player`. The bid resets to the base price with no bidder
/// and the window starts now.
pub fn start(
    db: &Database,
    player: PlayerId,
    now: DateTime<Utc>,
    config: &AuctionConfig,
) -> CoreResult<Player> {
    db.write(|tx| {
        let current = fetch_player(tx, player)?;
        match current.status {
            AuctionStatus::Sold => return Err(CoreError::AlreadySold(player)),
            AuctionStatus::Active => return Err(CoreError::AlreadyActive(player)),
            AuctionStatus::Idle => {}
        }
        if let Some(team) = current.team_id {
            return Err(CoreError::InvalidInput {
                field: "player",
                message: format!("player {player} already belongs to team {team}"),
            });
        }
        if config.single_lot {
            if let Some(open) = other_open_lot(tx, player)? {
                return Err(CoreError::LotInProgress(open));
            }
        }

        let expires = now + config.bid_window();
        let changed = tx.execute(
            "UPDATE players
             SET auction_status = 'active', current_bid = base_price,
                 current_bidder = NULL, expires_at = ?1
             WHERE id = ?2 AND auction_status = 'idle'",
            params![expires.timestamp_millis(), player],
        )?;
        if changed == 0 {
            return Err(CoreError::Conflict(format!(
                "player {player} changed state while opening"
            )));
        }
        info!(%player, name = %current.name, expires = %expires, "lot opened");
        fetch_player(tx, player)
    })
}

/// Place a bid of `amount` for `team` on `player`'s open lot.
///
/// Checks run in a fixed order: authorization, lot open, amount, funds,
/// roster. A rejected bid leaves the lot untouched. Validation and the write
/// share one immediate transaction, which holds the database write lock, so
/// no other bid can land in between on this or any other connection.
pub fn place_bid(
    db: &Database,
    caller: &Caller,
    player: PlayerId,
    team: TeamId,
    amount: i64,
    now: DateTime<Utc>,
    config: &AuctionConfig,
) -> CoreResult<BidReceipt> {
    db.read(|c| authorize(c, caller, team))?;

    match db.write(|tx| try_bid(tx, player, team, amount, now, config)) {
        Ok(receipt) => {
            info!(%player, %team, amount, "bid accepted");
            Ok(receipt)
        }
        Err(e) => {
            debug!(%player, %team, amount, error = %e, "bid rejected");
            Err(e)
        }
    }
}

/// Validate then write, inside the caller's transaction.
fn try_bid(
    conn: &Connection,
    player: PlayerId,
    team: TeamId,
    amount: i64,
    now: DateTime<Utc>,
    config: &AuctionConfig,
) -> CoreResult<BidReceipt> {
    let lot_state = fetch_player(conn, player)?;
    lot::check_open(&lot_state, now)?;
    lot::check_amount(&lot_state, amount)?;

    // Leading bids on other open lots are already spoken for.
    let available = ledger::available(conn, team, player)?;
    if amount > available {
        return Err(CoreError::InsufficientFunds {
            team,
            balance: available,
            required: amount,
        });
    }

    if !roster::can_accept_bid(conn, team, player, config.roster_cap)? {
        return Err(CoreError::RosterFull(team));
    }

    let now_ms = now.timestamp_millis();
    let expires = now + config.bid_window();
    let changed = conn.execute(
        "UPDATE players
         SET current_bid = ?1, current_bidder = ?2, expires_at = ?3
         WHERE id = ?4
           AND auction_status = 'active'
           AND expires_at > ?5
           AND current_bid = ?6
           AND current_bidder IS ?7",
        params![
            amount,
            team,
            expires.timestamp_millis(),
            player,
            now_ms,
            lot_state.current_bid,
            lot_state.current_bidder,
        ],
    )?;
    // Keyed on the state read above. Only a writer bypassing the immediate
    // transaction could make this miss.
    if changed == 0 {
        return Err(CoreError::Conflict(format!(
            "lot for player {player} changed while bidding"
        )));
    }

    let bid_id = conn.query_row(
        "INSERT INTO bids (player_id, team_id, amount, placed_at)
         VALUES (?1, ?2, ?3, ?4) RETURNING id",
        params![player, team, amount, now_ms],
        |row| row.get(0),
    )?;

    Ok(BidReceipt {
        bid_id,
        player,
        team,
        amount,
        expires_at: expires,
    })
}

/// Close `player`'s lot if its window has elapsed (or at once when `force`
/// is set).
///
/// With a bidder the player is sold: status, owner and price flip in one
/// conditional UPDATE and the winner is debited in the same transaction. If
/// the debit fails the whole transition rolls back and the lot stays open.
/// Without a bidder the player goes back to the pool at base price.
///
/// Closing an already closed lot is a no-op that reports `AlreadyClosed`.
pub fn finalize(
    db: &Database,
    player: PlayerId,
    now: DateTime<Utc>,
    force: bool,
) -> CoreResult<FinalizeOutcome> {
    let deadline = if force { i64::MAX } else { now.timestamp_millis() };

    let outcome = db.write(|tx| {
        let sold: Option<(TeamId, i64)> = tx
            .query_row(
                "UPDATE players
                 SET auction_status = 'sold', team_id = current_bidder,
                     sold_price = current_bid, auctioned = 1, expires_at = NULL
                 WHERE id = ?1 AND auction_status = 'active'
                   AND expires_at <= ?2 AND current_bidder IS NOT NULL
                 RETURNING team_id, sold_price",
                params![player, deadline],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        if let Some((team, price)) = sold {
            ledger::debit(tx, team, price)?;
            return Ok(FinalizeOutcome::Sold {
                player,
                team,
                price,
            });
        }

        let unsold = tx.execute(
            "UPDATE players
             SET auction_status = 'idle', current_bid = base_price,
                 current_bidder = NULL, expires_at = NULL
             WHERE id = ?1 AND auction_status = 'active'
               AND expires_at <= ?2 AND current_bidder IS NULL",
            params![player, deadline],
        )?;
        if unsold > 0 {
            return Ok(FinalizeOutcome::Unsold { player });
        }

        let current = fetch_player(tx, player)?;
        Ok(match current.status {
            AuctionStatus::Active => FinalizeOutcome::NotExpired {
                player,
                expires_at: current.expires_at,
            },
            status => FinalizeOutcome::AlreadyClosed { player, status },
        })
    })?;

    match &outcome {
        FinalizeOutcome::Sold { team, price, .. } => {
            info!(%player, %team, price, "lot sold");
        }
        FinalizeOutcome::Unsold { .. } => info!(%player, "lot closed unsold"),
        _ => {}
    }
    Ok(outcome)
}

/// Close an open lot without a sale. Accepted bids stay in the audit log.
pub fn cancel(db: &Database, player: PlayerId) -> CoreResult<Player> {
    db.write(|tx| {
        let changed = tx.execute(
            "UPDATE players
             SET auction_status = 'idle', current_bid = base_price,
                 current_bidder = NULL, expires_at = NULL
             WHERE id = ?1 AND auction_status = 'active'",
            params![player],
        )?;
        if changed == 0 {
            let current = fetch_player(tx, player)?;
            return Err(match current.status {
                AuctionStatus::Sold => CoreError::AlreadySold(player),
                _ => CoreError::AuctionNotActive(player),
            });
        }
        info!(%player, "lot cancelled");
        fetch_player(tx, player)
    })
}

/// Sell `player` to `team` directly at `price` (base price when `None`).
/// Works on idle and open lots alike; the roster cap and the wallet still
/// apply.
pub fn force_assign(
    db: &Database,
    player: PlayerId,
    team: TeamId,
    price: Option<i64>,
    now: DateTime<Utc>,
    config: &AuctionConfig,
) -> CoreResult<Player> {
    db.write(|tx| {
        let current = fetch_player(tx, player)?;
        if current.status == AuctionStatus::Sold {
            return Err(CoreError::AlreadySold(player));
        }
        if current.team_id.is_some() {
            return Err(CoreError::InvalidInput {
                field: "player",
                message: format!("player {player} already belongs to a team"),
            });
        }
        fetch_team(tx, team)?;
        let price = price.unwrap_or(current.base_price);
        if price < 0 {
            return Err(CoreError::InvalidInput {
                field: "price",
                message: format!("must be >= 0, got {price}"),
            });
        }
        if !roster::can_accept_bid(tx, team, player, config.roster_cap)? {
            return Err(CoreError::RosterFull(team));
        }

        ledger::debit(tx, team, price)?;
        let changed = tx.execute(
            "UPDATE players
             SET auction_status = 'sold', team_id = ?1, sold_price = ?2, auctioned = 1,
                 current_bid = ?2, current_bidder = ?1, expires_at = NULL
             WHERE id = ?3 AND auction_status <> 'sold'",
            params![team, price, player],
        )?;
        if changed == 0 {
            return Err(CoreError::AlreadySold(player));
        }
        tx.execute(
            "INSERT INTO bids (player_id, team_id, amount, placed_at) VALUES (?1, ?2, ?3, ?4)",
            params![player, team, price, now.timestamp_millis()],
        )?;
        info!(%player, %team, price, "player force-assigned");
        fetch_player(tx, player)
    })
}

/// Undo a sale: refund the price to the team and return the player to the
/// pool.
pub fn release(db: &Database, player: PlayerId) -> CoreResult<(TeamId, i64)> {
    db.write(|tx| {
        let current = fetch_player(tx, player)?;
        let (Some(team), Some(price), AuctionStatus::Sold) =
            (current.team_id, current.sold_price, current.status)
        else {
            return Err(CoreError::InvalidInput {
                field: "player",
                message: format!("player {player} was not sold at auction"),
            });
        };

        let changed = tx.execute(
            "UPDATE players
             SET auction_status = 'idle', team_id = NULL, sold_price = NULL, auctioned = 0,
                 current_bid = base_price, current_bidder = NULL, expires_at = NULL
             WHERE id = ?1 AND auction_status = 'sold'",
            params![player],
        )?;
        if changed == 0 {
            return Err(CoreError::Conflict(format!("player {player} changed state")));
        }
        ledger::credit(tx, team, price)?;
        info!(%player, %team, refund = price, "player released");
        Ok((team, price))
    })
}

/// Delete a player who was never bid on. Anyone with bid history stays, so
/// the audit log keeps every row.
pub fn remove_player(db: &Database, player: PlayerId) -> CoreResult<()> {
    db.write(|tx| {
        let current = fetch_player(tx, player)?;
        if current.status == AuctionStatus::Sold {
            return Err(CoreError::AlreadySold(player));
        }
        if current.status == AuctionStatus::Active {
            return Err(CoreError::AlreadyActive(player));
        }
        let bids: i64 = tx.query_row(
            "SELECT COUNT(*) FROM bids WHERE player_id = ?1",
            params![player],
            |row| row.get(0),
        )?;
        if bids > 0 {
            return Err(CoreError::InvalidInput {
                field: "player",
                message: format!("player {player} has {bids} recorded bids"),
            });
        }
        tx.execute(
            "UPDATE teams SET captain_id = NULL WHERE captain_id = ?1",
            params![player],
        )?;
        tx.execute(
            "UPDATE teams SET owner_id = NULL WHERE owner_id = ?1",
            params![player],
        )?;
        tx.execute("DELETE FROM players WHERE id = ?1", params![player])?;
        info!(%player, "player removed");
        Ok(())
    })
}

/// Every open lot with its leader's name and bid history.
pub fn open_lots(conn: &Connection, now: DateTime<Utc>) -> CoreResult<Vec<LotView>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {PLAYER_COLUMNS} FROM players WHERE auction_status = 'active' ORDER BY expires_at, id"
    ))?;
    let players = stmt
        .query_map([], player_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    players
        .iter()
        .map(|p| -> CoreResult<LotView> {
            let leader = match p.current_bidder {
                Some(team) => Some(fetch_team(conn, team)?.name),
                None => None,
            };
            let history = bids_for_player(conn, p.id)?;
            Ok(LotView::new(p, leader, history, now))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::tests::{new_player, test_db};
    use chrono::Duration;

    struct Fixture {
        db: Database,
        x: TeamId,
        y: TeamId,
        cap_x: Caller,
        cap_y: Caller,
        config: AuctionConfig,
        t0: DateTime<Utc>,
    }

    fn fixture() -> Fixture {
        let db = test_db();
        let x = db.insert_team("X", 1_000_000).unwrap();
        let y = db.insert_team("Y", 1_000_000).unwrap();
        let px = db.add_player(&new_player("Cap X", 0)).unwrap();
        let py = db.add_player(&new_player("Cap Y", 0)).unwrap();
        db.set_team_leadership(x, Some(px), None).unwrap();
        db.set_team_leadership(y, Some(py), None).unwrap();
        Fixture {
            db,
            x,
            y,
            cap_x: Caller::captain(px, x),
            cap_y: Caller::captain(py, y),
            config: AuctionConfig::default(),
            t0: crate::clock::from_millis(1_767_225_600_000),
        }
    }

    #[test]
    fn start_opens_lot_at_base_price() {
        let f = fixture();
        let p = f.db.add_player(&new_player("Asha", 250_000)).unwrap();
        let lot = start(&f.db, p, f.t0, &f.config).unwrap();
        assert_eq!(lot.status, AuctionStatus::Active);
        assert_eq!(lot.current_bid, 250_000);
        assert_eq!(lot.expires_at, Some(f.t0 + Duration::seconds(30)));
        assert!(matches!(
            start(&f.db, p, f.t0, &f.config),
            Err(CoreError::AlreadyActive(_))
        ));
    }

    #[test]
    fn single_lot_mode_blocks_second_lot() {
        let f = fixture();
        let a = f.db.add_player(&new_player("A", 10)).unwrap();
        let b = f.db.add_player(&new_player("B", 10)).unwrap();
        start(&f.db, a, f.t0, &f.config).unwrap();
        assert!(matches!(
            start(&f.db, b, f.t0, &f.config),
            Err(CoreError::LotInProgress(open)) if open == a
        ));

        let relaxed = AuctionConfig {
            single_lot: false,
            ..AuctionConfig::default()
        };
        assert!(start(&f.db, b, f.t0, &relaxed).is_ok());
    }

    #[test]
    fn bid_extends_window() {
        let f = fixture();
        let p = f.db.add_player(&new_player("Asha", 250_000)).unwrap();
        start(&f.db, p, f.t0, &f.config).unwrap();

        let later = f.t0 + Duration::seconds(20);
        let receipt = place_bid(&f.db, &f.cap_x, p, f.x, 250_000, later, &f.config).unwrap();
        assert_eq!(receipt.expires_at, later + Duration::seconds(30));

        let lot = f.db.player(p).unwrap();
        assert_eq!(lot.current_bidder, Some(f.x));
        assert_eq!(lot.expires_at, Some(later + Duration::seconds(30)));
        assert_eq!(f.db.bids_for(p).unwrap().len(), 1);
        // Balance untouched until the lot closes.
        assert_eq!(f.db.team(f.x).unwrap().balance, 1_000_000);
    }

    #[test]
    fn rejected_bid_leaves_lot_unchanged() {
        let f = fixture();
        let p = f.db.add_player(&new_player("Asha", 100)).unwrap();
        start(&f.db, p, f.t0, &f.config).unwrap();
        place_bid(&f.db, &f.cap_x, p, f.x, 150, f.t0, &f.config).unwrap();
        let before = f.db.player(p).unwrap();

        let late = f.t0 + Duration::seconds(5);
        assert!(place_bid(&f.db, &f.cap_y, p, f.y, 150, late, &f.config).is_err());
        assert!(place_bid(&f.db, &f.cap_y, p, f.y, 2_000_000, late, &f.config).is_err());

        assert_eq!(f.db.player(p).unwrap(), before);
        assert_eq!(f.db.bids_for(p).unwrap().len(), 1);
    }

    #[test]
    fn wrong_team_claim_is_unauthorized() {
        let f = fixture();
        let p = f.db.add_player(&new_player("Asha", 100)).unwrap();
        start(&f.db, p, f.t0, &f.config).unwrap();
        // Captain of Y claiming to bid for X.
        let forged = Caller {
            team_id: Some(f.x),
            ..f.cap_y
        };
        assert!(matches!(
            place_bid(&f.db, &forged, p, f.x, 100, f.t0, &f.config),
            Err(CoreError::Unauthorized(t)) if t == f.x
        ));
        assert!(place_bid(&f.db, &Caller::admin(), p, f.x, 100, f.t0, &f.config).is_ok());
    }

    #[test]
    fn bid_after_expiry_is_refused() {
        let f = fixture();
        let p = f.db.add_player(&new_player("Asha", 100)).unwrap();
        start(&f.db, p, f.t0, &f.config).unwrap();
        let at_expiry = f.t0 + Duration::seconds(30);
        assert!(matches!(
            place_bid(&f.db, &f.cap_x, p, f.x, 100, at_expiry, &f.config),
            Err(CoreError::AuctionExpired(_))
        ));
    }

    #[test]
    fn finalize_sells_once() {
        let f = fixture();
        let p = f.db.add_player(&new_player("Asha", 250_000)).unwrap();
        start(&f.db, p, f.t0, &f.config).unwrap();
        place_bid(&f.db, &f.cap_x, p, f.x, 250_000, f.t0, &f.config).unwrap();

        let early = finalize(&f.db, p, f.t0 + Duration::seconds(10), false).unwrap();
        assert!(matches!(early, FinalizeOutcome::NotExpired { .. }));

        let end = f.t0 + Duration::seconds(31);
        let first = finalize(&f.db, p, end, false).unwrap();
        assert_eq!(
            first,
            FinalizeOutcome::Sold {
                player: p,
                team: f.x,
                price: 250_000
            }
        );
        let second = finalize(&f.db, p, end, false).unwrap();
        assert!(matches!(
            second,
            FinalizeOutcome::AlreadyClosed {
                status: AuctionStatus::Sold,
                ..
            }
        ));
        assert_eq!(f.db.team(f.x).unwrap().balance, 750_000);
        let sold = f.db.player(p).unwrap();
        assert_eq!(sold.team_id, Some(f.x));
        assert_eq!(sold.sold_price, Some(250_000));
    }

    #[test]
    fn finalize_without_bidder_returns_to_pool() {
        let f = fixture();
        let p = f.db.add_player(&new_player("Asha", 100)).unwrap();
        start(&f.db, p, f.t0, &f.config).unwrap();
        let out = finalize(&f.db, p, f.t0 + Duration::seconds(30), false).unwrap();
        assert_eq!(out, FinalizeOutcome::Unsold { player: p });
        let idle = f.db.player(p).unwrap();
        assert_eq!(idle.status, AuctionStatus::Idle);
        assert_eq!(idle.current_bid, 100);
        // Can be listed again.
        assert!(start(&f.db, p, f.t0 + Duration::seconds(60), &f.config).is_ok());
    }

    #[test]
    fn failed_debit_rolls_back_the_sale() {
        let f = fixture();
        let p = f.db.add_player(&new_player("Asha", 100)).unwrap();
        start(&f.db, p, f.t0, &f.config).unwrap();
        place_bid(&f.db, &f.cap_x, p, f.x, 500, f.t0, &f.config).unwrap();
        f.db.write(|tx| {
            tx.execute("UPDATE teams SET balance = 10 WHERE id = ?1", params![f.x])?;
            Ok(())
        })
        .unwrap();

        let err = finalize(&f.db, p, f.t0 + Duration::seconds(40), false).unwrap_err();
        assert!(matches!(err, CoreError::InsufficientFunds { .. }));
        let lot = f.db.player(p).unwrap();
        assert_eq!(lot.status, AuctionStatus::Active);
        assert!(lot.team_id.is_none());
        assert_eq!(f.db.team(f.x).unwrap().balance, 10);
    }

    #[test]
    fn forced_close_ignores_window() {
        let f = fixture();
        let p = f.db.add_player(&new_player("Asha", 100)).unwrap();
        start(&f.db, p, f.t0, &f.config).unwrap();
        place_bid(&f.db, &f.cap_y, p, f.y, 120, f.t0, &f.config).unwrap();
        let out = finalize(&f.db, p, f.t0, true).unwrap();
        assert!(matches!(out, FinalizeOutcome::Sold { price: 120, .. }));
    }

    #[test]
    fn cancel_keeps_audit_rows() {
        let f = fixture();
        let p = f.db.add_player(&new_player("Asha", 100)).unwrap();
        start(&f.db, p, f.t0, &f.config).unwrap();
        place_bid(&f.db, &f.cap_x, p, f.x, 100, f.t0, &f.config).unwrap();
        let idle = cancel(&f.db, p).unwrap();
        assert_eq!(idle.status, AuctionStatus::Idle);
        assert!(idle.current_bidder.is_none());
        assert_eq!(f.db.bids_for(p).unwrap().len(), 1);
        assert!(matches!(cancel(&f.db, p), Err(CoreError::AuctionNotActive(_))));
    }

    #[test]
    fn force_assign_then_release_refunds() {
        let f = fixture();
        let p = f.db.add_player(&new_player("Asha", 300)).unwrap();
        let sold = force_assign(&f.db, p, f.y, None, f.t0, &f.config).unwrap();
        assert_eq!(sold.sold_price, Some(300));
        assert_eq!(f.db.team(f.y).unwrap().balance, 999_700);
        assert!(matches!(
            force_assign(&f.db, p, f.x, Some(10), f.t0, &f.config),
            Err(CoreError::AlreadySold(_))
        ));

        let (team, refund) = release(&f.db, p).unwrap();
        assert_eq!((team, refund), (f.y, 300));
        assert_eq!(f.db.team(f.y).unwrap().balance, 1_000_000);
        assert_eq!(f.db.player(p).unwrap().status, AuctionStatus::Idle);
    }

    #[test]
    fn sold_players_cannot_be_removed() {
        let f = fixture();
        let p = f.db.add_player(&new_player("Asha", 300)).unwrap();
        force_assign(&f.db, p, f.y, None, f.t0, &f.config).unwrap();
        assert!(matches!(
            remove_player(&f.db, p),
            Err(CoreError::AlreadySold(_))
        ));
        let q = f.db.add_player(&new_player("Ben", 300)).unwrap();
        remove_player(&f.db, q).unwrap();
        assert!(matches!(f.db.player(q), Err(CoreError::PlayerNotFound(_))));
    }

    #[test]
    fn released_player_with_bids_is_kept() {
        let f = fixture();
        let p = f.db.add_player(&new_player("Asha", 100)).unwrap();
        start(&f.db, p, f.t0, &f.config).unwrap();
        place_bid(&f.db, &f.cap_x, p, f.x, 150, f.t0, &f.config).unwrap();
        finalize(&f.db, p, f.t0, true).unwrap();
        release(&f.db, p).unwrap();
        assert_eq!(f.db.bids_for(p).unwrap().len(), 1);

        let err = remove_player(&f.db, p).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Validation);
        assert_eq!(f.db.bids_for(p).unwrap().len(), 1);
        assert_eq!(f.db.player(p).unwrap().status, AuctionStatus::Idle);
    }

    #[test]
    fn leading_bids_on_other_lots_reserve_funds() {
        let f = fixture();
        let config = AuctionConfig {
            single_lot: false,
            ..AuctionConfig::default()
        };
        let poor = f.db.insert_team("Z", 1_000).unwrap();
        let a = f.db.add_player(&new_player("A", 100)).unwrap();
        let b = f.db.add_player(&new_player("B", 100)).unwrap();
        start(&f.db, a, f.t0, &config).unwrap();
        start(&f.db, b, f.t0, &config).unwrap();

        let admin = Caller::admin();
        place_bid(&f.db, &admin, a, poor, 800, f.t0, &config).unwrap();
        let err = place_bid(&f.db, &admin, b, poor, 800, f.t0, &config).unwrap_err();
        assert!(matches!(
            err,
            CoreError::InsufficientFunds {
                balance: 200,
                required: 800,
                ..
            }
        ));
        assert_eq!(f.db.player(b).unwrap().current_bidder, None);

        // Raising its own leading bid only counts the other lots.
        place_bid(&f.db, &admin, a, poor, 1_000, f.t0, &config).unwrap();
        place_bid(&f.db, &admin, b, poor, 100, f.t0, &config).unwrap_err();

        // Once outbid on A the money is free again.
        place_bid(&f.db, &f.cap_x, a, f.x, 1_001, f.t0, &config).unwrap();
        place_bid(&f.db, &admin, b, poor, 800, f.t0, &config).unwrap();

        let later = f.t0 + Duration::seconds(31);
        assert!(matches!(
            finalize(&f.db, b, later, false).unwrap(),
            FinalizeOutcome::Sold { price: 800, .. }
        ));
        assert_eq!(f.db.team(poor).unwrap().balance, 200);
    }

    #[test]
    fn open_lots_show_leader_and_history() {
        let f = fixture();
        let p = f.db.add_player(&new_player("Asha", 100)).unwrap();
        start(&f.db, p, f.t0, &f.config).unwrap();
        place_bid(&f.db, &f.cap_x, p, f.x, 100, f.t0, &f.config).unwrap();
        place_bid(&f.db, &f.cap_y, p, f.y, 110, f.t0, &f.config).unwrap();

        let lots = f.db.read(|c| open_lots(c, f.t0)).unwrap();
        assert_eq!(lots.len(), 1);
        assert_eq!(lots[0].leader_name.as_deref(), Some("Y"));
        assert_eq!(lots[0].minimum_bid, 111);
        assert_eq!(lots[0].history.len(), 2);
    }
}
