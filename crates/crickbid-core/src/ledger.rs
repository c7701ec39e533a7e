// Team wallet ledger.
//
// Balances only move through these functions. They take a connection so the
// caller decides the transaction boundary: a sale debits inside the same
// transaction that assigns the player.

use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use crate::db::fetch_team;
use crate::error::{CoreError, CoreResult};
use crate::ids::{PlayerId, TeamId};

fn check_amount(amount: i64) -> CoreResult<()> {
    if amount < 0 {
        return Err(CoreError::InvalidInput {
            field: "amount",
            message: format!("must be >= 0, got {amount}"),
        });
    }
    Ok(())
}

/// Current balance of `team`.
pub fn balance(conn: &Connection, team: TeamId) -> CoreResult<i64> {
    Ok(fetch_team(conn, team)?.balance)
}

/// Sum of `team`'s leading bids on open lots other than `except`. Each one
/// becomes a debit when its lot closes.
pub fn committed(conn: &Connection, team: TeamId, except: PlayerId) -> CoreResult<i64> {
    let total: i64 = conn.query_row(
        "SELECT COALESCE(SUM(current_bid), 0) FROM players
         WHERE auction_status = 'active' AND current_bidder = ?1 AND id <> ?2",
        params![team, except],
        |row| row.get(0),
    )?;
    Ok(total)
}

/// What `team` can still bid on `player`'s lot: balance less committed bids.
pub fn available(conn: &Connection, team: TeamId, player: PlayerId) -> CoreResult<i64> {
    Ok(balance(conn, team)? - committed(conn, team, player)?)
}

/// Subtract `amount` from the team's balance, failing with
/// `InsufficientFunds` if it would go negative. Returns the new balance.
///
/// The check and the write are one conditional `UPDATE`, so two debits
/// racing on the same team can never overdraw it.
pub fn debit(conn: &Connection, team: TeamId, amount: i64) -> CoreResult<i64> {
    check_amount(amount)?;
    let updated: Option<i64> = conn
        .query_row(
            "UPDATE teams SET balance = balance - ?1
             WHERE id = ?2 AND balance >= ?1
             RETURNING balance",
            params![amount, team],
            |row| row.get(0),
        )
        .optional()?;

    match updated {
        Some(new_balance) => {
            debug!(%team, amount, new_balance, "debited team");
            Ok(new_balance)
        }
        None => {
            let current = balance(conn, team)?;
            Err(CoreError::InsufficientFunds {
                team,
                balance: current,
                required: amount,
            })
        }
    }
}

/// Add `amount` to the team's balance. Returns the new balance.
pub fn credit(conn: &Connection, team: TeamId, amount: i64) -> CoreResult<i64> {
    check_amount(amount)?;
    let updated: Option<i64> = conn
        .query_row(
            "UPDATE teams SET balance = balance + ?1 WHERE id = ?2 RETURNING balance",
            params![amount, team],
            |row| row.get(0),
        )
        .optional()?;
    let new_balance = updated.ok_or(CoreError::TeamNotFound(team))?;
    debug!(%team, amount, new_balance, "credited team");
    Ok(new_balance)
}

/// Admin topup. Same as `credit` but the amount must be positive.
pub fn topup(conn: &Connection, team: TeamId, amount: i64) -> CoreResult<i64> {
    if amount <= 0 {
        return Err(CoreError::InvalidInput {
            field: "amount",
            message: format!("topup must be positive, got {amount}"),
        });
    }
    credit(conn, team, amount)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::tests::{new_player, test_db};

    #[test]
    fn debit_reduces_balance() {
        let db = test_db();
        let team = db.insert_team("Falcons", 1_000_000).unwrap();
        let left = db.write(|tx| debit(tx, team, 250_000)).unwrap();
        assert_eq!(left, 750_000);
        assert_eq!(db.team(team).unwrap().balance, 750_000);
    }

    #[test]
    fn debit_of_entire_balance_reaches_zero() {
        let db = test_db();
        let team = db.insert_team("Falcons", 500).unwrap();
        assert_eq!(db.write(|tx| debit(tx, team, 500)).unwrap(), 0);
    }

    #[test]
    fn overdraw_is_refused_and_leaves_balance() {
        let db = test_db();
        let team = db.insert_team("Falcons", 100).unwrap();
        let err = db.write(|tx| debit(tx, team, 101)).unwrap_err();
        match err {
            CoreError::InsufficientFunds {
                balance, required, ..
            } => {
                assert_eq!(balance, 100);
                assert_eq!(required, 101);
            }
            other => panic!("expected InsufficientFunds, got {other}"),
        }
        assert_eq!(db.team(team).unwrap().balance, 100);
    }

    #[test]
    fn committed_sums_leading_bids_on_other_lots() {
        let db = test_db();
        let team = db.insert_team("Falcons", 1_000).unwrap();
        let a = db.add_player(&new_player("A", 100)).unwrap();
        let b = db.add_player(&new_player("B", 100)).unwrap();
        db.write(|tx| {
            tx.execute(
                "UPDATE players SET auction_status = 'active', current_bid = 600,
                 current_bidder = ?1 WHERE id = ?2",
                params![team, a],
            )?;
            Ok(())
        })
        .unwrap();

        let (others, mine) = db
            .read(|c| Ok((available(c, team, b)?, available(c, team, a)?)))
            .unwrap();
        assert_eq!(others, 400);
        assert_eq!(mine, 1_000);
    }

    #[test]
    fn unknown_team_is_not_found() {
        let db = test_db();
        assert!(matches!(
            db.write(|tx| debit(tx, TeamId(42), 1)),
            Err(CoreError::TeamNotFound(TeamId(42)))
        ));
        assert!(matches!(
            db.write(|tx| credit(tx, TeamId(42), 1)),
            Err(CoreError::TeamNotFound(TeamId(42)))
        ));
    }

    #[test]
    fn negative_amounts_rejected() {
        let db = test_db();
        let team = db.insert_team("Falcons", 100).unwrap();
        assert!(db.write(|tx| debit(tx, team, -5)).is_err());
        assert!(db.write(|tx| credit(tx, team, -5)).is_err());
        assert!(db.write(|tx| topup(tx, team, 0)).is_err());
        assert_eq!(db.team(team).unwrap().balance, 100);
    }

    #[test]
    fn credit_and_topup_add() {
        let db = test_db();
        let team = db.insert_team("Falcons", 100).unwrap();
        db.write(|tx| credit(tx, team, 50)).unwrap();
        db.write(|tx| topup(tx, team, 25)).unwrap();
        assert_eq!(db.read(|c| balance(c, team)).unwrap(), 175);
    }
}
