// Rules for a single open lot, checked against a snapshot of the player row.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{CoreError, CoreResult};
use crate::ids::{PlayerId, TeamId};
use crate::models::{AuctionStatus, Bid, Player};

/// Smallest acceptable bid on the lot: the base price while nobody has bid,
/// then anything strictly above the current bid.
pub fn minimum_bid(player: &Player) -> i64 {
    match player.current_bidder {
        None => player.base_price,
        Some(_) => player.current_bid.saturating_add(1),
    }
}

/// The lot must be open and its window not yet elapsed.
pub fn check_open(player: &Player, now: DateTime<Utc>) -> CoreResult<()> {
    match player.status {
        AuctionStatus::Sold => Err(CoreError::AlreadySold(player.id)),
        AuctionStatus::Idle => Err(CoreError::AuctionNotActive(player.id)),
        AuctionStatus::Active => match player.expires_at {
            Some(expiry) if now < expiry => Ok(()),
            _ => Err(CoreError::AuctionExpired(player.id)),
        },
    }
}

pub fn check_amount(player: &Player, amount: i64) -> CoreResult<()> {
    let minimum = minimum_bid(player);
    if amount < minimum {
        return Err(CoreError::BidTooLow { amount, minimum });
    }
    Ok(())
}

/// An open lot as shown to bidders.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LotView {
    pub player_id: PlayerId,
    pub player_name: String,
    pub pool: String,
    pub base_price: i64,
    pub current_bid: i64,
    pub current_bidder: Option<TeamId>,
    pub leader_name: Option<String>,
    pub minimum_bid: i64,
    pub expires_at: Option<DateTime<Utc>>,
    pub seconds_left: i64,
    /// Accepted bids on this player, oldest first.
    pub history: Vec<Bid>,
}

impl LotView {
    pub fn new(
        player: &Player,
        leader_name: Option<String>,
        history: Vec<Bid>,
        now: DateTime<Utc>,
    ) -> Self {
        let seconds_left = player
            .expires_at
            .map(|e| (e - now).num_seconds().max(0))
            .unwrap_or(0);
        Self {
            player_id: player.id,
            player_name: player.name.clone(),
            pool: player.pool.clone(),
            base_price: player.base_price,
            current_bid: player.current_bid,
            current_bidder: player.current_bidder,
            leader_name,
            minimum_bid: minimum_bid(player),
            expires_at: player.expires_at,
            seconds_left,
            history,
        }
    }
}

/// Result of trying to close a lot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum FinalizeOutcome {
    Sold {
        player: PlayerId,
        team: TeamId,
        price: i64,
    },
    /// Closed with no bidder. The player is back in the pool at base price.
    Unsold { player: PlayerId },
    /// Someone else already closed it. Nothing changed.
    AlreadyClosed {
        player: PlayerId,
        status: AuctionStatus,
    },
    NotExpired {
        player: PlayerId,
        expires_at: Option<DateTime<Utc>>,
    },
}

impl FinalizeOutcome {
    /// Whether this call performed the transition.
    pub fn closed_now(&self) -> bool {
        matches!(
            self,
            FinalizeOutcome::Sold { .. } | FinalizeOutcome::Unsold { .. }
        )
    }
}

/// Snapshot returned by the status poll.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuctionView {
    pub open: Vec<LotView>,
    /// Lots this poll closed on the way in.
    pub closed: Vec<FinalizeOutcome>,
}

impl AuctionView {
    pub fn is_idle(&self) -> bool {
        self.open.is_empty()
    }

    pub fn current(&self) -> Option<&LotView> {
        self.open.first()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn active(base: i64, bid: i64, bidder: Option<TeamId>, now: DateTime<Utc>) -> Player {
        Player {
            id: PlayerId(1),
            name: "Asha".into(),
            rating: 80.0,
            pool: "A".into(),
            base_price: base,
            team_id: None,
            sold_price: None,
            auctioned: false,
            status: AuctionStatus::Active,
            current_bid: bid,
            current_bidder: bidder,
            expires_at: Some(now + Duration::seconds(30)),
        }
    }

    #[test]
    fn base_price_is_enough_without_bidder() {
        let now = Utc::now();
        let p = active(250_000, 250_000, None, now);
        assert!(check_amount(&p, 250_000).is_ok());
        assert!(matches!(
            check_amount(&p, 249_999),
            Err(CoreError::BidTooLow {
                minimum: 250_000,
                ..
            })
        ));
    }

    #[test]
    fn equal_bid_rejected_once_someone_leads() {
        let now = Utc::now();
        let p = active(250_000, 255_000, Some(TeamId(2)), now);
        assert!(matches!(
            check_amount(&p, 255_000),
            Err(CoreError::BidTooLow {
                amount: 255_000,
                minimum: 255_001
            })
        ));
        assert!(check_amount(&p, 255_001).is_ok());
    }

    #[test]
    fn window_is_half_open() {
        let now = Utc::now();
        let mut p = active(10, 10, None, now);
        p.expires_at = Some(now);
        assert!(matches!(
            check_open(&p, now),
            Err(CoreError::AuctionExpired(_))
        ));
        assert!(check_open(&p, now - Duration::milliseconds(1)).is_ok());
    }

    #[test]
    fn closed_lots_are_not_open() {
        let now = Utc::now();
        let mut p = active(10, 10, None, now);
        p.status = AuctionStatus::Idle;
        assert!(matches!(
            check_open(&p, now),
            Err(CoreError::AuctionNotActive(_))
        ));
        p.status = AuctionStatus::Sold;
        assert!(matches!(check_open(&p, now), Err(CoreError::AlreadySold(_))));
    }

    #[test]
    fn view_counts_down() {
        let now = Utc::now();
        let p = active(10, 10, None, now);
        let view = LotView::new(&p, None, vec![], now + Duration::seconds(12));
        assert_eq!(view.seconds_left, 18);
        assert_eq!(view.minimum_bid, 10);
        let late = LotView::new(&p, None, vec![], now + Duration::seconds(90));
        assert_eq!(late.seconds_left, 0);
    }
}
