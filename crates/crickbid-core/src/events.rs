// Change feed for waiting clients.
//
// Pollers stay correct without it; the feed only wakes them sooner.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

use crate::auction::FinalizeOutcome;
use crate::ids::{MatchId, PlayerId, TeamId};
use crate::reset::ResetScope;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LeagueEvent {
    LotOpened {
        player: PlayerId,
        expires_at: Option<DateTime<Utc>>,
    },
    BidAccepted {
        player: PlayerId,
        team: TeamId,
        amount: i64,
        expires_at: DateTime<Utc>,
    },
    LotClosed {
        outcome: FinalizeOutcome,
    },
    PlayerReleased {
        player: PlayerId,
        team: TeamId,
        refund: i64,
    },
    BallRecorded {
        match_id: MatchId,
        team: TeamId,
        ball_index: u32,
        runs: u8,
        is_wicket: bool,
    },
    InningsCapped {
        match_id: MatchId,
    },
    MatchPublished {
        match_id: MatchId,
        winner: Option<TeamId>,
    },
    MatchUnpublished {
        match_id: MatchId,
    },
    Reset {
        scope: ResetScope,
    },
}

/// Fan-out of `LeagueEvent`s. Lagging subscribers drop the oldest events.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<LeagueEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LeagueEvent> {
        self.tx.subscribe()
    }

    /// Send to current subscribers. Having none is not an error.
    pub fn publish(&self, event: LeagueEvent) {
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
