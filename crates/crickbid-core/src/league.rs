// The operations callers drive the league through.
//
// `League` is cheap to share behind an `Arc`. It holds no state of its own
// beyond injected collaborators; every operation reads and writes the
// database, so several `League`s (or processes) may serve the same file.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::auction::{engine, timer, AuctionView, BidReceipt, FinalizeOutcome};
use crate::clock::Clock;
use crate::config::{Config, Rules};
use crate::db::{fetch_match, Database};
use crate::error::{CoreError, CoreResult};
use crate::events::{EventBus, LeagueEvent};
use crate::ids::{IdeaId, MatchId, PlayerId, TeamId};
use crate::ledger;
use crate::matches::{
    self, aggregate::innings_complete, backfill, publish, BackfillReport, NewBall,
    PublishOutcome, RecordedBall, ScoreAdjustment,
};
use crate::models::{Caller, CaseStudy, Match, NewPlayer, Player};
use crate::reset::{self, ResetReport, ResetScope};
use crate::scoring::grader::Grader;
use crate::standings::{self, Standings};

/// What one background tick did.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TickReport {
    pub closed: Vec<FinalizeOutcome>,
    pub backfill: Vec<(MatchId, BackfillReport)>,
}

pub struct League {
    db: Arc<Database>,
    clock: Arc<dyn Clock>,
    grader: Arc<dyn Grader>,
    rules: Rules,
    starting_balance: i64,
    events: EventBus,
}

impl League {
    pub fn new(
        db: Arc<Database>,
        clock: Arc<dyn Clock>,
        grader: Arc<dyn Grader>,
        rules: Rules,
        starting_balance: i64,
    ) -> Self {
        Self {
            db,
            clock,
            grader,
            rules,
            starting_balance,
            events: EventBus::default(),
        }
    }

    pub fn from_config(
        db: Arc<Database>,
        clock: Arc<dyn Clock>,
        grader: Arc<dyn Grader>,
        config: &Config,
    ) -> Self {
        Self::new(
            db,
            clock,
            grader,
            config.rules.clone(),
            config.league.starting_balance,
        )
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn rules(&self) -> &Rules {
        &self.rules
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LeagueEvent> {
        self.events.subscribe()
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    fn announce_closed(&self, outcomes: &[FinalizeOutcome]) {
        for outcome in outcomes {
            self.events.publish(LeagueEvent::LotClosed {
                outcome: outcome.clone(),
            });
        }
    }

    // ------------------------------------------------------------------
    // Auction
    // ------------------------------------------------------------------

    /// Open a lot. Expired lots are closed first so a finished lot never
    /// blocks the next one.
    pub fn start_auction(&self, caller: &Caller, player: PlayerId) -> CoreResult<Player> {
        engine::require_admin(caller)?;
        let now = self.now();
        let closed = timer::sweep_expired(&self.db, now)?;
        self.announce_closed(&closed);

        let lot = engine::start(&self.db, player, now, &self.rules.auction)?;
        self.events.publish(LeagueEvent::LotOpened {
            player,
            expires_at: lot.expires_at,
        });
        Ok(lot)
    }

    pub fn place_bid(
        &self,
        caller: &Caller,
        player: PlayerId,
        team: TeamId,
        amount: i64,
    ) -> CoreResult<BidReceipt> {
        let receipt = engine::place_bid(
            &self.db,
            caller,
            player,
            team,
            amount,
            self.now(),
            &self.rules.auction,
        )?;
        self.events.publish(LeagueEvent::BidAccepted {
            player,
            team,
            amount,
            expires_at: receipt.expires_at,
        });
        Ok(receipt)
    }

    /// Status poll. Closes anything that expired, then reports open lots.
    pub fn auction_status(&self) -> CoreResult<AuctionView> {
        let now = self.now();
        let closed = timer::sweep_expired(&self.db, now)?;
        self.announce_closed(&closed);
        let open = self.db.read(|c| engine::open_lots(c, now))?;
        Ok(AuctionView { open, closed })
    }

    pub fn finalize_if_expired(&self, player: PlayerId) -> CoreResult<FinalizeOutcome> {
        let outcome = timer::finalize_if_expired(&self.db, player, self.now())?;
        if outcome.closed_now() {
            self.announce_closed(std::slice::from_ref(&outcome));
        }
        Ok(outcome)
    }

    /// Admin: close a lot now, selling to the leader if there is one.
    pub fn close_lot_now(&self, caller: &Caller, player: PlayerId) -> CoreResult<FinalizeOutcome> {
        engine::require_admin(caller)?;
        let outcome = engine::finalize(&self.db, player, self.now(), true)?;
        if outcome.closed_now() {
            self.announce_closed(std::slice::from_ref(&outcome));
        }
        Ok(outcome)
    }

    /// Admin: close a lot with no sale.
    pub fn cancel_lot(&self, caller: &Caller, player: PlayerId) -> CoreResult<Player> {
        engine::require_admin(caller)?;
        let idle = engine::cancel(&self.db, player)?;
        self.announce_closed(&[FinalizeOutcome::Unsold { player }]);
        Ok(idle)
    }

    pub fn force_assign(
        &self,
        caller: &Caller,
        player: PlayerId,
        team: TeamId,
        price: Option<i64>,
    ) -> CoreResult<Player> {
        engine::require_admin(caller)?;
        let sold =
            engine::force_assign(&self.db, player, team, price, self.now(), &self.rules.auction)?;
        self.announce_closed(&[FinalizeOutcome::Sold {
            player,
            team,
            price: sold.sold_price.unwrap_or(sold.base_price),
        }]);
        Ok(sold)
    }

    /// Admin: undo a sale and refund the team. Returns the refunded amount.
    pub fn release_player(&self, caller: &Caller, player: PlayerId) -> CoreResult<i64> {
        engine::require_admin(caller)?;
        let (team, refund) = engine::release(&self.db, player)?;
        self.events.publish(LeagueEvent::PlayerReleased {
            player,
            team,
            refund,
        });
        Ok(refund)
    }

    /// Admin: add funds. Returns the new balance.
    pub fn topup(&self, caller: &Caller, team: TeamId, amount: i64) -> CoreResult<i64> {
        engine::require_admin(caller)?;
        let balance = self.db.write(|tx| ledger::topup(tx, team, amount))?;
        info!(%team, amount, balance, "team topped up");
        Ok(balance)
    }

    pub fn add_player(&self, caller: &Caller, player: &NewPlayer) -> CoreResult<PlayerId> {
        engine::require_admin(caller)?;
        self.db.add_player(player)
    }

    pub fn remove_player(&self, caller: &Caller, player: PlayerId) -> CoreResult<()> {
        engine::require_admin(caller)?;
        engine::remove_player(&self.db, player)
    }

    // ------------------------------------------------------------------
    // Ideas and matches
    // ------------------------------------------------------------------

    /// Grade `content` and record it as `team`'s next ball.
    ///
    /// The grader runs outside any transaction. If it fails, nothing is
    /// stored and the error is retryable; an outage is never scored as a
    /// wicket.
    pub async fn submit_idea(
        &self,
        caller: &Caller,
        match_id: MatchId,
        team: TeamId,
        content: &str,
    ) -> CoreResult<RecordedBall> {
        let content = content.trim();
        if content.is_empty() {
            return Err(CoreError::InvalidInput {
                field: "content",
                message: "must not be empty".into(),
            });
        }
        self.db.read(|c| engine::authorize(c, caller, team))?;

        let format = &self.rules.format;
        let case_statement = self.db.read(|c| {
            let m = fetch_match(c, match_id)?;
            let side = matches::ensure_accepting(&m, team)?;
            if innings_complete(m.side(side), format) {
                return Err(CoreError::InningsComplete { match_id, team });
            }
            Ok(m.case_statement.unwrap_or_default())
        })?;

        let grade = self
            .grader
            .grade(&case_statement, content)
            .await
            .map_err(|e| {
                warn!(%match_id, %team, error = %e, "grader failed, submission not stored");
                CoreError::GraderUnavailable(e.to_string())
            })?;

        let mut feedback = grade.feedback;
        feedback.breakdown = feedback.breakdown.clamped();
        let ball = NewBall {
            team,
            captain: caller.player_id,
            content,
            score: grade.score,
            feedback: &feedback,
        };
        let now = self.now();
        let recorded = self
            .db
            .write(|tx| matches::record_ball(tx, match_id, &ball, now, format))?;

        info!(
            %match_id,
            %team,
            ball = recorded.idea.ball_index,
            score = recorded.idea.score,
            runs = recorded.idea.outcome.runs,
            wicket = recorded.idea.outcome.is_wicket,
            "ball recorded"
        );
        self.events.publish(LeagueEvent::BallRecorded {
            match_id,
            team,
            ball_index: recorded.idea.ball_index,
            runs: recorded.idea.outcome.runs,
            is_wicket: recorded.idea.outcome.is_wicket,
        });
        Ok(recorded)
    }

    /// Admin audit: re-score a ball with the audit scale.
    pub fn adjust_idea_score(
        &self,
        caller: &Caller,
        idea: IdeaId,
        adjustment: &ScoreAdjustment,
    ) -> CoreResult<RecordedBall> {
        engine::require_admin(caller)?;
        self.db.write(|tx| matches::adjust_idea(tx, idea, adjustment))
    }

    pub fn start_match(&self, caller: &Caller, match_id: MatchId) -> CoreResult<Match> {
        engine::require_admin(caller)?;
        let now = self.now();
        self.db.write(|tx| matches::start_match(tx, match_id, now))
    }

    pub fn complete_match(&self, caller: &Caller, match_id: MatchId) -> CoreResult<Match> {
        engine::require_admin(caller)?;
        self.db.write(|tx| matches::complete_match(tx, match_id))
    }

    pub fn set_side_adjustment(
        &self,
        caller: &Caller,
        match_id: MatchId,
        team: TeamId,
        summary: Option<&str>,
        nrr_bonus: f64,
    ) -> CoreResult<Match> {
        engine::require_admin(caller)?;
        self.db
            .write(|tx| matches::set_side_adjustment(tx, match_id, team, summary, nrr_bonus))
    }

    pub fn assign_case(&self, caller: &Caller, match_id: MatchId) -> CoreResult<CaseStudy> {
        engine::require_admin(caller)?;
        self.db.write(|tx| matches::assign_case(tx, match_id))
    }

    pub fn publish_match(&self, caller: &Caller, match_id: MatchId) -> CoreResult<PublishOutcome> {
        engine::require_admin(caller)?;
        let outcome = publish::publish(
            &self.db,
            match_id,
            &self.rules.format,
            &self.rules.points,
        )?;
        if let PublishOutcome::Published { winner, .. } = &outcome {
            self.events.publish(LeagueEvent::MatchPublished {
                match_id,
                winner: *winner,
            });
        }
        Ok(outcome)
    }

    /// Returns `false` if the match was not published.
    pub fn unpublish_match(&self, caller: &Caller, match_id: MatchId) -> CoreResult<bool> {
        engine::require_admin(caller)?;
        let changed = publish::unpublish(&self.db, match_id)?;
        if changed {
            self.events
                .publish(LeagueEvent::MatchUnpublished { match_id });
        }
        Ok(changed)
    }

    pub fn standings(&self) -> CoreResult<Standings> {
        self.db.read(standings::standings)
    }

    // ------------------------------------------------------------------
    // Maintenance
    // ------------------------------------------------------------------

    /// Close expired lots and advance every live match's virtual balls.
    pub fn tick(&self) -> CoreResult<TickReport> {
        let now = self.now();
        let closed = timer::sweep_expired(&self.db, now)?;
        self.announce_closed(&closed);

        let backfill = backfill::advance_all(&self.db, now, &self.rules.format)?;
        for (match_id, report) in &backfill {
            if report.capped {
                self.events.publish(LeagueEvent::InningsCapped {
                    match_id: *match_id,
                });
            }
        }
        Ok(TickReport { closed, backfill })
    }

    pub fn reset(&self, caller: &Caller, scope: ResetScope) -> CoreResult<ResetReport> {
        engine::require_admin(caller)?;
        let report = reset::reset(&self.db, scope, self.starting_balance)?;
        self.events.publish(LeagueEvent::Reset { scope });
        Ok(report)
    }
}
