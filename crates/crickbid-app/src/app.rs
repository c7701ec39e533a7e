// Background loop for a running league.
//
// Ticks on a fixed interval (closing expired lots and advancing virtual
// balls) and writes every league event to the log until `shutdown` resolves.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};

use crickbid_core::auction::FinalizeOutcome;
use crickbid_core::events::LeagueEvent;
use crickbid_core::League;

/// Counters for one run of the loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub ticks: u64,
    pub failed_ticks: u64,
    pub lots_closed: u64,
}

pub async fn run(
    league: Arc<League>,
    tick_every: Duration,
    shutdown: impl Future<Output = ()>,
) -> RunSummary {
    let mut summary = RunSummary::default();
    let mut events = league.subscribe();
    let mut interval = tokio::time::interval(tick_every);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    tokio::pin!(shutdown);

    info!(tick_millis = tick_every.as_millis() as u64, "league loop started");

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("shutdown requested");
                break;
            }
            _ = interval.tick() => {
                summary.ticks += 1;
                match league.tick() {
                    Ok(report) => {
                        summary.lots_closed += report.closed.len() as u64;
                    }
                    Err(e) => {
                        summary.failed_ticks += 1;
                        error!(error = %e, "tick failed");
                    }
                }
            }
            event = events.recv() => {
                match event {
                    Ok(event) => log_event(&event),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "event log fell behind");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }
    }

    info!(
        ticks = summary.ticks,
        failed_ticks = summary.failed_ticks,
        lots_closed = summary.lots_closed,
        "league loop stopped"
    );
    summary
}

fn log_event(event: &LeagueEvent) {
    match event {
        LeagueEvent::LotClosed {
            outcome: FinalizeOutcome::Sold {
                player,
                team,
                price,
            },
        } => info!(%player, %team, price, "player sold"),
        LeagueEvent::LotClosed {
            outcome: FinalizeOutcome::Unsold { player },
        } => info!(%player, "player unsold"),
        LeagueEvent::PlayerReleased {
            player,
            team,
            refund,
        } => info!(%player, %team, refund, "player released"),
        LeagueEvent::InningsCapped { match_id } => {
            info!(%match_id, "both innings capped, awaiting review")
        }
        LeagueEvent::MatchPublished { match_id, winner } => {
            info!(%match_id, ?winner, "match published")
        }
        other => debug!(event = ?other, "league event"),
    }
}
