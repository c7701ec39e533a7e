// Domain records shared by the auction and scoring engines.

use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

use crate::ids::{CaseId, IdeaId, MatchId, PlayerId, TeamId};
use crate::scoring::feedback::Feedback;
use crate::scoring::outcome::{Outcome, ScoringScale};

/// Stores a fieldless enum as its lowercase text label.
macro_rules! sql_text_enum {
    ($name:ident { $($variant:ident => $label:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $label),+
                }
            }

            pub fn parse(s: &str) -> Option<Self> {
                match s {
                    $($label => Some($name::$variant),)+
                    _ => None,
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $name {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                let text = value.as_str()?;
                $name::parse(text).ok_or_else(|| {
                    FromSqlError::Other(format!("unknown {} `{text}`", stringify!($name)).into())
                })
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// What the session layer says the caller is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Owner,
    Captain,
    Player,
}

/// The caller of a core operation as reported by the session layer.
///
/// `team_id` is only a claim. Anything that touches a balance re-reads the
/// team's captain/owner of record before trusting it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
    pub role: Role,
    pub player_id: Option<PlayerId>,
    pub team_id: Option<TeamId>,
}

impl Caller {
    pub fn admin() -> Self {
        Self {
            role: Role::Admin,
            player_id: None,
            team_id: None,
        }
    }

    pub fn captain(player_id: PlayerId, team_id: TeamId) -> Self {
        Self {
            role: Role::Captain,
            player_id: Some(player_id),
            team_id: Some(team_id),
        }
    }

    pub fn owner(player_id: PlayerId, team_id: TeamId) -> Self {
        Self {
            role: Role::Owner,
            player_id: Some(player_id),
            team_id: Some(team_id),
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

// ---------------------------------------------------------------------------
// Teams and players
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Team {
    pub id: TeamId,
    pub name: String,
    pub balance: i64,
    pub owner_id: Option<PlayerId>,
    pub captain_id: Option<PlayerId>,
}

/// Auction lifecycle of a single player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuctionStatus {
    /// Not on the block. Either never listed or returned unsold.
    Idle,
    /// Open lot with a running countdown.
    Active,
    /// Assigned to a team. Terminal.
    Sold,
}

sql_text_enum!(AuctionStatus {
    Idle => "idle",
    Active => "active",
    Sold => "sold",
});

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub rating: f64,
    /// Pool / tier label (e.g. "marquee", "A").
    pub pool: String,
    pub base_price: i64,
    pub team_id: Option<TeamId>,
    pub sold_price: Option<i64>,
    pub auctioned: bool,
    pub status: AuctionStatus,
    pub current_bid: i64,
    pub current_bidder: Option<TeamId>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// A new player row, as seeded from CSV or added by an admin.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NewPlayer {
    pub name: String,
    pub rating: f64,
    pub pool: String,
    pub base_price: i64,
}

/// Append-only audit row for an accepted bid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bid {
    pub id: i64,
    pub player_id: PlayerId,
    pub team_id: TeamId,
    pub amount: i64,
    pub placed_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Matches
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    Scheduled,
    InProgress,
    ReviewPending,
    Completed,
}

sql_text_enum!(MatchStatus {
    Scheduled => "scheduled",
    InProgress => "in_progress",
    ReviewPending => "review_pending",
    Completed => "completed",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchKind {
    League,
    Playoff,
    Exhibition,
}

sql_text_enum!(MatchKind {
    League => "league",
    Playoff => "playoff",
    Exhibition => "exhibition",
});

/// Which column group of a match row a team occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    One,
    Two,
}

impl Side {
    /// Column prefix in the `matches` table.
    pub(crate) fn prefix(self) -> &'static str {
        match self {
            Side::One => "team1",
            Side::Two => "team2",
        }
    }

    pub fn other(self) -> Side {
        match self {
            Side::One => Side::Two,
            Side::Two => Side::One,
        }
    }
}

/// One team's half of a match row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SideScore {
    pub team_id: Option<TeamId>,
    pub runs: u32,
    pub wickets: u32,
    pub balls: u32,
    /// Highest virtual ball index the backfill has confirmed. Never decreases.
    pub balls_confirmed: u32,
    pub summary: Option<String>,
    /// Flat NRR adjustment carried into the standings on publish.
    pub nrr_bonus: f64,
}

impl SideScore {
    pub fn overs(&self) -> String {
        overs_display(self.balls)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub id: MatchId,
    pub kind: MatchKind,
    pub status: MatchStatus,
    pub published: bool,
    pub team1: SideScore,
    pub team2: SideScore,
    pub case_id: Option<CaseId>,
    pub case_statement: Option<String>,
    /// `None` on a published match means the scores tied.
    pub winner_id: Option<TeamId>,
    pub started_at: Option<DateTime<Utc>>,
}

impl Match {
    /// Which side `team` plays on, if any.
    pub fn side_of(&self, team: TeamId) -> Option<Side> {
        if self.team1.team_id == Some(team) {
            Some(Side::One)
        } else if self.team2.team_id == Some(team) {
            Some(Side::Two)
        } else {
            None
        }
    }

    pub fn side(&self, side: Side) -> &SideScore {
        match side {
            Side::One => &self.team1,
            Side::Two => &self.team2,
        }
    }
}

/// Cricket overs notation: completed overs, a dot, then balls into the
/// current over (`75` balls -> `"12.3"`).
pub fn overs_display(balls: u32) -> String {
    format!("{}.{}", balls / 6, balls % 6)
}

// ---------------------------------------------------------------------------
// Ideas (balls)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Idea {
    pub id: IdeaId,
    pub match_id: MatchId,
    pub team_id: TeamId,
    /// `None` for virtual dot balls.
    pub captain_id: Option<PlayerId>,
    pub content: String,
    pub score: f64,
    pub outcome: Outcome,
    /// 1-based position within the (match, team) innings.
    pub ball_index: u32,
    pub feedback: Option<Feedback>,
    pub scale: ScoringScale,
    pub is_virtual: bool,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Standings inputs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchResult {
    Won,
    Tied,
    Lost,
}

sql_text_enum!(MatchResult {
    Won => "won",
    Tied => "tied",
    Lost => "lost",
});

/// Per (match, team) row written on publish and deleted on unpublish.
///
/// Ball counts are already NRR-adjusted: an all-out innings counts the full
/// format length.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreRecord {
    pub match_id: MatchId,
    pub team_id: TeamId,
    pub opponent_id: TeamId,
    pub result: MatchResult,
    pub points: i64,
    pub runs_for: u32,
    pub balls_for: u32,
    pub runs_against: u32,
    pub balls_against: u32,
    pub nrr_bonus: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseStudy {
    pub id: CaseId,
    pub title: String,
    pub statement: String,
    pub used: bool,
}
