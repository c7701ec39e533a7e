// Error taxonomy for league operations.
//
// Every rule violation the core can produce is a `CoreError` variant returned
// as an ordinary `Err`. `ErrorKind` groups them so the transport layer can map
// them to responses without matching every variant.

use thiserror::Error;

use crate::ids::{IdeaId, MatchId, PlayerId, TeamId};

/// Coarse classification of a `CoreError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input or unknown id. Nothing was mutated.
    Validation,
    /// Lost a race or the state moved on. Re-read and retry.
    Conflict,
    /// The caller may not perform this operation.
    Authorization,
    /// Not enough balance for the requested amount.
    Resource,
    /// An external collaborator (the grader) failed. Retryable.
    ExternalDependency,
    /// The database failed.
    Storage,
}

#[derive(Debug, Error)]
pub enum CoreError {
    // --- validation ---
    #[error("team {0} not found")]
    TeamNotFound(TeamId),

    #[error("player {0} not found")]
    PlayerNotFound(PlayerId),

    #[error("match {0} not found")]
    MatchNotFound(MatchId),

    #[error("idea {0} not found")]
    IdeaNotFound(IdeaId),

    #[error("invalid input for `{field}`: {message}")]
    InvalidInput { field: &'static str, message: String },

    #[error("team {team} is not playing in match {match_id}")]
    TeamNotInMatch { match_id: MatchId, team: TeamId },

    // --- conflict ---
    #[error("player {0} already has an open lot")]
    AlreadyActive(PlayerId),

    #[error("player {0} is already sold")]
    AlreadySold(PlayerId),

    #[error("another lot (player {0}) is still open")]
    LotInProgress(PlayerId),

    #[error("player {0} has no open lot")]
    AuctionNotActive(PlayerId),

    #[error("bidding window for player {0} has closed")]
    AuctionExpired(PlayerId),

    #[error("bid of {amount} is too low (minimum {minimum})")]
    BidTooLow { amount: i64, minimum: i64 },

    #[error("team {0} already holds the maximum number of players")]
    RosterFull(TeamId),

    #[error("match {match_id} is {status}, expected {expected}")]
    InvalidMatchState {
        match_id: MatchId,
        status: &'static str,
        expected: &'static str,
    },

    #[error("match {0} is published; unpublish it before editing")]
    MatchPublished(MatchId),

    #[error("innings of team {team} in match {match_id} is complete")]
    InningsComplete { match_id: MatchId, team: TeamId },

    #[error("no unused case study is left")]
    NoCaseAvailable,

    #[error("state changed concurrently: {0}")]
    Conflict(String),

    // --- authorization ---
    #[error("caller is not allowed to act for team {0}")]
    Unauthorized(TeamId),

    #[error("operation requires an admin")]
    AdminOnly,

    // --- resource ---
    #[error("team {team} has {balance}, needs {required}")]
    InsufficientFunds {
        team: TeamId,
        balance: i64,
        required: i64,
    },

    // --- external ---
    #[error("grader unavailable: {0}")]
    GraderUnavailable(String),

    // --- storage ---
    #[error("database error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("failed to encode stored value: {0}")]
    Encoding(#[from] serde_json::Error),
}

impl CoreError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::TeamNotFound(_)
            | CoreError::PlayerNotFound(_)
            | CoreError::MatchNotFound(_)
            | CoreError::IdeaNotFound(_)
            | CoreError::InvalidInput { .. }
            | CoreError::TeamNotInMatch { .. } => ErrorKind::Validation,

            CoreError::AlreadyActive(_)
            | CoreError::AlreadySold(_)
            | CoreError::LotInProgress(_)
            | CoreError::AuctionNotActive(_)
            | CoreError::AuctionExpired(_)
            | CoreError::BidTooLow { .. }
            | CoreError::RosterFull(_)
            | CoreError::InvalidMatchState { .. }
            | CoreError::MatchPublished(_)
            | CoreError::InningsComplete { .. }
            | CoreError::NoCaseAvailable
            | CoreError::Conflict(_) => ErrorKind::Conflict,

            CoreError::Unauthorized(_) | CoreError::AdminOnly => ErrorKind::Authorization,

            CoreError::InsufficientFunds { .. } => ErrorKind::Resource,

            CoreError::GraderUnavailable(_) => ErrorKind::ExternalDependency,

            CoreError::Storage(_) | CoreError::Encoding(_) => ErrorKind::Storage,
        }
    }

    /// Whether retrying the same request later can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Conflict | ErrorKind::ExternalDependency
        )
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
