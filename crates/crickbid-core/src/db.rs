// SQLite persistence layer for teams, players, bids, matches and ideas.

use std::sync::{Mutex, MutexGuard};

use anyhow::Context;
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};

use crate::clock::from_millis;
use crate::error::{CoreError, CoreResult};
use crate::ids::{CaseId, IdeaId, MatchId, PlayerId, TeamId};
use crate::models::{
    Bid, CaseStudy, Idea, Match, MatchKind, MatchStatus, NewPlayer, Player, ScoreRecord, Side,
    SideScore, Team,
};
use crate::scoring::outcome::{Outcome, ScoringScale};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS teams (
        id         INTEGER PRIMARY KEY AUTOINCREMENT,
        name       TEXT NOT NULL UNIQUE,
        balance    INTEGER NOT NULL CHECK (balance >= 0),
        owner_id   INTEGER REFERENCES players(id) ON DELETE SET NULL,
        captain_id INTEGER REFERENCES players(id) ON DELETE SET NULL
    );

    CREATE TABLE IF NOT EXISTS players (
        id             INTEGER PRIMARY KEY AUTOINCREMENT,
        name           TEXT NOT NULL,
        rating         REAL NOT NULL DEFAULT 0,
        pool           TEXT NOT NULL DEFAULT '',
        base_price     INTEGER NOT NULL CHECK (base_price >= 0),
        team_id        INTEGER REFERENCES teams(id),
        sold_price     INTEGER,
        auctioned      INTEGER NOT NULL DEFAULT 0,
        auction_status TEXT NOT NULL DEFAULT 'idle'
                       CHECK (auction_status IN ('idle', 'active', 'sold')),
        current_bid    INTEGER NOT NULL DEFAULT 0,
        current_bidder INTEGER REFERENCES teams(id),
        expires_at     INTEGER,
        CHECK (auction_status <> 'sold' OR (team_id IS NOT NULL AND sold_price IS NOT NULL))
    );

    CREATE TABLE IF NOT EXISTS bids (
        id        INTEGER PRIMARY KEY AUTOINCREMENT,
        player_id INTEGER NOT NULL REFERENCES players(id),
        team_id   INTEGER NOT NULL REFERENCES teams(id),
        amount    INTEGER NOT NULL,
        placed_at INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS case_studies (
        id        INTEGER PRIMARY KEY AUTOINCREMENT,
        title     TEXT NOT NULL,
        statement TEXT NOT NULL,
        used      INTEGER NOT NULL DEFAULT 0
    );

    CREATE TABLE IF NOT EXISTS matches (
        id              INTEGER PRIMARY KEY AUTOINCREMENT,
        kind            TEXT NOT NULL DEFAULT 'league',
        status          TEXT NOT NULL DEFAULT 'scheduled',
        published       INTEGER NOT NULL DEFAULT 0,
        team1_id        INTEGER REFERENCES teams(id),
        team1_runs      INTEGER NOT NULL DEFAULT 0,
        team1_wickets   INTEGER NOT NULL DEFAULT 0,
        team1_balls     INTEGER NOT NULL DEFAULT 0,
        team1_confirmed INTEGER NOT NULL DEFAULT 0,
        team1_summary   TEXT,
        team1_bonus     REAL NOT NULL DEFAULT 0,
        team2_id        INTEGER REFERENCES teams(id),
        team2_runs      INTEGER NOT NULL DEFAULT 0,
        team2_wickets   INTEGER NOT NULL DEFAULT 0,
        team2_balls     INTEGER NOT NULL DEFAULT 0,
        team2_confirmed INTEGER NOT NULL DEFAULT 0,
        team2_summary   TEXT,
        team2_bonus     REAL NOT NULL DEFAULT 0,
        case_id         INTEGER REFERENCES case_studies(id) ON DELETE SET NULL,
        case_statement  TEXT,
        winner_id       INTEGER REFERENCES teams(id),
        started_at      INTEGER
    );

    CREATE TABLE IF NOT EXISTS ideas (
        id         INTEGER PRIMARY KEY AUTOINCREMENT,
        match_id   INTEGER NOT NULL REFERENCES matches(id) ON DELETE CASCADE,
        team_id    INTEGER NOT NULL REFERENCES teams(id),
        captain_id INTEGER REFERENCES players(id) ON DELETE SET NULL,
        content    TEXT NOT NULL,
        score      REAL NOT NULL,
        runs       INTEGER NOT NULL,
        is_wicket  INTEGER NOT NULL,
        is_extra   INTEGER NOT NULL DEFAULT 0,
        ball_index INTEGER NOT NULL,
        feedback   TEXT,
        scale      TEXT NOT NULL DEFAULT 'initial',
        is_virtual INTEGER NOT NULL DEFAULT 0,
        created_at INTEGER NOT NULL,
        UNIQUE (match_id, team_id, ball_index)
    );

    CREATE TABLE IF NOT EXISTS score_records (
        match_id      INTEGER NOT NULL REFERENCES matches(id) ON DELETE CASCADE,
        team_id       INTEGER NOT NULL REFERENCES teams(id),
        opponent_id   INTEGER NOT NULL REFERENCES teams(id),
        result        TEXT NOT NULL,
        points        INTEGER NOT NULL,
        runs_for      INTEGER NOT NULL,
        balls_for     INTEGER NOT NULL,
        runs_against  INTEGER NOT NULL,
        balls_against INTEGER NOT NULL,
        nrr_bonus     REAL NOT NULL DEFAULT 0,
        PRIMARY KEY (match_id, team_id)
    );

    CREATE INDEX IF NOT EXISTS idx_players_status ON players(auction_status);
    CREATE INDEX IF NOT EXISTS idx_bids_player ON bids(player_id);
    CREATE INDEX IF NOT EXISTS idx_ideas_match_team ON ideas(match_id, team_id);
";

/// SQLite-backed store for all league state.
///
/// One `Database` wraps one connection. Several `Database` handles (or
/// processes) may share a file; every state transition is a conditional
/// update inside an immediate transaction, so they stay consistent.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) a SQLite database at `path` and ensure all tables
    /// exist. Pass `":memory:"` for an ephemeral in-memory database.
    pub fn open(path: &str) -> anyhow::Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open database at {path}"))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;
             PRAGMA foreign_keys = ON;",
        )
        .context("failed to set database pragmas")?;

        conn.execute_batch(SCHEMA)
            .context("failed to create database schema")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Acquire the database connection.
    ///
    /// Panics if the mutex is poisoned (another thread panicked while
    /// holding the lock).
    pub(crate) fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("database mutex poisoned")
    }

    /// Run `f` inside an immediate (write-locking) transaction. Commits when
    /// `f` returns `Ok`; any `Err` rolls every statement back.
    pub fn write<T>(&self, f: impl FnOnce(&Transaction<'_>) -> CoreResult<T>) -> CoreResult<T> {
        let mut conn = self.conn();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    /// Run read-only queries against the connection.
    pub fn read<T>(&self, f: impl FnOnce(&Connection) -> CoreResult<T>) -> CoreResult<T> {
        let conn = self.conn();
        f(&conn)
    }

    // ------------------------------------------------------------------
    // Seeding / admin setup
    // ------------------------------------------------------------------

    pub fn insert_team(&self, name: &str, balance: i64) -> CoreResult<TeamId> {
        if balance < 0 {
            return Err(CoreError::InvalidInput {
                field: "balance",
                message: format!("must be >= 0, got {balance}"),
            });
        }
        self.write(|tx| {
            let id = tx.query_row(
                "INSERT INTO teams (name, balance) VALUES (?1, ?2) RETURNING id",
                params![name, balance],
                |row| row.get(0),
            )?;
            Ok(id)
        })
    }

    pub fn add_player(&self, player: &NewPlayer) -> CoreResult<PlayerId> {
        self.write(|tx| insert_player(tx, player))
    }

    /// Import players in a single transaction.
    pub fn import_players(&self, players: &[NewPlayer]) -> CoreResult<Vec<PlayerId>> {
        self.write(|tx| players.iter().map(|p| insert_player(tx, p)).collect())
    }

    /// Make `captain` (and optionally `owner`) the team's leadership of record.
    /// The captain joins the team's squad without being auctioned.
    pub fn set_team_leadership(
        &self,
        team: TeamId,
        captain: Option<PlayerId>,
        owner: Option<PlayerId>,
    ) -> CoreResult<()> {
        self.write(|tx| {
            fetch_team(tx, team)?;
            if let Some(captain) = captain {
                let player = fetch_player(tx, captain)?;
                if player.team_id.is_some_and(|t| t != team) {
                    return Err(CoreError::InvalidInput {
                        field: "captain",
                        message: format!("player {captain} already belongs to another team"),
                    });
                }
                tx.execute(
                    "UPDATE players SET team_id = ?1 WHERE id = ?2",
                    params![team, captain],
                )?;
            }
            tx.execute(
                "UPDATE teams SET captain_id = ?1, owner_id = ?2 WHERE id = ?3",
                params![captain, owner, team],
            )?;
            Ok(())
        })
    }

    pub fn create_match(
        &self,
        kind: MatchKind,
        team1: Option<TeamId>,
        team2: Option<TeamId>,
    ) -> CoreResult<MatchId> {
        if team1.is_some() && team1 == team2 {
            return Err(CoreError::InvalidInput {
                field: "team2",
                message: "a team cannot play itself".into(),
            });
        }
        self.write(|tx| {
            for team in [team1, team2].into_iter().flatten() {
                fetch_team(tx, team)?;
            }
            let id = tx.query_row(
                "INSERT INTO matches (kind, team1_id, team2_id) VALUES (?1, ?2, ?3) RETURNING id",
                params![kind, team1, team2],
                |row| row.get(0),
            )?;
            Ok(id)
        })
    }

    /// Fill an undetermined playoff slot.
    pub fn set_match_team(&self, match_id: MatchId, side: Side, team: TeamId) -> CoreResult<()> {
        self.write(|tx| {
            let m = fetch_match(tx, match_id)?;
            if m.status != MatchStatus::Scheduled {
                return Err(CoreError::InvalidMatchState {
                    match_id,
                    status: m.status.as_str(),
                    expected: MatchStatus::Scheduled.as_str(),
                });
            }
            if m.side(side.other()).team_id == Some(team) {
                return Err(CoreError::InvalidInput {
                    field: "team",
                    message: "a team cannot play itself".into(),
                });
            }
            fetch_team(tx, team)?;
            tx.execute(
                &format!("UPDATE matches SET {}_id = ?1 WHERE id = ?2", side.prefix()),
                params![team, match_id],
            )?;
            Ok(())
        })
    }

    pub fn add_case_study(&self, title: &str, statement: &str) -> CoreResult<CaseId> {
        self.write(|tx| {
            let id = tx.query_row(
                "INSERT INTO case_studies (title, statement) VALUES (?1, ?2) RETURNING id",
                params![title, statement],
                |row| row.get(0),
            )?;
            Ok(id)
        })
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    pub fn team(&self, id: TeamId) -> CoreResult<Team> {
        self.read(|c| fetch_team(c, id))
    }

    pub fn team_by_name(&self, name: &str) -> CoreResult<Option<Team>> {
        self.read(|c| {
            let team = c
                .query_row(
                    &format!("SELECT {TEAM_COLUMNS} FROM teams WHERE name = ?1"),
                    params![name],
                    team_from_row,
                )
                .optional()?;
            Ok(team)
        })
    }

    pub fn teams(&self) -> CoreResult<Vec<Team>> {
        self.read(list_teams)
    }

    pub fn player(&self, id: PlayerId) -> CoreResult<Player> {
        self.read(|c| fetch_player(c, id))
    }

    pub fn players(&self) -> CoreResult<Vec<Player>> {
        self.read(|c| {
            let mut stmt = c.prepare(&format!("SELECT {PLAYER_COLUMNS} FROM players ORDER BY id"))?;
            let rows = stmt
                .query_map([], player_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Players currently on a team's squad (auctioned or assigned).
    pub fn squad(&self, team: TeamId) -> CoreResult<Vec<Player>> {
        self.read(|c| {
            let mut stmt = c.prepare(&format!(
                "SELECT {PLAYER_COLUMNS} FROM players WHERE team_id = ?1 ORDER BY id"
            ))?;
            let rows = stmt
                .query_map(params![team], player_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn bids_for(&self, player: PlayerId) -> CoreResult<Vec<Bid>> {
        self.read(|c| bids_for_player(c, player))
    }

    pub fn get_match(&self, id: MatchId) -> CoreResult<Match> {
        self.read(|c| fetch_match(c, id))
    }

    pub fn matches(&self) -> CoreResult<Vec<Match>> {
        self.read(|c| {
            let mut stmt = c.prepare(&format!("SELECT {MATCH_COLUMNS} FROM matches ORDER BY id"))?;
            let rows = stmt
                .query_map([], match_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn idea(&self, id: IdeaId) -> CoreResult<Idea> {
        self.read(|c| fetch_idea(c, id))
    }

    pub fn ideas_for(&self, match_id: MatchId, team: TeamId) -> CoreResult<Vec<Idea>> {
        self.read(|c| list_ideas(c, match_id, Some(team)))
    }

    pub fn score_records(&self, match_id: MatchId) -> CoreResult<Vec<ScoreRecord>> {
        self.read(|c| {
            let mut stmt = c.prepare(&format!(
                "SELECT {SCORE_COLUMNS} FROM score_records WHERE match_id = ?1 ORDER BY team_id"
            ))?;
            let rows = stmt
                .query_map(params![match_id], score_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn case_studies(&self) -> CoreResult<Vec<CaseStudy>> {
        self.read(|c| {
            let mut stmt =
                c.prepare("SELECT id, title, statement, used FROM case_studies ORDER BY id")?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(CaseStudy {
                        id: row.get(0)?,
                        title: row.get(1)?,
                        statement: row.get(2)?,
                        used: row.get(3)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Number of rows in `table`. Only used for seeding decisions and tests.
    pub fn count(&self, table: &'static str) -> CoreResult<usize> {
        self.read(|c| {
            let n: i64 = c.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
                row.get(0)
            })?;
            Ok(n as usize)
        })
    }
}

// ---------------------------------------------------------------------------
// Row mapping and shared queries
//
// These take `&Connection` so they work both on a plain connection and
// inside a `Transaction` (which derefs to one).
// ---------------------------------------------------------------------------

pub(crate) const TEAM_COLUMNS: &str = "id, name, balance, owner_id, captain_id";

pub(crate) const PLAYER_COLUMNS: &str = "id, name, rating, pool, base_price, team_id, sold_price, \
     auctioned, auction_status, current_bid, current_bidder, expires_at";

pub(crate) const MATCH_COLUMNS: &str = "id, kind, status, published, \
     team1_id, team1_runs, team1_wickets, team1_balls, team1_confirmed, team1_summary, team1_bonus, \
     team2_id, team2_runs, team2_wickets, team2_balls, team2_confirmed, team2_summary, team2_bonus, \
     case_id, case_statement, winner_id, started_at";

pub(crate) const IDEA_COLUMNS: &str = "id, match_id, team_id, captain_id, content, score, runs, \
     is_wicket, is_extra, ball_index, feedback, scale, is_virtual, created_at";

pub(crate) const SCORE_COLUMNS: &str = "match_id, team_id, opponent_id, result, points, \
     runs_for, balls_for, runs_against, balls_against, nrr_bonus";

pub(crate) fn team_from_row(row: &Row<'_>) -> rusqlite::Result<Team> {
    Ok(Team {
        id: row.get(0)?,
        name: row.get(1)?,
        balance: row.get(2)?,
        owner_id: row.get(3)?,
        captain_id: row.get(4)?,
    })
}

pub(crate) fn player_from_row(row: &Row<'_>) -> rusqlite::Result<Player> {
    let expires: Option<i64> = row.get(11)?;
    Ok(Player {
        id: row.get(0)?,
        name: row.get(1)?,
        rating: row.get(2)?,
        pool: row.get(3)?,
        base_price: row.get(4)?,
        team_id: row.get(5)?,
        sold_price: row.get(6)?,
        auctioned: row.get(7)?,
        status: row.get(8)?,
        current_bid: row.get(9)?,
        current_bidder: row.get(10)?,
        expires_at: expires.map(from_millis),
    })
}

fn side_from_row(row: &Row<'_>, offset: usize) -> rusqlite::Result<SideScore> {
    Ok(SideScore {
        team_id: row.get(offset)?,
        runs: row.get(offset + 1)?,
        wickets: row.get(offset + 2)?,
        balls: row.get(offset + 3)?,
        balls_confirmed: row.get(offset + 4)?,
        summary: row.get(offset + 5)?,
        nrr_bonus: row.get(offset + 6)?,
    })
}

pub(crate) fn match_from_row(row: &Row<'_>) -> rusqlite::Result<Match> {
    let started: Option<i64> = row.get(21)?;
    Ok(Match {
        id: row.get(0)?,
        kind: row.get(1)?,
        status: row.get(2)?,
        published: row.get(3)?,
        team1: side_from_row(row, 4)?,
        team2: side_from_row(row, 11)?,
        case_id: row.get(18)?,
        case_statement: row.get(19)?,
        winner_id: row.get(20)?,
        started_at: started.map(from_millis),
    })
}

pub(crate) fn idea_from_row(row: &Row<'_>) -> rusqlite::Result<Idea> {
    let feedback_json: Option<String> = row.get(10)?;
    let scale: String = row.get(11)?;
    let created: i64 = row.get(13)?;
    Ok(Idea {
        id: row.get(0)?,
        match_id: row.get(1)?,
        team_id: row.get(2)?,
        captain_id: row.get(3)?,
        content: row.get(4)?,
        score: row.get(5)?,
        outcome: Outcome {
            runs: row.get(6)?,
            is_wicket: row.get(7)?,
            is_extra: row.get(8)?,
        },
        ball_index: row.get(9)?,
        feedback: feedback_json.and_then(|json| serde_json::from_str(&json).ok()),
        scale: ScoringScale::parse(&scale).unwrap_or(ScoringScale::Initial),
        is_virtual: row.get(12)?,
        created_at: from_millis(created),
    })
}

pub(crate) fn score_from_row(row: &Row<'_>) -> rusqlite::Result<ScoreRecord> {
    Ok(ScoreRecord {
        match_id: row.get(0)?,
        team_id: row.get(1)?,
        opponent_id: row.get(2)?,
        result: row.get(3)?,
        points: row.get(4)?,
        runs_for: row.get(5)?,
        balls_for: row.get(6)?,
        runs_against: row.get(7)?,
        balls_against: row.get(8)?,
        nrr_bonus: row.get(9)?,
    })
}

pub(crate) fn fetch_team(conn: &Connection, id: TeamId) -> CoreResult<Team> {
    conn.query_row(
        &format!("SELECT {TEAM_COLUMNS} FROM teams WHERE id = ?1"),
        params![id],
        team_from_row,
    )
    .optional()?
    .ok_or(CoreError::TeamNotFound(id))
}

pub(crate) fn list_teams(conn: &Connection) -> CoreResult<Vec<Team>> {
    let mut stmt = conn.prepare(&format!("SELECT {TEAM_COLUMNS} FROM teams ORDER BY id"))?;
    let rows = stmt
        .query_map([], team_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub(crate) fn fetch_player(conn: &Connection, id: PlayerId) -> CoreResult<Player> {
    conn.query_row(
        &format!("SELECT {PLAYER_COLUMNS} FROM players WHERE id = ?1"),
        params![id],
        player_from_row,
    )
    .optional()?
    .ok_or(CoreError::PlayerNotFound(id))
}

pub(crate) fn fetch_match(conn: &Connection, id: MatchId) -> CoreResult<Match> {
    conn.query_row(
        &format!("SELECT {MATCH_COLUMNS} FROM matches WHERE id = ?1"),
        params![id],
        match_from_row,
    )
    .optional()?
    .ok_or(CoreError::MatchNotFound(id))
}

pub(crate) fn fetch_idea(conn: &Connection, id: IdeaId) -> CoreResult<Idea> {
    conn.query_row(
        &format!("SELECT {IDEA_COLUMNS} FROM ideas WHERE id = ?1"),
        params![id],
        idea_from_row,
    )
    .optional()?
    .ok_or(CoreError::IdeaNotFound(id))
}

/// Ideas of a match ordered by team then ball, optionally for one team.
pub(crate) fn list_ideas(
    conn: &Connection,
    match_id: MatchId,
    team: Option<TeamId>,
) -> CoreResult<Vec<Idea>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {IDEA_COLUMNS} FROM ideas
         WHERE match_id = ?1 AND (?2 IS NULL OR team_id = ?2)
         ORDER BY team_id, ball_index"
    ))?;
    let rows = stmt
        .query_map(params![match_id, team], idea_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub(crate) fn bids_for_player(conn: &Connection, player: PlayerId) -> CoreResult<Vec<Bid>> {
    let mut stmt = conn.prepare(
        "SELECT id, player_id, team_id, amount, placed_at FROM bids
         WHERE player_id = ?1 ORDER BY id",
    )?;
    let rows = stmt
        .query_map(params![player], |row| {
            let placed: i64 = row.get(4)?;
            Ok(Bid {
                id: row.get(0)?,
                player_id: row.get(1)?,
                team_id: row.get(2)?,
                amount: row.get(3)?,
                placed_at: from_millis(placed),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn insert_player(conn: &Connection, player: &NewPlayer) -> CoreResult<PlayerId> {
    if player.name.trim().is_empty() {
        return Err(CoreError::InvalidInput {
            field: "name",
            message: "must not be empty".into(),
        });
    }
    if player.base_price < 0 {
        return Err(CoreError::InvalidInput {
            field: "base_price",
            message: format!("must be >= 0, got {}", player.base_price),
        });
    }
    let id = conn.query_row(
        "INSERT INTO players (name, rating, pool, base_price, current_bid)
         VALUES (?1, ?2, ?3, ?4, ?4) RETURNING id",
        params![player.name.trim(), player.rating, player.pool, player.base_price],
        |row| row.get(0),
    )?;
    Ok(id)
}
