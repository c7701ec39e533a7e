// First-run seeding: teams from league.toml, players and case studies from CSV.

use std::io::Read;
use std::path::Path;

use serde::Deserialize;
use tracing::{info, warn};

use crate::config::Config;
use crate::db::Database;
use crate::error::CoreError;
use crate::models::NewPlayer;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum SeedError {
    #[error("failed to read file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("CSV error in {path}: {source}")]
    Csv { path: String, source: csv::Error },

    #[error("validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Store(#[from] CoreError),
}

// ---------------------------------------------------------------------------
// CSV rows
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RawPlayer {
    name: String,
    #[serde(default)]
    rating: f64,
    #[serde(default)]
    pool: String,
    base_price: i64,
}

/// One case study to seed.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NewCase {
    pub title: String,
    pub statement: String,
}

fn load_players_from_reader<R: Read>(rdr: R) -> Result<Vec<NewPlayer>, csv::Error> {
    let mut reader = csv::Reader::from_reader(rdr);
    let mut players = Vec::new();
    for result in reader.deserialize::<RawPlayer>() {
        match result {
            Ok(raw) => {
                let name = raw.name.trim();
                if name.is_empty() {
                    warn!("skipping player row with empty name");
                    continue;
                }
                if raw.base_price < 0 || !raw.rating.is_finite() {
                    warn!("skipping player '{}': negative price or bad rating", name);
                    continue;
                }
                players.push(NewPlayer {
                    name: name.to_string(),
                    rating: raw.rating,
                    pool: raw.pool.trim().to_string(),
                    base_price: raw.base_price,
                });
            }
            Err(e) => {
                warn!("skipping malformed player row: {}", e);
            }
        }
    }
    Ok(players)
}

fn load_cases_from_reader<R: Read>(rdr: R) -> Result<Vec<NewCase>, csv::Error> {
    let mut reader = csv::Reader::from_reader(rdr);
    let mut cases = Vec::new();
    for result in reader.deserialize::<NewCase>() {
        match result {
            Ok(case) if !case.statement.trim().is_empty() => cases.push(NewCase {
                title: case.title.trim().to_string(),
                statement: case.statement.trim().to_string(),
            }),
            Ok(case) => warn!("skipping case '{}': empty statement", case.title.trim()),
            Err(e) => warn!("skipping malformed case row: {}", e),
        }
    }
    Ok(cases)
}

fn open(path: &Path) -> Result<std::fs::File, SeedError> {
    std::fs::File::open(path).map_err(|e| SeedError::Io {
        path: path.display().to_string(),
        source: e,
    })
}

/// Load players from a `name,rating,pool,base_price` CSV file.
pub fn load_players(path: &Path) -> Result<Vec<NewPlayer>, SeedError> {
    load_players_from_reader(open(path)?).map_err(|e| SeedError::Csv {
        path: path.display().to_string(),
        source: e,
    })
}

/// Load case studies from a `title,statement` CSV file.
pub fn load_cases(path: &Path) -> Result<Vec<NewCase>, SeedError> {
    load_cases_from_reader(open(path)?).map_err(|e| SeedError::Csv {
        path: path.display().to_string(),
        source: e,
    })
}

// ---------------------------------------------------------------------------
// Seeding
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub teams: usize,
    pub players: usize,
    pub cases: usize,
}

/// Seed every empty table. Tables that already hold rows are left alone, so
/// running this on every start is safe.
pub fn seed(db: &Database, config: &Config, base_dir: &Path) -> Result<SeedReport, SeedError> {
    let mut report = SeedReport::default();

    if db.count("teams")? == 0 {
        for team in &config.league.teams {
            db.insert_team(&team.name, config.league.starting_balance)?;
            report.teams += 1;
        }
    }

    if db.count("players")? == 0 {
        let players = load_players(&base_dir.join(&config.data_paths.players))?;
        if players.is_empty() {
            return Err(SeedError::Validation(
                "player CSV produced zero valid rows".into(),
            ));
        }
        report.players = db.import_players(&players)?.len();
    }

    if db.count("case_studies")? == 0 {
        let path = base_dir.join(&config.data_paths.cases);
        if path.exists() {
            for case in load_cases(&path)? {
                db.add_case_study(&case.title, &case.statement)?;
                report.cases += 1;
            }
        } else {
            warn!("no case study file at {}", path.display());
        }
    }

    if report != SeedReport::default() {
        info!(
            teams = report.teams,
            players = report.players,
            cases = report.cases,
            "seeded league data"
        );
    }
    Ok(report)
}
