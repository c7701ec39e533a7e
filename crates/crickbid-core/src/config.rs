// Configuration loading and parsing (league.toml, server.toml, credentials.toml).

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("validation error for field `{field}`: {message}")]
    ValidationError { field: String, message: String },

    #[error("failed to initialize config from defaults: {message}")]
    DefaultsCopyError { message: String },
}

// ---------------------------------------------------------------------------
// Top-level assembled Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Config {
    pub league: LeagueConfig,
    pub rules: Rules,
    pub grader: GraderConfig,
    pub timer: TimerConfig,
    pub credentials: CredentialsConfig,
    pub db_path: String,
    pub data_paths: DataPaths,
}

/// The rule parameters the core engine reads at run time.
#[derive(Debug, Clone, Default)]
pub struct Rules {
    pub auction: AuctionConfig,
    pub format: MatchFormat,
    pub points: PointsConfig,
}

// ---------------------------------------------------------------------------
// league.toml structs
// ---------------------------------------------------------------------------

/// Raw deserialization target for the entire league.toml file.
#[derive(Debug, Clone, Deserialize)]
struct LeagueFile {
    league: LeagueConfig,
    #[serde(default)]
    auction: AuctionConfig,
    #[serde(default)]
    format: MatchFormat,
    #[serde(default)]
    points: PointsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LeagueConfig {
    pub name: String,
    /// Wallet balance every team starts with (and returns to on a wallet reset).
    pub starting_balance: i64,
    /// Teams created on first run.
    #[serde(default)]
    pub teams: Vec<TeamSeed>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TeamSeed {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuctionConfig {
    /// Length of the bidding window; every accepted bid restarts it.
    pub bid_window_secs: u32,
    /// Maximum number of auctioned players per team.
    pub roster_cap: usize,
    /// Refuse to open a lot while another one is still open.
    pub single_lot: bool,
}

impl Default for AuctionConfig {
    fn default() -> Self {
        Self {
            bid_window_secs: 30,
            roster_cap: 5,
            single_lot: true,
        }
    }
}

impl AuctionConfig {
    pub fn bid_window(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::from(self.bid_window_secs))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MatchFormat {
    /// Balls per innings (120 = 20 overs).
    pub max_balls: u32,
    /// Wickets that end an innings.
    pub max_wickets: u32,
    /// Wall-clock seconds per virtual ball in the dot-ball backfill.
    pub ball_interval_secs: u32,
}

impl Default for MatchFormat {
    fn default() -> Self {
        Self {
            max_balls: 120,
            max_wickets: 10,
            ball_interval_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PointsConfig {
    pub win: i64,
    pub tie: i64,
    pub loss: i64,
}

impl Default for PointsConfig {
    fn default() -> Self {
        Self {
            win: 2,
            tie: 1,
            loss: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// server.toml structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
struct ServerFile {
    database: DatabaseSection,
    timer: TimerConfig,
    grader: GraderConfig,
    data_paths: DataPaths,
}

#[derive(Debug, Clone, Deserialize)]
struct DatabaseSection {
    /// Empty string means "use the platform data directory".
    #[serde(default)]
    path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TimerConfig {
    /// How often the background tick sweeps expired lots and advances
    /// virtual balls.
    pub tick_millis: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GraderConfig {
    pub model: String,
    pub max_tokens: u32,
    /// Upper bound on one grading call. A slower grader counts as down.
    #[serde(default = "default_grader_timeout")]
    pub timeout_secs: u64,
}

fn default_grader_timeout() -> u64 {
    60
}

#[derive(Debug, Clone, Deserialize)]
pub struct DataPaths {
    pub players: String,
    pub cases: String,
}

// ---------------------------------------------------------------------------
// credentials.toml structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Default)]
pub struct CredentialsConfig {
    pub anthropic_api_key: Option<String>,
}

// ---------------------------------------------------------------------------
// Loading logic
// ---------------------------------------------------------------------------

/// Load and validate configuration from `config/league.toml`,
/// `config/server.toml`, and (optionally) `config/credentials.toml`, all
/// relative to `base_dir`.
pub fn load_config_from(base_dir: &Path) -> Result<Config, ConfigError> {
    let config_dir = base_dir.join("config");

    let league_path = config_dir.join("league.toml");
    let league_file: LeagueFile = parse_file(&league_path)?;

    let server_path = config_dir.join("server.toml");
    let server_file: ServerFile = parse_file(&server_path)?;

    let credentials_path = config_dir.join("credentials.toml");
    let credentials = if credentials_path.exists() {
        parse_file(&credentials_path)?
    } else {
        CredentialsConfig::default()
    };

    let config = Config {
        league: league_file.league,
        rules: Rules {
            auction: league_file.auction,
            format: league_file.format,
            points: league_file.points,
        },
        grader: server_file.grader,
        timer: server_file.timer,
        credentials,
        db_path: resolve_db_path(&server_file.database.path),
        data_paths: server_file.data_paths,
    };

    validate(&config)?;

    Ok(config)
}

/// Ensure all config files exist by copying missing ones from `defaults/`.
/// Returns the list of files that were copied. Skips `.example` files.
pub fn ensure_config_files(base_dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let defaults_dir = base_dir.join("defaults");
    let config_dir = base_dir.join("config");

    if !defaults_dir.exists() {
        if !config_dir.exists() {
            return Err(ConfigError::DefaultsCopyError {
                message: format!(
                    "neither defaults/ nor config/ directory found in {}",
                    base_dir.display()
                ),
            });
        }
        return Ok(vec![]);
    }

    std::fs::create_dir_all(&config_dir).map_err(|e| ConfigError::DefaultsCopyError {
        message: format!("failed to create config directory: {e}"),
    })?;

    let entries = std::fs::read_dir(&defaults_dir).map_err(|e| ConfigError::DefaultsCopyError {
        message: format!("failed to read defaults directory: {e}"),
    })?;

    let mut copied = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| ConfigError::DefaultsCopyError {
            message: format!("failed to read defaults entry: {e}"),
        })?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(file_name) = path.file_name() else {
            continue;
        };
        if file_name.to_str().is_some_and(|n| n.ends_with(".example")) {
            continue;
        }
        let target = config_dir.join(file_name);

        match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&target)
        {
            Ok(mut dest) => {
                let content = std::fs::read(&path).map_err(|e| ConfigError::DefaultsCopyError {
                    message: format!("failed to read {}: {e}", path.display()),
                })?;
                std::io::Write::write_all(&mut dest, &content).map_err(|e| {
                    ConfigError::DefaultsCopyError {
                        message: format!("failed to write {}: {e}", target.display()),
                    }
                })?;
                copied.push(target);
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
            Err(e) => {
                return Err(ConfigError::DefaultsCopyError {
                    message: format!("failed to create {}: {e}", target.display()),
                });
            }
        }
    }

    Ok(copied)
}

/// Convenience wrapper: loads config relative to the current working directory.
pub fn load_config() -> Result<Config, ConfigError> {
    let cwd = std::env::current_dir().map_err(|_| ConfigError::FileNotFound {
        path: PathBuf::from("."),
    })?;
    ensure_config_files(&cwd)?;
    load_config_from(&cwd)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn parse_file<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
        path: path.to_path_buf(),
    })?;
    toml::from_str(&text).map_err(|e| ConfigError::ParseError {
        path: path.to_path_buf(),
        source: e,
    })
}

/// An empty configured path resolves to `crickbid.db` in the platform data
/// directory, falling back to the working directory when none exists.
fn resolve_db_path(configured: &str) -> String {
    if !configured.trim().is_empty() {
        return configured.to_string();
    }
    directories::ProjectDirs::from("", "", "crickbid")
        .map(|dirs| dirs.data_dir().join("crickbid.db"))
        .unwrap_or_else(|| PathBuf::from("crickbid.db"))
        .display()
        .to_string()
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validation(field: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError {
        field: field.into(),
        message: message.into(),
    }
}

fn validate(config: &Config) -> Result<(), ConfigError> {
    if config.league.starting_balance < 0 {
        return Err(validation(
            "league.starting_balance",
            format!("must be >= 0, got {}", config.league.starting_balance),
        ));
    }

    let mut seen = std::collections::HashSet::new();
    for team in &config.league.teams {
        if team.name.trim().is_empty() {
            return Err(validation("league.teams.name", "must not be empty"));
        }
        if !seen.insert(team.name.as_str()) {
            return Err(validation(
                "league.teams.name",
                format!("duplicate team `{}`", team.name),
            ));
        }
    }

    let auction = &config.rules.auction;
    if auction.bid_window_secs == 0 {
        return Err(validation("auction.bid_window_secs", "must be greater than 0"));
    }
    if auction.roster_cap == 0 {
        return Err(validation("auction.roster_cap", "must be greater than 0"));
    }

    let format = &config.rules.format;
    let format_fields: &[(&str, u32)] = &[
        ("format.max_balls", format.max_balls),
        ("format.max_wickets", format.max_wickets),
        ("format.ball_interval_secs", format.ball_interval_secs),
    ];
    for (name, val) in format_fields {
        if *val == 0 {
            return Err(validation(name, "must be greater than 0"));
        }
    }

    let points = &config.rules.points;
    if !(points.win >= points.tie && points.tie >= points.loss) {
        return Err(validation(
            "points",
            format!(
                "expected win >= tie >= loss, got {}/{}/{}",
                points.win, points.tie, points.loss
            ),
        ));
    }

    if config.timer.tick_millis == 0 {
        return Err(validation("timer.tick_millis", "must be greater than 0"));
    }
    if config.grader.max_tokens == 0 {
        return Err(validation("grader.max_tokens", "must be greater than 0"));
    }
    if config.grader.timeout_secs == 0 {
        return Err(validation("grader.timeout_secs", "must be greater than 0"));
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
