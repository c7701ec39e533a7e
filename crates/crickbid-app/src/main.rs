// crickbid entry point.
//
// Startup sequence:
// 1. Initialize tracing (log to file)
// 2. Load config, copying defaults on first run
// 3. Open database and seed empty tables
// 4. Build the grader from credentials
// 5. Run the league loop until Ctrl+C

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::{info, warn};

use crickbid_app::app;
use crickbid_core::clock::SystemClock;
use crickbid_core::config;
use crickbid_core::db::Database;
use crickbid_core::seed;
use crickbid_core::League;
use crickbid_llm::LlmGrader;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing()?;
    info!("crickbid starting up");

    let config = config::load_config().context("failed to load configuration")?;
    info!(
        league = %config.league.name,
        teams = config.league.teams.len(),
        starting_balance = config.league.starting_balance,
        "config loaded"
    );

    if let Some(parent) = Path::new(&config.db_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
    }
    let db = Arc::new(Database::open(&config.db_path).context("failed to open database")?);
    info!("database opened at {}", config.db_path);

    let base_dir = std::env::current_dir()?;
    let seeded = seed::seed(&db, &config, &base_dir).context("failed to seed league data")?;
    info!(
        teams = seeded.teams,
        players = seeded.players,
        cases = seeded.cases,
        "seeding checked"
    );

    let grader = LlmGrader::from_config(&config);
    if grader.is_active() {
        info!(model = %config.grader.model, "grader initialized");
    } else {
        warn!("grader disabled (no API key); idea submissions will be refused");
    }

    let league = Arc::new(League::from_config(
        db,
        Arc::new(SystemClock),
        Arc::new(grader),
        &config,
    ));

    let tick_every = Duration::from_millis(config.timer.tick_millis);
    app::run(league, tick_every, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    })
    .await;

    info!("crickbid shut down cleanly");
    Ok(())
}

fn init_tracing() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let log_dir = std::env::current_dir()?.join("logs");
    std::fs::create_dir_all(&log_dir)?;

    let log_file = std::fs::File::create(log_dir.join("crickbid.log"))?;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                EnvFilter::new("crickbid_app=info,crickbid_core=info,crickbid_llm=info,warn")
            }),
        )
        .with_writer(log_file)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(())
}
