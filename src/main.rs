//! rostrum server
//!
//! Runs the debate engine's background jobs and a few operator commands.
//!
//! Run with: cargo run -- --serve

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use rostrum::{
    db, CleanupSweeper, DebateEngine, EngineConfig, FallbackGenerator, HttpGenerator,
    MatchmakingScheduler, TracingSink,
};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = std::env::args().collect();
    match args.get(1).map(|s| s.as_str()) {
        Some("--serve") => run_serve().await,
        Some("--match-once") => run_match_once().await,
        Some("--sweep-once") => run_sweep_once(),
        Some("--stats") => run_stats(),
        _ => {
            eprintln!("Usage: rostrum [--serve | --match-once | --sweep-once | --stats]");
            eprintln!();
            eprintln!("  --serve       run matchmaking and cleanup loops until interrupted");
            eprintln!("  --match-once  one matchmaking pass");
            eprintln!("  --sweep-once  one cleanup pass");
            eprintln!("  --stats       debate counts per status");
            Ok(())
        }
    }
}

fn db_path() -> PathBuf {
    std::env::var("ROSTRUM_DB")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("rostrum.db"))
}

fn build_engine(config: &EngineConfig) -> Result<DebateEngine> {
    let conn = db::init_db(&db_path())?;
    let generator: Arc<dyn rostrum::ArgumentGenerator> =
        if config.generator.api_key.is_empty() {
            info!("no API key configured, using templated fallback generator");
            Arc::new(FallbackGenerator)
        } else {
            Arc::new(HttpGenerator::new(config.generator.clone()))
        };
    Ok(DebateEngine::new(
        conn,
        config.clone(),
        Arc::new(TracingSink),
        generator,
    ))
}

async fn run_serve() -> Result<()> {
    let config = EngineConfig::from_env();
    info!(db = %db_path().display(), "starting rostrum");

    let scheduler = MatchmakingScheduler::new(build_engine(&config)?);
    let sweeper = CleanupSweeper::new(
        db::init_db(&db_path())?,
        config.clone(),
        Arc::new(TracingSink),
    );

    let scheduler_task = tokio::spawn(scheduler.run());
    let sweeper_task = tokio::spawn(sweeper.run());

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    scheduler_task.abort();
    sweeper_task.abort();
    Ok(())
}

async fn run_match_once() -> Result<()> {
    let config = EngineConfig::from_env();
    let mut scheduler = MatchmakingScheduler::new(build_engine(&config)?);
    let report = scheduler.tick().await?;
    println!(
        "examined {} debate(s), matched {}, lost {} race(s)",
        report.examined, report.matched, report.race_lost
    );
    Ok(())
}

fn run_sweep_once() -> Result<()> {
    let config = EngineConfig::from_env();
    let sweeper = CleanupSweeper::new(db::init_db(&db_path())?, config, Arc::new(TracingSink));
    let report = sweeper.sweep()?;
    println!(
        "abandoned {} waiting, {} idle active debate(s)",
        report.abandoned_waiting, report.abandoned_active
    );
    Ok(())
}

fn run_stats() -> Result<()> {
    let conn = db::init_db(&db_path())?;
    let counts = db::status_counts(&conn)?;
    if counts.is_empty() {
        println!("no debates");
        return Ok(());
    }
    for (status, count) in counts {
        println!("{:>16}  {}", status, count);
    }
    Ok(())
}
