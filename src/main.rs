use anyhow::{Context, Result};
use lotto_dash::config::Config;
use lotto_dash::feed::{DataLoader, FiveHundredScraper};
use lotto_dash::lottery::GameType;
use lotto_dash::pipeline::Engine;
use lotto_dash::store::Store;
use lotto_dash::tui::state::AppState;
use lotto_dash::tui::{self, ViewState};
use lotto_dash::{auth, scheduler};
use std::path::PathBuf;
use tokio::sync::{mpsc, watch};

const LOG_FILE: &str = "lotto-dash.log";
const DEFAULT_FILTER: &str = "lotto_dash=info";

/// Value following `flag` on the command line, e.g. `--config path`.
fn arg_value(flag: &str) -> Option<String> {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == flag {
            return args.next();
        }
    }
    None
}

fn env_filter() -> tracing_subscriber::EnvFilter {
    tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_FILTER))
}

fn build_loader(config: &Config) -> Result<DataLoader> {
    let scraper = FiveHundredScraper::new(&config.fetch)?;
    DataLoader::new(&config.data.dir, config.data.stale_after(), Box::new(scraper))
}

async fn run_scheduler(config: Config, once: bool) -> Result<()> {
    tracing_subscriber::fmt().with_env_filter(env_filter()).init();

    let store = Store::open(&config.data.db_path())?;
    let mut loader = build_loader(&config)?;

    if once {
        for (game, summary) in scheduler::run_task(&mut loader, &store).await {
            tracing::info!(game = %game, checked = summary.checked, winners = summary.winners, "run complete");
        }
        return Ok(());
    }

    let at = config.scheduler.run_time()?;
    let offset = config.scheduler.offset()?;
    scheduler::run_forever(&mut loader, &store, at, offset).await
}

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = arg_value("--config")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));
    let config = Config::load_or_default(&config_path)?;

    // Load saved settings from .env (real env vars take precedence)
    Config::load_env_file();

    let args: Vec<String> = std::env::args().collect();
    if args.iter().any(|a| a == "--scheduler") {
        return run_scheduler(config, false).await;
    }
    if args.iter().any(|a| a == "--run-once") {
        return run_scheduler(config, true).await;
    }

    let log_file = std::fs::File::create(LOG_FILE)
        .with_context(|| format!("Failed to create log file {}", LOG_FILE))?;
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(log_file)
        .with_ansi(false)
        .init();

    let game = match arg_value("--game") {
        Some(g) => g.parse::<GameType>()?,
        None => GameType::Ssq,
    };

    let store = Store::open(&config.data.db_path())?;
    let user = auth::login_form(&store)?;

    println!();
    println!("  欢迎, {}. Starting dashboard...", user);
    println!();

    let loader = build_loader(&config)?;

    // Channels
    let (state_tx, state_rx) = watch::channel(AppState::new(user.clone(), game));
    let (cmd_tx, cmd_rx) = mpsc::channel::<tui::TuiCommand>(16);

    let view = ViewState::new(
        config.predictor.default_count,
        config.predictor.max_count,
        config.backtest.test_count,
        config.backtest.bets_per_issue,
    );

    let engine = Engine::new(config, user, store, loader, game, state_tx);
    let engine_handle = tokio::spawn(engine.run(cmd_rx));

    tui::run_tui(state_rx, cmd_tx, view).await?;

    if let Err(e) = engine_handle.await {
        tracing::error!(error = %e, "engine task panicked");
    }
    tracing::debug!("shutting down");
    Ok(())
}
