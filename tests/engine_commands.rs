//! Drives the engine task through TUI commands and checks the published state.

use anyhow::Result;
use async_trait::async_trait;
use lotto_dash::config::Config;
use lotto_dash::engine::{simulate_draw, Strategy};
use lotto_dash::feed::{DataLoader, HistorySource};
use lotto_dash::lottery::{Draw, GameType};
use lotto_dash::pipeline::Engine;
use lotto_dash::store::Store;
use lotto_dash::tui::state::AppState;
use lotto_dash::tui::TuiCommand;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::time::Duration;
use tokio::sync::watch;

struct SyntheticSource;

#[async_trait]
impl HistorySource for SyntheticSource {
    async fn fetch_history(&mut self, game: GameType) -> Result<Vec<Draw>> {
        let mut rng = StdRng::seed_from_u64(7);
        Ok((0..80)
            .map(|i| {
                let t = simulate_draw(game, &mut rng);
                Draw {
                    issue: (24001 + i).to_string(),
                    date: Some("2024-03-01".to_string()),
                    reds: t.reds,
                    blues: t.blues,
                }
            })
            .collect())
    }
}

fn engine(dir: &std::path::Path) -> (Engine, watch::Receiver<AppState>) {
    let loader = DataLoader::new(dir, Duration::from_secs(3600), Box::new(SyntheticSource)).unwrap();
    let store = Store::open_in_memory().unwrap();
    let (tx, rx) = watch::channel(AppState::new("alice".to_string(), GameType::Ssq));
    (Engine::new(Config::default(), "alice".to_string(), store, loader, GameType::Ssq, tx), rx)
}

#[tokio::test]
async fn test_update_generate_and_save() {
    let dir = tempfile::tempdir().unwrap();
    let (mut engine, rx) = engine(dir.path());

    engine.handle(TuiCommand::ForceUpdate).await;
    {
        let s = rx.borrow();
        assert_eq!(s.draws_loaded, 80);
        assert_eq!(s.history_rows.len(), 20);
        assert_eq!(s.history_rows[0].issue, "24080");
        assert_eq!(s.next_issue, "24081");
        assert!(s.last_update.is_some());
    }

    engine.handle(TuiCommand::Generate { count: 3 }).await;
    let first = rx.borrow().predictions.clone();
    assert_eq!(first.len(), 3);

    // Same user, same day: identical recommendation
    engine.handle(TuiCommand::Generate { count: 3 }).await;
    assert_eq!(rx.borrow().predictions, first);

    engine.handle(TuiCommand::SaveTicket(1)).await;
    engine.handle(TuiCommand::SaveAll).await;
    let s = rx.borrow();
    assert_eq!(s.bets.len(), 4);
    assert!(s.bets.iter().all(|b| b.issue == "24081" && b.status == "pending"));
}

#[tokio::test]
async fn test_manual_bet_validation_and_prize_check() {
    let dir = tempfile::tempdir().unwrap();
    let (mut engine, rx) = engine(dir.path());
    engine.handle(TuiCommand::ForceUpdate).await;

    engine
        .handle(TuiCommand::PlaceBet { red: "1,2".to_string(), blue: "1".to_string(), note: String::new() })
        .await;
    {
        let s = rx.borrow();
        let status = s.status.as_ref().unwrap();
        assert!(!status.ok);
        assert!(status.message.contains("红球数量错误"));
        assert!(s.bets.is_empty());
        assert_eq!(s.bets_accepted, 0);
    }

    engine
        .handle(TuiCommand::PlaceBet {
            red: "1,2,3,4,5,6".to_string(),
            blue: "7".to_string(),
            note: "test".to_string(),
        })
        .await;
    assert_eq!(rx.borrow().bets.len(), 1);
    assert!(rx.borrow().status.as_ref().unwrap().ok);
    assert_eq!(rx.borrow().bets_accepted, 1);

    // The bet targets an issue that has not been drawn, so it stays pending
    engine.handle(TuiCommand::CheckPrizes).await;
    assert_eq!(rx.borrow().bets[0].status, "pending");
}

#[tokio::test]
async fn test_backtest_publishes_report() {
    let dir = tempfile::tempdir().unwrap();
    let (mut engine, rx) = engine(dir.path());
    engine.handle(TuiCommand::ForceUpdate).await;

    engine
        .handle(TuiCommand::RunBacktest { strategy: Strategy::Frequency, test_count: 20, bets_per_issue: 2 })
        .await;
    let s = rx.borrow();
    assert!(s.backtest_progress.is_none());
    let bt = s.backtest.as_ref().unwrap();
    assert_eq!(bt.strategy, Strategy::Frequency);
    assert_eq!(bt.report.rows.len(), 20);
    assert_eq!(bt.report.total_cost(), 80);
}

#[tokio::test]
async fn test_switch_game_reloads() {
    let dir = tempfile::tempdir().unwrap();
    let (mut engine, rx) = engine(dir.path());
    engine.handle(TuiCommand::ForceUpdate).await;
    engine.handle(TuiCommand::Simulate).await;
    assert!(rx.borrow().simulated.is_some());

    engine.handle(TuiCommand::SwitchGame).await;
    let s = rx.borrow();
    assert_eq!(s.game, GameType::Dlt);
    assert!(s.simulated.is_none());
    assert_eq!(s.draws_loaded, 80);
    assert_eq!(s.blue_freq.len(), 12);
    assert!(dir.path().join("dlt_history.json").exists());
}
