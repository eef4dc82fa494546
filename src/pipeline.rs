//! Engine task: owns the store and the history loader, applies TUI commands
//! and republishes `AppState`.

use crate::config::Config;
use crate::engine::backtest::run_backtest;
use crate::engine::stats::{frequency_table, omission_table, Colour};
use crate::engine::{simulate_draw, Strategy};
use crate::feed::{DataLoader, DataOrigin};
use crate::lottery::{join_numbers, next_issue, parse_ticket, Draw, GameType};
use crate::recommend::recommend;
use crate::settlement::settle_pending;
use crate::store::Store;
use crate::tui::state::{AppState, BacktestView, BetRow, HistoryRow};
use crate::tui::TuiCommand;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::{mpsc, watch};

/// Draws shown on the dashboard's recent-results table.
const RECENT_DRAWS: usize = 20;

pub struct Engine {
    config: Config,
    user: String,
    store: Store,
    loader: DataLoader,
    game: GameType,
    history: Vec<Draw>,
    state_tx: watch::Sender<AppState>,
}

fn origin_label(origin: DataOrigin) -> &'static str {
    match origin {
        DataOrigin::Fetched => "已更新",
        DataOrigin::Cache => "缓存",
        DataOrigin::CacheFallback => "缓存(更新失败)",
        DataOrigin::Empty => "无数据",
    }
}

impl Engine {
    pub fn new(
        config: Config,
        user: String,
        store: Store,
        loader: DataLoader,
        game: GameType,
        state_tx: watch::Sender<AppState>,
    ) -> Self {
        Self {
            config,
            user,
            store,
            loader,
            game,
            history: Vec::new(),
            state_tx,
        }
    }

    fn log(&self, level: &'static str, message: String) {
        self.state_tx.send_modify(|s| s.push_log(level, message));
    }

    fn status(&self, ok: bool, message: impl Into<String>) {
        let message = message.into();
        self.state_tx.send_modify(|s| s.set_status(ok, message));
    }

    fn busy(&self, task: Option<&str>) {
        let task = task.map(str::to_string);
        self.state_tx.send_modify(|s| s.busy = task);
    }

    /// Process commands until Quit or the TUI hangs up.
    pub async fn run(mut self, mut cmd_rx: mpsc::Receiver<TuiCommand>) {
        self.load_history(false).await;
        self.refresh_bets();

        while let Some(cmd) = cmd_rx.recv().await {
            if cmd == TuiCommand::Quit {
                break;
            }
            self.handle(cmd).await;
        }
        tracing::info!("engine stopped");
    }

    pub async fn handle(&mut self, cmd: TuiCommand) {
        tracing::debug!(?cmd, "tui command");
        match cmd {
            TuiCommand::Quit => {}
            TuiCommand::SwitchGame => {
                self.game = self.game.toggled();
                let game = self.game;
                self.state_tx.send_modify(|s| {
                    s.game = game;
                    s.predictions.clear();
                    s.backtest = None;
                    s.simulated = None;
                });
                self.load_history(false).await;
                self.refresh_bets();
            }
            TuiCommand::ForceUpdate => {
                self.load_history(true).await;
            }
            TuiCommand::Generate { count } => self.generate(count),
            TuiCommand::SaveTicket(idx) => self.save_predictions(Some(idx)),
            TuiCommand::SaveAll => self.save_predictions(None),
            TuiCommand::RunBacktest { strategy, test_count, bets_per_issue } => {
                self.backtest(strategy, test_count, bets_per_issue).await;
            }
            TuiCommand::CheckPrizes => self.check_prizes(),
            TuiCommand::PlaceBet { red, blue, note } => self.place_bet(&red, &blue, &note),
            TuiCommand::Simulate => {
                let mut rng = StdRng::from_entropy();
                let ticket = simulate_draw(self.game, &mut rng);
                self.state_tx.send_modify(|s| s.simulated = Some(ticket));
            }
        }
    }

    async fn load_history(&mut self, force: bool) {
        let game = self.game;
        self.busy(Some("更新数据"));
        let loaded = self.loader.load(game, force).await;
        self.busy(None);

        match loaded.origin {
            DataOrigin::Fetched => self.log("INFO", format!("{} 数据已更新: {} 期", game.config().cn_name, loaded.draws.len())),
            DataOrigin::CacheFallback => {
                self.log("WARN", format!("{} 数据更新失败，使用缓存", game.config().cn_name));
                self.status(false, "数据更新失败，已使用本地缓存");
            }
            DataOrigin::Empty => {
                self.log("ERROR", format!("{} 无可用数据", game.config().cn_name));
                self.status(false, "暂无数据，请检查网络后按 [u] 更新");
            }
            DataOrigin::Cache => {}
        }

        self.history = loaded.draws;
        let updated = loaded.updated_at.map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string());
        let origin = origin_label(loaded.origin).to_string();
        let snapshot = DashboardSnapshot::build(game, &self.history);
        self.state_tx.send_modify(|s| {
            s.draws_loaded = snapshot.draws_loaded;
            s.data_origin = origin;
            s.last_update = updated;
            s.next_issue = snapshot.next_issue;
            s.history_rows = snapshot.history_rows;
            s.red_freq = snapshot.red_freq;
            s.blue_freq = snapshot.blue_freq;
            s.red_omission = snapshot.red_omission;
        });
    }

    fn refresh_bets(&self) {
        match self.store.get_bets(Some(&self.user), Some(self.game)) {
            Ok(bets) => {
                let rows: Vec<BetRow> = bets
                    .into_iter()
                    .map(|b| BetRow {
                        created_at: b.created_at,
                        issue: b.issue,
                        numbers: b.ticket.format(),
                        status: b.status,
                        prize_level: b.prize_level.unwrap_or_default(),
                        win_amount: b.win_amount,
                        note: b.note,
                    })
                    .collect();
                self.state_tx.send_modify(|s| s.bets = rows);
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to load bets");
                self.log("ERROR", format!("读取投注记录失败: {}", e));
            }
        }
    }

    fn generate(&self, count: usize) {
        let count = count.clamp(1, self.config.predictor.max_count.max(1));
        if self.history.is_empty() {
            self.status(false, "暂无历史数据，无法预测");
            return;
        }
        let today = chrono::Local::now().date_naive();
        match recommend(&self.store, &self.user, today, self.game, &self.history, count) {
            Ok(tickets) => {
                self.log("INFO", format!("生成 {} 注推荐号码", tickets.len()));
                self.status(true, format!("已生成 {} 注今日推荐", tickets.len()));
                self.state_tx.send_modify(|s| s.predictions = tickets);
            }
            Err(e) => {
                tracing::error!(error = %e, "prediction failed");
                self.status(false, format!("预测失败: {}", e));
            }
        }
    }

    /// Save one prediction (or all of them) as bets on the next issue.
    fn save_predictions(&self, index: Option<usize>) {
        let predictions = self.state_tx.borrow().predictions.clone();
        let chosen: Vec<_> = match index {
            Some(i) => predictions.get(i).cloned().into_iter().collect(),
            None => predictions,
        };
        if chosen.is_empty() {
            self.status(false, "没有可保存的号码");
            return;
        }

        let issue = next_issue(&self.history);
        let mut saved = 0;
        for ticket in &chosen {
            match self.store.add_bet(&self.user, self.game, &issue, ticket, "智能推荐") {
                Ok(_) => saved += 1,
                Err(e) => tracing::error!(error = %e, "failed to save bet"),
            }
        }
        self.log("INFO", format!("保存 {} 注至第 {} 期", saved, issue));
        self.status(saved == chosen.len(), format!("已保存 {} 注至第 {} 期", saved, issue));
        self.refresh_bets();
    }

    async fn backtest(&mut self, strategy: Strategy, test_count: usize, bets_per_issue: usize) {
        let game = self.game;
        let history = self.history.clone();
        let progress_tx = self.state_tx.clone();
        self.busy(Some("回测中"));
        self.state_tx.send_modify(|s| s.backtest_progress = Some(0.0));
        tracing::info!(%strategy, test_count, bets_per_issue, "backtest started");

        let result = tokio::task::spawn_blocking(move || {
            run_backtest(game, strategy, &history, test_count, bets_per_issue, |p| {
                progress_tx.send_modify(|s| s.backtest_progress = Some(p));
            })
        })
        .await;

        self.busy(None);
        match result {
            Ok(report) => {
                if report.is_empty() {
                    self.status(false, "历史数据不足，无法回测");
                } else {
                    self.log(
                        "INFO",
                        format!(
                            "回测完成: {} 期, ROI {:.2}%, 中奖率 {:.1}%",
                            report.rows.len(),
                            report.roi(),
                            report.win_rate()
                        ),
                    );
                    self.status(true, "回测完成");
                }
                self.state_tx.send_modify(|s| {
                    s.backtest_progress = None;
                    s.backtest = Some(BacktestView { strategy, report });
                });
            }
            Err(e) => {
                tracing::error!(error = %e, "backtest task failed");
                self.state_tx.send_modify(|s| s.backtest_progress = None);
                self.status(false, format!("回测失败: {}", e));
            }
        }
    }

    fn check_prizes(&self) {
        if self.history.is_empty() {
            self.status(false, "暂无开奖数据");
            return;
        }
        match settle_pending(&self.store, self.game, &self.history, Some(&self.user)) {
            Ok(summary) => {
                let level = if summary.winners > 0 { "WIN" } else { "INFO" };
                self.log(
                    level,
                    format!("检查 {} 注, 更新 {} 注, 中奖 {} 注", summary.checked, summary.updated, summary.winners),
                );
                self.status(
                    summary.failed == 0,
                    format!("已检查 {} 注，其中 {} 注中奖", summary.updated, summary.winners),
                );
                self.refresh_bets();
            }
            Err(e) => {
                tracing::error!(error = %e, "prize check failed");
                self.status(false, format!("检查失败: {}", e));
            }
        }
    }

    fn place_bet(&self, red: &str, blue: &str, note: &str) {
        let ticket = match parse_ticket(self.game, red, blue) {
            Ok(t) => t,
            Err(e) => {
                self.status(false, e.to_string());
                return;
            }
        };
        let issue = next_issue(&self.history);
        match self.store.add_bet(&self.user, self.game, &issue, &ticket, note) {
            Ok(id) => {
                tracing::info!(bet = %id, issue = %issue, "manual bet saved");
                self.status(true, format!("投注成功: 第 {} 期 {}", issue, ticket.format()));
                self.state_tx.send_modify(|s| s.bets_accepted += 1);
                self.refresh_bets();
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to save manual bet");
                self.status(false, format!("投注失败: {}", e));
            }
        }
    }
}

/// Derived dashboard figures for one game's history.
#[derive(Debug, Clone, PartialEq)]
pub struct DashboardSnapshot {
    pub draws_loaded: usize,
    pub next_issue: String,
    pub history_rows: Vec<HistoryRow>,
    pub red_freq: Vec<(u8, u32)>,
    pub blue_freq: Vec<(u8, u32)>,
    pub red_omission: Vec<(u8, u32)>,
}

impl DashboardSnapshot {
    pub fn build(game: GameType, history: &[Draw]) -> Self {
        let cfg = game.config();
        let history_rows = history
            .iter()
            .rev()
            .take(RECENT_DRAWS)
            .map(|d| HistoryRow {
                issue: d.issue.clone(),
                date: d.date.clone().unwrap_or_default(),
                reds: join_numbers(&d.reds),
                blues: join_numbers(&d.blues),
            })
            .collect();
        Self {
            draws_loaded: history.len(),
            next_issue: next_issue(history),
            history_rows,
            red_freq: frequency_table(history, cfg.red_range.1, Colour::Red),
            blue_freq: frequency_table(history, cfg.blue_range.1, Colour::Blue),
            red_omission: omission_table(history, cfg.red_range.1, Colour::Red),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draws(n: usize) -> Vec<Draw> {
        let mut rng = StdRng::seed_from_u64(1);
        (0..n)
            .map(|i| {
                let t = simulate_draw(GameType::Ssq, &mut rng);
                Draw {
                    issue: (24001 + i).to_string(),
                    date: Some(format!("2024-01-{:02}", i % 28 + 1)),
                    reds: t.reds,
                    blues: t.blues,
                }
            })
            .collect()
    }

    #[test]
    fn test_snapshot_newest_first_and_capped() {
        let history = draws(30);
        let snap = DashboardSnapshot::build(GameType::Ssq, &history);
        assert_eq!(snap.draws_loaded, 30);
        assert_eq!(snap.history_rows.len(), RECENT_DRAWS);
        assert_eq!(snap.history_rows[0].issue, "24030");
        assert_eq!(snap.next_issue, "24031");
        assert_eq!(snap.red_freq.len(), 33);
        assert_eq!(snap.blue_freq.len(), 16);
        assert_eq!(snap.red_omission.len(), 33);
        let total_blue: u32 = snap.blue_freq.iter().map(|(_, c)| c).sum();
        assert_eq!(total_blue, 30);
    }

    #[test]
    fn test_snapshot_frequency_covers_full_history() {
        let history = draws(150);
        let snap = DashboardSnapshot::build(GameType::Ssq, &history);
        let total_blue: u32 = snap.blue_freq.iter().map(|(_, c)| c).sum();
        let total_red: u32 = snap.red_freq.iter().map(|(_, c)| c).sum();
        assert_eq!(total_blue, 150);
        assert_eq!(total_red, 150 * 6);
    }

    #[test]
    fn test_snapshot_empty_history() {
        let snap = DashboardSnapshot::build(GameType::Dlt, &[]);
        assert_eq!(snap.draws_loaded, 0);
        assert!(snap.history_rows.is_empty());
        assert_eq!(snap.next_issue, "Unknown");
    }
}
