use crate::engine::{BacktestReport, Strategy};
use crate::lottery::{GameType, Ticket};
use std::collections::VecDeque;
use std::time::Instant;

const MAX_LOGS: usize = 200;

/// Snapshot published by the engine task and rendered by the TUI.
#[derive(Debug, Clone)]
pub struct AppState {
    pub user: String,
    pub game: GameType,
    pub draws_loaded: usize,
    pub data_origin: String,
    pub last_update: Option<String>,
    pub next_issue: String,
    pub history_rows: Vec<HistoryRow>,
    pub red_freq: Vec<(u8, u32)>,
    pub blue_freq: Vec<(u8, u32)>,
    pub red_omission: Vec<(u8, u32)>,
    pub predictions: Vec<Ticket>,
    pub backtest: Option<BacktestView>,
    pub backtest_progress: Option<f64>,
    pub bets: Vec<BetRow>,
    pub simulated: Option<Ticket>,
    /// Manual bets saved this session; the bet form clears when it grows.
    pub bets_accepted: u64,
    /// Feedback line for the last user action.
    pub status: Option<StatusLine>,
    pub busy: Option<String>,
    pub start_time: Instant,
    pub logs: VecDeque<LogEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryRow {
    pub issue: String,
    pub date: String,
    pub reds: String,
    pub blues: String,
}

#[derive(Debug, Clone)]
pub struct BacktestView {
    pub strategy: Strategy,
    pub report: BacktestReport,
}

#[derive(Debug, Clone)]
pub struct BetRow {
    pub created_at: String,
    pub issue: String,
    pub numbers: String,
    pub status: String,
    pub prize_level: String,
    pub win_amount: u64,
    pub note: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLine {
    pub ok: bool,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct LogEntry {
    pub time: String,
    pub level: String,
    pub message: String,
}

impl AppState {
    pub fn new(user: String, game: GameType) -> Self {
        Self {
            user,
            game,
            draws_loaded: 0,
            data_origin: String::new(),
            last_update: None,
            next_issue: "Unknown".to_string(),
            history_rows: Vec::new(),
            red_freq: Vec::new(),
            blue_freq: Vec::new(),
            red_omission: Vec::new(),
            predictions: Vec::new(),
            backtest: None,
            backtest_progress: None,
            bets: Vec::new(),
            simulated: None,
            bets_accepted: 0,
            status: None,
            busy: None,
            start_time: Instant::now(),
            logs: VecDeque::with_capacity(MAX_LOGS),
        }
    }

    pub fn push_log(&mut self, level: &str, message: String) {
        let time = chrono::Local::now().format("%H:%M:%S%.3f").to_string();
        if self.logs.len() >= MAX_LOGS {
            self.logs.pop_front();
        }
        self.logs.push_back(LogEntry {
            time,
            level: level.to_string(),
            message,
        });
    }

    pub fn set_status(&mut self, ok: bool, message: impl Into<String>) {
        self.status = Some(StatusLine { ok, message: message.into() });
    }

    pub fn uptime(&self) -> String {
        let secs = self.start_time.elapsed().as_secs();
        let h = secs / 3600;
        let m = (secs % 3600) / 60;
        format!("{}h {:02}m", h, m)
    }
}
