pub mod render;
pub mod state;

use crate::engine::Strategy;
use anyhow::Result;
use crossterm::{
    event::{Event, EventStream, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    ExecutableCommand,
};
use futures_util::StreamExt;
use ratatui::prelude::*;
use state::AppState;
use std::io::stdout;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

pub const MIN_TEST_COUNT: usize = 10;
pub const MAX_TEST_COUNT: usize = 100;
pub const MAX_BETS_PER_ISSUE: usize = 100;

/// Commands the TUI can send back to the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum TuiCommand {
    Quit,
    SwitchGame,
    ForceUpdate,
    Generate { count: usize },
    SaveTicket(usize),
    SaveAll,
    RunBacktest { strategy: Strategy, test_count: usize, bets_per_issue: usize },
    CheckPrizes,
    PlaceBet { red: String, blue: String, note: String },
    Simulate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    Dashboard,
    Prediction,
    Backtest,
    Bets,
    Simulator,
}

impl View {
    pub const ALL: [View; 5] = [View::Dashboard, View::Prediction, View::Backtest, View::Bets, View::Simulator];

    pub fn title(&self) -> &'static str {
        match self {
            View::Dashboard => "数据看板",
            View::Prediction => "智能预测",
            View::Backtest => "策略回测",
            View::Bets => "我的投注",
            View::Simulator => "模拟开奖",
        }
    }

    fn index(&self) -> usize {
        View::ALL.iter().position(|v| v == self).unwrap_or(0)
    }

    fn next(&self) -> View {
        View::ALL[(self.index() + 1) % View::ALL.len()]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BetField {
    Red,
    Blue,
    Note,
}

/// Manual bet entry form on the My Bets view.
#[derive(Debug, Clone, Default)]
pub struct BetForm {
    pub red: String,
    pub blue: String,
    pub note: String,
    /// Some while the form captures keystrokes.
    pub editing: Option<BetField>,
}

impl BetForm {
    fn field_mut(&mut self, field: BetField) -> &mut String {
        match field {
            BetField::Red => &mut self.red,
            BetField::Blue => &mut self.blue,
            BetField::Note => &mut self.note,
        }
    }
}

/// UI-local selections that never leave the TUI task.
#[derive(Debug, Clone)]
pub struct ViewState {
    pub view: View,
    pub predict_count: usize,
    pub max_count: usize,
    pub selected_ticket: usize,
    pub strategy_idx: usize,
    pub test_count: usize,
    pub bets_per_issue: usize,
    pub bet_form: BetForm,
    pub scroll: usize,
    bets_accepted: u64,
}

impl ViewState {
    pub fn new(default_count: usize, max_count: usize, test_count: usize, bets_per_issue: usize) -> Self {
        Self {
            view: View::Dashboard,
            predict_count: default_count.clamp(1, max_count.max(1)),
            max_count: max_count.max(1),
            selected_ticket: 0,
            strategy_idx: 0,
            test_count: test_count.clamp(MIN_TEST_COUNT, MAX_TEST_COUNT),
            bets_per_issue: bets_per_issue.clamp(1, MAX_BETS_PER_ISSUE),
            bet_form: BetForm::default(),
            scroll: 0,
            bets_accepted: 0,
        }
    }

    /// Sync UI-local state with the engine. The bet form is cleared once
    /// its bet has been saved; a rejected bet keeps the text for fixing.
    pub fn observe(&mut self, state: &AppState) {
        if state.bets_accepted != self.bets_accepted {
            self.bets_accepted = state.bets_accepted;
            if self.bet_form.editing.is_none() {
                self.bet_form = BetForm::default();
            }
        }
    }

    pub fn strategy(&self) -> Strategy {
        Strategy::ALL[self.strategy_idx % Strategy::ALL.len()]
    }
}

/// Map a key press to a view change and, possibly, an engine command.
/// `tickets` is the number of predictions currently shown.
pub fn handle_key(view: &mut ViewState, key: KeyEvent, tickets: usize) -> Option<TuiCommand> {
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
        return Some(TuiCommand::Quit);
    }

    if let Some(field) = view.bet_form.editing {
        return handle_form_key(view, field, key);
    }

    match key.code {
        KeyCode::Char('q') => return Some(TuiCommand::Quit),
        KeyCode::Char('g') => return Some(TuiCommand::SwitchGame),
        KeyCode::Char('u') => return Some(TuiCommand::ForceUpdate),
        KeyCode::Tab => {
            view.view = view.view.next();
            view.scroll = 0;
            return None;
        }
        KeyCode::Char(c @ '1'..='5') => {
            view.view = View::ALL[(c as usize) - ('1' as usize)];
            view.scroll = 0;
            return None;
        }
        _ => {}
    }

    match view.view {
        View::Dashboard => {
            scroll_keys(view, key.code);
            None
        }
        View::Prediction => match key.code {
            KeyCode::Char('+') | KeyCode::Char('=') => {
                view.predict_count = (view.predict_count + 1).min(view.max_count);
                None
            }
            KeyCode::Char('-') => {
                view.predict_count = view.predict_count.saturating_sub(1).max(1);
                None
            }
            KeyCode::Enter => {
                view.selected_ticket = 0;
                Some(TuiCommand::Generate { count: view.predict_count })
            }
            KeyCode::Char('j') | KeyCode::Down => {
                if tickets > 0 {
                    view.selected_ticket = (view.selected_ticket + 1).min(tickets - 1);
                }
                None
            }
            KeyCode::Char('k') | KeyCode::Up => {
                view.selected_ticket = view.selected_ticket.saturating_sub(1);
                None
            }
            KeyCode::Char('s') if tickets > 0 => Some(TuiCommand::SaveTicket(view.selected_ticket.min(tickets - 1))),
            KeyCode::Char('a') if tickets > 0 => Some(TuiCommand::SaveAll),
            _ => None,
        },
        View::Backtest => match key.code {
            KeyCode::Left | KeyCode::Char('h') => {
                view.strategy_idx = (view.strategy_idx + Strategy::ALL.len() - 1) % Strategy::ALL.len();
                None
            }
            KeyCode::Right | KeyCode::Char('l') => {
                view.strategy_idx = (view.strategy_idx + 1) % Strategy::ALL.len();
                None
            }
            KeyCode::Char('+') | KeyCode::Char('=') => {
                view.test_count = (view.test_count + 10).min(MAX_TEST_COUNT);
                None
            }
            KeyCode::Char('-') => {
                view.test_count = view.test_count.saturating_sub(10).max(MIN_TEST_COUNT);
                None
            }
            KeyCode::Char(']') => {
                view.bets_per_issue = (view.bets_per_issue + 1).min(MAX_BETS_PER_ISSUE);
                None
            }
            KeyCode::Char('[') => {
                view.bets_per_issue = view.bets_per_issue.saturating_sub(1).max(1);
                None
            }
            KeyCode::Enter => Some(TuiCommand::RunBacktest {
                strategy: view.strategy(),
                test_count: view.test_count,
                bets_per_issue: view.bets_per_issue,
            }),
            code => {
                scroll_keys(view, code);
                None
            }
        },
        View::Bets => match key.code {
            KeyCode::Char('e') | KeyCode::Char('i') => {
                view.bet_form.editing = Some(BetField::Red);
                None
            }
            KeyCode::Char('c') => Some(TuiCommand::CheckPrizes),
            code => {
                scroll_keys(view, code);
                None
            }
        },
        View::Simulator => match key.code {
            KeyCode::Enter | KeyCode::Char(' ') => Some(TuiCommand::Simulate),
            _ => None,
        },
    }
}

fn handle_form_key(view: &mut ViewState, field: BetField, key: KeyEvent) -> Option<TuiCommand> {
    let form = &mut view.bet_form;
    match key.code {
        KeyCode::Esc => {
            form.editing = None;
            None
        }
        KeyCode::Tab | KeyCode::Down => {
            form.editing = Some(match field {
                BetField::Red => BetField::Blue,
                BetField::Blue => BetField::Note,
                BetField::Note => BetField::Red,
            });
            None
        }
        KeyCode::BackTab | KeyCode::Up => {
            form.editing = Some(match field {
                BetField::Red => BetField::Note,
                BetField::Blue => BetField::Red,
                BetField::Note => BetField::Blue,
            });
            None
        }
        KeyCode::Backspace => {
            form.field_mut(field).pop();
            None
        }
        KeyCode::Char(c) => {
            form.field_mut(field).push(c);
            None
        }
        KeyCode::Enter => {
            let cmd = TuiCommand::PlaceBet {
                red: form.red.trim().to_string(),
                blue: form.blue.trim().to_string(),
                note: form.note.trim().to_string(),
            };
            form.editing = None;
            Some(cmd)
        }
        _ => None,
    }
}

fn scroll_keys(view: &mut ViewState, code: KeyCode) {
    match code {
        KeyCode::Char('j') | KeyCode::Down => view.scroll = view.scroll.saturating_add(1),
        KeyCode::Char('k') | KeyCode::Up => view.scroll = view.scroll.saturating_sub(1),
        KeyCode::Home => view.scroll = 0,
        _ => {}
    }
}

/// Run the TUI. Reads state from `state_rx`, sends commands on `cmd_tx`.
pub async fn run_tui(
    state_rx: watch::Receiver<AppState>,
    cmd_tx: mpsc::Sender<TuiCommand>,
    view: ViewState,
) -> Result<()> {
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    let result = tui_loop(&mut terminal, state_rx, cmd_tx, view).await;

    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    result
}

async fn tui_loop(
    terminal: &mut Terminal<CrosstermBackend<std::io::Stdout>>,
    mut state_rx: watch::Receiver<AppState>,
    cmd_tx: mpsc::Sender<TuiCommand>,
    mut view: ViewState,
) -> Result<()> {
    let mut events = EventStream::new();
    let mut tick = tokio::time::interval(Duration::from_millis(250));
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut spinner_frame: u8 = 0;

    loop {
        let state = state_rx.borrow().clone();
        view.observe(&state);
        terminal.draw(|f| render::draw(f, &state, &view, spinner_frame))?;

        tokio::select! {
            maybe_event = events.next() => {
                match maybe_event {
                    Some(Ok(Event::Key(key))) if key.kind == KeyEventKind::Press => {
                        if let Some(cmd) = handle_key(&mut view, key, state.predictions.len()) {
                            let quit = cmd == TuiCommand::Quit;
                            let _ = cmd_tx.send(cmd).await;
                            if quit {
                                return Ok(());
                            }
                        }
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(e.into()),
                    None => return Ok(()),
                }
            }
            changed = state_rx.changed() => {
                if changed.is_err() {
                    // Engine task ended.
                    return Ok(());
                }
            }
            _ = tick.tick() => {
                spinner_frame = spinner_frame.wrapping_add(1);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn press(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn view() -> ViewState {
        ViewState::new(5, 20, 50, 5)
    }

    #[test]
    fn test_global_keys() {
        let mut v = view();
        assert_eq!(handle_key(&mut v, press(KeyCode::Char('q')), 0), Some(TuiCommand::Quit));
        assert_eq!(handle_key(&mut v, press(KeyCode::Char('g')), 0), Some(TuiCommand::SwitchGame));
        assert_eq!(handle_key(&mut v, press(KeyCode::Char('u')), 0), Some(TuiCommand::ForceUpdate));
        assert_eq!(handle_key(&mut v, press(KeyCode::Char('3')), 0), None);
        assert_eq!(v.view, View::Backtest);
        handle_key(&mut v, press(KeyCode::Tab), 0);
        assert_eq!(v.view, View::Bets);
    }

    #[test]
    fn test_prediction_count_is_clamped() {
        let mut v = ViewState::new(19, 20, 50, 5);
        v.view = View::Prediction;
        for _ in 0..5 {
            handle_key(&mut v, press(KeyCode::Char('+')), 0);
        }
        assert_eq!(v.predict_count, 20);
        for _ in 0..30 {
            handle_key(&mut v, press(KeyCode::Char('-')), 0);
        }
        assert_eq!(v.predict_count, 1);
        assert_eq!(handle_key(&mut v, press(KeyCode::Enter), 0), Some(TuiCommand::Generate { count: 1 }));
    }

    #[test]
    fn test_save_requires_tickets() {
        let mut v = view();
        v.view = View::Prediction;
        assert_eq!(handle_key(&mut v, press(KeyCode::Char('s')), 0), None);
        handle_key(&mut v, press(KeyCode::Down), 3);
        handle_key(&mut v, press(KeyCode::Down), 3);
        handle_key(&mut v, press(KeyCode::Down), 3);
        assert_eq!(handle_key(&mut v, press(KeyCode::Char('s')), 3), Some(TuiCommand::SaveTicket(2)));
        assert_eq!(handle_key(&mut v, press(KeyCode::Char('a')), 3), Some(TuiCommand::SaveAll));
    }

    #[test]
    fn test_backtest_parameters() {
        let mut v = view();
        v.view = View::Backtest;
        handle_key(&mut v, press(KeyCode::Right), 0);
        for _ in 0..10 {
            handle_key(&mut v, press(KeyCode::Char('+')), 0);
        }
        for _ in 0..10 {
            handle_key(&mut v, press(KeyCode::Char('[')), 0);
        }
        assert_eq!(
            handle_key(&mut v, press(KeyCode::Enter), 0),
            Some(TuiCommand::RunBacktest { strategy: Strategy::Random, test_count: 100, bets_per_issue: 1 })
        );
        handle_key(&mut v, press(KeyCode::Left), 0);
        handle_key(&mut v, press(KeyCode::Left), 0);
        assert_eq!(v.strategy(), Strategy::Omission);
    }

    #[test]
    fn test_bet_form_captures_typing() {
        let mut v = view();
        v.view = View::Bets;
        handle_key(&mut v, press(KeyCode::Char('e')), 0);
        for c in "1,2,3".chars() {
            handle_key(&mut v, press(KeyCode::Char(c)), 0);
        }
        // 'q' is text while editing, not quit
        assert_eq!(handle_key(&mut v, press(KeyCode::Char('q')), 0), None);
        handle_key(&mut v, press(KeyCode::Backspace), 0);
        handle_key(&mut v, press(KeyCode::Tab), 0);
        handle_key(&mut v, press(KeyCode::Char('7')), 0);
        let cmd = handle_key(&mut v, press(KeyCode::Enter), 0);
        assert_eq!(
            cmd,
            Some(TuiCommand::PlaceBet { red: "1,2,3".to_string(), blue: "7".to_string(), note: String::new() })
        );
        assert!(v.bet_form.editing.is_none());
        assert_eq!(handle_key(&mut v, press(KeyCode::Char('c')), 0), Some(TuiCommand::CheckPrizes));
    }

    #[test]
    fn test_bet_form_clears_after_saved_bet() {
        let mut v = view();
        v.view = View::Bets;
        handle_key(&mut v, press(KeyCode::Char('e')), 0);
        for c in "1,2,3,4,5,6".chars() {
            handle_key(&mut v, press(KeyCode::Char(c)), 0);
        }
        handle_key(&mut v, press(KeyCode::Enter), 0);

        let mut state = AppState::new("alice".to_string(), crate::lottery::GameType::Ssq);
        v.observe(&state);
        assert_eq!(v.bet_form.red, "1,2,3,4,5,6", "kept until the engine saves it");

        state.bets_accepted = 1;
        v.observe(&state);
        assert!(v.bet_form.red.is_empty());

        // Enter on the cleared form sends an empty bet, not the previous one
        handle_key(&mut v, press(KeyCode::Char('e')), 0);
        assert_eq!(
            handle_key(&mut v, press(KeyCode::Enter), 0),
            Some(TuiCommand::PlaceBet { red: String::new(), blue: String::new(), note: String::new() })
        );
    }
}
