use std::borrow::Cow;

use super::state::{AppState, BacktestView};
use super::{BetField, View, ViewState, MAX_TEST_COUNT, MIN_TEST_COUNT};
use crate::lottery::{join_numbers, Ticket};
use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    symbols,
    text::{Line, Span},
    widgets::{
        Axis, BarChart, Block, Borders, Cell, Chart, Dataset, Gauge, GraphType, Paragraph, Row,
        Table, Tabs,
    },
    Frame,
};

const SPINNER_FRAMES: &[char] = &['⠋', '⠙', '⠹', '⠸', '⠼', '⠴', '⠦', '⠧', '⠇', '⠏'];

pub fn draw(f: &mut Frame, state: &AppState, view: &ViewState, spinner_frame: u8) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(3),
            Constraint::Min(10),
            Constraint::Length(1),
            Constraint::Length(7),
            Constraint::Length(1),
        ])
        .split(f.area());

    draw_header(f, state, chunks[0], spinner_frame);
    draw_tabs(f, view, chunks[1]);
    match view.view {
        View::Dashboard => draw_dashboard(f, state, view, chunks[2]),
        View::Prediction => draw_prediction(f, state, view, chunks[2]),
        View::Backtest => draw_backtest(f, state, view, chunks[2]),
        View::Bets => draw_bets(f, state, view, chunks[2]),
        View::Simulator => draw_simulator(f, state, chunks[2]),
    }
    draw_status(f, state, chunks[3]);
    draw_logs(f, state, chunks[4]);
    draw_footer(f, view, chunks[5]);
}

fn draw_header(f: &mut Frame, state: &AppState, area: Rect, spinner_frame: u8) {
    let cfg = state.game.config();
    let activity = match &state.busy {
        Some(task) => {
            let ch = SPINNER_FRAMES[(spinner_frame as usize) % SPINNER_FRAMES.len()];
            Span::styled(format!(" {} {}", ch, task), Style::default().fg(Color::Cyan))
        }
        None => Span::styled(" IDLE", Style::default().fg(Color::DarkGray)),
    };

    let updated = state.last_update.as_deref().unwrap_or("从未");
    let line = Line::from(vec![
        Span::styled(
            format!(" {} ", cfg.cn_name),
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        ),
        Span::raw(format!(
            "| 用户: {} | 数据: {} 期 ({}) | 最后更新: {} | 下期: {} | Up: {}",
            state.user,
            state.draws_loaded,
            state.data_origin,
            updated,
            state.next_issue,
            state.uptime(),
        )),
        activity,
    ]);

    let block = Block::default()
        .title(" 彩票数据分析系统 ")
        .borders(Borders::ALL);
    f.render_widget(Paragraph::new(line).block(block), area);
}

fn draw_tabs(f: &mut Frame, view: &ViewState, area: Rect) {
    let titles: Vec<Line> = View::ALL
        .iter()
        .enumerate()
        .map(|(i, v)| Line::from(format!("[{}] {}", i + 1, v.title())))
        .collect();
    let selected = View::ALL.iter().position(|v| *v == view.view).unwrap_or(0);
    let tabs = Tabs::new(titles)
        .select(selected)
        .highlight_style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD))
        .block(Block::default().borders(Borders::ALL));
    f.render_widget(tabs, area);
}

fn ticket_spans(ticket: &Ticket) -> Vec<Span<'static>> {
    vec![
        Span::styled(join_numbers(&ticket.reds), Style::default().fg(Color::Red)),
        Span::raw(" + "),
        Span::styled(join_numbers(&ticket.blues), Style::default().fg(Color::Blue)),
    ]
}

fn empty_notice(f: &mut Frame, area: Rect, title: &str, message: &str) {
    let block = Block::default().title(format!(" {} ", title)).borders(Borders::ALL);
    let para = Paragraph::new(vec![
        Line::from(""),
        Line::from(Span::styled(message.to_string(), Style::default().fg(Color::Yellow))),
    ])
    .alignment(Alignment::Center)
    .block(block);
    f.render_widget(para, area);
}

fn draw_dashboard(f: &mut Frame, state: &AppState, view: &ViewState, area: Rect) {
    if state.draws_loaded == 0 {
        empty_notice(f, area, "数据看板", "暂无数据，请按 [u] 更新");
        return;
    }

    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Length(44), Constraint::Min(20)])
        .split(area);

    let header = Row::new(vec!["期号", "日期", "红球", "蓝球"])
        .style(Style::default().add_modifier(Modifier::BOLD));
    let skip = view.scroll.min(state.history_rows.len().saturating_sub(1));
    let rows: Vec<Row> = state
        .history_rows
        .iter()
        .skip(skip)
        .map(|r| {
            Row::new(vec![
                Cell::from(r.issue.clone()),
                Cell::from(r.date.clone()),
                Cell::from(r.reds.clone()).style(Style::default().fg(Color::Red)),
                Cell::from(r.blues.clone()).style(Style::default().fg(Color::Blue)),
            ])
        })
        .collect();
    let table = Table::new(
        rows,
        [
            Constraint::Length(8),
            Constraint::Length(10),
            Constraint::Length(17),
            Constraint::Length(6),
        ],
    )
    .header(header)
    .block(Block::default().title(" 近期开奖 ").borders(Borders::ALL));
    f.render_widget(table, cols[0]);

    let charts = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage(40),
            Constraint::Percentage(30),
            Constraint::Percentage(30),
        ])
        .split(cols[1]);

    draw_bars(f, charts[0], " 红球出现频率 ", &state.red_freq, Color::Red);
    draw_bars(f, charts[1], " 蓝球出现频率 ", &state.blue_freq, Color::Blue);
    draw_bars(f, charts[2], " 红球遗漏 ", &state.red_omission, Color::Magenta);
}

fn draw_bars(f: &mut Frame, area: Rect, title: &str, values: &[(u8, u32)], color: Color) {
    let labels: Vec<String> = values.iter().map(|(n, _)| format!("{:02}", n)).collect();
    let data: Vec<(&str, u64)> = labels
        .iter()
        .zip(values)
        .map(|(label, (_, v))| (label.as_str(), *v as u64))
        .collect();
    let inner = area.width.saturating_sub(2) as usize;
    let bar_width = if values.is_empty() {
        2
    } else {
        ((inner / values.len()).saturating_sub(1)).clamp(1, 3) as u16
    };
    let chart = BarChart::default()
        .block(Block::default().title(title.to_string()).borders(Borders::ALL))
        .bar_width(bar_width)
        .bar_gap(1)
        .bar_style(Style::default().fg(color))
        .value_style(Style::default().fg(Color::Black).bg(color))
        .data(data.as_slice());
    f.render_widget(chart, area);
}

fn draw_prediction(f: &mut Frame, state: &AppState, view: &ViewState, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(5)])
        .split(area);

    let params = Line::from(vec![
        Span::raw(" 注数: "),
        Span::styled(format!("{}", view.predict_count), Style::default().fg(Color::Yellow)),
        Span::raw(format!(" (1-{})  目标期号: ", view.max_count)),
        Span::styled(state.next_issue.clone(), Style::default().fg(Color::Cyan)),
        Span::styled("  每日推荐对同一用户当天保持一致", Style::default().fg(Color::DarkGray)),
    ]);
    f.render_widget(
        Paragraph::new(params).block(Block::default().title(" 智能预测 ").borders(Borders::ALL)),
        chunks[0],
    );

    if state.predictions.is_empty() {
        empty_notice(f, chunks[1], "推荐号码", "按 [Enter] 生成今日推荐");
        return;
    }

    let selected = view.selected_ticket.min(state.predictions.len() - 1);
    let rows: Vec<Row> = state
        .predictions
        .iter()
        .enumerate()
        .map(|(i, t)| {
            let marker = if i == selected { ">" } else { " " };
            let row = Row::new(vec![
                Cell::from(format!("{} {:>2}", marker, i + 1)),
                Cell::from(Line::from(ticket_spans(t))),
            ]);
            if i == selected {
                row.style(Style::default().add_modifier(Modifier::BOLD | Modifier::REVERSED))
            } else {
                row
            }
        })
        .collect();
    let table = Table::new(rows, [Constraint::Length(5), Constraint::Min(20)])
        .header(Row::new(vec!["#", "号码"]).style(Style::default().add_modifier(Modifier::BOLD)))
        .block(Block::default().title(" 推荐号码 ").borders(Borders::ALL));
    f.render_widget(table, chunks[1]);
}

fn draw_backtest(f: &mut Frame, state: &AppState, view: &ViewState, area: Rect) {
    let progress_height = if state.backtest_progress.is_some() { 3 } else { 0 };
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(progress_height),
            Constraint::Length(3),
            Constraint::Min(6),
        ])
        .split(area);

    let params = Line::from(vec![
        Span::raw(" 策略: "),
        Span::styled(view.strategy().label(), Style::default().fg(Color::Yellow)),
        Span::raw(format!("  回测期数: {} ({}-{})", view.test_count, MIN_TEST_COUNT, MAX_TEST_COUNT)),
        Span::raw(format!("  每期注数: {}", view.bets_per_issue)),
    ]);
    f.render_widget(
        Paragraph::new(params).block(Block::default().title(" 策略回测 ").borders(Borders::ALL)),
        chunks[0],
    );

    if let Some(p) = state.backtest_progress {
        let gauge = Gauge::default()
            .block(Block::default().title(" 回测进度 ").borders(Borders::ALL))
            .gauge_style(Style::default().fg(Color::Cyan))
            .ratio(p.clamp(0.0, 1.0))
            .label(format!("{:.0}%", p * 100.0));
        f.render_widget(gauge, chunks[1]);
    }

    let Some(bt) = &state.backtest else {
        empty_notice(f, chunks[3], "回测结果", "按 [Enter] 开始回测");
        return;
    };

    draw_backtest_summary(f, bt, chunks[2]);

    if bt.report.is_empty() {
        empty_notice(f, chunks[3], "回测结果", "历史数据不足，无法回测");
        return;
    }

    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(chunks[3]);
    draw_profit_chart(f, bt, cols[0]);
    draw_backtest_rows(f, bt, view.scroll, cols[1]);
}

fn draw_backtest_summary(f: &mut Frame, bt: &BacktestView, area: Rect) {
    let report = &bt.report;
    let roi = report.roi();
    let roi_color = if roi >= 0.0 { Color::Green } else { Color::Red };
    let line = Line::from(vec![
        Span::raw(format!(" 总投入: ¥{}  总奖金: ¥{}  ", report.total_cost(), report.total_prize())),
        Span::raw("ROI: "),
        Span::styled(format!("{:.2}%", roi), Style::default().fg(roi_color)),
        Span::raw(format!("  中奖率: {:.1}%  期数: {}", report.win_rate(), report.rows.len())),
    ]);
    let block = Block::default()
        .title(format!(" {} ", bt.strategy.label()))
        .borders(Borders::ALL);
    f.render_widget(Paragraph::new(line).block(block), area);
}

fn draw_profit_chart(f: &mut Frame, bt: &BacktestView, area: Rect) {
    let curve = bt.report.cumulative_profit();
    let points: Vec<(f64, f64)> = curve
        .iter()
        .enumerate()
        .map(|(i, v)| ((i + 1) as f64, *v as f64))
        .collect();
    let min = curve.iter().copied().min().unwrap_or(0).min(0) as f64;
    let max = curve.iter().copied().max().unwrap_or(0).max(0) as f64;
    let (lo, hi) = if (max - min).abs() < f64::EPSILON { (min - 1.0, max + 1.0) } else { (min, max) };
    let n = points.len().max(1) as f64;

    let dataset = Dataset::default()
        .name("累计盈亏")
        .marker(symbols::Marker::Braille)
        .graph_type(GraphType::Line)
        .style(Style::default().fg(Color::Cyan))
        .data(&points);

    let chart = Chart::new(vec![dataset])
        .block(Block::default().title(" 累计盈亏 ").borders(Borders::ALL))
        .x_axis(
            Axis::default()
                .title("期")
                .style(Style::default().fg(Color::DarkGray))
                .bounds([1.0, n])
                .labels(vec![Span::raw("1"), Span::raw(format!("{}", n as usize))]),
        )
        .y_axis(
            Axis::default()
                .style(Style::default().fg(Color::DarkGray))
                .bounds([lo, hi])
                .labels(vec![
                    Span::raw(format!("{:.0}", lo)),
                    Span::raw("0"),
                    Span::raw(format!("{:.0}", hi)),
                ]),
        );
    f.render_widget(chart, area);
}

fn draw_backtest_rows(f: &mut Frame, bt: &BacktestView, scroll: usize, area: Rect) {
    let inner_width = area.width.saturating_sub(2) as usize;
    let hits_w = inner_width.saturating_sub(8 + 6 + 7).max(6);
    let skip = scroll.min(bt.report.rows.len().saturating_sub(1));
    let rows: Vec<Row> = bt
        .report
        .rows
        .iter()
        .skip(skip)
        .map(|r| {
            let color = if r.prize > 0 { Color::Green } else { Color::DarkGray };
            Row::new(vec![
                Cell::from(r.issue.clone()),
                Cell::from(format!("¥{}", r.prize)).style(Style::default().fg(color)),
                Cell::from(format!("{:+}", r.net_profit)),
                Cell::from(truncate_with_ellipsis(&r.hits_summary, hits_w).into_owned()),
            ])
        })
        .collect();
    let table = Table::new(
        rows,
        [
            Constraint::Length(8),
            Constraint::Length(6),
            Constraint::Length(7),
            Constraint::Min(6),
        ],
    )
    .header(Row::new(vec!["期号", "奖金", "盈亏", "命中"]).style(Style::default().add_modifier(Modifier::BOLD)))
    .block(Block::default().title(" 逐期明细 ").borders(Borders::ALL));
    f.render_widget(table, area);
}

fn draw_bets(f: &mut Frame, state: &AppState, view: &ViewState, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(5), Constraint::Min(5)])
        .split(area);

    let form = &view.bet_form;
    let field_line = |label: &str, value: &str, field: BetField| {
        let active = form.editing == Some(field);
        let style = if active {
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
        } else {
            Style::default()
        };
        let cursor = if active { "_" } else { "" };
        Line::from(vec![
            Span::styled(format!(" {:<6}", label), style),
            Span::raw(format!("{}{}", value, cursor)),
        ])
    };
    let cfg = state.game.config();
    let title = format!(
        " 手动投注 (第 {} 期, 红球 {} 个, 蓝球 {} 个) ",
        state.next_issue, cfg.red_count, cfg.blue_count
    );
    let form_para = Paragraph::new(vec![
        field_line("红球:", &form.red, BetField::Red),
        field_line("蓝球:", &form.blue, BetField::Blue),
        field_line("备注:", &form.note, BetField::Note),
    ])
    .block(Block::default().title(title).borders(Borders::ALL));
    f.render_widget(form_para, chunks[0]);

    if state.bets.is_empty() {
        empty_notice(f, chunks[1], "投注记录", "暂无投注记录");
        return;
    }

    let skip = view.scroll.min(state.bets.len().saturating_sub(1));
    let rows: Vec<Row> = state
        .bets
        .iter()
        .skip(skip)
        .map(|b| {
            let status_color = if b.win_amount > 0 {
                Color::Green
            } else if b.status == "pending" {
                Color::Yellow
            } else {
                Color::DarkGray
            };
            Row::new(vec![
                Cell::from(b.created_at.clone()),
                Cell::from(b.issue.clone()),
                Cell::from(b.numbers.clone()),
                Cell::from(b.status.clone()).style(Style::default().fg(status_color)),
                Cell::from(b.prize_level.clone()),
                Cell::from(format!("¥{}", b.win_amount)),
                Cell::from(b.note.clone()),
            ])
        })
        .collect();
    let table = Table::new(
        rows,
        [
            Constraint::Length(19),
            Constraint::Length(8),
            Constraint::Length(24),
            Constraint::Length(8),
            Constraint::Length(8),
            Constraint::Length(10),
            Constraint::Min(4),
        ],
    )
    .header(
        Row::new(vec!["时间", "期号", "号码", "状态", "奖级", "奖金", "备注"])
            .style(Style::default().add_modifier(Modifier::BOLD)),
    )
    .block(Block::default().title(format!(" 投注记录 [{}] ", state.bets.len())).borders(Borders::ALL));
    f.render_widget(table, chunks[1]);
}

fn draw_simulator(f: &mut Frame, state: &AppState, area: Rect) {
    let mut lines = vec![Line::from("")];
    match &state.simulated {
        Some(ticket) => {
            lines.push(Line::from(format!("模拟第 {} 期开奖结果", state.next_issue)));
            lines.push(Line::from(""));
            lines.push(Line::from(ticket_spans(ticket)).style(Style::default().add_modifier(Modifier::BOLD)));
        }
        None => lines.push(Line::from(Span::styled(
            "按 [Enter] 进行一次随机开奖",
            Style::default().fg(Color::DarkGray),
        ))),
    }
    let para = Paragraph::new(lines)
        .alignment(Alignment::Center)
        .block(Block::default().title(" 模拟开奖 ").borders(Borders::ALL));
    f.render_widget(para, area);
}

fn draw_status(f: &mut Frame, state: &AppState, area: Rect) {
    let Some(status) = &state.status else {
        return;
    };
    let color = if status.ok { Color::Green } else { Color::Red };
    let width = area.width.saturating_sub(2) as usize;
    let line = Line::from(Span::styled(
        format!(" {}", truncate_with_ellipsis(&status.message, width)),
        Style::default().fg(color),
    ));
    f.render_widget(Paragraph::new(line), area);
}

fn draw_logs(f: &mut Frame, state: &AppState, area: Rect) {
    let max_width = area.width.saturating_sub(2) as usize; // borders
    let visible_lines = area.height.saturating_sub(2) as usize;

    let lines: Vec<Line> = state
        .logs
        .iter()
        .rev()
        .take(visible_lines)
        .map(|l| {
            let color = match l.level.as_str() {
                "ERROR" => Color::Red,
                "WARN" => Color::Yellow,
                "WIN" => Color::Green,
                _ => Color::DarkGray,
            };
            let prefix = format!(" {} [{}] ", l.time, l.level);
            let msg_max = max_width.saturating_sub(prefix.len());
            let msg = truncate_with_ellipsis(&l.message, msg_max);
            Line::from(vec![
                Span::styled(prefix, Style::default().fg(color)),
                Span::raw(msg.into_owned()),
            ])
        })
        .collect();

    let block = Block::default().title(" Engine Log ").borders(Borders::ALL);
    f.render_widget(Paragraph::new(lines).block(block), area);
}

fn footer_hints(view: &ViewState) -> Vec<(&'static str, &'static str)> {
    if view.bet_form.editing.is_some() {
        return vec![("[Tab]", " 下一项  "), ("[Enter]", " 提交  "), ("[Esc]", " 取消  ")];
    }
    let mut hints = vec![("  [q]", " 退出  "), ("[g]", " 切换彩种  "), ("[u]", " 更新数据  "), ("[1-5/Tab]", " 页面  ")];
    match view.view {
        View::Dashboard => hints.push(("[j/k]", " 滚动  ")),
        View::Prediction => hints.extend([
            ("[+/-]", " 注数  "),
            ("[Enter]", " 生成  "),
            ("[j/k]", " 选择  "),
            ("[s]", " 保存选中  "),
            ("[a]", " 全部保存  "),
        ]),
        View::Backtest => hints.extend([
            ("[←/→]", " 策略  "),
            ("[+/-]", " 期数  "),
            ("[[/]]", " 注数  "),
            ("[Enter]", " 开始  "),
        ]),
        View::Bets => hints.extend([("[e]", " 录入  "), ("[c]", " 检查中奖  "), ("[j/k]", " 滚动  ")]),
        View::Simulator => hints.push(("[Enter]", " 开奖  ")),
    }
    hints
}

fn draw_footer(f: &mut Frame, view: &ViewState, area: Rect) {
    let spans: Vec<Span> = footer_hints(view)
        .into_iter()
        .flat_map(|(key, label)| {
            [
                Span::styled(key, Style::default().fg(Color::Yellow)),
                Span::raw(label),
            ]
        })
        .collect();
    f.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn truncate_with_ellipsis(s: &str, max_width: usize) -> Cow<'_, str> {
    let char_count = s.chars().count();
    if char_count <= max_width {
        Cow::Borrowed(s)
    } else if max_width <= 3 {
        Cow::Owned(".".repeat(max_width))
    } else {
        let end = s
            .char_indices()
            .nth(max_width - 3)
            .map(|(i, _)| i)
            .unwrap_or(s.len());
        Cow::Owned(format!("{}...", &s[..end]))
    }
}
