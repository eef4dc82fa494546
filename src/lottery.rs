use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameType {
    Ssq,
    Dlt,
}

/// Static per-game parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LotteryConfig {
    pub code: &'static str,
    pub cn_name: &'static str,
    pub red_range: (u8, u8),
    pub red_count: usize,
    pub blue_range: (u8, u8),
    pub blue_count: usize,
}

const SSQ: LotteryConfig = LotteryConfig {
    code: "ssq",
    cn_name: "双色球",
    red_range: (1, 33),
    red_count: 6,
    blue_range: (1, 16),
    blue_count: 1,
};

const DLT: LotteryConfig = LotteryConfig {
    code: "dlt",
    cn_name: "大乐透",
    red_range: (1, 35),
    red_count: 5,
    blue_range: (1, 12),
    blue_count: 2,
};

impl GameType {
    pub const ALL: [GameType; 2] = [GameType::Ssq, GameType::Dlt];

    pub fn config(&self) -> &'static LotteryConfig {
        match self {
            GameType::Ssq => &SSQ,
            GameType::Dlt => &DLT,
        }
    }

    pub fn code(&self) -> &'static str {
        self.config().code
    }

    /// The other game, used by the dashboard's game toggle.
    pub fn toggled(&self) -> GameType {
        match self {
            GameType::Ssq => GameType::Dlt,
            GameType::Dlt => GameType::Ssq,
        }
    }
}

impl fmt::Display for GameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl FromStr for GameType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ssq" => Ok(GameType::Ssq),
            "dlt" => Ok(GameType::Dlt),
            other => bail!("unsupported game type: {}", other),
        }
    }
}

impl LotteryConfig {
    pub fn red_population(&self) -> Vec<u8> {
        (self.red_range.0..=self.red_range.1).collect()
    }

    pub fn blue_population(&self) -> Vec<u8> {
        (self.blue_range.0..=self.blue_range.1).collect()
    }
}

/// One historical draw. `issue` is the draw number as published (digits only).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Draw {
    pub issue: String,
    #[serde(default)]
    pub date: Option<String>,
    pub reds: Vec<u8>,
    pub blues: Vec<u8>,
}

/// A set of numbers chosen by a user or a generator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    pub reds: Vec<u8>,
    pub blues: Vec<u8>,
}

impl Ticket {
    pub fn new(mut reds: Vec<u8>, mut blues: Vec<u8>) -> Self {
        reds.sort_unstable();
        blues.sort_unstable();
        Self { reds, blues }
    }

    /// Every rule the ticket breaks for `game`. Empty means valid.
    pub fn validate(&self, game: GameType) -> Vec<String> {
        let cfg = game.config();
        let mut errors = Vec::new();

        if self.reds.len() != cfg.red_count {
            errors.push(format!(
                "红球数量错误: 需要 {} 个，实际 {} 个",
                cfg.red_count,
                self.reds.len()
            ));
        }
        if self.blues.len() != cfg.blue_count {
            errors.push(format!(
                "蓝球数量错误: 需要 {} 个，实际 {} 个",
                cfg.blue_count,
                self.blues.len()
            ));
        }
        if self.reds.iter().any(|&r| r < cfg.red_range.0 || r > cfg.red_range.1) {
            errors.push(format!("红球超出范围 {}-{}", cfg.red_range.0, cfg.red_range.1));
        }
        if self.blues.iter().any(|&b| b < cfg.blue_range.0 || b > cfg.blue_range.1) {
            errors.push(format!("蓝球超出范围 {}-{}", cfg.blue_range.0, cfg.blue_range.1));
        }
        if has_duplicates(&self.reds) {
            errors.push("红球包含重复号码".to_string());
        }
        if has_duplicates(&self.blues) {
            errors.push("蓝球包含重复号码".to_string());
        }
        errors
    }

    pub fn format(&self) -> String {
        format!("{} + {}", join_numbers(&self.reds), join_numbers(&self.blues))
    }
}

fn has_duplicates(numbers: &[u8]) -> bool {
    let unique: HashSet<u8> = numbers.iter().copied().collect();
    unique.len() != numbers.len()
}

pub fn join_numbers(numbers: &[u8]) -> String {
    numbers
        .iter()
        .map(|n| format!("{:02}", n))
        .collect::<Vec<_>>()
        .join(",")
}

/// Parse manually entered numbers, e.g. "01,05,12" (full-width commas allowed).
pub fn parse_numbers(input: &str) -> Result<Vec<u8>> {
    input
        .replace('，', ",")
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<u8>()
                .map_err(|_| anyhow::anyhow!("输入格式错误，请输入数字并用逗号分隔: '{}'", s))
        })
        .collect()
}

/// Parse and validate a manual bet. All validation messages are joined into the error.
pub fn parse_ticket(game: GameType, red_input: &str, blue_input: &str) -> Result<Ticket> {
    let ticket = Ticket::new(parse_numbers(red_input)?, parse_numbers(blue_input)?);
    let errors = ticket.validate(game);
    if !errors.is_empty() {
        bail!("{}", errors.join("; "));
    }
    Ok(ticket)
}

/// Issue number following the latest draw, or "Unknown".
pub fn next_issue(history: &[Draw]) -> String {
    history
        .last()
        .and_then(|d| d.issue.parse::<u64>().ok())
        .map(|n| (n + 1).to_string())
        .unwrap_or_else(|| "Unknown".to_string())
}
