use crate::lottery::{Draw, GameType, Ticket};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Payout tier for a ticket. Jackpot tiers are floating in reality; the
/// amounts here are fixed estimates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrizeResult {
    pub level: String,
    pub amount: u64,
    pub description: String,
}

impl PrizeResult {
    fn new(level: &str, amount: u64, description: &str) -> Self {
        Self {
            level: level.to_string(),
            amount,
            description: description.to_string(),
        }
    }

    pub fn is_win(&self) -> bool {
        self.amount > 0
    }
}

pub const NO_PRIZE: &str = "未中奖";

/// Cost of a single bet in yuan.
pub const BET_COST: u64 = 2;

pub fn calculate(game: GameType, red_hits: usize, blue_hits: usize) -> PrizeResult {
    match game {
        GameType::Ssq => calc_ssq(red_hits, blue_hits),
        GameType::Dlt => calc_dlt(red_hits, blue_hits),
    }
}

fn calc_ssq(red: usize, blue: usize) -> PrizeResult {
    match (red, blue) {
        (6, 1) => PrizeResult::new("一等奖", 10_000_000, "6+1 (浮动)"),
        (6, 0) => PrizeResult::new("二等奖", 300_000, "6+0 (浮动)"),
        (5, 1) => PrizeResult::new("三等奖", 3_000, "5+1"),
        (5, 0) | (4, 1) => PrizeResult::new("四等奖", 200, "5+0 或 4+1"),
        (4, 0) | (3, 1) => PrizeResult::new("五等奖", 10, "4+0 或 3+1"),
        (_, 1) => PrizeResult::new("六等奖", 5, "0+1, 1+1, 2+1"),
        _ => PrizeResult::new(NO_PRIZE, 0, "未达标"),
    }
}

fn calc_dlt(red: usize, blue: usize) -> PrizeResult {
    match (red, blue) {
        (5, 2) => PrizeResult::new("一等奖", 10_000_000, "5+2 (浮动)"),
        (5, 1) => PrizeResult::new("二等奖", 200_000, "5+1 (浮动)"),
        (5, 0) => PrizeResult::new("三等奖", 10_000, "5+0"),
        (4, 2) => PrizeResult::new("四等奖", 3_000, "4+2"),
        (4, 1) => PrizeResult::new("五等奖", 300, "4+1"),
        (3, 2) => PrizeResult::new("六等奖", 200, "3+2"),
        (4, 0) => PrizeResult::new("七等奖", 100, "4+0"),
        (3, 1) | (2, 2) => PrizeResult::new("八等奖", 15, "3+1 或 2+2"),
        (3, 0) | (2, 1) | (1, 2) | (0, 2) => {
            PrizeResult::new("九等奖", 5, "3+0, 2+1, 1+2, 0+2")
        }
        _ => PrizeResult::new(NO_PRIZE, 0, "未达标"),
    }
}

/// (red hits, blue hits) of a ticket against a draw.
pub fn count_hits(ticket: &Ticket, draw: &Draw) -> (usize, usize) {
    (intersection(&ticket.reds, &draw.reds), intersection(&ticket.blues, &draw.blues))
}

fn intersection(a: &[u8], b: &[u8]) -> usize {
    let a: HashSet<u8> = a.iter().copied().collect();
    let b: HashSet<u8> = b.iter().copied().collect();
    a.intersection(&b).count()
}

/// Score a ticket against a draw in one step.
pub fn settle(game: GameType, ticket: &Ticket, draw: &Draw) -> PrizeResult {
    let (red, blue) = count_hits(ticket, draw);
    calculate(game, red, blue)
}
