use super::predictor::Strategy;
use super::prize::{self, BET_COST};
use crate::lottery::{Draw, GameType};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;

/// Extra draws required beyond the test window before a backtest runs.
pub const MIN_TRAINING_DRAWS: usize = 10;

/// One replayed issue.
#[derive(Debug, Clone, Serialize)]
pub struct BacktestRow {
    pub issue: String,
    pub bets_count: usize,
    pub cost: u64,
    pub prize: u64,
    pub net_profit: i64,
    pub hits_summary: String,
    pub actual: Draw,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BacktestReport {
    pub rows: Vec<BacktestRow>,
}

impl BacktestReport {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn total_cost(&self) -> u64 {
        self.rows.iter().map(|r| r.cost).sum()
    }

    pub fn total_prize(&self) -> u64 {
        self.rows.iter().map(|r| r.prize).sum()
    }

    /// Return on investment in percent; 0 when nothing was spent.
    pub fn roi(&self) -> f64 {
        let cost = self.total_cost();
        if cost == 0 {
            return 0.0;
        }
        (self.total_prize() as f64 - cost as f64) / cost as f64 * 100.0
    }

    /// Percentage of issues where at least one bet won something.
    pub fn win_rate(&self) -> f64 {
        if self.rows.is_empty() {
            return 0.0;
        }
        let wins = self.rows.iter().filter(|r| r.prize > 0).count();
        wins as f64 / self.rows.len() as f64 * 100.0
    }

    /// Running total of net profit after each issue.
    pub fn cumulative_profit(&self) -> Vec<i64> {
        self.rows
            .iter()
            .scan(0i64, |acc, r| {
                *acc += r.net_profit;
                Some(*acc)
            })
            .collect()
    }
}

/// Seed for bet `k` of an issue: issue number + k, or a stable hash for
/// non-numeric issues.
fn issue_seed(issue: &str, k: usize) -> u64 {
    let base = issue.parse::<u64>().unwrap_or_else(|_| {
        issue
            .bytes()
            .fold(0xcbf2_9ce4_8422_2325u64, |h, b| (h ^ b as u64).wrapping_mul(0x0100_0000_01b3))
    });
    base.wrapping_add(k as u64)
}

fn hits_summary(hits: &[String], bets_per_issue: usize) -> String {
    let mut s = hits.iter().take(5).cloned().collect::<Vec<_>>().join(", ");
    if bets_per_issue > 5 {
        s.push_str("...");
    }
    s
}

/// Replay `strategy` over the last `test_count` issues of `history`.
///
/// Each issue is predicted from the draws strictly before it and scored
/// against the prize table. Returns an empty report when there are fewer
/// than `test_count + MIN_TRAINING_DRAWS` draws. `progress` receives the
/// completed fraction before each issue.
pub fn run_backtest<F>(
    game: GameType,
    strategy: Strategy,
    history: &[Draw],
    test_count: usize,
    bets_per_issue: usize,
    mut progress: F,
) -> BacktestReport
where
    F: FnMut(f64),
{
    if history.len() < test_count + MIN_TRAINING_DRAWS {
        tracing::info!(
            available = history.len(),
            needed = test_count + MIN_TRAINING_DRAWS,
            "not enough history for backtest"
        );
        return BacktestReport::default();
    }

    let start = history.len() - test_count;
    let mut rows = Vec::with_capacity(test_count);

    for (step, i) in (start..history.len()).enumerate() {
        progress(step as f64 / test_count as f64);

        let training = &history[..i];
        let actual = &history[i];

        let mut issue_prize = 0u64;
        let mut hits = Vec::with_capacity(bets_per_issue);

        for k in 0..bets_per_issue {
            let mut rng = StdRng::seed_from_u64(issue_seed(&actual.issue, k));
            let ticket = match strategy.predict(game, training, &mut rng) {
                Ok(t) => t,
                Err(e) => {
                    tracing::warn!(issue = %actual.issue, bet = k, error = %e, "prediction failed");
                    continue;
                }
            };
            let (red, blue) = prize::count_hits(&ticket, actual);
            issue_prize += prize::calculate(game, red, blue).amount;
            hits.push(format!("{}+{}", red, blue));
        }

        let cost = BET_COST * bets_per_issue as u64;
        rows.push(BacktestRow {
            issue: actual.issue.clone(),
            bets_count: bets_per_issue,
            cost,
            prize: issue_prize,
            net_profit: issue_prize as i64 - cost as i64,
            hits_summary: hits_summary(&hits, bets_per_issue),
            actual: actual.clone(),
        });
    }

    BacktestReport { rows }
}
