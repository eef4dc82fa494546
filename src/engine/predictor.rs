use super::sampler::weighted_sample_without_replacement;
use super::stats::{consecutive_pairs, frequency, omission, sum, zone_counts, Colour};
use crate::lottery::{Draw, GameType, Ticket};
use anyhow::{bail, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Window used by the frequency-based generators.
pub const FREQUENCY_WINDOW: usize = 100;

const MAX_FILTER_ATTEMPTS: usize = 2000;
const KILL_COLD_REDS: usize = 3;
const COLD_OMISSION: u32 = 20;
const COLD_BOOST: f64 = 1.5;
const REPEAT_BOOST: f64 = 2.5;
const BLUE_BOOST: f64 = 3.0;

/// Number-suggestion strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Strategy {
    /// Hot-number weighting, repeat boost, cold kill and shape filters.
    Composite,
    Random,
    Frequency,
    Omission,
}

impl Strategy {
    pub const ALL: [Strategy; 4] = [
        Strategy::Composite,
        Strategy::Random,
        Strategy::Frequency,
        Strategy::Omission,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Strategy::Composite => "增强型智能趋势算法",
            Strategy::Random => "随机选号",
            Strategy::Frequency => "热号加权",
            Strategy::Omission => "遗漏回补",
        }
    }

    pub fn predict(&self, game: GameType, history: &[Draw], rng: &mut StdRng) -> Result<Ticket> {
        match self {
            Strategy::Composite => composite_predict(game, history, rng),
            Strategy::Random => Ok(simulate_draw(game, rng)),
            Strategy::Frequency => Ok(frequency_predict(game, history, FREQUENCY_WINDOW, rng)),
            Strategy::Omission => Ok(omission_predict(game, history, rng)),
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A uniformly random draw, used by the simulator and the random strategy.
pub fn simulate_draw<R: Rng + ?Sized>(game: GameType, rng: &mut R) -> Ticket {
    let cfg = game.config();
    let pick = |lo: u8, hi: u8, k: usize, rng: &mut R| -> Vec<u8> {
        rand::seq::index::sample(rng, (hi - lo + 1) as usize, k)
            .into_iter()
            .map(|i| lo + i as u8)
            .collect()
    };
    let reds = pick(cfg.red_range.0, cfg.red_range.1, cfg.red_count, rng);
    let blues = pick(cfg.blue_range.0, cfg.blue_range.1, cfg.blue_count, rng);
    Ticket::new(reds, blues)
}

fn recent(history: &[Draw], window: usize) -> &[Draw] {
    &history[history.len().saturating_sub(window)..]
}

fn count_weights(pop: &[u8], counts: &HashMap<u8, u32>, missing: f64) -> Vec<f64> {
    pop.iter()
        .map(|n| counts.get(n).map(|&c| c as f64).unwrap_or(missing))
        .collect()
}

/// Weight by appearances in the last `window` draws; unseen numbers get 0.1.
pub fn frequency_predict<R: Rng + ?Sized>(
    game: GameType,
    history: &[Draw],
    window: usize,
    rng: &mut R,
) -> Ticket {
    let cfg = game.config();
    let recent = recent(history, window);

    let red_pop = cfg.red_population();
    let red_weights = count_weights(&red_pop, &frequency(recent, Colour::Red), 0.1);
    let blue_pop = cfg.blue_population();
    let blue_weights = count_weights(&blue_pop, &frequency(recent, Colour::Blue), 0.1);

    Ticket::new(
        weighted_sample_without_replacement(&red_pop, &red_weights, cfg.red_count, rng),
        weighted_sample_without_replacement(&blue_pop, &blue_weights, cfg.blue_count, rng),
    )
}

/// Favour cold numbers: weight = (omission + 1)^2.
pub fn omission_predict<R: Rng + ?Sized>(game: GameType, history: &[Draw], rng: &mut R) -> Ticket {
    let cfg = game.config();
    let weights_for = |pop: &[u8], max: u8, colour: Colour| -> Vec<f64> {
        let gaps = omission(history, max, colour);
        pop.iter()
            .map(|n| {
                let o = gaps.get(n).copied().unwrap_or(0) as f64;
                (o + 1.0).powi(2)
            })
            .collect()
    };

    let red_pop = cfg.red_population();
    let red_weights = weights_for(&red_pop, cfg.red_range.1, Colour::Red);
    let blue_pop = cfg.blue_population();
    let blue_weights = weights_for(&blue_pop, cfg.blue_range.1, Colour::Blue);

    Ticket::new(
        weighted_sample_without_replacement(&red_pop, &red_weights, cfg.red_count, rng),
        weighted_sample_without_replacement(&blue_pop, &blue_weights, cfg.blue_count, rng),
    )
}

/// Accepted red sum range for the composite filter.
pub fn target_sum_range(game: GameType) -> (u32, u32) {
    match game {
        GameType::Ssq => (80, 130),
        GameType::Dlt => (60, 120),
    }
}

/// The `KILL_COLD_REDS` reds with the largest omission, ties to the lower number.
fn coldest_reds(gaps: &HashMap<u8, u32>, max: u8) -> Vec<u8> {
    let mut ranked: Vec<(u8, u32)> = (1..=max).map(|n| (n, gaps[&n])).collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    ranked.into_iter().take(KILL_COLD_REDS).map(|(n, _)| n).collect()
}

/// Why a red combination fails the composite shape filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShapeReject {
    SumOutOfRange,
    CrowdedZone,
    EmptyZones,
    NoConsecutive,
}

/// Zone balance: at most 4 reds per zone and at most one empty zone.
pub fn zone_reject(reds: &[u8]) -> Option<ShapeReject> {
    let zones = zone_counts(reds);
    if zones.iter().any(|&z| z > 4) {
        return Some(ShapeReject::CrowdedZone);
    }
    if zones.iter().filter(|&&z| z == 0).count() >= 2 {
        return Some(ShapeReject::EmptyZones);
    }
    None
}

/// First shape rule `reds` breaks, or None if it passes them all.
pub fn shape_reject(game: GameType, reds: &[u8]) -> Option<ShapeReject> {
    let (lo, hi) = target_sum_range(game);
    let s = sum(reds);
    if s < lo || s > hi {
        return Some(ShapeReject::SumOutOfRange);
    }
    if let Some(reject) = zone_reject(reds) {
        return Some(reject);
    }
    if consecutive_pairs(reds) == 0 {
        return Some(ShapeReject::NoConsecutive);
    }
    None
}

/// Combinations without a consecutive pair are dropped with this
/// probability; the rest are kept for variety.
const NO_CONSECUTIVE_DROP: f64 = 0.6;

fn passes_shape_filters<R: Rng + ?Sized>(game: GameType, reds: &[u8], rng: &mut R) -> bool {
    match shape_reject(game, reds) {
        None => true,
        Some(ShapeReject::NoConsecutive) => rng.gen::<f64>() >= NO_CONSECUTIVE_DROP,
        Some(_) => false,
    }
}

/// Sampling pools and weights for the composite generator.
#[derive(Debug, Clone, PartialEq)]
pub struct CompositeWeights {
    pub red_pop: Vec<u8>,
    pub red_weights: Vec<f64>,
    pub blue_pop: Vec<u8>,
    pub blue_weights: Vec<f64>,
}

impl CompositeWeights {
    /// Base weight is the count over the last `FREQUENCY_WINDOW` draws plus
    /// one (unseen numbers count 0.5). Reds absent for more than
    /// `COLD_OMISSION` draws get x1.5, reds of the latest draw x2.5, and
    /// every blue x3.0. The `KILL_COLD_REDS` coldest reds are left out.
    pub fn build(game: GameType, history: &[Draw]) -> Result<Self> {
        let Some(last) = history.last() else {
            bail!("composite strategy needs at least one historical draw");
        };
        let cfg = game.config();
        let recent = recent(history, FREQUENCY_WINDOW);

        let red_counts = frequency(recent, Colour::Red);
        let blue_counts = frequency(recent, Colour::Blue);
        let red_gaps = omission(history, cfg.red_range.1, Colour::Red);

        let killed = coldest_reds(&red_gaps, cfg.red_range.1);
        let red_pop: Vec<u8> = cfg
            .red_population()
            .into_iter()
            .filter(|n| !killed.contains(n))
            .collect();
        let blue_pop = cfg.blue_population();

        let base = |counts: &HashMap<u8, u32>, n: u8| -> f64 {
            counts.get(&n).map(|&c| c as f64).unwrap_or(0.5) + 1.0
        };

        let red_weights = red_pop
            .iter()
            .map(|&n| {
                let mut w = base(&red_counts, n);
                if red_gaps.get(&n).copied().unwrap_or(0) > COLD_OMISSION {
                    w *= COLD_BOOST;
                }
                if last.reds.contains(&n) {
                    w *= REPEAT_BOOST;
                }
                w
            })
            .collect();
        let blue_weights = blue_pop
            .iter()
            .map(|&n| base(&blue_counts, n) * BLUE_BOOST)
            .collect();

        Ok(Self { red_pop, red_weights, blue_pop, blue_weights })
    }

    fn sample<R: Rng + ?Sized>(&self, game: GameType, rng: &mut R) -> Ticket {
        let cfg = game.config();
        Ticket::new(
            weighted_sample_without_replacement(&self.red_pop, &self.red_weights, cfg.red_count, rng),
            weighted_sample_without_replacement(&self.blue_pop, &self.blue_weights, cfg.blue_count, rng),
        )
    }

    /// Sample until `accept` passes the reds. After `MAX_FILTER_ATTEMPTS`
    /// rejections the next sample is returned unfiltered.
    fn sample_until<R, F>(&self, game: GameType, rng: &mut R, mut accept: F) -> Ticket
    where
        R: Rng + ?Sized,
        F: FnMut(&[u8], &mut R) -> bool,
    {
        for _ in 0..MAX_FILTER_ATTEMPTS {
            let ticket = self.sample(game, rng);
            if accept(&ticket.reds, rng) {
                return ticket;
            }
        }
        tracing::debug!(game = %game, "composite filters exhausted, returning unfiltered sample");
        self.sample(game, rng)
    }
}

/// Composite generator: hot/repeat weighting over a cold-killed red pool,
/// filtered by sum, consecutive and zone-balance checks.
pub fn composite_predict(game: GameType, history: &[Draw], rng: &mut StdRng) -> Result<Ticket> {
    let weights = CompositeWeights::build(game, history)?;
    Ok(weights.sample_until(game, rng, |reds, rng| passes_shape_filters(game, reds, rng)))
}

/// `count` composite tickets; ticket `i` is seeded with `seed_base + i`
/// (unseeded when `seed_base` is None).
pub fn predict_many(
    game: GameType,
    history: &[Draw],
    count: usize,
    seed_base: Option<u64>,
) -> Result<Vec<Ticket>> {
    (0..count)
        .map(|i| {
            let mut rng = match seed_base {
                Some(base) => StdRng::seed_from_u64(base.wrapping_add(i as u64)),
                None => StdRng::from_entropy(),
            };
            composite_predict(game, history, &mut rng)
        })
        .collect()
}
