use crate::lottery::Draw;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Colour {
    Red,
    Blue,
}

impl Colour {
    pub fn numbers_from<'a>(&self, draw: &'a Draw) -> &'a [u8] {
        match self {
            Colour::Red => &draw.reds,
            Colour::Blue => &draw.blues,
        }
    }
}

/// Occurrence count per number across `draws`.
pub fn frequency(draws: &[Draw], colour: Colour) -> HashMap<u8, u32> {
    let mut counts = HashMap::new();
    for draw in draws {
        for &n in colour.numbers_from(draw) {
            *counts.entry(n).or_insert(0) += 1;
        }
    }
    counts
}

/// Frequency for every number in `1..=max`, zero-filled, ascending.
pub fn frequency_table(draws: &[Draw], max: u8, colour: Colour) -> Vec<(u8, u32)> {
    let counts = frequency(draws, colour);
    (1..=max).map(|n| (n, counts.get(&n).copied().unwrap_or(0))).collect()
}

/// Current omission: how many of the most recent draws each number has been
/// absent from. A number that never appeared gets the full history length.
pub fn omission(draws: &[Draw], max: u8, colour: Colour) -> HashMap<u8, u32> {
    let mut result = HashMap::with_capacity(max as usize);
    for n in 1..=max {
        let gap = draws
            .iter()
            .rev()
            .take_while(|d| !colour.numbers_from(d).contains(&n))
            .count();
        result.insert(n, gap as u32);
    }
    result
}

pub fn omission_table(draws: &[Draw], max: u8, colour: Colour) -> Vec<(u8, u32)> {
    let gaps = omission(draws, max, colour);
    (1..=max).map(|n| (n, gaps[&n])).collect()
}

/// Number of adjacent pairs (n, n+1) after sorting.
pub fn consecutive_pairs(numbers: &[u8]) -> usize {
    let mut sorted = numbers.to_vec();
    sorted.sort_unstable();
    sorted.windows(2).filter(|w| w[1] == w[0] + 1).count()
}

/// Red counts in zones 1-11, 12-22 and 23+.
pub fn zone_counts(reds: &[u8]) -> [usize; 3] {
    let mut zones = [0usize; 3];
    for &r in reds {
        let idx = match r {
            0..=11 => 0,
            12..=22 => 1,
            _ => 2,
        };
        zones[idx] += 1;
    }
    zones
}

pub fn sum(numbers: &[u8]) -> u32 {
    numbers.iter().map(|&n| n as u32).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draw(issue: &str, reds: &[u8], blues: &[u8]) -> Draw {
        Draw {
            issue: issue.to_string(),
            date: None,
            reds: reds.to_vec(),
            blues: blues.to_vec(),
        }
    }

    fn history() -> Vec<Draw> {
        vec![
            draw("1", &[1, 2, 3], &[1]),
            draw("2", &[2, 4, 6], &[2]),
            draw("3", &[3, 4, 5], &[1]),
        ]
    }

    #[test]
    fn test_frequency() {
        let f = frequency(&history(), Colour::Red);
        assert_eq!(f[&3], 2);
        assert_eq!(f[&4], 2);
        assert_eq!(f[&6], 1);
        assert!(!f.contains_key(&7));
        assert_eq!(frequency(&history(), Colour::Blue)[&1], 2);
    }

    #[test]
    fn test_frequency_table_zero_fills() {
        let t = frequency_table(&history(), 8, Colour::Red);
        assert_eq!(t.len(), 8);
        assert_eq!(t[6], (7, 0));
    }

    #[test]
    fn test_omission() {
        let o = omission(&history(), 7, Colour::Red);
        assert_eq!(o[&3], 0);
        assert_eq!(o[&6], 1);
        assert_eq!(o[&1], 2);
        assert_eq!(o[&7], 3, "never drawn -> full history length");
    }

    #[test]
    fn test_omission_empty_history() {
        let o = omission(&[], 5, Colour::Blue);
        assert!(o.values().all(|&v| v == 0));
    }

    #[test]
    fn test_consecutive_pairs() {
        assert_eq!(consecutive_pairs(&[5, 3, 4, 10, 20, 21]), 3);
        assert_eq!(consecutive_pairs(&[1, 3, 5]), 0);
    }

    #[test]
    fn test_zone_counts() {
        assert_eq!(zone_counts(&[1, 11, 12, 22, 23, 33]), [2, 2, 2]);
    }
}
