//! Per-user daily recommendations that stay stable for the whole day.

use crate::engine::predict_many;
use crate::lottery::{Draw, GameType, Ticket};
use crate::store::Store;
use anyhow::Result;
use chrono::NaiveDate;
use ring::digest;

/// Last four bytes of SHA-256("{YYYYMMDD}_{user}") read big-endian, i.e. the
/// digest taken mod 2^32.
pub fn daily_seed(user: &str, date: NaiveDate) -> u64 {
    let input = format!("{}_{}", date.format("%Y%m%d"), user);
    let hash = digest::digest(&digest::SHA256, input.as_bytes());
    let bytes = hash.as_ref();
    let tail = &bytes[bytes.len() - 4..];
    u32::from_be_bytes([tail[0], tail[1], tail[2], tail[3]]) as u64
}

/// Return `count` tickets for (user, date, game), generating and persisting
/// only what is not already stored.
pub fn recommend(
    store: &Store,
    user: &str,
    date: NaiveDate,
    game: GameType,
    history: &[Draw],
    count: usize,
) -> Result<Vec<Ticket>> {
    let date_str = date.format("%Y-%m-%d").to_string();
    let seed = daily_seed(user, date);

    let mut tickets = store
        .get_daily_recommendation(user, &date_str, game)?
        .unwrap_or_default();

    if tickets.len() >= count {
        tickets.truncate(count);
        return Ok(tickets);
    }

    let missing = count - tickets.len();
    let extra = predict_many(game, history, missing, Some(seed + tickets.len() as u64))?;
    tracing::info!(
        user = %user,
        game = %game,
        stored = tickets.len(),
        generated = extra.len(),
        "daily recommendation extended"
    );
    tickets.extend(extra);
    store.save_daily_recommendation(user, &date_str, game, &tickets)?;
    Ok(tickets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::simulate_draw;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn history() -> Vec<Draw> {
        let mut rng = StdRng::seed_from_u64(99);
        (0..80)
            .map(|i| {
                let t = simulate_draw(GameType::Ssq, &mut rng);
                Draw { issue: (24001 + i).to_string(), date: None, reds: t.reds, blues: t.blues }
            })
            .collect()
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()
    }

    #[test]
    fn test_daily_seed_matches_digest_tail() {
        let hash = digest::digest(&digest::SHA256, b"20240501_alice");
        let b = hash.as_ref();
        let expected = ((b[28] as u64) << 24) | ((b[29] as u64) << 16) | ((b[30] as u64) << 8) | b[31] as u64;
        assert_eq!(daily_seed("alice", day()), expected);
        assert_ne!(daily_seed("alice", day()), daily_seed("bob", day()));
    }

    #[test]
    fn test_same_day_is_stable() {
        let store = Store::open_in_memory().unwrap();
        let h = history();
        let first = recommend(&store, "alice", day(), GameType::Ssq, &h, 5).unwrap();
        let again = recommend(&store, "alice", day(), GameType::Ssq, &h, 5).unwrap();
        assert_eq!(first, again);
        assert_eq!(first, predict_many(GameType::Ssq, &h, 5, Some(daily_seed("alice", day()))).unwrap());
    }

    #[test]
    fn test_smaller_count_returns_prefix() {
        let store = Store::open_in_memory().unwrap();
        let h = history();
        let five = recommend(&store, "alice", day(), GameType::Ssq, &h, 5).unwrap();
        let two = recommend(&store, "alice", day(), GameType::Ssq, &h, 2).unwrap();
        assert_eq!(two, five[..2].to_vec());
        let stored = store.get_daily_recommendation("alice", "2024-05-01", GameType::Ssq).unwrap().unwrap();
        assert_eq!(stored.len(), 5, "stored set is not shrunk");
    }

    #[test]
    fn test_larger_count_extends_existing() {
        let store = Store::open_in_memory().unwrap();
        let h = history();
        let three = recommend(&store, "alice", day(), GameType::Ssq, &h, 3).unwrap();
        let six = recommend(&store, "alice", day(), GameType::Ssq, &h, 6).unwrap();
        assert_eq!(six.len(), 6);
        assert_eq!(&six[..3], &three[..]);
        assert_eq!(six, predict_many(GameType::Ssq, &h, 6, Some(daily_seed("alice", day()))).unwrap());
    }

    #[test]
    fn test_empty_history_is_error() {
        let store = Store::open_in_memory().unwrap();
        assert!(recommend(&store, "alice", day(), GameType::Ssq, &[], 3).is_err());
        assert!(store.get_daily_recommendation("alice", "2024-05-01", GameType::Ssq).unwrap().is_none());
    }
}
