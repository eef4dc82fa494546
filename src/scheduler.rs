//! Daily background job: refresh both games and settle pending bets.

use crate::feed::DataLoader;
use crate::lottery::GameType;
use crate::settlement::{settle_pending, SettleSummary};
use crate::store::Store;
use anyhow::Result;
use chrono::{DateTime, Duration as ChronoDuration, FixedOffset, NaiveTime, TimeZone, Utc};

/// Next instant strictly after `now` at wall-clock `at` in `offset`.
pub fn next_run_after(now: DateTime<Utc>, at: NaiveTime, offset: FixedOffset) -> DateTime<Utc> {
    let local = now.with_timezone(&offset);
    let today = local.date_naive().and_time(at);
    let candidate = if today > local.naive_local() {
        today
    } else {
        today + ChronoDuration::days(1)
    };
    // Fixed offsets have no gaps, so the local time maps to exactly one instant.
    Utc.from_utc_datetime(&(candidate - offset))
}

/// One pass over both games. Per-game failures are logged and skipped.
pub async fn run_task(loader: &mut DataLoader, store: &Store) -> Vec<(GameType, SettleSummary)> {
    tracing::info!("scheduled task started");
    let mut results = Vec::new();

    for game in GameType::ALL {
        let loaded = loader.load(game, true).await;
        if loaded.draws.is_empty() {
            tracing::warn!(game = %game, "no draw data available, skipping settlement");
            continue;
        }
        tracing::info!(game = %game, draws = loaded.draws.len(), origin = ?loaded.origin, "history refreshed");

        match settle_pending(store, game, &loaded.draws, None) {
            Ok(summary) => results.push((game, summary)),
            Err(e) => tracing::error!(game = %game, error = %e, "settlement failed"),
        }
    }

    tracing::info!("scheduled task finished");
    results
}

/// Sleep until each daily firing time and run the task, forever.
pub async fn run_forever(
    loader: &mut DataLoader,
    store: &Store,
    at: NaiveTime,
    offset: FixedOffset,
) -> Result<()> {
    tracing::info!(run_at = %at, offset = %offset, "scheduler started");
    loop {
        let now = Utc::now();
        let next = next_run_after(now, at, offset);
        let wait = (next - now).to_std().unwrap_or_default();
        tracing::info!(next_run = %next.with_timezone(&offset), "waiting for next run");
        tokio::time::sleep(wait).await;
        run_task(loader, store).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cst() -> FixedOffset {
        FixedOffset::east_opt(8 * 3600).unwrap()
    }

    fn at() -> NaiveTime {
        NaiveTime::from_hms_opt(21, 20, 0).unwrap()
    }

    #[test]
    fn test_next_run_same_day() {
        // 10:00 local (UTC+8) -> 21:20 local the same day = 13:20 UTC
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 2, 0, 0).unwrap();
        let next = next_run_after(now, at(), cst());
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 5, 1, 13, 20, 0).unwrap());
    }

    #[test]
    fn test_next_run_rolls_to_tomorrow() {
        // 22:00 local -> 21:20 local tomorrow
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 14, 0, 0).unwrap();
        let next = next_run_after(now, at(), cst());
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 5, 2, 13, 20, 0).unwrap());
    }

    #[test]
    fn test_next_run_exactly_at_time_is_tomorrow() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 13, 20, 0).unwrap();
        let next = next_run_after(now, at(), cst());
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 5, 2, 13, 20, 0).unwrap());
    }

    #[test]
    fn test_next_run_across_utc_midnight() {
        // 23:30 UTC on Apr 30 is 07:30 local on May 1
        let now = Utc.with_ymd_and_hms(2024, 4, 30, 23, 30, 0).unwrap();
        let next = next_run_after(now, at(), cst());
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 5, 1, 13, 20, 0).unwrap());
    }
}
