use crate::engine::prize;
use crate::lottery::{Draw, GameType};
use crate::store::Store;
use anyhow::Result;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SettleSummary {
    /// Pending bets whose issue has been drawn.
    pub checked: usize,
    pub updated: usize,
    pub failed: usize,
    pub winners: usize,
}

/// Settle pending bets of `game` (optionally one user's) against drawn
/// issues in `history`. Bets for issues not yet drawn are left pending. A
/// failed row update is logged and counted, not propagated.
pub fn settle_pending(
    store: &Store,
    game: GameType,
    history: &[Draw],
    user: Option<&str>,
) -> Result<SettleSummary> {
    let by_issue: HashMap<&str, &Draw> = history.iter().map(|d| (d.issue.as_str(), d)).collect();
    let mut summary = SettleSummary::default();

    for bet in store.pending_bets(game)? {
        if user.is_some_and(|u| u != bet.user_id) {
            continue;
        }
        let Some(draw) = by_issue.get(bet.issue.as_str()) else {
            continue;
        };
        summary.checked += 1;

        let result = prize::settle(game, &bet.ticket, draw);
        match store.update_bet_status(&bet.id, &result.level, result.amount) {
            Ok(true) => {
                summary.updated += 1;
                if result.is_win() {
                    summary.winners += 1;
                    tracing::info!(
                        bet = %bet.id,
                        user = %bet.user_id,
                        issue = %bet.issue,
                        level = %result.level,
                        amount = result.amount,
                        "bet won"
                    );
                }
            }
            Ok(false) => {
                tracing::warn!(bet = %bet.id, "bet disappeared before settlement");
                summary.failed += 1;
            }
            Err(e) => {
                tracing::error!(bet = %bet.id, error = %e, "failed to settle bet");
                summary.failed += 1;
            }
        }
    }

    tracing::info!(
        game = %game,
        checked = summary.checked,
        updated = summary.updated,
        failed = summary.failed,
        "settlement finished"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::prize::NO_PRIZE;
    use crate::lottery::Ticket;

    fn draw(issue: &str) -> Draw {
        Draw {
            issue: issue.to_string(),
            date: None,
            reds: vec![1, 2, 3, 4, 5, 6],
            blues: vec![7],
        }
    }

    #[test]
    fn test_settles_only_drawn_issues() {
        let store = Store::open_in_memory().unwrap();
        store.add_bet("alice", GameType::Ssq, "24001", &Ticket::new(vec![1, 2, 3, 4, 5, 6], vec![7]), "").unwrap();
        store.add_bet("alice", GameType::Ssq, "24001", &Ticket::new(vec![10, 11, 12, 13, 14, 15], vec![1]), "").unwrap();
        store.add_bet("alice", GameType::Ssq, "24002", &Ticket::new(vec![1, 2, 3, 4, 5, 6], vec![7]), "").unwrap();

        let summary = settle_pending(&store, GameType::Ssq, &[draw("24001")], None).unwrap();
        assert_eq!(summary, SettleSummary { checked: 2, updated: 2, failed: 0, winners: 1 });

        let bets = store.get_bets(Some("alice"), Some(GameType::Ssq)).unwrap();
        let jackpot = bets.iter().find(|b| b.win_amount == 10_000_000).unwrap();
        assert_eq!(jackpot.prize_level.as_deref(), Some("一等奖"));
        assert!(bets.iter().any(|b| b.prize_level.as_deref() == Some(NO_PRIZE)));
        assert_eq!(store.pending_bets(GameType::Ssq).unwrap().len(), 1);

        let again = settle_pending(&store, GameType::Ssq, &[draw("24001")], None).unwrap();
        assert_eq!(again.checked, 0);
    }

    #[test]
    fn test_user_filter() {
        let store = Store::open_in_memory().unwrap();
        let t = Ticket::new(vec![1, 2, 3, 4, 5, 6], vec![7]);
        store.add_bet("alice", GameType::Ssq, "24001", &t, "").unwrap();
        store.add_bet("bob", GameType::Ssq, "24001", &t, "").unwrap();

        let summary = settle_pending(&store, GameType::Ssq, &[draw("24001")], Some("bob")).unwrap();
        assert_eq!(summary.updated, 1);
        let pending = store.pending_bets(GameType::Ssq).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].user_id, "alice");
    }
}
