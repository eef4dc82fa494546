pub mod cache;
pub mod five_hundred;

use crate::lottery::{Draw, GameType};
use anyhow::Result;
use async_trait::async_trait;

pub use cache::{DataLoader, DataOrigin, LoadedHistory};
pub use five_hundred::FiveHundredScraper;

/// A provider of historical draws, oldest first.
#[async_trait]
pub trait HistorySource: Send + Sync {
    async fn fetch_history(&mut self, game: GameType) -> Result<Vec<Draw>>;
}
