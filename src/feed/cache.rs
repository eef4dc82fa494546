use super::HistorySource;
use crate::lottery::{Draw, GameType};
use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

/// Where a loaded history came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataOrigin {
    Fetched,
    Cache,
    /// Fetch failed; an older cache was used instead.
    CacheFallback,
    Empty,
}

#[derive(Debug, Clone)]
pub struct LoadedHistory {
    pub draws: Vec<Draw>,
    pub origin: DataOrigin,
    pub updated_at: Option<DateTime<Local>>,
}

/// Disk-cached history per game with a staleness check.
pub struct DataLoader {
    dir: PathBuf,
    stale_after: Duration,
    source: Box<dyn HistorySource>,
}

impl DataLoader {
    pub fn new(dir: impl Into<PathBuf>, stale_after: Duration, source: Box<dyn HistorySource>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create data directory {}", dir.display()))?;
        Ok(Self { dir, stale_after, source })
    }

    pub fn data_path(&self, game: GameType) -> PathBuf {
        self.dir.join(format!("{}_history.json", game.code()))
    }

    /// Modification time of the cache file, if any.
    pub fn last_updated(&self, game: GameType) -> Option<DateTime<Local>> {
        std::fs::metadata(self.data_path(game))
            .and_then(|m| m.modified())
            .ok()
            .map(DateTime::<Local>::from)
    }

    fn is_stale(&self, path: &Path) -> bool {
        let Ok(modified) = std::fs::metadata(path).and_then(|m| m.modified()) else {
            return true;
        };
        SystemTime::now()
            .duration_since(modified)
            .map(|age| age > self.stale_after)
            .unwrap_or(false)
    }

    fn read_cache(&self, path: &Path) -> Result<Vec<Draw>> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read cache {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("failed to parse cache {}", path.display()))
    }

    fn write_cache(&self, path: &Path, draws: &[Draw]) -> Result<()> {
        let tmp = path.with_extension("json.tmp");
        let body = serde_json::to_string(draws).context("failed to encode history")?;
        std::fs::write(&tmp, body)
            .with_context(|| format!("failed to write cache {}", tmp.display()))?;
        std::fs::rename(&tmp, path)
            .with_context(|| format!("failed to replace cache {}", path.display()))?;
        Ok(())
    }

    /// Load a game's history, refreshing when the cache is missing, older
    /// than `stale_after`, or `force` is set. Fetch failures fall back to the
    /// cache (or an empty history) and are only logged.
    pub async fn load(&mut self, game: GameType, force: bool) -> LoadedHistory {
        let path = self.data_path(game);
        let exists = path.exists();
        let stale = exists && self.is_stale(&path);
        if stale && !force {
            tracing::info!(game = %game, "cached history is stale, auto-updating");
        }

        if force || !exists || stale {
            match self.source.fetch_history(game).await {
                Ok(draws) => {
                    if let Err(e) = self.write_cache(&path, &draws) {
                        tracing::error!(game = %game, error = %e, "failed to persist history");
                    }
                    tracing::info!(game = %game, draws = draws.len(), "history updated");
                    return LoadedHistory {
                        draws,
                        origin: DataOrigin::Fetched,
                        updated_at: self.last_updated(game).or_else(|| Some(Local::now())),
                    };
                }
                Err(e) => {
                    tracing::warn!(game = %game, error = %e, "history fetch failed");
                    if !exists {
                        return LoadedHistory {
                            draws: Vec::new(),
                            origin: DataOrigin::Empty,
                            updated_at: None,
                        };
                    }
                    tracing::info!(game = %game, "falling back to cached history");
                    return self.load_cached(game, &path, DataOrigin::CacheFallback);
                }
            }
        }

        self.load_cached(game, &path, DataOrigin::Cache)
    }

    fn load_cached(&self, game: GameType, path: &Path, origin: DataOrigin) -> LoadedHistory {
        match self.read_cache(path) {
            Ok(draws) => LoadedHistory {
                draws,
                origin,
                updated_at: self.last_updated(game),
            },
            Err(e) => {
                tracing::error!(game = %game, error = %e, "cached history unreadable");
                LoadedHistory {
                    draws: Vec::new(),
                    origin: DataOrigin::Empty,
                    updated_at: None,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct StubSource {
        draws: Option<Vec<Draw>>,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl HistorySource for StubSource {
        async fn fetch_history(&mut self, _game: GameType) -> Result<Vec<Draw>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.draws.clone().ok_or_else(|| anyhow::anyhow!("network down"))
        }
    }

    fn sample_draws() -> Vec<Draw> {
        vec![Draw {
            issue: "24001".to_string(),
            date: Some("2024-01-02".to_string()),
            reds: vec![1, 2, 3, 4, 5, 6],
            blues: vec![9],
        }]
    }

    fn loader(dir: &Path, draws: Option<Vec<Draw>>, stale_after: Duration) -> (DataLoader, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let source = StubSource { draws, calls: calls.clone() };
        (DataLoader::new(dir, stale_after, Box::new(source)).unwrap(), calls)
    }

    #[tokio::test]
    async fn test_fetches_when_cache_missing_then_uses_cache() {
        let dir = tempfile::tempdir().unwrap();
        let (mut dl, calls) = loader(dir.path(), Some(sample_draws()), Duration::from_secs(3600));

        let first = dl.load(GameType::Ssq, false).await;
        assert_eq!(first.origin, DataOrigin::Fetched);
        assert_eq!(first.draws, sample_draws());
        assert!(dl.data_path(GameType::Ssq).exists());

        let second = dl.load(GameType::Ssq, false).await;
        assert_eq!(second.origin, DataOrigin::Cache);
        assert_eq!(second.draws, sample_draws());
        assert!(second.updated_at.is_some());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_force_refetches() {
        let dir = tempfile::tempdir().unwrap();
        let (mut dl, calls) = loader(dir.path(), Some(sample_draws()), Duration::from_secs(3600));
        dl.load(GameType::Dlt, false).await;
        let forced = dl.load(GameType::Dlt, true).await;
        assert_eq!(forced.origin, DataOrigin::Fetched);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failure_without_cache_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let (mut dl, _) = loader(dir.path(), None, Duration::from_secs(3600));
        let loaded = dl.load(GameType::Ssq, false).await;
        assert_eq!(loaded.origin, DataOrigin::Empty);
        assert!(loaded.draws.is_empty());
    }

    #[tokio::test]
    async fn test_failure_falls_back_to_cache() {
        let dir = tempfile::tempdir().unwrap();
        {
            let (mut dl, _) = loader(dir.path(), Some(sample_draws()), Duration::from_secs(3600));
            dl.load(GameType::Ssq, false).await;
        }
        let (mut dl, calls) = loader(dir.path(), None, Duration::ZERO);
        std::thread::sleep(Duration::from_millis(20));
        let loaded = dl.load(GameType::Ssq, false).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1, "stale cache should trigger a fetch");
        assert_eq!(loaded.origin, DataOrigin::CacheFallback);
        assert_eq!(loaded.draws, sample_draws());
    }
}
