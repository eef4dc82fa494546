use anyhow::{Context, Result};
use chrono::{FixedOffset, NaiveTime};
use serde::Deserialize;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

const ENV_FILE: &str = ".env";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub predictor: PredictorConfig,
    #[serde(default)]
    pub backtest: BacktestConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DataConfig {
    pub dir: PathBuf,
    pub db_file: String,
    #[serde(default = "default_stale_after_hours")]
    pub stale_after_hours: u64,
}

fn default_stale_after_hours() -> u64 { 12 }

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("data"),
            db_file: "lottery.db".to_string(),
            stale_after_hours: default_stale_after_hours(),
        }
    }
}

impl DataConfig {
    pub fn db_path(&self) -> PathBuf {
        self.dir.join(&self.db_file)
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_hours * 3600)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct FetchConfig {
    pub base_url: String,
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_limit() -> u32 { 100_000 }
fn default_timeout_ms() -> u64 { 10_000 }
fn default_max_retries() -> u32 { 2 }
fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36"
        .to_string()
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            base_url: "https://datachart.500.com".to_string(),
            limit: default_limit(),
            timeout_ms: default_timeout_ms(),
            max_retries: default_max_retries(),
            user_agent: default_user_agent(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SchedulerConfig {
    /// Local wall-clock time, "HH:MM".
    pub run_at: String,
    pub utc_offset_hours: i32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            run_at: "21:20".to_string(),
            utc_offset_hours: 8,
        }
    }
}

impl SchedulerConfig {
    pub fn run_time(&self) -> Result<NaiveTime> {
        NaiveTime::parse_from_str(&self.run_at, "%H:%M")
            .with_context(|| format!("Invalid scheduler run_at: {}", self.run_at))
    }

    pub fn offset(&self) -> Result<FixedOffset> {
        FixedOffset::east_opt(self.utc_offset_hours * 3600)
            .with_context(|| format!("Invalid UTC offset: {}", self.utc_offset_hours))
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct PredictorConfig {
    pub default_count: usize,
    pub max_count: usize,
}

impl Default for PredictorConfig {
    fn default() -> Self {
        Self { default_count: 5, max_count: 20 }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct BacktestConfig {
    pub test_count: usize,
    pub bets_per_issue: usize,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self { test_count: 50, bets_per_issue: 5 }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| "Failed to parse config TOML")?;
        config.validate()?;
        Ok(config)
    }

    /// Like `load`, but a missing file yields the built-in defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            tracing::info!(path = %path.display(), "config file not found, using defaults");
            Ok(Self::default())
        }
    }

    fn validate(&self) -> Result<()> {
        self.scheduler.run_time()?;
        self.scheduler.offset()?;
        if self.predictor.default_count == 0 || self.predictor.default_count > self.predictor.max_count {
            anyhow::bail!(
                "predictor.default_count must be within 1..={}",
                self.predictor.max_count
            );
        }
        if self.backtest.bets_per_issue == 0 {
            anyhow::bail!("backtest.bets_per_issue must be at least 1");
        }
        Ok(())
    }

    /// Load .env file into process environment. Real env vars take precedence.
    pub fn load_env_file() {
        let path = Path::new(ENV_FILE);
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(_) => return,
        };
        let content = content.strip_prefix('\u{feff}').unwrap_or(&content);
        for line in content.lines() {
            let line = line.trim().trim_matches('\r');
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                let key = key.trim();
                let value = value.trim().trim_matches('"').trim_matches('\'');
                if std::env::var(key).is_err() {
                    std::env::set_var(key, value);
                }
            }
        }
    }

    /// User name preset through LOTTO_USER, if any.
    pub fn preset_username() -> Option<String> {
        std::env::var("LOTTO_USER")
            .ok()
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
    }
}

/// Print `label` and read one trimmed line. An empty line is returned as
/// an empty string; end of input is an error.
pub fn prompt_line<R: BufRead, W: Write>(input: &mut R, out: &mut W, label: &str) -> Result<String> {
    write!(out, "  {} > ", label)?;
    out.flush()?;
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        anyhow::bail!("Input closed while reading {}", label);
    }
    Ok(line.trim().to_string())
}

pub fn prompt(label: &str) -> Result<String> {
    prompt_line(&mut io::stdin().lock(), &mut io::stdout(), label)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_parses() {
        let config = Config::load(Path::new("config.toml")).unwrap();
        assert_eq!(config.data.stale_after_hours, 12);
        assert_eq!(config.fetch.limit, 100_000);
        assert_eq!(config.scheduler.run_time().unwrap(), NaiveTime::from_hms_opt(21, 20, 0).unwrap());
        assert_eq!(config.predictor.max_count, 20);
        assert_eq!(config.backtest.test_count, 50);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: Config = toml::from_str("[data]\ndir = \"/tmp/lotto\"\ndb_file = \"x.db\"\n").unwrap();
        assert_eq!(config.data.db_path(), PathBuf::from("/tmp/lotto/x.db"));
        assert_eq!(config.data.stale_after(), Duration::from_secs(12 * 3600));
        assert_eq!(config.fetch.base_url, "https://datachart.500.com");
        assert_eq!(config.scheduler.utc_offset_hours, 8);
        assert_eq!(config.backtest.bets_per_issue, 5);
    }

    #[test]
    fn test_rejects_bad_run_at() {
        let config = Config {
            scheduler: SchedulerConfig { run_at: "25:99".to_string(), utc_offset_hours: 8 },
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_default_count_above_max() {
        let config = Config {
            predictor: PredictorConfig { default_count: 30, max_count: 20 },
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_prompt_line_keeps_empty_and_fails_on_eof() {
        let mut input = io::Cursor::new("\n  bob  \n");
        let mut out = Vec::new();
        assert_eq!(prompt_line(&mut input, &mut out, "用户名").unwrap(), "");
        assert_eq!(prompt_line(&mut input, &mut out, "用户名").unwrap(), "bob");
        assert!(prompt_line(&mut input, &mut out, "用户名").is_err());
        assert!(String::from_utf8(out).unwrap().contains("用户名 > "));
    }
}
