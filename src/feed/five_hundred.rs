//! Historical results scraped from the datachart.500.com history tables.
//!
//! Endpoint: {base}/{game}/history/newinc/history.php?limit={n}&sort=0
//! Returns an HTML page whose result table has one `<tr>` per issue.

use super::HistorySource;
use crate::config::FetchConfig;
use crate::lottery::{Draw, GameType};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use scraper::{Html, Selector};
use std::time::Duration;

/// Column positions within a result row.
struct ColumnLayout {
    reds: std::ops::Range<usize>,
    blues: std::ops::Range<usize>,
    date: usize,
}

fn column_layout(game: GameType) -> ColumnLayout {
    match game {
        GameType::Ssq => ColumnLayout { reds: 1..7, blues: 7..8, date: 15 },
        GameType::Dlt => ColumnLayout { reds: 1..6, blues: 6..8, date: 14 },
    }
}

fn parse_numbers(cells: &[String], range: std::ops::Range<usize>) -> Option<Vec<u8>> {
    let mut out = cells.get(range)?
        .iter()
        .map(|c| c.parse::<u8>().ok())
        .collect::<Option<Vec<u8>>>()?;
    out.sort_unstable();
    Some(out)
}

/// Parse the history table into draws sorted ascending by issue.
///
/// Header and footer rows (first cell not purely digits) are skipped, as are
/// rows whose numbers do not parse. A missing date column leaves `date` empty.
pub fn parse_history_table(html: &str, game: GameType) -> Result<Vec<Draw>> {
    let document = Html::parse_document(html);
    let row_selector = Selector::parse("tr")
        .map_err(|e| anyhow::anyhow!("invalid row selector: {:?}", e))?;
    let cell_selector = Selector::parse("td")
        .map_err(|e| anyhow::anyhow!("invalid cell selector: {:?}", e))?;

    let layout = column_layout(game);
    let mut draws: Vec<Draw> = Vec::new();
    let mut missing_date = 0usize;

    for row in document.select(&row_selector) {
        let cells: Vec<String> = row
            .select(&cell_selector)
            .map(|td| td.text().collect::<String>().trim().to_string())
            .collect();

        let Some(issue) = cells.first() else { continue };
        if issue.is_empty() || !issue.chars().all(|c| c.is_ascii_digit()) {
            continue;
        }

        let (Some(reds), Some(blues)) = (
            parse_numbers(&cells, layout.reds.clone()),
            parse_numbers(&cells, layout.blues.clone()),
        ) else {
            tracing::debug!(issue = %issue, cells = cells.len(), "skipping malformed result row");
            continue;
        };

        let date = cells.get(layout.date).filter(|d| !d.is_empty()).cloned();
        if date.is_none() {
            missing_date += 1;
        }

        draws.push(Draw { issue: issue.clone(), date, reds, blues });
    }

    if missing_date > 0 {
        tracing::warn!(game = %game, rows = missing_date, "table structure mismatch, date column missing");
    }

    draws.sort_by(|a, b| {
        a.issue
            .len()
            .cmp(&b.issue.len())
            .then_with(|| a.issue.cmp(&b.issue))
    });
    draws.dedup_by(|a, b| a.issue == b.issue);

    Ok(draws)
}

pub struct FiveHundredScraper {
    client: Client,
    base_url: String,
    limit: u32,
    max_retries: u32,
}

impl FiveHundredScraper {
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .user_agent(config.user_agent.as_str())
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            limit: config.limit,
            max_retries: config.max_retries,
        })
    }

    pub fn history_url(&self, game: GameType) -> String {
        format!(
            "{}/{}/history/newinc/history.php?limit={}&sort=0",
            self.base_url,
            game.code(),
            self.limit
        )
    }
}

#[async_trait]
impl HistorySource for FiveHundredScraper {
    async fn fetch_history(&mut self, game: GameType) -> Result<Vec<Draw>> {
        let url = self.history_url(game);
        tracing::info!(game = %game, url = %url, "fetching draw history");

        let mut last_err: Option<anyhow::Error> = None;
        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                tokio::time::sleep(Duration::from_millis(500 * attempt as u64)).await;
            }

            let resp = match self.client.get(&url).send().await {
                Ok(resp) => resp,
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "history request failed");
                    last_err = Some(e.into());
                    continue;
                }
            };

            let status = resp.status();
            if !status.is_success() {
                tracing::warn!(attempt, status = %status, "history request rejected");
                last_err = Some(anyhow::anyhow!("history fetch HTTP {} for {}", status, game));
                continue;
            }

            let text = match resp.text().await {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "history response read failed");
                    last_err = Some(anyhow::Error::new(e).context("history response read failed"));
                    continue;
                }
            };
            match parse_history_table(&text, game) {
                Ok(draws) if draws.is_empty() => {
                    last_err = Some(anyhow::anyhow!("no result rows found for {}", game));
                }
                Ok(draws) => return Ok(draws),
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "history parse failed");
                    last_err = Some(e);
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("history fetch failed for {}", game)))
    }
}
