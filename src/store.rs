//! SQLite persistence for users, simulated bets, and daily recommendations.

use crate::lottery::{GameType, Ticket};
use anyhow::{Context, Result};
use chrono::Local;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS users (
    username      TEXT PRIMARY KEY,
    password_hash TEXT NOT NULL,
    created_at    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS bets (
    id          TEXT PRIMARY KEY,
    user_id     TEXT NOT NULL,
    game_type   TEXT NOT NULL,
    issue       TEXT NOT NULL,
    reds        TEXT NOT NULL,
    blues       TEXT NOT NULL,
    status      TEXT NOT NULL DEFAULT 'pending',
    prize_level TEXT,
    win_amount  INTEGER NOT NULL DEFAULT 0,
    note        TEXT NOT NULL DEFAULT '',
    created_at  TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_bets_user_game ON bets (user_id, game_type);

CREATE TABLE IF NOT EXISTS daily_recommendations (
    id          TEXT PRIMARY KEY,
    user_id     TEXT NOT NULL,
    date_str    TEXT NOT NULL,
    game_type   TEXT NOT NULL,
    predictions TEXT NOT NULL,
    created_at  TEXT NOT NULL
);
";

pub const STATUS_PENDING: &str = "pending";
pub const STATUS_CHECKED: &str = "checked";

static BET_SEQ: AtomicU32 = AtomicU32::new(0);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub username: String,
    pub password_hash: String,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BetRecord {
    pub id: String,
    pub user_id: String,
    pub game_type: GameType,
    pub issue: String,
    pub ticket: Ticket,
    pub status: String,
    pub prize_level: Option<String>,
    pub win_amount: u64,
    pub note: String,
    pub created_at: String,
}

impl BetRecord {
    pub fn is_pending(&self) -> bool {
        self.status == STATUS_PENDING
    }
}

pub struct Store {
    conn: Connection,
}

fn now_str() -> String {
    Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

fn new_bet_id() -> String {
    let seq = BET_SEQ.fetch_add(1, Ordering::Relaxed) % 10_000;
    format!("{}{:04}", Local::now().format("%Y%m%d%H%M%S%6f"), seq)
}

fn encode_numbers(numbers: &[u8]) -> Result<String> {
    serde_json::to_string(numbers).context("Failed to encode numbers")
}

fn decode_numbers(raw: &str) -> rusqlite::Result<Vec<u8>> {
    serde_json::from_str(raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn row_to_bet(row: &rusqlite::Row<'_>) -> rusqlite::Result<BetRecord> {
    let game: String = row.get(2)?;
    let game_type = game.parse::<GameType>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, e.into())
    })?;
    let reds: String = row.get(4)?;
    let blues: String = row.get(5)?;
    Ok(BetRecord {
        id: row.get(0)?,
        user_id: row.get(1)?,
        game_type,
        issue: row.get(3)?,
        ticket: Ticket::new(decode_numbers(&reds)?, decode_numbers(&blues)?),
        status: row.get(6)?,
        prize_level: row.get(7)?,
        win_amount: row.get::<_, i64>(8)?.max(0) as u64,
        note: row.get(9)?,
        created_at: row.get(10)?,
    })
}

const BET_COLUMNS: &str =
    "id, user_id, game_type, issue, reds, blues, status, prize_level, win_amount, note, created_at";

impl Store {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {:?}", parent))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database {:?}", path))?;
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<()> {
        self.conn.execute_batch(SCHEMA).context("Schema migration failed")?;
        Ok(())
    }

    /// Returns false when the username is already taken.
    pub fn create_user(&self, username: &str, password_hash: &str) -> Result<bool> {
        let changed = self
            .conn
            .execute(
                "INSERT OR IGNORE INTO users (username, password_hash, created_at) VALUES (?1, ?2, ?3)",
                params![username, password_hash, now_str()],
            )
            .context("Failed to insert user")?;
        Ok(changed > 0)
    }

    pub fn get_user(&self, username: &str) -> Result<Option<UserRecord>> {
        self.conn
            .query_row(
                "SELECT username, password_hash, created_at FROM users WHERE username = ?1",
                [username],
                |row| {
                    Ok(UserRecord {
                        username: row.get(0)?,
                        password_hash: row.get(1)?,
                        created_at: row.get(2)?,
                    })
                },
            )
            .optional()
            .context("Failed to query user")
    }

    /// Record a pending bet and return its id.
    pub fn add_bet(
        &self,
        user_id: &str,
        game: GameType,
        issue: &str,
        ticket: &Ticket,
        note: &str,
    ) -> Result<String> {
        let id = new_bet_id();
        self.conn
            .execute(
                "INSERT INTO bets (id, user_id, game_type, issue, reds, blues, status, note, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    id,
                    user_id,
                    game.code(),
                    issue,
                    encode_numbers(&ticket.reds)?,
                    encode_numbers(&ticket.blues)?,
                    STATUS_PENDING,
                    note,
                    now_str(),
                ],
            )
            .context("Failed to insert bet")?;
        Ok(id)
    }

    /// Bets newest first, optionally filtered by user and game.
    pub fn get_bets(&self, user_id: Option<&str>, game: Option<GameType>) -> Result<Vec<BetRecord>> {
        let sql = format!(
            "SELECT {} FROM bets
             WHERE (?1 IS NULL OR user_id = ?1) AND (?2 IS NULL OR game_type = ?2)
             ORDER BY created_at DESC, id DESC",
            BET_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let bets = stmt
            .query_map(params![user_id, game.map(|g| g.code())], row_to_bet)?
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to read bets")?;
        Ok(bets)
    }

    /// Pending bets of every user for one game.
    pub fn pending_bets(&self, game: GameType) -> Result<Vec<BetRecord>> {
        let sql = format!(
            "SELECT {} FROM bets WHERE game_type = ?1 AND status = ?2 ORDER BY created_at ASC, id ASC",
            BET_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let bets = stmt
            .query_map(params![game.code(), STATUS_PENDING], row_to_bet)?
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to read pending bets")?;
        Ok(bets)
    }

    /// Mark a bet as checked. Returns whether a row changed.
    pub fn update_bet_status(&self, bet_id: &str, prize_level: &str, win_amount: u64) -> Result<bool> {
        let changed = self
            .conn
            .execute(
                "UPDATE bets SET status = ?1, prize_level = ?2, win_amount = ?3 WHERE id = ?4",
                params![STATUS_CHECKED, prize_level, win_amount as i64, bet_id],
            )
            .context("Failed to update bet")?;
        Ok(changed > 0)
    }

    pub fn get_daily_recommendation(
        &self,
        user_id: &str,
        date_str: &str,
        game: GameType,
    ) -> Result<Option<Vec<Ticket>>> {
        let raw: Option<String> = self
            .conn
            .query_row(
                "SELECT predictions FROM daily_recommendations
                 WHERE user_id = ?1 AND date_str = ?2 AND game_type = ?3",
                params![user_id, date_str, game.code()],
                |row| row.get(0),
            )
            .optional()
            .context("Failed to query daily recommendation")?;

        match raw {
            Some(json) => {
                let tickets = serde_json::from_str(&json)
                    .context("Stored recommendation is not valid JSON")?;
                Ok(Some(tickets))
            }
            None => Ok(None),
        }
    }

    /// Insert or replace the recommendation for (user, date, game).
    pub fn save_daily_recommendation(
        &self,
        user_id: &str,
        date_str: &str,
        game: GameType,
        tickets: &[Ticket],
    ) -> Result<()> {
        let id = format!("{}_{}_{}", user_id, date_str, game.code());
        let predictions = serde_json::to_string(tickets).context("Failed to encode recommendation")?;
        self.conn
            .execute(
                "INSERT OR REPLACE INTO daily_recommendations
                 (id, user_id, date_str, game_type, predictions, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![id, user_id, date_str, game.code(), predictions, now_str()],
            )
            .context("Failed to save daily recommendation")?;
        Ok(())
    }
}
