//! Storage layer for tabguard.
//!
//! A single-table key-value store using `rusqlite`. Usage records live under
//! one key as a JSON object keyed by tab id, the same blob the extension
//! keeps in its local storage.
//!
//! # Thread Safety
//!
//! [`Store`] wraps a `rusqlite::Connection`, which is `Send` but not `Sync`.
//! The host owns exactly one store on its event loop.
//!
//! # Schema
//!
//! `kv(key TEXT PRIMARY KEY, value TEXT NOT NULL, updated_at TEXT NOT NULL)`.
//! `updated_at` is an RFC 3339 UTC timestamp with millisecond precision.

use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use thiserror::Error;
use tg_core::UsageMap;

/// Key holding the usage map.
pub const USAGE_KEY: &str = "tabTimeData";

/// Store errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// An error from the underlying database.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// A value could not be encoded.
    #[error("failed to encode value: {0}")]
    Json(#[from] serde_json::Error),
    /// A stored timestamp could not be parsed.
    #[error("invalid timestamp for key {key}: {timestamp}")]
    TimestampParse {
        key: String,
        timestamp: String,
        #[source]
        source: chrono::ParseError,
    },
}

/// Key-value store over a `SQLite` connection.
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Opens a store at the given path, creating it if necessary.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.init()?;
        Ok(store)
    }

    /// Opens an in-memory store. Useful for testing.
    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.init()?;
        Ok(store)
    }

    /// Initializes the schema. Idempotent.
    fn init(&self) -> Result<(), DbError> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            ",
        )?;
        Ok(())
    }

    /// Returns the raw value stored under `key`.
    pub fn get_raw(&self, key: &str) -> Result<Option<String>, DbError> {
        let value = self
            .conn
            .query_row("SELECT value FROM kv WHERE key = ?", [key], |row| row.get(0))
            .optional()?;
        Ok(value)
    }

    /// Stores `value` under `key`, replacing any previous value.
    pub fn put_raw(&mut self, key: &str, value: &str, now: DateTime<Utc>) -> Result<(), DbError> {
        self.conn.execute(
            "
            INSERT INTO kv (key, value, updated_at) VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            ",
            params![key, value, format_timestamp(now)],
        )?;
        Ok(())
    }

    /// Removes `key`. Returns whether it existed.
    pub fn delete(&mut self, key: &str) -> Result<bool, DbError> {
        let removed = self.conn.execute("DELETE FROM kv WHERE key = ?", [key])?;
        Ok(removed > 0)
    }

    /// When `key` was last written.
    pub fn updated_at(&self, key: &str) -> Result<Option<DateTime<Utc>>, DbError> {
        let timestamp: Option<String> = self
            .conn
            .query_row("SELECT updated_at FROM kv WHERE key = ?", [key], |row| {
                row.get(0)
            })
            .optional()?;
        timestamp
            .map(|timestamp| {
                DateTime::parse_from_rfc3339(&timestamp)
                    .map(|dt| dt.with_timezone(&Utc))
                    .map_err(|source| DbError::TimestampParse {
                        key: key.to_string(),
                        timestamp,
                        source,
                    })
            })
            .transpose()
    }

    /// Loads persisted usage records.
    ///
    /// A missing or unreadable blob yields an empty map.
    pub fn load_usage(&self) -> Result<UsageMap, DbError> {
        let Some(raw) = self.get_raw(USAGE_KEY)? else {
            return Ok(UsageMap::new());
        };
        match serde_json::from_str(&raw) {
            Ok(usage) => Ok(usage),
            Err(e) => {
                tracing::warn!(error = %e, "stored usage data is unreadable, starting empty");
                Ok(UsageMap::new())
            }
        }
    }

    /// Writes the whole usage map.
    pub fn save_usage(&mut self, usage: &UsageMap, now: DateTime<Utc>) -> Result<(), DbError> {
        let raw = serde_json::to_string(usage)?;
        self.put_raw(USAGE_KEY, &raw, now)?;
        tracing::trace!(tabs = usage.len(), "usage saved");
        Ok(())
    }

    /// Deletes all usage records. Returns whether any were stored.
    pub fn clear_usage(&mut self) -> Result<bool, DbError> {
        self.delete(USAGE_KEY)
    }
}

fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}
