//! SQLite-backed session storage.
//!
//! Provides persistent storage for:
//! - Work-session records (the [`SessionStore`] backend for local use)
//! - Key-value store for application state (engine checkpoints)

use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::data_dir;
use super::migrations;
use super::store::{SessionRecord, SessionStore, SessionUpdate};
use crate::error::{CoreError, StoreError};
use crate::timer::ModeId;

const SELECT_COLUMNS: &str =
    "id, user_id, mode, planned_min, actual_min, started_at, ended_at, completed, task_label";

/// SQLite database for session storage.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open the database at `~/.config/studyfocus/studyfocus.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> Result<Self, CoreError> {
        let path = data_dir()?.join("studyfocus.db");
        Self::open_at(path)
    }

    pub fn open_at(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let conn = Connection::open(path.as_ref()).map_err(StoreError::from)?;
        Self::with_connection(conn)
    }

    /// Open an in-memory database.
    pub fn open_memory() -> Result<Self, CoreError> {
        let conn = Connection::open_in_memory().map_err(StoreError::from)?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self, CoreError> {
        migrations::migrate(&conn).map_err(StoreError::from)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Get a value from the kv store.
    pub fn kv_get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let conn = self.conn();
        let value = conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get::<_, String>(0)
            })
            .optional()?;
        Ok(value)
    }

    /// Set a value in the kv store.
    pub fn kv_set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.conn().execute(
            "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    fn fetch(conn: &Connection, id: &str) -> Result<SessionRecord, StoreError> {
        conn.query_row(
            &format!("SELECT {SELECT_COLUMNS} FROM sessions WHERE id = ?1"),
            params![id],
            row_to_record,
        )
        .optional()?
        .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }
}

impl SessionStore for Database {
    fn create_record(&self, record: &SessionRecord) -> Result<String, StoreError> {
        self.conn().execute(
            "INSERT INTO sessions
                (id, user_id, mode, planned_min, actual_min, started_at, ended_at, completed, task_label)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                record.id,
                record.user_id,
                record.mode.as_str(),
                record.planned_min,
                record.actual_min,
                timestamp(record.started_at),
                record.ended_at.map(timestamp),
                record.completed,
                record.task_label,
            ],
        )?;
        Ok(record.id.clone())
    }

    fn update_record(&self, id: &str, update: &SessionUpdate) -> Result<SessionRecord, StoreError> {
        let conn = self.conn();
        let mut record = Self::fetch(&conn, id)?;
        update.apply(&mut record);
        conn.execute(
            "UPDATE sessions SET actual_min = ?2, ended_at = ?3, completed = ?4 WHERE id = ?1",
            params![
                id,
                record.actual_min,
                record.ended_at.map(timestamp),
                record.completed,
            ],
        )?;
        Ok(record)
    }

    fn query_by_date_range(
        &self,
        user_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<SessionRecord>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {SELECT_COLUMNS} FROM sessions
             WHERE user_id = ?1 AND started_at >= ?2 AND started_at <= ?3
             ORDER BY started_at, id"
        ))?;
        let rows = stmt.query_map(
            params![user_id, timestamp(start), timestamp(end)],
            row_to_record,
        )?;
        let records = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }
}

/// Fixed-width UTC timestamps so text comparison matches time order.
fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_timestamp(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<SessionRecord> {
    let mode: String = row.get(2)?;
    let mode = ModeId::from_str(&mode)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e)))?;
    let started_at: String = row.get(5)?;
    let ended_at: Option<String> = row.get(6)?;

    Ok(SessionRecord {
        id: row.get(0)?,
        user_id: row.get(1)?,
        mode,
        planned_min: row.get(3)?,
        actual_min: row.get(4)?,
        started_at: parse_timestamp(5, &started_at)?,
        ended_at: ended_at.map(|raw| parse_timestamp(6, &raw)).transpose()?,
        completed: row.get(7)?,
        task_label: row.get(8)?,
    })
}
