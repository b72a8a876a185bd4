//! SQLite database store implementation.

use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Result as SqlResult};
use std::path::Path;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use uuid::Uuid;

use crate::config::DEFAULT_REPORT_INTERVAL_SECS;

use super::models::*;

/// Database error types.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Migration error: {0}")]
    Migration(String),
    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("Not found")]
    NotFound,
}

/// Attempts at generating a unique identifier before giving up.
const ID_RETRY_LIMIT: u32 = 3;

fn is_constraint_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

/// Thread-safe database store.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Open (or create) the database at the given path and run the
    /// embedded migration. The migration is idempotent, so startup
    /// doubles as schema initialization.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init()?;
        Ok(store)
    }

    fn init(&self) -> Result<(), DbError> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(include_str!("../../migrations/000001_init.up.sql"))
            .map_err(|e| DbError::Migration(format!("Migration 1 failed: {}", e)))?;
        Ok(())
    }

    // --- Endpoints ---

    /// Create a new endpoint record. Creation normally belongs to the
    /// management layer; this is its storage surface.
    pub fn add_endpoint(&self, name: &str, url: &str) -> Result<Endpoint, DbError> {
        let conn = self.conn.lock().unwrap();

        // Identifier collisions are vanishingly rare but the uniqueness
        // constraint is authoritative, so regenerate a bounded number
        // of times before giving up.
        let mut attempts = ID_RETRY_LIMIT;
        loop {
            let endpoint = Endpoint {
                id: Uuid::new_v4().to_string(),
                name: name.to_string(),
                url: url.to_string(),
                created_at: Utc::now(),
                last_checked_at: None,
                last_status: CheckStatus::Pending,
                last_status_code: None,
                last_response_time_ms: None,
                last_notified_down_at: None,
            };

            let inserted = conn.execute(
                "INSERT INTO endpoints (id, name, url, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![
                    endpoint.id,
                    endpoint.name,
                    endpoint.url,
                    fmt_db_time(endpoint.created_at),
                ],
            );
            match inserted {
                Ok(_) => return Ok(endpoint),
                Err(e) if is_constraint_violation(&e) && attempts > 1 => attempts -= 1,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Get all endpoints.
    pub fn get_endpoints(&self) -> Result<Vec<Endpoint>, DbError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, name, url, created_at, last_checked_at, last_status,
                    last_status_code, last_response_time_ms, last_notified_down_at
             FROM endpoints ORDER BY created_at",
        )?;

        let endpoints = stmt
            .query_map([], endpoint_from_row)?
            .collect::<SqlResult<Vec<_>>>()?;
        Ok(endpoints)
    }

    /// Get an endpoint by ID.
    pub fn get_endpoint(&self, id: &str) -> Result<Endpoint, DbError> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT id, name, url, created_at, last_checked_at, last_status,
                    last_status_code, last_response_time_ms, last_notified_down_at
             FROM endpoints WHERE id = ?1",
            params![id],
            endpoint_from_row,
        )
        .optional()?
        .ok_or(DbError::NotFound)
    }

    /// Persist the result of one check, guarded on the previously-read
    /// status fields. Returns false when a concurrent evaluation already
    /// advanced the record; the caller must then drop its notification.
    pub fn apply_check_result(
        &self,
        prev: &Endpoint,
        status: CheckStatus,
        status_code: Option<u16>,
        response_time_ms: i64,
        checked_at: DateTime<Utc>,
        notified_down_at: Option<DateTime<Utc>>,
    ) -> Result<bool, DbError> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE endpoints
             SET last_status = ?1, last_status_code = ?2, last_response_time_ms = ?3,
                 last_checked_at = ?4, last_notified_down_at = ?5
             WHERE id = ?6 AND last_status = ?7 AND last_checked_at IS ?8",
            params![
                status.as_str(),
                status_code.map(i64::from),
                response_time_ms,
                fmt_db_time(checked_at),
                notified_down_at.map(fmt_db_time),
                prev.id,
                prev.last_status.as_str(),
                prev.last_checked_at.map(fmt_db_time),
            ],
        )?;
        Ok(changed == 1)
    }

    // --- Status events ---

    /// Append one status event. Events are never updated or deleted.
    pub fn add_status_event(&self, event: &StatusEvent) -> Result<(), DbError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO status_events (endpoint_id, time, status, status_code, response_time_ms)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                event.endpoint_id,
                fmt_db_time(event.time),
                event.status.as_str(),
                event.status_code.map(i64::from),
                event.response_time_ms,
            ],
        )?;
        Ok(())
    }

    /// Get status events for an endpoint since a cutoff, most recent first.
    pub fn get_status_events_since(
        &self,
        endpoint_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<StatusEvent>, DbError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT endpoint_id, time, status, status_code, response_time_ms
             FROM status_events
             WHERE endpoint_id = ?1 AND time >= ?2
             ORDER BY time DESC",
        )?;

        let events = stmt
            .query_map(params![endpoint_id, fmt_db_time(since)], |row| {
                let time_str: String = row.get(1)?;
                let status_str: String = row.get(2)?;
                Ok(StatusEvent {
                    endpoint_id: row.get(0)?,
                    time: parse_db_time(&time_str).unwrap_or_else(Utc::now),
                    status: status_str.parse().unwrap_or(CheckStatus::Pending),
                    status_code: row.get::<_, Option<i64>>(3)?.map(|c| c as u16),
                    response_time_ms: row.get(4)?,
                })
            })?
            .collect::<SqlResult<Vec<_>>>()?;
        Ok(events)
    }

    // --- Hosts ---

    /// Create a new host record with a generated reporting credential.
    pub fn add_host(&self, name: &str, sort_order: i64) -> Result<Host, DbError> {
        let conn = self.conn.lock().unwrap();

        let mut attempts = ID_RETRY_LIMIT;
        loop {
            let host = Host {
                id: Uuid::new_v4().to_string(),
                name: name.to_string(),
                token: Uuid::new_v4().simple().to_string(),
                created_at: Utc::now(),
                sort_order,
                last_notified_down_at: None,
            };

            let inserted = conn.execute(
                "INSERT INTO hosts (id, name, token, created_at, sort_order) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    host.id,
                    host.name,
                    host.token,
                    fmt_db_time(host.created_at),
                    host.sort_order,
                ],
            );
            match inserted {
                Ok(_) => return Ok(host),
                Err(e) if is_constraint_violation(&e) && attempts > 1 => attempts -= 1,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Get all hosts in display order.
    pub fn get_hosts(&self) -> Result<Vec<Host>, DbError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, name, token, created_at, sort_order, last_notified_down_at
             FROM hosts ORDER BY sort_order, created_at",
        )?;

        let hosts = stmt
            .query_map([], host_from_row)?
            .collect::<SqlResult<Vec<_>>>()?;
        Ok(hosts)
    }

    /// Get a host by ID.
    pub fn get_host(&self, id: &str) -> Result<Host, DbError> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT id, name, token, created_at, sort_order, last_notified_down_at
             FROM hosts WHERE id = ?1",
            params![id],
            host_from_row,
        )
        .optional()?
        .ok_or(DbError::NotFound)
    }

    /// Resolve a host by its reporting credential.
    pub fn get_host_by_token(&self, token: &str) -> Result<Host, DbError> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT id, name, token, created_at, sort_order, last_notified_down_at
             FROM hosts WHERE token = ?1",
            params![token],
            host_from_row,
        )
        .optional()?
        .ok_or(DbError::NotFound)
    }

    /// Update a host's notification timestamp, guarded on its previous
    /// value. Returns false when a concurrent watchdog pass won.
    pub fn update_host_notified(
        &self,
        host_id: &str,
        prev: Option<DateTime<Utc>>,
        new: Option<DateTime<Utc>>,
    ) -> Result<bool, DbError> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE hosts SET last_notified_down_at = ?1
             WHERE id = ?2 AND last_notified_down_at IS ?3",
            params![new.map(fmt_db_time), host_id, prev.map(fmt_db_time)],
        )?;
        Ok(changed == 1)
    }

    // --- Host metrics snapshot ---

    /// Overwrite the host's metrics snapshot. One row per host.
    pub fn upsert_host_metrics(
        &self,
        host_id: &str,
        time: DateTime<Utc>,
        report: &MetricsReport,
    ) -> Result<(), DbError> {
        let data = serde_json::to_string(report)?;
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO host_metrics (host_id, time, data) VALUES (?1, ?2, ?3)
             ON CONFLICT(host_id) DO UPDATE SET time = excluded.time, data = excluded.data",
            params![host_id, fmt_db_time(time), data],
        )?;
        Ok(())
    }

    /// Get the host's current metrics snapshot, if it has ever reported.
    pub fn get_host_metrics(&self, host_id: &str) -> Result<Option<HostSnapshot>, DbError> {
        let conn = self.conn.lock().unwrap();
        let row: Option<(String, String)> = conn
            .query_row(
                "SELECT time, data FROM host_metrics WHERE host_id = ?1",
                params![host_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        match row {
            Some((time_str, data)) => Ok(Some(HostSnapshot {
                time: parse_db_time(&time_str).unwrap_or_else(Utc::now),
                report: serde_json::from_str(&data)?,
            })),
            None => Ok(None),
        }
    }

    // --- Notification channel ---

    /// Get the singleton channel config, if configured.
    pub fn get_channel(&self) -> Result<Option<ChannelConfig>, DbError> {
        let conn = self.conn.lock().unwrap();
        let cfg = conn
            .query_row(
                "SELECT enabled, bot_token, chat_id FROM channel WHERE id = 1",
                [],
                |row| {
                    Ok(ChannelConfig {
                        enabled: row.get::<_, i64>(0)? != 0,
                        bot_token: row.get(1)?,
                        chat_id: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(cfg)
    }

    /// Replace the singleton channel config.
    pub fn set_channel(&self, cfg: &ChannelConfig) -> Result<(), DbError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO channel (id, enabled, bot_token, chat_id) VALUES (1, ?1, ?2, ?3)",
            params![cfg.enabled as i64, cfg.bot_token, cfg.chat_id],
        )?;
        Ok(())
    }

    // --- Settings ---

    /// Get the global report interval in seconds.
    pub fn get_report_interval(&self) -> Result<u64, DbError> {
        let conn = self.conn.lock().unwrap();
        let value: Option<String> = conn
            .query_row(
                "SELECT value FROM settings WHERE key = 'report_interval'",
                [],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_REPORT_INTERVAL_SECS))
    }

    /// Set the global report interval in seconds.
    pub fn set_report_interval(&self, seconds: u64) -> Result<(), DbError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO settings (key, value) VALUES ('report_interval', ?1)",
            params![seconds.to_string()],
        )?;
        Ok(())
    }
}

fn endpoint_from_row(row: &rusqlite::Row<'_>) -> SqlResult<Endpoint> {
    let created_str: String = row.get(3)?;
    let checked_str: Option<String> = row.get(4)?;
    let status_str: String = row.get(5)?;
    let notified_str: Option<String> = row.get(8)?;
    Ok(Endpoint {
        id: row.get(0)?,
        name: row.get(1)?,
        url: row.get(2)?,
        created_at: parse_db_time(&created_str).unwrap_or_else(Utc::now),
        last_checked_at: checked_str.as_deref().and_then(parse_db_time),
        last_status: status_str.parse().unwrap_or(CheckStatus::Pending),
        last_status_code: row.get::<_, Option<i64>>(6)?.map(|c| c as u16),
        last_response_time_ms: row.get(7)?,
        last_notified_down_at: notified_str.as_deref().and_then(parse_db_time),
    })
}

fn host_from_row(row: &rusqlite::Row<'_>) -> SqlResult<Host> {
    let created_str: String = row.get(3)?;
    let notified_str: Option<String> = row.get(5)?;
    Ok(Host {
        id: row.get(0)?,
        name: row.get(1)?,
        token: row.get(2)?,
        created_at: parse_db_time(&created_str).unwrap_or_else(Utc::now),
        sort_order: row.get(4)?,
        last_notified_down_at: notified_str.as_deref().and_then(parse_db_time),
    })
}

/// Format a datetime for storage. Fixed-width fractional seconds keep
/// lexicographic and chronological order identical.
pub fn fmt_db_time(dt: DateTime<Utc>) -> String {
    dt.format("%Y-%m-%d %H:%M:%S%.9f").to_string()
}

/// Parse a datetime string from the database.
pub fn parse_db_time(s: &str) -> Option<DateTime<Utc>> {
    let formats = [
        "%Y-%m-%d %H:%M:%S%.9f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
    ];

    for fmt in &formats {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(DateTime::from_naive_utc_and_offset(dt, Utc));
        }
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    None
}
