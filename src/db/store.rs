//! SQLite database store implementation.

use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Result as SqlResult, Row};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

use super::models::*;

refinery::embed_migrations!("migrations");

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.9f";

const ENDPOINT_COLUMNS: &str =
    "id, name, url, method, headers, body, expected_status, created_at";

const CHECK_COLUMNS: &str =
    "endpoint_id, checked_at, success, response_time_ms, status_code, error_message";

/// Database error types.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Migration error: {0}")]
    Migration(String),
    #[error("database connection lock poisoned")]
    Poisoned,
    #[error("Not found")]
    NotFound,
}

/// Thread-safe database store.
///
/// Every operation holds the connection lock for its whole duration, so an
/// append is atomic per record and a snapshot read can never interleave
/// with a pruning pass.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Create a new store with the given database path.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init()?;
        Ok(store)
    }

    /// Initialize the database with migrations.
    fn init(&self) -> Result<(), DbError> {
        let mut conn = self.conn()?;
        let report = migrations::runner()
            .run(&mut *conn)
            .map_err(|e| DbError::Migration(e.to_string()))?;

        for migration in report.applied_migrations() {
            tracing::info!("Applied migration {}", migration);
        }

        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, DbError> {
        self.conn.lock().map_err(|_| DbError::Poisoned)
    }

    // --- Endpoint registry ---

    /// Insert a new endpoint and return it with its assigned ID.
    #[cfg(test)]
    pub fn add_endpoint(&self, endpoint: &NewEndpoint) -> Result<Endpoint, DbError> {
        let conn = self.conn()?;
        Ok(insert_endpoint(&conn, endpoint)?)
    }

    /// Insert an endpoint unless one with the same name is already registered.
    ///
    /// Returns `None` when the name was taken.
    pub fn add_endpoint_if_absent(&self, endpoint: &NewEndpoint) -> Result<Option<Endpoint>, DbError> {
        let conn = self.conn()?;
        let exists = conn
            .query_row(
                "SELECT 1 FROM endpoints WHERE name = ?1",
                params![endpoint.name],
                |_| Ok(()),
            )
            .optional()?
            .is_some();

        if exists {
            return Ok(None);
        }
        Ok(Some(insert_endpoint(&conn, endpoint)?))
    }

    /// Get all endpoints in registry order.
    pub fn get_endpoints(&self) -> Result<Vec<Endpoint>, DbError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {ENDPOINT_COLUMNS} FROM endpoints ORDER BY id ASC"
        ))?;

        let endpoints = stmt
            .query_map([], endpoint_from_row)?
            .collect::<SqlResult<Vec<_>>>()?;

        Ok(endpoints)
    }

    /// Get an endpoint by ID.
    pub fn get_endpoint(&self, id: i64) -> Result<Endpoint, DbError> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {ENDPOINT_COLUMNS} FROM endpoints WHERE id = ?1"),
            params![id],
            endpoint_from_row,
        )
        .optional()?
        .ok_or(DbError::NotFound)
    }

    // --- Check results ---

    /// Append a single check result.
    pub fn append_result(&self, result: &CheckResult) -> Result<i64, DbError> {
        let conn = self.conn()?;
        conn.execute(
            &format!("INSERT INTO check_results ({CHECK_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)"),
            params![
                result.endpoint_id,
                format_time(result.timestamp),
                result.success,
                result.response_time_ms,
                result.observed_status,
                result.error_message,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Get results for an endpoint within `[start, end)`, oldest first.
    pub fn get_results(
        &self,
        endpoint_id: i64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<CheckResult>, DbError> {
        let conn = self.conn()?;
        Ok(query_window(&conn, endpoint_id, start, end)?)
    }

    /// Read the window's results together with the latest and latest
    /// successful results, all from one consistent view of the table.
    pub fn endpoint_snapshot(
        &self,
        endpoint_id: i64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<EndpointSnapshot, DbError> {
        let conn = self.conn()?;
        let tx = conn.unchecked_transaction()?;

        let window = query_window(&tx, endpoint_id, start, end)?;

        let latest = tx
            .query_row(
                &format!(
                    "SELECT {CHECK_COLUMNS} FROM check_results
                     WHERE endpoint_id = ?1 ORDER BY checked_at DESC, id DESC LIMIT 1"
                ),
                params![endpoint_id],
                |row| check_from_row(row, 0),
            )
            .optional()?;

        let latest_success = tx
            .query_row(
                &format!(
                    "SELECT {CHECK_COLUMNS} FROM check_results
                     WHERE endpoint_id = ?1 AND success = 1 ORDER BY checked_at DESC, id DESC LIMIT 1"
                ),
                params![endpoint_id],
                |row| check_from_row(row, 0),
            )
            .optional()?;

        tx.commit()?;

        Ok(EndpointSnapshot {
            window,
            latest,
            latest_success,
        })
    }

    /// Get the most recent checks for an endpoint, newest first.
    pub fn recent_checks(&self, endpoint_id: i64, limit: u32) -> Result<Vec<StoredCheck>, DbError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT id, {CHECK_COLUMNS} FROM check_results
             WHERE endpoint_id = ?1 ORDER BY checked_at DESC, id DESC LIMIT ?2"
        ))?;

        let checks = stmt
            .query_map(params![endpoint_id, limit], |row| {
                Ok(StoredCheck {
                    id: row.get(0)?,
                    result: check_from_row(row, 1)?,
                })
            })?
            .collect::<SqlResult<Vec<_>>>()?;

        Ok(checks)
    }

    /// Delete results recorded before a cutoff time. Returns the number of
    /// rows removed.
    pub fn delete_results_before(&self, cutoff: DateTime<Utc>) -> Result<usize, DbError> {
        let conn = self.conn()?;
        let deleted = conn.execute(
            "DELETE FROM check_results WHERE checked_at < ?1",
            params![format_time(cutoff)],
        )?;
        Ok(deleted)
    }
}

fn insert_endpoint(conn: &Connection, endpoint: &NewEndpoint) -> SqlResult<Endpoint> {
    let created_at = Utc::now();
    conn.execute(
        "INSERT INTO endpoints (name, url, method, headers, body, expected_status, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            endpoint.name,
            endpoint.url,
            endpoint.method,
            endpoint.headers,
            endpoint.body,
            endpoint.expected_status,
            format_time(created_at),
        ],
    )?;

    Ok(Endpoint {
        id: conn.last_insert_rowid(),
        name: endpoint.name.clone(),
        url: endpoint.url.clone(),
        method: endpoint.method.clone(),
        headers: endpoint.headers.clone(),
        body: endpoint.body.clone(),
        expected_status: endpoint.expected_status,
        created_at,
    })
}

fn query_window(
    conn: &Connection,
    endpoint_id: i64,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> SqlResult<Vec<CheckResult>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {CHECK_COLUMNS} FROM check_results
         WHERE endpoint_id = ?1 AND checked_at >= ?2 AND checked_at < ?3
         ORDER BY checked_at ASC, id ASC"
    ))?;

    let results = stmt
        .query_map(
            params![endpoint_id, format_time(start), format_time(end)],
            |row| check_from_row(row, 0),
        )?
        .collect::<SqlResult<Vec<_>>>()?;

    Ok(results)
}

fn endpoint_from_row(row: &Row<'_>) -> SqlResult<Endpoint> {
    Ok(Endpoint {
        id: row.get(0)?,
        name: row.get(1)?,
        url: row.get(2)?,
        method: row.get(3)?,
        headers: row.get(4)?,
        body: row.get(5)?,
        expected_status: row.get(6)?,
        created_at: time_column(row, 7)?,
    })
}

fn check_from_row(row: &Row<'_>, offset: usize) -> SqlResult<CheckResult> {
    Ok(CheckResult {
        endpoint_id: row.get(offset)?,
        timestamp: time_column(row, offset + 1)?,
        success: row.get(offset + 2)?,
        response_time_ms: row.get(offset + 3)?,
        observed_status: row.get(offset + 4)?,
        error_message: row.get(offset + 5)?,
    })
}

fn time_column(row: &Row<'_>, idx: usize) -> SqlResult<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    parse_db_time(&raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Text,
            format!("invalid timestamp {raw:?}").into(),
        )
    })
}

fn format_time(t: DateTime<Utc>) -> String {
    t.format(TIME_FORMAT).to_string()
}

/// Parse a datetime string from the database.
fn parse_db_time(s: &str) -> Option<DateTime<Utc>> {
    let formats = [TIME_FORMAT, "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"];

    for fmt in &formats {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(DateTime::from_naive_utc_and_offset(dt, Utc));
        }
    }

    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
