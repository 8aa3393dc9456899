//! SQLite-backed request store

use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::{debug, info};

use crate::error::StoreError;
use crate::record::{NewRequest, Request, RequestFilter, RequestId, RequestStatus};

/// How long a writer waits on a lock held by another connection
const BUSY_TIMEOUT: Duration = Duration::from_millis(5_000);

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS requests (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    source_name  TEXT NOT NULL DEFAULT '',
    app_name     TEXT NOT NULL,
    question     TEXT NOT NULL,
    response     TEXT NOT NULL DEFAULT '',
    status       TEXT NOT NULL DEFAULT 'pending',
    created_at   TEXT NOT NULL,
    responded_at TEXT
);
CREATE INDEX IF NOT EXISTS idx_requests_source_name ON requests(source_name);
CREATE INDEX IF NOT EXISTS idx_requests_app_name ON requests(app_name);
CREATE INDEX IF NOT EXISTS idx_requests_status ON requests(status);
";

const SELECT_COLUMNS: &str =
    "SELECT id, source_name, app_name, question, response, status, created_at, responded_at FROM requests";

/// Durable request table
///
/// A single connection guarded by a mutex; every method is a short synchronous
/// call, so async callers should run them on a blocking thread.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open (or create) the store at `path`, creating parent directories as needed
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        debug!(path = %path.display(), "Store::open: called");

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        let mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
        debug!(%mode, "Store::open: journal mode set");

        let store = Self { conn: Mutex::new(conn) };
        store.migrate()?;
        info!(path = %path.display(), "Request store opened");
        Ok(store)
    }

    /// Open a private in-memory store (tests, throwaway sessions)
    pub fn open_in_memory() -> Result<Self, StoreError> {
        debug!("Store::open_in_memory: called");
        let store = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
        };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }

    /// Insert a new `pending` request and return the stored record
    pub fn create(&self, new: &NewRequest) -> Result<Request, StoreError> {
        debug!(source_name = %new.source_name, app_name = %new.app_name, "Store::create: called");
        let created_at = Utc::now();
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO requests (source_name, app_name, question, response, status, created_at)
             VALUES (?1, ?2, ?3, '', ?4, ?5)",
            params![
                new.source_name,
                new.app_name,
                new.question,
                RequestStatus::Pending.as_str(),
                format_timestamp(&created_at),
            ],
        )?;
        let id = conn.last_insert_rowid();
        debug!(id, "Store::create: inserted");

        Ok(Request {
            id,
            source_name: new.source_name.clone(),
            app_name: new.app_name.clone(),
            question: new.question.clone(),
            response: String::new(),
            status: RequestStatus::Pending,
            created_at,
            responded_at: None,
        })
    }

    /// Record an answer, guarded by `status = 'pending'`
    ///
    /// Returns `true` when exactly one pending record was updated, `false` when
    /// the id is unknown or the request was already answered.
    pub fn respond_if_pending(
        &self,
        id: RequestId,
        response: &str,
        responded_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        debug!(id, "Store::respond_if_pending: called");
        let conn = self.lock()?;
        let rows = conn.execute(
            "UPDATE requests SET response = ?1, status = ?2, responded_at = ?3
             WHERE id = ?4 AND status = ?5",
            params![
                response,
                RequestStatus::Responded.as_str(),
                format_timestamp(&responded_at),
                id,
                RequestStatus::Pending.as_str(),
            ],
        )?;
        debug!(id, rows, "Store::respond_if_pending: updated");
        Ok(rows == 1)
    }

    /// Fetch one request by id
    pub fn get(&self, id: RequestId) -> Result<Option<Request>, StoreError> {
        debug!(id, "Store::get: called");
        let conn = self.lock()?;
        let sql = format!("{} WHERE id = ?1", SELECT_COLUMNS);
        let request = conn.query_row(&sql, params![id], row_to_request).optional()?;
        Ok(request)
    }

    /// List requests matching `filter`, newest first
    pub fn list(&self, filter: &RequestFilter) -> Result<Vec<Request>, StoreError> {
        debug!(?filter, "Store::list: called");
        let conn = self.lock()?;
        let sql = format!(
            "{} WHERE (?1 IS NULL OR source_name = ?1)
               AND (?2 IS NULL OR app_name = ?2)
               AND (?3 IS NULL OR status = ?3)
             ORDER BY created_at DESC, id DESC",
            SELECT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(
            params![
                filter.source_name.as_deref(),
                filter.app_name.as_deref(),
                filter.status.map(|s| s.as_str()),
            ],
            row_to_request,
        )?;
        let requests = rows.collect::<Result<Vec<_>, _>>()?;
        debug!(count = requests.len(), "Store::list: returning");
        Ok(requests)
    }
}

fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(idx: usize, value: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn row_to_request(row: &Row<'_>) -> rusqlite::Result<Request> {
    let status: String = row.get(5)?;
    let status = status
        .parse::<RequestStatus>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, Type::Text, e.into()))?;
    let created_at: String = row.get(6)?;
    let responded_at: Option<String> = row.get(7)?;

    Ok(Request {
        id: row.get(0)?,
        source_name: row.get(1)?,
        app_name: row.get(2)?,
        question: row.get(3)?,
        response: row.get(4)?,
        status,
        created_at: parse_timestamp(6, &created_at)?,
        responded_at: responded_at.as_deref().map(|ts| parse_timestamp(7, ts)).transpose()?,
    })
}
