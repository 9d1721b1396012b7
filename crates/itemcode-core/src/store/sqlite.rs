//! `SQLite`-backed code store.
//!
//! The database runs in WAL mode with a busy timeout, so independent
//! handles on the same file (other threads or other processes) wait for
//! each other's write transactions instead of failing. Uniqueness of codes
//! is enforced by the table's `UNIQUE` constraints; a violation surfaces as
//! [`StoreError::DuplicateCode`].

// SQLite returns i64 for row ids and counters, but they are never negative
// (the schema CHECKs them).
#![allow(clippy::cast_sign_loss)]

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use rusqlite::{
    Connection, ErrorCode, OpenFlags, OptionalExtension, Row, TransactionBehavior, params,
};
use tracing::{debug, info};

use super::{CodeRecord, CodeStore, ItemId, StoreError, StoreStats};
use crate::code::IdentityCode;

/// Schema SQL embedded at compile time.
const SCHEMA_SQL: &str = include_str!("schema.sql");

/// Busy timeout used when none is configured.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Identity code store backed by a `SQLite` database.
pub struct SqliteCodeStore {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl SqliteCodeStore {
    /// Opens or creates a store at `path`, creating the table if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or initialized.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::open_with_timeout(path, DEFAULT_BUSY_TIMEOUT)
    }

    /// Opens or creates a store with an explicit busy timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the parent directory cannot be created or the
    /// database cannot be opened or initialized.
    pub fn open_with_timeout(
        path: impl AsRef<Path>,
        busy_timeout: Duration,
    ) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.busy_timeout(busy_timeout)?;
        Self::initialize_connection(&conn)?;
        debug!(path = %path.display(), "opened identity code store");

        Ok(Self {
            conn: Mutex::new(conn),
            path: Some(path.to_path_buf()),
        })
    }

    /// Creates an in-memory store for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be initialized.
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::initialize_connection(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
            path: None,
        })
    }

    fn initialize_connection(conn: &Connection) -> Result<(), StoreError> {
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(())
    }

    /// Path of the database file, or `None` for an in-memory store.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }

    /// Returns true if the code table exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog query fails.
    pub fn table_exists(&self) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        let exists: bool = conn.query_row(
            "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type = 'table' AND name = 'identity_codes'",
            [],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    /// Drops the code table and every record in it.
    ///
    /// Returns the number of records that were discarded.
    ///
    /// # Errors
    ///
    /// Returns an error if the table cannot be dropped.
    pub fn purge(&self) -> Result<u64, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let exists: bool = tx.query_row(
            "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type = 'table' AND name = 'identity_codes'",
            [],
            |row| row.get(0),
        )?;
        let discarded = if exists {
            let count: i64 =
                tx.query_row("SELECT COUNT(*) FROM identity_codes", [], |row| row.get(0))?;
            tx.execute_batch("DROP TABLE identity_codes;")?;
            count as u64
        } else {
            0
        };
        tx.commit()?;
        info!(discarded, "purged identity code table");
        Ok(discarded)
    }

    /// Verifies that WAL mode is enabled.
    ///
    /// # Errors
    ///
    /// Returns an error if the journal mode cannot be queried.
    pub fn verify_wal_mode(&self) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        let mode: String = conn.query_row("PRAGMA journal_mode", [], |row| row.get(0))?;
        Ok(mode.eq_ignore_ascii_case("wal"))
    }
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<CodeRecord> {
    Ok(CodeRecord {
        id: row.get::<_, i64>(0)? as u64,
        code: IdentityCode::from_stored(row.get(1)?),
        item_id: ItemId(row.get::<_, i64>(2)? as u64),
        verify_count: row.get::<_, i64>(3)? as u64,
    })
}

fn item_param(item_id: ItemId) -> Result<i64, StoreError> {
    i64::try_from(item_id.0)
        .map_err(|_| StoreError::Schema(format!("item id {item_id} exceeds the INTEGER range")))
}

/// Classifies an insert failure: the code `UNIQUE` constraints map to
/// [`StoreError::DuplicateCode`], everything else stays a database error.
fn classify_insert_error(err: rusqlite::Error, code: &IdentityCode) -> StoreError {
    if let rusqlite::Error::SqliteFailure(failure, _) = &err {
        if failure.code == ErrorCode::ConstraintViolation
            && failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
        {
            return StoreError::DuplicateCode { code: code.clone() };
        }
    }
    StoreError::Database(err)
}

impl CodeStore for SqliteCodeStore {
    fn insert(&self, code: &IdentityCode, item_id: ItemId) -> Result<CodeRecord, StoreError> {
        let item = item_param(item_id)?;
        let conn = self.lock()?;

        conn.execute(
            "INSERT INTO identity_codes (code, item_id) VALUES (?1, ?2)",
            params![code.as_str(), item],
        )
        .map_err(|e| classify_insert_error(e, code))?;

        Ok(CodeRecord {
            id: conn.last_insert_rowid() as u64,
            code: code.clone(),
            item_id,
            verify_count: 0,
        })
    }

    fn find(&self, code: &str) -> Result<Option<CodeRecord>, StoreError> {
        let conn = self.lock()?;
        let record = conn
            .query_row(
                "SELECT id, code, item_id, verify_count FROM identity_codes WHERE code = ?1",
                params![code],
                record_from_row,
            )
            .optional()?;
        Ok(record)
    }

    fn codes_for_item(&self, item_id: ItemId) -> Result<Vec<IdentityCode>, StoreError> {
        let item = item_param(item_id)?;
        let conn = self.lock()?;

        let mut stmt =
            conn.prepare("SELECT code FROM identity_codes WHERE item_id = ?1 ORDER BY id ASC")?;
        let codes = stmt
            .query_map(params![item], |row| {
                row.get::<_, String>(0).map(IdentityCode::from_stored)
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(codes)
    }

    fn record_verification(&self, code: &str) -> Result<Option<CodeRecord>, StoreError> {
        let conn = self.lock()?;
        let record = conn
            .query_row(
                "UPDATE identity_codes SET verify_count = verify_count + 1
                 WHERE code = ?1
                 RETURNING id, code, item_id, verify_count",
                params![code],
                record_from_row,
            )
            .optional()?;
        Ok(record)
    }

    fn delete_codes(&self, codes: &[IdentityCode]) -> Result<usize, StoreError> {
        if codes.is_empty() {
            return Ok(0);
        }

        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mut deleted = 0;
        {
            let mut stmt = tx.prepare("DELETE FROM identity_codes WHERE code = ?1")?;
            for code in codes {
                deleted += stmt.execute(params![code.as_str()])?;
            }
        }
        tx.commit()?;
        Ok(deleted)
    }

    fn stats(&self) -> Result<StoreStats, StoreError> {
        let conn = self.lock()?;
        let (record_count, item_count, total_verifications, max_id): (i64, i64, i64, i64) = conn
            .query_row(
                "SELECT COUNT(*), COUNT(DISTINCT item_id),
                        COALESCE(SUM(verify_count), 0), COALESCE(MAX(id), 0)
                 FROM identity_codes",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )?;

        Ok(StoreStats {
            record_count: record_count as u64,
            item_count: item_count as u64,
            total_verifications: total_verifications as u64,
            max_id: max_id as u64,
        })
    }
}
