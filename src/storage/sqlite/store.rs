//! `SQLite`-backed store for communities, the ledger, and the corpus.

use super::{
    acquire_lock, configure_connection, record_operation_metrics, status_of,
    with_immediate_transaction,
};
use crate::hashing::Fingerprint;
use crate::models::{Community, FingerprintRecord, IndexingState, SubmissionId};
use crate::storage::traits::{
    CommunityStore, LedgerEntry, LedgerInsert, MediaStore, SubmissionLedger,
};
use crate::{Error, Result, current_timestamp};
use rusqlite::{Connection, OptionalExtension, params};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Instant;
use tracing::instrument;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS communities (
        name TEXT PRIMARY KEY,
        indexed INTEGER NOT NULL DEFAULT 0
    );
    CREATE TABLE IF NOT EXISTS submission_ledger (
        id TEXT PRIMARY KEY,
        processed INTEGER NOT NULL,
        recorded_at INTEGER NOT NULL
    );
    CREATE TABLE IF NOT EXISTS fingerprints (
        hash INTEGER NOT NULL,
        submission_id TEXT NOT NULL UNIQUE,
        community TEXT NOT NULL,
        created_at INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_fingerprints_community ON fingerprints(community);
";

/// Store backing every durable piece of state.
///
/// # Concurrency Model
///
/// One `Mutex<Connection>`; `rusqlite::Connection` is not `Sync`. Separate
/// processes (or separate `SqliteStore`s on the same file) coordinate through
/// WAL mode and the busy timeout. Ledger and fingerprint uniqueness are
/// enforced by the schema, so racing inserts of one submission leave exactly
/// one row and neither caller fails.
///
/// # Schema
///
/// | Table | Key | Notes |
/// |-------|-----|-------|
/// | `communities` | `name` | `indexed` is 0 or 1 |
/// | `submission_ledger` | `id` | one row per submission ever considered |
/// | `fingerprints` | `submission_id` (unique) | hash stored bit-for-bit as `INTEGER`; indexed by `community` |
pub struct SqliteStore {
    conn: Mutex<Connection>,
    db_path: Option<PathBuf>,
}

impl SqliteStore {
    /// Opens (creating if needed) a database file.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or initialized.
    pub fn new(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| Error::OperationFailed {
                operation: "create_database_dir".to_string(),
                cause: format!("{}: {e}", parent.display()),
            })?;
        }

        let conn = Connection::open(&db_path).map_err(|e| Error::OperationFailed {
            operation: "open_sqlite".to_string(),
            cause: e.to_string(),
        })?;

        let store = Self {
            conn: Mutex::new(conn),
            db_path: Some(db_path),
        };
        store.initialize()?;
        Ok(store)
    }

    /// Creates an in-memory database (useful for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be created.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| Error::OperationFailed {
            operation: "open_sqlite_in_memory".to_string(),
            cause: e.to_string(),
        })?;

        let store = Self {
            conn: Mutex::new(conn),
            db_path: None,
        };
        store.initialize()?;
        Ok(store)
    }

    /// Returns the database path (None for in-memory).
    #[must_use]
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    fn initialize(&self) -> Result<()> {
        let conn = acquire_lock(&self.conn);
        configure_connection(&conn)?;
        conn.execute_batch(SCHEMA)
            .map_err(|e| Error::OperationFailed {
                operation: "create_schema".to_string(),
                cause: e.to_string(),
            })
    }

    /// Runs `op` under the connection lock and records its metrics.
    fn run<T>(&self, operation: &'static str, op: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let start = Instant::now();
        let result = {
            let conn = acquire_lock(&self.conn);
            op(&conn)
        };
        record_operation_metrics(operation, start, status_of(&result));
        result
    }
}

fn failed(operation: &str) -> impl FnOnce(rusqlite::Error) -> Error + '_ {
    move |e| Error::OperationFailed {
        operation: operation.to_string(),
        cause: e.to_string(),
    }
}

fn to_count(n: i64) -> usize {
    usize::try_from(n).unwrap_or(0)
}

fn record_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<(i64, FingerprintRecord)> {
    let rowid: i64 = row.get(0)?;
    let hash: i64 = row.get(1)?;
    let submission_id: String = row.get(2)?;
    Ok((
        rowid,
        FingerprintRecord {
            hash: Fingerprint::from_i64(hash),
            submission_id: SubmissionId::new(submission_id),
            community: row.get(3)?,
            created_at: row.get(4)?,
        },
    ))
}

impl CommunityStore for SqliteStore {
    #[instrument(skip(self), fields(operation = "add_community", backend = "sqlite"))]
    fn add_community(&self, name: &str) -> Result<bool> {
        self.run("add_community", |conn| {
            let changed = conn
                .execute(
                    "INSERT INTO communities (name, indexed) VALUES (?1, 0)
                     ON CONFLICT(name) DO NOTHING",
                    params![name],
                )
                .map_err(failed("add_community"))?;
            Ok(changed == 1)
        })
    }

    #[instrument(skip(self), fields(operation = "remove_community", backend = "sqlite"))]
    fn remove_community(&self, name: &str) -> Result<bool> {
        self.run("remove_community", |conn| {
            let changed = conn
                .execute("DELETE FROM communities WHERE name = ?1", params![name])
                .map_err(failed("remove_community"))?;
            Ok(changed == 1)
        })
    }

    #[instrument(skip(self), fields(operation = "get_community", backend = "sqlite"))]
    fn get_community(&self, name: &str) -> Result<Option<Community>> {
        self.run("get_community", |conn| {
            conn.query_row(
                "SELECT name, indexed FROM communities WHERE name = ?1",
                params![name],
                |row| {
                    Ok(Community::new(
                        row.get::<_, String>(0)?,
                        IndexingState::from_indexed(row.get(1)?),
                    ))
                },
            )
            .optional()
            .map_err(failed("get_community"))
        })
    }

    #[instrument(skip(self), fields(operation = "list_communities", backend = "sqlite"))]
    fn list_communities(&self) -> Result<Vec<Community>> {
        self.run("list_communities", |conn| {
            let mut stmt = conn
                .prepare("SELECT name, indexed FROM communities ORDER BY name")
                .map_err(failed("prepare_list_communities"))?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(Community::new(
                        row.get::<_, String>(0)?,
                        IndexingState::from_indexed(row.get(1)?),
                    ))
                })
                .map_err(failed("list_communities"))?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
                .map_err(failed("read_community_row"))
        })
    }

    #[instrument(skip(self), fields(operation = "mark_indexed", backend = "sqlite"))]
    fn mark_indexed(&self, name: &str) -> Result<bool> {
        self.run("mark_indexed", |conn| {
            with_immediate_transaction(conn, |tx| {
                let changed = tx
                    .execute(
                        "UPDATE communities SET indexed = 1 WHERE name = ?1",
                        params![name],
                    )
                    .map_err(failed("mark_indexed"))?;
                Ok(changed == 1)
            })
        })
    }
}

impl SubmissionLedger for SqliteStore {
    #[instrument(skip(self), fields(operation = "insert_entry", backend = "sqlite", submission_id = %id))]
    fn insert_entry(&self, id: &SubmissionId, processed: bool) -> Result<LedgerInsert> {
        self.run("insert_entry", |conn| {
            let changed = conn
                .execute(
                    "INSERT INTO submission_ledger (id, processed, recorded_at)
                     VALUES (?1, ?2, ?3)
                     ON CONFLICT(id) DO NOTHING",
                    params![id.as_str(), processed, current_timestamp()],
                )
                .map_err(failed("insert_entry"))?;
            if changed == 1 {
                Ok(LedgerInsert::Inserted)
            } else {
                tracing::debug!(submission_id = %id, "Ledger entry already present");
                Ok(LedgerInsert::AlreadyPresent)
            }
        })
    }

    #[instrument(skip(self), fields(operation = "get_entry", backend = "sqlite", submission_id = %id))]
    fn get_entry(&self, id: &SubmissionId) -> Result<Option<LedgerEntry>> {
        self.run("get_entry", |conn| {
            conn.query_row(
                "SELECT processed, recorded_at FROM submission_ledger WHERE id = ?1",
                params![id.as_str()],
                |row| {
                    Ok(LedgerEntry {
                        submission_id: id.clone(),
                        processed: row.get(0)?,
                        recorded_at: row.get(1)?,
                    })
                },
            )
            .optional()
            .map_err(failed("get_entry"))
        })
    }

    #[instrument(skip(self), fields(operation = "entry_count", backend = "sqlite"))]
    fn entry_count(&self) -> Result<usize> {
        self.run("entry_count", |conn| {
            conn.query_row("SELECT COUNT(*) FROM submission_ledger", [], |row| row.get(0))
                .map(to_count)
                .map_err(failed("entry_count"))
        })
    }
}

impl MediaStore for SqliteStore {
    #[instrument(
        skip(self, record),
        fields(operation = "record", backend = "sqlite", submission_id = %record.submission_id, community = %record.community)
    )]
    fn record(&self, record: &FingerprintRecord) -> Result<bool> {
        self.run("record", |conn| {
            let changed = conn
                .execute(
                    "INSERT INTO fingerprints (hash, submission_id, community, created_at)
                     VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT(submission_id) DO NOTHING",
                    params![
                        record.hash.to_i64(),
                        record.submission_id.as_str(),
                        record.community,
                        record.created_at
                    ],
                )
                .map_err(failed("record_fingerprint"))?;
            Ok(changed == 1)
        })
    }

    #[instrument(skip(self), fields(operation = "get_fingerprint", backend = "sqlite", submission_id = %submission_id))]
    fn get_fingerprint(&self, submission_id: &SubmissionId) -> Result<Option<FingerprintRecord>> {
        self.run("get_fingerprint", |conn| {
            conn.query_row(
                "SELECT rowid, hash, submission_id, community, created_at
                 FROM fingerprints WHERE submission_id = ?1",
                params![submission_id.as_str()],
                record_from_row,
            )
            .optional()
            .map(|row| row.map(|(_, record)| record))
            .map_err(failed("get_fingerprint"))
        })
    }

    #[instrument(skip(self, exclude), fields(operation = "fetch_page", backend = "sqlite"))]
    fn fetch_page(
        &self,
        community: &str,
        exclude: &SubmissionId,
        after: i64,
        limit: usize,
    ) -> Result<Vec<(i64, FingerprintRecord)>> {
        self.run("fetch_page", |conn| {
            let mut stmt = conn
                .prepare_cached(
                    "SELECT rowid, hash, submission_id, community, created_at
                     FROM fingerprints
                     WHERE community = ?1 AND submission_id != ?2 AND rowid > ?3
                     ORDER BY rowid
                     LIMIT ?4",
                )
                .map_err(failed("prepare_fetch_page"))?;
            let limit = i64::try_from(limit).unwrap_or(i64::MAX);
            let rows = stmt
                .query_map(
                    params![community, exclude.as_str(), after, limit],
                    record_from_row,
                )
                .map_err(failed("fetch_page"))?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
                .map_err(failed("read_fingerprint_row"))
        })
    }

    #[instrument(skip(self), fields(operation = "corpus_size", backend = "sqlite"))]
    fn corpus_size(&self, community: &str) -> Result<usize> {
        self.run("corpus_size", |conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM fingerprints WHERE community = ?1",
                params![community],
                |row| row.get(0),
            )
            .map(to_count)
            .map_err(failed("corpus_size"))
        })
    }
}
