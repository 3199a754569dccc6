//! SQLite database module for the feedback board
//!
//! ## Tables
//!
//! - `feedback` - Submitted questions with their voter set and derived count
//! - `identities` - Voter id to display name history
//! - `schema_migrations` - Applied schema versions
//!
//! A single connection sits behind a mutex. Every write goes through it, so
//! two votes on the same row can never interleave their read-modify-write.

pub mod feedback;
pub mod identities;
pub mod schema;

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, Connection, Transaction, TransactionBehavior};
use serde::Serialize;
use tracing::{debug, info};

use crate::error::BoardError;

/// First 16 bytes of every SQLite database file
const SQLITE_HEADER: &[u8] = b"SQLite format 3\0";

/// SQLite database for feedback and identities
pub struct BoardDb {
    conn: Mutex<Connection>,
}

impl BoardDb {
    /// Open or create the database file
    pub fn open(db_path: &Path) -> Result<Self, BoardError> {
        info!("Opening SQLite database at {:?}", db_path);

        let conn = Connection::open(db_path)
            .map_err(|e| BoardError::db("Failed to open SQLite", e))?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(|e| BoardError::db("Failed to set PRAGMA", e))?;

        Self::with_schema(conn)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self, BoardError> {
        debug!("Opening in-memory SQLite database");

        let conn = Connection::open_in_memory()
            .map_err(|e| BoardError::db("Failed to open in-memory SQLite", e))?;

        Self::with_schema(conn)
    }

    fn with_schema(mut conn: Connection) -> Result<Self, BoardError> {
        schema::init_schema(&mut conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, BoardError> {
        self.conn
            .lock()
            .map_err(|e| BoardError::Persistence(format!("Lock poisoned: {}", e)))
    }

    /// Run a read against the connection
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, BoardError>
    where
        F: FnOnce(&Connection) -> Result<T, BoardError>,
    {
        let conn = self.lock()?;
        f(&conn)
    }

    /// Run `f` inside an IMMEDIATE transaction. Any error rolls back.
    pub fn with_transaction<F, T>(&self, f: F) -> Result<T, BoardError>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T, BoardError>,
    {
        let mut conn = self.lock()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| BoardError::db("Failed to start transaction", e))?;

        let value = f(&tx)?;

        tx.commit()
            .map_err(|e| BoardError::db("Failed to commit transaction", e))?;
        Ok(value)
    }

    /// Get database statistics
    pub fn stats(&self) -> Result<DbStats, BoardError> {
        self.with_conn(|conn| {
            Ok(DbStats {
                feedback_count: feedback::count_feedback(conn)?,
                voter_count: identities::count_voters(conn)?,
                schema_version: schema::current_version(conn)?,
            })
        })
    }

    /// Serialize the whole database into the bytes of a standalone SQLite file
    pub fn export_snapshot(&self) -> Result<Vec<u8>, BoardError> {
        let staging = tempfile::tempdir()?;
        let path = staging.path().join("snapshot.db");
        let target = path.to_string_lossy().to_string();

        self.with_conn(|conn| {
            conn.execute("VACUUM INTO ?", params![target])
                .map_err(|e| BoardError::db("Failed to write snapshot", e))?;
            Ok(())
        })?;

        let bytes = std::fs::read(&path)?;
        info!(bytes = bytes.len(), "Exported database snapshot");
        Ok(bytes)
    }

    /// Replace all feedback and identities with the contents of a snapshot.
    ///
    /// The snapshot is brought up to the current schema before its rows are
    /// copied, so files from older revisions import cleanly. On any error
    /// the current data is left as it was.
    pub fn import_snapshot(&self, bytes: &[u8]) -> Result<DbStats, BoardError> {
        if !bytes.starts_with(SQLITE_HEADER) {
            return Err(BoardError::Validation(
                "Uploaded file is not a SQLite database".to_string(),
            ));
        }

        let staging = tempfile::tempdir()?;
        let path = staging.path().join("incoming.db");
        std::fs::write(&path, bytes)?;

        {
            let mut incoming = Connection::open(&path)
                .map_err(|e| BoardError::db("Failed to open snapshot", e))?;
            schema::init_schema(&mut incoming)?;
        }

        let mut conn = self.lock()?;
        conn.execute(
            "ATTACH DATABASE ? AS incoming",
            params![path.to_string_lossy().to_string()],
        )
        .map_err(|e| BoardError::db("Failed to attach snapshot", e))?;

        let copied = copy_from_incoming(&mut conn);

        conn.execute("DETACH DATABASE incoming", [])
            .map_err(|e| BoardError::db("Failed to detach snapshot", e))?;

        let stats = copied?;
        info!(
            feedback = stats.feedback_count,
            voters = stats.voter_count,
            "Imported database snapshot"
        );
        Ok(stats)
    }
}

fn copy_from_incoming(conn: &mut Connection) -> Result<DbStats, BoardError> {
    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(|e| BoardError::db("Failed to start import transaction", e))?;

    tx.execute_batch(
        "DELETE FROM main.feedback;
         DELETE FROM main.identities;
         INSERT INTO main.feedback
             (id, question, description, name, votes, timestamp, upvoter_data, author_id, voter_ids)
         SELECT id, question, description, name, votes, timestamp, upvoter_data, author_id, voter_ids
         FROM incoming.feedback;
         INSERT INTO main.identities (voter_id, name, seen_seq)
         SELECT voter_id, name, seen_seq FROM incoming.identities;",
    )
    .map_err(|e| BoardError::db("Failed to copy snapshot rows", e))?;

    let stats = DbStats {
        feedback_count: feedback::count_feedback(&tx)?,
        voter_count: identities::count_voters(&tx)?,
        schema_version: schema::current_version(&tx)?,
    };

    tx.commit()
        .map_err(|e| BoardError::db("Failed to commit import", e))?;
    Ok(stats)
}

/// Database statistics
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DbStats {
    pub feedback_count: u64,
    pub voter_count: u64,
    pub schema_version: u32,
}

// Re-exports
pub use feedback::{FeedbackRow, NewFeedback};
pub use identities::IdentityRow;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_in_memory() {
        let db = BoardDb::open_in_memory().unwrap();
        let stats = db.stats().unwrap();
        assert_eq!(stats.feedback_count, 0);
        assert_eq!(stats.schema_version, schema::SCHEMA_VERSION);
    }

    #[test]
    fn test_transaction_rolls_back_on_error() {
        let db = BoardDb::open_in_memory().unwrap();
        let result: Result<(), BoardError> = db.with_transaction(|tx| {
            identities::upsert(tx, "a1", "Alice")?;
            Err(BoardError::Validation("abort".into()))
        });
        assert!(result.is_err());
        assert_eq!(db.stats().unwrap().voter_count, 0);
    }

    #[test]
    fn test_import_rejects_non_sqlite() {
        let db = BoardDb::open_in_memory().unwrap();
        let err = db.import_snapshot(b"id,question\n1,hi\n").unwrap_err();
        assert!(matches!(err, BoardError::Validation(_)));
    }

    #[test]
    fn test_snapshot_roundtrip_in_memory() {
        let source = BoardDb::open_in_memory().unwrap();
        source
            .with_conn(|conn| identities::upsert(conn, "a1", "Alice"))
            .unwrap();
        let bytes = source.export_snapshot().unwrap();
        assert!(bytes.starts_with(SQLITE_HEADER));

        let target = BoardDb::open_in_memory().unwrap();
        target
            .with_conn(|conn| identities::upsert(conn, "zz", "Zed"))
            .unwrap();
        let stats = target.import_snapshot(&bytes).unwrap();

        assert_eq!(stats.voter_count, 1);
        let name = target
            .with_conn(|conn| identities::get_current(conn, "a1"))
            .unwrap()
            .unwrap()
            .name;
        assert_eq!(name, "Alice");
        assert!(target
            .with_conn(|conn| identities::get_current(conn, "zz"))
            .unwrap()
            .is_none());
    }
}
