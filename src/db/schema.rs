//! Database schema and versioned migrations
//!
//! Every migration is additive. Each one checks for the table or column it
//! introduces before creating it, so a database written by any earlier
//! revision of the board (or a half-populated file) converges on the same
//! shape. Applied versions are recorded in `schema_migrations`.

use rusqlite::{params, Connection, OptionalExtension, Transaction};
use tracing::{info, warn};

use crate::error::BoardError;
use crate::voter_set::VoterSet;

/// Current schema version for migrations
pub const SCHEMA_VERSION: u32 = 6;

/// A single schema step
pub struct Migration {
    pub version: u32,
    pub description: &'static str,
    /// Only creates tables or columns, so it is safe to re-run at every open
    pub structural: bool,
    pub up: fn(&Transaction<'_>) -> Result<(), BoardError>,
}

/// All migrations in order
pub fn migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
            description: "Create feedback table",
            structural: true,
            up: create_feedback_table,
        },
        Migration {
            version: 2,
            description: "Add legacy upvoter_data column",
            structural: true,
            up: add_upvoter_data_column,
        },
        Migration {
            version: 3,
            description: "Add author_id column",
            structural: true,
            up: add_author_id_column,
        },
        Migration {
            version: 4,
            description: "Add voter_ids column",
            structural: true,
            up: add_voter_ids_column,
        },
        Migration {
            version: 5,
            description: "Create identities table",
            structural: true,
            up: create_identities_table,
        },
        Migration {
            version: 6,
            description: "Backfill voter_ids from legacy upvoter_data",
            structural: false,
            up: backfill_voter_ids,
        },
    ]
}

/// Initialize the database schema, applying pending migrations
pub fn init_schema(conn: &mut Connection) -> Result<(), BoardError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        [],
    )
    .map_err(|e| BoardError::db("Failed to create schema_migrations table", e))?;

    let current = current_version(conn)?;
    if current > SCHEMA_VERSION {
        warn!(
            found = current,
            supported = SCHEMA_VERSION,
            "Database schema is newer than this build"
        );
    }

    let mut applied = 0;
    for migration in migrations().into_iter().filter(|m| m.version > current) {
        let tx = conn
            .transaction()
            .map_err(|e| BoardError::db("Failed to start migration", e))?;
        (migration.up)(&tx)?;
        tx.execute(
            "INSERT OR REPLACE INTO schema_migrations (version) VALUES (?)",
            params![migration.version],
        )
        .map_err(|e| BoardError::db("Failed to record migration", e))?;
        tx.commit()
            .map_err(|e| BoardError::db("Failed to commit migration", e))?;

        info!(version = migration.version, "Applied migration: {}", migration.description);
        applied += 1;
    }

    if applied == 0 {
        info!("Database schema is up to date (v{})", current);
    }

    repair_structure(conn)
}

/// Re-run the structural migrations regardless of the recorded version.
///
/// A file can claim a version its tables do not have (hand-edited, copied
/// mid-write, or written by a broken build). If `voter_ids` had to be
/// re-added here, the legacy backfill runs again to populate it.
fn repair_structure(conn: &mut Connection) -> Result<(), BoardError> {
    let tx = conn
        .transaction()
        .map_err(|e| BoardError::db("Failed to start schema repair", e))?;

    let had_voter_ids = column_exists(&tx, "feedback", "voter_ids")?;
    for migration in migrations().into_iter().filter(|m| m.structural) {
        (migration.up)(&tx)?;
    }
    if !had_voter_ids {
        backfill_voter_ids(&tx)?;
    }

    tx.commit()
        .map_err(|e| BoardError::db("Failed to commit schema repair", e))
}

/// Highest applied migration (0 for a fresh or legacy database)
pub fn current_version(conn: &Connection) -> Result<u32, BoardError> {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )
    .map_err(|e| BoardError::db("Failed to read schema version", e))
}

fn table_exists(conn: &Connection, table: &str) -> Result<bool, BoardError> {
    conn.query_row(
        "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ? LIMIT 1",
        params![table],
        |_| Ok(()),
    )
    .optional()
    .map(|found| found.is_some())
    .map_err(|e| BoardError::db("Failed to inspect sqlite_master", e))
}

fn column_exists(conn: &Connection, table: &str, column: &str) -> Result<bool, BoardError> {
    let mut stmt = conn
        .prepare(&format!("PRAGMA table_info({})", table))
        .map_err(|e| BoardError::db("Failed to inspect table", e))?;

    let names = stmt
        .query_map([], |row| row.get::<_, String>(1))
        .map_err(|e| BoardError::db("Failed to inspect table", e))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| BoardError::db("Failed to inspect table", e))?;

    Ok(names.iter().any(|name| name == column))
}

fn add_column(conn: &Connection, table: &str, column: &str, definition: &str) -> Result<(), BoardError> {
    if column_exists(conn, table, column)? {
        return Ok(());
    }
    conn.execute_batch(&format!("ALTER TABLE {} ADD COLUMN {} {}", table, column, definition))
        .map_err(|e| BoardError::db(&format!("Failed to add {}.{}", table, column), e))?;
    info!(table, column, "Added column");
    Ok(())
}

fn create_feedback_table(tx: &Transaction<'_>) -> Result<(), BoardError> {
    tx.execute_batch(FEEDBACK_SCHEMA)
        .map_err(|e| BoardError::db("Failed to create feedback table", e))
}

fn add_upvoter_data_column(tx: &Transaction<'_>) -> Result<(), BoardError> {
    add_column(tx, "feedback", "upvoter_data", "TEXT DEFAULT '[]'")
}

fn add_author_id_column(tx: &Transaction<'_>) -> Result<(), BoardError> {
    add_column(tx, "feedback", "author_id", "TEXT")
}

fn add_voter_ids_column(tx: &Transaction<'_>) -> Result<(), BoardError> {
    add_column(tx, "feedback", "voter_ids", "TEXT NOT NULL DEFAULT '[]'")
}

fn create_identities_table(tx: &Transaction<'_>) -> Result<(), BoardError> {
    if table_exists(tx, "identities")? {
        return Ok(());
    }
    tx.execute_batch(IDENTITIES_SCHEMA)
        .map_err(|e| BoardError::db("Failed to create identities table", e))?;
    info!("Created identities table");
    Ok(())
}

/// Decode legacy upvoter_data into voter_ids where no canonical set exists yet.
/// Unreadable legacy values are left alone.
fn backfill_voter_ids(tx: &Transaction<'_>) -> Result<(), BoardError> {
    let pending: Vec<(i64, Option<String>)> = {
        let mut stmt = tx
            .prepare(
                "SELECT id, upvoter_data FROM feedback
                 WHERE (voter_ids IS NULL OR TRIM(voter_ids) IN ('', '[]'))
                   AND upvoter_data IS NOT NULL AND TRIM(upvoter_data) NOT IN ('', '[]')",
            )
            .map_err(|e| BoardError::db("Failed to prepare backfill", e))?;
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
            .map_err(|e| BoardError::db("Failed to query backfill rows", e))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| BoardError::db("Failed to read backfill rows", e))?;
        rows
    };

    for (id, raw) in pending {
        let legacy = match VoterSet::decode_legacy(raw.as_deref()) {
            Ok(legacy) => legacy,
            Err(e) => {
                warn!(id, error = %e, "Skipping unreadable legacy voter data");
                continue;
            }
        };

        tx.execute(
            "UPDATE feedback SET voter_ids = ?, votes = ? WHERE id = ?",
            params![legacy.voters.encode(), legacy.voters.len() as i64, id],
        )
        .map_err(|e| BoardError::db("Failed to backfill voter_ids", e))?;

        for (voter_id, name) in &legacy.names {
            super::identities::upsert(tx, voter_id, name)?;
        }
    }

    Ok(())
}

/// Feedback table as first shipped; later columns arrive through migrations
const FEEDBACK_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS feedback (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    question TEXT NOT NULL,
    description TEXT,
    name TEXT NOT NULL,
    votes INTEGER DEFAULT 0,
    timestamp DATETIME DEFAULT CURRENT_TIMESTAMP
);
"#;

/// Voter display names. One row per (voter, name) ever seen; the row with
/// the highest seen_seq is the current name.
const IDENTITIES_SCHEMA: &str = r#"
CREATE TABLE identities (
    voter_id TEXT NOT NULL,
    name TEXT NOT NULL,
    seen_seq INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (voter_id, name)
);

CREATE INDEX IF NOT EXISTS idx_identities_latest ON identities(voter_id, seen_seq);
"#;
