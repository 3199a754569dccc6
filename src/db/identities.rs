//! Voter identity rows
//!
//! Maps client-generated voter ids to display names. Every (voter, name)
//! pair ever seen is kept; the most recently seen one is canonical.

use std::collections::HashMap;

use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

use crate::error::BoardError;

/// Current identity row for a voter
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdentityRow {
    pub voter_id: String,
    pub name: String,
    pub seen_seq: i64,
}

/// Record that `voter_id` goes by `name`.
///
/// Re-recording the pair that is already current changes nothing
/// observable; recording an older name makes it current again.
/// Returns true when the current name changed.
pub fn upsert(conn: &Connection, voter_id: &str, name: &str) -> Result<bool, BoardError> {
    if let Some(current) = get_current(conn, voter_id)? {
        if current.name == name {
            return Ok(false);
        }
    }

    conn.execute(
        "INSERT INTO identities (voter_id, name, seen_seq)
         VALUES (?1, ?2, (SELECT COALESCE(MAX(seen_seq), 0) + 1 FROM identities))
         ON CONFLICT(voter_id, name) DO UPDATE SET seen_seq = excluded.seen_seq",
        params![voter_id, name],
    )
    .map_err(|e| BoardError::db("Failed to upsert identity", e))?;

    Ok(true)
}

/// Current name for a voter, if any
pub fn get_current(conn: &Connection, voter_id: &str) -> Result<Option<IdentityRow>, BoardError> {
    conn.query_row(
        "SELECT voter_id, name, seen_seq FROM identities
         WHERE voter_id = ? ORDER BY seen_seq DESC LIMIT 1",
        params![voter_id],
        |row| {
            Ok(IdentityRow {
                voter_id: row.get(0)?,
                name: row.get(1)?,
                seen_seq: row.get(2)?,
            })
        },
    )
    .optional()
    .map_err(|e| BoardError::db("Failed to get identity", e))
}

/// Every name a voter has used, newest first
pub fn name_history(conn: &Connection, voter_id: &str) -> Result<Vec<String>, BoardError> {
    let mut stmt = conn
        .prepare("SELECT name FROM identities WHERE voter_id = ? ORDER BY seen_seq DESC")
        .map_err(|e| BoardError::db("Prepare failed", e))?;

    let names = stmt
        .query_map(params![voter_id], |row| row.get(0))
        .map_err(|e| BoardError::db("Query failed", e))?
        .collect::<Result<Vec<String>, _>>()
        .map_err(|e| BoardError::db("Row parse failed", e))?;

    Ok(names)
}

/// Current names for the given voters. Unknown voters are absent from the map.
pub fn current_names<'a, I>(conn: &Connection, voter_ids: I) -> Result<HashMap<String, String>, BoardError>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut stmt = conn
        .prepare_cached(
            "SELECT name FROM identities WHERE voter_id = ? ORDER BY seen_seq DESC LIMIT 1",
        )
        .map_err(|e| BoardError::db("Prepare failed", e))?;

    let mut names = HashMap::new();
    for voter_id in voter_ids {
        if names.contains_key(voter_id) {
            continue;
        }
        let name: Option<String> = stmt
            .query_row(params![voter_id], |row| row.get(0))
            .optional()
            .map_err(|e| BoardError::db("Failed to resolve name", e))?;
        if let Some(name) = name {
            names.insert(voter_id.to_string(), name);
        }
    }

    Ok(names)
}

/// Number of distinct voters with a recorded name
pub fn count_voters(conn: &Connection) -> Result<u64, BoardError> {
    conn.query_row("SELECT COUNT(DISTINCT voter_id) FROM identities", [], |row| row.get::<_, i64>(0))
        .map(|n| n as u64)
        .map_err(|e| BoardError::db("Query failed", e))
}
