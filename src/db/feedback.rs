//! Feedback CRUD operations
//!
//! Rows are returned exactly as stored. Decoding the voter column and
//! deriving the vote count happens one layer up.

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::BoardError;
use crate::voter_set::VoterSet;

const SELECT_COLUMNS: &str =
    "SELECT id, question, description, name, votes, timestamp, author_id, voter_ids, upvoter_data FROM feedback";

/// Feedback row from database
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeedbackRow {
    pub id: i64,
    pub question: String,
    pub description: Option<String>,
    pub name: String,
    pub votes: i64,
    pub timestamp: Option<String>,
    pub author_id: Option<String>,
    /// Raw voter column (canonical JSON array when written by this crate)
    pub voter_ids: Option<String>,
    /// Legacy voter column, kept as older revisions wrote it
    pub upvoter_data: Option<String>,
}

impl FeedbackRow {
    fn from_row(row: &Row) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get(0)?,
            question: row.get(1)?,
            description: row.get(2)?,
            name: row.get(3)?,
            votes: row.get::<_, Option<i64>>(4)?.unwrap_or(0),
            timestamp: row.get(5)?,
            author_id: row.get(6)?,
            voter_ids: row.get(7)?,
            upvoter_data: row.get(8)?,
        })
    }
}

/// Input for inserting a feedback row
#[derive(Debug, Clone)]
pub struct NewFeedback {
    pub question: String,
    pub description: Option<String>,
    pub name: String,
    pub author_id: String,
    pub voters: VoterSet,
    pub created_at: String,
}

/// Insert a row, returning its id
pub fn insert_feedback(conn: &Connection, input: &NewFeedback) -> Result<i64, BoardError> {
    conn.execute(
        "INSERT INTO feedback (question, description, name, votes, timestamp, author_id, voter_ids)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
        params![
            input.question,
            input.description,
            input.name,
            input.voters.len() as i64,
            input.created_at,
            input.author_id,
            input.voters.encode(),
        ],
    )
    .map_err(|e| BoardError::db("Failed to insert feedback", e))?;

    Ok(conn.last_insert_rowid())
}

/// Get a row by id
pub fn get_feedback(conn: &Connection, id: i64) -> Result<Option<FeedbackRow>, BoardError> {
    conn.query_row(
        &format!("{} WHERE id = ?", SELECT_COLUMNS),
        params![id],
        FeedbackRow::from_row,
    )
    .optional()
    .map_err(|e| BoardError::db("Failed to get feedback", e))
}

/// Overwrite the author-editable fields. Returns false if the row is gone.
pub fn update_content(
    conn: &Connection,
    id: i64,
    question: &str,
    description: Option<&str>,
    name: &str,
) -> Result<bool, BoardError> {
    let rows = conn
        .execute(
            "UPDATE feedback SET question = ?, description = ?, name = ? WHERE id = ?",
            params![question, description, name, id],
        )
        .map_err(|e| BoardError::db("Failed to update feedback", e))?;

    Ok(rows > 0)
}

/// Store a voter set and its count in one statement
pub fn update_voters(conn: &Connection, id: i64, voters: &VoterSet) -> Result<bool, BoardError> {
    let rows = conn
        .execute(
            "UPDATE feedback SET voter_ids = ?, votes = ? WHERE id = ?",
            params![voters.encode(), voters.len() as i64, id],
        )
        .map_err(|e| BoardError::db("Failed to update voters", e))?;

    Ok(rows > 0)
}

/// All rows, newest first. Rows that cannot be read are logged and skipped.
pub fn list_recent(conn: &Connection) -> Result<Vec<FeedbackRow>, BoardError> {
    query_rows(conn, &format!("{} ORDER BY timestamp DESC, id DESC", SELECT_COLUMNS))
}

/// All rows by id, for export
pub fn list_all(conn: &Connection) -> Result<Vec<FeedbackRow>, BoardError> {
    query_rows(conn, &format!("{} ORDER BY id ASC", SELECT_COLUMNS))
}

/// Number of feedback rows
pub fn count_feedback(conn: &Connection) -> Result<u64, BoardError> {
    conn.query_row("SELECT COUNT(*) FROM feedback", [], |row| row.get::<_, i64>(0))
        .map(|n| n as u64)
        .map_err(|e| BoardError::db("Query failed", e))
}

fn query_rows(conn: &Connection, sql: &str) -> Result<Vec<FeedbackRow>, BoardError> {
    debug!("Executing query: {}", sql);

    let mut stmt = conn
        .prepare(sql)
        .map_err(|e| BoardError::db("Prepare failed", e))?;

    let rows = stmt
        .query_map([], FeedbackRow::from_row)
        .map_err(|e| BoardError::db("Query failed", e))?;

    let mut results = Vec::new();
    for row in rows {
        match row {
            Ok(row) => results.push(row),
            Err(e) => warn!(error = %e, "Skipping unreadable feedback row"),
        }
    }

    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema::init_schema;

    fn conn() -> Connection {
        let mut conn = Connection::open_in_memory().unwrap();
        init_schema(&mut conn).unwrap();
        conn
    }

    fn new_feedback(question: &str, created_at: &str) -> NewFeedback {
        NewFeedback {
            question: question.to_string(),
            description: None,
            name: "Alice".to_string(),
            author_id: "a1".to_string(),
            voters: VoterSet::from_ids(["a1"]),
            created_at: created_at.to_string(),
        }
    }

    #[test]
    fn test_insert_and_get() {
        let conn = conn();
        let id = insert_feedback(&conn, &new_feedback("Q?", "2024-05-01 10:00:00.000")).unwrap();

        let row = get_feedback(&conn, id).unwrap().unwrap();
        assert_eq!(row.question, "Q?");
        assert_eq!(row.votes, 1);
        assert_eq!(row.author_id.as_deref(), Some("a1"));
        assert_eq!(row.voter_ids.as_deref(), Some(r#"["a1"]"#));
        assert_eq!(row.upvoter_data.as_deref(), Some("[]"));
        assert!(get_feedback(&conn, id + 1).unwrap().is_none());
    }

    #[test]
    fn test_update_voters_keeps_count_in_step() {
        let conn = conn();
        let id = insert_feedback(&conn, &new_feedback("Q?", "2024-05-01 10:00:00.000")).unwrap();

        let voters = VoterSet::from_ids(["a1", "b1", "c1"]);
        assert!(update_voters(&conn, id, &voters).unwrap());

        let row = get_feedback(&conn, id).unwrap().unwrap();
        assert_eq!(row.votes, 3);
        assert!(!update_voters(&conn, 999, &voters).unwrap());
    }

    #[test]
    fn test_list_recent_order() {
        let conn = conn();
        insert_feedback(&conn, &new_feedback("old", "2024-05-01 10:00:00.000")).unwrap();
        insert_feedback(&conn, &new_feedback("new", "2024-05-02 10:00:00.000")).unwrap();
        insert_feedback(&conn, &new_feedback("same-time", "2024-05-02 10:00:00.000")).unwrap();

        let rows = list_recent(&conn).unwrap();
        let questions: Vec<_> = rows.iter().map(|r| r.question.as_str()).collect();
        assert_eq!(questions, vec!["same-time", "new", "old"]);

        let all = list_all(&conn).unwrap();
        assert_eq!(all[0].question, "old");
        assert_eq!(count_feedback(&conn).unwrap(), 3);
    }

    #[test]
    fn test_unreadable_row_is_skipped() {
        let conn = conn();
        insert_feedback(&conn, &new_feedback("fine", "2024-05-01 10:00:00.000")).unwrap();
        // A blob where text is expected cannot be read as a String
        conn.execute(
            "INSERT INTO feedback (question, name, timestamp) VALUES (X'00FF', 'Bob', '2024-05-03')",
            [],
        )
        .unwrap();

        let rows = list_recent(&conn).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].question, "fine");
    }
}
