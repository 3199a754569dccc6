//! Feedback ledger - creating, editing and listing feedback items
//!
//! The ledger never writes `voter_ids` or `votes` after creation; that is
//! the vote reconciler's job.

use std::sync::Arc;

use serde::Deserialize;
use tracing::warn;

use crate::db::{feedback, identities, BoardDb, FeedbackRow, NewFeedback};
use crate::error::BoardError;
use crate::models::{FeedbackItem, ListOrder};
use crate::voter_set::VoterSet;

use super::events::{BoardEvent, EventBus};

/// Input for submitting feedback
#[derive(Debug, Clone, Deserialize)]
pub struct CreateFeedbackInput {
    pub question: String,
    #[serde(default)]
    pub description: Option<String>,
    pub name: String,
    #[serde(alias = "upvoter_id", alias = "browser_id")]
    pub voter_id: String,
}

/// Input for editing feedback. `voter_id` must match the item's author.
#[derive(Debug, Clone, Deserialize)]
pub struct EditFeedbackInput {
    pub question: String,
    #[serde(default)]
    pub description: Option<String>,
    pub name: String,
    #[serde(alias = "upvoter_id", alias = "browser_id")]
    pub voter_id: String,
}

/// Feedback ledger service
pub struct FeedbackLedger {
    db: Arc<BoardDb>,
    events: Arc<EventBus>,
}

impl FeedbackLedger {
    pub fn new(db: Arc<BoardDb>, events: Arc<EventBus>) -> Self {
        Self { db, events }
    }

    /// Submit feedback. The author is counted as its first voter.
    pub fn create(&self, input: CreateFeedbackInput) -> Result<FeedbackItem, BoardError> {
        self.create_at(input, &now_timestamp())
    }

    /// Submit feedback with an explicit creation time
    pub fn create_at(&self, input: CreateFeedbackInput, created_at: &str) -> Result<FeedbackItem, BoardError> {
        let question = required("question", &input.question)?;
        let name = required("name", &input.name)?;
        let author_id = required("voter_id", &input.voter_id)?;

        let new = NewFeedback {
            question: question.to_string(),
            description: optional_text(input.description.as_deref()),
            name: name.to_string(),
            author_id: author_id.to_string(),
            voters: VoterSet::from_ids([author_id]),
            created_at: created_at.to_string(),
        };

        let (row, renamed) = self.db.with_transaction(|tx| {
            let id = feedback::insert_feedback(tx, &new)?;
            let renamed = identities::upsert(tx, author_id, name)?;
            let row = feedback::get_feedback(tx, id)?
                .ok_or_else(|| BoardError::Persistence("Failed to retrieve created feedback".into()))?;
            Ok((row, renamed))
        })?;

        self.events.emit(BoardEvent::FeedbackCreated {
            id: row.id,
            author_id: new.author_id.clone(),
        });
        if renamed {
            self.events.emit(BoardEvent::IdentityRecorded {
                voter_id: new.author_id.clone(),
                name: new.name.clone(),
            });
        }
        Ok(to_item(row))
    }

    /// Edit question, description and name. Only the author may edit.
    pub fn edit(&self, id: i64, input: EditFeedbackInput) -> Result<FeedbackItem, BoardError> {
        let row = self.db.with_transaction(|tx| {
            let row = feedback::get_feedback(tx, id)?
                .ok_or_else(|| BoardError::NotFound(format!("Feedback {} not found", id)))?;

            let requester = input.voter_id.trim();
            if requester.is_empty() || row.author_id.as_deref() != Some(requester) {
                return Err(BoardError::Forbidden(format!(
                    "Only the author may edit feedback {}",
                    id
                )));
            }

            let question = required("question", &input.question)?;
            let name = required("name", &input.name)?;
            let description = optional_text(input.description.as_deref());

            feedback::update_content(tx, id, question, description.as_deref(), name)?;
            feedback::get_feedback(tx, id)?
                .ok_or_else(|| BoardError::NotFound(format!("Feedback {} not found", id)))
        })?;

        self.events.emit(BoardEvent::FeedbackEdited { id });
        Ok(to_item(row))
    }

    /// Get a single item
    pub fn get(&self, id: i64) -> Result<FeedbackItem, BoardError> {
        self.db
            .with_conn(|conn| feedback::get_feedback(conn, id))?
            .map(to_item)
            .ok_or_else(|| BoardError::NotFound(format!("Feedback {} not found", id)))
    }

    /// Snapshot of all items in the requested order
    pub fn list(&self, order: ListOrder) -> Result<Vec<FeedbackItem>, BoardError> {
        let rows = self.db.with_conn(feedback::list_recent)?;
        let mut items: Vec<FeedbackItem> = rows.into_iter().map(to_item).collect();

        if order == ListOrder::Votes {
            // Stable sort keeps the recency order within equal counts
            items.sort_by(|a, b| b.vote_count.cmp(&a.vote_count));
        }
        Ok(items)
    }

    /// Every stored row exactly as persisted, by id
    pub fn export_all(&self) -> Result<Vec<FeedbackRow>, BoardError> {
        self.db.with_conn(feedback::list_all)
    }
}

/// Decode a row's voter column. Corrupt data is logged and read as empty.
pub(crate) fn decode_voters(row: &FeedbackRow) -> VoterSet {
    match VoterSet::decode(row.voter_ids.as_deref()) {
        Ok(voters) => voters,
        Err(e) => {
            warn!(id = row.id, error = %e, "Unreadable voter set, treating as empty");
            VoterSet::new()
        }
    }
}

pub(crate) fn to_item(row: FeedbackRow) -> FeedbackItem {
    let voters = decode_voters(&row);
    item_with_voters(row, voters)
}

pub(crate) fn item_with_voters(row: FeedbackRow, voters: VoterSet) -> FeedbackItem {
    FeedbackItem {
        id: row.id,
        question: row.question,
        description: row.description,
        author_name: row.name,
        author_id: row.author_id,
        created_at: row.timestamp.unwrap_or_default(),
        vote_count: voters.len(),
        voter_ids: voters,
    }
}

fn required<'a>(field: &str, value: &'a str) -> Result<&'a str, BoardError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(BoardError::Validation(format!("{} is required", field)));
    }
    Ok(value)
}

fn optional_text(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// UTC timestamp in the same sortable form SQLite's CURRENT_TIMESTAMP uses
pub(crate) fn now_timestamp() -> String {
    chrono::Utc::now().format("%Y-%m-%d %H:%M:%S%.3f").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger() -> (FeedbackLedger, Arc<BoardDb>) {
        let db = Arc::new(BoardDb::open_in_memory().unwrap());
        (FeedbackLedger::new(db.clone(), Arc::new(EventBus::new())), db)
    }

    fn input(question: &str, name: &str, voter_id: &str) -> CreateFeedbackInput {
        CreateFeedbackInput {
            question: question.to_string(),
            description: None,
            name: name.to_string(),
            voter_id: voter_id.to_string(),
        }
    }

    fn edit(question: &str, voter_id: &str) -> EditFeedbackInput {
        EditFeedbackInput {
            question: question.to_string(),
            description: Some("more detail".to_string()),
            name: "Alice".to_string(),
            voter_id: voter_id.to_string(),
        }
    }

    #[test]
    fn test_create_auto_upvotes_author() {
        let (ledger, db) = ledger();
        let item = ledger.create(input("Add dark mode?", "Alice", "A1")).unwrap();

        assert_eq!(item.vote_count, 1);
        assert_eq!(item.voter_ids.as_slice(), &["A1"]);
        assert_eq!(item.author_name, "Alice");
        assert!(item.description.is_none());

        let author = db.with_conn(|c| identities::get_current(c, "A1")).unwrap().unwrap();
        assert_eq!(author.name, "Alice");
    }

    #[test]
    fn test_create_requires_question_and_name() {
        let (ledger, db) = ledger();
        assert!(matches!(
            ledger.create(input("   ", "Alice", "A1")),
            Err(BoardError::Validation(_))
        ));
        assert!(matches!(
            ledger.create(input("Q?", "", "A1")),
            Err(BoardError::Validation(_))
        ));
        assert_eq!(db.stats().unwrap().feedback_count, 0);
    }

    #[test]
    fn test_edit_by_author() {
        let (ledger, _db) = ledger();
        let item = ledger.create(input("Q?", "Alice", "A1")).unwrap();

        let edited = ledger.edit(item.id, edit("Better question?", "A1")).unwrap();
        assert_eq!(edited.question, "Better question?");
        assert_eq!(edited.description.as_deref(), Some("more detail"));
        assert_eq!(edited.voter_ids, item.voter_ids);
        assert_eq!(edited.created_at, item.created_at);
    }

    #[test]
    fn test_edit_by_other_voter_is_forbidden() {
        let (ledger, _db) = ledger();
        let item = ledger.create(input("Q?", "Alice", "A1")).unwrap();

        let err = ledger.edit(item.id, edit("Hijacked", "B1")).unwrap_err();
        assert!(matches!(err, BoardError::Forbidden(_)));

        let unchanged = ledger.get(item.id).unwrap();
        assert_eq!(unchanged.question, "Q?");
        assert_eq!(unchanged.author_name, "Alice");
        assert!(unchanged.description.is_none());
    }

    #[test]
    fn test_edit_missing_item() {
        let (ledger, _db) = ledger();
        assert!(matches!(ledger.edit(42, edit("Q", "A1")), Err(BoardError::NotFound(_))));
    }

    #[test]
    fn test_edit_validation_leaves_item() {
        let (ledger, _db) = ledger();
        let item = ledger.create(input("Q?", "Alice", "A1")).unwrap();
        assert!(matches!(ledger.edit(item.id, edit("", "A1")), Err(BoardError::Validation(_))));
        assert_eq!(ledger.get(item.id).unwrap().question, "Q?");
    }

    #[test]
    fn test_list_recent_order() {
        let (ledger, _db) = ledger();
        ledger.create_at(input("first", "A", "a"), "2024-01-01 09:00:00.000").unwrap();
        ledger.create_at(input("second", "B", "b"), "2024-01-02 09:00:00.000").unwrap();

        let items = ledger.list(ListOrder::Recent).unwrap();
        assert_eq!(items[0].question, "second");
        assert_eq!(items[1].question, "first");
    }

    #[test]
    fn test_corrupt_voter_set_reads_as_empty() {
        let (ledger, db) = ledger();
        let item = ledger.create(input("Q?", "Alice", "A1")).unwrap();
        db.with_conn(|c| {
            c.execute("UPDATE feedback SET voter_ids = 'A1,B1' WHERE id = ?", [item.id])
                .map_err(|e| BoardError::db("test", e))
        })
        .unwrap();

        let items = ledger.list(ListOrder::Votes).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].vote_count, 0);
        assert!(items[0].voter_ids.is_empty());

        // Export still shows exactly what is stored
        let rows = ledger.export_all().unwrap();
        assert_eq!(rows[0].voter_ids.as_deref(), Some("A1,B1"));
        assert_eq!(rows[0].votes, 1);
    }

    #[test]
    fn test_create_reports_author_identity() {
        let db = Arc::new(BoardDb::open_in_memory().unwrap());
        let events = Arc::new(EventBus::new());
        let ledger = FeedbackLedger::new(db, events.clone());
        let mut rx = events.subscribe();

        ledger.create(input("First", "Alice", "A1")).unwrap();
        ledger.create(input("Second", "Alice", "A1")).unwrap();

        let recorded = std::iter::from_fn(|| rx.try_recv().ok())
            .filter(|event| matches!(event, BoardEvent::IdentityRecorded { .. }))
            .count();
        assert_eq!(recorded, 1);
    }
}
