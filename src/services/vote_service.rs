//! Vote reconciler - the only writer of a feedback row's voters
//!
//! Each vote is a read-modify-write of the voter set inside one IMMEDIATE
//! transaction. The set and its count are written by a single UPDATE, so no
//! reader can see one without the other.

use std::sync::Arc;

use crate::db::{feedback, identities, BoardDb};
use crate::error::BoardError;
use crate::models::{Direction, VoteOutcome};

use super::events::{BoardEvent, EventBus};
use super::ledger_service::{decode_voters, item_with_voters};

/// Vote reconciler service
pub struct VoteReconciler {
    db: Arc<BoardDb>,
    events: Arc<EventBus>,
}

impl VoteReconciler {
    pub fn new(db: Arc<BoardDb>, events: Arc<EventBus>) -> Self {
        Self { db, events }
    }

    /// Apply an up or down vote.
    ///
    /// Up adds the voter if absent; Down removes the voter if present.
    /// Anything else is a no-op, reported through `VoteOutcome::changed`.
    /// A non-empty `voter_name` is recorded as the voter's display name.
    pub fn apply_vote(
        &self,
        feedback_id: i64,
        voter_id: &str,
        voter_name: &str,
        direction: Direction,
    ) -> Result<VoteOutcome, BoardError> {
        let voter_id = voter_id.trim();
        if voter_id.is_empty() {
            return Err(BoardError::Validation("voter_id is required".into()));
        }
        let voter_name = voter_name.trim();

        let (outcome, renamed) = self.db.with_transaction(|tx| {
            let row = feedback::get_feedback(tx, feedback_id)?
                .ok_or_else(|| BoardError::NotFound(format!("Feedback {} not found", feedback_id)))?;

            let mut voters = decode_voters(&row);
            let changed = match direction {
                Direction::Up => voters.insert(voter_id),
                Direction::Down => voters.remove(voter_id),
            };

            if changed {
                feedback::update_voters(tx, feedback_id, &voters)?;
            }
            let renamed = !voter_name.is_empty() && identities::upsert(tx, voter_id, voter_name)?;

            let outcome = VoteOutcome {
                item: item_with_voters(row, voters),
                changed,
            };
            Ok((outcome, renamed))
        })?;

        if renamed {
            self.events.emit(BoardEvent::IdentityRecorded {
                voter_id: voter_id.to_string(),
                name: voter_name.to_string(),
            });
        }

        self.events.emit(BoardEvent::VoteApplied {
            feedback_id,
            voter_id: voter_id.to_string(),
            direction,
            changed: outcome.changed,
            vote_count: outcome.item.vote_count,
        });
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::ledger_service::{CreateFeedbackInput, FeedbackLedger};
    use crate::services::IdentityStore;

    struct Fixture {
        ledger: FeedbackLedger,
        votes: VoteReconciler,
        identities: IdentityStore,
        events: Arc<EventBus>,
    }

    fn fixture() -> Fixture {
        let db = Arc::new(BoardDb::open_in_memory().unwrap());
        let events = Arc::new(EventBus::new());
        Fixture {
            ledger: FeedbackLedger::new(db.clone(), events.clone()),
            votes: VoteReconciler::new(db.clone(), events.clone()),
            identities: IdentityStore::new(db, events.clone()),
            events,
        }
    }

    fn submit(fx: &Fixture) -> i64 {
        fx.ledger
            .create(CreateFeedbackInput {
                question: "Add dark mode?".into(),
                description: Some(String::new()),
                name: "Alice".into(),
                voter_id: "A1".into(),
            })
            .unwrap()
            .id
    }

    #[test]
    fn test_vote_scenario() {
        let fx = fixture();
        let id = submit(&fx);

        let up = fx.votes.apply_vote(id, "B1", "Bob", Direction::Up).unwrap();
        assert!(up.changed);
        assert_eq!(up.item.vote_count, 2);
        assert_eq!(up.item.voter_ids.as_slice(), &["A1", "B1"]);

        let down = fx.votes.apply_vote(id, "A1", "Alice", Direction::Down).unwrap();
        assert_eq!(down.item.vote_count, 1);
        assert_eq!(down.item.voter_ids.as_slice(), &["B1"]);

        let stored = fx.ledger.get(id).unwrap();
        assert_eq!(stored.voter_ids, down.item.voter_ids);
        assert_eq!(fx.identities.display_name("B1").unwrap(), "Bob");
    }

    #[test]
    fn test_repeat_upvote_is_idempotent() {
        let fx = fixture();
        let id = submit(&fx);

        let once = fx.votes.apply_vote(id, "B1", "Bob", Direction::Up).unwrap();
        let twice = fx.votes.apply_vote(id, "B1", "Bob", Direction::Up).unwrap();

        assert!(!twice.changed);
        assert_eq!(once.item, twice.item);
        assert_eq!(fx.ledger.get(id).unwrap().vote_count, 2);
    }

    #[test]
    fn test_down_after_up_restores_state() {
        let fx = fixture();
        let id = submit(&fx);
        let before = fx.ledger.get(id).unwrap();

        fx.votes.apply_vote(id, "C1", "Carol", Direction::Up).unwrap();
        fx.votes.apply_vote(id, "C1", "Carol", Direction::Down).unwrap();

        let after = fx.ledger.get(id).unwrap();
        assert_eq!(before.voter_ids, after.voter_ids);
        assert_eq!(before.vote_count, after.vote_count);
    }

    #[test]
    fn test_down_without_up_is_noop() {
        let fx = fixture();
        let id = submit(&fx);

        let outcome = fx.votes.apply_vote(id, "Z9", "Zed", Direction::Down).unwrap();
        assert!(!outcome.changed);
        assert_eq!(outcome.item.voter_ids.as_slice(), &["A1"]);

        let again = fx.votes.apply_vote(id, "Z9", "Zed", Direction::Down).unwrap();
        assert!(!again.changed);
        assert_eq!(again.item.vote_count, 1);
    }

    #[test]
    fn test_vote_on_missing_item() {
        let fx = fixture();
        let err = fx.votes.apply_vote(404, "B1", "Bob", Direction::Up).unwrap_err();
        assert!(matches!(err, BoardError::NotFound(_)));
        // No identity is recorded when the vote is rejected
        assert_eq!(fx.identities.display_name("B1").unwrap(), "Unknown");
    }

    #[test]
    fn test_vote_requires_voter_id() {
        let fx = fixture();
        let id = submit(&fx);
        assert!(matches!(
            fx.votes.apply_vote(id, " ", "Bob", Direction::Up),
            Err(BoardError::Validation(_))
        ));
    }

    #[test]
    fn test_count_matches_set_after_mixed_votes() {
        let fx = fixture();
        let id = submit(&fx);
        let script = [
            ("B1", Direction::Up),
            ("C1", Direction::Up),
            ("B1", Direction::Up),
            ("D1", Direction::Down),
            ("A1", Direction::Down),
            ("C1", Direction::Down),
            ("A1", Direction::Up),
            ("E1", Direction::Up),
        ];

        for (voter, direction) in script {
            let outcome = fx.votes.apply_vote(id, voter, "", direction).unwrap();
            assert_eq!(outcome.item.vote_count, outcome.item.voter_ids.len());
        }

        let item = fx.ledger.get(id).unwrap();
        assert_eq!(item.voter_ids.as_slice(), &["B1", "A1", "E1"]);
        let row = &fx.ledger.export_all().unwrap()[0];
        assert_eq!(row.votes, 3);
    }

    #[test]
    fn test_upvote_repairs_corrupt_voter_set() {
        let fx = fixture();
        let id = submit(&fx);
        fx.votes
            .db
            .with_conn(|c| {
                c.execute("UPDATE feedback SET voter_ids = '{broken' WHERE id = ?", [id])
                    .map_err(|e| BoardError::db("test", e))
            })
            .unwrap();

        let outcome = fx.votes.apply_vote(id, "B1", "Bob", Direction::Up).unwrap();
        assert_eq!(outcome.item.voter_ids.as_slice(), &["B1"]);
        assert_eq!(fx.ledger.export_all().unwrap()[0].voter_ids.as_deref(), Some(r#"["B1"]"#));
    }

    #[test]
    fn test_vote_reports_new_names() {
        let fx = fixture();
        let id = submit(&fx);
        let mut rx = fx.events.subscribe();

        fx.votes.apply_vote(id, "B1", "Bob", Direction::Up).unwrap();
        fx.votes.apply_vote(id, "B1", "Bob", Direction::Down).unwrap();
        fx.votes.apply_vote(id, "B1", "Bobby", Direction::Up).unwrap();

        let mut recorded = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let BoardEvent::IdentityRecorded { voter_id, name } = event {
                recorded.push((voter_id, name));
            }
        }
        assert_eq!(
            recorded,
            vec![
                ("B1".to_string(), "Bob".to_string()),
                ("B1".to_string(), "Bobby".to_string()),
            ]
        );
    }
}
