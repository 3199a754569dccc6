//! Identity store - voter id to display name resolution
//!
//! Voter ids are opaque tokens generated by the browser. Names are
//! best-effort display data: lookups never fail on an unknown id, they
//! fall back to [`UNKNOWN_VOTER`].

use std::collections::HashMap;
use std::sync::Arc;

use crate::db::{identities, BoardDb};
use crate::error::BoardError;
use crate::models::{FeedbackItem, FeedbackView, UNKNOWN_VOTER};

use super::events::{BoardEvent, EventBus};

/// Identity service over the `identities` table
pub struct IdentityStore {
    db: Arc<BoardDb>,
    events: Arc<EventBus>,
}

impl IdentityStore {
    pub fn new(db: Arc<BoardDb>, events: Arc<EventBus>) -> Self {
        Self { db, events }
    }

    /// Record or refresh a voter's display name
    pub fn upsert(&self, voter_id: &str, display_name: &str) -> Result<(), BoardError> {
        let voter_id = voter_id.trim();
        let display_name = display_name.trim();
        if voter_id.is_empty() {
            return Err(BoardError::Validation("voter_id is required".into()));
        }
        if display_name.is_empty() {
            return Err(BoardError::Validation("name is required".into()));
        }

        let changed = self
            .db
            .with_conn(|conn| identities::upsert(conn, voter_id, display_name))?;

        if changed {
            self.events.emit(BoardEvent::IdentityRecorded {
                voter_id: voter_id.to_string(),
                name: display_name.to_string(),
            });
        }
        Ok(())
    }

    /// Resolve display names for every given id. Unknown ids map to "Unknown".
    pub fn resolve_names<'a, I>(&self, voter_ids: I) -> Result<HashMap<String, String>, BoardError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let voter_ids: Vec<&str> = voter_ids.into_iter().collect();
        let mut names = self
            .db
            .with_conn(|conn| identities::current_names(conn, voter_ids.iter().copied()))?;

        for voter_id in voter_ids {
            names
                .entry(voter_id.to_string())
                .or_insert_with(|| UNKNOWN_VOTER.to_string());
        }
        Ok(names)
    }

    /// Current display name for one voter
    pub fn display_name(&self, voter_id: &str) -> Result<String, BoardError> {
        let current = self
            .db
            .with_conn(|conn| identities::get_current(conn, voter_id))?;
        Ok(current
            .map(|row| row.name)
            .unwrap_or_else(|| UNKNOWN_VOTER.to_string()))
    }

    /// Every name this voter has gone by, newest first
    pub fn history(&self, voter_id: &str) -> Result<Vec<String>, BoardError> {
        self.db
            .with_conn(|conn| identities::name_history(conn, voter_id))
    }

    /// Pair items with their voters' names, keeping voter order
    pub fn attach_names(&self, items: Vec<FeedbackItem>) -> Result<Vec<FeedbackView>, BoardError> {
        let names = self.resolve_names(items.iter().flat_map(|item| item.voter_ids.iter()))?;

        Ok(items
            .into_iter()
            .map(|item| {
                let voter_names = item
                    .voter_ids
                    .iter()
                    .map(|id| {
                        names
                            .get(id)
                            .cloned()
                            .unwrap_or_else(|| UNKNOWN_VOTER.to_string())
                    })
                    .collect();
                FeedbackView { item, voter_names }
            })
            .collect())
    }
}
