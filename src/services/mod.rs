//! Service layer for the feedback board
//!
//! Services hold the board's rules between HTTP handlers and the
//! repository functions in `db`:
//!
//! ```text
//! HTTP Handlers (thin)
//!     ↓
//! Service Layer (validation, author lock, vote reconciliation)
//!     ↓
//! Repository Layer (db/*.rs)
//!     ↓
//! SQLite Database
//! ```

pub mod events;
pub mod identity_service;
pub mod ledger_service;
pub mod response;
pub mod vote_service;

// Re-exports
pub use events::{BoardEvent, EventBus, EventListener};
pub use identity_service::IdentityStore;
pub use ledger_service::{CreateFeedbackInput, EditFeedbackInput, FeedbackLedger};
pub use vote_service::VoteReconciler;

use std::sync::Arc;

use crate::db::{BoardDb, DbStats};
use crate::error::BoardError;

/// Service container handed to the HTTP server
pub struct Services {
    pub db: Arc<BoardDb>,
    pub ledger: Arc<FeedbackLedger>,
    pub votes: Arc<VoteReconciler>,
    pub identities: Arc<IdentityStore>,
    pub events: Arc<EventBus>,
}

impl Services {
    /// Create all services over a shared database
    pub fn new(db: Arc<BoardDb>) -> Self {
        let events = Arc::new(EventBus::new());

        Self {
            ledger: Arc::new(FeedbackLedger::new(db.clone(), events.clone())),
            votes: Arc::new(VoteReconciler::new(db.clone(), events.clone())),
            identities: Arc::new(IdentityStore::new(db.clone(), events.clone())),
            db,
            events,
        }
    }

    /// Replace the whole board with an uploaded database snapshot
    pub fn import_snapshot(&self, bytes: &[u8]) -> Result<DbStats, BoardError> {
        let stats = self.db.import_snapshot(bytes)?;
        self.events.emit(BoardEvent::SnapshotImported {
            feedback_count: stats.feedback_count,
        });
        Ok(stats)
    }
}
