//! Feedback Board - a small voting board for questions and feature requests
//!
//! Visitors submit feedback items and vote them up or down. Each visitor is
//! known only by a browser-generated voter id and a display name.
//!
//! ## Architecture
//!
//! - **Feedback Ledger**: Creates, edits and lists items. Only the author may edit.
//! - **Vote Reconciler**: Applies up/down votes. The vote count is always the size
//!   of the item's voter set.
//! - **Voter Identity Store**: Maps voter ids to their most recent display name.
//!
//! ## Storage Layout
//!
//! ```text
//! ~/.local/share/feedback-board/
//! ├── feedback.db            # SQLite database (feedback + identities)
//! └── config.toml            # Configuration
//! ```

pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod http;
pub mod models;
pub mod services;
pub mod voter_set;

// Re-exports
pub use config::{Config, SiteConfig};
pub use db::{BoardDb, DbStats};
pub use error::BoardError;
pub use http::HttpServer;
pub use models::{Direction, FeedbackItem, FeedbackView, ListOrder, VoteOutcome};
pub use services::Services;
pub use voter_set::VoterSet;
